//! `SystemService` handler: streams a file back to the caller in 1 MiB
//! chunks.
//!
//! The file is opened before the response starts, so an unreadable path is a
//! plain error status. Once streaming, a reader task fills each chunk
//! completely (only the last one may be shorter) and pushes it through a
//! bounded channel. A read error ends the stream with an error item; a
//! dropped client ends the task.

use core::pin::Pin;

use bytes::Bytes;
use keygate_tonic_core::{
    CallContext, Error,
    proto::system::{FileChunk, SendFileRequest, system_service_server::SystemService},
};
use tokio::{
    fs::File,
    io::{AsyncRead, AsyncReadExt},
    sync::mpsc,
};
use tokio_stream::{Stream, wrappers::ReceiverStream};
use tonic::{Request, Response, Status};
use tracing::{Instrument, debug, error, info, instrument, warn};

/// Size of every streamed chunk except possibly the last.
pub const CHUNK_SIZE: usize = 1024 * 1024;

#[derive(Clone, Debug)]
pub struct SystemHandler {
    stream_buffer_size: usize,
}

impl SystemHandler {
    pub fn new(stream_buffer_size: usize) -> Self {
        Self { stream_buffer_size }
    }
}

#[tonic::async_trait]
impl SystemService for SystemHandler {
    type SendFileStream = Pin<Box<dyn Stream<Item = Result<FileChunk, Status>> + Send>>;

    #[instrument(skip_all, fields(file_path = %request.get_ref().file_path))]
    async fn send_file(
        &self,
        request: Request<SendFileRequest>,
    ) -> Result<Response<Self::SendFileStream>, Status> {
        let caller = request
            .extensions()
            .get::<CallContext>()
            .and_then(|context| context.subject.clone());
        let path = request.into_inner().file_path;

        let file = File::open(&path).await.map_err(|e| {
            error!(error = %e, "failed to open file");
            Error::FileTransfer {
                context: format!("failed to open file: {e}"),
            }
        })?;
        info!(caller = ?caller, "streaming file");

        let (tx, rx) = mpsc::channel(self.stream_buffer_size);
        tokio::spawn(stream_chunks(file, tx).in_current_span());

        Ok(Response::new(Box::pin(ReceiverStream::new(rx))))
    }
}

/// Reads `reader` to the end, sending full chunks as they fill.
pub(crate) async fn stream_chunks<R>(mut reader: R, tx: mpsc::Sender<Result<FileChunk, Status>>)
where
    R: AsyncRead + Unpin,
{
    let mut sent = 0usize;
    loop {
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut filled = 0;
        while filled < CHUNK_SIZE {
            match reader.read(&mut buf[filled..]).await {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) => {
                    error!(error = %e, "error reading file");
                    let status = Error::FileTransfer {
                        context: format!("error reading file: {e}"),
                    };
                    let _ = tx.send(Err(status.into())).await;
                    return;
                }
            }
        }

        if filled == 0 {
            break;
        }
        buf.truncate(filled);

        let chunk = FileChunk {
            content: Bytes::from(buf),
        };
        if let Err(e) = tx.send(Ok(chunk)).await {
            warn!(error = %e, "error sending file chunk");
            return;
        }
        sent += 1;

        if filled < CHUNK_SIZE {
            break;
        }
    }
    debug!(chunks = sent, "file streamed");
}
