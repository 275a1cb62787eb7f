#![doc = include_str!("../README.md")]

mod server;

use std::sync::Arc;

use clap::Parser;
use futures::Stream;
use keygate_tonic_core::{
    FILE_DESCRIPTOR_SET,
    keygate::{CacheWriter, IdAllocator, IdentityService, Resilient, TokenCodec, TokioSleep},
    proto::{
        system::system_service_server::SystemServiceServer,
        user::user_service_server::UserServiceServer,
    },
};
use server::{
    config::{CliArgs, ServerConfig},
    interceptor::{AuthGate, CallLayer},
    service::{system::SystemHandler, user::IdentityHandler},
    store::{PgUserStore, RedisCacheStore},
    telemetry::{TelemetryProviders, init_telemetry},
};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpListener,
    signal,
};
use tokio_stream::wrappers::TcpListenerStream;
use tonic::{
    codec::CompressionEncoding,
    transport::{Server, server::Connected},
};
use tonic_health::server::HealthReporter;
use tonic_reflection::server::Builder;
use tonic_web::GrpcWebLayer;
use tower::{Layer, ServiceBuilder};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

type Identity = IdentityService<PgUserStore, RedisCacheStore>;
type UserHandler = IdentityHandler<PgUserStore, RedisCacheStore>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    let providers = init_telemetry()?;

    if config.uds {
        #[cfg(unix)]
        {
            use tokio::net::UnixListener;
            use tokio_stream::wrappers::UnixListenerStream;
            let uds_path = config.server_addr.clone();
            let uds = UnixListener::bind(&uds_path)?;
            let incoming = UnixListenerStream::new(uds);
            log_startup_info(&uds_path, &config);
            let res = run_server_with_incoming(providers, incoming, config).await;
            // A panic can still leave the socket file behind.
            let _ = std::fs::remove_file(&uds_path);
            res
        }
        #[cfg(not(unix))]
        {
            anyhow::bail!("Unix domain sockets are not supported on this platform");
        }
    } else {
        let tcp_path = config.server_addr.clone();
        let tcp = TcpListener::bind(&tcp_path).await?;
        let incoming = TcpListenerStream::new(tcp);
        log_startup_info(&tcp_path, &config);
        run_server_with_incoming(providers, incoming, config).await
    }
}

/// Backing resources released during shutdown.
struct Resources {
    identity: Arc<Identity>,
    users: Arc<PgUserStore>,
}

async fn run_server_with_incoming<I, IO, IE>(
    providers: TelemetryProviders,
    incoming: I,
    config: ServerConfig,
) -> anyhow::Result<()>
where
    I: Stream<Item = Result<IO, IE>>,
    IO: AsyncRead + AsyncWrite + Connected + Unpin + Send + 'static,
    IE: Into<tower::BoxError>,
{
    let users = Arc::new(
        PgUserStore::connect(&config.database_url, config.database_max_connections).await?,
    );
    users.ensure_schema().await?;
    let cache = Arc::new(RedisCacheStore::connect(&config.redis_url).await?);

    let codec = TokenCodec::new(config.jwt_secret.as_bytes());
    let writer = CacheWriter::spawn(
        Arc::clone(&cache),
        Resilient::new(TokioSleep),
        config.cache_writer,
    );
    let identity = Arc::new(IdentityService::new(
        Arc::new(IdAllocator::new(config.node_id)?),
        codec.clone(),
        Arc::clone(&users),
        cache,
        Arc::new(writer),
        Resilient::default(),
    ));

    let (health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<UserServiceServer<UserHandler>>()
        .await;
    health_reporter
        .set_serving::<SystemServiceServer<SystemHandler>>()
        .await;

    let reflection = Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()?;

    let calls = CallLayer::new(AuthGate::new(codec));
    let user_service = calls.layer(build_user_service(IdentityHandler::new(Arc::clone(
        &identity,
    ))));
    let system_service = calls.layer(build_system_service(SystemHandler::new(
        config.stream_buffer_size,
    )));

    let resources = Resources { identity, users };

    Server::builder()
        .accept_http1(true)
        .http2_adaptive_window(Some(true))
        .layer(
            ServiceBuilder::new()
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                )
                .layer(GrpcWebLayer::new()),
        )
        .add_service(health_service)
        .add_service(reflection)
        .add_service(user_service)
        .add_service(system_service)
        .serve_with_incoming_shutdown(
            incoming,
            shutdown_signal(resources, health_reporter, providers),
        )
        .await?;

    info!("Service shut down successfully");
    Ok(())
}

fn log_startup_info(addr: &str, config: &ServerConfig) {
    if cfg!(debug_assertions) {
        info!("Starting identity gateway on {addr} with full config: {config:#?}");
    } else {
        info!(
            "Starting identity gateway on {addr} as node {} with {} cache writers",
            config.node_id, config.cache_writer.workers
        );
    }
}

fn build_user_service(handler: UserHandler) -> UserServiceServer<UserHandler> {
    UserServiceServer::new(handler)
        .send_compressed(CompressionEncoding::Zstd)
        .send_compressed(CompressionEncoding::Gzip)
        .send_compressed(CompressionEncoding::Deflate)
        .accept_compressed(CompressionEncoding::Zstd)
        .accept_compressed(CompressionEncoding::Gzip)
        .accept_compressed(CompressionEncoding::Deflate)
}

fn build_system_service(handler: SystemHandler) -> SystemServiceServer<SystemHandler> {
    SystemServiceServer::new(handler)
        .send_compressed(CompressionEncoding::Zstd)
        .send_compressed(CompressionEncoding::Gzip)
        .send_compressed(CompressionEncoding::Deflate)
        .accept_compressed(CompressionEncoding::Zstd)
        .accept_compressed(CompressionEncoding::Gzip)
        .accept_compressed(CompressionEncoding::Deflate)
}

async fn shutdown_signal(
    resources: Resources,
    health_reporter: HealthReporter,
    providers: TelemetryProviders,
) {
    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C signal"),
        () = terminate => info!("Received SIGTERM signal"),
    }

    info!("Shutdown signal received, terminating gracefully...");

    // 1. Publish the status
    health_reporter
        .set_not_serving::<UserServiceServer<UserHandler>>()
        .await;
    health_reporter
        .set_not_serving::<SystemServiceServer<SystemHandler>>()
        .await;

    // 2. Drain queued cache writes, then release the pool
    let writer = resources.identity.cache_writer();
    info!(pending = writer.queue_depth(), "draining cache writes");
    writer.shutdown().await;
    if writer.queue_depth() > 0 {
        error!(abandoned = writer.queue_depth(), "cache writes left unfinished");
    }
    resources.users.close().await;

    // 3. Flush telemetry
    providers.shutdown();
}
