use std::time::Instant;

use http::HeaderMap;
use keygate_tonic_core::service_of;
use tonic::Status;
use tracing::{Span, error, field, info, info_span};

use crate::server::telemetry;

/// Opens the per-call span. `user_id` is filled in once the auth gate has
/// accepted a token.
pub(crate) fn call_span(path: &str, headers: &HeaderMap) -> Span {
    let span = info_span!(
        "rpc",
        otel.name = %path,
        otel.kind = "server",
        rpc.system = "grpc",
        rpc.method = %path,
        rpc.service = %service_of(path),
        rpc.grpc.status_code = field::Empty,
        user_id = field::Empty,
    );

    #[cfg(feature = "tracing")]
    link_remote_parent(&span, headers);
    #[cfg(not(feature = "tracing"))]
    let _ = headers;

    span
}

/// Records the outcome of a call. Must run inside `span`.
pub(crate) fn record_outcome(span: &Span, path: &str, started: Instant, failure: Option<&Status>) {
    let elapsed_ms = started.elapsed().as_secs_f64() * 1_000.0;
    telemetry::record_rpc_duration(elapsed_ms);

    match failure {
        Some(status) => {
            span.record("rpc.grpc.status_code", status.code() as i32);
            telemetry::increment_rpc_errors(path);
            error!(
                code = ?status.code(),
                message = status.message(),
                elapsed_ms,
                "RPC failed"
            );
        }
        None => {
            span.record("rpc.grpc.status_code", 0);
        }
    }

    info!(elapsed_ms, "rpc completed");
}

#[cfg(feature = "tracing")]
fn link_remote_parent(span: &Span, headers: &HeaderMap) {
    use opentelemetry::propagation::Extractor;
    use tracing_opentelemetry::OpenTelemetrySpanExt;

    struct HeaderExtractor<'a>(&'a HeaderMap);

    impl Extractor for HeaderExtractor<'_> {
        fn get(&self, key: &str) -> Option<&str> {
            self.0.get(key).and_then(|value| value.to_str().ok())
        }

        fn keys(&self) -> Vec<&str> {
            self.0.keys().map(|key| key.as_str()).collect()
        }
    }

    let parent = opentelemetry::global::get_text_map_propagator(|propagator| {
        propagator.extract(&HeaderExtractor(headers))
    });
    let _ = span.set_parent(parent);
}
