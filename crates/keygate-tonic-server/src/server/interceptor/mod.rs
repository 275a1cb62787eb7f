//! Per-call middleware wrapped around each gRPC service.
//!
//! For every request [`CallService`]:
//!
//! 1. opens an `rpc` span named after the full method path,
//! 2. checks the bearer token when the method is protected and records the
//!    subject on the span,
//! 3. stores a [`CallContext`] in the request extensions for the handler,
//! 4. logs the outcome once the response head is ready.
//!
//! Rejected calls never reach the wrapped service. The rejection is returned
//! as a trailers-only gRPC response.

mod auth;
mod span;

pub use auth::*;

use span::{call_span, record_outcome};

use core::task::{Context, Poll};
use std::time::Instant;

use futures::future::BoxFuture;
use keygate_tonic_core::{Access, CallContext, access_for};
use tonic::{Code, Status, server::NamedService};
use tower::{Layer, Service};
use tracing::{Instrument, debug};

use crate::server::telemetry;

#[derive(Clone, Debug)]
pub struct CallLayer {
    gate: AuthGate,
}

impl CallLayer {
    pub fn new(gate: AuthGate) -> Self {
        Self { gate }
    }
}

impl<S> Layer<S> for CallLayer {
    type Service = CallService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CallService {
            inner,
            gate: self.gate.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CallService<S> {
    inner: S,
    gate: AuthGate,
}

impl<S: NamedService> NamedService for CallService<S> {
    const NAME: &'static str = S::NAME;
}

impl<S, ReqBody, ResBody> Service<http::Request<ReqBody>> for CallService<S>
where
    S: Service<http::Request<ReqBody>, Response = http::Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: Default + Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: http::Request<ReqBody>) -> Self::Future {
        let started = Instant::now();
        let path = req.uri().path().to_owned();
        let span = call_span(&path, req.headers());
        telemetry::increment_requests(&path);

        let mut context = CallContext::for_path(&path);
        if access_for(&path) == Access::Protected {
            match self.gate.authenticate(req.headers()) {
                Ok(subject) => {
                    span.record("user_id", subject.as_str());
                    context = context.with_subject(subject);
                }
                Err(err) => {
                    telemetry::increment_auth_rejections();
                    let status = Status::from(err);
                    span.in_scope(|| record_outcome(&span, &path, started, Some(&status)));
                    return Box::pin(async move { Ok(status.into_http()) });
                }
            }
        }
        req.extensions_mut().insert(context);

        // The clone that was driven to readiness is the one that must be
        // called.
        let clone = self.inner.clone();
        let mut inner = core::mem::replace(&mut self.inner, clone);

        let outcome_span = span.clone();
        Box::pin(
            async move {
                debug!("dispatching to handler");
                let result = inner.call(req).await;
                let failure = match &result {
                    Ok(response) => Status::from_header_map(response.headers())
                        .filter(|status| status.code() != Code::Ok),
                    Err(_) => Some(Status::internal("transport error")),
                };
                record_outcome(&outcome_span, &path, started, failure.as_ref());
                result
            }
            .instrument(span),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::{
        convert::Infallible,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use http::{HeaderValue, header::AUTHORIZATION};
    use keygate_tonic_core::{RpcMethod, keygate::TokenCodec};
    use tower::{ServiceExt, service_fn};

    use super::*;

    const SECRET: &[u8] = b"interceptor-secret";

    /// Wraps an echo handler that renders the subject it was given, or `-`.
    fn wrapped(
        hits: Arc<AtomicUsize>,
    ) -> impl Service<
        http::Request<()>,
        Response = http::Response<String>,
        Error = Infallible,
        Future = BoxFuture<'static, Result<http::Response<String>, Infallible>>,
    > {
        let inner = service_fn(move |req: http::Request<()>| {
            let hits = Arc::clone(&hits);
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                let context = req.extensions().get::<CallContext>().cloned();
                let body = context
                    .and_then(|c| c.subject)
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "-".to_owned());
                Ok::<_, Infallible>(http::Response::new(body))
            }
        });
        CallLayer::new(AuthGate::new(TokenCodec::new(SECRET))).layer(inner)
    }

    fn request(method: RpcMethod, token: Option<&str>) -> http::Request<()> {
        let mut req = http::Request::builder()
            .uri(format!("http://localhost{}", method.path()))
            .body(())
            .unwrap();
        if let Some(token) = token {
            req.headers_mut()
                .insert(AUTHORIZATION, HeaderValue::from_str(token).unwrap());
        }
        req
    }

    #[tokio::test]
    async fn public_methods_skip_the_gate() {
        let hits = Arc::new(AtomicUsize::new(0));
        for method in [RpcMethod::Register, RpcMethod::Login] {
            let response = wrapped(Arc::clone(&hits))
                .oneshot(request(method, None))
                .await
                .unwrap();
            assert_eq!(response.body(), "-");
            assert!(Status::from_header_map(response.headers()).is_none());
        }
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn protected_method_without_token_never_reaches_handler() {
        let hits = Arc::new(AtomicUsize::new(0));
        let response = wrapped(Arc::clone(&hits))
            .oneshot(request(RpcMethod::GetUserInfo, None))
            .await
            .unwrap();

        let status = Status::from_header_map(response.headers()).unwrap();
        assert_eq!(status.code(), Code::Unauthenticated);
        assert_eq!(status.message(), "authorization token is not provided");
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn invalid_token_is_rejected() {
        let hits = Arc::new(AtomicUsize::new(0));
        let response = wrapped(Arc::clone(&hits))
            .oneshot(request(RpcMethod::SendFile, Some("Bearer garbage")))
            .await
            .unwrap();

        let status = Status::from_header_map(response.headers()).unwrap();
        assert_eq!(status.code(), Code::Unauthenticated);
        assert!(status.message().starts_with("invalid token: "));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn valid_token_passes_subject_to_handler() {
        let hits = Arc::new(AtomicUsize::new(0));
        let token = TokenCodec::new(SECRET).issue("alice").unwrap();
        let response = wrapped(Arc::clone(&hits))
            .oneshot(request(RpcMethod::GetUserInfo, Some(&token)))
            .await
            .unwrap();

        assert_eq!(response.body(), "alice");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_paths_are_protected() {
        let hits = Arc::new(AtomicUsize::new(0));
        let req = http::Request::builder()
            .uri("http://localhost/user.UserService/DeleteEverything")
            .body(())
            .unwrap();
        let response = wrapped(Arc::clone(&hits)).oneshot(req).await.unwrap();

        let status = Status::from_header_map(response.headers()).unwrap();
        assert_eq!(status.code(), Code::Unauthenticated);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
