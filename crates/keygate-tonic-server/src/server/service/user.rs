//! `UserService` handler.
//!
//! Thin translation between protobuf messages and [`IdentityService`]. All
//! validation, retries and cache population happen in the identity service;
//! this layer only maps results to responses and statuses.

use std::sync::Arc;

use keygate_tonic_core::{
    CallContext, Error,
    keygate::{self, CacheStore, IdentityService, UserStore},
    proto::user::{
        GetUserInfoRequest, GetUserInfoResponse, LoginRequest, LoginResponse, RegisterRequest,
        RegisterResponse, user_service_server::UserService,
    },
};
use prost::Message;
use tonic::{Code, Request, Response, Status};
use tracing::{debug, instrument};

use crate::server::telemetry::record_cache_queue_depth;

pub struct IdentityHandler<U, C> {
    identity: Arc<IdentityService<U, C>>,
}

impl<U, C> IdentityHandler<U, C> {
    pub fn new(identity: Arc<IdentityService<U, C>>) -> Self {
        Self { identity }
    }
}

#[tonic::async_trait]
impl<U, C> UserService for IdentityHandler<U, C>
where
    U: UserStore,
    C: CacheStore,
{
    #[instrument(skip_all, fields(username = %request.get_ref().username))]
    async fn register(
        &self,
        request: Request<RegisterRequest>,
    ) -> Result<Response<RegisterResponse>, Status> {
        let RegisterRequest { username, password } = request.into_inner();
        let registration = self
            .identity
            .register(&username, &password)
            .await
            .map_err(Error::from)?;
        record_cache_queue_depth(self.identity.cache_writer().queue_depth());

        Ok(Response::new(RegisterResponse {
            success: true,
            user_id: registration.user_id.to_string(),
        }))
    }

    #[instrument(skip_all, fields(username = %request.get_ref().username))]
    async fn login(&self, request: Request<LoginRequest>) -> Result<Response<LoginResponse>, Status> {
        let LoginRequest { username, password } = request.into_inner();
        let token = match self.identity.login(&username, &password).await {
            Ok(token) => token,
            Err(keygate::Error::Signing(_)) => return Err(signing_failure_status()),
            Err(err) => return Err(Error::from(err).into()),
        };
        record_cache_queue_depth(self.identity.cache_writer().queue_depth());

        Ok(Response::new(LoginResponse {
            success: true,
            token,
        }))
    }

    #[instrument(skip_all, fields(user_id = %request.get_ref().user_id))]
    async fn get_user_info(
        &self,
        request: Request<GetUserInfoRequest>,
    ) -> Result<Response<GetUserInfoResponse>, Status> {
        let caller = request
            .extensions()
            .get::<CallContext>()
            .and_then(|context| context.subject.clone());
        let user_id = request.into_inner().user_id;
        debug!(caller = ?caller, "profile lookup");

        let info = self
            .identity
            .get_user_info(&user_id)
            .await
            .map_err(Error::from)?;

        Ok(Response::new(GetUserInfoResponse {
            user_id,
            username: info.username,
            like_embedding: info.like_embedding,
        }))
    }
}

/// `Internal` status carrying an unsuccessful `LoginResponse` in its details.
fn signing_failure_status() -> Status {
    let unsigned = LoginResponse {
        success: false,
        token: String::new(),
    };
    Status::with_details(
        Code::Internal,
        "failed to generate jwt",
        unsigned.encode_to_vec().into(),
    )
}
