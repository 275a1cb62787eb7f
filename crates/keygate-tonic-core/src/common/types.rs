//! # RPC Method Catalogue and Call Context
//!
//! Every gRPC method the gateway serves is a variant of [`RpcMethod`], each
//! with a fixed [`Access`] level. The auth gate consults this catalogue
//! instead of a list of strings, so adding a method forces a decision about
//! whether it is public.
//!
//! A [`CallContext`] travels with each request in its extensions. The
//! interceptor fills it in before the handler runs; handlers read the
//! authenticated [`Subject`] from it.

use core::fmt;

/// Whether a method may be called without a bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    Public,
    Protected,
}

/// The closed set of methods served by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcMethod {
    Register,
    Login,
    GetUserInfo,
    SendFile,
}

impl RpcMethod {
    pub const ALL: [Self; 4] = [
        Self::Register,
        Self::Login,
        Self::GetUserInfo,
        Self::SendFile,
    ];

    /// Full gRPC path, e.g. `/user.UserService/Login`.
    pub const fn path(self) -> &'static str {
        match self {
            Self::Register => "/user.UserService/Register",
            Self::Login => "/user.UserService/Login",
            Self::GetUserInfo => "/user.UserService/GetUserInfo",
            Self::SendFile => "/system.SystemService/SendFile",
        }
    }

    pub const fn access(self) -> Access {
        match self {
            Self::Register | Self::Login => Access::Public,
            Self::GetUserInfo | Self::SendFile => Access::Protected,
        }
    }

    pub fn from_path(path: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.path() == path)
    }
}

impl fmt::Display for RpcMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Access level for an arbitrary request path. Paths outside the catalogue
/// are protected.
pub fn access_for(path: &str) -> Access {
    RpcMethod::from_path(path).map_or(Access::Protected, RpcMethod::access)
}

/// The service portion of a gRPC path: everything up to and including the
/// last `/`. `/user.UserService/Login` yields `/user.UserService/`.
pub fn service_of(path: &str) -> &str {
    path.rfind('/').map_or(path, |idx| &path[..=idx])
}

/// An authenticated caller, as named by the token's subject claim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subject(String);

impl Subject {
    pub fn new(subject: impl Into<String>) -> Self {
        Self(subject.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-call state written by the interceptor and read by handlers.
///
/// `subject` is `None` for public methods and always `Some` once a protected
/// method's handler runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallContext {
    pub method: Option<RpcMethod>,
    pub subject: Option<Subject>,
}

impl CallContext {
    pub fn for_path(path: &str) -> Self {
        Self {
            method: RpcMethod::from_path(path),
            subject: None,
        }
    }

    pub fn with_subject(mut self, subject: Subject) -> Self {
        self.subject = Some(subject);
        self
    }
}
