//! gRPC service implementations.
//!
//! ## Structure
//!
//! - [`user`] - `UserService` (Register, Login, GetUserInfo) over the
//!   identity service.
//! - [`system`] - `SystemService` (SendFile) streaming files in fixed-size
//!   chunks.

pub mod system;
pub mod user;
