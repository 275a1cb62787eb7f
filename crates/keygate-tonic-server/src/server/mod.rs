//! Server components for the identity gateway.
//!
//! ## Structure
//!
//! - [`config`] - CLI/env configuration and validation.
//! - [`interceptor`] - tracing span and auth gate wrapped around every call.
//! - [`service`] - `UserService` and `SystemService` handlers.
//! - [`store`] - PostgreSQL and Redis adapters for the identity stores.
//! - [`telemetry`] - logging, OpenTelemetry export and metric handles.

pub mod config;
pub mod interceptor;
pub mod service;
pub mod store;
pub mod telemetry;
