//! Bounded write-back pool for best-effort cache population.
//!
//! Request handlers hand [`CacheWrite`]s to a [`CacheWriter`] and move on.
//! Each worker task owns a bounded queue and applies writes with the cache
//! retry policy, so cache latency and cache outages never hold up a call
//! beyond waiting for queue capacity.
//!
//! ## Structure
//!
//! - [`manager`] - the [`CacheWriter`] handle: submission, depth, shutdown.
//! - [`worker`] - the per-worker loop.
//! - [`request`] - messages exchanged with workers and the [`WriteTicket`].

mod manager;
mod request;
mod worker;

pub use manager::*;
pub use request::*;
