//! Network-backed implementations of the identity stores.

mod postgres;
mod redis;

pub use self::postgres::*;
pub use self::redis::*;
