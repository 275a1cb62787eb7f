#![doc = include_str!("../README.md")]

mod credential;
mod error;
mod generator;
mod id;
mod identity;
mod pool;
mod resilience;
mod sleep;
mod status;
mod store;
mod time;

pub use crate::credential::*;
pub use crate::error::*;
pub use crate::generator::*;
pub use crate::id::*;
pub use crate::identity::*;
pub use crate::pool::*;
pub use crate::resilience::*;
pub use crate::sleep::{SleepProvider, TokioSleep};
pub use crate::status::*;
pub use crate::store::{CacheKey, CacheStore, NewUser, UserInfo, UserStore};
pub use crate::time::*;
