//! One-way password hashing and bearer token issuance/validation.

mod password;
mod token;

pub use password::*;
pub use token::*;
