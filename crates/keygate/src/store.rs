//! Collaborator contracts for the two backing stores.
//!
//! The relational store is the source of truth for accounts. The cache holds
//! best-effort registration markers and login credentials and may lag behind
//! or diverge from it.

use core::fmt;

use crate::{SnowflakeId, StoreError};

/// A row to insert for a new account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub id: SnowflakeId,
    pub username: String,
    pub password_hash: String,
}

/// Public profile of an account.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UserInfo {
    pub username: String,
    pub like_embedding: Vec<f32>,
}

/// Durable account storage.
///
/// Every call is one unit of work. Implementations open a fresh transaction
/// per call and roll it back on failure, so a retried call never observes a
/// half-applied previous attempt.
pub trait UserStore: Send + Sync + 'static {
    fn insert_user(&self, user: &NewUser) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Returns [`StoreError::NotFound`] when no account has this id.
    fn find_user(&self, id: &str) -> impl Future<Output = Result<UserInfo, StoreError>> + Send;

    /// Returns [`StoreError::NotFound`] when no account has this username.
    fn find_password_hash(
        &self,
        username: &str,
    ) -> impl Future<Output = Result<String, StoreError>> + Send;
}

/// Volatile key/value storage.
pub trait CacheStore: Send + Sync + 'static {
    /// Returns `Ok(None)` for a missing key.
    fn get(&self, key: &CacheKey) -> impl Future<Output = Result<Option<String>, StoreError>> + Send;

    fn set(&self, key: &CacheKey, value: &str) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// A namespaced cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// `register:<username>`, set once an account exists.
    pub fn registration(username: &str) -> Self {
        Self(format!("register:{username}"))
    }

    /// `login:<username>`, holding the account's password hash.
    pub fn login(username: &str) -> Self {
        Self(format!("login:{username}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
