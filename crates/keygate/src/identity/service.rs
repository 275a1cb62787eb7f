use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use crate::{
    CacheKey, CacheStore, CacheWrite, CacheWriter, Error, IdAllocator, NewUser, Resilient, Result,
    RetryPolicy, SleepProvider, SnowflakeId, StoreError, TokenCodec, TokioSleep, UserInfo,
    UserStore, WriteTicket, hash_password, verify_password,
};

const EMPTY_CREDENTIALS: &str = "username and password cannot be empty";
const EMPTY_USER_ID: &str = "userId cannot be empty";

/// Result of a successful registration.
#[derive(Debug)]
pub struct Registration {
    pub user_id: SnowflakeId,
    /// Completion handles for the cache population writes. Dropping them is
    /// fine; the writes proceed regardless.
    pub cache_writes: Vec<WriteTicket>,
}

/// Register, Login and GetUserInfo over a durable user store and a cache.
///
/// Every store call runs under [`Resilient`]. Cache population is handed to
/// the [`CacheWriter`] and never fails the request that triggered it.
pub struct IdentityService<U, C, S = TokioSleep> {
    allocator: Arc<IdAllocator>,
    codec: TokenCodec,
    users: Arc<U>,
    cache: Arc<C>,
    writer: Arc<CacheWriter>,
    resilient: Resilient<S>,
}

impl<U, C, S> IdentityService<U, C, S>
where
    U: UserStore,
    C: CacheStore,
    S: SleepProvider,
{
    pub fn new(
        allocator: Arc<IdAllocator>,
        codec: TokenCodec,
        users: Arc<U>,
        cache: Arc<C>,
        writer: Arc<CacheWriter>,
        resilient: Resilient<S>,
    ) -> Self {
        Self {
            allocator,
            codec,
            users,
            cache,
            writer,
            resilient,
        }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn cache_writer(&self) -> &CacheWriter {
        &self.writer
    }

    /// Creates an account and returns its new id.
    ///
    /// An existing registration marker is logged but does not stop the
    /// registration; the username uniqueness constraint of the durable store
    /// is what rejects a duplicate.
    #[instrument(level = "debug", skip(self, password))]
    pub async fn register(&self, username: &str, password: &str) -> Result<Registration> {
        if username.is_empty() || password.is_empty() {
            return Err(Error::InvalidArgument(EMPTY_CREDENTIALS));
        }

        let marker = CacheKey::registration(username);
        let cache = &*self.cache;
        let marker_ref = &marker;
        match self
            .resilient
            .run("check registration marker", RetryPolicy::CACHE_READ, move || {
                cache.get(marker_ref)
            })
            .await
        {
            Ok(Some(existing)) => {
                warn!(username, existing = %existing, "registration marker already present");
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "registration marker lookup failed, continuing"),
        }

        let user = NewUser {
            id: self.allocator.allocate(),
            username: username.to_owned(),
            password_hash: hash_password(password),
        };

        let users = &*self.users;
        let user_ref = &user;
        self.resilient
            .run("register user", RetryPolicy::DURABLE, move || {
                users.insert_user(user_ref)
            })
            .await
            .map_err(|e| {
                error!(error = %e, "failed to persist new user");
                Error::from(e)
            })?;

        let mut cache_writes = Vec::with_capacity(2);
        for write in [
            CacheWrite::new(marker, user.id.to_string()),
            CacheWrite::new(CacheKey::login(username), user.password_hash.clone()),
        ] {
            match self.writer.submit(write).await {
                Ok(ticket) => cache_writes.push(ticket),
                Err(e) => warn!(error = %e, "cache population skipped"),
            }
        }

        info!(user_id = %user.id, "user registered");
        Ok(Registration {
            user_id: user.id,
            cache_writes,
        })
    }

    /// Verifies credentials and issues a bearer token whose subject is the
    /// username.
    ///
    /// The login cache is consulted first. When it cannot produce a hash the
    /// durable store is asked instead and the cache is repopulated.
    #[instrument(level = "debug", skip(self, password))]
    pub async fn login(&self, username: &str, password: &str) -> Result<String> {
        if username.is_empty() || password.is_empty() {
            return Err(Error::InvalidArgument(EMPTY_CREDENTIALS));
        }

        let stored_hash = self.stored_hash(username).await?;
        if !verify_password(password, &stored_hash) {
            return Err(Error::PermissionDenied);
        }

        self.codec.issue(username).inspect_err(|e| {
            error!(error = %e, "failed to generate jwt");
        })
    }

    async fn stored_hash(&self, username: &str) -> Result<String> {
        let key = CacheKey::login(username);
        let cache = &*self.cache;
        let key_ref = &key;
        let cached = self
            .resilient
            .run("read login cache", RetryPolicy::CACHE_READ, move || async move {
                cache.get(key_ref).await?.ok_or(StoreError::NotFound)
            })
            .await;

        match cached {
            Ok(hash) => return Ok(hash),
            Err(e) => warn!(error = %e, "login cache unavailable, falling back to user store"),
        }

        let users = &*self.users;
        let hash = self
            .resilient
            .run("login user", RetryPolicy::DURABLE, move || {
                users.find_password_hash(username)
            })
            .await
            .map_err(|e| {
                error!(error = %e, "failed to read stored credential");
                Error::from(e)
            })?;

        if let Err(e) = self.writer.submit(CacheWrite::new(key, hash.clone())).await {
            warn!(error = %e, "login cache backfill skipped");
        }
        Ok(hash)
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn get_user_info(&self, user_id: &str) -> Result<UserInfo> {
        if user_id.is_empty() {
            return Err(Error::InvalidArgument(EMPTY_USER_ID));
        }

        let users = &*self.users;
        self.resilient
            .run("get user info", RetryPolicy::DURABLE, move || {
                users.find_user(user_id)
            })
            .await
            .map_err(|e| {
                error!(error = %e, "failed to read user info");
                Error::from(e)
            })
    }
}
