use keygate_tonic_core::keygate::{NewUser, StoreError, UserInfo, UserStore};
use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing::info;

/// Account storage backed by PostgreSQL with the `vector` extension.
#[derive(Clone, Debug)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    /// Opens a bounded pool and checks that a connection can be made.
    pub async fn connect(url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        info!(max_connections, "connected to postgres");
        Ok(Self { pool })
    }

    /// Creates the extension and `users` table when they do not exist yet.
    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&self.pool)
            .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                like_embedding vector
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl UserStore for PgUserStore {
    async fn insert_user(&self, user: &NewUser) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::backend)?;
        sqlx::query("INSERT INTO users (id, username, password_hash) VALUES ($1, $2, $3)")
            .bind(user.id.to_string())
            .bind(&user.username)
            .bind(&user.password_hash)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::backend)?;
        tx.commit().await.map_err(StoreError::backend)
    }

    async fn find_user(&self, id: &str) -> Result<UserInfo, StoreError> {
        let row: Option<(String, Option<Vec<f32>>)> = sqlx::query_as(
            "SELECT username, like_embedding::real[] FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        let (username, like_embedding) = row.ok_or(StoreError::NotFound)?;
        Ok(UserInfo {
            username,
            like_embedding: like_embedding.unwrap_or_default(),
        })
    }

    async fn find_password_hash(&self, username: &str) -> Result<String, StoreError> {
        sqlx::query_scalar::<_, String>("SELECT password_hash FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::backend)?
            .ok_or(StoreError::NotFound)
    }
}
