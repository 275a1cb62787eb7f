use core::{fmt, time::Duration};

use anyhow::bail;
use clap::Parser;
use keygate_tonic_core::keygate::{CacheWriterConfig, SnowflakeId};

/// Runtime configuration for the `keygate-tonic-server` binary.
///
/// All values are parsed from CLI arguments or environment variables (a
/// `.env` file is loaded first when present).
#[derive(Parser, Clone)]
#[command(
    name = "keygate-tonic-server",
    version,
    about = "A gRPC identity gateway with bearer-token authentication"
)]
pub struct CliArgs {
    /// Address to listen on (TCP or Unix socket path; use --uds for Unix socket).
    ///
    /// Example: "0.0.0.0:50051" or "/tmp/keygate.sock"
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:50051"))]
    pub server_addr: String,

    /// Listen on a Unix socket instead of TCP. If set, `SERVER_ADDR` must be a file path.
    #[arg(short, long, default_value_t = false)]
    pub uds: bool,

    /// Node id embedded in every allocated account id. Must be unique per
    /// running instance and fit in 10 bits.
    ///
    /// Environment variable: `NODE_ID`
    #[arg(long, env = "NODE_ID", default_value_t = 1)]
    pub node_id: u64,

    /// PostgreSQL connection string.
    ///
    /// Environment variable: `DATABASE_URL`
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Upper bound on pooled PostgreSQL connections.
    ///
    /// Environment variable: `DATABASE_MAX_CONNECTIONS`
    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value_t = 10)]
    pub database_max_connections: u32,

    /// Redis connection string.
    ///
    /// Environment variable: `REDIS_URL`
    #[arg(long, env = "REDIS_URL", default_value_t = String::from("redis://127.0.0.1:6379"))]
    pub redis_url: String,

    /// Shared HS256 secret for signing and validating bearer tokens.
    ///
    /// Environment variable: `JWT_SECRET`
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: String,

    /// Number of background cache write workers.
    ///
    /// Environment variable: `CACHE_WRITE_WORKERS`
    #[arg(long, env = "CACHE_WRITE_WORKERS", default_value_t = 4)]
    pub cache_write_workers: usize,

    /// Queue capacity per cache write worker. Submissions wait when a queue is
    /// full.
    ///
    /// Environment variable: `CACHE_WRITE_QUEUE`
    #[arg(long, env = "CACHE_WRITE_QUEUE", default_value_t = 1024)]
    pub cache_write_queue: usize,

    /// Number of file chunks buffered between the reader task and the gRPC
    /// stream.
    ///
    /// Environment variable: `STREAM_BUFFER_SIZE`
    #[arg(long, env = "STREAM_BUFFER_SIZE", default_value_t = 4)]
    pub stream_buffer_size: usize,

    /// Seconds to wait for queued cache writes during shutdown.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 3)]
    pub shutdown_timeout: u64,
}

#[derive(Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub uds: bool,
    pub node_id: u64,
    pub database_url: String,
    pub database_max_connections: u32,
    pub redis_url: String,
    pub jwt_secret: String,
    pub stream_buffer_size: usize,
    pub cache_writer: CacheWriterConfig,
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("server_addr", &self.server_addr)
            .field("uds", &self.uds)
            .field("node_id", &self.node_id)
            .field("database_max_connections", &self.database_max_connections)
            .field("redis_url", &self.redis_url)
            .field("jwt_secret", &"<redacted>")
            .field("stream_buffer_size", &self.stream_buffer_size)
            .field("cache_writer", &self.cache_writer)
            .finish_non_exhaustive()
    }
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.node_id > SnowflakeId::MAX_NODE_ID {
            bail!(
                "NODE_ID ({}) exceeds the node id space (max = {})",
                args.node_id,
                SnowflakeId::MAX_NODE_ID
            );
        }

        if args.jwt_secret.is_empty() {
            bail!("JWT_SECRET must not be empty");
        }

        if args.database_max_connections == 0 {
            bail!("DATABASE_MAX_CONNECTIONS must be greater than 0");
        }

        if args.cache_write_workers == 0 {
            bail!("CACHE_WRITE_WORKERS must be greater than 0");
        }

        if args.cache_write_queue == 0 {
            bail!("CACHE_WRITE_QUEUE must be greater than 0");
        }

        if args.stream_buffer_size == 0 {
            bail!("STREAM_BUFFER_SIZE must be greater than 0");
        }

        Ok(Self {
            server_addr: args.server_addr,
            uds: args.uds,
            node_id: args.node_id,
            database_url: args.database_url,
            database_max_connections: args.database_max_connections,
            redis_url: args.redis_url,
            jwt_secret: args.jwt_secret,
            stream_buffer_size: args.stream_buffer_size,
            cache_writer: CacheWriterConfig {
                workers: args.cache_write_workers,
                queue_capacity: args.cache_write_queue,
                drain_timeout: Duration::from_secs(args.shutdown_timeout),
            },
        })
    }
}
