//! Postgres access for the pgmq-backed message queue.
//!
//! Holds the pool, runs migrations (which enable the pgmq extension),
//! and checks liveness. Queue operations live in [`pgmq`].

pub mod pgmq;

use crate::error::{Error, Result};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;
use tracing::info;

pub use pgmq::PgmqQueue;

/// Pool size shared by the poller and its lease renewer.
const MAX_CONNECTIONS: u32 = 5;

pub struct Db {
    pool: PgPool,
}

impl Db {
    /// Connect to Postgres, failing if no connection is available within 10s.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(Duration::from_secs(10))
            .connect(url)
            .await?;
        info!(max_connections = MAX_CONNECTIONS, "database pool ready");
        Ok(Self { pool })
    }

    /// Apply pending migrations from `migrations/`.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Other(format!("migration failed: {e}")))
    }

    /// Run `SELECT 1` against the pool.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }
}
