//! Cross-process job locks
//!
//! Postgres advisory locks keyed by job kind. The lock is session-scoped
//! and lives on a dedicated pool connection held for the duration of the
//! job, so a crashed process releases its lock when the connection drops.

use async_trait::async_trait;
use renta_core::{traits::JobCoordinator, AppError, AppResult};
use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

/// PostgreSQL implementation of JobCoordinator
pub struct PgJobCoordinator {
    pool: PgPool,
    /// Connections holding an advisory lock, keyed by lock key. Advisory
    /// locks must be released on the connection that took them.
    held: Mutex<HashMap<i64, PoolConnection<Postgres>>>,
}

impl PgJobCoordinator {
    /// Create a new job coordinator
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            held: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl JobCoordinator for PgJobCoordinator {
    async fn try_acquire(&self, key: i64) -> AppResult<bool> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            error!("Failed to acquire connection for job lock {}: {}", key, e);
            AppError::Pool(format!("Failed to acquire connection: {}", e))
        })?;

        let (locked,): (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
            .bind(key)
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| {
                error!("Failed to take advisory lock {}: {}", key, e);
                AppError::Database(format!("Failed to take advisory lock: {}", e))
            })?;

        if locked {
            debug!("Acquired advisory lock {}", key);
            self.held.lock().await.insert(key, conn);
        }
        Ok(locked)
    }

    async fn release(&self, key: i64) -> AppResult<()> {
        let Some(mut conn) = self.held.lock().await.remove(&key) else {
            warn!("Release of advisory lock {} that is not held", key);
            return Ok(());
        };

        sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(key)
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                error!("Failed to release advisory lock {}: {}", key, e);
                AppError::Database(format!("Failed to release advisory lock: {}", e))
            })?;

        debug!("Released advisory lock {}", key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_lock_excludes_second_holder() {
        let url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgresql://localhost/renta_ledger".to_string());
        let pool = PgPool::connect(&url).await.unwrap();

        // Two coordinators stand in for two batch processes
        let a = PgJobCoordinator::new(pool.clone());
        let b = PgJobCoordinator::new(pool.clone());

        assert!(a.try_acquire(990001).await.unwrap());
        assert!(!b.try_acquire(990001).await.unwrap());

        a.release(990001).await.unwrap();
        assert!(b.try_acquire(990001).await.unwrap());
        b.release(990001).await.unwrap();
    }
}
