//! Publish locks as leased rows in the `locks` table.
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand_core::{OsRng, RngCore};
use sqlx::SqlitePool;
use tracing::debug;

use crate::clock::Clock;
use crate::lock::{LockError, LockHandle, LockManager};

/// Random token identifying one acquisition.
fn new_owner_token() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub struct SqliteLockManager {
    db: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteLockManager {
    pub fn new(db: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }
}

#[async_trait]
impl LockManager for SqliteLockManager {
    async fn try_acquire(
        &self,
        resource: &str,
        name: &str,
        lease: Duration,
    ) -> Result<Option<LockHandle>, LockError> {
        let now = self.clock.now().timestamp_millis();
        let lease_ms = i64::try_from(lease.as_millis()).unwrap_or(i64::MAX);
        let owner = new_owner_token();

        // Takes over the row only when its lease has run out.
        let res = sqlx::query(
            r#"
            INSERT INTO locks (resource, name, owner, expires_at) VALUES (?, ?, ?, ?)
            ON CONFLICT (resource, name) DO UPDATE SET
                owner = excluded.owner,
                expires_at = excluded.expires_at
            WHERE locks.expires_at <= ?
            "#,
        )
        .bind(resource)
        .bind(name)
        .bind(&owner)
        .bind(now.saturating_add(lease_ms))
        .bind(now)
        .execute(&self.db)
        .await?;

        if res.rows_affected() == 0 {
            debug!(%resource, %name, "lock is held");
            return Ok(None);
        }
        debug!(%resource, %name, "acquired lock");
        Ok(Some(LockHandle {
            resource: resource.to_string(),
            name: name.to_string(),
            owner,
        }))
    }

    async fn release(&self, handle: &LockHandle) -> Result<(), LockError> {
        let res = sqlx::query("DELETE FROM locks WHERE resource = ? AND name = ? AND owner = ?")
            .bind(&handle.resource)
            .bind(&handle.name)
            .bind(&handle.owner)
            .execute(&self.db)
            .await?;
        if res.rows_affected() == 0 {
            debug!(resource = %handle.resource, name = %handle.name, "lock was already taken over");
        }
        Ok(())
    }
}
