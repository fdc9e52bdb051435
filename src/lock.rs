//! Named leases that serialize publishing per (TLD, shard).
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("lock database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Proof of a held lease. Releasing a handle whose lease was taken over is a no-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHandle {
    pub resource: String,
    pub name: String,
    pub owner: String,
}

#[async_trait]
pub trait LockManager: Send + Sync {
    /// Take the lease if it is free or expired. `Ok(None)` means somebody else holds it.
    async fn try_acquire(
        &self,
        resource: &str,
        name: &str,
        lease: Duration,
    ) -> Result<Option<LockHandle>, LockError>;

    async fn release(&self, handle: &LockHandle) -> Result<(), LockError>;
}

/// A held lease that goes back to its manager even when the holder is cancelled.
///
/// [`HeldLease::release`] is the normal path. Dropping an unreleased guard hands the release to
/// the runtime so that an aborted request does not keep the shard locked until the lease runs out.
pub struct HeldLease {
    locks: Arc<dyn LockManager>,
    handle: Option<LockHandle>,
}

impl HeldLease {
    pub fn new(locks: Arc<dyn LockManager>, handle: LockHandle) -> Self {
        Self {
            locks,
            handle: Some(handle),
        }
    }

    pub async fn release(mut self) -> Result<(), LockError> {
        match self.handle.take() {
            Some(handle) => self.locks.release(&handle).await,
            None => Ok(()),
        }
    }
}

impl Drop for HeldLease {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(
                resource = %handle.resource, lock = %handle.name,
                "no runtime to release abandoned lease, leaving it to expire"
            );
            return;
        };
        let locks = self.locks.clone();
        runtime.spawn(async move {
            if let Err(err) = locks.release(&handle).await {
                warn!(
                    resource = %handle.resource, lock = %handle.name,
                    "failed to release abandoned lease: {err}"
                );
            }
        });
    }
}

/// Lock name for one publish shard of a TLD.
pub fn publish_lock_name(lock_index: u32, num_locks: u32) -> String {
    format!("DNS updates-lock {lock_index} of {num_locks}")
}
