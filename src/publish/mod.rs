//! Publish orchestration: validate a batch's shard, lock it, hand its names to a writer and
//! decide what happens when the commit fails.
pub mod batch;
pub mod notify;

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::config::PublishConfig;
use crate::lock::{HeldLease, LockError, LockManager, publish_lock_name};
use crate::metrics::{ActionStatus, CommitStatus, Metrics, PublishStatus};
use crate::queue::{QueueError, TaskQueue};
use crate::registry::{RegistryError, RegistryStore};
use crate::validation::{is_strictly_under, strip_trailing_dot};
use crate::writer::{WriterError, WriterRegistry};
use batch::{PublishBatch, resolve_shard};
use notify::FailureNotifier;

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("publish lock '{name}' for {tld} is held elsewhere")]
    LockUnavailable { tld: String, name: String },
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error("commit failed on attempt {attempt}: {source}")]
    Commit {
        attempt: u32,
        #[source]
        source: WriterError,
    },
    #[error("failed to re-enqueue batch: {0}")]
    Requeue(#[from] QueueError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishCounts {
    pub accepted: u64,
    pub rejected: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequeueReason {
    BadShard,
    UnknownWriter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Succeeded {
        domains: PublishCounts,
        hosts: PublishCounts,
    },
    /// Names went back through the refresh path; the delivery itself is done.
    Requeued(RequeueReason),
    /// Two smaller batches were enqueued in place of this one.
    Split,
    /// Gave up; the registrar has been told.
    PermanentlyFailed,
}

/// Retry policy; thresholds count queue deliveries.
#[derive(Debug, Clone)]
pub struct PublishSettings {
    pub lock_lease: Duration,
    /// Processing still running after this is abandoned, before the lease can lapse.
    pub processing_deadline: Duration,
    pub retries_before_split: u32,
    pub retries_before_permanent_failure: u32,
}

impl From<&PublishConfig> for PublishSettings {
    fn from(config: &PublishConfig) -> Self {
        Self {
            lock_lease: config.lock_lease(),
            processing_deadline: config.processing_deadline(),
            retries_before_split: config.retries_before_split,
            retries_before_permanent_failure: config.retries_before_permanent_failure,
        }
    }
}

pub struct Publisher {
    registry: Arc<dyn RegistryStore>,
    writers: WriterRegistry,
    locks: Arc<dyn LockManager>,
    queue: Arc<dyn TaskQueue>,
    notifier: FailureNotifier,
    metrics: Arc<Metrics>,
    clock: Arc<dyn Clock>,
    settings: PublishSettings,
}

impl Publisher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<dyn RegistryStore>,
        writers: WriterRegistry,
        locks: Arc<dyn LockManager>,
        queue: Arc<dyn TaskQueue>,
        notifier: FailureNotifier,
        metrics: Arc<Metrics>,
        clock: Arc<dyn Clock>,
        settings: PublishSettings,
    ) -> Self {
        Self {
            registry,
            writers,
            locks,
            queue,
            notifier,
            metrics,
            clock,
            settings,
        }
    }

    /// Process one delivery of `batch`; `attempt` is the queue's retry count (0 on first delivery).
    ///
    /// An `Err` asks the queue to deliver the same batch again.
    pub async fn publish(
        &self,
        batch: &PublishBatch,
        attempt: u32,
    ) -> Result<PublishOutcome, PublishError> {
        let tld = strip_trailing_dot(&batch.tld);
        let configured = self.registry.publish_shard_count(&tld).await?;
        let shard = match resolve_shard(batch.lock_index, batch.num_locks) {
            Ok(shard) if Some(shard.count) == configured => shard,
            Ok(shard) => {
                warn!(
                    %tld, lock_index = shard.index, num_locks = shard.count, ?configured,
                    "stale publish shard count, requeueing names"
                );
                return self.requeue(batch, &tld, RequeueReason::BadShard).await;
            }
            Err(err) => {
                warn!(%tld, "invalid publish shard: {err}, requeueing names");
                return self.requeue(batch, &tld, RequeueReason::BadShard).await;
            }
        };

        let lock_name = publish_lock_name(shard.index, shard.count);
        let Some(handle) = self
            .locks
            .try_acquire(&tld, &lock_name, self.settings.lock_lease)
            .await?
        else {
            warn!(%tld, lock = %lock_name, "publish lock unavailable");
            self.record_action(batch, &tld, ActionStatus::LockFailure);
            return Err(PublishError::LockUnavailable {
                tld,
                name: lock_name,
            });
        };

        let lease = HeldLease::new(self.locks.clone(), handle);
        let deadline = self.settings.processing_deadline;
        let result = match tokio::time::timeout(deadline, self.process(batch, &tld, attempt)).await
        {
            Ok(result) => result,
            Err(_) => {
                warn!(%tld, lock = %lock_name, attempt, "publish exceeded {deadline:?}, abandoning it");
                self.record_action(batch, &tld, ActionStatus::CommitFailure);
                Err(PublishError::Commit {
                    attempt,
                    source: WriterError::TimedOut(deadline),
                })
            }
        };
        if let Err(err) = lease.release().await {
            warn!(%tld, lock = %lock_name, "failed to release publish lock: {err}");
        }

        match result {
            Err(PublishError::Commit { source, .. }) => {
                self.handle_commit_failure(batch, attempt, source).await
            }
            other => other,
        }
    }

    async fn process(
        &self,
        batch: &PublishBatch,
        tld: &str,
        attempt: u32,
    ) -> Result<PublishOutcome, PublishError> {
        let Some(mut writer) = self.writers.create(&batch.writer, tld) else {
            warn!(%tld, writer = %batch.writer, "unknown DNS writer, requeueing names");
            return self.requeue(batch, tld, RequeueReason::UnknownWriter).await;
        };

        let mut domains = PublishCounts::default();
        for domain in &batch.domains {
            if is_strictly_under(domain, tld) {
                writer.publish_domain(domain);
                domains.accepted += 1;
            } else {
                warn!(%tld, %domain, "rejecting domain outside the TLD");
                domains.rejected += 1;
            }
        }
        let mut hosts = PublishCounts::default();
        for host in &batch.hosts {
            if is_strictly_under(host, tld) {
                writer.publish_host(host);
                hosts.accepted += 1;
            } else {
                warn!(%tld, %host, "rejecting host outside the TLD");
                hosts.rejected += 1;
            }
        }
        self.metrics
            .publish_domain_requests(tld, PublishStatus::Accepted, domains.accepted);
        self.metrics
            .publish_domain_requests(tld, PublishStatus::Rejected, domains.rejected);
        self.metrics
            .publish_host_requests(tld, PublishStatus::Accepted, hosts.accepted);
        self.metrics
            .publish_host_requests(tld, PublishStatus::Rejected, hosts.rejected);

        let started = self.clock.now();
        let committed = writer.commit().await;
        let elapsed = self.clock.now() - started;

        match committed {
            Ok(()) => {
                self.metrics
                    .record_commit(tld, &batch.writer, CommitStatus::Success, elapsed);
                self.record_action(batch, tld, ActionStatus::Success);
                info!(
                    %tld, writer = %batch.writer, attempt,
                    domains_accepted = domains.accepted, domains_rejected = domains.rejected,
                    hosts_accepted = hosts.accepted, hosts_rejected = hosts.rejected,
                    commit_ms = elapsed.num_milliseconds(),
                    "published batch"
                );
                Ok(PublishOutcome::Succeeded { domains, hosts })
            }
            Err(source) => {
                self.metrics
                    .record_commit(tld, &batch.writer, CommitStatus::Failure, elapsed);
                self.record_action(batch, tld, ActionStatus::CommitFailure);
                Err(PublishError::Commit { attempt, source })
            }
        }
    }

    async fn handle_commit_failure(
        &self,
        batch: &PublishBatch,
        attempt: u32,
        source: WriterError,
    ) -> Result<PublishOutcome, PublishError> {
        let tld = strip_trailing_dot(&batch.tld);
        if attempt < self.settings.retries_before_split {
            warn!(%tld, attempt, "commit failed, leaving batch for redelivery: {source}");
            return Err(PublishError::Commit { attempt, source });
        }

        if batch.can_split() {
            let [first, second] = batch.split(self.clock.now());
            warn!(
                %tld, attempt, items = batch.item_count(),
                "commit keeps failing, splitting batch: {source}"
            );
            self.queue.enqueue(&first).await?;
            self.queue.enqueue(&second).await?;
            return Ok(PublishOutcome::Split);
        }

        if attempt < self.settings.retries_before_permanent_failure {
            warn!(%tld, attempt, "commit of single item failed: {source}");
            return Err(PublishError::Commit { attempt, source });
        }

        error!(
            %tld, attempt, domains = ?batch.domains, hosts = ?batch.hosts,
            "giving up on publishing after {attempt} attempts: {source}"
        );
        self.notifier.notify(batch).await;
        self.record_action(batch, &tld, ActionStatus::MaxRetriesExceeded);
        Ok(PublishOutcome::PermanentlyFailed)
    }

    async fn requeue(
        &self,
        batch: &PublishBatch,
        tld: &str,
        reason: RequeueReason,
    ) -> Result<PublishOutcome, PublishError> {
        let status = match reason {
            RequeueReason::BadShard => ActionStatus::BadLockIndex,
            RequeueReason::UnknownWriter => ActionStatus::BadWriter,
        };
        self.record_action(batch, tld, status);
        self.registry
            .request_refresh(&batch.domains, &batch.hosts, self.clock.now())
            .await?;
        Ok(PublishOutcome::Requeued(reason))
    }

    fn record_action(&self, batch: &PublishBatch, tld: &str, status: ActionStatus) {
        let now = self.clock.now();
        self.metrics.record_action(
            tld,
            &batch.writer,
            status,
            now - batch.items_created_at,
            now - batch.enqueued_at,
        );
    }
}
