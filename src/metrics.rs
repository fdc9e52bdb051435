//! Prometheus metrics for the publish pipeline.
//!
//! Families mirror the publish statistics log lines: per-TLD request counts, per-writer action and
//! commit outcomes, latency histograms, and counters for the best-effort zone maintenance checks.
use std::fmt::{self, Write};

use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue, LabelValueEncoder};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::{Registry, Unit};

const PROMETHEUS_PREFIX: &str = "tldpush";

//------------ Label values ---------------------------------------------------

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum PublishStatus {
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum ActionStatus {
    Success,
    CommitFailure,
    LockFailure,
    BadLockIndex,
    BadWriter,
    MaxRetriesExceeded,
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum CommitStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum MaintenanceCheck {
    Soa,
    Ns,
    Tsig,
    Dnssec,
}

impl PublishStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PublishStatus::Accepted => "accepted",
            PublishStatus::Rejected => "rejected",
        }
    }
}

impl ActionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionStatus::Success => "success",
            ActionStatus::CommitFailure => "commit_failure",
            ActionStatus::LockFailure => "lock_failure",
            ActionStatus::BadLockIndex => "bad_lock_index",
            ActionStatus::BadWriter => "bad_writer",
            ActionStatus::MaxRetriesExceeded => "max_retries_exceeded",
        }
    }
}

impl CommitStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CommitStatus::Success => "success",
            CommitStatus::Failure => "failure",
        }
    }
}

impl MaintenanceCheck {
    pub fn as_str(self) -> &'static str {
        match self {
            MaintenanceCheck::Soa => "soa",
            MaintenanceCheck::Ns => "ns",
            MaintenanceCheck::Tsig => "tsig",
            MaintenanceCheck::Dnssec => "dnssec",
        }
    }
}

macro_rules! label_value {
    ($($ty:ty),*) => {
        $(
            impl EncodeLabelValue for $ty {
                fn encode(&self, encoder: &mut LabelValueEncoder) -> Result<(), fmt::Error> {
                    encoder.write_str(self.as_str())
                }
            }

            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(self.as_str())
                }
            }
        )*
    };
}

label_value!(PublishStatus, ActionStatus, CommitStatus, MaintenanceCheck);

//------------ Label sets -----------------------------------------------------

#[derive(Debug, Clone, Hash, PartialEq, Eq, EncodeLabelSet)]
struct TldStatusLabels {
    tld: String,
    status: PublishStatus,
}

#[derive(Debug, Clone, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ActionLabels {
    tld: String,
    writer: String,
    status: ActionStatus,
}

#[derive(Debug, Clone, Hash, PartialEq, Eq, EncodeLabelSet)]
struct CommitLabels {
    tld: String,
    writer: String,
    status: CommitStatus,
}

#[derive(Debug, Clone, Hash, PartialEq, Eq, EncodeLabelSet)]
struct WriterLabels {
    tld: String,
    writer: String,
}

#[derive(Debug, Clone, Hash, PartialEq, Eq, EncodeLabelSet)]
struct CheckLabels {
    check: MaintenanceCheck,
}

type HistogramFamily = Family<WriterLabels, Histogram, fn() -> Histogram>;

fn latency_histogram() -> Histogram {
    // 50ms .. ~7 minutes
    Histogram::new(exponential_buckets(0.05, 2.0, 14))
}

fn age_histogram() -> Histogram {
    // 1s .. ~9 hours
    Histogram::new(exponential_buckets(1.0, 2.0, 16))
}

fn seconds(d: chrono::Duration) -> f64 {
    d.num_milliseconds().max(0) as f64 / 1000.0
}

//------------ Metrics --------------------------------------------------------

#[derive(Debug)]
pub struct Metrics {
    registry: Registry,
    domain_requests: Family<TldStatusLabels, Counter>,
    host_requests: Family<TldStatusLabels, Counter>,
    actions: Family<ActionLabels, Counter>,
    commits: Family<CommitLabels, Counter>,
    commit_duration: HistogramFamily,
    item_age: HistogramFamily,
    queue_delay: HistogramFamily,
    maintenance_failures: Family<CheckLabels, Counter>,
    rectify_failures: Counter,
}

impl Metrics {
    pub fn new() -> Self {
        let mut metrics = Self {
            registry: Registry::with_prefix(PROMETHEUS_PREFIX),
            domain_requests: Family::default(),
            host_requests: Family::default(),
            actions: Family::default(),
            commits: Family::default(),
            commit_duration: Family::new_with_constructor(latency_histogram),
            item_age: Family::new_with_constructor(age_histogram),
            queue_delay: Family::new_with_constructor(age_histogram),
            maintenance_failures: Family::default(),
            rectify_failures: Counter::default(),
        };

        let reg = &mut metrics.registry;
        reg.register(
            "publish_domain_requests",
            "Domains staged for publishing, by whether they belong to the batch TLD",
            metrics.domain_requests.clone(),
        );
        reg.register(
            "publish_host_requests",
            "Hosts staged for publishing, by whether they belong to the batch TLD",
            metrics.host_requests.clone(),
        );
        reg.register(
            "publish_actions",
            "Outcomes of publish batch deliveries",
            metrics.actions.clone(),
        );
        reg.register(
            "publish_commits",
            "Writer commit attempts",
            metrics.commits.clone(),
        );
        reg.register_with_unit(
            "publish_commit_duration",
            "Time spent staging and committing a batch",
            Unit::Seconds,
            metrics.commit_duration.clone(),
        );
        reg.register_with_unit(
            "publish_item_age",
            "Time since the underlying refresh requests were created",
            Unit::Seconds,
            metrics.item_age.clone(),
        );
        reg.register_with_unit(
            "publish_queue_delay",
            "Time since the batch was enqueued",
            Unit::Seconds,
            metrics.queue_delay.clone(),
        );
        reg.register(
            "zone_maintenance_failures",
            "Failed best-effort zone maintenance checks",
            metrics.maintenance_failures.clone(),
        );
        reg.register(
            "dnssec_rectify_failures",
            "Failed zone rectifications after enabling DNSSEC",
            metrics.rectify_failures.clone(),
        );

        metrics
    }

    pub fn publish_domain_requests(&self, tld: &str, status: PublishStatus, count: u64) {
        self.domain_requests
            .get_or_create(&TldStatusLabels {
                tld: tld.to_string(),
                status,
            })
            .inc_by(count);
    }

    pub fn publish_host_requests(&self, tld: &str, status: PublishStatus, count: u64) {
        self.host_requests
            .get_or_create(&TldStatusLabels {
                tld: tld.to_string(),
                status,
            })
            .inc_by(count);
    }

    /// Count one batch outcome and record how old its items are.
    pub fn record_action(
        &self,
        tld: &str,
        writer: &str,
        status: ActionStatus,
        item_age: chrono::Duration,
        queue_delay: chrono::Duration,
    ) {
        self.actions
            .get_or_create(&ActionLabels {
                tld: tld.to_string(),
                writer: writer.to_string(),
                status,
            })
            .inc();
        let labels = WriterLabels {
            tld: tld.to_string(),
            writer: writer.to_string(),
        };
        self.item_age
            .get_or_create(&labels)
            .observe(seconds(item_age));
        self.queue_delay
            .get_or_create(&labels)
            .observe(seconds(queue_delay));
    }

    pub fn record_commit(
        &self,
        tld: &str,
        writer: &str,
        status: CommitStatus,
        duration: chrono::Duration,
    ) {
        self.commits
            .get_or_create(&CommitLabels {
                tld: tld.to_string(),
                writer: writer.to_string(),
                status,
            })
            .inc();
        self.commit_duration
            .get_or_create(&WriterLabels {
                tld: tld.to_string(),
                writer: writer.to_string(),
            })
            .observe(seconds(duration));
    }

    pub fn maintenance_failure(&self, check: MaintenanceCheck) {
        self.maintenance_failures
            .get_or_create(&CheckLabels { check })
            .inc();
    }

    pub fn rectify_failure(&self) {
        self.rectify_failures.inc();
    }

    pub fn action_count(&self, tld: &str, writer: &str, status: ActionStatus) -> u64 {
        self.actions
            .get_or_create(&ActionLabels {
                tld: tld.to_string(),
                writer: writer.to_string(),
                status,
            })
            .get()
    }

    pub fn domain_request_count(&self, tld: &str, status: PublishStatus) -> u64 {
        self.domain_requests
            .get_or_create(&TldStatusLabels {
                tld: tld.to_string(),
                status,
            })
            .get()
    }

    pub fn maintenance_failure_count(&self, check: MaintenanceCheck) -> u64 {
        self.maintenance_failures
            .get_or_create(&CheckLabels { check })
            .get()
    }

    pub fn rectify_failure_count(&self) -> u64 {
        self.rectify_failures.get()
    }

    /// OpenMetrics text exposition of every registered family.
    pub fn encode(&self) -> Result<String, fmt::Error> {
        let mut buffer = String::new();
        encode(&mut buffer, &self.registry)?;
        Ok(buffer)
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exposition_uses_prefix_and_snake_case_labels() {
        let metrics = Metrics::new();
        metrics.record_action(
            "test",
            "PowerDnsWriter",
            ActionStatus::CommitFailure,
            chrono::Duration::seconds(30),
            chrono::Duration::seconds(2),
        );
        metrics.maintenance_failure(MaintenanceCheck::Dnssec);

        let text = metrics.encode().unwrap();
        assert!(text.contains(
            r#"tldpush_publish_actions_total{tld="test",writer="PowerDnsWriter",status="commit_failure"} 1"#
        ));
        assert!(text.contains(r#"tldpush_zone_maintenance_failures_total{check="dnssec"} 1"#));
        assert!(text.contains("tldpush_publish_item_age_seconds_bucket"));
        assert_eq!(
            metrics.action_count("test", "PowerDnsWriter", ActionStatus::CommitFailure),
            1
        );
    }
}
