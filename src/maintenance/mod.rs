//! Best-effort hygiene for TLD zones, run whenever a zone id is resolved from the backend.
//!
//! Every check is independent. A failing check is logged and counted, and never stops the other
//! checks or the publish that triggered the pass.
mod dnssec;
mod records;
mod tsig;

use std::sync::Arc;

use tracing::{info, warn};

pub use dnssec::RotationState;

use crate::clock::Clock;
use crate::config::PowerDnsConfig;
use crate::metrics::{MaintenanceCheck, Metrics};
use crate::powerdns::types::{PdnsRrset, PdnsZone};
use crate::powerdns::{PdnsError, ZoneApi};
use crate::validation::normalize_fqdn;

#[derive(Debug, thiserror::Error)]
pub enum MaintenanceError {
    #[error(transparent)]
    Backend(#[from] PdnsError),
    #[error("{0}")]
    Inconsistent(String),
}

/// What every TLD zone is expected to look like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneDefaults {
    pub primary_nameserver: String,
    pub soa_contact: String,
    pub root_nameservers: Vec<String>,
    pub default_ttl: u32,
    pub dnssec_enabled: bool,
    pub tsig_enabled: bool,
}

impl From<&PowerDnsConfig> for ZoneDefaults {
    fn from(config: &PowerDnsConfig) -> Self {
        Self {
            primary_nameserver: normalize_fqdn(config.primary_nameserver()),
            soa_contact: normalize_fqdn(&config.soa_contact),
            root_nameservers: config
                .root_nameservers
                .iter()
                .map(|ns| normalize_fqdn(ns))
                .collect(),
            default_ttl: config.default_zone_ttl,
            dnssec_enabled: config.dnssec_enabled,
            tsig_enabled: config.tsig_enabled,
        }
    }
}

impl ZoneDefaults {
    /// Apex SOA RRSet carrying the given serial.
    pub fn soa_rrset(&self, zone_name: &str, serial: u32) -> PdnsRrset {
        let content = format!(
            "{} {} {} 900 1800 6048000 {}",
            self.primary_nameserver, self.soa_contact, serial, self.default_ttl
        );
        PdnsRrset::replace(&normalize_fqdn(zone_name), "SOA", self.default_ttl, &[content])
    }

    /// Apex NS RRSet listing the root nameservers in configured order.
    pub fn ns_rrset(&self, zone_name: &str) -> PdnsRrset {
        PdnsRrset::replace(
            &normalize_fqdn(zone_name),
            "NS",
            self.default_ttl,
            &self.root_nameservers,
        )
    }
}

pub struct ZoneMaintainer {
    api: Arc<dyn ZoneApi>,
    clock: Arc<dyn Clock>,
    metrics: Arc<Metrics>,
    defaults: ZoneDefaults,
}

impl ZoneMaintainer {
    pub fn new(
        api: Arc<dyn ZoneApi>,
        clock: Arc<dyn Clock>,
        metrics: Arc<Metrics>,
        defaults: ZoneDefaults,
    ) -> Self {
        Self {
            api,
            clock,
            metrics,
            defaults,
        }
    }

    pub fn defaults(&self) -> &ZoneDefaults {
        &self.defaults
    }

    /// Run every check against the full zone detail. Never fails.
    pub async fn run(&self, zone: &PdnsZone) {
        info!(zone = %zone.name, "validating zone configuration");

        let soa = self.check_soa(zone).await;
        self.settle(zone, MaintenanceCheck::Soa, soa);

        let ns = self.check_ns(zone).await;
        self.settle(zone, MaintenanceCheck::Ns, ns);

        if self.defaults.tsig_enabled {
            let tsig = self.check_tsig(zone).await;
            self.settle(zone, MaintenanceCheck::Tsig, tsig);
        }

        if self.defaults.dnssec_enabled {
            let dnssec = self.check_dnssec(zone).await;
            self.settle(zone, MaintenanceCheck::Dnssec, dnssec);
        }
    }

    fn settle(&self, zone: &PdnsZone, check: MaintenanceCheck, result: Result<(), MaintenanceError>) {
        if let Err(err) = result {
            warn!(zone = %zone.name, %check, "zone maintenance check failed: {err}");
            self.metrics.maintenance_failure(check);
        }
    }
}
