use tracing::{info, warn};

use super::{MaintenanceError, ZoneMaintainer};
use crate::powerdns::types::PdnsZone;
use crate::validation::strip_trailing_dot;

impl ZoneMaintainer {
    /// Rewrite the SOA when its MNAME/RNAME prefix drifted from configuration, keeping the serial.
    pub(super) async fn check_soa(&self, zone: &PdnsZone) -> Result<(), MaintenanceError> {
        let prefix = format!(
            "{} {} ",
            self.defaults.primary_nameserver, self.defaults.soa_contact
        );
        let current = zone
            .apex_rrset("SOA")
            .and_then(|rr| rr.records.first())
            .map(|r| r.content.as_str());
        if current.is_some_and(|content| content.starts_with(&prefix)) {
            info!(zone = %zone.name, "SOA record is valid");
            return Ok(());
        }

        warn!(zone = %zone.name, current = ?current, "updating SOA record");
        let serial = zone.serial.unwrap_or(1);
        let rrset = self.defaults.soa_rrset(&zone.name, serial);
        self.api.patch_zone(&zone.id, &[rrset]).await?;
        info!(zone = %zone.name, serial, "updated SOA record");
        Ok(())
    }

    /// Rewrite the apex NS set when it differs, in order, from the configured root nameservers.
    pub(super) async fn check_ns(&self, zone: &PdnsZone) -> Result<(), MaintenanceError> {
        let existing: Vec<String> = zone
            .apex_rrset("NS")
            .map(|rr| {
                rr.records
                    .iter()
                    .map(|r| strip_trailing_dot(&r.content))
                    .collect()
            })
            .unwrap_or_default();
        let expected: Vec<String> = self
            .defaults
            .root_nameservers
            .iter()
            .map(|ns| strip_trailing_dot(ns))
            .collect();
        if existing == expected {
            info!(zone = %zone.name, "NS records are valid");
            return Ok(());
        }

        warn!(zone = %zone.name, ?existing, ?expected, "updating NS records");
        let rrset = self.defaults.ns_rrset(&zone.name);
        self.api.patch_zone(&zone.id, &[rrset]).await?;
        info!(zone = %zone.name, "updated NS records");
        Ok(())
    }
}
