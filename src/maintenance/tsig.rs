use tracing::{error, info};

use super::{MaintenanceError, ZoneMaintainer};
use crate::powerdns::types::{PdnsTsigKey, PdnsZone};
use crate::validation::strip_trailing_dot;

const TSIG_KEY_ALGORITHM: &str = "hmac-sha256";
const TSIG_ALLOW_AXFR: &str = "TSIG-ALLOW-AXFR";

pub(super) fn tsig_key_name(zone_name: &str) -> String {
    format!("{}-tsig", strip_trailing_dot(zone_name))
}

impl ZoneMaintainer {
    /// Make sure the zone's AXFR key exists and tell the operator if the zone does not use it yet.
    ///
    /// Wiring the key into `TSIG-ALLOW-AXFR` and onto the secondaries is left to a human; a
    /// missing entry is logged with instructions and does not count as a failure.
    pub(super) async fn check_tsig(&self, zone: &PdnsZone) -> Result<(), MaintenanceError> {
        let key_name = tsig_key_name(&zone.name);

        match self.api.get_tsig_key(&key_name).await {
            Ok(_) => {}
            Err(err) if err.is_not_found() => {
                info!(zone = %zone.name, key = %key_name, "creating TSIG key");
                self.api
                    .create_tsig_key(&PdnsTsigKey {
                        id: None,
                        name: key_name.clone(),
                        algorithm: TSIG_KEY_ALGORITHM.to_string(),
                        key: None,
                    })
                    .await?;
            }
            Err(err) => return Err(err.into()),
        }
        info!(
            zone = %zone.name,
            key = %key_name,
            "TSIG key ({TSIG_KEY_ALGORITHM}) is available for AXFR replication; retrieve it with \
             'pdnsutil list-tsig-keys' and install it on the secondary servers"
        );

        let allowed = match self.api.get_metadata(&zone.id, TSIG_ALLOW_AXFR).await {
            Ok(metadata) => metadata.metadata.contains(&key_name),
            Err(err) if err.is_not_found() => false,
            Err(err) => return Err(err.into()),
        };
        if allowed {
            info!(zone = %zone.name, key = %key_name, "zone is ready for TSIG-authenticated AXFR");
        } else {
            error!(
                zone = %zone.name,
                key = %key_name,
                "zone is not configured for AXFR with its TSIG key; run 'pdnsutil activate-tsig-key {} {} primary'",
                strip_trailing_dot(&zone.name),
                key_name
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{GOOD_SOA, harness};
    use super::*;
    use crate::powerdns::types::PdnsMetadata;
    use crate::powerdns::ZoneApi;

    #[test]
    fn key_name_is_derived_from_zone() {
        assert_eq!(tsig_key_name("Test."), "test-tsig");
    }

    #[tokio::test]
    async fn creates_missing_key_once() {
        let h = harness(false, true);
        let zone = h.api.add_zone("test.", GOOD_SOA, &["a.nic.test.", "b.nic.test."]);

        h.maintainer.check_tsig(&zone).await.unwrap();
        h.maintainer.check_tsig(&zone).await.unwrap();

        assert_eq!(h.api.calls("create_tsig_key"), 1);
        let key = h.api.state().tsig_keys["test-tsig"].clone();
        assert_eq!(key.algorithm, "hmac-sha256");
        assert_eq!(key.key, None);
    }

    #[tokio::test]
    async fn existing_axfr_metadata_is_accepted() {
        let h = harness(false, true);
        let zone = h.api.add_zone("test.", GOOD_SOA, &["a.nic.test.", "b.nic.test."]);
        h.api
            .create_metadata(
                "test.",
                &PdnsMetadata {
                    kind: "TSIG-ALLOW-AXFR".into(),
                    metadata: vec!["test-tsig".into()],
                },
            )
            .await
            .unwrap();

        h.maintainer.check_tsig(&zone).await.unwrap();
        assert_eq!(h.api.calls("get_metadata"), 1);
    }

    #[tokio::test]
    async fn backend_errors_surface() {
        let h = harness(false, true);
        let zone = h.api.add_zone("test.", GOOD_SOA, &["a.nic.test.", "b.nic.test."]);
        h.api.fail_on("get_tsig_key");
        assert!(h.maintainer.check_tsig(&zone).await.is_err());
        assert_eq!(h.api.calls("create_tsig_key"), 0);
    }
}
