//! DNSSEC bootstrap and ZSK rollover.
//!
//! Rollover state lives in the zone's `account` field on the backend, as
//! `ZSK-EXPIRE:<unix-millis>` or `ZSK-ACTIVATE:<unix-millis>`. Inside the crate it is a
//! [`RotationState`]; the string form only exists at the backend boundary.
//!
//! ```text
//!   (unsigned) --enable--> PendingExpiry(now + 30d)
//!   PendingExpiry(t),     now >= t: publish inactive ZSK --> PendingActivation(now + 2*ttl)
//!   PendingActivation(t), now >= t: activate new ZSK, drop old --> PendingExpiry(now + 30d)
//! ```
use chrono::{DateTime, Duration, Utc};
use tracing::{error, info, warn};

use super::{MaintenanceError, ZoneMaintainer};
use crate::powerdns::types::{KeyType, PdnsCryptokey, PdnsMetadata, PdnsZone, PdnsZoneSettings};

const DNSSEC_ALGORITHM: &str = "rsasha256";
const DNSSEC_SOA_EDIT: &str = "INCREMENT-WEEKS";
const DNSSEC_KSK_BITS: u32 = 2048;
const DNSSEC_ZSK_BITS: u32 = 1024;
const ZSK_LIFETIME_DAYS: i64 = 30;

const EXPIRE_TAG: &str = "ZSK-EXPIRE:";
const ACTIVATE_TAG: &str = "ZSK-ACTIVATE:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationState {
    /// No recognizable tag; a signed zone in this state gets tagged with a fresh expiry.
    NoRotationPending,
    /// The active ZSK should be replaced once `at` has passed.
    PendingExpiry { at: DateTime<Utc> },
    /// A new ZSK is published but inactive; switch to it once `at` has passed.
    PendingActivation { at: DateTime<Utc> },
}

impl RotationState {
    /// Parse the backend `account` field. Anything unrecognized is `NoRotationPending`.
    pub fn from_account(account: Option<&str>) -> Self {
        let Some(account) = account.map(str::trim) else {
            return RotationState::NoRotationPending;
        };
        let parse = |millis: &str| {
            millis
                .parse::<i64>()
                .ok()
                .and_then(DateTime::from_timestamp_millis)
        };
        if let Some(at) = account.strip_prefix(EXPIRE_TAG).and_then(parse) {
            RotationState::PendingExpiry { at }
        } else if let Some(at) = account.strip_prefix(ACTIVATE_TAG).and_then(parse) {
            RotationState::PendingActivation { at }
        } else {
            RotationState::NoRotationPending
        }
    }

    /// The `account` value to store for this state.
    pub fn to_account(&self) -> String {
        match self {
            RotationState::NoRotationPending => String::new(),
            RotationState::PendingExpiry { at } => {
                format!("{EXPIRE_TAG}{}", at.timestamp_millis())
            }
            RotationState::PendingActivation { at } => {
                format!("{ACTIVATE_TAG}{}", at.timestamp_millis())
            }
        }
    }
}

fn ds_lines(key: &PdnsCryptokey) -> Vec<String> {
    key.ds.iter().map(|ds| format!("IN DS {ds}")).collect()
}

impl ZoneMaintainer {
    fn zsk_lifetime(&self) -> Duration {
        Duration::days(ZSK_LIFETIME_DAYS)
    }

    /// Time for a newly published ZSK to reach resolvers and secondaries before it signs.
    fn zsk_activation_delay(&self) -> Duration {
        Duration::seconds(2 * i64::from(self.defaults.default_ttl))
    }

    async fn set_rotation(
        &self,
        zone: &PdnsZone,
        state: RotationState,
        api_rectify: Option<bool>,
    ) -> Result<(), MaintenanceError> {
        let settings = PdnsZoneSettings {
            account: Some(state.to_account()),
            api_rectify,
        };
        self.api.update_zone(&zone.id, &settings).await?;
        Ok(())
    }

    pub(super) async fn check_dnssec(&self, zone: &PdnsZone) -> Result<(), MaintenanceError> {
        if !zone.dnssec {
            return self.enable_dnssec(zone).await;
        }

        let keys = self.api.list_cryptokeys(&zone.id).await?;
        let active_ksk = keys.iter().find(|k| k.active && k.keytype == KeyType::Ksk);
        let active_zsk = keys.iter().find(|k| k.active && k.keytype == KeyType::Zsk);
        let (Some(active_ksk), Some(active_zsk)) = (active_ksk, active_zsk) else {
            return Err(MaintenanceError::Inconsistent(format!(
                "zone {} is signed but lacks an active KSK and ZSK",
                zone.name
            )));
        };
        info!(zone = %zone.name, ds = ?ds_lines(active_ksk), "validated KSK and ZSK");

        let now = self.clock.now();
        match RotationState::from_account(zone.account.as_deref()) {
            RotationState::NoRotationPending => {
                let next = RotationState::PendingExpiry {
                    at: now + self.zsk_lifetime(),
                };
                info!(zone = %zone.name, "starting ZSK rotation tracking");
                self.set_rotation(zone, next, None).await
            }
            RotationState::PendingExpiry { at } if now >= at => {
                info!(zone = %zone.name, "ZSK expired, starting rollover");
                let new_zsk = PdnsCryptokey::new(
                    KeyType::Zsk,
                    DNSSEC_ZSK_BITS,
                    false,
                    true,
                    DNSSEC_ALGORITHM,
                );
                self.api.create_cryptokey(&zone.id, &new_zsk).await?;
                let next = RotationState::PendingActivation {
                    at: now + self.zsk_activation_delay(),
                };
                self.set_rotation(zone, next, None).await?;
                info!(zone = %zone.name, "started ZSK rollover");
                Ok(())
            }
            RotationState::PendingExpiry { at } => {
                info!(
                    zone = %zone.name,
                    remaining_secs = (at - now).num_seconds(),
                    "DNSSEC configuration is valid"
                );
                Ok(())
            }
            RotationState::PendingActivation { at } if now >= at => {
                let inactive_zsk = keys
                    .iter()
                    .find(|k| !k.active && k.keytype == KeyType::Zsk);
                let (Some(new_id), Some(old_id)) =
                    (inactive_zsk.and_then(|k| k.id), active_zsk.id)
                else {
                    error!(
                        zone = %zone.name,
                        "cannot find both the active and the inactive ZSK; finish the rollover manually"
                    );
                    return Err(MaintenanceError::Inconsistent(format!(
                        "zone {} is missing a ZSK needed to finish rollover",
                        zone.name
                    )));
                };
                info!(zone = %zone.name, new_id, old_id, "activation window elapsed, switching ZSK");
                self.api.set_cryptokey_active(&zone.id, new_id, true).await?;
                self.api.delete_cryptokey(&zone.id, old_id).await?;
                let next = RotationState::PendingExpiry {
                    at: now + self.zsk_lifetime(),
                };
                self.set_rotation(zone, next, None).await?;
                info!(zone = %zone.name, "completed ZSK rollover");
                Ok(())
            }
            RotationState::PendingActivation { at } => {
                info!(
                    zone = %zone.name,
                    remaining_secs = (at - now).num_seconds(),
                    "ZSK rollover in progress"
                );
                Ok(())
            }
        }
    }

    async fn enable_dnssec(&self, zone: &PdnsZone) -> Result<(), MaintenanceError> {
        info!(zone = %zone.name, "enabling DNSSEC");
        let ksk = self
            .api
            .create_cryptokey(
                &zone.id,
                &PdnsCryptokey::new(KeyType::Ksk, DNSSEC_KSK_BITS, true, true, DNSSEC_ALGORITHM),
            )
            .await?;
        self.api
            .create_cryptokey(
                &zone.id,
                &PdnsCryptokey::new(KeyType::Zsk, DNSSEC_ZSK_BITS, true, true, DNSSEC_ALGORITHM),
            )
            .await?;
        self.api
            .create_metadata(
                &zone.id,
                &PdnsMetadata {
                    kind: "SOA-EDIT".into(),
                    metadata: vec![DNSSEC_SOA_EDIT.into()],
                },
            )
            .await?;

        let next = RotationState::PendingExpiry {
            at: self.clock.now() + self.zsk_lifetime(),
        };
        self.set_rotation(zone, next, Some(true)).await?;

        if let Err(err) = self.api.rectify_zone(&zone.id).await {
            warn!(zone = %zone.name, "failed to rectify zone after enabling DNSSEC: {err}");
            self.metrics.rectify_failure();
        }

        info!(zone = %zone.name, ds = ?ds_lines(&ksk), "enabled DNSSEC; hand the DS records to the parent zone");
        Ok(())
    }
}
