use std::sync::Arc;

use tracing::{info, warn};

use super::cache::ZoneIdCache;
use crate::maintenance::ZoneMaintainer;
use crate::powerdns::types::{PdnsZone, PdnsZoneCreate};
use crate::powerdns::{PdnsError, ZoneApi};
use crate::validation::{normalize_fqdn, strip_trailing_dot};

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("DNS backend unavailable while resolving {zone}: {source}")]
    BackendUnavailable {
        zone: String,
        #[source]
        source: PdnsError,
    },
    #[error("failed to create zone {zone}: {source}")]
    ZoneCreateFailed {
        zone: String,
        #[source]
        source: PdnsError,
    },
}

/// Resolves zone names to backend zone ids, creating missing zones and running zone maintenance
/// whenever a zone is (re)loaded from the backend.
pub struct ZoneDirectory {
    api: Arc<dyn ZoneApi>,
    cache: ZoneIdCache,
    maintainer: ZoneMaintainer,
}

impl ZoneDirectory {
    pub fn new(api: Arc<dyn ZoneApi>, cache: ZoneIdCache, maintainer: ZoneMaintainer) -> Self {
        Self {
            api,
            cache,
            maintainer,
        }
    }

    pub async fn resolve_zone_id(&self, name: &str) -> Result<String, DirectoryError> {
        let zone_name = normalize_fqdn(name);
        self.cache
            .get_or_try_insert_with(&zone_name, || self.load(&zone_name))
            .await
    }

    async fn load(&self, zone_name: &str) -> Result<String, DirectoryError> {
        let unavailable = |source| DirectoryError::BackendUnavailable {
            zone: zone_name.to_string(),
            source,
        };

        let wanted = strip_trailing_dot(zone_name);
        let zones = self.api.list_zones().await.map_err(unavailable)?;
        let zone = match zones
            .into_iter()
            .find(|z| strip_trailing_dot(&z.name) == wanted)
        {
            Some(summary) => self.api.get_zone(&summary.id).await.map_err(unavailable)?,
            None => self.create(zone_name).await?,
        };

        self.maintainer.run(&zone).await;
        info!(zone = %zone_name, id = %zone.id, "resolved zone id");
        Ok(zone.id)
    }

    async fn create(&self, zone_name: &str) -> Result<PdnsZone, DirectoryError> {
        info!(zone = %zone_name, "creating zone");
        let defaults = self.maintainer.defaults();
        let request = PdnsZoneCreate {
            name: zone_name.to_string(),
            kind: "Master".into(),
            rrsets: vec![
                defaults.soa_rrset(zone_name, 1),
                defaults.ns_rrset(zone_name),
            ],
        };
        let zone = self.api.create_zone(&request).await.map_err(|source| {
            warn!(zone = %zone_name, "failed to create zone: {source}");
            DirectoryError::ZoneCreateFailed {
                zone: zone_name.to_string(),
                source,
            }
        })?;
        info!(zone = %zone_name, id = %zone.id, "created zone");
        Ok(zone)
    }
}
