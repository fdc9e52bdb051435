//! PowerDNS authoritative server API: wire types, HTTP client and the [`ZoneApi`] seam the rest
//! of the crate talks to.
pub mod client;
pub mod types;

use async_trait::async_trait;
use thiserror::Error;

use types::*;

#[derive(Debug, Error)]
pub enum PdnsError {
    #[error("PowerDNS {op} request failed: {source}")]
    Request {
        op: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("PowerDNS {op} failed with {status}: {message}")]
    Status {
        op: &'static str,
        status: u16,
        message: String,
    },

    #[error("PowerDNS {op}: not found")]
    NotFound { op: &'static str },
}

impl PdnsError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, PdnsError::NotFound { .. })
    }
}

/// The zone-management operations this crate needs from a DNS backend.
///
/// Calls are plain request/response; none of them retries internally.
#[async_trait]
pub trait ZoneApi: Send + Sync {
    /// List zones (summary form, without RRSets).
    async fn list_zones(&self) -> Result<Vec<PdnsZone>, PdnsError>;

    /// Full zone detail including RRSets, serial, DNSSEC flag and account.
    async fn get_zone(&self, zone_id: &str) -> Result<PdnsZone, PdnsError>;

    async fn create_zone(&self, zone: &PdnsZoneCreate) -> Result<PdnsZone, PdnsError>;

    /// Apply RRSet changes to a zone in one request.
    async fn patch_zone(&self, zone_id: &str, rrsets: &[PdnsRrset]) -> Result<(), PdnsError>;

    /// Change zone-level settings such as `account` and `api_rectify`.
    async fn update_zone(
        &self,
        zone_id: &str,
        settings: &PdnsZoneSettings,
    ) -> Result<(), PdnsError>;

    async fn rectify_zone(&self, zone_id: &str) -> Result<(), PdnsError>;

    async fn list_cryptokeys(&self, zone_id: &str) -> Result<Vec<PdnsCryptokey>, PdnsError>;

    async fn create_cryptokey(
        &self,
        zone_id: &str,
        key: &PdnsCryptokey,
    ) -> Result<PdnsCryptokey, PdnsError>;

    async fn set_cryptokey_active(
        &self,
        zone_id: &str,
        key_id: u32,
        active: bool,
    ) -> Result<(), PdnsError>;

    async fn delete_cryptokey(&self, zone_id: &str, key_id: u32) -> Result<(), PdnsError>;

    async fn get_metadata(&self, zone_id: &str, kind: &str) -> Result<PdnsMetadata, PdnsError>;

    async fn create_metadata(&self, zone_id: &str, metadata: &PdnsMetadata)
    -> Result<(), PdnsError>;

    async fn get_tsig_key(&self, name: &str) -> Result<PdnsTsigKey, PdnsError>;

    async fn create_tsig_key(&self, key: &PdnsTsigKey) -> Result<PdnsTsigKey, PdnsError>;
}
