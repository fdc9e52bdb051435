//! The registry data the publish worker reads: shard configuration, domains, hosts and registrar
//! contacts, plus the refresh-request path used to re-batch names.
use std::net::IpAddr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("registry database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt registry row for {name}: {reason}")]
    Corrupt { name: String, reason: String },
}

/// One DS record of a delegated domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DsData {
    pub key_tag: u16,
    pub algorithm: u8,
    pub digest_type: u8,
    /// Hex digest, any case.
    pub digest: String,
}

impl DsData {
    /// Presentation-format RDATA: `<keytag> <alg> <digesttype> <DIGEST>`.
    pub fn rdata(&self) -> String {
        format!(
            "{} {} {} {}",
            self.key_tag,
            self.algorithm,
            self.digest_type,
            self.digest.to_ascii_uppercase()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainRecord {
    pub name: String,
    pub registrar_id: String,
    /// False when the domain is on hold or otherwise kept out of the zone.
    pub publishable: bool,
    pub nameservers: Vec<String>,
    pub ds_data: Vec<DsData>,
    pub subordinate_hosts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRecord {
    pub name: String,
    pub registrar_id: String,
    pub addresses: Vec<IpAddr>,
    /// Set when the host is in-bailiwick of a registered domain.
    pub superordinate_domain: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrarContact {
    pub id: String,
    pub name: String,
    pub admin_emails: Vec<String>,
}

#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Currently configured number of publish shards for `tld`; `None` for an unknown TLD.
    async fn publish_shard_count(&self, tld: &str) -> Result<Option<u32>, RegistryError>;

    async fn load_domain(&self, name: &str) -> Result<Option<DomainRecord>, RegistryError>;

    async fn load_host(&self, name: &str) -> Result<Option<HostRecord>, RegistryError>;

    async fn load_registrar(&self, id: &str) -> Result<Option<RegistrarContact>, RegistryError>;

    /// Queue the names for publishing again through the normal batching path.
    async fn request_refresh(
        &self,
        domains: &[String],
        hosts: &[String],
        now: DateTime<Utc>,
    ) -> Result<(), RegistryError>;
}
