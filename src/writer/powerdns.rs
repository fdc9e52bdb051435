//! Writer that publishes into a PowerDNS authoritative server through its HTTP API.
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info};

use super::changes::{domain_ops, in_bailiwick_nameservers};
use super::{DnsWriter, DnsWriterFactory, WriterError};
use crate::config::DnsTtlConfig;
use crate::powerdns::ZoneApi;
use crate::powerdns::types::PdnsRrset;
use crate::registry::RegistryStore;
use crate::validation::{normalize_fqdn, registered_domain, strip_trailing_dot};
use crate::zone::diff::diff;
use crate::zone::directory::ZoneDirectory;
use crate::zone::{RecordOp, RrsetChange};

pub struct PowerDnsWriterFactory {
    api: Arc<dyn ZoneApi>,
    directory: Arc<ZoneDirectory>,
    registry: Arc<dyn RegistryStore>,
    ttls: DnsTtlConfig,
}

impl PowerDnsWriterFactory {
    pub fn new(
        api: Arc<dyn ZoneApi>,
        directory: Arc<ZoneDirectory>,
        registry: Arc<dyn RegistryStore>,
        ttls: DnsTtlConfig,
    ) -> Self {
        Self {
            api,
            directory,
            registry,
            ttls,
        }
    }
}

impl DnsWriterFactory for PowerDnsWriterFactory {
    fn name(&self) -> &str {
        PowerDnsWriter::NAME
    }

    fn create(&self, tld: &str) -> Box<dyn DnsWriter> {
        Box::new(PowerDnsWriter {
            zone_name: normalize_fqdn(tld),
            api: self.api.clone(),
            directory: self.directory.clone(),
            registry: self.registry.clone(),
            ttls: self.ttls.clone(),
            domains: Vec::new(),
            hosts: Vec::new(),
            committed: false,
        })
    }
}

pub struct PowerDnsWriter {
    zone_name: String,
    api: Arc<dyn ZoneApi>,
    directory: Arc<ZoneDirectory>,
    registry: Arc<dyn RegistryStore>,
    ttls: DnsTtlConfig,
    domains: Vec<String>,
    hosts: Vec<String>,
    committed: bool,
}

impl PowerDnsWriter {
    pub const NAME: &'static str = "PowerDnsWriter";

    async fn stage_domain(&self, name: &str) -> Result<Vec<RecordOp>, WriterError> {
        let domain = self.registry.load_domain(&strip_trailing_dot(name)).await?;
        let mut glue = Vec::new();
        if let Some(domain) = domain.as_ref().filter(|d| d.publishable) {
            for ns in in_bailiwick_nameservers(domain) {
                if let Some(host) = self.registry.load_host(&strip_trailing_dot(&ns)).await? {
                    glue.push(host);
                }
            }
        }
        Ok(domain_ops(name, domain.as_ref(), &glue, &self.ttls))
    }

    /// Everything staged so far, diffed into RRSet changes.
    async fn build_changes(&self) -> Result<Vec<RrsetChange>, WriterError> {
        let mut domains = self.domains.clone();
        for host in &self.hosts {
            if let Some(domain) = registered_domain(host, &self.zone_name) {
                let domain = normalize_fqdn(&domain);
                if !domains.contains(&domain) {
                    domains.push(domain);
                }
            }
        }

        let mut ops = Vec::new();
        for domain in &domains {
            ops.extend(self.stage_domain(domain).await?);
        }
        // Removes glue left behind by renamed or detached hosts; live glue asserted above wins.
        for host in &self.hosts {
            ops.push(RecordOp::remove_all(host));
        }
        Ok(diff(&ops))
    }
}

#[async_trait]
impl DnsWriter for PowerDnsWriter {
    fn publish_domain(&mut self, name: &str) {
        let name = normalize_fqdn(name);
        info!(zone = %self.zone_name, domain = %name, "staging domain");
        if !self.domains.contains(&name) {
            self.domains.push(name);
        }
    }

    fn publish_host(&mut self, name: &str) {
        let name = normalize_fqdn(name);
        if registered_domain(&name, &self.zone_name).is_none() {
            info!(zone = %self.zone_name, host = %name, "ignoring host outside zone");
            return;
        }
        info!(zone = %self.zone_name, host = %name, "staging host");
        if !self.hosts.contains(&name) {
            self.hosts.push(name);
        }
    }

    async fn commit(&mut self) -> Result<(), WriterError> {
        if self.committed {
            return Err(WriterError::AlreadyCommitted);
        }
        self.committed = true;

        let changes = self.build_changes().await?;
        if changes.is_empty() {
            debug!(zone = %self.zone_name, "nothing to commit");
            return Ok(());
        }

        let zone_id = self.directory.resolve_zone_id(&self.zone_name).await?;
        let rrsets: Vec<PdnsRrset> = changes.iter().map(PdnsRrset::from).collect();
        info!(zone = %self.zone_name, rrsets = rrsets.len(), "committing updates to PowerDNS");
        self.api
            .patch_zone(&zone_id, &rrsets)
            .await
            .map_err(|err| {
                error!(zone = %self.zone_name, "commit to PowerDNS failed: {err}");
                WriterError::Patch(err)
            })?;
        info!(
            zone = %self.zone_name,
            domains = self.domains.len(),
            hosts = self.hosts.len(),
            "committed updates to PowerDNS"
        );
        Ok(())
    }
}
