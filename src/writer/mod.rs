//! DNS writers: per-backend sinks that stage domain/host publishes and commit them to one zone.
pub mod changes;
pub mod powerdns;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::powerdns::PdnsError;
use crate::registry::RegistryError;
use crate::zone::directory::DirectoryError;

#[derive(Debug, thiserror::Error)]
pub enum WriterError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error("zone patch failed: {0}")]
    Patch(#[source] PdnsError),
    #[error("writer already committed")]
    AlreadyCommitted,
    #[error("publish did not finish within {0:?}")]
    TimedOut(Duration),
}

/// One writer instance serves one batch.
///
/// `publish_*` only buffer names; all lookups and backend calls happen in [`DnsWriter::commit`],
/// which may be called once.
#[async_trait]
pub trait DnsWriter: Send {
    fn publish_domain(&mut self, name: &str);

    fn publish_host(&mut self, name: &str);

    async fn commit(&mut self) -> Result<(), WriterError>;
}

pub trait DnsWriterFactory: Send + Sync {
    /// The name batches use to select this writer.
    fn name(&self) -> &str;

    fn create(&self, tld: &str) -> Box<dyn DnsWriter>;
}

/// Writers available to the worker, by name.
#[derive(Default, Clone)]
pub struct WriterRegistry {
    factories: BTreeMap<String, Arc<dyn DnsWriterFactory>>,
}

impl WriterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, factory: Arc<dyn DnsWriterFactory>) {
        self.factories.insert(factory.name().to_string(), factory);
    }

    pub fn with(mut self, factory: Arc<dyn DnsWriterFactory>) -> Self {
        self.register(factory);
        self
    }

    /// A fresh writer for `tld`, or `None` when no writer goes by `name`.
    pub fn create(&self, name: &str, tld: &str) -> Option<Box<dyn DnsWriter>> {
        self.factories.get(name).map(|factory| factory.create(tld))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}
