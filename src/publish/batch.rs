//! The unit of publish work and its queue wire form.
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BatchError {
    #[error("missing required parameter {0}")]
    Missing(&'static str),
    #[error("invalid {field} timestamp '{value}'")]
    InvalidTimestamp { field: &'static str, value: String },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("lock index {index} is not within [1, {count}]")]
pub struct ShardError {
    pub index: i64,
    pub count: i64,
}

/// A validated (index, count) publish shard; `1 <= index <= count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shard {
    pub index: u32,
    pub count: u32,
}

pub fn resolve_shard(index: i64, count: i64) -> Result<Shard, ShardError> {
    let err = || ShardError { index, count };
    if index < 1 || index > count {
        return Err(err());
    }
    Ok(Shard {
        index: u32::try_from(index).map_err(|_| err())?,
        count: u32::try_from(count).map_err(|_| err())?,
    })
}

/// Domains and hosts of one TLD to publish together under one shard lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishBatch {
    pub tld: String,
    pub writer: String,
    pub lock_index: i64,
    pub num_locks: i64,
    pub domains: Vec<String>,
    pub hosts: Vec<String>,
    /// When the batch was (re)enqueued.
    pub enqueued_at: DateTime<Utc>,
    /// When the oldest refresh request behind these names was created.
    pub items_created_at: DateTime<Utc>,
}

impl PublishBatch {
    pub fn item_count(&self) -> usize {
        self.domains.len() + self.hosts.len()
    }

    /// A batch of more than one item can be bisected.
    pub fn can_split(&self) -> bool {
        self.item_count() > 1
    }

    /// Same shard parameters, new names, fresh enqueue time.
    pub fn with_items(&self, domains: Vec<String>, hosts: Vec<String>, now: DateTime<Utc>) -> Self {
        Self {
            domains,
            hosts,
            enqueued_at: now,
            ..self.clone()
        }
    }

    /// Halve domains and hosts independently (`floor(k/2)` go first) and pair first halves with
    /// first halves. One domain plus one host becomes a domain-only and a host-only batch.
    pub fn split(&self, now: DateTime<Utc>) -> [PublishBatch; 2] {
        if self.domains.len() == 1 && self.hosts.len() == 1 {
            return [
                self.with_items(self.domains.clone(), Vec::new(), now),
                self.with_items(Vec::new(), self.hosts.clone(), now),
            ];
        }
        let (d1, d2) = self.domains.split_at(self.domains.len() / 2);
        let (h1, h2) = self.hosts.split_at(self.hosts.len() / 2);
        [
            self.with_items(d1.to_vec(), h1.to_vec(), now),
            self.with_items(d2.to_vec(), h2.to_vec(), now),
        ]
    }

    pub fn from_form(form: PublishForm) -> Result<Self, BatchError> {
        if form.tld.trim().is_empty() {
            return Err(BatchError::Missing("tld"));
        }
        if form.dns_writer.trim().is_empty() {
            return Err(BatchError::Missing("dnsWriter"));
        }
        Ok(Self {
            tld: form.tld.trim().to_ascii_lowercase(),
            writer: form.dns_writer.trim().to_string(),
            lock_index: form.lock_index,
            num_locks: form.num_publish_locks,
            domains: split_names(&form.domains),
            hosts: split_names(&form.hosts),
            enqueued_at: parse_timestamp("enqueued", &form.enqueued)?,
            items_created_at: parse_timestamp("itemsCreated", &form.items_created)?,
        })
    }

    pub fn to_form(&self) -> PublishForm {
        PublishForm {
            tld: self.tld.clone(),
            dns_writer: self.writer.clone(),
            lock_index: self.lock_index,
            num_publish_locks: self.num_locks,
            domains: self.domains.join(","),
            hosts: self.hosts.join(","),
            items_created: self.items_created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            enqueued: self.enqueued_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// Task parameters as the queue delivers them (`application/x-www-form-urlencoded`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishForm {
    pub tld: String,
    pub dns_writer: String,
    pub lock_index: i64,
    pub num_publish_locks: i64,
    #[serde(default)]
    pub domains: String,
    #[serde(default)]
    pub hosts: String,
    pub items_created: String,
    pub enqueued: String,
}

fn split_names(list: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for name in list.split(',').map(|n| n.trim().to_ascii_lowercase()) {
        if !name.is_empty() && !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

fn parse_timestamp(field: &'static str, value: &str) -> Result<DateTime<Utc>, BatchError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| BatchError::InvalidTimestamp {
            field,
            value: value.to_string(),
        })
}
