//! Record-level model of a zone update, and the pieces that turn it into backend calls: the
//! RRSet differ, the zone id cache and the zone directory.
pub mod cache;
pub mod diff;
pub mod directory;

use std::fmt;

use crate::powerdns::types::PdnsRrset;

/// Record types this crate publishes into TLD zones.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordType {
    A,
    Aaaa,
    Ds,
    Ns,
    /// Anything else; dropped by the differ.
    Other(String),
}

impl RecordType {
    /// The types a wildcard delete expands to.
    pub const SUPPORTED: [RecordType; 4] =
        [RecordType::A, RecordType::Aaaa, RecordType::Ds, RecordType::Ns];

    pub fn as_str(&self) -> &str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
            RecordType::Ds => "DS",
            RecordType::Ns => "NS",
            RecordType::Other(other) => other,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, RecordType::Other(_))
    }
}

impl From<&str> for RecordType {
    fn from(value: &str) -> Self {
        match value.to_ascii_uppercase().as_str() {
            "A" => RecordType::A,
            "AAAA" => RecordType::Aaaa,
            "DS" => RecordType::Ds,
            "NS" => RecordType::Ns,
            other => RecordType::Other(other.to_string()),
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a staged removal applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveScope {
    Type(RecordType),
    /// Every type at the name.
    AllTypes,
}

/// A primitive staged operation, in staging order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOp {
    /// `content` is part of the final record set for (name, type).
    Assert {
        name: String,
        rtype: RecordType,
        ttl: u32,
        content: String,
    },
    /// Remove the records for (name, type), or for every type at name.
    Remove { name: String, scope: RemoveScope },
}

impl RecordOp {
    pub fn assert(name: &str, rtype: RecordType, ttl: u32, content: impl Into<String>) -> Self {
        RecordOp::Assert {
            name: name.to_string(),
            rtype,
            ttl,
            content: content.into(),
        }
    }

    pub fn remove(name: &str, rtype: RecordType) -> Self {
        RecordOp::Remove {
            name: name.to_string(),
            scope: RemoveScope::Type(rtype),
        }
    }

    pub fn remove_all(name: &str) -> Self {
        RecordOp::Remove {
            name: name.to_string(),
            scope: RemoveScope::AllTypes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Replace(Vec<String>),
    Delete,
}

/// One RRSet mutation produced by the differ; at most one per (name, type) per commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RrsetChange {
    pub name: String,
    pub rtype: RecordType,
    pub ttl: u32,
    pub mutation: Mutation,
}

impl RrsetChange {
    pub fn is_delete(&self) -> bool {
        matches!(self.mutation, Mutation::Delete)
    }
}

impl From<&RrsetChange> for PdnsRrset {
    fn from(change: &RrsetChange) -> Self {
        match &change.mutation {
            Mutation::Replace(values) => {
                PdnsRrset::replace(&change.name, change.rtype.as_str(), change.ttl, values)
            }
            Mutation::Delete => PdnsRrset::delete(&change.name, change.rtype.as_str()),
        }
    }
}
