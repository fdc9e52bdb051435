//! Wire types of the PowerDNS authoritative HTTP API.
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdnsServer {
    pub id: String, // usually "localhost"
    #[serde(default)]
    pub daemon_type: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PdnsZone {
    pub id: String,   // "example.com." (url-escaped by the server where needed)
    pub name: String, // "example.com."
    #[serde(default)]
    pub kind: Option<String>, // "Native", "Master", ...
    #[serde(default)]
    pub serial: Option<u32>,
    #[serde(default)]
    pub dnssec: bool,
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default)]
    pub rrsets: Vec<PdnsRrset>,
}

impl PdnsZone {
    /// The apex RRSet of the given type, if the zone detail carries one.
    pub fn apex_rrset(&self, rrtype: &str) -> Option<&PdnsRrset> {
        let apex = crate::validation::strip_trailing_dot(&self.name);
        self.rrsets
            .iter()
            .find(|rr| rr.rrtype == rrtype && crate::validation::strip_trailing_dot(&rr.name) == apex)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeType {
    Replace,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdnsRrset {
    pub name: String, // "www.example.com."
    #[serde(rename = "type")]
    pub rrtype: String, // "A", "NS", ...
    #[serde(default)]
    pub ttl: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changetype: Option<ChangeType>,
    #[serde(default)]
    pub records: Vec<PdnsRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<PdnsComment>,
}

impl PdnsRrset {
    /// An RRSet that replaces all records of `rrtype` at `name` with `contents`.
    pub fn replace(name: &str, rrtype: &str, ttl: u32, contents: &[String]) -> Self {
        Self {
            name: name.to_string(),
            rrtype: rrtype.to_string(),
            ttl,
            changetype: Some(ChangeType::Replace),
            records: contents
                .iter()
                .map(|content| PdnsRecord {
                    content: content.clone(),
                    disabled: false,
                })
                .collect(),
            comments: Vec::new(),
        }
    }

    /// An RRSet that deletes all records of `rrtype` at `name`.
    pub fn delete(name: &str, rrtype: &str) -> Self {
        Self {
            name: name.to_string(),
            rrtype: rrtype.to_string(),
            ttl: 0,
            changetype: Some(ChangeType::Delete),
            records: Vec::new(),
            comments: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdnsRecord {
    pub content: String, // "192.0.2.1" or "ns1.example.net."
    #[serde(default)]
    pub disabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdnsComment {
    pub content: String,
    pub account: String,
    pub modified_at: i64,
}

// Used when creating a zone
#[derive(Debug, Serialize, Deserialize)]
pub struct PdnsZoneCreate {
    pub name: String, // "test."
    pub kind: String, // "Master"
    pub rrsets: Vec<PdnsRrset>,
}

/// Zone-level settings changed through `PUT /zones/{id}`; unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdnsZoneSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_rectify: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    Ksk,
    Zsk,
    Csk,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdnsCryptokey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u32>,
    pub keytype: KeyType,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub published: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bits: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ds: Vec<String>,
}

impl PdnsCryptokey {
    pub fn new(keytype: KeyType, bits: u32, active: bool, published: bool, algorithm: &str) -> Self {
        Self {
            id: None,
            keytype,
            active,
            published,
            algorithm: Some(algorithm.to_string()),
            bits: Some(bits),
            ds: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdnsMetadata {
    pub kind: String, // "SOA-EDIT", "TSIG-ALLOW-AXFR", ...
    #[serde(default)]
    pub metadata: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdnsTsigKey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub algorithm: String, // "hmac-sha256"
    // Left empty on create so the server generates the secret.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}
