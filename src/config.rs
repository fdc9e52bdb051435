//! Worker configuration, read from a TOML file at startup.
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::powerdns::client::REQUEST_TIMEOUT;
use crate::validation::{normalize_fqdn, validate_fqdn_ascii};

/// Time kept free at the end of a publish lease for releasing it.
pub const LEASE_MARGIN: Duration = Duration::from_secs(15);
const MAX_ZONE_CACHE_HORIZON_SECS: u64 = 30 * 24 * 3600;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub powerdns: PowerDnsConfig,
    #[serde(default)]
    pub dns: DnsTtlConfig,
    pub publish: PublishConfig,
    pub email: EmailConfig,
    pub queue_auth: QueueAuthConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PowerDnsConfig {
    pub base_url: String, // "http://127.0.0.1:8081/api/v1"
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_server_id")]
    pub server_id: String,
    #[serde(default)]
    pub dnssec_enabled: bool,
    #[serde(default)]
    pub tsig_enabled: bool,
    pub root_nameservers: Vec<String>, // "a.nic.test.", ...; the first one is the SOA primary
    pub soa_contact: String,           // "hostmaster.nic.test."
    #[serde(default = "default_zone_ttl")]
    pub default_zone_ttl: u32,
    #[serde(default = "default_cache_horizon")]
    pub zone_cache_horizon_secs: u64,
}

impl PowerDnsConfig {
    /// The SOA MNAME, i.e. the first configured root nameserver.
    pub fn primary_nameserver(&self) -> &str {
        self.root_nameservers.first().map_or(".", String::as_str)
    }

    /// Bounded at load time, see [`AppConfig::from_toml`].
    pub fn zone_cache_horizon(&self) -> chrono::Duration {
        let secs = self.zone_cache_horizon_secs.min(MAX_ZONE_CACHE_HORIZON_SECS);
        chrono::Duration::seconds(secs as i64)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DnsTtlConfig {
    #[serde(default = "default_a_ttl")]
    pub a_ttl: u32,
    #[serde(default = "default_ns_ttl")]
    pub ns_ttl: u32,
    #[serde(default = "default_ds_ttl")]
    pub ds_ttl: u32,
}

impl Default for DnsTtlConfig {
    fn default() -> Self {
        Self {
            a_ttl: default_a_ttl(),
            ns_ttl: default_ns_ttl(),
            ds_ttl: default_ds_ttl(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublishConfig {
    #[serde(default = "default_lock_lease")]
    pub lock_lease_secs: u64,
    #[serde(default = "default_retries_before_split")]
    pub retries_before_split: u32,
    #[serde(default = "default_retries_before_permanent_failure")]
    pub retries_before_permanent_failure: u32,
    pub task_queue_url: String,
    #[serde(default)]
    pub task_queue_token: Option<String>,
}

impl PublishConfig {
    pub fn lock_lease(&self) -> Duration {
        Duration::from_secs(self.lock_lease_secs)
    }

    /// How long a batch may spend under its lock before it is abandoned.
    pub fn processing_deadline(&self) -> Duration {
        self.lock_lease().saturating_sub(LEASE_MARGIN)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub relay_url: String,
    #[serde(default)]
    pub relay_token: Option<String>,
    pub subject: String,
    /// Placeholders: `{registrar}`, `{name}`, `{kind}`, `{support_email}`, `{registry_name}`.
    pub body_template: String,
    pub registry_name: String,
    pub support_email: String,
    pub bcc_email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueAuthConfig {
    pub username: String,
    pub password_hash: String, // Argon2 PHC string
}

fn default_server_id() -> String {
    "localhost".into()
}
fn default_zone_ttl() -> u32 {
    3600
}
fn default_cache_horizon() -> u64 {
    3600
}
fn default_a_ttl() -> u32 {
    3600
}
fn default_ns_ttl() -> u32 {
    10800
}
fn default_ds_ttl() -> u32 {
    3600
}
fn default_lock_lease() -> u64 {
    180
}
fn default_retries_before_split() -> u32 {
    3
}
fn default_retries_before_permanent_failure() -> u32 {
    20
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Parse, normalize names to trailing-dot form and validate.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let mut config: AppConfig = toml::from_str(text)?;

        if config.powerdns.root_nameservers.is_empty() {
            return Err(ConfigError::Invalid(
                "powerdns.root_nameservers needs at least one entry".into(),
            ));
        }
        config.powerdns.root_nameservers = config
            .powerdns
            .root_nameservers
            .iter()
            .map(|ns| normalize_fqdn(ns))
            .collect();
        config.powerdns.soa_contact = normalize_fqdn(&config.powerdns.soa_contact);
        for ns in &config.powerdns.root_nameservers {
            validate_fqdn_ascii(ns)
                .map_err(|e| ConfigError::Invalid(format!("root nameserver '{ns}': {e}")))?;
        }
        validate_fqdn_ascii(&config.powerdns.soa_contact).map_err(|e| {
            ConfigError::Invalid(format!(
                "soa_contact '{}': {e}",
                config.powerdns.soa_contact
            ))
        })?;

        if config.powerdns.default_zone_ttl == 0 {
            return Err(ConfigError::Invalid("default_zone_ttl must be positive".into()));
        }
        if config.powerdns.zone_cache_horizon_secs > MAX_ZONE_CACHE_HORIZON_SECS {
            return Err(ConfigError::Invalid(format!(
                "zone_cache_horizon_secs must not exceed {MAX_ZONE_CACHE_HORIZON_SECS}"
            )));
        }
        let min_lease = REQUEST_TIMEOUT + LEASE_MARGIN;
        if config.publish.lock_lease() <= min_lease {
            return Err(ConfigError::Invalid(format!(
                "lock_lease_secs must exceed {} so a backend call fits into the lease",
                min_lease.as_secs()
            )));
        }
        if config.publish.retries_before_split > config.publish.retries_before_permanent_failure {
            return Err(ConfigError::Invalid(
                "retries_before_split must not exceed retries_before_permanent_failure".into(),
            ));
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SAMPLE_CONFIG;

    #[test]
    fn parses_and_normalizes() {
        let config = AppConfig::from_toml(SAMPLE_CONFIG).unwrap();
        assert_eq!(
            config.powerdns.root_nameservers,
            vec!["a.nic.test.".to_string(), "b.nic.test.".to_string()]
        );
        assert_eq!(config.powerdns.primary_nameserver(), "a.nic.test.");
        assert_eq!(config.powerdns.soa_contact, "hostmaster.nic.test.");
        assert_eq!(config.powerdns.server_id, "localhost");
        assert_eq!(config.powerdns.default_zone_ttl, 3600);
        assert_eq!(config.publish.retries_before_split, 3);
        assert_eq!(config.publish.retries_before_permanent_failure, 20);
        assert_eq!(config.publish.lock_lease(), Duration::from_secs(180));
        assert_eq!(config.dns.ns_ttl, 10800);
    }

    #[test]
    fn rejects_missing_nameservers() {
        let text = SAMPLE_CONFIG.replace(
            r#"root_nameservers = ["A.NIC.test", "b.nic.test."]"#,
            "root_nameservers = []",
        );
        assert!(matches!(
            AppConfig::from_toml(&text),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn accepts_mixed_case_names() {
        let text = SAMPLE_CONFIG.replace(
            r#"soa_contact = "hostmaster.nic.test""#,
            r#"soa_contact = "HostMaster.NIC.Test.""#,
        );
        let config = AppConfig::from_toml(&text).unwrap();
        assert_eq!(config.powerdns.primary_nameserver(), "a.nic.test.");
        assert_eq!(config.powerdns.soa_contact, "hostmaster.nic.test.");
    }

    #[test]
    fn rejects_malformed_nameserver() {
        let text = SAMPLE_CONFIG.replace(
            r#"root_nameservers = ["A.NIC.test", "b.nic.test."]"#,
            r#"root_nameservers = ["a.nic.test", "under_score.test"]"#,
        );
        assert!(matches!(
            AppConfig::from_toml(&text),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn lease_must_outlast_a_backend_call() {
        let text = SAMPLE_CONFIG.replace(
            r#"task_queue_url = "http://queue.internal/tasks/dns-publish""#,
            "task_queue_url = \"http://queue.internal/\"\nlock_lease_secs = 60",
        );
        assert!(matches!(
            AppConfig::from_toml(&text),
            Err(ConfigError::Invalid(_))
        ));

        let config = sample_config_with_lease(120);
        assert_eq!(config.publish.processing_deadline(), Duration::from_secs(105));
    }

    fn sample_config_with_lease(secs: u64) -> AppConfig {
        let text = SAMPLE_CONFIG.replace(
            r#"task_queue_url = "http://queue.internal/tasks/dns-publish""#,
            &format!("task_queue_url = \"http://queue.internal/\"\nlock_lease_secs = {secs}"),
        );
        AppConfig::from_toml(&text).unwrap()
    }

    #[test]
    fn rejects_oversized_cache_horizon() {
        let text = SAMPLE_CONFIG.replace(
            r#"soa_contact = "hostmaster.nic.test""#,
            "soa_contact = \"hostmaster.nic.test\"\nzone_cache_horizon_secs = 9999999999",
        );
        assert!(matches!(
            AppConfig::from_toml(&text),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_inverted_retry_thresholds() {
        let text = SAMPLE_CONFIG.replace(
            r#"task_queue_url = "http://queue.internal/tasks/dns-publish""#,
            "task_queue_url = \"http://queue.internal/\"\nretries_before_split = 30",
        );
        assert!(matches!(
            AppConfig::from_toml(&text),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn shipped_example_config_loads() {
        let path = Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/etc/tldpush.toml"));
        let config = AppConfig::load(path).unwrap();
        assert_eq!(config.powerdns.primary_nameserver(), "a.nic.example.");
        assert!(config.email.body_template.contains("{registrar}"));
    }
}
