//! DNS name syntax checks and the canonical name forms used across the crate.
use regex::Regex;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("name is empty")]
    Empty,
    #[error("label too long (max 63 characters)")]
    TooLong,
    #[error("name too long (max 253 characters)")]
    NameTooLong,
    #[error("label contains invalid characters (only a-z, 0-9, and '-' allowed)")]
    InvalidCharacters,
    #[error("label must not start or end with '-'")]
    LeadingOrTrailingHyphen,
    #[error("label must not contain '--' in the third and fourth position unless it is an A-label")]
    ReservedHyphens,
}

lazy_static::lazy_static! {
    /// Only lowercase letters, digits and '-'
    static ref LABEL_RE: Regex = Regex::new(r"^[a-z0-9-]+$").unwrap();
}

pub fn validate_label(label: &str) -> Result<(), ValidationError> {
    if label.is_empty() {
        return Err(ValidationError::Empty);
    }
    if label.len() > 63 {
        return Err(ValidationError::TooLong);
    }
    if !LABEL_RE.is_match(label) {
        return Err(ValidationError::InvalidCharacters);
    }
    if label.starts_with('-') || label.ends_with('-') {
        return Err(ValidationError::LeadingOrTrailingHyphen);
    }
    if label.get(2..4) == Some("--") && !label.starts_with("xn--") {
        return Err(ValidationError::ReservedHyphens);
    }

    Ok(())
}

/// Validate a host or domain name, with or without its trailing dot.
pub fn validate_fqdn_ascii(domain: &str) -> Result<(), ValidationError> {
    let d = domain.trim_end_matches('.');
    if d.is_empty() {
        return Err(ValidationError::Empty);
    }
    if d.len() > 253 {
        return Err(ValidationError::NameTooLong);
    }
    for label in d.split('.') {
        validate_label(label)?;
    }
    Ok(())
}

/// Lower-case, trimmed, with exactly one trailing dot (`example.test.`).
pub fn normalize_fqdn(name: &str) -> String {
    let trimmed = name.trim().trim_end_matches('.').to_ascii_lowercase();
    format!("{trimmed}.")
}

/// Lower-case, trimmed, without the trailing dot (`example.test`).
pub fn strip_trailing_dot(name: &str) -> String {
    name.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Whether `name` lies strictly below `parent`. Equal names are not "under".
pub fn is_strictly_under(name: &str, parent: &str) -> bool {
    let name = strip_trailing_dot(name);
    let parent = strip_trailing_dot(parent);
    if name.is_empty() || parent.is_empty() || name.len() <= parent.len() {
        return false;
    }
    name.ends_with(&parent) && name[..name.len() - parent.len()].ends_with('.')
}

/// The registered domain owning `host` within `tld`: the label directly under the TLD plus the
/// TLD itself. Returns `None` when the host is not below the TLD.
pub fn registered_domain(host: &str, tld: &str) -> Option<String> {
    if !is_strictly_under(host, tld) {
        return None;
    }
    let host = strip_trailing_dot(host);
    let tld = strip_trailing_dot(tld);
    let prefix = &host[..host.len() - tld.len() - 1];
    let label = prefix.rsplit('.').next()?;
    Some(format!("{label}.{tld}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_a_labels_and_rejects_reserved_hyphens() {
        assert!(validate_fqdn_ascii("example.xn--q9jyb4c").is_ok());
        assert_eq!(
            validate_fqdn_ascii("ab--cd.test"),
            Err(ValidationError::ReservedHyphens)
        );
        assert_eq!(
            validate_fqdn_ascii("-bad.test."),
            Err(ValidationError::LeadingOrTrailingHyphen)
        );
        assert_eq!(
            validate_fqdn_ascii("under_score.test"),
            Err(ValidationError::InvalidCharacters)
        );
        assert_eq!(validate_fqdn_ascii("."), Err(ValidationError::Empty));
    }

    #[test]
    fn normalizes_names() {
        assert_eq!(normalize_fqdn(" Example.TEST "), "example.test.");
        assert_eq!(normalize_fqdn("example.test."), "example.test.");
        assert_eq!(strip_trailing_dot("NS1.Example.Test."), "ns1.example.test");
    }

    #[test]
    fn strict_subdomain_check() {
        assert!(is_strictly_under("example.test", "test"));
        assert!(is_strictly_under("a.b.example.test.", "test."));
        assert!(!is_strictly_under("test", "test"));
        assert!(!is_strictly_under("example.com", "test"));
        assert!(!is_strictly_under("example.latest", "test"));
    }

    #[test]
    fn finds_registered_domain_for_host() {
        assert_eq!(
            registered_domain("ns1.example.test", "test").as_deref(),
            Some("example.test")
        );
        assert_eq!(
            registered_domain("a.b.example.co.test.", "co.test").as_deref(),
            Some("example.co.test")
        );
        assert_eq!(registered_domain("example.test", "test").as_deref(), Some("example.test"));
        assert_eq!(registered_domain("ns1.example.com", "test"), None);
    }
}
