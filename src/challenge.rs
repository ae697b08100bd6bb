use std::sync::OnceLock;

use regex::Regex;

use crate::error::AdapterError;

fn challenge_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^_acme-challenge\.([^.]+(?:\.[^.]+)*)\.$").expect("challenge pattern is valid")
    })
}

/// Strips the challenge label and the trailing dot from `fqdn`, leaving the domain being
/// validated. `_acme-challenge.www.example.com.` becomes `www.example.com`.
pub fn extract_domain(fqdn: &str) -> Result<&str, AdapterError> {
    challenge_regex()
        .captures(fqdn)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| AdapterError::InvalidFqdn(fqdn.to_string()))
}

/// The challenge FQDN without its trailing dot. The challenge label is kept.
pub fn validation_domain(fqdn: &str) -> &str {
    fqdn.trim_end_matches('.')
}
