//! Utility functions for key processing and URL construction.

use crate::error::ScanError;
use crate::types::DOMAIN_PLACEHOLDER;

/// Validate a candidate key.
///
/// Keys are opaque domain strings; the only hard requirement is that they are
/// non-empty once trimmed and contain no whitespace or path characters that
/// would escape the host part of the probe URL.
pub fn validate_key(key: &str) -> Result<(), ScanError> {
    let key = key.trim();

    if key.is_empty() {
        return Err(ScanError::invalid_key(key, "Key cannot be empty"));
    }

    if key.chars().any(|c| c.is_whitespace() || c == '/' || c == '?' || c == '#') {
        return Err(ScanError::invalid_key(
            key,
            "Key must be a bare host name",
        ));
    }

    Ok(())
}

/// Build the probe URL for `key` from a template containing `{domain}`.
pub fn build_probe_url(template: &str, key: &str) -> String {
    template.replace(DOMAIN_PLACEHOLDER, key.trim())
}

/// Parse a duration string like "10s", "2m" or "500ms".
///
/// A bare number is taken as seconds.
pub fn parse_duration_string(value: &str) -> Option<std::time::Duration> {
    let value = value.trim().to_lowercase();

    if let Some(ms) = value.strip_suffix("ms") {
        return ms.parse::<u64>().ok().map(std::time::Duration::from_millis);
    }
    if let Some(secs) = value.strip_suffix('s') {
        return secs.parse::<u64>().ok().map(std::time::Duration::from_secs);
    }
    if let Some(mins) = value.strip_suffix('m') {
        return mins
            .parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(std::time::Duration::from_secs);
    }

    value.parse::<u64>().ok().map(std::time::Duration::from_secs)
}
