use regex::Regex;
use std::sync::OnceLock;

use super::types::EngineError;

// Intentionally strict about shape, not RFC 5321 grammar: one local part, one
// @, a dotted domain. Anything odd is rejected up front rather than bounced.
fn address_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-z0-9!#$%&'*+/=?^_`{|}~.-]+@[a-z0-9](?:[a-z0-9-]*[a-z0-9])?(?:\.[a-z0-9](?:[a-z0-9-]*[a-z0-9])?)+$")
            .unwrap()
    })
}

/// Canonicalize a raw address: trim, lowercase, validate `local@domain`.
///
/// Applied identically to manual recipient entry and to every dedup
/// comparison; if the two paths ever diverged, case-variant duplicates would
/// leak through the filter.
pub fn normalize(raw: &str) -> Result<String, EngineError> {
    let normalized = raw.trim().to_ascii_lowercase();
    if normalized.is_empty() || normalized.len() > 254 {
        return Err(EngineError::InvalidAddress(raw.trim().to_string()));
    }
    if !address_pattern().is_match(&normalized) {
        return Err(EngineError::InvalidAddress(raw.trim().to_string()));
    }
    Ok(normalized)
}
