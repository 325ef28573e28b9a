//! Locates Gemini API keys in the process environment.

use crate::error::GeminiError;

/// Environment variable holding a comma-separated list of API keys.
pub const API_KEYS_ENV_VAR: &str = "GEMINI_API_KEYS";

/// Splits a comma-separated key list, trimming whitespace and dropping blanks.
#[must_use]
pub fn parse_api_keys(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

/// Reads the API keys from `GEMINI_API_KEYS`.
///
/// # Errors
///
/// Returns `GeminiError::NoApiKeys` when the variable is unset or holds no
/// non-blank key.
pub fn discover_api_keys() -> Result<Vec<String>, GeminiError> {
    let raw = std::env::var(API_KEYS_ENV_VAR).unwrap_or_default();
    let keys = parse_api_keys(&raw);
    if keys.is_empty() {
        return Err(GeminiError::NoApiKeys(API_KEYS_ENV_VAR));
    }
    tracing::debug!(event = "api_keys_discovered", count = keys.len(), "api_keys_discovered");
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_api_keys_trims_and_drops_blanks() {
        assert_eq!(
            parse_api_keys(" key-a , key-b,, ,key-c "),
            vec!["key-a", "key-b", "key-c"]
        );
    }

    #[test]
    fn test_parse_api_keys_empty() {
        assert!(parse_api_keys("").is_empty());
        assert!(parse_api_keys(" , ,").is_empty());
    }
}
