//! Environment Configuration
//!
//! Unset variables fall back to defaults. A variable that is set but cannot
//! be parsed is an error: the process refuses to start rather than run with
//! a value nobody asked for.

use std::fmt::Display;
use std::str::FromStr;

use thiserror::Error;

/// Malformed configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Variable set to an unparsable value.
    #[error("{key}={value:?} is invalid: {reason}")]
    Invalid {
        /// Variable name.
        key: String,
        /// Raw value.
        value: String,
        /// Parser message.
        reason: String,
    },
}

impl ConfigError {
    /// Build an `Invalid` error.
    pub fn invalid(key: &str, value: &str, reason: impl Display) -> Self {
        Self::Invalid {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Reads the process environment.
pub fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Parse `key` through `lookup`. `Ok(None)` when unset or blank.
pub fn parse_var<T, L>(lookup: &L, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
    L: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| ConfigError::invalid(key, &raw, e)),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn test_unset_and_blank_are_none() {
        let l = lookup(&[("BLANK", "  ")]);
        assert_eq!(parse_var::<u64, _>(&l, "MISSING").unwrap(), None);
        assert_eq!(parse_var::<u64, _>(&l, "BLANK").unwrap(), None);
    }

    #[test]
    fn test_parse_trims() {
        let l = lookup(&[("N", " 42 ")]);
        assert_eq!(parse_var::<u64, _>(&l, "N").unwrap(), Some(42));
    }

    #[test]
    fn test_malformed_names_key() {
        let l = lookup(&[("N", "0x89")]);
        let err = parse_var::<u64, _>(&l, "N").unwrap_err();
        assert!(matches!(&err, ConfigError::Invalid { key, value, .. } if key == "N" && value == "0x89"));
        assert!(err.to_string().starts_with("N=\"0x89\" is invalid"));
    }
}
