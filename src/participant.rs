//! Participant keys and display name validation
//!
//! A student is identified by the name they declare when connecting. The
//! cleaned name doubles as the participant key, so a student who reloads the
//! page and rejoins under the same name is bound to the same ledger entry.

use std::fmt::Display;

use rustrict::CensorStr;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while validating a declared display name
#[derive(Error, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The name is empty or contains only whitespace
    #[error("name cannot be empty")]
    Empty,
    /// The name exceeds the maximum allowed length
    #[error("name is too long")]
    TooLong,
    /// The name contains inappropriate content
    #[error("name is inappropriate")]
    Inappropriate,
}

/// Stable identifier of a student across reconnects
///
/// Derived from the declared display name with surrounding whitespace
/// removed. Two connections declaring the same name share one key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantKey(String);

impl ParticipantKey {
    /// Derives a participant key from a declared display name
    ///
    /// # Errors
    ///
    /// * `Error::TooLong` - Name exceeds the configured maximum length
    /// * `Error::Empty` - Name is empty after trimming whitespace
    /// * `Error::Inappropriate` - Name contains inappropriate content
    pub fn from_name(name: &str) -> Result<Self, Error> {
        let name = rustrict::trim_whitespace(name);
        if name.len() > crate::constants::session::MAX_NAME_LENGTH {
            return Err(Error::TooLong);
        }
        if name.is_empty() {
            return Err(Error::Empty);
        }
        if name.is_inappropriate() {
            return Err(Error::Inappropriate);
        }
        Ok(Self(name.to_owned()))
    }

    /// Returns the display name this key was derived from
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl Display for ParticipantKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_key_from_name() {
        let key = ParticipantKey::from_name("Alice").unwrap();
        assert_eq!(key.name(), "Alice");
        assert_eq!(key.to_string(), "Alice");
    }

    #[test]
    fn test_key_trims_whitespace() {
        let key = ParticipantKey::from_name("  Alice \t").unwrap();
        assert_eq!(key, ParticipantKey::from_name("Alice").unwrap());
    }

    #[test]
    fn test_key_empty_name() {
        assert_eq!(ParticipantKey::from_name(""), Err(Error::Empty));
        assert_eq!(ParticipantKey::from_name("   "), Err(Error::Empty));
        assert_eq!(ParticipantKey::from_name("\t\n"), Err(Error::Empty));
    }

    #[test]
    fn test_key_length_limit() {
        let max = "a".repeat(crate::constants::session::MAX_NAME_LENGTH);
        assert!(ParticipantKey::from_name(&max).is_ok());

        let long = "a".repeat(crate::constants::session::MAX_NAME_LENGTH + 1);
        assert_eq!(ParticipantKey::from_name(&long), Err(Error::TooLong));
    }

    #[test]
    fn test_key_inappropriate() {
        for name in ["damn", "fuck", "shit"] {
            assert_eq!(
                ParticipantKey::from_name(name),
                Err(Error::Inappropriate),
                "Expected '{name}' to be flagged as inappropriate"
            );
        }
    }

    #[test]
    fn test_key_case_sensitive() {
        let upper = ParticipantKey::from_name("Player").unwrap();
        let lower = ParticipantKey::from_name("player").unwrap();
        assert_ne!(upper, lower);
    }

    #[test]
    fn test_key_serializes_as_plain_string() {
        let key = ParticipantKey::from_name("Bob").unwrap();
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"Bob\"");
    }

    #[test]
    fn test_error_display() {
        assert_eq!(Error::Empty.to_string(), "name cannot be empty");
        assert_eq!(Error::TooLong.to_string(), "name is too long");
        assert_eq!(Error::Inappropriate.to_string(), "name is inappropriate");
    }
}
