//! # Domain Identity Newtypes
//!
//! Admins, employers and employees are all keyed by their email address.
//! [`Identity`] wraps that address after validation and normalization so
//! the same person always maps to the same cache key and roster entry,
//! regardless of how a client capitalised it.
//!
//! [`JobId`] wraps the UUID of a job posting so it cannot be confused with
//! any other identifier.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Maximum length of an email address (RFC 5321 path limit).
const MAX_IDENTITY_LEN: usize = 254;

/// Validated, normalized email identity.
///
/// Normalization trims surrounding whitespace and lowercases ASCII. The
/// validation is deliberately shallow: one `@`, non-empty local part and
/// domain, no interior whitespace. Deliverability is not this type's concern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    /// Validate and normalize an email identity.
    pub fn new(value: impl AsRef<str>) -> Result<Self, ValidationError> {
        let raw = value.as_ref();
        let trimmed = raw.trim();
        let reject = |reason| ValidationError::InvalidIdentity {
            value: raw.to_string(),
            reason,
        };

        if trimmed.is_empty() {
            return Err(reject("must not be empty"));
        }
        if trimmed.len() > MAX_IDENTITY_LEN {
            return Err(reject("exceeds 254 characters"));
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(reject("contains whitespace"));
        }

        let mut parts = trimmed.split('@');
        let (local, domain) = match (parts.next(), parts.next(), parts.next()) {
            (Some(local), Some(domain), None) => (local, domain),
            (_, None, _) => return Err(reject("missing '@'")),
            _ => return Err(reject("more than one '@'")),
        };
        if local.is_empty() {
            return Err(reject("empty local part"));
        }
        if domain.is_empty() {
            return Err(reject("empty domain"));
        }

        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    /// The normalized address.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Identity {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.0
    }
}

impl FromStr for Identity {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier for a job posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Generate a new random job identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Access the inner UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for JobId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| ValidationError::InvalidJobId(s.to_string()))
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
