//! # Validation Errors
//!
//! Derived with `thiserror`. Each variant names the offending value so that
//! a rejected request can be diagnosed from the log line alone. Callers map
//! these into their own error types (see `mc-api`'s `AppError`).

use thiserror::Error;

/// A value could not be accepted as a domain primitive.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// The string is not a usable email identity.
    #[error("invalid identity {value:?}: {reason}")]
    InvalidIdentity {
        /// The rejected input.
        value: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Latitude outside [-90, 90] or not finite.
    #[error("latitude {0} out of range [-90, 90]")]
    LatitudeOutOfRange(f64),

    /// Longitude outside [-180, 180] or not finite.
    #[error("longitude {0} out of range [-180, 180]")]
    LongitudeOutOfRange(f64),

    /// A role string other than admin, employer or employee.
    #[error("unknown role {0:?}")]
    UnknownRole(String),

    /// A job identifier could not be parsed.
    #[error("invalid job id {0:?}")]
    InvalidJobId(String),

    /// A timestamp string could not be parsed.
    #[error("invalid timestamp {value:?}: {reason}")]
    InvalidTimestamp {
        /// The rejected input.
        value: String,
        /// Parser diagnostic.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_errors_name_value() {
        assert!(ValidationError::LatitudeOutOfRange(91.0).to_string().contains("91"));
        assert!(ValidationError::LongitudeOutOfRange(-181.0).to_string().contains("-181"));
    }

    #[test]
    fn identity_error_names_value() {
        let err = ValidationError::InvalidIdentity {
            value: "nobody".to_string(),
            reason: "missing '@'",
        };
        let msg = err.to_string();
        assert!(msg.contains("nobody"));
        assert!(msg.contains("missing '@'"));
    }
}
