//! # Inbound Frames
//!
//! The hub channel carries JSON text frames tagged by a `type` field. One tag
//! is understood:
//!
//! ```text
//! { "type": "employee_location", "email": "...", "latitude": 13.08, "longitude": 80.27 }
//! ```
//!
//! Every other tag decodes to [`Inbound::Unrecognized`] and is ignored by the
//! hub. A frame that is not a JSON object, has no string `type`, or carries an
//! `employee_location` payload that fails validation is a [`DecodeError`].

use serde::Deserialize;
use thiserror::Error;

use mc_core::{Coordinate, Identity, ValidationError};

/// Tag of the one frame type the hub acts on.
pub const EMPLOYEE_LOCATION: &str = "employee_location";

/// A validated location report from a worker.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationUpdate {
    pub email: Identity,
    pub coordinate: Coordinate,
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Location(LocationUpdate),
    /// Any well-formed frame whose `type` the hub does not handle.
    Unrecognized(String),
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("frame is not valid JSON: {0}")]
    NotJson(#[source] serde_json::Error),

    #[error("frame is not a JSON object")]
    NotAnObject,

    #[error("frame has no string \"type\" field")]
    MissingType,

    #[error("{kind} frame has invalid fields: {reason}")]
    InvalidPayload { kind: &'static str, reason: String },
}

impl From<ValidationError> for DecodeError {
    fn from(err: ValidationError) -> Self {
        DecodeError::InvalidPayload {
            kind: EMPLOYEE_LOCATION,
            reason: err.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct WireLocation {
    email: String,
    latitude: f64,
    longitude: f64,
}

/// Decode one raw text frame.
pub fn decode(raw: &str) -> Result<Inbound, DecodeError> {
    let value: serde_json::Value = serde_json::from_str(raw).map_err(DecodeError::NotJson)?;
    let object = value.as_object().ok_or(DecodeError::NotAnObject)?;
    let kind = object
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or(DecodeError::MissingType)?;

    if kind != EMPLOYEE_LOCATION {
        return Ok(Inbound::Unrecognized(kind.to_string()));
    }

    let wire: WireLocation =
        serde_json::from_value(value).map_err(|e| DecodeError::InvalidPayload {
            kind: EMPLOYEE_LOCATION,
            reason: e.to_string(),
        })?;
    Ok(Inbound::Location(LocationUpdate {
        email: Identity::new(&wire.email)?,
        coordinate: Coordinate::new(wire.latitude, wire.longitude)?,
    }))
}
