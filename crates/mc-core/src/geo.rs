//! # Geographic Primitives
//!
//! [`Coordinate`] is what a worker's browser samples and what the location
//! cache stores: a latitude/longitude pair, validated on construction.
//!
//! [`GeoPoint`] is how a job posting records where the work is. It follows
//! the GeoJSON point layout (`{"type": "Point", "coordinates": [lng, lat]}`),
//! longitude first.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A validated (latitude, longitude) pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCoordinate")]
pub struct Coordinate {
    latitude: f64,
    longitude: f64,
}

#[derive(Deserialize)]
struct RawCoordinate {
    latitude: f64,
    longitude: f64,
}

impl TryFrom<RawCoordinate> for Coordinate {
    type Error = ValidationError;

    fn try_from(raw: RawCoordinate) -> Result<Self, Self::Error> {
        Self::new(raw.latitude, raw.longitude)
    }
}

impl Coordinate {
    /// Validate a latitude/longitude pair.
    ///
    /// Rejects non-finite values and anything outside the WGS84 ranges.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, ValidationError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(ValidationError::LatitudeOutOfRange(latitude));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(ValidationError::LongitudeOutOfRange(longitude));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

/// GeoJSON-style point, `[longitude, latitude]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawGeoPoint", into = "RawGeoPoint")]
pub struct GeoPoint(Coordinate);

#[derive(Serialize, Deserialize)]
struct RawGeoPoint {
    #[serde(rename = "type")]
    kind: String,
    coordinates: [f64; 2],
}

impl TryFrom<RawGeoPoint> for GeoPoint {
    type Error = ValidationError;

    fn try_from(raw: RawGeoPoint) -> Result<Self, Self::Error> {
        let [longitude, latitude] = raw.coordinates;
        Coordinate::new(latitude, longitude).map(Self)
    }
}

impl From<GeoPoint> for RawGeoPoint {
    fn from(point: GeoPoint) -> Self {
        Self {
            kind: "Point".to_string(),
            coordinates: [point.0.longitude, point.0.latitude],
        }
    }
}

impl GeoPoint {
    /// The coordinate this point wraps.
    pub fn coordinate(&self) -> Coordinate {
        self.0
    }
}

impl From<Coordinate> for GeoPoint {
    fn from(c: Coordinate) -> Self {
        Self(c)
    }
}
