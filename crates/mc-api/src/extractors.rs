//! # Custom Extractors & Validation
//!
//! The [`Validate`] trait for request DTOs and helpers that turn axum's
//! JSON and query rejections into [`AppError`]s.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::Query;
use axum::Json;

use crate::error::AppError;

/// Business rules checked after serde has accepted the shape.
pub trait Validate {
    fn validate(&self) -> Result<(), String>;
}

/// Extract a JSON body, mapping deserialization errors to [`AppError::BadRequest`].
pub fn extract_json<T>(result: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    result
        .map(|Json(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

/// Extract a JSON body and run [`Validate`] on it.
pub fn extract_validated_json<T: Validate>(
    result: Result<Json<T>, JsonRejection>,
) -> Result<T, AppError> {
    let value = extract_json(result)?;
    value.validate().map_err(AppError::Validation)?;
    Ok(value)
}

/// Extract a query string, mapping decode errors to [`AppError::BadRequest`].
pub fn extract_query<T>(result: Result<Query<T>, QueryRejection>) -> Result<T, AppError> {
    result
        .map(|Query(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Positive(i64);

    impl Validate for Positive {
        fn validate(&self) -> Result<(), String> {
            if self.0 > 0 {
                Ok(())
            } else {
                Err("must be positive".to_string())
            }
        }
    }

    #[test]
    fn validated_json_passes_valid_values() {
        let value = extract_validated_json(Ok(Json(Positive(3)))).unwrap();
        assert_eq!(value.0, 3);
    }

    #[test]
    fn validated_json_rejects_with_validation_error() {
        match extract_validated_json(Ok(Json(Positive(-1)))) {
            Err(AppError::Validation(msg)) => assert_eq!(msg, "must be positive"),
            other => panic!("expected Validation, got {:?}", other.map(|p| p.0)),
        }
    }
}
