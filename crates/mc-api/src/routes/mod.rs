//! # API Route Modules
//!
//! - `jobs`: job postings (list, post, edit, delete, mark done).
//! - `locations`: last known location of one worker.
//! - `rosters`: the caller's worker roster and its resolved locations.
//! - `presence`: the real-time WebSocket channel backed by the presence hub.

pub mod jobs;
pub mod locations;
pub mod presence;
pub mod rosters;

use serde::Deserialize;

use mc_core::Identity;

use crate::auth::CallerIdentity;
use crate::error::AppError;

/// `?email=` parameter shared by the location and roster queries.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EmailQuery {
    /// Target identity. Roster queries default to the caller.
    pub email: Option<String>,
}

/// Resolve the identity a roster query targets.
///
/// Callers read their own roster. Reading another employer's roster
/// requires `admin`.
pub(crate) fn roster_target(
    caller: &CallerIdentity,
    requested: Option<&str>,
) -> Result<Identity, AppError> {
    let target = match requested {
        Some(email) => Identity::new(email)?,
        None => return Ok(caller.email.clone()),
    };
    if caller.can_act_for(&target) {
        Ok(target)
    } else {
        Err(AppError::Forbidden(format!(
            "{} may not read the roster of {target}",
            caller.email
        )))
    }
}
