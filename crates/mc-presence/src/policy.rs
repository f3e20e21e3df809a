//! # Recipient Selection
//!
//! Fan-out asks the configured [`RecipientPolicy`] once per viewer per event.
//!
//! - [`BroadcastAll`]: every connected viewer receives every event, the
//!   sender included.
//! - [`RosterScoped`]: admins see everyone, employers see workers on their
//!   roster, employees see only themselves. Anonymous viewers see nothing.

use mc_core::{Identity, Role};

use crate::hub::Viewer;
use crate::message::LocationUpdate;

pub trait RecipientPolicy: Send + Sync + 'static {
    /// Whether `viewer` should receive `update`.
    fn admits(&self, viewer: &Viewer, update: &LocationUpdate) -> bool;

    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BroadcastAll;

impl RecipientPolicy for BroadcastAll {
    fn admits(&self, _viewer: &Viewer, _update: &LocationUpdate) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "all"
    }
}

/// Answers roster membership for [`RosterScoped`].
///
/// Called on the fan-out path for every employer viewer, so implementations
/// must not block on I/O.
pub trait RosterLookup: Send + Sync + 'static {
    fn is_on_roster(&self, employer: &Identity, worker: &Identity) -> bool;
}

#[derive(Debug, Clone)]
pub struct RosterScoped<R> {
    rosters: R,
}

impl<R: RosterLookup> RosterScoped<R> {
    pub fn new(rosters: R) -> Self {
        Self { rosters }
    }
}

impl<R: RosterLookup> RecipientPolicy for RosterScoped<R> {
    fn admits(&self, viewer: &Viewer, update: &LocationUpdate) -> bool {
        let (Some(identity), Some(role)) = (&viewer.identity, viewer.role) else {
            return false;
        };
        match role {
            Role::Admin => true,
            Role::Employer => {
                identity == &update.email || self.rosters.is_on_roster(identity, &update.email)
            }
            Role::Employee => identity == &update.email,
        }
    }

    fn name(&self) -> &'static str {
        "roster"
    }
}
