//! # mc-core: Foundational Types for Migrant Care
//!
//! Leaf crate of the workspace. Defines the primitives every other crate
//! speaks in: who someone is, where they are, and when something happened.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype wrappers for identifiers.** `Identity` (the email every admin,
//!    employer and employee is keyed by) and `JobId` are newtypes with
//!    validated constructors. No bare strings for identifiers.
//!
//! 2. **Coordinates are validated at the boundary.** A `Coordinate` cannot hold
//!    a NaN or an out-of-range latitude/longitude. Malformed input is rejected
//!    before it reaches a store.
//!
//! 3. **UTC-only timestamps.** `Timestamp` is UTC with seconds precision.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `mc-*` crates.
//! - No `unsafe` code.
//! - No `.unwrap()` outside tests.

pub mod error;
pub mod geo;
pub mod identity;
pub mod role;
pub mod temporal;

pub use error::ValidationError;
pub use geo::{Coordinate, GeoPoint};
pub use identity::{Identity, JobId};
pub use role::Role;
pub use temporal::Timestamp;
