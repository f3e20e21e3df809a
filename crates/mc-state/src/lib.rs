//! # mc-state: Lifecycle State Machines
//!
//! ## State Machines
//!
//! - **Job** (`job.rs`): `Pending → Done`. `Done` is terminal; there is no
//!   transition back to `Pending`.
//!
//! The job lifecycle has two states and one edge, so it is an enum with a
//! validated `transition()` rather than a typestate pair. Stored records carry
//! the status as data and are re-validated on every mutation.

pub mod job;

pub use job::{JobStatus, JobStatusError};
