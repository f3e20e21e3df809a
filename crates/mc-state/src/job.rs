//! # Job Posting Status
//!
//! ```text
//! Pending ──mark_done──▶ Done (terminal)
//! ```
//!
//! Status strings on the wire are `"Pending"` and `"Done"`, the values map
//! clients already send in `?status=` filters.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle status of a job posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum JobStatus {
    /// Open for workers. Every new posting starts here.
    #[default]
    Pending,
    /// Work completed (terminal).
    Done,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Done => "Done",
        }
    }

    /// Validate a transition from `self` to `to`.
    pub fn transition(self, to: JobStatus) -> Result<JobStatus, JobStatusError> {
        match (self, to) {
            (Self::Pending, Self::Done) => Ok(Self::Done),
            (Self::Done, _) => Err(JobStatusError::AlreadyTerminal),
            (from, to) => Err(JobStatusError::InvalidTransition { from, to }),
        }
    }

    /// Shorthand for `transition(Done)`.
    pub fn mark_done(self) -> Result<JobStatus, JobStatusError> {
        self.transition(Self::Done)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = JobStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Done" => Ok(Self::Done),
            other => Err(JobStatusError::UnknownStatus(other.to_string())),
        }
    }
}

/// Errors from the job status state machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobStatusError {
    /// The job is already `Done`.
    #[error("job is already Done")]
    AlreadyTerminal,

    /// The requested edge does not exist.
    #[error("invalid job transition: {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    /// A status string that is neither `Pending` nor `Done`.
    #[error("unknown job status {0:?}")]
    UnknownStatus(String),
}
