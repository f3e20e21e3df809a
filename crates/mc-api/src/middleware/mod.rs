//! # Middleware Stack
//!
//! Tower middleware for the API layer:
//! - [`metrics`]: per-route request counters and latency histograms.

pub mod metrics;
