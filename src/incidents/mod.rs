//! Incident reconciliation.
//!
//! - [`IncidentStore`] holds the latest incidents snapshot and issues
//!   write-through mutations
//! - [`StatusTransitionDetector`] turns consecutive snapshots into
//!   [`TransitionEvent`]s

mod detector;
mod store;

pub use detector::{StatusTransitionDetector, TransitionEvent};
pub use store::IncidentStore;
