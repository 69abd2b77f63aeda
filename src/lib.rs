//! # Campus Feed
//!
//! Keeps a local, reconciled view of remotely stored campus incidents and
//! broadcast announcements in step with a server-pushed change stream, and
//! derives notifications, popups and filtered views from it.
//!
//! ## Core Concepts
//!
//! - **Snapshots**: every feed delivery is the complete, ordered result set;
//!   the local set is replaced, never patched
//! - **Write-through**: mutations go to the remote only and show up locally
//!   with the next snapshot
//! - **Transitions**: status changes between consecutive snapshots become
//!   notification events
//! - **Windows**: broadcasts age out against the wall clock at read time
//!
//! ## Example
//!
//! ```ignore
//! use campus_feed::{CampusFeed, EngineConfig, FilterCriteria, MemoryRemote, Viewer};
//! use std::sync::Arc;
//!
//! let engine = CampusFeed::new(Arc::new(MemoryRemote::new()), EngineConfig::default());
//! engine.start()?;
//! engine.sign_in(Viewer::new("user_001", "Ali"))?;
//!
//! let transitions = engine.incidents().subscribe_transitions();
//! let open = engine.visible(&FilterCriteria::new().active_only(true));
//! ```

pub mod broadcasts;
pub mod clock;
pub mod codec;
pub mod document;
pub mod engine;
pub mod error;
pub mod events;
pub mod feed;
pub mod filter;
pub mod follow;
pub mod incidents;
pub mod remote;
pub mod types;

// Re-exports
pub use broadcasts::{BroadcastConfig, BroadcastStore};
pub use clock::{Clock, ManualClock, SystemClock};
pub use document::{Document, FieldValue, Fields};
pub use engine::{CampusFeed, EngineConfig};
pub use error::{DecodeError, FeedError, Result};
pub use events::Listeners;
pub use feed::{FeedSubscriber, ResubscribePolicy, SnapshotSink};
pub use filter::{visible, FilterCriteria};
pub use follow::{FollowOutcome, FollowRegistry, PreferenceOutcome};
pub use incidents::{IncidentStore, StatusTransitionDetector, TransitionEvent};
pub use remote::{
    Completion, CompletionSender, Direction, DropReason, FeedEvent, MemoryRemote, Query,
    RemoteStore, SubscriptionHandle, SubscriptionId,
};
pub use types::*;
