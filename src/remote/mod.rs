//! The remote document store the engine reconciles against.
//!
//! The store itself is an external collaborator; this module fixes the
//! interface the engine consumes from it:
//! - `subscribe(query)` → a stream of full, ordered snapshots
//! - point writes: create-or-replace, partial update, delete
//!
//! Writes answer through a [`Completion`]; nothing here mutates engine state.
//! [`MemoryRemote`] is an in-process implementation used for tests, demos
//! and offline runs.
//!
//! # Example
//!
//! ```ignore
//! let remote = MemoryRemote::new();
//! let handle = remote.subscribe(
//!     Query::collection("incidents").order_by("created_at", Direction::Descending),
//! );
//!
//! loop {
//!     match handle.recv() {
//!         Ok(FeedEvent::Snapshot { documents }) => println!("{} documents", documents.len()),
//!         Ok(FeedEvent::Error { message }) => eprintln!("feed error: {message}"),
//!         Ok(FeedEvent::Dropped { .. }) | Err(_) => break,
//!     }
//! }
//! ```

mod memory;
mod types;

pub use memory::MemoryRemote;
pub use types::{
    Completion, CompletionSender, Direction, DropReason, FeedEvent, Query, SubscriptionHandle,
    SubscriptionId, DEFAULT_WRITE_TIMEOUT,
};

use crate::document::Fields;

/// Operations the engine needs from the remote store.
pub trait RemoteStore: Send + Sync {
    /// Open a subscription. The first event is the current snapshot; another
    /// full snapshot follows every change to the result set.
    fn subscribe(&self, query: Query) -> SubscriptionHandle;

    /// Create a document or replace it entirely.
    fn set_document(&self, collection: &str, id: &str, fields: Fields) -> Completion;

    /// Overwrite the named fields of an existing document.
    fn update_fields(&self, collection: &str, id: &str, fields: Fields) -> Completion;

    /// Remove a document. Removing a missing document succeeds.
    fn delete_document(&self, collection: &str, id: &str) -> Completion;
}
