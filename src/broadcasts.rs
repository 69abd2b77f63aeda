//! Windowed broadcast announcements and popup decisions.
//!
//! The store keeps at most `max_items` broadcasts of the latest snapshot and
//! shows only those younger than `retention`, measured against the clock at
//! read time: an announcement ages out without a new snapshot arriving.
//!
//! Popup rule: the newest broadcast of a snapshot pops up when it is younger
//! than `popup_window` and its message differs from the last one popped.
//! Suppression is by message text, so two broadcasts with identical text
//! count as one.

use crate::clock::{Clock, SystemClock};
use crate::codec;
use crate::document::Document;
use crate::error::FeedError;
use crate::events::Listeners;
use crate::feed::SnapshotSink;
use crate::remote::{Completion, RemoteStore, DEFAULT_WRITE_TIMEOUT};
use crate::types::{Broadcast, Timestamp};
use crossbeam_channel::Receiver;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Broadcast window configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BroadcastConfig {
    /// Max broadcasts kept (the feed is also limited to this).
    /// Default: 10
    pub max_items: usize,

    /// Broadcasts older than this are hidden.
    /// Default: 24 hours
    pub retention: Duration,

    /// Only broadcasts younger than this may pop up.
    /// Default: 5 minutes
    pub popup_window: Duration,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            max_items: 10,
            retention: Duration::from_secs(24 * 60 * 60),
            popup_window: Duration::from_secs(5 * 60),
        }
    }
}

#[derive(Default)]
struct PopupState {
    /// Currently shown, until dismissed.
    displayed: Option<Broadcast>,
    /// Message of the last broadcast that popped up. Survives dismissal.
    last_popped: Option<String>,
}

/// Holds the windowed broadcast view and derives popups.
pub struct BroadcastStore {
    remote: Arc<dyn RemoteStore>,
    collection: String,
    config: BroadcastConfig,
    clock: Arc<dyn Clock>,
    write_timeout: Duration,

    /// Latest windowed snapshot, replaced wholesale.
    broadcasts: RwLock<Arc<Vec<Broadcast>>>,

    /// Also serializes `apply` calls.
    popup: Mutex<PopupState>,
    popups: Listeners<Broadcast>,
    errors: Listeners<FeedError>,
}

impl BroadcastStore {
    pub fn new(remote: Arc<dyn RemoteStore>, collection: impl Into<String>) -> Self {
        Self::with_config(
            remote,
            collection,
            BroadcastConfig::default(),
            Arc::new(SystemClock),
        )
    }

    pub fn with_config(
        remote: Arc<dyn RemoteStore>,
        collection: impl Into<String>,
        config: BroadcastConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            remote,
            collection: collection.into(),
            config,
            clock,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            broadcasts: RwLock::new(Arc::new(Vec::new())),
            popup: Mutex::new(PopupState::default()),
            popups: Listeners::new(),
            errors: Listeners::new(),
        }
    }

    /// Bound attached to every returned [`Completion`].
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn config(&self) -> &BroadcastConfig {
        &self.config
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn within(&self, broadcast: &Broadcast, window: Duration, now: Timestamp) -> bool {
        broadcast.created_at.age_at(now) < window
    }

    // --- Reconciliation ---

    /// Replace the held set with the decode of `snapshot` and decide whether
    /// the newest broadcast pops up. Returns the popup, if one fired.
    pub fn apply(&self, snapshot: &[Document]) -> Option<Broadcast> {
        let now = self.clock.now();

        let mut decoded: Vec<Broadcast> = snapshot
            .iter()
            .filter_map(|doc| match codec::decode_broadcast(doc) {
                Ok(broadcast) => Some(broadcast),
                Err(e) => {
                    warn!(
                        collection = %self.collection,
                        id = %doc.id,
                        error = %e,
                        "dropping malformed broadcast"
                    );
                    None
                }
            })
            .collect();
        decoded.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        decoded.truncate(self.config.max_items);

        let newest = decoded.first().cloned();
        let windowed: Vec<Broadcast> = decoded
            .into_iter()
            .filter(|b| self.within(b, self.config.retention, now))
            .collect();

        let mut popup = self.popup.lock();
        *self.broadcasts.write() = Arc::new(windowed);

        let fired = newest.filter(|b| {
            self.within(b, self.config.popup_window, now)
                && popup.last_popped.as_deref() != Some(b.message.as_str())
        });
        if let Some(broadcast) = &fired {
            info!(collection = %self.collection, id = %broadcast.id, "broadcast popup");
            popup.last_popped = Some(broadcast.message.clone());
            popup.displayed = Some(broadcast.clone());
        }
        drop(popup);

        debug!(
            collection = %self.collection,
            documents = snapshot.len(),
            popup = fired.is_some(),
            "broadcast snapshot applied"
        );

        if let Some(broadcast) = &fired {
            self.popups.emit(broadcast.clone());
        }
        fired
    }

    // --- Reads ---

    /// Broadcasts within the retention window as of now, newest first.
    pub fn recent(&self) -> Vec<Broadcast> {
        let now = self.clock.now();
        self.broadcasts
            .read()
            .iter()
            .filter(|b| self.within(b, self.config.retention, now))
            .cloned()
            .collect()
    }

    /// Popup currently shown, if any.
    pub fn current_popup(&self) -> Option<Broadcast> {
        self.popup.lock().displayed.clone()
    }

    /// Hide the current popup.
    ///
    /// Suppression outlives dismissal: a broadcast with the same message text
    /// stays suppressed until a different message has popped up, even though
    /// nothing is displayed any more.
    pub fn dismiss_popup(&self) -> Option<Broadcast> {
        self.popup.lock().displayed.take()
    }

    /// Stream of popup decisions.
    pub fn subscribe_popups(&self) -> Receiver<Broadcast> {
        self.popups.subscribe()
    }

    /// Stream of feed errors.
    pub fn subscribe_errors(&self) -> Receiver<FeedError> {
        self.errors.subscribe()
    }

    // --- Write-through ---

    /// Publish a new broadcast.
    pub fn publish(&self, message: &str) -> Completion {
        let message = message.trim();
        if message.is_empty() {
            return Completion::ready(Err(FeedError::Validation(
                "broadcast message is required".into(),
            )))
            .bounded(self.write_timeout);
        }

        let broadcast = Broadcast {
            id: Uuid::new_v4().to_string(),
            message: message.to_string(),
            created_at: self.clock.now(),
        };
        debug!(collection = %self.collection, id = %broadcast.id, "publishing broadcast");
        self.remote
            .set_document(
                &self.collection,
                &broadcast.id,
                codec::encode_broadcast(&broadcast),
            )
            .bounded(self.write_timeout)
    }

    pub fn delete(&self, id: &str) -> Completion {
        self.remote
            .delete_document(&self.collection, id)
            .bounded(self.write_timeout)
    }
}

impl SnapshotSink for BroadcastStore {
    fn on_snapshot(&self, documents: Vec<Document>) {
        self.apply(&documents);
    }

    fn on_error(&self, error: FeedError) {
        warn!(collection = %self.collection, error = %error, "broadcast feed error");
        self.errors.emit(error);
    }
}
