//! Viewer identity, follows and notification preferences.
//!
//! Every change is a full-set replacement sent to the remote. A signed-in
//! viewer starts out unconfirmed: toggles wait until the viewer document
//! feed has delivered once, so a full-set write never starts from a copy
//! the remote has not seen. The local copy changes only after the remote
//! confirmed a write, and the viewer document feed overrides it again
//! whenever a snapshot arrives.

use crate::codec;
use crate::document::Document;
use crate::error::{FeedError, Result};
use crate::events::Listeners;
use crate::feed::SnapshotSink;
use crate::remote::{RemoteStore, DEFAULT_WRITE_TIMEOUT};
use crate::types::{Category, IncidentId, Viewer};
use crossbeam_channel::Receiver;
use parking_lot::{Condvar, Mutex};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Result of a confirmed follow toggle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FollowOutcome {
    pub incident_id: IncidentId,
    /// True if the incident is now followed.
    pub following: bool,
    /// The follow set the remote accepted.
    pub followed_incident_ids: Vec<IncidentId>,
}

/// Result of a confirmed notification preference toggle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreferenceOutcome {
    pub category: Category,
    /// True if the category is now subscribed.
    pub enabled: bool,
    pub notification_categories: BTreeSet<Category>,
}

#[derive(Default)]
struct ViewerSlot {
    viewer: Option<Arc<Viewer>>,
    /// Set once the viewer document feed delivered for this viewer.
    confirmed: bool,
}

/// Owns the local copy of the signed-in viewer.
pub struct FollowRegistry {
    remote: Arc<dyn RemoteStore>,
    collection: String,
    write_timeout: Duration,
    slot: Mutex<ViewerSlot>,
    /// Signalled whenever the slot's viewer or confirmation changes.
    confirmed: Condvar,
    /// Held across read-base, remote write and local confirm of a toggle.
    toggle_lock: Mutex<()>,
    changes: Listeners<Arc<Viewer>>,
    errors: Listeners<FeedError>,
}

impl FollowRegistry {
    pub fn new(remote: Arc<dyn RemoteStore>, collection: impl Into<String>) -> Self {
        Self {
            remote,
            collection: collection.into(),
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            slot: Mutex::new(ViewerSlot::default()),
            confirmed: Condvar::new(),
            toggle_lock: Mutex::new(()),
            changes: Listeners::new(),
            errors: Listeners::new(),
        }
    }

    /// Bound on each remote round-trip, and on waiting for the first
    /// viewer snapshot before a toggle.
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// The signed-in viewer. Confirmed or not, see [`FollowRegistry::is_confirmed`].
    pub fn viewer(&self) -> Option<Arc<Viewer>> {
        self.slot.lock().viewer.clone()
    }

    /// True once the viewer document feed has delivered for the current viewer.
    pub fn is_confirmed(&self) -> bool {
        let slot = self.slot.lock();
        slot.viewer.is_some() && slot.confirmed
    }

    /// Install a viewer (sign-in) or clear it (sign-out).
    ///
    /// A new viewer is unconfirmed until [`FollowRegistry::apply`] sees its
    /// document feed.
    pub fn set_viewer(&self, viewer: Option<Viewer>) {
        let viewer = viewer.map(Arc::new);
        {
            let mut slot = self.slot.lock();
            slot.viewer = viewer.clone();
            slot.confirmed = false;
        }
        self.confirmed.notify_all();
        if let Some(viewer) = viewer {
            self.changes.emit(viewer);
        }
    }

    /// Stream of viewer updates.
    pub fn subscribe_changes(&self) -> Receiver<Arc<Viewer>> {
        self.changes.subscribe()
    }

    /// Stream of viewer feed errors.
    pub fn subscribe_errors(&self) -> Receiver<FeedError> {
        self.errors.subscribe()
    }

    /// Replace the local viewer from a viewer document snapshot.
    ///
    /// Confirms the current viewer. An empty snapshot (document missing)
    /// keeps the current copy, since there is no remote set to lose. A
    /// document for another viewer id is ignored.
    pub fn apply(&self, snapshot: &[Document]) -> Option<Arc<Viewer>> {
        let mut slot = self.slot.lock();
        let current_id = slot.viewer.as_ref().map(|v| v.id.clone());

        let applied = match (snapshot.first(), current_id) {
            (_, None) => {
                debug!(collection = %self.collection, "viewer snapshot without signed-in viewer");
                return None;
            }
            (None, Some(id)) => {
                warn!(collection = %self.collection, %id, "viewer document not found");
                None
            }
            (Some(doc), Some(id)) if doc.id != id => {
                debug!(
                    collection = %self.collection,
                    stale = %doc.id,
                    "snapshot for another viewer"
                );
                return slot.viewer.clone();
            }
            (Some(doc), Some(_)) => {
                let viewer = Arc::new(codec::decode_viewer(doc));
                slot.viewer = Some(Arc::clone(&viewer));
                Some(viewer)
            }
        };
        slot.confirmed = true;
        let current = slot.viewer.clone();
        drop(slot);
        self.confirmed.notify_all();

        if let Some(viewer) = applied {
            debug!(collection = %self.collection, id = %viewer.id, "viewer snapshot applied");
            self.changes.emit(viewer);
        }
        current
    }

    /// The confirmed copy of `viewer_id`, waiting up to the write timeout for
    /// its first snapshot.
    fn confirmed_base(&self, viewer_id: &str) -> Result<Arc<Viewer>> {
        let deadline = Instant::now() + self.write_timeout;
        let mut slot = self.slot.lock();
        loop {
            let current = match slot.viewer.as_ref() {
                Some(v) if v.id == viewer_id => Arc::clone(v),
                _ => return Err(FeedError::NoViewer),
            };
            if slot.confirmed {
                return Ok(current);
            }
            if self.confirmed.wait_until(&mut slot, deadline).timed_out() {
                warn!(viewer = %viewer_id, "viewer document never arrived");
                return Err(FeedError::Timeout(self.write_timeout));
            }
        }
    }

    /// Follow `incident_id` if `viewer` does not follow it, unfollow otherwise.
    ///
    /// `viewer` must be the signed-in viewer. The base set is the registry's
    /// confirmed copy, read after earlier toggles finished, not the
    /// caller's copy. Blocks until the remote answers (bounded by the write
    /// timeout). On failure nothing local changes.
    pub fn toggle_follow(&self, incident_id: IncidentId, viewer: &Viewer) -> Result<FollowOutcome> {
        let _guard = self.toggle_lock.lock();
        let base = self.confirmed_base(&viewer.id)?;

        let mut next = base.followed_incident_ids.clone();
        let following = match next.iter().position(|id| *id == incident_id) {
            Some(index) => {
                next.remove(index);
                false
            }
            None => {
                next.push(incident_id);
                true
            }
        };

        self.remote
            .update_fields(&self.collection, &base.id, codec::follow_set_update(&next))
            .wait_timeout(self.write_timeout)
            .map_err(|e| {
                warn!(viewer = %base.id, incident = %incident_id, error = %e, "follow rejected");
                e
            })?;

        self.confirm(&base.id, |v| v.followed_incident_ids = next.clone());
        Ok(FollowOutcome {
            incident_id,
            following,
            followed_incident_ids: next,
        })
    }

    /// Subscribe to `category` if unsubscribed, unsubscribe otherwise.
    ///
    /// Same base set, full-set replacement and failure semantics as
    /// [`FollowRegistry::toggle_follow`].
    pub fn toggle_notification_preference(
        &self,
        category: Category,
        viewer: &Viewer,
    ) -> Result<PreferenceOutcome> {
        let _guard = self.toggle_lock.lock();
        let base = self.confirmed_base(&viewer.id)?;

        let mut next = base.notification_categories.clone();
        let enabled = if next.remove(&category) {
            false
        } else {
            next.insert(category);
            true
        };

        self.remote
            .update_fields(&self.collection, &base.id, codec::notification_set_update(&next))
            .wait_timeout(self.write_timeout)
            .map_err(|e| {
                warn!(viewer = %base.id, %category, error = %e, "preference update rejected");
                e
            })?;

        self.confirm(&base.id, |v| v.notification_categories = next.clone());
        Ok(PreferenceOutcome {
            category,
            enabled,
            notification_categories: next,
        })
    }

    /// Apply a remote-confirmed change to the local copy of the same viewer.
    fn confirm(&self, viewer_id: &str, change: impl FnOnce(&mut Viewer)) {
        let mut slot = self.slot.lock();
        let next = match slot.viewer.as_ref() {
            Some(current) if current.id == viewer_id => {
                let mut next = Viewer::clone(current);
                change(&mut next);
                Arc::new(next)
            }
            _ => return,
        };
        slot.viewer = Some(Arc::clone(&next));
        drop(slot);
        self.changes.emit(next);
    }
}

impl SnapshotSink for FollowRegistry {
    fn on_snapshot(&self, documents: Vec<Document>) {
        self.apply(&documents);
    }

    fn on_error(&self, error: FeedError) {
        warn!(collection = %self.collection, error = %error, "viewer feed error");
        self.errors.emit(error);
    }
}
