//! Reconciled incident set.

use crate::clock::{Clock, SystemClock};
use crate::codec;
use crate::document::Document;
use crate::error::FeedError;
use crate::events::Listeners;
use crate::feed::SnapshotSink;
use crate::filter::{self, FilterCriteria};
use crate::remote::{Completion, RemoteStore, DEFAULT_WRITE_TIMEOUT};
use crate::types::{Incident, IncidentId, NewIncident, Status, Viewer};
use crossbeam_channel::Receiver;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::detector::{StatusTransitionDetector, TransitionEvent};

/// Holds the incidents of the latest snapshot, newest first.
///
/// Only [`IncidentStore::apply`] changes the held set, and it swaps in a
/// whole new set at once, so readers never see half a snapshot. The
/// write-through operations send a mutation to the remote and change
/// nothing locally; their effect shows up with the next snapshot.
pub struct IncidentStore {
    remote: Arc<dyn RemoteStore>,
    collection: String,
    clock: Arc<dyn Clock>,
    write_timeout: Duration,

    /// Current set, replaced wholesale per snapshot.
    incidents: RwLock<Arc<Vec<Incident>>>,

    /// Also serializes `apply` calls.
    detector: Mutex<StatusTransitionDetector>,

    transitions: Listeners<TransitionEvent>,
    /// Latest transition not yet dismissed.
    pending: Mutex<Option<TransitionEvent>>,
    errors: Listeners<FeedError>,
}

impl IncidentStore {
    /// Create an empty store writing to `collection`.
    pub fn new(remote: Arc<dyn RemoteStore>, collection: impl Into<String>) -> Self {
        Self::with_clock(remote, collection, Arc::new(SystemClock))
    }

    pub fn with_clock(
        remote: Arc<dyn RemoteStore>,
        collection: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            remote,
            collection: collection.into(),
            clock,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            incidents: RwLock::new(Arc::new(Vec::new())),
            detector: Mutex::new(StatusTransitionDetector::new()),
            transitions: Listeners::new(),
            pending: Mutex::new(None),
            errors: Listeners::new(),
        }
    }

    /// Bound attached to every returned [`Completion`].
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    // --- Reconciliation ---

    /// Replace the held set with the decode of `snapshot`.
    ///
    /// Documents that fail to decode are skipped. Status changes against the
    /// previous observations are detected before the old set is dropped and
    /// are then published to transition listeners.
    pub fn apply(&self, snapshot: &[Document]) -> Arc<Vec<Incident>> {
        let decoded: Vec<Incident> = snapshot
            .iter()
            .filter_map(|doc| match codec::decode_incident(doc) {
                Ok(incident) => Some(incident),
                Err(e) => {
                    warn!(
                        collection = %self.collection,
                        id = %doc.id,
                        error = %e,
                        "dropping malformed incident"
                    );
                    None
                }
            })
            .collect();

        // Held until the events are out, so concurrent applies publish in
        // the order they observed
        let mut detector = self.detector.lock();
        let transitions = detector.observe(&decoded);
        let next = Arc::new(decoded);
        *self.incidents.write() = Arc::clone(&next);

        debug!(
            collection = %self.collection,
            incidents = next.len(),
            skipped = snapshot.len() - next.len(),
            transitions = transitions.len(),
            "incident snapshot applied"
        );

        for event in transitions {
            *self.pending.lock() = Some(event.clone());
            self.transitions.emit(event);
        }
        drop(detector);
        next
    }

    // --- Reads ---

    /// The current set, newest first.
    pub fn incidents(&self) -> Arc<Vec<Incident>> {
        Arc::clone(&self.incidents.read())
    }

    pub fn get(&self, id: IncidentId) -> Option<Incident> {
        self.incidents.read().iter().find(|i| i.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.incidents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Filtered view of the current set.
    pub fn visible(&self, criteria: &FilterCriteria, viewer: Option<&Viewer>) -> Vec<Incident> {
        filter::visible(&self.incidents(), criteria, viewer)
    }

    /// Incidents the viewer follows that are still present, newest first.
    pub fn followed_by(&self, viewer: &Viewer) -> Vec<Incident> {
        self.incidents()
            .iter()
            .filter(|i| viewer.follows(i.id))
            .cloned()
            .collect()
    }

    /// Last status the detector recorded for `id`.
    pub fn last_observed_status(&self, id: IncidentId) -> Option<Status> {
        self.detector.lock().last_status(id)
    }

    // --- Notifications ---

    /// Stream of status transitions.
    pub fn subscribe_transitions(&self) -> Receiver<TransitionEvent> {
        self.transitions.subscribe()
    }

    /// Stream of feed errors.
    pub fn subscribe_errors(&self) -> Receiver<FeedError> {
        self.errors.subscribe()
    }

    /// Latest transition not yet dismissed.
    pub fn pending_notification(&self) -> Option<TransitionEvent> {
        self.pending.lock().clone()
    }

    pub fn dismiss_notification(&self) -> Option<TransitionEvent> {
        self.pending.lock().take()
    }

    // --- Write-through ---

    /// Report a new incident on behalf of `reporter`.
    pub fn add_incident(&self, draft: NewIncident, reporter: &Viewer) -> Completion {
        if draft.title.trim().is_empty() {
            return self.bounded(Completion::ready(Err(FeedError::Validation(
                "incident title is required".into(),
            ))));
        }

        let now = self.clock.now();
        let incident = Incident {
            id: IncidentId::new(),
            category: draft.category,
            title: draft.title,
            description: draft.description,
            status: Status::Open,
            created_at: now,
            updated_at: now,
            location: draft.location,
            reporter_id: reporter.id.clone(),
            image_url: draft.image_url,
        };

        debug!(collection = %self.collection, id = %incident.id, "reporting incident");
        self.bounded(self.remote.set_document(
            &self.collection,
            &incident.id.to_string(),
            codec::encode_incident(&incident),
        ))
    }

    pub fn update_status(&self, id: IncidentId, status: Status) -> Completion {
        self.bounded(self.remote.update_fields(
            &self.collection,
            &id.to_string(),
            codec::status_update(status, self.clock.now()),
        ))
    }

    pub fn update_description(&self, id: IncidentId, description: &str) -> Completion {
        self.bounded(self.remote.update_fields(
            &self.collection,
            &id.to_string(),
            codec::description_update(description, self.clock.now()),
        ))
    }

    pub fn delete_incident(&self, id: IncidentId) -> Completion {
        self.bounded(self.remote.delete_document(&self.collection, &id.to_string()))
    }

    fn bounded(&self, completion: Completion) -> Completion {
        completion.bounded(self.write_timeout)
    }
}

impl SnapshotSink for IncidentStore {
    fn on_snapshot(&self, documents: Vec<Document>) {
        self.apply(&documents);
    }

    fn on_error(&self, error: FeedError) {
        // Stale-but-present beats empty: the held set stays
        warn!(collection = %self.collection, error = %error, "incident feed error");
        self.errors.emit(error);
    }
}
