//! Composition root tying the feeds, stores and registry together.

use crate::broadcasts::{BroadcastConfig, BroadcastStore};
use crate::clock::{Clock, SystemClock};
use crate::codec::fields;
use crate::error::{FeedError, Result};
use crate::feed::{FeedSubscriber, ResubscribePolicy, SnapshotSink, DEFAULT_POLL_INTERVAL};
use crate::filter::FilterCriteria;
use crate::follow::{FollowOutcome, FollowRegistry, PreferenceOutcome};
use crate::incidents::IncidentStore;
use crate::remote::{Completion, Direction, Query, RemoteStore, DEFAULT_WRITE_TIMEOUT};
use crate::types::{Category, Incident, IncidentId, NewIncident, Status, Viewer};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Engine configuration.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Default: "incidents"
    pub incidents_collection: String,

    /// Default: "broadcasts"
    pub broadcasts_collection: String,

    /// Default: "users"
    pub users_collection: String,

    /// Bound on every write-through round-trip.
    /// Default: 10s
    pub write_timeout: Duration,

    /// How often feed workers check for cancellation.
    /// Default: 50ms
    pub poll_interval: Duration,

    pub broadcast: BroadcastConfig,

    pub resubscribe: ResubscribePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            incidents_collection: "incidents".to_string(),
            broadcasts_collection: "broadcasts".to_string(),
            users_collection: "users".to_string(),
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            broadcast: BroadcastConfig::default(),
            resubscribe: ResubscribePolicy::default(),
        }
    }
}

/// The feed engine for one signed-in session.
///
/// Owns:
/// - the incident store and its feed (newest first)
/// - the broadcast store and its feed (newest first, limited)
/// - the follow registry and, once a viewer signs in, its document feed
///
/// Constructed explicitly and handed to whatever composes the presentation
/// layer. Dropping it releases every subscription.
pub struct CampusFeed {
    config: EngineConfig,
    remote: Arc<dyn RemoteStore>,
    incidents: Arc<IncidentStore>,
    broadcasts: Arc<BroadcastStore>,
    follows: Arc<FollowRegistry>,
    feeds: Mutex<Vec<FeedSubscriber>>,
    viewer_feed: Mutex<Option<FeedSubscriber>>,
}

impl CampusFeed {
    /// Create an engine on the system clock. Nothing is subscribed yet.
    pub fn new(remote: Arc<dyn RemoteStore>, config: EngineConfig) -> Self {
        Self::with_clock(remote, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        remote: Arc<dyn RemoteStore>,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let incidents = IncidentStore::with_clock(
            Arc::clone(&remote),
            config.incidents_collection.clone(),
            Arc::clone(&clock),
        )
        .with_write_timeout(config.write_timeout);

        let broadcasts = BroadcastStore::with_config(
            Arc::clone(&remote),
            config.broadcasts_collection.clone(),
            config.broadcast,
            clock,
        )
        .with_write_timeout(config.write_timeout);

        let follows = FollowRegistry::new(Arc::clone(&remote), config.users_collection.clone())
            .with_write_timeout(config.write_timeout);

        Self {
            config,
            remote,
            incidents: Arc::new(incidents),
            broadcasts: Arc::new(broadcasts),
            follows: Arc::new(follows),
            feeds: Mutex::new(Vec::new()),
            viewer_feed: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn incidents(&self) -> &Arc<IncidentStore> {
        &self.incidents
    }

    pub fn broadcasts(&self) -> &Arc<BroadcastStore> {
        &self.broadcasts
    }

    pub fn follows(&self) -> &Arc<FollowRegistry> {
        &self.follows
    }

    fn subscribe<S>(&self, query: Query, sink: Arc<S>) -> Result<FeedSubscriber>
    where
        S: SnapshotSink + 'static,
    {
        FeedSubscriber::start(
            Arc::clone(&self.remote),
            query,
            sink,
            self.config.resubscribe,
            self.config.poll_interval,
        )
    }

    /// Open the incident and broadcast feeds. Calling it again is a no-op.
    pub fn start(&self) -> Result<()> {
        let mut feeds = self.feeds.lock();
        if !feeds.is_empty() {
            return Ok(());
        }

        let incidents = self.subscribe(
            Query::collection(self.config.incidents_collection.clone())
                .order_by(fields::CREATED_AT, Direction::Descending),
            Arc::clone(&self.incidents),
        )?;
        let broadcasts = self.subscribe(
            Query::collection(self.config.broadcasts_collection.clone())
                .order_by(fields::CREATED_AT, Direction::Descending)
                .limit(self.config.broadcast.max_items),
            Arc::clone(&self.broadcasts),
        )?;

        feeds.push(incidents);
        feeds.push(broadcasts);
        info!("campus feeds started");
        Ok(())
    }

    /// Install `viewer` and follow its remote document from now on.
    ///
    /// The viewer stays unconfirmed until its document feed delivers; toggles
    /// issued before that wait for it.
    pub fn sign_in(&self, viewer: Viewer) -> Result<()> {
        let query = Query::document(self.config.users_collection.clone(), viewer.id.clone());
        debug!(viewer = %viewer.id, "signing in");

        // The previous viewer's feed must not deliver into the new session
        let previous = self.viewer_feed.lock().take();
        if let Some(feed) = previous {
            feed.cancel();
        }
        self.follows.set_viewer(Some(viewer));

        let feed = self.subscribe(query, Arc::clone(&self.follows))?;
        *self.viewer_feed.lock() = Some(feed);
        Ok(())
    }

    /// Release the viewer feed and forget the viewer.
    pub fn sign_out(&self) {
        let feed = self.viewer_feed.lock().take();
        if let Some(feed) = feed {
            feed.cancel();
        }
        self.follows.set_viewer(None);
    }

    /// Release every subscription. Safe to call repeatedly.
    pub fn shutdown(&self) {
        let feeds = std::mem::take(&mut *self.feeds.lock());
        for feed in &feeds {
            feed.cancel();
        }
        let viewer_feed = self.viewer_feed.lock().take();
        if let Some(feed) = viewer_feed {
            feed.cancel();
        }
        if !feeds.is_empty() {
            info!("campus feeds stopped");
        }
    }

    pub fn viewer(&self) -> Option<Arc<Viewer>> {
        self.follows.viewer()
    }

    fn require_viewer(&self) -> Result<Arc<Viewer>> {
        self.viewer().ok_or(FeedError::NoViewer)
    }

    fn require_admin(&self) -> Result<Arc<Viewer>> {
        let viewer = self.require_viewer()?;
        if viewer.is_admin() {
            Ok(viewer)
        } else {
            Err(FeedError::NotAuthorized)
        }
    }

    fn gated(&self, check: Result<Arc<Viewer>>, op: impl FnOnce() -> Completion) -> Completion {
        match check {
            Ok(_) => op(),
            Err(e) => Completion::ready(Err(e)).bounded(self.config.write_timeout),
        }
    }

    // --- Views ---

    /// The current incident list as filtered for the signed-in viewer.
    pub fn visible(&self, criteria: &FilterCriteria) -> Vec<Incident> {
        let viewer = self.viewer();
        self.incidents.visible(criteria, viewer.as_deref())
    }

    // --- Write-through ---

    /// Report an incident as the signed-in viewer.
    pub fn report_incident(&self, draft: NewIncident) -> Completion {
        match self.require_viewer() {
            Ok(viewer) => self.incidents.add_incident(draft, &viewer),
            Err(e) => Completion::ready(Err(e)).bounded(self.config.write_timeout),
        }
    }

    /// Administrators only.
    pub fn update_status(&self, id: IncidentId, status: Status) -> Completion {
        self.gated(self.require_admin(), || self.incidents.update_status(id, status))
    }

    /// Administrators only.
    pub fn update_description(&self, id: IncidentId, description: &str) -> Completion {
        self.gated(self.require_admin(), || {
            self.incidents.update_description(id, description)
        })
    }

    /// Administrators only.
    pub fn delete_incident(&self, id: IncidentId) -> Completion {
        self.gated(self.require_admin(), || self.incidents.delete_incident(id))
    }

    /// Administrators only.
    pub fn publish_broadcast(&self, message: &str) -> Completion {
        self.gated(self.require_admin(), || self.broadcasts.publish(message))
    }

    /// Administrators only.
    pub fn delete_broadcast(&self, id: &str) -> Completion {
        self.gated(self.require_admin(), || self.broadcasts.delete(id))
    }

    /// Toggles are serialized and each builds on the last confirmed set.
    pub fn toggle_follow(&self, id: IncidentId) -> Result<FollowOutcome> {
        let viewer = self.require_viewer()?;
        self.follows.toggle_follow(id, &viewer)
    }

    pub fn toggle_notification_preference(&self, category: Category) -> Result<PreferenceOutcome> {
        let viewer = self.require_viewer()?;
        self.follows.toggle_notification_preference(category, &viewer)
    }
}

impl Drop for CampusFeed {
    fn drop(&mut self) {
        self.shutdown();
    }
}
