//! Change-feed subscriber.
//!
//! Wraps one remote subscription in a worker thread that hands every
//! delivered snapshot to a [`SnapshotSink`], serially and in delivery order.
//! Snapshots are full replacements of the queried set, so the sink never
//! needs to remember earlier deliveries.
//!
//! Error policy:
//! - a feed `Error` event is logged, forwarded to the sink and the
//!   subscription continues
//! - a dropped subscription (overflow, disconnect) is re-opened according to
//!   [`ResubscribePolicy`]; giving up is reported to the sink as
//!   [`FeedError::SubscriptionDropped`] and local state stays as it was
//! - explicit cancellation is never retried

use crate::document::Document;
use crate::error::{FeedError, Result};
use crate::remote::{DropReason, FeedEvent, Query, RemoteStore, SubscriptionHandle};
use crossbeam_channel::RecvTimeoutError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Default interval at which the worker checks for cancellation.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Consumer of a change feed.
pub trait SnapshotSink: Send + Sync {
    /// A complete, ordered result set. Authoritative for the queried subset.
    fn on_snapshot(&self, documents: Vec<Document>);

    /// An out-of-band feed error. Default: ignore.
    fn on_error(&self, error: FeedError) {
        let _ = error;
    }
}

/// How a dropped subscription is re-opened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResubscribePolicy {
    /// Consecutive attempts before giving up. Reset by every snapshot.
    pub max_attempts: u32,
    /// Pause before each attempt.
    pub backoff: Duration,
}

impl Default for ResubscribePolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(250),
        }
    }
}

impl ResubscribePolicy {
    /// Never re-subscribe.
    pub fn never() -> Self {
        Self {
            max_attempts: 0,
            backoff: Duration::ZERO,
        }
    }
}

struct Running {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// A long-lived subscription feeding one sink.
///
/// Cancelled explicitly with [`FeedSubscriber::cancel`] or on drop;
/// cancelling twice is a no-op.
pub struct FeedSubscriber {
    query: Query,
    running: Mutex<Option<Running>>,
}

impl FeedSubscriber {
    /// Subscribe to `query` and start delivering to `sink`.
    pub fn start(
        remote: Arc<dyn RemoteStore>,
        query: Query,
        sink: Arc<dyn SnapshotSink>,
        policy: ResubscribePolicy,
        poll_interval: Duration,
    ) -> Result<Self> {
        // Subscribed before returning, so the first snapshot is already queued
        let handle = remote.subscribe(query.clone());
        let stop = Arc::new(AtomicBool::new(false));
        let worker = Worker {
            remote,
            query: query.clone(),
            sink,
            policy,
            poll_interval: poll_interval.max(Duration::from_millis(1)),
            stop: Arc::clone(&stop),
        };

        let thread = thread::Builder::new()
            .name(format!("feed-{}", query.collection))
            .spawn(move || worker.run(handle))
            .map_err(|e| FeedError::Feed(format!("failed to start feed worker: {e}")))?;

        Ok(Self {
            query,
            running: Mutex::new(Some(Running { stop, thread })),
        })
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    /// True while the worker is still delivering.
    pub fn is_active(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .map(|r| !r.thread.is_finished())
            .unwrap_or(false)
    }

    /// Stop delivery and release the remote subscription.
    pub fn cancel(&self) {
        let running = self.running.lock().take();
        let Some(running) = running else {
            return;
        };
        running.stop.store(true, Ordering::Release);

        // A sink cancelling its own feed cannot wait for itself
        if running.thread.thread().id() == thread::current().id() {
            return;
        }
        if running.thread.join().is_err() {
            warn!(collection = %self.query.collection, "feed worker panicked");
        }
    }
}

impl Drop for FeedSubscriber {
    fn drop(&mut self) {
        self.cancel();
    }
}

struct Worker {
    remote: Arc<dyn RemoteStore>,
    query: Query,
    sink: Arc<dyn SnapshotSink>,
    policy: ResubscribePolicy,
    poll_interval: Duration,
    stop: Arc<AtomicBool>,
}

impl Worker {
    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    fn run(self, mut handle: SubscriptionHandle) {
        let collection = self.query.collection.as_str();
        let mut attempts = 0u32;

        while !self.stopped() {
            let event = match handle.recv_timeout(self.poll_interval) {
                Ok(event) => event,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => FeedEvent::Dropped {
                    reason: DropReason::Disconnected,
                },
            };

            match event {
                FeedEvent::Snapshot { documents } => {
                    attempts = 0;
                    debug!(collection, documents = documents.len(), "snapshot delivered");
                    self.sink.on_snapshot(documents);
                }
                FeedEvent::Error { message } => {
                    warn!(collection, error = %message, "feed reported an error");
                    self.sink.on_error(FeedError::Feed(message));
                }
                FeedEvent::Dropped { reason } => {
                    if self.stopped() || reason == DropReason::Unsubscribed {
                        break;
                    }
                    if attempts >= self.policy.max_attempts {
                        warn!(collection, ?reason, attempts, "subscription lost, giving up");
                        self.sink
                            .on_error(FeedError::SubscriptionDropped(format!("{reason:?}")));
                        break;
                    }
                    attempts += 1;
                    warn!(collection, ?reason, attempt = attempts, "re-subscribing");
                    if !self.pause(self.policy.backoff) {
                        break;
                    }
                    handle.cancel();
                    handle = self.remote.subscribe(self.query.clone());
                }
            }
        }

        handle.cancel();
        debug!(collection, "feed worker stopped");
    }

    /// Sleep for `d` in poll-sized steps. False if cancelled meanwhile.
    fn pause(&self, d: Duration) -> bool {
        let deadline = Instant::now() + d;
        loop {
            if self.stopped() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep((deadline - now).min(self.poll_interval));
        }
    }
}
