//! Types shared by every remote store implementation.

use crate::document::Document;
use crate::error::{FeedError, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Bound applied by [`Completion::wait`] when no explicit timeout was attached.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Sort direction of a query.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Ascending,
    Descending,
}

/// A subscribed query over one collection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Query {
    pub collection: String,

    /// Field to order by. Documents lacking it are not part of the result.
    pub order_by: Option<String>,

    pub direction: Direction,

    /// Max documents per snapshot (None = unlimited).
    pub limit: Option<usize>,

    /// Restrict to a single document.
    pub document_id: Option<String>,
}

impl Query {
    /// Every document of a collection, in id order.
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            collection: name.into(),
            order_by: None,
            direction: Direction::Ascending,
            limit: None,
            document_id: None,
        }
    }

    /// A single document of a collection.
    pub fn document(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            document_id: Some(id.into()),
            ..Self::collection(collection)
        }
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some(field.into());
        self.direction = direction;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Events delivered on a subscription.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedEvent {
    /// Complete, ordered result set of the query. Replaces any earlier one.
    Snapshot { documents: Vec<Document> },

    /// Out-of-band delivery error. The subscription stays open.
    Error { message: String },

    /// The subscription ended.
    Dropped { reason: DropReason },
}

/// Why a subscription was dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// Connection to the remote went away.
    Disconnected,
    /// Explicitly cancelled.
    Unsubscribed,
}

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

type Canceller = Box<dyn FnOnce() + Send>;

/// Handle to a live subscription.
///
/// Cancelling is idempotent and also happens on drop.
pub struct SubscriptionHandle {
    pub id: SubscriptionId,
    /// Channel to receive events.
    pub receiver: Receiver<FeedEvent>,
    canceller: Mutex<Option<Canceller>>,
}

impl SubscriptionHandle {
    pub fn new(
        id: SubscriptionId,
        receiver: Receiver<FeedEvent>,
        cancel: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            id,
            receiver,
            canceller: Mutex::new(Some(Box::new(cancel))),
        }
    }

    /// Release the subscription. Safe to call any number of times.
    pub fn cancel(&self) {
        let canceller = self.canceller.lock().take();
        if let Some(cancel) = canceller {
            cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.canceller.lock().is_none()
    }

    /// Receive the next event (blocking).
    pub fn recv(&self) -> std::result::Result<FeedEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> std::result::Result<FeedEvent, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> std::result::Result<FeedEvent, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Producer side of a [`Completion`].
#[derive(Debug)]
pub struct CompletionSender(Sender<Result<()>>);

impl CompletionSender {
    /// Resolve the completion. Resolving after the waiter went away is fine.
    pub fn complete(self, result: Result<()>) {
        let _ = self.0.send(result);
    }
}

/// Pending outcome of a write-through operation.
///
/// Waiting is always bounded: either by an explicit timeout or by the one
/// attached with [`Completion::bounded`] (default [`DEFAULT_WRITE_TIMEOUT`]).
#[derive(Debug)]
#[must_use = "a write-through outcome is only observable through its Completion"]
pub struct Completion {
    receiver: Receiver<Result<()>>,
    timeout: Duration,
}

impl Completion {
    /// A completion resolved later through the returned sender.
    pub fn pending() -> (CompletionSender, Completion) {
        let (tx, rx) = bounded(1);
        (
            CompletionSender(tx),
            Completion {
                receiver: rx,
                timeout: DEFAULT_WRITE_TIMEOUT,
            },
        )
    }

    /// An already-resolved completion.
    pub fn ready(result: Result<()>) -> Self {
        let (tx, completion) = Self::pending();
        tx.complete(result);
        completion
    }

    /// Attach the bound used by [`Completion::wait`].
    pub fn bounded(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Block until the remote answers or the attached bound elapses.
    pub fn wait(self) -> Result<()> {
        let timeout = self.timeout;
        self.wait_timeout(timeout)
    }

    /// Block until the remote answers or `timeout` elapses.
    pub fn wait_timeout(self, timeout: Duration) -> Result<()> {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(FeedError::Timeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(FeedError::RemoteUnavailable),
        }
    }

    /// Non-blocking check. `None` while still pending.
    pub fn try_result(&self) -> Option<Result<()>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(FeedError::RemoteUnavailable)),
        }
    }
}
