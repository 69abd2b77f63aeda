//! In-process remote store.

use crate::document::{Document, Fields};
use crate::error::{FeedError, Result};
use crossbeam_channel::{bounded, Sender};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use super::types::{
    Completion, CompletionSender, Direction, DropReason, FeedEvent, Query, SubscriptionHandle,
    SubscriptionId,
};
use super::RemoteStore;

/// Default number of buffered events per subscription.
const DEFAULT_BUFFER_SIZE: usize = 64;

type Collection = BTreeMap<String, Fields>;

/// Internal subscription state.
struct Subscription {
    query: Query,
    sender: Sender<FeedEvent>,
}

impl Subscription {
    /// Try to send an event. Returns false if the buffer is full or the
    /// receiver is gone (subscriber will be dropped).
    fn try_send(&self, event: FeedEvent) -> bool {
        self.sender.try_send(event).is_ok()
    }
}

/// Injected failure modes.
#[derive(Default)]
struct Faults {
    /// Reject every write with this message.
    reject: Option<String>,
    /// Park writes without answering.
    hold: bool,
    held: Vec<CompletionSender>,
}

struct Inner {
    collections: RwLock<HashMap<String, Collection>>,
    subscriptions: RwLock<HashMap<SubscriptionId, Subscription>>,
    next_id: AtomicU64,
    buffer_size: usize,
    faults: Mutex<Faults>,
}

impl Inner {
    fn unsubscribe(&self, id: SubscriptionId) {
        let mut subs = self.subscriptions.write();
        if let Some(sub) = subs.remove(&id) {
            // Best effort
            let _ = sub.sender.try_send(FeedEvent::Dropped {
                reason: DropReason::Unsubscribed,
            });
            debug!(subscription = id.0, "subscription released");
        }
    }

    /// Push a fresh snapshot to every subscription on `collection`. Drops
    /// subscribers that fail to receive.
    fn fan_out(&self, collection: &str, docs: &Collection) {
        let mut to_remove = Vec::new();

        {
            let subs = self.subscriptions.read();
            for (id, sub) in subs.iter() {
                if sub.query.collection == collection {
                    let documents = evaluate(docs, &sub.query);
                    if !sub.try_send(FeedEvent::Snapshot { documents }) {
                        to_remove.push(*id);
                    }
                }
            }
        }

        if !to_remove.is_empty() {
            let mut subs = self.subscriptions.write();
            for id in to_remove {
                if let Some(sub) = subs.remove(&id) {
                    // Might not fit; the receiver sees a disconnect either way
                    let _ = sub.sender.try_send(FeedEvent::Dropped {
                        reason: DropReason::BufferOverflow,
                    });
                    debug!(subscription = id.0, "slow subscriber dropped");
                }
            }
        }
    }

    /// Returns a completion when an injected fault short-circuits the write.
    fn intercept_write(&self) -> Option<Completion> {
        let mut faults = self.faults.lock();
        if faults.hold {
            let (tx, completion) = Completion::pending();
            faults.held.push(tx);
            return Some(completion);
        }
        faults
            .reject
            .as_ref()
            .map(|message| Completion::ready(Err(FeedError::Rejected(message.clone()))))
    }

    fn write<F>(&self, collection: &str, op: F) -> Completion
    where
        F: FnOnce(&mut Collection) -> Result<()>,
    {
        if let Some(completion) = self.intercept_write() {
            return completion;
        }

        // Held across fan-out so snapshots go out in write order
        let mut collections = self.collections.write();
        let docs = collections.entry(collection.to_string()).or_default();
        if let Err(e) = op(docs) {
            return Completion::ready(Err(e));
        }
        self.fan_out(collection, docs);
        Completion::ready(Ok(()))
    }
}

/// Evaluate a query against one collection.
fn evaluate(docs: &Collection, query: &Query) -> Vec<Document> {
    let mut out: Vec<Document> = docs
        .iter()
        .filter(|(id, _)| match &query.document_id {
            Some(wanted) => *id == wanted,
            None => true,
        })
        .filter(|(_, fields)| match &query.order_by {
            Some(field) => fields.contains_key(field),
            None => true,
        })
        .map(|(id, fields)| Document::from_fields(id.clone(), fields.clone()))
        .collect();

    if let Some(field) = &query.order_by {
        // Ties keep id order (the map's order) thanks to the stable sort
        out.sort_by(|a, b| {
            let ord = match (a.get(field), b.get(field)) {
                (Some(x), Some(y)) => x.cmp_for_query(y),
                _ => std::cmp::Ordering::Equal,
            };
            match query.direction {
                Direction::Ascending => ord,
                Direction::Descending => ord.reverse(),
            }
        });
    }

    if let Some(limit) = query.limit {
        out.truncate(limit);
    }
    out
}

/// A remote store living in process memory.
///
/// Every write is applied synchronously and followed by a full snapshot to
/// each subscription on the written collection. Cloning shares the store.
#[derive(Clone)]
pub struct MemoryRemote {
    inner: Arc<Inner>,
}

impl MemoryRemote {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    /// Create an empty store with a custom per-subscription buffer.
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                collections: RwLock::new(HashMap::new()),
                subscriptions: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                buffer_size: buffer_size.max(1),
                faults: Mutex::new(Faults::default()),
            }),
        }
    }

    /// Get subscription count.
    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.read().len()
    }

    /// Read one document.
    pub fn document(&self, collection: &str, id: &str) -> Option<Document> {
        self.inner
            .collections
            .read()
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|fields| Document::from_fields(id, fields.clone()))
    }

    /// All documents of a collection, in id order.
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.inner
            .collections
            .read()
            .get(collection)
            .map(|docs| evaluate(docs, &Query::collection(collection)))
            .unwrap_or_default()
    }

    /// Insert documents as-is, bypassing faults and validation. Subscribers
    /// receive one snapshot for the whole batch.
    pub fn seed(&self, collection: &str, documents: impl IntoIterator<Item = Document>) {
        let mut collections = self.inner.collections.write();
        let docs = collections.entry(collection.to_string()).or_default();
        for doc in documents {
            docs.insert(doc.id, doc.fields);
        }
        self.inner.fan_out(collection, docs);
    }

    /// Seed a collection from a JSON array of documents.
    pub fn seed_json(&self, collection: &str, json: &str) -> Result<usize> {
        let documents: Vec<Document> = serde_json::from_str(json)?;
        let count = documents.len();
        self.seed(collection, documents);
        Ok(count)
    }

    /// Dump a collection as a JSON array of documents.
    pub fn export_json(&self, collection: &str) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.documents(collection))?)
    }

    // --- Fault Injection ---

    /// Reject every subsequent write with `message` (None = accept again).
    pub fn reject_writes(&self, message: Option<&str>) {
        self.inner.faults.lock().reject = message.map(str::to_string);
    }

    /// Park subsequent writes without applying or answering them.
    pub fn hold_writes(&self, hold: bool) {
        self.inner.faults.lock().hold = hold;
    }

    /// Answer every parked write with `result`. Parked writes are never
    /// applied. Returns how many were answered.
    pub fn release_held(&self, result: Result<()>) -> usize {
        let held = std::mem::take(&mut self.inner.faults.lock().held);
        let count = held.len();
        for tx in held {
            tx.complete(result.clone());
        }
        count
    }

    /// Deliver an out-of-band error to every subscription on `collection`.
    pub fn inject_feed_error(&self, collection: &str, message: &str) {
        let subs = self.inner.subscriptions.read();
        for sub in subs.values().filter(|s| s.query.collection == collection) {
            let _ = sub.try_send(FeedEvent::Error {
                message: message.to_string(),
            });
        }
    }

    /// Simulate a dropped connection: every subscription ends.
    pub fn disconnect_all(&self) {
        let mut subs = self.inner.subscriptions.write();
        for (_, sub) in subs.drain() {
            let _ = sub.sender.try_send(FeedEvent::Dropped {
                reason: DropReason::Disconnected,
            });
        }
    }
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteStore for MemoryRemote {
    fn subscribe(&self, query: Query) -> SubscriptionHandle {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(self.inner.buffer_size);

        {
            // Read lock keeps writers out until the initial snapshot is queued
            let collections = self.inner.collections.read();
            let initial = collections
                .get(&query.collection)
                .map(|docs| evaluate(docs, &query))
                .unwrap_or_default();
            let mut subs = self.inner.subscriptions.write();
            let _ = sender.try_send(FeedEvent::Snapshot { documents: initial });
            subs.insert(id, Subscription { query, sender });
        }

        let weak = Arc::downgrade(&self.inner);
        SubscriptionHandle::new(id, receiver, move || {
            // No-op once the store itself is gone
            if let Some(inner) = weak.upgrade() {
                inner.unsubscribe(id);
            }
        })
    }

    fn set_document(&self, collection: &str, id: &str, fields: Fields) -> Completion {
        self.inner.write(collection, |docs| {
            docs.insert(id.to_string(), fields);
            Ok(())
        })
    }

    fn update_fields(&self, collection: &str, id: &str, fields: Fields) -> Completion {
        self.inner.write(collection, |docs| match docs.get_mut(id) {
            Some(existing) => {
                existing.extend(fields);
                Ok(())
            }
            None => Err(FeedError::NotFound(format!("{collection}/{id}"))),
        })
    }

    fn delete_document(&self, collection: &str, id: &str) -> Completion {
        self.inner.write(collection, |docs| {
            docs.remove(id);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Timestamp;
    use std::time::Duration;

    fn snapshot(handle: &SubscriptionHandle) -> Vec<Document> {
        match handle.recv_timeout(Duration::from_millis(100)).unwrap() {
            FeedEvent::Snapshot { documents } => documents,
            other => panic!("Expected Snapshot event, got {:?}", other),
        }
    }

    fn doc(id: &str, secs: i64) -> Document {
        Document::new(id).with("created_at", Timestamp::from_secs(secs))
    }

    #[test]
    fn test_subscribe_unsubscribe() {
        let remote = MemoryRemote::new();

        let handle = remote.subscribe(Query::collection("incidents"));
        assert_eq!(remote.subscription_count(), 1);
        assert!(snapshot(&handle).is_empty());

        handle.cancel();
        assert_eq!(remote.subscription_count(), 0);
        handle.cancel();
    }

    #[test]
    fn test_cancel_after_store_dropped() {
        let remote = MemoryRemote::new();
        let handle = remote.subscribe(Query::collection("incidents"));
        drop(remote);
        handle.cancel();
        assert!(handle.is_cancelled());
    }

    #[test]
    fn test_snapshot_ordering_and_limit() {
        let remote = MemoryRemote::new();
        remote.seed("broadcasts", vec![doc("a", 1), doc("b", 3), doc("c", 2)]);
        remote.seed("broadcasts", vec![Document::new("no-timestamp")]);

        let handle = remote.subscribe(
            Query::collection("broadcasts")
                .order_by("created_at", Direction::Descending)
                .limit(2),
        );

        let ids: Vec<_> = snapshot(&handle).into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn test_write_fans_out_full_snapshot() {
        let remote = MemoryRemote::new();
        let handle = remote.subscribe(Query::collection("incidents"));
        let other = remote.subscribe(Query::collection("broadcasts"));
        snapshot(&handle);
        snapshot(&other);

        remote
            .set_document("incidents", "x", Fields::new())
            .wait()
            .unwrap();
        remote
            .set_document("incidents", "y", Fields::new())
            .wait()
            .unwrap();

        assert_eq!(snapshot(&handle).len(), 1);
        assert_eq!(snapshot(&handle).len(), 2);
        // Other collections are untouched
        assert!(other.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn test_document_query() {
        let remote = MemoryRemote::new();
        remote.seed("users", vec![Document::new("u1"), Document::new("u2")]);
        let handle = remote.subscribe(Query::document("users", "u2"));
        let docs = snapshot(&handle);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, "u2");
    }

    #[test]
    fn test_update_missing_document_fails() {
        let remote = MemoryRemote::new();
        let result = remote.update_fields("users", "ghost", Fields::new()).wait();
        assert!(matches!(result, Err(FeedError::NotFound(_))));
    }

    #[test]
    fn test_rejected_writes_leave_store_untouched() {
        let remote = MemoryRemote::new();
        remote.reject_writes(Some("permission denied"));
        let result = remote.set_document("incidents", "x", Fields::new()).wait();
        assert_eq!(result, Err(FeedError::Rejected("permission denied".into())));
        assert!(remote.document("incidents", "x").is_none());

        remote.reject_writes(None);
        assert!(remote.set_document("incidents", "x", Fields::new()).wait().is_ok());
    }

    #[test]
    fn test_held_writes() {
        let remote = MemoryRemote::new();
        remote.hold_writes(true);
        let completion = remote.delete_document("incidents", "x");
        assert!(completion.try_result().is_none());
        assert_eq!(remote.release_held(Ok(())), 1);
        assert_eq!(completion.wait(), Ok(()));
    }

    #[test]
    fn test_drop_slow_subscriber() {
        let remote = MemoryRemote::with_buffer_size(2);
        let _handle = remote.subscribe(Query::collection("incidents"));

        // Flood with writes
        for i in 0..10 {
            let _ = remote.set_document("incidents", &format!("d{i}"), Fields::new());
        }

        // Subscriber should be dropped
        assert_eq!(remote.subscription_count(), 0);
    }

    #[test]
    fn test_seed_json() {
        let remote = MemoryRemote::new();
        let json = remote_json();
        assert_eq!(remote.seed_json("broadcasts", &json).unwrap(), 1);
        let exported = remote.export_json("broadcasts").unwrap();
        assert!(exported.contains("Fire drill"));
        assert!(remote.seed_json("broadcasts", "not json").is_err());
    }

    fn remote_json() -> String {
        serde_json::to_string(&vec![Document::new("b1").with("message", "Fire drill at 14:00")])
            .unwrap()
    }
}
