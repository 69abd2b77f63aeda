//! Error handling and edge case tests.

use campus_feed::codec::{self, fields};
use campus_feed::{
    CampusFeed, Category, Completion, Coordinate, Document, EngineConfig, FeedError,
    FilterCriteria, IncidentId, IncidentStore, ManualClock, MemoryRemote, NewIncident,
    ResubscribePolicy, Role, Status, Timestamp, Viewer,
};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const NOW: i64 = 1_700_000_000;
const WAIT: Duration = Duration::from_secs(2);

fn test_engine(remote: &MemoryRemote, config: EngineConfig) -> CampusFeed {
    let clock = Arc::new(ManualClock::new(Timestamp::from_secs(NOW)));
    CampusFeed::with_clock(
        Arc::new(remote.clone()),
        EngineConfig {
            poll_interval: Duration::from_millis(5),
            ..config
        },
        clock,
    )
}

fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

fn incident_doc(id: IncidentId, title: &str, status: &str) -> Document {
    Document::new(id.to_string())
        .with(fields::CATEGORY, "security")
        .with(fields::TITLE, title)
        .with(fields::DESCRIPTION, "")
        .with(fields::STATUS, status)
        .with(fields::CREATED_AT, Timestamp::from_secs(NOW))
        .with(fields::LATITUDE, 41.0)
        .with(fields::LONGITUDE, 29.0)
        .with(fields::REPORTER_ID, "reporter")
}

// --- Decoding Errors ---

#[test]
fn test_malformed_document_is_dropped_alone() {
    let store = IncidentStore::new(Arc::new(MemoryRemote::new()), "incidents");
    let good = IncidentId::new();
    let broken = IncidentId::new();

    let held = store.apply(&[
        incident_doc(good, "Intact", "open"),
        incident_doc(broken, "No status", "open").without(fields::STATUS),
        incident_doc(IncidentId::new(), "Unknown status", "closed"),
        Document::new("not-a-uuid").with(fields::TITLE, "Bad id"),
    ]);

    assert_eq!(held.len(), 1);
    assert_eq!(held[0].id, good);
    assert!(store.get(broken).is_none());
}

#[test]
fn test_legacy_category_labels_decode() {
    let store = IncidentStore::new(Arc::new(MemoryRemote::new()), "incidents");
    let id = IncidentId::new();
    let doc = incident_doc(id, "Kayıp cüzdan", "open").with(fields::CATEGORY, "Kayıp/Buluntu");

    store.apply(&[doc]);
    assert_eq!(store.get(id).map(|i| i.category), Some(Category::LostFound));
}

#[test]
fn test_incomplete_viewer_document_takes_defaults() {
    let viewer = codec::decode_viewer(
        &Document::new("u9").with(
            fields::FOLLOWED_INCIDENT_IDS,
            vec!["garbage".to_string(), IncidentId::new().to_string()],
        ),
    );
    assert_eq!(viewer.display_name, "Unknown");
    assert_eq!(viewer.role, Role::Member);
    assert_eq!(viewer.followed_incident_ids.len(), 1);
    assert_eq!(viewer.notification_categories.len(), Category::ALL.len());
}

// --- Write Errors ---

#[test]
fn test_failed_follow_leaves_viewer_unchanged() {
    let remote = MemoryRemote::new();
    let engine = test_engine(&remote, EngineConfig::default());
    engine.sign_in(Viewer::new("user_1", "Ada")).unwrap();
    remote.reject_writes(Some("permission denied"));

    let result = engine.toggle_follow(IncidentId::new());
    assert_eq!(result, Err(FeedError::Rejected("permission denied".into())));
    assert!(engine.viewer().unwrap().followed_incident_ids.is_empty());
}

#[test]
fn test_unanswered_write_times_out() {
    let remote = MemoryRemote::new();
    let engine = test_engine(
        &remote,
        EngineConfig {
            write_timeout: Duration::from_millis(30),
            ..EngineConfig::default()
        },
    );
    engine.sign_in(Viewer::new("user_1", "Ada")).unwrap();
    remote.hold_writes(true);

    let draft = NewIncident::new(
        Category::Technical,
        "Projector dead",
        "",
        Coordinate::new(0.0, 0.0),
    );
    let result = engine.report_incident(draft).wait();
    assert_eq!(result, Err(FeedError::Timeout(Duration::from_millis(30))));

    // A late answer is ignored and the write was never applied
    assert_eq!(remote.release_held(Ok(())), 1);
    assert!(remote.documents("incidents").is_empty());
}

#[test]
fn test_updating_missing_incident_fails() {
    let remote = MemoryRemote::new();
    let engine = test_engine(&remote, EngineConfig::default());
    engine
        .sign_in(Viewer::new("admin_1", "Desk").with_role(Role::Administrator))
        .unwrap();

    let result = engine.update_status(IncidentId::new(), Status::Resolved).wait();
    assert!(matches!(result, Err(FeedError::NotFound(_))));
}

#[test]
fn test_member_cannot_moderate() {
    let remote = MemoryRemote::new();
    let engine = test_engine(&remote, EngineConfig::default());
    let id = IncidentId::new();
    remote.seed("incidents", vec![incident_doc(id, "Vandalism", "open")]);
    engine.sign_in(Viewer::new("user_1", "Ada")).unwrap();

    assert_eq!(
        engine.update_description(id, "edited").wait(),
        Err(FeedError::NotAuthorized)
    );
    assert_eq!(engine.delete_incident(id).wait(), Err(FeedError::NotAuthorized));
    assert_eq!(
        engine.delete_broadcast("b1").wait(),
        Err(FeedError::NotAuthorized)
    );
    assert!(remote.document("incidents", &id.to_string()).is_some());
}

#[test]
fn test_writes_require_viewer() {
    let remote = MemoryRemote::new();
    let engine = test_engine(&remote, EngineConfig::default());

    assert_eq!(engine.publish_broadcast("hi").wait(), Err(FeedError::NoViewer));
    assert_eq!(
        engine.toggle_notification_preference(Category::Health),
        Err(FeedError::NoViewer)
    );
}

#[test]
fn test_empty_title_rejected_before_remote() {
    let remote = MemoryRemote::new();
    let engine = test_engine(&remote, EngineConfig::default());
    engine.sign_in(Viewer::new("user_1", "Ada")).unwrap();

    let draft = NewIncident::new(Category::Health, "   ", "body", Coordinate::new(0.0, 0.0));
    assert!(matches!(
        engine.report_incident(draft).wait(),
        Err(FeedError::Validation(_))
    ));
    assert!(remote.documents("incidents").is_empty());
}

#[test]
fn test_completion_try_result() {
    let (tx, completion) = Completion::pending();
    assert!(completion.try_result().is_none());
    tx.complete(Ok(()));
    assert_eq!(completion.try_result(), Some(Ok(())));
}

// --- Feed Errors ---

#[test]
fn test_feed_error_keeps_state() {
    let remote = MemoryRemote::new();
    let engine = test_engine(&remote, EngineConfig::default());
    remote.seed(
        "incidents",
        vec![incident_doc(IncidentId::new(), "Broken gate", "open")],
    );

    let errors = engine.incidents().subscribe_errors();
    engine.start().unwrap();
    assert!(eventually(|| engine.incidents().len() == 1));

    remote.inject_feed_error("incidents", "quota exceeded");
    assert_eq!(
        errors.recv_timeout(WAIT).unwrap(),
        FeedError::Feed("quota exceeded".into())
    );
    assert_eq!(engine.incidents().len(), 1);
    assert_eq!(engine.visible(&FilterCriteria::new()).len(), 1);
}

#[test]
fn test_lost_subscription_keeps_state() {
    let remote = MemoryRemote::new();
    let engine = test_engine(
        &remote,
        EngineConfig {
            resubscribe: ResubscribePolicy::never(),
            ..EngineConfig::default()
        },
    );
    remote.seed(
        "incidents",
        vec![incident_doc(IncidentId::new(), "Broken gate", "open")],
    );

    let errors = engine.incidents().subscribe_errors();
    engine.start().unwrap();
    assert!(eventually(|| engine.incidents().len() == 1));

    remote.disconnect_all();
    assert!(matches!(
        errors.recv_timeout(WAIT).unwrap(),
        FeedError::SubscriptionDropped(_)
    ));
    assert_eq!(engine.incidents().len(), 1);
}

#[test]
fn test_resubscribe_recovers_updates() {
    let remote = MemoryRemote::new();
    let engine = test_engine(
        &remote,
        EngineConfig {
            resubscribe: ResubscribePolicy {
                max_attempts: 3,
                backoff: Duration::from_millis(5),
            },
            ..EngineConfig::default()
        },
    );
    engine.start().unwrap();
    remote.disconnect_all();

    assert!(eventually(|| remote.subscription_count() == 2));
    remote.seed(
        "incidents",
        vec![incident_doc(IncidentId::new(), "After reconnect", "open")],
    );
    assert!(eventually(|| engine.incidents().len() == 1));
}

// --- Lifecycle ---

#[test]
fn test_shutdown_releases_everything() {
    let remote = MemoryRemote::new();
    let engine = test_engine(&remote, EngineConfig::default());
    engine.start().unwrap();
    engine.sign_in(Viewer::new("user_1", "Ada")).unwrap();
    assert_eq!(remote.subscription_count(), 3);

    engine.shutdown();
    engine.shutdown();
    assert_eq!(remote.subscription_count(), 0);

    // State survives, it just stops updating
    remote.seed(
        "incidents",
        vec![incident_doc(IncidentId::new(), "Ignored", "open")],
    );
    thread::sleep(Duration::from_millis(30));
    assert!(engine.incidents().is_empty());
}

#[test]
fn test_drop_releases_subscriptions() {
    let remote = MemoryRemote::new();
    {
        let engine = test_engine(&remote, EngineConfig::default());
        engine.start().unwrap();
        assert_eq!(remote.subscription_count(), 2);
    }
    assert_eq!(remote.subscription_count(), 0);
}

#[test]
fn test_sign_in_replaces_previous_viewer_feed() {
    let remote = MemoryRemote::new();
    let engine = test_engine(&remote, EngineConfig::default());
    engine.sign_in(Viewer::new("user_1", "Ada")).unwrap();
    engine.sign_in(Viewer::new("user_2", "Grace")).unwrap();

    assert_eq!(remote.subscription_count(), 1);
    assert_eq!(engine.viewer().map(|v| v.id.clone()), Some("user_2".to_string()));
}
