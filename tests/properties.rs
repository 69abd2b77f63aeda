//! Property tests for reconciliation and filtering.

use campus_feed::codec;
use campus_feed::{
    filter, Category, Coordinate, Document, FilterCriteria, Incident, IncidentId, IncidentStore,
    MemoryRemote, Status, Timestamp, Viewer,
};
use proptest::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

fn arb_category() -> impl Strategy<Value = Category> {
    prop::sample::select(Category::ALL.to_vec())
}

fn arb_status() -> impl Strategy<Value = Status> {
    prop::sample::select(Status::ALL.to_vec())
}

/// Incidents drawn from a small id pool so consecutive snapshots overlap.
fn arb_incident() -> impl Strategy<Value = Incident> {
    (
        0u128..16,
        arb_category(),
        arb_status(),
        "[a-zA-Z ]{0,12}",
        "[a-zA-Z ]{0,20}",
        0i64..10_000,
    )
        .prop_map(|(id, category, status, title, description, secs)| Incident {
            id: IncidentId(Uuid::from_u128(id + 1)),
            category,
            title,
            description,
            status,
            created_at: Timestamp::from_secs(1_700_000_000 + secs),
            updated_at: Timestamp::from_secs(1_700_000_000 + secs),
            location: Coordinate::new(41.0, 29.0),
            reporter_id: "reporter".to_string(),
            image_url: None,
        })
}

/// A snapshot with unique ids, in generated order.
fn arb_snapshot() -> impl Strategy<Value = Vec<Incident>> {
    prop::collection::vec(arb_incident(), 0..12).prop_map(|incidents| {
        let mut seen = HashSet::new();
        incidents.into_iter().filter(|i| seen.insert(i.id)).collect()
    })
}

fn arb_criteria() -> impl Strategy<Value = FilterCriteria> {
    (
        "[a-z]{0,3}",
        prop::option::of(arb_category()),
        any::<bool>(),
        any::<bool>(),
    )
        .prop_map(|(search, category, active_only, followed_only)| FilterCriteria {
            search_text: search,
            category,
            active_only,
            followed_only,
        })
}

fn documents(incidents: &[Incident]) -> Vec<Document> {
    incidents
        .iter()
        .map(|i| Document::from_fields(i.id.to_string(), codec::encode_incident(i)))
        .collect()
}

fn store() -> IncidentStore {
    IncidentStore::new(Arc::new(MemoryRemote::new()), "incidents")
}

// --- Filtering ---

proptest! {
    /// Default criteria return the input unchanged.
    #[test]
    fn filter_identity(incidents in arb_snapshot()) {
        let result = filter::visible(&incidents, &FilterCriteria::default(), None);
        prop_assert_eq!(result, incidents);
    }

    /// Filtering the filtered set changes nothing.
    #[test]
    fn filter_idempotent(incidents in arb_snapshot(), criteria in arb_criteria()) {
        let viewer = Viewer::new("u1", "Ada")
            .with_followed(incidents.iter().step_by(2).map(|i| i.id).collect());
        let once = filter::visible(&incidents, &criteria, Some(&viewer));
        let twice = filter::visible(&once, &criteria, Some(&viewer));
        prop_assert_eq!(once, twice);
    }

    /// The result is a subsequence of the input.
    #[test]
    fn filter_preserves_order(incidents in arb_snapshot(), criteria in arb_criteria()) {
        let result = filter::visible(&incidents, &criteria, None);
        let mut rest = incidents.iter();
        for kept in &result {
            prop_assert!(rest.any(|i| i == kept), "result is not a subsequence");
        }
        prop_assert!(result.iter().all(|i| criteria.matches(i, None)));
    }
}

// --- Reconciliation ---

proptest! {
    /// The held set after S1 then S2 equals the decode of S2 alone.
    #[test]
    fn snapshot_is_full_replacement(s1 in arb_snapshot(), s2 in arb_snapshot()) {
        let replayed = store();
        replayed.apply(&documents(&s1));
        let after = replayed.apply(&documents(&s2));

        let fresh = store();
        let expected = fresh.apply(&documents(&s2));

        prop_assert_eq!(after.as_slice(), expected.as_slice());
        prop_assert_eq!(after.as_slice(), s2.as_slice());
    }

    /// One event per incident whose status differs between snapshots.
    #[test]
    fn transitions_match_status_changes(s1 in arb_snapshot(), s2 in arb_snapshot()) {
        let store = store();
        let rx = store.subscribe_transitions();
        store.apply(&documents(&s1));
        prop_assert!(rx.try_recv().is_err());

        store.apply(&documents(&s2));
        let events: Vec<_> = rx.try_iter().collect();

        let before: HashMap<_, _> = s1.iter().map(|i| (i.id, i.status)).collect();
        let expected = s2
            .iter()
            .filter(|i| before.get(&i.id).map_or(false, |old| *old != i.status))
            .count();
        prop_assert_eq!(events.len(), expected);
        for event in &events {
            prop_assert_eq!(Some(&event.old_status), before.get(&event.incident.id));
            prop_assert_ne!(event.old_status, event.new_status);
        }
    }

    /// Re-delivering the same snapshot never yields events.
    #[test]
    fn redelivery_is_quiet(s in arb_snapshot()) {
        let store = store();
        let rx = store.subscribe_transitions();
        store.apply(&documents(&s));
        store.apply(&documents(&s));
        prop_assert!(rx.try_recv().is_err());
    }
}
