//! Property-based tests for the reconciliation store.
//!
//! These tests verify that for arbitrary sequences of insert, update and
//! delete events, delivered in any order and with any duplication, the
//! store never holds two records with the same id and agrees with a simple
//! last-event-wins model of which records exist.

use std::collections::{HashMap, HashSet};

use bookmarks_core::{Bookmark, BookmarkId, ChangeEvent, ReconciliationStore};
use chrono::{TimeZone, Utc};
use proptest::prelude::*;

const OWNER: &str = "owner-1";

fn record(id: &str, title: &str, minute: u32) -> Bookmark {
    let mut bookmark = Bookmark::with_id(
        BookmarkId::from(id),
        OWNER,
        title,
        format!("https://{}.example", id),
    );
    bookmark.created_at = Utc.with_ymd_and_hms(2024, 1, 1, 0, minute, 0).unwrap();
    bookmark
}

/// Small id space so collisions and duplicates are common
fn arb_id() -> impl Strategy<Value = String> {
    prop_oneof![Just("a"), Just("b"), Just("c"), Just("d"), Just("e")].prop_map(String::from)
}

fn arb_event() -> impl Strategy<Value = ChangeEvent> {
    (arb_id(), "[A-Z][a-z]{0,6}", 0u32..60, 0u8..3).prop_map(|(id, title, minute, kind)| {
        match kind {
            0 => ChangeEvent::Insert(record(&id, &title, minute)),
            1 => ChangeEvent::Update(record(&id, &title, minute)),
            _ => ChangeEvent::Delete(BookmarkId::from(id)),
        }
    })
}

/// Reference model: which records exist after applying the events
fn model(events: &[ChangeEvent]) -> HashMap<BookmarkId, Bookmark> {
    let mut present: HashMap<BookmarkId, Bookmark> = HashMap::new();
    for event in events {
        match event {
            ChangeEvent::Insert(record) => {
                present.insert(record.id.clone(), record.clone());
            }
            ChangeEvent::Update(record) => {
                if let Some(existing) = present.get_mut(&record.id) {
                    *existing = record.clone();
                }
            }
            ChangeEvent::Delete(id) => {
                present.remove(id);
            }
        }
    }
    present
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    // Any order, any duplication: unique ids, and exactly the records the
    // model says exist, with their latest content.
    #[test]
    fn store_matches_model(events in proptest::collection::vec(arb_event(), 0..40)) {
        let mut store = ReconciliationStore::new(OWNER);
        store.initialize(Vec::new());
        for event in events.iter().cloned() {
            store.apply(event);
        }

        let ids: Vec<&BookmarkId> = store.snapshot().iter().map(|b| &b.id).collect();
        let unique: HashSet<&BookmarkId> = ids.iter().copied().collect();
        prop_assert_eq!(ids.len(), unique.len(), "duplicate ids in {:?}", ids);

        let expected = model(&events);
        prop_assert_eq!(store.len(), expected.len());
        for record in store.snapshot() {
            prop_assert_eq!(Some(record), expected.get(&record.id));
        }
    }

    // Replaying every event a second time changes nothing.
    #[test]
    fn replaying_events_is_harmless(events in proptest::collection::vec(arb_event(), 0..30)) {
        let mut once = ReconciliationStore::new(OWNER);
        for event in events.iter().cloned() {
            once.apply(event);
        }

        let mut twice = ReconciliationStore::new(OWNER);
        for event in events.iter().cloned() {
            twice.apply(event.clone());
            twice.apply(event);
        }

        prop_assert_eq!(once.snapshot(), twice.snapshot());
    }

    // A new id always lands at index 0, whatever its timestamp.
    #[test]
    fn new_records_are_prepended(
        events in proptest::collection::vec(arb_event(), 0..20),
        minute in 0u32..60,
    ) {
        let mut store = ReconciliationStore::new(OWNER);
        for event in events {
            store.apply(event);
        }

        let fresh = record("fresh", "Fresh", minute);
        store.apply_insert(fresh.clone());
        prop_assert_eq!(&store.snapshot()[0], &fresh);
    }

    // local_delete followed by restore is the identity.
    #[test]
    fn restore_undoes_local_delete(
        events in proptest::collection::vec(arb_event(), 1..20),
        pick in any::<prop::sample::Index>(),
    ) {
        let mut store = ReconciliationStore::new(OWNER);
        for event in events {
            store.apply(event);
        }
        prop_assume!(!store.is_empty());

        let before = store.snapshot().to_vec();
        let target = before[pick.index(before.len())].id.clone();

        let removal = store.local_delete(&target).unwrap();
        prop_assert!(!store.contains(&target));
        prop_assert!(store.restore(removal));
        prop_assert_eq!(store.snapshot(), before.as_slice());
    }
}
