//! Reconciliation store
//!
//! The `ReconciliationStore` holds the visible, ordered list of one user's
//! bookmarks. It merges three sources into that list:
//!
//! - a one-shot snapshot loaded when the session starts
//! - an at-least-once, unordered stream of insert/update/delete events
//! - optimistic local deletes that may have to be reverted
//!
//! ## Invariants
//!
//! - every record belongs to the store's owner
//! - at most one record per ID
//! - order is newest first; updates never move a record
//!
//! The store does no I/O and every operation is total, so there is no
//! error type. Replaying, duplicating or reordering events cannot break the
//! invariants above.
//!
//! ## Usage
//!
//! ```ignore
//! let mut store = ReconciliationStore::new(user.id.clone());
//! store.initialize(backend.fetch_snapshot(&user.id)?);
//!
//! // Live events
//! store.apply(event);
//!
//! // Optimistic delete with rollback
//! if let Some(removal) = store.local_delete(&id) {
//!     if backend.delete(&user.id, &id).is_err() {
//!         store.restore(removal);
//!     }
//! }
//! ```

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::models::{Bookmark, BookmarkId, ChangeEvent};

/// A record taken out by [`ReconciliationStore::local_delete`]
///
/// Hand it back to [`ReconciliationStore::restore`] if the backend rejects
/// the delete.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "keep the removal to restore the record if the delete fails"]
pub struct Removal {
    index: usize,
    record: Bookmark,
}

impl Removal {
    /// Position the record occupied before removal
    pub fn index(&self) -> usize {
        self.index
    }
}

/// Ordered, de-duplicated view of one user's bookmarks
#[derive(Debug, Clone)]
pub struct ReconciliationStore {
    /// Owner every held record must belong to
    owner_id: String,
    /// Visible order, newest first
    records: Vec<Bookmark>,
}

impl ReconciliationStore {
    /// Create an empty store for the given owner
    pub fn new(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            records: Vec::new(),
        }
    }

    /// The owner this store was created for
    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Replace the whole state with a snapshot
    ///
    /// The snapshot order is trusted as-is (the producer sorts newest
    /// first). Records of other owners are dropped, and repeated IDs keep
    /// their first occurrence.
    pub fn initialize(&mut self, snapshot: Vec<Bookmark>) {
        let mut seen = HashSet::with_capacity(snapshot.len());
        let mut records = Vec::with_capacity(snapshot.len());

        for record in snapshot {
            if !self.owns(&record) {
                continue;
            }
            if seen.insert(record.id.clone()) {
                records.push(record);
            } else {
                debug!("Dropping repeated snapshot record {}", record.id);
            }
        }

        self.records = records;
    }

    /// Apply a change event from the live stream
    ///
    /// Returns true if the visible state changed.
    pub fn apply(&mut self, event: ChangeEvent) -> bool {
        match event {
            ChangeEvent::Insert(record) => self.apply_insert(record),
            ChangeEvent::Update(record) => self.apply_update(record),
            ChangeEvent::Delete(id) => self.apply_delete(&id),
        }
    }

    /// Insert a record at the front, or replace it in place if its ID is
    /// already present (e.g. the echo of a local write)
    pub fn apply_insert(&mut self, record: Bookmark) -> bool {
        if !self.owns(&record) {
            return false;
        }

        match self.position(&record.id) {
            Some(index) => {
                if self.records[index] == record {
                    return false;
                }
                self.records[index] = record;
            }
            None => self.records.insert(0, record),
        }
        true
    }

    /// Replace an existing record's fields, keeping its position
    ///
    /// Updates for unknown IDs are ignored; the record may have been
    /// deleted concurrently.
    pub fn apply_update(&mut self, record: Bookmark) -> bool {
        if !self.owns(&record) {
            return false;
        }

        match self.position(&record.id) {
            Some(index) if self.records[index] != record => {
                self.records[index] = record;
                true
            }
            Some(_) => false,
            None => {
                debug!("Ignoring update for unknown bookmark {}", record.id);
                false
            }
        }
    }

    /// Remove a record if present. Idempotent.
    pub fn apply_delete(&mut self, id: &BookmarkId) -> bool {
        self.take(id).is_some()
    }

    /// Optimistically remove a record before the backend confirms
    ///
    /// Same effect as [`apply_delete`](Self::apply_delete). The returned
    /// removal restores the record if the backend reports failure.
    pub fn local_delete(&mut self, id: &BookmarkId) -> Option<Removal> {
        self.take(id)
    }

    /// Undo a [`local_delete`](Self::local_delete)
    ///
    /// Puts the record back at its former position (clamped to the current
    /// length). If a record with the same ID has arrived in the meantime it
    /// wins and nothing is restored.
    pub fn restore(&mut self, removal: Removal) -> bool {
        let Removal { index, record } = removal;

        if self.position(&record.id).is_some() {
            return false;
        }

        let index = index.min(self.records.len());
        self.records.insert(index, record);
        true
    }

    /// Current visible order, newest first
    pub fn snapshot(&self) -> &[Bookmark] {
        &self.records
    }

    /// Get a record by ID
    pub fn get(&self, id: &BookmarkId) -> Option<&Bookmark> {
        self.records.iter().find(|r| &r.id == id)
    }

    pub fn contains(&self, id: &BookmarkId) -> bool {
        self.position(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn position(&self, id: &BookmarkId) -> Option<usize> {
        self.records.iter().position(|r| &r.id == id)
    }

    fn take(&mut self, id: &BookmarkId) -> Option<Removal> {
        let index = self.position(id)?;
        let record = self.records.remove(index);
        Some(Removal { index, record })
    }

    fn owns(&self, record: &Bookmark) -> bool {
        if record.owner_id == self.owner_id {
            true
        } else {
            warn!(
                "Dropping bookmark {} owned by {} (store owner is {})",
                record.id, record.owner_id, self.owner_id
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    const OWNER: &str = "user-1";

    fn bookmark(id: &str, title: &str) -> Bookmark {
        Bookmark::with_id(id.into(), OWNER, title, format!("https://{}.example", id))
    }

    fn ids(store: &ReconciliationStore) -> Vec<&str> {
        store.snapshot().iter().map(|b| b.id.as_str()).collect()
    }

    fn store_with(records: &[(&str, &str)]) -> ReconciliationStore {
        let mut store = ReconciliationStore::new(OWNER);
        store.initialize(records.iter().map(|(id, t)| bookmark(id, t)).collect());
        store
    }

    #[test]
    fn test_initialize_empty() {
        let mut store = ReconciliationStore::new(OWNER);
        store.initialize(Vec::new());
        assert!(store.is_empty());
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_initialize_trusts_input_order() {
        let t1 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let t2 = t1 + Duration::hours(1);

        let mut first = bookmark("1", "first");
        first.created_at = t1;
        let mut second = bookmark("2", "second");
        second.created_at = t2;

        let mut store = ReconciliationStore::new(OWNER);
        store.initialize(vec![second, first]);
        assert_eq!(ids(&store), vec!["2", "1"]);
    }

    #[test]
    fn test_initialize_replaces_state() {
        let mut store = store_with(&[("a", "A"), ("b", "B")]);
        store.initialize(vec![bookmark("c", "C")]);
        assert_eq!(ids(&store), vec!["c"]);
    }

    #[test]
    fn test_initialize_drops_repeated_ids_and_foreign_records() {
        let mut foreign = bookmark("x", "X");
        foreign.owner_id = "someone-else".to_string();

        let mut store = ReconciliationStore::new(OWNER);
        store.initialize(vec![
            bookmark("a", "A"),
            foreign,
            bookmark("a", "A again"),
            bookmark("b", "B"),
        ]);

        assert_eq!(ids(&store), vec!["a", "b"]);
        assert_eq!(store.get(&"a".into()).unwrap().title, "A");
    }

    #[test]
    fn test_insert_prepends_regardless_of_timestamp() {
        let mut store = store_with(&[("a", "A")]);

        let mut old = bookmark("old", "Old");
        old.created_at = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();
        assert!(store.apply_insert(old));

        assert_eq!(ids(&store), vec!["old", "a"]);
    }

    #[test]
    fn test_insert_same_id_replaces() {
        let mut store = ReconciliationStore::new(OWNER);
        store.apply_insert(bookmark("a", "Ex"));
        store.apply_insert(bookmark("b", "Other"));
        store.apply_insert(bookmark("a", "Ex2"));

        assert_eq!(ids(&store), vec!["b", "a"]);
        assert_eq!(store.get(&"a".into()).unwrap().title, "Ex2");
    }

    #[test]
    fn test_duplicate_echo_yields_single_record() {
        let t1 = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let mut store = ReconciliationStore::new(OWNER);
        store.initialize(Vec::new());

        let mut first = Bookmark::with_id("a".into(), OWNER, "Ex", "https://ex.com");
        first.created_at = t1;
        let mut echo = first.clone();
        echo.title = "Ex2".to_string();

        store.apply_insert(first);
        store.apply_insert(echo.clone());

        assert_eq!(store.snapshot(), &[echo]);
    }

    #[test]
    fn test_identical_insert_reports_no_change() {
        let mut store = ReconciliationStore::new(OWNER);
        let record = bookmark("a", "A");
        assert!(store.apply_insert(record.clone()));
        assert!(!store.apply_insert(record));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_update_preserves_position() {
        let mut store = store_with(&[("a", "A"), ("b", "B"), ("c", "C")]);

        assert!(store.apply_update(bookmark("b", "B prime")));

        assert_eq!(ids(&store), vec!["a", "b", "c"]);
        assert_eq!(store.get(&"b".into()).unwrap().title, "B prime");
    }

    #[test]
    fn test_update_unknown_id_is_noop() {
        let mut store = store_with(&[("a", "A")]);
        assert!(!store.apply_update(bookmark("zzz", "Ghost")));
        assert_eq!(ids(&store), vec!["a"]);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let mut store = store_with(&[("a", "A"), ("b", "B")]);

        assert!(store.apply_delete(&"a".into()));
        let after_once = store.snapshot().to_vec();

        assert!(!store.apply_delete(&"a".into()));
        assert_eq!(store.snapshot(), after_once.as_slice());
    }

    #[test]
    fn test_local_delete_then_remote_echo() {
        let mut store = ReconciliationStore::new(OWNER);
        store.apply_insert(bookmark("a", "A"));

        let removal = store.local_delete(&"a".into());
        assert!(removal.is_some());
        assert!(!store.apply_delete(&"a".into()));
        assert!(store.is_empty());
    }

    #[test]
    fn test_local_delete_unknown_returns_none() {
        let mut store = ReconciliationStore::new(OWNER);
        assert!(store.local_delete(&"missing".into()).is_none());
    }

    #[test]
    fn test_restore_puts_record_back_in_place() {
        let mut store = store_with(&[("a", "A"), ("b", "B"), ("c", "C")]);

        let removal = store.local_delete(&"b".into()).unwrap();
        assert_eq!(removal.index(), 1);
        assert_eq!(ids(&store), vec!["a", "c"]);

        assert!(store.restore(removal));
        assert_eq!(ids(&store), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_restore_clamps_index() {
        let mut store = store_with(&[("a", "A"), ("b", "B"), ("c", "C")]);

        let removal = store.local_delete(&"c".into()).unwrap();
        store.apply_delete(&"b".into());

        assert!(store.restore(removal));
        assert_eq!(ids(&store), vec!["a", "c"]);
    }

    #[test]
    fn test_restore_yields_to_newer_record() {
        let mut store = store_with(&[("a", "A")]);

        let removal = store.local_delete(&"a".into()).unwrap();
        store.apply_insert(bookmark("a", "A from remote"));

        assert!(!store.restore(removal));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&"a".into()).unwrap().title, "A from remote");
    }

    #[test]
    fn test_foreign_owner_events_are_dropped() {
        let mut store = ReconciliationStore::new(OWNER);
        let mut foreign = bookmark("a", "A");
        foreign.owner_id = "intruder".to_string();

        assert!(!store.apply_insert(foreign.clone()));
        assert!(!store.apply_update(foreign));
        assert!(store.is_empty());
    }

    #[test]
    fn test_apply_dispatches_events() {
        let mut store = ReconciliationStore::new(OWNER);

        assert!(store.apply(ChangeEvent::Insert(bookmark("a", "A"))));
        assert!(store.apply(ChangeEvent::Update(bookmark("a", "A2"))));
        assert_eq!(store.get(&"a".into()).unwrap().title, "A2");
        assert!(store.apply(ChangeEvent::Delete("a".into())));
        assert!(!store.apply(ChangeEvent::Delete("a".into())));
        assert!(store.is_empty());
    }
}
