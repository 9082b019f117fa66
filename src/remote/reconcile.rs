//! Classification of a delta page against the record store.
//!
//! Pure: takes the committed store by reference and returns a new one, so a
//! pass that fails later never leaves a half-applied store behind.

use changewatch_delta::{DeltaEntry, DeltaPage, FeedChangeType, SyncCursor};

use super::record::RecordStore;
use crate::changes::{ChangeKind, ChangeRecord};

/// Subject used when a deleted id was never seen, or an entry has no name.
pub const UNKNOWN_SUBJECT: &str = "Unknown";

/// Result of reconciling one page.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    /// Classified changes, in entry order.
    pub changes: Vec<ChangeRecord>,
    pub record: RecordStore,
    pub cursor: SyncCursor,
    /// Entries dropped by the skip prefix.
    pub skipped: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    skip_prefix: Option<String>,
}

impl Reconciler {
    /// `skip_prefix`: entries whose name starts with it are ignored entirely.
    pub fn new(skip_prefix: Option<String>) -> Self {
        Self {
            skip_prefix: skip_prefix.filter(|p| !p.is_empty()),
        }
    }

    pub fn skip_prefix(&self) -> Option<&str> {
        self.skip_prefix.as_deref()
    }

    fn is_skipped(&self, entry: &DeltaEntry) -> bool {
        match (&self.skip_prefix, &entry.name) {
            (Some(prefix), Some(name)) => name.starts_with(prefix.as_str()),
            _ => false,
        }
    }

    pub fn reconcile(&self, page: &DeltaPage, local: &RecordStore) -> Reconciliation {
        let mut record = local.clone();
        let mut changes = Vec::with_capacity(page.entries.len());
        let mut skipped = 0;

        for entry in &page.entries {
            let kind = effective_kind(entry, &record);
            if self.is_skipped(entry) {
                skipped += 1;
                continue;
            }
            let subject = match kind {
                ChangeKind::Deleted => record
                    .remove(&entry.id)
                    .unwrap_or_else(|| UNKNOWN_SUBJECT.to_string()),
                _ => {
                    let name = entry
                        .name
                        .clone()
                        .unwrap_or_else(|| UNKNOWN_SUBJECT.to_string());
                    record.insert(entry.id.clone(), name.clone());
                    name
                }
            };
            changes.push(ChangeRecord::remote(kind, subject));
        }

        Reconciliation {
            changes,
            record,
            cursor: page.next_cursor.clone(),
            skipped,
        }
    }

    /// Seed a store from a full snapshot without classifying anything.
    pub fn baseline(&self, page: &DeltaPage) -> RecordStore {
        page.entries
            .iter()
            .filter(|e| !self.is_skipped(e))
            .filter(|e| !is_deleted(e))
            .map(|e| {
                let name = e.name.clone().unwrap_or_else(|| UNKNOWN_SUBJECT.to_string());
                (e.id.clone(), name)
            })
            .collect()
    }
}

fn is_deleted(entry: &DeltaEntry) -> bool {
    entry.is_marked_deleted() || entry.change_type == Some(FeedChangeType::Deleted)
}

fn effective_kind(entry: &DeltaEntry, record: &RecordStore) -> ChangeKind {
    if entry.is_marked_deleted() {
        return ChangeKind::Deleted;
    }
    match entry.change_type {
        Some(FeedChangeType::Created) => ChangeKind::Created,
        Some(FeedChangeType::Updated) => ChangeKind::Updated,
        Some(FeedChangeType::Deleted) => ChangeKind::Deleted,
        Some(FeedChangeType::Unrecognized) | None => {
            if record.contains(&entry.id) {
                ChangeKind::Updated
            } else {
                ChangeKind::Created
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(entries: Vec<DeltaEntry>) -> DeltaPage {
        DeltaPage {
            entries,
            next_cursor: SyncCursor::new("cursor-2"),
        }
    }

    fn kinds_and_subjects(r: &Reconciliation) -> Vec<(ChangeKind, &str)> {
        r.changes.iter().map(|c| (c.kind, c.subject.as_str())).collect()
    }

    #[test]
    fn create_then_soft_delete_on_empty_store() {
        let page = page(vec![
            DeltaEntry::new("1", "a.csv", FeedChangeType::Created),
            DeltaEntry::new("1", "a.csv", FeedChangeType::Deleted).with_deleted_state("softDeleted"),
        ]);
        let out = Reconciler::default().reconcile(&page, &RecordStore::new());

        assert_eq!(
            kinds_and_subjects(&out),
            vec![(ChangeKind::Created, "a.csv"), (ChangeKind::Deleted, "a.csv")]
        );
        assert!(out.record.is_empty());
        assert_eq!(out.cursor.as_str(), "cursor-2");
    }

    #[test]
    fn untyped_entries_classify_by_presence() {
        let mut local = RecordStore::new();
        local.insert("1", "old.csv");
        let page = page(vec![
            DeltaEntry::untyped("1", "renamed.csv"),
            DeltaEntry::untyped("2", "new.csv"),
        ]);
        let out = Reconciler::default().reconcile(&page, &local);

        assert_eq!(
            kinds_and_subjects(&out),
            vec![(ChangeKind::Updated, "renamed.csv"), (ChangeKind::Created, "new.csv")]
        );
        assert_eq!(out.record.get("1"), Some("renamed.csv"));
        assert_eq!(out.record.get("2"), Some("new.csv"));
    }

    #[test]
    fn unrecognized_change_type_is_treated_as_absent() {
        let mut entry = DeltaEntry::untyped("1", "a.csv");
        entry.change_type = Some(FeedChangeType::Unrecognized);
        let out = Reconciler::default().reconcile(&page(vec![entry]), &RecordStore::new());
        assert_eq!(kinds_and_subjects(&out), vec![(ChangeKind::Created, "a.csv")]);
    }

    #[test]
    fn deletion_marker_wins_over_reported_type() {
        let mut local = RecordStore::new();
        local.insert("1", "a.csv");
        let entry = DeltaEntry::new("1", "a.csv", FeedChangeType::Updated).with_deleted_state("deleted");
        let out = Reconciler::default().reconcile(&page(vec![entry]), &local);
        assert_eq!(kinds_and_subjects(&out), vec![(ChangeKind::Deleted, "a.csv")]);
        assert!(out.record.is_empty());
    }

    #[test]
    fn delete_of_unseen_id_uses_unknown_subject() {
        let entry = DeltaEntry::untyped("9", "ghost.csv").with_deleted_state("deleted");
        let out = Reconciler::default().reconcile(&page(vec![entry]), &RecordStore::new());
        assert_eq!(kinds_and_subjects(&out), vec![(ChangeKind::Deleted, UNKNOWN_SUBJECT)]);
    }

    #[test]
    fn delete_uses_stored_name_not_entry_name() {
        let mut local = RecordStore::new();
        local.insert("1", "stored.csv");
        let entry = DeltaEntry::untyped("1", "feed-name.csv").with_deleted_state("deleted");
        let out = Reconciler::default().reconcile(&page(vec![entry]), &local);
        assert_eq!(out.changes[0].subject, "stored.csv");
    }

    #[test]
    fn missing_name_is_stored_as_unknown() {
        let mut entry = DeltaEntry::untyped("1", "x");
        entry.name = None;
        let out = Reconciler::default().reconcile(&page(vec![entry]), &RecordStore::new());
        assert_eq!(out.record.get("1"), Some(UNKNOWN_SUBJECT));
    }

    #[test]
    fn skip_prefix_drops_folder_entries() {
        let page = page(vec![
            DeltaEntry::untyped("root", "one-drive-tracker"),
            DeltaEntry::untyped("1", "a.csv"),
            DeltaEntry::untyped("2", "one-drive-tracker-notes.csv"),
        ]);
        let out = Reconciler::new(Some("one-drive-tracker".into())).reconcile(&page, &RecordStore::new());

        assert_eq!(kinds_and_subjects(&out), vec![(ChangeKind::Created, "a.csv")]);
        assert_eq!(out.skipped, 2);
        assert!(!out.record.contains("root"));
    }

    #[test]
    fn empty_skip_prefix_disables_filter() {
        let reconciler = Reconciler::new(Some(String::new()));
        assert!(reconciler.skip_prefix().is_none());
        let out = reconciler.reconcile(&page(vec![DeltaEntry::untyped("1", "a.csv")]), &RecordStore::new());
        assert_eq!(out.changes.len(), 1);
    }

    #[test]
    fn reconciling_twice_gives_same_store() {
        let mut local = RecordStore::new();
        local.insert("1", "a.csv");
        let page = page(vec![
            DeltaEntry::new("1", "a2.csv", FeedChangeType::Updated),
            DeltaEntry::new("2", "b.csv", FeedChangeType::Created),
            DeltaEntry::untyped("3", "c.csv").with_deleted_state("deleted"),
        ]);
        let reconciler = Reconciler::default();
        let first = reconciler.reconcile(&page, &local);
        let second = reconciler.reconcile(&page, &local);

        assert_eq!(first.record, second.record);
        assert_eq!(kinds_and_subjects(&first), kinds_and_subjects(&second));
        // The input store is untouched.
        assert_eq!(local.len(), 1);
        assert_eq!(local.get("1"), Some("a.csv"));
    }

    #[test]
    fn records_keep_entry_order() {
        let entries: Vec<DeltaEntry> = (0..10)
            .map(|i| DeltaEntry::untyped(i.to_string(), format!("f{i}.csv")))
            .collect();
        let out = Reconciler::default().reconcile(&page(entries), &RecordStore::new());
        let subjects: Vec<String> = out.changes.iter().map(|c| c.subject.clone()).collect();
        let expected: Vec<String> = (0..10).map(|i| format!("f{i}.csv")).collect();
        assert_eq!(subjects, expected);
    }

    #[test]
    fn baseline_keeps_live_entries_only() {
        let page = page(vec![
            DeltaEntry::untyped("root", "tracked"),
            DeltaEntry::untyped("1", "a.csv"),
            DeltaEntry::untyped("2", "b.csv").with_deleted_state("deleted"),
            DeltaEntry::new("3", "c.csv", FeedChangeType::Deleted),
        ]);
        let store = Reconciler::new(Some("tracked".into())).baseline(&page);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("1"), Some("a.csv"));
    }
}
