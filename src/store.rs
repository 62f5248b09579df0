// Task store: the single owner of the task collection

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::assignees::AssigneeIndex;
use crate::csv;
use crate::error::{Result, TaskError};
use crate::jsonl;
use crate::models::{Task, TaskDraft, TaskPatch, now_ms, seed_tasks, validate_title};
use crate::query::Query;
use crate::record::Record;
use crate::storage::{Storage, validate_key};

/// Where the collection came from on the last `load()`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    Persisted,
    Seeded,
}

/// Proof that the caller holds the import slot
///
/// Returned by `begin_import` and consumed by `complete_import` or
/// `cancel_import`.
#[derive(Debug)]
#[must_use = "an unfinished import blocks further imports until cancelled"]
pub struct ImportTicket {
    id: u64,
}

// Process-wide so a ticket can never match another store's pending import
static NEXT_TICKET: AtomicU64 = AtomicU64::new(1);

/// Ordered task collection persisted through a `Storage` backend
///
/// Insertion is newest-first. Every mutation bumps the revision, rebuilds the
/// assignee index and writes the collection back to storage. A failed write
/// is logged and the in-memory state stays authoritative.
pub struct TaskStore<S: Storage> {
    storage: S,
    key: String,
    tasks: Vec<Task>,
    assignees: AssigneeIndex,
    revision: u64,
    pending_import: Option<u64>,
}

impl<S: Storage> TaskStore<S> {
    /// Empty store writing under the default key; call `load()` to populate
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            key: Task::storage_key().to_string(),
            tasks: Vec::new(),
            assignees: AssigneeIndex::default(),
            revision: 0,
            pending_import: None,
        }
    }

    /// Empty store writing under a custom key
    pub fn with_key(storage: S, key: &str) -> Result<Self> {
        validate_key(key)?;
        let mut store = Self::new(storage);
        store.key = key.to_string();
        Ok(store)
    }

    /// Construct and load in one step
    pub fn open(storage: S) -> Self {
        let mut store = Self::new(storage);
        store.load();
        store
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Replace the collection with the persisted blob
    ///
    /// Missing, unreadable or corrupt data falls back to the seed dataset.
    pub fn load(&mut self) -> LoadSource {
        let (tasks, source) = match self.read_persisted() {
            Ok(Some(tasks)) => (tasks, LoadSource::Persisted),
            Ok(None) => {
                info!(key = %self.key, "No persisted tasks, using seed data");
                (seed_tasks(now_ms()), LoadSource::Seeded)
            }
            Err(e) => {
                warn!(key = %self.key, error = %e, "Failed to load persisted tasks, using seed data");
                (seed_tasks(now_ms()), LoadSource::Seeded)
            }
        };

        self.tasks = tasks;
        self.revision += 1;
        self.assignees = AssigneeIndex::from_tasks(&self.tasks);
        info!(count = self.tasks.len(), ?source, "Loaded tasks");
        source
    }

    fn read_persisted(&self) -> Result<Option<Vec<Task>>> {
        let Some(text) = self.storage.get(&self.key)? else {
            return Ok(None);
        };

        let mut tasks: Vec<Task> = jsonl::decode_latest(&text)?;
        tasks.retain(|t| {
            let keep = !t.title.trim().is_empty();
            if !keep {
                warn!(id = %t.id, "Dropping persisted task with empty title");
            }
            keep
        });
        Ok(Some(tasks))
    }

    /// Write the whole collection to storage
    pub fn save(&mut self) -> Result<()> {
        let blob = jsonl::encode(&self.tasks)?;
        self.storage.set(&self.key, &blob)?;
        debug!(key = %self.key, count = self.tasks.len(), "Saved tasks");
        Ok(())
    }

    fn after_mutation(&mut self) {
        self.revision += 1;
        self.assignees = AssigneeIndex::from_tasks(&self.tasks);
        if let Err(e) = self.save() {
            error!(key = %self.key, error = %e, "Failed to persist tasks, keeping in-memory state");
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Collection in storage order
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Incremented on every load and mutation
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn assignees(&self) -> &AssigneeIndex {
        &self.assignees
    }

    /// Derived view; the collection is not touched
    pub fn query(&self, query: &Query) -> Vec<Task> {
        query.apply(&self.tasks)
    }

    fn position(&self, id: &str) -> Result<usize> {
        self.tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| TaskError::NotFound(id.to_string()))
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Add a task at the front of the collection
    pub fn create(&mut self, draft: TaskDraft) -> Result<Task> {
        validate_title(&draft.title)?;

        let mut id = Uuid::now_v7().to_string();
        while self.get(&id).is_some() {
            id = Uuid::now_v7().to_string();
        }

        let now = now_ms();
        let task = Task {
            id,
            title: draft.title.trim().to_string(),
            description: draft.description,
            assignee: draft.assignee.trim().to_string(),
            priority: draft.priority,
            status: draft.status,
            due_date: draft.due_date,
            created_at: now,
            updated_at: now,
        };

        debug!(id = %task.id, title = %task.title, "create: inserting task");
        self.tasks.insert(0, task.clone());
        self.after_mutation();
        Ok(task)
    }

    /// Merge the supplied fields into an existing task
    pub fn update(&mut self, id: &str, patch: &TaskPatch) -> Result<Task> {
        if let Some(title) = &patch.title {
            validate_title(title)?;
        }
        let pos = self.position(id)?;

        let mut task = self.tasks[pos].clone();
        patch.apply_to(&mut task);
        task.title = task.title.trim().to_string();
        task.assignee = task.assignee.trim().to_string();
        task.updated_at = refreshed(&task);

        debug!(id, "update: replacing task");
        self.tasks[pos] = task.clone();
        self.after_mutation();
        Ok(task)
    }

    /// Flip Done back to Todo, anything else to Done
    pub fn toggle_status(&mut self, id: &str) -> Result<Task> {
        let pos = self.position(id)?;

        let mut task = self.tasks[pos].clone();
        task.status = task.status.toggled();
        task.updated_at = refreshed(&task);

        debug!(id, status = %task.status, "toggle_status");
        self.tasks[pos] = task.clone();
        self.after_mutation();
        Ok(task)
    }

    /// Remove a task once `confirm` approves it
    ///
    /// Returns `Ok(false)` without mutating when the confirmation is declined.
    /// An unknown id is always `NotFound`, and `confirm` is not called.
    pub fn delete<F>(&mut self, id: &str, confirm: F) -> Result<bool>
    where
        F: FnOnce(&Task) -> bool,
    {
        let pos = self.position(id)?;
        if !confirm(&self.tasks[pos]) {
            debug!(id, "delete: declined");
            return Ok(false);
        }

        self.tasks.remove(pos);
        info!(id, "Deleted task");
        self.after_mutation();
        Ok(true)
    }

    // ========================================================================
    // Import / export
    // ========================================================================

    /// Export the whole collection as delimited text
    pub fn export_csv(&self) -> String {
        csv::export(&self.tasks)
    }

    /// Reserve the import slot before reading the payload
    ///
    /// Only one import may be pending at a time.
    pub fn begin_import(&mut self) -> Result<ImportTicket> {
        if self.pending_import.is_some() {
            return Err(TaskError::ImportInProgress);
        }
        let id = NEXT_TICKET.fetch_add(1, Ordering::Relaxed);
        self.pending_import = Some(id);
        debug!(ticket = id, "begin_import");
        Ok(ImportTicket { id })
    }

    /// Release the import slot without touching the collection
    ///
    /// A ticket this store did not issue is ignored.
    pub fn cancel_import(&mut self, ticket: ImportTicket) {
        if self.pending_import == Some(ticket.id) {
            self.pending_import = None;
        } else {
            warn!(ticket = ticket.id, "cancel_import: ticket does not match pending import");
        }
    }

    /// Parse `text` and prepend the imported tasks, preserving their order
    ///
    /// A matching ticket releases the slot whatever the outcome. A ticket from
    /// another store, or a stale one, fails with `ImportTicketMismatch` and
    /// leaves the slot as it was. On error nothing is mutated. Returns the
    /// number of tasks added.
    pub fn complete_import(&mut self, ticket: ImportTicket, text: &str) -> Result<usize> {
        if self.pending_import != Some(ticket.id) {
            return Err(TaskError::ImportTicketMismatch);
        }
        self.pending_import = None;

        let records = csv::parse(text)?;
        let existing: HashSet<String> = self.tasks.iter().map(|t| t.id.clone()).collect();
        let mut imported = csv::resolve(records, &existing, now_ms());
        if imported.is_empty() {
            return Err(TaskError::EmptyImport);
        }

        let count = imported.len();
        imported.append(&mut self.tasks);
        self.tasks = imported;
        info!(count, total = self.tasks.len(), "Imported tasks");
        self.after_mutation();
        Ok(count)
    }

    /// Import a payload that is already in hand
    pub fn import_csv(&mut self, text: &str) -> Result<usize> {
        let ticket = self.begin_import()?;
        self.complete_import(ticket, text)
    }
}

// Never moves backwards and never precedes created_at
fn refreshed(task: &Task) -> i64 {
    now_ms().max(task.updated_at).max(task.created_at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Priority, Status};
    use crate::query::SortKey;
    use crate::storage::{FileStorage, MemoryStorage};
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn empty_store() -> TaskStore<MemoryStorage> {
        TaskStore::new(MemoryStorage::new())
    }

    fn persisted(store: &TaskStore<MemoryStorage>) -> Vec<Task> {
        let blob = store.storage().get(store.key()).unwrap().unwrap();
        jsonl::decode_latest(&blob).unwrap()
    }

    #[test]
    fn test_create_prepends_and_persists() {
        let mut store = empty_store();

        let first = store.create(TaskDraft::new("First")).unwrap();
        let second = store.create(TaskDraft::new("Second").assignee("Dana")).unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.tasks()[0].id, second.id);
        assert_eq!(store.tasks()[1].id, first.id);
        assert_eq!(first.created_at, first.updated_at);
        assert_eq!(first.priority, Priority::Medium);
        assert_eq!(first.status, Status::Todo);

        assert_eq!(persisted(&store), store.tasks());
        assert!(store.assignees().contains("Dana"));
    }

    #[test]
    fn test_create_ids_are_unique() {
        let mut store = empty_store();
        for i in 0..50 {
            store.create(TaskDraft::new(format!("Task {}", i))).unwrap();
        }

        let ids: HashSet<&str> = store.tasks().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids.len(), 50);
    }

    #[test]
    fn test_create_rejects_blank_title() {
        let mut store = empty_store();
        let revision = store.revision();

        for title in ["", "   ", "\t\n"] {
            let result = store.create(TaskDraft::new(title));
            assert!(matches!(result, Err(TaskError::Validation(_))));
        }

        assert!(store.is_empty());
        assert_eq!(store.revision(), revision);
        assert_eq!(store.storage().get(store.key()).unwrap(), None);
    }

    #[test]
    fn test_update_merges_supplied_fields() {
        let mut store = empty_store();
        let task = store
            .create(TaskDraft::new("Original").description("keep me").priority(Priority::Low))
            .unwrap();

        let patch = TaskPatch {
            title: Some("Renamed".to_string()),
            due_date: Some(NaiveDate::from_ymd_opt(2025, 1, 1)),
            ..Default::default()
        };
        let updated = store.update(&task.id, &patch).unwrap();

        assert_eq!(updated.id, task.id);
        assert_eq!(updated.title, "Renamed");
        assert_eq!(updated.description, "keep me");
        assert_eq!(updated.priority, Priority::Low);
        assert_eq!(updated.due_date, NaiveDate::from_ymd_opt(2025, 1, 1));
        assert_eq!(updated.created_at, task.created_at);
        assert!(updated.updated_at >= task.updated_at);
        assert_eq!(store.get(&task.id), Some(&updated));
    }

    #[test]
    fn test_update_rejects_blank_title() {
        let mut store = empty_store();
        let task = store.create(TaskDraft::new("Keep")).unwrap();
        let revision = store.revision();

        let patch = TaskPatch {
            title: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(matches!(store.update(&task.id, &patch), Err(TaskError::Validation(_))));
        assert_eq!(store.get(&task.id).unwrap().title, "Keep");
        assert_eq!(store.revision(), revision);
    }

    #[test]
    fn test_update_unknown_id() {
        let mut store = empty_store();
        let result = store.update("missing", &TaskPatch::default());
        assert!(matches!(result, Err(TaskError::NotFound(id)) if id == "missing"));
    }

    #[test]
    fn test_updated_at_never_moves_backwards() {
        let mut store = empty_store();
        let task = store.create(TaskDraft::new("Clock skew")).unwrap();

        // Simulate a persisted timestamp from the future
        store.tasks[0].updated_at = task.created_at + 10_000_000;
        let toggled = store.toggle_status(&task.id).unwrap();
        assert_eq!(toggled.updated_at, task.created_at + 10_000_000);
    }

    #[test]
    fn test_toggle_status() {
        let mut store = empty_store();
        let task = store.create(TaskDraft::new("Toggle").status(Status::Waiting)).unwrap();

        assert_eq!(store.toggle_status(&task.id).unwrap().status, Status::Done);
        assert_eq!(store.toggle_status(&task.id).unwrap().status, Status::Todo);
        assert!(matches!(store.toggle_status("nope"), Err(TaskError::NotFound(_))));
    }

    #[test]
    fn test_delete_requires_confirmation() {
        let mut store = empty_store();
        let task = store.create(TaskDraft::new("Doomed").assignee("Luis")).unwrap();

        assert!(!store.delete(&task.id, |_| false).unwrap());
        assert_eq!(store.len(), 1);

        let mut seen_title = String::new();
        let deleted = store
            .delete(&task.id, |t| {
                seen_title = t.title.clone();
                true
            })
            .unwrap();
        assert!(deleted);
        assert_eq!(seen_title, "Doomed");
        assert!(store.is_empty());
        assert!(store.assignees().is_empty());
        assert!(persisted(&store).is_empty());
    }

    #[test]
    fn test_delete_unknown_id_skips_confirmation() {
        let mut store = empty_store();
        let mut asked = false;
        let result = store.delete("missing", |_| {
            asked = true;
            true
        });
        assert!(matches!(result, Err(TaskError::NotFound(_))));
        assert!(!asked);
    }

    #[test]
    fn test_load_missing_falls_back_to_seed() {
        let mut store = empty_store();
        assert_eq!(store.load(), LoadSource::Seeded);
        assert_eq!(store.len(), 2);
        assert!(store.assignees().contains("Dana"));
    }

    #[test]
    fn test_load_corrupt_falls_back_to_seed() {
        let storage = MemoryStorage::new().with_entry("team-tasks", "{not json");
        let mut store = TaskStore::new(storage);
        assert_eq!(store.load(), LoadSource::Seeded);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_load_read_error_falls_back_to_seed() {
        let mut storage = MemoryStorage::new().with_entry("team-tasks", "");
        storage.fail_reads(true);

        let mut store = TaskStore::new(storage);
        assert_eq!(store.load(), LoadSource::Seeded);
        assert_eq!(store.len(), 2);
        assert!(store.assignees().contains("Luis"));
    }

    #[test]
    fn test_update_and_toggle_persist() {
        let mut store = empty_store();
        let task = store.create(TaskDraft::new("Persist me")).unwrap();

        let patch = TaskPatch {
            assignee: Some("Amir".to_string()),
            priority: Some(Priority::High),
            ..Default::default()
        };
        store.update(&task.id, &patch).unwrap();
        assert_eq!(persisted(&store), store.tasks());
        assert_eq!(persisted(&store)[0].assignee, "Amir");

        store.toggle_status(&task.id).unwrap();
        assert_eq!(persisted(&store), store.tasks());
        assert_eq!(persisted(&store)[0].status, Status::Done);
    }

    #[test]
    fn test_save_then_reopen() {
        let temp = TempDir::new().unwrap();

        let created = {
            let mut store = TaskStore::new(FileStorage::open(temp.path()).unwrap());
            store.create(TaskDraft::new("Survives restart")).unwrap()
        };

        let mut store = TaskStore::new(FileStorage::open(temp.path()).unwrap());
        assert_eq!(store.load(), LoadSource::Persisted);
        assert_eq!(store.tasks(), &[created]);
    }

    #[test]
    fn test_write_failure_keeps_memory_state() {
        let mut store = empty_store();
        store.storage_mut().fail_writes(true);

        let task = store.create(TaskDraft::new("Unsaved")).unwrap();
        assert_eq!(store.get(&task.id), Some(&task));
        assert!(matches!(store.save(), Err(TaskError::Persistence(_))));
    }

    #[test]
    fn test_custom_key() {
        let mut store = TaskStore::with_key(MemoryStorage::new(), "ops-board").unwrap();
        store.create(TaskDraft::new("Keyed")).unwrap();
        assert!(store.storage().get("ops-board").unwrap().is_some());
        assert!(TaskStore::with_key(MemoryStorage::new(), "bad key").is_err());
    }

    #[test]
    fn test_export_import_round_trip() {
        let mut source = empty_store();
        source
            .create(
                TaskDraft::new("Fix truck 12")
                    .description("Replace, then test")
                    .assignee("Dana")
                    .priority(Priority::Critical)
                    .status(Status::InProgress)
                    .due_date(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()),
            )
            .unwrap();
        source.create(TaskDraft::new("Quote \"this\"\nand a newline")).unwrap();

        let mut target = empty_store();
        let count = target.import_csv(&source.export_csv()).unwrap();

        assert_eq!(count, 2);
        assert_eq!(target.tasks(), source.tasks());
        assert_eq!(target.tasks()[1].description, "Replace, then test");
    }

    #[test]
    fn test_import_prepends_in_order() {
        let mut store = empty_store();
        let existing = store.create(TaskDraft::new("Existing")).unwrap();

        let text = "title,assignee\n\"Imported A\",\"Amir\"\n\"Imported B\",\"\"";
        assert_eq!(store.import_csv(text).unwrap(), 2);

        let titles: Vec<&str> = store.tasks().iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["Imported A", "Imported B", "Existing"]);
        assert_eq!(store.tasks()[2], existing);
        assert!(store.assignees().contains("Amir"));
        assert_eq!(persisted(&store).len(), 3);
    }

    #[test]
    fn test_import_reassigns_colliding_id() {
        let mut store = empty_store();
        let existing = store.create(TaskDraft::new("Existing")).unwrap();

        let text = format!("id,title\n{},\"Clash\"", csv::quote(&existing.id));
        store.import_csv(&text).unwrap();

        let ids: HashSet<&str> = store.tasks().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn test_empty_import_leaves_store_unchanged() {
        let mut store = empty_store();
        store.create(TaskDraft::new("Existing")).unwrap();
        let before = store.tasks().to_vec();
        let revision = store.revision();

        let result = store.import_csv("id,title,description");
        assert!(matches!(result, Err(TaskError::EmptyImport)));
        assert_eq!(store.tasks(), before.as_slice());
        assert_eq!(store.revision(), revision);

        // Slot released after failure
        assert!(store.begin_import().is_ok());
    }

    #[test]
    fn test_import_rows_without_titles_is_empty() {
        let mut store = empty_store();
        let result = store.import_csv("title,assignee\n\"\",\"Dana\"");
        assert!(matches!(result, Err(TaskError::EmptyImport)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_second_import_rejected_while_pending() {
        let mut store = empty_store();
        let ticket = store.begin_import().unwrap();

        assert!(matches!(store.begin_import(), Err(TaskError::ImportInProgress)));
        assert!(matches!(
            store.import_csv("title\n\"x\""),
            Err(TaskError::ImportInProgress)
        ));

        // Mutations made while the read is outstanding are kept by the merge
        store.create(TaskDraft::new("Meanwhile")).unwrap();
        store.complete_import(ticket, "title\n\"Imported\"").unwrap();

        let titles: Vec<&str> = store.tasks().iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["Imported", "Meanwhile"]);
    }

    #[test]
    fn test_ticket_from_other_store_rejected() {
        let mut first = empty_store();
        let mut second = empty_store();
        let foreign = first.begin_import().unwrap();

        // No import pending on the second store
        assert!(matches!(
            second.complete_import(foreign, "title\n\"Smuggled\""),
            Err(TaskError::ImportTicketMismatch)
        ));
        assert!(second.is_empty());

        // Pending on the second store, completed with another store's ticket
        let own = second.begin_import().unwrap();
        let other = {
            let mut third = empty_store();
            third.begin_import().unwrap()
        };
        assert!(matches!(
            second.complete_import(other, "title\n\"Smuggled\""),
            Err(TaskError::ImportTicketMismatch)
        ));
        assert!(second.is_empty());

        // The rightful ticket still works
        assert_eq!(second.complete_import(own, "title\n\"Legit\"").unwrap(), 1);
    }

    #[test]
    fn test_cancel_with_foreign_ticket_keeps_slot() {
        let mut first = empty_store();
        let mut second = empty_store();
        let own = second.begin_import().unwrap();
        let foreign = first.begin_import().unwrap();

        second.cancel_import(foreign);
        assert!(matches!(second.begin_import(), Err(TaskError::ImportInProgress)));

        second.cancel_import(own);
        assert!(second.begin_import().is_ok());
    }

    #[test]
    fn test_cancel_import_releases_slot() {
        let mut store = empty_store();
        let ticket = store.begin_import().unwrap();
        store.cancel_import(ticket);
        assert_eq!(store.import_csv("title\n\"After cancel\"").unwrap(), 1);
    }

    #[test]
    fn test_query_through_store() {
        let mut store = empty_store();
        store.create(TaskDraft::new("Fix truck 12")).unwrap();
        store.create(TaskDraft::new("SAP update")).unwrap();

        let view = store.query(&Query::new().search("truck").sort(SortKey::Priority));
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].title, "Fix truck 12");
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_revision_tracks_mutations() {
        let mut store = empty_store();
        let r0 = store.revision();
        let task = store.create(TaskDraft::new("a")).unwrap();
        let r1 = store.revision();
        store.toggle_status(&task.id).unwrap();
        let r2 = store.revision();

        assert!(r0 < r1 && r1 < r2);
    }
}
