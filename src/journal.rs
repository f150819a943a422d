//! Local payment journal — advisory record of submitted-but-unconfirmed
//! payment actions.
//!
//! Bridges UI state across reloads while the server processes payouts
//! asynchronously. Two stores per project, mirroring the browser-storage keys
//! of the original client:
//!
//! * `submitted_payments_{project_id}` — entries awaiting server confirmation
//! * `payment_history_{project_id}`    — concluded actions, keyed by milestone
//!
//! The journal is never the source of truth. On every milestone refresh,
//! [`PaymentJournal::reconcile`] drops submitted entries the server has since
//! confirmed (`payment_released == true`).

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;

use fs2::FileExt;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::errors::{EscrowError, Result};
use crate::types::{JournalEntry, Milestone};

/// Keyed JSON persistence the journal writes through. Implementations hold
/// JSON-serialized arrays/maps, one value per key.
pub trait JournalStore {
    fn load(&self, key: &str) -> Result<Option<Value>>;
    fn save(&self, key: &str, value: &Value) -> Result<()>;
}

// ─────────────────────────────────────────────────────────
// Stores
// ─────────────────────────────────────────────────────────

/// One JSON file per key under a journal directory.
///
/// Saves are atomic: the value is written to a uuid-suffixed temp file and
/// renamed into place under an exclusive advisory lock.
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl JournalStore for JsonFileStore {
    fn load(&self, key: &str) -> Result<Option<Value>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_err(key, e)),
        }
    }

    fn save(&self, key: &str, value: &Value) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| storage_err(key, e))?;

        let path = self.path_for(key);
        let temp_path = self
            .dir
            .join(format!("{key}.json.tmp.{}", Uuid::new_v4()));
        let json = serde_json::to_string_pretty(value)?;
        fs::write(&temp_path, json).map_err(|e| storage_err(key, e))?;

        let lock_path = path.with_extension("lock");
        let locked = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .and_then(|f| {
                FileExt::lock_exclusive(&f)?;
                Ok(f)
            });
        let lock_file = match locked {
            Ok(f) => f,
            Err(e) => {
                // Don't strand the temp file alongside the journal.
                let _ = fs::remove_file(&temp_path);
                return Err(storage_err(key, e));
            }
        };

        let renamed = fs::rename(&temp_path, &path);
        let _ = FileExt::unlock(&lock_file);
        if let Err(e) = renamed {
            let _ = fs::remove_file(&temp_path);
            return Err(storage_err(key, e));
        }
        Ok(())
    }
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JournalStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<Value>> {
        let inner = self
            .inner
            .lock()
            .map_err(|_| storage_err(key, std::io::Error::other("store mutex poisoned")))?;
        Ok(inner.get(key).cloned())
    }

    fn save(&self, key: &str, value: &Value) -> Result<()> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| storage_err(key, std::io::Error::other("store mutex poisoned")))?;
        inner.insert(key.to_string(), value.clone());
        Ok(())
    }
}

fn storage_err(key: &str, source: std::io::Error) -> EscrowError {
    EscrowError::Storage {
        key: key.to_string(),
        source,
    }
}

// ─────────────────────────────────────────────────────────
// Journal
// ─────────────────────────────────────────────────────────

pub struct PaymentJournal<S: JournalStore> {
    store: S,
    project_id: u64,
    submitted: Vec<JournalEntry>,
    history: BTreeMap<u32, JournalEntry>,
}

impl<S: JournalStore> PaymentJournal<S> {
    /// Load both stores for a project; missing keys start empty.
    pub fn open(store: S, project_id: u64) -> Result<Self> {
        let submitted = match store.load(&submitted_key(project_id))? {
            Some(value) => serde_json::from_value(value)?,
            None => Vec::new(),
        };
        let history = match store.load(&history_key(project_id))? {
            Some(value) => serde_json::from_value(value)?,
            None => BTreeMap::new(),
        };
        Ok(Self {
            store,
            project_id,
            submitted,
            history,
        })
    }

    pub fn project_id(&self) -> u64 {
        self.project_id
    }

    /// Record a payment action awaiting server confirmation. Replaces any
    /// prior submission for the same milestone.
    pub fn record_submission(&mut self, entry: JournalEntry) -> Result<()> {
        self.submitted
            .retain(|e| e.milestone_index != entry.milestone_index);
        self.submitted.push(entry);
        self.persist_submitted()
    }

    /// Record a concluded payment action, keyed by milestone index.
    pub fn record_history(&mut self, entry: JournalEntry) -> Result<()> {
        self.history.insert(entry.milestone_index, entry);
        self.persist_history()
    }

    /// Look up the journalled entry for a milestone, submitted set first.
    pub fn get(&self, index: u32) -> Option<&JournalEntry> {
        self.submitted
            .iter()
            .find(|e| e.milestone_index == index)
            .or_else(|| self.history.get(&index))
    }

    pub fn submitted(&self) -> &[JournalEntry] {
        &self.submitted
    }

    pub fn history(&self) -> &BTreeMap<u32, JournalEntry> {
        &self.history
    }

    pub fn contains_submitted(&self, index: u32) -> bool {
        self.submitted.iter().any(|e| e.milestone_index == index)
    }

    /// Drop the submitted entry for one milestone if the server now reports
    /// it released. Returns whether an entry was removed.
    pub fn clear_if_confirmed(&mut self, milestone: &Milestone) -> Result<bool> {
        if !milestone.payment_released || !self.contains_submitted(milestone.index) {
            return Ok(false);
        }
        debug!(
            "journal: milestone {} confirmed released, dropping submitted entry",
            milestone.index
        );
        self.submitted
            .retain(|e| e.milestone_index != milestone.index);
        self.persist_submitted()?;
        Ok(true)
    }

    /// Reconcile the submitted set against a fresh milestone list. Returns
    /// how many provisional entries the server has since confirmed.
    pub fn reconcile(&mut self, milestones: &[Milestone]) -> Result<usize> {
        let mut cleared = 0;
        for m in milestones {
            if self.clear_if_confirmed(m)? {
                cleared += 1;
            }
        }
        Ok(cleared)
    }

    fn persist_submitted(&self) -> Result<()> {
        let value = serde_json::to_value(&self.submitted)?;
        self.store.save(&submitted_key(self.project_id), &value)
    }

    fn persist_history(&self) -> Result<()> {
        let value = serde_json::to_value(&self.history)?;
        self.store.save(&history_key(self.project_id), &value)
    }
}

fn submitted_key(project_id: u64) -> String {
    format!("submitted_payments_{project_id}")
}

fn history_key(project_id: u64) -> String {
    format!("payment_history_{project_id}")
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::JournalEntryStatus;

    fn entry(index: u32, status: JournalEntryStatus) -> JournalEntry {
        JournalEntry {
            milestone_index: index,
            amount: 2_500.0,
            title: format!("Milestone {index}"),
            payment_id: format!("po_{index}"),
            timestamp: 1_704_067_200,
            status,
        }
    }

    #[test]
    fn record_and_get() {
        let mut journal = PaymentJournal::open(MemoryStore::new(), 1).unwrap();
        journal
            .record_submission(entry(3, JournalEntryStatus::Submitted))
            .unwrap();
        journal
            .record_history(entry(0, JournalEntryStatus::Transferred))
            .unwrap();

        assert!(journal.contains_submitted(3));
        assert_eq!(
            journal.get(3).unwrap().status,
            JournalEntryStatus::Submitted
        );
        assert_eq!(
            journal.get(0).unwrap().status,
            JournalEntryStatus::Transferred
        );
        assert!(journal.get(7).is_none());
    }

    #[test]
    fn resubmission_replaces_prior_entry() {
        let mut journal = PaymentJournal::open(MemoryStore::new(), 1).unwrap();
        journal
            .record_submission(entry(2, JournalEntryStatus::Submitted))
            .unwrap();
        journal
            .record_submission(entry(2, JournalEntryStatus::Submitted))
            .unwrap();
        assert_eq!(journal.submitted().len(), 1);
    }

    #[test]
    fn reconcile_drops_confirmed_entries() {
        let mut journal = PaymentJournal::open(MemoryStore::new(), 1).unwrap();
        journal
            .record_submission(entry(3, JournalEntryStatus::Submitted))
            .unwrap();

        let released = Milestone {
            index: 3,
            payment_released: true,
            ..Milestone::default()
        };
        let untouched = Milestone {
            index: 4,
            ..Milestone::default()
        };

        let cleared = journal.reconcile(&[released, untouched]).unwrap();
        assert_eq!(cleared, 1);
        assert!(!journal.contains_submitted(3));
    }

    #[test]
    fn reconcile_keeps_unconfirmed_entries() {
        let mut journal = PaymentJournal::open(MemoryStore::new(), 1).unwrap();
        journal
            .record_submission(entry(3, JournalEntryStatus::Submitted))
            .unwrap();

        let pending = Milestone {
            index: 3,
            payment_released: false,
            ..Milestone::default()
        };
        assert_eq!(journal.reconcile(&[pending]).unwrap(), 0);
        assert!(journal.contains_submitted(3));
    }

    #[test]
    fn journal_survives_reopen_with_file_store() {
        let dir = std::env::temp_dir().join(format!("escrow_journal_{}", Uuid::new_v4()));

        {
            let mut journal =
                PaymentJournal::open(JsonFileStore::new(dir.clone()), 42).unwrap();
            journal
                .record_submission(entry(1, JournalEntryStatus::Submitted))
                .unwrap();
            journal
                .record_history(entry(0, JournalEntryStatus::Completed))
                .unwrap();
        }

        let reopened = PaymentJournal::open(JsonFileStore::new(dir.clone()), 42).unwrap();
        assert!(reopened.contains_submitted(1));
        assert_eq!(
            reopened.history().get(&0).unwrap().status,
            JournalEntryStatus::Completed
        );

        // Different project id, different keys: nothing bleeds over.
        let other = PaymentJournal::open(JsonFileStore::new(dir.clone()), 43).unwrap();
        assert!(other.submitted().is_empty());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn file_store_missing_key_is_empty() {
        let dir = std::env::temp_dir().join(format!("escrow_journal_{}", Uuid::new_v4()));
        let store = JsonFileStore::new(dir.clone());
        assert!(store.load("submitted_payments_9").unwrap().is_none());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn failed_save_leaves_no_temp_files() {
        let dir = std::env::temp_dir().join(format!("escrow_journal_{}", Uuid::new_v4()));
        // Occupy the target path with a directory so the rename fails.
        fs::create_dir_all(dir.join("payment_history_8.json")).unwrap();

        let store = JsonFileStore::new(dir.clone());
        let result = store.save("payment_history_8", &serde_json::json!([]));
        assert!(matches!(result, Err(EscrowError::Storage { .. })));

        let leftovers: Vec<_> = fs::read_dir(&dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name.contains(".tmp."))
            .collect();
        assert!(leftovers.is_empty(), "stranded temp files: {leftovers:?}");

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn file_store_rejects_corrupt_json() {
        let dir = std::env::temp_dir().join(format!("escrow_journal_{}", Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("payment_history_5.json"), "{ not json }").unwrap();

        let store = JsonFileStore::new(dir.clone());
        match store.load("payment_history_5") {
            Err(EscrowError::Json(_)) => {}
            other => panic!("expected Json error, got {other:?}"),
        }
        let _ = fs::remove_dir_all(&dir);
    }
}
