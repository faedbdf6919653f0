//! crates/mangashelf_core/src/progress.rs
//!
//! Per-device "continue reading" state. One entry per manga, newest first,
//! capped at [`MAX_PROGRESS_ENTRIES`]. Storage is best-effort: failures are
//! logged and swallowed so they can never block reading.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::domain::ReadingProgressEntry;
use crate::ports::{ProgressStorage, StorageError};

/// The schema version lives in the key so a future format can coexist.
pub const PROGRESS_STORAGE_KEY: &str = "mangashelf:reading-progress:v1";
pub const MAX_PROGRESS_ENTRIES: usize = 20;

pub struct ReadingProgressTracker {
    storage: Arc<dyn ProgressStorage>,
}

impl ReadingProgressTracker {
    pub fn new(storage: Arc<dyn ProgressStorage>) -> Self {
        Self { storage }
    }

    /// Upserts the entry for its manga and moves it to the front.
    /// `page` is clamped into `[1, total_pages]`.
    pub fn save(&self, mut entry: ReadingProgressEntry) {
        entry.total_pages = entry.total_pages.max(1);
        entry.page = entry.page.clamp(1, entry.total_pages);

        let mut entries = self.load();
        entries.retain(|existing| existing.manga_id != entry.manga_id);
        entries.insert(0, entry);
        // Stable sort: a prepended entry stays ahead of any equal timestamp.
        entries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        entries.truncate(MAX_PROGRESS_ENTRIES);

        let serialized = match serde_json::to_string(&entries) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "failed to serialize reading progress");
                return;
            }
        };
        if let Err(e) = self.storage.set(PROGRESS_STORAGE_KEY, &serialized) {
            debug!(error = %e, "reading progress not saved");
        }
    }

    /// All well-formed entries, most recently updated first.
    pub fn list(&self) -> Vec<ReadingProgressEntry> {
        let mut entries = self.load();
        entries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        entries
    }

    /// Last position for one manga, for the reader's resume action.
    pub fn get(&self, manga_id: &str) -> Option<ReadingProgressEntry> {
        self.load().into_iter().find(|e| e.manga_id == manga_id)
    }

    fn load(&self) -> Vec<ReadingProgressEntry> {
        let raw = match self.storage.get(PROGRESS_STORAGE_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return vec![],
            Err(e) => {
                debug!(error = %e, "reading progress unavailable");
                return vec![];
            }
        };

        let Ok(values) = serde_json::from_str::<Vec<Value>>(&raw) else {
            warn!("discarding unreadable reading progress slot");
            return vec![];
        };

        values
            .into_iter()
            .filter_map(|value| serde_json::from_value::<ReadingProgressEntry>(value).ok())
            .filter(|entry| !entry.manga_id.is_empty() && !entry.chapter_id.is_empty())
            .collect()
    }
}

/// Process-local storage; the default for tests and headless use.
#[derive(Default)]
pub struct InMemoryStorage {
    slots: Mutex<HashMap<String, String>>,
}

impl ProgressStorage for InMemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let slots = self
            .slots
            .lock()
            .map_err(|e| StorageError(e.to_string()))?;
        Ok(slots.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|e| StorageError(e.to_string()))?;
        slots.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
