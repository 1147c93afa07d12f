//! Flat-file ledger persistence.
//!
//! The full machine-history map is rewritten each cycle. Writes go to a
//! temp file first and are renamed into place so a concurrent reader
//! (the dashboard) never observes a partial file.

use chrono::Utc;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::models::MachineHistory;

/// Ledger persistence error types.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Persists the machine-history map to a single JSON file.
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load histories from disk, discarding entries outside the
    /// retention window relative to load-time wall clock.
    ///
    /// A missing or unreadable file yields an empty map; startup never
    /// fails on the ledger.
    pub fn load(&self) -> HashMap<String, MachineHistory> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(_) => {
                tracing::info!("No history file at {}, starting fresh", self.path.display());
                return HashMap::new();
            }
        };

        let mut histories: HashMap<String, MachineHistory> = match serde_json::from_str(&raw) {
            Ok(map) => map,
            Err(e) => {
                tracing::warn!(
                    "Failed to load machine history from {}: {}",
                    self.path.display(),
                    e
                );
                return HashMap::new();
            }
        };

        let now = Utc::now();
        for (machine_id, history) in histories.iter_mut() {
            history.machine_id = machine_id.clone();
            history.retain_recent(now);
        }

        let total_entries: usize = histories.values().map(|h| h.entries.len()).sum();
        tracing::info!(
            "Loaded history for {} machines ({} entries within retention)",
            histories.len(),
            total_entries
        );
        histories
    }

    /// Rewrite the ledger file wholesale, atomically.
    pub fn save(&self, histories: &HashMap<String, MachineHistory>) -> Result<(), LedgerError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp_path = self.path.with_extension("json.tmp");
        let data = serde_json::to_string_pretty(histories)?;
        fs::write(&tmp_path, data)?;
        fs::rename(&tmp_path, &self.path)?;

        tracing::debug!("Machine history saved to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{DetectionClass, MachineStatus};
    use chrono::{Duration, Utc};

    fn sample_histories() -> HashMap<String, MachineHistory> {
        let now = Utc::now();
        let mut history = MachineHistory::new("machine_0");
        history.append(
            now - Duration::minutes(4),
            MachineStatus::Active,
            DetectionClass::MachineActive,
            0.9,
            serde_json::json!({"zone": "region_0"}),
        );
        history.append(
            now - Duration::minutes(2),
            MachineStatus::Inactive,
            DetectionClass::MachineOff,
            0.7,
            serde_json::json!({}),
        );
        let mut map = HashMap::new();
        map.insert("machine_0".to_string(), history);
        map
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("machine_history.json"));

        let histories = sample_histories();
        store.save(&histories).unwrap();

        let loaded = store.load();
        assert_eq!(loaded.len(), 1);
        let history = &loaded["machine_0"];
        assert_eq!(history.machine_id, "machine_0");
        assert_eq!(history.entries.len(), 2);
        assert_eq!(
            history.entries[0].timestamp,
            histories["machine_0"].entries[0].timestamp
        );
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("missing.json"));
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_load_corrupt_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("machine_history.json");
        fs::write(&path, "{not json").unwrap();
        let store = HistoryStore::new(&path);
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_load_filters_stale_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("machine_history.json"));

        let now = Utc::now();
        let mut history = MachineHistory::new("machine_0");
        history.entries.push(super::super::StatusEntry {
            timestamp: now - Duration::days(10),
            status: MachineStatus::Active,
            class_name: DetectionClass::MachineActive,
            confidence: 0.9,
            details: serde_json::json!({}),
        });
        history.entries.push(super::super::StatusEntry {
            timestamp: now - Duration::hours(1),
            status: MachineStatus::Inactive,
            class_name: DetectionClass::MachineOff,
            confidence: 0.7,
            details: serde_json::json!({}),
        });
        let mut map = HashMap::new();
        map.insert("machine_0".to_string(), history);
        store.save(&map).unwrap();

        let loaded = store.load();
        assert_eq!(loaded["machine_0"].entries.len(), 1);
    }

    #[test]
    fn test_save_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("machine_history.json"));
        store.save(&sample_histories()).unwrap();
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["machine_history.json".to_string()]);
    }
}
