//! Ledger model types.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::detection::{DetectionClass, MachineStatus};

/// Entries older than this (relative to the newest entry) are pruned.
pub const RETENTION_DAYS: i64 = 7;

/// A single status observation. Appended once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEntry {
    pub timestamp: DateTime<Utc>,
    pub status: MachineStatus,
    pub class_name: DetectionClass,
    pub confidence: f64,
    #[serde(default)]
    pub details: serde_json::Value,
}

/// Per-machine append-only status history.
///
/// `last_active_time` and `last_inactive_time` always reflect the most
/// recent entry of that kind ever appended; they are not subject to the
/// 7-day entry pruning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineHistory {
    #[serde(skip)]
    pub machine_id: String,
    pub last_active_time: Option<DateTime<Utc>>,
    pub last_inactive_time: Option<DateTime<Utc>>,
    pub entries: Vec<StatusEntry>,
}

impl MachineHistory {
    pub fn new(machine_id: impl Into<String>) -> Self {
        Self {
            machine_id: machine_id.into(),
            last_active_time: None,
            last_inactive_time: None,
            entries: Vec::new(),
        }
    }

    /// Append a status entry stamped with the cycle timestamp, update
    /// the last active/inactive markers, and prune entries older than
    /// the retention window relative to that timestamp.
    pub fn append(
        &mut self,
        timestamp: DateTime<Utc>,
        status: MachineStatus,
        class_name: DetectionClass,
        confidence: f64,
        details: serde_json::Value,
    ) {
        self.entries.push(StatusEntry {
            timestamp,
            status,
            class_name,
            confidence,
            details,
        });

        match status {
            MachineStatus::Active => self.last_active_time = Some(timestamp),
            MachineStatus::Inactive => self.last_inactive_time = Some(timestamp),
        }

        self.retain_recent(timestamp);
    }

    /// Drop entries older than the retention window relative to `reference`.
    pub fn retain_recent(&mut self, reference: DateTime<Utc>) {
        let cutoff = reference - Duration::days(RETENTION_DAYS);
        self.entries.retain(|e| e.timestamp >= cutoff);
    }

    /// Time since the machine was last active.
    ///
    /// `None` if it has never been active, zero if it is currently
    /// active (last active more recent than last inactive).
    pub fn inactive_duration(&self, now: DateTime<Utc>) -> Option<Duration> {
        let last_active = self.last_active_time?;
        match self.last_inactive_time {
            Some(last_inactive) if last_active <= last_inactive => Some(now - last_active),
            _ => Some(Duration::zero()),
        }
    }

    pub fn is_inactive_too_long(&self, threshold_minutes: i64, now: DateTime<Utc>) -> bool {
        match self.inactive_duration(now) {
            Some(duration) => duration > Duration::minutes(threshold_minutes),
            None => false,
        }
    }
}
