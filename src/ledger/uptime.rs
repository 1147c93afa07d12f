//! Windowed uptime reconstruction from sparse status-change entries.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::detection::MachineStatus;

use super::models::StatusEntry;

/// Fixed aggregation bucket width.
pub const BUCKET_SECONDS: i64 = 3600;

/// Active-time percentage over `[window_start, window_end]`.
///
/// Pure function. The segment from the window start to the first
/// in-window entry is attributed to that entry's own status, and the
/// tail segment to the last entry's status; with point-sampled data
/// this is an approximation that holds when status changes are much
/// sparser than the window.
pub fn uptime_percent(
    entries: &[StatusEntry],
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> f64 {
    let window_seconds = (window_end - window_start).num_milliseconds() as f64 / 1000.0;
    if window_seconds <= 0.0 {
        return 0.0;
    }

    let mut in_window: Vec<(DateTime<Utc>, MachineStatus)> = entries
        .iter()
        .filter(|e| e.timestamp >= window_start && e.timestamp <= window_end)
        .map(|e| (e.timestamp, e.status))
        .collect();
    if in_window.is_empty() {
        return 0.0;
    }
    in_window.sort_by_key(|(t, _)| *t);

    let mut active_seconds = 0.0;
    let mut current_status = in_window[0].1;
    let mut last_timestamp = window_start;

    for (timestamp, status) in in_window {
        if current_status == MachineStatus::Active {
            active_seconds += (timestamp - last_timestamp).num_milliseconds() as f64 / 1000.0;
        }
        current_status = status;
        last_timestamp = timestamp;
    }

    if current_status == MachineStatus::Active {
        active_seconds += (window_end - last_timestamp).num_milliseconds() as f64 / 1000.0;
    }

    100.0 * active_seconds / window_seconds
}

/// One fixed hourly activity bucket.
#[derive(Debug, Clone, Serialize)]
pub struct HourlyBucket {
    pub hour_start: DateTime<Utc>,
    /// Wall-clock hour label, e.g. "14:00".
    pub hour: String,
    pub activity_percentage: f64,
    pub active_minutes: f64,
    pub is_current_hour: bool,
}

fn truncate_to_hour(dt: DateTime<Utc>) -> DateTime<Utc> {
    let ts = dt.timestamp();
    DateTime::from_timestamp(ts - ts.rem_euclid(BUCKET_SECONDS), 0).unwrap_or(dt)
}

/// `hours_back` one-hour buckets aligned to wall-clock hour boundaries,
/// oldest first; the most recent bucket ends at `now` rather than the
/// next boundary.
pub fn hourly_buckets(
    entries: &[StatusEntry],
    hours_back: usize,
    now: DateTime<Utc>,
) -> Vec<HourlyBucket> {
    let current_hour = truncate_to_hour(now);
    let mut buckets = Vec::with_capacity(hours_back);

    for i in 0..hours_back {
        let hour_start = current_hour - Duration::hours((hours_back - 1 - i) as i64);
        let is_current_hour = i == hours_back - 1;
        let hour_end = if is_current_hour {
            now
        } else {
            hour_start + Duration::seconds(BUCKET_SECONDS)
        };

        let activity_percentage = uptime_percent(entries, hour_start, hour_end);
        buckets.push(HourlyBucket {
            hour_start,
            hour: hour_start.format("%H:00").to_string(),
            activity_percentage,
            active_minutes: activity_percentage / 100.0 * 60.0,
            is_current_hour,
        });
    }

    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::DetectionClass;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn entry(at: DateTime<Utc>, status: MachineStatus) -> StatusEntry {
        StatusEntry {
            timestamp: at,
            status,
            class_name: match status {
                MachineStatus::Active => DetectionClass::MachineActive,
                MachineStatus::Inactive => DetectionClass::MachineOff,
            },
            confidence: 0.9,
            details: serde_json::json!({}),
        }
    }

    #[test]
    fn test_uptime_empty_entries() {
        assert_eq!(uptime_percent(&[], t0(), t0() + Duration::hours(1)), 0.0);
    }

    #[test]
    fn test_uptime_zero_width_window() {
        let entries = vec![entry(t0(), MachineStatus::Active)];
        assert_eq!(uptime_percent(&entries, t0(), t0()), 0.0);
    }

    #[test]
    fn test_uptime_two_thirds_active() {
        let entries = vec![
            entry(t0(), MachineStatus::Active),
            entry(t0() + Duration::minutes(20), MachineStatus::Inactive),
        ];
        let pct = uptime_percent(&entries, t0(), t0() + Duration::minutes(30));
        assert!((pct - 66.666).abs() < 0.1, "uptime {}", pct);
    }

    #[test]
    fn test_uptime_is_pure() {
        let entries = vec![
            entry(t0(), MachineStatus::Inactive),
            entry(t0() + Duration::minutes(10), MachineStatus::Active),
            entry(t0() + Duration::minutes(40), MachineStatus::Inactive),
        ];
        let a = uptime_percent(&entries, t0(), t0() + Duration::hours(1));
        let b = uptime_percent(&entries, t0(), t0() + Duration::hours(1));
        assert_eq!(a, b);
        assert!((a - 50.0).abs() < 0.1, "uptime {}", a);
    }

    #[test]
    fn test_uptime_head_segment_uses_first_entry_status() {
        // The first in-window entry is active, so the head segment
        // counts as active even though the true prior state is unknown.
        let entries = vec![
            entry(t0() + Duration::minutes(30), MachineStatus::Active),
            entry(t0() + Duration::minutes(45), MachineStatus::Inactive),
        ];
        let pct = uptime_percent(&entries, t0(), t0() + Duration::hours(1));
        assert!((pct - 75.0).abs() < 0.1, "uptime {}", pct);
    }

    #[test]
    fn test_uptime_tail_attributed_to_last_entry() {
        let entries = vec![entry(t0(), MachineStatus::Active)];
        let pct = uptime_percent(&entries, t0(), t0() + Duration::hours(1));
        assert!((pct - 100.0).abs() < 0.1);
    }

    #[test]
    fn test_uptime_entries_outside_window_ignored() {
        let entries = vec![
            entry(t0() - Duration::hours(2), MachineStatus::Active),
            entry(t0() + Duration::hours(2), MachineStatus::Active),
        ];
        assert_eq!(uptime_percent(&entries, t0(), t0() + Duration::hours(1)), 0.0);
    }

    #[test]
    fn test_hourly_buckets_shape() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let buckets = hourly_buckets(&[], 24, now);
        assert_eq!(buckets.len(), 24);

        let first = &buckets[0];
        assert_eq!(
            first.hour_start,
            Utc.with_ymd_and_hms(2024, 2, 29, 13, 0, 0).unwrap()
        );
        assert!(!first.is_current_hour);

        let last = &buckets[23];
        assert_eq!(
            last.hour_start,
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
        );
        assert!(last.is_current_hour);
        assert_eq!(last.hour, "12:00");
    }

    #[test]
    fn test_hourly_buckets_current_hour_ends_at_now() {
        // Active since 12:00, now 12:30: the current bucket spans only
        // half an hour and is fully active.
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let entries = vec![entry(
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            MachineStatus::Active,
        )];
        let buckets = hourly_buckets(&entries, 2, now);
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].activity_percentage, 0.0);
        assert!((buckets[1].activity_percentage - 100.0).abs() < 0.1);
        assert!((buckets[1].active_minutes - 60.0).abs() < 0.1);
    }
}
