//! Cycle orchestrator: capture, classify, ledger update, persistence,
//! and alert evaluation on a timed loop or as a single shot.

mod artifacts;

pub use artifacts::*;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::alert::{AlertChannel, EmailNotifier, Notifier, SmsNotifier};
use crate::capture::{CaptureProvider, CaptureSettings};
use crate::classifier;
use crate::config::MonitorConfig;
use crate::detection::{DetectionClass, DetectionResult, MachineStatus};
use crate::ledger::{HistoryStore, MachineHistory};

/// The monitor: owns the capture provider, the in-memory ledger, and
/// both alert channels. All per-cycle work runs sequentially on one
/// task, so none of this state needs locking.
pub struct Monitor<C: CaptureProvider> {
    config: MonitorConfig,
    capture: C,
    histories: HashMap<String, MachineHistory>,
    store: HistoryStore,
    email: AlertChannel<EmailNotifier>,
    sms: AlertChannel<SmsNotifier>,
    artifacts: ArtifactWriter,
}

impl<C: CaptureProvider> Monitor<C> {
    pub fn new(config: MonitorConfig, capture: C) -> Self {
        let store = HistoryStore::new(
            std::path::Path::new(&config.output.output_dir).join("machine_history.json"),
        );
        let histories = store.load();

        let email_notifier = EmailNotifier::new(config.alerts.email.clone());
        let sms_notifier = SmsNotifier::new(config.alerts.sms.clone());
        if config.alerts.email.enabled && !email_notifier.configured() {
            tracing::warn!("Email alerts enabled but not fully configured");
        }
        if config.alerts.sms.enabled && !sms_notifier.configured() {
            tracing::warn!("SMS alerts enabled but not fully configured");
        }

        let email = AlertChannel::new(
            email_notifier,
            config.alerts.email.enabled,
            config.alerts.alert_machines.clone(),
        );
        let sms = AlertChannel::new(
            sms_notifier,
            config.alerts.sms.enabled,
            config.alerts.alert_machines.clone(),
        );
        let artifacts = ArtifactWriter::new(&config.output);

        Self {
            config,
            capture,
            histories,
            store,
            email,
            sms,
            artifacts,
        }
    }

    /// Run the monitor: continuously on the configured interval, or a
    /// single cycle. Returns whether the run succeeded.
    pub async fn run(&mut self, continuous: bool) -> bool {
        let mode = if continuous {
            "continuous monitoring"
        } else {
            "single-shot"
        };
        tracing::info!("Starting monitor ({} mode)", mode);

        if let Err(e) = self.capture.open() {
            tracing::error!("Failed to open capture source: {}", e);
            return false;
        }
        let settings = CaptureSettings {
            width: self.config.capture.width,
            height: self.config.capture.height,
        };
        if let Err(e) = self.capture.configure(&settings) {
            tracing::warn!("Failed to configure capture source: {}", e);
        }

        let success = if continuous {
            self.run_continuous().await;
            true
        } else {
            self.run_cycle().await
        };

        self.capture.close();
        tracing::info!("Monitor session ended");
        success
    }

    /// Fixed-interval loop. A cycle that overruns the interval is
    /// logged and the next one starts immediately; missed cycles are
    /// not caught up. Ctrl-c exits cleanly between cycles.
    async fn run_continuous(&mut self) {
        let interval = Duration::from_secs(self.config.monitoring.interval_seconds.max(1));
        tracing::info!(
            "Starting continuous monitoring (interval: {}s)",
            interval.as_secs()
        );

        let mut cycle_count = 0u64;
        loop {
            cycle_count += 1;
            tracing::info!("=== Monitoring cycle {} ===", cycle_count);
            let start = Instant::now();

            if !self.run_cycle().await {
                tracing::error!("Detection cycle failed, continuing...");
            }

            let elapsed = start.elapsed();
            let sleep_for = interval.saturating_sub(elapsed);
            if sleep_for.is_zero() {
                tracing::warn!(
                    "Cycle took {:.1}s (longer than {}s interval)",
                    elapsed.as_secs_f64(),
                    interval.as_secs()
                );
            } else {
                tracing::info!(
                    "Cycle completed in {:.1}s, sleeping for {:.1}s",
                    elapsed.as_secs_f64(),
                    sleep_for.as_secs_f64()
                );
            }

            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {}
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Monitoring stopped by user");
                    break;
                }
            }
        }
        tracing::info!("Continuous monitoring ended after {} cycles", cycle_count);
    }

    /// One full cycle. A capture failure aborts the cycle before any
    /// ledger write; later failures are contained per step.
    async fn run_cycle(&mut self) -> bool {
        let now = Utc::now();

        let frame = match self.capture.read() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!("Failed to capture frame: {}", e);
                return false;
            }
        };
        tracing::info!("Frame captured: {}x{}", frame.width(), frame.height());

        let detections = classifier::classify_frame(
            &frame,
            &self.config.regions,
            &self.config.detection,
            now,
        );
        tracing::info!("Detected {} objects", detections.len());

        self.update_machine_status(&detections, now).await;

        if let Err(e) = self.store.save(&self.histories) {
            tracing::error!("Failed to save machine history: {}", e);
        }

        self.check_inactive_alerts(now).await;

        if self.config.output.save_screenshots {
            if let Err(e) = self.artifacts.save_annotated(&frame, &detections, now) {
                tracing::error!("Failed to save annotated frame: {}", e);
            }
        }
        if self.config.output.save_detections {
            if let Err(e) = self
                .artifacts
                .save_detections(&detections, self.config_summary(), now)
            {
                tracing::error!("Failed to save detection results: {}", e);
            }
        }
        self.artifacts.cleanup();

        tracing::info!("Detection cycle complete: {} objects found", detections.len());
        for detection in &detections {
            tracing::info!(
                "  {}: {:.3} ({:?})",
                detection.class_name.as_str(),
                detection.confidence,
                detection.laser_status
            );
        }
        true
    }

    fn config_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "detection_mode": "bbox",
            "confidence_threshold": self.config.detection.confidence_threshold,
            "force_detection": self.config.detection.force_detection,
            "region_count": self.config.regions.len(),
        })
    }

    /// Append this cycle's status per machine and let the alert
    /// channels observe the transitions.
    ///
    /// Detection `i` maps to `machine_i`. An empty detection set is
    /// recorded as `machine_0` inactive so a dead camera view still
    /// trips the inactivity alert.
    async fn update_machine_status(&mut self, detections: &[DetectionResult], now: DateTime<Utc>) {
        if detections.is_empty() {
            self.record_status(
                "machine_0",
                MachineStatus::Inactive,
                DetectionClass::MachineOff,
                0.0,
                serde_json::json!({"reason": "no_detections"}),
                now,
            )
            .await;
            return;
        }

        for (i, detection) in detections.iter().enumerate() {
            let machine_id = format!("machine_{}", i);
            let status = detection.laser_status.machine_status();
            let details = serde_json::json!({
                "bbox": detection.bbox,
                "zone": detection.zone_name,
                "extras": detection.extras,
            });
            self.record_status(
                &machine_id,
                status,
                detection.class_name,
                detection.confidence,
                details,
                now,
            )
            .await;
            tracing::info!(
                "Updated {}: {:?} ({}, conf={:.3})",
                machine_id,
                status,
                detection.class_name.as_str(),
                detection.confidence
            );
        }
    }

    async fn record_status(
        &mut self,
        machine_id: &str,
        status: MachineStatus,
        class_name: DetectionClass,
        confidence: f64,
        details: serde_json::Value,
        now: DateTime<Utc>,
    ) {
        let history = self
            .histories
            .entry(machine_id.to_string())
            .or_insert_with(|| MachineHistory::new(machine_id.to_string()));

        // Measure the inactive run before this entry lands so a
        // recovery alert carries the real elapsed time.
        let prior_inactive_minutes = history
            .inactive_duration(now)
            .map(|d| d.num_milliseconds() as f64 / 60_000.0)
            .unwrap_or(0.0);

        history.append(now, status, class_name, confidence, details);

        self.email
            .observe_status(machine_id, status, prior_inactive_minutes)
            .await;
        self.sms
            .observe_status(machine_id, status, prior_inactive_minutes)
            .await;
    }

    /// Fire inactive alerts for machines past the threshold.
    async fn check_inactive_alerts(&mut self, now: DateTime<Utc>) {
        let threshold = self.config.monitoring.inactive_alert_threshold_minutes;

        let mut overdue = Vec::new();
        for (machine_id, history) in &self.histories {
            if history.is_inactive_too_long(threshold, now) {
                let minutes = history
                    .inactive_duration(now)
                    .map(|d| d.num_milliseconds() as f64 / 60_000.0)
                    .unwrap_or(0.0);
                overdue.push((machine_id.clone(), minutes, history.last_active_time));
            }
        }

        for (machine_id, minutes, last_active) in overdue {
            tracing::warn!("ALERT: {} inactive for {:.1} minutes", machine_id, minutes);
            self.email
                .check_inactive(&machine_id, minutes, last_active, now)
                .await;
            self.sms
                .check_inactive(&machine_id, minutes, last_active, now)
                .await;
        }
    }

    /// Send a test notification through the email channel without
    /// touching alert state.
    pub async fn test_email_alert(&self, recovery: bool) -> bool {
        let result = if recovery {
            self.email.send_test_recovery("machine_0", 15.5).await
        } else {
            let last_active = Utc::now() - ChronoDuration::minutes(15);
            self.email
                .send_test_inactive("machine_0", 15.5, Some(last_active))
                .await
        };
        report_alert_test("email", recovery, result)
    }

    /// Send a test notification through the SMS channel without
    /// touching alert state.
    pub async fn test_sms_alert(&self, recovery: bool) -> bool {
        let result = if recovery {
            self.sms.send_test_recovery("machine_0", 15.5).await
        } else {
            let last_active = Utc::now() - ChronoDuration::minutes(15);
            self.sms
                .send_test_inactive("machine_0", 15.5, Some(last_active))
                .await
        };
        report_alert_test("sms", recovery, result)
    }

    #[cfg(test)]
    fn history(&self, machine_id: &str) -> Option<&MachineHistory> {
        self.histories.get(machine_id)
    }
}

fn report_alert_test(channel: &str, recovery: bool, result: Result<(), crate::alert::AlertError>) -> bool {
    let kind = if recovery { "active-again" } else { "inactive" };
    match result {
        Ok(()) => {
            tracing::info!("Test {} {} alert sent successfully", channel, kind);
            true
        }
        Err(e) => {
            tracing::error!("Failed to send test {} {} alert: {}", channel, kind, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CaptureError;
    use crate::config::{OutputConfig, RegionSpec};
    use image::{Rgb, RgbImage};

    /// Capture double returning a fixed frame, or failing.
    struct StubCapture {
        frame: Option<RgbImage>,
    }

    impl CaptureProvider for StubCapture {
        fn open(&mut self) -> Result<(), CaptureError> {
            Ok(())
        }

        fn read(&mut self) -> Result<RgbImage, CaptureError> {
            self.frame
                .clone()
                .ok_or_else(|| CaptureError::FrameUnavailable("stub".to_string()))
        }

        fn configure(&mut self, _settings: &CaptureSettings) -> Result<(), CaptureError> {
            Ok(())
        }

        fn close(&mut self) {}
    }

    fn test_config(dir: &std::path::Path, regions: Vec<RegionSpec>) -> MonitorConfig {
        let mut config = MonitorConfig {
            regions,
            ..MonitorConfig::default()
        };
        config.output = OutputConfig {
            output_dir: dir.to_str().unwrap().to_string(),
            save_detections: false,
            save_screenshots: false,
            ..OutputConfig::default()
        };
        // Keep the transports quiet in tests.
        config.alerts.email.enabled = false;
        config.alerts.sms.enabled = false;
        config
    }

    fn dark_frame() -> RgbImage {
        RgbImage::from_pixel(60, 60, Rgb([10, 10, 10]))
    }

    #[tokio::test]
    async fn test_empty_cycle_records_machine_0_inactive() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), Vec::new());
        let capture = StubCapture {
            frame: Some(dark_frame()),
        };
        let mut monitor = Monitor::new(config, capture);

        assert!(monitor.run_cycle().await);

        let history = monitor.history("machine_0").unwrap();
        assert_eq!(history.entries.len(), 1);
        let entry = &history.entries[0];
        assert_eq!(entry.status, MachineStatus::Inactive);
        assert_eq!(entry.class_name, DetectionClass::MachineOff);
        assert_eq!(entry.details["reason"], "no_detections");
    }

    #[tokio::test]
    async fn test_cycle_appends_one_entry_per_region() {
        let dir = tempfile::tempdir().unwrap();
        let regions = vec![
            RegionSpec {
                bbox: [0.0, 0.0, 0.5, 1.0],
                ..RegionSpec::default()
            },
            RegionSpec {
                bbox: [0.5, 0.0, 1.0, 1.0],
                ..RegionSpec::default()
            },
        ];
        let config = test_config(dir.path(), regions);
        let capture = StubCapture {
            frame: Some(dark_frame()),
        };
        let mut monitor = Monitor::new(config, capture);

        assert!(monitor.run_cycle().await);
        assert!(monitor.history("machine_0").is_some());
        assert!(monitor.history("machine_1").is_some());
        assert_eq!(monitor.history("machine_0").unwrap().entries.len(), 1);
    }

    #[tokio::test]
    async fn test_cycle_persists_ledger_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), Vec::new());
        let capture = StubCapture {
            frame: Some(dark_frame()),
        };
        let mut monitor = Monitor::new(config, capture);

        monitor.run_cycle().await;

        let ledger_path = dir.path().join("machine_history.json");
        assert!(ledger_path.exists());
        let raw = std::fs::read_to_string(&ledger_path).unwrap();
        let map: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert!(map.get("machine_0").is_some());
    }

    #[tokio::test]
    async fn test_capture_failure_aborts_cycle_without_ledger_write() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), Vec::new());
        let capture = StubCapture { frame: None };
        let mut monitor = Monitor::new(config, capture);

        assert!(!monitor.run_cycle().await);
        assert!(monitor.history("machine_0").is_none());
        assert!(!dir.path().join("machine_history.json").exists());
    }

    #[tokio::test]
    async fn test_cycle_writes_artifacts_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path(), vec![RegionSpec::default()]);
        config.output.save_detections = true;
        config.output.save_screenshots = true;
        let capture = StubCapture {
            frame: Some(dark_frame()),
        };
        let mut monitor = Monitor::new(config, capture);

        monitor.run_cycle().await;

        let detections = std::fs::read_dir(dir.path().join("detections")).unwrap().count();
        let screenshots = std::fs::read_dir(dir.path().join("screenshots")).unwrap().count();
        assert_eq!(detections, 1);
        assert_eq!(screenshots, 1);
    }

    #[tokio::test]
    async fn test_histories_reload_across_monitor_instances() {
        let dir = tempfile::tempdir().unwrap();

        {
            let config = test_config(dir.path(), Vec::new());
            let capture = StubCapture {
                frame: Some(dark_frame()),
            };
            let mut monitor = Monitor::new(config, capture);
            monitor.run_cycle().await;
        }

        let config = test_config(dir.path(), Vec::new());
        let capture = StubCapture {
            frame: Some(dark_frame()),
        };
        let monitor = Monitor::new(config, capture);
        assert_eq!(monitor.history("machine_0").unwrap().entries.len(), 1);
    }
}
