//! Per-cycle detection artifacts: JSON records, annotated frames, and
//! retention cleanup.
//!
//! Annotated frames carry box overlays and a status banner; the textual
//! labels for each region live in the JSON record saved alongside.

use chrono::{DateTime, Utc};
use image::{Rgb, RgbImage};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::OutputConfig;
use crate::detection::{DetectionResult, LaserStatus};

/// Artifact error types.
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

const ACTIVE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const INACTIVE_COLOR: Rgb<u8> = Rgb([255, 165, 0]);
const NEUTRAL_COLOR: Rgb<u8> = Rgb([128, 128, 128]);
const BANNER_HEIGHT: u32 = 8;

/// Writes and prunes per-cycle artifacts under the output directory.
pub struct ArtifactWriter {
    detections_dir: PathBuf,
    screenshots_dir: PathBuf,
    output: OutputConfig,
}

impl ArtifactWriter {
    pub fn new(output: &OutputConfig) -> Self {
        let base = PathBuf::from(&output.output_dir);
        let writer = Self {
            detections_dir: base.join("detections"),
            screenshots_dir: base.join("screenshots"),
            output: output.clone(),
        };
        for dir in [&writer.detections_dir, &writer.screenshots_dir] {
            if let Err(e) = fs::create_dir_all(dir) {
                tracing::error!("Cannot create artifact directory {}: {}", dir.display(), e);
            }
        }
        writer
    }

    /// Save the cycle's detections plus a configuration summary.
    pub fn save_detections(
        &self,
        detections: &[DetectionResult],
        config_summary: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<PathBuf, ArtifactError> {
        let path = self
            .detections_dir
            .join(format!("detections_{}.json", now.format("%Y%m%d_%H%M%S")));

        let record = serde_json::json!({
            "timestamp": now,
            "detection_count": detections.len(),
            "detections": detections,
            "config": config_summary,
        });
        fs::write(&path, serde_json::to_string_pretty(&record)?)?;
        tracing::info!("Detection results saved: {}", path.display());
        Ok(path)
    }

    /// Save the frame with per-region overlays and a status banner.
    pub fn save_annotated(
        &self,
        frame: &RgbImage,
        detections: &[DetectionResult],
        now: DateTime<Utc>,
    ) -> Result<PathBuf, ArtifactError> {
        let path = self
            .screenshots_dir
            .join(format!("detection_{}.jpg", now.format("%Y%m%d_%H%M%S")));
        let annotated = annotate(frame, detections);
        annotated.save(&path)?;
        tracing::info!("Annotated frame saved: {}", path.display());
        Ok(path)
    }

    /// Prune artifacts beyond the configured retention counts.
    pub fn cleanup(&self) {
        if !self.output.enable_auto_cleanup {
            return;
        }
        prune_dir(
            &self.screenshots_dir,
            "detection_",
            self.output.max_detection_images,
        );
        prune_dir(
            &self.detections_dir,
            "detections_",
            self.output.max_detection_logs,
        );
    }
}

fn status_color(status: LaserStatus) -> Rgb<u8> {
    match status {
        LaserStatus::Active => ACTIVE_COLOR,
        LaserStatus::Inactive => INACTIVE_COLOR,
        _ => NEUTRAL_COLOR,
    }
}

fn annotate(frame: &RgbImage, detections: &[DetectionResult]) -> RgbImage {
    let mut annotated = frame.clone();

    for detection in detections {
        let color = status_color(detection.laser_status);
        draw_rect_outline(&mut annotated, detection.bbox, color, 2);
        draw_confidence_bar(&mut annotated, detection.bbox, detection.confidence, color);
    }

    // Global status banner along the bottom edge.
    let active_count = detections
        .iter()
        .filter(|d| d.laser_status == LaserStatus::Active)
        .count();
    let banner_color = if active_count > 0 {
        ACTIVE_COLOR
    } else if !detections.is_empty() {
        INACTIVE_COLOR
    } else {
        NEUTRAL_COLOR
    };
    let height = annotated.height();
    let banner_top = height.saturating_sub(BANNER_HEIGHT);
    for y in banner_top..height {
        for x in 0..annotated.width() {
            annotated.put_pixel(x, y, banner_color);
        }
    }

    annotated
}

/// Filled bar just above the box whose width tracks the confidence.
fn draw_confidence_bar(img: &mut RgbImage, bbox: [u32; 4], confidence: f64, color: Rgb<u8>) {
    let [x1, y1, x2, _] = bbox;
    let x2 = x2.min(img.width());
    if x2 <= x1 || y1 < 4 {
        return;
    }
    let width = ((x2 - x1) as f64 * confidence.clamp(0.0, 1.0)) as u32;
    for y in y1 - 4..y1 - 1 {
        for x in x1..x1 + width {
            img.put_pixel(x, y, color);
        }
    }
}

fn draw_rect_outline(img: &mut RgbImage, bbox: [u32; 4], color: Rgb<u8>, thickness: u32) {
    let [x1, y1, x2, y2] = bbox;
    let x2 = x2.min(img.width());
    let y2 = y2.min(img.height());
    if x2 <= x1 || y2 <= y1 {
        return;
    }

    for t in 0..thickness {
        // Horizontal edges.
        for x in x1..x2 {
            if y1 + t < y2 {
                img.put_pixel(x, y1 + t, color);
            }
            if y2 >= t + 1 && y2 - t - 1 >= y1 {
                img.put_pixel(x, y2 - t - 1, color);
            }
        }
        // Vertical edges.
        for y in y1..y2 {
            if x1 + t < x2 {
                img.put_pixel(x1 + t, y, color);
            }
            if x2 >= t + 1 && x2 - t - 1 >= x1 {
                img.put_pixel(x2 - t - 1, y, color);
            }
        }
    }
}

/// Keep only the `keep` most recently modified files with the given
/// prefix in `dir`.
fn prune_dir(dir: &Path, prefix: &str, keep: usize) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };

    let mut files: Vec<(PathBuf, std::time::SystemTime)> = entries
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_name()
                .to_str()
                .map(|name| name.starts_with(prefix))
                .unwrap_or(false)
        })
        .filter_map(|e| {
            let modified = e.metadata().ok()?.modified().ok()?;
            Some((e.path(), modified))
        })
        .collect();

    if files.len() <= keep {
        return;
    }

    files.sort_by(|a, b| b.1.cmp(&a.1));
    let stale = files.split_off(keep);
    tracing::info!(
        "Cleaning up {} old artifacts in {} (keeping {} most recent)",
        stale.len(),
        dir.display(),
        keep
    );
    for (path, _) in stale {
        if let Err(e) = fs::remove_file(&path) {
            tracing::warn!("Failed to delete {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::DetectionClass;
    use chrono::TimeZone;

    fn writer(dir: &Path) -> ArtifactWriter {
        ArtifactWriter::new(&OutputConfig {
            output_dir: dir.to_str().unwrap().to_string(),
            max_detection_images: 2,
            max_detection_logs: 2,
            ..OutputConfig::default()
        })
    }

    fn detection(status: LaserStatus, bbox: [u32; 4]) -> DetectionResult {
        DetectionResult {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            confidence: 0.9,
            bbox,
            class_name: DetectionClass::MachineActive,
            laser_status: status,
            zone_name: "region_0".to_string(),
            extras: None,
        }
    }

    #[test]
    fn test_save_detections_record_shape() {
        let dir = tempfile::tempdir().unwrap();
        let writer = writer(dir.path());
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();

        let path = writer
            .save_detections(
                &[detection(LaserStatus::Active, [1, 1, 5, 5])],
                serde_json::json!({"detection_mode": "bbox"}),
                now,
            )
            .unwrap();
        assert!(path.ends_with("detections_20240301_120000.json"));

        let record: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(record["detection_count"], 1);
        assert_eq!(record["detections"][0]["class_name"], "machine_active");
        assert_eq!(record["detections"][0]["laser_status"], "active");
        assert_eq!(record["config"]["detection_mode"], "bbox");
    }

    #[test]
    fn test_annotate_draws_box_and_banner() {
        let frame = RgbImage::from_pixel(40, 40, Rgb([0, 0, 0]));
        let annotated = annotate(&frame, &[detection(LaserStatus::Active, [5, 5, 20, 20])]);

        assert_eq!(annotated.get_pixel(5, 5).0, [0, 255, 0]);
        assert_eq!(annotated.get_pixel(19, 19).0, [0, 255, 0]);
        // Interior untouched.
        assert_eq!(annotated.get_pixel(10, 10).0, [0, 0, 0]);
        // Banner along the bottom edge is green: one region active.
        assert_eq!(annotated.get_pixel(0, 39).0, [0, 255, 0]);
    }

    #[test]
    fn test_annotate_banner_without_detections_is_gray() {
        let frame = RgbImage::from_pixel(20, 20, Rgb([0, 0, 0]));
        let annotated = annotate(&frame, &[]);
        assert_eq!(annotated.get_pixel(0, 19).0, [128, 128, 128]);
    }

    #[test]
    fn test_cleanup_prunes_oldest_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let writer = writer(dir.path());
        let detections_dir = dir.path().join("detections");

        for i in 0..4 {
            let name = format!("detections_2024030{}_120000.json", i + 1);
            fs::write(detections_dir.join(name), "{}").unwrap();
        }
        writer.cleanup();

        let remaining = fs::read_dir(&detections_dir).unwrap().count();
        assert_eq!(remaining, 2);
    }

    #[test]
    fn test_cleanup_respects_disable_flag() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(&OutputConfig {
            output_dir: dir.path().to_str().unwrap().to_string(),
            max_detection_logs: 1,
            enable_auto_cleanup: false,
            ..OutputConfig::default()
        });
        let detections_dir = dir.path().join("detections");
        for i in 0..3 {
            fs::write(
                detections_dir.join(format!("detections_{}.json", i)),
                "{}",
            )
            .unwrap();
        }
        writer.cleanup();
        assert_eq!(fs::read_dir(&detections_dir).unwrap().count(), 3);
    }
}
