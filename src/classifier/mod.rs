//! Region classifier turning cropped frame regions into machine-state
//! judgments.
//!
//! Two interchangeable composite strategies (color, brightness) share
//! the dual-cue decision and confidence scaling below; a legacy
//! single-cue path remains as a fallback.

mod brightness;
mod color;
mod legacy;

use chrono::{DateTime, Utc};
use image::RgbImage;
use thiserror::Error;

use crate::config::{DetectionPolicy, RegionMode, RegionSpec};
use crate::detection::{DetectionClass, DetectionResult, LaserStatus};

/// Classifier error types.
#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("region {0} clamps to zero area against the frame")]
    DegenerateRegion(String),
}

/// Pixel-space rectangle of a region after clamping to the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl PixelRect {
    pub fn width(&self) -> u32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> u32 {
        self.y2 - self.y1
    }

    pub fn as_array(&self) -> [u32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

/// Clamp a normalized bbox to the frame, in pixels.
fn clamp_bbox(frame: &RgbImage, bbox: [f64; 4]) -> [u32; 4] {
    let (w, h) = (frame.width() as f64, frame.height() as f64);
    let clamp = |v: f64, max: f64| v.max(0.0).min(max) as u32;
    [
        clamp(bbox[0] * w, w),
        clamp(bbox[1] * h, h),
        clamp(bbox[2] * w, w),
        clamp(bbox[3] * h, h),
    ]
}

/// Resolve a region's pixel rectangle, or `None` if it is degenerate.
fn region_rect(frame: &RgbImage, bbox: [f64; 4]) -> Option<PixelRect> {
    let [x1, y1, x2, y2] = clamp_bbox(frame, bbox);
    if x2 <= x1 || y2 <= y1 {
        return None;
    }
    Some(PixelRect { x1, y1, x2, y2 })
}

/// One activation cue: a measured ratio against its threshold.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Cue {
    pub ratio: f64,
    pub threshold: f64,
}

impl Cue {
    fn active(&self) -> bool {
        self.ratio >= self.threshold
    }

    /// Confidence contribution of an active cue: 0.5 at the threshold,
    /// saturating at 1.0 when the ratio reaches three times it.
    fn active_confidence(&self) -> f64 {
        let excess = (self.ratio - self.threshold).max(0.0);
        0.5 + (excess / (2.0 * self.threshold)).min(0.5)
    }

    /// Confidence contribution of an inactive cue, floored at 0.1.
    fn off_confidence(&self) -> f64 {
        let deficit = (self.threshold - self.ratio).max(0.0);
        (0.5 - deficit / self.threshold).max(0.1)
    }
}

/// Brightness multiplier for confidences: brighter regions make "on"
/// judgments more credible. Scales 0..200+ mean brightness into
/// 0.7..1.3.
pub(crate) fn brightness_factor(mean_brightness: f64) -> f64 {
    0.7 + 0.6 * (mean_brightness / 200.0).min(1.0)
}

/// Outcome of the composite dual-indicator decision.
#[derive(Debug, Clone)]
pub(crate) struct CompositeDecision {
    pub class: DetectionClass,
    pub status: LaserStatus,
    pub confidence: f64,
    pub decision_path: String,
}

/// The shared composite decision: a "working" cue from the top third
/// and a "machine on" cue from the middle third, conjoined.
pub(crate) fn composite_decision(working: Cue, on: Cue, mean_brightness: f64) -> CompositeDecision {
    let factor = brightness_factor(mean_brightness);

    let mut parts = Vec::new();
    if working.active() {
        parts.push(format!("working({:.3})", working.ratio));
    }
    if on.active() {
        parts.push(format!("machine_on({:.3})", on.ratio));
    }
    if parts.is_empty() {
        parts.push("machine_off".to_string());
    }
    let decision_path = parts.join("+");

    let (class, status, confidence) = match (working.active(), on.active()) {
        (true, true) => {
            let base = (working.active_confidence() + on.active_confidence()) / 2.0;
            (
                DetectionClass::MachineActive,
                LaserStatus::Active,
                (base * factor).min(1.0),
            )
        }
        (true, false) => (
            DetectionClass::MachineWorkingOnly,
            LaserStatus::Inactive,
            (working.active_confidence() * factor).min(1.0),
        ),
        (false, true) => (
            DetectionClass::MachineOnOnly,
            LaserStatus::Inactive,
            (on.active_confidence() * factor).min(1.0),
        ),
        (false, false) => {
            let base = working.off_confidence().min(on.off_confidence());
            // Darker regions make the off judgment more credible.
            let confidence = (base * (2.0 - factor)).clamp(0.1, 1.0);
            (DetectionClass::MachineOff, LaserStatus::Inactive, confidence)
        }
    };

    CompositeDecision {
        class,
        status,
        confidence,
        decision_path,
    }
}

/// Mean and standard deviation of the BT.601 gray levels in a rect.
pub(crate) fn gray_stats(frame: &RgbImage, rect: &PixelRect) -> (f64, f64) {
    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    let count = (rect.width() as f64) * (rect.height() as f64);
    for y in rect.y1..rect.y2 {
        for x in rect.x1..rect.x2 {
            let g = luma(frame.get_pixel(x, y).0);
            sum += g;
            sum_sq += g * g;
        }
    }
    let mean = sum / count;
    let variance = (sum_sq / count - mean * mean).max(0.0);
    (mean, variance.sqrt())
}

/// BT.601 luma, matching the grayscale the thresholds were tuned on.
pub(crate) fn luma(px: [u8; 3]) -> f64 {
    0.299 * px[0] as f64 + 0.587 * px[1] as f64 + 0.114 * px[2] as f64
}

/// Classify one region of the frame.
pub fn classify_region(
    frame: &RgbImage,
    region: &RegionSpec,
    zone_name: &str,
    timestamp: DateTime<Utc>,
) -> Result<DetectionResult, ClassifierError> {
    let rect = region_rect(frame, region.bbox)
        .ok_or_else(|| ClassifierError::DegenerateRegion(zone_name.to_string()))?;

    let (decision, extras) = match region.mode {
        RegionMode::Color => color::evaluate(frame, &rect, &region.color),
        RegionMode::Brightness => brightness::evaluate(frame, &rect, &region.brightness),
        RegionMode::Legacy => legacy::evaluate(frame, &rect),
    };

    tracing::debug!(
        "Classifier: {} -> decision={}, class={}, confidence={:.3}",
        zone_name,
        decision.decision_path,
        decision.class.as_str(),
        decision.confidence
    );

    Ok(DetectionResult {
        timestamp,
        confidence: decision.confidence,
        bbox: rect.as_array(),
        class_name: decision.class,
        laser_status: decision.status,
        zone_name: zone_name.to_string(),
        extras: Some(extras),
    })
}

/// Neutral baseline substituted when a region fails to classify but the
/// configuration mandates a result.
fn forced_baseline(frame: &RgbImage, region: &RegionSpec, zone_name: &str, timestamp: DateTime<Utc>) -> DetectionResult {
    DetectionResult {
        timestamp,
        confidence: 1.0,
        bbox: clamp_bbox(frame, region.bbox),
        class_name: DetectionClass::Region,
        laser_status: LaserStatus::Normal,
        zone_name: zone_name.to_string(),
        extras: None,
    }
}

/// Run the classifier over every configured region.
///
/// A degenerate region is skipped with a warning and contributes no
/// detection unless forced detection is enabled.
pub fn classify_frame(
    frame: &RgbImage,
    regions: &[RegionSpec],
    policy: &DetectionPolicy,
    timestamp: DateTime<Utc>,
) -> Vec<DetectionResult> {
    let mut detections = Vec::with_capacity(regions.len());
    for (i, region) in regions.iter().enumerate() {
        let zone_name = format!("region_{}", i);
        match classify_region(frame, region, &zone_name, timestamp) {
            Ok(detection) => detections.push(detection),
            Err(e) => {
                tracing::warn!("Classifier: skipping region: {}", e);
                if policy.force_detection {
                    tracing::debug!("Classifier: forced baseline emitted for {}", zone_name);
                    detections.push(forced_baseline(frame, region, &zone_name, timestamp));
                }
            }
        }
    }
    detections
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BrightnessThresholds, ColorThresholds};
    use image::Rgb;

    fn cue(ratio: f64, threshold: f64) -> Cue {
        Cue { ratio, threshold }
    }

    #[test]
    fn test_composite_decision_table() {
        let active = composite_decision(cue(0.6, 0.5), cue(0.6, 0.53), 100.0);
        assert_eq!(active.class, DetectionClass::MachineActive);
        assert_eq!(active.status, LaserStatus::Active);

        let working = composite_decision(cue(0.6, 0.5), cue(0.1, 0.53), 100.0);
        assert_eq!(working.class, DetectionClass::MachineWorkingOnly);
        assert_eq!(working.status, LaserStatus::Inactive);

        let on = composite_decision(cue(0.1, 0.5), cue(0.6, 0.53), 100.0);
        assert_eq!(on.class, DetectionClass::MachineOnOnly);
        assert_eq!(on.status, LaserStatus::Inactive);

        let off = composite_decision(cue(0.1, 0.5), cue(0.1, 0.53), 100.0);
        assert_eq!(off.class, DetectionClass::MachineOff);
        assert_eq!(off.status, LaserStatus::Inactive);
    }

    #[test]
    fn test_active_confidence_scenario() {
        // Ratios 0.6/0.6 against thresholds 0.5/0.53 at mean brightness
        // 200: base = (0.6 + 0.5 + 0.07/1.06) / 2, factor = 1.3.
        let decision = composite_decision(cue(0.6, 0.5), cue(0.6, 0.53), 200.0);
        assert_eq!(decision.class, DetectionClass::MachineActive);
        let top_conf: f64 = 0.6;
        let mid_conf: f64 = 0.5 + 0.07 / 1.06;
        let expected = ((top_conf + mid_conf) / 2.0 * 1.3_f64).min(1.0);
        assert!((decision.confidence - expected).abs() < 1e-9);
        assert!((decision.confidence - 0.758).abs() < 1e-3);
        assert_eq!(decision.decision_path, "working(0.600)+machine_on(0.600)");
    }

    #[test]
    fn test_confidence_stays_in_bounds() {
        for &(top, mid, mb) in &[
            (0.0, 0.0, 0.0),
            (0.0, 0.0, 255.0),
            (1.0, 1.0, 255.0),
            (0.5, 0.53, 0.0),
            (0.49, 0.52, 128.0),
        ] {
            let d = composite_decision(cue(top, 0.5), cue(mid, 0.53), mb);
            assert!(
                (0.1..=1.0).contains(&d.confidence),
                "confidence {} out of range for ({}, {}, {})",
                d.confidence,
                top,
                mid,
                mb
            );
        }
    }

    #[test]
    fn test_darker_region_raises_off_confidence() {
        let dark = composite_decision(cue(0.0, 0.5), cue(0.0, 0.53), 10.0);
        let bright = composite_decision(cue(0.0, 0.5), cue(0.0, 0.53), 250.0);
        assert_eq!(dark.class, DetectionClass::MachineOff);
        assert!(dark.confidence > bright.confidence);
    }

    #[test]
    fn test_brightness_factor_range() {
        assert!((brightness_factor(0.0) - 0.7).abs() < 1e-9);
        assert!((brightness_factor(200.0) - 1.3).abs() < 1e-9);
        assert!((brightness_factor(255.0) - 1.3).abs() < 1e-9);
    }

    fn solid_frame(w: u32, h: u32, rgb: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(w, h, Rgb(rgb))
    }

    #[test]
    fn test_degenerate_region_skipped() {
        let frame = solid_frame(100, 100, [0, 0, 0]);
        let region = RegionSpec {
            // Entirely beyond the right edge: clamps to zero width.
            bbox: [1.2, 0.1, 1.4, 0.3],
            ..RegionSpec::default()
        };
        let err = classify_region(&frame, &region, "region_0", Utc::now());
        assert!(err.is_err());

        let skipped = classify_frame(
            &frame,
            &[region.clone()],
            &DetectionPolicy {
                force_detection: false,
                confidence_threshold: 0.2,
            },
            Utc::now(),
        );
        assert!(skipped.is_empty());

        let forced = classify_frame(
            &frame,
            &[region],
            &DetectionPolicy {
                force_detection: true,
                confidence_threshold: 0.2,
            },
            Utc::now(),
        );
        assert_eq!(forced.len(), 1);
        assert_eq!(forced[0].class_name, DetectionClass::Region);
        assert_eq!(forced[0].laser_status, LaserStatus::Normal);
        assert!((forced[0].confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_classify_frame_emits_one_result_per_region() {
        let frame = solid_frame(90, 90, [30, 30, 30]);
        let regions = vec![
            RegionSpec {
                bbox: [0.0, 0.0, 0.5, 1.0],
                mode: RegionMode::Brightness,
                color: ColorThresholds::default(),
                brightness: BrightnessThresholds::default(),
            },
            RegionSpec {
                bbox: [0.5, 0.0, 1.0, 1.0],
                mode: RegionMode::Color,
                color: ColorThresholds::default(),
                brightness: BrightnessThresholds::default(),
            },
        ];
        let detections =
            classify_frame(&frame, &regions, &DetectionPolicy::default(), Utc::now());
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].zone_name, "region_0");
        assert_eq!(detections[1].zone_name, "region_1");
        for d in &detections {
            assert!((0.1..=1.0).contains(&d.confidence));
        }
    }

    #[test]
    fn test_gray_stats_uniform_image() {
        let frame = solid_frame(10, 10, [100, 100, 100]);
        let rect = PixelRect {
            x1: 0,
            y1: 0,
            x2: 10,
            y2: 10,
        };
        let (mean, std) = gray_stats(&frame, &rect);
        assert!((mean - 100.0).abs() < 1e-6);
        assert!(std.abs() < 1e-6);
    }
}
