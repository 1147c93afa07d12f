//! Brightness strategy: per-third bright-pixel ratios against
//! thresholds derived from the bottom third's mean gray level.

use image::RgbImage;

use crate::config::BrightnessThresholds;
use crate::detection::{BrightnessDiagnostics, Diagnostics};

use super::{composite_decision, gray_stats, luma, CompositeDecision, Cue, PixelRect};

struct Section {
    mean: f64,
    count: u64,
}

fn section_mean(frame: &RgbImage, rect: &PixelRect, y_start: u32, y_end: u32) -> Section {
    let mut sum = 0.0;
    let mut count = 0u64;
    for y in y_start..y_end {
        for x in rect.x1..rect.x2 {
            sum += luma(frame.get_pixel(x, y).0);
            count += 1;
        }
    }
    Section {
        mean: if count == 0 { 0.0 } else { sum / count as f64 },
        count,
    }
}

fn bright_ratio(frame: &RgbImage, rect: &PixelRect, y_start: u32, y_end: u32, threshold: f64) -> f64 {
    let mut bright = 0u64;
    let mut count = 0u64;
    for y in y_start..y_end {
        for x in rect.x1..rect.x2 {
            if luma(frame.get_pixel(x, y).0) > threshold {
                bright += 1;
            }
            count += 1;
        }
    }
    if count == 0 {
        0.0
    } else {
        bright as f64 / count as f64
    }
}

/// Evaluate the brightness strategy over a region.
pub(crate) fn evaluate(
    frame: &RgbImage,
    rect: &PixelRect,
    th: &BrightnessThresholds,
) -> (CompositeDecision, Diagnostics) {
    let (mean_brightness, std_brightness) = gray_stats(frame, rect);

    let third = (rect.height() / 3).max(1);
    let top_end = (rect.y1 + third).min(rect.y2);
    let mid_end = (rect.y1 + 2 * third).min(rect.y2);

    let top = section_mean(frame, rect, rect.y1, top_end);
    let mid = section_mean(frame, rect, top_end, mid_end);
    let bottom = section_mean(frame, rect, mid_end, rect.y2);

    // Very short regions can leave a section empty; fall back to the
    // region-wide mean so the thresholds stay meaningful.
    let top_brightness = if top.count == 0 { mean_brightness } else { top.mean };
    let mid_brightness = if mid.count == 0 { mean_brightness } else { mid.mean };
    let bottom_brightness = if bottom.count == 0 { mean_brightness } else { bottom.mean };

    let top_threshold = bottom_brightness * th.top_threshold_ratio;
    let mid_threshold = bottom_brightness * th.mid_threshold_ratio;

    let top_bright_ratio = bright_ratio(frame, rect, rect.y1, top_end, top_threshold);
    let mid_bright_ratio = bright_ratio(frame, rect, top_end, mid_end, mid_threshold);

    let decision = composite_decision(
        Cue {
            ratio: top_bright_ratio,
            threshold: th.active_ratio,
        },
        Cue {
            ratio: mid_bright_ratio,
            threshold: th.active_ratio,
        },
        mean_brightness,
    );

    let extras = Diagnostics::Brightness(BrightnessDiagnostics {
        mean_brightness,
        std_brightness,
        brightness_factor: super::brightness_factor(mean_brightness),
        top_brightness,
        mid_brightness,
        bottom_brightness,
        top_threshold,
        mid_threshold,
        top_bright_ratio,
        mid_bright_ratio,
        decision_path: decision.decision_path.clone(),
    });

    (decision, extras)
}
