//! Color strategy: red "working" cue over the top third, orange
//! "machine on" cue over the middle third.

use image::RgbImage;

use crate::config::ColorThresholds;
use crate::detection::{ColorDiagnostics, Diagnostics};

use super::{composite_decision, gray_stats, CompositeDecision, Cue, PixelRect};

/// Convert one RGB pixel to HSV on the OpenCV scale: hue in 0..180,
/// saturation and value in 0..255. The configured hue bands were tuned
/// against that scale.
pub(crate) fn rgb_to_hsv(px: [u8; 3]) -> (u8, u8, u8) {
    let r = px[0] as f64 / 255.0;
    let g = px[1] as f64 / 255.0;
    let b = px[2] as f64 / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let hue_deg = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * (((g - b) / delta).rem_euclid(6.0))
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };

    let saturation = if max == 0.0 { 0.0 } else { delta / max };

    let h = (hue_deg / 2.0).round().min(179.0) as u8;
    let s = (saturation * 255.0).round() as u8;
    let v = (max * 255.0).round() as u8;
    (h, s, v)
}

struct MaskCounts {
    red_in_top: u64,
    top_total: u64,
    orange_in_mid: u64,
    mid_total: u64,
    hue_sum: f64,
    sat_sum: f64,
    val_sum: f64,
    total: u64,
}

fn mask_counts(frame: &RgbImage, rect: &PixelRect, th: &ColorThresholds) -> MaskCounts {
    let third = (rect.height() / 3).max(1);
    let top_end = (rect.y1 + third).min(rect.y2);
    let mid_end = (rect.y1 + 2 * third).min(rect.y2);

    let mut counts = MaskCounts {
        red_in_top: 0,
        top_total: 0,
        orange_in_mid: 0,
        mid_total: 0,
        hue_sum: 0.0,
        sat_sum: 0.0,
        val_sum: 0.0,
        total: 0,
    };

    for y in rect.y1..rect.y2 {
        for x in rect.x1..rect.x2 {
            let (h, s, v) = rgb_to_hsv(frame.get_pixel(x, y).0);
            counts.hue_sum += h as f64;
            counts.sat_sum += s as f64;
            counts.val_sum += v as f64;
            counts.total += 1;

            let colored = s >= th.min_saturation && v >= th.min_value;
            if y < top_end {
                counts.top_total += 1;
                let red = h <= th.red_hue_low_max || h >= th.red_hue_high_min;
                if red && colored {
                    counts.red_in_top += 1;
                }
            } else if y < mid_end {
                counts.mid_total += 1;
                let orange = h >= th.orange_hue_min && h <= th.orange_hue_max;
                if orange && colored {
                    counts.orange_in_mid += 1;
                }
            }
        }
    }

    counts
}

/// Evaluate the color strategy over a region.
pub(crate) fn evaluate(
    frame: &RgbImage,
    rect: &PixelRect,
    th: &ColorThresholds,
) -> (CompositeDecision, Diagnostics) {
    let counts = mask_counts(frame, rect, th);
    let (mean_brightness, std_brightness) = gray_stats(frame, rect);

    let ratio = |hits: u64, total: u64| {
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    };
    let red_ratio = ratio(counts.red_in_top, counts.top_total);
    let orange_ratio = ratio(counts.orange_in_mid, counts.mid_total);

    let decision = composite_decision(
        Cue {
            ratio: red_ratio,
            threshold: th.red_activation_ratio,
        },
        Cue {
            ratio: orange_ratio,
            threshold: th.orange_activation_ratio,
        },
        mean_brightness,
    );

    let total = counts.total.max(1) as f64;
    let extras = Diagnostics::Color(ColorDiagnostics {
        mean_brightness,
        std_brightness,
        brightness_factor: super::brightness_factor(mean_brightness),
        mean_hue: counts.hue_sum / total,
        mean_saturation: counts.sat_sum / total,
        mean_value: counts.val_sum / total,
        red_ratio,
        orange_ratio,
        decision_path: decision.decision_path.clone(),
    });

    (decision, extras)
}
