//! Legacy single-cue fallback: whole-region hue and brightness
//! heuristics, kept for regions where the composite indicator layout
//! does not apply.

use image::RgbImage;

use crate::detection::{DetectionClass, Diagnostics, LaserStatus, LegacyDiagnostics};

use super::color::rgb_to_hsv;
use super::{gray_stats, CompositeDecision, PixelRect};

struct HsvMeans {
    hue: f64,
    saturation: f64,
    value: f64,
}

fn hsv_means(frame: &RgbImage, rect: &PixelRect) -> HsvMeans {
    let mut hue_sum = 0.0;
    let mut sat_sum = 0.0;
    let mut val_sum = 0.0;
    let count = ((rect.width() as u64) * (rect.height() as u64)).max(1) as f64;
    for y in rect.y1..rect.y2 {
        for x in rect.x1..rect.x2 {
            let (h, s, v) = rgb_to_hsv(frame.get_pixel(x, y).0);
            hue_sum += h as f64;
            sat_sum += s as f64;
            val_sum += v as f64;
        }
    }
    HsvMeans {
        hue: hue_sum / count,
        saturation: sat_sum / count,
        value: val_sum / count,
    }
}

/// Evaluate the legacy heuristics over a region.
pub(crate) fn evaluate(frame: &RgbImage, rect: &PixelRect) -> (CompositeDecision, Diagnostics) {
    let (mean_brightness, std_brightness) = gray_stats(frame, rect);
    let hsv = hsv_means(frame, rect);

    let (class, status, confidence, decision_path) =
        if (hsv.hue < 10.0 || hsv.hue > 170.0) && hsv.saturation > 100.0 {
            let confidence = (hsv.saturation / 255.0 + 0.3).min(0.9);
            let status = if confidence > 0.6 {
                LaserStatus::Warning
            } else {
                LaserStatus::Normal
            };
            (DetectionClass::RedLight, status, confidence, "red_light")
        } else if hsv.hue > 15.0 && hsv.hue < 35.0 && hsv.saturation > 100.0 {
            let confidence = (hsv.saturation / 255.0 + 0.3).min(0.9);
            (
                DetectionClass::OrangeLight,
                LaserStatus::Normal,
                confidence,
                "orange_light",
            )
        } else if mean_brightness > 200.0 {
            (
                DetectionClass::BrightLight,
                LaserStatus::Normal,
                (mean_brightness / 255.0).min(0.8),
                "bright_light",
            )
        } else if mean_brightness < 50.0 && std_brightness < 20.0 {
            (DetectionClass::Off, LaserStatus::Normal, 0.7, "off")
        } else {
            (DetectionClass::Unknown, LaserStatus::Normal, 0.0, "none")
        };

    let extras = Diagnostics::Legacy(LegacyDiagnostics {
        mean_brightness,
        std_brightness,
        mean_hue: hsv.hue,
        mean_saturation: hsv.saturation,
        mean_value: hsv.value,
        decision_path: decision_path.to_string(),
    });

    (
        CompositeDecision {
            class,
            status,
            confidence,
            decision_path: decision_path.to_string(),
        },
        extras,
    )
}
