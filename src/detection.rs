//! Detection value types shared by the classifier, ledger, and alerts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Classification label for a region.
///
/// The four `Machine*` variants are produced by the composite
/// dual-indicator decision; the single-cue variants come from the
/// legacy fallback path. `Region` marks a forced baseline emitted when
/// a region fails to classify but the configuration mandates a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionClass {
    MachineActive,
    MachineWorkingOnly,
    MachineOnOnly,
    MachineOff,
    RedLight,
    OrangeLight,
    BrightLight,
    Off,
    Region,
    Unknown,
}

impl DetectionClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionClass::MachineActive => "machine_active",
            DetectionClass::MachineWorkingOnly => "machine_working_only",
            DetectionClass::MachineOnOnly => "machine_on_only",
            DetectionClass::MachineOff => "machine_off",
            DetectionClass::RedLight => "red_light",
            DetectionClass::OrangeLight => "orange_light",
            DetectionClass::BrightLight => "bright_light",
            DetectionClass::Off => "off",
            DetectionClass::Region => "region",
            DetectionClass::Unknown => "unknown",
        }
    }
}

/// Indicator-level status attached to a detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaserStatus {
    Active,
    Inactive,
    Normal,
    Warning,
    Error,
}

impl LaserStatus {
    /// Collapse to the binary machine status tracked by the ledger.
    pub fn machine_status(&self) -> MachineStatus {
        match self {
            LaserStatus::Active => MachineStatus::Active,
            _ => MachineStatus::Inactive,
        }
    }
}

/// Binary machine status recorded in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineStatus {
    Active,
    Inactive,
}

/// Diagnostics from the color strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorDiagnostics {
    pub mean_brightness: f64,
    pub std_brightness: f64,
    pub brightness_factor: f64,
    pub mean_hue: f64,
    pub mean_saturation: f64,
    pub mean_value: f64,
    pub red_ratio: f64,
    pub orange_ratio: f64,
    pub decision_path: String,
}

/// Diagnostics from the brightness strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrightnessDiagnostics {
    pub mean_brightness: f64,
    pub std_brightness: f64,
    pub brightness_factor: f64,
    pub top_brightness: f64,
    pub mid_brightness: f64,
    pub bottom_brightness: f64,
    pub top_threshold: f64,
    pub mid_threshold: f64,
    pub top_bright_ratio: f64,
    pub mid_bright_ratio: f64,
    pub decision_path: String,
}

/// Diagnostics from the legacy single-cue path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyDiagnostics {
    pub mean_brightness: f64,
    pub std_brightness: f64,
    pub mean_hue: f64,
    pub mean_saturation: f64,
    pub mean_value: f64,
    pub decision_path: String,
}

/// Mode-specific numeric diagnostics carried on a detection.
///
/// Serialized untagged so the wire format stays a flat field map.
/// Variant order matters for deserialization: `Brightness` and `Color`
/// carry fields the others lack, and `Legacy` is a strict subset, so it
/// must come last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Diagnostics {
    Brightness(BrightnessDiagnostics),
    Color(ColorDiagnostics),
    Legacy(LegacyDiagnostics),
}

/// A single region classification, created once per region per cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionResult {
    pub timestamp: DateTime<Utc>,
    pub confidence: f64,
    /// Pixel coordinates `[x1, y1, x2, y2]` after clamping to the frame.
    pub bbox: [u32; 4],
    pub class_name: DetectionClass,
    pub laser_status: LaserStatus,
    pub zone_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extras: Option<Diagnostics>,
}
