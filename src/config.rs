//! Monitor configuration.
//!
//! Loaded from a JSON file with credentials taken from environment
//! variables. Missing or unreadable files fall back to built-in
//! defaults so the monitor can always start.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

/// Top-level monitor configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Indicator regions watched each cycle, in machine-id order.
    pub regions: Vec<RegionSpec>,
    pub detection: DetectionPolicy,
    pub capture: CaptureConfig,
    pub monitoring: MonitoringConfig,
    pub alerts: AlertsConfig,
    pub output: OutputConfig,
}

/// One watched indicator-light region. Read-only after load.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionSpec {
    /// Normalized bounding box `[x1, y1, x2, y2]` in `[0, 1]`.
    pub bbox: [f64; 4],
    pub mode: RegionMode,
    pub color: ColorThresholds,
    pub brightness: BrightnessThresholds,
}

impl Default for RegionSpec {
    fn default() -> Self {
        Self {
            bbox: [0.0, 0.0, 1.0, 1.0],
            mode: RegionMode::default(),
            color: ColorThresholds::default(),
            brightness: BrightnessThresholds::default(),
        }
    }
}

/// Classification strategy for a region.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionMode {
    Color,
    #[default]
    Brightness,
    Legacy,
}

/// Hue/saturation thresholds for the color strategy.
///
/// Hue bounds are on the OpenCV-style 0..180 scale; red wraps around
/// both ends of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorThresholds {
    /// Minimum fraction of top-third pixels matching red to activate.
    pub red_activation_ratio: f64,
    /// Minimum fraction of middle-third pixels matching orange to activate.
    pub orange_activation_ratio: f64,
    pub red_hue_low_max: u8,
    pub red_hue_high_min: u8,
    pub orange_hue_min: u8,
    pub orange_hue_max: u8,
    pub min_saturation: u8,
    pub min_value: u8,
}

impl Default for ColorThresholds {
    fn default() -> Self {
        Self {
            red_activation_ratio: 0.5,
            orange_activation_ratio: 0.53,
            red_hue_low_max: 10,
            red_hue_high_min: 170,
            orange_hue_min: 8,
            orange_hue_max: 30,
            min_saturation: 90,
            min_value: 90,
        }
    }
}

/// Brightness-ratio thresholds for the brightness strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrightnessThresholds {
    /// Top-third threshold as a multiple of the bottom-third mean.
    pub top_threshold_ratio: f64,
    /// Middle-third threshold as a multiple of the bottom-third mean.
    pub mid_threshold_ratio: f64,
    /// Fraction of a third's pixels that must exceed its threshold.
    pub active_ratio: f64,
}

impl Default for BrightnessThresholds {
    fn default() -> Self {
        Self {
            top_threshold_ratio: 1.7,
            mid_threshold_ratio: 2.2,
            active_ratio: 0.3,
        }
    }
}

/// Classifier-wide policy knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionPolicy {
    /// Substitute a neutral baseline when a region fails to classify.
    pub force_detection: bool,
    /// Echoed into detection artifacts; the region path itself always
    /// emits a result.
    pub confidence_threshold: f64,
}

impl Default for DetectionPolicy {
    fn default() -> Self {
        Self {
            force_detection: true,
            confidence_threshold: 0.2,
        }
    }
}

/// Where the capture provider finds frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Path where the external still-capture tool drops the newest frame.
    pub frame_path: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            frame_path: "frames/latest.jpg".to_string(),
            width: None,
            height: None,
        }
    }
}

/// Continuous-monitoring settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub interval_seconds: u64,
    pub inactive_alert_threshold_minutes: i64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 120,
            inactive_alert_threshold_minutes: 15,
        }
    }
}

/// Alert channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    /// Machines eligible for alerts.
    pub alert_machines: Vec<String>,
    pub email: EmailConfig,
    pub sms: SmsConfig,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            alert_machines: vec!["machine_0".to_string()],
            email: EmailConfig::default(),
            sms: SmsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub enabled: bool,
    pub smtp_server: String,
    pub smtp_port: u16,
    /// Overridden by `LASERWATCH_EMAIL_USER`.
    pub username: String,
    /// Overridden by `LASERWATCH_EMAIL_PASS`.
    pub password: String,
    pub from: String,
    pub subject: String,
    /// Overridden by `LASERWATCH_EMAIL_RECIPIENTS`.
    pub recipients: Vec<String>,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            smtp_server: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            username: String::new(),
            password: String::new(),
            from: "laserwatch@localhost".to_string(),
            subject: "Laser Monitor Alert - Machine Inactive".to_string(),
            recipients: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmsConfig {
    pub enabled: bool,
    /// Twilio-style gateway base URL.
    pub api_base: String,
    /// Overridden by `TWILIO_ACCOUNT_SID`.
    pub account_sid: String,
    /// Overridden by `TWILIO_AUTH_TOKEN`.
    pub auth_token: String,
    /// Overridden by `TWILIO_FROM_NUMBER`.
    pub from_number: String,
    /// E.164 numbers; overridden by `LASERWATCH_SMS_RECIPIENTS`.
    pub recipients: Vec<String>,
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_base: "https://api.twilio.com".to_string(),
            account_sid: String::new(),
            auth_token: String::new(),
            from_number: String::new(),
            recipients: Vec::new(),
        }
    }
}

/// Artifact output and retention settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub output_dir: String,
    pub save_detections: bool,
    pub save_screenshots: bool,
    pub max_detection_images: usize,
    pub max_detection_logs: usize,
    pub enable_auto_cleanup: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: "output".to_string(),
            save_detections: true,
            save_screenshots: true,
            max_detection_images: 20,
            max_detection_logs: 20,
            enable_auto_cleanup: true,
        }
    }
}

impl MonitorConfig {
    /// Load configuration from a JSON file, falling back to defaults if
    /// the file is missing or unreadable, then apply environment
    /// overrides for credentials and recipient lists.
    pub fn load(path: &Path) -> Self {
        let mut cfg = match fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(cfg) => {
                    tracing::info!("Configuration loaded from {}", path.display());
                    cfg
                }
                Err(e) => {
                    tracing::error!(
                        "Failed to parse config {}: {}, using built-in defaults",
                        path.display(),
                        e
                    );
                    Self::default()
                }
            },
            Err(_) => {
                tracing::warn!(
                    "Config file not found: {}, using built-in defaults",
                    path.display()
                );
                Self::default()
            }
        };
        cfg.apply_env();
        cfg
    }

    fn apply_env(&mut self) {
        if let Ok(user) = env::var("LASERWATCH_EMAIL_USER") {
            self.alerts.email.username = user;
        }
        if let Ok(pass) = env::var("LASERWATCH_EMAIL_PASS") {
            self.alerts.email.password = pass;
        }
        if let Ok(raw) = env::var("LASERWATCH_EMAIL_RECIPIENTS") {
            let recipients = parse_recipient_list(&raw);
            if !recipients.is_empty() {
                self.alerts.email.recipients = recipients;
            }
        }
        if let Ok(sid) = env::var("TWILIO_ACCOUNT_SID") {
            self.alerts.sms.account_sid = sid;
        }
        if let Ok(token) = env::var("TWILIO_AUTH_TOKEN") {
            self.alerts.sms.auth_token = token;
        }
        if let Ok(from) = env::var("TWILIO_FROM_NUMBER") {
            self.alerts.sms.from_number = from;
        }
        if let Ok(raw) = env::var("LASERWATCH_SMS_RECIPIENTS") {
            let recipients = parse_recipient_list(&raw);
            if !recipients.is_empty() {
                self.alerts.sms.recipients = recipients;
            }
        }
    }
}

/// Split a recipient list on commas, semicolons, or whitespace.
pub fn parse_recipient_list(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
