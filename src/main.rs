//! LaserWatch - Machine Indicator Monitoring
//!
//! Watches a fixed camera view of laser machine indicator lights,
//! tracks per-machine status history, and alerts when machines sit
//! inactive too long.

use laserwatch::capture::StillImageCapture;
use laserwatch::config::{MonitorConfig, RegionSpec};
use laserwatch::monitor::Monitor;

use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("laserwatch=info".parse()?))
        .init();

    // Load configuration
    let config_path =
        std::env::var("LASERWATCH_CONFIG").unwrap_or_else(|_| "laserwatch.json".to_string());
    let mut cfg = MonitorConfig::load(Path::new(&config_path));

    // Watch the whole frame if no regions are configured
    if cfg.regions.is_empty() {
        tracing::info!("No regions configured, adding full-frame region");
        cfg.regions.push(RegionSpec::default());
    }

    tracing::info!(
        "Starting LaserWatch with {} regions (interval: {}s)...",
        cfg.regions.len(),
        cfg.monitoring.interval_seconds
    );

    let args: Vec<String> = std::env::args().collect();
    let once = args.iter().any(|a| a == "--once");
    let test_email = args.iter().any(|a| a == "--test-email");
    let test_email_recovery = args.iter().any(|a| a == "--test-email-recovery");
    let test_sms = args.iter().any(|a| a == "--test-sms");
    let test_sms_recovery = args.iter().any(|a| a == "--test-sms-recovery");

    let capture = StillImageCapture::new(&cfg.capture.frame_path);
    let mut monitor = Monitor::new(cfg, capture);

    if test_email || test_email_recovery || test_sms || test_sms_recovery {
        let mut ok = true;
        if test_email {
            ok &= monitor.test_email_alert(false).await;
        }
        if test_email_recovery {
            ok &= monitor.test_email_alert(true).await;
        }
        if test_sms {
            ok &= monitor.test_sms_alert(false).await;
        }
        if test_sms_recovery {
            ok &= monitor.test_sms_alert(true).await;
        }
        std::process::exit(if ok { 0 } else { 1 });
    }

    let success = monitor.run(!once).await;
    if !success {
        std::process::exit(1);
    }
    Ok(())
}
