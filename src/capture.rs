//! Frame capture provider contract.
//!
//! The monitor depends only on this capability surface; camera drivers
//! live outside the crate. The shipped implementation reads still
//! frames dropped at a fixed path by an external capture tool.

use image::RgbImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Capture error types.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("capture source not open")]
    NotOpen,
    #[error("frame unavailable: {0}")]
    FrameUnavailable(String),
    #[error("image decode error: {0}")]
    Decode(#[from] image::ImageError),
}

/// Settings forwarded to the capture source. Providers apply what they
/// support and ignore the rest.
#[derive(Debug, Clone, Default)]
pub struct CaptureSettings {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Capability surface the orchestrator consumes.
pub trait CaptureProvider {
    fn open(&mut self) -> Result<(), CaptureError>;
    fn read(&mut self) -> Result<RgbImage, CaptureError>;
    fn configure(&mut self, settings: &CaptureSettings) -> Result<(), CaptureError>;
    fn close(&mut self);
}

/// Reads the newest frame from a fixed path written by an external
/// still-capture tool.
pub struct StillImageCapture {
    path: PathBuf,
    settings: CaptureSettings,
    open: bool,
}

impl StillImageCapture {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            settings: CaptureSettings::default(),
            open: false,
        }
    }
}

impl CaptureProvider for StillImageCapture {
    fn open(&mut self) -> Result<(), CaptureError> {
        self.open = true;
        tracing::info!("Capture source opened: {}", self.path.display());
        Ok(())
    }

    fn read(&mut self) -> Result<RgbImage, CaptureError> {
        if !self.open {
            return Err(CaptureError::NotOpen);
        }
        if !self.path.exists() {
            return Err(CaptureError::FrameUnavailable(format!(
                "no frame at {}",
                self.path.display()
            )));
        }
        let frame = image::open(&self.path)?.to_rgb8();
        if let (Some(w), Some(h)) = (self.settings.width, self.settings.height) {
            if frame.width() != w || frame.height() != h {
                tracing::debug!(
                    "Frame is {}x{}, configured {}x{}",
                    frame.width(),
                    frame.height(),
                    w,
                    h
                );
            }
        }
        Ok(frame)
    }

    fn configure(&mut self, settings: &CaptureSettings) -> Result<(), CaptureError> {
        self.settings = settings.clone();
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
        tracing::info!("Capture source closed");
    }
}
