//! Camera Capture Library for the Attention Monitor
//!
//! Provides the frame sources consumed by the attention pipeline.
//! Supports:
//! - Synthetic frames (blank cabin at a fixed rate, for demos and tests)
//! - Image directories replayed as a looping camera
//!
//! Device acquisition sits behind [`FrameSource`] and [`CameraProvider`],
//! so a hardware backend can be plugged in without touching the pipeline.

pub mod frame;
pub mod source;

pub use frame::{encode_jpeg, VideoFrame};
pub use source::{DirectoryCamera, SyntheticCamera};

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Camera error types
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Failed to open camera: {0}")]
    Open(String),

    #[error("Invalid format: {0}")]
    Format(String),

    #[error("Streaming error: {0}")]
    Stream(String),

    #[error("Capture timeout")]
    Timeout,

    #[error("Camera not initialized")]
    NotInitialized,

    #[error("JPEG encoding failed: {0}")]
    Encode(String),
}

/// A stream of frames owned by exactly one consumer.
///
/// Dropping the source releases the underlying device.
pub trait FrameSource: Send {
    /// Block until the next frame is available or `timeout` elapses.
    fn read_frame(&mut self, timeout: Duration) -> Result<VideoFrame, CameraError>;
}

/// Opens frame sources on demand.
pub trait CameraProvider: Send + Sync {
    fn open(&self) -> Result<Box<dyn FrameSource>, CameraError>;
}

/// Which backend a [`CameraConfig`] opens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Blank frames generated in-process
    #[default]
    Synthetic,
    /// Image files replayed from `device` (a directory)
    Directory,
}

/// Camera configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Backend to open
    pub source: SourceKind,
    /// Device path or image directory
    pub device: String,
    /// Capture width
    pub width: u32,
    /// Capture height
    pub height: u32,
    /// Target FPS
    pub fps: u32,
    /// Stop after this many frames (synthetic only)
    pub frame_limit: Option<u64>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::Synthetic,
            device: "frames".to_string(),
            width: 640,
            height: 480,
            fps: 15,
            frame_limit: None,
        }
    }
}

impl CameraConfig {
    /// Interval between two frames at the configured rate
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.fps.max(1)))
    }
}

impl CameraProvider for CameraConfig {
    fn open(&self) -> Result<Box<dyn FrameSource>, CameraError> {
        if self.width == 0 || self.height == 0 {
            return Err(CameraError::Format(format!(
                "{}x{} is not a valid resolution",
                self.width, self.height
            )));
        }

        match self.source {
            SourceKind::Synthetic => Ok(Box::new(SyntheticCamera::new(self))),
            SourceKind::Directory => Ok(Box::new(DirectoryCamera::open(self)?)),
        }
    }
}
