//! Frame source implementations

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use image::RgbImage;
use tracing::{debug, info, warn};

use crate::{CameraConfig, CameraError, FrameSource, VideoFrame};

/// Paces reads to a fixed frame rate
#[derive(Debug)]
struct Pacer {
    opened_at: Instant,
    interval: Duration,
    next_due: Instant,
}

impl Pacer {
    fn new(interval: Duration) -> Self {
        let now = Instant::now();
        Self {
            opened_at: now,
            interval,
            next_due: now,
        }
    }

    /// Sleep until the next frame is due; `Timeout` if that is beyond `timeout`
    fn wait(&mut self, timeout: Duration) -> Result<u64, CameraError> {
        let now = Instant::now();
        let wait = self.next_due.saturating_duration_since(now);
        if wait > timeout {
            thread::sleep(timeout);
            return Err(CameraError::Timeout);
        }
        if !wait.is_zero() {
            thread::sleep(wait);
        }

        let captured = Instant::now();
        self.next_due = captured.max(self.next_due) + self.interval;
        Ok(captured.duration_since(self.opened_at).as_nanos() as u64)
    }
}

/// Generates uniformly lit frames at the configured rate
pub struct SyntheticCamera {
    width: u32,
    height: u32,
    pacer: Pacer,
    sequence: u32,
    frame_limit: Option<u64>,
    produced: u64,
}

impl SyntheticCamera {
    pub fn new(config: &CameraConfig) -> Self {
        info!(
            "Opening synthetic camera {}x{} @ {}fps",
            config.width, config.height, config.fps
        );
        Self {
            width: config.width,
            height: config.height,
            pacer: Pacer::new(config.frame_interval()),
            sequence: 0,
            frame_limit: config.frame_limit,
            produced: 0,
        }
    }
}

impl FrameSource for SyntheticCamera {
    fn read_frame(&mut self, timeout: Duration) -> Result<VideoFrame, CameraError> {
        if self.frame_limit.is_some_and(|limit| self.produced >= limit) {
            return Err(CameraError::Stream("synthetic stream exhausted".into()));
        }

        let timestamp_ns = self.pacer.wait(timeout)?;
        let mut frame = VideoFrame::filled(self.width, self.height, [96, 96, 96]);
        frame.timestamp_ns = timestamp_ns;
        frame.sequence = self.sequence;

        self.sequence = self.sequence.wrapping_add(1);
        self.produced += 1;
        Ok(frame)
    }
}

/// Replays the images of a directory in name order, looping forever
pub struct DirectoryCamera {
    files: Vec<PathBuf>,
    cursor: usize,
    pacer: Pacer,
    sequence: u32,
}

impl DirectoryCamera {
    pub fn open(config: &CameraConfig) -> Result<Self, CameraError> {
        let entries = std::fs::read_dir(&config.device)
            .map_err(|e| CameraError::Open(format!("{}: {}", config.device, e)))?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "jpg" | "jpeg" | "png"))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(CameraError::Open(format!(
                "{}: no jpg/png images found",
                config.device
            )));
        }

        info!("Opening image directory {} ({} frames)", config.device, files.len());
        Ok(Self {
            files,
            cursor: 0,
            pacer: Pacer::new(config.frame_interval()),
            sequence: 0,
        })
    }

    fn load(&self, path: &PathBuf) -> Result<RgbImage, CameraError> {
        image::open(path)
            .map(|img| img.to_rgb8())
            .map_err(|e| CameraError::Format(format!("{}: {}", path.display(), e)))
    }
}

impl FrameSource for DirectoryCamera {
    fn read_frame(&mut self, timeout: Duration) -> Result<VideoFrame, CameraError> {
        let timestamp_ns = self.pacer.wait(timeout)?;
        let path = self.files[self.cursor].clone();
        self.cursor = (self.cursor + 1) % self.files.len();

        let img = match self.load(&path) {
            Ok(img) => img,
            Err(e) => {
                warn!("Skipping unreadable frame: {}", e);
                return Err(e);
            }
        };

        debug!("Replaying {}", path.display());
        let frame = VideoFrame::from_rgb_image(img, timestamp_ns, self.sequence);
        self.sequence = self.sequence.wrapping_add(1);
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> CameraConfig {
        CameraConfig {
            width: 8,
            height: 6,
            fps: 1000,
            ..Default::default()
        }
    }

    #[test]
    fn test_synthetic_sequence_increments() {
        let mut camera = SyntheticCamera::new(&fast_config());
        let a = camera.read_frame(Duration::from_millis(100)).unwrap();
        let b = camera.read_frame(Duration::from_millis(100)).unwrap();
        assert_eq!(a.sequence, 0);
        assert_eq!(b.sequence, 1);
        assert!(b.timestamp_ns >= a.timestamp_ns);
        assert_eq!(a.data.len(), 8 * 6 * 3);
    }

    #[test]
    fn test_synthetic_frame_limit() {
        let config = CameraConfig {
            frame_limit: Some(2),
            ..fast_config()
        };
        let mut camera = SyntheticCamera::new(&config);
        assert!(camera.read_frame(Duration::from_millis(100)).is_ok());
        assert!(camera.read_frame(Duration::from_millis(100)).is_ok());
        assert!(matches!(
            camera.read_frame(Duration::from_millis(100)),
            Err(CameraError::Stream(_))
        ));
    }

    #[test]
    fn test_slow_source_times_out() {
        let config = CameraConfig {
            fps: 1,
            ..fast_config()
        };
        let mut camera = SyntheticCamera::new(&config);
        // first frame is due immediately
        assert!(camera.read_frame(Duration::from_millis(5)).is_ok());
        assert!(matches!(
            camera.read_frame(Duration::from_millis(5)),
            Err(CameraError::Timeout)
        ));
    }
}
