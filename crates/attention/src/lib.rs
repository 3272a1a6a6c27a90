//! Learner attention estimation
//!
//! Per-frame analysis of a webcam feed:
//! - Face landmark detection
//! - Eye openness classification (blink ratio)
//! - Head pose and gaze direction
//! - Debounced attentive / distracted status
//! - Expression classification

pub mod analysis;
pub mod blink;
pub mod clock;
pub mod config;
pub mod detector;
pub mod emotion;
pub mod gaze;
pub mod geometry;
pub mod state;
pub mod synthetic;

pub use analysis::FrameAnalysis;
pub use blink::{BlinkClassifier, EyeLevel, EyePair};
pub use clock::{AttentionClock, ClockTotals};
pub use config::AttentionConfig;
pub use detector::{EmotionClassifier, LandmarkDetector, OnnxEmotionClassifier, OnnxLandmarkDetector};
pub use emotion::{Emotion, EmotionCounts, EmotionTally};
pub use gaze::{CameraIntrinsics, GazeDirection, GazeEstimator, GazeReading};
pub use geometry::{FaceBbox, FaceLandmarks, Landmarks, Point};
pub use state::{AttentionState, AttentionStatus, Streaks};

use camera_capture::frame::VideoFrame;
use thiserror::Error;
use tracing::{debug, warn};

/// Attention pipeline error types
#[derive(Error, Debug)]
pub enum AttentionError {
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Pose estimation failed: {0}")]
    PoseSolve(String),

    #[error("unknown emotion label: {0}")]
    UnknownEmotion(String),

    #[error("Expected {expected} landmarks, got {actual}")]
    LandmarkCount { expected: usize, actual: usize },

    #[error("Image processing failed: {0}")]
    ImageProcessing(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Attention monitoring pipeline
pub struct AttentionMonitor {
    config: AttentionConfig,
    landmarks: Box<dyn LandmarkDetector>,
    emotions: Box<dyn EmotionClassifier>,
    blink: BlinkClassifier,
    gaze: GazeEstimator,
    state: AttentionState,
}

impl AttentionMonitor {
    /// Create a monitor backed by the configured ONNX models
    pub fn new(config: AttentionConfig) -> Result<Self, AttentionError> {
        let landmarks = Box::new(OnnxLandmarkDetector::new(&config)?);
        let emotions = Box::new(OnnxEmotionClassifier::new(&config)?);
        Self::with_detectors(config, landmarks, emotions)
    }

    /// Create a monitor with caller-supplied detectors
    pub fn with_detectors(
        config: AttentionConfig,
        landmarks: Box<dyn LandmarkDetector>,
        emotions: Box<dyn EmotionClassifier>,
    ) -> Result<Self, AttentionError> {
        config.validate()?;
        Ok(Self {
            blink: BlinkClassifier::from_config(&config),
            gaze: GazeEstimator::new(&config),
            state: AttentionState::new(config.debounce_frames),
            landmarks,
            emotions,
            config,
        })
    }

    pub fn config(&self) -> &AttentionConfig {
        &self.config
    }

    pub fn status(&self) -> AttentionStatus {
        self.state.status()
    }

    pub fn streaks(&self) -> Streaks {
        self.state.streaks()
    }

    /// Analyze a single frame and advance the attention state
    pub fn analyze(&mut self, frame: &VideoFrame) -> Result<FrameAnalysis, AttentionError> {
        let faces = self.landmarks.detect(frame)?;

        let mut emotions = Vec::with_capacity(faces.len());
        for face in &faces {
            match self.emotions.classify(frame, &face.bbox) {
                Ok(emotion) => emotions.push(emotion),
                Err(e) => warn!("Emotion classification skipped for face: {}", e),
            }
        }

        let Some(face) = faces
            .into_iter()
            .max_by(|a, b| a.bbox.area().total_cmp(&b.bbox.area()))
        else {
            // no face: time goes to distracted, streaks and status are untouched
            return Ok(FrameAnalysis {
                face_detected: false,
                status: self.state.status(),
                bucket: AttentionStatus::Distracted,
                emotions,
                ..Default::default()
            });
        };

        let eyes = self.blink.classify_face(&face.landmarks);

        let camera = CameraIntrinsics::for_frame(frame.width, frame.height);
        let gaze = match self.gaze.estimate(&face.landmarks, &camera) {
            Ok(reading) => Some(reading),
            Err(e) => {
                warn!("Gaze unavailable for frame {}: {}", frame.sequence, e);
                None
            }
        };
        let direction = gaze.map(|g| g.direction).unwrap_or(GazeDirection::Unknown);

        let status = self.state.observe(&eyes, direction);
        debug!(
            "Frame {}: eyes {:?}/{:?}, gaze {:?}, status {:?}",
            frame.sequence, eyes.left, eyes.right, direction, status
        );

        Ok(FrameAnalysis {
            face_detected: true,
            face: Some(face),
            eyes: Some(eyes),
            gaze,
            status,
            bucket: status,
            emotions,
        })
    }

    /// Clear streaks and restore the initial status
    pub fn reset(&mut self) {
        self.state.reset();
    }
}
