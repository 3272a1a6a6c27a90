//! Attention pipeline configuration

use serde::{Deserialize, Serialize};

/// Attention pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttentionConfig {
    /// Blink ratio above which an eye counts as fully open
    pub open_ratio_threshold: f64,

    /// Blink ratio at or below which an eye counts as closed
    pub closed_ratio_threshold: f64,

    /// Consecutive frames a streak must exceed before the status changes
    pub debounce_frames: u32,

    /// Horizontal nose-direction offset, as a fraction of the eye span,
    /// still treated as looking at the screen
    pub gaze_center_tolerance: f64,

    /// Depth (mm) of the point projected along the head's forward axis
    pub gaze_projection_depth_mm: f64,

    /// Levenberg-Marquardt iteration cap for the pose solver
    pub pose_max_iterations: u32,

    /// RMS reprojection error / eye span above which a pose is rejected
    pub pose_max_relative_error: f64,

    /// Face score threshold for the landmark model
    pub face_confidence: f32,

    /// Square input size of the landmark model
    pub landmark_input_size: u32,

    /// Model paths
    pub landmark_model_path: Option<String>,
    pub emotion_model_path: Option<String>,
}

impl Default for AttentionConfig {
    fn default() -> Self {
        Self {
            open_ratio_threshold: 0.25,
            closed_ratio_threshold: 0.21,
            debounce_frames: 6,
            gaze_center_tolerance: 0.5,
            gaze_projection_depth_mm: 1000.0,
            pose_max_iterations: 50,
            pose_max_relative_error: 0.25,
            face_confidence: 0.5,
            landmark_input_size: 112,
            landmark_model_path: None,
            emotion_model_path: None,
        }
    }
}

impl AttentionConfig {
    /// Reject threshold combinations the classifiers cannot honour
    pub fn validate(&self) -> Result<(), crate::AttentionError> {
        if !(self.closed_ratio_threshold < self.open_ratio_threshold) {
            return Err(crate::AttentionError::Config(format!(
                "closed_ratio_threshold ({}) must be below open_ratio_threshold ({})",
                self.closed_ratio_threshold, self.open_ratio_threshold
            )));
        }
        if self.gaze_center_tolerance < 0.0 {
            return Err(crate::AttentionError::Config(
                "gaze_center_tolerance must not be negative".into(),
            ));
        }
        if self.landmark_input_size == 0 {
            return Err(crate::AttentionError::Config(
                "landmark_input_size must be positive".into(),
            ));
        }
        Ok(())
    }
}
