//! Per-frame analysis results

use serde::{Deserialize, Serialize};

use crate::blink::EyePair;
use crate::emotion::Emotion;
use crate::gaze::{GazeDirection, GazeReading};
use crate::geometry::FaceLandmarks;
use crate::state::AttentionStatus;

/// Complete result for one frame
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameAnalysis {
    /// Whether a face was detected
    pub face_detected: bool,

    /// Face the attention state was updated from (the largest one)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub face: Option<FaceLandmarks>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub eyes: Option<EyePair>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub gaze: Option<GazeReading>,

    /// Debounced status after this frame
    pub status: AttentionStatus,

    /// Bucket this frame's interval is charged to
    pub bucket: AttentionStatus,

    /// Emotions of every detected face, in detection order
    pub emotions: Vec<Emotion>,
}

impl FrameAnalysis {
    pub fn gaze_direction(&self) -> GazeDirection {
        self.gaze
            .map(|g| g.direction)
            .unwrap_or(GazeDirection::Unknown)
    }

    /// Emotion shown for the frame: the last classified face
    pub fn latest_emotion(&self) -> Option<Emotion> {
        self.emotions.last().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_face_defaults() {
        let analysis = FrameAnalysis::default();
        assert!(!analysis.face_detected);
        assert_eq!(analysis.gaze_direction(), GazeDirection::Unknown);
        assert_eq!(analysis.latest_emotion(), None);
    }

    #[test]
    fn test_latest_emotion_is_last_face() {
        let analysis = FrameAnalysis {
            emotions: vec![Emotion::Happy, Emotion::Sad],
            ..Default::default()
        };
        assert_eq!(analysis.latest_emotion(), Some(Emotion::Sad));
    }
}
