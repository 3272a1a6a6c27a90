//! Landmark and emotion models

use camera_capture::frame::VideoFrame;
use image::imageops::{self, FilterType};
use ndarray::{Array4, ArrayViewD};
use ort::session::{builder::GraphOptimizationLevel, Session};
use tracing::{error, info, warn};

use crate::emotion::Emotion;
use crate::geometry::{FaceBbox, FaceLandmarks, Landmarks, Point, LANDMARK_COUNT};
use crate::{AttentionConfig, AttentionError};

/// Finds faces and their 68 landmarks in a frame
pub trait LandmarkDetector: Send {
    fn detect(&mut self, frame: &VideoFrame) -> Result<Vec<FaceLandmarks>, AttentionError>;
}

/// Labels the expression of one face
pub trait EmotionClassifier: Send {
    fn classify(&mut self, frame: &VideoFrame, face: &FaceBbox) -> Result<Emotion, AttentionError>;
}

const EMOTION_INPUT_SIZE: u32 = 48;

fn load_session(path: &str, what: &str) -> Result<Session, AttentionError> {
    info!("Loading {} model from {}", what, path);
    Session::builder()
        .and_then(|builder| builder.with_optimization_level(GraphOptimizationLevel::Level3))
        .and_then(|builder| builder.commit_from_file(path))
        .map_err(|e| {
            error!("Failed to load {} model: {}", what, e);
            AttentionError::ModelLoad(e.to_string())
        })
}

fn rgb_image(frame: &VideoFrame) -> Result<image::RgbImage, AttentionError> {
    frame
        .to_rgb_image()
        .ok_or_else(|| AttentionError::ImageProcessing("Failed to create image buffer".into()))
}

/// Landmark regressor run on the whole frame.
///
/// Input `1x3xSxS` RGB scaled to `[0, 1]`; outputs `[1, 136]` landmark
/// coordinates normalised to the input and, optionally, a `[1, 1]` face score.
pub struct OnnxLandmarkDetector {
    confidence_threshold: f32,
    input_size: u32,
    session: Option<Session>,
}

impl OnnxLandmarkDetector {
    pub fn new(config: &AttentionConfig) -> Result<Self, AttentionError> {
        let session = match &config.landmark_model_path {
            Some(path) => Some(load_session(path, "landmark")?),
            None => {
                warn!("No landmark model configured; every frame will be treated as face-absent");
                None
            }
        };

        Ok(Self {
            confidence_threshold: config.face_confidence,
            input_size: config.landmark_input_size,
            session,
        })
    }

    fn decode(
        &self,
        coords: &ArrayViewD<'_, f32>,
        score: Option<f32>,
        frame: &VideoFrame,
    ) -> Result<Vec<FaceLandmarks>, AttentionError> {
        let score = score.unwrap_or(1.0);
        if score < self.confidence_threshold {
            return Ok(Vec::new());
        }

        let flat: Vec<f32> = coords.iter().copied().collect();
        if flat.len() != LANDMARK_COUNT * 2 {
            return Err(AttentionError::Inference(format!(
                "landmark output has {} values, expected {}",
                flat.len(),
                LANDMARK_COUNT * 2
            )));
        }

        let (w, h) = (f64::from(frame.width), f64::from(frame.height));
        let points = flat
            .chunks_exact(2)
            .map(|xy| Point::new(f64::from(xy[0]) * w, f64::from(xy[1]) * h))
            .collect();
        let landmarks = Landmarks::new(points)?;
        let bbox = landmarks.envelope(score);
        Ok(vec![FaceLandmarks { bbox, landmarks }])
    }
}

impl LandmarkDetector for OnnxLandmarkDetector {
    fn detect(&mut self, frame: &VideoFrame) -> Result<Vec<FaceLandmarks>, AttentionError> {
        let Some(session) = &self.session else {
            return Ok(Vec::new());
        };

        // 1. Preprocess: resize to SxS
        let size = self.input_size;
        let resized = imageops::resize(&rgb_image(frame)?, size, size, FilterType::Triangle);

        // 2. Normalize and create tensor (1x3xSxS)
        let mut input = Array4::<f32>::zeros((1, 3, size as usize, size as usize));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                input[[0, c, y as usize, x as usize]] = f32::from(pixel[c]) / 255.0;
            }
        }

        // 3. Inference
        let outputs = session
            .run(ort::inputs![input].map_err(|e| AttentionError::Inference(e.to_string()))?)
            .map_err(|e| AttentionError::Inference(e.to_string()))?;

        // 4. Post-process
        let coords = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| AttentionError::Inference(e.to_string()))?;
        let score = if outputs.len() > 1 {
            outputs[1]
                .try_extract_tensor::<f32>()
                .ok()
                .and_then(|t| t.iter().next().copied())
        } else {
            None
        };

        self.decode(&coords, score, frame)
    }
}

/// 7-class expression model on a 48x48 grayscale face crop.
///
/// Input `1x48x48x1` with raw 0-255 intensities; output `[1, 7]` scores in
/// [`Emotion::ALL`] order.
pub struct OnnxEmotionClassifier {
    session: Option<Session>,
}

impl OnnxEmotionClassifier {
    pub fn new(config: &AttentionConfig) -> Result<Self, AttentionError> {
        let session = match &config.emotion_model_path {
            Some(path) => Some(load_session(path, "emotion")?),
            None => {
                warn!("No emotion model configured; every face will be labelled Neutral");
                None
            }
        };
        Ok(Self { session })
    }
}

/// Index of the highest score
fn argmax(scores: impl Iterator<Item = f32>) -> Option<usize> {
    scores
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(i, _)| i)
}

impl EmotionClassifier for OnnxEmotionClassifier {
    fn classify(&mut self, frame: &VideoFrame, face: &FaceBbox) -> Result<Emotion, AttentionError> {
        let Some(session) = &self.session else {
            return Ok(Emotion::Neutral);
        };

        let crop = frame
            .crop(
                face.x.floor() as i64,
                face.y.floor() as i64,
                face.width.ceil().max(1.0) as u32,
                face.height.ceil().max(1.0) as u32,
            )
            .ok_or_else(|| AttentionError::ImageProcessing("face outside frame".into()))?;

        let gray = imageops::grayscale(&rgb_image(&crop)?);
        let resized = imageops::resize(&gray, EMOTION_INPUT_SIZE, EMOTION_INPUT_SIZE, FilterType::Triangle);

        let n = EMOTION_INPUT_SIZE as usize;
        let mut input = Array4::<f32>::zeros((1, n, n, 1));
        for (x, y, pixel) in resized.enumerate_pixels() {
            input[[0, y as usize, x as usize, 0]] = f32::from(pixel[0]);
        }

        let outputs = session
            .run(ort::inputs![input].map_err(|e| AttentionError::Inference(e.to_string()))?)
            .map_err(|e| AttentionError::Inference(e.to_string()))?;
        let scores = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| AttentionError::Inference(e.to_string()))?;

        argmax(scores.iter().copied())
            .and_then(Emotion::from_index)
            .ok_or_else(|| AttentionError::Inference("emotion output has no valid class".into()))
    }
}
