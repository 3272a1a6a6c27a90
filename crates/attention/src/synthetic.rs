//! Synthetic faces for demos and tests
//!
//! Renders the generic head model at a chosen pose into a 68-point landmark
//! set, with eye rings shaped to a requested blink ratio.

use nalgebra::{Rotation3, Vector3};

use crate::gaze::{frontal_rotation, CameraIntrinsics, MODEL_POINTS, POSE_LANDMARKS};
use crate::geometry::{idx, FaceBbox, FaceLandmarks, Landmarks, Point, LANDMARK_COUNT};

/// Project the six model points at the given pose
pub fn project_model(
    rotation: &Rotation3<f64>,
    translation: &Vector3<f64>,
    camera: &CameraIntrinsics,
) -> [Point; 6] {
    MODEL_POINTS.map(|m| {
        let p = rotation * Vector3::new(m[0], m[1], m[2]) + translation;
        Point::new(camera.fx * p.x / p.z + camera.cx, camera.fy * p.y / p.z + camera.cy)
    })
}

/// Pose and eye openness of a synthetic face
#[derive(Debug, Clone, Copy)]
pub struct FaceSpec {
    pub yaw_deg: f64,
    pub pitch_deg: f64,
    /// Distance of the nose tip from the camera (model units)
    pub depth_mm: f64,
    pub left_eye_ratio: f64,
    pub right_eye_ratio: f64,
}

impl Default for FaceSpec {
    fn default() -> Self {
        Self {
            yaw_deg: 0.0,
            pitch_deg: 0.0,
            depth_mm: 2500.0,
            left_eye_ratio: 0.3,
            right_eye_ratio: 0.3,
        }
    }
}

impl FaceSpec {
    /// Frontal face with both eyes at `ratio`
    pub fn with_eyes(ratio: f64) -> Self {
        Self {
            left_eye_ratio: ratio,
            right_eye_ratio: ratio,
            ..Default::default()
        }
    }

    pub fn landmarks(&self, camera: &CameraIntrinsics) -> Landmarks {
        let turn = Rotation3::from_euler_angles(self.pitch_deg.to_radians(), self.yaw_deg.to_radians(), 0.0);
        let rotation = turn * frontal_rotation();
        let pose_points = project_model(&rotation, &Vector3::new(0.0, 0.0, self.depth_mm), camera);

        let mut points = [pose_points[0]; LANDMARK_COUNT];
        for (i, p) in POSE_LANDMARKS.iter().zip(pose_points) {
            points[*i] = p;
        }

        let left_outer = points[idx::LEFT_EYE_OUTER];
        let right_outer = points[idx::RIGHT_EYE_OUTER];
        let left_inner = lerp(left_outer, right_outer, 0.35);
        let right_inner = lerp(right_outer, left_outer, 0.35);

        shape_eye(&mut points, idx::LEFT_EYE, left_outer, left_inner, self.left_eye_ratio);
        shape_eye(&mut points, idx::RIGHT_EYE, right_inner, right_outer, self.right_eye_ratio);

        Landmarks::from(points)
    }

    pub fn face(&self, camera: &CameraIntrinsics) -> FaceLandmarks {
        let landmarks = self.landmarks(camera);
        let bbox: FaceBbox = landmarks.envelope(1.0);
        FaceLandmarks { bbox, landmarks }
    }
}

fn lerp(a: Point, b: Point, t: f64) -> Point {
    Point::new(a.x + (b.x - a.x) * t, a.y + (b.y - a.y) * t)
}

/// Place the ring so that `blink_ratio` of it equals `ratio`
fn shape_eye(points: &mut [Point], ring: [usize; 6], start: Point, end: Point, ratio: f64) {
    let width = (end.x - start.x).hypot(end.y - start.y);
    let half = ratio * width / 2.0;
    let first = lerp(start, end, 1.0 / 3.0);
    let second = lerp(start, end, 2.0 / 3.0);

    points[ring[0]] = start;
    points[ring[1]] = Point::new(first.x, first.y - half);
    points[ring[2]] = Point::new(second.x, second.y - half);
    points[ring[3]] = Point::new(first.x, first.y + half);
    points[ring[4]] = Point::new(second.x, second.y + half);
    points[ring[5]] = end;
}
