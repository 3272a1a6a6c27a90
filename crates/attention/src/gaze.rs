//! Head pose and gaze direction
//!
//! Solves the Perspective-n-Point problem for six facial landmarks against a
//! generic 3D head model, then projects a point along the head's forward axis
//! to decide where the face is pointing.

use nalgebra::{Matrix3, Matrix6, Point3, Rotation3, SMatrix, SVector, Vector3, Vector6};
use serde::{Deserialize, Serialize};

use crate::config::AttentionConfig;
use crate::geometry::{distance, idx, Landmarks, Point};
use crate::AttentionError;

/// Generic head model (mm), in the order of [`POSE_LANDMARKS`]
pub const MODEL_POINTS: [[f64; 3]; 6] = [
    [0.0, 0.0, 0.0],          // nose tip
    [0.0, -330.0, -65.0],     // chin
    [-225.0, 170.0, -135.0],  // left eye outer corner
    [225.0, 170.0, -135.0],   // right eye outer corner
    [-150.0, -150.0, -125.0], // left mouth corner
    [150.0, -150.0, -125.0],  // right mouth corner
];

/// Landmark indices matching [`MODEL_POINTS`]
pub const POSE_LANDMARKS: [usize; 6] = [
    idx::NOSE_TIP,
    idx::CHIN,
    idx::LEFT_EYE_OUTER,
    idx::RIGHT_EYE_OUTER,
    idx::MOUTH_LEFT,
    idx::MOUTH_RIGHT,
];

const MODEL_EYE_SPAN_MM: f64 = 450.0;

/// Where the face is pointing, as seen in the image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GazeDirection {
    Left,
    Center,
    Right,
    /// Pose could not be solved for this frame
    Unknown,
}

impl GazeDirection {
    /// Left or right of the screen
    pub fn is_away(&self) -> bool {
        matches!(self, GazeDirection::Left | GazeDirection::Right)
    }
}

/// Pinhole camera without lens distortion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl CameraIntrinsics {
    /// Focal length approximated by the frame height, principal point at the centre
    pub fn for_frame(width: u32, height: u32) -> Self {
        let f = f64::from(height);
        Self {
            fx: f,
            fy: f,
            cx: f64::from(width) / 2.0,
            cy: f64::from(height) / 2.0,
        }
    }

    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(self.fx, 0.0, self.cx, 0.0, self.fy, self.cy, 0.0, 0.0, 1.0)
    }

    fn project(&self, p: &Vector3<f64>) -> Point {
        Point::new(self.fx * p.x / p.z + self.cx, self.fy * p.y / p.z + self.cy)
    }
}

/// Solved head pose: model coordinates -> camera coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadPose {
    pub rotation: Rotation3<f64>,
    pub translation: Vector3<f64>,
    /// RMS reprojection error in pixels
    pub reprojection_error: f64,
}

impl HeadPose {
    pub fn to_camera(&self, model: &Point3<f64>) -> Vector3<f64> {
        self.rotation * model.coords + self.translation
    }

    /// Yaw, pitch, roll in degrees relative to a frontal face.
    ///
    /// Camera axes: x right, y down, z forward, so yaw turns about y.
    pub fn euler_degrees(&self) -> (f64, f64, f64) {
        let relative = self.rotation * frontal_rotation().inverse();
        let (about_x, about_y, about_z) = relative.euler_angles();
        (about_y.to_degrees(), about_x.to_degrees(), about_z.to_degrees())
    }
}

/// Per-frame gaze result
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GazeReading {
    pub direction: GazeDirection,
    pub nose_tip: Point,
    /// Projection of the forward-axis point
    pub nose_end: Point,
    pub yaw_deg: f64,
    pub pitch_deg: f64,
    pub reprojection_error: f64,
}

/// Model frame seen face-on: x right, y down, z away from the camera
pub(crate) fn frontal_rotation() -> Rotation3<f64> {
    Rotation3::from_axis_angle(&Vector3::x_axis(), std::f64::consts::PI)
}

/// Levenberg-Marquardt PnP solver for the six-point head model
#[derive(Debug, Clone, Copy)]
pub struct PoseSolver {
    max_iterations: u32,
    max_relative_error: f64,
}

type Residuals = SVector<f64, 12>;
type Jacobian = SMatrix<f64, 12, 6>;

impl PoseSolver {
    pub fn new(max_iterations: u32, max_relative_error: f64) -> Self {
        Self {
            max_iterations,
            max_relative_error,
        }
    }

    fn pose_from(params: &Vector6<f64>) -> (Rotation3<f64>, Vector3<f64>) {
        let delta = Rotation3::new(Vector3::new(params[0], params[1], params[2]));
        (delta * frontal_rotation(), Vector3::new(params[3], params[4], params[5]))
    }

    fn residuals(
        params: &Vector6<f64>,
        image: &[Point; 6],
        camera: &CameraIntrinsics,
    ) -> Residuals {
        let (rotation, translation) = Self::pose_from(params);
        let mut r = Residuals::zeros();
        for (i, (model, observed)) in MODEL_POINTS.iter().zip(image).enumerate() {
            let pc = rotation * Vector3::new(model[0], model[1], model[2]) + translation;
            let projected = camera.project(&pc);
            r[2 * i] = projected.x - observed.x;
            r[2 * i + 1] = projected.y - observed.y;
        }
        r
    }

    fn jacobian(params: &Vector6<f64>, image: &[Point; 6], camera: &CameraIntrinsics) -> Jacobian {
        let mut j = Jacobian::zeros();
        for k in 0..6 {
            let h = 1e-6 * params[k].abs().max(1.0);
            let mut plus = *params;
            let mut minus = *params;
            plus[k] += h;
            minus[k] -= h;
            let column = (Self::residuals(&plus, image, camera)
                - Self::residuals(&minus, image, camera))
                / (2.0 * h);
            j.set_column(k, &column);
        }
        j
    }

    /// Recover the head pose from the six image points in [`POSE_LANDMARKS`] order
    pub fn solve(
        &self,
        image: &[Point; 6],
        camera: &CameraIntrinsics,
    ) -> Result<HeadPose, AttentionError> {
        let eye_span = distance(image[2], image[3]);
        if !(eye_span.is_finite() && eye_span > 1.0) {
            return Err(AttentionError::PoseSolve(format!(
                "degenerate eye span {eye_span:.2}px"
            )));
        }

        // frontal start at the depth implied by the eye span
        let tz = camera.fx * MODEL_EYE_SPAN_MM / eye_span;
        let mut params = Vector6::new(
            0.0,
            0.0,
            0.0,
            (image[0].x - camera.cx) * tz / camera.fx,
            (image[0].y - camera.cy) * tz / camera.fy,
            tz,
        );

        let mut r = Self::residuals(&params, image, camera);
        let mut cost = r.norm_squared();
        let mut j = Self::jacobian(&params, image, camera);
        let mut lambda = 1e-3;

        for _ in 0..self.max_iterations {
            let jtj: Matrix6<f64> = j.transpose() * j;
            let gradient: Vector6<f64> = j.transpose() * r;

            let mut damped = jtj;
            for i in 0..6 {
                damped[(i, i)] += lambda * jtj[(i, i)].max(1e-9);
            }

            let Some(step) = damped.lu().solve(&(-gradient)) else {
                lambda *= 10.0;
                continue;
            };

            let candidate = params + step;
            let candidate_r = Self::residuals(&candidate, image, camera);
            let candidate_cost = candidate_r.norm_squared();

            if candidate_cost.is_finite() && candidate_cost < cost {
                let improvement = cost - candidate_cost;
                params = candidate;
                r = candidate_r;
                cost = candidate_cost;
                lambda = (lambda / 10.0).max(1e-12);
                if improvement <= 1e-12 * cost.max(1e-12) || step.norm() <= 1e-10 {
                    break;
                }
                j = Self::jacobian(&params, image, camera);
            } else {
                lambda *= 10.0;
                if lambda > 1e12 {
                    break;
                }
            }
        }

        let (rotation, translation) = Self::pose_from(&params);
        if !params.iter().all(|v| v.is_finite()) {
            return Err(AttentionError::PoseSolve("solver diverged".into()));
        }
        let behind = MODEL_POINTS
            .iter()
            .any(|m| (rotation * Vector3::new(m[0], m[1], m[2]) + translation).z <= 0.0);
        if behind {
            return Err(AttentionError::PoseSolve(
                "solution places the face behind the camera".into(),
            ));
        }

        let rms = (cost / 6.0).sqrt();
        if rms / eye_span > self.max_relative_error {
            return Err(AttentionError::PoseSolve(format!(
                "reprojection error {rms:.1}px exceeds {:.0}% of eye span",
                self.max_relative_error * 100.0
            )));
        }

        Ok(HeadPose {
            rotation,
            translation,
            reprojection_error: rms,
        })
    }
}

/// Classifies gaze from facial landmarks
#[derive(Debug, Clone, Copy)]
pub struct GazeEstimator {
    solver: PoseSolver,
    center_tolerance: f64,
    projection_depth_mm: f64,
}

impl GazeEstimator {
    pub fn new(config: &AttentionConfig) -> Self {
        Self {
            solver: PoseSolver::new(config.pose_max_iterations, config.pose_max_relative_error),
            center_tolerance: config.gaze_center_tolerance,
            projection_depth_mm: config.gaze_projection_depth_mm,
        }
    }

    pub fn estimate(
        &self,
        landmarks: &Landmarks,
        camera: &CameraIntrinsics,
    ) -> Result<GazeReading, AttentionError> {
        let image = POSE_LANDMARKS.map(|i| landmarks.get(i));
        let pose = self.solver.solve(&image, camera)?;
        Ok(self.classify(&pose, &image, camera))
    }

    fn classify(&self, pose: &HeadPose, image: &[Point; 6], camera: &CameraIntrinsics) -> GazeReading {
        let nose_tip = image[0];
        let eye_span = distance(image[2], image[3]);

        // keep the projected point in front of the camera for close faces
        let forward = pose.rotation * Vector3::z();
        let mut depth = self.projection_depth_mm;
        if forward.z < 0.0 {
            depth = depth.min(0.5 * pose.translation.z / -forward.z);
        }

        let end = pose.to_camera(&Point3::new(0.0, 0.0, depth));
        let nose_end = camera.project(&end);
        let dx = nose_end.x - nose_tip.x;

        let direction = if dx.abs() <= self.center_tolerance * eye_span {
            GazeDirection::Center
        } else if dx < 0.0 {
            GazeDirection::Left
        } else {
            GazeDirection::Right
        };

        let (yaw_deg, pitch_deg, _) = pose.euler_degrees();
        GazeReading {
            direction,
            nose_tip,
            nose_end,
            yaw_deg,
            pitch_deg,
            reprojection_error: pose.reprojection_error,
        }
    }
}
