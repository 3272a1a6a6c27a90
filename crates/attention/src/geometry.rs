//! Landmark geometry

use serde::{Deserialize, Serialize};

use crate::AttentionError;

/// Number of points in the 68-point landmark convention
pub const LANDMARK_COUNT: usize = 68;

/// Landmark indices (68-point convention)
pub mod idx {
    /// Left eye ring in blink order: outer corner, two upper lids, two lower lids, inner corner
    pub const LEFT_EYE: [usize; 6] = [36, 37, 38, 41, 40, 39];
    /// Right eye ring in blink order
    pub const RIGHT_EYE: [usize; 6] = [42, 43, 44, 47, 46, 45];

    pub const CHIN: usize = 8;
    pub const NOSE_TIP: usize = 30;
    pub const LEFT_EYE_OUTER: usize = 36;
    pub const RIGHT_EYE_OUTER: usize = 45;
    pub const MOUTH_LEFT: usize = 48;
    pub const MOUTH_RIGHT: usize = 54;
}

/// 2D image point (pixels)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

/// Euclidean distance between two points
pub fn distance(a: Point, b: Point) -> f64 {
    (a.x - b.x).hypot(a.y - b.y)
}

/// Eye aspect ratio from six eye-ring points.
///
/// `p[0]`/`p[5]` are the horizontal corners, `p[1]..=p[4]` the lids paired
/// as (1, 3) and (2, 4). Order is not validated.
pub fn blink_ratio(p: &[Point; 6]) -> f64 {
    let vertical = distance(p[1], p[3]) + distance(p[2], p[4]);
    let horizontal = distance(p[0], p[5]);
    vertical / (2.0 * horizontal)
}

/// Face bounding box
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceBbox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub confidence: f32,
}

impl FaceBbox {
    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }
}

/// One face's 68 landmarks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Point>", into = "Vec<Point>")]
pub struct Landmarks {
    points: Vec<Point>,
}

impl Landmarks {
    pub fn new(points: Vec<Point>) -> Result<Self, AttentionError> {
        if points.len() != LANDMARK_COUNT {
            return Err(AttentionError::LandmarkCount {
                expected: LANDMARK_COUNT,
                actual: points.len(),
            });
        }
        Ok(Self { points })
    }

    pub fn get(&self, index: usize) -> Point {
        self.points[index]
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Gather six points by index
    pub fn ring(&self, indices: [usize; 6]) -> [Point; 6] {
        indices.map(|i| self.points[i])
    }

    /// Axis-aligned envelope of all points
    pub fn envelope(&self, confidence: f32) -> FaceBbox {
        let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
        let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for p in &self.points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        FaceBbox {
            x: min_x,
            y: min_y,
            width: max_x - min_x,
            height: max_y - min_y,
            confidence,
        }
    }
}

impl TryFrom<Vec<Point>> for Landmarks {
    type Error = AttentionError;

    fn try_from(points: Vec<Point>) -> Result<Self, Self::Error> {
        Self::new(points)
    }
}

impl From<Landmarks> for Vec<Point> {
    fn from(landmarks: Landmarks) -> Self {
        landmarks.points
    }
}

impl From<[Point; LANDMARK_COUNT]> for Landmarks {
    fn from(points: [Point; LANDMARK_COUNT]) -> Self {
        Self {
            points: points.to_vec(),
        }
    }
}

/// Detected face: box plus landmarks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceLandmarks {
    pub bbox: FaceBbox,
    pub landmarks: Landmarks,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_345() {
        assert!((distance(Point::new(0.0, 0.0), Point::new(3.0, 4.0)) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_distance_propagates_nan() {
        assert!(distance(Point::new(f64::NAN, 0.0), Point::new(1.0, 1.0)).is_nan());
    }

    #[test]
    fn test_blink_ratio() {
        // corners 10 apart, lids 3 apart
        let eye = [
            Point::new(0.0, 0.0),
            Point::new(3.0, -1.5),
            Point::new(7.0, -1.5),
            Point::new(3.0, 1.5),
            Point::new(7.0, 1.5),
            Point::new(10.0, 0.0),
        ];
        assert!((blink_ratio(&eye) - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_landmark_count_enforced() {
        let err = Landmarks::new(vec![Point::default(); 5]).unwrap_err();
        assert!(matches!(
            err,
            AttentionError::LandmarkCount { expected: 68, actual: 5 }
        ));
    }

    #[test]
    fn test_deserialize_checks_count() {
        let short = serde_json::to_string(&vec![Point::default(); 5]).unwrap();
        let err = serde_json::from_str::<Landmarks>(&short).unwrap_err();
        assert!(err.to_string().contains("Expected 68"));

        let full = serde_json::to_string(&vec![Point::new(1.0, 2.0); LANDMARK_COUNT]).unwrap();
        let landmarks: Landmarks = serde_json::from_str(&full).unwrap();
        assert_eq!(landmarks.get(67), Point::new(1.0, 2.0));
        assert_eq!(serde_json::to_string(&landmarks).unwrap(), full);
    }

    #[test]
    fn test_envelope() {
        let mut points = vec![Point::new(50.0, 50.0); LANDMARK_COUNT];
        points[0] = Point::new(10.0, 20.0);
        points[1] = Point::new(90.0, 120.0);
        let bbox = Landmarks::new(points).unwrap().envelope(0.9);
        assert_eq!((bbox.x, bbox.y, bbox.width, bbox.height), (10.0, 20.0, 80.0, 100.0));
        assert_eq!(bbox.area(), 8000.0);
    }
}
