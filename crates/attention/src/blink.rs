//! Eye-openness classification

use serde::{Deserialize, Serialize};

use crate::config::AttentionConfig;
use crate::geometry::{blink_ratio, idx, Landmarks};

/// Discrete eye state derived from the blink ratio
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EyeLevel {
    Closed = 0,
    PartiallyClosed = 1,
    Open = 2,
}

/// Maps blink ratios to [`EyeLevel`]s
#[derive(Debug, Clone, Copy)]
pub struct BlinkClassifier {
    open_threshold: f64,
    closed_threshold: f64,
}

impl BlinkClassifier {
    pub fn new(open_threshold: f64, closed_threshold: f64) -> Self {
        Self {
            open_threshold,
            closed_threshold,
        }
    }

    pub fn from_config(config: &AttentionConfig) -> Self {
        Self::new(config.open_ratio_threshold, config.closed_ratio_threshold)
    }

    /// `Open` above the open threshold, `PartiallyClosed` above the closed
    /// threshold, `Closed` otherwise (including NaN)
    pub fn classify(&self, ratio: f64) -> EyeLevel {
        if ratio > self.open_threshold {
            EyeLevel::Open
        } else if ratio > self.closed_threshold {
            EyeLevel::PartiallyClosed
        } else {
            EyeLevel::Closed
        }
    }

    pub fn classify_face(&self, landmarks: &Landmarks) -> EyePair {
        let left_ratio = blink_ratio(&landmarks.ring(idx::LEFT_EYE));
        let right_ratio = blink_ratio(&landmarks.ring(idx::RIGHT_EYE));
        EyePair {
            left: self.classify(left_ratio),
            right: self.classify(right_ratio),
            left_ratio,
            right_ratio,
        }
    }
}

impl Default for BlinkClassifier {
    fn default() -> Self {
        Self::from_config(&AttentionConfig::default())
    }
}

/// Per-frame state of both eyes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EyePair {
    pub left: EyeLevel,
    pub right: EyeLevel,
    pub left_ratio: f64,
    pub right_ratio: f64,
}

impl EyePair {
    /// Pair from levels alone (ratios unknown)
    pub fn from_levels(left: EyeLevel, right: EyeLevel) -> Self {
        Self {
            left,
            right,
            left_ratio: f64::NAN,
            right_ratio: f64::NAN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_boundaries() {
        let c = BlinkClassifier::default();
        assert_eq!(c.classify(0.2500001), EyeLevel::Open);
        assert_eq!(c.classify(0.25), EyeLevel::PartiallyClosed);
        assert_eq!(c.classify(0.2100001), EyeLevel::PartiallyClosed);
        assert_eq!(c.classify(0.21), EyeLevel::Closed);
        assert_eq!(c.classify(0.0), EyeLevel::Closed);
    }

    #[test]
    fn test_nan_is_closed() {
        assert_eq!(BlinkClassifier::default().classify(f64::NAN), EyeLevel::Closed);
    }

    #[test]
    fn test_recalibrated_thresholds() {
        let c = BlinkClassifier::new(0.3, 0.15);
        assert_eq!(c.classify(0.28), EyeLevel::PartiallyClosed);
        assert_eq!(c.classify(0.2), EyeLevel::PartiallyClosed);
        assert_eq!(c.classify(0.15), EyeLevel::Closed);
    }

    proptest! {
        #[test]
        fn prop_level_matches_inequalities(r in -1.0f64..2.0) {
            let level = BlinkClassifier::default().classify(r);
            prop_assert_eq!(level == EyeLevel::Open, r > 0.25);
            prop_assert_eq!(level == EyeLevel::PartiallyClosed, r > 0.21 && r <= 0.25);
            prop_assert_eq!(level == EyeLevel::Closed, r <= 0.21);
        }
    }
}
