//! Debounced attention state tracking

use serde::{Deserialize, Serialize};

use crate::blink::{EyeLevel, EyePair};
use crate::gaze::GazeDirection;

/// Attentiveness classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AttentionStatus {
    #[default]
    Attentive,
    Distracted,
}

impl AttentionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            AttentionStatus::Attentive => "Attentive",
            AttentionStatus::Distracted => "Distracted",
        }
    }
}

/// Mutually exclusive eye streaks; each frame advances exactly one
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Streaks {
    pub sleep: u32,
    pub drowsy: u32,
    pub active: u32,
    /// Consecutive frames looking left or right (independent of the eye streaks)
    pub gaze_away: u32,
}

/// Per-frame attention state machine
#[derive(Debug, Clone)]
pub struct AttentionState {
    debounce_frames: u32,
    streaks: Streaks,
    status: AttentionStatus,
}

impl AttentionState {
    pub fn new(debounce_frames: u32) -> Self {
        Self {
            debounce_frames,
            streaks: Streaks::default(),
            status: AttentionStatus::default(),
        }
    }

    pub fn status(&self) -> AttentionStatus {
        self.status
    }

    pub fn streaks(&self) -> Streaks {
        self.streaks
    }

    /// Advance one frame with a visible face and return the resolved status
    pub fn observe(&mut self, eyes: &EyePair, gaze: GazeDirection) -> AttentionStatus {
        let eye_verdict = self.observe_eyes(eyes.left, eyes.right);
        let looking_away = self.observe_gaze(gaze);

        if looking_away {
            self.status = AttentionStatus::Distracted;
        } else if let Some(status) = eye_verdict {
            self.status = status;
        }
        self.status
    }

    fn observe_eyes(&mut self, left: EyeLevel, right: EyeLevel) -> Option<AttentionStatus> {
        let s = &mut self.streaks;
        if left == EyeLevel::Closed || right == EyeLevel::Closed {
            s.sleep += 1;
            s.drowsy = 0;
            s.active = 0;
            (s.sleep > self.debounce_frames).then_some(AttentionStatus::Distracted)
        } else if left == EyeLevel::PartiallyClosed || right == EyeLevel::PartiallyClosed {
            s.sleep = 0;
            s.active = 0;
            s.drowsy += 1;
            (s.drowsy > self.debounce_frames).then_some(AttentionStatus::Distracted)
        } else {
            s.drowsy = 0;
            s.sleep = 0;
            s.active += 1;
            (s.active > self.debounce_frames).then_some(AttentionStatus::Attentive)
        }
    }

    fn observe_gaze(&mut self, gaze: GazeDirection) -> bool {
        match gaze {
            GazeDirection::Left | GazeDirection::Right => self.streaks.gaze_away += 1,
            GazeDirection::Center => self.streaks.gaze_away = 0,
            GazeDirection::Unknown => {}
        }
        self.streaks.gaze_away > self.debounce_frames
    }

    /// Clear streaks and restore the initial status
    pub fn reset(&mut self) {
        self.streaks = Streaks::default();
        self.status = AttentionStatus::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eyes(left: EyeLevel, right: EyeLevel) -> EyePair {
        EyePair::from_levels(left, right)
    }

    const OPEN: EyeLevel = EyeLevel::Open;
    const HALF: EyeLevel = EyeLevel::PartiallyClosed;
    const SHUT: EyeLevel = EyeLevel::Closed;

    #[test]
    fn test_closed_streak_debounced() {
        let mut state = AttentionState::new(6);
        for _ in 0..6 {
            assert_eq!(state.observe(&eyes(SHUT, OPEN), GazeDirection::Center), AttentionStatus::Attentive);
        }
        assert_eq!(state.observe(&eyes(SHUT, OPEN), GazeDirection::Center), AttentionStatus::Distracted);
        assert_eq!(state.streaks().sleep, 7);
    }

    #[test]
    fn test_open_frame_resets_sleep_streak() {
        let mut state = AttentionState::new(6);
        for _ in 0..5 {
            state.observe(&eyes(SHUT, SHUT), GazeDirection::Center);
        }
        state.observe(&eyes(OPEN, OPEN), GazeDirection::Center);
        let streaks = state.streaks();
        assert_eq!((streaks.sleep, streaks.drowsy, streaks.active), (0, 0, 1));
    }

    #[test]
    fn test_streaks_mutually_exclusive() {
        let mut state = AttentionState::new(6);
        state.observe(&eyes(HALF, OPEN), GazeDirection::Center);
        assert_eq!(state.streaks().drowsy, 1);
        // closed wins over half-open
        state.observe(&eyes(HALF, SHUT), GazeDirection::Center);
        let s = state.streaks();
        assert_eq!((s.sleep, s.drowsy, s.active), (1, 0, 0));
    }

    #[test]
    fn test_drowsy_becomes_distracted() {
        let mut state = AttentionState::new(6);
        for _ in 0..7 {
            state.observe(&eyes(HALF, HALF), GazeDirection::Center);
        }
        assert_eq!(state.status(), AttentionStatus::Distracted);
    }

    #[test]
    fn test_status_holds_until_active_streak_exceeds() {
        let mut state = AttentionState::new(6);
        for _ in 0..7 {
            state.observe(&eyes(SHUT, SHUT), GazeDirection::Center);
        }
        for _ in 0..6 {
            assert_eq!(state.observe(&eyes(OPEN, OPEN), GazeDirection::Center), AttentionStatus::Distracted);
        }
        assert_eq!(state.observe(&eyes(OPEN, OPEN), GazeDirection::Center), AttentionStatus::Attentive);
    }

    #[test]
    fn test_sustained_gaze_away_overrides_open_eyes() {
        let mut state = AttentionState::new(6);
        for _ in 0..6 {
            assert_eq!(state.observe(&eyes(OPEN, OPEN), GazeDirection::Left), AttentionStatus::Attentive);
        }
        assert_eq!(state.observe(&eyes(OPEN, OPEN), GazeDirection::Right), AttentionStatus::Distracted);
        // looking back resets the gaze streak; the active streak is long enough already
        assert_eq!(state.observe(&eyes(OPEN, OPEN), GazeDirection::Center), AttentionStatus::Attentive);
    }

    #[test]
    fn test_unknown_gaze_keeps_gaze_streak() {
        let mut state = AttentionState::new(6);
        for _ in 0..4 {
            state.observe(&eyes(OPEN, OPEN), GazeDirection::Left);
        }
        state.observe(&eyes(OPEN, OPEN), GazeDirection::Unknown);
        assert_eq!(state.streaks().gaze_away, 4);
    }

    #[test]
    fn test_reset() {
        let mut state = AttentionState::new(2);
        for _ in 0..3 {
            state.observe(&eyes(SHUT, SHUT), GazeDirection::Left);
        }
        assert_eq!(state.status(), AttentionStatus::Distracted);
        state.reset();
        assert_eq!(state.status(), AttentionStatus::Attentive);
        assert_eq!(state.streaks(), Streaks::default());
    }
}
