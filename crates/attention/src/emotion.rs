//! Emotion labels and per-session tallies

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::AttentionError;

/// The seven expression classes, in classifier output order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Emotion {
    Angry,
    Disgusted,
    Fear,
    Happy,
    Sad,
    Surprise,
    #[default]
    Neutral,
}

impl Emotion {
    pub const ALL: [Emotion; 7] = [
        Emotion::Angry,
        Emotion::Disgusted,
        Emotion::Fear,
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Surprise,
        Emotion::Neutral,
    ];

    /// Map a classifier output index
    pub fn from_index(index: usize) -> Option<Emotion> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            Emotion::Angry => "Angry",
            Emotion::Disgusted => "Disgusted",
            Emotion::Fear => "Fear",
            Emotion::Happy => "Happy",
            Emotion::Sad => "Sad",
            Emotion::Surprise => "Surprise",
            Emotion::Neutral => "Neutral",
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Emotion {
    type Err = AttentionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|e| e.label().eq_ignore_ascii_case(s))
            .ok_or_else(|| AttentionError::UnknownEmotion(s.to_string()))
    }
}

/// Per-emotion counts, keyed the way summary records store them
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmotionCounts {
    pub happy: u64,
    pub sad: u64,
    pub surprise: u64,
    pub angry: u64,
    pub disgusted: u64,
    pub fear: u64,
    pub neutral: u64,
}

/// Cumulative emotion counter
#[derive(Debug, Clone, Default)]
pub struct EmotionTally {
    counts: [u64; 7],
}

impl EmotionTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, emotion: Emotion) {
        self.counts[emotion.index()] += 1;
    }

    /// Record by label; unknown labels are rejected
    pub fn record_label(&mut self, label: &str) -> Result<Emotion, AttentionError> {
        let emotion: Emotion = label.parse()?;
        self.record(emotion);
        Ok(emotion)
    }

    pub fn count(&self, emotion: Emotion) -> u64 {
        self.counts[emotion.index()]
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn counts(&self) -> EmotionCounts {
        EmotionCounts {
            happy: self.count(Emotion::Happy),
            sad: self.count(Emotion::Sad),
            surprise: self.count(Emotion::Surprise),
            angry: self.count(Emotion::Angry),
            disgusted: self.count(Emotion::Disgusted),
            fear: self.count(Emotion::Fear),
            neutral: self.count(Emotion::Neutral),
        }
    }

    pub fn reset(&mut self) {
        self.counts = [0; 7];
    }
}
