//! Observation types: one timestamped classification result per tick.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Upper bound of the classifier's focus scale.
pub const MAX_FOCUS_SCORE: f64 = 6.0;

/// Learning state reported by the classifier.
///
/// Labels outside the known vocabulary deserialize as [`LearningState::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LearningState {
    Engaged,
    Focused,
    Distracted,
    Tired,
    Confused,
    Frustrated,
    #[serde(other)]
    Unknown,
}

impl LearningState {
    /// States counted as distraction alerts on the dashboard.
    pub fn is_distraction(self) -> bool {
        matches!(self, LearningState::Tired | LearningState::Frustrated)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LearningState::Engaged => "Engaged",
            LearningState::Focused => "Focused",
            LearningState::Distracted => "Distracted",
            LearningState::Tired => "Tired",
            LearningState::Confused => "Confused",
            LearningState::Frustrated => "Frustrated",
            LearningState::Unknown => "Unknown",
        }
    }
}

impl Default for LearningState {
    fn default() -> Self {
        LearningState::Unknown
    }
}

impl std::fmt::Display for LearningState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// One classification result. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    /// Instant the frame was captured
    pub timestamp: DateTime<Utc>,
    /// Emotion label as reported by the classifier
    pub emotion: String,
    /// Focus score in `[0, 6]`
    pub focus_score: f64,
    /// Learning state as reported by the classifier
    pub learning_state: LearningState,
}

impl Observation {
    /// Build an observation, clamping the score into the classifier's range.
    pub fn new(
        timestamp: DateTime<Utc>,
        emotion: impl Into<String>,
        focus_score: f64,
        learning_state: LearningState,
    ) -> Self {
        Self {
            timestamp,
            emotion: emotion.into(),
            focus_score: focus_score.clamp(0.0, MAX_FOCUS_SCORE),
            learning_state,
        }
    }
}
