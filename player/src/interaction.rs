use serde::Deserialize;

/// Overlay type, as served by `/videos/{id}/interactions`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InteractionKind {
    MultipleChoice,
    TrueFalse,
    ShortAnswer,
    Decision,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerOption {
    pub id: i64,
    pub text: String,
    #[serde(default)]
    pub is_correct: bool,
    #[serde(default)]
    pub order: i32,
}

/// A question or decision overlay bound to `[time_start, time_end]` seconds.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionPoint {
    pub id: i64,
    #[serde(default)]
    pub video_external_id: String,
    pub time_start: f64,
    pub time_end: f64,
    pub kind: InteractionKind,
    #[serde(default)]
    pub options: Vec<AnswerOption>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub language: String,
}

fn default_active() -> bool {
    true
}

impl InteractionPoint {
    /// False for windows that can never contain a playback position.
    pub fn has_valid_window(&self) -> bool {
        self.time_start.is_finite()
            && self.time_end.is_finite()
            && self.time_start >= 0.0
            && self.time_start <= self.time_end
    }

    /// Inclusive at both ends.
    pub fn contains(&self, position: f64) -> bool {
        self.is_active
            && self.has_valid_window()
            && position >= self.time_start
            && position <= self.time_end
    }
}
