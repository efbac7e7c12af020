//! Shared data models used across modules

use serde::{Deserialize, Serialize};

/// A registered piece of playable content
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct VideoMediaItem {
    pub id: i64,
    pub external_id: String,
    pub content: String,
    /// Canonical duration in seconds, `None` until resolved
    pub duration_secs: Option<i64>,
}

/// Overlay type of an interaction point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InteractionKind {
    MultipleChoice,
    TrueFalse,
    ShortAnswer,
    Decision,
}

impl InteractionKind {
    /// Parse the `questions.type` column. Unknown tags fall back to multiple choice.
    pub fn from_db(value: &str) -> Self {
        match value.to_ascii_lowercase().replace('_', "-").as_str() {
            "true-false" => InteractionKind::TrueFalse,
            "short-answer" => InteractionKind::ShortAnswer,
            "decision" | "decision-branch" => InteractionKind::Decision,
            _ => InteractionKind::MultipleChoice,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerOption {
    pub id: i64,
    pub text: String,
    pub is_correct: bool,
    pub order: i32,
}

/// A question or decision overlay bound to a time window of a video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionPoint {
    pub id: i64,
    pub video_external_id: String,
    pub time_start: f64,
    pub time_end: f64,
    pub kind: InteractionKind,
    pub options: Vec<AnswerOption>,
    pub is_active: bool,
    pub language: String,
}

/// Reference to a video that owns at least one question
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct VideoRef {
    pub id: i64,
    pub external_id: String,
}
