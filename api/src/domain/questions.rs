//! Questions domain - interaction points and their answer options

use sqlx::{Executor, PgPool, Postgres};
use std::collections::HashMap;

use super::videos;
use crate::models::{AnswerOption, InteractionKind, InteractionPoint, VideoRef};
use crate::services::validation::QuestionSource;

#[derive(sqlx::FromRow)]
struct QuestionRow {
    id: i64,
    external_id: String,
    time_start: f64,
    time_end: f64,
    kind: String,
    language_code: String,
    is_active: bool,
}

#[derive(sqlx::FromRow)]
struct AnswerOptionRow {
    question_id: i64,
    id: i64,
    text: String,
    is_correct: bool,
    option_order: i32,
}

/// Every video that owns at least one question
pub async fn list_videos_with_questions<'e, E>(executor: E) -> Result<Vec<VideoRef>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        SELECT v.id, v.external_id
        FROM video_items v
        WHERE EXISTS (SELECT 1 FROM questions q WHERE q.video_item_id = v.id)
        ORDER BY v.id
        "#,
    )
    .fetch_all(executor)
    .await
}

/// Questions of one video ordered by start time, with their answer options.
/// Returns `None` when no video has this external id.
pub async fn list_questions_for_video(
    db: &PgPool,
    external_id: &str,
    active_only: bool,
) -> Result<Option<Vec<InteractionPoint>>, sqlx::Error> {
    let video: Option<(i64,)> = sqlx::query_as("SELECT id FROM video_items WHERE external_id = $1")
        .bind(external_id)
        .fetch_optional(db)
        .await?;

    let Some((video_id,)) = video else {
        return Ok(None);
    };

    let rows: Vec<QuestionRow> = sqlx::query_as(
        r#"
        SELECT q.id, v.external_id, q.time_start::FLOAT8 AS time_start, q.time_end::FLOAT8 AS time_end,
               q.type AS kind, q.language_code, q.is_active
        FROM questions q
        JOIN video_items v ON v.id = q.video_item_id
        WHERE q.video_item_id = $1 AND ($2 = FALSE OR q.is_active)
        ORDER BY q.time_start ASC, q.id ASC
        "#,
    )
    .bind(video_id)
    .bind(active_only)
    .fetch_all(db)
    .await?;

    if rows.is_empty() {
        return Ok(Some(Vec::new()));
    }

    let question_ids: Vec<i64> = rows.iter().map(|r| r.id).collect();

    // Batch fetch answer options for all questions
    let option_rows: Vec<AnswerOptionRow> = sqlx::query_as(
        r#"
        SELECT question_id, id, text, is_correct, option_order
        FROM answer_options
        WHERE question_id = ANY($1)
        ORDER BY question_id, option_order ASC
        "#,
    )
    .bind(&question_ids)
    .fetch_all(db)
    .await?;

    let mut options_by_question: HashMap<i64, Vec<AnswerOption>> = HashMap::new();
    for row in option_rows {
        options_by_question
            .entry(row.question_id)
            .or_default()
            .push(AnswerOption {
                id: row.id,
                text: row.text,
                is_correct: row.is_correct,
                order: row.option_order,
            });
    }

    let points = rows
        .into_iter()
        .map(|row| InteractionPoint {
            id: row.id,
            video_external_id: row.external_id,
            time_start: row.time_start,
            time_end: row.time_end,
            kind: InteractionKind::from_db(&row.kind),
            options: options_by_question.remove(&row.id).unwrap_or_default(),
            is_active: row.is_active,
            language: row.language_code,
        })
        .collect();

    Ok(Some(points))
}

impl QuestionSource for PgPool {
    async fn videos_with_questions(&self) -> Result<Vec<VideoRef>, sqlx::Error> {
        list_videos_with_questions(self).await
    }

    async fn questions_for_video(
        &self,
        external_id: &str,
    ) -> Result<Option<Vec<InteractionPoint>>, sqlx::Error> {
        list_questions_for_video(self, external_id, false).await
    }

    async fn stored_duration(&self, external_id: &str) -> Result<Option<u64>, sqlx::Error> {
        let video = videos::find_by_external_id(self, external_id).await?;
        Ok(video
            .and_then(|v| v.duration_secs)
            .and_then(|secs| u64::try_from(secs).ok()))
    }
}
