//! Videos domain - lookups and duration updates for registered content

use sqlx::{Executor, PgPool, Postgres};

use crate::models::VideoMediaItem;
use crate::services::backfill::VideoCatalog;

/// Find a video by its external (platform) identifier
pub async fn find_by_external_id<'e, E>(
    executor: E,
    external_id: &str,
) -> Result<Option<VideoMediaItem>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        SELECT id, external_id, content, duration::BIGINT AS duration_secs
        FROM video_items
        WHERE external_id = $1
        "#,
    )
    .bind(external_id)
    .fetch_optional(executor)
    .await
}

/// Videos whose canonical duration has not been resolved yet
pub async fn list_without_duration<'e, E>(executor: E) -> Result<Vec<VideoMediaItem>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        SELECT id, external_id, content, duration::BIGINT AS duration_secs
        FROM video_items
        WHERE duration IS NULL
        ORDER BY id
        "#,
    )
    .fetch_all(executor)
    .await
}

pub async fn list_all<'e, E>(executor: E) -> Result<Vec<VideoMediaItem>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        SELECT id, external_id, content, duration::BIGINT AS duration_secs
        FROM video_items
        ORDER BY id
        "#,
    )
    .fetch_all(executor)
    .await
}

/// `video_items.duration` is an INTEGER column.
fn duration_column(duration_secs: u64) -> Result<i32, sqlx::Error> {
    i32::try_from(duration_secs).map_err(|e| sqlx::Error::Encode(Box::new(e)))
}

/// Store a resolved canonical duration on the video row
pub async fn update_duration<'e, E>(
    executor: E,
    video_id: i64,
    duration_secs: u64,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let duration = duration_column(duration_secs)?;

    sqlx::query(
        r#"
        UPDATE video_items
        SET duration = $1
        WHERE id = $2
        "#,
    )
    .bind(duration)
    .bind(video_id)
    .execute(executor)
    .await?;

    Ok(())
}

impl VideoCatalog for PgPool {
    async fn videos_without_duration(&self) -> Result<Vec<VideoMediaItem>, sqlx::Error> {
        list_without_duration(self).await
    }

    async fn all_videos(&self) -> Result<Vec<VideoMediaItem>, sqlx::Error> {
        list_all(self).await
    }

    async fn store_duration(&self, video_id: i64, seconds: u64) -> Result<(), sqlx::Error> {
        update_duration(self, video_id, seconds).await
    }
}
