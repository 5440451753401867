use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::info;

use super::{NewVideo, Quiz, StageUpdate, UpdateOutcome, Video, VideoStore};
use crate::pipeline::types::{GenerationMode, VideoStatus};

pub struct SqliteVideoStore {
    pool: SqlitePool,
}

impl SqliteVideoStore {
    pub async fn new(database_url: &str) -> Result<Self> {
        info!("Initializing SQLite video store at {}", database_url);
        let pool = SqlitePool::connect(database_url).await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS videos (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT,
                source_url TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'Pending',
                generation_mode TEXT NOT NULL DEFAULT 'manual',
                transcript TEXT,
                ocr_text TEXT,
                summary TEXT,
                last_error TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS quizzes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                video_id INTEGER NOT NULL UNIQUE,
                title TEXT,
                quiz_text TEXT
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    fn row_to_video(&self, row: sqlx::sqlite::SqliteRow) -> Result<Video> {
        let status: String = row.get("status");
        let status = VideoStatus::try_from(status.as_str())
            .map_err(|e| anyhow::anyhow!("corrupt status column: {}", e))?;
        let mode: String = row.get("generation_mode");
        let generation_mode = GenerationMode::try_from(mode.as_str())
            .map_err(|e| anyhow::anyhow!("corrupt generation_mode column: {}", e))?;

        Ok(Video {
            id: row.get("id"),
            title: row.get("title"),
            source_url: row.get("source_url"),
            status,
            generation_mode,
            transcript: row.get("transcript"),
            ocr_text: row.get("ocr_text"),
            summary: row.get("summary"),
            last_error: row.get("last_error"),
            created_at: DateTime::parse_from_rfc3339(row.get("created_at"))?.with_timezone(&Utc),
            updated_at: DateTime::parse_from_rfc3339(row.get("updated_at"))?.with_timezone(&Utc),
        })
    }
}

#[async_trait]
impl VideoStore for SqliteVideoStore {
    async fn create(&self, video: &NewVideo) -> Result<i64> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            r#"
            INSERT INTO videos
            (title, source_url, status, generation_mode, ocr_text, created_at, updated_at)
            VALUES (?, ?, 'Pending', ?, ?, ?, ?)
            "#,
        )
        .bind(&video.title)
        .bind(&video.source_url)
        .bind(video.generation_mode.to_string())
        .bind(&video.ocr_text)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn get(&self, video_id: i64) -> Result<Option<Video>> {
        let row = sqlx::query("SELECT * FROM videos WHERE id = ?")
            .bind(video_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(match row {
            Some(row) => Some(self.row_to_video(row)?),
            None => None,
        })
    }

    async fn update_stage(
        &self,
        video_id: i64,
        update: StageUpdate,
        expected_prior: &[VideoStatus],
    ) -> Result<UpdateOutcome> {
        if expected_prior.is_empty() {
            anyhow::bail!("update_stage requires at least one expected prior status");
        }

        // COALESCE keeps columns the caller did not set; the status IN
        // clause is the row-level concurrency guard.
        let placeholders = vec!["?"; expected_prior.len()].join(", ");
        let sql = format!(
            r#"
            UPDATE videos
            SET status = COALESCE(?, status),
                transcript = COALESCE(?, transcript),
                summary = COALESCE(?, summary),
                last_error = COALESCE(?, last_error),
                updated_at = ?
            WHERE id = ? AND status IN ({})
            "#,
            placeholders
        );

        let mut query = sqlx::query(&sql)
            .bind(update.status.map(|s| s.to_string()))
            .bind(&update.transcript)
            .bind(&update.summary)
            .bind(&update.last_error)
            .bind(Utc::now().to_rfc3339())
            .bind(video_id);
        for status in expected_prior {
            query = query.bind(status.to_string());
        }

        let result = query.execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            Ok(UpdateOutcome::Stale)
        } else {
            Ok(UpdateOutcome::Applied)
        }
    }

    async fn apply_submission(
        &self,
        video_id: i64,
        source_url: &str,
        mode: GenerationMode,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE videos
            SET source_url = ?, generation_mode = ?, updated_at = ?
            WHERE id = ? AND status = 'Pending'
            "#,
        )
        .bind(source_url)
        .bind(mode.to_string())
        .bind(Utc::now().to_rfc3339())
        .bind(video_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_quiz(&self, video_id: i64) -> Result<Option<Quiz>> {
        let row = sqlx::query("SELECT * FROM quizzes WHERE video_id = ?")
            .bind(video_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| Quiz {
            id: row.get("id"),
            video_id: row.get("video_id"),
            title: row.get("title"),
            quiz_text: row.get("quiz_text"),
        }))
    }

    async fn upsert_quiz(&self, video_id: i64, title: Option<&str>, text: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO quizzes (video_id, title, quiz_text)
            VALUES (?, ?, ?)
            ON CONFLICT(video_id) DO UPDATE SET
                title = excluded.title,
                quiz_text = excluded.quiz_text
            "#,
        )
        .bind(video_id)
        .bind(title)
        .bind(text)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
