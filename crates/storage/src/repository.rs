//! Repository Implementation

use crate::StorageError;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::{debug, info};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS games (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    tag         TEXT    NOT NULL,
    attentive   INTEGER NOT NULL DEFAULT 0,
    distracted  INTEGER NOT NULL DEFAULT 0,
    correct     INTEGER NOT NULL DEFAULT 0,
    incorrect   INTEGER NOT NULL DEFAULT 0,
    happy       INTEGER NOT NULL DEFAULT 0,
    sad         INTEGER NOT NULL DEFAULT 0,
    surprise    INTEGER NOT NULL DEFAULT 0,
    angry       INTEGER NOT NULL DEFAULT 0,
    disgusted   INTEGER NOT NULL DEFAULT 0,
    fear        INTEGER NOT NULL DEFAULT 0,
    neutral     INTEGER NOT NULL DEFAULT 0,
    recorded_at TEXT    NOT NULL
)";

const SELECT_SUMMARY: &str = "SELECT id, tag, attentive, distracted, correct, incorrect, \
     happy, sad, surprise, angry, disgusted, fear, neutral, recorded_at FROM games";

/// Session summary as written at session end
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub tag: String,
    /// Whole seconds
    pub attentive: i64,
    pub distracted: i64,
    pub correct: i64,
    pub incorrect: i64,
    pub happy: i64,
    pub sad: i64,
    pub surprise: i64,
    pub angry: i64,
    pub disgusted: i64,
    pub fear: i64,
    pub neutral: i64,
}

/// Persisted summary with its row id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSummary {
    pub id: i64,
    pub recorded_at: DateTime<Utc>,
    #[serde(flatten)]
    pub summary: SummaryRecord,
}

/// Attentive / distracted seconds keyed by session id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttentionReport {
    pub attentive: BTreeMap<i64, i64>,
    pub distracted: BTreeMap<i64, i64>,
}

/// Emotion counts summed over every session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmotionTotals {
    pub happy: i64,
    pub sad: i64,
    pub fear: i64,
    pub angry: i64,
    pub disgusted: i64,
    pub surprise: i64,
    pub neutral: i64,
}

/// Quiz answers keyed by session id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizReport {
    pub correct: BTreeMap<i64, i64>,
    pub incorrect: BTreeMap<i64, i64>,
}

/// Repository for session summaries
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Open (creating if missing) the database at `url` and apply the schema
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StorageError> {
        info!("Opening summary database at {}", url);
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        // in-memory databases live as long as their connection
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let repo = Self { pool };
        repo.migrate().await?;
        Ok(repo)
    }

    async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        debug!("Schema up to date");
        Ok(())
    }

    /// Insert a summary and return its id
    pub async fn insert_summary(&self, record: &SummaryRecord) -> Result<i64, StorageError> {
        let recorded_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let result = sqlx::query(
            "INSERT INTO games (tag, attentive, distracted, correct, incorrect, \
             happy, sad, surprise, angry, disgusted, fear, neutral, recorded_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.tag)
        .bind(record.attentive)
        .bind(record.distracted)
        .bind(record.correct)
        .bind(record.incorrect)
        .bind(record.happy)
        .bind(record.sad)
        .bind(record.surprise)
        .bind(record.angry)
        .bind(record.disgusted)
        .bind(record.fear)
        .bind(record.neutral)
        .bind(recorded_at)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!("Inserted session summary with ID {}", id);
        Ok(id)
    }

    /// Fetch one summary by id
    pub async fn get_summary(&self, id: i64) -> Result<StoredSummary, StorageError> {
        let row = sqlx::query(&format!("{SELECT_SUMMARY} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StorageError::NotFound)?;
        summary_from_row(&row)
    }

    /// Most recent summaries first
    pub async fn list_summaries(&self, limit: u32) -> Result<Vec<StoredSummary>, StorageError> {
        let rows = sqlx::query(&format!("{SELECT_SUMMARY} ORDER BY id DESC LIMIT ?"))
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(summary_from_row).collect()
    }

    pub async fn attention_by_session(&self) -> Result<AttentionReport, StorageError> {
        let rows = sqlx::query("SELECT id, attentive, distracted FROM games ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        let mut report = AttentionReport::default();
        for row in rows {
            let id: i64 = row.try_get("id")?;
            report.attentive.insert(id, row.try_get("attentive")?);
            report.distracted.insert(id, row.try_get("distracted")?);
        }
        Ok(report)
    }

    /// Emotion counts summed over all sessions; zero when empty
    pub async fn emotion_totals(&self) -> Result<EmotionTotals, StorageError> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(happy), 0) AS happy, COALESCE(SUM(sad), 0) AS sad, \
             COALESCE(SUM(fear), 0) AS fear, COALESCE(SUM(angry), 0) AS angry, \
             COALESCE(SUM(disgusted), 0) AS disgusted, COALESCE(SUM(surprise), 0) AS surprise, \
             COALESCE(SUM(neutral), 0) AS neutral FROM games",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(EmotionTotals {
            happy: row.try_get("happy")?,
            sad: row.try_get("sad")?,
            fear: row.try_get("fear")?,
            angry: row.try_get("angry")?,
            disgusted: row.try_get("disgusted")?,
            surprise: row.try_get("surprise")?,
            neutral: row.try_get("neutral")?,
        })
    }

    pub async fn quiz_results(&self) -> Result<QuizReport, StorageError> {
        let rows = sqlx::query("SELECT id, correct, incorrect FROM games ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        let mut report = QuizReport::default();
        for row in rows {
            let id: i64 = row.try_get("id")?;
            report.correct.insert(id, row.try_get("correct")?);
            report.incorrect.insert(id, row.try_get("incorrect")?);
        }
        Ok(report)
    }

    /// Number of stored summaries
    pub async fn count(&self) -> Result<i64, StorageError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM games")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("n")?)
    }

    /// Close the pool; later queries fail
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn summary_from_row(row: &SqliteRow) -> Result<StoredSummary, StorageError> {
    let recorded_at: String = row.try_get("recorded_at")?;
    let recorded_at = DateTime::parse_from_rfc3339(&recorded_at)
        .map_err(|e| StorageError::DatabaseError(format!("bad recorded_at {recorded_at:?}: {e}")))?
        .with_timezone(&Utc);

    Ok(StoredSummary {
        id: row.try_get("id")?,
        recorded_at,
        summary: SummaryRecord {
            tag: row.try_get("tag")?,
            attentive: row.try_get("attentive")?,
            distracted: row.try_get("distracted")?,
            correct: row.try_get("correct")?,
            incorrect: row.try_get("incorrect")?,
            happy: row.try_get("happy")?,
            sad: row.try_get("sad")?,
            surprise: row.try_get("surprise")?,
            angry: row.try_get("angry")?,
            disgusted: row.try_get("disgusted")?,
            fear: row.try_get("fear")?,
            neutral: row.try_get("neutral")?,
        },
    })
}
