use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{info, warn};

use super::{ResearchRun, RunStatus, RunStore, StepRecord};
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};
use crate::research::ResearchResult;

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed run journal
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (creating if needed) the database at `config.path`
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Private in-memory database, for tests and throwaway runs
    pub async fn new_in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| {
            StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            }
        })?;

        // Every connection to :memory: is its own database, so pin one.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to open in-memory database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR.run(&self.pool).await.map_err(|e| StorageError::Migration {
            message: format!("Failed to run migrations: {}", e),
        })?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn encode_list(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

#[async_trait]
impl RunStore for SqliteStorage {
    async fn create_run(&self, run: &ResearchRun) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO research_runs (id, query, breadth, max_depth, language, status,
                learnings, visited_urls, report, error, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&run.id)
        .bind(&run.query)
        .bind(run.breadth as i64)
        .bind(run.max_depth as i64)
        .bind(&run.language)
        .bind(run.status.to_string())
        .bind(encode_list(&run.learnings))
        .bind(encode_list(&run.visited_urls))
        .bind(&run.report)
        .bind(&run.error)
        .bind(timestamp(run.created_at))
        .bind(timestamp(run.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn append_step(&self, step: &StepRecord) -> StorageResult<()> {
        let payload = serde_json::to_string(&step.payload).map_err(|e| StorageError::Query {
            message: format!("Failed to encode step payload: {}", e),
        })?;

        sqlx::query(
            r#"
            INSERT INTO research_steps (id, run_id, seq, node_id, kind, payload, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&step.id)
        .bind(&step.run_id)
        .bind(step.seq)
        .bind(&step.node_id)
        .bind(&step.kind)
        .bind(&payload)
        .bind(timestamp(step.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn complete_run(
        &self,
        run_id: &str,
        result: &ResearchResult,
        report: Option<&str>,
    ) -> StorageResult<()> {
        let outcome = sqlx::query(
            r#"
            UPDATE research_runs
            SET status = ?, learnings = ?, visited_urls = ?, report = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(RunStatus::Completed.to_string())
        .bind(encode_list(&result.learnings))
        .bind(encode_list(&result.visited_urls))
        .bind(report)
        .bind(timestamp(Utc::now()))
        .bind(run_id)
        .execute(&self.pool)
        .await?;

        if outcome.rows_affected() == 0 {
            return Err(StorageError::RunNotFound {
                run_id: run_id.to_string(),
            });
        }
        Ok(())
    }

    async fn fail_run(&self, run_id: &str, error: &str) -> StorageResult<()> {
        let outcome = sqlx::query(
            r#"
            UPDATE research_runs
            SET status = ?, error = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(RunStatus::Failed.to_string())
        .bind(error)
        .bind(timestamp(Utc::now()))
        .bind(run_id)
        .execute(&self.pool)
        .await?;

        if outcome.rows_affected() == 0 {
            return Err(StorageError::RunNotFound {
                run_id: run_id.to_string(),
            });
        }
        Ok(())
    }

    async fn get_run(&self, run_id: &str) -> StorageResult<Option<ResearchRun>> {
        let row: Option<RunRow> = sqlx::query_as(
            r#"
            SELECT id, query, breadth, max_depth, language, status, learnings,
                visited_urls, report, error, created_at, updated_at
            FROM research_runs
            WHERE id = ?
            "#,
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn list_runs(&self, limit: usize) -> StorageResult<Vec<ResearchRun>> {
        let rows: Vec<RunRow> = sqlx::query_as(
            r#"
            SELECT id, query, breadth, max_depth, language, status, learnings,
                visited_urls, report, error, created_at, updated_at
            FROM research_runs
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn get_steps(&self, run_id: &str) -> StorageResult<Vec<StepRecord>> {
        let rows: Vec<StepRow> = sqlx::query_as(
            r#"
            SELECT id, run_id, seq, node_id, kind, payload, created_at
            FROM research_steps
            WHERE run_id = ?
            ORDER BY seq ASC
            "#,
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }
}

// Internal row types for SQLx mapping
#[derive(sqlx::FromRow)]
struct RunRow {
    id: String,
    query: String,
    breadth: i64,
    max_depth: i64,
    language: String,
    status: String,
    learnings: Option<String>,
    visited_urls: Option<String>,
    report: Option<String>,
    error: Option<String>,
    created_at: String,
    updated_at: String,
}

fn decode_list(raw: Option<String>) -> Vec<String> {
    raw.and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}

impl From<RunRow> for ResearchRun {
    fn from(row: RunRow) -> Self {
        let status = RunStatus::from_str(&row.status).unwrap_or_else(|e| {
            warn!(run_id = %row.id, error = %e, "Unreadable run status");
            RunStatus::Failed
        });

        Self {
            id: row.id,
            query: row.query,
            breadth: row.breadth.max(0) as usize,
            max_depth: row.max_depth.max(0) as usize,
            language: row.language,
            status,
            learnings: decode_list(row.learnings),
            visited_urls: decode_list(row.visited_urls),
            report: row.report,
            error: row.error,
            created_at: parse_timestamp(&row.created_at),
            updated_at: parse_timestamp(&row.updated_at),
        }
    }
}

#[derive(sqlx::FromRow)]
struct StepRow {
    id: String,
    run_id: String,
    seq: i64,
    node_id: String,
    kind: String,
    payload: String,
    created_at: String,
}

impl From<StepRow> for StepRecord {
    fn from(row: StepRow) -> Self {
        Self {
            id: row.id,
            run_id: row.run_id,
            seq: row.seq,
            node_id: row.node_id,
            kind: row.kind,
            payload: serde_json::from_str(&row.payload).unwrap_or(serde_json::Value::Null),
            created_at: parse_timestamp(&row.created_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_round_trip() {
        let now = Utc::now();
        let parsed = parse_timestamp(&timestamp(now));
        assert_eq!(parsed.timestamp_micros(), now.timestamp_micros());
    }

    #[test]
    fn test_decode_list_tolerates_garbage() {
        assert!(decode_list(None).is_empty());
        assert!(decode_list(Some("not json".to_string())).is_empty());
        assert_eq!(decode_list(Some(r#"["a"]"#.to_string())), vec!["a"]);
    }
}
