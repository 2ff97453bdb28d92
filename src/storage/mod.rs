//! Run journal persistence.
//!
//! The research engine never writes here itself. The binary attaches a
//! [`RunStore`] behind a progress channel so every [`ResearchStep`] of a run
//! is journaled alongside the run's final outcome.

mod sqlite;


pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageResult;
use crate::research::{ResearchParams, ResearchResult, ResearchStep};

/// Lifecycle state of a journaled run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Run is in progress.
    #[default]
    Running,
    /// Run finished and its result was recorded.
    Completed,
    /// Run aborted with an error.
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Running => write!(f, "running"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            _ => Err(format!("Unknown run status: {}", s)),
        }
    }
}

/// One research run and, once finished, its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchRun {
    /// Unique run identifier.
    pub id: String,
    /// The user's research query.
    pub query: String,
    /// Fan-out width at the root.
    pub breadth: usize,
    /// Recursion cutoff.
    pub max_depth: usize,
    /// Response language.
    pub language: String,
    /// Current lifecycle state.
    pub status: RunStatus,
    /// Final learnings, once completed.
    pub learnings: Vec<String>,
    /// Final visited URLs, once completed.
    pub visited_urls: Vec<String>,
    /// Final report, if one was written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,
    /// Failure message, if the run failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the run was started.
    pub created_at: DateTime<Utc>,
    /// When the run was last updated.
    pub updated_at: DateTime<Utc>,
}

impl ResearchRun {
    /// A new running run for `params`.
    pub fn new(params: &ResearchParams) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            query: params.query.clone(),
            breadth: params.breadth,
            max_depth: params.max_depth,
            language: params.language.clone(),
            status: RunStatus::Running,
            learnings: Vec::new(),
            visited_urls: Vec::new(),
            report: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the run has reached a terminal state.
    pub fn is_finished(&self) -> bool {
        self.status != RunStatus::Running
    }
}

/// One journaled progress event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Unique record identifier.
    pub id: String,
    /// Owning run.
    pub run_id: String,
    /// Position within the run, starting at 0.
    pub seq: i64,
    /// Node the event belongs to.
    pub node_id: String,
    /// Event type tag (`searching`, `node_complete`, ...).
    pub kind: String,
    /// The serialized event.
    pub payload: serde_json::Value,
    /// When the event was journaled.
    pub created_at: DateTime<Utc>,
}

impl StepRecord {
    /// Record `step` as event number `seq` of `run_id`.
    pub fn new(run_id: impl Into<String>, seq: i64, step: &ResearchStep) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            run_id: run_id.into(),
            seq,
            node_id: step.node_id().to_string(),
            kind: step.kind().to_string(),
            payload: serde_json::to_value(step).unwrap_or(serde_json::Value::Null),
            created_at: Utc::now(),
        }
    }

    /// Decode the payload back into a step.
    pub fn step(&self) -> Option<ResearchStep> {
        serde_json::from_value(self.payload.clone()).ok()
    }
}

/// Persistence for research runs and their progress events.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Insert a new run.
    async fn create_run(&self, run: &ResearchRun) -> StorageResult<()>;
    /// Append one progress event.
    async fn append_step(&self, step: &StepRecord) -> StorageResult<()>;
    /// Mark a run completed with its result and optional report.
    async fn complete_run(
        &self,
        run_id: &str,
        result: &ResearchResult,
        report: Option<&str>,
    ) -> StorageResult<()>;
    /// Mark a run failed.
    async fn fail_run(&self, run_id: &str, error: &str) -> StorageResult<()>;
    /// Get a run by ID.
    async fn get_run(&self, run_id: &str) -> StorageResult<Option<ResearchRun>>;
    /// Most recent runs first.
    async fn list_runs(&self, limit: usize) -> StorageResult<Vec<ResearchRun>>;
    /// All events of a run in journal order.
    async fn get_steps(&self, run_id: &str) -> StorageResult<Vec<StepRecord>>;
}
