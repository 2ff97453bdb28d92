//! Integration tests for the SQLite run journal
//!
//! Tests database operations using in-memory and on-disk SQLite databases.

use deep_research::config::DatabaseConfig;
use deep_research::error::StorageError;
use deep_research::research::{ResearchParams, ResearchResult, ResearchStep};
use deep_research::storage::{ResearchRun, RunStatus, RunStore, SqliteStorage, StepRecord};

/// Create an in-memory storage instance for testing
async fn create_test_storage() -> SqliteStorage {
    SqliteStorage::new_in_memory()
        .await
        .expect("Failed to create in-memory storage")
}

fn params(query: &str) -> ResearchParams {
    ResearchParams {
        query: query.to_string(),
        breadth: 2,
        max_depth: 1,
        language: "English".to_string(),
        search_language: None,
    }
}

#[cfg(test)]
mod run_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_create_and_get_run() {
        let storage = create_test_storage().await;

        let run = ResearchRun::new(&params("perovskite stability"));
        storage.create_run(&run).await.unwrap();

        let retrieved = storage.get_run(&run.id).await.unwrap().unwrap();
        assert_eq!(retrieved.id, run.id);
        assert_eq!(retrieved.query, "perovskite stability");
        assert_eq!(retrieved.breadth, 2);
        assert_eq!(retrieved.max_depth, 1);
        assert_eq!(retrieved.status, RunStatus::Running);
        assert!(retrieved.learnings.is_empty());
        assert!(!retrieved.is_finished());
    }

    #[tokio::test]
    async fn test_get_nonexistent_run() {
        let storage = create_test_storage().await;

        let result = storage.get_run("nonexistent-id").await.unwrap();
        assert!(result.is_none(), "Should return None for nonexistent run");
    }

    #[tokio::test]
    async fn test_complete_run_records_result() {
        let storage = create_test_storage().await;

        let run = ResearchRun::new(&params("q"));
        storage.create_run(&run).await.unwrap();

        let result = ResearchResult::new(
            vec!["Learning one".to_string(), "Learning two".to_string()],
            vec!["https://a.example".to_string()],
        );
        storage
            .complete_run(&run.id, &result, Some("# Report"))
            .await
            .unwrap();

        let retrieved = storage.get_run(&run.id).await.unwrap().unwrap();
        assert_eq!(retrieved.status, RunStatus::Completed);
        assert_eq!(retrieved.learnings, result.learnings);
        assert_eq!(retrieved.visited_urls, result.visited_urls);
        assert_eq!(retrieved.report.as_deref(), Some("# Report"));
        assert!(retrieved.error.is_none());
        assert!(retrieved.updated_at >= retrieved.created_at);
    }

    #[tokio::test]
    async fn test_fail_run_records_error() {
        let storage = create_test_storage().await;

        let run = ResearchRun::new(&params("q"));
        storage.create_run(&run).await.unwrap();
        storage.fail_run(&run.id, "search quota exhausted").await.unwrap();

        let retrieved = storage.get_run(&run.id).await.unwrap().unwrap();
        assert_eq!(retrieved.status, RunStatus::Failed);
        assert_eq!(retrieved.error.as_deref(), Some("search quota exhausted"));
        assert!(retrieved.is_finished());
    }

    #[tokio::test]
    async fn test_finishing_unknown_run_is_not_found() {
        let storage = create_test_storage().await;

        let err = storage
            .complete_run("missing", &ResearchResult::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::RunNotFound { .. }));

        let err = storage.fail_run("missing", "boom").await.unwrap_err();
        assert!(matches!(err, StorageError::RunNotFound { run_id } if run_id == "missing"));
    }

    #[tokio::test]
    async fn test_list_runs_newest_first_with_limit() {
        let storage = create_test_storage().await;

        let mut ids = Vec::new();
        for query in ["first", "second", "third"] {
            let run = ResearchRun::new(&params(query));
            storage.create_run(&run).await.unwrap();
            ids.push(run.id);
        }

        let runs = storage.list_runs(2).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].query, "third");
        assert_eq!(runs[1].query, "second");

        let all = storage.list_runs(10).await.unwrap();
        assert_eq!(all.len(), 3);
    }
}

#[cfg(test)]
mod step_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_append_and_get_steps_in_order() {
        let storage = create_test_storage().await;

        let run = ResearchRun::new(&params("q"));
        storage.create_run(&run).await.unwrap();

        let steps = vec![
            ResearchStep::Searching {
                node_id: "0-0".to_string(),
                query: "alpha".to_string(),
            },
            ResearchStep::Error {
                node_id: "0-1".to_string(),
                message: "search failed".to_string(),
            },
            ResearchStep::Complete {
                learnings: vec!["L".to_string()],
                visited_urls: vec![],
            },
        ];
        // Append out of order; reads come back by sequence.
        for (seq, step) in steps.iter().enumerate().rev() {
            storage
                .append_step(&StepRecord::new(&run.id, seq as i64, step))
                .await
                .unwrap();
        }

        let records = storage.get_steps(&run.id).await.unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(
            records.iter().map(|r| r.seq).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert_eq!(records[0].kind, "searching");
        assert_eq!(records[1].node_id, "0-1");
        assert_eq!(records[2].node_id, "0");

        let decoded: Vec<ResearchStep> = records.iter().filter_map(|r| r.step()).collect();
        assert_eq!(decoded, steps);
    }

    #[tokio::test]
    async fn test_duplicate_sequence_is_rejected() {
        let storage = create_test_storage().await;

        let run = ResearchRun::new(&params("q"));
        storage.create_run(&run).await.unwrap();

        let step = ResearchStep::Searching {
            node_id: "0-0".to_string(),
            query: "alpha".to_string(),
        };
        storage
            .append_step(&StepRecord::new(&run.id, 0, &step))
            .await
            .unwrap();
        let again = storage.append_step(&StepRecord::new(&run.id, 0, &step)).await;
        assert!(again.is_err());
    }

    #[tokio::test]
    async fn test_steps_of_unknown_run_are_empty() {
        let storage = create_test_storage().await;
        assert!(storage.get_steps("missing").await.unwrap().is_empty());
    }
}

#[cfg(test)]
mod file_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_on_disk_database_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            path: dir.path().join("nested").join("research.db"),
            max_connections: 2,
        };

        let run = ResearchRun::new(&params("durable"));
        {
            let storage = SqliteStorage::new(&config).await.unwrap();
            storage.create_run(&run).await.unwrap();
            storage.pool().close().await;
        }

        let reopened = SqliteStorage::new(&config).await.unwrap();
        let retrieved = reopened.get_run(&run.id).await.unwrap().unwrap();
        assert_eq!(retrieved.query, "durable");
    }
}
