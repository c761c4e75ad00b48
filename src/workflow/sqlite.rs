//! SQLite-backed workflow repository.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

use super::repository::{WorkflowCommit, WorkflowRepository, WorkflowSnapshot};
use super::state::WorkflowState;
use crate::error::StoreError;
use crate::generation::GenerationHistoryEntry;

const SCHEMA_STATEMENTS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS finetune_workflows (
        id            TEXT    PRIMARY KEY,
        dataset_id    TEXT    NOT NULL,
        current_step  TEXT    NOT NULL,
        state_json    TEXT    NOT NULL,
        created_at    INTEGER NOT NULL,
        updated_at    INTEGER NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_workflows_dataset ON finetune_workflows(dataset_id, created_at)",
    r#"CREATE TABLE IF NOT EXISTS workflow_snapshots (
        snapshot_id   TEXT    PRIMARY KEY,
        workflow_id   TEXT    NOT NULL,
        step          TEXT    NOT NULL,
        created_at    INTEGER NOT NULL,
        snapshot_json TEXT    NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_snapshots_workflow ON workflow_snapshots(workflow_id, created_at)",
    r#"CREATE TABLE IF NOT EXISTS generation_history (
        id            TEXT    PRIMARY KEY,
        workflow_id   TEXT    NOT NULL,
        round         INTEGER NOT NULL,
        recorded_at   INTEGER NOT NULL,
        entry_json    TEXT    NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_history_workflow ON generation_history(workflow_id, round)",
];

/// Workflow repository stored in a SQLite database.
#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    /// Open (creating if needed) a database such as `sqlite://finetune.db`
    /// or `sqlite::memory:`.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let in_memory = url.contains(":memory:");
        let mut opts = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .synchronous(SqliteSynchronous::Normal);
        if !in_memory {
            opts = opts.journal_mode(SqliteJournalMode::Wal);
        }

        // Each in-memory connection is its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 4 })
            .connect_with(opts)
            .await?;

        for statement in SCHEMA_STATEMENTS {
            sqlx::query(statement).execute(&pool).await?;
        }

        tracing::info!(url = url, "Workflow database opened");
        Ok(Self { pool })
    }

    fn decode_states(rows: Vec<sqlx::sqlite::SqliteRow>) -> Result<Vec<WorkflowState>, StoreError> {
        rows.into_iter()
            .map(|row| {
                let json: String = row.get("state_json");
                Ok(serde_json::from_str(&json)?)
            })
            .collect()
    }
}

#[async_trait]
impl WorkflowRepository for SqliteRepository {
    async fn load(&self, id: &str) -> Result<Option<WorkflowState>, StoreError> {
        let row = sqlx::query("SELECT state_json FROM finetune_workflows WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let json: String = row.get("state_json");
                Ok(Some(serde_json::from_str(&json)?))
            }
            None => Ok(None),
        }
    }

    async fn find_by_dataset(&self, dataset_id: &str) -> Result<Option<WorkflowState>, StoreError> {
        let rows = sqlx::query(
            "SELECT state_json FROM finetune_workflows WHERE dataset_id = ?1
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(dataset_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(Self::decode_states(rows)?.into_iter().next())
    }

    async fn list(&self) -> Result<Vec<WorkflowState>, StoreError> {
        let rows = sqlx::query("SELECT state_json FROM finetune_workflows ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        Self::decode_states(rows)
    }

    async fn commit(&self, commit: WorkflowCommit) -> Result<(), StoreError> {
        let state = &commit.state;
        let state_json = serde_json::to_string(state)?;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO finetune_workflows
                (id, dataset_id, current_step, state_json, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                current_step = excluded.current_step,
                state_json = excluded.state_json,
                updated_at = excluded.updated_at",
        )
        .bind(&state.id)
        .bind(&state.dataset_id)
        .bind(state.current_step.as_str())
        .bind(&state_json)
        .bind(state.created_at.timestamp_micros())
        .bind(state.updated_at.timestamp_micros())
        .execute(&mut *tx)
        .await?;

        if let Some(snapshot) = &commit.snapshot {
            sqlx::query(
                "INSERT INTO workflow_snapshots
                    (snapshot_id, workflow_id, step, created_at, snapshot_json)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(&snapshot.snapshot_id)
            .bind(&snapshot.workflow_id)
            .bind(snapshot.step.as_str())
            .bind(snapshot.created_at.timestamp_micros())
            .bind(serde_json::to_string(snapshot)?)
            .execute(&mut *tx)
            .await?;
        }

        if let Some(entry) = &commit.history {
            sqlx::query(
                "INSERT INTO generation_history (id, workflow_id, round, recorded_at, entry_json)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(&entry.id)
            .bind(&entry.workflow_id)
            .bind(entry.round.round as i64)
            .bind(entry.recorded_at.timestamp_micros())
            .bind(serde_json::to_string(entry)?)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM workflow_snapshots WHERE workflow_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM generation_history WHERE workflow_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM finetune_workflows WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn snapshots(&self, workflow_id: &str) -> Result<Vec<WorkflowSnapshot>, StoreError> {
        let rows = sqlx::query(
            "SELECT snapshot_json FROM workflow_snapshots WHERE workflow_id = ?1
             ORDER BY created_at ASC, rowid ASC",
        )
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| {
                let json: String = row.get("snapshot_json");
                Ok(serde_json::from_str(&json)?)
            })
            .collect()
    }

    async fn generation_history(
        &self,
        workflow_id: &str,
    ) -> Result<Vec<GenerationHistoryEntry>, StoreError> {
        let rows = sqlx::query(
            "SELECT entry_json FROM generation_history WHERE workflow_id = ?1
             ORDER BY recorded_at ASC, rowid ASC",
        )
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| {
                let json: String = row.get("entry_json");
                Ok(serde_json::from_str(&json)?)
            })
            .collect()
    }
}
