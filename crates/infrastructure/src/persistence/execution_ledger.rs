//! SQLite execution ledger
//!
//! Each execution is stored as a JSON snapshot plus a few filter columns.
//! Updates are conditional on the stored row still being `running`, so a
//! terminal record can never be overwritten, and each update appends to
//! `execution_events` in the same transaction.

use application::{
    error::ApplicationError,
    ports::{ExecutionFilter, ExecutionLedgerPort},
};
use async_trait::async_trait;
use chrono::Utc;
use domain::{Execution, ExecutionId, ExperimentId, LedgerEvent, ResourceId};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, instrument, warn};

use super::error::{map_json_error, map_sqlx_error, timestamp};

#[derive(Debug, Clone)]
pub struct SqliteExecutionLedger {
    pool: SqlitePool,
}

impl SqliteExecutionLedger {
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn decode(record: &str) -> Result<Execution, ApplicationError> {
        serde_json::from_str(record).map_err(map_json_error)
    }
}

#[async_trait]
impl ExecutionLedgerPort for SqliteExecutionLedger {
    #[instrument(skip(self, execution), fields(execution_id = %execution.id))]
    async fn insert(&self, execution: &Execution) -> Result<(), ApplicationError> {
        let record = serde_json::to_string(execution).map_err(map_json_error)?;

        sqlx::query(
            r"
            INSERT INTO executions
                (id, experiment_id, triggered_by, status, current_phase, started_at, completed_at, record)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ",
        )
        .bind(execution.id.to_string())
        .bind(execution.experiment_id.to_string())
        .bind(&execution.triggered_by)
        .bind(execution.status.as_str())
        .bind(execution.current_phase.as_str())
        .bind(timestamp(execution.started_at))
        .bind(execution.completed_at.map(timestamp))
        .bind(record)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        debug!("Execution inserted");
        Ok(())
    }

    #[instrument(skip(self, execution, event), fields(execution_id = %execution.id, event = event.kind.name()))]
    async fn record(&self, execution: &Execution, event: &LedgerEvent) -> Result<(), ApplicationError> {
        let record = serde_json::to_string(execution).map_err(map_json_error)?;
        let payload = serde_json::to_string(event).map_err(map_json_error)?;
        let id = execution.id.to_string();

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let updated = sqlx::query(
            r"
            UPDATE executions
            SET status = $1, current_phase = $2, completed_at = $3, record = $4
            WHERE id = $5 AND status = 'running'
            ",
        )
        .bind(execution.status.as_str())
        .bind(execution.current_phase.as_str())
        .bind(execution.completed_at.map(timestamp))
        .bind(record)
        .bind(&id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?
        .rows_affected();

        if updated == 0 {
            let stored: Option<(String,)> = sqlx::query_as("SELECT status FROM executions WHERE id = $1")
                .bind(&id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
            return Err(match stored {
                Some((status,)) => {
                    warn!(stored_status = %status, "Rejected write to terminal execution");
                    ApplicationError::Conflict(format!("Execution {id} already {status}"))
                },
                None => ApplicationError::NotFound(format!("Execution {id}")),
            });
        }

        sqlx::query(
            r"
            INSERT INTO execution_events (execution_id, event, phase, status, recorded_at, payload)
            VALUES ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(&id)
        .bind(event.kind.name())
        .bind(event.phase.as_str())
        .bind(event.status.as_str())
        .bind(timestamp(event.recorded_at))
        .bind(payload)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    #[instrument(skip(self), fields(execution_id = %id))]
    async fn get(&self, id: ExecutionId) -> Result<Option<Execution>, ApplicationError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT record FROM executions WHERE id = $1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(|(record,)| Self::decode(&record)).transpose()
    }

    async fn list_by_experiment(
        &self,
        experiment_id: ExperimentId,
    ) -> Result<Vec<Execution>, ApplicationError> {
        self.list(&ExecutionFilter::for_experiment(experiment_id)).await
    }

    async fn list_active(&self) -> Result<Vec<Execution>, ApplicationError> {
        self.list(&ExecutionFilter::active()).await
    }

    #[instrument(skip(self))]
    async fn list(&self, filter: &ExecutionFilter) -> Result<Vec<Execution>, ApplicationError> {
        let mut query: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new("SELECT record FROM executions WHERE 1 = 1");

        if let Some(experiment_id) = filter.experiment_id {
            query.push(" AND experiment_id = ").push_bind(experiment_id.to_string());
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        if filter.active_only {
            query.push(" AND status = 'running'");
        }
        query.push(" ORDER BY started_at DESC, rowid DESC");
        if let Some(limit) = filter.limit {
            query
                .push(" LIMIT ")
                .push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }

        let rows: Vec<(String,)> = query
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        rows.iter().map(|(record,)| Self::decode(record)).collect()
    }

    #[instrument(skip(self), fields(execution_id = %id))]
    async fn events(&self, id: ExecutionId) -> Result<Vec<LedgerEvent>, ApplicationError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT payload FROM execution_events WHERE execution_id = $1 ORDER BY seq")
                .bind(id.to_string())
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        rows.iter()
            .map(|(payload,)| serde_json::from_str(payload).map_err(map_json_error))
            .collect()
    }

    #[instrument(skip(self, resources), fields(execution_id = %execution_id, resources = resources.len()))]
    async fn acquire_locks(
        &self,
        execution_id: ExecutionId,
        resources: &[ResourceId],
    ) -> Result<(), ApplicationError> {
        let holder = execution_id.to_string();
        let acquired_at = timestamp(Utc::now());
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        for resource in resources {
            // An existing row only changes when it already belongs to this execution
            let taken = sqlx::query(
                r"
                INSERT INTO resource_locks (resource_id, execution_id, acquired_at)
                VALUES ($1, $2, $3)
                ON CONFLICT(resource_id) DO UPDATE SET acquired_at = excluded.acquired_at
                WHERE resource_locks.execution_id = excluded.execution_id
                ",
            )
            .bind(resource.as_str())
            .bind(&holder)
            .bind(&acquired_at)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?
            .rows_affected();

            if taken == 0 {
                tx.rollback().await.map_err(map_sqlx_error)?;
                return Err(ApplicationError::Conflict(format!("{resource} is locked")));
            }
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        debug!("Resource locks acquired");
        Ok(())
    }

    #[instrument(skip(self), fields(execution_id = %execution_id))]
    async fn release_locks(&self, execution_id: ExecutionId) -> Result<(), ApplicationError> {
        let released = sqlx::query("DELETE FROM resource_locks WHERE execution_id = $1")
            .bind(execution_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?
            .rows_affected();

        debug!(released, "Resource locks released");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use domain::{LedgerEventKind, Phase};

    use super::*;
    use crate::persistence::AsyncDatabase;

    async fn setup() -> (AsyncDatabase, SqliteExecutionLedger) {
        let db = AsyncDatabase::in_memory().await.unwrap();
        db.migrate().await.unwrap();
        let ledger = SqliteExecutionLedger::new(db.pool().clone());
        (db, ledger)
    }

    fn resource(id: &str) -> ResourceId {
        ResourceId::new(id).unwrap()
    }

    async fn lock_count(db: &AsyncDatabase) -> i64 {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM resource_locks")
            .fetch_one(db.pool())
            .await
            .unwrap();
        count
    }

    #[tokio::test]
    async fn insert_record_and_get() {
        let (_db, ledger) = setup().await;
        let mut execution = Execution::new(ExperimentId::new(), "ci");
        ledger.insert(&execution).await.unwrap();

        execution.advance(Phase::Injection).unwrap();
        let event = LedgerEvent::new(&execution, LedgerEventKind::PhaseEntered { phase: Phase::Injection });
        ledger.record(&execution, &event).await.unwrap();

        let loaded = ledger.get(execution.id).await.unwrap().unwrap();
        assert_eq!(loaded, execution);
        assert_eq!(ledger.events(execution.id).await.unwrap(), vec![event]);
    }

    #[tokio::test]
    async fn terminal_record_cannot_be_overwritten() {
        let (_db, ledger) = setup().await;
        let mut execution = Execution::new(ExperimentId::new(), "ci");
        ledger.insert(&execution).await.unwrap();

        execution.abort("operator").unwrap();
        let finished = LedgerEvent::new(
            &execution,
            LedgerEventKind::Finished { status: execution.status },
        );
        ledger.record(&execution, &finished).await.unwrap();

        let err = ledger.record(&execution, &finished).await.unwrap_err();
        assert!(matches!(err, ApplicationError::Conflict(_)));
        assert_eq!(ledger.events(execution.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn record_for_unknown_execution_is_not_found() {
        let (_db, ledger) = setup().await;
        let execution = Execution::new(ExperimentId::new(), "ci");
        let event = LedgerEvent::new(&execution, LedgerEventKind::Created);
        let err = ledger.record(&execution, &event).await.unwrap_err();
        assert!(matches!(err, ApplicationError::NotFound(_)));
    }

    #[tokio::test]
    async fn filters_and_ordering() {
        let (_db, ledger) = setup().await;
        let experiment_id = ExperimentId::new();

        let running = Execution::new(experiment_id, "a");
        let mut failed = Execution::new(experiment_id, "b");
        let other = Execution::new(ExperimentId::new(), "c");
        for e in [&running, &failed, &other] {
            ledger.insert(e).await.unwrap();
        }
        failed.fail("boom").unwrap();
        let event = LedgerEvent::new(&failed, LedgerEventKind::Finished { status: failed.status });
        ledger.record(&failed, &event).await.unwrap();

        let by_experiment = ledger.list_by_experiment(experiment_id).await.unwrap();
        assert_eq!(by_experiment.len(), 2);
        assert_eq!(by_experiment[0].id, failed.id, "newest first");

        let active = ledger.list_active().await.unwrap();
        assert_eq!(active.len(), 2);
        assert!(active.iter().all(|e| !e.is_terminal()));

        let failed_only = ledger
            .list(&ExecutionFilter::default().with_status(domain::ExecutionStatus::Failed))
            .await
            .unwrap();
        assert_eq!(failed_only.len(), 1);

        let limited = ledger.list(&ExecutionFilter::default().with_limit(1)).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn locks_are_exclusive_and_all_or_nothing() {
        let (db, ledger) = setup().await;
        let first = ExecutionId::new();
        let second = ExecutionId::new();

        ledger.acquire_locks(first, &[resource("web-1"), resource("web-2")]).await.unwrap();

        let err = ledger
            .acquire_locks(second, &[resource("web-3"), resource("web-2")])
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::Conflict(ref m) if m.contains("web-2")));
        // web-3 was rolled back with the failed acquisition
        assert_eq!(lock_count(&db).await, 2);

        // re-acquire by the holder is fine
        ledger.acquire_locks(first, &[resource("web-1")]).await.unwrap();

        ledger.release_locks(first).await.unwrap();
        assert_eq!(lock_count(&db).await, 0);
        ledger.acquire_locks(second, &[resource("web-2")]).await.unwrap();
    }

    #[tokio::test]
    async fn locks_survive_a_new_ledger_instance() {
        let dir = tempfile::tempdir().unwrap();
        let config = crate::persistence::AsyncDatabaseConfig::file(dir.path().join("ledger.db"));
        let holder = ExecutionId::new();

        {
            let db = AsyncDatabase::new(&config).await.unwrap();
            db.migrate().await.unwrap();
            SqliteExecutionLedger::new(db.pool().clone())
                .acquire_locks(holder, &[resource("db-1")])
                .await
                .unwrap();
            db.close().await;
        }

        let db = AsyncDatabase::new(&config).await.unwrap();
        let ledger = SqliteExecutionLedger::new(db.pool().clone());
        let err = ledger
            .acquire_locks(ExecutionId::new(), &[resource("db-1")])
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::Conflict(_)));
    }
}
