//! SQLite experiment registry

use application::{error::ApplicationError, ports::ExperimentRegistryPort};
use async_trait::async_trait;
use domain::{Experiment, ExperimentId};
use sqlx::SqlitePool;
use tracing::{debug, instrument};

use super::error::{map_json_error, map_sqlx_error, timestamp};

/// Experiment definitions stored as JSON snapshots
#[derive(Debug, Clone)]
pub struct SqliteExperimentRegistry {
    pool: SqlitePool,
}

impl SqliteExperimentRegistry {
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExperimentRegistryPort for SqliteExperimentRegistry {
    #[instrument(skip(self, experiment), fields(experiment_id = %experiment.id))]
    async fn create(&self, experiment: &Experiment) -> Result<(), ApplicationError> {
        let definition = serde_json::to_string(experiment).map_err(map_json_error)?;

        sqlx::query(
            r"
            INSERT INTO experiments (id, name, failure_type, definition, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(experiment.id.to_string())
        .bind(&experiment.name)
        .bind(experiment.failure_type.as_str())
        .bind(definition)
        .bind(timestamp(experiment.created_at))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        debug!("Experiment stored");
        Ok(())
    }

    #[instrument(skip(self), fields(experiment_id = %id))]
    async fn get(&self, id: ExperimentId) -> Result<Option<Experiment>, ApplicationError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT definition FROM experiments WHERE id = $1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(|(definition,)| serde_json::from_str(&definition).map_err(map_json_error))
            .transpose()
    }

    #[instrument(skip(self))]
    async fn list(&self) -> Result<Vec<Experiment>, ApplicationError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT definition FROM experiments ORDER BY created_at DESC, rowid DESC")
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        rows.into_iter()
            .map(|(definition,)| serde_json::from_str(&definition).map_err(map_json_error))
            .collect()
    }
}
