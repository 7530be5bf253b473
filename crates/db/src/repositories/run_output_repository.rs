use crate::error::DbError;
use crate::models::RunOutputRow;
use jobtrail_core::RunOutput;
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

#[derive(Clone)]
pub struct RunOutputRepository {
    pool: SqlitePool,
}

impl RunOutputRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        conn: &mut SqliteConnection,
        run_id: Uuid,
        output: &RunOutput,
    ) -> Result<(), DbError> {
        let row = RunOutputRow::try_from_domain(output)?;

        sqlx::query("INSERT INTO run_outputs (run_id, success, failure) VALUES (?, ?, ?)")
            .bind(run_id.to_string())
            .bind(&row.success)
            .bind(&row.failure)
            .execute(conn)
            .await?;

        Ok(())
    }

    pub async fn find_by_run_id(&self, run_id: Uuid) -> Result<Option<RunOutput>, DbError> {
        let row: Option<RunOutputRow> =
            sqlx::query_as("SELECT success, failure FROM run_outputs WHERE run_id = ?")
                .bind(run_id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        row.map(|r| r.try_into_domain(run_id)).transpose()
    }

    /// Deletes the output of a run and hands back what was removed.
    pub async fn delete(
        &self,
        conn: &mut SqliteConnection,
        run_id: Uuid,
    ) -> Result<Option<RunOutput>, DbError> {
        let row: Option<RunOutputRow> =
            sqlx::query_as("DELETE FROM run_outputs WHERE run_id = ? RETURNING success, failure")
                .bind(run_id.to_string())
                .fetch_optional(conn)
                .await?;

        row.map(|r| r.try_into_domain(run_id)).transpose()
    }
}
