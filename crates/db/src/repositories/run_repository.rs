use crate::error::DbError;
use crate::models::RunRow;
use jobtrail_core::Run;
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

const SELECT_RUNS: &str =
    "SELECT nomad_job_id, action_id, status, created_at, finished_at FROM runs";

/// Writes take a connection so callers can group them in one transaction.
#[derive(Clone)]
pub struct RunRepository {
    pool: SqlitePool,
}

impl RunRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, conn: &mut SqliteConnection, run: &Run) -> Result<(), DbError> {
        let row = RunRow::from(run);

        sqlx::query(
            r#"
            INSERT INTO runs (nomad_job_id, action_id, status, created_at, finished_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.nomad_job_id)
        .bind(&row.action_id)
        .bind(&row.status)
        .bind(row.created_at)
        .bind(row.finished_at)
        .execute(conn)
        .await?;

        Ok(())
    }

    pub async fn update(&self, conn: &mut SqliteConnection, run: &Run) -> Result<(), DbError> {
        let row = RunRow::from(run);

        let result = sqlx::query(
            r#"
            UPDATE runs
            SET action_id = ?, status = ?, finished_at = ?
            WHERE nomad_job_id = ?
            "#,
        )
        .bind(&row.action_id)
        .bind(&row.status)
        .bind(row.finished_at)
        .bind(&row.nomad_job_id)
        .execute(conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::RunNotFound(run.nomad_job_id));
        }

        Ok(())
    }

    pub async fn find_by_nomad_job_id(&self, id: Uuid) -> Result<Option<Run>, DbError> {
        let row: Option<RunRow> = sqlx::query_as(&format!("{SELECT_RUNS} WHERE nomad_job_id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(RunRow::try_into_domain).transpose()
    }

    pub async fn find_by_action_id(&self, action_id: Uuid) -> Result<Vec<Run>, DbError> {
        let rows: Vec<RunRow> = sqlx::query_as(&format!(
            "{SELECT_RUNS} WHERE action_id = ? ORDER BY created_at DESC"
        ))
        .bind(action_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(RunRow::try_into_domain).collect()
    }

    pub async fn find_all(&self) -> Result<Vec<Run>, DbError> {
        let rows: Vec<RunRow> = sqlx::query_as(&format!("{SELECT_RUNS} ORDER BY created_at DESC"))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(RunRow::try_into_domain).collect()
    }
}
