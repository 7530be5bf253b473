use jobtrail_core::{Allocation, ALLOCATION_TOPIC, ALLOCATION_UPDATED_TYPE};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::DbError;

/// Keeps a row only if no later `AllocationUpdated` event exists for the same
/// allocation of the same job.
const LATEST_ONLY: &str = r#"
    AND NOT EXISTS (
        SELECT 1
        FROM nomad_events newer
        WHERE newer.topic = e.topic
          AND newer.type = e.type
          AND newer."index" > e."index"
          AND json_extract(newer.payload, '$.Allocation.ID') = json_extract(e.payload, '$.Allocation.ID')
          AND json_extract(newer.payload, '$.Allocation.JobID') = json_extract(e.payload, '$.Allocation.JobID')
    )
"#;

/// Read-side view that rebuilds allocation state from the Nomad event log.
///
/// Nothing is materialized: every call derives the answer from `nomad_events`,
/// which remains the only source of truth.
#[derive(Clone)]
pub struct AllocationProjector {
    pool: SqlitePool,
}

impl AllocationProjector {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Every allocation snapshot recorded for the job, oldest allocation first.
    pub async fn get_event_allocation_by_job_id(
        &self,
        job_id: Uuid,
    ) -> Result<Vec<Allocation>, DbError> {
        self.allocations_by_job_id(job_id, "").await
    }

    /// The current snapshot of each allocation of the job.
    pub async fn get_latest_event_allocation_by_job_id(
        &self,
        job_id: Uuid,
    ) -> Result<Vec<Allocation>, DbError> {
        self.allocations_by_job_id(job_id, LATEST_ONLY).await
    }

    async fn allocations_by_job_id(
        &self,
        job_id: Uuid,
        extra_where: &str,
    ) -> Result<Vec<Allocation>, DbError> {
        let sql = format!(
            r#"
            SELECT json_extract(e.payload, '$.Allocation') AS alloc
            FROM nomad_events e
            WHERE e.topic = ?
              AND e.type = ?
              AND json_extract(e.payload, '$.Allocation.JobID') = ?
              {extra_where}
            ORDER BY json_extract(e.payload, '$.Allocation.CreateTime') ASC, e."index" ASC
            "#
        );

        let rows: Vec<(Option<String>,)> = sqlx::query_as(&sql)
            .bind(ALLOCATION_TOPIC)
            .bind(ALLOCATION_UPDATED_TYPE)
            .bind(job_id.to_string())
            .fetch_all(&self.pool)
            .await?;

        let allocations = rows
            .into_iter()
            .map(|(raw,)| {
                let raw = raw.ok_or_else(|| {
                    DbError::InvalidData(format!("allocation event for job {job_id} without payload"))
                })?;
                Allocation::from_json(&raw)
                    .map_err(|e| DbError::decode(format!("allocation of job {job_id}"), e))
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            job_id = %job_id,
            count = allocations.len(),
            latest_only = !extra_where.is_empty(),
            "Projected allocations"
        );

        Ok(allocations)
    }
}
