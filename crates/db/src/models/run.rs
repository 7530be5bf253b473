use chrono::{DateTime, Utc};
use jobtrail_core::{Run, RunOutput, RunStatus};
use uuid::Uuid;

use crate::error::DbError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RunRow {
    pub nomad_job_id: String,
    pub action_id: String,
    pub status: String,
    pub created_at: i64,
    pub finished_at: Option<i64>,
}

impl RunRow {
    pub fn try_into_domain(self) -> Result<Run, DbError> {
        let nomad_job_id = parse_uuid(&self.nomad_job_id, "nomad job id")?;
        let action_id = parse_uuid(&self.action_id, "action id")?;
        let status = RunStatus::parse(&self.status)
            .map_err(|e| DbError::decode(format!("status of run {nomad_job_id}"), e))?;

        Ok(Run {
            nomad_job_id,
            action_id,
            status,
            created_at: millis_to_datetime(self.created_at)?,
            finished_at: self.finished_at.map(millis_to_datetime).transpose()?,
        })
    }
}

impl From<&Run> for RunRow {
    fn from(run: &Run) -> Self {
        Self {
            nomad_job_id: run.nomad_job_id.to_string(),
            action_id: run.action_id.to_string(),
            status: run.status.as_str().to_string(),
            created_at: run.created_at.timestamp_millis(),
            finished_at: run.finished_at.map(|t| t.timestamp_millis()),
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RunOutputRow {
    pub success: Option<String>,
    pub failure: Option<String>,
}

impl RunOutputRow {
    pub fn try_into_domain(self, run_id: Uuid) -> Result<RunOutput, DbError> {
        let decode = |raw: Option<String>, which: &str| {
            raw.map(|s| serde_json::from_str(&s))
                .transpose()
                .map_err(|e| DbError::decode(format!("{which} output of run {run_id}"), e))
        };

        Ok(RunOutput {
            success: decode(self.success, "success")?,
            failure: decode(self.failure, "failure")?,
        })
    }

    pub fn try_from_domain(output: &RunOutput) -> Result<Self, DbError> {
        Ok(Self {
            success: output.success.as_ref().map(serde_json::to_string).transpose()?,
            failure: output.failure.as_ref().map(serde_json::to_string).transpose()?,
        })
    }
}

fn parse_uuid(raw: &str, what: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(raw).map_err(|e| DbError::decode(format!("{what} {raw:?}"), e))
}

fn millis_to_datetime(ms: i64) -> Result<DateTime<Utc>, DbError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| DbError::InvalidData(format!("timestamp {ms} out of range")))
}
