use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "running" => Ok(Self::Running),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(CoreError::InvalidRunStatus(other.to_string())),
        }
    }

    pub fn is_finished(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// One Nomad job launched on behalf of an action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Run {
    pub nomad_job_id: Uuid,
    pub action_id: Uuid,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Run {
    pub fn new(nomad_job_id: Uuid, action_id: Uuid) -> Self {
        Self {
            nomad_job_id,
            action_id,
            status: RunStatus::default(),
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn end(&mut self, status: RunStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }

    pub fn cancel(&mut self) {
        self.end(RunStatus::Cancelled);
    }
}

/// Terminal result a run publishes once its job finishes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RunOutput {
    pub success: Option<serde_json::Value>,
    pub failure: Option<serde_json::Value>,
}

impl RunOutput {
    pub fn success(value: serde_json::Value) -> Self {
        Self {
            success: Some(value),
            failure: None,
        }
    }

    pub fn failure(value: serde_json::Value) -> Self {
        Self {
            success: None,
            failure: Some(value),
        }
    }
}
