use chrono::{DateTime, Utc};
use jobtrail_core::{RunOutput, RunStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A lifecycle event together with delivery metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event: RunEvent,
}

impl EventEnvelope {
    pub fn new(event: RunEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum RunEvent {
    #[serde(rename = "run.created")]
    RunCreated { nomad_job_id: Uuid, action_id: Uuid },

    #[serde(rename = "run.updated")]
    RunUpdated {
        nomad_job_id: Uuid,
        status: RunStatus,
    },

    /// The run reached a final status. `output` is the result it produced, if any;
    /// it is removed from storage by the same transition.
    #[serde(rename = "run.ended")]
    RunEnded {
        nomad_job_id: Uuid,
        status: RunStatus,
        output: Option<RunOutput>,
    },

    /// The job was deregistered from Nomad before finishing on its own.
    #[serde(rename = "run.cancelled")]
    RunCancelled { nomad_job_id: Uuid },
}

impl RunEvent {
    pub fn nomad_job_id(&self) -> Uuid {
        match self {
            RunEvent::RunCreated { nomad_job_id, .. }
            | RunEvent::RunUpdated { nomad_job_id, .. }
            | RunEvent::RunEnded { nomad_job_id, .. }
            | RunEvent::RunCancelled { nomad_job_id } => *nomad_job_id,
        }
    }
}
