use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::Result;

/// Snapshot of a Nomad allocation as embedded in an `AllocationUpdated` event.
///
/// Only the fields this system reads are modelled; unknown fields are ignored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Allocation {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "NodeID", default)]
    pub node_id: String,
    #[serde(rename = "JobID")]
    pub job_id: String,
    #[serde(default)]
    pub task_group: String,
    #[serde(default)]
    pub desired_status: String,
    #[serde(default)]
    pub client_status: String,
    #[serde(default)]
    pub client_description: String,
    #[serde(default)]
    pub task_states: Option<HashMap<String, TaskState>>,
    #[serde(default)]
    pub create_index: u64,
    #[serde(default)]
    pub modify_index: u64,
    /// Nanoseconds since the Unix epoch.
    #[serde(default)]
    pub create_time: i64,
    #[serde(default)]
    pub modify_time: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct TaskState {
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub failed: bool,
    #[serde(default)]
    pub restarts: u64,
}

impl Allocation {
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_allocation() {
        let raw = r#"{
            "ID": "a1",
            "JobID": "job-1",
            "TaskGroup": "build",
            "ClientStatus": "running",
            "TaskStates": {"main": {"State": "running", "Failed": false, "Restarts": 1}},
            "CreateTime": 1700000000000000000,
            "Unknown": {"ignored": true}
        }"#;
        let alloc = Allocation::from_json(raw).unwrap();
        assert_eq!(alloc.id, "a1");
        assert_eq!(alloc.task_group, "build");
        assert_eq!(alloc.create_time, 1_700_000_000_000_000_000);
        assert_eq!(alloc.task_states.unwrap()["main"].restarts, 1);
    }

    #[test]
    fn test_null_task_states() {
        let alloc = Allocation::from_json(r#"{"ID":"a","JobID":"j","TaskStates":null}"#).unwrap();
        assert!(alloc.task_states.is_none());
    }

    #[test]
    fn test_missing_identity_is_an_error() {
        assert!(Allocation::from_json(r#"{"JobID":"j"}"#).is_err());
        assert!(Allocation::from_json(r#"{"ID":"a","JobID":"j","CreateTime":"soon"}"#).is_err());
    }
}
