use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single log line as stored by Loki.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LokiLine {
    pub time: DateTime<Utc>,
    pub text: String,
}

/// Log lines of a job, split by the stream they were written to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct LokiOutput {
    pub stdout: Vec<LokiLine>,
    pub stderr: Vec<LokiLine>,
}

impl LokiOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.stdout.len() + self.stderr.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
