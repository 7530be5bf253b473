use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LokiConfig {
    pub address: String,
    /// Lines requested per `query_range` call; Loki's default `max_entries_limit_per_query`.
    pub page_limit: usize,
    /// Upper bound on lines returned by one aggregation.
    pub max_lines: usize,
    /// Optional per-request timeout. Whole aggregations are bounded by the
    /// caller's deadline instead.
    pub request_timeout_secs: Option<u64>,
}

impl Default for LokiConfig {
    fn default() -> Self {
        Self {
            address: "http://127.0.0.1:3100".to_string(),
            page_limit: 5000,
            max_lines: 10000,
            request_timeout_secs: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct QueryResponse {
    pub data: QueryData,
}

#[derive(Debug, Deserialize)]
pub(crate) struct QueryData {
    #[serde(rename = "resultType")]
    pub result_type: String,
    #[serde(default)]
    pub result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Stream {
    #[serde(rename = "stream", default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub values: Vec<(String, String)>,
}

impl Stream {
    pub fn is_stderr(&self) -> bool {
        self.labels.get("source").is_some_and(|s| s == "stderr")
    }
}
