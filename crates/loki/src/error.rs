use thiserror::Error;

#[derive(Debug, Error)]
pub enum LokiError {
    #[error("Failed to talk with Loki: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Error response {status} from Loki: {body}")]
    Backend { status: u16, body: String },

    #[error("Malformed Loki response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Unexpected Loki result type: {0}")]
    UnexpectedResultType(String),

    #[error("Invalid Loki timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Log query cancelled: deadline exceeded")]
    Cancelled,

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, LokiError>;
