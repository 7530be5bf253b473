use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid event uid: {0}")]
    InvalidEventUid(String),

    #[error("Invalid run status: {0}")]
    InvalidRunStatus(String),

    #[error("Malformed allocation payload: {0}")]
    MalformedAllocation(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = CoreError::InvalidRunStatus("paused".to_string());
        assert!(error.to_string().contains("paused"));
    }
}
