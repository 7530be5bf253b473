use thiserror::Error;

#[derive(Debug, Error)]
pub enum NomadError {
    #[error("HTTP request to Nomad failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Error response {status} from Nomad: {body}")]
    Backend { status: u16, body: String },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, NomadError>;
