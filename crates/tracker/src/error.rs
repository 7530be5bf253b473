use db::DbError;
use loki::LokiError;
use nomad::NomadError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Could not select existing Run by Nomad job ID {0}: not found")]
    RunNotFound(Uuid),

    #[error("Could not select existing Run Output by Nomad job ID {0}: not found")]
    RunOutputNotFound(Uuid),

    #[error("{context}: {source}")]
    Storage {
        context: String,
        #[source]
        source: DbError,
    },

    #[error("{context}: {source}")]
    Orchestrator {
        context: String,
        #[source]
        source: NomadError,
    },

    #[error("{context}: {source}")]
    Logs {
        context: String,
        #[source]
        source: LokiError,
    },
}

impl TrackerError {
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::RunNotFound(_) | Self::RunOutputNotFound(_) => true,
            Self::Storage { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Logs {
                source: LokiError::Cancelled,
                ..
            }
        )
    }
}

pub type Result<T> = std::result::Result<T, TrackerError>;

/// Attaches the operation and key to an error from a lower layer.
pub(crate) trait Context<T> {
    fn context(self, context: impl FnOnce() -> String) -> Result<T>;
}

impl<T> Context<T> for std::result::Result<T, DbError> {
    fn context(self, context: impl FnOnce() -> String) -> Result<T> {
        self.map_err(|source| TrackerError::Storage {
            context: context(),
            source,
        })
    }
}

impl<T> Context<T> for std::result::Result<T, sqlx::Error> {
    fn context(self, context: impl FnOnce() -> String) -> Result<T> {
        self.map_err(DbError::from).context(context)
    }
}

impl<T> Context<T> for std::result::Result<T, NomadError> {
    fn context(self, context: impl FnOnce() -> String) -> Result<T> {
        self.map_err(|source| TrackerError::Orchestrator {
            context: context(),
            source,
        })
    }
}

impl<T> Context<T> for std::result::Result<T, LokiError> {
    fn context(self, context: impl FnOnce() -> String) -> Result<T> {
        self.map_err(|source| TrackerError::Logs {
            context: context(),
            source,
        })
    }
}
