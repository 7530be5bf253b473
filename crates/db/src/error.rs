use jobtrail_core::EventUid;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Run not found: {0}")]
    RunNotFound(Uuid),

    #[error("Run output not found: {0}")]
    RunOutputNotFound(Uuid),

    #[error("Nomad event not found: {0}")]
    EventNotFound(EventUid),

    #[error("Could not decode {context}: {source}")]
    Decode {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Invalid stored data: {0}")]
    InvalidData(String),
}

impl DbError {
    pub(crate) fn decode(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Decode {
            context: context.into(),
            source: Box::new(source),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::RunNotFound(_) | Self::RunOutputNotFound(_) | Self::EventNotFound(_)
        )
    }
}
