use db::NomadEventRepository;
use jobtrail_core::NomadEvent;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{Context, Result};

/// Entry point for the ingestion loop: records Nomad events and tracks which
/// of them have been processed.
#[derive(Clone)]
pub struct NomadEventService {
    repository: NomadEventRepository,
}

impl NomadEventService {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            repository: NomadEventRepository::new(pool),
        }
    }

    /// Safe to call again for a redelivered event; the stored copy is returned.
    pub async fn save(&self, event: &NomadEvent) -> Result<NomadEvent> {
        debug!(uid = %event.uid, topic = %event.topic, index = event.index, "Saving Nomad event");
        self.repository
            .save(event)
            .await
            .context(|| format!("Could not insert Nomad event {} at index {}", event.uid, event.index))
    }

    pub async fn mark_handled(&self, event: &mut NomadEvent) -> Result<()> {
        event.handled = true;
        self.update(event).await
    }

    pub async fn update(&self, event: &NomadEvent) -> Result<()> {
        debug!(uid = %event.uid, handled = event.handled, "Updating Nomad event");
        self.repository
            .update(event)
            .await
            .context(|| format!("Could not update Nomad event {}", event.uid))
    }

    pub async fn get_by_handled(&self, handled: bool) -> Result<Vec<NomadEvent>> {
        debug!(handled, "Getting Nomad events by handled flag");
        self.repository
            .get_by_handled(handled)
            .await
            .context(|| format!("Could not select Nomad events with handled = {handled}"))
    }

    /// Index to resume the Nomad event stream from.
    pub async fn get_last_nomad_event_index(&self) -> Result<u64> {
        self.repository
            .get_last_nomad_event_index()
            .await
            .context(|| "Could not select last Nomad event index".to_string())
    }
}
