use events::{EventBus, RunEvent};
use sqlx::{Sqlite, Transaction};

use crate::error::{Context, Result};

/// A Run change written inside a caller's transaction but not yet announced.
///
/// The lifecycle event goes out only after [`Staged::commit`] succeeds.
/// Dropping the value, for example after rolling the transaction back,
/// publishes nothing.
#[must_use = "the change is neither committed nor announced until `commit` is called"]
#[derive(Debug)]
pub struct Staged<T> {
    value: T,
    event: RunEvent,
    events: EventBus,
}

impl<T> Staged<T> {
    pub(crate) fn new(value: T, event: RunEvent, events: &EventBus) -> Self {
        Self {
            value,
            event,
            events: events.clone(),
        }
    }

    /// Commits `tx`, then publishes the pending event and hands back the result
    /// of the write.
    pub async fn commit(self, tx: Transaction<'_, Sqlite>) -> Result<T> {
        let id = self.event.nomad_job_id();
        tx.commit()
            .await
            .context(|| format!("Could not commit changes to Run {id}"))?;

        self.events.publish(self.event);
        Ok(self.value)
    }
}
