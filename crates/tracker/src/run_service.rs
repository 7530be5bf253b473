use db::{AllocationProjector, RunOutputRepository, RunRepository};
use events::{EventBus, RunEvent};
use jobtrail_core::{Allocation, LokiOutput, Run, RunOutput};
use loki::LokiClient;
use nomad::NomadClient;
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{Context, Result, TrackerError};
use crate::staged::Staged;

/// Owns the Run and RunOutput records of Nomad jobs.
///
/// Writes that belong to a larger unit of work take the caller's transaction
/// and return a [`Staged`] result, which announces the change only once the
/// caller commits through it. [`RunService::cancel`] manages its own
/// transaction.
#[derive(Clone)]
pub struct RunService {
    pool: SqlitePool,
    runs: RunRepository,
    outputs: RunOutputRepository,
    allocations: AllocationProjector,
    nomad: Arc<dyn NomadClient>,
    loki: Arc<LokiClient>,
    events: EventBus,
}

impl RunService {
    pub fn new(
        pool: SqlitePool,
        nomad: Arc<dyn NomadClient>,
        loki: Arc<LokiClient>,
        events: EventBus,
    ) -> Self {
        Self {
            runs: RunRepository::new(pool.clone()),
            outputs: RunOutputRepository::new(pool.clone()),
            allocations: AllocationProjector::new(pool.clone()),
            pool,
            nomad,
            loki,
            events,
        }
    }

    /// Fails with [`TrackerError::RunNotFound`] when no Run exists for the job.
    pub async fn get_by_nomad_job_id(&self, id: Uuid) -> Result<Run> {
        debug!(nomad_job_id = %id, "Getting Run by Nomad job ID");
        self.runs
            .find_by_nomad_job_id(id)
            .await
            .context(|| format!("Could not select existing Run by Nomad job ID {id}"))?
            .ok_or(TrackerError::RunNotFound(id))
    }

    pub async fn get_output_by_nomad_job_id(&self, id: Uuid) -> Result<RunOutput> {
        debug!(nomad_job_id = %id, "Getting Run Output by Nomad job ID");
        self.outputs
            .find_by_run_id(id)
            .await
            .context(|| format!("Could not select existing Run Output by Nomad job ID {id}"))?
            .ok_or(TrackerError::RunOutputNotFound(id))
    }

    pub async fn get_by_action_id(&self, id: Uuid) -> Result<Vec<Run>> {
        debug!(action_id = %id, "Getting Runs by Action ID");
        self.runs
            .find_by_action_id(id)
            .await
            .context(|| format!("Could not select existing Runs by Action ID {id}"))
    }

    pub async fn get_all(&self) -> Result<Vec<Run>> {
        debug!("Getting all Runs");
        self.runs
            .find_all()
            .await
            .context(|| "Could not select Runs".to_string())
    }

    /// Every recorded snapshot of the job's allocations.
    pub async fn get_allocations(&self, id: Uuid) -> Result<Vec<Allocation>> {
        self.allocations
            .get_event_allocation_by_job_id(id)
            .await
            .context(|| format!("Could not select allocations of Nomad job ID {id}"))
    }

    /// Current state of each allocation of the job.
    pub async fn get_latest_allocations(&self, id: Uuid) -> Result<Vec<Allocation>> {
        self.allocations
            .get_latest_event_allocation_by_job_id(id)
            .await
            .context(|| format!("Could not select latest allocations of Nomad job ID {id}"))
    }

    /// Inserts a new Run together with its output.
    ///
    /// Both rows go into `tx`; `RunCreated` is published once the returned
    /// [`Staged`] is committed.
    pub async fn save(
        &self,
        tx: &mut SqliteConnection,
        run: &Run,
        output: &RunOutput,
    ) -> Result<Staged<()>> {
        let id = run.nomad_job_id;
        debug!(nomad_job_id = %id, "Saving new Run");

        self.runs
            .create(&mut *tx, run)
            .await
            .context(|| format!("Could not insert Run {id}"))?;
        self.outputs
            .create(&mut *tx, id, output)
            .await
            .context(|| format!("Could not insert Run Output {id}"))?;

        let event = RunEvent::RunCreated {
            nomad_job_id: id,
            action_id: run.action_id,
        };
        Ok(Staged::new((), event, &self.events))
    }

    /// Writes the Run's status and metadata; its output is left alone.
    pub async fn update(&self, tx: &mut SqliteConnection, run: &Run) -> Result<Staged<()>> {
        let id = run.nomad_job_id;
        debug!(nomad_job_id = %id, status = run.status.as_str(), "Updating Run");

        self.runs
            .update(tx, run)
            .await
            .context(|| format!("Could not update Run {id}"))?;

        let event = RunEvent::RunUpdated {
            nomad_job_id: id,
            status: run.status,
        };
        Ok(Staged::new((), event, &self.events))
    }

    /// Stores the final state of the run and removes its output.
    ///
    /// The removed output is handed back by [`Staged::commit`] and travels with
    /// the `RunEnded` event; it cannot be read back afterwards. Rolling `tx`
    /// back instead leaves both the Run and its output as they were and
    /// announces nothing.
    pub async fn end(
        &self,
        tx: &mut SqliteConnection,
        run: &Run,
    ) -> Result<Staged<Option<RunOutput>>> {
        let id = run.nomad_job_id;
        debug!(nomad_job_id = %id, status = run.status.as_str(), "Ending Run");

        self.runs
            .update(&mut *tx, run)
            .await
            .context(|| format!("Could not update Run {id}"))?;
        let output = self
            .outputs
            .delete(&mut *tx, id)
            .await
            .context(|| format!("Could not delete Run Output {id}"))?;

        debug!(nomad_job_id = %id, status = run.status.as_str(), removed_output = output.is_some(), "Run end staged");
        let event = RunEvent::RunEnded {
            nomad_job_id: id,
            status: run.status,
            output: output.clone(),
        };
        Ok(Staged::new(output, event, &self.events))
    }

    /// Marks the run cancelled, suppresses its output and stops its Nomad job.
    ///
    /// Nomad cannot tell a job that ran to completion from one that was stopped,
    /// so the output has to go before the job does. The status change and the
    /// delete stay uncommitted while Nomad is called and are committed only once
    /// deregistration succeeds. A failed call, or a caller that drops this
    /// future, rolls them back. Other writers wait on the database meanwhile,
    /// for at most the busy timeout.
    pub async fn cancel(&self, run: &Run) -> Result<Run> {
        let id = run.nomad_job_id;
        debug!(nomad_job_id = %id, "Stopping Run");

        let mut cancelled = run.clone();
        cancelled.cancel();

        let mut tx = self
            .pool
            .begin()
            .await
            .context(|| format!("Could not start cancelling Run {id}"))?;
        self.runs
            .update(&mut tx, &cancelled)
            .await
            .context(|| format!("Could not update Run {id}"))?;
        self.outputs
            .delete(&mut tx, id)
            .await
            .context(|| format!("Could not delete Run Output {id}"))?;

        if let Err(err) = self.nomad.deregister_job(&id.to_string(), false).await {
            warn!(nomad_job_id = %id, error = %err, "Deregistration failed, keeping Run Output");
            if let Err(rollback_err) = tx.rollback().await {
                warn!(nomad_job_id = %id, error = %rollback_err, "Rollback after failed deregistration failed");
            }
            return Err::<Run, _>(err).context(|| format!("Failed to deregister job {id}"));
        }

        if let Err(err) = tx.commit().await {
            error!(
                nomad_job_id = %id,
                error = %err,
                "Nomad job deregistered but the cancellation could not be recorded"
            );
            return Err::<Run, _>(err).context(|| format!("Could not record cancellation of Run {id}"));
        }

        self.events.publish(RunEvent::RunCancelled { nomad_job_id: id });
        info!(nomad_job_id = %id, "Stopped Run");
        Ok(cancelled)
    }

    /// Fetches the job's logs from Loki; `deadline` bounds the whole listing.
    pub async fn job_logs(&self, id: Uuid, deadline: Option<Instant>) -> Result<LokiOutput> {
        debug!(nomad_job_id = %id, "Fetching job logs");
        self.loki
            .job_logs(&id.to_string(), deadline)
            .await
            .context(|| format!("Could not fetch logs of Nomad job ID {id}"))
    }

    /// Fetches the logs of one task group of an allocation.
    pub async fn run_logs(
        &self,
        alloc_id: &str,
        task_group: &str,
        deadline: Option<Instant>,
    ) -> Result<LokiOutput> {
        debug!(alloc_id, task_group, "Fetching allocation logs");
        self.loki
            .allocation_logs(alloc_id, task_group, deadline)
            .await
            .context(|| format!("Could not fetch logs of allocation {alloc_id} task group {task_group}"))
    }
}
