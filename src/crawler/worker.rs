//! Worker loop
//!
//! A worker drains the stages in order (`Stage::next`): it claims discovery
//! records until none are eligible, then enrichment, then asset-fetch. Every
//! claim ends in exactly one finalize. Handler errors and panics become `failed` for that
//! record only; store errors end the worker.

use crate::crawler::handler::{Pipeline, StageOutput};
use crate::crawler::scheduler::{ClaimScheduler, Outcome};
use crate::state::{Stage, StageStatus};
use crate::storage::{StorageError, TaskRecord, TaskStore};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::Instrument;

/// Per-stage counters kept by one worker
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageTally {
    pub done: u64,
    pub failed: u64,
    /// Records locked while being marked done
    pub locked: u64,
    /// New records registered by this stage
    pub discovered: u64,
}

/// Summary returned when a worker stops
#[derive(Debug, Clone, Default)]
pub struct WorkerReport {
    pub worker: String,
    pub stages: BTreeMap<Stage, StageTally>,
    /// True if the worker stopped because shutdown was requested
    pub interrupted: bool,
}

impl WorkerReport {
    fn new(worker: &str) -> Self {
        Self {
            worker: worker.to_string(),
            ..Self::default()
        }
    }

    pub fn tally(&self, stage: Stage) -> StageTally {
        self.stages.get(&stage).cloned().unwrap_or_default()
    }

    /// Total records finalized, across stages
    pub fn processed(&self) -> u64 {
        self.stages.values().map(|t| t.done + t.failed).sum()
    }
}

pub struct Worker<S: TaskStore> {
    scheduler: ClaimScheduler<S>,
    pipeline: Arc<Pipeline>,
    shutdown: watch::Receiver<bool>,
}

impl<S: TaskStore + 'static> Worker<S> {
    pub fn new(
        scheduler: ClaimScheduler<S>,
        pipeline: Arc<Pipeline>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            scheduler,
            pipeline,
            shutdown,
        }
    }

    pub fn name(&self) -> &str {
        self.scheduler.owner()
    }

    /// Runs until every stage is drained or shutdown is requested
    ///
    /// Shutdown is checked between records, never in the middle of one, so
    /// an interrupted worker leaves no claim behind.
    pub async fn run(self) -> Result<WorkerReport, StorageError> {
        let span = tracing::info_span!("worker", worker = %self.name());
        async move {
            let mut report = WorkerReport::new(self.name());
            tracing::info!("Worker started");

            let mut next_stage = Some(Stage::Discovery);
            'stages: while let Some(stage) = next_stage {
                let mut tally = StageTally::default();
                loop {
                    if *self.shutdown.borrow() {
                        tracing::info!(%stage, "Shutdown requested, stopping");
                        report.stages.insert(stage, tally);
                        report.interrupted = true;
                        break 'stages;
                    }

                    let Some(record) = self.scheduler.claim_next(stage)? else {
                        tracing::info!(%stage, "No eligible records left");
                        break;
                    };

                    let task_span =
                        tracing::info_span!("task", record_id = %record.id, %stage);
                    self.process(stage, record, &mut tally)
                        .instrument(task_span)
                        .await?;
                }
                report.stages.insert(stage, tally);
                next_stage = stage.next();
            }

            tracing::info!(processed = report.processed(), "Worker finished");
            Ok(report)
        }
        .instrument(span)
        .await
    }

    async fn process(
        &self,
        stage: Stage,
        record: TaskRecord,
        tally: &mut StageTally,
    ) -> Result<(), StorageError> {
        let record_id = record.id.clone();
        let outcome = match self.pipeline.handler(stage) {
            Some(handler) => {
                let handler = Arc::clone(handler);
                // Spawned so a panicking handler surfaces as a JoinError
                let joined =
                    tokio::spawn(async move { handler.handle(&record).await }.in_current_span())
                        .await;

                match joined {
                    Ok(Ok(output)) => self.accept(output, tally)?,
                    Ok(Err(e)) => {
                        tracing::warn!(error = %e, "Stage handler failed");
                        Outcome::Failed {
                            error: e.to_string(),
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Stage handler panicked");
                        Outcome::Failed {
                            error: format!("handler panicked: {}", e),
                        }
                    }
                }
            }
            None => {
                tracing::error!("No handler registered");
                Outcome::Failed {
                    error: format!("no handler registered for stage {}", stage),
                }
            }
        };

        let status = outcome.status();
        if let Err(e) = self.scheduler.finalize(&record_id, stage, outcome) {
            if matches!(e, StorageError::ClaimLost { .. }) {
                tracing::warn!(
                    lease_secs = ?self.scheduler.lease_secs(),
                    "Claim taken over before finalize; handler ran longer than the lease"
                );
            }
            return Err(e);
        }
        match status {
            StageStatus::Done => tally.done += 1,
            _ => tally.failed += 1,
        }
        tracing::info!(%status, "Record finalized");
        Ok(())
    }

    /// Registers discovered records, then turns the output into an outcome
    fn accept(
        &self,
        output: StageOutput,
        tally: &mut StageTally,
    ) -> Result<Outcome, StorageError> {
        for discovered in &output.discovered {
            if self.scheduler.register(discovered)? {
                tally.discovered += 1;
                tracing::debug!(new_record = %discovered.id, "Registered discovered record");
            } else {
                tracing::debug!(new_record = %discovered.id, "Discovered record already known");
            }
        }

        if output.lock {
            tally.locked += 1;
            tracing::info!("Record locked, excluded from later stages");
        }

        Ok(Outcome::Done {
            payload: output.payload,
            lock: output.lock,
        })
    }
}
