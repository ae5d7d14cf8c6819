//! Worker pool coordination
//!
//! Spawns a fixed number of workers, each with its own store connection,
//! staggers their starts, and collects their reports. Workers share nothing
//! in memory apart from the read-only handler pipeline and the shutdown
//! signal.

use crate::config::{Config, PipelineConfig};
use crate::crawler::worker::{StageTally, Worker, WorkerReport};
use crate::crawler::{ClaimScheduler, Pipeline};
use crate::seed::{load_name_list, seed_surnames};
use crate::site::build_pipeline;
use crate::state::Stage;
use crate::storage::{open_store, StorageResult, TaskStore};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// A worker that stopped on a coordination failure
#[derive(Debug, Clone)]
pub struct WorkerFailure {
    pub worker: String,
    pub error: String,
}

/// Combined result of a pool run
#[derive(Debug, Clone, Default)]
pub struct PoolReport {
    pub workers: Vec<WorkerReport>,
    pub failures: Vec<WorkerFailure>,
}

impl PoolReport {
    /// True if any worker stopped because of a shutdown request
    pub fn interrupted(&self) -> bool {
        self.workers.iter().any(|w| w.interrupted)
    }

    /// Per-stage counters summed over all workers
    pub fn totals(&self) -> BTreeMap<Stage, StageTally> {
        let mut totals: BTreeMap<Stage, StageTally> = BTreeMap::new();
        for report in &self.workers {
            for (stage, tally) in &report.stages {
                let total = totals.entry(*stage).or_default();
                total.done += tally.done;
                total.failed += tally.failed;
                total.locked += tally.locked;
                total.discovered += tally.discovered;
            }
        }
        totals
    }
}

/// Main pool coordinator structure
#[derive(Debug, Clone)]
pub struct Coordinator {
    workers: usize,
    stagger: Duration,
    lease_secs: Option<u64>,
}

impl Coordinator {
    pub fn new(workers: usize, stagger: Duration, lease_secs: Option<u64>) -> Self {
        Self {
            workers: workers.max(1),
            stagger,
            lease_secs,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.workers as usize,
            Duration::from_millis(config.worker_stagger_ms),
            config.lease_secs,
        )
    }

    /// Unique worker name within and across processes
    pub fn worker_name(index: usize) -> String {
        format!("worker-{}-{}", std::process::id(), index + 1)
    }

    /// Delay before worker `index` starts; saturates instead of overflowing
    fn stagger_for(&self, index: usize) -> Duration {
        let factor = u32::try_from(index).unwrap_or(u32::MAX);
        self.stagger.saturating_mul(factor)
    }

    /// Runs the pool to completion
    ///
    /// `open_store` is called once per worker so each holds its own
    /// connection. A worker whose store cannot be opened, or that hits a
    /// storage error, is reported as a failure; the others keep going.
    pub async fn run<S, F>(
        &self,
        pipeline: Arc<Pipeline>,
        open_store: F,
        shutdown: watch::Receiver<bool>,
    ) -> PoolReport
    where
        S: TaskStore + 'static,
        F: Fn() -> StorageResult<S>,
    {
        let start_time = Instant::now();
        let mut report = PoolReport::default();
        let mut handles = Vec::with_capacity(self.workers);

        tracing::info!(workers = self.workers, "Starting worker pool");

        for index in 0..self.workers {
            let name = Self::worker_name(index);
            let store = match open_store() {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    tracing::error!(worker = %name, error = %e, "Failed to open store for worker");
                    report.failures.push(WorkerFailure {
                        worker: name,
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            let scheduler =
                ClaimScheduler::new(store, name.clone()).with_lease_secs(self.lease_secs);
            let worker = Worker::new(scheduler, Arc::clone(&pipeline), shutdown.clone());
            let delay = self.stagger_for(index);
            let mut stop = shutdown.clone();

            let handle = tokio::spawn(async move {
                if !delay.is_zero() {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = stop.changed() => {}
                    }
                }
                worker.run().await
            });
            handles.push((name, handle));
        }

        for (name, handle) in handles {
            match handle.await {
                Ok(Ok(worker_report)) => report.workers.push(worker_report),
                Ok(Err(e)) => {
                    tracing::error!(worker = %name, error = %e, "Worker stopped on storage error");
                    report.failures.push(WorkerFailure {
                        worker: name,
                        error: e.to_string(),
                    });
                }
                Err(e) => {
                    tracing::error!(worker = %name, error = %e, "Worker task aborted");
                    report.failures.push(WorkerFailure {
                        worker: name,
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            finished = report.workers.len(),
            failed = report.failures.len(),
            elapsed = ?start_time.elapsed(),
            "Worker pool finished"
        );

        report
    }
}

/// Runs a complete harvest: seed, then drain every stage
///
/// Opening the store and reading the name list happen before any worker
/// starts; failures there are returned as errors.
///
/// # Example
///
/// ```no_run
/// use gallery_harvest::config::load_config;
/// use gallery_harvest::crawler::run_harvest;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new("harvest.toml"))?;
/// let (_tx, rx) = tokio::sync::watch::channel(false);
/// let report = run_harvest(config, rx).await?;
/// println!("{} workers finished", report.workers.len());
/// # Ok(())
/// # }
/// ```
pub async fn run_harvest(
    config: Config,
    shutdown: watch::Receiver<bool>,
) -> crate::Result<PoolReport> {
    let db_path = PathBuf::from(&config.output.database_path);
    let store = Arc::new(open_store(&db_path)?);

    let names = load_name_list(Path::new(&config.seed.name_list))?;
    let seeder = ClaimScheduler::new(store, "seeder");
    seed_surnames(&seeder, &names, config.seed.name_count as usize)?;

    let pipeline = Arc::new(build_pipeline(&config)?);
    let coordinator = Coordinator::from_config(&config.pipeline);

    Ok(coordinator
        .run(pipeline, || open_store(&db_path), shutdown)
        .await)
}
