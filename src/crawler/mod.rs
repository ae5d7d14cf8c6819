//! Crawl pipeline core
//!
//! This module contains the work-queue coordination engine:
//! - Claim scheduling over the task store
//! - The per-worker stage loop
//! - Worker pool coordination
//! - Content-derived record identifiers
//! - The stage handler interface and asset layout

mod assets;
mod coordinator;
mod fingerprint;
mod handler;
mod scheduler;
mod worker;

pub use assets::AssetLayout;
pub use coordinator::{run_harvest, Coordinator, PoolReport, WorkerFailure};
pub use fingerprint::{canonical_form, fingerprint, DIGEST_CHARS, PROFILE_PREFIX};
pub use handler::{HandlerError, Pipeline, PipelineError, StageHandler, StageOutput};
pub use scheduler::{ClaimScheduler, Outcome, MAX_LEASE_SECS};
pub use worker::{StageTally, Worker, WorkerReport};
