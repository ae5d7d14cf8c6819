//! State module for the pipeline state machine
//!
//! # Components
//!
//! - `Stage`: the fixed, ordered pipeline stages (discovery, enrichment, asset-fetch)
//! - `StageStatus`: the status of one record within one stage

mod stage;
mod stage_status;

// Re-export main types
pub use stage::Stage;
pub use stage_status::StageStatus;
