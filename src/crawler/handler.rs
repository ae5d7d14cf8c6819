//! Stage handler interface
//!
//! Handlers hold the site-specific fetch logic. The worker loop only sees
//! them through [`StageHandler`], so any error they return (or any panic)
//! turns into a `failed` finalize for that record and nothing else.

use crate::state::Stage;
use crate::storage::TaskRecord;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Recoverable failure raised by a stage handler
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("HTTP error for {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Parse error for {url}: {message}")]
    Parse { url: String, message: String },

    #[error("Malformed payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// What a handler produced for one record
#[derive(Debug, Clone, Default)]
pub struct StageOutput {
    /// JSON merge patch for the record payload
    pub payload: Option<Value>,
    /// Exclude the record from every later stage
    pub lock: bool,
    /// New records found while handling this one
    pub discovered: Vec<TaskRecord>,
}

impl StageOutput {
    pub fn done() -> Self {
        Self::default()
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn locked(mut self) -> Self {
        self.lock = true;
        self
    }

    pub fn with_discovered(mut self, records: Vec<TaskRecord>) -> Self {
        self.discovered = records;
        self
    }
}

/// Site-specific work for one pipeline stage
#[async_trait]
pub trait StageHandler: Send + Sync {
    /// The stage this handler serves
    fn stage(&self) -> Stage;

    /// Processes one claimed record
    async fn handle(&self, record: &TaskRecord) -> Result<StageOutput, HandlerError>;
}

/// One handler per stage
#[derive(Clone)]
pub struct Pipeline {
    handlers: BTreeMap<Stage, Arc<dyn StageHandler>>,
}

impl Pipeline {
    /// Builds a pipeline from one handler per stage
    ///
    /// Each handler is registered under the stage it reports, so the
    /// arguments only need to cover every stage once.
    pub fn new(
        discovery: Arc<dyn StageHandler>,
        enrichment: Arc<dyn StageHandler>,
        asset_fetch: Arc<dyn StageHandler>,
    ) -> Result<Self, PipelineError> {
        let mut handlers = BTreeMap::new();
        for handler in [discovery, enrichment, asset_fetch] {
            let stage = handler.stage();
            if handlers.insert(stage, handler).is_some() {
                return Err(PipelineError::DuplicateStage(stage));
            }
        }
        Ok(Self { handlers })
    }

    /// Returns the handler for `stage`
    pub fn handler(&self, stage: Stage) -> Option<&Arc<dyn StageHandler>> {
        self.handlers.get(&stage)
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("More than one handler registered for stage {0}")]
    DuplicateStage(Stage),
}
