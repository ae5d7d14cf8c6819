//! Shared helpers for integration tests

use async_trait::async_trait;
use gallery_harvest::crawler::{HandlerError, StageHandler, StageOutput};
use gallery_harvest::state::Stage;
use gallery_harvest::storage::{RecordFilter, SqliteStore, TaskRecord, TaskStore};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// A database file in its own temporary directory
pub struct TestDb {
    _dir: TempDir,
    pub path: PathBuf,
}

impl TestDb {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("harvest.db");
        Self { _dir: dir, path }
    }

    /// Opens a fresh connection to the database
    pub fn open(&self) -> SqliteStore {
        SqliteStore::new(&self.path).expect("Failed to open store")
    }

    pub fn dir(&self) -> &Path {
        self._dir.path()
    }
}

/// Every (stage, record id) a handler was invoked for, in call order
#[derive(Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<(Stage, String)>>>,
}

impl CallLog {
    pub fn push(&self, stage: Stage, id: &str) {
        self.calls.lock().unwrap().push((stage, id.to_string()));
    }

    pub fn for_stage(&self, stage: Stage) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| *s == stage)
            .map(|(_, id)| id.clone())
            .collect()
    }

    /// How many times each record was handled in `stage`
    pub fn counts(&self, stage: Stage) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for id in self.for_stage(stage) {
            *counts.entry(id).or_insert(0) += 1;
        }
        counts
    }
}

type Script = dyn Fn(&TaskRecord) -> Result<StageOutput, HandlerError> + Send + Sync;

/// Handler whose behavior is a closure; logs every call
pub struct Scripted {
    stage: Stage,
    log: CallLog,
    script: Box<Script>,
}

impl Scripted {
    pub fn new<F>(stage: Stage, log: &CallLog, script: F) -> Arc<Self>
    where
        F: Fn(&TaskRecord) -> Result<StageOutput, HandlerError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            stage,
            log: log.clone(),
            script: Box::new(script),
        })
    }

    /// Marks every record done with no side effects
    pub fn done(stage: Stage, log: &CallLog) -> Arc<Self> {
        Self::new(stage, log, |_| Ok(StageOutput::done()))
    }
}

#[async_trait]
impl StageHandler for Scripted {
    fn stage(&self) -> Stage {
        self.stage
    }

    async fn handle(&self, record: &TaskRecord) -> Result<StageOutput, HandlerError> {
        self.log.push(self.stage, &record.id);
        // Let other workers run between claim and finalize
        tokio::task::yield_now().await;
        (self.script)(record)
    }
}

/// Discovery script producing one profile per surname, id `P-<surname>`
pub fn one_profile_per_surname(record: &TaskRecord) -> Result<StageOutput, HandlerError> {
    let profile = TaskRecord::profile(
        format!("P-{}", record.id),
        Some(record.id.clone()),
        serde_json::json!({ "surname": record.id }),
        false,
    );
    Ok(StageOutput::done().with_discovered(vec![profile]))
}

pub fn parse_error(message: &str) -> HandlerError {
    HandlerError::Parse {
        url: "http://test.invalid".to_string(),
        message: message.to_string(),
    }
}

pub fn find(store: &SqliteStore, id: &str) -> TaskRecord {
    store
        .find_one(&RecordFilter::new().id(id))
        .unwrap()
        .unwrap_or_else(|| panic!("record {} not found", id))
}
