//! Multi-worker pipeline tests
//!
//! Each test runs real workers against a SQLite file shared through separate
//! connections, the same way the binary does.

use crate::common::{find, one_profile_per_surname, parse_error, CallLog, Scripted, TestDb};
use async_trait::async_trait;
use gallery_harvest::crawler::{
    ClaimScheduler, Coordinator, HandlerError, Pipeline, PoolReport, StageHandler, StageOutput,
    Worker,
};
use gallery_harvest::seed::seed_surnames;
use gallery_harvest::state::{Stage, StageStatus};
use gallery_harvest::storage::{
    RecordFilter, RecordKind, StatusMatch, StorageError, TaskRecord, TaskStore,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

async fn run_pool(db: &TestDb, pipeline: Pipeline, workers: usize) -> PoolReport {
    let (_tx, rx) = watch::channel(false);
    let path = db.path.clone();
    Coordinator::new(workers, Duration::ZERO, None)
        .run(
            Arc::new(pipeline),
            move || gallery_harvest::storage::open_store(&path),
            rx,
        )
        .await
}

fn assert_nothing_in_progress(db: &TestDb) {
    let store = db.open();
    for stage in Stage::ALL {
        let held = store
            .count(&RecordFilter::new().stage(stage, StatusMatch::Is(StageStatus::InProgress)))
            .unwrap();
        assert_eq!(held, 0, "records left in_progress for {}", stage);
    }
}

fn register_profiles(db: &TestDb, count: usize) -> Vec<String> {
    let scheduler = ClaimScheduler::new(Arc::new(db.open()), "setup");
    (0..count)
        .map(|n| {
            let id = format!("P{:04}", n);
            let record = TaskRecord::profile(id.clone(), None, serde_json::json!({}), false);
            assert!(scheduler.register(&record).unwrap());
            id
        })
        .collect()
}

#[test]
fn test_concurrent_claims_from_threads_never_overlap() {
    let db = TestDb::new();
    let ids = register_profiles(&db, 60);

    let handles: Vec<_> = (0..6)
        .map(|n| {
            let store = Arc::new(db.open());
            std::thread::spawn(move || {
                let scheduler = ClaimScheduler::new(store, format!("thread-{}", n));
                let mut claimed = Vec::new();
                while let Some(record) = scheduler.claim_next(Stage::Enrichment).unwrap() {
                    claimed.push(record.id);
                }
                claimed
            })
        })
        .collect();

    let mut all = Vec::new();
    for handle in handles {
        all.extend(handle.join().unwrap());
    }

    let unique: HashSet<&String> = all.iter().collect();
    assert_eq!(all.len(), ids.len(), "some record was claimed twice");
    assert_eq!(unique.len(), ids.len());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_each_record_handled_once_per_stage() {
    let db = TestDb::new();
    let ids = register_profiles(&db, 40);
    let log = CallLog::default();

    let pipeline = Pipeline::new(
        Scripted::done(Stage::Discovery, &log),
        Scripted::done(Stage::Enrichment, &log),
        Scripted::done(Stage::AssetFetch, &log),
    )
    .unwrap();

    let report = run_pool(&db, pipeline, 8).await;
    assert!(report.failures.is_empty(), "{:?}", report.failures);

    for stage in [Stage::Enrichment, Stage::AssetFetch] {
        let counts = log.counts(stage);
        assert_eq!(counts.len(), ids.len(), "not every record reached {}", stage);
        assert!(
            counts.values().all(|&n| n == 1),
            "a record was handled more than once in {}",
            stage
        );
        assert_eq!(report.totals()[&stage].done, ids.len() as u64);
    }
    assert!(log.for_stage(Stage::Discovery).is_empty());
    assert_nothing_in_progress(&db);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 3)]
async fn test_three_surnames_three_workers_end_to_end() {
    let db = TestDb::new();
    let seeder = ClaimScheduler::new(Arc::new(db.open()), "seeder");
    let names: Vec<String> = ["smith", "jones", "brown"].iter().map(|s| s.to_string()).collect();
    seed_surnames(&seeder, &names, 50).unwrap();

    let log = CallLog::default();
    let pipeline = Pipeline::new(
        Scripted::new(Stage::Discovery, &log, one_profile_per_surname),
        Scripted::done(Stage::Enrichment, &log),
        Scripted::done(Stage::AssetFetch, &log),
    )
    .unwrap();

    let report = run_pool(&db, pipeline, 3).await;
    assert!(report.failures.is_empty());
    assert!(!report.interrupted());

    let store = db.open();
    for name in &names {
        let surname = find(&store, name);
        assert_eq!(surname.status(Stage::Discovery), Some(StageStatus::Done));

        let profile = find(&store, &format!("P-{}", name));
        assert_eq!(profile.parent_id.as_deref(), Some(name.as_str()));
        assert_eq!(profile.status(Stage::Enrichment), Some(StageStatus::Done));
        assert_eq!(profile.status(Stage::AssetFetch), Some(StageStatus::Done));
    }

    for stage in Stage::ALL {
        let counts = log.counts(stage);
        assert_eq!(counts.len(), 3);
        assert!(counts.values().all(|&n| n == 1));
    }
    assert_nothing_in_progress(&db);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_record_locked_in_enrichment_never_fetched() {
    let db = TestDb::new();
    register_profiles(&db, 5);
    let log = CallLog::default();

    let pipeline = Pipeline::new(
        Scripted::done(Stage::Discovery, &log),
        Scripted::new(Stage::Enrichment, &log, |record| {
            if record.id == "P0002" {
                Ok(StageOutput::done().locked())
            } else {
                Ok(StageOutput::done())
            }
        }),
        Scripted::done(Stage::AssetFetch, &log),
    )
    .unwrap();

    let report = run_pool(&db, pipeline, 2).await;
    assert!(report.failures.is_empty());

    let fetched = log.for_stage(Stage::AssetFetch);
    assert_eq!(fetched.len(), 4);
    assert!(!fetched.contains(&"P0002".to_string()));

    let store = db.open();
    let locked = find(&store, "P0002");
    assert!(locked.locked);
    assert_eq!(locked.status(Stage::Enrichment), Some(StageStatus::Done));
    assert_eq!(locked.status(Stage::AssetFetch), Some(StageStatus::Pending));
    assert_eq!(store.count(&RecordFilter::new().locked()).unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failing_handler_only_affects_its_record() {
    let db = TestDb::new();
    let scheduler = ClaimScheduler::new(Arc::new(db.open()), "setup");
    for id in ["X", "Y", "Z"] {
        scheduler
            .register(&TaskRecord::profile(id.to_string(), None, serde_json::json!({}), false))
            .unwrap();
    }

    let log = CallLog::default();
    let pipeline = Pipeline::new(
        Scripted::done(Stage::Discovery, &log),
        Scripted::new(Stage::Enrichment, &log, |record| {
            if record.id == "X" {
                Err(parse_error("album reference missing"))
            } else {
                Ok(StageOutput::done().with_payload(serde_json::json!({"enriched": true})))
            }
        }),
        Scripted::done(Stage::AssetFetch, &log),
    )
    .unwrap();

    let report = run_pool(&db, pipeline, 3).await;
    assert!(report.failures.is_empty());
    assert_eq!(report.totals()[&Stage::Enrichment].failed, 1);

    let store = db.open();
    let failed = find(&store, "X");
    let slot = failed.slot(Stage::Enrichment).unwrap();
    assert_eq!(slot.status, StageStatus::Failed);
    assert!(slot.error.as_deref().unwrap().contains("album reference missing"));
    assert_eq!(failed.status(Stage::AssetFetch), Some(StageStatus::Pending));

    for id in ["Y", "Z"] {
        let record = find(&store, id);
        assert_eq!(record.status(Stage::Enrichment), Some(StageStatus::Done));
        assert_eq!(record.status(Stage::AssetFetch), Some(StageStatus::Done));
        assert_eq!(record.payload["enriched"], true);
    }

    let fetched: HashSet<String> = log.for_stage(Stage::AssetFetch).into_iter().collect();
    assert_eq!(fetched, HashSet::from(["Y".to_string(), "Z".to_string()]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_rediscovery_creates_no_duplicates() {
    let db = TestDb::new();
    let seeder = ClaimScheduler::new(Arc::new(db.open()), "seeder");
    let names: Vec<String> = ["smith", "jones"].iter().map(|s| s.to_string()).collect();
    seed_surnames(&seeder, &names, 50).unwrap();

    // Both surname searches return the same two profiles
    let log = CallLog::default();
    let pipeline = Pipeline::new(
        Scripted::new(Stage::Discovery, &log, |record| {
            let shared = ["P-shared-1", "P-shared-2"]
                .iter()
                .map(|id| {
                    TaskRecord::profile(
                        id.to_string(),
                        Some(record.id.clone()),
                        serde_json::json!({}),
                        false,
                    )
                })
                .collect();
            Ok(StageOutput::done().with_discovered(shared))
        }),
        Scripted::done(Stage::Enrichment, &log),
        Scripted::done(Stage::AssetFetch, &log),
    )
    .unwrap();

    let report = run_pool(&db, pipeline, 2).await;
    assert_eq!(report.totals()[&Stage::Discovery].discovered, 2);

    let store = db.open();
    assert_eq!(
        store
            .count(&RecordFilter::new().kind(RecordKind::Profile))
            .unwrap(),
        2
    );

    // Seeding again adds nothing
    let again = seed_surnames(&seeder, &names, 50).unwrap();
    assert_eq!(again.added, 0);
    assert_eq!(again.skipped, 2);
    assert_eq!(log.counts(Stage::Enrichment).len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_leaves_work_pending() {
    let db = TestDb::new();
    register_profiles(&db, 10);
    let log = CallLog::default();

    let pipeline = Pipeline::new(
        Scripted::done(Stage::Discovery, &log),
        Scripted::done(Stage::Enrichment, &log),
        Scripted::done(Stage::AssetFetch, &log),
    )
    .unwrap();

    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();
    let path = db.path.clone();
    let report = Coordinator::new(2, Duration::ZERO, None)
        .run(
            Arc::new(pipeline),
            move || gallery_harvest::storage::open_store(&path),
            rx,
        )
        .await;

    assert!(report.interrupted());
    assert!(log.for_stage(Stage::Enrichment).is_empty());
    let pending = db.open().status_counts(Stage::Enrichment).unwrap();
    assert_eq!(pending.get(&StageStatus::Pending), Some(&10));
}

#[tokio::test]
async fn test_unopenable_store_reported_per_worker() {
    let log = CallLog::default();
    let pipeline = Pipeline::new(
        Scripted::done(Stage::Discovery, &log),
        Scripted::done(Stage::Enrichment, &log),
        Scripted::done(Stage::AssetFetch, &log),
    )
    .unwrap();

    let (_tx, rx) = watch::channel(false);
    let report = Coordinator::new(2, Duration::ZERO, None)
        .run(
            Arc::new(pipeline),
            || gallery_harvest::storage::open_store(std::path::Path::new("/nonexistent/dir/x.db")),
            rx,
        )
        .await;

    assert!(report.workers.is_empty());
    assert_eq!(report.failures.len(), 2);
}

/// Enrichment handler whose first call runs well past a one-second lease
struct StallsOnce {
    stalled: AtomicBool,
    log: CallLog,
}

#[async_trait]
impl StageHandler for StallsOnce {
    fn stage(&self) -> Stage {
        Stage::Enrichment
    }

    async fn handle(&self, record: &TaskRecord) -> Result<StageOutput, HandlerError> {
        self.log.push(Stage::Enrichment, &record.id);
        if !self.stalled.swap(true, Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(2500)).await;
        }
        Ok(StageOutput::done())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_lost_claim_stops_only_the_slow_worker() {
    let db = TestDb::new();
    let ids = register_profiles(&db, 4);
    let log = CallLog::default();

    let pipeline = Arc::new(
        Pipeline::new(
            Scripted::done(Stage::Discovery, &log),
            Arc::new(StallsOnce {
                stalled: AtomicBool::new(false),
                log: log.clone(),
            }),
            Scripted::done(Stage::AssetFetch, &log),
        )
        .unwrap(),
    );

    let (_tx, rx) = watch::channel(false);
    let worker = |name: &str| {
        let scheduler = ClaimScheduler::new(Arc::new(db.open()), name).with_lease_secs(Some(1));
        Worker::new(scheduler, Arc::clone(&pipeline), rx.clone())
    };

    // The slow worker claims P0000 first and stalls past its lease
    let slow = tokio::spawn(worker("slow").run());
    tokio::time::sleep(Duration::from_millis(1500)).await;
    let sibling = tokio::spawn(worker("sibling").run());

    let sibling = sibling.await.unwrap().expect("sibling should drain the queue");
    let slow = slow.await.unwrap();

    match slow {
        Err(StorageError::ClaimLost { record_id, stage }) => {
            assert_eq!(record_id, "P0000");
            assert_eq!(stage, Stage::Enrichment);
        }
        other => panic!("expected the slow worker to lose its claim, got {:?}", other),
    }

    // The sibling took over P0000 and finished everything else
    assert_eq!(sibling.tally(Stage::Enrichment).done, ids.len() as u64);
    assert_eq!(sibling.tally(Stage::AssetFetch).done, ids.len() as u64);

    let enriched = log.counts(Stage::Enrichment);
    assert_eq!(enriched["P0000"], 2, "handled by both workers");
    assert!(ids[1..].iter().all(|id| enriched[id] == 1));

    let fetched = log.counts(Stage::AssetFetch);
    assert_eq!(fetched.len(), ids.len());
    assert!(fetched.values().all(|&n| n == 1));

    let store = db.open();
    let taken_over = find(&store, "P0000");
    assert_eq!(taken_over.status(Stage::Enrichment), Some(StageStatus::Done));
    assert_eq!(taken_over.status(Stage::AssetFetch), Some(StageStatus::Done));
    assert_nothing_in_progress(&db);
}
