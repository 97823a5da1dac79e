use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use corpus_jobs::config::JobsConfig;
use corpus_jobs::jobs::{
    CorpusSyncJob, Dispatcher, DummyArgs, DummyJob, IdxUpdateArgs, IdxUpdateJob, JobKind,
    JobRecord, JobRunners, KeywordsArgs, KeywordsJob, LiveAttrsArgs, LiveAttrsJob, NgramJob,
    NgramResult, PersistenceStore, SyncResult, job_task,
};
use corpus_jobs::notification::NoopNotifier;

fn new_dispatcher(path: &Path, max_restarts: u32) -> Arc<Dispatcher> {
    let config = JobsConfig::default()
        .with_status_data_path(path)
        .with_max_num_concurrent_jobs(2)
        .with_max_num_restarts(max_restarts)
        .with_checkpoint_interval_secs(0);
    Dispatcher::new(
        config,
        PersistenceStore::new(path),
        JobRunners::with_builtin(),
        Arc::new(NoopNotifier),
    )
}

fn mixed_records() -> Vec<JobRecord> {
    let mut ngram = NgramJob::new("syn2020");
    ngram.result = Some(NgramResult {
        tables_ready: true,
        total_lines: 120,
        num_proc_lines: 120,
        curr_action: "done".to_string(),
        ..Default::default()
    });
    let mut sync = CorpusSyncJob::new("syn2020");
    sync.result = Some(SyncResult {
        ok: false,
        return_code: 23,
        details: vec!["rsync: permission denied".to_string()],
        ..Default::default()
    });

    vec![
        LiveAttrsJob::new(
            "syn2020",
            LiveAttrsArgs {
                append: true,
                tagset_name: Some("cs_cnc2020".to_string()),
                ..Default::default()
            },
        )
        .with_alias("syn2020_lite")
        .into(),
        JobRecord::from(IdxUpdateJob::new("syn2020", IdxUpdateArgs { max_columns: 5 })).as_finished(),
        JobRecord::from(ngram).as_finished(),
        JobRecord::from(KeywordsJob::new("syn2020", KeywordsArgs::default()))
            .with_error("vertical file not found"),
        JobRecord::from(sync).as_finished(),
        DummyJob::new("syn2020", DummyArgs::default()).into(),
    ]
}

#[tokio::test]
async fn test_round_trip_mixed_kinds() {
    let dir = tempfile::tempdir().unwrap();
    let store = PersistenceStore::new(dir.path().join("jobs.json"));
    let records = mixed_records();

    store.serialize(&records).await.unwrap();
    let loaded = store.load().await.unwrap();

    assert_eq!(loaded.len(), records.len());
    for (original, restored) in records.iter().zip(&loaded) {
        assert_eq!(restored.id(), original.id());
        assert_eq!(restored.kind(), original.kind());
        assert_eq!(restored.is_finished(), original.is_finished());
        assert_eq!(restored.error().is_some(), original.error().is_some());
        assert_eq!(restored.corpus_id(), original.corpus_id());
    }
    assert_eq!(loaded, records);
}

#[tokio::test]
async fn test_load_state_splits_detached() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jobs.json");
    let records = mixed_records();
    PersistenceStore::new(&path)
        .serialize(&records)
        .await
        .unwrap();

    let dispatcher = new_dispatcher(&path, 3);
    let detached = dispatcher.load_state().await;

    // liveattrs and dummy were not finished
    assert_eq!(detached, 2);
    let kinds: Vec<JobKind> = dispatcher
        .get_detached_jobs()
        .iter()
        .map(JobRecord::kind)
        .collect();
    assert!(kinds.contains(&JobKind::LiveAttrs));
    assert!(kinds.contains(&JobKind::Dummy));
    assert_eq!(dispatcher.list_compact().len(), 4);

    let id = dispatcher.get_detached_jobs()[0].id().to_string();
    assert!(dispatcher.clear_detached_job(&id));
    assert!(!dispatcher.clear_detached_job(&id));
}

#[tokio::test]
async fn test_missing_state_file_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let dispatcher = new_dispatcher(&dir.path().join("nope.json"), 3);
    assert_eq!(dispatcher.load_state().await, 0);
    assert!(dispatcher.list_compact().is_empty());
}

#[tokio::test]
async fn test_shutdown_and_resume() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jobs.json");

    let first = new_dispatcher(&path, 3);
    first.start();
    let long: JobRecord = DummyJob::new(
        "syn2020",
        DummyArgs {
            duration_ms: 60_000,
            fail: false,
        },
    )
    .into();
    let task = JobRunners::with_builtin()
        .get(JobKind::Dummy)
        .unwrap()
        .build_task(&long)
        .unwrap();
    first.enqueue_job(task, long.clone());

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while first.stats().running == 0 {
        assert!(tokio::time::Instant::now() < deadline);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    first.shutdown().await.unwrap();

    let saved = PersistenceStore::new(&path).load().await.unwrap();
    let saved_long = saved.iter().find(|job| job.id() == long.id()).unwrap();
    assert!(!saved_long.is_finished());

    let second = new_dispatcher(&path, 3);
    assert_eq!(second.load_state().await, 1);
    second.start();
    assert_eq!(second.resume_detached_jobs(), 1);
    assert!(second.get_detached_jobs().is_empty());

    let resumed = second.get_job(long.id()).unwrap();
    assert_eq!(resumed.num_restarts(), 1);
    assert!(!resumed.is_finished());
    second.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_keeps_jobs_failing_on_their_own() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jobs.json");
    let dispatcher = new_dispatcher(&path, 3);
    dispatcher.start();

    // fails for its own reason while shutdown waits for it
    let broken: JobRecord = DummyJob::new("syn2020", DummyArgs::default()).into();
    let record = broken.clone();
    dispatcher.enqueue_job(
        job_task(move |ctx| async move {
            ctx.cancelled().await;
            ctx.send(record.with_error("vertical file truncated")).await;
        }),
        broken.clone(),
    );
    let interrupted: JobRecord = DummyJob::new(
        "syn2020",
        DummyArgs {
            duration_ms: 60_000,
            fail: false,
        },
    )
    .into();
    let task = JobRunners::with_builtin()
        .get(JobKind::Dummy)
        .unwrap()
        .build_task(&interrupted)
        .unwrap();
    dispatcher.enqueue_job(task, interrupted.clone());

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while dispatcher.stats().running < 2 {
        assert!(tokio::time::Instant::now() < deadline);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    dispatcher.shutdown().await.unwrap();

    let saved = PersistenceStore::new(&path).load().await.unwrap();
    let saved_broken = saved.iter().find(|job| job.id() == broken.id()).unwrap();
    assert!(saved_broken.is_finished());
    assert_eq!(saved_broken.error(), Some("vertical file truncated"));
    let saved_interrupted = saved.iter().find(|job| job.id() == interrupted.id()).unwrap();
    assert!(!saved_interrupted.is_finished());

    let restarted = new_dispatcher(&path, 3);
    assert_eq!(restarted.load_state().await, 1);
}

#[tokio::test]
async fn test_resume_over_restart_cap_clears_job() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jobs.json");
    let mut capped = DummyJob::new("syn2020", DummyArgs::default());
    capped.meta.num_restarts = 2;
    let capped: JobRecord = capped.into();
    let unknown_runner: JobRecord = NgramJob::new("syn2020").into();
    PersistenceStore::new(&path)
        .serialize(&[capped.clone(), unknown_runner.clone()])
        .await
        .unwrap();

    let dispatcher = new_dispatcher(&path, 2);
    assert_eq!(dispatcher.load_state().await, 2);
    assert_eq!(dispatcher.resume_detached_jobs(), 0);
    assert!(dispatcher.get_detached_jobs().is_empty());
    assert_eq!(dispatcher.stats().queued, 0);

    for id in [capped.id(), unknown_runner.id()] {
        let job = dispatcher.get_job(id).unwrap();
        assert!(job.is_finished());
        assert!(job.error().unwrap().starts_with("not resumed"));
    }
}

#[tokio::test]
async fn test_checkpoint_keeps_detached_jobs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jobs.json");
    let pending: JobRecord = DummyJob::new("syn2020", DummyArgs::default()).into();
    PersistenceStore::new(&path)
        .serialize(std::slice::from_ref(&pending))
        .await
        .unwrap();

    let dispatcher = new_dispatcher(&path, 3);
    dispatcher.load_state().await;
    let mut old = DummyJob::new("syn2020", DummyArgs::default());
    old.meta.start = Utc::now() - chrono::Duration::hours(1);
    dispatcher.enqueue_job(
        job_task(|_ctx| async {}),
        JobRecord::from(old),
    );
    dispatcher.checkpoint().await.unwrap();

    let saved = PersistenceStore::new(&path).load().await.unwrap();
    assert_eq!(saved.len(), 2);
    assert!(saved.iter().any(|job| job.id() == pending.id()));
}
