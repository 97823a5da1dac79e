//! Job dispatcher.
//!
//! The dispatcher owns the live job registry, the pending queue and the
//! dependency graph. A single control loop drains the queue while there are
//! free slots; every launched job runs on its own task and is watched by a
//! supervisor that merges the job's updates into the registry.
//!
//! Concurrency is bounded by a semaphore. A permit is taken before a job is
//! dequeued and released by the supervisor once the job reaches a terminal
//! state (or its task ends without reporting one).
//!
//! Jobs that still wait for a parent are put back at the tail of the queue,
//! so ready jobs submitted later may overtake them. A job whose parent failed
//! is finished with an error without running.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::deps::DependencyGraph;
use super::purge::{MaintenanceConfig, spawn_maintenance};
use super::queue::{JobQueue, QueueEntry};
use super::record::{CompactJobView, FullJobView, JobKind, JobRecord};
use super::runner::JobRunners;
use super::store::PersistenceStore;
use super::task::{JobContext, JobTask};
use crate::config::JobsConfig;
use crate::notification::JobNotifier;
use crate::{Error, Result};

/// Capacity of the per-job update channel.
const UPDATE_CHANNEL_CAPACITY: usize = 32;

/// Capacity of the stop request channel.
const STOP_CHANNEL_CAPACITY: usize = 64;

/// Fallback poll interval of the dispatch loop.
const DISPATCH_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How long shutdown waits for cancelled jobs to wind down.
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(10);

pub const CANCELLED_BEFORE_START: &str = "cancelled before start";
pub const JOB_CANCELLED: &str = "job cancelled";
pub const PARENT_JOB_FAILED: &str = "parent job failed";
pub const NO_COMPLETION_REPORTED: &str = "job exited without reporting completion";
pub const TASK_PANICKED: &str = "job task panicked";

/// Snapshot of the dispatcher state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatcherStats {
    pub queued: usize,
    pub running: usize,
    pub finished: usize,
    pub failed: usize,
}

enum Readiness {
    Ready,
    Waiting,
    ParentFailed,
}

/// The job execution engine.
pub struct Dispatcher {
    config: JobsConfig,
    max_concurrent: usize,

    /// Latest known record of every job, replaced as a whole on each update.
    registry: DashMap<String, JobRecord>,
    /// Unfinished jobs loaded from the state file and not yet resumed.
    detached: DashMap<String, JobRecord>,
    /// Cancellation handles of queued and running jobs.
    cancel_tokens: DashMap<String, CancellationToken>,

    queue: Mutex<JobQueue>,
    deps: Mutex<DependencyGraph>,

    slots: Arc<Semaphore>,
    running: AtomicUsize,
    wakeup: Notify,

    stop_tx: mpsc::Sender<String>,
    stop_rx: Mutex<Option<mpsc::Receiver<String>>>,

    store: PersistenceStore,
    runners: JobRunners,
    notifier: Arc<dyn JobNotifier>,

    shutdown_token: CancellationToken,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl Dispatcher {
    pub fn new(
        config: JobsConfig,
        store: PersistenceStore,
        runners: JobRunners,
        notifier: Arc<dyn JobNotifier>,
    ) -> Arc<Self> {
        let config = config.normalize();
        let max_concurrent = config.max_num_concurrent_jobs.max(1);
        let (stop_tx, stop_rx) = mpsc::channel(STOP_CHANNEL_CAPACITY);

        Arc::new(Self {
            config,
            max_concurrent,
            registry: DashMap::new(),
            detached: DashMap::new(),
            cancel_tokens: DashMap::new(),
            queue: Mutex::new(JobQueue::new()),
            deps: Mutex::new(DependencyGraph::new()),
            slots: Arc::new(Semaphore::new(max_concurrent)),
            running: AtomicUsize::new(0),
            wakeup: Notify::new(),
            stop_tx,
            stop_rx: Mutex::new(Some(stop_rx)),
            store,
            runners,
            notifier,
            shutdown_token: CancellationToken::new(),
            background: Mutex::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &JobsConfig {
        &self.config
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Spawn the dispatch loop and the maintenance task.
    pub fn start(self: &Arc<Self>) {
        let Some(stop_rx) = self.stop_rx.lock().take() else {
            warn!("Job dispatcher already started");
            return;
        };

        let dispatch = tokio::spawn(Arc::clone(self).run_dispatch_loop(stop_rx));
        let maintenance = spawn_maintenance(
            Arc::clone(self),
            MaintenanceConfig::from(&self.config),
            self.shutdown_token.child_token(),
        );
        self.background.lock().extend([dispatch, maintenance]);
    }

    async fn run_dispatch_loop(self: Arc<Self>, mut stop_rx: mpsc::Receiver<String>) {
        info!(
            max_concurrent = self.max_concurrent,
            "Job dispatcher started"
        );

        loop {
            self.dispatch_ready();

            tokio::select! {
                _ = self.shutdown_token.cancelled() => {
                    info!("Job dispatcher shutting down");
                    break;
                }
                Some(job_id) = stop_rx.recv() => {
                    self.handle_stop_request(&job_id);
                }
                _ = self.wakeup.notified() => {}
                _ = tokio::time::sleep(DISPATCH_POLL_INTERVAL) => {}
            }
        }
    }

    /// One pass over the queue. Each entry present at the start of the pass
    /// is looked at most once.
    fn dispatch_ready(self: &Arc<Self>) {
        let pending = self.queue.lock().size();
        let mut settled = false;

        for _ in 0..pending {
            let Ok(permit) = Arc::clone(&self.slots).try_acquire_owned() else {
                break;
            };
            let Ok(entry) = self.queue.lock().dequeue() else {
                break;
            };
            let job_id = entry.record.id().to_string();
            let cancel = self.cancel_token_for(&job_id);

            if cancel.is_cancelled() {
                debug!(job_id = %job_id, "Job cancelled while queued");
                self.finalize(entry.record.with_error(CANCELLED_BEFORE_START));
                settled = true;
                continue;
            }

            match self.readiness(&job_id) {
                Readiness::Ready => self.launch(entry, cancel, permit),
                Readiness::Waiting => {
                    debug!(job_id = %job_id, "Job waits for its parents, moved to the back");
                    self.queue.lock().enqueue(entry.task, entry.record);
                }
                Readiness::ParentFailed => {
                    info!(job_id = %job_id, "Skipping job, a parent job failed");
                    self.finalize(entry.record.with_error(PARENT_JOB_FAILED));
                    settled = true;
                }
            }
        }

        // finishing a job may have unblocked (or doomed) other queued jobs
        if settled {
            self.wakeup.notify_one();
        }
    }

    fn readiness(&self, job_id: &str) -> Readiness {
        let deps = self.deps.lock();
        match deps.has_failed_parent(job_id) {
            Err(_) => Readiness::Ready,
            Ok(true) => Readiness::ParentFailed,
            Ok(false) if deps.must_wait(job_id).unwrap_or(false) => Readiness::Waiting,
            Ok(false) => Readiness::Ready,
        }
    }

    fn cancel_token_for(&self, job_id: &str) -> CancellationToken {
        self.cancel_tokens
            .entry(job_id.to_string())
            .or_default()
            .value()
            .clone()
    }

    fn launch(
        self: &Arc<Self>,
        entry: QueueEntry,
        cancel: CancellationToken,
        permit: OwnedSemaphorePermit,
    ) {
        let QueueEntry { task, record } = entry;
        let job_id = record.id().to_string();
        let (tx, mut rx) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);
        let ctx = JobContext::new(job_id.clone(), tx, cancel);

        let started = record.touched();
        self.registry.insert(job_id.clone(), started.clone());
        self.running.fetch_add(1, Ordering::SeqCst);
        info!(
            job_id = %job_id,
            kind = %started.kind(),
            corpus_id = %started.corpus_id(),
            num_restarts = started.num_restarts(),
            "Starting job"
        );

        let handle = tokio::spawn(task(ctx));
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut last = started;
            let mut terminal = None;
            while let Some(update) = rx.recv().await {
                if update.id() != job_id {
                    warn!(
                        job_id = %job_id,
                        other_id = %update.id(),
                        "Ignoring update reported for another job"
                    );
                    continue;
                }
                if update.is_finished() {
                    terminal = Some(update);
                    break;
                }
                this.registry.insert(job_id.clone(), update.clone());
                last = update;
            }
            drop(rx);

            let terminal = match terminal {
                Some(record) => record,
                None => match handle.await {
                    Err(e) if e.is_panic() => {
                        error!(job_id = %job_id, "Job task panicked");
                        last.with_error(TASK_PANICKED)
                    }
                    _ => {
                        warn!(job_id = %job_id, "Job ended without a final status");
                        last.with_error(NO_COMPLETION_REPORTED)
                    }
                },
            };

            this.running.fetch_sub(1, Ordering::SeqCst);
            this.finalize(terminal);
            drop(permit);
            this.wakeup.notify_one();
        });
    }

    /// Record a terminal state and propagate it to dependents.
    fn finalize(&self, record: JobRecord) {
        let job_id = record.id().to_string();
        let failed = record.error().is_some();

        // the handle goes first, a caller that sees the terminal record may
        // restart the job right away
        self.cancel_tokens.remove(&job_id);
        self.registry.insert(job_id.clone(), record.clone());
        self.deps.lock().set_parent_finished(&job_id, failed);

        match record.error() {
            Some(err) => info!(job_id = %job_id, error = %err, "Job finished with error"),
            None => info!(job_id = %job_id, "Job finished"),
        }

        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            if let Err(e) = notifier.job_finished(&record).await {
                warn!(job_id = %record.id(), error = %e, "Failed to send job notification");
            }
        });
    }

    fn handle_stop_request(&self, job_id: &str) {
        let Some(token) = self.cancel_tokens.get(job_id).map(|t| t.value().clone()) else {
            debug!(job_id = %job_id, "Stop requested for an inactive job");
            return;
        };
        token.cancel();
        debug!(job_id = %job_id, "Job cancellation requested");

        // a job that has not started yet needs no slot to be settled
        let queued = self.queue.lock().remove(job_id);
        if let Some(entry) = queued {
            self.finalize(entry.record.with_error(CANCELLED_BEFORE_START));
        }
        self.wakeup.notify_one();
    }

    // ------------------------------------------------------------------
    // Submission
    // ------------------------------------------------------------------

    /// Submit a job.
    pub fn enqueue_job(&self, task: JobTask, record: JobRecord) {
        let job_id = record.id().to_string();
        self.cancel_token_for(&job_id);
        self.registry.insert(job_id.clone(), record.clone());
        info!(
            job_id = %job_id,
            kind = %record.kind(),
            corpus_id = %record.corpus_id(),
            "Job enqueued"
        );
        self.queue.lock().enqueue(task, record);
        self.wakeup.notify_one();
    }

    /// Submit a job that may start only after `parent_id` has finished.
    pub fn enqueue_job_after(&self, task: JobTask, record: JobRecord, parent_id: &str) -> Result<()> {
        if !self.registry.contains_key(parent_id) {
            return Err(Error::not_found("job", parent_id));
        }
        let job_id = record.id().to_string();
        {
            let mut deps = self.deps.lock();
            deps.add(&job_id, parent_id)?;
            // the parent may already be done, in which case nobody else
            // would ever flag the edge
            if let Some(parent) = self.registry.get(parent_id)
                && parent.is_finished()
            {
                deps.set_parent_finished(parent_id, parent.error().is_some());
            }
        }
        debug!(job_id = %job_id, parent_id = %parent_id, "Job depends on parent");
        self.enqueue_job(task, record);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn get_job(&self, job_id: &str) -> Option<JobRecord> {
        self.registry.get(job_id).map(|job| job.value().clone())
    }

    /// Look a job up by ID or by a unique ID prefix.
    pub fn find_job(&self, prefix: &str) -> Option<JobRecord> {
        if prefix.is_empty() {
            return None;
        }
        if let Some(job) = self.get_job(prefix) {
            return Some(job);
        }
        let mut matches = self
            .registry
            .iter()
            .filter(|entry| entry.key().starts_with(prefix));
        let found = matches.next()?.value().clone();
        if matches.next().is_some() {
            return None;
        }
        Some(found)
    }

    /// All registered jobs ordered by start time.
    pub fn jobs(&self) -> Vec<JobRecord> {
        let mut jobs: Vec<JobRecord> = self
            .registry
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        jobs.sort_by_key(JobRecord::start);
        jobs
    }

    pub fn list_compact(&self) -> Vec<CompactJobView> {
        self.jobs().iter().map(JobRecord::compact).collect()
    }

    pub fn list_full(&self) -> Vec<FullJobView> {
        self.jobs().iter().map(JobRecord::full).collect()
    }

    /// ID of the most recently started unfinished job of `kind` for a corpus.
    pub fn last_unfinished_job_of_type(&self, corpus_id: &str, kind: JobKind) -> Option<String> {
        self.registry
            .iter()
            .filter(|entry| {
                let job = entry.value();
                !job.is_finished() && job.kind() == kind && job.corpus_id() == corpus_id
            })
            .max_by_key(|entry| entry.value().start())
            .map(|entry| entry.key().clone())
    }

    pub fn stats(&self) -> DispatcherStats {
        let mut stats = DispatcherStats {
            queued: self.queue.lock().size(),
            running: self.running.load(Ordering::SeqCst),
            ..Default::default()
        };
        for entry in self.registry.iter() {
            let job = entry.value();
            if job.is_finished() {
                if job.error().is_some() {
                    stats.failed += 1;
                } else {
                    stats.finished += 1;
                }
            }
        }
        stats
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Remove a job from the registry if it has finished. Returns the
    /// current record (if any) and whether it was removed.
    pub fn clear_if_finished(&self, job_id: &str) -> (Option<JobRecord>, bool) {
        match self.registry.remove_if(job_id, |_, job| job.is_finished()) {
            Some((_, job)) => {
                self.deps.lock().remove(job_id);
                (Some(job), true)
            }
            None => (self.get_job(job_id), false),
        }
    }

    /// Remove finished jobs started more than `max_age` ago.
    pub fn prune_old_jobs(&self, max_age: chrono::Duration) -> usize {
        let cutoff = Utc::now() - max_age;
        let expired: Vec<String> = self
            .registry
            .iter()
            .filter(|entry| entry.value().is_finished() && entry.value().start() < cutoff)
            .map(|entry| entry.key().clone())
            .collect();

        let removed: Vec<String> = expired
            .into_iter()
            .filter(|id| {
                self.registry
                    .remove_if(id, |_, job| job.is_finished())
                    .is_some()
            })
            .collect();

        if !removed.is_empty() {
            let mut deps = self.deps.lock();
            for id in &removed {
                deps.remove(id);
            }
            info!(count = removed.len(), "Pruned old jobs");
        }
        removed.len()
    }

    /// Queue a stop request. The job is cancelled cooperatively.
    pub fn request_stop(&self, job_id: &str) -> Result<()> {
        self.stop_tx
            .try_send(job_id.to_string())
            .map_err(|e| Error::Other(format!("stop request not accepted: {e}")))
    }

    /// Sender side of the stop request stream.
    pub fn stop_sender(&self) -> mpsc::Sender<String> {
        self.stop_tx.clone()
    }

    /// Move the head of the queue one position back.
    pub fn delay_next(&self) -> Result<()> {
        let mut queue = self.queue.lock();
        queue.delay_next()?;
        debug!(head = ?queue.peek_id().ok(), "Delayed next queued job");
        Ok(())
    }

    /// Check whether `job` may be restarted.
    pub fn test_allows_job_restart(&self, job: &JobRecord) -> Result<()> {
        if job.is_finished() && job.error().is_none() {
            return Err(Error::restart_not_allowed(
                job.id(),
                "job already finished successfully",
            ));
        }
        if job.num_restarts() >= self.config.max_num_restarts {
            return Err(Error::restart_not_allowed(
                job.id(),
                format!(
                    "maximum number of restarts ({}) reached",
                    self.config.max_num_restarts
                ),
            ));
        }
        Ok(())
    }

    /// Run a job again using the runner registered for its kind.
    ///
    /// The registry's record of the job is authoritative; `job` is used only
    /// for jobs the registry does not know (detached ones).
    pub fn restart(&self, job: &JobRecord) -> Result<()> {
        let current = self.get_job(job.id()).unwrap_or_else(|| job.clone());
        let job_id = current.id();
        self.test_allows_job_restart(&current)?;
        if self.cancel_tokens.contains_key(job_id) {
            return Err(Error::restart_not_allowed(job_id, "job is still active"));
        }
        let runner = self
            .runners
            .get(current.kind())
            .ok_or_else(|| Error::not_found("job runner", current.kind().as_str()))?;

        let restarted = current.for_restart();
        let task = runner.build_task(&restarted)?;
        {
            let mut deps = self.deps.lock();
            deps.reopen_parent(job_id);
            deps.refresh_edges(job_id, |parent_id| {
                self.registry
                    .get(parent_id)
                    .map(|parent| (parent.is_finished(), parent.error().is_some()))
            });
        }
        self.detached.remove(job_id);
        info!(
            job_id = %job_id,
            num_restarts = restarted.num_restarts(),
            "Restarting job"
        );
        self.enqueue_job(task, restarted);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Persistence and detached jobs
    // ------------------------------------------------------------------

    /// Read the state file. Finished jobs go back to the registry, unfinished
    /// ones become detached. Returns the number of detached jobs.
    pub async fn load_state(&self) -> usize {
        for job in self.store.load_or_default().await {
            if job.is_finished() {
                self.registry.insert(job.id().to_string(), job);
            } else {
                self.detached.insert(job.id().to_string(), job);
            }
        }
        self.detached.len()
    }

    /// Detached jobs ordered by start time.
    pub fn get_detached_jobs(&self) -> Vec<JobRecord> {
        let mut jobs: Vec<JobRecord> = self
            .detached
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        jobs.sort_by_key(JobRecord::start);
        jobs
    }

    pub fn clear_detached_job(&self, job_id: &str) -> bool {
        self.detached.remove(job_id).is_some()
    }

    /// Restart every detached job. Jobs that cannot be restarted are
    /// recorded as failed and dropped from the detached list.
    pub fn resume_detached_jobs(&self) -> usize {
        let mut resumed = 0;
        for job in self.get_detached_jobs() {
            match self.restart(&job) {
                Ok(()) => resumed += 1,
                Err(e) => {
                    error!(
                        job_id = %job.id(),
                        kind = %job.kind(),
                        error = %e,
                        "Cannot resume detached job, clearing it"
                    );
                    self.clear_detached_job(job.id());
                    self.registry
                        .insert(job.id().to_string(), job.with_error(format!("not resumed: {e}")));
                }
            }
        }
        resumed
    }

    /// Every known job, including detached ones, for the state file.
    fn snapshot(&self) -> Vec<JobRecord> {
        let mut jobs = self.jobs();
        jobs.extend(
            self.get_detached_jobs()
                .into_iter()
                .filter(|job| !self.registry.contains_key(job.id())),
        );
        jobs
    }

    /// Write the current state file.
    pub async fn checkpoint(&self) -> Result<()> {
        self.store.serialize(&self.snapshot()).await
    }

    /// Stop the background tasks, cancel running jobs and write the final
    /// state. Jobs interrupted here stay unfinished in the state file so they
    /// are resumed on the next start.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down job dispatcher");
        self.shutdown_token.cancel();
        let handles: Vec<_> = std::mem::take(&mut *self.background.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }

        let snapshot = self.snapshot();
        let active: Vec<CancellationToken> = self
            .cancel_tokens
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for token in &active {
            token.cancel();
        }

        let all_slots = u32::try_from(self.max_concurrent).unwrap_or(u32::MAX);
        match tokio::time::timeout(SHUTDOWN_GRACE_PERIOD, self.slots.acquire_many(all_slots)).await
        {
            Ok(Ok(_permits)) => debug!("All running jobs stopped"),
            _ => warn!(
                running = self.running.load(Ordering::SeqCst),
                "Timed out waiting for running jobs to stop"
            ),
        }

        // jobs stopped by the cancellation above are saved as they were, so
        // they resume on the next start
        let records: Vec<JobRecord> = snapshot
            .into_iter()
            .map(|job| match self.registry.get(job.id()) {
                Some(current) if current.is_finished() && !stopped_by_shutdown(&current) => {
                    current.value().clone()
                }
                _ => job,
            })
            .collect();

        self.store.serialize(&records).await?;
        info!(
            count = records.len(),
            path = %self.store.path().display(),
            "Job state saved"
        );
        Ok(())
    }
}

fn stopped_by_shutdown(job: &JobRecord) -> bool {
    matches!(job.error(), Some(JOB_CANCELLED | NO_COMPLETION_REPORTED))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::record::{DummyArgs, DummyJob, NgramJob};
    use crate::jobs::task::job_task;
    use crate::notification::NoopNotifier;

    fn dispatcher(max_restarts: u32) -> Arc<Dispatcher> {
        Dispatcher::new(
            JobsConfig::default()
                .with_max_num_concurrent_jobs(2)
                .with_max_num_restarts(max_restarts),
            PersistenceStore::new("unused.json"),
            JobRunners::with_builtin(),
            Arc::new(NoopNotifier),
        )
    }

    fn dummy() -> JobRecord {
        DummyJob::new("syn2020", DummyArgs::default()).into()
    }

    fn noop() -> JobTask {
        job_task(|_ctx| async {})
    }

    #[test]
    fn test_restart_gate_finished_ok() {
        let dispatcher = dispatcher(3);
        let job = dummy().as_finished();
        assert!(matches!(
            dispatcher.test_allows_job_restart(&job),
            Err(Error::RestartNotAllowed { .. })
        ));
        assert!(dispatcher.test_allows_job_restart(&dummy()).is_ok());
        assert!(
            dispatcher
                .test_allows_job_restart(&dummy().with_error("boom"))
                .is_ok()
        );
    }

    #[test]
    fn test_restart_gate_cap() {
        let dispatcher = dispatcher(2);
        let mut job = dummy().with_error("boom");
        for _ in 0..2 {
            assert!(dispatcher.test_allows_job_restart(&job).is_ok());
            job = job.for_restart().with_error("boom");
        }
        assert_eq!(job.num_restarts(), 2);
        assert!(dispatcher.test_allows_job_restart(&job).is_err());
    }

    #[test]
    fn test_restart_without_runner() {
        let dispatcher = dispatcher(3);
        let job = JobRecord::from(NgramJob::new("syn2020")).with_error("boom");
        assert!(matches!(
            dispatcher.restart(&job),
            Err(Error::NotFound { .. })
        ));
        assert_eq!(dispatcher.stats().queued, 0);
    }

    #[test]
    fn test_enqueue_registers_job() {
        let dispatcher = dispatcher(3);
        let job = dummy();
        dispatcher.enqueue_job(noop(), job.clone());
        assert_eq!(dispatcher.get_job(job.id()), Some(job));
        assert_eq!(dispatcher.stats().queued, 1);
    }

    #[test]
    fn test_enqueue_after_unknown_parent() {
        let dispatcher = dispatcher(3);
        let result = dispatcher.enqueue_job_after(noop(), dummy(), "missing");
        assert!(matches!(result, Err(Error::NotFound { .. })));
        assert_eq!(dispatcher.stats().queued, 0);
    }

    #[test]
    fn test_enqueue_after_self_is_rejected() {
        let dispatcher = dispatcher(3);
        let job = dummy();
        dispatcher.enqueue_job(noop(), job.clone());
        let result = dispatcher.enqueue_job_after(noop(), job.clone(), job.id());
        assert!(matches!(
            result,
            Err(Error::Dependency(
                crate::jobs::DependencyError::CircularJobDependency
            ))
        ));
        assert_eq!(dispatcher.stats().queued, 1);
    }

    #[test]
    fn test_find_job_by_prefix() {
        let dispatcher = dispatcher(3);
        let mut first = DummyJob::new("syn2020", DummyArgs::default());
        first.meta.id = "abc-1".to_string();
        let mut second = DummyJob::new("syn2020", DummyArgs::default());
        second.meta.id = "abd-2".to_string();
        dispatcher.enqueue_job(noop(), first.into());
        dispatcher.enqueue_job(noop(), second.into());

        assert_eq!(dispatcher.find_job("abc").unwrap().id(), "abc-1");
        assert_eq!(dispatcher.find_job("abd-2").unwrap().id(), "abd-2");
        assert!(dispatcher.find_job("ab").is_none());
        assert!(dispatcher.find_job("x").is_none());
        assert!(dispatcher.find_job("").is_none());
    }

    #[test]
    fn test_clear_if_finished() {
        let dispatcher = dispatcher(3);
        let job = dummy();
        dispatcher.enqueue_job(noop(), job.clone());

        let (found, removed) = dispatcher.clear_if_finished(job.id());
        assert!(!removed);
        assert_eq!(found.unwrap().id(), job.id());

        dispatcher
            .registry
            .insert(job.id().to_string(), job.as_finished());
        let (found, removed) = dispatcher.clear_if_finished(job.id());
        assert!(removed);
        assert!(found.unwrap().is_finished());
        assert!(dispatcher.get_job(job.id()).is_none());

        assert_eq!(dispatcher.clear_if_finished("missing"), (None, false));
    }

    #[test]
    fn test_prune_old_jobs() {
        let dispatcher = dispatcher(3);
        let mut old = DummyJob::new("syn2020", DummyArgs::default());
        old.meta.start = Utc::now() - chrono::Duration::hours(200);
        let old: JobRecord = old.into();
        let mut old_running = DummyJob::new("syn2020", DummyArgs::default());
        old_running.meta.start = Utc::now() - chrono::Duration::hours(200);
        let old_running: JobRecord = old_running.into();
        let recent = dummy();

        for job in [old.as_finished(), old_running.clone(), recent.as_finished()] {
            dispatcher.registry.insert(job.id().to_string(), job);
        }

        assert_eq!(dispatcher.prune_old_jobs(chrono::Duration::hours(168)), 1);
        assert!(dispatcher.get_job(old.id()).is_none());
        assert!(dispatcher.get_job(old_running.id()).is_some());
        assert!(dispatcher.get_job(recent.id()).is_some());
    }

    #[test]
    fn test_last_unfinished_job_of_type() {
        let dispatcher = dispatcher(3);
        let mut older = DummyJob::new("syn2020", DummyArgs::default());
        older.meta.start = Utc::now() - chrono::Duration::minutes(5);
        let older: JobRecord = older.into();
        let newer = dummy();
        let done = dummy().as_finished();
        for job in [older.clone(), newer.clone(), done] {
            dispatcher.registry.insert(job.id().to_string(), job);
        }

        assert_eq!(
            dispatcher.last_unfinished_job_of_type("syn2020", JobKind::Dummy),
            Some(newer.id().to_string())
        );
        assert!(
            dispatcher
                .last_unfinished_job_of_type("syn2020", JobKind::Ngram)
                .is_none()
        );
        assert!(
            dispatcher
                .last_unfinished_job_of_type("other", JobKind::Dummy)
                .is_none()
        );
    }

    #[test]
    fn test_listings_sorted_by_start() {
        let dispatcher = dispatcher(3);
        let mut early = DummyJob::new("syn2020", DummyArgs::default());
        early.meta.start = Utc::now() - chrono::Duration::hours(1);
        let early: JobRecord = early.into();
        let late = dummy();
        dispatcher.enqueue_job(noop(), late.clone());
        dispatcher.enqueue_job(noop(), early.clone());

        let ids: Vec<String> = dispatcher
            .list_compact()
            .into_iter()
            .map(|view| view.id)
            .collect();
        assert_eq!(ids, vec![early.id().to_string(), late.id().to_string()]);
        assert_eq!(dispatcher.list_full().len(), 2);
    }

    #[test]
    fn test_delay_next() {
        let dispatcher = dispatcher(3);
        assert!(matches!(
            dispatcher.delay_next(),
            Err(Error::Queue(crate::jobs::QueueError::EmptyQueue))
        ));
        let a = dummy();
        let b = dummy();
        dispatcher.enqueue_job(noop(), a.clone());
        dispatcher.enqueue_job(noop(), b.clone());
        dispatcher.delay_next().unwrap();
        assert_eq!(dispatcher.queue.lock().peek_id().unwrap(), b.id());
    }
}
