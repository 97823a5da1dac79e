//! Kind-specific task factories.
//!
//! The dispatcher needs to rebuild a job body from nothing but its record
//! when a job is restarted, either by an operator or after a process restart.
//! Each job kind registers a [`JobRunner`] for that purpose.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::dispatcher::JOB_CANCELLED;
use super::record::{DummyJob, DummyResult, JobKind, JobRecord};
use super::task::{JobTask, job_task};
use crate::{Error, Result};

/// Builds runnable tasks for one job kind.
pub trait JobRunner: Send + Sync {
    fn kind(&self) -> JobKind;

    /// Build a task that (re)runs the job described by `record`.
    fn build_task(&self, record: &JobRecord) -> Result<JobTask>;
}

/// Runners indexed by job kind.
#[derive(Clone, Default)]
pub struct JobRunners {
    runners: HashMap<JobKind, Arc<dyn JobRunner>>,
}

impl JobRunners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in runners.
    pub fn with_builtin() -> Self {
        let mut runners = Self::new();
        runners.register(Arc::new(DummyRunner));
        runners
    }

    /// Register a runner, replacing any previous one for the same kind.
    pub fn register(&mut self, runner: Arc<dyn JobRunner>) {
        self.runners.insert(runner.kind(), runner);
    }

    pub fn get(&self, kind: JobKind) -> Option<Arc<dyn JobRunner>> {
        self.runners.get(&kind).cloned()
    }

    pub fn kinds(&self) -> impl Iterator<Item = JobKind> + '_ {
        self.runners.keys().copied()
    }
}

impl std::fmt::Debug for JobRunners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.kinds()).finish()
    }
}

/// Runner of the no-op `dummy-job` kind.
///
/// Sleeps for the requested duration and then succeeds, or fails when asked
/// to. Stops early on cancellation.
#[derive(Debug, Default, Clone, Copy)]
pub struct DummyRunner;

impl DummyRunner {
    pub fn task(job: DummyJob) -> JobTask {
        job_task(move |ctx| async move {
            let mut job = job;
            let duration = Duration::from_millis(job.args.duration_ms);
            tokio::select! {
                _ = ctx.cancelled() => {
                    debug!(job_id = %ctx.job_id(), "Dummy job cancelled");
                    ctx.send(JobRecord::from(job).with_error(JOB_CANCELLED)).await;
                    return;
                }
                _ = tokio::time::sleep(duration) => {}
            }

            if job.args.fail {
                ctx.send(JobRecord::from(job).with_error("dummy job failed on request"))
                    .await;
                return;
            }
            job.result = Some(DummyResult {
                payload: format!("slept {} ms", job.args.duration_ms),
            });
            ctx.send(JobRecord::from(job).as_finished()).await;
        })
    }
}

impl JobRunner for DummyRunner {
    fn kind(&self) -> JobKind {
        JobKind::Dummy
    }

    fn build_task(&self, record: &JobRecord) -> Result<JobTask> {
        match record {
            JobRecord::Dummy(job) => Ok(Self::task(job.clone())),
            other => Err(Error::Other(format!(
                "dummy runner cannot run job of type {}",
                other.kind()
            ))),
        }
    }
}
