//! Job orchestration engine.
//!
//! Producers build a [`JobRecord`] together with a [`JobTask`] and hand both
//! to the [`Dispatcher`], which runs them under a concurrency ceiling, keeps
//! the latest record of every job and persists the job list through a
//! [`PersistenceStore`].

pub mod deps;
pub mod dispatcher;
pub mod error;
pub mod purge;
pub mod queue;
pub mod record;
pub mod runner;
pub mod store;
pub mod task;

pub use deps::{DepInfo, DependencyGraph};
pub use dispatcher::{
    CANCELLED_BEFORE_START, Dispatcher, DispatcherStats, JOB_CANCELLED, NO_COMPLETION_REPORTED,
    PARENT_JOB_FAILED, TASK_PANICKED,
};
pub use error::{DependencyError, QueueError};
pub use purge::MaintenanceConfig;
pub use queue::{JobQueue, QueueEntry};
pub use record::{
    CompactJobView, CorpusSyncJob, DirInfo, DummyArgs, DummyJob, DummyResult, FullJobView,
    IdxUpdateArgs, IdxUpdateJob, IdxUpdateResult, JobKind, JobMeta, JobRecord, KeywordsArgs,
    KeywordsJob, KeywordsResult, LiveAttrsArgs, LiveAttrsJob, NgramJob, NgramResult, SyncResult,
};
pub use runner::{DummyRunner, JobRunner, JobRunners};
pub use store::PersistenceStore;
pub use task::{JobContext, JobTask, job_task};
