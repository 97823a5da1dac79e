//! Structural errors of the job queue and the dependency graph.

use thiserror::Error;

/// Errors returned by [`JobQueue`](super::JobQueue) operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    /// No entry is pending.
    #[error("empty queue")]
    EmptyQueue,
}

/// Errors returned by [`DependencyGraph`](super::DependencyGraph) operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DependencyError {
    /// The job has no recorded parents.
    #[error("no such job dependency")]
    NoSuchJobDependency,

    /// The same parent has already been registered for the job.
    #[error("duplicate dependency")]
    DuplicateDependency,

    /// The new edge would close a cycle.
    #[error("circular job dependency")]
    CircularJobDependency,
}
