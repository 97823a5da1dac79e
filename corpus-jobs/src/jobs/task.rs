//! Units of work and the context handed to them.

use std::future::Future;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::record::JobRecord;

/// A job body. It receives a [`JobContext`], streams record updates through
/// it and finishes by dropping the context, which closes the update channel.
pub type JobTask = Box<dyn FnOnce(JobContext) -> BoxFuture<'static, ()> + Send + 'static>;

/// Box an async closure into a [`JobTask`].
pub fn job_task<F, Fut>(f: F) -> JobTask
where
    F: FnOnce(JobContext) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Box::new(move |ctx| f(ctx).boxed())
}

/// Handle given to a running job.
#[derive(Debug)]
pub struct JobContext {
    job_id: String,
    updates: mpsc::Sender<JobRecord>,
    cancel: CancellationToken,
}

impl JobContext {
    pub fn new(
        job_id: impl Into<String>,
        updates: mpsc::Sender<JobRecord>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            updates,
            cancel,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Publish a new state of the job. Returns false once nobody listens.
    pub async fn send(&self, record: JobRecord) -> bool {
        self.updates.send(record).await.is_ok()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves when an operator asks the job to stop.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }
}
