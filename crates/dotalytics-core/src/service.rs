//! Job orchestration: the producing side of the queue.

use crate::error::AppError;
use crate::job::{Job, JobStatus, JobType};
use crate::traits::{JobStore, MessageBroker};

/// Creates job rows and publishes their messages. The database row is the
/// source of truth; the queue message is only a pointer to it.
#[derive(Clone)]
pub struct JobService<J, B>
where
    J: JobStore,
    B: MessageBroker,
{
    jobs: J,
    broker: B,
}

impl<J, B> JobService<J, B>
where
    J: JobStore,
    B: MessageBroker,
{
    pub fn new(jobs: J, broker: B) -> Self {
        Self { jobs, broker }
    }

    /// Create a Pending job and publish it. A failed publish propagates:
    /// the row stays Pending and no worker will ever see it, so the
    /// caller must know the enqueue did not happen.
    pub async fn create_job(
        &self,
        job_type: JobType,
        target: Option<&str>,
    ) -> Result<Job, AppError> {
        let job = self.jobs.create_job(job_type, target).await?;
        tracing::info!(job_id = job.id, %job_type, "Job created");

        self.broker.publish(&job.to_message()).await?;
        Ok(job)
    }

    /// Reset a job to Pending (retries + 1, error cleared) and republish.
    pub async fn retry_job(&self, job_id: i64) -> Result<Job, AppError> {
        let job = self.jobs.retry_job(job_id).await?;
        tracing::info!(%job_id, retries = job.retries, "Job queued for retry");

        self.broker.publish(&job.to_message()).await?;
        Ok(job)
    }

    pub async fn get_job(&self, job_id: i64) -> Result<Option<Job>, AppError> {
        self.jobs.get_job(job_id).await
    }

    pub async fn list_jobs(
        &self,
        page: usize,
        page_size: usize,
        status: Option<JobStatus>,
    ) -> Result<Vec<Job>, AppError> {
        self.jobs.list_jobs(page, page_size, status).await
    }

    /// Pending + Running jobs, for a quick health read.
    pub async fn active_job_count(&self) -> Result<i64, AppError> {
        self.jobs.count_active().await
    }

    /// Messages currently waiting in the queue.
    pub async fn queue_depth(&self) -> Result<u32, AppError> {
        self.broker.queue_depth().await
    }
}
