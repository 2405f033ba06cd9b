use std::future::Future;

use crate::error::AppError;
use crate::job::{Job, JobMessage, JobStatus, JobType};
use crate::models::{HeroSummary, MatchDetail, MatchIngest, MatchSummary};

/// Read-only client for the external match-data API.
///
/// All calls may fail transiently; implementations surface that as an
/// error (or `None` for a single missing match) and never panic.
pub trait MatchDataApi: Send + Sync + Clone {
    /// Full hero catalog.
    fn get_heroes(&self) -> impl Future<Output = Result<Vec<HeroSummary>, AppError>> + Send;

    /// Up to `limit` recent candidate matches, newest first.
    fn get_recent_matches(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<MatchSummary>, AppError>> + Send;

    /// Full detail for one match. `Ok(None)` when the source has no
    /// usable record for the id.
    fn get_match_detail(
        &self,
        match_id: i64,
    ) -> impl Future<Output = Result<Option<MatchDetail>, AppError>> + Send;
}

/// Persistence for match data and the accumulated aggregates.
///
/// The ingestion pipeline is the only writer. `commit_match` must be
/// atomic: either the match, all its participations, and all aggregate
/// increments land, or none of them do.
pub trait MatchStore: Send + Sync + Clone {
    fn match_exists(&self, match_id: i64) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// Insert a catalog hero, or refresh its display fields (name, image)
    /// if it already exists — accumulated totals are never touched.
    /// Returns true if the hero was newly created.
    fn upsert_hero_display(
        &self,
        hero_id: i32,
        name: &str,
        image_url: Option<&str>,
    ) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// Commit one match's unit of work in a single transaction.
    ///
    /// Placeholder heroes/players are inserted only if absent. Fails with
    /// [`AppError::DuplicateKey`] when a concurrent ingester already
    /// inserted the match; the caller treats that as a no-op.
    fn commit_match(
        &self,
        ingest: &MatchIngest,
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Persistence and state-machine transitions for [`Job`] rows.
pub trait JobStore: Send + Sync + Clone {
    /// Create a Pending job with zeroed counters.
    fn create_job(
        &self,
        job_type: JobType,
        target: Option<&str>,
    ) -> impl Future<Output = Result<Job, AppError>> + Send;

    fn get_job(&self, job_id: i64) -> impl Future<Output = Result<Option<Job>, AppError>> + Send;

    fn set_running(&self, job_id: i64) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Update the processed counter without changing status.
    fn set_progress(
        &self,
        job_id: i64,
        matches_processed: i32,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Transition to Done, recording the processed count and completion time.
    fn complete_job(
        &self,
        job_id: i64,
        matches_processed: i32,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Transition to Failed, recording the error and completion time.
    fn fail_job(
        &self,
        job_id: i64,
        error: &str,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Explicit retry: back to Pending, retries + 1, error and completion
    /// time cleared. Fails with [`AppError::JobNotFound`] for unknown ids.
    fn retry_job(&self, job_id: i64) -> impl Future<Output = Result<Job, AppError>> + Send;

    /// Page through jobs ordered by creation time descending.
    fn list_jobs(
        &self,
        page: usize,
        page_size: usize,
        status: Option<JobStatus>,
    ) -> impl Future<Output = Result<Vec<Job>, AppError>> + Send;

    /// Pending + Running jobs.
    fn count_active(&self) -> impl Future<Output = Result<i64, AppError>> + Send;
}

/// Durable queue: publish on one side, a pull-based delivery stream with
/// explicit ack/nack on the other.
///
/// Implementations configure prefetch = 1 so each consumer holds at most
/// one unacknowledged delivery, spreading work across competing consumers.
pub trait MessageBroker: Send + Sync + Clone {
    type Delivery: BrokerDelivery;

    /// Serialize and enqueue durably. Fails loudly when the channel is
    /// unavailable — a silently dropped publish would orphan its job.
    fn publish(&self, message: &JobMessage)
    -> impl Future<Output = Result<(), AppError>> + Send;

    /// Wait for the next inbound delivery. `Ok(None)` means the consumer
    /// stream ended (e.g., the connection dropped); callers may retry.
    fn next_delivery(
        &self,
    ) -> impl Future<Output = Result<Option<Self::Delivery>, AppError>> + Send;

    /// Number of messages currently sitting in the queue.
    fn queue_depth(&self) -> impl Future<Output = Result<u32, AppError>> + Send;
}

/// A single in-flight delivery. Exactly one of `ack`/`nack` must be
/// called; dropping a delivery without either leaves it unacked.
pub trait BrokerDelivery: Send {
    fn payload(&self) -> &[u8];

    fn ack(self) -> impl Future<Output = Result<(), AppError>> + Send;

    fn nack(self, requeue: bool) -> impl Future<Output = Result<(), AppError>> + Send;
}
