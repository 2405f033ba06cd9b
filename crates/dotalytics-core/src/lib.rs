//! Core domain for the dotalytics ingestion system.
//!
//! Holds the shared types (jobs, matches, aggregates), the trait seams
//! the other crates implement (API client, stores, broker), and the
//! runtime-agnostic logic: rate limiting, ingestion, job orchestration,
//! and the queue-consuming worker.

pub mod error;
pub mod ingest;
pub mod job;
pub mod models;
pub mod rate_limit;
pub mod service;
pub mod traits;
pub mod worker;


pub use error::AppError;
pub use ingest::IngestionPipeline;
pub use job::{Job, JobMessage, JobStatus, JobType, WorkerConfig};
pub use rate_limit::RateLimiter;
pub use service::JobService;
pub use traits::{BrokerDelivery, JobStore, MatchDataApi, MatchStore, MessageBroker};
pub use worker::{TracingWorkerReporter, Worker, WorkerEvent, WorkerReporter};
