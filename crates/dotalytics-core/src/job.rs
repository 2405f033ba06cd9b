use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a job in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "done" => Ok(JobStatus::Done),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(format!("Unknown job status: {}", s)),
        }
    }
}

/// What kind of work a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobType {
    IngestHeroes,
    IngestMatches,
    AggregateStats,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::IngestHeroes => "IngestHeroes",
            JobType::IngestMatches => "IngestMatches",
            JobType::AggregateStats => "AggregateStats",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IngestHeroes" => Ok(JobType::IngestHeroes),
            "IngestMatches" => Ok(JobType::IngestMatches),
            "AggregateStats" => Ok(JobType::AggregateStats),
            _ => Err(format!("Unknown job type: {}", s)),
        }
    }
}

/// A unit of asynchronous work tracked in the database.
///
/// The id is assigned by the store (monotonic). Status transitions follow
/// Pending -> Running -> Done | Failed, with Failed -> Pending reachable
/// only through an explicit retry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub job_type: JobType,
    pub status: JobStatus,
    /// Free-form scope string (e.g., a league or player filter).
    pub target: Option<String>,
    pub matches_processed: i32,
    pub retries: i32,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Wire-level projection published to the queue.
    pub fn to_message(&self) -> JobMessage {
        JobMessage {
            job_id: self.id,
            job_type: self.job_type,
            target: self.target.clone(),
        }
    }
}

/// Queue message: just enough to resume processing a job.
/// Immutable once published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobMessage {
    pub job_id: i64,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub target: Option<String>,
}

/// Configuration for the consuming worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Delivery attempts allowed before a job is terminally failed.
    pub max_retries: u32,
    /// Batch size for IngestMatches jobs without an explicit target.
    pub matches_per_job: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            matches_per_job: 50,
        }
    }
}

impl WorkerConfig {
    /// Read configuration from environment variables.
    ///
    /// - `JOB_MAX_RETRIES` (optional, defaults to 3)
    /// - `JOB_MATCHES_PER_RUN` (optional, defaults to 50)
    pub fn from_env() -> Result<Self, crate::error::AppError> {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var("JOB_MAX_RETRIES") {
            config.max_retries = raw.parse().map_err(|_| {
                crate::error::AppError::ConfigError(format!(
                    "Invalid JOB_MAX_RETRIES '{raw}': must be a non-negative integer"
                ))
            })?;
        }
        if let Ok(raw) = std::env::var("JOB_MATCHES_PER_RUN") {
            config.matches_per_job = raw.parse().map_err(|_| {
                crate::error::AppError::ConfigError(format!(
                    "Invalid JOB_MATCHES_PER_RUN '{raw}': must be a positive integer"
                ))
            })?;
        }

        Ok(config)
    }
}
