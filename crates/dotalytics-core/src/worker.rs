//! Long-running queue consumer binding broker, pipeline, and job store.
//!
//! One delivery is handled at a time (the broker's prefetch = 1 is the
//! backpressure mechanism). Shutdown is checked only while waiting for
//! the next delivery; an in-flight message always runs to completion.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::ingest::IngestionPipeline;
use crate::job::{JobMessage, JobType, WorkerConfig};
use crate::traits::{BrokerDelivery, JobStore, MatchDataApi, MatchStore, MessageBroker};

/// Events emitted by the worker for monitoring/logging.
#[derive(Debug, Clone)]
pub enum WorkerEvent<'a> {
    Started,
    JobReceived {
        job_id: i64,
        job_type: JobType,
    },
    JobCompleted {
        job_id: i64,
        processed: i32,
    },
    JobFailed {
        job_id: i64,
        error: &'a str,
        will_retry: bool,
    },
    PoisonMessage {
        error: &'a str,
    },
    Stopped,
}

/// Trait for receiving worker events (decoupled logging).
pub trait WorkerReporter: Send + Sync {
    fn report(&self, event: WorkerEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingWorkerReporter;

impl WorkerReporter for TracingWorkerReporter {
    fn report(&self, event: WorkerEvent<'_>) {
        match event {
            WorkerEvent::Started => {
                tracing::info!("Worker started");
            }
            WorkerEvent::JobReceived { job_id, job_type } => {
                tracing::info!(%job_id, %job_type, "Processing job");
            }
            WorkerEvent::JobCompleted { job_id, processed } => {
                tracing::info!(%job_id, %processed, "Job completed");
            }
            WorkerEvent::JobFailed {
                job_id,
                error,
                will_retry,
            } => {
                tracing::warn!(%job_id, %error, %will_retry, "Job failed");
            }
            WorkerEvent::PoisonMessage { error } => {
                tracing::error!(%error, "Dropping unparseable job message");
            }
            WorkerEvent::Stopped => {
                tracing::info!("Worker stopped");
            }
        }
    }
}

/// Consumer loop: broker deliveries in, ingestion out, job rows updated.
pub struct Worker<B, A, S, J>
where
    B: MessageBroker,
    A: MatchDataApi,
    S: MatchStore,
    J: JobStore,
{
    broker: B,
    pipeline: IngestionPipeline<A, S>,
    jobs: J,
    config: WorkerConfig,
    /// Delivery attempts per job id, kept in-process. The persisted retry
    /// counter only moves on explicit retry, so redelivery exhaustion is
    /// tracked here.
    attempts: Arc<Mutex<HashMap<i64, u32>>>,
}

impl<B, A, S, J> Worker<B, A, S, J>
where
    B: MessageBroker,
    A: MatchDataApi,
    S: MatchStore,
    J: JobStore,
{
    pub fn new(broker: B, pipeline: IngestionPipeline<A, S>, jobs: J, config: WorkerConfig) -> Self {
        Self {
            broker,
            pipeline,
            jobs,
            config,
            attempts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Run the consumption loop until cancellation. Cancellation is only
    /// observed at the wait-for-delivery point.
    pub async fn run<R: WorkerReporter>(
        &self,
        cancel_token: CancellationToken,
        reporter: &R,
    ) -> Result<(), AppError> {
        reporter.report(WorkerEvent::Started);

        loop {
            let delivery = tokio::select! {
                () = cancel_token.cancelled() => break,
                result = self.broker.next_delivery() => match result {
                    Ok(Some(delivery)) => delivery,
                    Ok(None) => {
                        tracing::warn!("Delivery stream ended, re-subscribing");
                        tokio::select! {
                            () = tokio::time::sleep(IDLE_BACKOFF) => continue,
                            () = cancel_token.cancelled() => break,
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to receive delivery");
                        tokio::select! {
                            () = tokio::time::sleep(IDLE_BACKOFF) => continue,
                            () = cancel_token.cancelled() => break,
                        }
                    }
                },
            };

            self.handle_delivery(delivery, reporter).await;
        }

        reporter.report(WorkerEvent::Stopped);
        Ok(())
    }

    /// Handle one delivery end to end: parse, dispatch, and settle with
    /// exactly one ack or nack.
    pub async fn handle_delivery<R: WorkerReporter>(&self, delivery: B::Delivery, reporter: &R) {
        let message: JobMessage = match serde_json::from_slice(delivery.payload()) {
            Ok(message) => message,
            Err(e) => {
                // Poison messages must not requeue forever.
                reporter.report(WorkerEvent::PoisonMessage {
                    error: &e.to_string(),
                });
                if let Err(ack_err) = delivery.ack().await {
                    tracing::error!(error = %ack_err, "Failed to ack poison message");
                }
                return;
            }
        };

        reporter.report(WorkerEvent::JobReceived {
            job_id: message.job_id,
            job_type: message.job_type,
        });

        match self.run_job(&message).await {
            Ok(processed) => {
                self.clear_attempts(message.job_id);
                reporter.report(WorkerEvent::JobCompleted {
                    job_id: message.job_id,
                    processed,
                });
                if let Err(e) = delivery.ack().await {
                    tracing::error!(job_id = message.job_id, error = %e, "Failed to ack delivery");
                }
            }
            Err(e) => {
                let error_msg = e.to_string();
                let attempts = self.record_attempt(message.job_id);

                if attempts < self.config.max_retries {
                    // Leave the job row untouched; the redelivery will
                    // find it still retryable.
                    reporter.report(WorkerEvent::JobFailed {
                        job_id: message.job_id,
                        error: &error_msg,
                        will_retry: true,
                    });
                    if let Err(nack_err) = delivery.nack(true).await {
                        tracing::error!(
                            job_id = message.job_id,
                            error = %nack_err,
                            "Failed to nack delivery"
                        );
                    }
                } else {
                    self.clear_attempts(message.job_id);
                    reporter.report(WorkerEvent::JobFailed {
                        job_id: message.job_id,
                        error: &error_msg,
                        will_retry: false,
                    });
                    if let Err(fail_err) = self.jobs.fail_job(message.job_id, &error_msg).await {
                        tracing::error!(
                            job_id = message.job_id,
                            error = %fail_err,
                            "Failed to mark job as failed"
                        );
                    }
                    // Ack to stop redelivery; the job is terminally
                    // exhausted until a manual retry republishes it.
                    if let Err(ack_err) = delivery.ack().await {
                        tracing::error!(
                            job_id = message.job_id,
                            error = %ack_err,
                            "Failed to ack exhausted delivery"
                        );
                    }
                }
            }
        }
    }

    async fn run_job(&self, message: &JobMessage) -> Result<i32, AppError> {
        // Confirm the job row still exists before doing any work.
        if self.jobs.get_job(message.job_id).await?.is_none() {
            return Err(AppError::JobNotFound(message.job_id));
        }

        self.jobs.set_running(message.job_id).await?;

        let processed = match message.job_type {
            JobType::IngestHeroes => self.pipeline.ingest_heroes().await?,
            JobType::IngestMatches => {
                self.pipeline.ingest_matches(self.config.matches_per_job).await?
            }
            JobType::AggregateStats => {
                // Aggregates are maintained during ingestion and read on
                // demand; nothing to recompute.
                tracing::info!(job_id = message.job_id, "AggregateStats: no action needed");
                0
            }
        } as i32;

        self.jobs.complete_job(message.job_id, processed).await?;
        Ok(processed)
    }

    fn record_attempt(&self, job_id: i64) -> u32 {
        let mut attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        let entry = attempts.entry(job_id).or_insert(0);
        *entry += 1;
        *entry
    }

    fn clear_attempts(&self, job_id: i64) {
        let mut attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        attempts.remove(&job_id);
    }
}

/// Pause between consume attempts when the broker is unavailable.
const IDLE_BACKOFF: Duration = Duration::from_secs(5);
