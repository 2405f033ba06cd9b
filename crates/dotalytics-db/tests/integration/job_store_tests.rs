use dotalytics_core::error::AppError;
use dotalytics_core::job::{JobStatus, JobType};
use dotalytics_core::traits::JobStore;
use dotalytics_db::JobRepository;

use crate::integration::common::setup_test_db;

#[tokio::test]
async fn create_job_and_verify_fields() {
    let (pool, _container) = setup_test_db().await;
    let repo = JobRepository::new(pool);

    let job = repo
        .create_job(JobType::IngestMatches, Some("pro"))
        .await
        .unwrap();

    assert_eq!(job.job_type, JobType::IngestMatches);
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.target.as_deref(), Some("pro"));
    assert_eq!(job.matches_processed, 0);
    assert_eq!(job.retries, 0);
    assert!(job.error.is_none());
    assert!(job.completed_at.is_none());
}

#[tokio::test]
async fn job_ids_are_monotonic() {
    let (pool, _container) = setup_test_db().await;
    let repo = JobRepository::new(pool);

    let first = repo.create_job(JobType::IngestHeroes, None).await.unwrap();
    let second = repo.create_job(JobType::IngestHeroes, None).await.unwrap();
    assert!(second.id > first.id);
}

#[tokio::test]
async fn running_then_done_lifecycle() {
    let (pool, _container) = setup_test_db().await;
    let repo = JobRepository::new(pool);

    let job = repo.create_job(JobType::IngestMatches, None).await.unwrap();
    repo.set_running(job.id).await.unwrap();

    let running = repo.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(running.status, JobStatus::Running);

    repo.set_progress(job.id, 10).await.unwrap();
    let progressed = repo.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(progressed.matches_processed, 10);
    assert_eq!(progressed.status, JobStatus::Running);

    repo.complete_job(job.id, 25).await.unwrap();
    let done = repo.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(done.status, JobStatus::Done);
    assert_eq!(done.matches_processed, 25);
    assert!(done.completed_at.is_some());
}

#[tokio::test]
async fn failed_job_records_error() {
    let (pool, _container) = setup_test_db().await;
    let repo = JobRepository::new(pool);

    let job = repo.create_job(JobType::IngestMatches, None).await.unwrap();
    repo.fail_job(job.id, "upstream unavailable").await.unwrap();

    let failed = repo.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.error.as_deref(), Some("upstream unavailable"));
    assert!(failed.completed_at.is_some());
}

#[tokio::test]
async fn retry_resets_failed_job() {
    let (pool, _container) = setup_test_db().await;
    let repo = JobRepository::new(pool);

    let job = repo.create_job(JobType::IngestMatches, None).await.unwrap();
    repo.fail_job(job.id, "boom").await.unwrap();

    let retried = repo.retry_job(job.id).await.unwrap();
    assert_eq!(retried.status, JobStatus::Pending);
    assert_eq!(retried.retries, 1);
    assert!(retried.error.is_none());
    assert!(retried.completed_at.is_none());

    // A second retry keeps counting.
    let again = repo.retry_job(job.id).await.unwrap();
    assert_eq!(again.retries, 2);
}

#[tokio::test]
async fn retry_of_unknown_job_returns_not_found() {
    let (pool, _container) = setup_test_db().await;
    let repo = JobRepository::new(pool);

    let result = repo.retry_job(424242).await;
    assert!(matches!(result, Err(AppError::JobNotFound(424242))));
}

#[tokio::test]
async fn get_unknown_job_returns_none() {
    let (pool, _container) = setup_test_db().await;
    let repo = JobRepository::new(pool);

    assert!(repo.get_job(424242).await.unwrap().is_none());
}

#[tokio::test]
async fn list_jobs_pages_newest_first() {
    let (pool, _container) = setup_test_db().await;
    let repo = JobRepository::new(pool);

    let mut ids = Vec::new();
    for _ in 0..5 {
        ids.push(repo.create_job(JobType::IngestMatches, None).await.unwrap().id);
    }

    let first_page = repo.list_jobs(1, 2, None).await.unwrap();
    assert_eq!(first_page.len(), 2);
    assert_eq!(first_page[0].id, ids[4]);
    assert_eq!(first_page[1].id, ids[3]);

    let second_page = repo.list_jobs(2, 2, None).await.unwrap();
    assert_eq!(second_page[0].id, ids[2]);
}

#[tokio::test]
async fn list_jobs_filters_by_status() {
    let (pool, _container) = setup_test_db().await;
    let repo = JobRepository::new(pool);

    let done = repo.create_job(JobType::IngestHeroes, None).await.unwrap();
    repo.create_job(JobType::IngestMatches, None).await.unwrap();
    repo.complete_job(done.id, 3).await.unwrap();

    let done_jobs = repo.list_jobs(1, 10, Some(JobStatus::Done)).await.unwrap();
    assert_eq!(done_jobs.len(), 1);
    assert_eq!(done_jobs[0].id, done.id);

    let pending_jobs = repo
        .list_jobs(1, 10, Some(JobStatus::Pending))
        .await
        .unwrap();
    assert_eq!(pending_jobs.len(), 1);
}

#[tokio::test]
async fn count_active_ignores_terminal_jobs() {
    let (pool, _container) = setup_test_db().await;
    let repo = JobRepository::new(pool);

    let first = repo.create_job(JobType::IngestMatches, None).await.unwrap();
    let second = repo.create_job(JobType::IngestMatches, None).await.unwrap();
    repo.create_job(JobType::IngestMatches, None).await.unwrap();
    assert_eq!(repo.count_active().await.unwrap(), 3);

    repo.set_running(first.id).await.unwrap();
    assert_eq!(repo.count_active().await.unwrap(), 3);

    repo.complete_job(first.id, 1).await.unwrap();
    repo.fail_job(second.id, "boom").await.unwrap();
    assert_eq!(repo.count_active().await.unwrap(), 1);
}
