use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Mutex, MutexGuard},
};

use chrono::{DateTime, Duration, Utc};
use common::{domain::job_id::JobId, helper::error_chain_fmt};
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobState {
    Queued,
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct Job {
    pub job_id: JobId,
    pub source_path: PathBuf,
    /// Only set once the upscaled image has been received
    pub result_path: Option<PathBuf>,
    pub state: JobState,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    fn new(job_id: JobId, source_path: PathBuf, state: JobState) -> Self {
        let now = Utc::now();

        Self {
            job_id,
            source_path,
            result_path: None,
            state,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Evictions of expired jobs are at most this frequent, each one scanning the whole table
const EVICTION_INTERVAL_SECONDS: i64 = 60;

/// In-memory record of the jobs handled by this intake instance
///
/// Completed and failed jobs are forgotten once they have not changed for `retention`,
/// queued jobs are kept until they end.
/// The lock is never held across an `.await`.
#[derive(Debug)]
pub struct JobTable {
    retention: Duration,
    jobs: Mutex<Jobs>,
}

#[derive(Debug)]
struct Jobs {
    by_id: HashMap<JobId, Job>,
    last_eviction: DateTime<Utc>,
}

impl JobTable {
    pub fn new(retention: Duration) -> Self {
        Self {
            retention,
            jobs: Mutex::new(Jobs {
                by_id: HashMap::new(),
                last_eviction: Utc::now(),
            }),
        }
    }

    fn jobs(&self) -> MutexGuard<'_, Jobs> {
        // A panic while holding the lock leaves the map in a consistent state: every update is a single insert
        self.jobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Removes the completed and failed jobs older than the retention, called before every insertion
    fn evict_expired(&self, jobs: &mut Jobs) {
        let now = Utc::now();
        let interval = Duration::seconds(EVICTION_INTERVAL_SECONDS).min(self.retention);

        if now - jobs.last_eviction < interval {
            return;
        }
        jobs.last_eviction = now;

        let Some(expiry) = now.checked_sub_signed(self.retention) else {
            return;
        };

        let before = jobs.by_id.len();
        jobs.by_id
            .retain(|_, job| job.state == JobState::Queued || job.updated_at > expiry);

        let evicted = before - jobs.by_id.len();
        if evicted > 0 {
            debug!("Evicted {} expired jobs from the job table", evicted);
        }
    }

    /// Registers a new `Queued` job
    ///
    /// Fails if a job with the same id is still queued. A completed or failed job can be submitted again.
    pub fn try_reserve(&self, job_id: &JobId, source_path: PathBuf) -> Result<(), JobTableError> {
        let mut jobs = self.jobs();
        self.evict_expired(&mut jobs);

        if let Some(job) = jobs.by_id.get(job_id) {
            if job.state == JobState::Queued {
                return Err(JobTableError::AlreadyQueued(job_id.to_string()));
            }
        }

        jobs.by_id.insert(
            job_id.clone(),
            Job::new(job_id.clone(), source_path, JobState::Queued),
        );
        Ok(())
    }

    /// Forgets a reservation whose job could not be queued
    pub fn release(&self, job_id: &JobId) {
        let mut jobs = self.jobs();

        if matches!(jobs.by_id.get(job_id), Some(job) if job.state == JobState::Queued) {
            jobs.by_id.remove(job_id);
        }
    }

    /// Records the reception of the upscaled image
    ///
    /// Jobs unknown to this instance (queued before a restart) are recorded as well.
    pub fn mark_completed(&self, job_id: &JobId, source_path: PathBuf, result_path: PathBuf) {
        let mut jobs = self.jobs();
        self.evict_expired(&mut jobs);

        let job = jobs
            .by_id
            .entry(job_id.clone())
            .or_insert_with(|| Job::new(job_id.clone(), source_path, JobState::Completed));

        job.state = JobState::Completed;
        job.result_path = Some(result_path);
        job.failure_reason = None;
        job.updated_at = Utc::now();
    }

    pub fn mark_failed(&self, job_id: &JobId, source_path: PathBuf, reason: &str) {
        let mut jobs = self.jobs();
        self.evict_expired(&mut jobs);

        let job = jobs
            .by_id
            .entry(job_id.clone())
            .or_insert_with(|| Job::new(job_id.clone(), source_path, JobState::Failed));

        job.state = JobState::Failed;
        job.failure_reason = Some(reason.to_string());
        job.updated_at = Utc::now();
    }

    pub fn get(&self, job_id: &JobId) -> Option<Job> {
        self.jobs().by_id.get(job_id).cloned()
    }
}

#[derive(thiserror::Error)]
pub enum JobTableError {
    #[error("A job with the id {0} is already queued")]
    AlreadyQueued(String),
}

impl std::fmt::Debug for JobTableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
