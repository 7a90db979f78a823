use actix_web::{
    http::{header::ContentType, StatusCode},
    web, HttpResponse, ResponseError,
};
use chrono::{DateTime, Utc};
use common::{
    core::image_file_repository::{ImageFileRepository, ImageFileRepositoryError},
    domain::job_id::{JobId, JobIdError},
    helper::error_chain_fmt,
};
use serde::Serialize;

use super::UniqueIdQuery;
use crate::domain::entities::job::{Job, JobState, JobTable};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub unique_id: String,
    pub state: JobState,
    /// Unknown when the state was rebuilt from the storage
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl From<Job> for JobStatusResponse {
    fn from(job: Job) -> Self {
        Self {
            unique_id: job.job_id.to_string(),
            state: job.state,
            created_at: Some(job.created_at),
            updated_at: Some(job.updated_at),
            failure_reason: job.failure_reason,
        }
    }
}

/// Returns the state of a job
///
/// Jobs unknown to the job table, for ex queued before a restart, get their state from the stored images.
#[tracing::instrument(name = "Job status handler", skip(image_repository, job_table))]
pub async fn job_status(
    query: web::Query<UniqueIdQuery>,
    image_repository: web::Data<ImageFileRepository>,
    job_table: web::Data<JobTable>,
) -> Result<HttpResponse, JobStatusError> {
    let job_id = JobId::parse(&query.unique_id)?;

    if let Some(job) = job_table.get(&job_id) {
        return Ok(HttpResponse::Ok().json(JobStatusResponse::from(job)));
    }

    let state = if image_repository.upscaled_exists(&job_id).await? {
        JobState::Completed
    } else if image_repository.uploaded_exists(&job_id).await? {
        JobState::Queued
    } else {
        return Err(JobStatusError::UnknownJob(job_id.to_string()));
    };

    Ok(HttpResponse::Ok().json(JobStatusResponse {
        unique_id: job_id.to_string(),
        state,
        created_at: None,
        updated_at: None,
        failure_reason: None,
    }))
}

#[derive(thiserror::Error)]
pub enum JobStatusError {
    #[error(transparent)]
    InvalidJobId(#[from] JobIdError),
    #[error("Unknown job {0}")]
    UnknownJob(String),
    #[error(transparent)]
    ImageFileRepositoryError(#[from] ImageFileRepositoryError),
}

impl std::fmt::Debug for JobStatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl ResponseError for JobStatusError {
    fn status_code(&self) -> StatusCode {
        match self {
            JobStatusError::InvalidJobId(_) => StatusCode::BAD_REQUEST,
            JobStatusError::UnknownJob(_) => StatusCode::NOT_FOUND,
            JobStatusError::ImageFileRepositoryError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse<actix_web::body::BoxBody> {
        let message = match self {
            JobStatusError::ImageFileRepositoryError(_) => "Failed to read job state".to_string(),
            _ => self.to_string(),
        };

        HttpResponse::build(self.status_code())
            .insert_header(ContentType::plaintext())
            .body(message)
    }
}
