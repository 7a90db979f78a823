use actix_web::{
    http::{header::ContentType, StatusCode},
    web, HttpResponse, ResponseError,
};
use common::{
    core::image_file_repository::ImageFileRepository,
    domain::job_id::{JobId, JobIdError},
    helper::error_chain_fmt,
};
use tracing::warn;

use super::UniqueIdQuery;
use crate::domain::entities::job::JobTable;

const UNKNOWN_FAILURE_REASON: &str = "Unknown failure";

/// Marks a job as failed, called by a worker when it gives up on a job
///
/// The body is the failure reason, as plain text.
#[tracing::instrument(name = "Report failed job handler", skip(image_repository, job_table))]
pub async fn report_failed_job(
    query: web::Query<UniqueIdQuery>,
    reason: String,
    image_repository: web::Data<ImageFileRepository>,
    job_table: web::Data<JobTable>,
) -> Result<HttpResponse, ReportFailedJobError> {
    let job_id = JobId::parse(&query.unique_id)?;

    let reason = match reason.trim() {
        "" => UNKNOWN_FAILURE_REASON,
        reason => reason,
    };

    job_table.mark_failed(&job_id, image_repository.uploaded_path(&job_id), reason);
    warn!("Job {} failed: {}", job_id, reason);

    Ok(HttpResponse::Ok()
        .content_type(ContentType::plaintext())
        .body("Failure recorded."))
}

#[derive(thiserror::Error)]
pub enum ReportFailedJobError {
    #[error(transparent)]
    InvalidJobId(#[from] JobIdError),
}

impl std::fmt::Debug for ReportFailedJobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl ResponseError for ReportFailedJobError {
    fn status_code(&self) -> StatusCode {
        match self {
            ReportFailedJobError::InvalidJobId(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn error_response(&self) -> HttpResponse<actix_web::body::BoxBody> {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::plaintext())
            .body(self.to_string())
    }
}
