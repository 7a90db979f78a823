use actix_web::{
    http::{header::ContentType, StatusCode},
    web, HttpRequest, HttpResponse, ResponseError,
};
use common::{
    constants::headers::FILE_NAME,
    core::image_file_repository::{ImageFileRepository, ImageFileRepositoryError},
    domain::job_id::{JobId, JobIdError},
    helper::error_chain_fmt,
};
use tracing::info;

use crate::domain::entities::job::JobTable;

/// Stores the upscaled image pushed back by a worker
///
/// Only the last component of `X-File-Name` is used, and it has to be `{id}-upscaled.png`:
/// the stored path is always derived from the job id, inside the storage root.
#[tracing::instrument(name = "Receive upscaled image handler", skip(request, body, image_repository, job_table))]
pub async fn receive_upscaled_image(
    request: HttpRequest,
    body: web::Bytes,
    image_repository: web::Data<ImageFileRepository>,
    job_table: web::Data<JobTable>,
) -> Result<HttpResponse, ReceiveUpscaledImageError> {
    let file_name = request
        .headers()
        .get(FILE_NAME)
        .ok_or(ReceiveUpscaledImageError::MissingFileName)?
        .to_str()
        .map_err(|_| ReceiveUpscaledImageError::MissingFileName)?;

    let job_id = JobId::from_upscaled_file_name(file_name)?;

    let result_path = image_repository.save_upscaled(&job_id, &body).await?;
    job_table.mark_completed(&job_id, image_repository.uploaded_path(&job_id), result_path);

    info!("Received upscaled image of job {} ({} bytes)", job_id, body.len());

    Ok(HttpResponse::Ok()
        .content_type(ContentType::plaintext())
        .body("Image received and saved successfully."))
}

/// Any other method than POST on the result delivery route
pub async fn receive_upscaled_image_method_not_allowed() -> HttpResponse {
    HttpResponse::MethodNotAllowed()
        .content_type(ContentType::plaintext())
        .body("Only POST method is allowed")
}

#[derive(thiserror::Error)]
pub enum ReceiveUpscaledImageError {
    #[error("Missing or unreadable {FILE_NAME} header")]
    MissingFileName,
    #[error(transparent)]
    InvalidFileName(#[from] JobIdError),
    #[error("Failed to save image: {0}")]
    ImageFileRepositoryError(#[from] ImageFileRepositoryError),
}

impl std::fmt::Debug for ReceiveUpscaledImageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl ResponseError for ReceiveUpscaledImageError {
    fn status_code(&self) -> StatusCode {
        match self {
            ReceiveUpscaledImageError::MissingFileName
            | ReceiveUpscaledImageError::InvalidFileName(_) => StatusCode::BAD_REQUEST,
            ReceiveUpscaledImageError::ImageFileRepositoryError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    #[tracing::instrument(name = "Response error from receive upscaled image handler", skip(self), fields(error = ?self))]
    fn error_response(&self) -> HttpResponse<actix_web::body::BoxBody> {
        let message = match self {
            ReceiveUpscaledImageError::ImageFileRepositoryError(_) => {
                "Failed to save image".to_string()
            }
            _ => self.to_string(),
        };

        HttpResponse::build(self.status_code())
            .insert_header(ContentType::plaintext())
            .body(message)
    }
}
