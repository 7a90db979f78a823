use actix_web::{
    http::{header::ContentType, StatusCode},
    web, HttpResponse, ResponseError,
};
use common::{
    core::image_file_repository::{ImageFileRepository, ImageFileRepositoryError},
    domain::job_id::{JobId, JobIdError},
    helper::error_chain_fmt,
};

use super::UniqueIdQuery;

/// Serves the upscaled image of a job
///
/// A job that is not finished yet and a job that never existed are both "not found".
#[tracing::instrument(name = "Get upscaled image handler", skip(image_repository))]
pub async fn get_upscaled_image(
    query: web::Query<UniqueIdQuery>,
    image_repository: web::Data<ImageFileRepository>,
) -> Result<HttpResponse, GetUpscaledImageError> {
    let job_id = JobId::parse(&query.unique_id)?;

    let image = image_repository.read_upscaled(&job_id).await?;

    Ok(HttpResponse::Ok().content_type("image/png").body(image))
}

#[derive(thiserror::Error)]
pub enum GetUpscaledImageError {
    #[error(transparent)]
    InvalidJobId(#[from] JobIdError),
    #[error(transparent)]
    ImageFileRepositoryError(#[from] ImageFileRepositoryError),
}

impl std::fmt::Debug for GetUpscaledImageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl ResponseError for GetUpscaledImageError {
    fn status_code(&self) -> StatusCode {
        match self {
            GetUpscaledImageError::InvalidJobId(_) => StatusCode::BAD_REQUEST,
            GetUpscaledImageError::ImageFileRepositoryError(ImageFileRepositoryError::NotFound(
                _,
            )) => StatusCode::NOT_FOUND,
            GetUpscaledImageError::ImageFileRepositoryError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse<actix_web::body::BoxBody> {
        let message = match self.status_code() {
            StatusCode::NOT_FOUND => "Image not found".to_string(),
            StatusCode::INTERNAL_SERVER_ERROR => "Failed to read image".to_string(),
            _ => self.to_string(),
        };

        HttpResponse::build(self.status_code())
            .insert_header(ContentType::plaintext())
            .body(message)
    }
}
