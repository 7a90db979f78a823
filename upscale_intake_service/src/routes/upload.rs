use actix_multipart::form::{bytes::Bytes, text::Text, MultipartForm};
use actix_web::{
    http::{header::ContentType, StatusCode},
    web, HttpResponse, ResponseError,
};
use common::{
    constants::headers::UNIQUE_ID,
    core::image_file_repository::{ImageFileRepository, ImageFileRepositoryError},
    domain::job_id::{JobId, JobIdError},
    dtos::job_reference::JobReference,
    helper::error_chain_fmt,
    ports::job_publisher::{JobPublisher, JobPublisherError},
};
use tracing::{info, warn, Span};

use crate::domain::entities::job::{JobTable, JobTableError};

#[derive(Debug, MultipartForm)]
pub struct UploadForm {
    /// Job id chosen by the client, a random one is generated if missing
    id: Option<Text<String>>,
    image: Option<Bytes>,
}

/// Stores an uploaded image and queues its upscaling job
///
/// The reservation in the job table and the stored file are both undone if the job could not be queued,
/// so a failed upload leaves nothing behind.
#[tracing::instrument(
    name = "Upload handler",
    skip(form, image_repository, job_table, job_publisher),
    fields(job_id = tracing::field::Empty)
)]
pub async fn upload(
    MultipartForm(form): MultipartForm<UploadForm>,
    image_repository: web::Data<ImageFileRepository>,
    job_table: web::Data<JobTable>,
    job_publisher: web::Data<dyn JobPublisher>,
) -> Result<HttpResponse, UploadError> {
    let job_id = match form.id.map(|Text(id)| id).filter(|id| !id.is_empty()) {
        Some(id) => JobId::parse(&id)?,
        None => JobId::generate(),
    };
    Span::current().record("job_id", tracing::field::display(&job_id));

    let image = form.image.ok_or(UploadError::MissingImage)?;

    job_table.try_reserve(&job_id, image_repository.uploaded_path(&job_id))?;

    // The result of a previous run of the same id must not be served for the new one
    match image_repository.remove_upscaled(&job_id).await {
        Ok(true) => info!("Removed the previous upscaled image of job {}", job_id),
        Ok(false) => {}
        Err(error) => {
            job_table.release(&job_id);
            return Err(error.into());
        }
    }

    if let Err(error) = image_repository.save_uploaded(&job_id, &image.data).await {
        job_table.release(&job_id);
        return Err(error.into());
    }

    let job_reference = JobReference::new(image_repository.root_dir(), &job_id);

    if let Err(error) = job_publisher.publish_job(&job_reference).await {
        if let Err(remove_error) = image_repository.remove_uploaded(&job_id).await {
            warn!(
                error = ?remove_error,
                "Failed to remove the uploaded image of a job that could not be queued"
            );
        }
        job_table.release(&job_id);
        return Err(error.into());
    }

    info!(
        "Queued job {} ({} bytes)",
        job_reference.source_path(),
        image.data.len()
    );

    Ok(HttpResponse::Ok()
        .insert_header((UNIQUE_ID, job_id.as_ref()))
        .content_type(ContentType::plaintext())
        .body("Successfully uploaded file and task queued"))
}

#[derive(thiserror::Error)]
pub enum UploadError {
    #[error(transparent)]
    InvalidJobId(#[from] JobIdError),
    #[error("Error retrieving the file")]
    MissingImage,
    #[error(transparent)]
    AlreadyQueued(#[from] JobTableError),
    #[error("Error writing the file: {0}")]
    ImageFileRepositoryError(#[from] ImageFileRepositoryError),
    #[error("Failed to publish a message: {0}")]
    JobPublisherError(#[from] JobPublisherError),
}

impl std::fmt::Debug for UploadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl ResponseError for UploadError {
    fn status_code(&self) -> StatusCode {
        match self {
            UploadError::InvalidJobId(_) | UploadError::MissingImage => StatusCode::BAD_REQUEST,
            UploadError::AlreadyQueued(_) => StatusCode::CONFLICT,
            UploadError::ImageFileRepositoryError(_) | UploadError::JobPublisherError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    #[tracing::instrument(name = "Response error from upload handler", skip(self), fields(error = ?self))]
    fn error_response(&self) -> HttpResponse<actix_web::body::BoxBody> {
        let message = match self {
            UploadError::InvalidJobId(_)
            | UploadError::MissingImage
            | UploadError::AlreadyQueued(_) => self.to_string(),
            UploadError::ImageFileRepositoryError(_) => "Error writing the file".to_string(),
            UploadError::JobPublisherError(_) => "Failed to publish a message".to_string(),
        };

        HttpResponse::build(self.status_code())
            .insert_header(ContentType::plaintext())
            .body(message)
    }
}
