use actix_web::{web, HttpResponse};
use common::core::image_file_repository::ImageFileRepository;
use tracing::error;

/// Answers 200 while the storage shared with the workers is reachable
#[tracing::instrument(name = "Health check handler", skip(image_repository))]
pub async fn health_check(image_repository: web::Data<ImageFileRepository>) -> HttpResponse {
    match tokio::fs::metadata(image_repository.root_dir()).await {
        Ok(metadata) if metadata.is_dir() => HttpResponse::Ok().finish(),
        Ok(_) => {
            error!(
                "Storage root {} is not a directory",
                image_repository.root_dir().display()
            );
            HttpResponse::ServiceUnavailable().finish()
        }
        Err(error) => {
            error!(?error, "Storage root is unreachable");
            HttpResponse::ServiceUnavailable().finish()
        }
    }
}
