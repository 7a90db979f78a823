use actix_multipart::form::{text::TextConfig, MultipartFormConfig};
use actix_web::{
    dev::Server,
    http::Method,
    web::{self, Data},
    App, HttpServer,
};
use common::{
    constants::routes::{RECEIVE_UPSCALED_IMAGE, REPORT_FAILED_JOB},
    core::{
        image_file_repository::{ImageFileRepository, ImageFileRepositoryError},
        rabbitmq_connection::{connect_with_retry, RabbitMQConnectionError},
        rabbitmq_message_repository::{RabbitMQMessageRepository, RabbitMQMessageRepositoryError},
    },
    helper::error_chain_fmt,
    ports::job_publisher::JobPublisher,
};
use std::{net::TcpListener, sync::Arc};
use tracing::info;
use tracing_actix_web::TracingLogger;

use crate::{
    configuration::Settings,
    domain::entities::job::JobTable,
    routes::{
        cors_headers, get_upscaled_image, health_check, job_status, preflight,
        receive_upscaled_image, receive_upscaled_image_method_not_allowed, report_failed_job,
        upload,
    },
};

/// Holds the newly built server, and some useful properties
pub struct Application {
    server: Server,
    port: u16,
    /// Kept so the publishing connection lives as long as the server
    _rabbitmq_publishing_connection: Arc<lapin::Connection>,
}

#[derive(thiserror::Error)]
pub enum ApplicationBuildError {
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    #[error(transparent)]
    RabbitMQConnectionError(#[from] RabbitMQConnectionError),
    #[error(transparent)]
    RabbitMQMessageRepositoryError(#[from] RabbitMQMessageRepositoryError),
    #[error(transparent)]
    ImageFileRepositoryError(#[from] ImageFileRepositoryError),
}

impl std::fmt::Debug for ApplicationBuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl Application {
    /// Sets up the storage, connects to RabbitMQ and binds the server
    ///
    /// # Parameters
    /// - nb_workers: number of actix-web workers
    ///   if `None`, the number of available physical CPUs is used as the worker count.
    #[tracing::instrument(name = "Building application", skip(settings))]
    pub async fn build(
        settings: Settings,
        nb_workers: Option<usize>,
    ) -> Result<Self, ApplicationBuildError> {
        let address = format!(
            "{}:{}",
            settings.application.host, settings.application.port
        );
        let listener = TcpListener::bind(address)?;
        let port = listener.local_addr()?.port();

        let image_repository = ImageFileRepository::new(&settings.storage.root_dir);
        image_repository.try_init().await?;

        let rabbitmq_publishing_connection =
            Arc::new(connect_with_retry(&settings.rabbitmq).await?);

        // A single publishing channel shared by every actix-web worker
        let message_rabbitmq_repository =
            RabbitMQMessageRepository::new(rabbitmq_publishing_connection.clone(), &settings.rabbitmq)
                .try_init()
                .await?;

        let server = run(
            listener,
            &settings,
            nb_workers,
            Arc::new(message_rabbitmq_repository),
            image_repository,
            Arc::new(JobTable::new(settings.application.job_retention())),
        )?;

        Ok(Self {
            server,
            port,
            _rabbitmq_publishing_connection: rabbitmq_publishing_connection,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// This function only returns when the application is stopped
    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> {
        info!("Running server on port {} ...", self.port);
        self.server.await
    }
}

/// listener: the consumer binds their own port
///
/// TracingLogger middleware: helps collecting telemetry data.
/// It generates a unique identifier for each incoming request: `request_id`.
///
/// The job publisher, the image repository and the job table are shared among all actix-web workers.
///
/// # Parameters
/// - nb_workers: number of actix-web workers
///   if `None`, the number of available physical CPUs is used as the worker count.
pub fn run(
    listener: TcpListener,
    settings: &Settings,
    nb_workers: Option<usize>,
    job_publisher: Arc<dyn JobPublisher>,
    image_repository: ImageFileRepository,
    job_table: Arc<JobTable>,
) -> Result<Server, std::io::Error> {
    let max_upload_size_bytes = settings.application.max_upload_size_bytes;
    let max_result_size_bytes = settings.application.max_result_size_bytes;

    // Wraps the shared state in `actix_web::Data` (`Arc`) to access it from handlers
    let job_publisher: Data<dyn JobPublisher> = Data::from(job_publisher);
    let image_repository = Data::new(image_repository);
    let job_table = Data::from(job_table);

    // `move` to capture variables from the surrounding environment
    let server = HttpServer::new(move || {
        App::new()
            .wrap(cors_headers())
            .wrap(TracingLogger::default())
            .app_data(web::PayloadConfig::new(max_upload_size_bytes))
            .app_data(
                MultipartFormConfig::default()
                    .total_limit(max_upload_size_bytes)
                    .memory_limit(max_upload_size_bytes),
            )
            // Browsers send the `id` field without a content type
            .app_data(TextConfig::default().validate_content_type(false))
            .app_data(job_publisher.clone())
            .app_data(image_repository.clone())
            .app_data(job_table.clone())
            .service(
                web::resource("/health_check")
                    .route(web::get().to(health_check))
                    .route(web::method(Method::OPTIONS).to(preflight)),
            )
            .service(
                web::resource("/upload")
                    .route(web::post().to(upload))
                    .route(web::method(Method::OPTIONS).to(preflight)),
            )
            .service(
                web::resource(RECEIVE_UPSCALED_IMAGE)
                    // Upscaled images are several times larger than their source
                    .app_data(web::PayloadConfig::new(max_result_size_bytes))
                    .route(web::post().to(receive_upscaled_image))
                    .route(web::method(Method::OPTIONS).to(preflight))
                    .default_service(web::to(receive_upscaled_image_method_not_allowed)),
            )
            .service(
                web::resource("/get-upscaled-image")
                    .route(web::get().to(get_upscaled_image))
                    .route(web::method(Method::OPTIONS).to(preflight)),
            )
            .service(
                web::resource("/job-status")
                    .route(web::get().to(job_status))
                    .route(web::method(Method::OPTIONS).to(preflight)),
            )
            .service(
                web::resource(REPORT_FAILED_JOB)
                    .route(web::post().to(report_failed_job))
                    .route(web::method(Method::OPTIONS).to(preflight)),
            )
    })
    .listen(listener)?;

    // If no workers were set, use the actix-web settings (number of workers = number of physical CPUs)
    if let Some(nb_workers) = nb_workers {
        return Ok(server.workers(nb_workers).run());
    }

    // No await
    Ok(server.run())
}
