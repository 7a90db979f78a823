use std::sync::Arc;

use common::{
    configuration::RabbitMQSettings,
    core::{
        image_file_repository::{ImageFileRepository, ImageFileRepositoryError},
        rabbitmq_connection::{connect_with_retry, RabbitMQConnectionError},
        rabbitmq_message_repository::{RabbitMQMessageRepository, RabbitMQMessageRepositoryError},
    },
    helper::error_chain_fmt,
};
use lapin::Connection as RabbitMQConnection;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    configuration::Settings,
    handlers::handler_upscale_job::{self, RegisterHandlerUpscaleJobError, UpscaleJobHandler},
    repositories::{
        intake_http_repository::IntakeHttpRepository,
        upscale_http_repository::UpscaleHttpRepository,
    },
};

/// Holds the RabbitMQ connections and the handler of the upscale jobs
pub struct Application {
    rabbitmq_consuming_connection: Arc<RabbitMQConnection>,
    rabbitmq_publishing_connection: Arc<RabbitMQConnection>,
    rabbitmq_settings: RabbitMQSettings,
    handler: UpscaleJobHandler,
}

impl Application {
    /// Connects to RabbitMQ, retrying with a fixed backoff, and sets up the repositories
    #[tracing::instrument(name = "Building worker application", skip(settings))]
    pub async fn build(settings: Settings) -> Result<Self, ApplicationError> {
        let image_repository = ImageFileRepository::new(&settings.storage.root_dir);
        image_repository.try_init().await?;

        // One connection for consuming messages, one for publishing dead letters
        let rabbitmq_consuming_connection = Arc::new(connect_with_retry(&settings.rabbitmq).await?);
        let rabbitmq_publishing_connection =
            Arc::new(connect_with_retry(&settings.rabbitmq).await?);

        let dead_letter_repository =
            RabbitMQMessageRepository::new(rabbitmq_publishing_connection.clone(), &settings.rabbitmq)
                .try_init()
                .await?;

        let upscale_repository = UpscaleHttpRepository::try_new(&settings.upscale_service)?;
        let intake_repository = IntakeHttpRepository::try_new(&settings.intake_service)?;

        let handler = UpscaleJobHandler::new(
            image_repository,
            Arc::new(upscale_repository),
            Arc::new(intake_repository),
            Arc::new(dead_letter_repository),
            settings.worker.max_deliveries,
        );

        Ok(Self {
            rabbitmq_consuming_connection,
            rabbitmq_publishing_connection,
            rabbitmq_settings: settings.rabbitmq,
            handler,
        })
    }

    /// Consumes the task queue until `cancel_token` is cancelled or the consumer fails
    ///
    /// self is moved in order for the application not to drop out of scope
    /// and move into a thread for ex
    pub async fn run_until_stopped(
        self,
        cancel_token: CancellationToken,
    ) -> Result<(), ApplicationError> {
        info!("📡 running until stopped");

        let result = handler_upscale_job::register_handler(
            self.rabbitmq_consuming_connection.clone(),
            self.rabbitmq_settings,
            self.handler,
            cancel_token,
        )
        .await;

        // Unacknowledged deliveries go back to the queue once the consuming connection is closed
        for connection in [
            &self.rabbitmq_consuming_connection,
            &self.rabbitmq_publishing_connection,
        ] {
            if let Err(error) = connection.close(200, "Worker stopped").await {
                warn!(?error, "Failed to close RabbitMQ connection");
            }
        }

        result?;

        info!("👋 Bye!");
        Ok(())
    }
}

#[derive(thiserror::Error)]
pub enum ApplicationError {
    #[error(transparent)]
    RabbitMQConnectionError(#[from] RabbitMQConnectionError),
    #[error(transparent)]
    RabbitMQMessageRepositoryError(#[from] RabbitMQMessageRepositoryError),
    #[error(transparent)]
    ImageFileRepositoryError(#[from] ImageFileRepositoryError),
    #[error("Failed to build an HTTP client: {0}")]
    HttpClientError(#[from] reqwest::Error),
    #[error(transparent)]
    UpscaleJobHandlerError(#[from] RegisterHandlerUpscaleJobError),
}

impl std::fmt::Debug for ApplicationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
