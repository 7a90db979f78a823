use std::sync::Arc;

use async_trait::async_trait;
use common::{
    configuration::RabbitMQSettings,
    constants::headers::DELIVERY_COUNT,
    core::{
        image_file_repository::{ImageFileRepository, ImageFileRepositoryError},
        rabbitmq_connection::declare_task_queues,
    },
    domain::job_id::JobId,
    dtos::job_reference::{JobReference, JobReferenceError},
    helper::error_chain_fmt,
    ports::dead_letter_publisher::DeadLetterPublisher,
};
use futures::{Stream, StreamExt};
use lapin::{
    message::Delivery,
    options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions},
    types::{AMQPValue, FieldTable},
    Connection as RabbitMQConnection,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use crate::ports::{
    remote_call_error::RemoteCallError, result_reporter::ResultReporter,
    upscale_service::UpscaleService,
};

/// A message of the task queue, as seen by the handler
///
/// Implemented by lapin deliveries, and by in-memory deliveries in tests.
#[async_trait]
pub trait JobDelivery: Send + Sync {
    fn data(&self) -> &[u8];

    /// Number of previous deliveries of this message, 0 on a first delivery
    fn delivery_count(&self) -> u32;

    async fn acknowledge(&self) -> Result<(), lapin::Error>;

    /// Gives the message back to the broker, to be delivered again
    async fn requeue(&self) -> Result<(), lapin::Error>;
}

#[async_trait]
impl JobDelivery for Delivery {
    fn data(&self) -> &[u8] {
        &self.data
    }

    /// Read from the `x-delivery-count` header set by quorum queues
    fn delivery_count(&self) -> u32 {
        self.properties
            .headers()
            .as_ref()
            .and_then(|headers| {
                headers
                    .inner()
                    .iter()
                    .find(|(key, _)| key.as_str() == DELIVERY_COUNT)
                    .and_then(|(_, value)| amqp_value_as_u32(value))
            })
            .unwrap_or(0)
    }

    async fn acknowledge(&self) -> Result<(), lapin::Error> {
        self.ack(BasicAckOptions::default()).await
    }

    async fn requeue(&self) -> Result<(), lapin::Error> {
        self.nack(BasicNackOptions {
            requeue: true,
            ..BasicNackOptions::default()
        })
        .await
    }
}

/// The broker picks the integer type of a header value
fn amqp_value_as_u32(value: &AMQPValue) -> Option<u32> {
    match value {
        AMQPValue::ShortShortUInt(count) => Some(u32::from(*count)),
        AMQPValue::ShortUInt(count) => Some(u32::from(*count)),
        AMQPValue::LongUInt(count) => Some(*count),
        AMQPValue::ShortShortInt(count) => u32::try_from(*count).ok(),
        AMQPValue::ShortInt(count) => u32::try_from(*count).ok(),
        AMQPValue::LongInt(count) => u32::try_from(*count).ok(),
        AMQPValue::LongLongInt(count) => u32::try_from(*count).ok(),
        _ => None,
    }
}

/// What happened to a delivery once handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Acknowledged,
    Requeued,
    DeadLettered,
}

/// How a successfully processed job ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessedJob {
    Upscaled,
    /// Redelivery of a job whose result had already been delivered
    AlreadyDelivered,
}

#[derive(thiserror::Error)]
pub enum ProcessJobError {
    #[error(transparent)]
    MalformedJobReference(#[from] JobReferenceError),
    #[error("Neither the uploaded image nor the upscaled image of job {0} exist")]
    MissingImages(String),
    #[error(transparent)]
    ImageFileRepositoryError(#[from] ImageFileRepositoryError),
    #[error("Upscaling failed: {0}")]
    UpscaleError(#[source] RemoteCallError),
    #[error("Delivering the upscaled image failed: {0}")]
    ResultDeliveryError(#[source] RemoteCallError),
}

impl ProcessJobError {
    /// Whether another delivery of the same job could succeed
    pub fn is_retriable(&self) -> bool {
        match self {
            ProcessJobError::MalformedJobReference(_) | ProcessJobError::MissingImages(_) => false,
            ProcessJobError::ImageFileRepositoryError(_)
            | ProcessJobError::UpscaleError(_)
            | ProcessJobError::ResultDeliveryError(_) => true,
        }
    }
}

impl std::fmt::Debug for ProcessJobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

/// Whether a failed delivery is given back to the broker or dead-lettered
///
/// The attempt number is the delivery count plus the current delivery.
pub fn should_dead_letter(error: &ProcessJobError, delivery_count: u32, max_deliveries: u32) -> bool {
    let attempt = delivery_count.saturating_add(1);

    !error.is_retriable() || attempt >= max_deliveries
}

/// Processes the upscaling jobs: upscale, store, deliver, clean up, then settle the delivery
pub struct UpscaleJobHandler {
    image_repository: ImageFileRepository,
    upscale_service: Arc<dyn UpscaleService>,
    result_reporter: Arc<dyn ResultReporter>,
    dead_letter_publisher: Arc<dyn DeadLetterPublisher>,
    max_deliveries: u32,
}

impl UpscaleJobHandler {
    pub fn new(
        image_repository: ImageFileRepository,
        upscale_service: Arc<dyn UpscaleService>,
        result_reporter: Arc<dyn ResultReporter>,
        dead_letter_publisher: Arc<dyn DeadLetterPublisher>,
        max_deliveries: u32,
    ) -> Self {
        Self {
            image_repository,
            upscale_service,
            result_reporter,
            dead_letter_publisher,
            max_deliveries,
        }
    }

    /// Runs a job to completion
    ///
    /// The path carried by the message is only used to get the job id: the images are always read and written
    /// at paths derived from the job id inside the storage root.
    /// The uploaded image is removed last, once the intake service confirmed it stored the result.
    #[tracing::instrument(name = "Processing upscale job", skip(self, data))]
    pub async fn process(&self, data: &[u8]) -> Result<ProcessedJob, ProcessJobError> {
        let job_reference = JobReference::try_parsing(data)?;
        let job_id = job_reference.job_id()?;

        if !self.image_repository.uploaded_exists(&job_id).await? {
            if self.image_repository.upscaled_exists(&job_id).await? {
                info!("Job {} was already delivered, nothing to do", job_id);
                return Ok(ProcessedJob::AlreadyDelivered);
            }

            return Err(ProcessJobError::MissingImages(job_id.to_string()));
        }

        let image = self.image_repository.read_uploaded(&job_id).await?;

        let upscaled_image = self
            .upscale_service
            .upscale(&job_id, image)
            .await
            .map_err(ProcessJobError::UpscaleError)?;

        let result_path = self
            .image_repository
            .save_upscaled(&job_id, &upscaled_image)
            .await?;
        info!("Upscaled image saved at {}", result_path.display());

        self.result_reporter
            .deliver_result(&job_id, upscaled_image)
            .await
            .map_err(ProcessJobError::ResultDeliveryError)?;

        self.image_repository.remove_uploaded(&job_id).await?;

        info!("Successfully handled upscale job {}", job_id);
        Ok(ProcessedJob::Upscaled)
    }

    /// Processes a delivery then acknowledges, requeues or dead-letters it
    ///
    /// A message is never dropped: if it cannot be dead-lettered, it is requeued.
    pub async fn handle<D: JobDelivery>(&self, delivery: &D) -> DeliveryOutcome {
        let error = match self.process(delivery.data()).await {
            Ok(_) => {
                acknowledge(delivery).await;
                return DeliveryOutcome::Acknowledged;
            }
            Err(error) => error,
        };

        let delivery_count = delivery.delivery_count();

        if !should_dead_letter(&error, delivery_count, self.max_deliveries) {
            warn!(
                ?error,
                "Failed to handle upscale job (attempt {}/{}), requeuing it",
                delivery_count.saturating_add(1),
                self.max_deliveries
            );
            requeue(delivery).await;
            return DeliveryOutcome::Requeued;
        }

        error!(
            ?error,
            "Giving up on upscale job after {} attempt(s)",
            delivery_count.saturating_add(1)
        );

        let reason = error.to_string();

        if let Err(dead_letter_error) = self
            .dead_letter_publisher
            .publish_dead_letter(delivery.data(), &reason)
            .await
        {
            error!(
                error = ?dead_letter_error,
                "Failed to dead-letter upscale job, requeuing it"
            );
            requeue(delivery).await;
            return DeliveryOutcome::Requeued;
        }

        acknowledge(delivery).await;

        // Best-effort: the job stays in the dead-letter queue whatever the intake service answers
        if let Some(job_id) = job_id_of(delivery.data()) {
            if let Err(report_error) = self.result_reporter.report_failure(&job_id, &reason).await
            {
                warn!(error = ?report_error, "Failed to report failed job {}", job_id);
            }
        }

        DeliveryOutcome::DeadLettered
    }
}

fn job_id_of(data: &[u8]) -> Option<JobId> {
    JobReference::try_parsing(data)
        .and_then(|job_reference| job_reference.job_id())
        .ok()
}

async fn acknowledge<D: JobDelivery>(delivery: &D) {
    // The broker delivers the message again if the acknowledgement is lost
    if let Err(error) = delivery.acknowledge().await {
        error!(?error, "Failed to ack upscale job message");
    }
}

async fn requeue<D: JobDelivery>(delivery: &D) {
    if let Err(error) = delivery.requeue().await {
        error!(?error, "Failed to nack upscale job message");
    }
}

#[derive(thiserror::Error)]
pub enum RegisterHandlerUpscaleJobError {
    #[error(transparent)]
    RabbitMQError(#[from] lapin::Error),
    #[error("The consumer of queue {0} stopped receiving deliveries")]
    ConsumerClosed(String),
}

impl std::fmt::Debug for RegisterHandlerUpscaleJobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

/// Registers the upscale job handler on the task queue, and consumes until cancelled
///
/// With a prefetch of 1 the broker hands at most one unacknowledged job at a time to this consumer.
#[tracing::instrument(
    name = "Register message handler",
    skip(rabbitmq_consuming_connection, settings, handler, cancel_token),
    fields(queue = %settings.task_queue)
)]
pub async fn register_handler(
    rabbitmq_consuming_connection: Arc<RabbitMQConnection>,
    settings: RabbitMQSettings,
    handler: UpscaleJobHandler,
    cancel_token: CancellationToken,
) -> Result<(), RegisterHandlerUpscaleJobError> {
    let channel = rabbitmq_consuming_connection.create_channel().await?;

    channel.basic_qos(1, BasicQosOptions::default()).await?;

    declare_task_queues(&channel, &settings).await?;

    let consumer_options = BasicConsumeOptions {
        no_ack: false,
        ..BasicConsumeOptions::default()
    };

    let consumer = channel
        .basic_consume(
            &settings.task_queue,
            "",
            consumer_options,
            FieldTable::default(),
        )
        .await?;

    info!(
        "📡 Handler consuming from queue {}, waiting for messages ...",
        settings.task_queue
    );

    consume_deliveries(consumer, &handler, &settings.task_queue, cancel_token).await
}

/// Handles deliveries one after the other until the stream ends or `cancel_token` is cancelled
///
/// Cancellation is only observed between deliveries: a delivery being handled always runs to its ack or nack.
pub async fn consume_deliveries<S, D, E>(
    mut deliveries: S,
    handler: &UpscaleJobHandler,
    queue_name: &str,
    cancel_token: CancellationToken,
) -> Result<(), RegisterHandlerUpscaleJobError>
where
    S: Stream<Item = Result<D, E>> + Unpin,
    D: JobDelivery,
    E: std::fmt::Debug,
{
    loop {
        let delivery = tokio::select! {
            biased;

            _ = cancel_token.cancelled() => {
                info!("Stop requested, no longer consuming queue {}", queue_name);
                return Ok(());
            }
            delivery = deliveries.next() => delivery,
        };

        let delivery = match delivery {
            Some(Ok(delivery)) => delivery,
            // Carries the error and is always followed by the end of the stream
            Some(Err(error)) => {
                error!(?error, "Failed to consume queue message on queue {}", queue_name);
                continue;
            }
            None => {
                return Err(RegisterHandlerUpscaleJobError::ConsumerClosed(
                    queue_name.to_string(),
                ))
            }
        };

        let outcome = handler
            .handle(&delivery)
            .instrument(info_span!(
                "Handling consumed message",
                queue = queue_name,
                delivery_count = delivery.delivery_count(),
                message_id = %uuid::Uuid::new_v4(),
            ))
            .await;

        info!(?outcome, "Handled message from queue {}", queue_name);
    }
}
