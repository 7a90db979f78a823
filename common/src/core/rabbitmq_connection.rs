use std::{fmt::Display, future::Future, time::Duration};

use lapin::{
    options::QueueDeclareOptions,
    types::{AMQPValue, FieldTable},
    Channel, Connection,
};
use tracing::{info, warn};

use crate::{configuration::RabbitMQSettings, helper::error_chain_fmt};

/// Calls `attempt` until it succeeds, at most `max_attempts` times, sleeping `interval` between calls
///
/// `attempt` receives the 1-based attempt number. The error of the last attempt is returned
/// once the budget is exhausted.
pub async fn retry_with_fixed_backoff<T, E, F, Fut>(
    max_attempts: u32,
    interval: Duration,
    mut attempt: F,
) -> Result<T, (u32, E)>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt_number = 1;

    loop {
        match attempt(attempt_number).await {
            Ok(value) => return Ok(value),
            Err(error) if attempt_number >= max_attempts => return Err((attempt_number, error)),
            Err(error) => {
                warn!(
                    %error,
                    "Attempt {}/{} failed, retrying in {:?}...",
                    attempt_number,
                    max_attempts,
                    interval
                );
            }
        }

        tokio::time::sleep(interval).await;
        attempt_number += 1;
    }
}

/// Creates a connection to RabbitMQ, retrying with a fixed backoff
///
/// Services are useless without the broker: exhausting the retry budget is meant to stop the
/// process so an orchestrator can restart it.
#[tracing::instrument(name = "Create RabbitMQ connection", skip(settings), fields(host = %settings.host, port = settings.port))]
pub async fn connect_with_retry(
    settings: &RabbitMQSettings,
) -> Result<Connection, RabbitMQConnectionError> {
    let uri = settings.get_uri();

    let connection = retry_with_fixed_backoff(
        settings.connection_max_attempts,
        settings.connection_retry_interval(),
        |attempt_number| {
            info!(
                "Connecting to RabbitMQ (attempt {}/{})",
                attempt_number, settings.connection_max_attempts
            );
            Connection::connect(&uri, settings.get_connection_properties())
        },
    )
    .await
    .map_err(|(attempts, error)| RabbitMQConnectionError::RetryBudgetExhausted(attempts, error))?;

    info!("🐰 Connected to RabbitMQ");
    Ok(connection)
}

/// Declares the durable task queue and its dead-letter queue
///
/// Idempotent: producers and consumers both call it, and it succeeds as long as the queues
/// already exist with the same properties.
#[tracing::instrument(name = "Declaring task queues", skip(channel, settings))]
pub async fn declare_task_queues(
    channel: &Channel,
    settings: &RabbitMQSettings,
) -> Result<(), lapin::Error> {
    let queue_declare_options = QueueDeclareOptions {
        durable: true,
        ..QueueDeclareOptions::default()
    };

    let mut task_queue_arguments = FieldTable::default();
    task_queue_arguments.insert(
        "x-queue-type".into(),
        AMQPValue::LongString(settings.queue_type.as_str().into()),
    );

    channel
        .queue_declare(
            &settings.task_queue,
            queue_declare_options,
            task_queue_arguments,
        )
        .await?;

    info!(
        "Successfully declared queue {} ({}) with properties: {:?}",
        settings.task_queue,
        settings.queue_type.as_str(),
        queue_declare_options
    );

    let dead_letter_queue = settings.dead_letter_queue();
    channel
        .queue_declare(
            &dead_letter_queue,
            queue_declare_options,
            FieldTable::default(),
        )
        .await?;

    info!(
        "Successfully declared queue {} with properties: {:?}",
        dead_letter_queue, queue_declare_options
    );

    Ok(())
}

#[derive(thiserror::Error)]
pub enum RabbitMQConnectionError {
    #[error("Could not connect to RabbitMQ after {0} attempts")]
    RetryBudgetExhausted(u32, #[source] lapin::Error),
}

impl std::fmt::Debug for RabbitMQConnectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
