use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use lapin::{
    options::{BasicPublishOptions, ConfirmSelectOptions},
    publisher_confirm::Confirmation,
    types::{AMQPValue, FieldTable},
    BasicProperties, Channel, Connection,
};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    configuration::RabbitMQSettings,
    constants::headers::FAILURE_REASON,
    core::rabbitmq_connection::declare_task_queues,
    dtos::job_reference::JobReference,
    helper::error_chain_fmt,
    ports::{
        dead_letter_publisher::{DeadLetterPublisher, DeadLetterPublisherError},
        job_publisher::{JobPublisher, JobPublisherError},
    },
};

/// AMQP delivery mode for messages written to disk by the broker
const PERSISTENT_DELIVERY_MODE: u8 = 2;

/// Message repository implemented with RabbitMQ
///
/// Publishes job references on the durable task queue, and failed jobs on its dead-letter queue,
/// through the default exchange.
///
/// The enum definition gatekeeps functionalities if the repository is not ready (not initialized).
pub enum RabbitMQMessageRepository {
    Ready {
        /// RabbitMQ connection shared with other objects in different threads
        connection: Arc<Connection>,
        /// Publishing channel in confirm mode, re-created from the connection if the broker closed it
        channel: Mutex<Channel>,
        settings: RabbitMQSettings,
    },
    Idle {
        /// RabbitMQ connection shared with other objects in different threads
        connection: Arc<Connection>,
        settings: RabbitMQSettings,
    },
}

/// Clones only the connection and the settings
///
/// The cloned repository is in the idle state, waiting for an initialization.
impl Clone for RabbitMQMessageRepository {
    fn clone(&self) -> Self {
        match self {
            Self::Idle {
                connection,
                settings,
            }
            | Self::Ready {
                connection,
                settings,
                ..
            } => Self::Idle {
                connection: connection.clone(),
                settings: settings.clone(),
            },
        }
    }
}

impl RabbitMQMessageRepository {
    /// Builds a RabbitMQ message repository from a RabbitMQ connection
    ///
    /// This constructor does not create a RabbitMQ channel or declare the queues.
    /// The method `try_init` should be called after.
    pub fn new(connection: Arc<Connection>, settings: &RabbitMQSettings) -> Self {
        Self::Idle {
            connection,
            settings: settings.clone(),
        }
    }

    /// Initializes the repository
    ///
    /// Creates a channel in confirm mode and declares the task queue and its dead-letter queue.
    #[tracing::instrument(name = "🏗️ Initializing RabbitMQMessageRepository", skip(self))]
    pub async fn try_init(self) -> Result<Self, RabbitMQMessageRepositoryError> {
        match self {
            Self::Ready { .. } => {
                info!("Already initialized");
                Ok(self)
            }

            Self::Idle {
                connection,
                settings,
            } => {
                let channel = open_publishing_channel(&connection, &settings).await?;

                Ok(Self::Ready {
                    connection,
                    channel: Mutex::new(channel),
                    settings,
                })
            }
        }
    }

    /// Gets the publishing channel, re-opening it if the broker closed it
    async fn usable_channel(&self) -> Result<Channel, RabbitMQMessageRepositoryError> {
        match self {
            Self::Idle { .. } => Err(RabbitMQMessageRepositoryError::NotInitialized(
                "Cannot publish message, repository is not initialized".to_string(),
            )),

            Self::Ready {
                connection,
                channel,
                settings,
            } => {
                let mut channel = channel.lock().await;

                if !channel.status().connected() {
                    warn!(
                        "Publishing channel {} is closed, opening a new one",
                        channel.id()
                    );
                    *channel = open_publishing_channel(connection, settings).await?;
                }

                Ok(channel.clone())
            }
        }
    }

    /// Publishes a message to a queue through the default exchange and waits for the broker confirmation
    ///
    /// Messages are persistent: they survive a broker restart as long as the queue is durable.
    ///
    /// # Arguments
    /// * `queue_name` - queue to publish the message to
    /// * `data` - Data to publish
    /// * `headers` - Optional message headers
    #[tracing::instrument(name = "Publishing message", skip(self, data, headers))]
    pub async fn publish(
        &self,
        queue_name: &str,
        data: &[u8],
        headers: Option<FieldTable>,
    ) -> Result<(), RabbitMQMessageRepositoryError> {
        let channel = self.usable_channel().await?;
        let current_time_ms = Utc::now().timestamp_millis() as u64;

        let mut properties = BasicProperties::default()
            .with_delivery_mode(PERSISTENT_DELIVERY_MODE)
            .with_content_type("text/plain".into())
            .with_timestamp(current_time_ms)
            .with_message_id(Uuid::new_v4().to_string().into());

        if let Some(headers) = headers {
            properties = properties.with_headers(headers);
        }

        // The first await sends the message, the second one waits for the broker confirmation
        let confirmation = channel
            .basic_publish(
                "",
                queue_name,
                BasicPublishOptions::default(),
                data,
                properties,
            )
            .await?
            .await?;

        if let Confirmation::Nack(_) = confirmation {
            return Err(RabbitMQMessageRepositoryError::PublishNotConfirmed(
                queue_name.to_string(),
            ));
        }

        Ok(())
    }

    pub fn task_queue(&self) -> &str {
        match self {
            Self::Ready { settings, .. } | Self::Idle { settings, .. } => &settings.task_queue,
        }
    }

    pub fn dead_letter_queue(&self) -> String {
        match self {
            Self::Ready { settings, .. } | Self::Idle { settings, .. } => {
                settings.dead_letter_queue()
            }
        }
    }
}

/// Opens a channel in confirm mode and declares the queues it publishes to
async fn open_publishing_channel(
    connection: &Connection,
    settings: &RabbitMQSettings,
) -> Result<Channel, RabbitMQMessageRepositoryError> {
    let channel = connection.create_channel().await?;

    channel
        .confirm_select(ConfirmSelectOptions::default())
        .await?;

    declare_task_queues(&channel, settings).await?;

    Ok(channel)
}

#[async_trait]
impl JobPublisher for RabbitMQMessageRepository {
    #[tracing::instrument(name = "Publishing job reference", skip(self))]
    async fn publish_job(&self, job_reference: &JobReference) -> Result<(), JobPublisherError> {
        self.publish(self.task_queue(), job_reference.as_bytes(), None)
            .await?;

        info!(
            "Published job reference {} on queue {}",
            job_reference.source_path(),
            self.task_queue()
        );
        Ok(())
    }
}

#[async_trait]
impl DeadLetterPublisher for RabbitMQMessageRepository {
    #[tracing::instrument(name = "Publishing dead letter", skip(self, data))]
    async fn publish_dead_letter(
        &self,
        data: &[u8],
        reason: &str,
    ) -> Result<(), DeadLetterPublisherError> {
        let mut headers = FieldTable::default();
        headers.insert(FAILURE_REASON.into(), AMQPValue::LongString(reason.into()));

        let dead_letter_queue = self.dead_letter_queue();
        self.publish(&dead_letter_queue, data, Some(headers))
            .await?;

        warn!("Published dead letter on queue {}", dead_letter_queue);
        Ok(())
    }
}

#[derive(thiserror::Error)]
pub enum RabbitMQMessageRepositoryError {
    #[error(transparent)]
    RabbitMQError(#[from] lapin::Error),
    #[error("The broker did not confirm the message published on {0}")]
    PublishNotConfirmed(String),
    #[error("{0}")]
    NotInitialized(String),
}

impl std::fmt::Debug for RabbitMQMessageRepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
