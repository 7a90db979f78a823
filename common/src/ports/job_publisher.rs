use async_trait::async_trait;

use crate::{
    core::rabbitmq_message_repository::RabbitMQMessageRepositoryError,
    dtos::job_reference::JobReference, helper::error_chain_fmt,
};

/// Hands a job over to the workers through the durable work queue
#[async_trait]
pub trait JobPublisher: Send + Sync {
    /// Returns only once the broker took responsibility for the job reference
    async fn publish_job(&self, job_reference: &JobReference) -> Result<(), JobPublisherError>;
}

#[derive(thiserror::Error)]
pub enum JobPublisherError {
    #[error(transparent)]
    RabbitMQMessageRepositoryError(#[from] RabbitMQMessageRepositoryError),
    #[error("{0}")]
    Unavailable(String),
}

impl std::fmt::Debug for JobPublisherError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
