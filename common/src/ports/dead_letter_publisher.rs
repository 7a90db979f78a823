use async_trait::async_trait;

use crate::{
    core::rabbitmq_message_repository::RabbitMQMessageRepositoryError, helper::error_chain_fmt,
};

/// Parks messages that will never be processed successfully
#[async_trait]
pub trait DeadLetterPublisher: Send + Sync {
    async fn publish_dead_letter(
        &self,
        data: &[u8],
        reason: &str,
    ) -> Result<(), DeadLetterPublisherError>;
}

#[derive(thiserror::Error)]
pub enum DeadLetterPublisherError {
    #[error(transparent)]
    RabbitMQMessageRepositoryError(#[from] RabbitMQMessageRepositoryError),
    #[error("{0}")]
    Unavailable(String),
}

impl std::fmt::Debug for DeadLetterPublisherError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
