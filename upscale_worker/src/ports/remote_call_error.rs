use std::time::Duration;

use common::helper::error_chain_fmt;

/// Failure of a call to another service
///
/// Every variant is transient from the point of view of a job: the call can succeed on a later delivery.
#[derive(thiserror::Error)]
pub enum RemoteCallError {
    #[error("{0} did not answer within {1:?}")]
    Timeout(String, Duration),
    #[error("Request to {0} failed: {1}")]
    RequestFailed(String, String),
    #[error("{0} answered with status {1}")]
    UnexpectedStatus(String, u16),
}

impl std::fmt::Debug for RemoteCallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
