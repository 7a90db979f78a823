use async_trait::async_trait;
use common::domain::job_id::JobId;

use super::remote_call_error::RemoteCallError;

/// Tells the intake service how a job ended
#[async_trait]
pub trait ResultReporter: Send + Sync {
    /// Pushes the upscaled image, succeeds only once the intake service stored it
    async fn deliver_result(&self, job_id: &JobId, image: Vec<u8>) -> Result<(), RemoteCallError>;

    async fn report_failure(&self, job_id: &JobId, reason: &str) -> Result<(), RemoteCallError>;
}
