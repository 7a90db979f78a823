use async_trait::async_trait;
use common::domain::job_id::JobId;

use super::remote_call_error::RemoteCallError;

/// The external service producing upscaled images
#[async_trait]
pub trait UpscaleService: Send + Sync {
    /// Returns the upscaled image
    async fn upscale(&self, job_id: &JobId, image: Vec<u8>) -> Result<Vec<u8>, RemoteCallError>;
}
