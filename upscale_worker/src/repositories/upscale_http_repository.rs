use std::time::Duration;

use async_trait::async_trait;
use common::{constants::routes::UPSCALE, domain::job_id::JobId};
use reqwest::{
    multipart::{Form, Part},
    StatusCode,
};
use tracing::info;

use super::{http_client, into_remote_call_error};
use crate::{
    configuration::HttpServiceSettings,
    ports::{remote_call_error::RemoteCallError, upscale_service::UpscaleService},
};

/// Upscale service reached over HTTP: `POST /upscale` with a `uniqueId` and an `image` multipart parts
pub struct UpscaleHttpRepository {
    client: reqwest::Client,
    upscale_url: String,
    timeout: Duration,
}

impl UpscaleHttpRepository {
    pub fn try_new(settings: &HttpServiceSettings) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: http_client(settings.timeout())?,
            upscale_url: settings.url(UPSCALE),
            timeout: settings.timeout(),
        })
    }
}

#[async_trait]
impl UpscaleService for UpscaleHttpRepository {
    #[tracing::instrument(name = "Calling the upscale service", skip(self, image), fields(url = %self.upscale_url))]
    async fn upscale(&self, job_id: &JobId, image: Vec<u8>) -> Result<Vec<u8>, RemoteCallError> {
        let image_part = Part::bytes(image)
            .file_name(job_id.uploaded_file_name())
            .mime_str("image/png")
            .map_err(|e| into_remote_call_error(&self.upscale_url, self.timeout, e))?;

        let form = Form::new()
            .text("uniqueId", job_id.to_string())
            .part("image", image_part);

        let response = self
            .client
            .post(&self.upscale_url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| into_remote_call_error(&self.upscale_url, self.timeout, e))?;

        if response.status() != StatusCode::OK {
            return Err(RemoteCallError::UnexpectedStatus(
                self.upscale_url.clone(),
                response.status().as_u16(),
            ));
        }

        // The deadline also covers the body
        let upscaled_image = response
            .bytes()
            .await
            .map_err(|e| into_remote_call_error(&self.upscale_url, self.timeout, e))?;

        info!("Received upscaled image ({} bytes)", upscaled_image.len());
        Ok(upscaled_image.to_vec())
    }
}
