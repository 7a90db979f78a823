use std::time::Duration;

use async_trait::async_trait;
use common::{
    constants::{
        headers::FILE_NAME,
        routes::{RECEIVE_UPSCALED_IMAGE, REPORT_FAILED_JOB},
    },
    domain::job_id::JobId,
};
use reqwest::StatusCode;

use super::{http_client, into_remote_call_error};
use crate::{
    configuration::HttpServiceSettings,
    ports::{remote_call_error::RemoteCallError, result_reporter::ResultReporter},
};

/// Reports job results to the intake service over HTTP
pub struct IntakeHttpRepository {
    client: reqwest::Client,
    receive_upscaled_image_url: String,
    report_failed_job_url: String,
    timeout: Duration,
}

impl IntakeHttpRepository {
    pub fn try_new(settings: &HttpServiceSettings) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: http_client(settings.timeout())?,
            receive_upscaled_image_url: settings.url(RECEIVE_UPSCALED_IMAGE),
            report_failed_job_url: settings.url(REPORT_FAILED_JOB),
            timeout: settings.timeout(),
        })
    }
}

#[async_trait]
impl ResultReporter for IntakeHttpRepository {
    /// Only the file name is sent: the intake service derives the stored path itself
    #[tracing::instrument(name = "Delivering upscaled image", skip(self, image))]
    async fn deliver_result(&self, job_id: &JobId, image: Vec<u8>) -> Result<(), RemoteCallError> {
        let url = &self.receive_upscaled_image_url;

        let response = self
            .client
            .post(url)
            .header(FILE_NAME, job_id.upscaled_file_name())
            .body(image)
            .send()
            .await
            .map_err(|e| into_remote_call_error(url, self.timeout, e))?;

        match response.status() {
            StatusCode::OK => Ok(()),
            status => Err(RemoteCallError::UnexpectedStatus(
                url.clone(),
                status.as_u16(),
            )),
        }
    }

    #[tracing::instrument(name = "Reporting failed job", skip(self))]
    async fn report_failure(&self, job_id: &JobId, reason: &str) -> Result<(), RemoteCallError> {
        let url = &self.report_failed_job_url;

        let response = self
            .client
            .post(url)
            .query(&[("uniqueId", job_id.as_ref())])
            .body(reason.to_string())
            .send()
            .await
            .map_err(|e| into_remote_call_error(url, self.timeout, e))?;

        match response.status() {
            StatusCode::OK => Ok(()),
            status => Err(RemoteCallError::UnexpectedStatus(
                url.clone(),
                status.as_u16(),
            )),
        }
    }
}
