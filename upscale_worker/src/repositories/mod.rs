use std::time::Duration;

use crate::ports::remote_call_error::RemoteCallError;

pub mod intake_http_repository;
pub mod upscale_http_repository;

/// Builds an HTTP client whose requests fail after `timeout`
fn http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder().timeout(timeout).build()
}

/// Separates the deadline expiry from the other transport failures
fn into_remote_call_error(url: &str, timeout: Duration, error: reqwest::Error) -> RemoteCallError {
    if error.is_timeout() {
        RemoteCallError::Timeout(url.to_string(), timeout)
    } else {
        RemoteCallError::RequestFailed(url.to_string(), error.to_string())
    }
}
