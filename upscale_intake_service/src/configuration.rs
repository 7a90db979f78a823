use common::configuration::{RabbitMQSettings, StorageSettings};
use serde::Deserialize;
use serde_aux::field_attributes::deserialize_number_from_string;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub storage: StorageSettings,
    pub rabbitmq: RabbitMQSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApplicationSettings {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    pub host: String,
    /// Maximum size of an uploaded image
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_upload_size_bytes: usize,
    /// Maximum size of an upscaled image pushed back by a worker, larger than an upload
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_result_size_bytes: usize,
    /// How long completed and failed jobs stay in the job table
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub job_retention_seconds: u64,
}

impl ApplicationSettings {
    pub fn job_retention(&self) -> chrono::Duration {
        // `chrono::Duration` holds at most `i64::MAX` milliseconds
        let seconds = i64::try_from(self.job_retention_seconds)
            .unwrap_or(i64::MAX)
            .min(i64::MAX / 1_000);

        chrono::Duration::seconds(seconds)
    }
}

/// Reads `configuration/{base,<environment>}.yaml` then the `APP_` env variables
///
/// For ex: `APP_APPLICATION__PORT=5001` sets `Settings.application.port`
pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    common::configuration::get_configuration()
}
