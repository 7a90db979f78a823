use std::time::Duration;

use common::configuration::{RabbitMQSettings, StorageSettings};
use serde::Deserialize;
use serde_aux::field_attributes::deserialize_number_from_string;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub storage: StorageSettings,
    pub rabbitmq: RabbitMQSettings,
    pub upscale_service: HttpServiceSettings,
    pub intake_service: HttpServiceSettings,
    pub worker: WorkerSettings,
}

/// A remote HTTP service called by the worker
#[derive(Debug, Deserialize, Clone)]
pub struct HttpServiceSettings {
    /// Scheme, host and port, without a trailing slash: `http://flask-api:5000`
    pub base_url: String,
    /// Deadline of a whole request, response body included
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub timeout_milliseconds: u64,
}

impl HttpServiceSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_milliseconds)
    }

    pub fn url(&self, route: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), route)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkerSettings {
    /// Deliveries of a failing job before it is dead-lettered.
    /// Must stay below the delivery limit of the broker.
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_deliveries: u32,
}

/// Reads `configuration/{base,<environment>}.yaml` then the `APP_` env variables
///
/// For ex: `APP_WORKER__MAX_DELIVERIES=3` sets `Settings.worker.max_deliveries`
pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    common::configuration::get_configuration()
}
