use std::{path::PathBuf, time::Duration};

use lapin::ConnectionProperties;
use secrecy::{ExposeSecret, Secret};
use serde::{de::DeserializeOwned, Deserialize};
use serde_aux::field_attributes::deserialize_number_from_string;

use crate::constants::DEAD_LETTER_QUEUE_SUFFIX;

/// Settings shared by every service talking to RabbitMQ
#[derive(Debug, Deserialize, Clone)]
pub struct RabbitMQSettings {
    pub username: String,
    pub password: Secret<String>,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    pub host: String,
    /// Virtual host, `/` being the broker default
    pub vhost: String,
    /// Name of the durable queue carrying job references.
    /// Overriding it is useful to create parallel queues during tests for example.
    pub task_queue: String,
    pub queue_type: QueueType,
    /// Attempts to connect to the broker before giving up at startup
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub connection_max_attempts: u32,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub connection_retry_interval_seconds: u64,
}

/// Kind of RabbitMQ queue declared for the task queue
///
/// Only quorum queues count redeliveries (`x-delivery-count` header), which the workers
/// need to dead-letter a job after too many failed attempts.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QueueType {
    Classic,
    Quorum,
}

impl QueueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueType::Classic => "classic",
            QueueType::Quorum => "quorum",
        }
    }
}

impl RabbitMQSettings {
    pub fn get_uri(&self) -> String {
        // The default vhost `/` has to be percent-encoded in the URI
        let vhost = self.vhost.replace('/', "%2f");

        format!(
            "amqp://{}:{}@{}:{}/{}",
            &self.username,
            self.password.expose_secret(),
            &self.host,
            &self.port,
            vhost
        )
    }

    pub fn get_connection_properties(&self) -> ConnectionProperties {
        ConnectionProperties::default()
            // Uses tokio executor and reactor.
            // At the moment the reactor is only available for unix.
            .with_executor(tokio_executor_trait::Tokio::current())
            .with_reactor(tokio_reactor_trait::Tokio)
    }

    pub fn dead_letter_queue(&self) -> String {
        format!("{}{}", self.task_queue, DEAD_LETTER_QUEUE_SUFFIX)
    }

    pub fn connection_retry_interval(&self) -> Duration {
        Duration::from_secs(self.connection_retry_interval_seconds)
    }
}

/// Where uploaded and upscaled images are handed between the services
///
/// The directory must be visible to the intake service and to every worker.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageSettings {
    pub root_dir: PathBuf,
}

/// Extracts the settings of a service from its configuration files and env variables
///
/// Files are read from the `configuration` directory of the working directory:
/// `base.yaml` holds the settings shared by all environments, overridden by the file of the running
/// environment (`local.yaml` or `production.yaml`), set with `APP_ENVIRONMENT` and defaulting to `local`.
///
/// Env variables prefixed with `APP_` come last, with `__` as separator:
/// `APP_RABBITMQ__HOST=rabbitmq` sets `rabbitmq.host`.
pub fn get_configuration<Settings: DeserializeOwned>() -> Result<Settings, config::ConfigError> {
    let base_path = std::env::current_dir()
        .map_err(|e| config::ConfigError::Message(format!("No current directory: {}", e)))?;
    let configuration_directory = base_path.join("configuration");

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(config::ConfigError::Message)?;

    config::Config::builder()
        .add_source(config::File::from(
            configuration_directory.join("base.yaml"),
        ))
        .add_source(config::File::from(
            configuration_directory.join(format!("{}.yaml", environment.as_str())),
        ))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?
        .try_deserialize::<Settings>()
}

/// The possible runtime environment of a service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local` or `production`.",
                other
            )),
        }
    }
}
