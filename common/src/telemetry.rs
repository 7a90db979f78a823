use tracing::subscriber::{set_global_default, SetGlobalDefaultError};
use tracing::Subscriber;
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_log::{log_tracer::SetLoggerError, LogTracer};
use tracing_subscriber::{fmt::MakeWriter, layer::SubscriberExt, EnvFilter, Registry};

use crate::helper::error_chain_fmt;

/// Composes the layers processing our spans and events into a `tracing` Subscriber
///
/// - `EnvFilter` discards spans based on their level and origin, read from `RUST_LOG`
///   and falling back to `fallback_env_filter`
/// - `JsonStorageLayer` stores span data as JSON and propagates it from parent to children spans
/// - `BunyanFormattingLayer` outputs records in bunyan-compatible JSON to `sink`
///
/// # Arguments
/// - `name`: name of the service, added to every record
/// - `fallback_env_filter`: filter level if RUST_LOG has not been set
/// - `sink`: where the records are written
pub fn get_tracing_subscriber<Sink>(
    name: String,
    fallback_env_filter: String,
    sink: Sink,
) -> impl Subscriber + Send + Sync
where
    // The sink implements `MakeWriter` for every lifetime `'a` (higher-ranked trait bound)
    Sink: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback_env_filter));

    let formatting_layer = BunyanFormattingLayer::new(name, sink);

    Registry::default()
        .with(env_filter)
        .with(JsonStorageLayer)
        .with(formatting_layer)
}

/// Registers a Subscriber as the global default and redirects `log` records to it
///
/// Can only succeed once per process.
pub fn init_tracing_subscriber(
    subscriber: impl Subscriber + Send + Sync,
) -> Result<(), TelemetryError> {
    LogTracer::init()?;
    set_global_default(subscriber)?;
    Ok(())
}

/// Sets up the telemetry of a service binary: bunyan JSON records on stdout, `info` by default
pub fn init_service_telemetry(service_name: &str) -> Result<(), TelemetryError> {
    let subscriber = get_tracing_subscriber(service_name.into(), "info".into(), std::io::stdout);
    init_tracing_subscriber(subscriber)
}

#[derive(thiserror::Error)]
pub enum TelemetryError {
    #[error("Failed to redirect log records: {0}")]
    LoggerError(#[from] SetLoggerError),
    #[error("Failed to set the global tracing subscriber: {0}")]
    SubscriberError(#[from] SetGlobalDefaultError),
}

impl std::fmt::Debug for TelemetryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
