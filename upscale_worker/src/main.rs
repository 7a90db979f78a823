use common::telemetry::init_service_telemetry;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use upscale_worker::{
    configuration::get_configuration,
    startup::{Application, ApplicationError},
};

#[tokio::main]
async fn main() -> Result<(), ApplicationError> {
    if let Err(error) = init_service_telemetry("upscale_worker") {
        eprintln!("Failed to set up telemetry: {:?}", error);
    }

    // Panics if the configuration can't be read
    let configuration = get_configuration().expect("Failed to read configuration.");

    // Exits with an error once the RabbitMQ connection retries are exhausted
    let application = Application::build(configuration).await?;

    // Stops consuming on ctrl-c, once the delivery being handled is settled
    let cancel_token = CancellationToken::new();
    let signal_cancel_token = cancel_token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received ctrl-c, stopping ...");
                signal_cancel_token.cancel();
            }
            Err(error) => error!(?error, "Failed to listen for ctrl-c"),
        }
    });

    application.run_until_stopped(cancel_token).await
}
