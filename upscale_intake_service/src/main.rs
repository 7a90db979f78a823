use common::telemetry::init_service_telemetry;
use upscale_intake_service::{configuration::get_configuration, startup::Application};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    if let Err(error) = init_service_telemetry("upscale_intake_service") {
        eprintln!("Failed to set up telemetry: {:?}", error);
    }

    // Panics if the configuration can't be read
    let configuration = get_configuration().expect("Failed to read configuration.");

    // Exits once the RabbitMQ connection retries are exhausted
    let application = match Application::build(configuration, None).await {
        Ok(application) => application,
        Err(error) => panic!("Failed to build application: {:?}", error),
    };

    application.run_until_stopped().await?;
    Ok(())
}
