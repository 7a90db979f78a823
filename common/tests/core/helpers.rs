use common::{
    configuration::{QueueType, RabbitMQSettings},
    telemetry::{get_tracing_subscriber, init_tracing_subscriber},
};
use lapin::{options::QueueDeleteOptions, Connection};
use once_cell::sync::Lazy;
use secrecy::Secret;
use tracing::error;
use uuid::Uuid;

// Ensures that the `tracing` stack is only initialized once using `once_cell`
static TRACING: Lazy<()> = Lazy::new(|| {
    let default_filter_level = "info".to_string();
    let subscriber_name = "test".to_string();

    // The sink is part of the type returned by `get_tracing_subscriber`:
    // the easiest is to have 2 code branches, one with `stdout`, and one `sink`.
    if std::env::var("TEST_LOG").is_ok() {
        let subscriber =
            get_tracing_subscriber(subscriber_name, default_filter_level, std::io::stdout);
        init_tracing_subscriber(subscriber).expect("Failed to init tracing");
    } else {
        let subscriber =
            get_tracing_subscriber(subscriber_name, default_filter_level, std::io::sink);
        init_tracing_subscriber(subscriber).expect("Failed to init tracing");
    };
});

/// Initializes the tracing system for the integration tests
pub fn init_test() {
    // The first time `initialize` is invoked the code in `TRACING` is executed.
    // All other invocations will instead skip execution.
    Lazy::force(&TRACING);

    // Custom panic to catch, display and exit on panics from a different thread
    let default_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        error!("panic: {}", info);
        default_panic(info);
        std::process::exit(1);
    }));
}

/// Settings of the local test broker, with a random task queue name to isolate each test
///
/// The broker can be moved with `TEST_RABBITMQ_HOST` and `TEST_RABBITMQ_PORT`.
pub fn test_rabbitmq_settings() -> RabbitMQSettings {
    let host = std::env::var("TEST_RABBITMQ_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = std::env::var("TEST_RABBITMQ_PORT")
        .ok()
        .and_then(|port| port.parse().ok())
        .unwrap_or(5672);

    RabbitMQSettings {
        username: "guest".to_string(),
        password: Secret::new("guest".to_string()),
        port,
        host,
        vhost: "/".to_string(),
        task_queue: format!("test_task_queue_{}", Uuid::new_v4()),
        queue_type: QueueType::Quorum,
        connection_max_attempts: 1,
        connection_retry_interval_seconds: 1,
    }
}

/// Deletes the task queue of a test and its dead-letter queue, they are durable and outlive the test
pub async fn delete_test_queues(connection: &Connection, settings: &RabbitMQSettings) {
    let channel = connection
        .create_channel()
        .await
        .expect("Failed to open a channel to delete the test queues");

    for queue_name in [settings.task_queue.clone(), settings.dead_letter_queue()] {
        channel
            .queue_delete(&queue_name, QueueDeleteOptions::default())
            .await
            .expect("Failed to delete a test queue");
    }
}
