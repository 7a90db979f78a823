use std::{
    net::TcpListener,
    path::PathBuf,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use common::{
    constants::headers::FILE_NAME,
    core::image_file_repository::ImageFileRepository,
    dtos::job_reference::JobReference,
    ports::job_publisher::{JobPublisher, JobPublisherError},
    telemetry::{get_tracing_subscriber, init_tracing_subscriber},
};
use once_cell::sync::Lazy;
use reqwest::multipart::{Form, Part};
use tempfile::TempDir;
use upscale_intake_service::{
    configuration::get_configuration, domain::entities::job::JobTable, startup::run,
};

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

/// Job publisher keeping the published job references in memory, instead of sending them to RabbitMQ
#[derive(Default)]
pub struct RecordingJobPublisher {
    published: Mutex<Vec<JobReference>>,
    unavailable: bool,
}

impl RecordingJobPublisher {
    /// A publisher failing every publication, like a publisher whose broker is down
    pub fn unavailable() -> Self {
        Self {
            published: Mutex::new(vec![]),
            unavailable: true,
        }
    }

    pub fn published(&self) -> Vec<JobReference> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobPublisher for RecordingJobPublisher {
    async fn publish_job(&self, job_reference: &JobReference) -> Result<(), JobPublisherError> {
        if self.unavailable {
            return Err(JobPublisherError::Unavailable(
                "RabbitMQ is unreachable".to_string(),
            ));
        }

        self.published.lock().unwrap().push(job_reference.clone());
        Ok(())
    }
}

pub struct TestApp {
    pub address: String,
    pub port: u16,
    /// Storage root of this test only, removed when the test ends
    pub storage_root: TempDir,
    pub job_publisher: Arc<RecordingJobPublisher>,
    pub api_client: reqwest::Client,
}

/// A test API client / test suite
impl TestApp {
    pub fn storage_path(&self, file_name: &str) -> PathBuf {
        self.storage_root.path().join(file_name)
    }

    /// Sends a multipart upload, with the `id` and `image` parts only if they are given
    pub async fn post_upload(&self, id: Option<&str>, image: Option<&[u8]>) -> reqwest::Response {
        let mut form = Form::new();

        if let Some(id) = id {
            form = form.part("id", Part::text(id.to_string()).mime_str("text/plain").unwrap());
        }

        if let Some(image) = image {
            form = form.part(
                "image",
                Part::bytes(image.to_vec())
                    .file_name("image.png")
                    .mime_str("image/png")
                    .unwrap(),
            );
        }

        self.api_client
            .post(&format!("{}/upload", &self.address))
            .multipart(form)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn post_upscaled_image(
        &self,
        file_name: Option<&str>,
        image: &[u8],
    ) -> reqwest::Response {
        let mut request = self
            .api_client
            .post(&format!("{}/receive-upscaled-image", &self.address))
            .body(image.to_vec());

        if let Some(file_name) = file_name {
            request = request.header(FILE_NAME, file_name);
        }

        request.send().await.expect("Failed to execute request.")
    }

    pub async fn get_upscaled_image(&self, unique_id: &str) -> reqwest::Response {
        self.api_client
            .get(&format!("{}/get-upscaled-image", &self.address))
            .query(&[("uniqueId", unique_id)])
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn get_job_status(&self, unique_id: &str) -> reqwest::Response {
        self.api_client
            .get(&format!("{}/job-status", &self.address))
            .query(&[("uniqueId", unique_id)])
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn post_failed_job(&self, unique_id: &str, reason: &str) -> reqwest::Response {
        self.api_client
            .post(&format!("{}/report-failed-job", &self.address))
            .query(&[("uniqueId", unique_id)])
            .body(reason.to_string())
            .send()
            .await
            .expect("Failed to execute request.")
    }
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with_publisher(Arc::new(RecordingJobPublisher::default())).await
}

/// Launches the server as a background task
/// When a tokio runtime is shut down all tasks spawned on it are dropped.
/// tokio::test spins up a new runtime at the beginning of each test case and they shut down at the end of each test case.
/// Therefore no need to implement any clean up logic to avoid leaking resources between test runs
pub async fn spawn_app_with_publisher(job_publisher: Arc<RecordingJobPublisher>) -> TestApp {
    // The first time `initialize` is invoked the code in `TRACING` is executed.
    // All other invocations will instead skip execution.
    Lazy::force(&TRACING);

    let storage_root = tempfile::tempdir().expect("Failed to create the storage root");

    // Randomizes configuration to ensure test isolation
    let configuration = {
        let mut c = get_configuration().expect("Failed to read configuration.");
        c.application.host = "127.0.0.1".to_string();
        // Uses a random OS port: port 0 is special-cased at the OS level
        c.application.port = 0;
        c.storage.root_dir = storage_root.path().to_path_buf();
        c
    };

    let listener = TcpListener::bind(format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    ))
    .expect("Failed to bind a random port");
    let port = listener.local_addr().unwrap().port();

    let server = run(
        listener,
        &configuration,
        Some(1),
        job_publisher.clone(),
        ImageFileRepository::new(storage_root.path()),
        Arc::new(JobTable::new(configuration.application.job_retention())),
    )
    .expect("Failed to build the server");

    // Launches the server as a background task
    let _ = tokio::spawn(server);

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        port,
        storage_root,
        job_publisher,
        api_client: reqwest::Client::new(),
    }
}
