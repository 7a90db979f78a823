use std::sync::Arc;

use crate::helpers::{spawn_app, spawn_app_with_publisher, RecordingJobPublisher};

#[tokio::test]
async fn upload_stores_the_image_and_queues_its_reference() {
    let app = spawn_app().await;

    let response = app.post_upload(Some("abc123"), Some(b"image bytes")).await;

    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(
        response.headers().get("X-Unique-Id").unwrap(),
        "abc123"
    );
    assert_eq!(
        response.text().await.unwrap(),
        "Successfully uploaded file and task queued"
    );

    let stored = std::fs::read(app.storage_path("abc123-uploaded.png")).unwrap();
    assert_eq!(stored, b"image bytes");

    let published = app.job_publisher.published();
    assert_eq!(published.len(), 1);
    assert_eq!(
        published[0].source_path(),
        app.storage_path("abc123-uploaded.png").to_str().unwrap()
    );
    assert_eq!(published[0].job_id().unwrap().as_ref(), "abc123");
}

#[tokio::test]
async fn upload_without_id_generates_one() {
    let app = spawn_app().await;

    let response = app.post_upload(None, Some(b"image bytes")).await;

    assert_eq!(response.status().as_u16(), 200);
    let job_id = response
        .headers()
        .get("X-Unique-Id")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(uuid::Uuid::parse_str(&job_id).is_ok());
    assert!(app
        .storage_path(&format!("{}-uploaded.png", job_id))
        .is_file());
}

#[tokio::test]
async fn upload_without_image_is_rejected_before_touching_storage_or_queue() {
    let app = spawn_app().await;

    let response = app.post_upload(Some("abc123"), None).await;

    assert_eq!(response.status().as_u16(), 400);
    assert_eq!(response.text().await.unwrap(), "Error retrieving the file");
    assert!(!app.storage_path("abc123-uploaded.png").exists());
    assert!(app.job_publisher.published().is_empty());
}

#[tokio::test]
async fn upload_with_invalid_id_is_rejected() {
    let app = spawn_app().await;
    let test_cases = vec![
        ("../../etc/passwd", "path traversal"),
        ("..", "parent directory"),
        ("a\\b", "backslash"),
        ("abc\u{0}def", "NUL character"),
    ];

    for (id, description) in test_cases {
        let response = app.post_upload(Some(id), Some(b"image bytes")).await;

        assert_eq!(
            response.status().as_u16(),
            400,
            "The API did not fail with 400 Bad Request when the id contained a {}",
            description
        );
    }

    assert_eq!(std::fs::read_dir(app.storage_root.path()).unwrap().count(), 0);
    assert!(app.job_publisher.published().is_empty());
}

#[tokio::test]
async fn upload_of_a_job_still_queued_is_a_conflict() {
    let app = spawn_app().await;

    let first = app.post_upload(Some("abc123"), Some(b"first")).await;
    let second = app.post_upload(Some("abc123"), Some(b"second")).await;

    assert_eq!(first.status().as_u16(), 200);
    assert_eq!(second.status().as_u16(), 409);
    assert_eq!(
        std::fs::read(app.storage_path("abc123-uploaded.png")).unwrap(),
        b"first"
    );
    assert_eq!(app.job_publisher.published().len(), 1);
}

#[tokio::test]
async fn upload_of_a_completed_job_is_queued_again() {
    let app = spawn_app().await;

    app.post_upload(Some("abc123"), Some(b"first")).await;
    app.post_upscaled_image(Some("abc123-upscaled.png"), b"result")
        .await;
    let response = app.post_upload(Some("abc123"), Some(b"second")).await;

    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(app.job_publisher.published().len(), 2);
}

#[tokio::test]
async fn result_of_a_previous_run_is_not_served_for_a_new_upload() {
    let app = spawn_app().await;

    app.post_upload(Some("abc123"), Some(b"first")).await;
    app.post_upscaled_image(Some("abc123-upscaled.png"), b"first result")
        .await;
    let response = app.post_upload(Some("abc123"), Some(b"second")).await;
    assert_eq!(response.status().as_u16(), 200);

    let fetched = app.get_upscaled_image("abc123").await;
    assert_eq!(fetched.status().as_u16(), 404);
    assert!(!app.storage_path("abc123-upscaled.png").exists());

    let status: serde_json::Value = app.get_job_status("abc123").await.json().await.unwrap();
    assert_eq!(status["state"], "Queued");
}

#[tokio::test]
async fn upload_fails_and_cleans_up_when_the_job_cannot_be_queued() {
    let app = spawn_app_with_publisher(Arc::new(RecordingJobPublisher::unavailable())).await;

    let response = app.post_upload(Some("abc123"), Some(b"image bytes")).await;

    assert_eq!(response.status().as_u16(), 500);
    assert_eq!(response.text().await.unwrap(), "Failed to publish a message");
    // No orphan source image
    assert!(!app.storage_path("abc123-uploaded.png").exists());

    // The reservation is released: the job is unknown
    let status = app.get_job_status("abc123").await;
    assert_eq!(status.status().as_u16(), 404);
}
