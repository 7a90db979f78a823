use crate::helpers::spawn_app;

#[tokio::test]
async fn uploaded_job_is_queued() {
    let app = spawn_app().await;
    app.post_upload(Some("abc123"), Some(b"source")).await;

    let response = app.get_job_status("abc123").await;

    assert_eq!(response.status().as_u16(), 200);
    let status: serde_json::Value = response.json().await.unwrap();
    assert_eq!(status["uniqueId"], "abc123");
    assert_eq!(status["state"], "Queued");
    assert!(status["createdAt"].is_string());
    assert!(status["updatedAt"].is_string());
}

#[tokio::test]
async fn state_is_rebuilt_from_the_storage_for_jobs_unknown_to_the_table() {
    let app = spawn_app().await;
    // Files left by a previous run of the service
    std::fs::write(app.storage_path("queued-uploaded.png"), b"source").unwrap();
    std::fs::write(app.storage_path("done-upscaled.png"), b"result").unwrap();

    let queued: serde_json::Value = app.get_job_status("queued").await.json().await.unwrap();
    let done: serde_json::Value = app.get_job_status("done").await.json().await.unwrap();

    assert_eq!(queued["state"], "Queued");
    assert_eq!(done["state"], "Completed");
    assert!(done["createdAt"].is_null());
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let app = spawn_app().await;

    let response = app.get_job_status("never-uploaded").await;

    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn invalid_id_is_rejected() {
    let app = spawn_app().await;

    let response = app.get_job_status("..").await;

    assert_eq!(response.status().as_u16(), 400);
}
