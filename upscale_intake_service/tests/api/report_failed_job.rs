use crate::helpers::spawn_app;

#[tokio::test]
async fn reported_job_is_failed_with_its_reason() {
    let app = spawn_app().await;
    app.post_upload(Some("abc123"), Some(b"source")).await;

    let response = app
        .post_failed_job("abc123", "Upscale service returned 500")
        .await;

    assert_eq!(response.status().as_u16(), 200);
    let status: serde_json::Value = app.get_job_status("abc123").await.json().await.unwrap();
    assert_eq!(status["state"], "Failed");
    assert_eq!(status["failureReason"], "Upscale service returned 500");
}

#[tokio::test]
async fn empty_reason_is_recorded_as_unknown() {
    let app = spawn_app().await;

    let response = app.post_failed_job("abc123", "").await;

    assert_eq!(response.status().as_u16(), 200);
    let status: serde_json::Value = app.get_job_status("abc123").await.json().await.unwrap();
    assert_eq!(status["state"], "Failed");
    assert_eq!(status["failureReason"], "Unknown failure");
}

#[tokio::test]
async fn a_failed_job_can_be_uploaded_again() {
    let app = spawn_app().await;
    app.post_upload(Some("abc123"), Some(b"source")).await;
    app.post_failed_job("abc123", "Upscale service timed out")
        .await;

    let response = app.post_upload(Some("abc123"), Some(b"source")).await;

    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn invalid_id_is_rejected() {
    let app = spawn_app().await;

    let response = app.post_failed_job("a/b", "reason").await;

    assert_eq!(response.status().as_u16(), 400);
}
