use crate::helpers::spawn_app;

#[tokio::test]
async fn upscaled_image_is_stored_under_its_job_id() {
    let app = spawn_app().await;

    let response = app
        .post_upscaled_image(Some("abc123-upscaled.png"), b"upscaled bytes")
        .await;

    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(
        response.text().await.unwrap(),
        "Image received and saved successfully."
    );
    assert_eq!(
        std::fs::read(app.storage_path("abc123-upscaled.png")).unwrap(),
        b"upscaled bytes"
    );
}

#[tokio::test]
async fn only_the_last_component_of_the_file_name_is_used() {
    let app = spawn_app().await;

    let response = app
        .post_upscaled_image(Some("/tmp/elsewhere/abc123-upscaled.png"), b"upscaled bytes")
        .await;

    assert_eq!(response.status().as_u16(), 200);
    assert!(app.storage_path("abc123-upscaled.png").is_file());
}

#[tokio::test]
async fn path_traversal_in_the_file_name_is_rejected() {
    let app = spawn_app().await;
    let outside = app.storage_root.path().parent().unwrap().join("passwd");

    let response = app
        .post_upscaled_image(Some("../../etc/passwd"), b"malicious bytes")
        .await;

    assert_eq!(response.status().as_u16(), 400);
    assert_eq!(std::fs::read_dir(app.storage_root.path()).unwrap().count(), 0);
    assert!(!outside.exists());
}

#[tokio::test]
async fn unexpected_file_names_are_rejected() {
    let app = spawn_app().await;
    let test_cases = vec![
        (None, "missing header"),
        (Some(""), "empty file name"),
        (Some("abc123-uploaded.png"), "source image name"),
        (Some("abc123-upscaled.jpg"), "other extension"),
        (Some("-upscaled.png"), "empty job id"),
        (Some(".."), "parent directory"),
    ];

    for (file_name, description) in test_cases {
        let response = app.post_upscaled_image(file_name, b"bytes").await;

        assert_eq!(
            response.status().as_u16(),
            400,
            "The API did not fail with 400 Bad Request for a {}",
            description
        );
    }

    assert_eq!(std::fs::read_dir(app.storage_root.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn other_methods_are_not_allowed() {
    let app = spawn_app().await;

    let response = app
        .api_client
        .get(&format!("{}/receive-upscaled-image", &app.address))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(response.status().as_u16(), 405);
    assert_eq!(response.text().await.unwrap(), "Only POST method is allowed");
}

#[tokio::test]
async fn receiving_the_result_completes_the_job() {
    let app = spawn_app().await;
    app.post_upload(Some("abc123"), Some(b"source")).await;

    app.post_upscaled_image(Some("abc123-upscaled.png"), b"result")
        .await;

    let status: serde_json::Value = app.get_job_status("abc123").await.json().await.unwrap();
    assert_eq!(status["state"], "Completed");
}

#[tokio::test]
async fn upscaled_image_larger_than_the_upload_limit_is_accepted() {
    let app = spawn_app().await;
    let source = vec![0u8; 6 * 1024 * 1024];
    // Four times the size of its source, above the upload limit
    let upscaled = vec![1u8; 24 * 1024 * 1024];

    let upload = app.post_upload(Some("big"), Some(&source)).await;
    assert_eq!(upload.status().as_u16(), 200);

    let response = app
        .post_upscaled_image(Some("big-upscaled.png"), &upscaled)
        .await;

    assert_eq!(response.status().as_u16(), 200);
    let stored = std::fs::read(app.storage_path("big-upscaled.png")).unwrap();
    assert_eq!(stored.len(), upscaled.len());
}
