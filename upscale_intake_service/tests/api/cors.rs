use reqwest::Method;

use crate::helpers::spawn_app;

fn assert_cors_headers(response: &reqwest::Response) {
    let headers = response.headers();

    assert_eq!(headers.get("Access-Control-Allow-Origin").unwrap(), "*");
    assert_eq!(
        headers.get("Access-Control-Allow-Methods").unwrap(),
        "POST, GET, OPTIONS, PUT, DELETE"
    );
    assert_eq!(
        headers.get("Access-Control-Allow-Headers").unwrap(),
        "Accept, Content-Type, Content-Length, Accept-Encoding, X-CSRF-Token, Authorization"
    );
}

#[tokio::test]
async fn preflight_requests_only_get_cors_headers() {
    let app = spawn_app().await;
    let routes = vec![
        "/health_check",
        "/upload",
        "/receive-upscaled-image",
        "/get-upscaled-image",
        "/job-status",
        "/report-failed-job",
    ];

    for route in routes {
        let response = app
            .api_client
            .request(Method::OPTIONS, &format!("{}{}", &app.address, route))
            .send()
            .await
            .expect("Failed to execute request.");

        assert_eq!(response.status().as_u16(), 200, "Preflight failed on {}", route);
        assert_cors_headers(&response);
        assert_eq!(response.content_length(), Some(0));
    }

    assert!(app.job_publisher.published().is_empty());
}

#[tokio::test]
async fn successful_and_failed_responses_carry_cors_headers() {
    let app = spawn_app().await;

    let uploaded = app.post_upload(Some("abc123"), Some(b"source")).await;
    let not_found = app.get_upscaled_image("abc123").await;
    let bad_request = app.post_upscaled_image(None, b"bytes").await;

    assert_eq!(uploaded.status().as_u16(), 200);
    assert_cors_headers(&uploaded);
    assert_eq!(not_found.status().as_u16(), 404);
    assert_cors_headers(&not_found);
    assert_eq!(bad_request.status().as_u16(), 400);
    assert_cors_headers(&bad_request);
}
