use actix_web::{middleware::DefaultHeaders, HttpResponse};

/// Headers added to every response, browsers call the service from any origin
pub fn cors_headers() -> DefaultHeaders {
    DefaultHeaders::new()
        .add(("Access-Control-Allow-Origin", "*"))
        .add((
            "Access-Control-Allow-Methods",
            "POST, GET, OPTIONS, PUT, DELETE",
        ))
        .add((
            "Access-Control-Allow-Headers",
            "Accept, Content-Type, Content-Length, Accept-Encoding, X-CSRF-Token, Authorization",
        ))
}

/// Answers CORS preflight requests: only the CORS headers, no body
pub async fn preflight() -> HttpResponse {
    HttpResponse::Ok().finish()
}
