mod middleware;
pub mod models;
mod signature;

pub use signature::pipeline_error_to_http;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::StatusCode,
    middleware as axum_middleware,
    response::IntoResponse,
    routing::{get, post},
};

use crate::application::pipeline::SignaturePipeline;

use middleware::{log_responses, set_request_context};

#[derive(Clone)]
pub struct HttpState {
    pub pipeline: SignaturePipeline,
}

impl HttpState {
    pub fn new(pipeline: SignaturePipeline) -> Self {
        Self { pipeline }
    }
}

pub fn build_router(state: HttpState, body_limit: usize) -> Router {
    Router::new()
        .route(
            "/api/process-signature",
            post(signature::process_signature).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/health", get(health))
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}

async fn health() -> impl IntoResponse {
    StatusCode::NO_CONTENT
}
