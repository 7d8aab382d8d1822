use axum::{
    body::Body,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use axum::extract::State;
use http::{header, HeaderMap};
use std::sync::Arc;

use crate::aggregate::SseAggregator;
use crate::reconcile::{ProxyResponse, Reconciler};
use crate::upstream::{HttpUpstreamInvoker, RequestContext, UpstreamBody};
use crate::util::{
    cors_layer_from_env, error_response, upstream_base_url, upstream_provider, AppState,
};

/// Build the Axum router with `/v1/responses` and `/status`.
pub fn build_router() -> Router {
    let state = Arc::new(AppState::default());

    Router::new()
        .route("/status", get(status))
        .route("/v1/responses", post(responses))
        .with_state(state)
        .layer(cors_layer_from_env())
}

/// Service status endpoint to expose configuration and available routes.
async fn status() -> impl IntoResponse {
    let routes = vec!["/status", "/v1/responses"];
    Json(serde_json::json!({
        "name": "response2chat",
        "version": env!("CARGO_PKG_VERSION"),
        "upstream_provider": upstream_provider(),
        "routes": routes
    }))
}

/// Proxy a Responses API request to the Chat Completions upstream and return
/// a result whose shape and transport match what the client asked for.
async fn responses(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<serde_json::Value>,
) -> Response {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|s| s.to_string());

    let ctx = RequestContext {
        provider: upstream_provider(),
        bearer,
    };

    let reconciler = Reconciler::new(
        HttpUpstreamInvoker::new(state.http.clone(), upstream_base_url()),
        SseAggregator::new(),
    );

    match reconciler.handle(payload, &ctx).await {
        Ok(resp) => render(resp),
        Err(e) => error_response(e.status(), &e.to_string()),
    }
}

/// Render a reconciled response as an Axum response, preserving status,
/// headers and the streaming/buffered nature of the body.
fn render(resp: ProxyResponse) -> Response {
    let mut builder = http::Response::builder().status(resp.status);
    if let Some(headers) = builder.headers_mut() {
        *headers = resp.headers;
    }
    let body = match resp.body {
        UpstreamBody::Buffered(bytes) => Body::from(bytes),
        UpstreamBody::Stream(stream) => Body::from_stream(stream),
    };
    builder
        .body(body)
        .unwrap_or_else(|_| error_response(http::StatusCode::INTERNAL_SERVER_ERROR, "render error"))
}
