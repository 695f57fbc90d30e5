//! Gateway - the hosting runtime that turns HTTP requests into request events
//!
//! Every method and path is handed to the dispatcher unchanged; what the
//! request means is entirely up to the module.

use std::collections::HashMap;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Router,
};
use edge_dispatch_sdk::response::BINARY_RESPONSE_HEADER;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::dispatcher::{DispatchError, Dispatcher};

/// Shared state of the gateway router
#[derive(Debug, Clone)]
pub struct GatewayState {
    pub dispatcher: Dispatcher,
    pub handler_timeout: Duration,
    pub max_body_bytes: usize,
}

/// Create the router that forwards all incoming requests to the module
pub fn create_gateway_router(state: GatewayState) -> Router {
    Router::new()
        .fallback(handle_gateway_request)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Activate the module in the background so the first request finds it ready.
///
/// Requests arriving meanwhile join this activation rather than starting one.
pub fn spawn_warmup(dispatcher: &Dispatcher) -> JoinHandle<()> {
    let loader = dispatcher.loader().clone();
    tokio::spawn(async move {
        if loader.ensure_ready().await.is_err() {
            tracing::warn!("Module warm-up failed; requests will be answered with errors");
        }
    })
}

async fn handle_gateway_request(State(state): State<GatewayState>, request: Request) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %path,
        "Incoming request"
    );

    let query: HashMap<String, String> = request
        .uri()
        .query()
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        })
        .unwrap_or_default();

    let headers: HashMap<String, String> = request
        .headers()
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
        .collect();

    let body_bytes = match axum::body::to_bytes(request.into_body(), state.max_body_bytes).await {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!(request_id = %request_id, "Failed to read body: {}", e);
            return (StatusCode::BAD_REQUEST, "Failed to read body").into_response();
        }
    };

    let body = if body_bytes.is_empty() {
        None
    } else {
        Some(String::from_utf8_lossy(&body_bytes).to_string())
    };

    let sdk_request = edge_dispatch_sdk::Request {
        method,
        path,
        query,
        headers,
        body,
        request_id: request_id.clone(),
    };

    // Expiry drops only this request's event
    let dispatched = state.dispatcher.handle(sdk_request);
    let resolution = tokio::time::timeout(state.handler_timeout, dispatched)
        .await
        .unwrap_or(Err(DispatchError::Cancelled));

    let sdk_response = match resolution {
        Ok(response) => response,
        Err(e) => {
            match &e {
                DispatchError::Handler(_) => {
                    tracing::warn!(request_id = %request_id, "Handler error: {}", e)
                }
                _ => tracing::error!(request_id = %request_id, "Dispatch error: {}", e),
            }
            e.into_response()
        }
    };

    into_http_response(sdk_response, &request_id)
}

fn into_http_response(sdk_response: edge_dispatch_sdk::Response, request_id: &str) -> Response {
    let Some(body) = sdk_response.decoded_body() else {
        tracing::error!(request_id = %request_id, "Module returned an undecodable binary body");
        return (StatusCode::INTERNAL_SERVER_ERROR, "Invalid binary response body").into_response();
    };

    let mut builder = Response::builder().status(sdk_response.status);
    for (key, value) in &sdk_response.headers {
        if key.eq_ignore_ascii_case(BINARY_RESPONSE_HEADER) {
            continue;
        }
        builder = builder.header(key, value);
    }

    match builder.body(Body::from(body)) {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(request_id = %request_id, "Failed to build response: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to build response").into_response()
        }
    }
}
