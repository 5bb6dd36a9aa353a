//! HTTP surface: health, view listings, cache retrieval, one MCP endpoint
//! per view and the view-less endpoint at `/mcp`.

pub mod error;
pub mod mcp;

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use mcp_views::{Dispatcher, DEFAULT_VIEW};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tower_http::trace::TraceLayer;
use tracing::debug;

pub use mcp::ViewMcpServer;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
}

impl AppState {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }
}

pub fn build_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/health", get(health))
        .route("/views", get(list_views))
        .route("/views/{name}", get(get_view))
        .route("/cache/{token}", get(retrieve_cached));

    for view in state.dispatcher.views() {
        let path = format!("/view/{}/mcp", view.name);
        debug!(view = %view.name, path = %path, "Mounting MCP endpoint");
        let service = ViewMcpServer::new(state.dispatcher.clone(), view.name.clone()).into_service();
        router = router.nest_service(&path, service);
    }
    let service = ViewMcpServer::new(state.dispatcher.clone(), DEFAULT_VIEW).into_service();
    router = router.nest_service("/mcp", service);

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let dispatcher = &state.dispatcher;
    let servers: Map<String, Value> = dispatcher
        .registry()
        .statuses()
        .into_iter()
        .map(|(name, status)| (name, json!(status)))
        .collect();

    Json(json!({
        "status": "healthy",
        "servers": servers,
        "catalogs": dispatcher.registry().catalog_counts(),
        "metrics": dispatcher.metrics().snapshot(),
        "cache": dispatcher.cache().stats(),
    }))
}

async fn list_views(State(state): State<AppState>) -> Json<Value> {
    let views: Map<String, Value> = state
        .dispatcher
        .views()
        .map(|view| {
            (
                view.name.clone(),
                json!({
                    "description": view.description,
                    "exposure_mode": view.exposure_mode.as_str(),
                }),
            )
        })
        .collect();
    Json(json!({ "views": views }))
}

async fn get_view(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    let view = match state.dispatcher.view(&name) {
        Ok(view) => view,
        Err(e) => return error::mcp_error(&e),
    };
    let tools: Vec<Value> = view
        .tools()
        .iter()
        .map(|tool| json!({"name": tool.name, "description": tool.description}))
        .collect();

    Json(json!({
        "name": view.name,
        "description": view.description,
        "exposure_mode": view.exposure_mode.as_str(),
        "tools": tools,
    }))
    .into_response()
}

#[derive(Debug, Deserialize)]
struct CapabilityParams {
    expires: i64,
    sig: String,
}

async fn retrieve_cached(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Query(params): Query<CapabilityParams>,
) -> Response {
    let entry = match state
        .dispatcher
        .cache()
        .retrieve(&token, params.expires, &params.sig)
    {
        Ok(entry) => entry,
        Err(e) => {
            debug!(error = %e, "Cache retrieval rejected");
            return error::cache_error(&e);
        }
    };

    let content_type = if serde_json::from_str::<Value>(&entry.payload).is_ok() {
        "application/json"
    } else {
        "text/plain; charset=utf-8"
    };
    ([(header::CONTENT_TYPE, content_type)], entry.payload.clone()).into_response()
}
