use std::{
    borrow::Cow,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use mcp_views::{
    cache::CapabilitySigner,
    core::{RestartPolicy, UpstreamClient, UpstreamConnector, UpstreamServerConfig},
    CustomToolRegistry, Dispatcher, HookRegistry, McpError, McpResult, OutputCache, ProxyConfig,
    ProxyMetrics, Tool, UpstreamRegistry, DEFAULT_VIEW,
};
use rmcp::model::{CallToolResult, Content};
use serde_json::{json, Map, Value};
use tower::ServiceExt;
use view_proxy::{build_router, AppState};

const SECRET: &str = "s3cret";

fn tool(name: &str, description: &str) -> Tool {
    let schema = json!({"type": "object", "properties": {}});
    Tool {
        name: Cow::Owned(name.to_string()),
        title: None,
        description: Some(Cow::Owned(description.to_string())),
        input_schema: Arc::new(schema.as_object().cloned().unwrap()),
        output_schema: None,
        annotations: None,
        icons: None,
    }
}

/// Filesystem-like upstream whose `read_file` returns a large log.
struct FakeFs;

fn big_log() -> String {
    "line of log output\n".repeat(100)
}

#[async_trait]
impl UpstreamClient for FakeFs {
    async fn list_tools(&self) -> McpResult<Vec<Tool>> {
        Ok(vec![
            tool("read_file", "Read the contents of a file"),
            tool("list_commits", "List recent commits"),
        ])
    }

    async fn call_tool(
        &self,
        name: &str,
        _arguments: Option<Map<String, Value>>,
    ) -> McpResult<CallToolResult> {
        match name {
            "read_file" => Ok(CallToolResult::success(vec![Content::text(big_log())])),
            "list_commits" => Ok(CallToolResult::success(vec![Content::text("abc123")])),
            other => Err(McpError::upstream(format!("no tool {}", other))),
        }
    }

    async fn shutdown(&self) {}
}

struct FakeConnector;

#[async_trait]
impl UpstreamConnector for FakeConnector {
    async fn connect(
        &self,
        _server: &str,
        _config: &UpstreamServerConfig,
    ) -> McpResult<Arc<dyn UpstreamClient>> {
        Ok(Arc::new(FakeFs))
    }
}

const CONFIG: &str = r#"
mcp_servers:
  fs: {protocol: stdio, command: fs, cache_outputs: true}
tool_views:
  logs:
    description: Read-only log access
    tools:
      fs:
        read_file: {}
        list_commits:
          name: commits
  finder:
    exposure_mode: search
    tools:
      fs:
        read_file: {}
cache:
  enabled: true
  secret: s3cret
  min_size: 100
  preview_chars: 40
  base_url: http://proxy.local
"#;

async fn app() -> (Router, Dispatcher) {
    let config = ProxyConfig::from_yaml(CONFIG).unwrap();
    let metrics = Arc::new(ProxyMetrics::new());
    let registry = Arc::new(UpstreamRegistry::new(
        Arc::new(FakeConnector),
        RestartPolicy::default(),
        Duration::from_secs(5),
        metrics.clone(),
    ));
    registry.register_all(&config).await.unwrap();
    let cache = Arc::new(OutputCache::new(&config.cache).unwrap());
    let dispatcher = Dispatcher::build(
        &config,
        registry,
        &HookRegistry::with_builtins(),
        &CustomToolRegistry::new(),
        cache,
        metrics,
    )
    .await
    .unwrap();
    (build_router(AppState::new(dispatcher.clone())), dispatcher)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Option<String>, Vec<u8>) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, content_type, body.to_vec())
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let (status, _, body) = get(app, uri).await;
    (status, serde_json::from_slice(&body).unwrap())
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

#[tokio::test]
async fn test_health_reports_servers_and_metrics() {
    let (app, _) = app().await;
    let (status, body) = get_json(&app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("healthy"));
    assert_eq!(body["servers"]["fs"]["state"], json!("connected"));
    assert_eq!(body["catalogs"], json!({"servers": 1, "tools": 2}));
    assert_eq!(body["metrics"]["total_calls"], json!(0));
    assert_eq!(body["cache"]["entries"], json!(0));
}

#[tokio::test]
async fn test_health_reports_latency_per_tool() {
    let (app, dispatcher) = app().await;
    dispatcher
        .dispatch("logs", "commits", Map::new())
        .await
        .unwrap();

    let (_, body) = get_json(&app, "/health").await;
    assert_eq!(body["metrics"]["total_calls"], json!(1));
    assert_eq!(body["metrics"]["tool_latency"]["logs/commits"]["count"], json!(1));
}

#[tokio::test]
async fn test_views_listing() {
    let (app, _) = app().await;
    let (status, body) = get_json(&app, "/views").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["views"]["logs"]["description"],
        json!("Read-only log access")
    );
    assert_eq!(body["views"]["logs"]["exposure_mode"], json!("direct"));
    assert_eq!(body["views"]["finder"]["exposure_mode"], json!("search"));
    assert!(body["views"].get(DEFAULT_VIEW).is_none());
}

#[tokio::test]
async fn test_view_detail_lists_exposed_names() {
    let (app, _) = app().await;

    let (status, body) = get_json(&app, "/views/logs").await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["commits", "read_file"]);

    let (_, body) = get_json(&app, "/views/finder").await;
    let names: Vec<&str> = body["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["finder_search_tools", "finder_call_tool"]);
}

#[tokio::test]
async fn test_unknown_view_is_404() {
    let (app, _) = app().await;
    let (status, body) = get_json(&app, "/views/nope").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], json!("not_found"));
    assert_eq!(body["error"]["message"], json!("View 'nope' not found"));
}

#[tokio::test]
async fn test_cached_result_served_by_capability_url() {
    let (app, dispatcher) = app().await;

    let reference = dispatcher
        .dispatch("logs", "read_file", Map::new())
        .await
        .unwrap();
    assert_eq!(reference["cached"], json!(true));
    let url = reference["retrieve_url"].as_str().unwrap();
    let path = url.strip_prefix("http://proxy.local").unwrap();

    let (status, content_type, body) = get(&app, path).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("text/plain; charset=utf-8"));
    assert_eq!(String::from_utf8(body).unwrap(), big_log());

    // Retrieval is repeatable until expiry.
    let (status, _, _) = get(&app, path).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_capability_failures_map_to_status_codes() {
    let (app, dispatcher) = app().await;
    let reference = dispatcher
        .dispatch("logs", "read_file", Map::new())
        .await
        .unwrap();
    let token = reference["token"].as_str().unwrap();
    let signer = CapabilitySigner::new(SECRET.as_bytes()).unwrap();

    // Tampered signature.
    let expires = now_secs() + 600;
    let forged = format!("/cache/{}?expires={}&sig={}", token, expires, "0".repeat(64));
    let (status, body) = get_json(&app, &forged).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], json!("invalid_signature"));

    // Valid signature, past expiry.
    let past = now_secs() - 10;
    let stale = format!("/cache/{}?expires={}&sig={}", token, past, signer.sign(token, past));
    let (status, body) = get_json(&app, &stale).await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["error"]["code"], json!("expired"));

    // Valid signature for a token that was never stored.
    let unknown = "ab".repeat(32);
    let missing = format!(
        "/cache/{}?expires={}&sig={}",
        unknown,
        expires,
        signer.sign(&unknown, expires)
    );
    let (status, body) = get_json(&app, &missing).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], json!("not_found"));
}

#[tokio::test]
async fn test_mcp_endpoint_mounted_per_view() {
    let (app, _) = app().await;

    let request = Request::builder()
        .method("POST")
        .uri("/view/logs/mcp")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}).to_string(),
        ))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_ne!(response.status(), StatusCode::NOT_FOUND);

    let (status, _, _) = get(&app, "/view/nope/mcp").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_root_mcp_endpoint_serves_every_server_tool() {
    let (app, dispatcher) = app().await;

    let request = Request::builder()
        .method("POST")
        .uri("/mcp")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}).to_string(),
        ))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_ne!(response.status(), StatusCode::NOT_FOUND);

    // No view renames apply: upstream names come through as listed.
    let view = dispatcher.default_view().unwrap();
    assert_eq!(view.tool_names(), vec!["read_file", "list_commits"]);

    let result = dispatcher
        .dispatch(DEFAULT_VIEW, "list_commits", Map::new())
        .await
        .unwrap();
    assert_eq!(result["content"][0]["text"], json!("abc123"));
}
