use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use mcp_views::{
    CustomToolRegistry, Dispatcher, HookRegistry, OutputCache, ProxyConfig, ProxyMetrics,
    UpstreamRegistry,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use view_proxy::{build_router, logging, AppState};

#[derive(Parser, Debug)]
#[command(author, version, about = "Serve curated MCP tool views over upstream servers")]
struct Args {
    /// YAML config with `mcp_servers` and `tool_views`
    #[arg(short, long, env = "MCP_PROXY_CONFIG")]
    config: String,

    #[arg(long, env = "MCP_PROXY_HOST", default_value = "127.0.0.1")]
    host: String,

    #[arg(long, env = "MCP_PROXY_PORT", default_value_t = 8000)]
    port: u16,

    /// Public base URL for cache retrieval links; overrides `cache.base_url`
    #[arg(long, env = "MCP_PROXY_BASE_URL")]
    base_url: Option<String>,

    #[arg(long, env = "MCP_PROXY_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init_logging(&args.log_level, args.log_json);

    let mut config = ProxyConfig::from_file(&args.config)
        .await
        .with_context(|| format!("loading config from {}", args.config))?;
    if let Some(base_url) = args.base_url {
        config.cache.base_url = base_url;
    }

    let metrics = Arc::new(ProxyMetrics::new());
    let registry = Arc::new(UpstreamRegistry::from_config(&config, metrics.clone()));
    registry
        .register_all(&config)
        .await
        .context("connecting upstream servers")?;

    let cache = Arc::new(OutputCache::new(&config.cache).context("configuring output cache")?);
    let shutdown = CancellationToken::new();
    let purge = cache.spawn_purge_task(shutdown.child_token());

    let dispatcher = Dispatcher::build(
        &config,
        registry.clone(),
        &HookRegistry::with_builtins(),
        &CustomToolRegistry::new(),
        cache,
        metrics,
    )
    .await
    .context("resolving tool views")?;

    let app = build_router(AppState::new(dispatcher));
    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!(address = %addr, "MCP view proxy listening");

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for ctrl-c");
            }
            info!("Shutdown signal received");
            server_shutdown.cancel();
        })
        .await
        .context("serving HTTP")?;

    shutdown.cancel();
    if tokio::time::timeout(Duration::from_secs(5), purge).await.is_err() {
        warn!("Cache purge task did not stop in time");
    }
    registry.shutdown().await;
    info!("Upstream clients closed");
    Ok(())
}
