use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pansou_core::{
    load_config, validate_config, AsyncResultCache, AsyncSearchSource, DiskCache, JikepanPlugin,
    MemoryCache, SearchService, SearchSource, SourceRegistry, TelegramChannelSource,
    TwoLevelCache, WorkerBudget,
};

use pansou_server::api::create_router;
use pansou_server::state::AppState;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("PANSOU_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    validate_config(&config).context("Configuration validation failed")?;

    let request_timeout = config.search.request_timeout();

    // Built-in plugins; adding one here is the only change a new source needs
    let plugins: Vec<Arc<dyn SearchSource>> =
        vec![Arc::new(JikepanPlugin::new(request_timeout))];

    // Wrap plugins with the async cache-and-refresh layer when enabled
    let mut registry = SourceRegistry::new();
    let mut async_cache: Option<Arc<AsyncResultCache>> = None;
    let mut persist_task = None;

    if config.async_plugin.enabled {
        let cache = Arc::new(AsyncResultCache::new(
            &config.async_plugin,
            config.cache.dir.join("async_plugin_cache.json"),
        ));
        cache.load().await;
        persist_task = Some(cache.spawn_persist_loop());

        let budget = Arc::new(WorkerBudget::new(
            config.async_plugin.max_background_workers,
            config.async_plugin.max_background_tasks,
        ));
        for plugin in plugins {
            registry.register(Arc::new(AsyncSearchSource::new(
                plugin,
                Arc::clone(&cache),
                Arc::clone(&budget),
                &config.async_plugin,
            )));
        }
        async_cache = Some(cache);
    } else {
        for plugin in plugins {
            registry.register(plugin);
        }
    }

    info!(plugins = registry.len(), "Plugin registry built");

    // One adapter per configured channel
    let channels: Vec<Arc<dyn SearchSource>> = config
        .search
        .default_channels
        .iter()
        .map(|name| {
            Arc::new(TelegramChannelSource::new(name, request_timeout)) as Arc<dyn SearchSource>
        })
        .collect();

    let response_cache = if config.cache.enabled {
        Some(Arc::new(TwoLevelCache::new(
            MemoryCache::new(config.cache.memory_max_bytes),
            DiskCache::new(config.cache.dir.join("responses"))
                .context("Failed to open disk cache")?,
        )))
    } else {
        None
    };

    let service = Arc::new(SearchService::new(
        &config,
        Arc::new(registry),
        channels,
        response_cache,
    ));
    let state = Arc::new(AppState::new(
        config.clone(),
        service,
        async_cache.clone(),
    ));
    let app = create_router(state);

    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(async_cache.clone()))
        .await
        .context("Server error")?;

    // One last snapshot after in-flight requests drained
    if let Some(cache) = &async_cache {
        if let Err(e) = cache.flush().await {
            warn!(error = %e, "Final cache flush failed");
        }
    }
    if let Some(task) = persist_task {
        task.abort();
    }

    info!("Shutdown complete");
    Ok(())
}

/// Wait for SIGINT or SIGTERM, then flush the async plugin cache before
/// letting the server drain in-flight requests.
async fn shutdown_signal(cache: Option<Arc<AsyncResultCache>>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
    if let Some(cache) = cache {
        if let Err(e) = cache.flush().await {
            warn!(error = %e, "Failed to flush async plugin cache");
        }
    }
}
