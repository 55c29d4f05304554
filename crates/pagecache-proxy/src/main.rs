//! pagecache - keeps a web front-end usable offline.
//!
//! Runs a local HTTP proxy in front of one upstream origin. Every request is
//! sent to the network first; successful responses refresh an on-disk cache,
//! and the cached copy is served whenever the network produces nothing.

mod server;

use std::io;
use std::sync::Arc;

use anyhow::{Context, Result};
use pagecache_core::{
    CacheStorage, Config, DiskCacheStorage, HttpNetwork, Interceptor, MemoryCacheStorage, Worker,
};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// File name prefix for daily log files
const LOG_FILE_PREFIX: &str = "pagecache.log";

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr unless `log_dir` is configured. The returned guard
/// must stay alive for file logs to be flushed.
fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match config.log_dir {
        Some(ref dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .with(filter)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(io::stderr))
                .with(filter)
                .init();
            None
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let config = Config::load().context("Failed to load configuration")?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let flag = |name: &str| args.iter().any(|arg| arg == name);

    if flag("--print-config") {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }
    if flag("--save-config") {
        config.save().context("Failed to save configuration")?;
        eprintln!("Configuration saved");
        return Ok(());
    }

    let _log_guard = init_tracing(&config);

    let storage: Arc<dyn CacheStorage> = if flag("--ephemeral") {
        info!("Using in-memory cache; nothing will persist");
        Arc::new(MemoryCacheStorage::new())
    } else {
        let cache_dir = config.cache_dir()?;
        info!(?cache_dir, "Cache directory configured");
        Arc::new(DiskCacheStorage::new(cache_dir))
    };

    if flag("--clear-cache") {
        let removed = storage
            .delete(&config.cache_name)
            .await
            .with_context(|| format!("Failed to clear cache {}", config.cache_name))?;
        if removed {
            eprintln!("Cleared cache {}", config.cache_name);
        } else {
            eprintln!("Cache {} was already empty", config.cache_name);
        }
        return Ok(());
    }

    let upstream = config.upstream_url()?;
    let network = HttpNetwork::new(config.request_timeout())
        .context("Failed to build HTTP client")?;
    let interceptor = Interceptor::new(storage, Arc::new(network), config.cache_name.clone())
        .with_lookup_failure(config.lookup_failure);
    let worker = Worker::install(Arc::new(interceptor));

    let router = server::build_router(worker.clone(), &upstream);
    let listener = tokio::net::TcpListener::bind(&config.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen))?;
    info!(listen = %config.listen, upstream = %upstream, "pagecache proxy listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Proxy server failed")?;

    worker.shutdown().await;
    info!("pagecache shutting down");
    Ok(())
}
