//! Catalog Query - storefront cache client with a devtools inspector
//!
//! Mounts the home page queries, keeps them warm and serves the cache
//! inspector over HTTP.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use catalog_query::devtools::{create_router, AppState};
use catalog_query::hooks::{use_all_products, use_categories};
use catalog_query::{spawn_gc_task, CatalogContext, Config};

/// Main entry point.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Create the query client and API services
/// 4. Mount the home page queries
/// 5. Start background GC sweep task
/// 6. Serve the devtools inspector until SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "catalog_query=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting catalog query client");

    let config = Config::from_env().context("invalid configuration")?;
    info!(
        "Configuration loaded: api={}, admin={}, stale_time={:?}, gc_time={:?}, port={}, cleanup_interval={}s",
        config.api_base_url,
        config.admin_base_url,
        config.query_defaults.stale_time,
        config.query_defaults.gc_time,
        config.devtools_port,
        config.cleanup_interval
    );

    let ctx = CatalogContext::from_config(&config);

    // Held for the lifetime of the process so the entries stay observed.
    let products = use_all_products(&ctx);
    let categories = use_categories(&ctx);
    info!(
        "Mounted home page queries: {:?}, {:?}",
        products.key(),
        categories.key()
    );

    let gc_handle = spawn_gc_task(ctx.queries.clone(), config.cleanup_interval);
    info!("Background GC sweep started");

    let app = create_router(AppState::new(ctx.queries.clone()));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.devtools_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Devtools listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(gc_handle))
        .await
        .context("devtools server failed")?;

    drop(products);
    drop(categories);
    info!("Shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
///
/// On shutdown signal, aborts the GC sweep and allows graceful shutdown.
async fn shutdown_signal(gc_handle: tokio::task::JoinHandle<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    gc_handle.abort();
    warn!("GC sweep aborted");
}
