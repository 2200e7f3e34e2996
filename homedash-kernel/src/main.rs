/**
 * HOMEDASH KERNEL - Point d'entrée du serveur de dashboards
 *
 * RÔLE : Orchestration des modules : config, stores, registre des widgets,
 * pipeline d'instanciation, tâches de rafraîchissement, API HTTP.
 *
 * DÉMARRAGE :
 * 1. .env + logging (RUST_LOG, défaut homedash_kernel=info)
 * 2. préparation du STORAGE_DIR puis chargement du config.yaml
 * 3. stores data.json / metric.json, client HTTP partagé
 * 4. pipeline : chaque entrée de dashboard devient une instance vivante
 * 5. serveur axum ; Ctrl-C arrête le serveur et toutes les tâches
 */

mod config;
mod format;
mod http;
mod metrics;
mod pipeline;
mod registry;
mod scheduler;
mod state;
mod store;
mod view;
mod widgets;

use crate::config::{listen_addr, load_config, StoragePaths};
use crate::http::AppState;
use crate::registry::ViewRegistry;
use crate::state::Runtime;
use crate::store::Store;
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Ok si .env n'existe pas
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("homedash_kernel=info")),
        )
        .init();

    let paths = StoragePaths::from_env();
    paths.prepare().context("preparing storage directory")?;
    let config = Arc::new(load_config(&paths.config).context("loading configuration")?);

    let data = Arc::new(Store::open(&paths.data).context("opening widget state store")?);
    let metrics = Arc::new(Store::open(&paths.metrics).context("opening metric store")?);
    info!(
        data_keys = data.len(),
        metric_nodes = metrics.len(),
        data = %data.path().display(),
        "stores opened"
    );

    let http_client = reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .user_agent(concat!("homedash/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("building HTTP client")?;

    let widgets = widgets::default_registry(http_client, metrics.clone());
    info!(kinds = ?widgets.kinds(), "widget types registered");
    let views = ViewRegistry::shared();
    let runtime = Runtime::new(views.clone(), data);
    pipeline::instantiate(&config.dashboards, &widgets, &runtime);

    let app = http::build_router(AppState {
        config,
        views,
        metrics,
        icons_dir: paths.icons.clone(),
    });

    let addr = listen_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "homedash kernel listening");

    let shutdown = runtime.shutdown_token();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("shutdown requested"),
                _ = shutdown.cancelled() => {}
            }
        })
        .await
        .context("HTTP server")?;

    runtime.shutdown();
    info!("refresh tasks stopped, bye");
    Ok(())
}
