/**
 * PROCWATCH COLLECTOR - Point d'entrée du serveur central
 *
 * RÔLE : Bootstrap config → store → porte d'ingestion → routeur HTTP.
 * Échoue immédiatement si la configuration est incomplète (clé d'API absente).
 *
 * ARCHITECTURE : API REST axum + store mémoire verrouillé par hôte + journal append-only optionnel.
 */

mod aggregate;
mod config;
mod http;
mod ingest;
mod models;
mod store;

use crate::config::load_config;
use crate::http::AppState;
use crate::ingest::IngestionGate;
use crate::store::ProcessStore;

use anyhow::Context;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("procwatch_collector=info")),
        )
        .init();

    let cfg = load_config().await.context("configuration collecteur invalide")?;

    // store : journal sur disque si data_dir, sinon mémoire seule
    let store = match &cfg.data_dir {
        Some(dir) => ProcessStore::open(dir)
            .with_context(|| format!("ouverture du store dans {}", dir.display()))?,
        None => ProcessStore::in_memory(),
    };
    let store = Arc::new(store);
    info!(hosts = store.host_count(), "store ready");

    let gate = Arc::new(IngestionGate::new(cfg.api_key.clone(), store.clone()));

    let app_state = AppState {
        store,
        gate,
        history_limit: cfg.history_limit,
    };
    let app = http::build_router(app_state);

    let listener = TcpListener::bind(cfg.bind)
        .await
        .with_context(|| format!("bind {}", cfg.bind))?;
    info!(addr = %cfg.bind, "procwatch collector listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serveur HTTP arrêté sur erreur")?;

    info!("collector stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
