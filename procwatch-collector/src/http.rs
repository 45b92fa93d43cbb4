/**
 * API REST PROCWATCH - Serveur HTTP du collecteur
 *
 * RÔLE :
 * Reçoit les snapshots des agents et expose l'état courant + l'historique agrégé.
 *
 * ROUTES :
 * - GET  /health                              → "ok"
 * - POST /api/processes[/]                    → ingestion (header API-Key obligatoire)
 * - GET  /api/processes/latest[/]             → dernier snapshot de chaque hôte
 * - GET  /api/hosts/{hostname}                → dernier snapshot d'un hôte (404 si inconnu)
 * - GET  /api/hosts/{hostname}/history?limit= → agrégats par snapshot, plus récents d'abord
 *
 * SÉCURITÉ :
 * - Seule l'ingestion exige la clé, vérifiée par l'IngestionGate avant toute lecture du corps
 * - Les routes de lecture restent ouvertes (dashboard)
 */

use crate::ingest::{IngestAck, IngestError, IngestionGate, API_KEY_HEADER};
use crate::models::{HistoryBucket, HostView};
use crate::store::ProcessStore;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;

/// Plafond du paramètre ?limit=
pub const MAX_HISTORY_LIMIT: usize = 1000;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ProcessStore>,
    pub gate: Arc<IngestionGate>,
    pub history_limit: usize,
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    limit: Option<usize>,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/processes", post(receive_snapshot))
        .route("/api/processes/", post(receive_snapshot))
        .route("/api/processes/latest", get(get_latest))
        .route("/api/processes/latest/", get(get_latest))
        .route("/api/hosts/{hostname}", get(get_host))
        .route("/api/hosts/{hostname}/history", get(get_history))
        .with_state(app_state)
}

// POST /api/processes
async fn receive_snapshot(
    State(app): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<IngestAck>, IngestError> {
    let credential = headers.get(API_KEY_HEADER).map(|v| v.as_bytes().to_vec());
    let gate = app.gate.clone();
    // le journal écrit sur disque : hors des workers async
    let ack = tokio::task::spawn_blocking(move || gate.ingest(credential.as_deref(), &body)).await??;
    Ok(Json(ack))
}

// GET /api/processes/latest
async fn get_latest(State(app): State<AppState>) -> Json<Vec<HostView>> {
    Json(app.store.latest())
}

// GET /api/hosts/{hostname}
async fn get_host(
    State(app): State<AppState>,
    Path(hostname): Path<String>,
) -> Result<Json<HostView>, StatusCode> {
    app.store.host(&hostname).map(Json).ok_or(StatusCode::NOT_FOUND)
}

// GET /api/hosts/{hostname}/history?limit=N
async fn get_history(
    State(app): State<AppState>,
    Path(hostname): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Json<Vec<HistoryBucket>> {
    let limit = params.limit.unwrap_or(app.history_limit).min(MAX_HISTORY_LIMIT);
    Json(app.store.history_for(&hostname, limit))
}
