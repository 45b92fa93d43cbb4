/**
 * INGESTION - Porte d'entrée des snapshots agents
 *
 * RÔLE :
 * Authentifie, valide et enregistre un snapshot reçu sur POST /api/processes.
 *
 * FONCTIONNEMENT :
 * (a) header API-Key comparé octet par octet à la clé configurée → 401 sinon
 * (b) hostname obligatoire, sans espaces autour ; processes absent/null = liste vide
 * (c) une entrée process invalide rejette TOUT le lot (400), rien n'est écrit
 * (d) upsert hôte + état courant + historique en une seule opération store
 */

use crate::models::{ProcessSample, SnapshotIn};
use crate::store::{ProcessStore, StoreError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{error, info, warn};

pub const API_KEY_HEADER: &str = "API-Key";

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Malformed payload: {0}")]
    Malformed(String),
    #[error("Storage failure: {0}")]
    Store(#[from] StoreError),
    #[error("Ingestion task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let code = match &self {
            IngestError::Unauthorized => StatusCode::UNAUTHORIZED,
            IngestError::Malformed(_) => StatusCode::BAD_REQUEST,
            IngestError::Store(_) | IngestError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (code, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// Accusé de réception minimal
#[derive(Debug, Serialize, PartialEq)]
pub struct IngestAck {
    pub status: &'static str,
    pub processes: usize,
}

pub struct IngestionGate {
    api_key: String,
    store: Arc<ProcessStore>,
}

impl IngestionGate {
    pub fn new(api_key: impl Into<String>, store: Arc<ProcessStore>) -> Self {
        Self {
            api_key: api_key.into(),
            store,
        }
    }

    pub fn ingest(&self, credential: Option<&[u8]>, body: &[u8]) -> Result<IngestAck, IngestError> {
        self.ingest_at(credential, body, OffsetDateTime::now_utc())
    }

    pub fn ingest_at(
        &self,
        credential: Option<&[u8]>,
        body: &[u8],
        at: OffsetDateTime,
    ) -> Result<IngestAck, IngestError> {
        if !self.is_authorized(credential) {
            warn!("rejected snapshot: bad or missing API key");
            return Err(IngestError::Unauthorized);
        }

        let (hostname, processes) = parse_snapshot(body)?;
        let receipt = self.store.ingest(&hostname, processes, at).map_err(|e| {
            error!(%hostname, error = %e, "failed to store snapshot");
            e
        })?;

        info!(
            %hostname,
            processes = receipt.processes,
            new_host = receipt.created,
            snapshot_time = %receipt.snapshot_time,
            "snapshot accepted"
        );
        Ok(IngestAck {
            status: "success",
            processes: receipt.processes,
        })
    }

    fn is_authorized(&self, credential: Option<&[u8]>) -> bool {
        // clé vide = aucune requête acceptée
        !self.api_key.is_empty() && credential == Some(self.api_key.as_bytes())
    }
}

fn parse_snapshot(body: &[u8]) -> Result<(String, Vec<ProcessSample>), IngestError> {
    let snapshot: SnapshotIn =
        serde_json::from_slice(body).map_err(|e| IngestError::Malformed(e.to_string()))?;

    let hostname = snapshot
        .hostname
        .filter(|h| !h.trim().is_empty())
        .ok_or_else(|| IngestError::Malformed("missing hostname".into()))?;
    if hostname.trim() != hostname {
        // l'identité de l'hôte est gardée telle quelle, jamais réécrite
        return Err(IngestError::Malformed(format!("hostname {hostname:?}: surrounding whitespace")));
    }

    let processes = snapshot.processes.unwrap_or_default();
    for p in &processes {
        if p.name.trim().is_empty() {
            return Err(IngestError::Malformed(format!("process {}: empty name", p.pid)));
        }
        if !(p.cpu_usage.is_finite() && p.cpu_usage >= 0.0) {
            return Err(IngestError::Malformed(format!("process {}: invalid cpu_usage", p.pid)));
        }
        if !(p.memory_usage.is_finite() && p.memory_usage >= 0.0) {
            return Err(IngestError::Malformed(format!("process {}: invalid memory_usage", p.pid)));
        }
    }

    Ok((hostname, processes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const KEY: &[u8] = b"s3cret";

    fn gate() -> (IngestionGate, Arc<ProcessStore>) {
        let store = Arc::new(ProcessStore::in_memory());
        (IngestionGate::new("s3cret", store.clone()), store)
    }

    #[test]
    fn test_accepts_valid_snapshot() {
        let (gate, store) = gate();
        let body = br#"{"hostname":"web-01","processes":[
            {"pid":1,"name":"init","cpu_usage":0.5,"memory_usage":0.1,"parent_pid":null},
            {"pid":42,"name":"nginx","cpu_usage":130.0,"memory_usage":2.5,"parent_pid":1}]}"#;

        let ack = gate.ingest(Some(KEY), body).unwrap();

        assert_eq!(ack, IngestAck { status: "success", processes: 2 });
        let view = store.host("web-01").unwrap();
        assert_eq!(view.processes[1].parent_pid, Some(1));
        assert_eq!(store.history_len("web-01"), 2);
    }

    #[test]
    fn test_wrong_or_missing_key_has_no_side_effects() {
        let (gate, store) = gate();
        let t0 = datetime!(2024-01-01 00:00 UTC);
        gate.ingest_at(Some(KEY), br#"{"hostname":"h","processes":[]}"#, t0).unwrap();

        let body = br#"{"hostname":"h","processes":[{"pid":1,"name":"x","cpu_usage":1,"memory_usage":1}]}"#;
        let later = datetime!(2024-01-01 01:00 UTC);
        assert!(matches!(gate.ingest_at(Some(b"nope".as_slice()), body, later), Err(IngestError::Unauthorized)));
        assert!(matches!(gate.ingest_at(None, body, later), Err(IngestError::Unauthorized)));
        assert!(matches!(
            gate.ingest_at(None, br#"{"hostname":"other"}"#, later),
            Err(IngestError::Unauthorized)
        ));

        assert_eq!(store.host("h").unwrap().last_updated, t0);
        assert_eq!(store.history_len("h"), 0);
        assert!(store.host("other").is_none());
    }

    #[test]
    fn test_credential_is_compared_exactly() {
        let (gate, _) = gate();
        let body = br#"{"hostname":"h"}"#;
        assert!(gate.ingest(Some(b"S3CRET".as_slice()), body).is_err());
        assert!(gate.ingest(Some(b"s3cret ".as_slice()), body).is_err());
        assert!(gate.ingest(Some(b"s3cret".as_slice()), body).is_ok());
    }

    #[test]
    fn test_missing_processes_is_empty_list() {
        let (gate, store) = gate();
        let ack = gate.ingest(Some(KEY), br#"{"hostname":"idle"}"#).unwrap();
        assert_eq!(ack.processes, 0);

        gate.ingest(Some(KEY), br#"{"hostname":"idle","processes":null}"#).unwrap();
        assert!(store.host("idle").unwrap().processes.is_empty());
    }

    #[test]
    fn test_malformed_entry_rejects_whole_batch() {
        let (gate, store) = gate();
        gate.ingest(
            Some(KEY),
            br#"{"hostname":"h","processes":[{"pid":1,"name":"keep","cpu_usage":1,"memory_usage":1}]}"#,
        )
        .unwrap();

        let missing_cpu = br#"{"hostname":"h","processes":[
            {"pid":2,"name":"ok","cpu_usage":1,"memory_usage":1},
            {"pid":3,"name":"bad","memory_usage":1}]}"#;
        assert!(matches!(gate.ingest(Some(KEY), missing_cpu), Err(IngestError::Malformed(_))));

        let negative = br#"{"hostname":"h","processes":[{"pid":2,"name":"neg","cpu_usage":-1,"memory_usage":1}]}"#;
        assert!(matches!(gate.ingest(Some(KEY), negative), Err(IngestError::Malformed(_))));

        let view = store.host("h").unwrap();
        assert_eq!(view.processes.len(), 1);
        assert_eq!(view.processes[0].name, "keep");
        assert_eq!(store.history_len("h"), 1);
    }

    #[test]
    fn test_missing_hostname_is_malformed() {
        let (gate, store) = gate();
        assert!(matches!(
            gate.ingest(Some(KEY), br#"{"processes":[]}"#),
            Err(IngestError::Malformed(_))
        ));
        assert!(matches!(
            gate.ingest(Some(KEY), br#"{"hostname":"  "}"#),
            Err(IngestError::Malformed(_))
        ));
        assert!(matches!(gate.ingest(Some(KEY), b"not json"), Err(IngestError::Malformed(_))));
        assert_eq!(store.host_count(), 0);
    }

    #[test]
    fn test_hostname_is_never_rewritten() {
        let (gate, store) = gate();
        gate.ingest(Some(KEY), br#"{"hostname":"web-01"}"#).unwrap();

        for padded in [r#"{"hostname":" web-01"}"#, r#"{"hostname":"web-01\t"}"#] {
            assert!(matches!(
                gate.ingest(Some(KEY), padded.as_bytes()),
                Err(IngestError::Malformed(_))
            ));
        }
        assert_eq!(store.host_count(), 1);
        assert_eq!(store.history_for("web-01", 20).len(), 1);
    }

    #[test]
    fn test_empty_configured_key_rejects_everything() {
        let gate = IngestionGate::new("", Arc::new(ProcessStore::in_memory()));
        assert!(matches!(gate.ingest(Some(b"".as_slice()), br#"{"hostname":"h"}"#), Err(IngestError::Unauthorized)));
    }
}
