use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Un processus observé, tel que reçu de l'agent
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ProcessSample {
    pub pid: u32,
    pub name: String,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    #[serde(default)]
    pub parent_pid: Option<u32>,
}

/// Corps de POST /api/processes (processes absent ou null = liste vide)
#[derive(Debug, Deserialize)]
pub struct SnapshotIn {
    pub hostname: Option<String>,
    #[serde(default)]
    pub processes: Option<Vec<ProcessSample>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Host {
    pub hostname: String,
    #[serde(with = "time::serde::rfc3339")]
    pub last_updated: OffsetDateTime,
}

/// Ligne d'historique : immuable une fois écrite
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct HistorySample {
    #[serde(flatten)]
    pub sample: ProcessSample,
    #[serde(with = "time::serde::rfc3339")]
    pub snapshot_time: OffsetDateTime,
}

/// Vue "dernier snapshot" d'un hôte
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct HostView {
    pub hostname: String,
    #[serde(with = "time::serde::rfc3339")]
    pub last_updated: OffsetDateTime,
    pub processes: Vec<ProcessSample>,
}

/// Agrégat d'un instant de snapshot
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct HistoryBucket {
    #[serde(with = "time::serde::rfc3339")]
    pub snapshot_time: OffsetDateTime,
    pub total_cpu: f64,
    pub total_mem: f64,
    pub processes: usize,
}
