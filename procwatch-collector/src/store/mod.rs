/**
 * STORE PROCESSUS - État courant + historique par hôte
 *
 * RÔLE :
 * Détient toutes les données persistées du collecteur pour la durée du process :
 * hôtes, lignes "courantes" (dernier snapshot) et historique append-only.
 *
 * FONCTIONNEMENT :
 * - hosts : RwLock<HashMap<hostname, Arc<Mutex<HostRecord>>>>
 * - une ingestion verrouille UNIQUEMENT le record de son hôte :
 *   upsert + replace_current + append_history dans la même section critique
 * - les lecteurs prennent le même verrou → jamais d'état vide ou mélangé
 * - créations d'hôtes sérialisées par un mutex dédié ; le verrou d'écriture
 *   de la map n'est pris que pour insérer un hôte déjà validé (journal écrit)
 * - journal optionnel (log.rs) écrit avant toute mutation mémoire
 */

mod log;

use log::SnapshotLog;

use crate::aggregate::history_buckets;
use crate::models::{HistoryBucket, HistorySample, Host, HostView, ProcessSample};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use tracing::debug;

/// Erreurs possibles du store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Tout ce que le store possède pour un hôte
#[derive(Debug)]
pub struct HostRecord {
    pub host: Host,
    pub current: Vec<ProcessSample>,
    pub history: Vec<HistorySample>,
    last_snapshot: Option<OffsetDateTime>,
}

impl HostRecord {
    fn new(hostname: &str, at: OffsetDateTime) -> Self {
        Self {
            host: Host {
                hostname: hostname.to_string(),
                last_updated: at,
            },
            current: Vec::new(),
            history: Vec::new(),
            last_snapshot: None,
        }
    }

    /// Instant strictement croissant par hôte : deux ingestions ne fusionnent jamais
    fn next_snapshot_time(&self, at: OffsetDateTime) -> OffsetDateTime {
        match self.last_snapshot {
            Some(prev) if at <= prev => prev + Duration::nanoseconds(1),
            _ => at,
        }
    }

    /// Supprime toutes les lignes courantes puis insère le nouveau lot
    pub fn replace_current(&mut self, processes: Vec<ProcessSample>) {
        self.current.clear();
        self.current.extend(processes);
    }

    /// Ajoute une ligne immuable par processus, toutes au même instant
    pub fn append_history(&mut self, processes: &[ProcessSample], snapshot_time: OffsetDateTime) {
        self.history.extend(processes.iter().map(|p| HistorySample {
            sample: p.clone(),
            snapshot_time,
        }));
    }

    fn apply(&mut self, processes: Vec<ProcessSample>, snapshot_time: OffsetDateTime) {
        self.host.last_updated = snapshot_time;
        self.last_snapshot = Some(snapshot_time);
        self.append_history(&processes, snapshot_time);
        self.replace_current(processes);
    }

    fn view(&self) -> HostView {
        HostView {
            hostname: self.host.hostname.clone(),
            last_updated: self.host.last_updated,
            processes: self.current.clone(),
        }
    }
}

/// Résultat d'une ingestion acceptée
#[derive(Debug, Clone, PartialEq)]
pub struct Receipt {
    pub snapshot_time: OffsetDateTime,
    pub processes: usize,
    pub created: bool,
}

type SharedRecord = Arc<Mutex<HostRecord>>;

pub struct ProcessStore {
    hosts: RwLock<HashMap<String, SharedRecord>>,
    creating: Mutex<()>,
    log: Option<SnapshotLog>,
}

impl ProcessStore {
    /// Store purement mémoire (rien ne survit au redémarrage)
    pub fn in_memory() -> Self {
        Self {
            hosts: RwLock::new(HashMap::new()),
            creating: Mutex::new(()),
            log: None,
        }
    }

    /// Store adossé au journal <data_dir>/snapshots.jsonl, rejoué à l'ouverture
    pub fn open(data_dir: &Path) -> Result<Self, StoreError> {
        let (log, entries) = SnapshotLog::open(data_dir)?;
        let mut hosts: HashMap<String, SharedRecord> = HashMap::new();

        for entry in entries {
            let record = hosts
                .entry(entry.hostname.clone())
                .or_insert_with(|| Arc::new(Mutex::new(HostRecord::new(&entry.hostname, entry.snapshot_time))));
            let mut record = record.lock();
            let at = record.next_snapshot_time(entry.snapshot_time);
            record.apply(entry.processes, at);
        }

        Ok(Self {
            hosts: RwLock::new(hosts),
            creating: Mutex::new(()),
            log: Some(log),
        })
    }

    /// Upsert de l'hôte + remplacement de l'état courant + ajout à l'historique,
    /// atomique vis-à-vis des lecteurs et des autres ingestions du même hôte.
    pub fn ingest(
        &self,
        hostname: &str,
        processes: Vec<ProcessSample>,
        at: OffsetDateTime,
    ) -> Result<Receipt, StoreError> {
        if let Some(record) = self.record(hostname) {
            let mut record = record.lock();
            return self.commit(&mut record, processes, at, false);
        }

        // créations d'hôtes sérialisées entre elles, sans bloquer les autres hôtes
        let _creating = self.creating.lock();
        if let Some(record) = self.record(hostname) {
            // créé entre-temps par une ingestion concurrente
            let mut record = record.lock();
            return self.commit(&mut record, processes, at, false);
        }

        // l'hôte n'est visible qu'une fois le premier snapshot validé ;
        // la map n'est verrouillée en écriture que pour l'insertion
        let mut record = HostRecord::new(hostname, at);
        let receipt = self.commit(&mut record, processes, at, true)?;
        self.hosts
            .write()
            .insert(hostname.to_string(), Arc::new(Mutex::new(record)));
        Ok(receipt)
    }

    fn commit(
        &self,
        record: &mut HostRecord,
        processes: Vec<ProcessSample>,
        at: OffsetDateTime,
        created: bool,
    ) -> Result<Receipt, StoreError> {
        let snapshot_time = record.next_snapshot_time(at);
        if let Some(log) = &self.log {
            log.append(&record.host.hostname, snapshot_time, &processes)?;
        }

        let count = processes.len();
        record.apply(processes, snapshot_time);
        debug!(hostname = %record.host.hostname, processes = count, created, "snapshot committed");

        Ok(Receipt {
            snapshot_time,
            processes: count,
            created,
        })
    }

    fn records(&self) -> Vec<SharedRecord> {
        self.hosts.read().values().cloned().collect()
    }

    fn record(&self, hostname: &str) -> Option<SharedRecord> {
        self.hosts.read().get(hostname).cloned()
    }

    /// Dernier snapshot de chaque hôte, trié par hostname
    pub fn latest(&self) -> Vec<HostView> {
        let mut views: Vec<HostView> = self.records().iter().map(|r| r.lock().view()).collect();
        views.sort_by(|a, b| a.hostname.cmp(&b.hostname));
        views
    }

    pub fn host(&self, hostname: &str) -> Option<HostView> {
        self.record(hostname).map(|r| r.lock().view())
    }

    /// Agrégats d'historique, plus récents d'abord (vide si hôte inconnu)
    pub fn history_for(&self, hostname: &str, limit: usize) -> Vec<HistoryBucket> {
        match self.record(hostname) {
            Some(record) => history_buckets(&record.lock().history, limit),
            None => Vec::new(),
        }
    }

    #[cfg(test)]
    pub fn history_len(&self, hostname: &str) -> usize {
        self.record(hostname).map(|r| r.lock().history.len()).unwrap_or(0)
    }

    pub fn host_count(&self) -> usize {
        self.hosts.read().len()
    }
}
