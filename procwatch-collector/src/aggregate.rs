//! Agrégation de l'historique par instant de snapshot.
//!
//! Le regroupement se fait uniquement sur `snapshot_time` : un pid réutilisé
//! par un autre processus n'est jamais fusionné entre deux snapshots.

use crate::models::{HistoryBucket, HistorySample};
use std::collections::BTreeMap;
use time::OffsetDateTime;

pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Somme CPU / mémoire et nombre de lignes par snapshot, plus récents d'abord,
/// au plus `limit` groupes.
pub fn history_buckets(rows: &[HistorySample], limit: usize) -> Vec<HistoryBucket> {
    let mut groups: BTreeMap<OffsetDateTime, HistoryBucket> = BTreeMap::new();

    for row in rows {
        let bucket = groups.entry(row.snapshot_time).or_insert_with(|| HistoryBucket {
            snapshot_time: row.snapshot_time,
            total_cpu: 0.0,
            total_mem: 0.0,
            processes: 0,
        });
        bucket.total_cpu += row.sample.cpu_usage;
        bucket.total_mem += row.sample.memory_usage;
        bucket.processes += 1;
    }

    groups.into_values().rev().take(limit).collect()
}
