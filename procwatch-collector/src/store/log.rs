/**
 * JOURNAL DE SNAPSHOTS - Persistance append-only du collecteur
 *
 * RÔLE :
 * Chaque ingestion acceptée = une ligne JSON dans <data_dir>/snapshots.jsonl.
 * Au démarrage le journal est rejoué pour reconstruire hôtes, état courant et historique.
 *
 * FONCTIONNEMENT :
 * - Écriture AVANT mutation mémoire : un échec d'écriture n'altère rien
 * - Écriture partielle tronquée à la longueur précédente
 * - Lignes illisibles ignorées au rejeu (avertissement)
 * - Dernière ligne tronquée (crash) coupée à l'ouverture, '\n' final rétabli si absent
 */

use super::StoreError;
use crate::models::ProcessSample;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tracing::{info, warn};

pub const LOG_FILE_NAME: &str = "snapshots.jsonl";

/// Entrée relue depuis le journal
#[derive(Debug, Deserialize)]
pub struct LogEntry {
    pub hostname: String,
    #[serde(with = "time::serde::rfc3339")]
    pub snapshot_time: OffsetDateTime,
    pub processes: Vec<ProcessSample>,
}

#[derive(Serialize)]
struct LogEntryRef<'a> {
    hostname: &'a str,
    #[serde(with = "time::serde::rfc3339")]
    snapshot_time: OffsetDateTime,
    processes: &'a [ProcessSample],
}

pub struct SnapshotLog {
    path: PathBuf,
    file: Mutex<File>,
}

/// État de la fin du fichier après rejeu
#[derive(Debug, PartialEq)]
enum Tail {
    Clean,
    /// dernière ligne valide mais sans '\n'
    MissingNewline,
    /// dernière ligne tronquée, à couper à cette longueur
    Torn(u64),
}

impl SnapshotLog {
    /// Ouvre (ou crée) le journal et renvoie les entrées existantes.
    /// Une fin de fichier incomplète est réparée avant toute nouvelle écriture.
    pub fn open(data_dir: &Path) -> Result<(Self, Vec<LogEntry>), StoreError> {
        std::fs::create_dir_all(data_dir)?;
        let path = data_dir.join(LOG_FILE_NAME);

        let (entries, tail) = if path.exists() {
            Self::replay(&path)?
        } else {
            (Vec::new(), Tail::Clean)
        };

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        match tail {
            Tail::Clean => {}
            Tail::MissingNewline => file.write_all(b"\n")?,
            Tail::Torn(len) => {
                warn!(path = %path.display(), len, "truncating torn last log line");
                file.set_len(len)?;
            }
        }
        info!(path = %path.display(), entries = entries.len(), "snapshot log opened");

        Ok((
            Self {
                path,
                file: Mutex::new(file),
            },
            entries,
        ))
    }

    fn replay(path: &Path) -> Result<(Vec<LogEntry>, Tail), StoreError> {
        let content = std::fs::read(path)?;
        let mut entries = Vec::new();
        let mut tail = Tail::Clean;
        let mut offset = 0u64;

        for (index, raw) in content.split_inclusive(|b| *b == b'\n').enumerate() {
            let start = offset;
            offset += raw.len() as u64;

            let terminated = raw.ends_with(b"\n");
            let line = raw.strip_suffix(b"\n").unwrap_or(raw);
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            match serde_json::from_slice::<LogEntry>(line) {
                Ok(entry) => {
                    entries.push(entry);
                    if !terminated {
                        tail = Tail::MissingNewline;
                    }
                }
                Err(e) if !terminated => {
                    warn!(line = index + 1, error = %e, "torn last log line");
                    tail = Tail::Torn(start);
                }
                Err(e) => warn!(line = index + 1, error = %e, "skipping unreadable log line"),
            }
        }
        Ok((entries, tail))
    }

    pub fn append(
        &self,
        hostname: &str,
        snapshot_time: OffsetDateTime,
        processes: &[ProcessSample],
    ) -> Result<(), StoreError> {
        let mut line = serde_json::to_vec(&LogEntryRef {
            hostname,
            snapshot_time,
            processes,
        })?;
        line.push(b'\n');

        let mut file = self.file.lock();
        let previous_len = file.metadata()?.len();

        if let Err(e) = file.write_all(&line).and_then(|_| file.flush()) {
            // pas de ligne à moitié écrite dans le journal
            if let Err(truncate_err) = file.set_len(previous_len) {
                warn!(path = %self.path.display(), error = %truncate_err, "failed to roll back partial log write");
            }
            return Err(e.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn sample(pid: u32) -> ProcessSample {
        ProcessSample {
            pid,
            name: format!("p{pid}"),
            cpu_usage: 1.0,
            memory_usage: 0.5,
            parent_pid: None,
        }
    }

    #[test]
    fn test_append_then_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let (log, entries) = SnapshotLog::open(dir.path()).unwrap();
            assert!(entries.is_empty());
            log.append("h1", datetime!(2024-05-01 10:00 UTC), &[sample(1), sample(2)]).unwrap();
            log.append("h2", datetime!(2024-05-01 10:01 UTC), &[]).unwrap();
        }

        let (_, entries) = SnapshotLog::open(dir.path()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].hostname, "h1");
        assert_eq!(entries[0].processes.len(), 2);
        assert_eq!(entries[1].snapshot_time, datetime!(2024-05-01 10:01 UTC));
        assert!(entries[1].processes.is_empty());
    }

    #[test]
    fn test_unreadable_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LOG_FILE_NAME);
        std::fs::write(
            &path,
            "{\"hostname\":\"h1\",\"snapshot_time\":\"2024-05-01T10:00:00Z\",\"processes\":[]}\n{\"hostname\":\"h1\",\"snap",
        )
        .unwrap();

        let (_, entries) = SnapshotLog::open(dir.path()).unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_torn_tail_is_repaired_before_next_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LOG_FILE_NAME);
        let good = "{\"hostname\":\"h1\",\"snapshot_time\":\"2024-05-01T10:00:00Z\",\"processes\":[]}\n";
        std::fs::write(&path, format!("{good}{{\"hostname\":\"h1\",\"snap")).unwrap();

        {
            let (log, entries) = SnapshotLog::open(dir.path()).unwrap();
            assert_eq!(entries.len(), 1);
            assert_eq!(std::fs::read_to_string(&path).unwrap(), good);
            log.append("h2", datetime!(2024-05-01 10:05 UTC), &[sample(3)]).unwrap();
        }

        let (_, entries) = SnapshotLog::open(dir.path()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].hostname, "h2");
        assert_eq!(entries[1].processes, vec![sample(3)]);
    }

    #[test]
    fn test_missing_final_newline_is_restored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LOG_FILE_NAME);
        std::fs::write(
            &path,
            "{\"hostname\":\"h1\",\"snapshot_time\":\"2024-05-01T10:00:00Z\",\"processes\":[]}",
        )
        .unwrap();

        {
            let (log, entries) = SnapshotLog::open(dir.path()).unwrap();
            assert_eq!(entries.len(), 1);
            log.append("h2", datetime!(2024-05-01 10:05 UTC), &[]).unwrap();
        }

        let (_, entries) = SnapshotLog::open(dir.path()).unwrap();
        let hosts: Vec<&str> = entries.iter().map(|e| e.hostname.as_str()).collect();
        assert_eq!(hosts, vec!["h1", "h2"]);
    }
}
