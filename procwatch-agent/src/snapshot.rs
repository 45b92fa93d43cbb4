//! Snapshot payload sent to the collector
//!
//! Wire shape (one document per cycle):
//! `{ "hostname": "...", "processes": [{ "pid", "name", "cpu_usage", "memory_usage", "parent_pid" }] }`

use serde::Serialize;

/// One observed process at sampling time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessSample {
    pub pid: u32,
    pub name: String,
    /// Percent of one core since the previous pass, may exceed 100 on multi-core hosts
    pub cpu_usage: f64,
    /// Resident memory as a percent of total host memory
    pub memory_usage: f64,
    pub parent_pid: Option<u32>,
}

/// Complete submission for one sampling cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub hostname: String,
    pub processes: Vec<ProcessSample>,
}

impl Snapshot {
    pub fn new(hostname: impl Into<String>, processes: Vec<ProcessSample>) -> Self {
        Self {
            hostname: hostname.into(),
            processes,
        }
    }
}

/// Hostname as reported by the OS
pub fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_wire_format() {
        let snapshot = Snapshot::new(
            "web-01",
            vec![
                ProcessSample {
                    pid: 1,
                    name: "init".to_string(),
                    cpu_usage: 0.5,
                    memory_usage: 0.1,
                    parent_pid: None,
                },
                ProcessSample {
                    pid: 42,
                    name: "nginx".to_string(),
                    cpu_usage: 130.0,
                    memory_usage: 2.25,
                    parent_pid: Some(1),
                },
            ],
        );

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["hostname"], "web-01");
        assert_eq!(json["processes"][0]["parent_pid"], serde_json::Value::Null);
        assert_eq!(json["processes"][1]["parent_pid"], 1);
        assert_eq!(json["processes"][1]["cpu_usage"], 130.0);
        assert_eq!(json["processes"][1]["name"], "nginx");
    }

    #[test]
    fn test_empty_snapshot_keeps_process_array() {
        let json = serde_json::to_value(Snapshot::new("idle", Vec::new())).unwrap();
        assert_eq!(json["processes"], serde_json::json!([]));
    }

    #[test]
    fn test_local_hostname_not_empty() {
        assert!(!local_hostname().is_empty());
    }
}
