//! Host metric sampling for the homedash kernel
//!
//! Produces the telegraf-style payload the kernel ingests:
//! - `cpu` with `cpu=cpu-total` and one `cpu=cpuN` per core (`usage_idle`)
//! - `mem` (`total`, `used`, `used_percent`)
//! - one `disk` per mounted filesystem (`device`, `path` tags)

use serde::Serialize;
use std::collections::BTreeMap;
use sysinfo::{Disks, System};
use tracing::debug;

/// Body of `POST /api/telegraf/ingest`
#[derive(Debug, Serialize)]
pub struct Payload {
    pub metrics: Vec<Measurement>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct Measurement {
    pub name: &'static str,
    pub tags: BTreeMap<&'static str, String>,
    pub fields: BTreeMap<&'static str, f64>,
}

/// Raw readings, kept separate from sysinfo so the payload shape is testable
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub cpu_usage: f32,
    pub core_usage: Vec<f32>,
    pub memory_total: u64,
    pub memory_used: u64,
    pub disks: Vec<DiskSample>,
}

#[derive(Debug, Clone)]
pub struct DiskSample {
    pub device: String,
    pub path: String,
    pub total: u64,
    pub available: u64,
}

fn percent(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        part / whole * 100.0
    } else {
        0.0
    }
}

impl Snapshot {
    /// Sample the local host; CPU usage needs two refreshes spaced by the minimum interval
    pub async fn collect() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu();
        tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;
        sys.refresh_cpu();
        sys.refresh_memory();

        let disks = Disks::new_with_refreshed_list()
            .iter()
            .map(|d| DiskSample {
                device: d.name().to_string_lossy().into_owned(),
                path: d.mount_point().to_string_lossy().into_owned(),
                total: d.total_space(),
                available: d.available_space(),
            })
            .collect::<Vec<_>>();

        let snapshot = Self {
            cpu_usage: sys.global_cpu_info().cpu_usage(),
            core_usage: sys.cpus().iter().map(|c| c.cpu_usage()).collect(),
            memory_total: sys.total_memory(),
            memory_used: sys.used_memory(),
            disks,
        };
        debug!(cores = snapshot.core_usage.len(), disks = snapshot.disks.len(), "host sampled");
        snapshot
    }

    pub fn to_payload(&self) -> Payload {
        let cpu = |tag: String, usage: f32| Measurement {
            name: "cpu",
            tags: BTreeMap::from([("cpu", tag)]),
            fields: BTreeMap::from([("usage_idle", 100.0 - f64::from(usage))]),
        };

        let mut metrics = vec![cpu("cpu-total".to_string(), self.cpu_usage)];
        metrics.extend(
            self.core_usage
                .iter()
                .enumerate()
                .map(|(i, usage)| cpu(format!("cpu{i}"), *usage)),
        );

        let (total, used) = (self.memory_total as f64, self.memory_used as f64);
        metrics.push(Measurement {
            name: "mem",
            tags: BTreeMap::new(),
            fields: BTreeMap::from([("total", total), ("used", used), ("used_percent", percent(used, total))]),
        });

        metrics.extend(self.disks.iter().map(|d| {
            let total = d.total as f64;
            let used = d.total.saturating_sub(d.available) as f64;
            Measurement {
                name: "disk",
                tags: BTreeMap::from([("device", d.device.clone()), ("path", d.path.clone())]),
                fields: BTreeMap::from([("total", total), ("used", used), ("used_percent", percent(used, total))]),
            }
        }));

        Payload { metrics }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot() -> Snapshot {
        Snapshot {
            cpu_usage: 25.0,
            core_usage: vec![10.0, 40.0],
            memory_total: 1000,
            memory_used: 250,
            disks: vec![DiskSample {
                device: "sda1".into(),
                path: "/".into(),
                total: 200,
                available: 50,
            }],
        }
    }

    #[test]
    fn test_payload_shape() {
        let value = serde_json::to_value(snapshot().to_payload()).unwrap();
        let metrics = value["metrics"].as_array().unwrap();
        assert_eq!(metrics.len(), 5);
        assert_eq!(metrics[0], json!({"name": "cpu", "tags": {"cpu": "cpu-total"}, "fields": {"usage_idle": 75.0}}));
        assert_eq!(metrics[2]["tags"]["cpu"], "cpu1");
        assert_eq!(metrics[2]["fields"]["usage_idle"], 60.0);
        assert_eq!(metrics[3]["fields"], json!({"total": 1000.0, "used": 250.0, "used_percent": 25.0}));
        assert_eq!(
            metrics[4],
            json!({
                "name": "disk",
                "tags": {"device": "sda1", "path": "/"},
                "fields": {"total": 200.0, "used": 150.0, "used_percent": 75.0}
            })
        );
    }

    #[test]
    fn test_empty_totals_do_not_divide_by_zero() {
        let payload = Snapshot::default().to_payload();
        let mem = payload.metrics.iter().find(|m| m.name == "mem").unwrap();
        assert_eq!(mem.fields["used_percent"], 0.0);
    }
}
