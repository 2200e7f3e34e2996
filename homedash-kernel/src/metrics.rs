/**
 * METRIC MAPPER - Payload télémétrie (format telegraf) -> Metric Record canonique
 *
 * RÔLE :
 * Transforme les mesures brutes { name, tags, fields } envoyées par un agent
 * (telegraf ou homedash-agent) en un enregistrement cpu / mémoire / disques par noeud.
 *
 * RÈGLES :
 * - cpu + tags.cpu == "cpu-total" -> cpu.usage = 100 - usage_idle
 * - cpu + tags.cpu == "cpuN"      -> cpu.cores[N+1].usage = 100 - usage_idle
 * - mem  -> mémoire remplacée en bloc (la dernière mesure gagne)
 * - disk -> un disque ajouté par mesure, ordre d'entrée, sans dédoublonnage
 * - autre nom -> ignoré
 */

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricPayload {
    #[serde(default)]
    pub metrics: Vec<Measurement>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Measurement {
    pub name: String,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    #[serde(default)]
    pub fields: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub cpu: CpuMetrics,
    pub memory: MemoryMetrics,
    pub disks: Vec<DiskMetrics>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuMetrics {
    pub usage: f64,
    /// index de coeur (1-based) -> usage
    pub cores: BTreeMap<u32, CoreMetrics>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoreMetrics {
    pub usage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryMetrics {
    pub total: f64,
    pub used: f64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskMetrics {
    pub device: String,
    pub path: String,
    pub total: f64,
    pub used: f64,
    pub percentage: f64,
}

impl Measurement {
    fn field(&self, name: &str) -> Option<f64> {
        self.fields.get(name).and_then(Value::as_f64)
    }

    fn number(&self, name: &str) -> f64 {
        self.field(name).unwrap_or(0.0)
    }

    fn tag(&self, name: &str) -> String {
        self.tags.get(name).cloned().unwrap_or_default()
    }
}

/// Applique les règles de mapping ; ne peut pas échouer.
pub fn map_metrics(payload: &MetricPayload) -> MetricRecord {
    let mut record = MetricRecord::default();

    for m in &payload.metrics {
        match m.name.as_str() {
            "cpu" => {
                let Some(idle) = m.field("usage_idle") else { continue };
                let usage = 100.0 - idle;
                match m.tags.get("cpu").map(String::as_str) {
                    Some("cpu-total") => record.cpu.usage = usage,
                    Some(tag) => {
                        if let Some(index) = core_index(tag) {
                            record.cpu.cores.insert(index, CoreMetrics { usage });
                        }
                    }
                    None => {}
                }
            }
            "mem" => {
                record.memory = MemoryMetrics {
                    total: m.number("total"),
                    used: m.number("used"),
                    percentage: m.number("used_percent"),
                };
            }
            "disk" => record.disks.push(DiskMetrics {
                device: m.tag("device"),
                path: m.tag("path"),
                total: m.number("total"),
                used: m.number("used"),
                percentage: m.number("used_percent"),
            }),
            _ => {}
        }
    }

    record
}

/// "cpu3" -> 4
fn core_index(tag: &str) -> Option<u32> {
    tag.strip_prefix("cpu")?.parse::<u32>().ok().map(|n| n + 1)
}
