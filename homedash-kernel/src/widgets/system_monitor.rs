/**
 * SYSTEM MONITOR WIDGET - Métriques d'un nœud + joignabilité (ping)
 *
 * FONCTIONNEMENT :
 * - lit le `MetricRecord` du nœud dans le store des métriques (alimenté par
 *   l'ingestion HTTP) et compose les lignes cpu / mémoire / disques
 * - si `ping` est configuré, une tâche séparée sonde l'hôte et met à jour le
 *   label ONLINE / OFFLINE / ERR sans attendre le cycle des métriques
 * - pas d'enregistrement (ou illisible) : header seul
 */

use super::{check_interval, Widget, WidgetError};
use crate::format::format_bytes;
use crate::metrics::MetricRecord;
use crate::scheduler::InstanceHandle;
use crate::state::{new_state, Shared};
use crate::store::Store;
use crate::view::{Header, MetricBlock, MetricRow, SideContent, View, INDICATOR_GREEN, INDICATOR_RED};
use serde::Deserialize;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

const CPU_ICON: &str = "ri-cpu-line";
const MEMORY_ICON: &str = "ri-ram-line";
const DISK_ICON: &str = "ri-hard-drive-2-line";

fn default_five_minutes() -> u64 {
    5 * 60
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemMonitorConfig {
    pub node: String,
    pub ping: Option<String>,
    pub title: Option<String>,
    pub icon: Option<String>,
    #[serde(rename = "subTitle")]
    pub sub_title: Option<String>,
    #[serde(default = "default_five_minutes")]
    pub refresh_interval: u64,
    pub cpu: Option<CpuOptions>,
    pub memory: Option<MemoryOptions>,
    pub disk: Option<DiskOptions>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CpuView {
    #[default]
    Combined,
    Split,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageView {
    #[default]
    Percentage,
    Bytes,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiskLabel {
    #[default]
    Device,
    Path,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CpuOptions {
    #[serde(default)]
    pub view: CpuView,
    #[serde(default)]
    pub progress_bar: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemoryOptions {
    #[serde(default)]
    pub view: UsageView,
    #[serde(default)]
    pub progress_bar: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiskOptions {
    #[serde(default)]
    pub label: DiskLabel,
    #[serde(default)]
    pub view: UsageView,
    #[serde(default)]
    pub progress_bar: bool,
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default)]
    pub devices: Vec<String>,
}

impl DiskOptions {
    /// Liste blanche : vide des deux côtés = tous les disques
    fn shows(&self, device: &str, path: &str) -> bool {
        if self.paths.is_empty() && self.devices.is_empty() {
            return true;
        }
        self.paths.iter().any(|p| p == path) || self.devices.iter().any(|d| d == device)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reachability {
    Unknown,
    Online,
    Offline,
    Error,
}

impl Reachability {
    fn side(self) -> Option<SideContent> {
        match self {
            Reachability::Unknown => None,
            Reachability::Online => Some(SideContent::label(INDICATOR_GREEN, "ONLINE")),
            Reachability::Offline => Some(SideContent::label(INDICATOR_RED, "OFFLINE")),
            Reachability::Error => Some(SideContent::label(INDICATOR_RED, "ERR")),
        }
    }
}

fn percent(value: f64) -> String {
    format!("{value:.2}%")
}

fn usage(view: UsageView, percentage: f64, used: f64, total: f64) -> String {
    match view {
        UsageView::Percentage => percent(percentage),
        UsageView::Bytes => format!("{} / {}", format_bytes(used), format_bytes(total)),
    }
}

fn row(icon: &str, label: String, progress_bar: bool, progress: f64, value: String) -> MetricRow {
    MetricRow {
        icon: Some(icon.to_string()),
        label: Some(label),
        progress: progress_bar.then_some(progress),
        value: Some(value),
    }
}

/// Lignes cpu, mémoire puis disques selon les options du widget
pub fn compose_rows(config: &SystemMonitorConfig, record: &MetricRecord) -> Vec<MetricRow> {
    let mut rows = Vec::new();

    if let Some(cpu) = &config.cpu {
        match cpu.view {
            CpuView::Combined => rows.push(row(
                CPU_ICON,
                "CPU".into(),
                cpu.progress_bar,
                record.cpu.usage,
                percent(record.cpu.usage),
            )),
            CpuView::Split => rows.extend(record.cpu.cores.iter().map(|(index, core)| {
                row(CPU_ICON, format!("Core {index}"), cpu.progress_bar, core.usage, percent(core.usage))
            })),
        }
    }

    if let Some(memory) = &config.memory {
        let m = &record.memory;
        rows.push(row(
            MEMORY_ICON,
            "Memory".into(),
            memory.progress_bar,
            m.percentage,
            usage(memory.view, m.percentage, m.used, m.total),
        ));
    }

    if let Some(disk) = &config.disk {
        for d in record.disks.iter().filter(|d| disk.shows(&d.device, &d.path)) {
            let label = match disk.label {
                DiskLabel::Path if !d.path.is_empty() => d.path.clone(),
                _ => d.device.clone(),
            };
            rows.push(row(
                DISK_ICON,
                label,
                disk.progress_bar,
                d.percentage,
                usage(disk.view, d.percentage, d.used, d.total),
            ));
        }
    }

    rows
}

pub fn render(config: &SystemMonitorConfig, record: Option<&MetricRecord>, reachability: Reachability) -> View {
    let header = Header::new(config.title.as_deref().unwrap_or(&config.node))
        .subtitle(config.sub_title.clone().or_else(|| config.ping.clone()))
        .icon(config.icon.clone())
        .side(config.ping.as_ref().and_then(|_| reachability.side()));

    let view = View::new("system_monitor").with(header);
    match record {
        Some(record) => view.with(MetricBlock {
            title: None,
            rows: compose_rows(config, record),
        }),
        None => view,
    }
}

fn read_record(metrics: &Store, node: &str) -> Option<MetricRecord> {
    match metrics.get_as::<MetricRecord>(node)? {
        Ok(record) => Some(record),
        Err(e) => {
            warn!(node, error = %e, "stored metric record is unreadable");
            None
        }
    }
}

async fn ping(host: &str) -> Reachability {
    let status = Command::new("ping")
        .args(["-c", "1", "-W", "2", host])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status()
        .await;
    match status {
        Ok(s) if s.success() => Reachability::Online,
        Ok(s) => {
            debug!(host, code = ?s.code(), "host did not answer ping");
            Reachability::Offline
        }
        Err(e) => {
            warn!(host, error = %e, "could not run ping");
            Reachability::Error
        }
    }
}

/// Ce qu'une tâche de rafraîchissement doit partager
struct Monitor {
    config: SystemMonitorConfig,
    metrics: Arc<Store>,
    reachability: Shared<Reachability>,
}

impl Monitor {
    fn view(&self) -> View {
        let record = read_record(&self.metrics, &self.config.node);
        let reachability = *self.reachability.lock();
        render(&self.config, record.as_ref(), reachability)
    }

    /// Nouveau statut de ping : le header est re-rendu sans attendre les métriques
    fn set_reachability(&self, status: Reachability, handle: &InstanceHandle) {
        *self.reachability.lock() = status;
        handle.replace_view(self.view());
    }
}

pub struct SystemMonitorWidget {
    metrics: Arc<Store>,
}

impl SystemMonitorWidget {
    pub fn new(metrics: Arc<Store>) -> Self {
        Self { metrics }
    }
}

impl Widget for SystemMonitorWidget {
    type Config = SystemMonitorConfig;
    type State = ();

    fn kind(&self) -> &'static str {
        "system_monitor"
    }

    fn validate(&self, config: &SystemMonitorConfig) -> Result<(), WidgetError> {
        if config.node.is_empty() {
            return Err(WidgetError::InvalidConfig("node must not be empty".into()));
        }
        check_interval(config.refresh_interval)
    }

    fn identity(&self, config: &SystemMonitorConfig) -> String {
        format!("system_monitor_{}", config.node)
    }

    fn init(&self, config: SystemMonitorConfig, _previous: Option<()>, handle: InstanceHandle) -> Result<View, WidgetError> {
        let period = Duration::from_secs(config.refresh_interval);
        let host = config.ping.clone();
        let monitor = Arc::new(Monitor {
            config,
            metrics: self.metrics.clone(),
            reachability: new_state(Reachability::Unknown),
        });

        let (updates, shared) = (handle.clone(), monitor.clone());
        handle.every(period, move || {
            updates.replace_view(shared.view());
            async {}
        });

        if let Some(host) = host {
            let (updates, shared) = (handle.clone(), monitor.clone());
            handle.every(period, move || {
                let handle = updates.clone();
                let monitor = shared.clone();
                let host = host.clone();
                async move {
                    monitor.set_reachability(ping(&host).await, &handle);
                }
            });
        }

        Ok(monitor.view())
    }
}
