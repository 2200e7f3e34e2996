/**
 * CONFIGURATION - Chargement du config.yaml et préparation du STORAGE_DIR
 *
 * RÔLE :
 * Produit une `DashboardConfig` validée (1 à 3 dashboards, slugs uniques, une
 * entrée `{type: config}` par widget) et les chemins de stockage du kernel.
 *
 * VARIABLES D'ENVIRONNEMENT :
 * - STORAGE_DIR   : dossier de données (obligatoire, doit exister)
 * - CONFIG_YAML   : chemin du config.yaml (défaut : $STORAGE_DIR/config.yaml)
 * - HOMEDASH_ADDR : adresse d'écoute HTTP (défaut : 0.0.0.0:8080)
 */

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::info;

const STARTER_CONFIG: &str = r#"version: 1
dashboards:
  - slug: home
    label: Home
    widgets:
      - world_clock:
          region:
            - UTC
"#;

const DEFAULT_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Storage directory not found: {0:?}")]
    MissingStorageDir(PathBuf),
    #[error("IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct DashboardConfig {
    pub version: u8,
    pub dashboards: Vec<Dashboard>,
    #[serde(default)]
    pub config: GlobalOptions,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Dashboard {
    pub slug: String,
    pub label: String,
    #[serde(default)]
    pub widgets: Vec<WidgetEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalOptions {
    pub metric_ingestion_token: Option<String>,
    pub message: Option<String>,
    #[serde(alias = "custom_stript")]
    pub custom_script: Option<String>,
    pub custom_css: Option<String>,
}

/// Entrée `- rss: { url: ... }` : un seul couple type -> config brute
#[derive(Debug, Clone, PartialEq)]
pub struct WidgetEntry {
    pub kind: String,
    pub config: Value,
}

impl<'de> Deserialize<'de> for WidgetEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = serde_json::Map::<String, Value>::deserialize(deserializer)?;
        if map.len() != 1 {
            return Err(de::Error::custom(format!(
                "widget entry must have exactly one key, found {}",
                map.len()
            )));
        }
        let (kind, config) = map.into_iter().next().ok_or_else(|| de::Error::custom("empty widget entry"))?;
        Ok(Self { kind, config })
    }
}

impl WidgetEntry {
    pub fn new(kind: impl Into<String>, config: Value) -> Self {
        Self {
            kind: kind.into(),
            config,
        }
    }
}

impl DashboardConfig {
    pub fn ingestion_token(&self) -> Option<&str> {
        self.config
            .metric_ingestion_token
            .as_deref()
            .filter(|t| !t.is_empty())
    }

    pub fn dashboard(&self, slug: &str) -> Option<&Dashboard> {
        self.dashboards.iter().find(|d| d.slug == slug)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!("unsupported version {}", self.version)));
        }
        if !(1..=3).contains(&self.dashboards.len()) {
            return Err(ConfigError::Invalid(format!(
                "expected 1 to 3 dashboards, found {}",
                self.dashboards.len()
            )));
        }
        let mut seen = HashSet::new();
        for d in &self.dashboards {
            if d.slug.is_empty() {
                return Err(ConfigError::Invalid("dashboard slug must not be empty".into()));
            }
            if !seen.insert(d.slug.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate dashboard slug '{}'", d.slug)));
            }
        }
        Ok(())
    }
}

pub fn parse_config(yaml: &str) -> Result<DashboardConfig, ConfigError> {
    let config: DashboardConfig = serde_yaml::from_str(yaml)?;
    config.validate()?;
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<DashboardConfig, ConfigError> {
    let yaml = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse_config(&yaml)?;
    info!(
        path = %path.display(),
        dashboards = config.dashboards.len(),
        widgets = config.dashboards.iter().map(|d| d.widgets.len()).sum::<usize>(),
        "configuration loaded"
    );
    Ok(config)
}

/// Emplacements des fichiers du kernel sous STORAGE_DIR
#[derive(Debug, Clone)]
pub struct StoragePaths {
    pub root: PathBuf,
    pub config: PathBuf,
    pub data: PathBuf,
    pub metrics: PathBuf,
    pub icons: PathBuf,
}

impl StoragePaths {
    pub fn new(root: impl Into<PathBuf>, config_override: Option<PathBuf>) -> Self {
        let root = root.into();
        Self {
            config: config_override.unwrap_or_else(|| root.join("config.yaml")),
            data: root.join("data.json"),
            metrics: root.join("metric.json"),
            icons: root.join("icons"),
            root,
        }
    }

    pub fn from_env() -> Self {
        let root = std::env::var("STORAGE_DIR").unwrap_or_default();
        let config = std::env::var("CONFIG_YAML").ok().map(PathBuf::from);
        Self::new(root, config)
    }

    /// Crée ce qui manque : config de démarrage, dossier icons, stores vides
    pub fn prepare(&self) -> Result<(), ConfigError> {
        if self.root.as_os_str().is_empty() || !self.root.is_dir() {
            return Err(ConfigError::MissingStorageDir(self.root.clone()));
        }

        let config_empty = fs::read_to_string(&self.config)
            .map(|c| c.trim().is_empty())
            .unwrap_or(true);
        if config_empty {
            write(&self.config, STARTER_CONFIG)?;
            info!(path = %self.config.display(), "wrote starter configuration");
        }

        if !self.icons.exists() {
            fs::create_dir_all(&self.icons).map_err(|source| ConfigError::Io {
                path: self.icons.clone(),
                source,
            })?;
        }

        for store in [&self.data, &self.metrics] {
            if !store.exists() {
                write(store, "{}")?;
            }
        }
        Ok(())
    }
}

fn write(path: &Path, content: &str) -> Result<(), ConfigError> {
    fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn listen_addr() -> Result<SocketAddr, ConfigError> {
    let raw = std::env::var("HOMEDASH_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.into());
    raw.parse()
        .map_err(|e| ConfigError::Invalid(format!("HOMEDASH_ADDR '{raw}': {e}")))
}
