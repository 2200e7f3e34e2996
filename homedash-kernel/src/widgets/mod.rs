/**
 * WIDGET REGISTRY - Catalogue des types de widgets
 *
 * RÔLE :
 * Chaque type (app, rss, github...) implémente le trait `Widget` : contrat de
 * configuration (struct serde + `validate`), identité déterministe, initialiseur.
 * Le `WidgetRegistry` les indexe par identifiant de type, comme un catalogue fixe.
 *
 * FONCTIONNEMENT :
 * - `Widget` est typé (Config / State associés)
 * - `WidgetDefinition` est la version "effacée" stockée dans le registre
 * - `configure` valide la config brute et retourne un `ConfiguredWidget`
 *   qui connaît son instanceId et sait s'initialiser
 */

pub mod app;
pub mod bookmark;
pub mod github;
pub mod ical;
pub mod rss;
pub mod system_monitor;
pub mod world_clock;

use crate::scheduler::InstanceHandle;
use crate::store::Store;
use crate::view::View;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum WidgetError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Feed error: {0}")]
    Feed(String),
    #[error("Calendar error: {0}")]
    Calendar(String),
}

/// Contrat d'un type de widget
pub trait Widget: Send + Sync + 'static {
    type Config: DeserializeOwned + Send + 'static;
    type State: DeserializeOwned + Send + 'static;

    fn kind(&self) -> &'static str;

    /// Règles de validation au-delà de la forme serde
    fn validate(&self, _config: &Self::Config) -> Result<(), WidgetError> {
        Ok(())
    }

    fn identity(&self, config: &Self::Config) -> String;

    /// Première vue ; les rafraîchissements se déclarent via `handle.every(..)`
    fn init(
        &self,
        config: Self::Config,
        previous: Option<Self::State>,
        handle: InstanceHandle,
    ) -> Result<View, WidgetError>;
}

pub trait WidgetDefinition: Send + Sync {
    fn kind(&self) -> &'static str;
    fn configure(&self, raw: Value) -> Result<Box<dyn ConfiguredWidget>, WidgetError>;
}

/// Un widget dont la configuration est validée
pub trait ConfiguredWidget: Send {
    fn instance_id(&self) -> String;
    fn init(self: Box<Self>, previous: Option<Value>, handle: InstanceHandle) -> Result<View, WidgetError>;
}

struct Definition<W: Widget>(Arc<W>);

struct Configured<W: Widget> {
    widget: Arc<W>,
    config: W::Config,
}

impl<W: Widget> WidgetDefinition for Definition<W> {
    fn kind(&self) -> &'static str {
        self.0.kind()
    }

    fn configure(&self, raw: Value) -> Result<Box<dyn ConfiguredWidget>, WidgetError> {
        let config: W::Config =
            serde_json::from_value(raw).map_err(|e| WidgetError::InvalidConfig(e.to_string()))?;
        self.0.validate(&config)?;
        Ok(Box::new(Configured {
            widget: self.0.clone(),
            config,
        }))
    }
}

impl<W: Widget> ConfiguredWidget for Configured<W> {
    fn instance_id(&self) -> String {
        self.widget.identity(&self.config)
    }

    fn init(self: Box<Self>, previous: Option<Value>, handle: InstanceHandle) -> Result<View, WidgetError> {
        let previous = previous.and_then(|value| match serde_json::from_value::<W::State>(value) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!(instance = %handle.instance_id(), error = %e, "ignoring persisted state with unexpected shape");
                None
            }
        });
        let Configured { widget, config } = *self;
        widget.init(config, previous, handle)
    }
}

#[derive(Default)]
pub struct WidgetRegistry {
    definitions: HashMap<&'static str, Box<dyn WidgetDefinition>>,
}

impl WidgetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<W: Widget>(&mut self, widget: W) {
        let kind = widget.kind();
        self.definitions.insert(kind, Box::new(Definition(Arc::new(widget))));
    }

    pub fn get(&self, kind: &str) -> Option<&dyn WidgetDefinition> {
        self.definitions.get(kind).map(|d| d.as_ref())
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        let mut kinds: Vec<_> = self.definitions.keys().copied().collect();
        kinds.sort_unstable();
        kinds
    }
}

/// Table fixe des types livrés avec le kernel
pub fn default_registry(http: reqwest::Client, metrics: Arc<Store>) -> WidgetRegistry {
    let mut registry = WidgetRegistry::new();
    registry.register(app::AppWidget::new(http.clone()));
    registry.register(bookmark::BookmarkWidget);
    registry.register(world_clock::WorldClockWidget);
    registry.register(rss::RssWidget::new(http.clone()));
    registry.register(github::GithubWidget::new(http.clone()));
    registry.register(ical::ICalWidget::new(http));
    registry.register(system_monitor::SystemMonitorWidget::new(metrics));
    registry
}

fn default_hourly() -> u64 {
    60 * 60
}

/// Refuse les intervalles nuls et les URLs non http(s)
fn check_interval(seconds: u64) -> Result<(), WidgetError> {
    if seconds == 0 {
        return Err(WidgetError::InvalidConfig("refresh_interval must be at least 1 second".into()));
    }
    Ok(())
}

fn check_url(field: &str, url: &str) -> Result<(), WidgetError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(WidgetError::InvalidConfig(format!("{field} must be an http(s) URL, got '{url}'")))
    }
}

/// Banc d'essai : un widget, un Runtime sur un dossier temporaire, le vrai pipeline
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::config::WidgetEntry;
    use crate::pipeline::{instantiate_entry, PipelineReport};
    use crate::registry::ViewRegistry;
    use crate::state::Runtime;
    use std::time::Duration;
    use tempfile::TempDir;

    pub(crate) struct Harness {
        pub dir: TempDir,
        pub runtime: Runtime,
        widgets: WidgetRegistry,
    }

    impl Harness {
        pub fn new<W: Widget>(widget: W) -> Self {
            Self::with_dir(tempfile::tempdir().unwrap(), widget)
        }

        pub fn with_dir<W: Widget>(dir: TempDir, widget: W) -> Self {
            let store = Arc::new(Store::open(dir.path().join("data.json")).unwrap());
            let mut widgets = WidgetRegistry::new();
            widgets.register(widget);
            Self {
                dir,
                runtime: Runtime::new(ViewRegistry::shared(), store),
                widgets,
            }
        }

        pub fn start(&self, kind: &str, config: Value) -> String {
            let mut report = PipelineReport::default();
            let entry = WidgetEntry::new(kind, config);
            instantiate_entry("home", 0, &entry, &self.widgets, &self.runtime, &mut report)
                .expect("kind registered in harness")
        }

        pub fn view(&self, id: &str) -> View {
            self.runtime.views.get(id).expect("instance registered").view
        }

        /// Attend (5 s max) que la vue satisfasse `pred`
        pub async fn wait_for(&self, id: &str, pred: impl Fn(&View) -> bool) -> View {
            for _ in 0..250 {
                let view = self.view(id);
                if pred(&view) {
                    return view;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            panic!("view of {id} never matched: {:?}", self.view(id));
        }
    }

    impl Drop for Harness {
        fn drop(&mut self) {
            self.runtime.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn registry() -> (tempfile::TempDir, WidgetRegistry) {
        let dir = tempdir().unwrap();
        let metrics = Arc::new(Store::open(dir.path().join("metric.json")).unwrap());
        (dir, default_registry(reqwest::Client::new(), metrics))
    }

    #[test]
    fn test_default_registry_kinds() {
        let (_dir, registry) = registry();
        assert_eq!(
            registry.kinds(),
            vec!["app", "bookmark", "github", "ical", "rss", "system_monitor", "world_clock"]
        );
        assert!(registry.get("weather").is_none());
    }

    #[test]
    fn test_configure_reports_serde_errors() {
        let (_dir, registry) = registry();
        let rss = registry.get("rss").unwrap();
        let err = rss.configure(serde_json::json!({"title": "no url"})).err().unwrap();
        assert!(matches!(err, WidgetError::InvalidConfig(msg) if msg.contains("url")));
    }

    #[test]
    fn test_content_derived_identities_are_stable() {
        let (_dir, registry) = registry();
        let cases = [
            ("rss", serde_json::json!({"url": "https://example.org/feed.xml"})),
            ("github", serde_json::json!({"owner": "o", "repo": "r", "personal_access_token": "t"})),
            ("ical", serde_json::json!({"title": "Work", "ical_href": "https://cal.example.org/a.ics"})),
            ("system_monitor", serde_json::json!({"node": "nas"})),
        ];
        for (kind, raw) in cases {
            let def = registry.get(kind).unwrap();
            let first = def.configure(raw.clone()).unwrap().instance_id();
            let second = def.configure(raw).unwrap().instance_id();
            assert_eq!(first, second, "{kind} identity must be pure");
        }
    }

    #[test]
    fn test_check_helpers() {
        assert!(check_interval(0).is_err());
        assert!(check_interval(1).is_ok());
        assert!(check_url("url", "https://a").is_ok());
        assert!(check_url("url", "ftp://a").is_err());
    }
}
