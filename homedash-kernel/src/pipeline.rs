/**
 * INSTANTIATION PIPELINE - Configuration -> instances vivantes
 *
 * RÔLE :
 * Parcourt les dashboards dans l'ordre, résout chaque entrée dans le
 * `WidgetRegistry`, valide la config, restaure l'état persistant, appelle
 * l'initialiseur puis enregistre la vue et démarre les tâches planifiées.
 *
 * GARANTIES :
 * - une entrée en échec n'empêche jamais les suivantes
 * - type inconnu : entrée ignorée (log), aucune instance
 * - config invalide / init en échec : instance enregistrée avec une vue d'erreur,
 *   aucune tâche démarrée
 * - instanceId unique : suffixe `_{n}` en cas de collision
 */

use crate::config::{Dashboard, WidgetEntry};
use crate::registry::{ViewRegistry, WidgetInstance};
use crate::state::Runtime;
use crate::view::View;
use crate::widgets::WidgetRegistry;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub instantiated: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Tâches de rafraîchissement démarrées
    pub tasks: usize,
}

pub fn instantiate(dashboards: &[Dashboard], widgets: &WidgetRegistry, runtime: &Runtime) -> PipelineReport {
    let mut report = PipelineReport::default();
    for dashboard in dashboards {
        for (position, entry) in dashboard.widgets.iter().enumerate() {
            instantiate_entry(&dashboard.slug, position, entry, widgets, runtime, &mut report);
        }
    }
    info!(
        instantiated = report.instantiated,
        failed = report.failed,
        skipped = report.skipped,
        tasks = report.tasks,
        "widget instantiation complete"
    );
    report
}

/// Instancie une entrée ; retourne l'instanceId enregistré (None si ignorée).
pub fn instantiate_entry(
    dashboard: &str,
    position: usize,
    entry: &WidgetEntry,
    widgets: &WidgetRegistry,
    runtime: &Runtime,
    report: &mut PipelineReport,
) -> Option<String> {
    let Some(definition) = widgets.get(&entry.kind) else {
        error!(dashboard, position, kind = %entry.kind, "unknown widget type, entry skipped");
        report.skipped += 1;
        return None;
    };

    let configured = match definition.configure(entry.config.clone()) {
        Ok(configured) => configured,
        Err(e) => {
            let id = unique_id(&runtime.views, format!("{}_invalid_{}_{}", entry.kind, dashboard, position));
            warn!(dashboard, position, kind = %entry.kind, error = %e, "invalid widget configuration");
            register(runtime, dashboard, &entry.kind, &id, View::error(entry.kind.as_str(), e.to_string()));
            report.failed += 1;
            return Some(id);
        }
    };

    let id = unique_id(&runtime.views, configured.instance_id());
    let handle = runtime.handle(&entry.kind, &id);
    let previous = runtime.store.get(&id);
    debug!(instance = %id, restored = previous.is_some(), "initializing widget");

    let view = match configured.init(previous, handle.clone()) {
        Ok(view) => {
            report.instantiated += 1;
            view
        }
        Err(e) => {
            error!(dashboard, instance = %id, kind = %entry.kind, error = %e, "widget initialization failed");
            handle.discard_pending();
            report.failed += 1;
            View::error(entry.kind.as_str(), e.to_string())
        }
    };

    register(runtime, dashboard, &entry.kind, &id, view);
    report.tasks += handle.launch();
    Some(id)
}

fn register(runtime: &Runtime, dashboard: &str, kind: &str, id: &str, view: View) {
    runtime.views.register(WidgetInstance {
        dashboard_id: dashboard.to_string(),
        kind: kind.to_string(),
        instance_id: id.to_string(),
        view,
    });
}

fn unique_id(views: &ViewRegistry, base: String) -> String {
    if !views.contains(&base) {
        return base;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{base}_{n}");
        if !views.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::scheduler::InstanceHandle;
    use crate::store::Store;
    use crate::view::Header;
    use crate::widgets::{Widget, WidgetError};
    use serde::Deserialize;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::tempdir;

    /// Widget de test : restitue l'état précédent, échoue sur demande
    struct Echo;

    #[derive(Deserialize)]
    struct EchoConfig {
        name: String,
        #[serde(default)]
        fail: bool,
    }

    impl Widget for Echo {
        type Config = EchoConfig;
        type State = Value;

        fn kind(&self) -> &'static str {
            "echo"
        }

        fn validate(&self, config: &EchoConfig) -> Result<(), WidgetError> {
            if config.name.is_empty() {
                return Err(WidgetError::InvalidConfig("name must not be empty".into()));
            }
            Ok(())
        }

        fn identity(&self, config: &EchoConfig) -> String {
            format!("echo_{}", config.name)
        }

        fn init(&self, config: EchoConfig, previous: Option<Value>, handle: InstanceHandle) -> Result<View, WidgetError> {
            handle.every(Duration::from_secs(60), || async {});
            if config.fail {
                return Err(WidgetError::Feed("upstream down".into()));
            }
            let title = previous
                .and_then(|v| v["title"].as_str().map(String::from))
                .unwrap_or_else(|| "fresh".into());
            Ok(View::new("echo").with(Header::new(title)))
        }
    }

    fn setup(dir: &std::path::Path) -> (WidgetRegistry, Runtime) {
        let store = Arc::new(Store::open(dir.join("data.json")).unwrap());
        let mut widgets = WidgetRegistry::new();
        widgets.register(Echo);
        (widgets, Runtime::new(ViewRegistry::shared(), store))
    }

    const TWO_DASHBOARDS: &str = r#"
version: 1
dashboards:
  - slug: home
    label: Home
    widgets:
      - echo: { name: a }
      - weather: { city: Paris }
      - echo: { name: "" }
      - echo: { name: b, fail: true }
      - echo: { name: c }
  - slug: work
    label: Work
    widgets:
      - echo: { name: d }
      - echo: { name: a }
"#;

    #[tokio::test]
    async fn test_failures_are_isolated_per_entry() {
        let dir = tempdir().unwrap();
        let (widgets, runtime) = setup(dir.path());
        let config = parse_config(TWO_DASHBOARDS).unwrap();

        let report = instantiate(&config.dashboards, &widgets, &runtime);
        assert_eq!(
            report,
            PipelineReport {
                instantiated: 4,
                failed: 2,
                skipped: 1,
                tasks: 4
            }
        );

        let home: Vec<_> = runtime
            .views
            .for_dashboard("home")
            .into_iter()
            .map(|w| (w.instance_id, w.view.is_error()))
            .collect();
        assert_eq!(
            home,
            vec![
                ("echo_a".to_string(), false),
                ("echo_invalid_home_2".to_string(), true),
                ("echo_b".to_string(), true),
                ("echo_c".to_string(), false),
            ]
        );
        runtime.shutdown();
    }

    #[tokio::test]
    async fn test_dashboards_are_isolated_and_ids_unique() {
        let dir = tempdir().unwrap();
        let (widgets, runtime) = setup(dir.path());
        let config = parse_config(TWO_DASHBOARDS).unwrap();
        instantiate(&config.dashboards, &widgets, &runtime);

        let work = runtime.views.for_dashboard("work");
        let ids: Vec<_> = work.iter().map(|w| w.instance_id.as_str()).collect();
        assert_eq!(ids, vec!["echo_d", "echo_a_2"]);
        assert!(work.iter().all(|w| w.dashboard_id == "work"));
        assert!(runtime.views.for_dashboard("home").iter().all(|w| w.dashboard_id == "home"));
        runtime.shutdown();
    }

    #[tokio::test]
    async fn test_previous_state_is_restored() {
        let dir = tempdir().unwrap();
        let (widgets, runtime) = setup(dir.path());
        runtime.store.set("echo_a", &json!({"title": "restored"})).unwrap();

        let mut report = PipelineReport::default();
        let id = instantiate_entry(
            "home",
            0,
            &WidgetEntry::new("echo", json!({"name": "a"})),
            &widgets,
            &runtime,
            &mut report,
        )
        .unwrap();

        let view = runtime.views.get(&id).unwrap().view;
        assert_eq!(view.header().unwrap().title, "restored");
        runtime.shutdown();
    }

    #[test]
    fn test_unique_id_suffixes() {
        let views = ViewRegistry::shared();
        assert_eq!(unique_id(&views, "x".into()), "x");
        for id in ["x", "x_2"] {
            views.register(WidgetInstance {
                dashboard_id: "home".into(),
                kind: "echo".into(),
                instance_id: id.into(),
                view: View::new("echo"),
            });
        }
        assert_eq!(unique_id(&views, "x".into()), "x_3");
    }
}
