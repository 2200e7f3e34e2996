/**
 * VIEW REGISTRY - Table partagée instanceId -> vue courante
 *
 * RÔLE :
 * Les initialiseurs et les tâches de rafraîchissement y écrivent, la couche HTTP
 * y lit des snapshots par dashboard.
 *
 * GARANTIES :
 * - une écriture remplace la vue entière d'une instance (jamais de mutation partielle)
 * - un lecteur voit soit l'ancienne vue, soit la nouvelle
 * - les instances ne sont jamais supprimées pendant la vie du process
 */

use crate::view::View;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WidgetInstance {
    #[serde(rename = "dashboardId")]
    pub dashboard_id: String,
    #[serde(rename = "widgetId")]
    pub kind: String,
    #[serde(rename = "id")]
    pub instance_id: String,
    pub view: View,
}

#[derive(Debug, Default)]
pub struct ViewRegistry {
    instances: RwLock<Vec<WidgetInstance>>,
}

pub type SharedViews = Arc<ViewRegistry>;

impl ViewRegistry {
    pub fn shared() -> SharedViews {
        Arc::new(Self::default())
    }

    pub fn register(&self, instance: WidgetInstance) {
        self.instances.write().push(instance);
    }

    /// Remplace la vue de l'instance `instance_id` ; `false` si elle n'existe pas.
    pub fn replace_view(&self, instance_id: &str, view: View) -> bool {
        let mut instances = self.instances.write();
        match instances.iter_mut().find(|w| w.instance_id == instance_id) {
            Some(instance) => {
                instance.view = view;
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, instance_id: &str) -> bool {
        self.instances.read().iter().any(|w| w.instance_id == instance_id)
    }

    pub fn get(&self, instance_id: &str) -> Option<WidgetInstance> {
        self.instances
            .read()
            .iter()
            .find(|w| w.instance_id == instance_id)
            .cloned()
    }

    /// Snapshot des instances d'un dashboard, dans l'ordre de configuration
    pub fn for_dashboard(&self, dashboard_id: &str) -> Vec<WidgetInstance> {
        self.instances
            .read()
            .iter()
            .filter(|w| w.dashboard_id == dashboard_id)
            .cloned()
            .collect()
    }
}
