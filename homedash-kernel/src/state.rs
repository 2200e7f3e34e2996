use crate::registry::SharedViews;
use crate::scheduler::InstanceHandle;
use crate::store::Store;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

/// Contexte propriétaire du runtime des widgets : passé explicitement au pipeline
/// et capturé par chaque tâche de rafraîchissement (pas de globals).
#[derive(Clone)]
pub struct Runtime {
    pub views: SharedViews,
    pub store: Arc<Store>,
    shutdown: CancellationToken,
}

impl Runtime {
    pub fn new(views: SharedViews, store: Arc<Store>) -> Self {
        Self {
            views,
            store,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn handle(&self, kind: &str, instance_id: &str) -> InstanceHandle {
        InstanceHandle::new(
            kind,
            instance_id,
            self.views.clone(),
            self.store.clone(),
            self.shutdown.child_token(),
        )
    }

    /// Arrête toutes les tâches de rafraîchissement
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}
