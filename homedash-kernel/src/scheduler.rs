/**
 * REFRESH SCHEDULER - Handle par instance + tâches périodiques supervisées
 *
 * RÔLE :
 * Chaque instance de widget reçoit un `InstanceHandle` à l'init. Il expose :
 * - replace_view / safely_replace_view : écriture dans la View Registry
 * - persist_state : écriture de l'état opaque dans le Store (clé = instanceId)
 * - every : déclare une tâche périodique (premier tick immédiat)
 *
 * CYCLE DE VIE :
 * Les tâches déclarées pendant l'init ne démarrent qu'au `launch`, appelé par le
 * pipeline une fois l'instance enregistrée. Elles tournent jusqu'à l'annulation
 * du token (shutdown du process).
 */

use crate::registry::SharedViews;
use crate::store::{Store, StoreError};
use crate::view::View;
use crate::widgets::WidgetError;
use parking_lot::Mutex;
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

const MIN_PERIOD: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct InstanceHandle {
    kind: Arc<str>,
    instance_id: Arc<str>,
    views: SharedViews,
    store: Arc<Store>,
    cancel: CancellationToken,
    pending: Arc<Mutex<Vec<Task>>>,
}

impl InstanceHandle {
    pub(crate) fn new(
        kind: &str,
        instance_id: &str,
        views: SharedViews,
        store: Arc<Store>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            kind: kind.into(),
            instance_id: instance_id.into(),
            views,
            store,
            cancel,
            pending: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn replace_view(&self, view: View) {
        if !self.views.replace_view(&self.instance_id, view) {
            debug!(instance = %self.instance_id, "view update for unregistered instance dropped");
        }
    }

    /// Convention "guarded" : un échec de rafraîchissement remplace la vue par la vue d'erreur.
    pub fn safely_replace_view(&self, result: Result<View, WidgetError>) {
        match result {
            Ok(view) => self.replace_view(view),
            Err(e) => {
                warn!(kind = %self.kind, instance = %self.instance_id, error = %e, "refresh failed");
                self.replace_view(View::error(&*self.kind, e.to_string()));
            }
        }
    }

    pub fn persist_state<S: Serialize>(&self, state: &S) -> Result<(), StoreError> {
        self.store.set(&self.instance_id, state)
    }

    /// Déclare une tâche périodique : tick immédiat puis toutes les `period`.
    pub fn every<F, Fut>(&self, period: Duration, mut tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let period = period.max(MIN_PERIOD);
        let cancel = self.cancel.clone();
        let instance_id = self.instance_id.clone();

        let task = async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!(instance = %instance_id, "refresh task stopped");
                        break;
                    }
                    _ = interval.tick() => tick().await,
                }
            }
        };
        self.pending.lock().push(Box::pin(task));
    }

    /// Démarre les tâches déclarées ; retourne leur nombre.
    pub(crate) fn launch(&self) -> usize {
        let tasks: Vec<Task> = self.pending.lock().drain(..).collect();
        let count = tasks.len();
        for task in tasks {
            tokio::spawn(task);
        }
        count
    }

    pub(crate) fn discard_pending(&self) {
        self.pending.lock().clear();
    }

    #[cfg(test)]
    pub(crate) fn pending_tasks(&self) -> usize {
        self.pending.lock().len()
    }
}
