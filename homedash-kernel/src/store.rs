/**
 * STORE - Persistance clé/valeur locale du kernel
 *
 * RÔLE :
 * Table clé -> valeur JSON chargée entièrement en mémoire au démarrage,
 * réécrite en entier dans son fichier à chaque mutation.
 *
 * FONCTIONNEMENT :
 * - Un fichier = un objet JSON plat ({ "rss_https://...": {...}, ... })
 * - Fichier vide ou absent = table vide
 * - `set` réécrit tout le fichier de manière synchrone, verrou tenu
 *
 * UTILITÉ :
 * 🎯 data.json : état opaque de chaque instance de widget (clé = instanceId)
 * 🎯 metric.json : dernier Metric Record de chaque noeud (clé = node id)
 */

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Store file {0:?} does not hold a JSON object")]
    NotAnObject(PathBuf),
}

pub struct Store {
    path: PathBuf,
    table: Mutex<Map<String, Value>>,
}

impl Store {
    /// Charge la table depuis `path`. Un fichier absent ou vide donne une table vide.
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self, StoreError> {
        let path = path.into();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        let table = if content.trim().is_empty() {
            Map::new()
        } else {
            match serde_json::from_str::<Value>(&content)? {
                Value::Object(map) => map,
                _ => return Err(StoreError::NotAnObject(path)),
            }
        };

        debug!(path = %path.display(), keys = table.len(), "store loaded");
        Ok(Self {
            path,
            table: Mutex::new(table),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.table.lock().get(key).cloned()
    }

    /// Lecture typée ; `None` si la clé est absente, `Some(Err)` si la forme ne correspond pas.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<Result<T, serde_json::Error>> {
        self.get(key).map(serde_json::from_value)
    }

    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let value = serde_json::to_value(value)?;
        let mut table = self.table.lock();
        table.insert(key.to_string(), value);

        // verrou tenu pendant l'écriture : un seul writer par fichier
        let json = serde_json::to_string(&*table)?;
        fs::write(&self.path, json).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;
        debug!(key, path = %self.path.display(), "store written");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.table.lock().len()
    }
}
