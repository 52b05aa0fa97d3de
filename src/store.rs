// src/store.rs
//
// Persistent document stores for macros and profiles: pretty-printed JSON
// arrays in fixed files, loaded once at startup and rewritten whole after
// each mutation.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::MonitorError;
use crate::types::{now_ms, PortConfigRequest};

/// Documents are keyed by UUID.
pub trait HasId {
    fn id(&self) -> Uuid;
}

/// A saved connection preset. Pure document data; connecting with a profile
/// just replays its config through the normal connect path.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: Uuid,
    pub name: String,
    pub config: PortConfigRequest,
    pub created_at: i64,
    pub updated_at: i64,
}

impl HasId for Profile {
    fn id(&self) -> Uuid {
        self.id
    }
}

/// Wire shape for profile create/update.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfileRequest {
    pub name: String,
    pub config: PortConfigRequest,
}

impl Profile {
    pub fn create(request: ProfileRequest) -> Self {
        let now = now_ms();
        Self {
            id: Uuid::new_v4(),
            name: request.name,
            config: request.config,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn update(&self, request: ProfileRequest) -> Self {
        Self {
            id: self.id,
            name: request.name,
            config: request.config,
            created_at: self.created_at,
            updated_at: now_ms(),
        }
    }
}

// ============================================================================
// Document store
// ============================================================================

/// JSON-array-on-disk store. Every mutation rewrites the whole file.
pub struct DocumentStore<T> {
    path: PathBuf,
    items: Mutex<Vec<T>>,
}

pub type MacroStore = DocumentStore<crate::macros::Macro>;
pub type ProfileStore = DocumentStore<Profile>;

impl<T> DocumentStore<T>
where
    T: Clone + Serialize + DeserializeOwned + HasId,
{
    /// Load the store, creating the parent directory if missing. A missing
    /// file is an empty store; an unreadable one is logged and treated as
    /// empty rather than refusing to start.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                warn!("[store] cannot create {}: {}", parent.display(), e);
            }
        }

        let items = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<Vec<T>>(&contents) {
                Ok(items) => {
                    info!("[store] loaded {} item(s) from {}", items.len(), path.display());
                    items
                }
                Err(e) => {
                    warn!("[store] {} is corrupt ({}), starting empty", path.display(), e);
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };

        Self {
            path,
            items: Mutex::new(items),
        }
    }

    fn save(&self, items: &[T]) -> Result<(), MonitorError> {
        let json = serde_json::to_string_pretty(items)
            .map_err(|e| MonitorError::store(format!("serialize failed: {}", e)))?;
        fs::write(&self.path, json).map_err(|e| {
            MonitorError::store(format!("write {} failed: {}", self.path.display(), e))
        })
    }

    pub fn all(&self) -> Vec<T> {
        self.items.lock().expect("store lock poisoned").clone()
    }

    pub fn get(&self, id: Uuid) -> Option<T> {
        self.items
            .lock()
            .expect("store lock poisoned")
            .iter()
            .find(|item| item.id() == id)
            .cloned()
    }

    pub fn add(&self, item: T) -> Result<(), MonitorError> {
        let mut items = self.items.lock().expect("store lock poisoned");
        items.push(item);
        self.save(&items)
    }

    /// Replace the document with the matching id. `NotFound` if absent.
    pub fn replace(&self, item: T) -> Result<(), MonitorError> {
        let mut items = self.items.lock().expect("store lock poisoned");
        let slot = items
            .iter_mut()
            .find(|existing| existing.id() == item.id())
            .ok_or_else(|| MonitorError::not_found("document", item.id().to_string()))?;
        *slot = item;
        self.save(&items)
    }

    pub fn remove(&self, id: Uuid) -> Result<bool, MonitorError> {
        let mut items = self.items.lock().expect("store lock poisoned");
        let before = items.len();
        items.retain(|item| item.id() != id);
        if items.len() == before {
            return Ok(false);
        }
        self.save(&items)?;
        Ok(true)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::macros::{Macro, MacroRequest};

    fn sample_macro(name: &str) -> Macro {
        Macro::create(MacroRequest {
            name: name.to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn test_missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store: MacroStore = DocumentStore::load(dir.path().join("macros.json"));
        assert!(store.all().is_empty());
    }

    #[test]
    fn test_add_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("macros.json");

        let store: MacroStore = DocumentStore::load(&path);
        let m = sample_macro("boot sequence");
        store.add(m.clone()).unwrap();

        let reloaded: MacroStore = DocumentStore::load(&path);
        assert_eq!(reloaded.all().len(), 1);
        assert_eq!(reloaded.get(m.id).unwrap().name, "boot sequence");
    }

    #[test]
    fn test_file_is_pretty_printed_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("macros.json");

        let store: MacroStore = DocumentStore::load(&path);
        store.add(sample_macro("m")).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with('['));
        assert!(contents.contains('\n'));
    }

    #[test]
    fn test_replace_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store: MacroStore = DocumentStore::load(dir.path().join("macros.json"));

        let m = sample_macro("original");
        store.add(m.clone()).unwrap();

        let renamed = m.update(MacroRequest {
            name: "renamed".to_string(),
            ..Default::default()
        });
        store.replace(renamed).unwrap();
        assert_eq!(store.get(m.id).unwrap().name, "renamed");

        assert!(store.remove(m.id).unwrap());
        assert!(!store.remove(m.id).unwrap());
        assert!(store.get(m.id).is_none());
    }

    #[test]
    fn test_replace_unknown_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store: MacroStore = DocumentStore::load(dir.path().join("macros.json"));
        let result = store.replace(sample_macro("ghost"));
        assert!(matches!(result, Err(MonitorError::NotFound { .. })));
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("macros.json");
        std::fs::write(&path, "not json at all").unwrap();

        let store: MacroStore = DocumentStore::load(&path);
        assert!(store.all().is_empty());
    }

    #[test]
    fn test_profile_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store: ProfileStore = DocumentStore::load(dir.path().join("profiles.json"));

        let profile = Profile::create(ProfileRequest {
            name: "bench PSU".to_string(),
            config: PortConfigRequest {
                path: "/dev/ttyUSB0".to_string(),
                baud_rate: Some(9600),
                ..Default::default()
            },
        });
        store.add(profile.clone()).unwrap();

        let reloaded: ProfileStore = DocumentStore::load(dir.path().join("profiles.json"));
        let loaded = reloaded.get(profile.id).unwrap();
        assert_eq!(loaded.config.baud_rate, Some(9600));
    }
}
