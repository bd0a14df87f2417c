//! User Overrides: per-event name/role override map, loaded
//! lazily and persisted through the Atomic File Writer. Reads are lock-free
//! copy-on-read snapshots of a small map.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::AppError;
use crate::model::{Role, UserOverride, UserOverrideDoc};
use crate::persistence::{read_json_or_default, write_json_atomic};

struct EventOverrides {
    dir: PathBuf,
    doc: Option<UserOverrideDoc>,
}

impl EventOverrides {
    fn path(&self) -> PathBuf {
        self.dir.join("users.json")
    }

    async fn loaded(&mut self) -> Result<&mut UserOverrideDoc, AppError> {
        if self.doc.is_none() {
            self.doc = Some(read_json_or_default(&self.path()).await?);
        }
        Ok(self.doc.as_mut().unwrap())
    }
}

pub struct OverrideStore {
    events: Mutex<HashMap<u64, Arc<Mutex<EventOverrides>>>>,
}

pub type SharedOverrideStore = Arc<OverrideStore>;

impl OverrideStore {
    pub fn new() -> SharedOverrideStore {
        Arc::new(Self { events: Mutex::new(HashMap::new()) })
    }

    async fn event(&self, eid: u64, dir: &Path) -> Arc<Mutex<EventOverrides>> {
        let mut events = self.events.lock().await;
        events
            .entry(eid)
            .or_insert_with(|| Arc::new(Mutex::new(EventOverrides { dir: dir.to_path_buf(), doc: None })))
            .clone()
    }

    pub async fn resolve(&self, eid: u64, dir: &Path, id: &str, reported_role: Role) -> (Option<String>, Role) {
        let event = self.event(eid, dir).await;
        let mut event = event.lock().await;
        let doc = match event.loaded().await {
            Ok(doc) => doc,
            Err(_) => return (None, reported_role),
        };
        match doc.0.get(id) {
            Some(o) => (o.name.clone(), o.role.unwrap_or(reported_role)),
            None => (None, reported_role),
        }
    }

    pub async fn list(&self, eid: u64, dir: &Path) -> HashMap<String, UserOverride> {
        let event = self.event(eid, dir).await;
        let mut event = event.lock().await;
        match event.loaded().await {
            Ok(doc) => doc.0.clone(),
            Err(_) => HashMap::new(),
        }
    }

    pub async fn set(&self, eid: u64, dir: &Path, id: String, over: UserOverride) -> Result<(), AppError> {
        let event = self.event(eid, dir).await;
        let mut event = event.lock().await;
        event.loaded().await?;
        let doc = event.doc.as_mut().unwrap();
        doc.0.insert(id, over);
        write_json_atomic(&event.path(), doc).await
    }

    pub async fn remove(&self, eid: u64, dir: &Path, id: &str) -> Result<(), AppError> {
        let event = self.event(eid, dir).await;
        let mut event = event.lock().await;
        event.loaded().await?;
        let doc = event.doc.as_mut().unwrap();
        doc.0.remove(id);
        write_json_atomic(&event.path(), doc).await
    }

    pub async fn purge(&self, eid: u64) {
        self.events.lock().await.remove(&eid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn missing_file_resolves_to_reported_role_and_no_name() {
        let dir = tempdir().unwrap();
        let store = OverrideStore::new();
        let (name, role) = store.resolve(1, dir.path(), "S1", Role::Support).await;
        assert_eq!(name, None);
        assert_eq!(role, Role::Support);
    }

    #[tokio::test]
    async fn set_then_resolve_overrides_name_and_role() {
        let dir = tempdir().unwrap();
        let store = OverrideStore::new();
        store
            .set(1, dir.path(), "S1".into(), UserOverride { name: Some("Skipper Sam".into()), role: Some(Role::Support) })
            .await
            .unwrap();

        let (name, role) = store.resolve(1, dir.path(), "S1", Role::Sailor).await;
        assert_eq!(name.as_deref(), Some("Skipper Sam"));
        assert_eq!(role, Role::Support);
    }

    #[tokio::test]
    async fn remove_clears_override() {
        let dir = tempdir().unwrap();
        let store = OverrideStore::new();
        store.set(1, dir.path(), "S1".into(), UserOverride { name: Some("X".into()), role: None }).await.unwrap();
        store.remove(1, dir.path(), "S1").await.unwrap();
        let (name, _) = store.resolve(1, dir.path(), "S1", Role::Sailor).await;
        assert_eq!(name, None);
    }
}
