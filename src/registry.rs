//! Event Registry: loads/saves `events.json`, allocates event
//! ids, validates per-event passwords, and tracks the auth-failure backoff.
//!
//! An `Arc`-wrapped struct holding small `RwLock`-guarded maps, so lookups stay
//! cheap while writes (event creation, password changes) take a brief
//! exclusive lock.

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

use crate::error::{AppError, ErrorKind};
use crate::model::{Event, EventSummary, RegistryDoc};
use crate::persistence::{read_json_or_default, write_json_atomic};

/// Failed attempts allowed within `FAILURE_WINDOW` before a source/event pair
/// is rate-limited for `COOLDOWN`.
const MAX_FAILURES: u32 = 5;
const FAILURE_WINDOW: Duration = Duration::from_secs(60);
const COOLDOWN: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    Ok,
    Fail,
    RateLimited,
    UnknownEvent,
}

#[derive(Debug, Default)]
struct AuthFailureRecord {
    count: u32,
    window_start: Option<Instant>,
    limited_until: Option<Instant>,
}

pub struct Registry {
    path: PathBuf,
    doc: RwLock<RegistryDoc>,
    failures: Mutex<HashMap<(IpAddr, u64), AuthFailureRecord>>,
    manager_password: Option<String>,
}

pub type SharedRegistry = Arc<Registry>;

impl Registry {
    /// Load `events.json` at startup. A corrupt file is fatal;
    /// a missing file starts with an empty registry.
    pub async fn load(path: PathBuf, manager_password: Option<String>) -> anyhow::Result<SharedRegistry> {
        let doc: RegistryDoc = match tokio::fs::read_to_string(&path).await {
            Ok(data) => serde_json::from_str(&data)
                .map_err(|e| anyhow::anyhow!("corrupt events file {}: {e}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("no events file at {}, starting empty registry", path.display());
                RegistryDoc::default()
            }
            Err(e) => return Err(anyhow::anyhow!("cannot read events file {}: {e}", path.display())),
        };

        info!("loaded {} event(s), next_eid={}", doc.events.len(), doc.next_eid);

        Ok(Arc::new(Self {
            path,
            doc: RwLock::new(doc),
            failures: Mutex::new(HashMap::new()),
            manager_password,
        }))
    }

    async fn persist(&self) {
        let doc = self.doc.read().await;
        if let Err(e) = write_json_atomic(&self.path, &*doc).await {
            warn!("failed to persist events file: {e}");
        }
    }

    pub async fn lookup(&self, eid: u64) -> Option<Event> {
        self.doc.read().await.events.get(&eid).cloned()
    }

    pub async fn list_public(&self) -> Vec<EventSummary> {
        self.doc
            .read()
            .await
            .events
            .values()
            .filter(|e| !e.archived)
            .map(EventSummary::from)
            .collect()
    }

    /// Every event, archived or not, with password fields intact — for the
    /// manager surface only.
    pub async fn list_all(&self) -> Vec<Event> {
        self.doc.read().await.events.values().cloned().collect()
    }

    /// Single-event mode has no `events.json` to define an event, so the one
    /// implicit event (`eid = 0`) is synthesized from CLI flags instead. A
    /// no-op once an eid 0 event already exists (e.g. from a loaded registry).
    pub async fn bootstrap_single_event(&self, admin_password: String, owntracks_password: Option<String>) {
        let mut doc = self.doc.write().await;
        doc.events.entry(0).or_insert_with(|| Event {
            eid: 0,
            name: "default".into(),
            description: String::new(),
            admin_password,
            tracker_password: String::new(),
            owntracks_password,
            assist_enabled: true,
            archived: false,
            created_at: chrono::Utc::now().timestamp(),
        });
    }

    pub async fn assist_enabled_for(&self, eid: u64) -> bool {
        self.lookup(eid).await.map(|e| e.assist_enabled).unwrap_or(false)
    }

    pub async fn is_archived(&self, eid: u64) -> bool {
        self.lookup(eid).await.map(|e| e.archived).unwrap_or(false)
    }

    /// Validate a tracker password for `eid` from `source`, applying the
    /// cool-down window below. Successful auth clears the record.
    pub async fn authenticate_tracker(&self, eid: u64, provided: Option<&str>, source: IpAddr) -> AuthOutcome {
        let Some(event) = self.lookup(eid).await else {
            return AuthOutcome::UnknownEvent;
        };

        {
            let mut failures = self.failures.lock().await;
            if let Some(record) = failures.get_mut(&(source, eid)) {
                if let Some(until) = record.limited_until {
                    if Instant::now() < until {
                        return AuthOutcome::RateLimited;
                    }
                    // Cooldown elapsed — clear and re-evaluate this attempt normally.
                    *record = AuthFailureRecord::default();
                }
            }
        }

        if event.tracker_password.is_empty() {
            self.clear_failures(eid, source).await;
            return AuthOutcome::Ok;
        }

        if provided == Some(event.tracker_password.as_str()) {
            self.clear_failures(eid, source).await;
            AuthOutcome::Ok
        } else {
            self.record_failure(eid, source).await
        }
    }

    async fn clear_failures(&self, eid: u64, source: IpAddr) {
        self.failures.lock().await.remove(&(source, eid));
    }

    async fn record_failure(&self, eid: u64, source: IpAddr) -> AuthOutcome {
        let mut failures = self.failures.lock().await;
        let record = failures.entry((source, eid)).or_default();
        let now = Instant::now();

        match record.window_start {
            Some(start) if now.duration_since(start) <= FAILURE_WINDOW => {
                record.count += 1;
            }
            _ => {
                record.window_start = Some(now);
                record.count = 1;
            }
        }

        if record.count > MAX_FAILURES {
            record.limited_until = Some(now + COOLDOWN);
            AuthOutcome::RateLimited
        } else {
            AuthOutcome::Fail
        }
    }

    pub async fn authenticate_admin(&self, eid: u64, provided: &str) -> bool {
        match self.lookup(eid).await {
            Some(event) => !event.admin_password.is_empty() && event.admin_password == provided,
            None => false,
        }
    }

    pub fn authenticate_manager(&self, provided: &str) -> bool {
        self.manager_password.as_deref().map(|p| !p.is_empty() && p == provided).unwrap_or(false)
    }

    pub async fn create_event(
        &self,
        name: String,
        description: String,
        admin_password: String,
        tracker_password: String,
        owntracks_password: Option<String>,
        assist_enabled: bool,
    ) -> Event {
        let eid = {
            let mut doc = self.doc.write().await;
            let eid = doc.next_eid.max(1);
            doc.next_eid = eid + 1;
            let event = Event {
                eid,
                name,
                description,
                admin_password,
                tracker_password,
                owntracks_password,
                assist_enabled,
                archived: false,
                created_at: chrono::Utc::now().timestamp(),
            };
            doc.events.insert(eid, event);
            eid
        };
        self.persist().await;
        info!("created event {eid}");
        self.lookup(eid).await.expect("just inserted")
    }

    pub async fn update_event<F>(&self, eid: u64, mutate: F) -> Result<Event, AppError>
    where
        F: FnOnce(&mut Event),
    {
        let updated = {
            let mut doc = self.doc.write().await;
            let event = doc
                .events
                .get_mut(&eid)
                .ok_or_else(|| AppError::kind(ErrorKind::UnknownEvent, format!("no such event {eid}")))?;
            mutate(event);
            event.clone()
        };
        self.persist().await;
        Ok(updated)
    }

    pub async fn archive_event(&self, eid: u64, archived: bool) -> Result<Event, AppError> {
        self.update_event(eid, |e| e.archived = archived).await
    }

    /// Delete an event: drop it from the registry and remove its on-disk
    /// subtree — the Event Registry owns the per-event directories on disk.
    /// Other components' in-memory state for `eid` is purged by the admin
    /// handler afterward, under the fixed lock order documented there.
    pub async fn delete_event(&self, eid: u64, event_dir: PathBuf) -> Result<(), AppError> {
        {
            let mut doc = self.doc.write().await;
            if doc.events.remove(&eid).is_none() {
                return Err(AppError::kind(ErrorKind::UnknownEvent, format!("no such event {eid}")));
            }
        }
        self.persist().await;

        if event_dir.exists() {
            if let Err(e) = tokio::fs::remove_dir_all(&event_dir).await {
                error!("failed to remove event directory {}: {e}", event_dir.display());
                return Err(e.into());
            }
        }
        info!("deleted event {eid}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use tempfile::tempdir;

    fn addr() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
    }

    async fn fresh_registry() -> (SharedRegistry, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.json");
        let reg = Registry::load(path, Some("manager-secret".into())).await.unwrap();
        (reg, dir)
    }

    #[tokio::test]
    async fn open_event_accepts_any_password() {
        let (reg, _dir) = fresh_registry().await;
        let ev = reg.create_event("Regatta".into(), String::new(), "admin".into(), String::new(), None, true).await;
        let outcome = reg.authenticate_tracker(ev.eid, None, addr()).await;
        assert_eq!(outcome, AuthOutcome::Ok);
    }

    #[tokio::test]
    async fn wrong_password_then_rate_limit_after_five_failures() {
        let (reg, _dir) = fresh_registry().await;
        let ev = reg.create_event("Regatta".into(), String::new(), "admin".into(), "secret".into(), None, true).await;

        for _ in 0..5 {
            let outcome = reg.authenticate_tracker(ev.eid, Some("wrong"), addr()).await;
            assert_eq!(outcome, AuthOutcome::Fail);
        }
        let sixth = reg.authenticate_tracker(ev.eid, Some("wrong"), addr()).await;
        assert_eq!(sixth, AuthOutcome::RateLimited);

        // Correct password is still rejected (no comparison performed) during cooldown.
        let seventh = reg.authenticate_tracker(ev.eid, Some("secret"), addr()).await;
        assert_eq!(seventh, AuthOutcome::RateLimited);
    }

    #[tokio::test]
    async fn successful_auth_clears_failure_record() {
        let (reg, _dir) = fresh_registry().await;
        let ev = reg.create_event("Regatta".into(), String::new(), "admin".into(), "secret".into(), None, true).await;

        assert_eq!(reg.authenticate_tracker(ev.eid, Some("wrong"), addr()).await, AuthOutcome::Fail);
        assert_eq!(reg.authenticate_tracker(ev.eid, Some("secret"), addr()).await, AuthOutcome::Ok);
        assert_eq!(reg.authenticate_tracker(ev.eid, Some("wrong"), addr()).await, AuthOutcome::Fail);
    }

    #[tokio::test]
    async fn deleted_eid_is_never_reassigned() {
        let (reg, dir) = fresh_registry().await;
        let first = reg.create_event("A".into(), String::new(), "admin".into(), String::new(), None, false).await;
        reg.delete_event(first.eid, dir.path().join("html").join(first.eid.to_string())).await.unwrap();

        let second = reg.create_event("B".into(), String::new(), "admin".into(), String::new(), None, false).await;
        assert!(second.eid > first.eid);
        assert!(reg.lookup(first.eid).await.is_none());
    }

    #[tokio::test]
    async fn manager_password_checked() {
        let (reg, _dir) = fresh_registry().await;
        assert!(reg.authenticate_manager("manager-secret"));
        assert!(!reg.authenticate_manager("nope"));
    }
}
