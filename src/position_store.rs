//! Position Store: per-event in-memory current-positions map,
//! an atomically-written snapshot, and an append-only daily track log.
//!
//! A single `Mutex` per event guards both the in-memory map and the open log
//! file handle, so a snapshot read is always taken over a well-formed view.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::model::{CurrentPosition, Packet, Role, TrackLogEntry};
use crate::persistence::write_json_atomic;

struct OpenLog {
    date: NaiveDate,
    file: File,
}

struct EventState {
    dir: PathBuf,
    positions: HashMap<String, CurrentPosition>,
    log: Option<OpenLog>,
    dirty: bool,
    fsync: bool,
    enable_track_log: bool,
    enable_snapshot: bool,
}

impl EventState {
    fn new(dir: PathBuf, fsync: bool, enable_track_log: bool, enable_snapshot: bool) -> Self {
        Self {
            dir,
            positions: HashMap::new(),
            log: None,
            dirty: false,
            fsync,
            enable_track_log,
            enable_snapshot,
        }
    }

    fn snapshot_path(&self) -> PathBuf {
        self.dir.join("current_positions.json")
    }

    fn log_path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join("logs").join(format!("{}.jsonl", date.format("%Y_%m_%d")))
    }

    /// Open (or rotate to) the log file for `date`, creating it if missing.
    async fn ensure_log_open(&mut self, date: NaiveDate) -> Result<(), AppError> {
        if let Some(open) = &self.log {
            if open.date == date {
                return Ok(());
            }
        }
        let path = self.log_path_for(date);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path).await?;
        self.log = Some(OpenLog { date, file });
        Ok(())
    }

    async fn append_log_line(&mut self, entry: &TrackLogEntry, date: NaiveDate) -> Result<(), AppError> {
        if !self.enable_track_log {
            return Ok(());
        }
        self.ensure_log_open(date).await?;
        let line = serde_json::to_string(entry)?;
        let open = self.log.as_mut().expect("just ensured");
        open.file.write_all(line.as_bytes()).await?;
        open.file.write_all(b"\n").await?;
        if self.fsync {
            open.file.sync_data().await?;
        }
        Ok(())
    }

    async fn write_snapshot(&mut self) -> Result<(), AppError> {
        if !self.enable_snapshot {
            self.dirty = false;
            return Ok(());
        }
        let values: Vec<&CurrentPosition> = self.positions.values().collect();
        write_json_atomic(&self.snapshot_path(), &values).await?;
        self.dirty = false;
        Ok(())
    }

    async fn clear(&mut self) -> Result<(), AppError> {
        self.positions.clear();
        let today = Utc::now().date_naive();
        if self.enable_track_log {
            self.ensure_log_open(today).await?;
            let path = self.log_path_for(today);
            // Truncate today's file in place; yesterday's files are untouched.
            let file = OpenOptions::new().write(true).truncate(true).open(&path).await?;
            self.log = Some(OpenLog { date: today, file });
        }
        self.write_snapshot().await
    }
}

pub struct PositionStore {
    fsync: bool,
    enable_track_log: bool,
    enable_snapshot: bool,
    events: Mutex<HashMap<u64, Arc<Mutex<EventState>>>>,
}

pub type SharedPositionStore = Arc<PositionStore>;

impl PositionStore {
    pub fn new(fsync: bool, enable_track_log: bool, enable_snapshot: bool) -> SharedPositionStore {
        Arc::new(Self {
            fsync,
            enable_track_log,
            enable_snapshot,
            events: Mutex::new(HashMap::new()),
        })
    }

    async fn event_state(&self, eid: u64, dir: &Path) -> Arc<Mutex<EventState>> {
        let mut events = self.events.lock().await;
        events
            .entry(eid)
            .or_insert_with(|| {
                Arc::new(Mutex::new(EventState::new(
                    dir.to_path_buf(),
                    self.fsync,
                    self.enable_track_log,
                    self.enable_snapshot,
                )))
            })
            .clone()
    }

    /// Accept one validated, authenticated packet. `display_name`/`role`
    /// are the already-resolved values (User Overrides applied by the
    /// caller). `assist_enabled` gates the `ast` coercion.
    pub async fn accept(
        &self,
        eid: u64,
        dir: &Path,
        mut packet: Packet,
        recv_ts: i64,
        display_name: Option<String>,
        role: Role,
        assist_enabled: bool,
    ) -> Result<(), AppError> {
        if !assist_enabled {
            packet.ast = false;
        }
        if packet.stopped {
            packet.ast = false;
        }

        let state = self.event_state(eid, dir).await;
        let mut state = state.lock().await;

        let latency_secs = recv_ts - packet.ts;
        let current = CurrentPosition {
            id: packet.id.clone(),
            lat: packet.lat,
            lon: packet.lon,
            spd: packet.spd,
            hdg: packet.hdg,
            bat: packet.bat,
            sig: packet.sig,
            role,
            ast: packet.ast,
            stopped: packet.stopped,
            ver: packet.ver.clone(),
            os: packet.os.clone(),
            display_name: display_name.clone(),
            server_recv_ts: recv_ts,
            client_ts: packet.ts,
            latency_secs,
        };
        state.positions.insert(packet.id.clone(), current);

        for point in &packet.points {
            let date = date_for_ts(point.ts);
            let entry = TrackLogEntry {
                id: packet.id.clone(),
                eid,
                sq: packet.sq,
                ts: point.ts,
                recv_ts,
                lat: point.lat,
                lon: point.lon,
                spd: point.spd.unwrap_or(packet.spd),
                hdg: packet.hdg,
                bat: packet.bat,
                sig: packet.sig,
                role,
                ast: packet.ast,
                stopped: packet.stopped,
                ver: packet.ver.clone(),
                os: packet.os.clone(),
                display_name: display_name.clone(),
            };
            if let Err(e) = state.append_log_line(&entry, date).await {
                // A log-append io-error drops that point from durable state but the
                // packet is still ACK'd — it must not look like a client-retryable failure.
                warn!("track log append failed for event {eid}: {e}");
            }
        }

        state.dirty = true;
        Ok(())
    }

    pub async fn snapshot(&self, eid: u64, dir: &Path) -> Vec<CurrentPosition> {
        let state = self.event_state(eid, dir).await;
        let state = state.lock().await;
        state.positions.values().cloned().collect()
    }

    pub async fn clear_tracks(&self, eid: u64, dir: &Path) -> Result<(), AppError> {
        let state = self.event_state(eid, dir).await;
        let mut state = state.lock().await;
        state.clear().await
    }

    /// Drop all in-memory state for a deleted event.
    pub async fn purge(&self, eid: u64) {
        self.events.lock().await.remove(&eid);
    }

    /// Background coalescer: wakes every `interval`, writes a
    /// snapshot for any event whose dirty flag is set, clears the flag.
    pub async fn run_snapshot_writer(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            self.flush_dirty().await;
        }
    }

    async fn flush_dirty(&self) {
        let states: Vec<Arc<Mutex<EventState>>> = self.events.lock().await.values().cloned().collect();
        for state in states {
            let mut state = state.lock().await;
            if state.dirty {
                if let Err(e) = state.write_snapshot().await {
                    warn!("snapshot write failed: {e}");
                }
            }
        }
    }

    /// Force-write every dirty snapshot regardless of the timer (startup
    /// warm-up / shutdown — snapshots are also force-written immediately on shutdown).
    pub async fn flush_all(&self) {
        debug!("flushing all dirty snapshots");
        self.flush_dirty().await;
    }
}

fn date_for_ts(ts: i64) -> NaiveDate {
    DateTime::from_timestamp(ts, 0).map(|dt| dt.date_naive()).unwrap_or_else(|| Utc::now().date_naive())
}
