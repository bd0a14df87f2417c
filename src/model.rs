//! Wire and domain types shared across the ingest, registry, and store layers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ─── Roles ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Sailor,
    Support,
    Spectator,
}

impl Role {
    /// Unknown role strings fall back to `sailor`.
    pub fn from_wire(raw: Option<&str>) -> Self {
        match raw {
            Some("support") => Role::Support,
            Some("spectator") => Role::Spectator,
            Some("sailor") => Role::Sailor,
            _ => Role::Sailor,
        }
    }
}

// ─── Event ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub eid: u64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub admin_password: String,
    #[serde(default)]
    pub tracker_password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owntracks_password: Option<String>,
    #[serde(default)]
    pub assist_enabled: bool,
    #[serde(default)]
    pub archived: bool,
    pub created_at: i64,
}

impl Event {
    /// Password tracker clients should present for OwnTracks, falling back to
    /// the admin password when no dedicated OwnTracks password is set.
    pub fn owntracks_password(&self) -> &str {
        self.owntracks_password.as_deref().unwrap_or(&self.admin_password)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EventSummary {
    pub eid: u64,
    pub name: String,
    pub description: String,
}

impl From<&Event> for EventSummary {
    fn from(e: &Event) -> Self {
        Self {
            eid: e.eid,
            name: e.name.clone(),
            description: e.description.clone(),
        }
    }
}

// ─── Registry document (events.json) ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RegistryDoc {
    pub next_eid: u64,
    pub events: HashMap<u64, Event>,
}

// ─── Raw wire packet (pre-validation) ────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct RawPacket {
    pub id: Option<String>,
    pub eid: Option<u64>,
    pub sq: Option<i64>,
    pub ts: Option<i64>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub pos: Option<Vec<Vec<f64>>>,
    pub spd: Option<f64>,
    pub hdg: Option<f64>,
    pub ast: Option<bool>,
    pub bat: Option<i64>,
    pub role: Option<String>,
    pub ver: Option<String>,
    pub sig: Option<i64>,
    pub pwd: Option<String>,
    pub os: Option<String>,
    pub bdr: Option<bool>,
    pub chg: Option<bool>,
    pub ps: Option<bool>,
    pub hac: Option<f64>,
    pub hr: Option<i64>,
    pub stopped: Option<bool>,
    #[serde(default)]
    pub auth_check: bool,
}

// ─── Normalized track point (one lat/lon/ts within a packet or batch) ───────

#[derive(Debug, Clone, Serialize)]
pub struct TrackPoint {
    pub ts: i64,
    pub lat: f64,
    pub lon: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spd: Option<f64>,
}

// ─── Normalized packet (post-validation) ─────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Packet {
    pub id: String,
    pub eid: u64,
    pub sq: i64,
    pub ts: i64,
    /// Individual points to append to the daily log — one for single-fix
    /// packets, many for a `pos` batch. Always non-empty unless `auth_check`.
    pub points: Vec<TrackPoint>,
    /// Last point's coordinates — what the current-position snapshot shows.
    pub lat: f64,
    pub lon: f64,
    pub spd: f64,
    pub hdg: f64,
    pub ast: bool,
    pub bat: i64,
    pub role: Role,
    pub ver: Option<String>,
    pub sig: Option<i64>,
    pub pwd: Option<String>,
    pub os: Option<String>,
    pub stopped: bool,
    pub auth_check: bool,
}

// ─── Current position snapshot entry ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct CurrentPosition {
    pub id: String,
    pub lat: f64,
    pub lon: f64,
    pub spd: f64,
    pub hdg: f64,
    pub bat: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sig: Option<i64>,
    pub role: Role,
    pub ast: bool,
    pub stopped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ver: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub server_recv_ts: i64,
    pub client_ts: i64,
    pub latency_secs: i64,
}

// ─── Daily log line ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct TrackLogEntry {
    pub id: String,
    pub eid: u64,
    pub sq: i64,
    pub ts: i64,
    pub recv_ts: i64,
    pub lat: f64,
    pub lon: f64,
    pub spd: f64,
    pub hdg: f64,
    pub bat: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sig: Option<i64>,
    pub role: Role,
    pub ast: bool,
    pub stopped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ver: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

// ─── User overrides (users.json) ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserOverrideDoc(pub HashMap<String, UserOverride>);

// ─── Course document (course.json) ───────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CourseDoc(pub serde_json::Value);

impl CourseDoc {
    pub fn empty() -> Self {
        Self(serde_json::json!({}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_role_defaults_to_sailor() {
        assert_eq!(Role::from_wire(Some("skipper")), Role::Sailor);
        assert_eq!(Role::from_wire(None), Role::Sailor);
        assert_eq!(Role::from_wire(Some("support")), Role::Support);
    }

    #[test]
    fn owntracks_password_falls_back_to_admin() {
        let ev = Event {
            eid: 1,
            name: "Test".into(),
            description: String::new(),
            admin_password: "admin123".into(),
            tracker_password: String::new(),
            owntracks_password: None,
            assist_enabled: true,
            archived: false,
            created_at: 0,
        };
        assert_eq!(ev.owntracks_password(), "admin123");
    }
}
