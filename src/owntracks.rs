//! OwnTracks adapter: accepts OwnTracks' own JSON location payload over HTTP
//! Basic auth and translates it into a canonical `Packet` before handing it
//! to the same `PositionStore`/`OverrideStore` machinery native clients use.

use axum::extract::{ConnectInfo, Query, State};
use axum::http::StatusCode;
use axum_extra::headers::authorization::Basic;
use axum_extra::headers::Authorization;
use axum_extra::TypedHeader;
use serde::Deserialize;
use std::net::SocketAddr;
use tracing::warn;

use crate::ack::Ack;
use crate::app::now_unix;
use crate::app::AppState;
use crate::error::ErrorKind;
use crate::model::{Packet, Role, TrackPoint};
use crate::registry::AuthOutcome;

#[derive(Debug, Deserialize)]
pub struct OwnTracksQuery {
    eid: Option<u64>,
}

/// OwnTracks' "location" JSON report. Only the fields this server cares
/// about are modeled; unrecognized fields are ignored by `serde`'s default
/// behavior (no `deny_unknown_fields`).
#[derive(Debug, Deserialize)]
struct OwnTracksReport {
    #[serde(rename = "_type")]
    kind: Option<String>,
    tid: Option<String>,
    topic: Option<String>,
    lat: f64,
    lon: f64,
    vel: Option<f64>,
    cog: Option<f64>,
    batt: Option<i64>,
    tst: i64,
}

fn tracker_id_for(report: &OwnTracksReport) -> String {
    let key = report
        .topic
        .as_deref()
        .and_then(|t| t.rsplit('/').next())
        .filter(|s| !s.is_empty())
        .or(report.tid.as_deref())
        .unwrap_or("unknown");
    format!("OT-{key}")
}

fn display_name_for(report: &OwnTracksReport) -> Option<String> {
    report
        .topic
        .as_deref()
        .and_then(|t| t.rsplit('/').next())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub async fn post_owntracks(
    State(state): State<AppState>,
    Query(query): Query<OwnTracksQuery>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    auth: Option<TypedHeader<Authorization<Basic>>>,
    body: axum::body::Bytes,
) -> (StatusCode, axum::Json<serde_json::Value>) {
    let server_ts = now_unix();
    let eid = query.eid.unwrap_or(state.config.owntracks_default_eid);

    let Some(event) = state.registry.lookup(eid).await else {
        let ack = Ack::failure(0, server_ts, None, ErrorKind::UnknownEvent, "unknown event");
        return (StatusCode::OK, axum::Json(ack.to_json()));
    };

    let Some(TypedHeader(Authorization(credentials))) = auth else {
        return (StatusCode::UNAUTHORIZED, axum::Json(serde_json::json!({"error": "auth"})));
    };

    let expected = event.owntracks_password();
    if expected.is_empty() || credentials.password() != expected {
        match state.registry.authenticate_tracker(eid, Some(credentials.password()), addr.ip()).await {
            AuthOutcome::RateLimited => {
                return (
                    StatusCode::TOO_MANY_REQUESTS,
                    axum::Json(Ack::failure(0, server_ts, Some(event.name.clone()), ErrorKind::RateLimited, "too many failed attempts").to_json()),
                );
            }
            _ => {
                return (StatusCode::UNAUTHORIZED, axum::Json(serde_json::json!({"error": "auth"})));
            }
        }
    }

    if event.archived {
        let ack = Ack::failure(0, server_ts, Some(event.name.clone()), ErrorKind::ArchivedEvent, "event is archived");
        return (StatusCode::OK, axum::Json(ack.to_json()));
    }

    let report: OwnTracksReport = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(_) => return (StatusCode::BAD_REQUEST, axum::Json(serde_json::json!({"error": "malformed"}))),
    };

    if report.kind.as_deref().is_some_and(|k| k != "location") {
        // Waypoints, transitions, etc. are acknowledged but not stored.
        return (StatusCode::OK, axum::Json(Ack::success(0, server_ts, Some(event.name.clone()), !event.assist_enabled).to_json()));
    }

    let id = tracker_id_for(&report);
    let dir = state.config.event_dir(eid);

    if let Some(name) = display_name_for(&report) {
        if state.overrides.list(eid, &dir).await.get(&id).and_then(|o| o.name.as_ref()).is_none() {
            let over = crate::model::UserOverride { name: Some(name), role: None };
            if let Err(e) = state.overrides.set(eid, &dir, id.clone(), over).await {
                warn!("failed to record owntracks display name for {id}: {e}");
            }
        }
    }

    let (_, role) = state.overrides.resolve(eid, &dir, &id, Role::Sailor).await;

    let packet = Packet {
        id: id.clone(),
        eid,
        sq: report.tst,
        ts: report.tst,
        points: vec![TrackPoint { ts: report.tst, lat: report.lat, lon: report.lon, spd: report.vel }],
        lat: report.lat,
        lon: report.lon,
        spd: report.vel.unwrap_or(0.0),
        hdg: report.cog.unwrap_or(0.0),
        ast: false,
        bat: report.batt.unwrap_or(-1),
        role,
        ver: Some("owntracks".into()),
        sig: None,
        pwd: None,
        os: Some("owntracks".into()),
        stopped: false,
        auth_check: false,
    };

    let assist_enabled = event.assist_enabled;
    if let Err(e) = state.positions.accept(eid, &dir, packet, server_ts, display_name_for(&report), role, assist_enabled).await {
        warn!("position store accept failed for owntracks event {eid}: {e}");
    }

    let ack = Ack::success(report.tst, server_ts, Some(event.name.clone()), !assist_enabled);
    (StatusCode::OK, axum::Json(ack.to_json()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_id_prefers_last_topic_segment() {
        let report = OwnTracksReport {
            kind: Some("location".into()),
            tid: Some("AB".into()),
            topic: Some("owntracks/alice/phone".into()),
            lat: 0.0,
            lon: 0.0,
            vel: None,
            cog: None,
            batt: None,
            tst: 1,
        };
        assert_eq!(tracker_id_for(&report), "OT-phone");
        assert_eq!(display_name_for(&report).as_deref(), Some("phone"));
    }

    #[test]
    fn tracker_id_falls_back_to_tid_without_topic() {
        let report = OwnTracksReport { kind: None, tid: Some("AB".into()), topic: None, lat: 0.0, lon: 0.0, vel: None, cog: None, batt: None, tst: 1 };
        assert_eq!(tracker_id_for(&report), "OT-AB");
    }
}
