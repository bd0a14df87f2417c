//! Admin and management HTTP surface: per-event moderation
//! (`X-Admin-Password`) and whole-registry event lifecycle (`X-Manager-Password`).
//!
//! Deleting an event touches four components; the fixed lock order is
//! Registry, then Position Store, then Course, then User Overrides — the same
//! order rules out deadlock between this path and the per-event accept path.

use axum::extract::{Path as AxumPath, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::app::AppState;
use crate::error::{AppError, ErrorKind};
use crate::model::{CourseDoc, Role, UserOverride};

#[derive(Debug, Deserialize)]
pub struct EidQuery {
    eid: Option<u64>,
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

async fn require_admin(state: &AppState, headers: &HeaderMap, eid: u64) -> Result<(), AppError> {
    let provided = header_value(headers, "x-admin-password").unwrap_or("");
    if state.registry.authenticate_admin(eid, provided).await {
        Ok(())
    } else {
        Err(AppError::unauthorized("invalid admin password"))
    }
}

fn require_manager(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    let provided = header_value(headers, "x-manager-password").unwrap_or("");
    if state.registry.authenticate_manager(provided) {
        Ok(())
    } else {
        Err(AppError::unauthorized("invalid manager password"))
    }
}

// ─── Public ───────────────────────────────────────────────────────────────────

pub async fn list_events(State(state): State<AppState>) -> Json<Value> {
    let events = state.registry.list_public().await;
    Json(json!(events))
}

pub async fn get_course(State(state): State<AppState>, Query(q): Query<EidQuery>) -> Json<Value> {
    let eid = q.eid.unwrap_or(state.config.owntracks_default_eid);
    let dir = state.config.event_dir(eid);
    let doc = state.course.get(eid, &dir).await;
    Json(doc.0)
}

// ─── Admin (per-event) ──────────────────────────────────────────────────────

pub async fn auth_check(State(state): State<AppState>, Query(q): Query<EidQuery>, headers: HeaderMap) -> Result<Json<Value>, AppError> {
    let eid = q.eid.ok_or_else(|| AppError::bad_request("eid is required"))?;
    require_admin(&state, &headers, eid).await?;
    Ok(Json(json!({"ok": true})))
}

pub async fn clear_tracks(State(state): State<AppState>, Query(q): Query<EidQuery>, headers: HeaderMap) -> Result<Json<Value>, AppError> {
    let eid = q.eid.ok_or_else(|| AppError::bad_request("eid is required"))?;
    require_admin(&state, &headers, eid).await?;
    let dir = state.config.event_dir(eid);
    state.positions.clear_tracks(eid, &dir).await?;
    Ok(Json(json!({"ok": true})))
}

pub async fn set_course(
    State(state): State<AppState>,
    Query(q): Query<EidQuery>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let eid = q.eid.ok_or_else(|| AppError::bad_request("eid is required"))?;
    require_admin(&state, &headers, eid).await?;
    let dir = state.config.event_dir(eid);
    state.course.set(eid, &dir, CourseDoc(body)).await?;
    Ok(Json(json!({"ok": true})))
}

pub async fn delete_course(State(state): State<AppState>, Query(q): Query<EidQuery>, headers: HeaderMap) -> Result<Json<Value>, AppError> {
    let eid = q.eid.ok_or_else(|| AppError::bad_request("eid is required"))?;
    require_admin(&state, &headers, eid).await?;
    let dir = state.config.event_dir(eid);
    state.course.delete(eid, &dir).await?;
    Ok(Json(json!({"ok": true})))
}

pub async fn list_users(State(state): State<AppState>, Query(q): Query<EidQuery>, headers: HeaderMap) -> Result<Json<Value>, AppError> {
    let eid = q.eid.ok_or_else(|| AppError::bad_request("eid is required"))?;
    require_admin(&state, &headers, eid).await?;
    let dir = state.config.event_dir(eid);
    let users = state.overrides.list(eid, &dir).await;
    Ok(Json(json!(users)))
}

#[derive(Debug, Deserialize)]
pub struct SetUserBody {
    name: Option<String>,
    role: Option<Role>,
}

pub async fn set_user(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    Query(q): Query<EidQuery>,
    headers: HeaderMap,
    Json(body): Json<SetUserBody>,
) -> Result<Json<Value>, AppError> {
    let eid = q.eid.ok_or_else(|| AppError::bad_request("eid is required"))?;
    require_admin(&state, &headers, eid).await?;
    let dir = state.config.event_dir(eid);
    state.overrides.set(eid, &dir, id, UserOverride { name: body.name, role: body.role }).await?;
    Ok(Json(json!({"ok": true})))
}

pub async fn remove_user(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    Query(q): Query<EidQuery>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    let eid = q.eid.ok_or_else(|| AppError::bad_request("eid is required"))?;
    require_admin(&state, &headers, eid).await?;
    let dir = state.config.event_dir(eid);
    state.overrides.remove(eid, &dir, &id).await?;
    Ok(Json(json!({"ok": true})))
}

// ─── Manager (whole registry) ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateEventBody {
    name: String,
    #[serde(default)]
    description: String,
    admin_password: String,
    #[serde(default)]
    tracker_password: String,
    #[serde(default)]
    owntracks_password: Option<String>,
    #[serde(default)]
    assist_enabled: bool,
}

pub async fn manager_list_events(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Value>, AppError> {
    require_manager(&state, &headers)?;
    let events = state.registry.list_all().await;
    Ok(Json(json!(events)))
}

pub async fn manager_create_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateEventBody>,
) -> Result<Json<Value>, AppError> {
    require_manager(&state, &headers)?;
    let event = state
        .registry
        .create_event(body.name, body.description, body.admin_password, body.tracker_password, body.owntracks_password, body.assist_enabled)
        .await;
    Ok(Json(json!(event)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateEventBody {
    name: Option<String>,
    description: Option<String>,
    admin_password: Option<String>,
    tracker_password: Option<String>,
    owntracks_password: Option<String>,
    assist_enabled: Option<bool>,
    archived: Option<bool>,
}

pub async fn manager_update_event(
    State(state): State<AppState>,
    AxumPath(eid): AxumPath<u64>,
    headers: HeaderMap,
    Json(body): Json<UpdateEventBody>,
) -> Result<Json<Value>, AppError> {
    require_manager(&state, &headers)?;
    let updated = state
        .registry
        .update_event(eid, |e| {
            if let Some(name) = body.name {
                e.name = name;
            }
            if let Some(description) = body.description {
                e.description = description;
            }
            if let Some(pwd) = body.admin_password {
                e.admin_password = pwd;
            }
            if let Some(pwd) = body.tracker_password {
                e.tracker_password = pwd;
            }
            if let Some(pwd) = body.owntracks_password {
                e.owntracks_password = Some(pwd);
            }
            if let Some(assist) = body.assist_enabled {
                e.assist_enabled = assist;
            }
            if let Some(archived) = body.archived {
                e.archived = archived;
            }
        })
        .await?;
    Ok(Json(json!(updated)))
}

/// Delete an event and its on-disk subtree, then purge every component's
/// in-memory state for it. Registry first, then Position Store, Course,
/// User Overrides — see module doc.
pub async fn manager_delete_event(State(state): State<AppState>, AxumPath(eid): AxumPath<u64>, headers: HeaderMap) -> Result<Json<Value>, AppError> {
    require_manager(&state, &headers)?;
    let dir = state.config.event_dir(eid);
    state.registry.delete_event(eid, dir).await.map_err(|e| match e {
        AppError::Kind { kind: ErrorKind::UnknownEvent, message } => AppError::not_found(message),
        other => other,
    })?;
    state.positions.purge(eid).await;
    state.course.purge(eid).await;
    state.overrides.purge(eid).await;
    Ok(Json(json!({"ok": true})))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::course::CourseStore;
    use crate::overrides::OverrideStore;
    use crate::position_store::PositionStore;
    use crate::registry::Registry;
    use axum::http::HeaderValue;
    use clap::Parser;
    use std::sync::Arc;
    use tempfile::tempdir;

    async fn test_state(dir: &std::path::Path) -> AppState {
        let config = Arc::new(Config::parse_from([
            "bin",
            "--log-dir",
            dir.to_str().unwrap(),
            "--events-file",
            dir.join("events.json").to_str().unwrap(),
            "--manager-password",
            "mgr-secret",
        ]));
        let registry = Registry::load(config.events_file_path(), config.manager_password.clone()).await.unwrap();
        AppState {
            config,
            registry,
            positions: PositionStore::new(false, true, true),
            overrides: OverrideStore::new(),
            course: CourseStore::new(),
        }
    }

    #[tokio::test]
    async fn wrong_admin_password_is_rejected() {
        let dir = tempdir().unwrap();
        let state = test_state(dir.path()).await;
        let event = state.registry.create_event("E".into(), String::new(), "admin1".into(), String::new(), None, true).await;

        let mut headers = HeaderMap::new();
        headers.insert("x-admin-password", HeaderValue::from_static("nope"));
        let err = require_admin(&state, &headers, event.eid).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn deleting_event_purges_all_components() {
        let dir = tempdir().unwrap();
        let state = test_state(dir.path()).await;
        let event = state.registry.create_event("E".into(), String::new(), "admin1".into(), String::new(), None, true).await;

        let mut headers = HeaderMap::new();
        headers.insert("x-manager-password", HeaderValue::from_static("mgr-secret"));
        manager_delete_event(State(state.clone()), AxumPath(event.eid), headers).await.unwrap();

        assert!(state.registry.lookup(event.eid).await.is_none());
    }
}
