use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::body::{self, Body};
use axum::extract::connect_info::ConnectInfo;
use axum::http::{HeaderValue, Request, StatusCode};
use axum::response::Response;
use clap::Parser;
use serde_json::{json, Value};
use tempfile::tempdir;
use tower::util::ServiceExt;

use regatta_tracker::config::Config;
use regatta_tracker::course::CourseStore;
use regatta_tracker::create_router;
use regatta_tracker::overrides::OverrideStore;
use regatta_tracker::position_store::PositionStore;
use regatta_tracker::registry::Registry;
use regatta_tracker::app::AppState;

fn peer() -> SocketAddr {
    "127.0.0.1:12345".parse().unwrap()
}

async fn build_state(dir: &std::path::Path) -> AppState {
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

fn tracker_request(uri: &str, body: Value) -> Request<Body> {
    let mut req = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    req.extensions_mut().insert(ConnectInfo(peer()));
    req
}

async fn json_body(resp: Response) -> Value {
    let bytes = body::to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn happy_path_open_event_round_trip() -> Result<()> {
    let dir = tempdir()?;
    let state = build_state(dir.path()).await;
    let event = state.registry.create_event("Nationals".into(), String::new(), "admin1".into(), String::new(), None, true).await;
    let app = create_router(state);

    let req = tracker_request(
        "/api/tracker",
        json!({"id":"S07","eid":event.eid,"sq":1,"ts":1732615200,"lat":-36.8485,"lon":174.7633,"spd":12.5,"hdg":275,"bat":85}),
    );
    let resp = app.oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let ack = json_body(resp).await;
    assert_eq!(ack["ack"], 1);
    assert!(ack.get("error").is_none());
    Ok(())
}

#[tokio::test]
async fn wrong_password_six_times_then_rate_limited() -> Result<()> {
    let dir = tempdir()?;
    let state = build_state(dir.path()).await;
    let event = state.registry.create_event("Worlds".into(), String::new(), "admin1".into(), "secret".into(), None, true).await;
    let app = create_router(state);

    for i in 0..5 {
        let req = tracker_request("/api/tracker", json!({"id":"S1","eid":event.eid,"sq":i+1,"ts":1,"lat":1,"lon":1,"pwd":"wrong"}));
        let resp = app.clone().oneshot(req).await?;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await["error"], "auth");
    }

    let req = tracker_request("/api/tracker", json!({"id":"S1","eid":event.eid,"sq":6,"ts":1,"lat":1,"lon":1,"pwd":"wrong"}));
    let resp = app.oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json_body(resp).await["error"], "rate_limited");
    Ok(())
}

#[tokio::test]
async fn pos_batch_logs_every_point_and_keeps_last_as_current() -> Result<()> {
    let dir = tempdir()?;
    let state = build_state(dir.path()).await;
    let event = state.registry.create_event("Batch".into(), String::new(), "admin1".into(), String::new(), None, true).await;
    let positions = state.positions.clone();
    let event_dir = state.config.event_dir(event.eid);
    let app = create_router(state);

    let req = tracker_request(
        "/api/tracker",
        json!({"id":"B1","eid":event.eid,"sq":1,"ts":1732615202,"pos":[[1732615200,-36.8,174.7],[1732615201,-36.81,174.71],[1732615202,-36.82,174.72]],"bat":50,"hdg":10}),
    );
    let resp = app.oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::OK);

    let snapshot = positions.snapshot(event.eid, &event_dir).await;
    assert_eq!(snapshot.len(), 1);
    assert_eq!((snapshot[0].lat, snapshot[0].lon), (-36.82, 174.72));
    Ok(())
}

#[tokio::test]
async fn assist_disabled_event_forces_ast_false_in_ack_and_snapshot() -> Result<()> {
    let dir = tempdir()?;
    let state = build_state(dir.path()).await;
    let event = state.registry.create_event("Club Race".into(), String::new(), "admin1".into(), String::new(), None, false).await;
    let positions = state.positions.clone();
    let event_dir = state.config.event_dir(event.eid);
    let app = create_router(state);

    let req = tracker_request("/api/tracker", json!({"id":"S1","eid":event.eid,"sq":1,"ts":1,"lat":1,"lon":1,"ast":true}));
    let resp = app.oneshot(req).await?;
    let ack = json_body(resp).await;
    assert_eq!(ack["assist"], false);

    let snapshot = positions.snapshot(event.eid, &event_dir).await;
    assert!(!snapshot[0].ast);
    Ok(())
}

#[tokio::test]
async fn admin_clear_tracks_empties_the_snapshot() -> Result<()> {
    let dir = tempdir()?;
    let state = build_state(dir.path()).await;
    let event = state.registry.create_event("Clearable".into(), String::new(), "admin1".into(), String::new(), None, true).await;
    let positions = state.positions.clone();
    let event_dir = state.config.event_dir(event.eid);
    let app = create_router(state);

    let req = tracker_request("/api/tracker", json!({"id":"S1","eid":event.eid,"sq":1,"ts":1,"lat":1,"lon":1}));
    app.clone().oneshot(req).await?;
    assert_eq!(positions.snapshot(event.eid, &event_dir).await.len(), 1);

    let mut clear_req = Request::builder()
        .method("POST")
        .uri(format!("/api/admin/clear-tracks?eid={}", event.eid))
        .header("x-admin-password", HeaderValue::from_static("admin1"))
        .body(Body::empty())?;
    clear_req.extensions_mut().insert(ConnectInfo(peer()));
    let resp = app.oneshot(clear_req).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(positions.snapshot(event.eid, &event_dir).await.len(), 0);
    Ok(())
}

#[tokio::test]
async fn deleting_an_event_never_reuses_its_eid() -> Result<()> {
    let dir = tempdir()?;
    let state = build_state(dir.path()).await;
    let registry = state.registry.clone();
    let first = registry.create_event("A".into(), String::new(), "admin1".into(), String::new(), None, false).await;
    let app = create_router(state);

    let mut delete_req = Request::builder()
        .method("DELETE")
        .uri(format!("/api/manager/events/{}", first.eid))
        .header("x-manager-password", HeaderValue::from_static("mgr-secret"))
        .body(Body::empty())?;
    delete_req.extensions_mut().insert(ConnectInfo(peer()));
    let resp = app.oneshot(delete_req).await?;
    assert_eq!(resp.status(), StatusCode::OK);

    let second = registry.create_event("B".into(), String::new(), "admin1".into(), String::new(), None, false).await;
    assert!(second.eid > first.eid);
    assert!(registry.lookup(first.eid).await.is_none());
    Ok(())
}
