//! Ingest Dispatcher: a single `handle_incoming` core reached by
//! both the UDP datagram loop and the HTTP tracker endpoints, and the UDP
//! receive loop + bounded worker pool itself.
//!
//! The worker-pool shape — a receive loop that never blocks on anything but
//! `recv_from`, handing parsed work off to a bounded channel — is lifted
//! straight off a classic UDP fan-out shape: one socket, several worker tasks,
//! no shared state on the hot path beyond the channel handoff.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::ack::Ack;
use crate::app::{now_unix, AppState};
use crate::error::ErrorKind;
use crate::registry::AuthOutcome;
use crate::validator::{validate_packet, MAX_PACKET_BYTES};

/// Outcome of processing one datagram/request body, paired with the HTTP
/// status a caller over HTTP should use (the UDP path ignores the status).
pub struct IngestResult {
    pub status: StatusCode,
    pub body: Option<Ack>,
}

/// The one processing path both transports converge on.
pub async fn handle_incoming(state: &AppState, raw: &[u8], source: IpAddr) -> IngestResult {
    let server_ts = now_unix();

    if raw.len() > MAX_PACKET_BYTES {
        return IngestResult { status: StatusCode::PAYLOAD_TOO_LARGE, body: None };
    }

    if serde_json::from_slice::<serde_json::Value>(raw).is_err() {
        return IngestResult { status: StatusCode::UNAUTHORIZED, body: None };
    }

    let packet = match validate_packet(raw) {
        Ok(p) => p,
        Err(ErrorKind::PayloadTooLarge) => {
            return IngestResult { status: StatusCode::PAYLOAD_TOO_LARGE, body: None }
        }
        Err(_) => return IngestResult { status: StatusCode::BAD_REQUEST, body: None },
    };

    let event = match state.registry.lookup(packet.eid).await {
        Some(e) => e,
        None => {
            let ack = Ack::failure(packet.sq, server_ts, None, ErrorKind::UnknownEvent, "unknown event");
            return IngestResult { status: StatusCode::OK, body: Some(ack) };
        }
    };

    match state.registry.authenticate_tracker(packet.eid, packet.pwd.as_deref(), source).await {
        AuthOutcome::RateLimited => {
            let ack = Ack::failure(packet.sq, server_ts, Some(event.name.clone()), ErrorKind::RateLimited, "too many failed attempts, try again later");
            return IngestResult { status: StatusCode::TOO_MANY_REQUESTS, body: Some(ack) };
        }
        AuthOutcome::Fail => {
            let ack = Ack::failure(packet.sq, server_ts, Some(event.name.clone()), ErrorKind::Auth, "invalid tracker password");
            return IngestResult { status: StatusCode::OK, body: Some(ack) };
        }
        AuthOutcome::UnknownEvent => {
            let ack = Ack::failure(packet.sq, server_ts, None, ErrorKind::UnknownEvent, "unknown event");
            return IngestResult { status: StatusCode::OK, body: Some(ack) };
        }
        AuthOutcome::Ok => {}
    }

    let assist_enabled = event.assist_enabled;

    if packet.auth_check {
        let ack = Ack::success(packet.sq, server_ts, Some(event.name.clone()), !assist_enabled);
        return IngestResult { status: StatusCode::OK, body: Some(ack) };
    }

    if event.archived {
        let ack = Ack::failure(packet.sq, server_ts, Some(event.name.clone()), ErrorKind::ArchivedEvent, "event is archived");
        return IngestResult { status: StatusCode::OK, body: Some(ack) };
    }

    let dir = state.config.event_dir(packet.eid);
    let (display_name, role) = state.overrides.resolve(packet.eid, &dir, &packet.id, packet.role).await;

    let sq = packet.sq;
    if let Err(e) = state.positions.accept(packet.eid, &dir, packet, server_ts, display_name, role, assist_enabled).await {
        warn!("position store accept failed for event {}: {e}", event.eid);
    }

    let ack = Ack::success(sq, server_ts, Some(event.name.clone()), !assist_enabled);
    IngestResult { status: StatusCode::OK, body: Some(ack) }
}

// ─── HTTP handlers ────────────────────────────────────────────────────────────

pub async fn post_tracker(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    body: axum::body::Bytes,
) -> (StatusCode, axum::Json<serde_json::Value>) {
    let result = handle_incoming(&state, &body, addr.ip()).await;
    match result.body {
        Some(ack) => (result.status, axum::Json(ack.to_json())),
        None => {
            let kind = match result.status {
                StatusCode::PAYLOAD_TOO_LARGE => "payload_too_large",
                _ => "malformed",
            };
            (result.status, axum::Json(serde_json::json!({ "error": kind })))
        }
    }
}

// ─── UDP dispatcher ───────────────────────────────────────────────────────────

struct Job {
    data: Vec<u8>,
    source: SocketAddr,
}

/// Bind the UDP socket and run the receive loop + bounded worker pool
/// below. A bind failure is logged and the task returns
/// — UDP ingest is simply unavailable, matching `--no-http`-style partial
/// configurations being valid (the symmetric case here is "no UDP").
pub async fn run_udp_dispatcher(state: AppState, port: u16, workers: usize) {
    let addr = format!("0.0.0.0:{port}");
    let socket = match UdpSocket::bind(&addr).await {
        Ok(s) => Arc::new(s),
        Err(e) => {
            warn!("UDP ingest: could not bind {addr}: {e}");
            return;
        }
    };
    info!("UDP ingest listening on {addr}");

    let workers = workers.max(1);
    let mut senders = Vec::with_capacity(workers);
    for worker_id in 0..workers {
        let (tx, rx) = mpsc::channel::<Job>(256);
        senders.push(tx);
        tokio::spawn(run_worker(worker_id, rx, state.clone(), socket.clone()));
    }

    let mut buf = vec![0u8; MAX_PACKET_BYTES + 1];
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, source)) => {
                let data = buf[..len].to_vec();
                let idx = worker_index_for(&data, workers);
                match senders[idx].try_send(Job { data, source }) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!("UDP ingest: worker {idx} queue full, dropping datagram from {source}");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        warn!("UDP ingest: worker {idx} channel closed");
                    }
                }
            }
            Err(e) => warn!("UDP ingest: recv error: {e}"),
        }
    }
}

/// Hash the packet's tracker `id` (if extractable) to a worker index, giving
/// per-id ordering without a global lock on the dispatch path.
fn worker_index_for(data: &[u8], workers: usize) -> usize {
    let key: String = serde_json::from_slice::<serde_json::Value>(data)
        .ok()
        .and_then(|v| v.get("id").and_then(|id| id.as_str()).map(str::to_string))
        .unwrap_or_default();

    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() as usize) % workers
}

async fn run_worker(worker_id: usize, mut rx: mpsc::Receiver<Job>, state: AppState, socket: Arc<UdpSocket>) {
    debug!("UDP ingest worker {worker_id} started");
    while let Some(job) = rx.recv().await {
        let result = handle_incoming(&state, &job.data, job.source.ip()).await;
        if let Some(ack) = result.body {
            if let Err(e) = socket.send_to(&ack.to_bytes(), job.source).await {
                warn!("UDP ingest: failed to send ACK to {}: {e}", job.source);
            }
        }
        // Malformed/unparseable/oversized datagrams are silently dropped on UDP — there is no transport-level way to carry an error status back.
    }
}
