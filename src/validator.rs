//! Packet Validator: a pure function from raw bytes to a
//! normalized `Packet`, or a rejection reason. Stateless — no locks, no I/O.

use crate::error::ErrorKind;
use crate::model::{Packet, RawPacket, Role, TrackPoint};

pub const MAX_PACKET_BYTES: usize = 64 * 1024;

pub fn validate_packet(raw_bytes: &[u8]) -> Result<Packet, ErrorKind> {
    if raw_bytes.len() > MAX_PACKET_BYTES {
        return Err(ErrorKind::PayloadTooLarge);
    }

    let raw: RawPacket = serde_json::from_slice(raw_bytes).map_err(|_| ErrorKind::Malformed)?;
    validate(raw)
}

fn validate(raw: RawPacket) -> Result<Packet, ErrorKind> {
    let id = raw.id.ok_or(ErrorKind::Malformed)?;
    if id.is_empty() || id.len() > 32 || !id.chars().all(|c| c.is_ascii_graphic() || c == ' ') {
        return Err(ErrorKind::Malformed);
    }

    let eid = raw.eid.ok_or(ErrorKind::Malformed)?;
    let sq = raw.sq.filter(|sq| *sq > 0).ok_or(ErrorKind::Malformed)?;
    let ts = raw.ts.ok_or(ErrorKind::Malformed)?;

    let points = normalize_points(&raw)?;

    let (lat, lon) = if raw.auth_check {
        points.last().map(|p| (p.lat, p.lon)).unwrap_or((0.0, 0.0))
    } else {
        let last = points.last().ok_or(ErrorKind::Malformed)?;
        (last.lat, last.lon)
    };

    let bat = clamp_battery(raw.bat.unwrap_or(-1));
    let hdg = clamp_heading(raw.hdg.unwrap_or(0.0));
    let spd = raw.spd.filter(|s| *s >= 0.0).unwrap_or(0.0);
    let role = Role::from_wire(raw.role.as_deref());

    Ok(Packet {
        id,
        eid,
        sq,
        ts,
        points,
        lat,
        lon,
        spd,
        hdg,
        ast: raw.ast.unwrap_or(false),
        bat,
        role,
        ver: raw.ver,
        sig: raw.sig,
        pwd: raw.pwd,
        os: raw.os,
        stopped: raw.stopped.unwrap_or(false),
        auth_check: raw.auth_check,
    })
}

/// Derive the list of track points to log, and the effective lat/lon, from
/// either the `pos` batch array or a single `lat`/`lon` pair.
/// Exactly one of the two representations must be present unless this is an
/// `auth_check` packet, which may omit both.
fn normalize_points(raw: &RawPacket) -> Result<Vec<TrackPoint>, ErrorKind> {
    let has_latlon = raw.lat.is_some() && raw.lon.is_some();
    let has_pos = raw.pos.is_some();

    if has_latlon && has_pos {
        return Err(ErrorKind::Malformed);
    }

    if let Some(pos) = &raw.pos {
        if pos.is_empty() {
            return Err(ErrorKind::Malformed);
        }
        let mut points = Vec::with_capacity(pos.len());
        for entry in pos {
            let point = match entry.as_slice() {
                [ts, lat, lon] => TrackPoint { ts: *ts as i64, lat: *lat, lon: *lon, spd: None },
                [ts, lat, lon, spd] => TrackPoint { ts: *ts as i64, lat: *lat, lon: *lon, spd: Some(*spd) },
                _ => return Err(ErrorKind::Malformed),
            };
            validate_latlon(point.lat, point.lon)?;
            points.push(point);
        }
        return Ok(points);
    }

    if has_latlon {
        let lat = raw.lat.unwrap();
        let lon = raw.lon.unwrap();
        validate_latlon(lat, lon)?;
        return Ok(vec![TrackPoint { ts: raw.ts.unwrap_or(0), lat, lon, spd: raw.spd }]);
    }

    if raw.auth_check {
        return Ok(Vec::new());
    }

    Err(ErrorKind::Malformed)
}

fn validate_latlon(lat: f64, lon: f64) -> Result<(), ErrorKind> {
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(ErrorKind::Malformed);
    }
    Ok(())
}

fn clamp_battery(bat: i64) -> i64 {
    if bat == -1 {
        -1
    } else {
        bat.clamp(0, 100)
    }
}

fn clamp_heading(hdg: f64) -> f64 {
    let m = hdg.rem_euclid(360.0);
    if m < 0.0 {
        m + 360.0
    } else {
        m
    }
}
