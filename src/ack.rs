//! ACK composition: the one reply shape both the UDP and
//! HTTP ingest paths emit.

use serde::Serialize;
use serde_json::{json, Value};

use crate::error::ErrorKind;

#[derive(Debug, Clone, Serialize)]
pub struct Ack {
    pub ack: i64,
    pub ts: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assist: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

impl Ack {
    pub fn success(sq: i64, server_ts: i64, event_name: Option<String>, assist_disabled: bool) -> Self {
        Self {
            ack: sq,
            ts: server_ts,
            event: event_name,
            assist: assist_disabled.then_some(false),
            error: None,
            msg: None,
        }
    }

    pub fn failure(sq: i64, server_ts: i64, event_name: Option<String>, kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self {
            ack: sq,
            ts: server_ts,
            event: event_name,
            assist: None,
            error: Some(kind),
            msg: Some(msg.into()),
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| json!({"ack": self.ack, "ts": self.ts}))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_omits_assist_when_enabled() {
        let ack = Ack::success(1, 100, Some("Regatta".into()), false);
        let v = ack.to_json();
        assert!(v.get("assist").is_none());
        assert_eq!(v["event"], "Regatta");
    }

    #[test]
    fn success_carries_assist_false_when_disabled() {
        let ack = Ack::success(1, 100, Some("Regatta".into()), true);
        let v = ack.to_json();
        assert_eq!(v["assist"], false);
    }

    #[test]
    fn failure_carries_error_and_msg() {
        let ack = Ack::failure(5, 100, None, ErrorKind::Auth, "bad password");
        let v = ack.to_json();
        assert_eq!(v["error"], "auth");
        assert_eq!(v["msg"], "bad password");
    }
}
