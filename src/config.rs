//! CLI flags. A single `Config` is parsed once in `main` and handed
//! down as an `Arc<Config>` to every component that needs it.

use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser, Clone)]
#[command(name = "regatta-tracker", about = "Multi-event GPS tracking server for watersports races")]
pub struct Config {
    /// UDP port (also the HTTP port unless --http-port is given)
    #[arg(long, default_value_t = 41234)]
    pub port: u16,

    /// HTTP port, defaults to --port
    #[arg(long)]
    pub http_port: Option<u16>,

    /// Directory served as the web root's sibling data directory
    #[arg(long, default_value = "html")]
    pub static_dir: PathBuf,

    /// Single-event mode admin password
    #[arg(long)]
    pub admin_password: Option<String>,

    /// Multi-event mode manager password (required if --events-file is set)
    #[arg(long)]
    pub manager_password: Option<String>,

    /// Path to events.json; presence enables multi-event mode
    #[arg(long)]
    pub events_file: Option<PathBuf>,

    /// Root directory for daily track logs and per-event state
    #[arg(long, default_value = ".")]
    pub log_dir: PathBuf,

    #[arg(long, default_value_t = false)]
    pub no_http: bool,

    #[arg(long, default_value_t = false)]
    pub no_track_logs: bool,

    #[arg(long, default_value_t = false)]
    pub no_current: bool,

    /// Process-wide default OwnTracks tracker password
    #[arg(long)]
    pub owntracks_password: Option<String>,

    /// Number of UDP ingest workers
    #[arg(long, default_value_t = 8)]
    pub workers: usize,

    /// Fsync the daily log after every append (default: buffered, OS decides when to flush)
    #[arg(long, default_value_t = false)]
    pub fsync_track_log: bool,

    /// eid tracker packets are routed to when posted via OwnTracks without `?eid=`
    #[arg(long, default_value_t = 0)]
    pub owntracks_default_eid: u64,
}

impl Config {
    pub fn http_port(&self) -> u16 {
        self.http_port.unwrap_or(self.port)
    }

    pub fn multi_event(&self) -> bool {
        self.events_file.is_some()
    }

    pub fn events_file_path(&self) -> PathBuf {
        self.events_file
            .clone()
            .unwrap_or_else(|| self.log_dir.join("events.json"))
    }

    /// Root directory for one event's on-disk subtree. Single-event mode
    /// maps onto a synthetic `eid = 0` whose
    /// layout omits the `<eid>` path segment.
    pub fn event_dir(&self, eid: u64) -> PathBuf {
        if self.multi_event() {
            self.log_dir.join(&self.static_dir).join(eid.to_string())
        } else {
            self.log_dir.join(&self.static_dir)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_port_defaults_to_udp_port() {
        let cfg = Config::parse_from(["bin", "--port", "9000"]);
        assert_eq!(cfg.http_port(), 9000);
    }

    #[test]
    fn http_port_override() {
        let cfg = Config::parse_from(["bin", "--port", "9000", "--http-port", "9001"]);
        assert_eq!(cfg.http_port(), 9001);
    }

    #[test]
    fn single_event_dir_omits_eid_segment() {
        let cfg = Config::parse_from(["bin", "--log-dir", "/tmp/root"]);
        assert_eq!(cfg.event_dir(0), std::path::PathBuf::from("/tmp/root/html"));
    }

    #[test]
    fn multi_event_dir_includes_eid_segment() {
        let cfg = Config::parse_from(["bin", "--log-dir", "/tmp/root", "--events-file", "/tmp/root/events.json"]);
        assert_eq!(cfg.event_dir(3), std::path::PathBuf::from("/tmp/root/html/3"));
    }
}
