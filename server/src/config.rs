//! Command-line configuration.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "miniflightradar",
    about = "Track live flights: OpenSky ingest, TTL position store, WebSocket diff streaming"
)]
pub struct Config {
    /// Address to listen on, e.g. ':8080' or '127.0.0.1:8080'.
    #[arg(long, short = 'l', default_value = ":8080")]
    pub listen: String,

    /// Proxy URL override for upstream requests (http/https/socks5).
    /// When empty, standard environment proxies apply.
    #[arg(long, short = 'x')]
    pub proxy: Option<String>,

    /// OpenTelemetry collector endpoint for frontend trace proxying
    /// ('host:port' or a full URL).
    #[arg(long, short = 't')]
    pub tracing: Option<String>,

    /// Path to the position database file (created if missing).
    #[arg(long, default_value = "./data/flight.db")]
    pub db: PathBuf,

    /// Polling interval for the upstream states feed, in seconds.
    #[arg(long, short = 'i', default_value_t = 60)]
    pub interval: u64,

    /// Retention period for flight history, in hours.
    #[arg(long, short = 'r', default_value_t = 168)]
    pub retention: u64,

    /// OpenSky API username for Basic Auth (optional, improves quota).
    #[arg(long, env = "OPENSKY_USER")]
    pub opensky_user: Option<String>,

    /// OpenSky API password for Basic Auth (optional).
    #[arg(long, env = "OPENSKY_PASS", hide_env_values = true)]
    pub opensky_pass: Option<String>,

    /// Session-signing secret (HS256). When empty, loaded from or
    /// generated into --jwt-file.
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,

    /// Path of the file holding the session-signing secret.
    #[arg(long, default_value = "./data/jwt.secret")]
    pub jwt_file: PathBuf,

    /// Enable debug logging.
    #[arg(long, short = 'd')]
    pub debug: bool,
}

impl Config {
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }

    #[must_use]
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention * 3600)
    }

    /// Bind address; a bare `:port` binds all interfaces.
    #[must_use]
    pub fn listen_addr(&self) -> String {
        if self.listen.starts_with(':') {
            format!("0.0.0.0{}", self.listen)
        } else {
            self.listen.clone()
        }
    }

    /// Upstream Basic-Auth credentials when both halves are set.
    #[must_use]
    pub fn opensky_credentials(&self) -> Option<(String, String)> {
        match (&self.opensky_user, &self.opensky_pass) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => {
                Some((user.clone(), pass.clone()))
            }
            _ => None,
        }
    }
}
