//! Shared types used across vigil crates.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Which probe family checks a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Http,
    Tcp,
    Ping,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Http => "http",
            TargetKind::Tcp => "tcp",
            TargetKind::Ping => "ping",
        }
    }

    /// Group used when the target list has no section header.
    pub fn default_group(&self) -> &'static str {
        match self {
            TargetKind::Http | TargetKind::Tcp => "devices",
            TargetKind::Ping => "servers",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized probe address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Endpoint {
    /// http://host[:port]/path or https://...
    Http { url: String },
    /// tcp://host:port
    Tcp { host: String, port: u16 },
    /// ping://host
    Ping { host: String },
}

impl Endpoint {
    pub fn kind(&self) -> TargetKind {
        match self {
            Endpoint::Http { .. } => TargetKind::Http,
            Endpoint::Tcp { .. } => TargetKind::Tcp,
            Endpoint::Ping { .. } => TargetKind::Ping,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Http { url } => f.write_str(url),
            Endpoint::Tcp { host, port } => write!(f, "tcp://{host}:{port}"),
            Endpoint::Ping { host } => write!(f, "ping://{host}"),
        }
    }
}

/// A monitored target. Immutable for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Unique key; per-target health state is stored under this name.
    pub name: String,
    /// Display group ("devices", "servers", or a section header).
    pub group: String,
    pub endpoint: Endpoint,
}

impl Target {
    pub fn new(name: impl Into<String>, endpoint: Endpoint) -> Self {
        let group = endpoint.kind().default_group().to_string();
        Self {
            name: name.into(),
            group,
            endpoint,
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn kind(&self) -> TargetKind {
        self.endpoint.kind()
    }
}

/// Per-kind probe time limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeTimeouts {
    pub http: Duration,
    pub tcp: Duration,
    pub ping: Duration,
    /// Extra time a probe gets past its own timeout before it is abandoned
    /// (and, for the ping helper, killed).
    pub kill_grace: Duration,
    /// Skip TLS certificate verification for https:// targets.
    pub accept_invalid_certs: bool,
}

impl ProbeTimeouts {
    pub fn for_kind(&self, kind: TargetKind) -> Duration {
        match kind {
            TargetKind::Http => self.http,
            TargetKind::Tcp => self.tcp,
            TargetKind::Ping => self.ping,
        }
    }

    /// Hard ceiling for one probe of `kind`.
    pub fn deadline(&self, kind: TargetKind) -> Duration {
        self.for_kind(kind) + self.kill_grace
    }
}

impl Default for ProbeTimeouts {
    fn default() -> Self {
        Self {
            http: Duration::from_secs(5),
            tcp: Duration::from_secs(5),
            ping: Duration::from_secs(3),
            kill_grace: Duration::from_secs(2),
            accept_invalid_certs: false,
        }
    }
}

/// Debounce, cooldown, storm, suppression and rate-limit parameters.
///
/// All time spans are whole seconds; the engine works on epoch seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertPolicy {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub cooldown_secs: u64,
    pub recovery_notify: bool,
    pub agg_window_secs: u64,
    pub storm_threshold: u32,
    pub storm_suppress_secs: u64,
    pub global_suppress_secs: u64,
    pub max_alerts_per_window: u32,
    pub rate_window_secs: u64,
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            success_threshold: 2,
            cooldown_secs: 600,
            recovery_notify: true,
            agg_window_secs: 60,
            storm_threshold: 6,
            storm_suppress_secs: 900,
            global_suppress_secs: 600,
            max_alerts_per_window: 10,
            rate_window_secs: 60,
        }
    }
}

/// Where notifications go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifySettings {
    Telegram { bot_token: String, chat_id: String },
    Webhook { url: String },
    Log,
}

/// Notifier kind as written in `vigil.toml`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifierKind {
    Telegram,
    Webhook,
    Log,
}
