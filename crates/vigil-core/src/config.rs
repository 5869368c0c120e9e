//! vigil.toml configuration parser.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::target::parse_target_list;
use crate::types::*;

/// Environment fallbacks for Telegram credentials.
pub const BOT_TOKEN_ENV: &str = "TELEGRAM_BOT_TOKEN";
pub const CHAT_ID_ENV: &str = "TELEGRAM_CHAT_ID";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VigilConfig {
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub alerting: AlertingConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub targets: Vec<TargetEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub targets_file: Option<PathBuf>,
    pub interval: Option<String>,
    pub max_workers: Option<usize>,
    pub reference_host: Option<String>,
    pub state_path: Option<PathBuf>,
    pub startup_summary: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeoutConfig {
    pub http: Option<String>,
    pub tcp: Option<String>,
    pub ping: Option<String>,
    pub kill_grace: Option<String>,
    pub accept_invalid_certs: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertingConfig {
    pub failure_threshold: Option<u32>,
    pub success_threshold: Option<u32>,
    pub cooldown: Option<String>,
    pub recovery_notify: Option<bool>,
    pub agg_window: Option<String>,
    pub storm_threshold: Option<u32>,
    pub storm_suppress: Option<String>,
    pub global_suppress: Option<String>,
    pub max_alerts_per_window: Option<u32>,
    pub rate_window: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifyConfig {
    pub kind: Option<NotifierKind>,
    pub chat_id: Option<String>,
    pub bot_token: Option<String>,
    pub url: Option<String>,
    pub dry_run: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetEntry {
    pub name: String,
    pub endpoint: String,
    pub group: Option<String>,
}

/// Validated settings with every default applied.
#[derive(Debug, Clone)]
pub struct Settings {
    pub targets: Vec<Target>,
    pub interval: Duration,
    pub max_workers: usize,
    /// Reference host for the global outage probe, if configured.
    pub reference: Option<Target>,
    pub state_path: PathBuf,
    pub startup_summary: bool,
    pub timeouts: ProbeTimeouts,
    pub policy: AlertPolicy,
    pub notify: NotifySettings,
    pub dry_run: bool,
}

impl VigilConfig {
    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Resolve into [`Settings`]. Relative paths are taken from `base_dir`.
    pub fn resolve(&self, base_dir: &Path) -> ConfigResult<Settings> {
        let mut targets = match &self.monitor.targets_file {
            Some(file) => {
                let path = base_dir.join(file);
                let text = std::fs::read_to_string(&path)
                    .map_err(|source| ConfigError::Read { path, source })?;
                parse_target_list(&text)?
            }
            None => Vec::new(),
        };

        for entry in &self.targets {
            let endpoint =
                Endpoint::parse(&entry.endpoint).map_err(|source| ConfigError::TargetEndpoint {
                    name: entry.name.clone(),
                    source,
                })?;
            let mut target = Target::new(entry.name.trim(), endpoint);
            if let Some(group) = &entry.group {
                target = target.with_group(group.clone());
            }
            targets.push(target);
        }

        if targets.is_empty() {
            return Err(ConfigError::NoTargets);
        }
        ensure_unique_names(&targets)?;

        let reference = self
            .monitor
            .reference_host
            .as_deref()
            .map(|raw| {
                Endpoint::parse(raw)
                    .map(|endpoint| Target::new("reference", endpoint))
                    .map_err(ConfigError::Reference)
            })
            .transpose()?;

        let max_workers = self.monitor.max_workers.unwrap_or(16);
        if max_workers == 0 {
            return Err(ConfigError::Zero("monitor.max_workers"));
        }
        let interval = duration_field("monitor.interval", &self.monitor.interval, 60)?;
        if interval.is_zero() {
            return Err(ConfigError::Zero("monitor.interval"));
        }

        let defaults = ProbeTimeouts::default();
        let t = &self.timeouts;
        let timeouts = ProbeTimeouts {
            http: duration_or("timeouts.http", &t.http, defaults.http)?,
            tcp: duration_or("timeouts.tcp", &t.tcp, defaults.tcp)?,
            ping: duration_or("timeouts.ping", &t.ping, defaults.ping)?,
            kill_grace: duration_or("timeouts.kill_grace", &t.kill_grace, defaults.kill_grace)?,
            accept_invalid_certs: t.accept_invalid_certs.unwrap_or(false),
        };

        let policy = self.alerting.resolve()?;
        let notify = self.notify.resolve()?;

        let settings = Settings {
            targets,
            interval,
            max_workers,
            reference,
            state_path: base_dir.join(
                self.monitor
                    .state_path
                    .clone()
                    .unwrap_or_else(|| PathBuf::from("vigil-state.redb")),
            ),
            startup_summary: self.monitor.startup_summary.unwrap_or(true),
            timeouts,
            policy,
            notify,
            dry_run: self.notify.dry_run.unwrap_or(false),
        };
        debug!(
            targets = settings.targets.len(),
            interval_secs = settings.interval.as_secs(),
            "configuration resolved"
        );
        Ok(settings)
    }
}

impl AlertingConfig {
    fn resolve(&self) -> ConfigResult<AlertPolicy> {
        let d = AlertPolicy::default();
        let policy = AlertPolicy {
            failure_threshold: self.failure_threshold.unwrap_or(d.failure_threshold),
            success_threshold: self.success_threshold.unwrap_or(d.success_threshold),
            cooldown_secs: secs_field("alerting.cooldown", &self.cooldown, d.cooldown_secs)?,
            recovery_notify: self.recovery_notify.unwrap_or(d.recovery_notify),
            agg_window_secs: secs_field("alerting.agg_window", &self.agg_window, d.agg_window_secs)?,
            storm_threshold: self.storm_threshold.unwrap_or(d.storm_threshold),
            storm_suppress_secs: secs_field(
                "alerting.storm_suppress",
                &self.storm_suppress,
                d.storm_suppress_secs,
            )?,
            global_suppress_secs: secs_field(
                "alerting.global_suppress",
                &self.global_suppress,
                d.global_suppress_secs,
            )?,
            max_alerts_per_window: self
                .max_alerts_per_window
                .unwrap_or(d.max_alerts_per_window),
            rate_window_secs: secs_field(
                "alerting.rate_window",
                &self.rate_window,
                d.rate_window_secs,
            )?,
        };

        for (field, value) in [
            ("alerting.failure_threshold", policy.failure_threshold),
            ("alerting.success_threshold", policy.success_threshold),
            ("alerting.storm_threshold", policy.storm_threshold),
            ("alerting.max_alerts_per_window", policy.max_alerts_per_window),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero(field));
            }
        }
        if policy.rate_window_secs == 0 {
            return Err(ConfigError::Zero("alerting.rate_window"));
        }
        Ok(policy)
    }
}

impl NotifyConfig {
    fn resolve(&self) -> ConfigResult<NotifySettings> {
        match self.kind.unwrap_or(NotifierKind::Telegram) {
            NotifierKind::Telegram => {
                let bot_token = self
                    .bot_token
                    .clone()
                    .or_else(|| std::env::var(BOT_TOKEN_ENV).ok())
                    .filter(|s| !s.is_empty())
                    .ok_or(ConfigError::Missing("notify.bot_token"))?;
                let chat_id = self
                    .chat_id
                    .clone()
                    .or_else(|| std::env::var(CHAT_ID_ENV).ok())
                    .filter(|s| !s.is_empty())
                    .ok_or(ConfigError::Missing("notify.chat_id"))?;
                Ok(NotifySettings::Telegram { bot_token, chat_id })
            }
            NotifierKind::Webhook => {
                let url = self
                    .url
                    .clone()
                    .filter(|s| !s.is_empty())
                    .ok_or(ConfigError::Missing("notify.url"))?;
                Ok(NotifySettings::Webhook { url })
            }
            NotifierKind::Log => Ok(NotifySettings::Log),
        }
    }
}

impl Settings {
    /// Load `vigil.toml` and resolve it relative to its own directory.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let config = VigilConfig::from_file(path)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.resolve(base)
    }
}

fn ensure_unique_names(targets: &[Target]) -> ConfigResult<()> {
    let mut seen = HashSet::new();
    for t in targets {
        if !seen.insert(t.name.as_str()) {
            return Err(ConfigError::DuplicateTarget(t.name.clone()));
        }
    }
    Ok(())
}

fn duration_or(
    field: &'static str,
    value: &Option<String>,
    default: Duration,
) -> ConfigResult<Duration> {
    match value {
        Some(s) => parse_duration(s).ok_or_else(|| ConfigError::InvalidDuration {
            field,
            value: s.clone(),
        }),
        None => Ok(default),
    }
}

fn duration_field(
    field: &'static str,
    value: &Option<String>,
    default_secs: u64,
) -> ConfigResult<Duration> {
    duration_or(field, value, Duration::from_secs(default_secs))
}

fn secs_field(field: &'static str, value: &Option<String>, default_secs: u64) -> ConfigResult<u64> {
    duration_field(field, value, default_secs).map(|d| d.as_secs())
}

/// Parse a duration string like "5s", "500ms", "2m", "1h". A plain number is seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.trim().parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else if let Some(hours) = s.strip_suffix('h') {
        hours
            .trim()
            .parse::<u64>()
            .ok()
            .map(|h| Duration::from_secs(h * 3600))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_config(extra: &str) -> VigilConfig {
        let toml_str = format!(
            r#"
[notify]
kind = "log"

{extra}
"#
        );
        VigilConfig::from_toml(&toml_str).unwrap()
    }

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration("10"), Some(Duration::from_secs(10)));
        assert_eq!(parse_duration("soon"), None);
    }

    #[test]
    fn resolve_applies_defaults() {
        let config = log_config(
            r#"
[[targets]]
name = "core-switch"
endpoint = "ping://10.0.0.1"
"#,
        );
        let settings = config.resolve(Path::new("/tmp")).unwrap();

        assert_eq!(settings.targets.len(), 1);
        assert_eq!(settings.interval, Duration::from_secs(60));
        assert_eq!(settings.max_workers, 16);
        assert_eq!(settings.policy, AlertPolicy::default());
        assert_eq!(settings.notify, NotifySettings::Log);
        assert!(settings.reference.is_none());
        assert!(settings.startup_summary);
        assert_eq!(settings.state_path, PathBuf::from("/tmp/vigil-state.redb"));
    }

    #[test]
    fn resolve_reads_alerting_section() {
        let config = log_config(
            r#"
[monitor]
interval = "30s"
reference_host = "1.1.1.1"

[alerting]
failure_threshold = 4
cooldown = "5m"
storm_threshold = 3
rate_window = "2m"

[[targets]]
name = "a"
endpoint = "10.0.0.1:22"
group = "lab"
"#,
        );
        let settings = config.resolve(Path::new(".")).unwrap();

        assert_eq!(settings.interval, Duration::from_secs(30));
        assert_eq!(settings.policy.failure_threshold, 4);
        assert_eq!(settings.policy.cooldown_secs, 300);
        assert_eq!(settings.policy.storm_threshold, 3);
        assert_eq!(settings.policy.rate_window_secs, 120);
        assert_eq!(settings.targets[0].group, "lab");
        assert_eq!(
            settings.reference.unwrap().endpoint.to_string(),
            "ping://1.1.1.1"
        );
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let config = log_config(
            r#"
[[targets]]
name = "nvr"
endpoint = "10.0.0.1:554"

[[targets]]
name = "nvr"
endpoint = "10.0.0.2:554"
"#,
        );
        let err = config.resolve(Path::new(".")).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateTarget(name) if name == "nvr"));
    }

    #[test]
    fn empty_target_set_is_rejected() {
        let err = log_config("").resolve(Path::new(".")).unwrap_err();
        assert!(matches!(err, ConfigError::NoTargets));
    }

    #[test]
    fn zero_threshold_is_rejected() {
        let config = log_config(
            r#"
[alerting]
failure_threshold = 0

[[targets]]
name = "a"
endpoint = "10.0.0.1"
"#,
        );
        let err = config.resolve(Path::new(".")).unwrap_err();
        assert!(matches!(err, ConfigError::Zero("alerting.failure_threshold")));
    }

    #[test]
    fn bad_duration_is_reported() {
        let config = log_config(
            r#"
[alerting]
cooldown = "forever"

[[targets]]
name = "a"
endpoint = "10.0.0.1"
"#,
        );
        let err = config.resolve(Path::new(".")).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidDuration { field: "alerting.cooldown", .. }
        ));
    }

    #[test]
    fn webhook_requires_url() {
        let config = VigilConfig::from_toml(
            r#"
[notify]
kind = "webhook"

[[targets]]
name = "a"
endpoint = "10.0.0.1"
"#,
        )
        .unwrap();
        let err = config.resolve(Path::new(".")).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("notify.url")));
    }

    #[test]
    fn targets_file_is_merged_before_inline_targets() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("servers.txt"),
            "# --- Servers ---\ndb-1,10.0.0.9\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("vigil.toml"),
            r#"
[monitor]
targets_file = "servers.txt"

[notify]
kind = "log"

[[targets]]
name = "web"
endpoint = "https://example.org/"
"#,
        )
        .unwrap();

        let settings = Settings::load(&dir.path().join("vigil.toml")).unwrap();
        let names: Vec<&str> = settings.targets.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["db-1", "web"]);
        assert_eq!(settings.state_path, dir.path().join("vigil-state.redb"));
    }

    #[test]
    fn missing_targets_file_is_fatal() {
        let config = log_config(
            r#"
[monitor]
targets_file = "does-not-exist.txt"
"#,
        );
        let err = config.resolve(Path::new("/nonexistent")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn demo_config_resolves() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos/lan-monitor");
        let mut config = VigilConfig::from_file(&dir.join("vigil.toml")).unwrap();
        config.notify.kind = Some(NotifierKind::Log);

        let settings = config.resolve(&dir).unwrap();
        assert_eq!(settings.targets.len(), 6);
        assert_eq!(settings.targets[5].name, "core-switch");
        assert_eq!(settings.targets[5].group, "network");
        assert_eq!(settings.policy.max_alerts_per_window, 5);
        assert!(settings.reference.is_some());
    }
}
