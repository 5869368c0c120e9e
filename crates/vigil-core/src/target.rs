//! Target address normalization and the plain-text target list.
//!
//! The list format is one target per line:
//!
//! ```text
//! # --- Devices ---
//! Front door NVR,10.0.0.7:554
//! Web panel,https://10.0.0.8/login
//! # --- Servers ---
//! db-1,10.0.0.9
//! 10.0.0.10
//! ```
//!
//! Bare `host:port` becomes a TCP target, a bare host becomes a ping target.
//! A line without a comma uses the target text as its name.

use crate::error::{ConfigError, ConfigResult, EndpointError};
use crate::types::{Endpoint, Target};

impl Endpoint {
    /// Normalize a raw target string.
    pub fn parse(raw: &str) -> Result<Self, EndpointError> {
        let t = raw.trim();
        if t.is_empty() {
            return Err(EndpointError::Empty);
        }
        let lower = t.to_ascii_lowercase();

        if lower.starts_with("http://") || lower.starts_with("https://") {
            let rest = &t[t.find("://").map(|i| i + 3).unwrap_or(0)..];
            let authority = rest.split(['/', '?', '#']).next().unwrap_or("");
            if authority.is_empty() {
                return Err(EndpointError::MissingHost(t.to_string()));
            }
            Ok(Endpoint::Http { url: t.to_string() })
        } else if lower.starts_with("tcp://") {
            parse_host_port(&t[6..], t)
        } else if lower.starts_with("ping://") {
            ping_host(t[7..].trim(), t)
        } else if t.contains(':') {
            parse_host_port(t, t)
        } else {
            ping_host(t, t)
        }
    }
}

/// The host is passed to the ping helper as an argument, so it must not
/// look like a flag.
fn ping_host(host: &str, raw: &str) -> Result<Endpoint, EndpointError> {
    if host.is_empty() {
        return Err(EndpointError::MissingHost(raw.to_string()));
    }
    if host.starts_with('-') || host.chars().any(char::is_whitespace) {
        return Err(EndpointError::InvalidHost(raw.to_string()));
    }
    Ok(Endpoint::Ping {
        host: host.to_string(),
    })
}

fn parse_host_port(addr: &str, raw: &str) -> Result<Endpoint, EndpointError> {
    let addr = addr.trim().trim_end_matches('/');
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| EndpointError::MissingPort(raw.to_string()))?;
    if host.is_empty() {
        return Err(EndpointError::MissingHost(raw.to_string()));
    }
    if port.is_empty() {
        return Err(EndpointError::MissingPort(raw.to_string()));
    }
    let port: u16 = port
        .parse()
        .ok()
        .filter(|p| *p != 0)
        .ok_or_else(|| EndpointError::InvalidPort(raw.to_string()))?;
    Ok(Endpoint::Tcp {
        host: host.to_string(),
        port,
    })
}

/// Section header of the form `# --- Name ---`.
fn group_from_header(comment: &str) -> Option<String> {
    let inner = comment
        .trim_start_matches('#')
        .trim()
        .strip_prefix("---")?
        .strip_suffix("---")?
        .trim();
    (!inner.is_empty()).then(|| inner.to_lowercase())
}

/// Parse a target list. Order is preserved; duplicates are not checked here.
pub fn parse_target_list(text: &str) -> ConfigResult<Vec<Target>> {
    let mut targets = Vec::new();
    let mut current_group: Option<String> = None;

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with('#') {
            if let Some(group) = group_from_header(line) {
                current_group = Some(group);
            }
            continue;
        }

        let (name, target) = match line.split_once(',') {
            Some((name, target)) => (name.trim(), target.trim()),
            None => (line, line),
        };
        let endpoint = Endpoint::parse(target).map_err(|source| ConfigError::TargetLine {
            line: idx + 1,
            source,
        })?;
        let name = if name.is_empty() { target } else { name };

        let mut t = Target::new(name, endpoint);
        if let Some(group) = &current_group {
            t = t.with_group(group.clone());
        }
        targets.push(t);
    }

    Ok(targets)
}
