//! Notification bodies.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Duration;

use vigil_core::Target;

pub fn down(target: &Target, detail: &str) -> String {
    format!(
        "❌ {} is unreachable!\nDetail: {} | {}",
        target.name, target.endpoint, detail
    )
}

pub fn reminder(target: &Target, detail: &str) -> String {
    format!(
        "⏰ {} is still down\nDetail: {} | {}",
        target.name, target.endpoint, detail
    )
}

pub fn recovered(target: &Target, detail: &str) -> String {
    format!(
        "✅ {} is reachable again\nDetail: {} | {}",
        target.name, target.endpoint, detail
    )
}

/// One message for a burst of down transitions.
pub fn storm(names: &[String], window_secs: u64, suppress_secs: u64) -> String {
    let mut body = format!(
        "🌩 Alert storm: {} targets went down within {}s.\n\
         Individual alerts are paused for {} min.\n",
        names.len(),
        window_secs,
        suppress_secs / 60
    );
    for name in names {
        let _ = write!(body, "\n• {name}");
    }
    body
}

pub fn global_outage(reference: &Target, detail: &str, suppress_secs: u64) -> String {
    format!(
        "🌐 General connectivity problem: reference host {} is unreachable ({}).\n\
         Individual alerts are paused for {} min.",
        reference.endpoint,
        detail,
        suppress_secs / 60
    )
}

/// Combine deferred bodies. A single body is returned unchanged.
pub fn grouped(mut bodies: Vec<String>) -> String {
    if bodies.len() == 1 {
        return bodies.remove(0);
    }
    format!(
        "📦 {} deferred alerts:\n\n{}",
        bodies.len(),
        bodies.join("\n\n")
    )
}

fn by_group(targets: &[Target]) -> BTreeMap<&str, Vec<&Target>> {
    let mut groups: BTreeMap<&str, Vec<&Target>> = BTreeMap::new();
    for t in targets {
        groups.entry(t.group.as_str()).or_default().push(t);
    }
    groups
}

pub fn started(targets: &[Target], interval: Duration) -> String {
    let counts = by_group(targets)
        .into_iter()
        .map(|(group, members)| format!("{group}: {}", members.len()))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "🔍 Monitoring started: {} targets ({counts}), checking every {}s.",
        targets.len(),
        interval.as_secs()
    )
}

/// Every target by group, one `• name → endpoint` line each.
pub fn watchlist(targets: &[Target]) -> String {
    let mut body = String::from("📋 Watchlist:");
    for (group, members) in by_group(targets) {
        let _ = write!(body, "\n\n{group}:");
        for t in members {
            let _ = write!(body, "\n• {} → {}", t.name, t.endpoint);
        }
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::Endpoint;

    fn switch() -> Target {
        Target::new(
            "core-switch",
            Endpoint::Tcp {
                host: "10.0.0.1".to_string(),
                port: 22,
            },
        )
    }

    #[test]
    fn down_names_target_and_detail() {
        let body = down(&switch(), "TCP: connection refused");
        assert!(body.starts_with("❌ core-switch is unreachable!"));
        assert!(body.contains("tcp://10.0.0.1:22 | TCP: connection refused"));
    }

    #[test]
    fn storm_lists_every_name() {
        let names: Vec<String> = (1..=3).map(|i| format!("cam-{i}")).collect();
        let body = storm(&names, 60, 900);
        assert!(body.contains("3 targets"));
        assert!(body.contains("15 min"));
        for name in &names {
            assert!(body.contains(&format!("• {name}")));
        }
    }

    #[test]
    fn grouped_keeps_order_and_counts() {
        assert_eq!(grouped(vec!["only".into()]), "only");
        let body = grouped(vec!["a".into(), "b".into()]);
        assert_eq!(body, "📦 2 deferred alerts:\n\na\n\nb");
    }

    #[test]
    fn watchlist_groups_targets() {
        let targets = vec![
            switch(),
            Target::new(
                "db-1",
                Endpoint::Ping {
                    host: "10.0.0.9".to_string(),
                },
            ),
        ];
        let body = watchlist(&targets);
        assert!(body.contains("devices:\n• core-switch → tcp://10.0.0.1:22"));
        assert!(body.contains("servers:\n• db-1 → ping://10.0.0.9"));

        let summary = started(&targets, Duration::from_secs(60));
        assert!(summary.contains("2 targets (devices: 1, servers: 1)"));
        assert!(summary.contains("every 60s"));
    }
}
