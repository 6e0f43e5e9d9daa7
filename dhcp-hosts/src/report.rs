use colored::Colorize;
use dhcpd_conf::Placement;

use crate::reconcile::Rejection;
use crate::rules::{PolicyRules, NO_RULE};
use crate::service::{RestartOutcome, ServiceState, ServiceStatus};
use crate::store::{HostView, MutationOutcome, Stats};

/// Render the host list, one line per host.
pub fn render_hosts(hosts: &[HostView]) -> String {
    if hosts.is_empty() {
        return "no hosts registered".dimmed().to_string();
    }

    let width = hosts.iter().map(|h| h.host.name.len()).max().unwrap_or(0);
    let mut out = Vec::new();
    for view in hosts {
        let rule = if view.rule == NO_RULE {
            view.rule.yellow().to_string()
        } else {
            view.rule.clone()
        };
        out.push(format!(
            "{:<width$}  {}  {:<15}  {}  rule={}",
            view.host.name.bold(),
            view.host.mac_address,
            view.host.ip_address,
            view.host.registration_date.dimmed(),
            rule,
        ));
    }
    out.push(format!("total={}", hosts.len()).cyan().to_string());
    out.join("\n")
}

pub fn render_stats(stats: &Stats) -> String {
    format!(
        "hosts={} rules={} used_ips={}",
        stats.total_hosts, stats.total_rules, stats.total_used_ips
    )
    .cyan()
    .to_string()
}

pub fn render_rules(rules: &PolicyRules) -> String {
    if rules.is_empty() {
        return "no rules loaded".yellow().to_string();
    }
    rules
        .rules()
        .iter()
        .map(|rule| {
            format!(
                "- {}: {} - {} ({} addresses)",
                rule.label(),
                rule.range_start,
                rule.range_end,
                rule.size()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_available(ips: &[String]) -> String {
    if ips.is_empty() {
        return "no free addresses in range".yellow().to_string();
    }
    let mut out: Vec<String> = ips.to_vec();
    out.push(format!("free={}", ips.len()).cyan().to_string());
    out.join("\n")
}

/// Render a successful create, update, rename or delete.
pub fn render_outcome(outcome: &MutationOutcome) -> String {
    let host = &outcome.host;
    let mut out = Vec::new();

    let headline = match &outcome.previous {
        Some(old) if old.name != host.name => {
            format!("renamed {} -> {}", old.name, host.name)
        }
        _ => format!("{} {}", outcome.operation.past_tense(), host.name),
    };
    out.push(headline.green().to_string());
    out.push(format!(
        "mac={} ip={} rule={}",
        host.mac_address, host.ip_address, outcome.rule
    ));
    if let Some(old) = &outcome.previous {
        if old.mac_address != host.mac_address || old.ip_address != host.ip_address {
            out.push(format!(
                "previous mac={} ip={}",
                old.mac_address, old.ip_address
            ));
        }
    }
    if outcome.placement == Some(Placement::AppendedAtEnd) {
        out.push("placement=appended_at_end".yellow().to_string());
    }
    for warning in &outcome.warnings {
        out.push(format!("warning: {warning}").yellow().to_string());
    }
    out.join("\n")
}

pub fn render_rejection(rejection: &Rejection) -> String {
    format!("rejected ({}): {}", rejection.reason.code(), rejection.message)
        .red()
        .to_string()
}

pub fn render_status(status: &ServiceStatus, verbose: bool) -> String {
    let state = match status.state {
        ServiceState::Active => status.state.to_string().green(),
        ServiceState::Inactive | ServiceState::Unknown => status.state.to_string().yellow(),
        ServiceState::Failed | ServiceState::NotFound | ServiceState::Error => {
            status.state.to_string().red()
        }
    };
    let mut out = format!("state={state}\n{}", status.message);
    if verbose && !status.raw_output.is_empty() {
        out.push('\n');
        out.push_str(status.raw_output.trim_end());
    }
    out
}

pub fn render_restart(outcome: &RestartOutcome) -> String {
    if outcome.success {
        outcome.message.green().to_string()
    } else {
        let mut out = outcome.message.red().to_string();
        if let Some(raw) = outcome.raw_output.as_deref().filter(|r| !r.trim().is_empty()) {
            out.push('\n');
            out.push_str(raw.trim_end());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use dhcpd_conf::HostRecord;

    use super::{render_hosts, render_outcome, render_rules};
    use crate::rules::parse_rules;
    use crate::store::{HostView, MutationOutcome, Operation};

    fn record(name: &str, ip: &str) -> HostRecord {
        HostRecord {
            name: name.to_string(),
            mac_address: "AA:BB:CC:DD:EE:01".to_string(),
            ip_address: ip.to_string(),
            registration_date: "N/A".to_string(),
        }
    }

    #[test]
    fn host_lines_carry_rule_and_total() {
        colored::control::set_override(false);
        let text = render_hosts(&[HostView {
            host: record("printer1", "10.0.0.15"),
            rule: "staff - full".to_string(),
        }]);
        assert!(text.contains("printer1"));
        assert!(text.contains("rule=staff - full"));
        assert!(text.ends_with("total=1"));
    }

    #[test]
    fn rename_headline_shows_both_names() {
        colored::control::set_override(false);
        let outcome = MutationOutcome {
            operation: Operation::Rename,
            host: record("new", "10.0.0.15"),
            previous: Some(record("old", "10.0.0.15")),
            rule: "staff - full".to_string(),
            placement: None,
            warnings: vec!["host saved but service restart failed: x".to_string()],
        };
        let text = render_outcome(&outcome);
        assert!(text.starts_with("renamed old -> new"));
        assert!(!text.contains("previous"));
        assert!(text.contains("warning: host saved"));
    }

    #[test]
    fn rules_show_range_and_size() {
        colored::control::set_override(false);
        let text = render_rules(&parse_rules(
            "checa_regra \"staff\" \"full\" \"10.0.0.10\" \"10.0.0.20\"",
        ));
        assert_eq!(text, "- staff - full: 10.0.0.10 - 10.0.0.20 (11 addresses)");
    }
}
