use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::ip::ip_to_int;

/// Label returned by [`PolicyRules::label_for`] when no range contains the address.
pub const NO_RULE: &str = "N/A";

static RULE_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"checa_regra\s+"([^"]+)"\s+"([^"]+)"\s+"([0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3})"\s+"([0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3})""#,
    )
    .expect("rule line regex")
});

/// A named address range and the access category it grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyRule {
    pub category: String,
    pub access_level: String,
    pub range_start: Ipv4Addr,
    pub range_end: Ipv4Addr,
}

impl PolicyRule {
    pub fn contains(&self, ip: u32) -> bool {
        u32::from(self.range_start) <= ip && ip <= u32::from(self.range_end)
    }

    pub fn label(&self) -> String {
        format!("{} - {}", self.category, self.access_level)
    }

    pub fn size(&self) -> u64 {
        u64::from(u32::from(self.range_end)) - u64::from(u32::from(self.range_start)) + 1
    }
}

/// Rules in file order; the first range containing an address wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PolicyRules {
    rules: Vec<PolicyRule>,
}

impl PolicyRules {
    pub fn new(rules: Vec<PolicyRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[PolicyRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// First rule whose range contains `ip`.
    pub fn find(&self, ip: &str) -> Option<&PolicyRule> {
        let value = ip_to_int(ip)?;
        self.rules.iter().find(|rule| rule.contains(value))
    }

    /// `"<category> - <access>"` for the matching rule, or [`NO_RULE`].
    pub fn label_for(&self, ip: &str) -> String {
        self.find(ip)
            .map(PolicyRule::label)
            .unwrap_or_else(|| NO_RULE.to_string())
    }
}

/// Errors returned when loading a rules script.
#[derive(Debug, Error)]
pub enum RulesLoadError {
    #[error("failed to read rules file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

/// Load rules from a `checa_regra` shell script.
pub fn load_rules(path: &Path) -> Result<PolicyRules, RulesLoadError> {
    let raw = fs::read_to_string(path).map_err(|source| RulesLoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(parse_rules(&raw))
}

/// Extract one rule per `checa_regra "<cat>" "<access>" "<start>" "<end>"` line.
///
/// The call may appear anywhere on the line, so a commented-out call still
/// yields a rule. Other lines and calls whose bounds are not usable addresses
/// are skipped.
pub fn parse_rules(text: &str) -> PolicyRules {
    let mut rules = Vec::new();

    for (lineno, line) in text.lines().enumerate() {
        let Some(caps) = RULE_LINE_RE.captures(line) else {
            continue;
        };

        let (Some(range_start), Some(range_end)) = (parse_octets(&caps[3]), parse_octets(&caps[4]))
        else {
            warn!(line = lineno + 1, "skipping rule with invalid address: {}", line.trim());
            continue;
        };
        if u32::from(range_start) > u32::from(range_end) {
            warn!(line = lineno + 1, "skipping rule with reversed range: {}", line.trim());
            continue;
        }

        debug!(
            category = &caps[1],
            access = &caps[2],
            %range_start,
            %range_end,
            "loaded rule"
        );
        rules.push(PolicyRule {
            category: caps[1].to_string(),
            access_level: caps[2].to_string(),
            range_start,
            range_end,
        });
    }

    PolicyRules::new(rules)
}

/// Like `Ipv4Addr::from_str`, but accepts zero-padded octets such as `010`.
fn parse_octets(ip: &str) -> Option<Ipv4Addr> {
    let mut octets = [0u8; 4];
    let mut parts = ip.split('.');
    for slot in &mut octets {
        *slot = parts.next()?.parse().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(Ipv4Addr::from(octets))
}
