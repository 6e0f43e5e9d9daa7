//! Validation and planning for host mutations.
//!
//! Every `plan_*` function takes the current document and returns the
//! proposed one without touching the filesystem. Checks run in a fixed order
//! and the first failing check decides the rejection.

use std::fmt::{self, Display, Formatter};

use dhcpd_conf::{ConfigDocument, HostRecord, Placement};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::ip::{normalize_mac, validate_ip, validate_mac};
use crate::rules::PolicyRules;

static NAME_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\w.]+$").expect("host name token regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    MissingField,
    InvalidMac,
    InvalidIp,
    InvalidName,
    InvalidRange,
    IpInUse,
    MacInUse,
    NameInUse,
    OutsidePolicy,
    Unchanged,
}

impl RejectReason {
    pub fn code(self) -> &'static str {
        match self {
            RejectReason::MissingField => "missing_field",
            RejectReason::InvalidMac => "invalid_mac",
            RejectReason::InvalidIp => "invalid_ip",
            RejectReason::InvalidName => "invalid_name",
            RejectReason::InvalidRange => "invalid_range",
            RejectReason::IpInUse => "ip_in_use",
            RejectReason::MacInUse => "mac_in_use",
            RejectReason::NameInUse => "name_in_use",
            RejectReason::OutsidePolicy => "outside_policy",
            RejectReason::Unchanged => "unchanged",
        }
    }
}

/// A validation failure: a stable reason code plus a message for humans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    pub reason: RejectReason,
    pub message: String,
}

impl Rejection {
    pub fn new(reason: RejectReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }
}

impl Display for Rejection {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for Rejection {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    Rejected(Rejection),
    NotFound { name: String },
}

impl From<Rejection> for PlanError {
    fn from(rejection: Rejection) -> Self {
        PlanError::Rejected(rejection)
    }
}

/// The document a mutation would produce, and the host it concerns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub document: ConfigDocument,
    /// The host as it will read back after the write.
    pub host: HostRecord,
    /// The host before the change, for update, rename and delete.
    pub previous: Option<HostRecord>,
    /// Only set by create.
    pub placement: Option<Placement>,
}

/// Spaces and hyphens become underscores.
pub fn normalize_name(name: &str) -> String {
    name.trim().replace([' ', '-'], "_")
}

pub fn plan_create(
    doc: &ConfigDocument,
    rules: &PolicyRules,
    name: &str,
    mac: &str,
    ip: &str,
    now: &str,
) -> Result<Plan, PlanError> {
    require("name", name)?;
    require("mac", mac)?;
    require("ip", ip)?;
    let ip = ip.trim();
    check_mac(mac)?;
    check_ip(ip)?;

    if doc.used_ips().contains(ip) {
        return Err(Rejection::new(
            RejectReason::IpInUse,
            format!("IP {ip} is already in use"),
        )
        .into());
    }
    check_policy(rules, ip)?;

    let name = checked_name(name)?;
    let mac = normalize_mac(mac);
    let hosts = doc.hosts();
    if let Some(existing) = hosts.iter().find(|h| h.name == name) {
        return Err(Rejection::new(
            RejectReason::NameInUse,
            format!("host name {name} is already in use by {}", existing.name),
        )
        .into());
    }
    if let Some(existing) = hosts.iter().find(|h| h.mac_address == mac) {
        return Err(Rejection::new(
            RejectReason::MacInUse,
            format!("MAC {mac} is already in use by {}", existing.name),
        )
        .into());
    }

    let host = HostRecord {
        name,
        mac_address: mac,
        ip_address: ip.to_string(),
        registration_date: now.to_string(),
    };
    let mut document = doc.clone();
    let placement = document.insert_host(&host);

    Ok(Plan {
        document,
        host,
        previous: None,
        placement: Some(placement),
    })
}

pub fn plan_delete(doc: &ConfigDocument, name: &str) -> Result<Plan, PlanError> {
    let previous = find(doc, name)?;
    let mut document = doc.clone();
    if document.remove_host(name) == 0 {
        return Err(not_found(name));
    }

    Ok(Plan {
        document,
        host: previous.clone(),
        previous: Some(previous),
        placement: None,
    })
}

pub fn plan_update(
    doc: &ConfigDocument,
    rules: &PolicyRules,
    name: &str,
    new_mac: &str,
    new_ip: &str,
) -> Result<Plan, PlanError> {
    require("mac", new_mac)?;
    require("ip", new_ip)?;
    let new_ip = new_ip.trim();
    check_mac(new_mac)?;
    check_ip(new_ip)?;
    let new_mac = normalize_mac(new_mac);

    let previous = find(doc, name)?;

    let mut used = doc.used_ips();
    used.remove(&previous.ip_address);
    if used.contains(new_ip) {
        return Err(Rejection::new(
            RejectReason::IpInUse,
            format!("IP {new_ip} is already in use by another host"),
        )
        .into());
    }
    if let Some(other) = doc
        .hosts()
        .into_iter()
        .find(|h| h.name != previous.name && h.mac_address == new_mac)
    {
        return Err(Rejection::new(
            RejectReason::MacInUse,
            format!("MAC {new_mac} is already in use by {}", other.name),
        )
        .into());
    }
    check_policy(rules, new_ip)?;

    let mut document = doc.clone();
    if document.set_host_addresses(name, &new_mac, new_ip) == 0 {
        return Err(not_found(name));
    }

    let host = HostRecord {
        mac_address: new_mac,
        ip_address: new_ip.to_string(),
        ..previous.clone()
    };
    Ok(Plan {
        document,
        host,
        previous: Some(previous),
        placement: None,
    })
}

pub fn plan_rename(doc: &ConfigDocument, name: &str, new_name: &str) -> Result<Plan, PlanError> {
    require("new name", new_name)?;
    let new_name = checked_name(new_name)?;

    if let Some(other) = doc
        .hosts()
        .into_iter()
        .find(|h| h.name != name && h.name == new_name)
    {
        return Err(Rejection::new(
            RejectReason::NameInUse,
            format!("host name {new_name} is already in use by {}", other.name),
        )
        .into());
    }

    let previous = find(doc, name)?;
    if previous.name == new_name {
        return Err(Rejection::new(
            RejectReason::Unchanged,
            format!("host {name} is already named {new_name}"),
        )
        .into());
    }

    let mut document = doc.clone();
    if !document.rename_host(name, &new_name) {
        return Err(not_found(name));
    }

    let host = HostRecord {
        name: new_name,
        ..previous.clone()
    };
    Ok(Plan {
        document,
        host,
        previous: Some(previous),
        placement: None,
    })
}

fn require(field: &str, value: &str) -> Result<(), Rejection> {
    if value.trim().is_empty() {
        return Err(Rejection::new(
            RejectReason::MissingField,
            format!("{field} is required"),
        ));
    }
    Ok(())
}

fn check_mac(mac: &str) -> Result<(), Rejection> {
    if validate_mac(mac.trim()) {
        Ok(())
    } else {
        Err(Rejection::new(
            RejectReason::InvalidMac,
            format!("invalid MAC address: {mac}"),
        ))
    }
}

fn check_ip(ip: &str) -> Result<(), Rejection> {
    if validate_ip(ip) {
        Ok(())
    } else {
        Err(Rejection::new(
            RejectReason::InvalidIp,
            format!("invalid IP address: {ip}"),
        ))
    }
}

fn check_policy(rules: &PolicyRules, ip: &str) -> Result<(), Rejection> {
    if rules.find(ip).is_some() {
        Ok(())
    } else {
        Err(Rejection::new(
            RejectReason::OutsidePolicy,
            format!("IP {ip} is not inside any allowed range"),
        ))
    }
}

/// Normalize and make sure the parser will read the name back.
fn checked_name(name: &str) -> Result<String, Rejection> {
    let normalized = normalize_name(name);
    if NAME_TOKEN_RE.is_match(&normalized) {
        Ok(normalized)
    } else {
        Err(Rejection::new(
            RejectReason::InvalidName,
            format!("invalid host name: {name}"),
        ))
    }
}

fn find(doc: &ConfigDocument, name: &str) -> Result<HostRecord, PlanError> {
    doc.find_host(name).cloned().ok_or_else(|| not_found(name))
}

fn not_found(name: &str) -> PlanError {
    PlanError::NotFound {
        name: name.to_string(),
    }
}
