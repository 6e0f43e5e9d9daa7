//! Dotted-quad helpers shared by validation, rule lookup and address listing.

use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use once_cell::sync::Lazy;
use regex::Regex;

/// Default number of free addresses returned by [`available_ips_in_range`].
pub const DEFAULT_AVAILABLE_LIMIT: usize = 50;

static IP_SHAPE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}$").expect("ip shape regex")
});

static MAC_SHAPE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[0-9A-Fa-f]{2}[:-]){5}[0-9A-Fa-f]{2}$").expect("mac shape regex")
});

/// Pack a dotted quad into a big-endian integer.
///
/// Only the shape is checked here (four dot-separated decimal groups). Octets
/// above 255 are not rejected; run [`validate_ip`] first when that matters.
pub fn ip_to_int(ip: &str) -> Option<u32> {
    let mut parts = ip.split('.');
    let mut value: u32 = 0;
    for _ in 0..4 {
        let octet: u32 = parts.next()?.parse().ok()?;
        value = value.wrapping_shl(8).wrapping_add(octet);
    }
    if parts.next().is_some() {
        return None;
    }
    Some(value)
}

pub fn int_to_ip(value: u32) -> String {
    Ipv4Addr::from(value).to_string()
}

/// Four dot-separated groups of one to three digits, each in 0..=255.
pub fn validate_ip(ip: &str) -> bool {
    IP_SHAPE_RE.is_match(ip)
        && ip
            .split('.')
            .all(|octet| octet.parse::<u16>().is_ok_and(|v| v <= 255))
}

/// Six two-digit hex groups separated by `:` or `-`.
pub fn validate_mac(mac: &str) -> bool {
    MAC_SHAPE_RE.is_match(mac)
}

/// Uppercase, colon-separated form written to the config file.
pub fn normalize_mac(mac: &str) -> String {
    mac.trim().to_ascii_uppercase().replace('-', ":")
}

/// Free addresses between `start` and `end` inclusive, ascending.
///
/// Stops after `limit` results. Each step either yields an address or skips
/// a used one, so the scan is bounded by `limit` plus the number of used
/// addresses in the range. Returns an empty list if either bound is malformed.
pub fn available_ips_in_range(
    start: &str,
    end: &str,
    used: &BTreeSet<String>,
    limit: usize,
) -> Vec<String> {
    let (Some(start), Some(end)) = (ip_to_int(start), ip_to_int(end)) else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for value in start..=end {
        if out.len() >= limit {
            break;
        }
        let ip = int_to_ip(value);
        if !used.contains(&ip) {
            out.push(ip);
        }
    }
    out
}
