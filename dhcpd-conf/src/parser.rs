use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::document::ConfigDocument;
use crate::host::{HostBlock, HostRecord, Segment, NO_DATE};

/// Errors that can occur while reading a configuration file.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Failed to read input file.
    #[error("failed to read dhcpd config: {0}")]
    Io(#[from] std::io::Error),
    /// File contents were not valid UTF-8.
    #[error("dhcpd config is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

// The body stops at the first `}`, so nested braces inside a host block are
// not supported.
pub(crate) static HOST_BLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bhost\s+([\w.-]+)\s*\{([^}]+)\}").expect("host block regex"));

static MAC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"hardware\s+ethernet\s+([0-9a-fA-F]{2}(?::[0-9a-fA-F]{2}){5});")
        .expect("hardware ethernet regex")
});

static FIXED_ADDRESS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"fixed-address\s+([0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3});")
        .expect("fixed-address regex")
});

static DATE_TRAILER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[ \t]*(?:\r?\n)?[ \t]*#[ \t]*Data:[ \t]*([0-9]{4}-[0-9]{2}-[0-9]{2}[ \t][0-9]{2}:[0-9]{2}:[0-9]{2})[^\n]*")
        .expect("date trailer regex")
});

/// Parse configuration text into a [`ConfigDocument`].
///
/// Parsing never fails: text that does not look like a host block is kept
/// verbatim as a text segment, and host blocks missing a MAC or fixed address
/// are kept without a record.
pub fn parse(text: &str) -> ConfigDocument {
    let mut segments = Vec::new();
    let mut cursor = 0;

    for caps in HOST_BLOCK_RE.captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        if whole.start() < cursor {
            continue;
        }

        let extent = block_extent(text, cursor, whole.start(), whole.end());
        if extent.start > cursor {
            segments.push(Segment::Text(text[cursor..extent.start].to_string()));
        }

        let name = caps[1].to_string();
        let record = record_from_body(&name, &caps[2], extent.date.as_deref());
        segments.push(Segment::Host(HostBlock {
            name,
            raw: text[extent.start..extent.end].to_string(),
            record,
        }));
        cursor = extent.end;
    }

    if cursor < text.len() {
        segments.push(Segment::Text(text[cursor..].to_string()));
    }

    ConfigDocument::from_segments(segments)
}

/// Read and parse a configuration file.
pub fn parse_file(path: &Path) -> Result<ConfigDocument, ParseError> {
    let bytes = fs::read(path)?;
    let text = String::from_utf8(bytes)?;
    Ok(parse(&text))
}

/// Parse only the host records, in file order.
pub fn parse_hosts(text: &str) -> Vec<HostRecord> {
    parse(text).hosts()
}

/// Every `fixed-address` in the text, whether or not its block is complete.
pub fn used_ips(text: &str) -> BTreeSet<String> {
    FIXED_ADDRESS_RE
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Re-read a single block after its text was edited.
pub(crate) fn reparse_block(raw: String, fallback_name: &str) -> HostBlock {
    let parsed = parse(&raw).segments().iter().find_map(|segment| match segment {
        Segment::Host(block) => Some((block.name.clone(), block.record.clone())),
        Segment::Text(_) => None,
    });

    match parsed {
        Some((name, record)) => HostBlock { name, raw, record },
        None => HostBlock {
            name: fallback_name.to_string(),
            raw,
            record: None,
        },
    }
}

struct BlockExtent {
    start: usize,
    end: usize,
    date: Option<String>,
}

/// Widen a block match to whole lines and pick up a `# Data:` trailer.
fn block_extent(text: &str, floor: usize, match_start: usize, match_end: usize) -> BlockExtent {
    let line_start = text[..match_start].rfind('\n').map_or(0, |idx| idx + 1);
    let start = if line_start >= floor && is_blank(&text[line_start..match_start]) {
        line_start
    } else {
        match_start
    };

    let mut end = match_end;
    let mut date = None;
    if let Some(caps) = DATE_TRAILER_RE.captures(&text[match_end..]) {
        if let Some(whole) = caps.get(0) {
            end = match_end + whole.end();
        }
        date = Some(caps[1].to_string());
    }

    let rest = &text[end..];
    match rest.find('\n') {
        Some(idx) if is_blank(&rest[..idx]) => end += idx + 1,
        None if is_blank(rest) => end = text.len(),
        _ => {}
    }

    BlockExtent { start, end, date }
}

fn is_blank(s: &str) -> bool {
    s.chars().all(|c| c == ' ' || c == '\t' || c == '\r')
}

fn record_from_body(name: &str, body: &str, date: Option<&str>) -> Option<HostRecord> {
    let mac = MAC_RE.captures(body)?;
    let ip = FIXED_ADDRESS_RE.captures(body)?;

    Some(HostRecord {
        name: name.to_string(),
        mac_address: mac[1].to_ascii_uppercase(),
        ip_address: ip[1].to_string(),
        registration_date: date
            .map(|d| d.split_whitespace().collect::<Vec<_>>().join(" "))
            .unwrap_or_else(|| NO_DATE.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::{parse, used_ips};
    use crate::host::Segment;

    #[test]
    fn keeps_indentation_and_trailer_inside_block() {
        let text = "subnet x {\n  host a {\n    hardware ethernet 00:11:22:33:44:55;\n    fixed-address 10.0.0.2;\n  }\n  # Data: 2024-01-02 03:04:05\n}\n";
        let doc = parse(text);
        let segments = doc.segments();
        assert_eq!(segments.len(), 3);
        match &segments[1] {
            Segment::Host(block) => {
                assert!(block.raw().starts_with("  host a {"));
                assert!(block.raw().ends_with("03:04:05\n"));
                let record = block.record().expect("record");
                assert_eq!(record.registration_date, "2024-01-02 03:04:05");
            }
            other => panic!("expected host block, got {other:?}"),
        }
        assert_eq!(segments[2], Segment::Text("}\n".to_string()));
    }

    #[test]
    fn trailer_on_closing_line_is_recognized() {
        let text = "host a { hardware ethernet 00:11:22:33:44:55; fixed-address 10.0.0.2; } # Data: 2024-01-02 03:04:05\n";
        let hosts = parse(text).hosts();
        assert_eq!(hosts[0].registration_date, "2024-01-02 03:04:05");
    }

    #[test]
    fn separated_comment_is_not_a_trailer() {
        let text = "host a {\n hardware ethernet 00:11:22:33:44:55;\n fixed-address 10.0.0.2;\n}\n\n# Data: 2024-01-02 03:04:05\n";
        let hosts = parse(text).hosts();
        assert_eq!(hosts[0].registration_date, "N/A");
    }

    #[test]
    fn block_sharing_a_line_keeps_prefix_as_text() {
        let text = "group { host a { hardware ethernet 00:11:22:33:44:55; fixed-address 10.0.0.2; } }\n";
        let doc = parse(text);
        assert_eq!(
            doc.segments()[0],
            Segment::Text("group { ".to_string())
        );
        assert_eq!(doc.to_string(), text);
    }

    #[test]
    fn used_ips_ignores_block_validity() {
        let text = "host a { fixed-address 10.0.0.2; }\nhost b { hardware ethernet 00:11:22:33:44:55; fixed-address 10.0.0.3; }\n";
        let ips = used_ips(text);
        assert!(ips.contains("10.0.0.2"));
        assert!(ips.contains("10.0.0.3"));
        assert_eq!(parse(text).hosts().len(), 1);
    }

    #[test]
    fn rejects_short_mac_and_lowercase_is_uppercased() {
        let text = "host a { hardware ethernet 0:11:22:33:44:55; fixed-address 10.0.0.2; }\nhost b { hardware ethernet aa:bb:cc:dd:ee:ff; fixed-address 10.0.0.3; }\n";
        let hosts = parse(text).hosts();
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].name, "b");
        assert_eq!(hosts[0].mac_address, "AA:BB:CC:DD:EE:FF");
    }
}
