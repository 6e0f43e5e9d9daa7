use serde::Serialize;

/// Registration date recorded for blocks without a `# Data:` trailer.
pub const NO_DATE: &str = "N/A";

/// A static reservation read from a `host <name> { ... }` block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostRecord {
    /// Host name token as written after the `host` keyword.
    pub name: String,
    /// Hardware address, uppercase and colon separated.
    pub mac_address: String,
    /// Dotted-quad fixed address.
    pub ip_address: String,
    /// `YYYY-MM-DD HH:MM:SS` from the trailing comment, or [`NO_DATE`].
    pub registration_date: String,
}

impl HostRecord {
    /// Returns true when the block carried a registration comment.
    pub fn has_registration_date(&self) -> bool {
        self.registration_date != NO_DATE
    }
}

/// The exact text of one host block together with what could be read from it.
///
/// `raw` covers whole lines where possible: leading indentation, the block
/// itself, an optional `# Data:` trailer and the final line break.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostBlock {
    pub(crate) name: String,
    pub(crate) raw: String,
    pub(crate) record: Option<HostRecord>,
}

impl HostBlock {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Parsed reservation, absent when the block lacks a MAC or fixed address.
    pub fn record(&self) -> Option<&HostRecord> {
        self.record.as_ref()
    }
}

/// One piece of a [`ConfigDocument`](crate::ConfigDocument).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Any text outside host blocks (preamble, subnet header, terminator).
    Text(String),
    Host(HostBlock),
}
