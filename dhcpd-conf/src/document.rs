use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};

use once_cell::sync::Lazy;
use regex::{NoExpand, Regex};
use serde::Serialize;

use crate::host::{HostBlock, HostRecord, Segment};
use crate::parser::{self, reparse_block};
use crate::writer::render_host_block;

/// Where [`ConfigDocument::insert_host`] placed a new block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    /// Spliced in front of the last `}` outside any host block (the subnet terminator).
    BeforeTerminator,
    /// No terminator was found, so the block went to the end of the file.
    AppendedAtEnd,
}

/// An in-memory dhcpd.conf: text segments interleaved with host blocks.
///
/// Serializing an unmodified document reproduces the source text byte for byte.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConfigDocument {
    segments: Vec<Segment>,
}

impl ConfigDocument {
    pub(crate) fn from_segments(segments: Vec<Segment>) -> Self {
        let mut doc = Self { segments };
        doc.merge_text();
        doc
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// All host blocks in file order, including ones without a record.
    pub fn blocks(&self) -> impl Iterator<Item = &HostBlock> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Host(block) => Some(block),
            Segment::Text(_) => None,
        })
    }

    /// Parsed host records in file order.
    pub fn hosts(&self) -> Vec<HostRecord> {
        self.blocks().filter_map(|b| b.record().cloned()).collect()
    }

    /// First record whose name matches exactly.
    pub fn find_host(&self, name: &str) -> Option<&HostRecord> {
        self.blocks()
            .filter_map(HostBlock::record)
            .find(|record| record.name == name)
    }

    /// Every fixed address mentioned anywhere in the document.
    pub fn used_ips(&self) -> BTreeSet<String> {
        parser::used_ips(&self.to_string())
    }

    /// Add a block for `record` before the closing brace of the enclosing subnet.
    ///
    /// Whitespace before the insertion point is trimmed so the new block
    /// starts on its own line right after the previous content.
    pub fn insert_host(&mut self, record: &HostRecord) -> Placement {
        let block = reparse_block(render_host_block(record), &record.name);

        let Some((idx, pos)) = self.last_terminator() else {
            let needs_newline = self
                .segments
                .last()
                .map(|segment| !segment_text(segment).ends_with('\n'))
                .unwrap_or(false);
            if needs_newline {
                push_text(&mut self.segments, "\n");
            }
            self.segments.push(Segment::Host(block));
            self.resegment();
            return Placement::AppendedAtEnd;
        };

        let text = segment_text(&self.segments[idx]).to_string();
        let (before, after) = text.split_at(pos);
        let tail = self.segments.split_off(idx + 1);
        self.segments.truncate(idx);

        let mut head = std::mem::take(&mut self.segments);
        push_text(&mut head, before);
        trim_trailing_whitespace(&mut head);
        if !head.is_empty() {
            push_text(&mut head, "\n");
        }
        head.push(Segment::Host(block));
        head.push(Segment::Text(after.trim_start().to_string()));
        head.extend(tail);

        self.segments = head;
        self.resegment();
        Placement::BeforeTerminator
    }

    /// Drop every block named `name`, trailer included. Returns how many were removed.
    pub fn remove_host(&mut self, name: &str) -> usize {
        let before = self.segments.len();
        self.segments
            .retain(|segment| !matches!(segment, Segment::Host(block) if block.name == name));
        let removed = before - self.segments.len();
        self.resegment();
        removed
    }

    /// Rewrite the `hardware ethernet` and `fixed-address` statements of every
    /// block named `name`, leaving all other lines alone.
    pub fn set_host_addresses(&mut self, name: &str, mac: &str, ip: &str) -> usize {
        let mac_stmt = format!("hardware ethernet {mac};");
        let ip_stmt = format!("fixed-address {ip};");
        let mut touched = 0;

        for segment in &mut self.segments {
            let Segment::Host(block) = segment else {
                continue;
            };
            if block.name != name {
                continue;
            }
            let raw = {
                let with_mac = MAC_STMT_RE.replace_all(&block.raw, NoExpand(&mac_stmt));
                IP_STMT_RE
                    .replace_all(&with_mac, NoExpand(&ip_stmt))
                    .into_owned()
            };
            *block = reparse_block(raw, name);
            touched += 1;
        }
        if touched > 0 {
            self.resegment();
        }
        touched
    }

    /// Rename the first block called `old` to `new`. Returns false if none exists.
    pub fn rename_host(&mut self, old: &str, new: &str) -> bool {
        let Ok(open) = Regex::new(&format!(r"(\bhost\s+){}(\s*\{{)", regex::escape(old))) else {
            return false;
        };

        let target = self.segments.iter_mut().find_map(|segment| match segment {
            Segment::Host(block) if block.name == old => Some(block),
            _ => None,
        });
        let Some(block) = target else {
            return false;
        };

        let raw = open
            .replacen(&block.raw, 1, |caps: &regex::Captures<'_>| {
                format!("{}{}{}", &caps[1], new, &caps[2])
            })
            .into_owned();
        *block = reparse_block(raw, new);
        self.resegment();
        true
    }

    /// Locate the last `}` that sits in a text segment.
    fn last_terminator(&self) -> Option<(usize, usize)> {
        self.segments
            .iter()
            .enumerate()
            .rev()
            .find_map(|(idx, segment)| match segment {
                Segment::Text(text) => text.rfind('}').map(|pos| (idx, pos)),
                Segment::Host(_) => None,
            })
    }

    /// Re-derive segment boundaries from the current text so an edited
    /// document compares equal to a fresh parse of its output.
    fn resegment(&mut self) {
        *self = parser::parse(&self.to_string());
    }

    fn merge_text(&mut self) {
        let mut merged: Vec<Segment> = Vec::with_capacity(self.segments.len());
        for segment in self.segments.drain(..) {
            match segment {
                Segment::Text(text) if text.is_empty() => {}
                Segment::Text(text) => push_text(&mut merged, &text),
                host => merged.push(host),
            }
        }
        self.segments = merged;
    }
}

impl Display for ConfigDocument {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            f.write_str(segment_text(segment))?;
        }
        Ok(())
    }
}

static MAC_STMT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"hardware\s+ethernet\s+[^;]*;").expect("hardware ethernet statement regex")
});

static IP_STMT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"fixed-address\s+[^;]*;").expect("fixed-address statement regex")
});

fn segment_text(segment: &Segment) -> &str {
    match segment {
        Segment::Text(text) => text,
        Segment::Host(block) => &block.raw,
    }
}

fn push_text(segments: &mut Vec<Segment>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(Segment::Text(last)) = segments.last_mut() {
        last.push_str(text);
        return;
    }
    segments.push(Segment::Text(text.to_string()));
}

fn trim_trailing_whitespace(segments: &mut Vec<Segment>) {
    while let Some(last) = segments.last_mut() {
        match last {
            Segment::Text(text) => {
                let len = text.trim_end().len();
                text.truncate(len);
                if !text.is_empty() {
                    return;
                }
                segments.pop();
            }
            Segment::Host(block) => {
                let len = block.raw.trim_end().len();
                block.raw.truncate(len);
                return;
            }
        }
    }
}
