//! Host reservation blocks in ISC `dhcpd.conf` files.
//!
//! The file is read into a [`ConfigDocument`]: text segments (preamble,
//! subnet header, closing brace, comments) interleaved with host blocks of the
//! shape
//!
//! ```text
//! host <name> {
//!         hardware ethernet <MAC>;
//!         fixed-address <IP>;
//!         }
//!         # Data: <YYYY-MM-DD HH:MM:SS>
//! ```
//!
//! Structural edits (insert, remove, readdress, rename) work on that model and
//! serialization writes every untouched byte back unchanged. Regular
//! expressions only run at the parse boundary and inside single blocks.

pub mod document;
pub mod host;
pub mod parser;
pub mod writer;

pub use document::{ConfigDocument, Placement};
pub use host::{HostBlock, HostRecord, Segment, NO_DATE};
pub use parser::{parse, parse_file, parse_hosts, used_ips, ParseError};
pub use writer::{render_host_block, write, write_file, WriteError};
