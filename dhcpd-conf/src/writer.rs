use std::fs;
use std::io::Write;
use std::path::Path;

use thiserror::Error;

use crate::document::ConfigDocument;
use crate::host::HostRecord;

/// Errors that can occur while writing a configuration file.
#[derive(Debug, Error)]
pub enum WriteError {
    /// Failed to create, write or sync the temporary file.
    #[error("failed to write dhcpd config: {0}")]
    Io(#[from] std::io::Error),
    /// Failed to move the temporary file over the target.
    #[error("failed to replace dhcpd config: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// Serialize a document back to text.
pub fn write(doc: &ConfigDocument) -> String {
    doc.to_string()
}

/// Write a document to `path` through a temporary file in the same directory.
///
/// The target is replaced by a rename, so readers see either the old or the
/// new content. Permissions of an existing target are carried over.
pub fn write_file(doc: &ConfigDocument, path: &Path) -> Result<(), WriteError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::Builder::new()
        .prefix(".dhcpd-conf.")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    tmp.write_all(write(doc).as_bytes())?;
    tmp.as_file().sync_all()?;

    if let Ok(meta) = fs::metadata(path) {
        fs::set_permissions(tmp.path(), meta.permissions())?;
    }

    tmp.persist(path)?;
    Ok(())
}

/// Render the text of a new host block in the layout used by existing files.
pub fn render_host_block(record: &HostRecord) -> String {
    let mut out = format!(
        "host {} {{\n        hardware ethernet {};\n        fixed-address {};\n        }}\n",
        record.name, record.mac_address, record.ip_address
    );
    if record.has_registration_date() {
        out.push_str(&format!("        # Data: {}\n", record.registration_date));
    }
    out
}
