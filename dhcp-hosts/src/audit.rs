//! Audit trail entries and the sinks that receive them.
//!
//! Sinks are fire-and-forget: a sink that cannot store an entry logs a
//! warning and returns, it never fails the operation being audited.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Login,
    Logout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceType {
    Host,
    User,
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditStatus {
    Success,
    Failure,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Local>,
    pub actor: String,
    pub action: AuditAction,
    pub resource_type: ResourceType,
    pub resource_name: Option<String>,
    pub details: Option<Value>,
    pub status: AuditStatus,
    pub error_message: Option<String>,
}

impl AuditEntry {
    pub fn new(actor: &str, action: AuditAction, resource_type: ResourceType) -> Self {
        Self {
            timestamp: Local::now(),
            actor: actor.to_string(),
            action,
            resource_type,
            resource_name: None,
            details: None,
            status: AuditStatus::Success,
            error_message: None,
        }
    }

    pub fn resource(mut self, name: impl Into<String>) -> Self {
        self.resource_name = Some(name.into());
        self
    }

    pub fn details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn failed(mut self, status: AuditStatus, message: impl Into<String>) -> Self {
        self.status = status;
        self.error_message = Some(message.into());
        self
    }
}

/// Receiver of audit entries.
pub trait AuditSink {
    fn record(&self, entry: AuditEntry);
}

/// Emits entries as structured log events under the `audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAudit;

impl AuditSink for LogAudit {
    fn record(&self, entry: AuditEntry) {
        let details = entry
            .details
            .as_ref()
            .map(Value::to_string)
            .unwrap_or_default();
        info!(
            target: "audit",
            actor = %entry.actor,
            action = ?entry.action,
            resource_type = ?entry.resource_type,
            resource = entry.resource_name.as_deref().unwrap_or("-"),
            status = ?entry.status,
            error = entry.error_message.as_deref().unwrap_or(""),
            %details,
            "audit"
        );
    }
}

/// Appends one JSON object per line to a file, and mirrors it to the log.
#[derive(Debug, Clone)]
pub struct JsonLinesAudit {
    path: PathBuf,
}

impl JsonLinesAudit {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn append(&self, entry: &AuditEntry) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let line = serde_json::to_string(entry)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")
    }
}

impl AuditSink for JsonLinesAudit {
    fn record(&self, entry: AuditEntry) {
        if let Err(err) = self.append(&entry) {
            warn!(
                path = %self.path.display(),
                "failed to write audit entry: {err}"
            );
        }
        LogAudit.record(entry);
    }
}
