use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::audit::{AuditSink, JsonLinesAudit, LogAudit};
use crate::ip::DEFAULT_AVAILABLE_LIMIT;
use crate::service::{ServiceController, SimulatedService, Systemctl};

/// Runtime settings, read from a TOML file. Every key is optional.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub conf_path: PathBuf,
    pub rules_path: PathBuf,
    pub available_limit: usize,
    pub lock_timeout_secs: u64,
    pub service: ServiceSettings,
    pub audit: AuditSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceSettings {
    pub unit: String,
    pub use_sudo: bool,
    pub timeout_secs: u64,
    /// Use a controller that reports success without touching systemd.
    pub simulate: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuditSettings {
    /// JSON-lines file; without it entries only go to the log.
    pub path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            conf_path: PathBuf::from("/etc/dhcp/dhcpd.conf"),
            rules_path: PathBuf::from("/etc/dhcp/ips_disponiveis.sh"),
            available_limit: DEFAULT_AVAILABLE_LIMIT,
            lock_timeout_secs: 10,
            service: ServiceSettings::default(),
            audit: AuditSettings::default(),
        }
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            unit: "isc-dhcp-server".to_string(),
            use_sudo: true,
            timeout_secs: 30,
            simulate: false,
        }
    }
}

/// Errors returned when loading a settings file.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse settings file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let raw = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&raw, path.display().to_string())
    }

    fn parse(raw: &str, path: String) -> Result<Self, SettingsError> {
        toml::from_str(raw).map_err(|source| SettingsError::Parse { path, source })
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    pub fn service_controller(&self) -> Box<dyn ServiceController> {
        if self.service.simulate {
            Box::new(SimulatedService::new(&self.service.unit))
        } else {
            Box::new(Systemctl::new(
                &self.service.unit,
                self.service.use_sudo,
                Duration::from_secs(self.service.timeout_secs),
            ))
        }
    }

    pub fn audit_sink(&self) -> Box<dyn AuditSink> {
        match &self.audit.path {
            Some(path) => Box::new(JsonLinesAudit::new(path)),
            None => Box::new(LogAudit),
        }
    }
}
