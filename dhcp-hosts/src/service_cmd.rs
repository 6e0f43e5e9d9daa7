use anyhow::{bail, Result};
use dhcp_hosts::report::{render_restart, render_status};
use dhcp_hosts::service::ServiceState;
use dhcp_hosts::store::HostStore;

use crate::cli::OutputFormat;

pub fn run_status(store: &HostStore, format: OutputFormat) -> Result<()> {
    let status = store.service_status();
    match format {
        OutputFormat::Text => println!("{}", render_status(&status, false)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&status)?),
    }

    if status.state == ServiceState::Error {
        bail!("service status check failed: {}", status.message);
    }
    Ok(())
}

pub fn run_restart(store: &HostStore, format: OutputFormat) -> Result<()> {
    let outcome = store.restart_service();
    match format {
        OutputFormat::Text => println!("{}", render_restart(&outcome)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
    }

    if !outcome.success {
        bail!("service restart failed: {}", outcome.message);
    }
    Ok(())
}
