use anyhow::Result;
use dhcp_hosts::report::{render_available, render_hosts, render_rules, render_stats};
use dhcp_hosts::store::HostStore;

use crate::cli::{AvailableArgs, OutputFormat};

pub fn run_hosts(store: &HostStore, format: OutputFormat) -> Result<()> {
    let hosts = store.hosts()?;
    match format {
        OutputFormat::Text => println!("{}", render_hosts(&hosts)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&hosts)?),
    }
    Ok(())
}

pub fn run_stats(store: &HostStore, format: OutputFormat) -> Result<()> {
    let stats = store.stats()?;
    match format {
        OutputFormat::Text => println!("{}", render_stats(&stats)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
    }
    Ok(())
}

pub fn run_rules(store: &HostStore, format: OutputFormat) -> Result<()> {
    let rules = store.load_rules()?;
    match format {
        OutputFormat::Text => println!("{}", render_rules(&rules)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rules)?),
    }
    Ok(())
}

pub fn run_available(
    store: &HostStore,
    args: AvailableArgs,
    default_limit: usize,
    format: OutputFormat,
) -> Result<()> {
    let limit = args.limit.unwrap_or(default_limit);
    let ips = store.available(&args.start, &args.end, limit)?;
    match format {
        OutputFormat::Text => println!("{}", render_available(&ips)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&ips)?),
    }
    Ok(())
}
