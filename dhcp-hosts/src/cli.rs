use std::path::PathBuf;

use clap::{Args, Parser, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "dhcp-hosts")]
#[command(about = "Manage static host reservations in an ISC dhcpd.conf")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Settings TOML file. Defaults to /etc/dhcp-hosts/settings.toml if present.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// dhcpd.conf to manage (overrides settings).
    #[arg(long, global = true)]
    pub conf: Option<PathBuf>,
    /// Rules script with checa_regra lines (overrides settings).
    #[arg(long, global = true)]
    pub rules: Option<PathBuf>,
    /// Name recorded in audit entries. Defaults to $USER.
    #[arg(long, global = true)]
    pub actor: Option<String>,
    /// Log filter used when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// List registered hosts with the rule covering each address.
    Hosts,
    /// Count hosts, rules and used addresses.
    Stats,
    /// List address rules from the rules script.
    Rules,
    /// List free addresses in a range.
    Available(AvailableArgs),
    /// Register a new host.
    Create(CreateArgs),
    /// Change the MAC and IP of an existing host.
    Update(UpdateArgs),
    /// Give an existing host a new name.
    Rename(RenameArgs),
    /// Remove a host.
    Delete(DeleteArgs),
    /// Show the DHCP service status.
    Status,
    /// Restart the DHCP service.
    Restart,
}

#[derive(Parser, Debug)]
pub struct AvailableArgs {
    #[arg(long)]
    pub start: String,
    #[arg(long)]
    pub end: String,
    /// Maximum number of addresses to list (overrides settings).
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Parser, Debug)]
pub struct CreateArgs {
    pub name: String,
    #[arg(long)]
    pub mac: String,
    #[arg(long)]
    pub ip: String,
}

#[derive(Parser, Debug)]
pub struct UpdateArgs {
    pub name: String,
    #[arg(long)]
    pub mac: String,
    #[arg(long)]
    pub ip: String,
}

#[derive(Parser, Debug)]
pub struct RenameArgs {
    pub name: String,
    pub new_name: String,
}

#[derive(Parser, Debug)]
pub struct DeleteArgs {
    pub name: String,
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}
