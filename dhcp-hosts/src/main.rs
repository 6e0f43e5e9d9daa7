use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use dhcp_hosts::settings::Settings;
use dhcp_hosts::store::{HostError, HostStore};
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod cli;
mod hosts_cmd;
mod query_cmd;
mod service_cmd;

use cli::{Cli, Command, GlobalArgs};

const DEFAULT_SETTINGS_PATH: &str = "/etc/dhcp-hosts/settings.toml";

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&cli.global.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            exit_code(&err)
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let settings = load_settings(&cli.global)?;
    let store = open_store(&cli.global, &settings);
    let format = cli.global.format;

    match cli.command {
        Command::Hosts => query_cmd::run_hosts(&store, format),
        Command::Stats => query_cmd::run_stats(&store, format),
        Command::Rules => query_cmd::run_rules(&store, format),
        Command::Available(args) => {
            query_cmd::run_available(&store, args, settings.available_limit, format)
        }
        Command::Create(args) => hosts_cmd::run_create(&store, args, format),
        Command::Update(args) => hosts_cmd::run_update(&store, args, format),
        Command::Rename(args) => hosts_cmd::run_rename(&store, args, format),
        Command::Delete(args) => hosts_cmd::run_delete(&store, args, format),
        Command::Status => service_cmd::run_status(&store, format),
        Command::Restart => service_cmd::run_restart(&store, format),
    }
}

/// An explicit `--config` must exist; the default location is optional.
fn load_settings(global: &GlobalArgs) -> Result<Settings> {
    let mut settings = match &global.config {
        Some(path) => Settings::load(path)
            .with_context(|| format!("failed to load settings {}", path.display()))?,
        None if Path::new(DEFAULT_SETTINGS_PATH).exists() => {
            Settings::load(Path::new(DEFAULT_SETTINGS_PATH))?
        }
        None => Settings::default(),
    };

    if let Some(conf) = &global.conf {
        settings.conf_path = conf.clone();
    }
    if let Some(rules) = &global.rules {
        settings.rules_path = rules.clone();
    }
    debug!(
        conf = %settings.conf_path.display(),
        rules = %settings.rules_path.display(),
        "settings loaded"
    );
    Ok(settings)
}

fn open_store(global: &GlobalArgs, settings: &Settings) -> HostStore {
    let actor = global
        .actor
        .clone()
        .or_else(|| std::env::var("USER").ok().filter(|u| !u.is_empty()))
        .unwrap_or_else(|| "anonymous".to_string());

    HostStore::new(
        &settings.conf_path,
        &settings.rules_path,
        settings.service_controller(),
        settings.audit_sink(),
    )
    .with_lock_timeout(settings.lock_timeout())
    .with_actor(actor)
}

/// 2 for rejected input, 3 for an unknown host, 1 for everything else.
fn exit_code(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<HostError>() {
        Some(HostError::Rejected(_)) => ExitCode::from(2),
        Some(HostError::NotFound { .. }) => ExitCode::from(3),
        _ => ExitCode::FAILURE,
    }
}
