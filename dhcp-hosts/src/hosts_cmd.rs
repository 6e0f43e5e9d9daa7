use anyhow::Result;
use dhcp_hosts::report::{render_outcome, render_rejection};
use dhcp_hosts::store::{HostError, HostStore, MutationOutcome};
use serde_json::json;

use crate::cli::{CreateArgs, DeleteArgs, OutputFormat, RenameArgs, UpdateArgs};

pub fn run_create(store: &HostStore, args: CreateArgs, format: OutputFormat) -> Result<()> {
    report(store.create(&args.name, &args.mac, &args.ip), format)
}

pub fn run_update(store: &HostStore, args: UpdateArgs, format: OutputFormat) -> Result<()> {
    report(store.update(&args.name, &args.mac, &args.ip), format)
}

pub fn run_rename(store: &HostStore, args: RenameArgs, format: OutputFormat) -> Result<()> {
    report(store.rename(&args.name, &args.new_name), format)
}

pub fn run_delete(store: &HostStore, args: DeleteArgs, format: OutputFormat) -> Result<()> {
    report(store.delete(&args.name), format)
}

/// Print the outcome, or the failure in the requested format before returning it.
fn report(result: Result<MutationOutcome, HostError>, format: OutputFormat) -> Result<()> {
    match (result, format) {
        (Ok(outcome), OutputFormat::Text) => println!("{}", render_outcome(&outcome)),
        (Ok(outcome), OutputFormat::Json) => {
            let mut value = serde_json::to_value(&outcome)?;
            value["success"] = json!(true);
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        (Err(err), OutputFormat::Text) => {
            if let HostError::Rejected(rejection) = &err {
                println!("{}", render_rejection(rejection));
            }
            return Err(err.into());
        }
        (Err(err), OutputFormat::Json) => {
            let value = json!({
                "success": false,
                "code": err.code(),
                "message": err.to_string(),
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
            return Err(err.into());
        }
    }
    Ok(())
}
