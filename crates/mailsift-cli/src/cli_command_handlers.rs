use anyhow::{Context, Result};
use log::info;
use mailsift_core::FilterSpec;
use mailsift_mail::{check_connection, fetch_messages};
use serde_json::json;

use crate::cli::{CheckCmd, Cli, CliCommand, FetchCmd};
use crate::cli_config::{CliConfig, load_cli_config, resolve_account};
use crate::cli_runtime_helpers::{FetchReport, output_ok, write_text_atomic};

pub(crate) fn run_cli(cli: Cli) -> Result<()> {
    let config = load_cli_config(cli.config.as_deref())?;
    match cli.command {
        CliCommand::Fetch(cmd) => run_fetch(&config, cmd),
        CliCommand::Check(cmd) => run_check(&config, cmd),
    }
}

/// Flags win over `[fetch]` defaults.
pub(crate) fn filter_from_args(config: &CliConfig, cmd: &FetchCmd) -> FilterSpec {
    FilterSpec {
        keyword: cmd.keyword.clone(),
        status: cmd.status.unwrap_or(config.fetch.status),
        max_results: cmd.limit.or(config.fetch.limit),
    }
}

fn run_fetch(config: &CliConfig, cmd: FetchCmd) -> Result<()> {
    let account = resolve_account(config, cmd.account.as_deref())?;
    let params = account.connection_params(cmd.mailbox.as_deref())?;
    let filter = filter_from_args(config, &cmd);
    let result = fetch_messages(&params, &filter)?;
    let report = FetchReport::new(&account.name, &params.mailbox, &result);
    let value = serde_json::to_value(&report)?;
    if let Some(path) = cmd.out.as_deref() {
        let text = serde_json::to_string_pretty(&value)?;
        write_text_atomic(path, &text)
            .with_context(|| format!("Cannot write {}", path.display()))?;
        info!("fetch result written path={}", path.display());
    }
    output_ok(value)
}

fn run_check(config: &CliConfig, cmd: CheckCmd) -> Result<()> {
    let account = resolve_account(config, cmd.account.as_deref())?;
    let params = account.connection_params(cmd.mailbox.as_deref())?;
    let total = check_connection(&params)?;
    output_ok(json!({
        "account": account.name,
        "host": params.host,
        "port": params.port,
        "mailbox": params.mailbox,
        "total_count": total,
    }))
}
