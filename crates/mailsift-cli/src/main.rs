use std::process::ExitCode;

use clap::Parser;

mod cli;
mod cli_command_handlers;
mod cli_config;
mod cli_runtime_helpers;
mod logging;

use cli::Cli;
use cli_command_handlers::run_cli;
use cli_runtime_helpers::output_error;

const CLI_SCHEMA_VERSION: &str = "mailsift.cli.v1";

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init();
    match run_cli(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::debug!("command failed: {:?}", err);
            if let Err(print_err) = output_error(&format!("{:#}", err)) {
                eprintln!("{}", print_err);
            }
            ExitCode::FAILURE
        }
    }
}
