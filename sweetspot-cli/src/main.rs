// sweetspot-cli/src/main.rs
//
// Entry point for the `sweetspot` binary: parses arguments, installs the
// logger and the Ctrl-C handler, and maps the outcome to an exit code.

use clap::Parser;
use std::process::ExitCode;

use sweetspot_cli::logging::init_logging;
use sweetspot_cli::{Cli, run};
use sweetspot_core::{CancellationToken, CoreError, ProcessContext};

/// Exit code for a run stopped by Ctrl-C.
const EXIT_CANCELLED: u8 = 130;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        log::warn!("Interrupt received; stopping running trials");
        handler_token.cancel();
    }) {
        log::warn!("Could not install Ctrl-C handler: {}", e);
    }

    let ctx = ProcessContext::new(cancel, Default::default());
    match run(cli, &ctx) {
        Ok(false) => ExitCode::SUCCESS,
        Ok(true) => ExitCode::from(EXIT_CANCELLED),
        Err(e) if matches!(e.downcast_ref::<CoreError>(), Some(CoreError::Cancelled)) => {
            log::warn!("Cancelled");
            ExitCode::from(EXIT_CANCELLED)
        }
        Err(e) => {
            log::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
