// SPDX-License-Identifier: MPL-2.0

//! `mobros` command line.

mod cli;

use std::process::ExitCode;

use clap::Parser;
use mobros::error::ResolveError;

/// Exit code of an irrecoverable conflict.
const CONFLICT_EXIT_CODE: u8 = 3;

fn main() -> ExitCode {
    let args = cli::Cli::parse();
    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();

    match cli::execute(args) {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(u8::MAX)),
        Err(err) => {
            eprintln!("Error: {:#}", err);
            match err.downcast_ref::<ResolveError>() {
                Some(ResolveError::Conflict(_)) => ExitCode::from(CONFLICT_EXIT_CODE),
                _ => ExitCode::FAILURE,
            }
        }
    }
}
