// SPDX-License-Identifier: MPL-2.0

//! Commands delegated to `mobros-<command>` scripts.

use std::process::Command;

use anyhow::{bail, Context, Result};
use clap::Args;
use log::debug;

use mobros::config::Settings;

#[derive(Args, Debug)]
pub struct ScriptArgs {
    /// Arguments passed to the script
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

pub fn execute(command: &str, args: ScriptArgs, settings: &Settings) -> Result<i32> {
    let script = settings.cli.scripts_dir.join(format!("mobros-{}", command));
    if !script.is_file() {
        bail!("{} is not installed", script.display());
    }
    debug!("Running {} {:?}", script.display(), args.args);
    let status = Command::new(&script)
        .args(&args.args)
        .status()
        .with_context(|| format!("Failed to run {}", script.display()))?;
    Ok(status.code().unwrap_or(1))
}
