// SPDX-License-Identifier: MPL-2.0

//! Hand the plan over to the system installer.

use std::io::{BufRead, Write};
use std::process::Command;

use anyhow::{bail, Context, Result};
use log::info;

use mobros::planner::InstallPlan;

/// Ask on the terminal before installing `count` packages.
pub fn confirm(count: usize) -> Result<bool> {
    print!("{} packages will be installed, continue? [y/N] ", count);
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

/// Install the plan, then hold the requested packages and mark
/// the others as automatically installed.
pub fn install(installer: &str, plan: &InstallPlan, non_interactive: bool) -> Result<()> {
    let mut install = Command::new(installer);
    install
        .args(["install", "-y", "--allow-downgrades", "--no-install-recommends"])
        .args(&plan.install);
    if non_interactive {
        install.env("DEBIAN_FRONTEND", "noninteractive");
    }
    info!("Installing {} packages", plan.install.len());
    run(install)?;

    if !plan.hold.is_empty() {
        let mut hold = Command::new("apt-mark");
        hold.arg("hold").args(&plan.hold);
        run(hold)?;
    }
    if !plan.auto.is_empty() {
        let mut auto = Command::new("apt-mark");
        auto.arg("auto").args(&plan.auto);
        run(auto)?;
    }
    Ok(())
}

fn run(mut command: Command) -> Result<()> {
    let program = command.get_program().to_string_lossy().into_owned();
    let status = command
        .status()
        .with_context(|| format!("Failed to run {}", program))?;
    if !status.success() {
        bail!("{} failed with {}", program, status);
    }
    Ok(())
}
