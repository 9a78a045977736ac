// SPDX-License-Identifier: MPL-2.0

//! Subcommands of the `mobros` binary.

mod build_deps;
mod install;
mod installer;
mod scripts;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;

use mobros::config::{ResolverConfig, Settings};
use mobros::oracle::{AptOracle, OfflineOracle, Oracle};
use mobros::planner::InstallPlan;
use mobros::resolver::Resolver;

pub use build_deps::BuildDependenciesArgs;
pub use install::InstallArgs;
pub use scripts::ScriptArgs;

/// Dependency resolver and installer for robotics workspaces.
#[derive(Parser, Debug)]
#[command(name = "mobros", version, about)]
pub struct Cli {
    /// Log every rule and decision.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Settings file, defaults to /etc/mobros/config.toml when present.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve and install packages
    Install(InstallArgs),

    /// Resolve and install the dependencies of a workspace
    #[command(name = "install-build-dependencies")]
    InstallBuildDependencies(BuildDependenciesArgs),

    /// Build a workspace
    Build(ScriptArgs),

    /// Package a built workspace
    Pack(ScriptArgs),

    /// Raise the version of workspace packages
    Raise(ScriptArgs),

    /// Publish packages
    Publish(ScriptArgs),

    /// Check the tool is reachable
    Ping(ScriptArgs),
}

/// Flags shared by the commands that resolve and install.
#[derive(Args, Debug, Default)]
pub struct PlanArgs {
    /// Allow installed packages to change version
    #[arg(long)]
    pub upgrade_installed: bool,

    /// Do not ask for confirmation
    #[arg(short = 'y', long = "yes")]
    pub yes: bool,

    /// Resolve against an offline package index (RON) instead of apt
    #[arg(long, value_name = "FILE")]
    pub index: Option<PathBuf>,

    /// Write the plan but do not install anything
    #[arg(long)]
    pub simulate: bool,

    /// Size of the resolver worker pool
    #[arg(short, long)]
    pub jobs: Option<usize>,
}

impl PlanArgs {
    fn resolver_config(&self, settings: &Settings) -> ResolverConfig {
        let mut config = settings.resolver.clone();
        config.upgrade_installed |= self.upgrade_installed;
        if self.jobs.is_some() {
            config.jobs = self.jobs;
        }
        config
    }
}

/// Run a command, returning the process exit code.
pub fn execute(cli: Cli) -> Result<i32> {
    let settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;
    match cli.command {
        Commands::Install(args) => install::execute(args, &settings),
        Commands::InstallBuildDependencies(args) => build_deps::execute(args, &settings),
        Commands::Build(args) => scripts::execute("build", args, &settings),
        Commands::Pack(args) => scripts::execute("pack", args, &settings),
        Commands::Raise(args) => scripts::execute("raise", args, &settings),
        Commands::Publish(args) => scripts::execute("publish", args, &settings),
        Commands::Ping(args) => scripts::execute("ping", args, &settings),
    }
}

fn load_oracle(index: Option<&Path>) -> Result<Box<dyn Oracle>> {
    let Some(path) = index else {
        return Ok(Box::new(AptOracle::new()));
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read package index {}", path.display()))?;
    let oracle: OfflineOracle = ron::from_str(&text)
        .with_context(|| format!("Invalid package index {}", path.display()))?;
    info!("Using offline package index {}", path.display());
    Ok(Box::new(oracle))
}

fn has_privileges() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

/// Resolve what `register` asks for, write the plan and install it.
fn resolve_and_install(
    args: &PlanArgs,
    settings: &Settings,
    oracle: &dyn Oracle,
    register: impl FnOnce(&mut Resolver<&dyn Oracle>) -> Result<()>,
) -> Result<i32> {
    let mut resolver = Resolver::new(oracle, args.resolver_config(settings))?;
    register(&mut resolver)?;
    let resolution = resolver.resolve()?;
    if resolution.candidates.is_empty() {
        info!("Nothing to install");
        return Ok(0);
    }

    let plan = InstallPlan::new(&resolution, oracle)?;
    let output_dir = &settings.cli.output_dir;
    plan.write_to(output_dir)
        .with_context(|| format!("Failed to write the plan into {}", output_dir.display()))?;
    for token in &plan.install {
        println!("{}", token);
    }

    if args.simulate {
        info!("Simulation, nothing was installed");
        return Ok(0);
    }
    if !args.yes && !installer::confirm(plan.install.len())? {
        info!("Aborted");
        return Ok(0);
    }
    installer::install(&settings.cli.installer, &plan, args.yes)?;
    Ok(0)
}
