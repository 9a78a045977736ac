// SPDX-License-Identifier: MPL-2.0

//! `mobros install`

use std::path::Path;

use anyhow::Result;
use clap::Args;
use log::warn;

use mobros::config::Settings;

use super::PlanArgs;

#[derive(Args, Debug)]
pub struct InstallArgs {
    /// Packages to install, as `name`, `name=version` or a path to a .deb archive
    #[arg(long = "pkg_list", alias = "pkg-list", num_args = 0.., value_name = "PACKAGE")]
    pub pkg_list: Vec<String>,

    #[command(flatten)]
    pub plan: PlanArgs,
}

/// One entry of `--pkg_list`.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Request<'a> {
    Name(&'a str),
    Pinned(&'a str, &'a str),
    Archive(&'a Path),
}

fn parse_request(token: &str) -> Request<'_> {
    if token.ends_with(".deb") {
        return Request::Archive(Path::new(token));
    }
    match token.split_once('=') {
        Some((name, version)) if !version.is_empty() => Request::Pinned(name, version),
        Some((name, _)) => Request::Name(name),
        None => Request::Name(token),
    }
}

pub fn execute(args: InstallArgs, settings: &Settings) -> Result<i32> {
    if args.pkg_list.is_empty() {
        warn!("No package requested, nothing to do");
        return Ok(0);
    }
    if !args.plan.simulate && !super::has_privileges() {
        eprintln!("Installing packages requires root privileges, run again with sudo or use --simulate");
        return Ok(1);
    }

    let oracle = super::load_oracle(args.plan.index.as_deref())?;
    super::resolve_and_install(&args.plan, settings, oracle.as_ref(), |resolver| {
        for token in &args.pkg_list {
            match parse_request(token) {
                Request::Name(name) => resolver.register_root(name, None)?,
                Request::Pinned(name, version) => resolver.register_root(name, Some(version))?,
                Request::Archive(path) => resolver.register_local_archive(path)?,
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests() {
        assert_eq!(parse_request("curl"), Request::Name("curl"));
        assert_eq!(parse_request("curl="), Request::Name("curl"));
        assert_eq!(
            parse_request("ros-humble-rclcpp=16.0.8-1jammy"),
            Request::Pinned("ros-humble-rclcpp", "16.0.8-1jammy")
        );
        assert_eq!(
            parse_request("./build/my-robot_1.0_amd64.deb"),
            Request::Archive(Path::new("./build/my-robot_1.0_amd64.deb"))
        );
    }
}
