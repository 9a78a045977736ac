// SPDX-License-Identifier: MPL-2.0

//! `mobros install-build-dependencies`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use log::{debug, info, warn};

use mobros::config::Settings;
use mobros::manifest::{self, DependencyKind};
use mobros::oracle::Oracle;
use mobros::package::{ManifestPackage, Package};
use mobros::type_aliases::{Map, Set};

use super::PlanArgs;

#[derive(Args, Debug)]
pub struct BuildDependenciesArgs {
    /// Workspace holding the package.xml manifests
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Also install the runtime dependencies
    #[arg(long)]
    pub exec: bool,

    #[command(flatten)]
    pub plan: PlanArgs,
}

/// Debian package name of the ROS package `name`.
pub fn ros_package_name(distro: &str, name: &str) -> String {
    format!("ros-{}-{}", distro, name.replace('_', "-"))
}

/// Map a manifest dependency to the name known by the oracle:
/// the ROS package when it exists, the raw name otherwise.
fn system_name(oracle: &dyn Oracle, distro: &str, name: &str) -> Result<String> {
    let ros = ros_package_name(distro, name);
    if !oracle.available_versions(&ros)?.is_empty() {
        return Ok(ros);
    }
    Ok(name.to_string())
}

/// Read every manifest of `workspace`, keeping only dependencies
/// on packages outside of it, renamed to system package names.
fn workspace_packages(
    args: &BuildDependenciesArgs,
    settings: &Settings,
    oracle: &dyn Oracle,
) -> Result<Vec<ManifestPackage>> {
    let kinds = if args.exec {
        DependencyKind::ALL
    } else {
        DependencyKind::BUILD
    };
    let mut packages = Vec::new();
    for path in manifest::discover(&args.workspace)? {
        packages.push(manifest::read(&path, kinds)?);
    }
    info!(
        "Found {} packages in {}",
        packages.len(),
        args.workspace.display()
    );

    let local: Set<String> = packages.iter().map(|p| p.name().to_string()).collect();
    let mut names: Map<String, String> = Map::default();
    for package in &mut packages {
        package.retain_dependencies(|dep| !local.contains(dep));
        for dep in package.dependencies().keys() {
            if !names.contains_key(dep) {
                let system = system_name(oracle, &settings.cli.ros_distro, dep)
                    .with_context(|| format!("Failed to look up {}", dep))?;
                debug!("{} is installed as {}", dep, system);
                names.insert(dep.clone(), system);
            }
        }
        package.map_names(|dep| names.get(dep).cloned().unwrap_or_else(|| dep.to_string()));
    }
    Ok(packages)
}

pub fn execute(args: BuildDependenciesArgs, settings: &Settings) -> Result<i32> {
    if !args.plan.simulate && !super::has_privileges() {
        eprintln!("Installing packages requires root privileges, run again with sudo or use --simulate");
        return Ok(1);
    }
    let oracle = super::load_oracle(args.plan.index.as_deref())?;
    let packages = workspace_packages(&args, settings, oracle.as_ref())?;
    if packages.iter().all(|p| p.dependencies().is_empty()) {
        warn!("The workspace has no external dependency, nothing to do");
        return Ok(0);
    }
    super::resolve_and_install(&args.plan, settings, oracle.as_ref(), |resolver| {
        for package in &packages {
            resolver.register_package(package)?;
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mobros::oracle::OfflineOracle;

    #[test]
    fn ros_names() {
        assert_eq!(ros_package_name("humble", "rclcpp"), "ros-humble-rclcpp");
        assert_eq!(
            ros_package_name("jazzy", "ament_cmake_gtest"),
            "ros-jazzy-ament-cmake-gtest"
        );
    }

    #[test]
    fn workspace_dependencies_are_mapped() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = |pkg: &str, deps: &str| {
            let path = dir.path().join("src").join(pkg);
            std::fs::create_dir_all(&path).unwrap();
            std::fs::write(
                path.join("package.xml"),
                format!("<package format=\"3\"><name>{}</name><version>1.0.0</version>{}</package>", pkg, deps),
            )
            .unwrap();
        };
        manifest("driver", "<depend>rclcpp</depend><depend>libusb-1.0-0-dev</depend>");
        manifest("app", "<depend>driver</depend><exec_depend>launch_ros</exec_depend>");

        let mut oracle = OfflineOracle::new();
        oracle.add_dependencies("ros-humble-rclcpp", "16.0.8-1", []);
        oracle.add_dependencies("libusb-1.0-0-dev", "2:1.0.25-1", []);

        let args = BuildDependenciesArgs {
            workspace: dir.path().to_path_buf(),
            exec: false,
            plan: PlanArgs::default(),
        };
        let packages = workspace_packages(&args, &Settings::default(), &oracle).unwrap();
        let app = packages.iter().find(|p| p.name() == "app").unwrap();
        assert!(app.dependencies().is_empty());
        let driver = packages.iter().find(|p| p.name() == "driver").unwrap();
        let deps: Vec<_> = driver.dependencies().keys().cloned().collect();
        assert_eq!(deps, vec!["ros-humble-rclcpp", "libusb-1.0-0-dev"]);
    }
}
