// SPDX-License-Identifier: MPL-2.0

//! Turn a [Resolution] into the ordered lists handed to the installer.
//!
//! Packages are ordered leaves first: a package always comes after
//! everything it depends on. Requested packages constrained by nothing but
//! the user are kept apart and installed last, in the order they were asked for.

use std::cmp::Reverse;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{debug, info};
use priority_queue::PriorityQueue;
use tempfile::NamedTempFile;

use crate::error::OracleError;
use crate::oracle::Oracle;
use crate::resolver::Resolution;
use crate::rule::Author;
use crate::type_aliases::{FxBuildHasher, OrderedSet};

/// Main installation plan.
pub const INSTALL_FILE: &str = "packages.apt";
/// Packages to mark as automatically installed.
pub const AUTO_FILE: &str = "packages_auto.apt";
/// Packages to hold at their version.
pub const HOLD_FILE: &str = "packages_hold.apt";
/// Rendering of the dependency tree.
pub const TREE_FILE: &str = "tree.mobtree";

/// The plan written for the installer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallPlan {
    /// `name=version` tokens, or archive paths, in installation order.
    pub install: Vec<String>,
    /// Requested package names.
    pub hold: Vec<String>,
    /// Names brought in as dependencies and not installed yet.
    pub auto: Vec<String>,
    /// Tree rendering, labelled with chosen versions.
    pub tree: String,
}

impl InstallPlan {
    /// Build the plan of `resolution`.
    /// The oracle is asked which dependencies are already installed.
    pub fn new<O: Oracle + ?Sized>(resolution: &Resolution, oracle: &O) -> Result<Self, OracleError> {
        let order = install_order(resolution);
        let requested: OrderedSet<&str> = resolution.requested.iter().map(String::as_str).collect();

        let mut install = Vec::with_capacity(order.len());
        let mut hold = Vec::new();
        let mut auto = Vec::new();
        for name in &order {
            let Some(candidate) = resolution.candidates.get(name.as_str()) else {
                continue;
            };
            match resolution.archives.get(name.as_str()) {
                Some(path) => install.push(path.display().to_string()),
                None => install.push(candidate.pin()),
            }
            if requested.contains(name.as_str()) {
                hold.push(name.clone());
            } else if !oracle.is_installed(name, Some(&candidate.version))? {
                auto.push(name.clone());
            }
        }

        let tree = resolution.tree.render_with(|name| {
            resolution
                .candidates
                .get(name)
                .map(|c| c.pin())
                .unwrap_or_else(|| name.to_string())
        });
        info!(
            "Plan: {} to install, {} to hold, {} automatic",
            install.len(),
            hold.len(),
            auto.len()
        );
        Ok(Self {
            install,
            hold,
            auto,
            tree,
        })
    }

    /// Whether there is nothing to install.
    pub fn is_empty(&self) -> bool {
        self.install.is_empty()
    }

    /// Write the plan files into `dir`.
    ///
    /// Every file is first written to a temporary file in `dir`,
    /// the temporaries are only renamed once all of them were written.
    pub fn write_to(&self, dir: &Path) -> std::io::Result<Vec<PathBuf>> {
        let contents = [
            (INSTALL_FILE, tokens(&self.install)),
            (AUTO_FILE, tokens(&self.auto)),
            (HOLD_FILE, tokens(&self.hold)),
            (TREE_FILE, self.tree.clone()),
        ];
        let mut staged = Vec::with_capacity(contents.len());
        for (file, content) in contents {
            let mut temp = NamedTempFile::new_in(dir)?;
            temp.write_all(content.as_bytes())?;
            temp.as_file().sync_all()?;
            staged.push((temp, dir.join(file)));
        }
        let mut written = Vec::with_capacity(staged.len());
        for (temp, path) in staged {
            temp.persist(&path)?;
            debug!("Wrote {}", path.display());
            written.push(path);
        }
        Ok(written)
    }
}

fn tokens(list: &[String]) -> String {
    if list.is_empty() {
        String::new()
    } else {
        let mut out = list.join(" ");
        out.push('\n');
        out
    }
}

/// Whether `name` was requested and every rule on it comes from the user.
///
/// A rule imposed by another package, by the installed system or by the
/// resolver makes it an ordinary package of the main section.
pub fn is_independent(resolution: &Resolution, name: &str) -> bool {
    let rules = resolution.bank.rules_for(name);
    resolution.requested.iter().any(|r| r == name)
        && !rules.is_empty()
        && rules.iter().all(|r| r.from == Author::User)
}

/// Names of the resolution in installation order.
pub fn install_order(resolution: &Resolution) -> Vec<String> {
    let position = |name: &str| {
        resolution
            .requested
            .iter()
            .position(|r| r == name)
            .map_or(0, |p| p + 1)
    };
    let depths = resolution.tree.depths();

    // Shallow first, requested in input order among equal depths.
    let mut queue: PriorityQueue<String, Reverse<(usize, usize, usize)>, FxBuildHasher> =
        PriorityQueue::default();
    for (seq, name) in resolution.tree.names().into_iter().enumerate() {
        if is_independent(resolution, &name) || !resolution.candidates.contains_key(&name) {
            continue;
        }
        let depth = depths.get(&name).copied().unwrap_or(0);
        let tiebreak = position(&name);
        queue.push(name, Reverse((depth, tiebreak, seq)));
    }
    let mut main = Vec::with_capacity(queue.len());
    while let Some((name, _)) = queue.pop() {
        main.push(name);
    }
    main.reverse();

    main.extend(
        resolution
            .requested
            .iter()
            .filter(|name| resolution.candidates.contains_key(name.as_str()))
            .filter(|name| is_independent(resolution, name))
            .cloned(),
    );
    main
}

// TESTS #######################################################################

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResolverConfig;
    use crate::oracle::OfflineOracle;
    use crate::resolver::Resolver;
    use crate::rule::{Dependency, Operator};

    fn oracle() -> OfflineOracle {
        let mut oracle = OfflineOracle::new();
        oracle.add_dependencies("p1", "1.0", [vec![Dependency::any("p2")], vec![Dependency::any("lib")]]);
        oracle.add_dependencies("p2", "2.0", [vec![Dependency::new("lib", Operator::Gte, "1")]]);
        oracle.add_dependencies("p3", "3.0", []);
        oracle.add_dependencies("lib", "1.4", []);
        oracle.set_installed("lib", "1.4");
        oracle
    }

    fn resolve(oracle: &OfflineOracle, roots: &[&str]) -> Resolution {
        let mut resolver = Resolver::new(oracle, ResolverConfig::default()).unwrap();
        for root in roots {
            resolver.register_root(root, None).unwrap();
        }
        resolver.resolve().unwrap()
    }

    #[test]
    fn leaves_first_and_independent_roots_last() {
        let oracle = oracle();
        let resolution = resolve(&oracle, &["p1", "p2", "p3"]);
        let plan = InstallPlan::new(&resolution, &oracle).unwrap();
        assert_eq!(plan.install, vec!["lib=1.4", "p2=2.0", "p1=1.0", "p3=3.0"]);
        assert_eq!(plan.hold, vec!["p2", "p1", "p3"]);
        // lib is installed at the chosen version already.
        assert!(plan.auto.is_empty());
    }

    #[test]
    fn installed_roots_are_not_independent() {
        let mut oracle = oracle();
        oracle.set_installed("p3", "3.0");
        let resolution = resolve(&oracle, &["p1", "p3"]);
        assert!(is_independent(&resolution, "p1"));
        assert!(!is_independent(&resolution, "p3"));
        let plan = InstallPlan::new(&resolution, &oracle).unwrap();
        assert_eq!(plan.install, vec!["lib=1.4", "p2=2.0", "p3=3.0", "p1=1.0"]);
        assert_eq!(plan.hold, vec!["p3", "p1"]);
    }

    #[test]
    fn dependencies_not_installed_are_automatic() {
        let mut oracle = oracle();
        oracle.set_installed("lib", "1.0");
        oracle.add_dependencies("lib", "1.0", []);
        let mut resolver = Resolver::new(
            &oracle,
            ResolverConfig {
                upgrade_installed: true,
                ..ResolverConfig::default()
            },
        )
        .unwrap();
        resolver.register_root("p2", None).unwrap();
        let resolution = resolver.resolve().unwrap();
        let plan = InstallPlan::new(&resolution, &oracle).unwrap();
        assert_eq!(plan.install, vec!["lib=1.4", "p2=2.0"]);
        assert_eq!(plan.auto, vec!["lib"]);
    }

    #[test]
    fn files_are_written_together() {
        let oracle = oracle();
        let plan = InstallPlan::new(&resolve(&oracle, &["p3", "p1"]), &oracle).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let written = plan.write_to(dir.path()).unwrap();
        assert_eq!(written.len(), 4);
        let read = |f: &str| std::fs::read_to_string(dir.path().join(f)).unwrap();
        assert_eq!(read(INSTALL_FILE), "lib=1.4 p2=2.0 p3=3.0 p1=1.0\n");
        assert_eq!(read(HOLD_FILE), "p3 p1\n");
        assert_eq!(read(AUTO_FILE), "p2\n");
        assert!(read(TREE_FILE).starts_with("/\n├── p3=3.0\n"));
        // Nothing left behind but the plan.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 4);
    }

    #[test]
    fn empty_resolution_gives_empty_files() {
        let oracle = OfflineOracle::new();
        let plan = InstallPlan::new(&resolve(&oracle, &[]), &oracle).unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.tree, "/\n");
    }
}
