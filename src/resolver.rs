// SPDX-License-Identifier: MPL-2.0

//! Greedy dependency resolution with bounded recomputation.
//!
//! The resolver registers the packages requested by the user as children
//! of the root of a [DependencyTree], then loops until nothing changes:
//!
//! 1. every newly chosen version is expanded: the oracle gives its
//!    dependencies, which become rules in the [ConstraintBank] and tree edges,
//! 2. the rules of every touched package are checked for conflicts,
//! 3. a version is chosen for every touched package without one.
//!
//! When a new rule excludes a version chosen earlier, the subtree of that
//! package is detached, the rules its dependencies imposed are removed,
//! and it goes back to selection. Every recomputation removes at least one
//! version from consideration so the loop terminates, and a hard bound is
//! enforced anyway.
//!
//! Conflict checks and candidate selection fan out on a [rayon] pool.
//! The oracle is only called from the thread driving the resolver.
//!
//! ```
//! # use mobros::oracle::OfflineOracle;
//! # use mobros::resolver::Resolver;
//! # use mobros::rule::{Dependency, Operator};
//! # use mobros::config::ResolverConfig;
//! let mut oracle = OfflineOracle::new();
//! oracle.add_dependencies("app", "1.0", [vec![Dependency::new("lib", Operator::Lt, "2")]]);
//! oracle.add_dependencies("lib", "1.5", []);
//! oracle.add_dependencies("lib", "2.0", []);
//!
//! let mut resolver = Resolver::new(oracle, ResolverConfig::default())?;
//! resolver.register_root("app", None)?;
//! let resolution = resolver.resolve()?;
//! assert_eq!(resolution.candidates["lib"].version, "1.5");
//! # Ok::<(), mobros::error::ResolveError>(())
//! ```

use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use rayon::prelude::*;

use crate::bank::ConstraintBank;
use crate::config::ResolverConfig;
use crate::conflict::{self, ConflictDetected};
use crate::error::{OracleError, ResolveError};
use crate::oracle::Oracle;
use crate::package::{DependencyRules, LocalFilePackage, OraclePackage, Package};
use crate::rule::{Author, Operator, VersionRule};
use crate::selector::{self, CandidateNotFound};
use crate::tree::{DependencyTree, ROOT};
use crate::type_aliases::{InstallCandidates, Map, OrderedMap, OrderedSet, Set};
use crate::version::{self, SortOrder};

/// Outcome of a successful resolution.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Chosen version of every package.
    pub candidates: InstallCandidates,
    /// Rules every candidate satisfies.
    pub bank: ConstraintBank,
    /// Who depends on whom.
    pub tree: DependencyTree,
    /// Names the user asked for, in input order.
    pub requested: Vec<String>,
    /// Packages supplied as local archives, by name.
    pub archives: OrderedMap<String, PathBuf>,
    /// Inputs skipped because they are virtual packages.
    pub skipped: Vec<String>,
}

/// Main structure of the library, see the [module documentation](self).
pub struct Resolver<O: Oracle> {
    oracle: O,
    config: ResolverConfig,
    pool: rayon::ThreadPool,
    bank: ConstraintBank,
    tree: DependencyTree,
    candidates: InstallCandidates,
    /// Version each package was last expanded at.
    expanded: Map<String, String>,
    dirty_for_conflict_check: OrderedSet<String>,
    dirty_for_candidate_recompute: OrderedSet<String>,
    requested: OrderedSet<String>,
    skipped: Vec<String>,
    archives: OrderedMap<String, LocalFilePackage>,
    relaxed: Set<String>,
    recomputations: Map<String, usize>,
    versions: Map<String, Vec<String>>,
}

impl<O: Oracle> Resolver<O> {
    /// A resolver with nothing registered.
    pub fn new(oracle: O, config: ResolverConfig) -> Result<Self, ResolveError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.jobs.unwrap_or(0))
            .thread_name(|i| format!("mobros-resolver-{}", i))
            .build()
            .map_err(|e| ResolveError::ThreadPool(e.to_string()))?;
        Ok(Self {
            oracle,
            config,
            pool,
            bank: ConstraintBank::new(),
            tree: DependencyTree::new(),
            candidates: InstallCandidates::default(),
            expanded: Map::default(),
            dirty_for_conflict_check: OrderedSet::default(),
            dirty_for_candidate_recompute: OrderedSet::default(),
            requested: OrderedSet::default(),
            skipped: Vec::new(),
            archives: OrderedMap::default(),
            relaxed: Set::default(),
            recomputations: Map::default(),
            versions: Map::default(),
        })
    }

    /// The oracle answering queries.
    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Inputs skipped because they are virtual packages.
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    /// Request `name`, at exactly `version` when one is given.
    /// Virtual packages are skipped with a warning.
    pub fn register_root(&mut self, name: &str, version: Option<&str>) -> Result<(), ResolveError> {
        if self.skip_virtual(name)? {
            return Ok(());
        }
        let rule = match version {
            Some(v) => VersionRule::equals(v, Author::User),
            None => VersionRule::any(Author::User),
        };
        self.requested.insert(name.to_string());
        self.add_rules(ROOT, name, vec![rule])
    }

    /// Request the package archive at `path`, at the version it contains.
    pub fn register_local_archive(&mut self, path: &Path) -> Result<(), ResolveError> {
        let local =
            LocalFilePackage::open(&self.oracle, path, &self.requested).map_err(|source| {
                ResolveError::Oracle {
                    package: path.display().to_string(),
                    source,
                }
            })?;
        let name = local.name().to_string();
        let version = local.version().unwrap_or_default().to_string();
        info!("Local archive {} provides {}={}", path.display(), name, version);
        self.archives.insert(name.clone(), local);
        self.versions.remove(&name);
        self.requested.insert(name.clone());
        self.add_rules(ROOT, &name, vec![VersionRule::equals(version, Author::User)])
    }

    /// Request every dependency of `package`, with the rules it imposes.
    /// This is how workspace manifests are resolved.
    pub fn register_package(&mut self, package: &dyn Package) -> Result<(), ResolveError> {
        debug!("Registering the dependencies of {}", package.name());
        for (name, rules) in package.dependencies() {
            if self.skip_virtual(name)? {
                continue;
            }
            self.requested.insert(name.clone());
            self.add_rules(ROOT, name, rules.clone())?;
        }
        Ok(())
    }

    fn skip_virtual(&mut self, name: &str) -> Result<bool, ResolveError> {
        if self.oracle.is_virtual(name).map_err(oracle_error(name))? {
            warn!("{} is a virtual package, skipping it", name);
            if !self.skipped.iter().any(|s| s == name) {
                self.skipped.push(name.to_string());
            }
            return Ok(true);
        }
        Ok(false)
    }

    /// Run the resolution until a fixpoint is reached.
    ///
    /// The resolver keeps its state: more roots may be registered
    /// afterwards and a new call continues from there.
    pub fn resolve(&mut self) -> Result<Resolution, ResolveError> {
        self.versions.clear();
        let mut iteration = 0usize;
        loop {
            iteration += 1;
            self.check_cancel()?;
            info!("Iteration {}: expanding chosen versions", iteration);
            let expanded = self.expand()?;

            self.check_cancel()?;
            info!(
                "Iteration {}: checking {} packages for conflicts",
                iteration,
                self.dirty_for_conflict_check.len()
            );
            self.check_conflicts()?;

            self.check_cancel()?;
            info!("Iteration {}: selecting candidates", iteration);
            self.select_candidates()?;

            let unexpanded = self
                .candidates
                .iter()
                .any(|(name, c)| self.expanded.get(name) != Some(&c.version));
            if expanded == 0
                && !unexpanded
                && self.dirty_for_conflict_check.is_empty()
                && self.dirty_for_candidate_recompute.is_empty()
            {
                break;
            }
        }
        info!(
            "Resolved {} packages in {} iterations",
            self.candidates.len(),
            iteration
        );
        Ok(Resolution {
            candidates: self.candidates.clone(),
            bank: self.bank.clone(),
            tree: self.tree.clone(),
            requested: self.requested.iter().cloned().collect(),
            archives: self
                .archives
                .iter()
                .map(|(name, local)| (name.clone(), local.path().to_path_buf()))
                .collect(),
            skipped: self.skipped.clone(),
        })
    }

    fn check_cancel(&self) -> Result<(), ResolveError> {
        self.oracle.should_cancel().map_err(|err| {
            debug!("Cancellation requested: {}", err);
            ResolveError::Cancelled
        })
    }

    /// Record `rules` on `name`, coming from `parent`.
    fn add_rules(
        &mut self,
        parent: &str,
        name: &str,
        rules: Vec<VersionRule>,
    ) -> Result<(), ResolveError> {
        if !self.bank.contains(name) && !self.config.upgrade_installed && !self.relaxed.contains(name) {
            if let Some(installed) = self
                .oracle
                .installed_version(name)
                .map_err(oracle_error(name))?
            {
                debug!("{} is installed at {}", name, installed);
                self.bank
                    .append_rules(name, [VersionRule::equals(installed, Author::Installed)]);
            }
        }
        let added = self.bank.append_rules(name, rules);
        for rule in &added {
            debug!("Rule on {}: {}", name, rule);
        }
        self.tree.attach(parent, name);
        self.dirty_for_conflict_check.insert(name.to_string());
        self.dirty_for_candidate_recompute.insert(name.to_string());

        let invalidated = self.candidates.get(name).and_then(|candidate| {
            added
                .iter()
                .find(|rule| rule.operator != Operator::Any && !candidate.satisfies(rule))
                .map(|rule| (candidate.version.clone(), rule.clone()))
        });
        if let Some((version, rule)) = invalidated {
            warn!(
                "{}={} does not satisfy {}, recomputing its subtree",
                name, version, rule
            );
            self.recompute(name, rule)?;
        }
        Ok(())
    }

    /// Forget the chosen version of `name` and everything it brought in.
    ///
    /// `trigger` is the rule the chosen version violates. It survives even
    /// when its author sits below `name` and gets dropped with the subtree.
    fn recompute(&mut self, name: &str, trigger: VersionRule) -> Result<(), ResolveError> {
        let count = {
            let count = self.recomputations.entry(name.to_string()).or_insert(0);
            *count += 1;
            *count
        };
        let limit = match self.config.max_recomputations {
            Some(limit) => limit,
            None => self.available(name)?.len() + 1,
        };
        if count > limit {
            return Err(ResolveError::RecomputationLimit {
                package: name.to_string(),
            });
        }

        let orphans = self.tree.detach_subtree(name);
        self.drop_authored_rules(name);
        for orphan in orphans {
            debug!("Dropping {}, nothing depends on it anymore", orphan);
            self.drop_authored_rules(&orphan);
            self.bank.remove(&orphan);
            self.candidates.shift_remove(&orphan);
            self.expanded.remove(&orphan);
            self.dirty_for_conflict_check.shift_remove(&orphan);
            self.dirty_for_candidate_recompute.shift_remove(&orphan);
        }
        self.bank.append_rules(name, [trigger]);
        self.candidates.shift_remove(name);
        self.expanded.remove(name);
        self.dirty_for_conflict_check.insert(name.to_string());
        self.dirty_for_candidate_recompute.insert(name.to_string());
        Ok(())
    }

    fn drop_authored_rules(&mut self, author: &str) {
        for touched in self.bank.remove_rules_authored_by_package(author) {
            self.dirty_for_conflict_check.insert(touched.clone());
            self.dirty_for_candidate_recompute.insert(touched);
        }
    }

    /// Versions of `name`, newest first, including a local archive of it.
    fn available(&mut self, name: &str) -> Result<&Vec<String>, ResolveError> {
        if !self.versions.contains_key(name) {
            let mut versions = self
                .oracle
                .available_versions(name)
                .map_err(oracle_error(name))?;
            if let Some(local) = self.archives.get(name) {
                let local_version = local.version().unwrap_or_default();
                if !versions
                    .iter()
                    .any(|v| version::compare(v, local_version).is_eq())
                {
                    versions.push(local_version.to_string());
                    version::sort(&mut versions, SortOrder::Descending);
                }
            }
            self.versions.insert(name.to_string(), versions);
        }
        self.versions
            .get(name)
            .ok_or_else(|| ResolveError::Failure(format!("lost the versions of {}", name)))
    }

    /// Expand every chosen version not expanded yet.
    /// Returns how many were expanded.
    fn expand(&mut self) -> Result<usize, ResolveError> {
        let pending: Vec<(String, String)> = self
            .candidates
            .iter()
            .filter(|(name, c)| self.expanded.get(*name) != Some(&c.version))
            .map(|(name, c)| (name.clone(), c.version.clone()))
            .collect();
        let mut count = 0;
        for (name, version) in pending {
            // An earlier expansion may have invalidated this one.
            if self.candidates.get(&name).map(|c| &c.version) != Some(&version) {
                continue;
            }
            self.expanded.insert(name.clone(), version.clone());
            count += 1;
            let dependencies = self.dependencies_of(&name, &version)?;
            if dependencies.contains_key(&name) {
                return Err(ResolveError::SelfDependency {
                    package: name,
                    version,
                });
            }
            debug!("{}={} has {} dependencies", name, version, dependencies.len());
            for (dependency, rules) in dependencies {
                // Recomputing a dependency can drop `name` with its subtree.
                if self.candidates.get(&name).map(|c| &c.version) != Some(&version) {
                    debug!("{}={} was dropped while being expanded", name, version);
                    break;
                }
                self.add_rules(&name, &dependency, rules)?;
            }
        }
        Ok(count)
    }

    fn dependencies_of(&self, name: &str, version: &str) -> Result<DependencyRules, ResolveError> {
        if let Some(local) = self.archives.get(name) {
            if local
                .version()
                .is_some_and(|v| version::compare(v, version).is_eq())
            {
                return Ok(local.dependencies().clone());
            }
        }
        let package = OraclePackage::materialize(&self.oracle, name, version, &self.requested)
            .map_err(oracle_error(name))?;
        Ok(package.dependencies().clone())
    }

    /// Check every dirty package for conflicts, relaxing installed pins when allowed.
    fn check_conflicts(&mut self) -> Result<(), ResolveError> {
        let mut names: Vec<String> = self.dirty_for_conflict_check.drain(..).collect();
        names.sort();
        let bank = &self.bank;
        let conflicts: Vec<ConflictDetected> = self.pool.install(|| {
            names
                .par_iter()
                .filter_map(|name| conflict::detect(name, bank.rules_for(name)).err())
                .collect()
        });

        let mut remaining = conflicts.into_iter();
        while let Some(conflict) = remaining.next() {
            if self.relax(&conflict)? {
                continue;
            }
            let mut unsolved = vec![conflict];
            unsolved.extend(remaining);
            return Err(ResolveError::Conflict(unsolved));
        }
        Ok(())
    }

    /// Try to solve a conflict by dropping the installed version pin.
    /// Returns whether the conflict is gone.
    fn relax(&mut self, conflict: &ConflictDetected) -> Result<bool, ResolveError> {
        let name = conflict.package.as_str();
        if !self.config.relax_installed
            || !conflict.involves_installed()
            || self.relaxed.contains(name)
        {
            return Ok(false);
        }
        if let Some(origin) = self.oracle.origin(name).map_err(oracle_error(name))? {
            if self.config.origin_blacklist.iter().any(|o| *o == origin) {
                debug!("Not relaxing {}: origin {} is blacklisted", name, origin);
                return Ok(false);
            }
        }
        self.relaxed.insert(name.to_string());
        self.bank.remove_rules_by_author(name, &Author::Installed);
        self.bank
            .append_rules(name, [VersionRule::any(Author::ResolverAuto)]);
        match conflict::detect(name, self.bank.rules_for(name)) {
            Ok(()) => {
                warn!("Allowing installed package {} to change version", name);
                self.dirty_for_candidate_recompute.insert(name.to_string());
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }

    /// Choose a version for every dirty package that has none.
    fn select_candidates(&mut self) -> Result<(), ResolveError> {
        let mut names: Vec<String> = self
            .dirty_for_candidate_recompute
            .drain(..)
            .filter(|name| !self.candidates.contains_key(name) && self.bank.contains(name))
            .collect();
        names.sort();
        for name in &names {
            self.available(name)?;
        }
        let bank = &self.bank;
        let versions = &self.versions;
        let results: Vec<Result<selector::Candidate, CandidateNotFound>> = self.pool.install(|| {
            names
                .par_iter()
                .map(|name| {
                    let available = versions.get(name).map(Vec::as_slice).unwrap_or(&[]);
                    selector::select(name, bank.rules_for(name), available)
                })
                .collect()
        });

        let mut missing = Vec::new();
        for result in results {
            match result {
                Ok(candidate) => {
                    debug!("Chose {}", candidate.pin());
                    self.candidates.insert(candidate.name.clone(), candidate);
                }
                Err(not_found) => missing.push(not_found),
            }
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ResolveError::NoCandidate(missing))
        }
    }
}

fn oracle_error(package: &str) -> impl FnOnce(OracleError) -> ResolveError + '_ {
    move |source| ResolveError::Oracle {
        package: package.to_string(),
        source,
    }
}

// TESTS #######################################################################

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::OfflineOracle;
    use crate::package::tests::Mock;
    use crate::rule::Dependency;

    fn resolver(oracle: OfflineOracle) -> Resolver<OfflineOracle> {
        Resolver::new(
            oracle,
            ResolverConfig {
                jobs: Some(2),
                ..ResolverConfig::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn self_dependency() {
        let mut oracle = OfflineOracle::new();
        oracle.add_dependencies("a", "1", [vec![Dependency::any("a")]]);
        let mut resolver = resolver(oracle);
        resolver.register_root("a", None).unwrap();
        assert!(matches!(
            resolver.resolve(),
            Err(ResolveError::SelfDependency { .. })
        ));
    }

    #[test]
    fn missing_dependency_has_no_candidate() {
        let mut oracle = OfflineOracle::new();
        oracle.add_dependencies("a", "1", [vec![Dependency::any("b")]]);
        let mut resolver = resolver(oracle);
        resolver.register_root("a", None).unwrap();
        match resolver.resolve() {
            Err(ResolveError::NoCandidate(missing)) => {
                assert_eq!(missing[0].package, "b");
                assert!(missing[0].available.is_empty());
            }
            other => panic!("unexpected {:?}", other.map(|r| r.candidates)),
        }
    }

    #[test]
    fn installed_packages_stay_pinned() {
        let mut oracle = OfflineOracle::new();
        oracle.add_dependencies("app", "1", [vec![Dependency::any("lib")]]);
        oracle.add_dependencies("lib", "1.0", []);
        oracle.add_dependencies("lib", "2.0", []);
        oracle.set_installed("lib", "1.0");
        let mut pinned = resolver(oracle.clone());
        pinned.register_root("app", None).unwrap();
        assert_eq!(pinned.resolve().unwrap().candidates["lib"].version, "1.0");

        let mut upgrading = Resolver::new(
            oracle,
            ResolverConfig {
                upgrade_installed: true,
                ..ResolverConfig::default()
            },
        )
        .unwrap();
        upgrading.register_root("app", None).unwrap();
        assert_eq!(upgrading.resolve().unwrap().candidates["lib"].version, "2.0");
    }

    #[test]
    fn blacklisted_origin_is_not_relaxed() {
        let mut oracle = OfflineOracle::new();
        oracle.add_dependencies("q", "1.0", []);
        oracle.add_dependencies("q", "1.1", []);
        oracle.set_installed("q", "1.0");
        oracle.set_origin("q", "Vendor");
        let mut resolver = Resolver::new(
            oracle,
            ResolverConfig {
                origin_blacklist: vec!["Vendor".to_string()],
                ..ResolverConfig::default()
            },
        )
        .unwrap();
        resolver.register_root("q", Some("1.1")).unwrap();
        match resolver.resolve() {
            Err(ResolveError::Conflict(conflicts)) => {
                assert_eq!(conflicts.len(), 1);
                assert!(conflicts[0].involves_installed());
            }
            other => panic!("unexpected {:?}", other.map(|r| r.candidates)),
        }
    }

    #[test]
    fn recomputation_limit() {
        let mut oracle = OfflineOracle::new();
        oracle.add_dependencies("a", "1", [vec![Dependency::new("c", Operator::Lt, "2")]]);
        oracle.add_dependencies("c", "1", []);
        oracle.add_dependencies("c", "2", []);
        let mut resolver = Resolver::new(
            oracle,
            ResolverConfig {
                upgrade_installed: true,
                max_recomputations: Some(0),
                ..ResolverConfig::default()
            },
        )
        .unwrap();
        resolver.register_root("c", None).unwrap();
        resolver.resolve().unwrap();
        resolver.register_root("a", None).unwrap();
        assert!(matches!(
            resolver.resolve(),
            Err(ResolveError::RecomputationLimit { package }) if package == "c"
        ));
    }

    #[test]
    fn manifest_dependencies_become_roots() {
        let mut oracle = OfflineOracle::new();
        oracle.add_dependencies("lib", "1.0", []);
        oracle.add_dependencies("lib", "2.0", []);
        let mut package = Mock {
            name: "ws_pkg".into(),
            ..Mock::default()
        };
        package.dependencies.insert(
            "lib".into(),
            vec![VersionRule::new(Operator::Lt, "2.0", Author::package("ws_pkg", ""))],
        );
        let mut resolver = resolver(oracle);
        resolver.register_package(&package).unwrap();
        let resolution = resolver.resolve().unwrap();
        assert_eq!(resolution.requested, vec!["lib"]);
        assert_eq!(resolution.candidates["lib"].version, "1.0");
        assert_eq!(resolution.tree.parents("lib"), vec![ROOT]);
    }

    #[test]
    fn cancellation_between_phases() {
        use crate::oracle::Cancellable;
        use std::sync::atomic::AtomicBool;
        use std::sync::Arc;

        let mut oracle = OfflineOracle::new();
        oracle.add_dependencies("a", "1", []);
        let flag = Arc::new(AtomicBool::new(true));
        let mut resolver =
            Resolver::new(Cancellable::new(oracle, flag), ResolverConfig::default()).unwrap();
        resolver.register_root("a", None).unwrap();
        assert!(matches!(resolver.resolve(), Err(ResolveError::Cancelled)));
    }
}
