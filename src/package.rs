// SPDX-License-Identifier: MPL-2.0

//! Trait for identifying packages and the rules they impose.

use std::fmt;
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::OracleError;
use crate::oracle::{LocalArchive, Oracle};
use crate::rule::{Author, Dependency, VersionRule};
use crate::type_aliases::{OrderedMap, OrderedSet};

/// Dependencies of a package: the rules it imposes on each dependency name.
pub type DependencyRules = OrderedMap<String, Vec<VersionRule>>;

/// Something with a name, maybe a version, and rules on other packages.
pub trait Package: fmt::Debug {
    /// Package name.
    fn name(&self) -> &str;

    /// Package version, when known.
    fn version(&self) -> Option<&str>;

    /// Rules this package imposes, per dependency name.
    fn dependencies(&self) -> &DependencyRules;
}

/// A package parsed from a workspace manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestPackage {
    name: String,
    version: Option<String>,
    path: Option<PathBuf>,
    dependencies: DependencyRules,
}

impl ManifestPackage {
    /// A manifest package without dependencies.
    pub fn new(name: impl Into<String>, version: Option<String>) -> Self {
        Self {
            name: name.into(),
            version,
            path: None,
            dependencies: DependencyRules::default(),
        }
    }

    /// Remember where the manifest was read from.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Path of the manifest, when read from disk.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The author of the rules of this manifest.
    pub fn author(&self) -> Author {
        Author::package(self.name.clone(), self.version.clone().unwrap_or_default())
    }

    /// Add a dependency on `dependency.name`, authored by this manifest.
    pub fn add_dependency(&mut self, dependency: &Dependency) {
        let rule = dependency.rule(self.author());
        let rules = self.dependencies.entry(dependency.name.clone()).or_default();
        if !rules.contains(&rule) {
            rules.push(rule);
        }
    }

    /// Rename dependencies, merging rules of names that collapse together.
    /// Used to map workspace names to system package names.
    pub fn map_names(&mut self, mut rename: impl FnMut(&str) -> String) {
        let old = std::mem::take(&mut self.dependencies);
        for (name, rules) in old {
            let entry = self.dependencies.entry(rename(&name)).or_default();
            for rule in rules {
                if !entry.contains(&rule) {
                    entry.push(rule);
                }
            }
        }
    }

    /// Drop dependencies for which `keep` is false.
    pub fn retain_dependencies(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.dependencies.retain(|name, _| keep(name));
    }
}

impl Package for ManifestPackage {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    fn dependencies(&self) -> &DependencyRules {
        &self.dependencies
    }
}

/// A package version whose dependencies come from the oracle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OraclePackage {
    name: String,
    version: String,
    dependencies: DependencyRules,
}

impl OraclePackage {
    /// Query the oracle for the dependencies of `name` at `version`.
    ///
    /// Each OR-group is reduced to a single dependency: the first member that
    /// is a virtual package with a provider, or that has an available version
    /// satisfying its constraint. If none qualifies, the first member is kept.
    /// Virtual packages are replaced by the provider chosen by the oracle,
    /// `requested` being the names the user asked for.
    pub fn materialize<O: Oracle + ?Sized>(
        oracle: &O,
        name: &str,
        version: &str,
        requested: &OrderedSet<String>,
    ) -> Result<Self, OracleError> {
        let groups = oracle.dependencies_of(name, version)?;
        let author = Author::package(name, version);
        Ok(Self {
            name: name.to_string(),
            version: version.to_string(),
            dependencies: resolve_groups(oracle, &author, &groups, requested)?,
        })
    }
}

impl Package for OraclePackage {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> Option<&str> {
        Some(&self.version)
    }

    fn dependencies(&self) -> &DependencyRules {
        &self.dependencies
    }
}

/// A package archive on disk, described by the oracle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFilePackage {
    archive: LocalArchive,
    dependencies: DependencyRules,
}

impl LocalFilePackage {
    /// Ask the oracle what is inside the archive at `path`.
    pub fn open<O: Oracle + ?Sized>(
        oracle: &O,
        path: &Path,
        requested: &OrderedSet<String>,
    ) -> Result<Self, OracleError> {
        let archive = oracle.local_archive_info(path)?;
        let author = Author::package(archive.name.clone(), archive.version.clone());
        let dependencies = resolve_groups(oracle, &author, &archive.dependencies, requested)?;
        Ok(Self {
            archive,
            dependencies,
        })
    }

    /// Path of the archive.
    pub fn path(&self) -> &Path {
        &self.archive.path
    }
}

impl Package for LocalFilePackage {
    fn name(&self) -> &str {
        &self.archive.name
    }

    fn version(&self) -> Option<&str> {
        Some(&self.archive.version)
    }

    fn dependencies(&self) -> &DependencyRules {
        &self.dependencies
    }
}

fn resolve_groups<O: Oracle + ?Sized>(
    oracle: &O,
    author: &Author,
    groups: &[Vec<Dependency>],
    requested: &OrderedSet<String>,
) -> Result<DependencyRules, OracleError> {
    let mut rules = DependencyRules::default();
    for group in groups {
        let Some(chosen) = choose_alternative(oracle, group, requested)? else {
            continue;
        };
        let rule = chosen.rule(author.clone());
        let list = rules.entry(chosen.name).or_default();
        if !list.contains(&rule) {
            list.push(rule);
        }
    }
    Ok(rules)
}

fn choose_alternative<O: Oracle + ?Sized>(
    oracle: &O,
    group: &[Dependency],
    requested: &OrderedSet<String>,
) -> Result<Option<Dependency>, OracleError> {
    for member in group {
        if oracle.is_virtual(&member.name)? {
            let providers = oracle.providers(&member.name)?;
            if let Some(provider) = oracle.choose_provider(&providers, requested) {
                debug!("{} is provided by {}", member.name, provider.dependency);
                return Ok(Some(provider.dependency));
            }
            continue;
        }
        let scratch = member.rule(Author::ResolverAuto);
        if oracle
            .available_versions(&member.name)?
            .iter()
            .any(|v| scratch.allows(v))
        {
            return Ok(Some(member.clone()));
        }
    }
    Ok(group.first().cloned())
}
