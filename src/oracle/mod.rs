// SPDX-License-Identifier: MPL-2.0

//! Access to package metadata.
//!
//! The resolver never looks at a package database directly.
//! Everything it needs to know goes through the [Oracle] trait:
//! available versions, virtual packages and their providers,
//! per version dependency lists, and what is already installed.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::OracleError;
use crate::rule::Dependency;
use crate::type_aliases::{OrderedMap, OrderedSet};
use crate::version::{self, SortOrder};

mod apt;

pub use apt::AptOracle;

/// A concrete package providing a virtual one.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Provider {
    /// The providing package, with the version constraint to use.
    pub dependency: Dependency,
    /// Higher wins.
    #[cfg_attr(feature = "serde", serde(default))]
    pub priority: i32,
}

impl Provider {
    /// A provider of any version of `name`.
    pub fn new(name: impl Into<String>, priority: i32) -> Self {
        Self {
            dependency: Dependency::any(name),
            priority,
        }
    }
}

/// What the oracle found inside a package archive on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LocalArchive {
    /// Path of the archive.
    pub path: PathBuf,
    /// Package name.
    pub name: String,
    /// Package version.
    pub version: String,
    /// Dependencies, as OR-groups.
    #[cfg_attr(feature = "serde", serde(default))]
    pub dependencies: Vec<Vec<Dependency>>,
}

/// Trait that allows the resolver to query package metadata.
///
/// The oracle must present a consistent snapshot for the duration
/// of a resolution. It is only ever called from the thread driving the resolver.
pub trait Oracle {
    /// Versions of `name`, newest first. Empty if the package is unknown.
    fn available_versions(&self, name: &str) -> Result<Vec<String>, OracleError>;

    /// Whether `name` is virtual, only standing for the packages providing it.
    fn is_virtual(&self, name: &str) -> Result<bool, OracleError>;

    /// Packages providing the virtual package `name`.
    fn providers(&self, name: &str) -> Result<Vec<Provider>, OracleError>;

    /// Dependencies of `name` at exactly `version`, as OR-groups.
    fn dependencies_of(&self, name: &str, version: &str) -> Result<Vec<Vec<Dependency>>, OracleError>;

    /// Version of `name` installed on the system, if any.
    fn installed_version(&self, name: &str) -> Result<Option<String>, OracleError>;

    /// Whether `name` is installed, at `version` when one is given.
    fn is_installed(&self, name: &str, version: Option<&str>) -> Result<bool, OracleError> {
        Ok(match (self.installed_version(name)?, version) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(installed), Some(wanted)) => {
                version::compare(&installed, wanted) == std::cmp::Ordering::Equal
            }
        })
    }

    /// Archive origin (`o=` field of the apt policy) of the candidate of `name`.
    fn origin(&self, name: &str) -> Result<Option<String>, OracleError>;

    /// Name, version and dependencies of the package archive at `path`.
    fn local_archive_info(&self, path: &Path) -> Result<LocalArchive, OracleError>;

    /// Pick the provider of a virtual package.
    ///
    /// The highest priority wins, then a provider the user asked for,
    /// then the first one listed.
    fn choose_provider(
        &self,
        providers: &[Provider],
        requested: &OrderedSet<String>,
    ) -> Option<Provider> {
        let mut best: Option<&Provider> = None;
        for provider in providers {
            let better = match best {
                None => true,
                Some(current) if provider.priority != current.priority => {
                    provider.priority > current.priority
                }
                Some(current) => {
                    requested.contains(&provider.dependency.name)
                        && !requested.contains(&current.dependency.name)
                }
            };
            if better {
                best = Some(provider);
            }
        }
        best.cloned()
    }

    /// This is a callback mechanism to cooperatively cancel a resolution.
    /// It is polled at every phase boundary; an error stops the resolution.
    fn should_cancel(&self) -> Result<(), OracleError> {
        Ok(())
    }
}

/// An oracle answering from memory.
///
/// Useful for tests and for planning against a saved snapshot of
/// a package index, see the `--index` flag of the command line.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct OfflineOracle {
    packages: OrderedMap<String, OrderedMap<String, Vec<Vec<Dependency>>>>,
    virtuals: OrderedMap<String, Vec<Provider>>,
    installed: OrderedMap<String, String>,
    origins: OrderedMap<String, String>,
    archives: Vec<LocalArchive>,
}

impl OfflineOracle {
    /// Creates an empty oracle with no package.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `version` of `name` available, depending on `dependencies`.
    ///
    /// Each item is one OR-group: any single member satisfies it.
    /// Calling this again for the same version overwrites its groups.
    pub fn add_dependencies<I>(&mut self, name: &str, version: &str, dependencies: I)
    where
        I: IntoIterator<Item = Vec<Dependency>>,
    {
        self.packages
            .entry(name.to_string())
            .or_default()
            .insert(version.to_string(), dependencies.into_iter().collect());
    }

    /// Registers a virtual package and its providers, in priority tie order.
    pub fn add_virtual<I>(&mut self, name: &str, providers: I)
    where
        I: IntoIterator<Item = Provider>,
    {
        self.virtuals
            .entry(name.to_string())
            .or_default()
            .extend(providers);
    }

    /// Marks `name` as installed at `version`.
    pub fn set_installed(&mut self, name: &str, version: &str) {
        self.installed.insert(name.to_string(), version.to_string());
    }

    /// Sets the archive origin of `name`.
    pub fn set_origin(&mut self, name: &str, origin: &str) {
        self.origins.insert(name.to_string(), origin.to_string());
    }

    /// Registers a package archive that may be passed as a local file.
    pub fn add_archive(&mut self, archive: LocalArchive) {
        self.archives.retain(|a| a.path != archive.path);
        self.archives.push(archive);
    }

    /// Lists packages that have been saved.
    pub fn packages(&self) -> impl Iterator<Item = &str> {
        self.packages.keys().map(String::as_str)
    }
}

impl Oracle for OfflineOracle {
    fn available_versions(&self, name: &str) -> Result<Vec<String>, OracleError> {
        let mut versions: Vec<String> = self
            .packages
            .get(name)
            .map(|versions| versions.keys().cloned().collect())
            .unwrap_or_default();
        version::sort(&mut versions, SortOrder::Descending);
        Ok(versions)
    }

    fn is_virtual(&self, name: &str) -> Result<bool, OracleError> {
        Ok(self.virtuals.contains_key(name) && !self.packages.contains_key(name))
    }

    fn providers(&self, name: &str) -> Result<Vec<Provider>, OracleError> {
        Ok(self.virtuals.get(name).cloned().unwrap_or_default())
    }

    fn dependencies_of(&self, name: &str, version: &str) -> Result<Vec<Vec<Dependency>>, OracleError> {
        let versions = self
            .packages
            .get(name)
            .ok_or_else(|| OracleError::UnknownPackage(name.to_string()))?;
        versions
            .get(version)
            .or_else(|| {
                versions
                    .iter()
                    .find(|(v, _)| version::compare(v, version) == std::cmp::Ordering::Equal)
                    .map(|(_, deps)| deps)
            })
            .cloned()
            .ok_or_else(|| OracleError::UnknownVersion {
                package: name.to_string(),
                version: version.to_string(),
            })
    }

    fn installed_version(&self, name: &str) -> Result<Option<String>, OracleError> {
        Ok(self.installed.get(name).cloned())
    }

    fn origin(&self, name: &str) -> Result<Option<String>, OracleError> {
        Ok(self.origins.get(name).cloned())
    }

    fn local_archive_info(&self, path: &Path) -> Result<LocalArchive, OracleError> {
        self.archives
            .iter()
            .find(|a| a.path == path)
            .cloned()
            .ok_or_else(|| OracleError::BadArchive {
                path: path.to_path_buf(),
                message: "unknown archive".to_string(),
            })
    }
}

/// An oracle that stops the resolution once a shared flag is raised.
///
/// Every query is forwarded to the wrapped oracle.
#[derive(Debug, Clone)]
pub struct Cancellable<O> {
    inner: O,
    flag: Arc<AtomicBool>,
}

impl<O: Oracle> Cancellable<O> {
    /// Wrap `inner`; raising `flag` cancels the resolution at the next phase boundary.
    pub fn new(inner: O, flag: Arc<AtomicBool>) -> Self {
        Self { inner, flag }
    }

    /// The wrapped oracle.
    pub fn inner(&self) -> &O {
        &self.inner
    }
}

impl<O: Oracle> Oracle for Cancellable<O> {
    fn available_versions(&self, name: &str) -> Result<Vec<String>, OracleError> {
        self.inner.available_versions(name)
    }

    fn is_virtual(&self, name: &str) -> Result<bool, OracleError> {
        self.inner.is_virtual(name)
    }

    fn providers(&self, name: &str) -> Result<Vec<Provider>, OracleError> {
        self.inner.providers(name)
    }

    fn dependencies_of(&self, name: &str, version: &str) -> Result<Vec<Vec<Dependency>>, OracleError> {
        self.inner.dependencies_of(name, version)
    }

    fn installed_version(&self, name: &str) -> Result<Option<String>, OracleError> {
        self.inner.installed_version(name)
    }

    fn is_installed(&self, name: &str, version: Option<&str>) -> Result<bool, OracleError> {
        self.inner.is_installed(name, version)
    }

    fn origin(&self, name: &str) -> Result<Option<String>, OracleError> {
        self.inner.origin(name)
    }

    fn local_archive_info(&self, path: &Path) -> Result<LocalArchive, OracleError> {
        self.inner.local_archive_info(path)
    }

    fn choose_provider(
        &self,
        providers: &[Provider],
        requested: &OrderedSet<String>,
    ) -> Option<Provider> {
        self.inner.choose_provider(providers, requested)
    }

    fn should_cancel(&self) -> Result<(), OracleError> {
        if self.flag.load(Ordering::Relaxed) {
            return Err(OracleError::Cancelled);
        }
        self.inner.should_cancel()
    }
}

impl<O: Oracle + ?Sized> Oracle for &O {
    fn available_versions(&self, name: &str) -> Result<Vec<String>, OracleError> {
        (**self).available_versions(name)
    }

    fn is_virtual(&self, name: &str) -> Result<bool, OracleError> {
        (**self).is_virtual(name)
    }

    fn providers(&self, name: &str) -> Result<Vec<Provider>, OracleError> {
        (**self).providers(name)
    }

    fn dependencies_of(&self, name: &str, version: &str) -> Result<Vec<Vec<Dependency>>, OracleError> {
        (**self).dependencies_of(name, version)
    }

    fn installed_version(&self, name: &str) -> Result<Option<String>, OracleError> {
        (**self).installed_version(name)
    }

    fn is_installed(&self, name: &str, version: Option<&str>) -> Result<bool, OracleError> {
        (**self).is_installed(name, version)
    }

    fn origin(&self, name: &str) -> Result<Option<String>, OracleError> {
        (**self).origin(name)
    }

    fn local_archive_info(&self, path: &Path) -> Result<LocalArchive, OracleError> {
        (**self).local_archive_info(path)
    }

    fn choose_provider(
        &self,
        providers: &[Provider],
        requested: &OrderedSet<String>,
    ) -> Option<Provider> {
        (**self).choose_provider(providers, requested)
    }

    fn should_cancel(&self) -> Result<(), OracleError> {
        (**self).should_cancel()
    }
}

// TESTS #######################################################################
