// SPDX-License-Identifier: MPL-2.0

//! Greedy dependency resolution and install planning for Debian packages.
//!
//! Given packages requested by a user (or listed in workspace manifests),
//! this crate finds one version of every package needed, such that every
//! version rule imposed on a package is satisfied, and produces an
//! installation plan ordered leaves first.
//!
//! # Basic example
//!
//! - `app` depends on `lib < 2` and on `mta`, a virtual package,
//! - `mta` is provided by `exim` and `postfix`,
//! - `lib` comes in versions `1.0`, `1.5` and `2.0`.
//!
//! ```
//! use mobros::config::ResolverConfig;
//! use mobros::oracle::{OfflineOracle, Provider};
//! use mobros::planner::InstallPlan;
//! use mobros::resolver::Resolver;
//! use mobros::rule::{Dependency, Operator};
//!
//! let mut oracle = OfflineOracle::new();
//! oracle.add_dependencies(
//!     "app",
//!     "1.0-1",
//!     [vec![Dependency::new("lib", Operator::Lt, "2")], vec![Dependency::any("mta")]],
//! );
//! for v in ["1.0", "1.5", "2.0"] {
//!     oracle.add_dependencies("lib", v, []);
//! }
//! oracle.add_dependencies("exim", "4.96", []);
//! oracle.add_dependencies("postfix", "3.7", []);
//! oracle.add_virtual("mta", [Provider::new("exim", 0), Provider::new("postfix", 10)]);
//!
//! let mut resolver = Resolver::new(&oracle, ResolverConfig::default())?;
//! resolver.register_root("app", None)?;
//! let resolution = resolver.resolve()?;
//!
//! let plan = InstallPlan::new(&resolution, &oracle)?;
//! assert_eq!(plan.install, ["postfix=3.7", "lib=1.5", "app=1.0-1"]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Oracle trait
//!
//! Everything the resolver knows about packages comes from an [Oracle](oracle::Oracle):
//! available versions, dependencies of a version, virtual packages and their
//! providers, and what is installed on the system.
//! [OfflineOracle](oracle::OfflineOracle) answers from memory and can be
//! (de)serialized with the `serde` feature.
//! [AptOracle](oracle::AptOracle) queries the package tools of the system.
//!
//! # Rules and authors
//!
//! Every [VersionRule](rule::VersionRule) remembers who imposed it:
//! the user, the installed system, the resolver itself or a given package
//! version. When the version chosen for a package is invalidated,
//! the rules it imposed on its own dependencies are withdrawn with it.
//!
//! # Failures
//!
//! When the rules on a package contradict each other, or no available version
//! satisfies them, resolution stops with a [ResolveError](error::ResolveError)
//! whose message names every rule involved and who imposed it.
//! Narratives are produced by a [Reporter](report::Reporter).

#![warn(missing_docs)]

pub mod bank;
pub mod config;
pub mod conflict;
pub mod error;
pub mod manifest;
pub mod oracle;
pub mod package;
pub mod planner;
pub mod report;
pub mod resolver;
pub mod rule;
pub mod selector;
pub mod tree;
pub mod type_aliases;
pub mod version;

mod internal;
