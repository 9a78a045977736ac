// SPDX-License-Identifier: MPL-2.0

//! Handling resolver errors.

use std::path::PathBuf;

use thiserror::Error;

use crate::conflict::ConflictDetected;
use crate::report::{DefaultStringReporter, Reporter};
use crate::selector::CandidateNotFound;

/// Errors that may occur while resolving dependencies.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// The rules of at least one package can not hold together.
    #[error("{}", DefaultStringReporter::report_conflicts(.0))]
    Conflict(Vec<ConflictDetected>),

    /// No available version satisfies the rules of at least one package.
    #[error("{}", DefaultStringReporter::report_missing_all(.0))]
    NoCandidate(Vec<CandidateNotFound>),

    /// Error arising when the [Oracle](crate::oracle::Oracle) failed to answer a query.
    #[error("querying the package database about {package} failed")]
    Oracle {
        /// Package the query was about.
        package: String,
        /// Error raised by the oracle.
        source: OracleError,
    },

    /// A package lists itself among its dependencies.
    #[error("{package}={version} depends on itself")]
    SelfDependency {
        /// Package that depends on itself.
        package: String,
        /// Version of that package.
        version: String,
    },

    /// A package kept being invalidated by new rules.
    #[error("the version of {package} was recomputed too many times")]
    RecomputationLimit {
        /// Package whose version kept changing.
        package: String,
    },

    /// The oracle requested cancellation.
    #[error("resolution cancelled")]
    Cancelled,

    /// The worker pool could not be started.
    #[error("unable to start the resolver thread pool: {0}")]
    ThreadPool(String),

    /// Something unexpected happened.
    #[error("{0}")]
    Failure(String),
}

/// Errors of an [Oracle](crate::oracle::Oracle).
#[derive(Error, Debug)]
pub enum OracleError {
    /// The package database does not know the package.
    #[error("package {0} is unknown, the package index may need an update (apt-get update)")]
    UnknownPackage(String),

    /// The package exists but not at that version.
    #[error("version {version} of package {package} is unknown")]
    UnknownVersion {
        /// Package name.
        package: String,
        /// Requested version.
        version: String,
    },

    /// An external command exited with a failure.
    #[error("command `{command}` failed: {message}")]
    Command {
        /// Command line.
        command: String,
        /// Standard error, or exit status.
        message: String,
    },

    /// An external command printed something unexpected.
    #[error("unable to parse the output of `{command}`: {message}")]
    Unparsable {
        /// Command line.
        command: String,
        /// What went wrong.
        message: String,
    },

    /// A local file is not a usable package archive.
    #[error("{} is not a valid package archive: {message}", .path.display())]
    BadArchive {
        /// Path of the archive.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },

    /// Cancellation was requested.
    #[error("cancelled")]
    Cancelled,

    /// Underlying io error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors reading a workspace manifest.
#[derive(Error, Debug)]
pub enum ManifestError {
    /// The manifest could not be read.
    #[error("unable to read {}", .path.display())]
    Io {
        /// Manifest path.
        path: PathBuf,
        /// Underlying io error.
        source: std::io::Error,
    },

    /// The manifest is not well formed.
    #[error("malformed manifest {}", .path.display())]
    Xml {
        /// Manifest path.
        path: PathBuf,
        /// Underlying xml error.
        source: quick_xml::Error,
    },

    /// The manifest has no `<name>` element.
    #[error("manifest {} has no package name", .path.display())]
    MissingName {
        /// Manifest path.
        path: PathBuf,
    },
}
