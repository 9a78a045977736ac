// SPDX-License-Identifier: MPL-2.0

//! Choice of a single version among the available ones.

use std::cmp::Ordering;
use std::fmt;

use crate::report::{self, DefaultStringReporter, Reporter};
use crate::rule::VersionRule;
use crate::version::{self, compare};

/// The version chosen for a package.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Candidate {
    /// Package name.
    pub name: String,
    /// Chosen version.
    pub version: String,
    /// One line per rule that justified the choice.
    pub rationales: Vec<String>,
}

impl Candidate {
    /// Whether the candidate still satisfies `rule`.
    pub fn satisfies(&self, rule: &VersionRule) -> bool {
        version::satisfies(&self.version, rule)
    }

    /// `name=version`, as given to the installer.
    pub fn pin(&self) -> String {
        format!("{}={}", self.name, self.version)
    }
}

/// No available version satisfies the rules of a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateNotFound {
    /// Package name.
    pub package: String,
    /// The `=` rule, if there was one.
    pub equals: Option<VersionRule>,
    /// Tightest upper bound.
    pub upper: Option<VersionRule>,
    /// Tightest lower bound.
    pub lower: Option<VersionRule>,
    /// Versions offered by the oracle, newest first.
    pub available: Vec<String>,
}

impl fmt::Display for CandidateNotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&DefaultStringReporter::report_missing(self))
    }
}

impl std::error::Error for CandidateNotFound {}

/// Pick the version of `name` among `available` (newest first).
///
/// An `=` rule wins when its version is available.
/// Otherwise the newest version within the tightest bounds is chosen.
pub fn select(
    name: &str,
    rules: &[VersionRule],
    available: &[String],
) -> Result<Candidate, CandidateNotFound> {
    let not_found = || CandidateNotFound {
        package: name.to_string(),
        equals: version::find_equals(rules).cloned(),
        upper: version::find_lowest_upper(rules).cloned(),
        lower: version::find_highest_lower(rules).cloned(),
        available: available.to_vec(),
    };

    let chosen = if let Some(eq) = version::find_equals(rules) {
        available
            .iter()
            .find(|v| compare(v, &eq.version) == Ordering::Equal)
            .cloned()
    } else {
        let mut remaining = available.to_vec();
        if let Some(upper) = version::find_lowest_upper(rules) {
            remaining = version::filter_upper_bound(&remaining, upper);
        }
        if let Some(lower) = version::find_highest_lower(rules) {
            remaining = version::filter_lower_bound(&remaining, lower);
        }
        remaining.into_iter().reduce(|best, v| {
            if compare(&v, &best) == Ordering::Greater {
                v
            } else {
                best
            }
        })
    };

    let version = chosen.ok_or_else(not_found)?;
    Ok(Candidate {
        name: name.to_string(),
        rationales: rules.iter().map(report::rationale).collect(),
        version,
    })
}

// TESTS #######################################################################
