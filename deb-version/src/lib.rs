// SPDX-License-Identifier: MPL-2.0

//! Debian package versions and their ordering.
//!
//! A Debian version has the shape `[epoch:]upstream[-revision]`:
//!  - `epoch` is an unsigned integer, `0` when absent,
//!  - `upstream` is the main part, it may contain `-` only when a revision is present,
//!  - `revision` follows the last `-`, and compares like an empty string when absent.
//!
//! Two versions are compared epoch first, then upstream, then revision.
//! Upstream and revision use the dpkg algorithm: the strings are consumed
//! from left to right alternating between a non-digit run and a digit run.
//! Non-digit runs are compared character by character where `~` sorts before
//! everything (even the end of the string), letters sort before non-letters,
//! and digit runs are compared numerically.
//!
//! ```
//! use deb_version::{compare, Version};
//! use std::cmp::Ordering;
//!
//! assert_eq!(compare("1.0~rc1", "1.0"), Ordering::Less);
//! assert_eq!(compare("1:0.1", "2.0"), Ordering::Greater);
//!
//! let v: Version = "2:1.4.0-3ubuntu1".parse().unwrap();
//! assert_eq!(v.epoch(), 2);
//! assert_eq!(v.upstream(), "1.4.0");
//! assert_eq!(v.revision(), Some("3ubuntu1"));
//! ```
//!
//! [`compare`] never fails: any string gets a position in the ordering,
//! which is what package indexes need since they occasionally carry
//! versions that a strict parser would reject.
//! [`Version::from_str`](std::str::FromStr) is the strict counterpart.
//!
//! ## Optional features
//!
//! * `serde`: serialization and deserialization of [`Version`] as a plain string.
//! * `proptest`: exports a proptest strategy for [`Version`].

use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

#[cfg(any(feature = "proptest", test))]
use proptest::prelude::*;
use thiserror::Error;

/// Compare two version strings with the dpkg ordering.
pub fn compare(a: &str, b: &str) -> Ordering {
    let (epoch_a, upstream_a, revision_a) = split(a);
    let (epoch_b, upstream_b, revision_b) = split(b);
    epoch_a
        .cmp(&epoch_b)
        .then_with(|| verrevcmp(upstream_a, upstream_b))
        .then_with(|| verrevcmp(revision_a, revision_b))
}

/// Lenient split of a version string into epoch, upstream and revision.
/// An epoch that is not a number is considered part of the upstream version.
fn split(version: &str) -> (u64, &str, &str) {
    let (epoch, rest) = match version.split_once(':') {
        Some((epoch, rest)) => match epoch.parse::<u64>() {
            Ok(epoch) => (epoch, rest),
            Err(_) => (0, version),
        },
        None => (0, version),
    };
    match rest.rsplit_once('-') {
        Some((upstream, revision)) => (epoch, upstream, revision),
        None => (epoch, rest, ""),
    }
}

/// Weight of a character in a non-digit run.
fn order(c: Option<u8>) -> i32 {
    match c {
        None => 0,
        Some(c) if c.is_ascii_digit() => 0,
        Some(c) if c.is_ascii_alphabetic() => c as i32,
        Some(b'~') => -1,
        Some(c) => c as i32 + 256,
    }
}

/// The dpkg comparison of an upstream or revision part.
fn verrevcmp(a: &str, b: &str) -> Ordering {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    let is_digit = |s: &[u8], i: usize| s.get(i).map_or(false, u8::is_ascii_digit);
    let (mut i, mut j) = (0, 0);
    while i < a.len() || j < b.len() {
        // Non-digit prefix.
        while (i < a.len() && !a[i].is_ascii_digit()) || (j < b.len() && !b[j].is_ascii_digit()) {
            let ac = order(a.get(i).copied());
            let bc = order(b.get(j).copied());
            if ac != bc {
                return ac.cmp(&bc);
            }
            i += 1;
            j += 1;
        }

        // Digit run, leading zeros are not significant.
        while a.get(i) == Some(&b'0') {
            i += 1;
        }
        while b.get(j) == Some(&b'0') {
            j += 1;
        }
        let mut first_diff = 0;
        while is_digit(a, i) && is_digit(b, j) {
            if first_diff == 0 {
                first_diff = a[i] as i32 - b[j] as i32;
            }
            i += 1;
            j += 1;
        }
        if is_digit(a, i) {
            return Ordering::Greater;
        }
        if is_digit(b, j) {
            return Ordering::Less;
        }
        if first_diff != 0 {
            return first_diff.cmp(&0);
        }
    }
    Ordering::Equal
}

/// Error creating a [Version] from a string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionParseError {
    /// The version string is empty.
    #[error("version string is empty")]
    Empty,
    /// The part before the first `:` is not an unsigned integer.
    #[error("epoch in '{full_version}' is not an unsigned integer")]
    InvalidEpoch {
        /// Version that was being parsed.
        full_version: String,
    },
    /// The upstream part is empty, as in `1:-2`.
    #[error("upstream version in '{full_version}' is empty")]
    EmptyUpstream {
        /// Version that was being parsed.
        full_version: String,
    },
    /// A character forbidden by the Debian policy.
    #[error("invalid character '{character}' in '{full_version}'")]
    InvalidCharacter {
        /// Version that was being parsed.
        full_version: String,
        /// The offending character.
        character: char,
    },
}

/// A parsed Debian version.
///
/// Equality follows the ordering, so `1.0` and `1.0-0` are equal
/// although they are not spelled the same.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub struct Version {
    epoch: u64,
    upstream: String,
    revision: Option<String>,
}

impl Version {
    /// Build a version from its parts, no validation happens.
    pub fn new(epoch: u64, upstream: impl Into<String>, revision: Option<String>) -> Self {
        Self {
            epoch,
            upstream: upstream.into(),
            revision,
        }
    }

    /// The epoch, `0` when absent.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// The upstream part.
    pub fn upstream(&self) -> &str {
        &self.upstream
    }

    /// The revision part, if any.
    pub fn revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }
}

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(VersionParseError::Empty);
        }
        let (epoch, rest) = match s.split_once(':') {
            Some((epoch, rest)) => {
                let epoch = epoch
                    .parse::<u64>()
                    .map_err(|_| VersionParseError::InvalidEpoch {
                        full_version: s.to_string(),
                    })?;
                (epoch, rest)
            }
            None => (0, s),
        };
        let (upstream, revision) = match rest.rsplit_once('-') {
            Some((upstream, revision)) => (upstream, Some(revision)),
            None => (rest, None),
        };
        if upstream.is_empty() {
            return Err(VersionParseError::EmptyUpstream {
                full_version: s.to_string(),
            });
        }

        let invalid = |character| VersionParseError::InvalidCharacter {
            full_version: s.to_string(),
            character,
        };
        let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '+' | '~');
        if let Some(c) = upstream.chars().find(|&c| !allowed(c) && c != '-' && c != ':') {
            return Err(invalid(c));
        }
        if let Some(c) = revision.and_then(|r| r.chars().find(|&c| !allowed(c))) {
            return Err(invalid(c));
        }

        Ok(Self {
            epoch,
            upstream: upstream.to_string(),
            revision: revision.map(str::to_string),
        })
    }
}

impl TryFrom<String> for Version {
    type Error = VersionParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Version> for String {
    fn from(version: Version) -> Self {
        version.to_string()
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.epoch > 0 {
            write!(f, "{}:", self.epoch)?;
        }
        f.write_str(&self.upstream)?;
        if let Some(revision) = &self.revision {
            write!(f, "-{}", revision)?;
        }
        Ok(())
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| verrevcmp(&self.upstream, &other.upstream))
            .then_with(|| {
                verrevcmp(
                    self.revision.as_deref().unwrap_or(""),
                    other.revision.as_deref().unwrap_or(""),
                )
            })
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

/// A strategy generating Debian versions, including `~` pre-releases and epochs.
#[cfg(any(feature = "proptest", test))]
pub fn proptest_strategy() -> impl Strategy<Value = Version> {
    (
        prop_oneof![4 => Just(0u64), 1 => 1u64..3],
        prop::collection::vec(0u32..12, 1..4),
        prop::option::of(0u32..4),
        prop::option::of(0u32..30),
    )
        .prop_map(|(epoch, numbers, tilde, revision)| {
            let mut upstream = numbers
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(".");
            if let Some(rc) = tilde {
                upstream.push_str(&format!("~rc{}", rc));
            }
            Version::new(epoch, upstream, revision.map(|r| r.to_string()))
        })
}

// TESTS #######################################################################
