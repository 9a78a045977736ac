// SPDX-License-Identifier: MPL-2.0

//! Version algebra over Debian version strings.
//!
//! Versions are kept as the strings the oracle hands out and compared with
//! [deb_version::compare], which never fails. A malformed string still gets
//! a deterministic place in the order instead of aborting a resolution.

use std::cmp::Ordering;

use crate::rule::{Operator, VersionRule};

/// Compare two Debian version strings.
pub fn compare(a: &str, b: &str) -> Ordering {
    deb_version::compare(a, b)
}

/// Direction of [sort].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Oldest first.
    Ascending,
    /// Newest first.
    Descending,
}

/// Sort a list of versions in place.
pub fn sort(versions: &mut [String], order: SortOrder) {
    match order {
        SortOrder::Ascending => versions.sort_by(|a, b| compare(a, b)),
        SortOrder::Descending => versions.sort_by(|a, b| compare(b, a)),
    }
}

/// Keep the versions above a `>` or `>=` bound.
/// Any other rule leaves the list untouched.
pub fn filter_lower_bound(versions: &[String], rule: &VersionRule) -> Vec<String> {
    if !rule.operator.is_lower() {
        return versions.to_vec();
    }
    versions
        .iter()
        .filter(|v| satisfies(v, rule))
        .cloned()
        .collect()
}

/// Keep the versions below a `<` or `<=` bound.
/// Any other rule leaves the list untouched.
pub fn filter_upper_bound(versions: &[String], rule: &VersionRule) -> Vec<String> {
    if !rule.operator.is_upper() {
        return versions.to_vec();
    }
    versions
        .iter()
        .filter(|v| satisfies(v, rule))
        .cloned()
        .collect()
}

/// The tightest upper bound: smallest version, `<` preferred over `<=` on a tie.
pub fn find_lowest_upper<'r, I>(rules: I) -> Option<&'r VersionRule>
where
    I: IntoIterator<Item = &'r VersionRule>,
{
    rules
        .into_iter()
        .filter(|r| r.operator.is_upper())
        .reduce(|best, r| match compare(&r.version, &best.version) {
            Ordering::Less => r,
            Ordering::Equal if r.operator == Operator::Lt && best.operator != Operator::Lt => r,
            _ => best,
        })
}

/// The tightest lower bound: largest version, `>` preferred over `>=` on a tie.
pub fn find_highest_lower<'r, I>(rules: I) -> Option<&'r VersionRule>
where
    I: IntoIterator<Item = &'r VersionRule>,
{
    rules
        .into_iter()
        .filter(|r| r.operator.is_lower())
        .reduce(|best, r| match compare(&r.version, &best.version) {
            Ordering::Greater => r,
            Ordering::Equal if r.operator == Operator::Gt && best.operator != Operator::Gt => r,
            _ => best,
        })
}

/// The first `=` rule, if any.
pub fn find_equals<'r, I>(rules: I) -> Option<&'r VersionRule>
where
    I: IntoIterator<Item = &'r VersionRule>,
{
    rules.into_iter().find(|r| r.operator == Operator::Eq)
}

/// Whether `version` satisfies `rule`. `any` rules accept everything.
pub fn satisfies(version: &str, rule: &VersionRule) -> bool {
    let ord = compare(version, &rule.version);
    match rule.operator {
        Operator::Any => true,
        Operator::Eq => ord == Ordering::Equal,
        Operator::Lt => ord == Ordering::Less,
        Operator::Lte => ord != Ordering::Greater,
        Operator::Gt => ord == Ordering::Greater,
        Operator::Gte => ord != Ordering::Less,
    }
}

/// Whether `version` satisfies every rule.
pub fn satisfies_all<'r, I>(version: &str, rules: I) -> bool
where
    I: IntoIterator<Item = &'r VersionRule>,
{
    rules.into_iter().all(|r| satisfies(version, r))
}

// TESTS #######################################################################
