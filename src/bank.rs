// SPDX-License-Identifier: MPL-2.0

//! Per package accumulator of version rules.

use crate::rule::{Author, VersionRule};
use crate::type_aliases::OrderedMap;

/// Every rule known for every package, in insertion order.
///
/// No list ever holds two equal rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstraintBank {
    rules: OrderedMap<String, Vec<VersionRule>>,
}

impl ConstraintBank {
    /// An empty bank.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the rules not already present for `name`.
    /// Returns the rules that were actually added.
    pub fn append_rules<I>(&mut self, name: &str, rules: I) -> Vec<VersionRule>
    where
        I: IntoIterator<Item = VersionRule>,
    {
        let list = self.rules.entry(name.to_string()).or_default();
        let mut added = Vec::new();
        for rule in rules {
            if !list.contains(&rule) {
                list.push(rule.clone());
                added.push(rule);
            }
        }
        added
    }

    /// Remove every rule of `name` whose author is `author`.
    /// Returns how many rules were removed.
    pub fn remove_rules_by_author(&mut self, name: &str, author: &Author) -> usize {
        self.rules
            .get_mut(name)
            .map(|list| {
                let before = list.len();
                list.retain(|r| &r.from != author);
                before - list.len()
            })
            .unwrap_or(0)
    }

    /// Remove, across all packages, the rules authored by `package` at any version.
    /// Returns the names that lost at least one rule.
    pub fn remove_rules_authored_by_package(&mut self, package: &str) -> Vec<String> {
        let mut touched = Vec::new();
        for (name, list) in self.rules.iter_mut() {
            let before = list.len();
            list.retain(|r| !r.from.is_package(package));
            if list.len() != before {
                touched.push(name.clone());
            }
        }
        touched
    }

    /// Rules known for `name`, empty if none.
    pub fn rules_for(&self, name: &str) -> &[VersionRule] {
        self.rules.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether `name` was ever registered, even if its list is now empty.
    pub fn contains(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }

    /// Forget `name` entirely.
    pub fn remove(&mut self, name: &str) -> Option<Vec<VersionRule>> {
        self.rules.shift_remove(name)
    }

    /// Registered names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    /// All entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[VersionRule])> {
        self.rules.iter().map(|(n, r)| (n.as_str(), r.as_slice()))
    }

    /// Number of registered names.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether no name is registered.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

// TESTS #######################################################################
