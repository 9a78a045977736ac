// SPDX-License-Identifier: MPL-2.0

//! Detection of unsatisfiable rule sets for a single package.

use std::cmp::Ordering;
use std::fmt;

use crate::report::{DefaultStringReporter, Reporter};
use crate::rule::{Author, Operator, VersionRule};
use crate::version::{compare, satisfies};

/// The shape of a clash between rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConflictKind {
    /// Two `=` rules with different versions.
    MultipleEquals,
    /// An `=` rule outside an upper bound.
    EqualsAboveUpper,
    /// An `=` rule outside a lower bound.
    EqualsBelowLower,
    /// A lower bound at or above an upper bound, leaving no version in between.
    CrossingBounds,
}

/// The rules of a package can not all hold at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictDetected {
    /// Package the rules apply to.
    pub package: String,
    /// Shape of the clash.
    pub kind: ConflictKind,
    /// Every rule taking part in the clash, in bank order.
    pub rules: Vec<VersionRule>,
}

impl ConflictDetected {
    /// Authors of the clashing rules, without repetition.
    pub fn authors(&self) -> Vec<&Author> {
        let mut authors: Vec<&Author> = Vec::new();
        for rule in &self.rules {
            if !authors.contains(&&rule.from) {
                authors.push(&rule.from);
            }
        }
        authors
    }

    /// Whether the clash opposes the installed system to something else.
    pub fn involves_installed(&self) -> bool {
        self.rules.iter().any(|r| r.from == Author::Installed)
            && self.rules.iter().any(|r| r.from != Author::Installed)
    }
}

impl fmt::Display for ConflictDetected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&DefaultStringReporter::report_conflict(self))
    }
}

impl std::error::Error for ConflictDetected {}

/// Check that the rules of `name` can be satisfied together.
///
/// Only the first kind of clash found is reported, with every rule involved in it.
pub fn detect(name: &str, rules: &[VersionRule]) -> Result<(), ConflictDetected> {
    let equals: Vec<&VersionRule> = rules.iter().filter(|r| r.operator == Operator::Eq).collect();
    let uppers: Vec<&VersionRule> = rules.iter().filter(|r| r.operator.is_upper()).collect();
    let lowers: Vec<&VersionRule> = rules.iter().filter(|r| r.operator.is_lower()).collect();

    if let Some(first) = equals.first() {
        if equals
            .iter()
            .any(|r| compare(&r.version, &first.version) != Ordering::Equal)
        {
            return Err(clash(name, ConflictKind::MultipleEquals, rules, |r| {
                r.operator == Operator::Eq
            }));
        }
    }

    for (bounds, kind) in [
        (&uppers, ConflictKind::EqualsAboveUpper),
        (&lowers, ConflictKind::EqualsBelowLower),
    ] {
        let pairs = violated_bounds(&equals, bounds);
        if !pairs.is_empty() {
            return Err(clash(name, kind, rules, |r| {
                pairs.iter().any(|(a, b)| *a == r || *b == r)
            }));
        }
    }

    let crossing: Vec<(&VersionRule, &VersionRule)> = lowers
        .iter()
        .flat_map(|low| uppers.iter().map(move |up| (*low, *up)))
        .filter(|(low, up)| crosses(low, up))
        .collect();
    if !crossing.is_empty() {
        return Err(clash(name, ConflictKind::CrossingBounds, rules, |r| {
            crossing.iter().any(|(a, b)| *a == r || *b == r)
        }));
    }
    Ok(())
}

/// Pairs of an `=` rule and a bound its version does not satisfy.
fn violated_bounds<'r>(
    equals: &[&'r VersionRule],
    bounds: &[&'r VersionRule],
) -> Vec<(&'r VersionRule, &'r VersionRule)> {
    equals
        .iter()
        .flat_map(|eq| bounds.iter().map(move |bound| (*eq, *bound)))
        .filter(|(eq, bound)| !satisfies(&eq.version, bound))
        .collect()
}

/// A lower and an upper bound leave no version between them.
/// `[a, a]` is allowed when both bounds are inclusive.
fn crosses(lower: &VersionRule, upper: &VersionRule) -> bool {
    match compare(&lower.version, &upper.version) {
        Ordering::Greater => true,
        Ordering::Equal => lower.operator.is_strict() || upper.operator.is_strict(),
        Ordering::Less => false,
    }
}

fn clash(
    name: &str,
    kind: ConflictKind,
    rules: &[VersionRule],
    involved: impl Fn(&VersionRule) -> bool,
) -> ConflictDetected {
    ConflictDetected {
        package: name.to_string(),
        kind,
        rules: rules.iter().filter(|r| involved(r)).cloned().collect(),
    }
}

// TESTS #######################################################################

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::tests::operator_strategy;
    use proptest::prelude::*;

    fn rule(op: Operator, v: &str, from: &str) -> VersionRule {
        VersionRule::new(op, v, Author::package(from, "1"))
    }

    #[test]
    fn compatible_rules() {
        let rules = vec![
            rule(Operator::Gt, "1.0.0-0", "x"),
            rule(Operator::Lte, "2.0.0-0", "y"),
            rule(Operator::Any, "", "z"),
        ];
        assert_eq!(detect("p", &rules), Ok(()));
    }

    #[test]
    fn equal_inclusive_bounds_meet() {
        let rules = vec![rule(Operator::Gte, "1.0", "x"), rule(Operator::Lte, "1.0", "y")];
        assert_eq!(detect("p", &rules), Ok(()));
        let rules = vec![rule(Operator::Gt, "1.0", "x"), rule(Operator::Lte, "1.0", "y")];
        assert_eq!(
            detect("p", &rules).unwrap_err().kind,
            ConflictKind::CrossingBounds
        );
    }

    #[test]
    fn multiple_equals() {
        let rules = vec![
            rule(Operator::Eq, "1.0", "x"),
            rule(Operator::Gte, "0.1", "z"),
            rule(Operator::Eq, "1.1", "y"),
        ];
        let conflict = detect("p", &rules).unwrap_err();
        assert_eq!(conflict.kind, ConflictKind::MultipleEquals);
        assert_eq!(conflict.rules, vec![rules[0].clone(), rules[2].clone()]);
    }

    #[test]
    fn equals_and_strict_upper() {
        let rules = vec![rule(Operator::Eq, "1.0.0-55", "x"), rule(Operator::Lt, "1.0.0-55", "y")];
        assert_eq!(
            detect("p", &rules).unwrap_err().kind,
            ConflictKind::EqualsAboveUpper
        );
        let rules = vec![rule(Operator::Eq, "1.0.0-55", "x"), rule(Operator::Lte, "1.0.0-55", "y")];
        assert_eq!(detect("p", &rules), Ok(()));
    }

    #[test]
    fn equals_below_lower() {
        let rules = vec![rule(Operator::Gte, "2.0", "x"), rule(Operator::Eq, "1.9", "y")];
        let conflict = detect("p", &rules).unwrap_err();
        assert_eq!(conflict.kind, ConflictKind::EqualsBelowLower);
        assert_eq!(conflict.authors().len(), 2);
    }

    #[test]
    fn installed_clash() {
        let rules = vec![
            VersionRule::equals("1.0", Author::Installed),
            rule(Operator::Eq, "1.1", "x"),
        ];
        assert!(detect("q", &rules).unwrap_err().involves_installed());
    }

    fn rules_strategy() -> impl Strategy<Value = Vec<VersionRule>> {
        prop::collection::vec(
            (operator_strategy(), 0u8..6, 0u8..4)
                .prop_map(|(op, v, from)| rule(op, &format!("1.{}", v), &format!("p{}", from))),
            0..8,
        )
    }

    proptest! {
        #[test]
        fn detected_conflicts_leave_no_version(rules in rules_strategy(), probe in 0u8..14) {
            // Probes cover every rule version and the gaps around them.
            let probe = format!("1.{}", probe / 2) + if probe % 2 == 1 { ".5" } else { "" };
            if detect("p", &rules).is_err() {
                prop_assert!(!rules.iter().all(|r| satisfies(&probe, r)));
            }
        }

        #[test]
        fn accepted_equals_satisfy_everything(rules in rules_strategy()) {
            if detect("p", &rules).is_ok() {
                if let Some(eq) = rules.iter().find(|r| r.operator == Operator::Eq) {
                    prop_assert!(rules.iter().all(|r| satisfies(&eq.version, r)));
                }
            }
        }
    }
}
