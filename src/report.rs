// SPDX-License-Identifier: MPL-2.0

//! Build reports as clear as possible as to why
//! a package could not be resolved.

use std::fmt::Write;

use crate::conflict::{ConflictDetected, ConflictKind};
use crate::rule::VersionRule;
use crate::selector::CandidateNotFound;

/// Reporter trait.
pub trait Reporter {
    /// Output type of the report.
    type Output;

    /// Explain why the rules of a package clash.
    fn report_conflict(conflict: &ConflictDetected) -> Self::Output;

    /// Explain why no version of a package could be chosen.
    fn report_missing(missing: &CandidateNotFound) -> Self::Output;

    /// Explain several clashes at once.
    fn report_conflicts(conflicts: &[ConflictDetected]) -> Self::Output;

    /// Explain several missing candidates at once.
    fn report_missing_all(missing: &[CandidateNotFound]) -> Self::Output;
}

/// Reporter that outputs multi-line narratives as strings,
/// one bullet per offending rule.
#[derive(Default, Debug)]
pub struct DefaultStringReporter;

impl DefaultStringReporter {
    fn headline(kind: ConflictKind) -> &'static str {
        match kind {
            ConflictKind::MultipleEquals => "different exact versions are required",
            ConflictKind::EqualsAboveUpper => "an exact version is above an upper bound",
            ConflictKind::EqualsBelowLower => "an exact version is below a lower bound",
            ConflictKind::CrossingBounds => "the lower bound is above the upper bound",
        }
    }
}

impl Reporter for DefaultStringReporter {
    type Output = String;

    fn report_conflict(conflict: &ConflictDetected) -> String {
        let mut out = format!(
            "Conflict on {}: {}",
            conflict.package,
            Self::headline(conflict.kind)
        );
        for rule in &conflict.rules {
            let _ = write!(out, "\n  - {}", rationale(rule));
        }
        out
    }

    fn report_missing(missing: &CandidateNotFound) -> String {
        let mut out = format!("No version of {} satisfies its rules", missing.package);
        let tightest = [
            ("exact version", &missing.equals),
            ("upper bound", &missing.upper),
            ("lower bound", &missing.lower),
        ];
        for (label, rule) in tightest {
            if let Some(rule) = rule {
                let _ = write!(out, "\n  - {}: {}", label, rationale(rule));
            }
        }
        if missing.available.is_empty() {
            out.push_str("\n  Available versions: none, the package index may need an update");
        } else {
            let _ = write!(out, "\n  Available versions: {}", missing.available.join(", "));
        }
        out
    }

    fn report_conflicts(conflicts: &[ConflictDetected]) -> String {
        conflicts
            .iter()
            .map(Self::report_conflict)
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn report_missing_all(missing: &[CandidateNotFound]) -> String {
        missing
            .iter()
            .map(Self::report_missing)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// One line explaining a rule, as in `foo=1.2 requires >= 1.0`.
pub fn rationale(rule: &VersionRule) -> String {
    format!("{} requires {}", rule.from, rule.constraint())
}

// TESTS #######################################################################

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::detect;
    use crate::rule::{Author, Operator};
    use crate::selector::select;

    #[test]
    fn conflict_names_every_author() {
        let rules = vec![
            VersionRule::equals("1.0.0-55", Author::package("x", "1.0")),
            VersionRule::new(Operator::Lte, "1.0.0-10", Author::package("y", "2.0")),
        ];
        let text = detect("p", &rules).unwrap_err().to_string();
        assert!(text.starts_with("Conflict on p"));
        assert!(text.contains("x=1.0 requires = 1.0.0-55"));
        assert!(text.contains("y=2.0 requires <= 1.0.0-10"));
    }

    #[test]
    fn missing_lists_available_versions() {
        let rules = vec![VersionRule::equals("2.0", Author::User)];
        let text = select("p", &rules, &["1.0".to_string()])
            .unwrap_err()
            .to_string();
        assert!(text.contains("exact version: user request requires = 2.0"));
        assert!(text.ends_with("Available versions: 1.0"));
    }

    #[test]
    fn missing_unknown_package() {
        let text = DefaultStringReporter::report_missing(&CandidateNotFound {
            package: "ghost".into(),
            equals: None,
            upper: None,
            lower: None,
            available: vec![],
        });
        assert!(text.contains("package index may need an update"));
    }
}
