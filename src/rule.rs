// SPDX-License-Identifier: MPL-2.0

//! Version rules and their authors.
//!
//! A [VersionRule] is the unit of constraint of the resolver:
//! an [Operator], a version, and the [Author] that imposed it.
//! Keeping the author next to every rule is what makes it possible
//! to remove the rules of a package once its selected version is invalidated,
//! and to name every culprit when resolution fails.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::version;

/// Relation between a package version and the version of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Operator {
    /// `=`
    Eq,
    /// `<`, spelled `<<` by dpkg.
    Lt,
    /// `<=`
    Lte,
    /// `>`, spelled `>>` by dpkg.
    Gt,
    /// `>=`
    Gte,
    /// No constraint on the version.
    Any,
}

impl Operator {
    /// Symbol of the operator, empty for [Operator::Any].
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Any => "",
        }
    }

    /// `<` or `<=`.
    pub fn is_upper(&self) -> bool {
        matches!(self, Self::Lt | Self::Lte)
    }

    /// `>` or `>=`.
    pub fn is_lower(&self) -> bool {
        matches!(self, Self::Gt | Self::Gte)
    }

    /// `<` or `>`, the bound itself is excluded.
    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Lt | Self::Gt)
    }
}

/// Error parsing an [Operator].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown version relation '{0}'")]
pub struct UnknownOperator(pub String);

impl FromStr for Operator {
    type Err = UnknownOperator;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Ok(Self::Any),
            "=" | "==" => Ok(Self::Eq),
            "<" | "<<" => Ok(Self::Lt),
            "<=" => Ok(Self::Lte),
            ">" | ">>" => Ok(Self::Gt),
            ">=" => Ok(Self::Gte),
            other => Err(UnknownOperator(other.to_string())),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("any"),
            op => f.write_str(op.symbol()),
        }
    }
}

/// Provenance of a [VersionRule].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Author {
    /// Requested on the command line or by a workspace manifest.
    User,
    /// The version currently installed on the system.
    Installed,
    /// Added by the resolver itself.
    ResolverAuto,
    /// Dependency of a package at a given version.
    Package {
        /// Name of the depending package.
        name: String,
        /// Version of the depending package.
        version: String,
    },
}

impl Author {
    /// Author standing for `name` at `version`.
    pub fn package(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self::Package {
            name: name.into(),
            version: version.into(),
        }
    }

    /// Whether this author is the package `name`, at any version.
    pub fn is_package(&self, name: &str) -> bool {
        matches!(self, Self::Package { name: n, .. } if n == name)
    }
}

impl fmt::Display for Author {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => f.write_str("user request"),
            Self::Installed => f.write_str("installed system"),
            Self::ResolverAuto => f.write_str("resolver"),
            Self::Package { name, version } => write!(f, "{}={}", name, version),
        }
    }
}

/// A constraint imposed by an [Author] on the versions of a package.
///
/// Two rules are equal when their operator, version and author are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VersionRule {
    /// Relation to the version.
    pub operator: Operator,
    /// Version of the rule, empty for [Operator::Any].
    pub version: String,
    /// Who imposed it.
    pub from: Author,
}

impl VersionRule {
    /// Create a rule.
    pub fn new(operator: Operator, version: impl Into<String>, from: Author) -> Self {
        let version = match operator {
            Operator::Any => String::new(),
            _ => version.into(),
        };
        Self {
            operator,
            version,
            from,
        }
    }

    /// A rule pinning exactly one version.
    pub fn equals(version: impl Into<String>, from: Author) -> Self {
        Self::new(Operator::Eq, version, from)
    }

    /// A rule accepting every version.
    pub fn any(from: Author) -> Self {
        Self::new(Operator::Any, "", from)
    }

    /// Whether `version` satisfies this rule.
    pub fn allows(&self, version: &str) -> bool {
        version::satisfies(version, self)
    }

    /// The constraint without the author, as in `>= 1.0`.
    pub fn constraint(&self) -> String {
        match self.operator {
            Operator::Any => "any version".to_string(),
            op => format!("{} {}", op, self.version),
        }
    }
}

impl fmt::Display for VersionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (from {})", self.constraint(), self.from)
    }
}

/// A dependency as listed by the oracle: a package name and a constraint
/// that has no author yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Dependency {
    /// Name of the required package.
    pub name: String,
    /// Relation to the version.
    pub operator: Operator,
    /// Version of the constraint, empty for [Operator::Any].
    pub version: String,
}

impl Dependency {
    /// Create a dependency.
    pub fn new(name: impl Into<String>, operator: Operator, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            operator,
            version: match operator {
                Operator::Any => String::new(),
                _ => version.into(),
            },
        }
    }

    /// A dependency on any version of `name`.
    pub fn any(name: impl Into<String>) -> Self {
        Self::new(name, Operator::Any, "")
    }

    /// The rule this dependency imposes once attributed to an author.
    pub fn rule(&self, from: Author) -> VersionRule {
        VersionRule::new(self.operator, self.version.clone(), from)
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operator {
            Operator::Any => f.write_str(&self.name),
            op => write!(f, "{} ({} {})", self.name, op.symbol(), self.version),
        }
    }
}

/// Error parsing a dependency field.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DependencyParseError {
    /// A dependency without a package name.
    #[error("empty package name in '{0}'")]
    EmptyName(String),
    /// Parenthesis without a closing one, or garbage after it.
    #[error("malformed version constraint in '{0}'")]
    MalformedConstraint(String),
    /// The relation symbol is unknown.
    #[error(transparent)]
    Operator(#[from] UnknownOperator),
}

impl FromStr for Dependency {
    type Err = DependencyParseError;

    /// Parse a single dpkg style dependency such as `libfoo:amd64 (>= 1.2)`.
    /// Architecture qualifiers are dropped.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (name, constraint) = match s.split_once('(') {
            Some((name, rest)) => {
                let inner = rest
                    .strip_suffix(')')
                    .ok_or_else(|| DependencyParseError::MalformedConstraint(s.to_string()))?;
                (name.trim(), Some(inner.trim()))
            }
            None => (s, None),
        };
        let name = name.split(':').next().unwrap_or_default().trim();
        if name.is_empty() {
            return Err(DependencyParseError::EmptyName(s.to_string()));
        }
        let Some(constraint) = constraint else {
            return Ok(Self::any(name));
        };
        let split = constraint
            .find(|c: char| !matches!(c, '<' | '>' | '='))
            .unwrap_or(constraint.len());
        let (symbol, version) = constraint.split_at(split);
        let version = version.trim();
        if version.is_empty() || version.contains(char::is_whitespace) {
            return Err(DependencyParseError::MalformedConstraint(s.to_string()));
        }
        Ok(Self::new(name, symbol.parse()?, version))
    }
}

/// Parse a comma separated dependency field into OR-groups,
/// as in `a (>= 1) | b, c`.
pub fn parse_dependency_field(field: &str) -> Result<Vec<Vec<Dependency>>, DependencyParseError> {
    field
        .split(',')
        .map(str::trim)
        .filter(|group| !group.is_empty())
        .map(|group| group.split('|').map(str::parse).collect())
        .collect()
}

// TESTS #######################################################################

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relation_symbols() {
        assert_eq!("<<".parse(), Ok(Operator::Lt));
        assert_eq!("<".parse(), Ok(Operator::Lt));
        assert_eq!(">>".parse(), Ok(Operator::Gt));
        assert_eq!("".parse(), Ok(Operator::Any));
        assert_eq!("=".parse(), Ok(Operator::Eq));
        assert!("=>".parse::<Operator>().is_err());
    }

    #[test]
    fn rule_equality_includes_author() {
        let a = VersionRule::equals("1.0", Author::User);
        let b = VersionRule::equals("1.0", Author::package("x", "2"));
        assert_ne!(a, b);
        assert_eq!(a, VersionRule::equals("1.0", Author::User));
    }

    #[test]
    fn any_rules_drop_their_version() {
        assert_eq!(VersionRule::new(Operator::Any, "1.0", Author::User).version, "");
    }

    #[test]
    fn parse_dependency() {
        assert_eq!(
            "libc6:amd64 (>= 2.34)".parse(),
            Ok(Dependency::new("libc6", Operator::Gte, "2.34"))
        );
        assert_eq!("python3".parse(), Ok(Dependency::any("python3")));
        assert_eq!(
            "foo (<<1.0~)".parse(),
            Ok(Dependency::new("foo", Operator::Lt, "1.0~"))
        );
        assert!(matches!(
            "foo (>= 1.0".parse::<Dependency>(),
            Err(DependencyParseError::MalformedConstraint(_))
        ));
        assert!(matches!(
            "(>= 1.0)".parse::<Dependency>(),
            Err(DependencyParseError::EmptyName(_))
        ));
    }

    #[test]
    fn parse_field_with_alternatives() {
        let field = parse_dependency_field("a (>= 1) | b, c,").unwrap();
        assert_eq!(
            field,
            vec![
                vec![Dependency::new("a", Operator::Gte, "1"), Dependency::any("b")],
                vec![Dependency::any("c")],
            ]
        );
    }
}
