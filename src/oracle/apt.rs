// SPDX-License-Identifier: MPL-2.0

//! Oracle backed by the apt and dpkg command line tools.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Mutex, PoisonError};

use log::{debug, warn};

use super::{LocalArchive, Oracle, Provider};
use crate::error::OracleError;
use crate::rule::{parse_dependency_field, Dependency, Operator};
use crate::type_aliases::Map;
use crate::version::{self, SortOrder};

/// One version record printed by `apt-cache show` or `dpkg-deb -f`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Stanza {
    fields: Vec<(String, String)>,
}

impl Stanza {
    fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    fn dependencies(&self, command: &str) -> Result<Vec<Vec<Dependency>>, OracleError> {
        let mut groups = Vec::new();
        for key in ["Pre-Depends", "Depends"] {
            if let Some(field) = self.get(key) {
                groups.extend(parse_dependency_field(field).map_err(|e| {
                    OracleError::Unparsable {
                        command: command.to_string(),
                        message: e.to_string(),
                    }
                })?);
            }
        }
        Ok(groups)
    }
}

#[derive(Debug, Default)]
struct Snapshot {
    records: Map<String, Vec<Stanza>>,
    showpkg: Map<String, ShowPkg>,
    installed: Map<String, Option<String>>,
    origins: Map<String, Option<String>>,
    package_files: Option<Vec<(String, Option<String>)>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct ShowPkg {
    has_versions: bool,
    reverse_provides: Vec<(String, String)>,
}

/// Queries the system package database.
///
/// Answers are memoised so that a resolution sees a stable snapshot
/// even if the database changes while it runs.
#[derive(Debug, Default)]
pub struct AptOracle {
    snapshot: Mutex<Snapshot>,
}

impl AptOracle {
    /// An oracle with an empty memo.
    pub fn new() -> Self {
        Self::default()
    }

    fn with_snapshot<T>(&self, f: impl FnOnce(&mut Snapshot) -> T) -> T {
        let mut snapshot = self.snapshot.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut snapshot)
    }

    fn records(&self, name: &str) -> Result<Vec<Stanza>, OracleError> {
        if let Some(records) = self.with_snapshot(|s| s.records.get(name).cloned()) {
            return Ok(records);
        }
        let records = match run("apt-cache", &["show", name])? {
            Some(stdout) => parse_stanzas(&stdout),
            None => Vec::new(),
        };
        self.with_snapshot(|s| s.records.insert(name.to_string(), records.clone()));
        Ok(records)
    }

    fn showpkg(&self, name: &str) -> Result<ShowPkg, OracleError> {
        if let Some(info) = self.with_snapshot(|s| s.showpkg.get(name).cloned()) {
            return Ok(info);
        }
        let info = match run("apt-cache", &["showpkg", name])? {
            Some(stdout) => parse_showpkg(&stdout),
            None => ShowPkg::default(),
        };
        self.with_snapshot(|s| s.showpkg.insert(name.to_string(), info.clone()));
        Ok(info)
    }

    fn package_files(&self) -> Result<Vec<(String, Option<String>)>, OracleError> {
        if let Some(files) = self.with_snapshot(|s| s.package_files.clone()) {
            return Ok(files);
        }
        let files = run("apt-cache", &["policy"])?
            .map(|stdout| parse_package_files(&stdout))
            .unwrap_or_default();
        self.with_snapshot(|s| s.package_files = Some(files.clone()));
        Ok(files)
    }
}

impl Oracle for AptOracle {
    fn available_versions(&self, name: &str) -> Result<Vec<String>, OracleError> {
        let mut versions: Vec<String> = Vec::new();
        for record in self.records(name)? {
            if let Some(v) = record.get("Version") {
                if !versions.iter().any(|known| known == v) {
                    versions.push(v.to_string());
                }
            }
        }
        version::sort(&mut versions, SortOrder::Descending);
        Ok(versions)
    }

    fn is_virtual(&self, name: &str) -> Result<bool, OracleError> {
        let info = self.showpkg(name)?;
        Ok(!info.has_versions && !info.reverse_provides.is_empty())
    }

    fn providers(&self, name: &str) -> Result<Vec<Provider>, OracleError> {
        Ok(self
            .showpkg(name)?
            .reverse_provides
            .into_iter()
            .map(|(provider, version)| Provider {
                dependency: if version.is_empty() {
                    Dependency::any(provider)
                } else {
                    Dependency::new(provider, Operator::Eq, version)
                },
                priority: 0,
            })
            .collect())
    }

    fn dependencies_of(&self, name: &str, version: &str) -> Result<Vec<Vec<Dependency>>, OracleError> {
        let records = self.records(name)?;
        if records.is_empty() {
            return Err(OracleError::UnknownPackage(name.to_string()));
        }
        let record = records
            .iter()
            .find(|r| {
                r.get("Version")
                    .is_some_and(|v| version::compare(v, version) == std::cmp::Ordering::Equal)
            })
            .ok_or_else(|| OracleError::UnknownVersion {
                package: name.to_string(),
                version: version.to_string(),
            })?;
        record.dependencies(&format!("apt-cache show {}", name))
    }

    fn installed_version(&self, name: &str) -> Result<Option<String>, OracleError> {
        if let Some(installed) = self.with_snapshot(|s| s.installed.get(name).cloned()) {
            return Ok(installed);
        }
        let installed = run("dpkg-query", &["-W", "-f", "${Status}|${Version}\n", name])?
            .and_then(|stdout| parse_installed(&stdout));
        self.with_snapshot(|s| s.installed.insert(name.to_string(), installed.clone()));
        Ok(installed)
    }

    fn origin(&self, name: &str) -> Result<Option<String>, OracleError> {
        if let Some(origin) = self.with_snapshot(|s| s.origins.get(name).cloned()) {
            return Ok(origin);
        }
        let source = run("apt-cache", &["policy", name])?.and_then(|stdout| candidate_source(&stdout));
        let origin = match source {
            Some(source) => self
                .package_files()?
                .into_iter()
                .find(|(file, _)| *file == source)
                .and_then(|(_, origin)| origin),
            None => None,
        };
        self.with_snapshot(|s| s.origins.insert(name.to_string(), origin.clone()));
        Ok(origin)
    }

    fn local_archive_info(&self, path: &Path) -> Result<LocalArchive, OracleError> {
        let bad = |message: &str| OracleError::BadArchive {
            path: path.to_path_buf(),
            message: message.to_string(),
        };
        let path_arg = path.to_str().ok_or_else(|| bad("path is not valid unicode"))?;
        let stdout = run(
            "dpkg-deb",
            &["-f", path_arg, "Package", "Version", "Pre-Depends", "Depends"],
        )?
        .ok_or_else(|| bad("dpkg-deb could not read the control file"))?;
        let stanza = parse_stanzas(&stdout)
            .into_iter()
            .next()
            .ok_or_else(|| bad("empty control file"))?;
        let name = stanza.get("Package").ok_or_else(|| bad("no Package field"))?;
        let version = stanza.get("Version").ok_or_else(|| bad("no Version field"))?;
        Ok(LocalArchive {
            path: PathBuf::from(path),
            name: name.to_string(),
            version: version.to_string(),
            dependencies: stanza.dependencies("dpkg-deb -f")?,
        })
    }
}

/// Run a command, returning its standard output when it succeeds.
/// A command that runs but fails means "nothing known" and gives `None`.
fn run(program: &str, args: &[&str]) -> Result<Option<String>, OracleError> {
    debug!("Running {} {}", program, args.join(" "));
    let output = Command::new(program)
        .args(args)
        .env("LC_ALL", "C")
        .output()
        .map_err(|e| OracleError::Command {
            command: format!("{} {}", program, args.join(" ")),
            message: e.to_string(),
        })?;
    if !output.status.success() {
        warn!(
            "{} {} exited with {}: {}",
            program,
            args.join(" "),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
        return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()))
}

/// Split deb822 records separated by blank lines. Continuation lines
/// start with a space and are appended to the previous field.
fn parse_stanzas(text: &str) -> Vec<Stanza> {
    let mut stanzas = Vec::new();
    let mut current = Stanza::default();
    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.fields.is_empty() {
                stanzas.push(std::mem::take(&mut current));
            }
        } else if line.starts_with(' ') || line.starts_with('\t') {
            if let Some((_, value)) = current.fields.last_mut() {
                value.push(' ');
                value.push_str(line.trim());
            }
        } else if let Some((key, value)) = line.split_once(':') {
            current
                .fields
                .push((key.trim().to_string(), value.trim().to_string()));
        }
    }
    if !current.fields.is_empty() {
        stanzas.push(current);
    }
    stanzas
}

fn parse_showpkg(text: &str) -> ShowPkg {
    #[derive(PartialEq)]
    enum Section {
        Header,
        Versions,
        ReverseProvides,
        Other,
    }
    let mut section = Section::Header;
    let mut info = ShowPkg::default();
    for line in text.lines() {
        let trimmed = line.trim();
        match trimmed {
            "Versions:" => section = Section::Versions,
            "Reverse Provides:" => section = Section::ReverseProvides,
            _ if trimmed.ends_with(':') && !trimmed.contains(' ') || trimmed.starts_with("Reverse ") => {
                section = Section::Other
            }
            "" => {}
            _ if trimmed.starts_with("Dependencies:") || trimmed.starts_with("Provides:") => {
                section = Section::Other
            }
            _ => match section {
                Section::Versions => info.has_versions = true,
                Section::ReverseProvides => {
                    let mut parts = trimmed.split_whitespace();
                    if let Some(provider) = parts.next() {
                        let version = parts.next().unwrap_or_default().to_string();
                        info.reverse_provides.push((provider.to_string(), version));
                    }
                }
                Section::Header | Section::Other => {}
            },
        }
    }
    info
}

fn parse_installed(text: &str) -> Option<String> {
    let (status, version) = text.lines().next()?.split_once('|')?;
    (status.trim().ends_with(" installed") && !version.trim().is_empty())
        .then(|| version.trim().to_string())
}

/// Source line serving the candidate version in `apt-cache policy <name>`,
/// as in `http://archive.ubuntu.com/ubuntu jammy/main amd64 Packages`.
fn candidate_source(text: &str) -> Option<String> {
    let candidate = text
        .lines()
        .find_map(|l| l.trim().strip_prefix("Candidate:"))?
        .trim();
    if candidate == "(none)" {
        return None;
    }
    let mut in_candidate = false;
    for line in text.lines() {
        let trimmed = line.trim().trim_start_matches("***").trim();
        let mut tokens = trimmed.split_whitespace();
        let first = tokens.next().unwrap_or_default();
        let indent = line.len() - line.trim_start().len();
        if indent <= 5 && !trimmed.is_empty() && !trimmed.ends_with(':') {
            in_candidate = first == candidate;
        } else if in_candidate && first.chars().all(|c| c.is_ascii_digit() || c == '-') {
            let source = tokens.collect::<Vec<_>>().join(" ");
            if !source.is_empty() {
                return Some(source);
            }
        }
    }
    None
}

/// Package files listed by `apt-cache policy`, with their `o=` origin.
fn parse_package_files(text: &str) -> Vec<(String, Option<String>)> {
    let mut files: Vec<(String, Option<String>)> = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if let Some(release) = trimmed.strip_prefix("release ") {
            if let Some((_, origin)) = files.last_mut() {
                *origin = release
                    .split(',')
                    .find_map(|field| field.strip_prefix("o="))
                    .map(str::to_string);
            }
            continue;
        }
        let mut tokens = trimmed.split_whitespace();
        let priority = tokens.next().unwrap_or_default();
        if !priority.is_empty() && priority.chars().all(|c| c.is_ascii_digit() || c == '-') {
            let source = tokens.collect::<Vec<_>>().join(" ");
            if !source.is_empty() {
                files.push((source, None));
            }
        }
    }
    files
}

// TESTS #######################################################################

#[cfg(test)]
mod tests {
    use super::*;

    const SHOW: &str = "\
Package: ros-humble-rclcpp
Version: 16.0.8-1jammy.20240217
Depends: libc6 (>= 2.34),
 ros-humble-rcl | ros-humble-rcl-mock, ros-humble-ros-workspace
Pre-Depends: dpkg (>= 1.17)
Description: The ROS client library in C++.

Package: ros-humble-rclcpp
Version: 16.0.7-1jammy.20231220
Depends: libc6 (>= 2.34)
";

    #[test]
    fn stanzas_and_dependencies() {
        let stanzas = parse_stanzas(SHOW);
        assert_eq!(stanzas.len(), 2);
        assert_eq!(stanzas[1].get("version"), Some("16.0.7-1jammy.20231220"));
        let deps = stanzas[0].dependencies("test").unwrap();
        assert_eq!(deps.len(), 4);
        assert_eq!(deps[0], vec![Dependency::new("dpkg", Operator::Gte, "1.17")]);
        assert_eq!(deps[2].len(), 2);
        assert_eq!(deps[3], vec![Dependency::any("ros-humble-ros-workspace")]);
    }

    #[test]
    fn showpkg_virtual() {
        let text = "\
Package: mail-transport-agent
Versions:

Reverse Depends:
  bsd-mailx,mail-transport-agent
Dependencies:
Provides:
Reverse Provides:
postfix 3.6.4-1ubuntu1
exim4-daemon-light 4.95-4ubuntu2
";
        let info = parse_showpkg(text);
        assert!(!info.has_versions);
        assert_eq!(
            info.reverse_provides,
            vec![
                ("postfix".to_string(), "3.6.4-1ubuntu1".to_string()),
                ("exim4-daemon-light".to_string(), "4.95-4ubuntu2".to_string()),
            ]
        );
    }

    #[test]
    fn installed_status() {
        assert_eq!(
            parse_installed("install ok installed|1.2-3\n"),
            Some("1.2-3".to_string())
        );
        assert_eq!(parse_installed("deinstall ok config-files|1.2-3\n"), None);
        assert_eq!(parse_installed(""), None);
    }

    #[test]
    fn origin_of_candidate() {
        let policy = "\
ros-humble-rclcpp:
  Installed: (none)
  Candidate: 16.0.8-1jammy.20240217
  Version table:
     16.0.8-1jammy.20240217 500
        500 http://packages.ros.org/ros2/ubuntu jammy/main amd64 Packages
     16.0.7-1jammy.20231220 500
        100 /var/lib/dpkg/status
";
        assert_eq!(
            candidate_source(policy),
            Some("http://packages.ros.org/ros2/ubuntu jammy/main amd64 Packages".to_string())
        );
        let files = "\
Package files:
 100 /var/lib/dpkg/status
     release a=now
 500 http://packages.ros.org/ros2/ubuntu jammy/main amd64 Packages
     release o=ROS,a=jammy,n=jammy,c=main,b=amd64
     origin packages.ros.org
Pinned packages:
";
        let files = parse_package_files(files);
        assert_eq!(files[0], ("/var/lib/dpkg/status".to_string(), None));
        assert_eq!(
            files[1],
            (
                "http://packages.ros.org/ros2/ubuntu jammy/main amd64 Packages".to_string(),
                Some("ROS".to_string())
            )
        );
    }
}
