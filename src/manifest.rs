// SPDX-License-Identifier: MPL-2.0

//! Reader for workspace `package.xml` manifests.

use std::path::{Path, PathBuf};

use log::debug;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::ManifestError;
use crate::package::ManifestPackage;
use crate::rule::{Dependency, Operator};

/// Kinds of dependency elements of a manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencyKind {
    /// `<depend>`, needed to build and to run.
    Depend,
    /// `<build_depend>`
    Build,
    /// `<build_export_depend>`
    BuildExport,
    /// `<buildtool_depend>`
    Buildtool,
    /// `<exec_depend>`, and `<run_depend>` of format 1.
    Exec,
    /// `<test_depend>`
    Test,
}

impl DependencyKind {
    /// Kinds needed to build a workspace and run its tests.
    pub const BUILD: &'static [DependencyKind] = &[
        DependencyKind::Depend,
        DependencyKind::Build,
        DependencyKind::BuildExport,
        DependencyKind::Buildtool,
        DependencyKind::Test,
    ];

    /// Every kind.
    pub const ALL: &'static [DependencyKind] = &[
        DependencyKind::Depend,
        DependencyKind::Build,
        DependencyKind::BuildExport,
        DependencyKind::Buildtool,
        DependencyKind::Exec,
        DependencyKind::Test,
    ];

    fn from_tag(tag: &[u8]) -> Option<Self> {
        match tag {
            b"depend" => Some(Self::Depend),
            b"build_depend" => Some(Self::Build),
            b"build_export_depend" => Some(Self::BuildExport),
            b"buildtool_depend" | b"buildtool_export_depend" => Some(Self::Buildtool),
            b"exec_depend" | b"run_depend" => Some(Self::Exec),
            b"test_depend" => Some(Self::Test),
            _ => None,
        }
    }
}

/// Name of manifest files.
pub const MANIFEST_FILE: &str = "package.xml";

/// Read the manifest at `path`, keeping dependencies of the given kinds.
pub fn read(path: &Path, kinds: &[DependencyKind]) -> Result<ManifestPackage, ManifestError> {
    let xml = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&xml, path, kinds)
}

enum Field {
    Name,
    Version,
    Dependency(Vec<(Operator, String)>),
}

/// Parse manifest text. `path` is only used in errors.
pub fn parse(xml: &str, path: &Path, kinds: &[DependencyKind]) -> Result<ManifestPackage, ManifestError> {
    let xml_error = |source: quick_xml::Error| ManifestError::Xml {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut depth = 0usize;
    let mut current: Option<Field> = None;
    let mut name: Option<String> = None;
    let mut version: Option<String> = None;
    let mut dependencies: Vec<Dependency> = Vec::new();

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(element) => {
                depth += 1;
                // Only direct children of <package> matter.
                current = if depth == 2 {
                    field_of(&element, kinds).map_err(xml_error)?
                } else {
                    None
                };
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(xml_error)?;
                let text = text.trim();
                match current.take() {
                    Some(Field::Name) => name = Some(text.to_string()),
                    Some(Field::Version) => version = Some(text.to_string()),
                    Some(Field::Dependency(constraints)) if constraints.is_empty() => {
                        dependencies.push(Dependency::any(text));
                    }
                    Some(Field::Dependency(constraints)) => {
                        for (operator, v) in constraints {
                            dependencies.push(Dependency::new(text, operator, v));
                        }
                    }
                    None => {}
                }
            }
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                current = None;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    let name = name
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ManifestError::MissingName {
            path: path.to_path_buf(),
        })?;
    debug!("Manifest {} lists {} dependencies", name, dependencies.len());
    let mut package = ManifestPackage::new(name, version).with_path(PathBuf::from(path));
    for dependency in &dependencies {
        package.add_dependency(dependency);
    }
    Ok(package)
}

fn field_of(element: &BytesStart, kinds: &[DependencyKind]) -> Result<Option<Field>, quick_xml::Error> {
    match element.name().as_ref() {
        b"name" => return Ok(Some(Field::Name)),
        b"version" => return Ok(Some(Field::Version)),
        _ => {}
    }
    let Some(kind) = DependencyKind::from_tag(element.name().as_ref()) else {
        return Ok(None);
    };
    if !kinds.contains(&kind) {
        return Ok(None);
    }
    let mut constraints = Vec::new();
    for attribute in element.attributes() {
        let attribute = attribute?;
        let operator = match attribute.key.as_ref() {
            b"version_lt" => Operator::Lt,
            b"version_lte" => Operator::Lte,
            b"version_eq" => Operator::Eq,
            b"version_gte" => Operator::Gte,
            b"version_gt" => Operator::Gt,
            _ => continue,
        };
        constraints.push((operator, attribute.unescape_value()?.into_owned()));
    }
    Ok(Some(Field::Dependency(constraints)))
}

/// Find every manifest below `root`, skipping directories holding a
/// `COLCON_IGNORE` or `CATKIN_IGNORE` marker. Sorted by path.
pub fn discover(root: &Path) -> Result<Vec<PathBuf>, ManifestError> {
    let io_error = |path: &Path| {
        let path = path.to_path_buf();
        move |source: std::io::Error| ManifestError::Io { path, source }
    };
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        if dir.join("COLCON_IGNORE").exists() || dir.join("CATKIN_IGNORE").exists() {
            continue;
        }
        let manifest = dir.join(MANIFEST_FILE);
        if manifest.is_file() {
            found.push(manifest);
            continue;
        }
        for entry in std::fs::read_dir(&dir).map_err(io_error(&dir))? {
            let entry = entry.map_err(io_error(&dir))?;
            let is_hidden = entry.file_name().to_string_lossy().starts_with('.');
            if !is_hidden && entry.file_type().map_err(io_error(&dir))?.is_dir() {
                pending.push(entry.path());
            }
        }
    }
    found.sort();
    Ok(found)
}

// TESTS #######################################################################

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::Package;
    use crate::rule::{Author, VersionRule};

    const MANIFEST: &str = r#"<?xml version="1.0"?>
<?xml-model href="http://download.ros.org/schema/package_format3.xsd" schematypens="http://www.w3.org/2001/XMLSchema"?>
<package format="3">
  <name>my_robot</name>
  <version>0.3.1</version>
  <description>A robot &amp; its driver</description>
  <buildtool_depend>ament_cmake</buildtool_depend>
  <depend version_gte="16.0" version_lt="17">rclcpp</depend>
  <exec_depend>launch_ros</exec_depend>
  <test_depend version_eq="0.4.2">ament_lint_auto</test_depend>
  <export>
    <build_type>ament_cmake</build_type>
  </export>
</package>
"#;

    #[test]
    fn build_dependencies() {
        let pkg = parse(MANIFEST, Path::new("package.xml"), DependencyKind::BUILD).unwrap();
        assert_eq!(pkg.name(), "my_robot");
        assert_eq!(pkg.version(), Some("0.3.1"));
        let names: Vec<_> = pkg.dependencies().keys().cloned().collect();
        assert_eq!(names, vec!["ament_cmake", "rclcpp", "ament_lint_auto"]);
        let author = Author::package("my_robot", "0.3.1");
        assert_eq!(
            pkg.dependencies()["rclcpp"],
            vec![
                VersionRule::new(Operator::Gte, "16.0", author.clone()),
                VersionRule::new(Operator::Lt, "17", author),
            ]
        );
    }

    #[test]
    fn exec_dependencies_on_request() {
        let pkg = parse(MANIFEST, Path::new("package.xml"), DependencyKind::ALL).unwrap();
        assert!(pkg.dependencies().contains_key("launch_ros"));
        assert!(!pkg.dependencies().contains_key("ament_cmake_build_type"));
    }

    #[test]
    fn missing_name() {
        let err = parse("<package><version>1</version></package>", Path::new("x.xml"), DependencyKind::ALL)
            .unwrap_err();
        assert!(matches!(err, ManifestError::MissingName { .. }));
    }

    #[test]
    fn malformed_xml() {
        let err = parse("<package><name>a</nam></package>", Path::new("x.xml"), DependencyKind::ALL)
            .unwrap_err();
        assert!(matches!(err, ManifestError::Xml { .. }));
    }

    #[test]
    fn discover_skips_ignored_directories() {
        let dir = tempfile::tempdir().unwrap();
        let write = |rel: &str| {
            let path = dir.path().join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, "<package><name>x</name></package>").unwrap();
        };
        write("src/a/package.xml");
        write("src/b/nested/package.xml");
        write("src/ignored/package.xml");
        std::fs::write(dir.path().join("src/ignored/COLCON_IGNORE"), "").unwrap();
        let found = discover(dir.path()).unwrap();
        assert_eq!(
            found,
            vec![
                dir.path().join("src/a/package.xml"),
                dir.path().join("src/b/nested/package.xml"),
            ]
        );
    }
}
