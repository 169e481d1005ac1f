//! `pyproject.toml` (PEP 621), `setup.cfg`, `setup.py`, and `Pipfile`
//! manifest parsing.
//!
//! `setup.py` is parsed statically: only literal `setup(...)` keyword
//! arguments are recognized. Anything that isn't a literal (a function
//! call, a variable, string concatenation) leaves that field empty — the
//! adapter never executes `setup.py`.

use std::collections::BTreeMap;
use std::path::Path;

use bottles_common::manifest::VersionSpec;
use bottles_common::Manifest;

use crate::error::{ErrorKind, PackageManagerError};
use crate::normalize::normalize_pep503;
use crate::version_spec::parse_version_spec;

#[derive(serde::Deserialize, Default)]
struct PyprojectToml {
    project: Option<ProjectTable>,
}

#[derive(serde::Deserialize, Default)]
struct ProjectTable {
    name: Option<String>,
    version: Option<String>,
    #[serde(rename = "requires-python")]
    requires_python: Option<String>,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(rename = "optional-dependencies", default)]
    optional_dependencies: BTreeMap<String, Vec<String>>,
}

fn dependency_list_to_map(items: &[String]) -> BTreeMap<String, VersionSpec> {
    let mut map = BTreeMap::new();
    for item in items {
        let (name_part, spec_part) = split_requirement(item);
        let (bare, _extras) = crate::version_spec::split_extras(name_part);
        map.insert(normalize_pep503(bare), parse_version_spec(spec_part));
    }
    map
}

fn split_requirement(text: &str) -> (&str, &str) {
    let idx = text.find(['=', '>', '<', '!', '~']);
    match idx {
        Some(i) => (text[..i].trim(), text[i..].trim()),
        None => (text.trim(), ""),
    }
}

/// Parse `pyproject.toml`'s `[project]` table into a `Manifest`. Returns
/// `None` if the file has no `[project]` table at all (setuptools-only
/// legacy configs commonly lack one).
pub fn parse_pyproject(path: &Path) -> Result<Option<Manifest>, PackageManagerError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        PackageManagerError::new(
            "PipAdapter",
            ErrorKind::InvalidManifest,
            format!("failed to read {}: {e}", path.display()),
        )
    })?;
    let parsed: PyprojectToml = toml::from_str(&text).map_err(|e| {
        PackageManagerError::new(
            "PipAdapter",
            ErrorKind::InvalidManifest,
            format!("invalid pyproject.toml: {e}"),
        )
    })?;
    let Some(project) = parsed.project else {
        return Ok(None);
    };

    let mut dev_dependencies = BTreeMap::new();
    for group in project.optional_dependencies.values() {
        dev_dependencies.extend(dependency_list_to_map(group));
    }

    Ok(Some(Manifest {
        name: project.name,
        version: project.version,
        dependencies: dependency_list_to_map(&project.dependencies),
        dev_dependencies,
        python_version: project.requires_python,
        extra: BTreeMap::new(),
    }))
}

/// Parse `setup.cfg`'s `[metadata]`/`[options]` sections (INI semantics)
/// into a `Manifest`.
pub fn parse_setup_cfg(path: &Path) -> Result<Manifest, PackageManagerError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        PackageManagerError::new(
            "PipAdapter",
            ErrorKind::InvalidManifest,
            format!("failed to read {}: {e}", path.display()),
        )
    })?;

    let mut name = None;
    let mut version = None;
    let mut dependencies = BTreeMap::new();
    let mut section = String::new();
    let mut current_key: Option<String> = None;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('[') && trimmed.ends_with(']') {
            section = trimmed[1..trimmed.len() - 1].to_string();
            current_key = None;
            continue;
        }
        if trimmed.is_empty() || trimmed.starts_with(['#', ';']) {
            continue;
        }
        // Continuation lines for multi-line `install_requires` lists are
        // indented relative to the original line in the raw source; here
        // we've already trimmed, so detect continuation by the absence
        // of a `key = value` form.
        if let Some((key, value)) = trimmed.split_once('=') {
            let key = key.trim();
            let value = value.trim();
            current_key = Some(key.to_string());
            match (section.as_str(), key) {
                ("metadata", "name") => name = Some(value.to_string()),
                ("metadata", "version") => version = Some(value.to_string()),
                ("options", "install_requires") => {
                    if !value.is_empty() {
                        insert_requirement_line(&mut dependencies, value);
                    }
                }
                _ => {}
            }
        } else if section == "options" && current_key.as_deref() == Some("install_requires") {
            insert_requirement_line(&mut dependencies, trimmed);
        }
    }

    Ok(Manifest {
        name,
        version,
        dependencies,
        dev_dependencies: BTreeMap::new(),
        python_version: None,
        extra: BTreeMap::new(),
    })
}

#[derive(serde::Deserialize, Default)]
struct PipfileToml {
    packages: Option<BTreeMap<String, PipfileDependency>>,
    #[serde(rename = "dev-packages")]
    dev_packages: Option<BTreeMap<String, PipfileDependency>>,
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum PipfileDependency {
    Bare(String),
    Table { version: Option<String> },
}

impl PipfileDependency {
    fn spec(&self) -> VersionSpec {
        match self {
            PipfileDependency::Bare(s) => parse_version_spec(s),
            PipfileDependency::Table { version } => {
                parse_version_spec(version.as_deref().unwrap_or("*"))
            }
        }
    }
}

fn pipfile_table_to_map(table: &BTreeMap<String, PipfileDependency>) -> BTreeMap<String, VersionSpec> {
    table
        .iter()
        .map(|(name, dep)| (normalize_pep503(name), dep.spec()))
        .collect()
}

/// Parse `Pipfile`'s `[packages]`/`[dev-packages]` tables into a
/// `Manifest`. `Pipfile` carries no project name or version, so both
/// fields are left `None`.
pub fn parse_pipfile(path: &Path) -> Result<Manifest, PackageManagerError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        PackageManagerError::new(
            "PipAdapter",
            ErrorKind::InvalidManifest,
            format!("failed to read {}: {e}", path.display()),
        )
    })?;
    let parsed: PipfileToml = toml::from_str(&text).map_err(|e| {
        PackageManagerError::new(
            "PipAdapter",
            ErrorKind::InvalidManifest,
            format!("invalid Pipfile: {e}"),
        )
    })?;

    Ok(Manifest {
        name: None,
        version: None,
        dependencies: parsed.packages.as_ref().map(pipfile_table_to_map).unwrap_or_default(),
        dev_dependencies: parsed.dev_packages.as_ref().map(pipfile_table_to_map).unwrap_or_default(),
        python_version: None,
        extra: BTreeMap::new(),
    })
}

fn insert_requirement_line(map: &mut BTreeMap<String, VersionSpec>, line: &str) {
    let (name_part, spec_part) = split_requirement(line);
    if name_part.is_empty() {
        return;
    }
    map.insert(normalize_pep503(name_part), parse_version_spec(spec_part));
}

/// Parse literal keyword arguments out of a `setup(...)` call in
/// `setup.py`, without executing the file. Only `name=`, `version=`, and
/// `install_requires=[...]` with string-literal elements are recognized;
/// anything else (a variable, a function call, f-strings) is left empty.
pub fn parse_setup_py(path: &Path) -> Result<Manifest, PackageManagerError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        PackageManagerError::new(
            "PipAdapter",
            ErrorKind::InvalidManifest,
            format!("failed to read {}: {e}", path.display()),
        )
    })?;

    let name = extract_literal_kwarg(&text, "name");
    let version = extract_literal_kwarg(&text, "version");
    let dependencies = extract_install_requires(&text);

    Ok(Manifest {
        name,
        version,
        dependencies,
        dev_dependencies: BTreeMap::new(),
        python_version: None,
        extra: BTreeMap::new(),
    })
}

fn extract_literal_kwarg(text: &str, key: &str) -> Option<String> {
    let re = regex::Regex::new(&format!(r#"{key}\s*=\s*["']([^"']+)["']"#)).ok()?;
    re.captures(text).map(|c| c[1].to_string())
}

fn extract_install_requires(text: &str) -> BTreeMap<String, VersionSpec> {
    let mut map = BTreeMap::new();
    let Some(list_re) = regex::Regex::new(r"install_requires\s*=\s*\[([^\]]*)\]").ok() else {
        return map;
    };
    let Some(captures) = list_re.captures(text) else {
        return map;
    };
    let item_re = regex::Regex::new(r#"["']([^"']+)["']"#).expect("item regex is well-formed");
    for item in item_re.captures_iter(&captures[1]) {
        insert_requirement_line(&mut map, &item[1]);
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn write(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::File::create(&path).unwrap().write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn parses_pep_621_project_table() {
        let dir = tempdir().unwrap();
        let path = write(
            dir.path(),
            "pyproject.toml",
            "[project]\nname=\"demo\"\nversion=\"0.1.0\"\ndependencies=[\"numpy>=1.24\",\"pandas\"]\n",
        );
        let manifest = parse_pyproject(&path).unwrap().unwrap();
        assert_eq!(manifest.name.as_deref(), Some("demo"));
        assert_eq!(manifest.version.as_deref(), Some("0.1.0"));
        assert_eq!(manifest.dependencies["numpy"].to_string(), ">=1.24");
        assert_eq!(manifest.dependencies["pandas"], VersionSpec::Any);
    }

    #[test]
    fn missing_project_table_returns_none() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "pyproject.toml", "[tool.black]\nline-length = 88\n");
        assert!(parse_pyproject(&path).unwrap().is_none());
    }

    #[test]
    fn parses_setup_cfg_install_requires() {
        let dir = tempdir().unwrap();
        let path = write(
            dir.path(),
            "setup.cfg",
            "[metadata]\nname = demo\nversion = 1.0.0\n\n[options]\ninstall_requires =\n    requests>=2\n    six\n",
        );
        let manifest = parse_setup_cfg(&path).unwrap();
        assert_eq!(manifest.name.as_deref(), Some("demo"));
        assert!(manifest.dependencies.contains_key("requests"));
        assert!(manifest.dependencies.contains_key("six"));
    }

    #[test]
    fn parses_literal_setup_py_kwargs() {
        let dir = tempdir().unwrap();
        let path = write(
            dir.path(),
            "setup.py",
            "from setuptools import setup\nsetup(\n    name='demo',\n    version='2.0.0',\n    install_requires=['requests==2.31.0', 'six'],\n)\n",
        );
        let manifest = parse_setup_py(&path).unwrap();
        assert_eq!(manifest.name.as_deref(), Some("demo"));
        assert_eq!(manifest.version.as_deref(), Some("2.0.0"));
        assert!(manifest.dependencies.contains_key("requests"));
    }

    #[test]
    fn parses_pipfile_packages_and_dev_packages() {
        let dir = tempdir().unwrap();
        let path = write(
            dir.path(),
            "Pipfile",
            "[packages]\nrequests = \"*\"\nflask = \">=2.0\"\n\n[dev-packages]\npytest = {version = \">=7\"}\n",
        );
        let manifest = parse_pipfile(&path).unwrap();
        assert_eq!(manifest.dependencies["requests"], VersionSpec::Any);
        assert_eq!(manifest.dependencies["flask"].to_string(), ">=2.0");
        assert_eq!(manifest.dev_dependencies["pytest"].to_string(), ">=7");
    }

    #[test]
    fn non_literal_setup_py_fields_stay_empty() {
        let dir = tempdir().unwrap();
        let path = write(
            dir.path(),
            "setup.py",
            "from setuptools import setup\nversion = compute_version()\nsetup(name='demo', version=version)\n",
        );
        let manifest = parse_setup_py(&path).unwrap();
        assert_eq!(manifest.name.as_deref(), Some("demo"));
        assert_eq!(manifest.version, None);
    }
}
