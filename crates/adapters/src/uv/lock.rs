//! `uv.lock` parsing. uv's lockfile is TOML with one `[[package]]`
//! table per resolved package; each dependency entry may be a bare string
//! (`"requests"`) or a table with a `name` key plus extras/markers. Both
//! forms round-trip into the same [`bottles_common::manifest::DependencyEntry`]
//! shape the pip parsers produce, so adapters stay interchangeable at that
//! boundary.

use std::collections::BTreeMap;
use std::path::Path;

use bottles_common::manifest::{DependencyEntry, VersionSpec};

use crate::error::{ErrorKind, PackageManagerError};
use crate::normalize::normalize_pep503;

#[derive(serde::Deserialize)]
struct UvLockFile {
    #[serde(default)]
    package: Vec<LockPackage>,
}

#[derive(serde::Deserialize)]
struct LockPackage {
    name: String,
    version: Option<String>,
    #[serde(default)]
    dependencies: Vec<LockDependency>,
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum LockDependency {
    Bare(String),
    Table {
        name: String,
        #[serde(default)]
        extra: Vec<String>,
        marker: Option<String>,
    },
}

/// One resolved package and the names of its direct dependencies, both
/// PEP 503-normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockedPackage {
    pub name: String,
    pub version: Option<String>,
    pub dependencies: Vec<DependencyEntry>,
}

/// Parse a `uv.lock` file into its resolved package graph.
pub fn parse_uv_lock(path: &Path) -> Result<Vec<LockedPackage>, PackageManagerError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        PackageManagerError::new(
            "UvAdapter",
            ErrorKind::InvalidManifest,
            format!("failed to read {}: {e}", path.display()),
        )
    })?;
    let parsed: UvLockFile = toml::from_str(&text).map_err(|e| {
        PackageManagerError::new(
            "UvAdapter",
            ErrorKind::InvalidManifest,
            format!("invalid uv.lock: {e}"),
        )
    })?;

    Ok(parsed
        .package
        .into_iter()
        .map(|pkg| LockedPackage {
            name: normalize_pep503(&pkg.name),
            version: pkg.version,
            dependencies: pkg
                .dependencies
                .into_iter()
                .map(|dep| match dep {
                    LockDependency::Bare(name) => DependencyEntry {
                        name: normalize_pep503(&name),
                        spec: VersionSpec::Any,
                        extras: Vec::new(),
                        marker: None,
                        raw: name,
                    },
                    LockDependency::Table { name, extra, marker } => DependencyEntry {
                        name: normalize_pep503(&name),
                        spec: VersionSpec::Any,
                        extras: extra,
                        marker,
                        raw: name,
                    },
                })
                .collect(),
        })
        .collect())
}

/// Flatten a locked package graph into the `BTreeMap<name, VersionSpec>`
/// shape a [`bottles_common::Manifest`] expects, pinning each locked
/// package to its exact resolved version.
pub fn locked_packages_to_dependencies(
    packages: &[LockedPackage],
) -> BTreeMap<String, VersionSpec> {
    packages
        .iter()
        .filter_map(|pkg| {
            pkg.version
                .as_ref()
                .map(|v| (pkg.name.clone(), VersionSpec::exact(v.clone())))
        })
        .collect()
}
