//! Tool-neutral view of a project's declared dependencies (`Manifest`)
//! and of packages a tool reports as installed (`InstalledPackage`).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A single PEP 440-style version comparison, e.g. `>=1.24`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionConstraint {
    pub operator: String,
    pub version: String,
}

/// Structured representation of a dependency's version specifier.
///
/// `Any` is the unconstrained case (`"*"`, or a bare name with no spec).
/// `Constraints` holds one comparison per comma-separated clause, in the
/// order parsed; two specs are semantically equal when their constraint
/// sets are equal regardless of order (see `PartialEq` impl), so a spec
/// survives a parse/render round trip even if clause order shifts. `Raw`
/// carries specifiers the adapter doesn't normalize: VCS URLs, local
/// paths, direct references.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VersionSpec {
    Any,
    Constraints(Vec<VersionConstraint>),
    Raw(String),
}

impl VersionSpec {
    pub fn exact(version: impl Into<String>) -> Self {
        VersionSpec::Constraints(vec![VersionConstraint {
            operator: "==".to_string(),
            version: version.into(),
        }])
    }
}

impl PartialEq for VersionSpec {
    fn eq(&self, other: &Self) -> bool {
        use VersionSpec::*;
        match (self, other) {
            (Any, Any) => true,
            (Raw(a), Raw(b)) => a == b,
            (Constraints(a), Constraints(b)) => {
                let mut a = a.clone();
                let mut b = b.clone();
                a.sort_by(|x, y| (&x.operator, &x.version).cmp(&(&y.operator, &y.version)));
                b.sort_by(|x, y| (&x.operator, &x.version).cmp(&(&y.operator, &y.version)));
                a == b
            }
            _ => false,
        }
    }
}
impl Eq for VersionSpec {}

impl std::fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VersionSpec::Any => write!(f, "*"),
            VersionSpec::Raw(s) => write!(f, "{s}"),
            VersionSpec::Constraints(cs) => {
                let rendered: Vec<String> =
                    cs.iter().map(|c| format!("{}{}", c.operator, c.version)).collect();
                write!(f, "{}", rendered.join(","))
            }
        }
    }
}

/// A single dependency entry as parsed from a requirements file, lockfile,
/// or `pyproject.toml` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEntry {
    pub name: String,
    pub spec: VersionSpec,
    pub extras: Vec<String>,
    pub marker: Option<String>,
    /// Opaque original text, kept for VCS/URL/file specifiers.
    pub raw: String,
}

/// Tool-agnostic dependency manifest produced by a pure parser.
///
/// `extra` carries tool-specific fields the core doesn't model, opaque to
/// every consumer but the adapter that produced them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub name: Option<String>,
    pub version: Option<String>,
    pub dependencies: BTreeMap<String, VersionSpec>,
    pub dev_dependencies: BTreeMap<String, VersionSpec>,
    pub python_version: Option<String>,
    #[serde(default)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// A package as reported by a manager's "list installed" command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledPackage {
    pub name: String,
    pub version: String,
    pub location: PathBuf,
    pub metadata: Option<serde_json::Value>,
}
