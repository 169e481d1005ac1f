//! PEP 440-ish version specifier parsing, shared by the requirements,
//! pyproject, and uv.lock parsers.

use bottles_common::manifest::{VersionConstraint, VersionSpec};
use regex::Regex;

/// Operators PEP 440 (and the subset pip/uv accept) recognize.
const OPERATORS: &[&str] = &["===", "~=", "==", "!=", ">=", "<=", ">", "<"];

/// Parse a comma-separated specifier string (`">=1.24,<2"`, `"==1.2"`,
/// `""`/`"*"` for unconstrained) into a structured [`VersionSpec`].
///
/// Anything that doesn't look like a bare comparator list — a VCS URL, a
/// local path, a direct reference — is kept as `VersionSpec::Raw` rather
/// than guessed at.
pub fn parse_version_spec(spec: &str) -> VersionSpec {
    let spec = spec.trim();
    if spec.is_empty() || spec == "*" {
        return VersionSpec::Any;
    }
    if looks_like_raw(spec) {
        return VersionSpec::Raw(spec.to_string());
    }

    let mut constraints = Vec::new();
    for clause in spec.split(',') {
        let clause = clause.trim();
        if clause.is_empty() {
            continue;
        }
        match parse_clause(clause) {
            Some(constraint) => constraints.push(constraint),
            None => return VersionSpec::Raw(spec.to_string()),
        }
    }
    if constraints.is_empty() {
        VersionSpec::Any
    } else {
        VersionSpec::Constraints(constraints)
    }
}

fn looks_like_raw(spec: &str) -> bool {
    spec.contains("://")
        || spec.starts_with("git+")
        || spec.starts_with('/')
        || spec.starts_with('.')
        || spec.starts_with('@')
}

fn parse_clause(clause: &str) -> Option<VersionConstraint> {
    for op in OPERATORS {
        if let Some(rest) = clause.strip_prefix(op) {
            return Some(VersionConstraint {
                operator: (*op).to_string(),
                version: rest.trim().to_string(),
            });
        }
    }
    None
}

/// Render a [`VersionSpec`] back into PEP 440 text. Round-tripping through
/// `parse_version_spec` yields a semantically equal spec though not
/// necessarily byte-identical text (clause order may differ).
pub fn render_version_spec(spec: &VersionSpec) -> String {
    spec.to_string()
}

/// Split `name[extra1,extra2]` into the bare name and its extras list.
pub fn split_extras(raw_name: &str) -> (&str, Vec<String>) {
    static EXTRAS_RE_SRC: &str = r"^([A-Za-z0-9_.\-]+)\[([^\]]*)\]$";
    let re = Regex::new(EXTRAS_RE_SRC).expect("extras regex is well-formed");
    match re.captures(raw_name) {
        Some(caps) => {
            let name = caps.get(1).unwrap().as_str();
            let extras = caps
                .get(2)
                .unwrap()
                .as_str()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            (name, extras)
        }
        None => (raw_name, Vec::new()),
    }
}
