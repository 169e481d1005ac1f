//! `requirements.txt` parser. Line-oriented, supports plain names,
//! PEP 440 operators, extras, environment markers, VCS/URL/file
//! specifiers (kept opaque), recursive `-r` includes (cycle-safe), `-e`
//! editable installs, and blank/comment lines.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use bottles_common::manifest::DependencyEntry;

use crate::error::{ErrorKind, PackageManagerError};
use crate::normalize::normalize_pep503;
use crate::version_spec::{parse_version_spec, split_extras};

/// Parse a single `requirements.txt` file, following `-r other.txt`
/// includes relative to the including file's directory. `seen` guards
/// against include cycles.
pub fn parse_requirements_file(
    path: &Path,
    seen: &mut HashSet<PathBuf>,
) -> Result<Vec<DependencyEntry>, PackageManagerError> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if !seen.insert(canonical.clone()) {
        return Ok(Vec::new());
    }

    let text = std::fs::read_to_string(path).map_err(|e| {
        PackageManagerError::new(
            "PipAdapter",
            ErrorKind::InvalidManifest,
            format!("failed to read {}: {e}", path.display()),
        )
    })?;

    let mut entries = Vec::new();
    let parent = path.parent().unwrap_or_else(|| Path::new("."));

    for raw_line in text.lines() {
        let line = strip_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        if let Some(include) = line.strip_prefix("-r ").or_else(|| line.strip_prefix("--requirement ")) {
            let included = parent.join(include.trim());
            entries.extend(parse_requirements_file(&included, seen)?);
            continue;
        }

        let (editable, rest) = match line
            .strip_prefix("-e ")
            .or_else(|| line.strip_prefix("--editable "))
        {
            Some(rest) => (true, rest.trim()),
            None => (false, line),
        };

        entries.push(parse_requirement_line(rest, editable));
    }

    Ok(entries)
}

fn parse_requirement_line(line: &str, editable: bool) -> DependencyEntry {
    let raw = line.to_string();

    if editable || line.contains("://") || line.starts_with('.') || line.starts_with('/') {
        // VCS/URL/local/editable specifiers: kept opaque.
        return DependencyEntry {
            name: derive_opaque_name(line),
            spec: crate::version_spec::parse_version_spec(line),
            extras: Vec::new(),
            marker: None,
            raw,
        };
    }

    let (spec_part, marker) = match line.split_once(';') {
        Some((spec_part, marker)) => (spec_part.trim(), Some(marker.trim().to_string())),
        None => (line, None),
    };

    let (name_and_extras, version_part) = split_name_and_spec(spec_part);
    let (bare_name, extras) = split_extras(name_and_extras);
    let spec = parse_version_spec(version_part);

    DependencyEntry {
        name: normalize_pep503(bare_name),
        spec,
        extras,
        marker,
        raw,
    }
}

/// `#` starts a comment only at the start of the line or when preceded by
/// whitespace, matching pip's own rule — otherwise a URL fragment like
/// `...#egg=name` would be truncated before the fragment is ever read.
fn strip_comment(raw_line: &str) -> &str {
    let bytes = raw_line.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if *b == b'#' && (i == 0 || bytes[i - 1].is_ascii_whitespace()) {
            return &raw_line[..i];
        }
    }
    raw_line
}

/// Split `name[extras]==1.2,<2` into `("name[extras]", "==1.2,<2")`.
fn split_name_and_spec(text: &str) -> (&str, &str) {
    let idx = text.find(['=', '>', '<', '!', '~']);
    match idx {
        Some(i) => (text[..i].trim(), text[i..].trim()),
        None => (text.trim(), ""),
    }
}

fn derive_opaque_name(line: &str) -> String {
    // `pkg @ git+https://...` or `name.whl`/egg fragments carry a usable
    // name; fall back to the raw text itself if none is found.
    if let Some((name, _)) = line.split_once('@') {
        return normalize_pep503(name.trim());
    }
    if let Some(captures) = regex::Regex::new(r"egg=([A-Za-z0-9_.\-]+)")
        .unwrap()
        .captures(line)
    {
        return normalize_pep503(&captures[1]);
    }
    line.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn parses_pinned_and_ranged_requirements_with_comments() {
        let dir = tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "requirements.txt",
            "requests==2.31.0\n# comment\nflask>=2,<3\n",
        );
        let mut seen = HashSet::new();
        let entries = parse_requirements_file(&path, &mut seen).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "requests");
        assert_eq!(entries[0].spec.to_string(), "==2.31.0");
        assert_eq!(entries[1].name, "flask");
    }

    #[test]
    fn parses_extras_and_markers() {
        let dir = tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "requirements.txt",
            "requests[security,socks]>=2.0; python_version >= \"3.10\"\n",
        );
        let mut seen = HashSet::new();
        let entries = parse_requirements_file(&path, &mut seen).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "requests");
        assert_eq!(entries[0].extras, vec!["security", "socks"]);
        assert_eq!(entries[0].marker.as_deref(), Some("python_version >= \"3.10\""));
    }

    #[test]
    fn follows_recursive_includes_without_cycling() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "base.txt", "six\n");
        let path = write_file(
            dir.path(),
            "requirements.txt",
            "-r base.txt\n-r requirements.txt\nrequests\n",
        );
        let mut seen = HashSet::new();
        let entries = parse_requirements_file(&path, &mut seen).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["six", "requests"]);
    }

    #[test]
    fn editable_and_vcs_specs_are_kept_opaque() {
        let dir = tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "requirements.txt",
            "-e git+https://github.com/x/y.git#egg=ylib\n",
        );
        let mut seen = HashSet::new();
        let entries = parse_requirements_file(&path, &mut seen).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "ylib");
        assert!(entries[0].raw.starts_with("git+https://"));
    }
}
