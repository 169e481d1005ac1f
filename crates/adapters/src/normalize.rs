//! Package-name canonicalization (PEP 503).
//!
//! pip and uv both resolve Python package names case-insensitively with
//! `_`/`.`/`-` treated as equivalent separators, so both adapters share
//! this implementation.

use regex::Regex;

/// Lowercase and collapse runs of `_`, `.`, `-` into a single `-`
/// (PEP 503 normalization, which both pip and uv implement identically).
/// Idempotent: `normalize(normalize(x)) == normalize(x)`.
pub fn normalize_pep503(name: &str) -> String {
    let separators = Regex::new(r"[-_.]+").expect("separator regex is well-formed");
    separators.replace_all(&name.to_lowercase(), "-").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_collapses_separators() {
        assert_eq!(normalize_pep503("Friendly_Bard.2"), "friendly-bard-2");
        assert_eq!(normalize_pep503("foo__bar-baz.qux"), "foo-bar-baz-qux");
    }

    #[test]
    fn is_idempotent() {
        let once = normalize_pep503("Some_Weird.Name--Here");
        let twice = normalize_pep503(&once);
        assert_eq!(once, twice);
    }

    proptest::proptest! {
        #[test]
        fn idempotence_holds_for_arbitrary_ascii(name in "[A-Za-z0-9._-]{1,30}") {
            let once = normalize_pep503(&name);
            let twice = normalize_pep503(&once);
            prop_assert_eq!(once, twice);
        }
    }
}
