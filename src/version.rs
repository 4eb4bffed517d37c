// src/version.rs

//! Lenient version parsing for manifests
//!
//! Manifest version strings predate semver: two-component versions
//! ("2.2") and pre-release tags written without a hyphen ("2.2.0Beta3")
//! are both common in the wild. This module normalizes those forms onto
//! `semver::Version` so ordinary semver comparison applies.

use semver::Version;

/// Parse a manifest version string, tolerating legacy forms.
///
/// Missing components are padded with zeros and a trailing alphanumeric
/// tag becomes a semver pre-release, so `"2.2"` parses as `2.2.0` and
/// `"2.2.0Beta3"` parses as `2.2.0-beta3` (which sorts before `2.2.0`).
/// Returns `None` for strings that cannot be normalized.
pub fn parse_loose(s: &str) -> Option<Version> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(v) = Version::parse(s) {
        return Some(v);
    }

    // Split the numeric core from whatever trails it.
    let core_end = s
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(s.len());
    let (core, tail) = s.split_at(core_end);

    let parts: Vec<&str> = core.split('.').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }
    let mut nums = [0u64; 3];
    for (i, p) in parts.iter().enumerate() {
        nums[i] = p.parse().ok()?;
    }

    let pre = tail.trim_start_matches(['-', '_', ' ', '.']);
    let candidate = if pre.is_empty() {
        format!("{}.{}.{}", nums[0], nums[1], nums[2])
    } else {
        format!(
            "{}.{}.{}-{}",
            nums[0],
            nums[1],
            nums[2],
            pre.to_ascii_lowercase()
        )
    };

    Version::parse(&candidate).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_semver_passes_through() {
        assert_eq!(parse_loose("1.2.3"), Some(Version::new(1, 2, 3)));
    }

    #[test]
    fn test_short_versions_are_padded() {
        assert_eq!(parse_loose("2.2"), Some(Version::new(2, 2, 0)));
        assert_eq!(parse_loose("3"), Some(Version::new(3, 0, 0)));
    }

    #[test]
    fn test_attached_prerelease_tag() {
        let v = parse_loose("2.2.0Beta3").unwrap();
        assert_eq!((v.major, v.minor, v.patch), (2, 2, 0));
        assert_eq!(v.pre.as_str(), "beta3");
        // a pre-release sorts before its release
        assert!(v < Version::new(2, 2, 0));
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert_eq!(parse_loose(""), None);
        assert_eq!(parse_loose("not a version"), None);
        assert_eq!(parse_loose("1.2.3.4.5"), None);
    }
}
