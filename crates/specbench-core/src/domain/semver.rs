//! Semantic version parsing and ordering.
//!
//! MAJOR.MINOR.PATCH with an optional `-prerelease` suffix and optional
//! `+build` metadata (ignored for ordering).

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Parsed semantic version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SemVer {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub pre: Option<String>,
}

impl SemVer {
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        let core = input.split_once('+').map_or(input, |(v, _)| v);
        let (version_part, pre) = match core.split_once('-') {
            Some((v, p)) if p.split('.').all(valid_prerelease_identifier) => {
                (v, Some(p.to_string()))
            }
            Some(_) => return None,
            None => (core, None),
        };

        let parts: Vec<&str> = version_part.split('.').collect();
        if parts.len() != 3 {
            return None;
        }

        Some(Self {
            major: numeric_identifier(parts[0])?,
            minor: numeric_identifier(parts[1])?,
            patch: numeric_identifier(parts[2])?,
            pre,
        })
    }

    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some()
    }
}

impl Ord for SemVer {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (&self.pre, &other.pre) {
                (None, None) => Ordering::Equal,
                // A prerelease sorts before the same version without one.
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some(a), Some(b)) => cmp_prerelease(a, b),
            })
    }
}

impl PartialOrd for SemVer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Digits only, no leading zero unless the value is zero.
fn numeric_identifier(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if s.len() > 1 && s.starts_with('0') {
        return None;
    }
    s.parse().ok()
}

fn valid_prerelease_identifier(s: &str) -> bool {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-') {
        return false;
    }
    // Purely numeric identifiers follow the same leading-zero rule as the core.
    !s.bytes().all(|b| b.is_ascii_digit()) || numeric_identifier(s).is_some()
}

/// Dot-separated identifiers; numeric identifiers compare numerically and
/// sort before alphanumeric ones.
fn cmp_prerelease(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
                    (Ok(nx), Ok(ny)) => nx.cmp(&ny),
                    (Ok(_), Err(_)) => Ordering::Less,
                    (Err(_), Ok(_)) => Ordering::Greater,
                    (Err(_), Err(_)) => x.cmp(y),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.pre {
            write!(f, "-{}", pre)?;
        }
        Ok(())
    }
}

impl FromStr for SemVer {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
            .ok_or_else(|| format!("'{}' is not valid semver (expected MAJOR.MINOR.PATCH)", s))
    }
}

/// Compare two version strings. Unparseable versions sort before every valid
/// one and compare lexically among themselves, so the order stays total.
pub fn compare_semver(a: &str, b: &str) -> Ordering {
    match (SemVer::parse(a), SemVer::parse(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => a.cmp(b),
    }
}

/// Which semver component changed between two versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionChange {
    Major,
    Minor,
    Patch,
    None,
}

impl VersionChange {
    /// Classify by the first differing component, in order.
    pub fn between(a: &SemVer, b: &SemVer) -> Self {
        if a.major != b.major {
            Self::Major
        } else if a.minor != b.minor {
            Self::Minor
        } else if a.patch != b.patch {
            Self::Patch
        } else {
            Self::None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Major => "major",
            Self::Minor => "minor",
            Self::Patch => "patch",
            Self::None => "none",
        }
    }
}

impl fmt::Display for VersionChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> SemVer {
        SemVer::parse(s).unwrap()
    }

    #[test]
    fn test_parse_plain_version() {
        let parsed = v("1.2.3");
        assert_eq!((parsed.major, parsed.minor, parsed.patch), (1, 2, 3));
        assert!(!parsed.is_prerelease());
    }

    #[test]
    fn test_parse_prerelease_and_build() {
        let parsed = v("2.0.0-beta.1+sha.abc");
        assert_eq!(parsed.pre.as_deref(), Some("beta.1"));
        assert_eq!(parsed.to_string(), "2.0.0-beta.1");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["1.2", "1.2.3.4", "a.b.c", "1..3", "1.2.3-", ""] {
            assert!(SemVer::parse(bad).is_none(), "{bad} should not parse");
        }
    }

    #[test]
    fn test_parse_rejects_leading_zeros() {
        for bad in ["01.2.3", "1.02.3", "1.2.03", "1.0.0-01", "1.0.0-alpha.007", "+1.2.3"] {
            assert!(SemVer::parse(bad).is_none(), "{bad} should not parse");
        }
        assert_eq!(v("0.0.0").to_string(), "0.0.0");
        assert_eq!(v("1.0.0-0").pre.as_deref(), Some("0"));
        assert_eq!(v("1.0.0-0a.x-y").pre.as_deref(), Some("0a.x-y"));
    }

    #[test]
    fn test_equal_precedence_means_equal_value() {
        // "1.2.3" is the only spelling of that version, so Eq and Ord agree.
        assert_eq!(v("1.2.3"), v("1.2.3+build.7"));
        assert_eq!(v("1.2.3").cmp(&v("1.2.3+build.7")), Ordering::Equal);
        assert!(SemVer::parse("1.2.03").is_none());
    }

    #[test]
    fn test_total_order() {
        assert!(v("1.0.0") < v("1.1.0"));
        assert!(v("1.1.0") < v("2.0.0"));
        assert!(v("1.0.0") < v("2.0.0"));
        assert!(v("1.9.0") < v("1.10.0"));
    }

    #[test]
    fn test_prerelease_sorts_before_release() {
        assert!(v("1.0.0-alpha") < v("1.0.0"));
        assert!(v("1.0.0-alpha") < v("1.0.0-alpha.1"));
        assert!(v("1.0.0-alpha.2") < v("1.0.0-alpha.10"));
        assert!(v("1.0.0-1") < v("1.0.0-alpha"));
    }

    #[test]
    fn test_compare_semver_strings() {
        assert_eq!(compare_semver("1.0.0", "1.0.0"), Ordering::Equal);
        assert_eq!(compare_semver("1.0.0", "0.9.9"), Ordering::Greater);
        assert_eq!(compare_semver("garbage", "0.0.1"), Ordering::Less);
    }

    #[test]
    fn test_version_change_classification() {
        assert_eq!(VersionChange::between(&v("1.2.0"), &v("1.3.0")), VersionChange::Minor);
        assert_eq!(VersionChange::between(&v("1.2.0"), &v("2.0.0")), VersionChange::Major);
        assert_eq!(VersionChange::between(&v("1.2.0"), &v("1.2.1")), VersionChange::Patch);
        assert_eq!(VersionChange::between(&v("1.2.0"), &v("1.2.0")), VersionChange::None);
    }
}
