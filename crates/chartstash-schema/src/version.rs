//! Chart version ordering.

use std::cmp::Ordering;

fn parse(v: &str) -> Option<semver::Version> {
    semver::Version::parse(v.strip_prefix('v').unwrap_or(v)).ok()
}

/// Total order over chart version strings.
///
/// Versions that parse as semver (an optional leading `v` is allowed) compare
/// by semver precedence and sort above anything unparseable; unparseable
/// versions fall back to plain string order. Two distinct strings never
/// compare equal unless they are the same semver version written differently
/// (`v1.0.0` vs `1.0.0`), in which case the raw strings break the tie.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (parse(a), parse(b)) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn semver_precedence_not_lexical() {
        assert_eq!(compare_versions("1.10.0", "1.9.0"), Ordering::Greater);
        assert_eq!(compare_versions("1.0.0-rc.1", "1.0.0"), Ordering::Less);
        assert_eq!(compare_versions("v2.0.0", "1.5.0"), Ordering::Greater);
    }

    #[test]
    fn unparseable_sorts_below_semver() {
        assert_eq!(compare_versions("latest", "0.0.1"), Ordering::Less);
        assert_eq!(compare_versions("0.0.1", "latest"), Ordering::Greater);
        assert_eq!(compare_versions("beta", "alpha"), Ordering::Greater);
    }

    #[test]
    fn equal_only_when_identical() {
        assert_eq!(compare_versions("1.0.0", "1.0.0"), Ordering::Equal);
        assert_ne!(compare_versions("v1.0.0", "1.0.0"), Ordering::Equal);
    }
}
