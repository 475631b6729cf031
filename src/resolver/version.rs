//! Lenient semantic-version parsing for release folder names
//!
//! Release trees name version folders `v5.1.2` or `5.1.2`; ordering is the
//! usual major/minor/patch comparison.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse `major.minor.patch`, tolerating a leading `v`. Returns `None`
    /// for anything else, which callers treat as "not a version folder".
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim().trim_start_matches(['v', 'V']);
        let mut parts = trimmed.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        let patch = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self::new(major, minor, patch))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_and_prefixed() {
        assert_eq!(Version::parse("5.1.2"), Some(Version::new(5, 1, 2)));
        assert_eq!(Version::parse("v4.9.0"), Some(Version::new(4, 9, 0)));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(Version::parse("katapult-deployer"), None);
        assert_eq!(Version::parse("5.1"), None);
        assert_eq!(Version::parse("5.1.2.3"), None);
        assert_eq!(Version::parse("5.x.2"), None);
    }

    #[test]
    fn test_ordering_is_numeric_not_lexical() {
        assert!(Version::new(5, 10, 0) > Version::new(5, 9, 9));
        assert!(Version::new(5, 1, 2) > Version::new(5, 0, 0));
        assert!(Version::new(4, 9, 0) < Version::new(5, 0, 0));
    }

    #[test]
    fn test_display_round_trip() {
        let v = Version::new(5, 1, 2);
        assert_eq!(Version::parse(&v.to_string()), Some(v));
    }
}
