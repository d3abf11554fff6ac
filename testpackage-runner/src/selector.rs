// Copyright (c) The testpackage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wildcarded package selector.
//!
//! A selector is a dot-separated pattern matched against class packages,
//! segment by segment. Each segment is a literal, a `prefix*` wildcard, or a
//! bare `*` (exactly one segment). A pattern with no wildcard matches only
//! classes whose package equals the pattern; once a wildcard appears, the
//! final segment matches by prefix and admits deeper sub-packages at that
//! position.

use crate::test_list::{TestClass, TestIndex};
use std::{collections::BTreeMap, error, fmt, str::FromStr};

/// A parsed package selector.
#[derive(Clone, Debug)]
pub struct PackageSelector {
    raw: String,
    segments: Vec<Segment>,
    has_wildcard: bool,
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum Segment {
    Literal(String),
    Prefix(String),
    Any,
}

impl Segment {
    fn matches(&self, candidate: &str, is_last: bool) -> bool {
        match self {
            Segment::Any => true,
            Segment::Prefix(prefix) => candidate.starts_with(prefix),
            // The final segment of a wildcarded pattern matches by prefix:
            // `wildcards.*.includesub` selects includesub1, includesub2, ...
            Segment::Literal(literal) if is_last => candidate.starts_with(literal),
            Segment::Literal(literal) => candidate == literal,
        }
    }
}

impl PackageSelector {
    /// Returns true if the given package path matches this selector.
    pub fn matches_package(&self, package: &str) -> bool {
        if !self.has_wildcard {
            return package == self.raw;
        }

        let candidates: Vec<&str> = package.split('.').collect();
        if candidates.len() < self.segments.len() {
            return false;
        }
        let last = self.segments.len() - 1;
        self.segments
            .iter()
            .enumerate()
            .all(|(i, segment)| segment.matches(candidates[i], i == last))
        // Segments beyond the pattern are sub-packages of the matched
        // position and are admitted.
    }

    /// Returns true if the named class lives in a matching package.
    pub fn matches_class(&self, class: &TestClass) -> bool {
        self.matches_package(class.package_name())
    }

    /// Enumerates matching, runnable classes from the index, de-duplicated
    /// and ordered by class name. Non-runnable entries are skipped silently.
    pub fn discover<'i>(&self, index: &'i TestIndex) -> Vec<&'i TestClass> {
        let matched: BTreeMap<&str, &TestClass> = index
            .classes()
            .filter(|class| class.runnable && self.matches_class(class))
            .map(|class| (class.name.as_str(), class))
            .collect();
        matched.into_values().collect()
    }

    /// The original pattern text.
    pub fn pattern(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for PackageSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl FromStr for PackageSelector {
    type Err = SelectorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(SelectorParseError::new(s, "selector is empty"));
        }

        let mut segments = Vec::new();
        let mut has_wildcard = false;
        for segment in s.split('.') {
            if segment.is_empty() {
                return Err(SelectorParseError::new(s, "selector has an empty segment"));
            }
            let parsed = if segment == "*" {
                Segment::Any
            } else if let Some(prefix) = segment.strip_suffix('*') {
                if prefix.contains('*') {
                    return Err(SelectorParseError::new(
                        s,
                        "'*' is only permitted once, at the end of a segment",
                    ));
                }
                Segment::Prefix(prefix.to_owned())
            } else if segment.contains('*') {
                return Err(SelectorParseError::new(
                    s,
                    "'*' is only permitted at the end of a segment",
                ));
            } else {
                Segment::Literal(segment.to_owned())
            };
            has_wildcard |= !matches!(parsed, Segment::Literal(_));
            segments.push(parsed);
        }

        Ok(Self {
            raw: s.to_owned(),
            segments,
            has_wildcard,
        })
    }
}

/// A malformed selector pattern. Surfaced as a configuration error.
#[derive(Clone, Debug)]
pub struct SelectorParseError {
    pattern: String,
    reason: &'static str,
}

impl SelectorParseError {
    fn new(pattern: &str, reason: &'static str) -> Self {
        Self {
            pattern: pattern.to_owned(),
            reason,
        }
    }
}

impl fmt::Display for SelectorParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid selector '{}': {}", self.pattern, self.reason)
    }
}

impl error::Error for SelectorParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn selector(pattern: &str) -> PackageSelector {
        pattern.parse().expect("pattern parses")
    }

    #[test]
    fn literal_pattern_matches_exact_package_only() {
        let sel = selector("org.example.wildcards");
        assert!(sel.matches_package("org.example.wildcards"));
        assert!(!sel.matches_package("org.example.wildcards.include1"));
        assert!(!sel.matches_package("org.example"));
    }

    #[test]
    fn trailing_prefix_wildcard_matches_subpackages() {
        let sel = selector("org.example.wildcards.include*");
        assert!(sel.matches_package("org.example.wildcards.include1"));
        assert!(sel.matches_package("org.example.wildcards.include1.includesub1"));
        assert!(sel.matches_package("org.example.wildcards.include2"));
        assert!(!sel.matches_package("org.example.wildcards"));
        assert!(!sel.matches_package("org.example.wildcards.excluded"));
    }

    #[test]
    fn middle_wildcard_consumes_one_segment() {
        let sel = selector("org.example.wildcards.*.includesub");
        assert!(sel.matches_package("org.example.wildcards.include1.includesub1"));
        assert!(sel.matches_package("org.example.wildcards.include1.includesub2"));
        assert!(!sel.matches_package("org.example.wildcards"));
        assert!(!sel.matches_package("org.example.wildcards.include2"));
        assert!(!sel.matches_package("org.example.wildcards.include1.other"));
    }

    #[test]
    fn mid_pattern_prefix_wildcard() {
        let sel = selector("org.exa*.wildcards");
        assert!(sel.matches_package("org.example.wildcards"));
        assert!(sel.matches_package("org.exact.wildcardsextra"));
        assert!(!sel.matches_package("org.other.wildcards"));
    }

    #[test]
    fn malformed_selectors_are_rejected() {
        for pattern in ["", "org..example", "org.*foo.bar", "org.a*b.c", "org.**.c"] {
            pattern
                .parse::<PackageSelector>()
                .expect_err(&format!("expected '{pattern}' to be rejected"));
        }
    }

    #[test]
    fn discover_skips_non_runnable_and_sorts() {
        let index = TestIndex::new(vec![
            TestClass::new("org.example.pkg.ZTest", vec![]),
            TestClass::not_runnable("org.example.pkg.AbstractBase"),
            TestClass::new("org.example.pkg.ATest", vec![]),
            TestClass::new("org.example.other.BTest", vec![]),
        ]);
        let found = selector("org.example.pkg").discover(&index);
        let names: Vec<&str> = found.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["org.example.pkg.ATest", "org.example.pkg.ZTest"]
        );
    }
}
