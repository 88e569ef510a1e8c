//! Compilation target identifiers.
//!
//! A `TargetId` is the triple a single compile step is building for. It is
//! treated as opaque for lookups; the component accessors exist for logging
//! and diagnostics only. `TargetPattern` is what the gap registry stores so a
//! single rule can cover a family of triples.

use serde::{Deserialize, Serialize};

/// A compilation target (architecture + vendor + OS + ABI/libc).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TargetId {
    triple: String,
}

impl TargetId {
    /// Parse and validate a target triple.
    pub fn parse(triple: &str) -> Result<Self, TargetIdParseError> {
        triple.parse()
    }

    /// The triple string (e.g., "thumbv7em-none-eabihf").
    pub fn as_str(&self) -> &str {
        &self.triple
    }

    /// Get the architecture component.
    pub fn arch(&self) -> &str {
        self.component(0).unwrap_or_default()
    }

    /// Get the vendor component.
    ///
    /// Three-component triples such as `thumbv6m-none-eabi` have no vendor.
    pub fn vendor(&self) -> Option<&str> {
        if self.components() >= 4 {
            self.component(1)
        } else {
            None
        }
    }

    /// Get the OS component.
    pub fn os(&self) -> Option<&str> {
        if self.components() >= 4 {
            self.component(2)
        } else {
            self.component(1)
        }
    }

    /// Get the environment / ABI component (e.g., "gnu", "eabihf", "elf").
    pub fn env(&self) -> Option<&str> {
        match self.components() {
            n if n >= 4 => self.component(3),
            3 => self.component(2),
            _ => None,
        }
    }

    /// Whether the target has no operating system (bare metal).
    pub fn is_bare_metal(&self) -> bool {
        self.os() == Some("none")
    }

    fn components(&self) -> usize {
        self.triple.split('-').count()
    }

    fn component(&self, idx: usize) -> Option<&str> {
        self.triple.split('-').nth(idx)
    }
}

impl std::fmt::Display for TargetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.triple)
    }
}

impl std::str::FromStr for TargetId {
    type Err = TargetIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let valid = !s.is_empty()
            && s.split('-').count() >= 2
            && s.split('-').all(|part| !part.is_empty())
            && s
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

        if valid {
            Ok(TargetId {
                triple: s.to_string(),
            })
        } else {
            Err(TargetIdParseError(s.to_string()))
        }
    }
}

impl TryFrom<String> for TargetId {
    type Error = TargetIdParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TargetId> for String {
    fn from(target: TargetId) -> Self {
        target.triple
    }
}

/// Error returned when parsing an invalid target triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetIdParseError(pub String);

impl std::fmt::Display for TargetIdParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid target triple '{}', expected arch-vendor-os[-env] (e.g. thumbv7em-none-eabihf)",
            self.0
        )
    }
}

impl std::error::Error for TargetIdParseError {}

/// A registry entry naming one triple or a glob over triples.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TargetPattern {
    raw: String,
    glob: Option<glob::Pattern>,
}

impl TargetPattern {
    /// Parse a pattern. Strings without glob metacharacters must be valid triples.
    pub fn parse(raw: &str) -> Result<Self, TargetPatternParseError> {
        if raw.contains(['*', '?', '[']) {
            let glob = glob::Pattern::new(raw)
                .map_err(|e| TargetPatternParseError(format!("'{}': {}", raw, e.msg)))?;
            Ok(TargetPattern {
                raw: raw.to_string(),
                glob: Some(glob),
            })
        } else {
            TargetId::parse(raw).map_err(|e| TargetPatternParseError(e.to_string()))?;
            Ok(TargetPattern {
                raw: raw.to_string(),
                glob: None,
            })
        }
    }

    /// Check whether the target matches this pattern.
    pub fn matches(&self, target: &TargetId) -> bool {
        match &self.glob {
            Some(glob) => glob.matches(target.as_str()),
            None => self.raw == target.as_str(),
        }
    }

    /// Whether this pattern is a glob rather than a single triple.
    pub fn is_glob(&self) -> bool {
        self.glob.is_some()
    }

    /// The pattern as written in the registry.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The single triple this pattern names, if it is not a glob.
    pub fn as_exact(&self) -> Option<TargetId> {
        if self.is_glob() {
            None
        } else {
            Some(TargetId {
                triple: self.raw.clone(),
            })
        }
    }

    /// Whether every target matched by `other` is also matched by `self`.
    ///
    /// Exact triples are checked by matching; two globs only cover each other
    /// when they are written identically.
    pub fn covers(&self, other: &TargetPattern) -> bool {
        match other.as_exact() {
            Some(target) => self.matches(&target),
            None => self.raw == other.raw,
        }
    }
}

impl PartialEq for TargetPattern {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for TargetPattern {}

impl std::hash::Hash for TargetPattern {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl std::fmt::Display for TargetPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl TryFrom<String> for TargetPattern {
    type Error = TargetPatternParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        TargetPattern::parse(&value)
    }
}

impl From<TargetPattern> for String {
    fn from(pattern: TargetPattern) -> Self {
        pattern.raw
    }
}

/// Error returned when a registry target pattern is malformed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetPatternParseError(pub String);

impl std::fmt::Display for TargetPatternParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid target pattern {}", self.0)
    }
}

impl std::error::Error for TargetPatternParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_components() {
        let t = TargetId::parse("x86_64-unknown-linux-gnu").unwrap();
        assert_eq!(t.arch(), "x86_64");
        assert_eq!(t.vendor(), Some("unknown"));
        assert_eq!(t.os(), Some("linux"));
        assert_eq!(t.env(), Some("gnu"));
        assert!(!t.is_bare_metal());

        let t = TargetId::parse("thumbv7em-none-eabihf").unwrap();
        assert_eq!(t.arch(), "thumbv7em");
        assert_eq!(t.vendor(), None);
        assert_eq!(t.os(), Some("none"));
        assert_eq!(t.env(), Some("eabihf"));
        assert!(t.is_bare_metal());
    }

    #[test]
    fn test_target_parse_rejects_garbage() {
        assert!(TargetId::parse("").is_err());
        assert!(TargetId::parse("x86_64").is_err());
        assert!(TargetId::parse("x86_64--linux").is_err());
        assert!(TargetId::parse("x86 64-linux").is_err());
        assert!(TargetId::parse("thumbv8m.main-none-eabi").is_ok());
    }

    #[test]
    fn test_pattern_matching() {
        let glob = TargetPattern::parse("thumbv*-none-eabi*").unwrap();
        assert!(glob.is_glob());
        assert!(glob.matches(&TargetId::parse("thumbv6m-none-eabi").unwrap()));
        assert!(glob.matches(&TargetId::parse("thumbv7em-none-eabihf").unwrap()));
        assert!(!glob.matches(&TargetId::parse("x86_64-unknown-linux-gnu").unwrap()));

        let exact = TargetPattern::parse("x86_64-unknown-linux-gnu").unwrap();
        assert!(!exact.is_glob());
        assert!(exact.matches(&TargetId::parse("x86_64-unknown-linux-gnu").unwrap()));
        assert!(!exact.matches(&TargetId::parse("x86_64-unknown-linux-musl").unwrap()));
    }

    #[test]
    fn test_pattern_covers() {
        let glob = TargetPattern::parse("thumbv*-none-eabi*").unwrap();
        assert!(glob.covers(&TargetPattern::parse("thumbv6m-none-eabi").unwrap()));
        assert!(glob.covers(&TargetPattern::parse("thumbv*-none-eabi*").unwrap()));
        assert!(!glob.covers(&TargetPattern::parse("thumbv7*-none-eabi*").unwrap()));
    }

    #[test]
    fn test_pattern_rejects_bad_triple() {
        assert!(TargetPattern::parse("linux").is_err());
        assert!(TargetPattern::parse("[thumb").is_err());
    }

    #[test]
    fn test_serde_roundtrip_through_string() {
        let t: TargetId = serde_json::from_str("\"riscv32imac-unknown-none-elf\"").unwrap();
        assert_eq!(t.os(), Some("none"));
        assert!(serde_json::from_str::<TargetId>("\"nope\"").is_err());
    }
}
