//! The gap registry - the versioned rule table of known symbol gaps.
//!
//! The registry is a TOML file maintained by hand and reviewed like code:
//!
//! ```toml
//! version = 1
//! known_targets = ["x86_64-unknown-linux-gnu", "thumbv*-none-eabi*"]
//!
//! [[gaps]]
//! symbol = "round"
//! namespace = "std"
//! signature = "float(float)"
//! forward_to = "round"
//! targets = ["thumbv*-none-eabi*"]
//! ```
//!
//! New gaps are additions to data; removing one goes through `[[retired]]`
//! and is checked by [`GapRegistry::check_evolution`].

use std::path::Path;

use miette::{Diagnostic as MietteDiagnostic, NamedSource, SourceSpan};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::gap::{RetiredGap, SymbolGapRecord};
use crate::core::primitive::{find_primitive, primitive_names};
use crate::core::target::{TargetId, TargetPattern};

/// The registry shipped with this crate.
pub const BUILTIN_REGISTRY: &str = include_str!("../../registry/gaps.toml");

/// Display name used in diagnostics for the built-in registry.
pub const BUILTIN_REGISTRY_NAME: &str = "<builtin>/registry/gaps.toml";

/// Versioned table of symbol gaps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GapRegistry {
    /// Bumped on every change
    pub version: u32,

    /// Targets the oracle recognizes (with or without gaps)
    pub known_targets: Vec<TargetPattern>,

    /// Recorded gaps, append-only
    #[serde(default)]
    pub gaps: Vec<SymbolGapRecord>,

    /// Gaps confirmed fixed upstream
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retired: Vec<RetiredGap>,
}

/// A malformed or inconsistent registry.
#[derive(Debug, Error, MietteDiagnostic)]
#[error("invalid gap registry: {message}")]
#[diagnostic(code(stdshim::registry::invalid))]
pub struct RegistryError {
    pub message: String,
    #[source_code]
    pub src: Option<NamedSource<String>>,
    #[label("defined here")]
    pub span: Option<SourceSpan>,
    #[help]
    pub help: Option<String>,
}

impl RegistryError {
    fn new(message: impl Into<String>) -> Self {
        RegistryError {
            message: message.into(),
            src: None,
            span: None,
            help: None,
        }
    }

    fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Attach the registry source, pointing at the first occurrence of `needle`.
    fn with_source(mut self, name: &str, contents: &str, needle: Option<&str>) -> Self {
        if self.span.is_none() {
            self.span = needle
                .and_then(|n| contents.find(n).map(|start| (start, n.len())))
                .map(SourceSpan::from);
        }
        self.src = Some(NamedSource::new(name, contents.to_string()));
        self
    }
}

/// Registry changes rejected because they would drop or rewrite history.
#[derive(Debug, Clone, Error)]
#[error("registry change rejected ({} violation(s))", violations.len())]
pub struct EvolutionError {
    pub violations: Vec<String>,
}

struct Violation {
    error: RegistryError,
    needle: Option<String>,
}

impl GapRegistry {
    /// Parse the registry shipped with the crate.
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::parse(BUILTIN_REGISTRY_NAME, BUILTIN_REGISTRY)
    }

    /// Load and validate a registry file.
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            RegistryError::new(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&path.display().to_string(), &contents)
    }

    /// Parse and validate registry contents. `name` is used in diagnostics.
    pub fn parse(name: &str, contents: &str) -> Result<Self, RegistryError> {
        let registry: GapRegistry = toml::from_str(contents).map_err(|e| {
            let mut err = RegistryError::new(e.message().to_string());
            err.span = e.span().map(SourceSpan::from);
            err.with_source(name, contents, None)
        })?;

        if let Some(violation) = registry.validate().into_iter().next() {
            return Err(violation
                .error
                .with_source(name, contents, violation.needle.as_deref()));
        }

        tracing::debug!(
            "Loaded gap registry {} (version {}, {} gap(s), {} known target pattern(s))",
            name,
            registry.version,
            registry.gaps.len(),
            registry.known_targets.len()
        );

        Ok(registry)
    }

    /// Serialize back to TOML.
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Whether the oracle recognizes the target.
    pub fn is_known(&self, target: &TargetId) -> bool {
        self.known_targets.iter().any(|p| p.matches(target))
    }

    fn validate(&self) -> Vec<Violation> {
        let mut violations = Vec::new();

        if self.version == 0 {
            violations.push(Violation {
                error: RegistryError::new("registry version must be at least 1"),
                needle: Some("version".to_string()),
            });
        }

        for gap in &self.gaps {
            let key = gap.key();

            if !gap.qualified_name().is_valid() {
                violations.push(Violation {
                    error: RegistryError::new(format!("`{}` is not a valid C++ name", key.name)),
                    needle: Some(format!("\"{}\"", gap.symbol)),
                });
            }

            if gap.targets.is_empty() {
                violations.push(Violation {
                    error: RegistryError::new(format!("gap `{}` lists no targets", key)),
                    needle: Some(format!("\"{}\"", gap.symbol)),
                });
            }

            if find_primitive(&gap.forward_to).is_none() {
                violations.push(Violation {
                    error: RegistryError::new(format!(
                        "gap `{}` forwards to unknown primitive `{}`",
                        key, gap.forward_to
                    ))
                    .with_help(format!("known primitives: {}", primitive_names().join(", "))),
                    needle: Some(format!("\"{}\"", gap.forward_to)),
                });
            }

            for pattern in &gap.targets {
                if !self.known_targets.iter().any(|k| k.covers(pattern)) {
                    violations.push(Violation {
                        error: RegistryError::new(format!(
                            "gap `{}` names target `{}` which is not in known_targets",
                            key, pattern
                        ))
                        .with_help("add the target (or an identical pattern) to known_targets"),
                        needle: Some(format!("\"{}\"", pattern)),
                    });
                }
            }
        }

        for (i, a) in self.gaps.iter().enumerate() {
            for b in &self.gaps[i + 1..] {
                if a.key() != b.key() {
                    continue;
                }
                if let Some(shared) = self.overlapping_target(a, b) {
                    violations.push(Violation {
                        error: RegistryError::new(format!(
                            "`{}` is recorded twice for target `{}`",
                            a.key(),
                            shared
                        ))
                        .with_help("merge the target lists into a single [[gaps]] entry"),
                        needle: Some(format!("\"{}\"", shared)),
                    });
                }
            }
        }

        violations
    }

    /// A target pattern both gaps definitely apply to.
    fn overlapping_target<'a>(
        &self,
        a: &'a SymbolGapRecord,
        b: &'a SymbolGapRecord,
    ) -> Option<&'a TargetPattern> {
        for pa in &a.targets {
            for pb in &b.targets {
                if pa.covers(pb) {
                    return Some(pb);
                }
                if pb.covers(pa) {
                    return Some(pa);
                }
            }
        }

        // Two different globs: check every exact known target against both.
        self.known_targets
            .iter()
            .filter_map(TargetPattern::as_exact)
            .find(|t| a.affects(t) && b.affects(t))
            .and_then(|t| a.targets.iter().find(|p| p.matches(&t)))
    }

    /// Check that `self` is an acceptable successor of `previous`.
    ///
    /// Every `(target, symbol)` in `previous` must still be recorded or be
    /// listed in `retired`; known targets may not disappear; any content
    /// change must bump the version.
    pub fn check_evolution(&self, previous: &GapRegistry) -> Result<(), EvolutionError> {
        let mut violations = Vec::new();

        if self.version < previous.version {
            violations.push(format!(
                "version went backwards ({} -> {})",
                previous.version, self.version
            ));
        } else if self.version == previous.version && self != previous {
            violations.push(format!(
                "content changed but version is still {}",
                self.version
            ));
        }

        for old in &previous.known_targets {
            if !self.known_targets.iter().any(|k| k.covers(old)) {
                violations.push(format!("known target `{}` was removed", old));
            }
        }

        for old in &previous.gaps {
            let key = old.key();
            for pattern in &old.targets {
                let still_recorded = self
                    .gaps
                    .iter()
                    .filter(|g| g.key() == key)
                    .any(|g| g.targets.iter().any(|p| p.covers(pattern)));
                let retired = self
                    .retired
                    .iter()
                    .any(|r| r.key() == key && r.target.covers(pattern));

                if !still_recorded && !retired {
                    violations.push(format!(
                        "gap `{}` for `{}` was removed without a [[retired]] entry",
                        key, pattern
                    ));
                }
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(EvolutionError { violations })
        }
    }
}
