//! Target capability oracle - which registered gaps apply to a target.

use std::collections::HashSet;

use crate::core::gap::SymbolGapRecord;
use crate::core::registry::GapRegistry;
use crate::core::target::TargetId;
use crate::shim::errors::ShimError;

/// Pure lookup of gap records for a target.
#[derive(Debug, Clone, Copy)]
pub struct Oracle<'r> {
    registry: &'r GapRegistry,
    source_name: &'r str,
}

impl<'r> Oracle<'r> {
    /// Create an oracle over a registry.
    pub fn new(registry: &'r GapRegistry) -> Self {
        Oracle {
            registry,
            source_name: "gap registry",
        }
    }

    /// Name the registry file in `UnknownTarget` diagnostics.
    pub fn with_source_name(mut self, name: &'r str) -> Self {
        self.source_name = name;
        self
    }

    /// The registry this oracle answers from.
    pub fn registry(&self) -> &'r GapRegistry {
        self.registry
    }

    /// Gap records whose target set contains `target`, in registry order.
    ///
    /// Fails with `UnknownTarget` rather than returning an empty set for a
    /// target the registry does not describe.
    pub fn gaps_for(&self, target: &TargetId) -> Result<GapSet<'r>, ShimError> {
        if !self.registry.is_known(target) {
            return Err(ShimError::UnknownTarget {
                target: target.to_string(),
                registry: self.source_name.to_string(),
            });
        }

        let gaps: Vec<&'r SymbolGapRecord> = self
            .registry
            .gaps
            .iter()
            .filter(|gap| gap.affects(target))
            .collect();

        // Two records for one definition would inject it twice.
        let mut seen = HashSet::new();
        for gap in &gaps {
            if !seen.insert(gap.key()) {
                return Err(ShimError::DuplicateDefinition {
                    symbol: gap.key().to_string(),
                    target: Some(target.to_string()),
                    detail: "more than one [[gaps]] entry applies to this target".to_string(),
                });
            }
        }

        tracing::debug!("Target {} has {} gap(s)", target, gaps.len());

        Ok(GapSet {
            target: target.clone(),
            gaps,
        })
    }
}

/// The gaps that apply to one target.
#[derive(Debug, Clone)]
pub struct GapSet<'r> {
    target: TargetId,
    gaps: Vec<&'r SymbolGapRecord>,
}

impl<'r> GapSet<'r> {
    pub fn target(&self) -> &TargetId {
        &self.target
    }

    pub fn is_empty(&self) -> bool {
        self.gaps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.gaps.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'r SymbolGapRecord> + '_ {
        self.gaps.iter().copied()
    }
}
