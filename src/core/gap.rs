//! Gap records - one missing standard-library symbol and where it is missing.

use serde::{Deserialize, Serialize};

use crate::core::symbol::{QualifiedName, Signature};
use crate::core::target::{TargetId, TargetPattern};

/// A symbol the upstream source needs but some targets' runtimes lack.
///
/// Records are discovered from failed compiles and committed to the
/// registry by hand. They are never removed silently; see [`RetiredGap`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SymbolGapRecord {
    /// Unqualified symbol name (e.g. "round")
    pub symbol: String,

    /// Namespace the upstream source references ("std"); empty for global
    #[serde(default)]
    pub namespace: String,

    /// Signature the upstream source calls
    pub signature: Signature,

    /// Global-namespace platform primitive to forward to (e.g. "round")
    pub forward_to: String,

    /// Targets whose runtime lacks the symbol
    pub targets: Vec<TargetPattern>,

    /// Free-form maintainer note
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl SymbolGapRecord {
    /// The name as the upstream source looks it up.
    pub fn qualified_name(&self) -> QualifiedName {
        QualifiedName::new(self.namespace.clone(), self.symbol.clone())
    }

    /// Key identifying the definition this gap produces.
    pub fn key(&self) -> GapKey {
        GapKey {
            name: self.qualified_name(),
            signature: self.signature.clone(),
        }
    }

    /// Whether this gap applies to the target.
    pub fn affects(&self, target: &TargetId) -> bool {
        self.targets.iter().any(|p| p.matches(target))
    }
}

/// Identity of a shimmed definition: qualified name plus signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GapKey {
    pub name: QualifiedName,
    pub signature: Signature,
}

impl std::fmt::Display for GapKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let params: Vec<_> = self.signature.params.iter().map(|p| p.c_name()).collect();
        write!(
            f,
            "{} {}({})",
            self.signature.ret,
            self.name,
            params.join(", ")
        )
    }
}

/// A `(target, symbol)` pair deliberately dropped from the registry after the
/// symbol was confirmed present on that target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetiredGap {
    pub symbol: String,

    #[serde(default)]
    pub namespace: String,

    pub signature: Signature,

    /// Target pattern that no longer needs the shim
    pub target: TargetPattern,

    /// Why the gap is gone (toolchain release, libc version, ...)
    pub reason: String,
}

impl RetiredGap {
    pub fn key(&self) -> GapKey {
        GapKey {
            name: QualifiedName::new(self.namespace.clone(), self.symbol.clone()),
            signature: self.signature.clone(),
        }
    }
}
