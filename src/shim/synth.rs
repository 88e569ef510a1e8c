//! Shim synthesizer - turns a gap record into a forwarding definition.
//!
//! A definition forwards to a global-namespace C primitive performing the
//! same operation at an equal or wider precision. Widening the argument of an
//! integral-rounding or absolute-value operation is exact, and so is
//! narrowing its result back, so `Widen` forwarding adds no rounding step.

use serde::Serialize;

use crate::core::gap::SymbolGapRecord;
use crate::core::primitive::{find_primitive, Primitive};
use crate::core::symbol::{CType, MathOp, QualifiedName, Signature};
use crate::shim::errors::ShimError;
use crate::shim::numeric::{verify_definition, Verdict};
use crate::util::hash::Fingerprint;

/// Hex digits of the identity digest carried by a definition guard.
const GUARD_DIGEST_LEN: usize = 12;

/// How the definition reaches the primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ForwardingStrategy {
    /// Primitive has the same type; call it directly
    Direct,
    /// Cast the argument up, call the primitive, cast the result back
    Widen { from: CType, to: CType },
}

/// A minimal forwarding definition for one gap.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ShimDefinition {
    /// Name as the upstream source looks it up
    pub name: QualifiedName,
    /// Signature the upstream source calls
    pub signature: Signature,
    /// Operation both sides perform
    pub op: MathOp,
    /// Primitive called by the definition
    pub source_symbol: &'static str,
    #[serde(skip)]
    pub primitive: &'static Primitive,
    pub strategy: ForwardingStrategy,
    /// Body expression, in terms of the parameter `x`
    pub forwarding_expression: String,
}

impl ShimDefinition {
    /// The symbol's floating type.
    pub fn ty(&self) -> CType {
        self.signature.ret
    }

    /// Macro guarding this definition against a second inclusion.
    ///
    /// Derived from the definition's identity alone, so two different
    /// headers carrying the same definition share the guard. The readable
    /// part folds `::` and case away; the digest suffix over the exact
    /// qualified name and signature keeps distinct definitions apart.
    pub fn guard_macro(&self) -> String {
        let mut identity = Fingerprint::new();
        identity
            .update_str(&self.name.to_string())
            .update_str(&self.signature.to_string());
        let digest = identity.finish();

        let mut parts = vec!["STDSHIM_DEF".to_string()];
        parts.extend(self.name.namespace_path().map(str::to_uppercase));
        parts.push(self.name.name.to_uppercase());
        parts.push(self.signature.ret.ident_fragment().to_uppercase());
        parts.extend(
            self.signature
                .params
                .iter()
                .map(|p| p.ident_fragment().to_uppercase()),
        );
        parts.push(digest[..GUARD_DIGEST_LEN].to_uppercase());
        parts.join("_")
    }

    /// The function definition itself (without namespace wrapping).
    pub fn definition_text(&self) -> String {
        let ty = self.ty().c_name();
        let storage = if self.name.is_global() {
            "static inline"
        } else {
            "inline"
        };
        format!(
            "{} {} {}({} x) {{ return {}; }}",
            storage, ty, self.name.name, ty, self.forwarding_expression
        )
    }

    /// Header the primitive is declared in, for the language this
    /// definition is emitted in.
    pub fn primitive_header(&self) -> &'static str {
        if self.name.is_global() {
            self.primitive.c_header
        } else {
            self.primitive.cxx_header
        }
    }
}

/// Builds shim definitions from gap records.
#[derive(Debug, Clone, Copy)]
pub struct Synthesizer {
    verify_numerics: bool,
}

impl Default for Synthesizer {
    fn default() -> Self {
        Synthesizer {
            verify_numerics: true,
        }
    }
}

impl Synthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable numeric verification of each definition.
    pub fn verify_numerics(mut self, verify: bool) -> Self {
        self.verify_numerics = verify;
        self
    }

    /// Derive the forwarding definition for a gap.
    ///
    /// Fails with `UnsupportedSymbol` if no primitive with matching
    /// semantics can carry the symbol.
    pub fn synthesize(&self, gap: &SymbolGapRecord) -> Result<ShimDefinition, ShimError> {
        let name = gap.qualified_name();
        let unsupported = |reason: String| ShimError::UnsupportedSymbol {
            symbol: gap.key().to_string(),
            target: None,
            reason,
        };

        let (op, ty) = resolve_operation(&name, &gap.signature).map_err(unsupported)?;

        let primitive = find_primitive(&gap.forward_to).ok_or_else(|| {
            unsupported(format!("no platform primitive named `{}`", gap.forward_to))
        })?;

        if primitive.op != op {
            return Err(unsupported(format!(
                "`{}` performs {}, but `{}` must perform {}",
                primitive.name, primitive.op, name, op
            )));
        }

        if !ty.widens_to(primitive.ty) {
            return Err(unsupported(format!(
                "`{}` takes {}, narrower than {}; forwarding would round the argument",
                primitive.name, primitive.ty, ty
            )));
        }

        if name.is_global() && primitive.name == name.name {
            return Err(unsupported(format!(
                "`{}` cannot forward to itself",
                primitive.name
            )));
        }

        let strategy = if primitive.ty == ty {
            ForwardingStrategy::Direct
        } else {
            ForwardingStrategy::Widen {
                from: ty,
                to: primitive.ty,
            }
        };

        let definition = ShimDefinition {
            forwarding_expression: forwarding_expression(&name, primitive, strategy),
            name,
            signature: gap.signature.clone(),
            op,
            source_symbol: primitive.name,
            primitive,
            strategy,
        };

        if self.verify_numerics {
            let report = verify_definition(&definition);
            match &report.verdict {
                Verdict::Verified { samples } => {
                    tracing::debug!("{} verified on {} samples", report.definition, samples);
                }
                Verdict::Unverified { reason } => {
                    tracing::warn!("{} not numerically verified: {}", report.definition, reason);
                }
                Verdict::Mismatch(mismatch) => {
                    return Err(unsupported(format!(
                        "forwarding through `{}` diverges: {}",
                        primitive.name, mismatch
                    )));
                }
            }
        }

        Ok(definition)
    }
}

/// Synthesize with default options (numeric verification on).
pub fn synthesize(gap: &SymbolGapRecord) -> Result<ShimDefinition, ShimError> {
    Synthesizer::default().synthesize(gap)
}

/// Work out which operation the upstream source expects and at what type.
fn resolve_operation(name: &QualifiedName, sig: &Signature) -> Result<(MathOp, CType), String> {
    let param = sig
        .single_param()
        .ok_or_else(|| format!("`{}` must take exactly one argument, not `{}`", name, sig))?;

    if !param.is_floating() {
        return Err(format!("parameter type {} is not floating-point", param));
    }

    let op = if name.is_global() {
        let (op, c_ty) = MathOp::from_c_name(&name.name)
            .ok_or_else(|| format!("`{}` is not a known math function", name.name))?;
        if c_ty != param {
            return Err(format!(
                "C function `{}` operates on {}, but the signature says {}",
                name.name, c_ty, param
            ));
        }
        op
    } else {
        MathOp::from_base_name(&name.name)
            .ok_or_else(|| format!("`{}` is not a known math overload set", name))?
    };

    if sig.ret != param {
        let why = if sig.ret.is_floating() {
            "changes precision"
        } else {
            "cannot represent NaN, infinities or out-of-range results"
        };
        return Err(format!(
            "`{}` returning {} for a {} argument is not a standard overload; {}",
            name, sig.ret, param, why
        ));
    }

    Ok((op, param))
}

fn forwarding_expression(
    name: &QualifiedName,
    primitive: &Primitive,
    strategy: ForwardingStrategy,
) -> String {
    // C++ definitions live inside a namespace that may itself declare the
    // overload set, so the primitive is named through the global scope.
    let callee = if name.is_global() {
        primitive.name.to_string()
    } else {
        format!("::{}", primitive.name)
    };

    match strategy {
        ForwardingStrategy::Direct => format!("{}(x)", callee),
        ForwardingStrategy::Widen { from, to } if name.is_global() => {
            format!("({}){}(({})x)", from, callee, to)
        }
        ForwardingStrategy::Widen { from, to } => format!(
            "static_cast<{}>({}(static_cast<{}>(x)))",
            from, callee, to
        ),
    }
}
