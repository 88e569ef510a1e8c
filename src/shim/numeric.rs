//! Numeric verification of forwarding definitions.
//!
//! The forwarding expression is modelled with the `libm` reference
//! implementations of the C primitives and compared bit-for-bit with:
//!
//! 1. the operation the missing symbol is specified to perform, at the
//!    symbol's own precision, and
//! 2. the wide primitive applied to the widened input.
//!
//! The sample domain covers signed zeros, ties, the largest tie below the
//! point where every value is integral, extreme finite values, subnormals,
//! infinities and NaN. `long double` has no portable model and is reported
//! as unverified.

use std::fmt;

use serde::Serialize;

use crate::core::symbol::{CType, MathOp};
use crate::shim::synth::ShimDefinition;

/// Outcome of verifying one definition.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "verdict", rename_all = "lowercase")]
pub enum Verdict {
    Verified { samples: usize },
    Unverified { reason: String },
    Mismatch(Mismatch),
}

/// First sample on which the forwarding expression diverged.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mismatch {
    pub input: String,
    pub expected: String,
    pub actual: String,
    /// Which reference the result was compared against
    pub reference: String,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "for input {} expected {} ({}) but got {}",
            self.input, self.expected, self.reference, self.actual
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationReport {
    /// The definition, e.g. "float std::round(float) -> round"
    pub definition: String,
    #[serde(flatten)]
    pub verdict: Verdict,
}

impl VerificationReport {
    pub fn is_mismatch(&self) -> bool {
        matches!(self.verdict, Verdict::Mismatch(_))
    }
}

/// Verify a synthesized definition against its reference semantics.
pub fn verify_definition(def: &ShimDefinition) -> VerificationReport {
    let definition = format!(
        "{} {}({}) -> {}",
        def.signature.ret,
        def.name,
        def.ty(),
        def.source_symbol
    );

    let symbol_op = def.op;
    let prim_op = def.primitive.op;

    let verdict = match (def.ty(), def.primitive.ty) {
        (CType::Float, CType::Float) => compare_f32(
            |x| reference_f32(prim_op, x),
            |x| reference_f32(symbol_op, x),
            "single-precision reference",
        )
        .map_or_else(Verdict::Mismatch, |samples| Verdict::Verified { samples }),

        (CType::Float, CType::Double) => {
            let model = |x: f32| reference_f64(prim_op, f64::from(x)) as f32;
            compare_f32(model, |x| reference_f32(symbol_op, x), "single-precision reference")
                .and_then(|_| {
                    compare_f32_widened(
                        model,
                        |x| reference_f64(prim_op, x),
                        "double-precision primitive on the widened input",
                    )
                })
                .map_or_else(Verdict::Mismatch, |samples| Verdict::Verified { samples })
        }

        (CType::Double, CType::Double) => compare_f64(
            |x| reference_f64(prim_op, x),
            |x| reference_f64(symbol_op, x),
            "double-precision reference",
        )
        .map_or_else(Verdict::Mismatch, |samples| Verdict::Verified { samples }),

        (from, to) => Verdict::Unverified {
            reason: format!("no reference model for {} -> {}", from, to),
        },
    };

    VerificationReport {
        definition,
        verdict,
    }
}

/// Reference semantics of an operation in single precision.
pub fn reference_f32(op: MathOp, x: f32) -> f32 {
    match op {
        MathOp::Round => libm::roundf(x),
        MathOp::Trunc => libm::truncf(x),
        MathOp::Floor => libm::floorf(x),
        MathOp::Ceil => libm::ceilf(x),
        // Default rounding mode; nearbyint only differs in the inexact flag.
        MathOp::Rint | MathOp::NearbyInt => libm::rintf(x),
        MathOp::Fabs => libm::fabsf(x),
    }
}

/// Reference semantics of an operation in double precision.
pub fn reference_f64(op: MathOp, x: f64) -> f64 {
    match op {
        MathOp::Round => libm::round(x),
        MathOp::Trunc => libm::trunc(x),
        MathOp::Floor => libm::floor(x),
        MathOp::Ceil => libm::ceil(x),
        MathOp::Rint | MathOp::NearbyInt => libm::rint(x),
        MathOp::Fabs => libm::fabs(x),
    }
}

/// Single-precision sample domain.
pub fn f32_samples() -> Vec<f32> {
    let mut samples = vec![
        0.0,
        -0.0,
        0.5,
        -0.5,
        1.5,
        -1.5,
        2.5,
        -2.5,
        0.49999997,
        -0.49999997,
        1.0,
        -1.0,
        0.99999994,
        // Largest tie: above 2^23 every float is integral.
        8388607.5,
        -8388607.5,
        8388608.0,
        1.0e10,
        -1.0e10,
        f32::MAX,
        f32::MIN,
        f32::MIN_POSITIVE,
        -f32::MIN_POSITIVE,
        f32::from_bits(1),
        -f32::from_bits(1),
        f32::INFINITY,
        f32::NEG_INFINITY,
        f32::NAN,
        -f32::NAN,
    ];
    samples.extend((-8..=8).map(|i| i as f32 * 0.25 + 100.0));
    samples
}

/// Double-precision sample domain.
pub fn f64_samples() -> Vec<f64> {
    let mut samples = vec![
        0.0,
        -0.0,
        0.5,
        -0.5,
        1.5,
        -1.5,
        2.5,
        -2.5,
        0.49999999999999994,
        -0.49999999999999994,
        1.0,
        -1.0,
        // Largest tie: above 2^52 every double is integral.
        4503599627370495.5,
        -4503599627370495.5,
        4503599627370496.0,
        1.0e300,
        f64::MAX,
        f64::MIN,
        f64::MIN_POSITIVE,
        -f64::MIN_POSITIVE,
        f64::from_bits(1),
        -f64::from_bits(1),
        f64::INFINITY,
        f64::NEG_INFINITY,
        f64::NAN,
        -f64::NAN,
    ];
    samples.extend((-8..=8).map(|i| f64::from(i) * 0.25 + 100.0));
    samples
}

fn same_f32(a: f32, b: f32) -> bool {
    (a.is_nan() && b.is_nan()) || a.to_bits() == b.to_bits()
}

fn same_f64(a: f64, b: f64) -> bool {
    (a.is_nan() && b.is_nan()) || a.to_bits() == b.to_bits()
}

/// Compare two single-precision functions over the sample domain.
pub fn compare_f32(
    actual: impl Fn(f32) -> f32,
    expected: impl Fn(f32) -> f32,
    reference: &str,
) -> Result<usize, Mismatch> {
    let samples = f32_samples();
    for &x in &samples {
        let (got, want) = (actual(x), expected(x));
        if !same_f32(got, want) {
            return Err(Mismatch {
                input: format!("{:e}", x),
                expected: format!("{:e}", want),
                actual: format!("{:e}", got),
                reference: reference.to_string(),
            });
        }
    }
    Ok(samples.len())
}

/// Compare a single-precision function, widened, against a double one.
fn compare_f32_widened(
    actual: impl Fn(f32) -> f32,
    expected: impl Fn(f64) -> f64,
    reference: &str,
) -> Result<usize, Mismatch> {
    let samples = f32_samples();
    for &x in &samples {
        let got = f64::from(actual(x));
        let want = expected(f64::from(x));
        if !same_f64(got, want) {
            return Err(Mismatch {
                input: format!("{:e}", x),
                expected: format!("{:e}", want),
                actual: format!("{:e}", got),
                reference: reference.to_string(),
            });
        }
    }
    Ok(samples.len())
}

/// Compare two double-precision functions over the sample domain.
pub fn compare_f64(
    actual: impl Fn(f64) -> f64,
    expected: impl Fn(f64) -> f64,
    reference: &str,
) -> Result<usize, Mismatch> {
    let samples = f64_samples();
    for &x in &samples {
        let (got, want) = (actual(x), expected(x));
        if !same_f64(got, want) {
            return Err(Mismatch {
                input: format!("{:e}", x),
                expected: format!("{:e}", want),
                actual: format!("{:e}", got),
                reference: reference.to_string(),
            });
        }
    }
    Ok(samples.len())
}
