//! Platform primitives a shim may forward to.
//!
//! These are the C library functions declared by `<math.h>` in the global
//! namespace. Freestanding C libraries (newlib, picolibc, musl) ship all of
//! them even when their C++ `<cmath>` lacks some overloads, which is what
//! makes them safe forwarding targets.

use crate::core::symbol::{CType, MathOp, Signature};

/// A global-namespace C library function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Primitive {
    /// C name (e.g. "roundf")
    pub name: &'static str,
    /// Operation performed
    pub op: MathOp,
    /// Floating type of both the parameter and the result
    pub ty: CType,
    /// Header declaring it in C
    pub c_header: &'static str,
    /// Header declaring it in C++
    pub cxx_header: &'static str,
}

impl Primitive {
    pub fn signature(&self) -> Signature {
        Signature::unary(self.ty, self.ty)
    }
}

macro_rules! primitives {
    ($($name:literal => $op:ident, $ty:ident;)*) => {
        &[$(Primitive {
            name: $name,
            op: MathOp::$op,
            ty: CType::$ty,
            c_header: "math.h",
            cxx_header: "cmath",
        },)*]
    };
}

/// Every primitive a forwarding definition may call.
pub static PRIMITIVES: &[Primitive] = primitives! {
    "roundf" => Round, Float;
    "round" => Round, Double;
    "roundl" => Round, LongDouble;
    "truncf" => Trunc, Float;
    "trunc" => Trunc, Double;
    "truncl" => Trunc, LongDouble;
    "floorf" => Floor, Float;
    "floor" => Floor, Double;
    "floorl" => Floor, LongDouble;
    "ceilf" => Ceil, Float;
    "ceil" => Ceil, Double;
    "ceill" => Ceil, LongDouble;
    "rintf" => Rint, Float;
    "rint" => Rint, Double;
    "rintl" => Rint, LongDouble;
    "nearbyintf" => NearbyInt, Float;
    "nearbyint" => NearbyInt, Double;
    "nearbyintl" => NearbyInt, LongDouble;
    "fabsf" => Fabs, Float;
    "fabs" => Fabs, Double;
    "fabsl" => Fabs, LongDouble;
};

/// Look up a primitive by its C name.
pub fn find_primitive(name: &str) -> Option<&'static Primitive> {
    PRIMITIVES.iter().find(|p| p.name == name)
}

/// Names of all primitives, for diagnostics.
pub fn primitive_names() -> Vec<&'static str> {
    PRIMITIVES.iter().map(|p| p.name).collect()
}
