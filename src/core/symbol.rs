//! Symbol names, C types and signatures as the upstream source spells them.

use serde::{Deserialize, Serialize};

/// A scalar C/C++ type that can appear in a shimmed signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CType {
    Float,
    Double,
    LongDouble,
    Int,
    Long,
    LongLong,
}

impl CType {
    /// The type as written in C/C++ source.
    pub fn c_name(&self) -> &'static str {
        match self {
            CType::Float => "float",
            CType::Double => "double",
            CType::LongDouble => "long double",
            CType::Int => "int",
            CType::Long => "long",
            CType::LongLong => "long long",
        }
    }

    /// Whether this is a floating-point type.
    pub fn is_floating(&self) -> bool {
        self.float_rank().is_some()
    }

    /// Rank of a floating type: every value of a lower rank is exactly
    /// representable in a higher rank.
    pub fn float_rank(&self) -> Option<u8> {
        match self {
            CType::Float => Some(0),
            CType::Double => Some(1),
            CType::LongDouble => Some(2),
            _ => None,
        }
    }

    /// Whether every value of `self` converts exactly to `wider`.
    pub fn widens_to(&self, wider: CType) -> bool {
        match (self.float_rank(), wider.float_rank()) {
            (Some(a), Some(b)) => a <= b,
            _ => *self == wider,
        }
    }

    /// Token used when building C identifiers (guards, macro names).
    pub fn ident_fragment(&self) -> &'static str {
        match self {
            CType::Float => "float",
            CType::Double => "double",
            CType::LongDouble => "long_double",
            CType::Int => "int",
            CType::Long => "long",
            CType::LongLong => "long_long",
        }
    }
}

impl Serialize for CType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.c_name())
    }
}

impl std::fmt::Display for CType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.c_name())
    }
}

impl std::str::FromStr for CType {
    type Err = SignatureParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ");
        match normalized.as_str() {
            "float" => Ok(CType::Float),
            "double" => Ok(CType::Double),
            "long double" => Ok(CType::LongDouble),
            "int" => Ok(CType::Int),
            "long" | "long int" => Ok(CType::Long),
            "long long" | "long long int" => Ok(CType::LongLong),
            _ => Err(SignatureParseError(format!("unknown type '{}'", s.trim()))),
        }
    }
}

/// A function signature, e.g. `float(float)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Signature {
    pub ret: CType,
    pub params: Vec<CType>,
}

impl Signature {
    /// Create a signature with a single parameter.
    pub fn unary(ret: CType, param: CType) -> Self {
        Signature {
            ret,
            params: vec![param],
        }
    }

    /// The parameter type of a single-parameter signature.
    pub fn single_param(&self) -> Option<CType> {
        match self.params.as_slice() {
            [p] => Some(*p),
            _ => None,
        }
    }
}

impl std::fmt::Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let params: Vec<_> = self.params.iter().map(|p| p.c_name()).collect();
        write!(f, "{}({})", self.ret, params.join(", "))
    }
}

impl std::str::FromStr for Signature {
    type Err = SignatureParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let open = s
            .find('(')
            .ok_or_else(|| SignatureParseError(format!("missing '(' in '{}'", s)))?;
        let inner = s[open + 1..]
            .strip_suffix(')')
            .ok_or_else(|| SignatureParseError(format!("missing ')' in '{}'", s)))?;

        let ret: CType = s[..open].parse()?;
        let params = if inner.trim().is_empty() || inner.trim() == "void" {
            Vec::new()
        } else {
            inner
                .split(',')
                .map(str::parse)
                .collect::<Result<Vec<CType>, _>>()?
        };

        Ok(Signature { ret, params })
    }
}

impl TryFrom<String> for Signature {
    type Error = SignatureParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Signature> for String {
    fn from(sig: Signature) -> Self {
        sig.to_string()
    }
}

/// Error returned when parsing a signature or type name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureParseError(pub String);

impl std::fmt::Display for SignatureParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid signature: {}", self.0)
    }
}

impl std::error::Error for SignatureParseError {}

/// A name together with the namespace the upstream source looks it up in.
///
/// An empty namespace is the global namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QualifiedName {
    pub namespace: String,
    pub name: String,
}

impl QualifiedName {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        QualifiedName {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Whether the name lives in the global namespace.
    pub fn is_global(&self) -> bool {
        self.namespace.is_empty()
    }

    /// Namespace components, outermost first.
    pub fn namespace_path(&self) -> impl Iterator<Item = &str> {
        self.namespace.split("::").filter(|s| !s.is_empty())
    }

    /// Check that the name and every namespace component are C identifiers.
    pub fn is_valid(&self) -> bool {
        is_identifier(&self.name) && self.namespace_path().all(is_identifier)
    }
}

impl std::fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{}", self.namespace, self.name)
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// The operation a math symbol performs, independent of precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MathOp {
    /// Round to nearest, ties away from zero.
    Round,
    /// Round toward zero.
    Trunc,
    /// Round toward negative infinity.
    Floor,
    /// Round toward positive infinity.
    Ceil,
    /// Round in the current rounding mode, raising inexact.
    Rint,
    /// Round in the current rounding mode without raising inexact.
    NearbyInt,
    /// Absolute value.
    Fabs,
}

impl MathOp {
    pub const ALL: [MathOp; 7] = [
        MathOp::Round,
        MathOp::Trunc,
        MathOp::Floor,
        MathOp::Ceil,
        MathOp::Rint,
        MathOp::NearbyInt,
        MathOp::Fabs,
    ];

    /// The unsuffixed (double / C++ overload set) name.
    pub fn base_name(&self) -> &'static str {
        match self {
            MathOp::Round => "round",
            MathOp::Trunc => "trunc",
            MathOp::Floor => "floor",
            MathOp::Ceil => "ceil",
            MathOp::Rint => "rint",
            MathOp::NearbyInt => "nearbyint",
            MathOp::Fabs => "fabs",
        }
    }

    /// Look up an operation by its C++ overload name (`round`).
    pub fn from_base_name(name: &str) -> Option<MathOp> {
        MathOp::ALL.into_iter().find(|op| op.base_name() == name)
    }

    /// Resolve a C library name (`round`, `roundf`, `roundl`) to the
    /// operation and the floating type it operates on.
    pub fn from_c_name(name: &str) -> Option<(MathOp, CType)> {
        if let Some(op) = MathOp::from_base_name(name) {
            return Some((op, CType::Double));
        }
        if let Some(base) = name.strip_suffix('f') {
            return MathOp::from_base_name(base).map(|op| (op, CType::Float));
        }
        if let Some(base) = name.strip_suffix('l') {
            return MathOp::from_base_name(base).map(|op| (op, CType::LongDouble));
        }
        None
    }

    /// The C library name for this operation at the given precision.
    pub fn c_name(&self, ty: CType) -> Option<String> {
        match ty {
            CType::Float => Some(format!("{}f", self.base_name())),
            CType::Double => Some(self.base_name().to_string()),
            CType::LongDouble => Some(format!("{}l", self.base_name())),
            _ => None,
        }
    }
}

impl std::fmt::Display for MathOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.base_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_signature() {
        let sig: Signature = "float(float)".parse().unwrap();
        assert_eq!(sig, Signature::unary(CType::Float, CType::Float));

        let sig: Signature = " long double ( long  double ) ".parse().unwrap();
        assert_eq!(sig, Signature::unary(CType::LongDouble, CType::LongDouble));
        assert_eq!(sig.to_string(), "long double(long double)");

        let sig: Signature = "int(float)".parse().unwrap();
        assert_eq!(sig.ret, CType::Int);

        let sig: Signature = "double(void)".parse().unwrap();
        assert!(sig.params.is_empty());
        assert_eq!(sig.single_param(), None);
    }

    #[test]
    fn test_parse_signature_errors() {
        assert!("float".parse::<Signature>().is_err());
        assert!("float(float".parse::<Signature>().is_err());
        assert!("half(half)".parse::<Signature>().is_err());
    }

    #[test]
    fn test_widening() {
        assert!(CType::Float.widens_to(CType::Double));
        assert!(CType::Float.widens_to(CType::Float));
        assert!(CType::Double.widens_to(CType::LongDouble));
        assert!(!CType::Double.widens_to(CType::Float));
        assert!(!CType::Float.widens_to(CType::Int));
        assert!(CType::Int.widens_to(CType::Int));
    }

    #[test]
    fn test_math_op_names() {
        assert_eq!(MathOp::from_c_name("round"), Some((MathOp::Round, CType::Double)));
        assert_eq!(MathOp::from_c_name("roundf"), Some((MathOp::Round, CType::Float)));
        assert_eq!(MathOp::from_c_name("fabsl"), Some((MathOp::Fabs, CType::LongDouble)));
        assert_eq!(
            MathOp::from_c_name("nearbyintf"),
            Some((MathOp::NearbyInt, CType::Float))
        );
        assert_eq!(MathOp::from_c_name("lround"), None);
        assert_eq!(MathOp::Floor.c_name(CType::Float).as_deref(), Some("floorf"));
        assert_eq!(MathOp::Floor.c_name(CType::Int), None);
    }

    #[test]
    fn test_qualified_name() {
        let std_round = QualifiedName::new("std", "round");
        assert!(!std_round.is_global());
        assert!(std_round.is_valid());
        assert_eq!(std_round.to_string(), "std::round");

        let global = QualifiedName::new("", "roundf");
        assert!(global.is_global());
        assert_eq!(global.to_string(), "::roundf");

        assert!(QualifiedName::new("a::b", "x").is_valid());
        assert!(!QualifiedName::new("std", "1round").is_valid());
        assert!(!QualifiedName::new("st d", "round").is_valid());
    }
}
