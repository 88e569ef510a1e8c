//! Core data structures.
//!
//! This module contains the types the registry is made of:
//! - Target triples and target patterns
//! - Symbol names, C types and signatures
//! - The table of platform primitives shims forward to
//! - Gap records and the versioned registry that holds them

pub mod gap;
pub mod primitive;
pub mod registry;
pub mod symbol;
pub mod target;

pub use gap::{GapKey, RetiredGap, SymbolGapRecord};
pub use primitive::{find_primitive, Primitive};
pub use registry::{GapRegistry, RegistryError};
pub use symbol::{CType, MathOp, QualifiedName, Signature};
pub use target::{TargetId, TargetPattern};
