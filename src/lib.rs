//! stdshim - target-aware standard-symbol shims for cross-compiled C/C++
//!
//! Some targets' C++ runtimes lack standard-library symbols that upstream
//! sources take for granted (`std::round(float)` on newlib, for example).
//! This crate keeps a versioned registry of those gaps, synthesizes a
//! forwarding definition for each one, and force-includes a header carrying
//! them into the compile for exactly the targets that need it.
//!
//! Most build scripts only need [`inject`]:
//!
//! ```no_run
//! let mut build = cc::Build::new();
//! build.cpp(true).file("vendor/lib.cpp");
//! stdshim::inject(&mut build).unwrap();
//! build.compile("vendored");
//! ```

pub mod builder;
pub mod core;
pub mod ops;
pub mod shim;
pub mod util;

pub use crate::core::{GapRegistry, SymbolGapRecord, TargetId, TargetPattern};
pub use builder::{CompilationBuilder, ToolchainPlatform};
pub use ops::{inject, prepare_target, prepare_targets, PrepareOptions, TargetReport, TargetState};
pub use shim::{InjectionPlan, Oracle, ShimDefinition, ShimError, Synthesizer};
