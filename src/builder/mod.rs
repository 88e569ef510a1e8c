//! Compiler-facing plumbing.

pub mod toolchain;

pub use toolchain::{CommandSpec, CompilationBuilder, ToolchainPlatform};
