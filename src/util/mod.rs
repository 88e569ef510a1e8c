//! Shared utilities

pub mod config;
pub mod diagnostic;
pub mod fs;
pub mod hash;
pub mod logging;
pub mod process;

pub use config::Config;
pub use diagnostic::Diagnostic;
