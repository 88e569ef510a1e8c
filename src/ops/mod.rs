//! High-level operations.
//!
//! This module drives targets through the shim lifecycle and wires the
//! result into builds.

pub mod build_script;
pub mod prepare;
pub mod probe;
pub mod session;

pub use build_script::{inject, inject_with, BuildEnv};
pub use prepare::{
    prepare_session, prepare_target, prepare_targets, write_report, PrepareOptions, TargetReport,
    REPORT_FILE_NAME,
};
pub use probe::{Probe, ProbeOutcome, ProbeVerdict};
pub use session::{Failure, FailureReason, TargetSession, TargetState};
