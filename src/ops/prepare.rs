//! Preparing targets for a build: evaluate, synthesize, write headers.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::Serialize;

use crate::core::target::TargetId;
use crate::ops::session::{Failure, TargetSession, TargetState};
use crate::shim::errors::ShimError;
use crate::shim::inject::InjectionPlan;
use crate::shim::oracle::Oracle;
use crate::shim::synth::{ShimDefinition, Synthesizer};
use crate::util::fs::write_string;

/// File name of the JSON report.
pub const REPORT_FILE_NAME: &str = "stdshim-report.json";

/// Options for preparing targets.
#[derive(Debug, Clone)]
pub struct PrepareOptions {
    /// Directory receiving `stdshim/<fingerprint>/stdshim_inject.h`
    pub out_dir: PathBuf,

    /// Verify forwarding definitions numerically
    pub verify_numerics: bool,
}

impl PrepareOptions {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        PrepareOptions {
            out_dir: out_dir.into(),
            verify_numerics: true,
        }
    }

    fn synthesizer(&self) -> Synthesizer {
        Synthesizer::new().verify_numerics(self.verify_numerics)
    }
}

/// Outcome of preparing one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetReport {
    pub target: TargetId,
    pub state: TargetState,
    pub registry_version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<PathBuf>,
    pub definitions: Vec<ShimDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,
}

impl TargetReport {
    pub fn is_failed(&self) -> bool {
        self.state == TargetState::Failed
    }
}

/// Run a session up to `NO_SHIM_NEEDED`/`SHIM_INJECTED` (or `FAILED`).
///
/// Errors are recorded in the session rather than returned.
pub fn prepare_session<'r>(
    oracle: Oracle<'r>,
    target: TargetId,
    opts: &PrepareOptions,
) -> TargetSession<'r> {
    let mut session = TargetSession::new(target, oracle, opts.synthesizer());
    if session.evaluate().is_ok() {
        let _ = session.inject(&opts.out_dir);
    }
    session
}

/// Prepare a single target and return what the build must prepend.
pub fn prepare_target(
    oracle: Oracle<'_>,
    target: &TargetId,
    opts: &PrepareOptions,
) -> Result<InjectionPlan, ShimError> {
    let mut session = TargetSession::new(target.clone(), oracle, opts.synthesizer());
    session.evaluate()?;
    Ok(session.inject(&opts.out_dir)?.clone())
}

/// Prepare several targets in parallel.
///
/// Targets share only the registry; a failing target does not affect the
/// others. Reports are returned in input order.
pub fn prepare_targets(
    oracle: Oracle<'_>,
    targets: &[TargetId],
    opts: &PrepareOptions,
) -> Vec<TargetReport> {
    targets
        .par_iter()
        .map(|target| prepare_session(oracle, target.clone(), opts).report())
        .collect()
}

/// Write reports as pretty JSON.
pub fn write_report(reports: &[TargetReport], path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(reports).context("failed to serialize report")?;
    write_string(path, &json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registry::GapRegistry;
    use crate::ops::session::FailureReason;
    use tempfile::TempDir;

    fn targets(triples: &[&str]) -> Vec<TargetId> {
        triples.iter().map(|t| TargetId::parse(t).unwrap()).collect()
    }

    #[test]
    fn test_prepare_target_builtin() {
        let tmp = TempDir::new().unwrap();
        let registry = GapRegistry::builtin().unwrap();
        let opts = PrepareOptions::new(tmp.path());

        let plan = prepare_target(
            Oracle::new(&registry),
            &TargetId::parse("thumbv6m-none-eabi").unwrap(),
            &opts,
        )
        .unwrap();
        assert!(plan.is_needed());
        assert_eq!(plan.definitions[0].name.to_string(), "std::round");

        let plan = prepare_target(
            Oracle::new(&registry),
            &TargetId::parse("x86_64-unknown-linux-gnu").unwrap(),
            &opts,
        )
        .unwrap();
        assert!(!plan.is_needed());
    }

    #[test]
    fn test_prepare_targets_parallel() {
        let tmp = TempDir::new().unwrap();
        let registry = GapRegistry::builtin().unwrap();
        let opts = PrepareOptions::new(tmp.path());
        let triples = [
            "thumbv6m-none-eabi",
            "thumbv7em-none-eabihf",
            "x86_64-unknown-linux-gnu",
            "wasm32-unknown-unknown",
            "riscv32imac-unknown-none-elf",
        ];

        let reports = prepare_targets(Oracle::new(&registry), &targets(&triples), &opts);

        let states: Vec<_> = reports.iter().map(|r| r.state).collect();
        assert_eq!(
            states,
            vec![
                TargetState::ShimInjected,
                TargetState::ShimInjected,
                TargetState::NoShimNeeded,
                TargetState::Failed,
                TargetState::ShimInjected,
            ]
        );
        assert_eq!(
            reports[3].failure.as_ref().unwrap().reason,
            FailureReason::UnknownTarget
        );

        // Same shim set, same inclusion unit.
        assert_eq!(reports[0].header, reports[1].header);
        assert_eq!(reports[0].header, reports[4].header);
    }

    #[test]
    fn test_write_report_json() {
        let tmp = TempDir::new().unwrap();
        let registry = GapRegistry::builtin().unwrap();
        let opts = PrepareOptions::new(tmp.path());
        let reports = prepare_targets(
            Oracle::new(&registry),
            &targets(&["thumbv6m-none-eabi", "wasm32-unknown-unknown"]),
            &opts,
        );

        let path = tmp.path().join(REPORT_FILE_NAME);
        write_report(&reports, &path).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();

        assert_eq!(json[0]["target"], "thumbv6m-none-eabi");
        assert_eq!(json[0]["state"], "SHIM_INJECTED");
        assert_eq!(json[0]["definitions"][0]["source_symbol"], "round");
        assert_eq!(json[0]["definitions"][0]["strategy"]["kind"], "widen");
        assert!(json[0].get("failure").is_none());
        assert_eq!(json[1]["state"], "FAILED");
        assert_eq!(json[1]["failure"]["reason"], "UnknownTarget");
    }
}
