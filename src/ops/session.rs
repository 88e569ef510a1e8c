//! Per-target shim lifecycle.
//!
//! ```text
//! NOT_EVALUATED --evaluate--> GAPS_KNOWN --inject--> NO_SHIM_NEEDED --+
//!                                             \                       +--finish_compile--> COMPILED
//!                                              +----> SHIM_INJECTED --+
//! ```
//!
//! Any failing step moves the session to the terminal `FAILED` state. An
//! event that is not allowed in the current state is rejected with
//! `InvalidTransition` and leaves the state unchanged.

use std::fmt;
use std::path::Path;

use serde::Serialize;

use crate::core::gap::SymbolGapRecord;
use crate::core::target::TargetId;
use crate::ops::prepare::TargetReport;
use crate::shim::errors::ShimError;
use crate::shim::inject::{plan_injection, InjectionPlan, ShimSet};
use crate::shim::oracle::Oracle;
use crate::shim::synth::Synthesizer;

/// Where a target is in the shim lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TargetState {
    NotEvaluated,
    GapsKnown,
    NoShimNeeded,
    ShimInjected,
    Compiled,
    Failed,
}

impl TargetState {
    /// Whether no further event is accepted.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TargetState::Compiled | TargetState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TargetState::NotEvaluated => "NOT_EVALUATED",
            TargetState::GapsKnown => "GAPS_KNOWN",
            TargetState::NoShimNeeded => "NO_SHIM_NEEDED",
            TargetState::ShimInjected => "SHIM_INJECTED",
            TargetState::Compiled => "COMPILED",
            TargetState::Failed => "FAILED",
        }
    }
}

impl fmt::Display for TargetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a target ended in `FAILED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FailureReason {
    UnknownTarget,
    UnsupportedSymbol,
    DuplicateDefinition,
    InvalidRegistry,
    Io,
    CompileFailed,
    /// An event arrived in a state that does not accept it
    InvalidTransition,
}

impl FailureReason {
    /// Classify an error.
    pub fn of(err: &ShimError) -> Self {
        match err {
            ShimError::UnknownTarget { .. } | ShimError::InvalidTarget(_) => {
                FailureReason::UnknownTarget
            }
            ShimError::UnsupportedSymbol { .. } => FailureReason::UnsupportedSymbol,
            ShimError::DuplicateDefinition { .. } => FailureReason::DuplicateDefinition,
            ShimError::Registry(_) | ShimError::Evolution(_) => FailureReason::InvalidRegistry,
            ShimError::InvalidTransition { .. } => FailureReason::InvalidTransition,
            ShimError::Io { .. } => FailureReason::Io,
        }
    }
}

/// Terminal failure of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub reason: FailureReason,
    pub message: String,
    /// Rendered diagnostic with suggested registry edits
    pub diagnostic: String,
}

/// Drives one target through the shim lifecycle.
#[derive(Debug)]
pub struct TargetSession<'r> {
    target: TargetId,
    oracle: Oracle<'r>,
    synthesizer: Synthesizer,
    state: TargetState,
    gaps: Vec<&'r SymbolGapRecord>,
    plan: Option<InjectionPlan>,
    failure: Option<Failure>,
}

impl<'r> TargetSession<'r> {
    pub fn new(target: TargetId, oracle: Oracle<'r>, synthesizer: Synthesizer) -> Self {
        TargetSession {
            target,
            oracle,
            synthesizer,
            state: TargetState::NotEvaluated,
            gaps: Vec::new(),
            plan: None,
            failure: None,
        }
    }

    pub fn target(&self) -> &TargetId {
        &self.target
    }

    pub fn state(&self) -> TargetState {
        self.state
    }

    /// Gap records found by `evaluate`.
    pub fn gaps(&self) -> &[&'r SymbolGapRecord] {
        &self.gaps
    }

    /// The injection plan, once `inject` succeeded.
    pub fn plan(&self) -> Option<&InjectionPlan> {
        self.plan.as_ref()
    }

    pub fn failure(&self) -> Option<&Failure> {
        self.failure.as_ref()
    }

    /// Ask the oracle which gaps apply. `NOT_EVALUATED -> GAPS_KNOWN`.
    pub fn evaluate(&mut self) -> Result<usize, ShimError> {
        self.expect_state(&[TargetState::NotEvaluated], "evaluate")?;

        match self.oracle.gaps_for(&self.target) {
            Ok(gaps) => {
                self.gaps = gaps.iter().collect();
                self.state = TargetState::GapsKnown;
                Ok(self.gaps.len())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Synthesize definitions and write the header.
    /// `GAPS_KNOWN -> NO_SHIM_NEEDED | SHIM_INJECTED`.
    pub fn inject(&mut self, out_dir: &Path) -> Result<&InjectionPlan, ShimError> {
        self.expect_state(&[TargetState::GapsKnown], "inject")?;

        let plan = match self.build_plan(out_dir) {
            Ok(plan) => plan,
            Err(e) => return Err(self.fail(e)),
        };

        self.state = if plan.is_needed() {
            TargetState::ShimInjected
        } else {
            tracing::debug!("No shim needed for {}", self.target);
            TargetState::NoShimNeeded
        };

        Ok(&*self.plan.insert(plan))
    }

    fn build_plan(&self, out_dir: &Path) -> Result<InjectionPlan, ShimError> {
        let target = self.target.as_str();
        let definitions = self
            .gaps
            .iter()
            .map(|gap| self.synthesizer.synthesize(gap))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| e.for_target(target))?;

        let set = ShimSet::new(self.target.clone(), definitions)?;
        plan_injection(set, out_dir)
    }

    /// Record the outcome of the real build.
    /// `NO_SHIM_NEEDED | SHIM_INJECTED -> COMPILED | FAILED`.
    pub fn finish_compile(&mut self, success: bool, detail: &str) -> Result<(), ShimError> {
        self.expect_state(
            &[TargetState::NoShimNeeded, TargetState::ShimInjected],
            "finish compiling",
        )?;

        if success {
            self.state = TargetState::Compiled;
        } else {
            tracing::debug!("Build for {} failed: {}", self.target, detail);
            self.state = TargetState::Failed;
            self.failure = Some(Failure {
                reason: FailureReason::CompileFailed,
                message: format!("build for target `{}` failed", self.target),
                diagnostic: detail.to_string(),
            });
        }
        Ok(())
    }

    /// Snapshot for reporting.
    pub fn report(&self) -> TargetReport {
        TargetReport {
            target: self.target.clone(),
            state: self.state,
            registry_version: self.oracle.registry().version,
            header: self.plan.as_ref().and_then(|p| p.header.clone()),
            definitions: self
                .plan
                .as_ref()
                .map(|p| p.definitions.clone())
                .unwrap_or_default(),
            failure: self.failure.clone(),
        }
    }

    fn expect_state(&self, allowed: &[TargetState], event: &str) -> Result<(), ShimError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(ShimError::InvalidTransition {
                state: self.state.to_string(),
                event: event.to_string(),
            })
        }
    }

    fn fail(&mut self, err: ShimError) -> ShimError {
        tracing::debug!("Target {} failed: {}", self.target, err);
        self.state = TargetState::Failed;
        self.failure = Some(Failure {
            reason: FailureReason::of(&err),
            message: err.to_string(),
            diagnostic: err.to_diagnostic().format(false),
        });
        err
    }
}
