//! Compile probes - checking a gap against a real compiler.
//!
//! A probe is a one-line translation unit that calls the shimmed symbol. It
//! is type-checked once without the shim header and once with it
//! force-included:
//!
//! | without shim | with shim | verdict |
//! |--------------|-----------|---------|
//! | missing symbol | ok | `ConfirmedGap` |
//! | missing symbol | error | `ShimIneffective` |
//! | ok | any | `Redundant` (the target already has the symbol) |
//! | other error | - | `Inconclusive` |
//!
//! Probes are diagnostics for registry maintainers; the registry stays the
//! only input to injection.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::builder::toolchain::{CommandSpec, CompilationBuilder, ToolchainPlatform};
use crate::core::target::TargetId;
use crate::shim::errors::ShimError;
use crate::shim::synth::ShimDefinition;
use crate::util::config::ProbeConfig;
use crate::util::fs::write_string;
use crate::util::process::{find_cxx_compiler, ProcessBuilder};

/// Compiler messages meaning a name was not found.
const MISSING_SYMBOL_MARKERS: &[&str] = &[
    "is not a member of",
    "no member named",
    "was not declared",
    "has not been declared",
    "undeclared identifier",
    "no matching function",
    "C2039",
    "C3861",
];

/// Compiler messages meaning a name was declared twice.
const REDEFINITION_MARKERS: &[&str] = &[
    "redefinition of",
    "conflicting declaration",
    "conflicts with target of using declaration",
    "conflicts with a previous declaration",
    "call of overloaded",
    "is ambiguous",
    "C2084",
    "C2668",
];

/// Result of one probe compile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "diagnostic", rename_all = "kebab-case")]
pub enum ProbeOutcome {
    Ok,
    MissingSymbol(String),
    Redefinition(String),
    OtherError(String),
}

impl ProbeOutcome {
    /// Classify a compiler exit status and its diagnostics.
    pub fn classify(success: bool, stderr: &str) -> Self {
        if success {
            return ProbeOutcome::Ok;
        }

        let first_error = stderr
            .lines()
            .find(|l| l.contains("error"))
            .unwrap_or_else(|| stderr.lines().next().unwrap_or_default())
            .trim()
            .to_string();

        if REDEFINITION_MARKERS.iter().any(|m| stderr.contains(m)) {
            ProbeOutcome::Redefinition(first_error)
        } else if MISSING_SYMBOL_MARKERS.iter().any(|m| stderr.contains(m)) {
            ProbeOutcome::MissingSymbol(first_error)
        } else {
            ProbeOutcome::OtherError(first_error)
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ProbeOutcome::Ok)
    }
}

/// What the two probe compiles say about a gap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "kebab-case")]
pub enum ProbeVerdict {
    /// The symbol is missing and the shim supplies it.
    ConfirmedGap,
    /// The symbol is missing and the shim does not fix it.
    ShimIneffective { with_shim: ProbeOutcome },
    /// The target already provides the symbol.
    Redundant { collision: Option<String> },
    /// The probe itself did not compile for an unrelated reason.
    Inconclusive { detail: String },
}

impl ProbeVerdict {
    /// The error the verdict implies for `def` on `target`, if any.
    pub fn to_error(&self, def: &ShimDefinition, target: &TargetId) -> Option<ShimError> {
        let symbol = format!("{} {}({})", def.signature.ret, def.name, def.ty());
        match self {
            ProbeVerdict::Redundant {
                collision: Some(detail),
            } => Some(ShimError::DuplicateDefinition {
                symbol,
                target: Some(target.to_string()),
                detail: detail.clone(),
            }),
            ProbeVerdict::ShimIneffective { with_shim } => Some(ShimError::UnsupportedSymbol {
                symbol,
                target: Some(target.to_string()),
                reason: format!("the shim does not make the probe compile: {:?}", with_shim),
            }),
            _ => None,
        }
    }
}

/// The probe translation unit for a definition.
pub fn probe_source(def: &ShimDefinition) -> String {
    let ty = def.ty().c_name();
    let callee = if def.name.is_global() {
        def.name.name.clone()
    } else {
        def.name.to_string()
    };
    format!(
        "#include <{}>\n{} stdshim_probe({} v) {{ return {}(v); }}\n",
        def.primitive_header(),
        ty,
        ty,
        callee
    )
}

/// Type-checks probe translation units with a given compiler.
#[derive(Debug, Clone)]
pub struct Probe {
    compiler: CommandSpec,
    work_dir: PathBuf,
}

impl Probe {
    /// Probe with `compiler` (including any target or sysroot arguments),
    /// writing probe sources under `work_dir`.
    pub fn new(compiler: CommandSpec, work_dir: impl Into<PathBuf>) -> Self {
        Probe {
            compiler,
            work_dir: work_dir.into(),
        }
    }

    /// Probe with the host C++ compiler, if one is installed.
    pub fn host(work_dir: impl Into<PathBuf>) -> Option<Self> {
        Self::from_config(&ProbeConfig::default(), work_dir)
    }

    /// Probe with the configured compiler (falling back to the host one)
    /// and the configured extra arguments.
    pub fn from_config(config: &ProbeConfig, work_dir: impl Into<PathBuf>) -> Option<Self> {
        let cxx = config.cxx.clone().or_else(find_cxx_compiler)?;
        let compiler = CommandSpec::new(cxx).args(config.args.iter().cloned());
        Some(Probe::new(compiler, work_dir))
    }

    /// Cross-compile for `target`; only Clang accepts `--target`.
    pub fn with_target(mut self, target: &TargetId) -> Self {
        if self.compiler.platform == ToolchainPlatform::Clang {
            self.compiler = self.compiler.arg(format!("--target={}", target));
        }
        self
    }

    /// Type-check `source`, optionally force-including `header`.
    pub fn compile(&self, name: &str, source: &str, header: Option<&Path>) -> Result<ProbeOutcome> {
        let path = self.work_dir.join(format!("{}.cpp", name));
        write_string(&path, source)?;

        let mut cmd = self.compiler.clone();
        let syntax_only = cmd.platform.syntax_only_flag();
        cmd.flag(syntax_only);
        if let Some(header) = header {
            cmd.force_include(header);
        }
        cmd.flag(&path.display().to_string());

        let output = ProcessBuilder::from_spec(&cmd)
            .cwd(&self.work_dir)
            .exec()
            .with_context(|| format!("failed to run probe compile for {}", name))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        let outcome = ProbeOutcome::classify(output.status.success(), &stderr);
        tracing::debug!(
            "Probe {} ({}): {:?}",
            name,
            if header.is_some() { "with shim" } else { "without shim" },
            outcome
        );
        Ok(outcome)
    }

    /// Compile the probe for `def` without and with `header`.
    pub fn check(&self, def: &ShimDefinition, header: &Path) -> Result<ProbeVerdict> {
        let name = format!("probe_{}", def.guard_macro().to_lowercase());
        let source = probe_source(def);

        let verdict = match self.compile(&name, &source, None)? {
            ProbeOutcome::MissingSymbol(_) => match self.compile(&name, &source, Some(header))? {
                ProbeOutcome::Ok => ProbeVerdict::ConfirmedGap,
                with_shim => ProbeVerdict::ShimIneffective { with_shim },
            },
            ProbeOutcome::Ok => {
                let collision = match self.compile(&name, &source, Some(header))? {
                    ProbeOutcome::Ok => None,
                    ProbeOutcome::Redefinition(d)
                    | ProbeOutcome::MissingSymbol(d)
                    | ProbeOutcome::OtherError(d) => Some(d),
                };
                ProbeVerdict::Redundant { collision }
            }
            ProbeOutcome::Redefinition(detail) | ProbeOutcome::OtherError(detail) => {
                ProbeVerdict::Inconclusive { detail }
            }
        };

        Ok(verdict)
    }
}
