//! Failure taxonomy for gap evaluation, synthesis and injection.

use thiserror::Error;

use crate::core::registry::{EvolutionError, RegistryError};
use crate::core::target::TargetIdParseError;
use crate::util::diagnostic::Diagnostic;

/// Error raised while evaluating or shimming gaps for a target.
///
/// None of these are retried: each needs a registry or strategy change.
#[derive(Debug, Error)]
pub enum ShimError {
    #[error("unknown target `{target}`")]
    UnknownTarget { target: String, registry: String },

    #[error("unsupported symbol `{symbol}`{}: {reason}", target_suffix(.target))]
    UnsupportedSymbol {
        symbol: String,
        target: Option<String>,
        reason: String,
    },

    #[error("duplicate definition of `{symbol}`{}", target_suffix(.target))]
    DuplicateDefinition {
        symbol: String,
        target: Option<String>,
        detail: String,
    },

    #[error(transparent)]
    InvalidTarget(#[from] TargetIdParseError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Evolution(#[from] EvolutionError),

    #[error("cannot {event} while {state}")]
    InvalidTransition { state: String, event: String },

    #[error("failed to write shim header `{path}`: {message}")]
    Io { path: String, message: String },
}

fn target_suffix(target: &Option<String>) -> String {
    match target {
        Some(t) => format!(" for target `{}`", t),
        None => String::new(),
    }
}

impl ShimError {
    /// Attach the target being evaluated to a target-independent error.
    pub fn for_target(self, target: &str) -> Self {
        match self {
            ShimError::UnsupportedSymbol {
                symbol,
                target: None,
                reason,
            } => ShimError::UnsupportedSymbol {
                symbol,
                target: Some(target.to_string()),
                reason,
            },
            ShimError::DuplicateDefinition {
                symbol,
                target: None,
                detail,
            } => ShimError::DuplicateDefinition {
                symbol,
                target: Some(target.to_string()),
                detail,
            },
            other => other,
        }
    }

    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            ShimError::UnknownTarget { target, registry } => {
                Diagnostic::error(format!("target `{}` is not in the gap registry", target))
                    .with_location(registry)
                    .with_context(
                        "an unknown target cannot be assumed to have a complete standard library",
                    )
                    .with_suggestion(format!(
                        "Add `{}` (or a matching pattern) to known_targets",
                        target
                    ))
                    .with_suggestion(
                        "Record any symbols the target lacks as [[gaps]] entries".to_string(),
                    )
            }

            ShimError::UnsupportedSymbol {
                symbol,
                target,
                reason,
            } => {
                let mut diag = Diagnostic::error(format!(
                    "no semantics-preserving forwarding for `{}`",
                    symbol
                ))
                .with_context(reason.clone());

                if let Some(target) = target {
                    diag = diag.with_context(format!("required by target `{}`", target));
                }

                diag.with_suggestion(
                    "Change forward_to to a primitive with the same operation and an equal or wider type"
                        .to_string(),
                )
                .with_suggestion("Fix the symbol upstream in the target's C++ library".to_string())
            }

            ShimError::DuplicateDefinition {
                symbol,
                target,
                detail,
            } => {
                let mut diag = Diagnostic::error(format!("`{}` would be defined twice", symbol))
                    .with_context(detail.clone());

                if let Some(target) = target {
                    diag = diag.with_context(format!("while shimming target `{}`", target));
                }

                diag.with_suggestion(
                    "The target already provides this symbol; remove it from the gap's targets via [[retired]]"
                        .to_string(),
                )
            }

            ShimError::InvalidTarget(e) => Diagnostic::error(e.to_string())
                .with_suggestion("Pass a full target triple such as `thumbv7em-none-eabihf`"),

            ShimError::Registry(e) => {
                let mut diag = Diagnostic::error(e.message.clone());
                if let Some(help) = &e.help {
                    diag = diag.with_suggestion(help.clone());
                }
                diag
            }

            ShimError::Evolution(e) => {
                let mut diag = Diagnostic::error(e.to_string());
                for violation in &e.violations {
                    diag = diag.with_context(violation.clone());
                }
                diag.with_suggestion("Bump `version` and retire gaps explicitly".to_string())
            }

            ShimError::InvalidTransition { .. } => Diagnostic::error(self.to_string()),

            ShimError::Io { path, message } => {
                Diagnostic::error(format!("failed to write shim header: {}", message))
                    .with_location(path)
            }
        }
    }
}
