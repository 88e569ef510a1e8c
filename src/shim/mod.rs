//! Gap evaluation, shim synthesis and header injection.
//!
//! The three stages run in order for one target:
//! 1. [`oracle`] - which registered gaps apply to the target
//! 2. [`synth`] - a forwarding definition per gap, checked by [`numeric`]
//! 3. [`inject`] - one guarded header per distinct shim set

pub mod errors;
pub mod inject;
pub mod numeric;
pub mod oracle;
pub mod synth;

pub use errors::ShimError;
pub use inject::{plan_injection, InjectionPlan, ShimSet};
pub use numeric::{verify_definition, Verdict, VerificationReport};
pub use oracle::{GapSet, Oracle};
pub use synth::{synthesize, ForwardingStrategy, ShimDefinition, Synthesizer};
