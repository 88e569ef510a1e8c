//! End-to-end injection scenarios.
//!
//! Scenarios that compile C++ use the host compiler standing in for a
//! target's toolchain and are skipped when no C++ compiler is installed.

use std::fs;

use stdshim::builder::{CommandSpec, CompilationBuilder, ToolchainPlatform};
use stdshim::core::{GapRegistry, TargetId};
use stdshim::ops::{prepare_target, prepare_targets, PrepareOptions, Probe, ProbeOutcome, TargetState};
use stdshim::shim::{Oracle, ShimError};
use stdshim::util::process::{find_cxx_compiler, ProcessBuilder};
use tempfile::TempDir;

/// A registry where `compat::round(float)` plays the role of a symbol the
/// bare-metal target's runtime lacks. The host has no `compat` namespace,
/// so the host compiler reproduces the missing-symbol failure.
const REGISTRY: &str = r#"
version = 1
known_targets = ["thumbv*-none-eabi*", "x86_64-unknown-linux-gnu"]

[[gaps]]
symbol = "round"
namespace = "compat"
signature = "float(float)"
forward_to = "round"
targets = ["thumbv*-none-eabi*"]
"#;

const UPSTREAM_TU: &str = r#"
float upstream_round(float v) { return compat::round(v); }
"#;

const NATIVE_TU: &str = r#"
#include <cmath>
float upstream_round(float v) { return std::round(v); }
"#;

fn target(s: &str) -> TargetId {
    TargetId::parse(s).unwrap()
}

fn registry() -> GapRegistry {
    GapRegistry::parse("compat.toml", REGISTRY).unwrap()
}

#[test]
fn test_t1_gets_one_forwarding_definition() {
    let tmp = TempDir::new().unwrap();
    let registry = registry();
    let opts = PrepareOptions::new(tmp.path());

    let plan = prepare_target(Oracle::new(&registry), &target("thumbv6m-none-eabi"), &opts).unwrap();
    assert_eq!(plan.definitions.len(), 1);
    assert_eq!(plan.definitions[0].source_symbol, "round");

    let header = fs::read_to_string(plan.header.as_ref().unwrap()).unwrap();
    assert!(header.contains("namespace compat {"));
    assert!(header.contains("::round(static_cast<double>(x))"));

    let args = plan.force_include_args(ToolchainPlatform::Gcc);
    assert_eq!(args[0], "-include");
    assert_eq!(args[1], plan.header.as_ref().unwrap().display().to_string());
}

#[test]
fn test_t2_gets_nothing() {
    let tmp = TempDir::new().unwrap();
    let registry = registry();
    let opts = PrepareOptions::new(tmp.path());

    let plan =
        prepare_target(Oracle::new(&registry), &target("x86_64-unknown-linux-gnu"), &opts).unwrap();
    assert!(plan.header.is_none());
    assert!(plan.definitions.is_empty());
    assert!(plan.force_include_args(ToolchainPlatform::Msvc).is_empty());
    assert!(fs::read_dir(tmp.path()).unwrap().next().is_none());
}

#[test]
fn test_unknown_target_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let registry = registry();
    let opts = PrepareOptions::new(tmp.path());

    let err = prepare_target(Oracle::new(&registry), &target("aarch64-apple-darwin"), &opts)
        .unwrap_err();
    assert!(matches!(err, ShimError::UnknownTarget { .. }));
}

#[test]
fn test_targets_with_equal_gaps_share_a_header() {
    let tmp = TempDir::new().unwrap();
    let registry = registry();
    let opts = PrepareOptions::new(tmp.path());
    let targets = [
        target("thumbv6m-none-eabi"),
        target("thumbv7em-none-eabihf"),
        target("thumbv8m.main-none-eabi"),
        target("x86_64-unknown-linux-gnu"),
    ];

    let reports = prepare_targets(Oracle::new(&registry), &targets, &opts);
    assert!(reports[..3].iter().all(|r| r.state == TargetState::ShimInjected));
    assert!(reports[..3].iter().all(|r| r.header == reports[0].header));
    assert_eq!(reports[3].state, TargetState::NoShimNeeded);

    let headers: Vec<_> = fs::read_dir(tmp.path().join("stdshim")).unwrap().collect();
    assert_eq!(headers.len(), 1);
}

#[test]
fn test_header_guards_allow_double_inclusion() {
    let tmp = TempDir::new().unwrap();
    let registry = registry();
    let opts = PrepareOptions::new(tmp.path());
    let plan = prepare_target(Oracle::new(&registry), &target("thumbv6m-none-eabi"), &opts).unwrap();
    let header = fs::read_to_string(plan.header.as_ref().unwrap()).unwrap();

    let guard = plan.definitions[0].guard_macro();
    assert!(header.contains(&format!("#ifndef {}\n#define {}\n", guard, guard)));
    assert_eq!(header.matches("inline float round(float x)").count(), 1);

    let opens = header.lines().filter(|l| l.starts_with("#if")).count();
    let closes = header.lines().filter(|l| l.starts_with("#endif")).count();
    assert_eq!(opens, closes);
}

#[test]
fn test_t1_compiles_only_with_shim() {
    let Some(cxx) = find_cxx_compiler() else {
        eprintln!("skipping: no host C++ compiler");
        return;
    };
    let tmp = TempDir::new().unwrap();
    let registry = registry();
    let opts = PrepareOptions::new(tmp.path().join("out"));
    let plan = prepare_target(Oracle::new(&registry), &target("thumbv6m-none-eabi"), &opts).unwrap();
    let header = plan.header.clone().unwrap();

    let probe = Probe::new(CommandSpec::new(&cxx), tmp.path());
    assert!(matches!(
        probe.compile("upstream", UPSTREAM_TU, None).unwrap(),
        ProbeOutcome::MissingSymbol(_)
    ));
    assert_eq!(
        probe.compile("upstream", UPSTREAM_TU, Some(&header)).unwrap(),
        ProbeOutcome::Ok
    );

    // Force-included twice: the guards keep it to one definition.
    let source = tmp.path().join("twice.cpp");
    fs::write(&source, UPSTREAM_TU).unwrap();
    let mut cmd = CommandSpec::new(&cxx);
    cmd.flag("-fsyntax-only");
    cmd.force_include(&header);
    cmd.force_include(&header);
    cmd.flag(&source.display().to_string());
    let output = ProcessBuilder::from_spec(&cmd).exec().unwrap();
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn test_t2_compiles_natively_unmodified() {
    let Some(cxx) = find_cxx_compiler() else {
        eprintln!("skipping: no host C++ compiler");
        return;
    };
    let tmp = TempDir::new().unwrap();
    let registry = registry();
    let opts = PrepareOptions::new(tmp.path().join("out"));
    let plan =
        prepare_target(Oracle::new(&registry), &target("x86_64-unknown-linux-gnu"), &opts).unwrap();

    let mut spec = CommandSpec::new(&cxx);
    plan.apply_to(&mut spec);
    assert!(spec.args.is_empty());

    let outcome = Probe::new(spec, tmp.path())
        .compile("native", NATIVE_TU, plan.header.as_deref())
        .unwrap();
    assert_eq!(outcome, ProbeOutcome::Ok);
}

#[test]
fn test_namespaces_that_fold_alike_both_compile() {
    let registry = GapRegistry::parse(
        "nested.toml",
        r#"
version = 1
known_targets = ["thumbv*-none-eabi*"]

[[gaps]]
symbol = "round"
namespace = "a::b"
signature = "float(float)"
forward_to = "round"
targets = ["thumbv*-none-eabi*"]

[[gaps]]
symbol = "round"
namespace = "a_b"
signature = "float(float)"
forward_to = "round"
targets = ["thumbv*-none-eabi*"]
"#,
    )
    .unwrap();
    let tmp = TempDir::new().unwrap();
    let opts = PrepareOptions::new(tmp.path().join("out"));
    let plan = prepare_target(Oracle::new(&registry), &target("thumbv6m-none-eabi"), &opts).unwrap();
    assert_eq!(plan.definitions.len(), 2);
    assert_ne!(
        plan.definitions[0].guard_macro(),
        plan.definitions[1].guard_macro()
    );

    let Some(cxx) = find_cxx_compiler() else {
        eprintln!("skipping: no host C++ compiler");
        return;
    };
    let outcome = Probe::new(CommandSpec::new(&cxx), tmp.path())
        .compile(
            "nested",
            "float both(float v) { return a::b::round(v) + a_b::round(v); }\n",
            plan.header.as_deref(),
        )
        .unwrap();
    assert_eq!(outcome, ProbeOutcome::Ok);
}
