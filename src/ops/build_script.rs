//! Cargo build-script integration.
//!
//! ```no_run
//! // build.rs
//! fn main() {
//!     let mut build = cc::Build::new();
//!     build.cpp(true).file("vendor/lib.cpp");
//!     stdshim::inject(&mut build).unwrap();
//!     build.compile("vendored");
//! }
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::builder::toolchain::CompilationBuilder;
use crate::core::registry::{GapRegistry, BUILTIN_REGISTRY_NAME};
use crate::core::target::TargetId;
use crate::ops::prepare::{write_report, REPORT_FILE_NAME};
use crate::ops::session::TargetSession;
use crate::shim::inject::InjectionPlan;
use crate::shim::numeric::{verify_definition, Verdict};
use crate::shim::oracle::Oracle;
use crate::shim::synth::Synthesizer;
use crate::util::config::{self, project_config_path, Config, ENV_VARS, ENV_VERIFY};
use crate::util::diagnostic::{suggestions, Diagnostic};
use crate::util::logging::{self, ENV_LOG};

/// What a build script knows about the build it is part of.
#[derive(Debug, Clone)]
pub struct BuildEnv {
    pub target: TargetId,
    pub out_dir: PathBuf,
    pub manifest_dir: PathBuf,
    pub config: Config,
}

impl BuildEnv {
    /// Read `TARGET`, `OUT_DIR` and `CARGO_MANIFEST_DIR`, plus configuration.
    pub fn from_env() -> Result<Self> {
        let var = |name: &str| {
            std::env::var(name).with_context(|| {
                format!("environment variable {} is not set\n{}", name, suggestions::NOT_A_BUILD_SCRIPT)
            })
        };

        let target = TargetId::parse(&var("TARGET")?)?;
        let out_dir = PathBuf::from(var("OUT_DIR")?);
        let manifest_dir = PathBuf::from(var("CARGO_MANIFEST_DIR")?);
        let config = config::discover(&manifest_dir)?;

        Ok(BuildEnv {
            target,
            out_dir,
            manifest_dir,
            config,
        })
    }

    /// Lines telling Cargo when to rerun the build script.
    pub fn rerun_directives(&self) -> Vec<String> {
        let mut lines: Vec<String> = ENV_VARS
            .iter()
            .chain(std::iter::once(&ENV_LOG))
            .map(|var| format!("cargo:rerun-if-env-changed={}", var))
            .collect();

        let project_config = project_config_path(&self.manifest_dir);
        if project_config.exists() {
            lines.push(format!("cargo:rerun-if-changed={}", project_config.display()));
        }
        if let Some(registry) = &self.config.shim.registry {
            lines.push(format!("cargo:rerun-if-changed={}", registry.display()));
        }
        lines
    }

    /// Load the configured registry, or the built-in one.
    pub fn load_registry(&self) -> Result<(GapRegistry, String)> {
        match &self.config.shim.registry {
            Some(path) => {
                let registry = GapRegistry::load(path).map_err(|e| {
                    anyhow::Error::new(e).context(suggestions::NO_REGISTRY)
                })?;
                Ok((registry, path.display().to_string()))
            }
            None => Ok((GapRegistry::builtin()?, BUILTIN_REGISTRY_NAME.to_string())),
        }
    }
}

/// Prepare the current target and force-include its shim into `build`.
///
/// Reads the build-script environment, prints `cargo:` directives and writes
/// `stdshim-report.json` to `OUT_DIR`.
pub fn inject(build: &mut cc::Build) -> Result<InjectionPlan> {
    logging::init();
    let env = BuildEnv::from_env()?;
    inject_with(build, &env)
}

/// Like [`inject`], with an explicit environment and any builder.
pub fn inject_with<B: CompilationBuilder>(builder: &mut B, env: &BuildEnv) -> Result<InjectionPlan> {
    for line in env.rerun_directives() {
        println!("{}", line);
    }

    let (registry, registry_name) = env.load_registry()?;
    let oracle = Oracle::new(&registry).with_source_name(&registry_name);
    let synthesizer = Synthesizer::new().verify_numerics(env.config.verify_numerics());

    let mut session = TargetSession::new(env.target.clone(), oracle, synthesizer);
    let result = session
        .evaluate()
        .and_then(|_| session.inject(&env.out_dir).cloned());

    if let Err(e) = &result {
        for line in e.to_diagnostic().cargo_warning_lines() {
            println!("{}", line);
        }
    }

    if env.config.report_enabled() {
        let written = write_report(&[session.report()], &env.out_dir.join(REPORT_FILE_NAME));
        match (&result, written) {
            (Err(_), Err(report_err)) => {
                println!("cargo:warning=failed to write {}: {:#}", REPORT_FILE_NAME, report_err);
            }
            (Ok(_), Err(report_err)) => return Err(report_err),
            (_, Ok(())) => {}
        }
    }

    let plan = result?;

    if env.config.verify_numerics() {
        for diagnostic in unverified_warnings(&plan) {
            for line in diagnostic.cargo_warning_lines() {
                println!("{}", line);
            }
        }
    }

    let platform = env.config.toolchain().unwrap_or_else(|| builder.platform());
    for arg in plan.force_include_args(platform) {
        builder.flag(&arg);
    }

    if let Some(header) = &plan.header {
        tracing::info!(
            "Force-including {} for {} ({})",
            header.display(),
            env.target,
            platform
        );
    }

    Ok(plan)
}

/// Warnings for injected definitions whose numerics could not be checked.
pub fn unverified_warnings(plan: &InjectionPlan) -> Vec<Diagnostic> {
    plan.definitions
        .iter()
        .map(verify_definition)
        .filter_map(|report| match report.verdict {
            Verdict::Unverified { reason } => Some(
                Diagnostic::warning(format!("{} is not numerically verified", report.definition))
                    .with_context(reason)
                    .with_suggestion(format!(
                        "Check the shim with a test on the target, then set {}=0 to silence this",
                        ENV_VERIFY
                    )),
            ),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::toolchain::{CommandSpec, ToolchainPlatform};
    use crate::shim::errors::ShimError;
    use tempfile::TempDir;

    fn env(tmp: &TempDir, target: &str) -> BuildEnv {
        BuildEnv {
            target: TargetId::parse(target).unwrap(),
            out_dir: tmp.path().join("out"),
            manifest_dir: tmp.path().to_path_buf(),
            config: Config::default(),
        }
    }

    #[test]
    fn test_inject_bare_metal() {
        let tmp = TempDir::new().unwrap();
        let env = env(&tmp, "thumbv6m-none-eabi");
        let mut cmd = CommandSpec::new("arm-none-eabi-g++");

        let plan = inject_with(&mut cmd, &env).unwrap();
        let header = plan.header.unwrap();
        assert!(header.starts_with(&env.out_dir));
        assert_eq!(cmd.args, vec!["-include".to_string(), header.display().to_string()]);

        let report = std::fs::read_to_string(env.out_dir.join(REPORT_FILE_NAME)).unwrap();
        assert!(report.contains("SHIM_INJECTED"));
    }

    #[test]
    fn test_inject_host_adds_nothing() {
        let tmp = TempDir::new().unwrap();
        let env = env(&tmp, "x86_64-unknown-linux-gnu");
        let mut cmd = CommandSpec::new("c++");

        let plan = inject_with(&mut cmd, &env).unwrap();
        assert!(plan.header.is_none());
        assert!(cmd.args.is_empty());
    }

    #[test]
    fn test_inject_unknown_target_fails_with_report() {
        let tmp = TempDir::new().unwrap();
        let env = env(&tmp, "wasm32-unknown-unknown");
        let mut cmd = CommandSpec::new("clang++");

        let err = inject_with(&mut cmd, &env).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ShimError>(),
            Some(ShimError::UnknownTarget { .. })
        ));
        assert!(cmd.args.is_empty());

        let report = std::fs::read_to_string(env.out_dir.join(REPORT_FILE_NAME)).unwrap();
        assert!(report.contains("UnknownTarget"));
    }

    #[test]
    fn test_toolchain_override_and_custom_registry() {
        let tmp = TempDir::new().unwrap();
        let registry = tmp.path().join("gaps.toml");
        std::fs::write(
            &registry,
            r#"
version = 2
known_targets = ["x86_64-pc-windows-msvc"]

[[gaps]]
symbol = "trunc"
namespace = "std"
signature = "float(float)"
forward_to = "truncf"
targets = ["x86_64-pc-windows-msvc"]
"#,
        )
        .unwrap();

        let mut env = env(&tmp, "x86_64-pc-windows-msvc");
        env.config.shim.registry = Some(registry.clone());
        env.config.shim.toolchain = Some(ToolchainPlatform::Msvc);
        env.config.shim.report = Some(false);

        let directives = env.rerun_directives();
        assert!(directives.contains(&format!("cargo:rerun-if-changed={}", registry.display())));
        assert!(directives.contains(&"cargo:rerun-if-env-changed=STDSHIM_REGISTRY".to_string()));

        let mut cmd = CommandSpec::new("g++").with_platform(ToolchainPlatform::Gcc);
        let plan = inject_with(&mut cmd, &env).unwrap();
        let header = plan.header.unwrap();
        assert_eq!(cmd.args, vec![format!("/FI{}", header.display())]);
        assert!(!env.out_dir.join(REPORT_FILE_NAME).exists());
    }

    #[test]
    fn test_missing_registry_file() {
        let tmp = TempDir::new().unwrap();
        let mut env = env(&tmp, "thumbv6m-none-eabi");
        env.config.shim.registry = Some(tmp.path().join("missing.toml"));

        let err = inject_with(&mut CommandSpec::new("g++"), &env).unwrap_err();
        assert!(format!("{:#}", err).contains("STDSHIM_REGISTRY"));
    }

    #[test]
    fn test_long_double_shim_warns_unverified() {
        let tmp = TempDir::new().unwrap();
        let registry = tmp.path().join("gaps.toml");
        std::fs::write(
            &registry,
            r#"
version = 1
known_targets = ["thumbv*-none-eabi*"]

[[gaps]]
symbol = "round"
namespace = "std"
signature = "long double(long double)"
forward_to = "roundl"
targets = ["thumbv*-none-eabi*"]
"#,
        )
        .unwrap();

        let mut env = env(&tmp, "thumbv7em-none-eabihf");
        env.config.shim.registry = Some(registry);
        let plan = inject_with(&mut CommandSpec::new("arm-none-eabi-g++"), &env).unwrap();

        let warnings = unverified_warnings(&plan);
        assert_eq!(warnings.len(), 1);
        let lines = warnings[0].cargo_warning_lines();
        assert!(lines[0].starts_with("cargo:warning=warning: long double std::round"));
        assert!(lines.iter().any(|l| l.contains("STDSHIM_VERIFY=0")));
    }

    #[test]
    fn test_verified_shim_has_no_warnings() {
        let tmp = TempDir::new().unwrap();
        let env = env(&tmp, "thumbv6m-none-eabi");
        let plan = inject_with(&mut CommandSpec::new("arm-none-eabi-g++"), &env).unwrap();
        assert!(unverified_warnings(&plan).is_empty());
    }

    #[test]
    fn test_failure_survives_unwritable_report() {
        let tmp = TempDir::new().unwrap();
        let mut env = env(&tmp, "wasm32-unknown-unknown");
        // A file where the output directory should be.
        std::fs::write(&env.out_dir, "").unwrap();
        env.out_dir = env.out_dir.join("nested");

        let err = inject_with(&mut CommandSpec::new("clang++"), &env).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ShimError>(),
            Some(ShimError::UnknownTarget { .. })
        ));
    }

    #[test]
    fn test_malformed_project_config_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let config_path = project_config_path(tmp.path());
        std::fs::create_dir_all(config_path.parent().unwrap()).unwrap();
        std::fs::write(&config_path, "[shim]\nregistry = \"ci/gaps.toml\"\nverify_numerics = flase\n")
            .unwrap();

        assert!(config::discover(tmp.path()).is_err());
    }
}
