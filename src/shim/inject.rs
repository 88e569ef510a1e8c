//! Injection point - renders shim sets into force-include headers.
//!
//! One header exists per distinct shim set, named by the set's fingerprint,
//! so targets that need the same definitions share one inclusion unit and a
//! target's header never changes unless its definitions do.
//!
//! Layout of a rendered header:
//!
//! ```text
//! #ifndef STDSHIM_INJECT_<FP>_H                   whole-file guard
//! #include <math.h>                               global (C-compatible) definitions
//! #ifndef STDSHIM_DEF_TRUNCF_FLOAT_FLOAT_<ID>     per-definition guard
//! static inline float truncf(float x) { ... }
//! #endif
//! #ifdef __cplusplus
//! #include <cmath>                                namespaced definitions
//! #ifndef STDSHIM_DEF_STD_ROUND_FLOAT_FLOAT_<ID>
//! namespace std { inline float round(float x) { ... } }
//! #endif
//! #endif
//! #endif
//! ```

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::builder::toolchain::{CompilationBuilder, ToolchainPlatform};
use crate::core::target::TargetId;
use crate::shim::errors::ShimError;
use crate::shim::synth::ShimDefinition;
use crate::util::fs::write_if_changed;
use crate::util::hash::Fingerprint;

/// Directory under the output directory holding shim headers.
pub const SHIM_DIR_NAME: &str = "stdshim";

/// File name of every rendered header.
pub const HEADER_FILE_NAME: &str = "stdshim_inject.h";

/// The deduplicated definitions one target needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShimSet {
    target: TargetId,
    definitions: Vec<ShimDefinition>,
}

impl ShimSet {
    /// Collect definitions for a target.
    ///
    /// Identical definitions collapse into one. Two different definitions of
    /// the same name and signature are a `DuplicateDefinition`.
    pub fn new(
        target: TargetId,
        definitions: impl IntoIterator<Item = ShimDefinition>,
    ) -> Result<Self, ShimError> {
        let mut unique: Vec<ShimDefinition> = Vec::new();

        for def in definitions {
            match unique
                .iter()
                .find(|d| d.name == def.name && d.signature == def.signature)
            {
                Some(existing) if *existing == def => {}
                Some(existing) => {
                    return Err(ShimError::DuplicateDefinition {
                        symbol: format!("{} {}({})", def.signature.ret, def.name, def.ty()),
                        target: Some(target.to_string()),
                        detail: format!(
                            "forwarded both through `{}` and `{}`",
                            existing.source_symbol, def.source_symbol
                        ),
                    });
                }
                None => unique.push(def),
            }
        }

        // Order by identity so equal sets render identically.
        unique.sort_by(|a, b| {
            (&a.name, a.signature.to_string()).cmp(&(&b.name, b.signature.to_string()))
        });

        Ok(ShimSet {
            target,
            definitions: unique,
        })
    }

    pub fn target(&self) -> &TargetId {
        &self.target
    }

    pub fn definitions(&self) -> &[ShimDefinition] {
        &self.definitions
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// SHA-256 over the rendered definitions (target-independent).
    pub fn fingerprint(&self) -> String {
        let mut fp = Fingerprint::new();
        for def in &self.definitions {
            fp.update_str(&def.name.namespace)
                .update_str(&def.definition_text());
        }
        fp.finish()
    }

    /// First 16 hex digits of the fingerprint.
    pub fn short_fingerprint(&self) -> String {
        self.fingerprint()[..16].to_string()
    }

    /// Where the header for this set lives under `out_dir`.
    pub fn header_path(&self, out_dir: &Path) -> PathBuf {
        out_dir
            .join(SHIM_DIR_NAME)
            .join(self.short_fingerprint())
            .join(HEADER_FILE_NAME)
    }

    /// Render the force-include header.
    pub fn render_header(&self) -> String {
        let fp = self.short_fingerprint();
        let file_guard = format!("STDSHIM_INJECT_{}_H", fp.to_uppercase());

        let (global, namespaced): (Vec<_>, Vec<_>) =
            self.definitions.iter().partition(|d| d.name.is_global());

        let mut out = String::new();
        out.push_str("/* Generated by stdshim. Do not edit.\n");
        let _ = writeln!(out, " * Shim set {}", fp);
        for def in &self.definitions {
            let _ = writeln!(
                out,
                " *   {} {}({}) -> {}",
                def.signature.ret,
                def.name,
                def.ty(),
                def.source_symbol
            );
        }
        out.push_str(" */\n");
        let _ = writeln!(out, "#ifndef {}", file_guard);
        let _ = writeln!(out, "#define {}", file_guard);

        if !global.is_empty() {
            out.push('\n');
            for header in headers_of(&global) {
                let _ = writeln!(out, "#include <{}>", header);
            }
            for def in &global {
                out.push('\n');
                render_guarded(&mut out, def, &def.definition_text());
            }
        }

        if !namespaced.is_empty() {
            out.push_str("\n#ifdef __cplusplus\n");
            for header in headers_of(&namespaced) {
                let _ = writeln!(out, "#include <{}>", header);
            }
            for def in &namespaced {
                out.push('\n');
                render_guarded(&mut out, def, &wrap_in_namespace(def));
            }
            out.push_str("\n#endif /* __cplusplus */\n");
        }

        let _ = writeln!(out, "\n#endif /* {} */", file_guard);
        out
    }
}

fn headers_of(defs: &[&ShimDefinition]) -> BTreeSet<&'static str> {
    defs.iter().map(|d| d.primitive_header()).collect()
}

fn render_guarded(out: &mut String, def: &ShimDefinition, body: &str) {
    let guard = def.guard_macro();
    let _ = writeln!(out, "#ifndef {}", guard);
    let _ = writeln!(out, "#define {}", guard);
    out.push_str(body);
    out.push('\n');
    out.push_str("#endif\n");
}

fn wrap_in_namespace(def: &ShimDefinition) -> String {
    let path: Vec<&str> = def.name.namespace_path().collect();
    let open: String = path.iter().map(|ns| format!("namespace {} {{\n", ns)).collect();
    let close = "}\n".repeat(path.len());
    format!("{}{}\n{}", open, def.definition_text(), close.trim_end())
}

/// What the orchestrator must do for one target's build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InjectionPlan {
    pub target: TargetId,
    /// Header to force-include; `None` when the target needs no shim
    pub header: Option<PathBuf>,
    pub definitions: Vec<ShimDefinition>,
}

impl InjectionPlan {
    /// A plan that prepends nothing.
    pub fn none(target: TargetId) -> Self {
        InjectionPlan {
            target,
            header: None,
            definitions: Vec::new(),
        }
    }

    /// Whether anything is prepended.
    pub fn is_needed(&self) -> bool {
        self.header.is_some()
    }

    /// Compiler arguments that prepend the header; empty when none is needed.
    pub fn force_include_args(&self, platform: ToolchainPlatform) -> Vec<String> {
        self.header
            .as_deref()
            .map(|h| platform.force_include_args(h))
            .unwrap_or_default()
    }

    /// Prepend the header to every translation unit `builder` compiles.
    pub fn apply_to<B: CompilationBuilder>(&self, builder: &mut B) {
        if let Some(header) = &self.header {
            builder.force_include(header);
        }
    }
}

/// Render and write the header for `set` under `out_dir`.
///
/// An empty set writes nothing. The write is atomic and skipped when an
/// identical header is already in place.
pub fn plan_injection(set: ShimSet, out_dir: &Path) -> Result<InjectionPlan, ShimError> {
    if set.is_empty() {
        return Ok(InjectionPlan::none(set.target));
    }

    let path = set.header_path(out_dir);
    let changed = write_if_changed(&path, &set.render_header()).map_err(|e| ShimError::Io {
        path: path.display().to_string(),
        message: format!("{:#}", e),
    })?;

    if changed {
        tracing::info!(
            "Wrote shim header for {} ({} definition(s)): {}",
            set.target,
            set.len(),
            path.display()
        );
    } else {
        tracing::debug!("Shim header up to date: {}", path.display());
    }

    Ok(InjectionPlan {
        target: set.target,
        header: Some(path),
        definitions: set.definitions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::toolchain::CommandSpec;
    use crate::core::gap::SymbolGapRecord;
    use crate::core::target::TargetPattern;
    use crate::shim::synth::synthesize;
    use tempfile::TempDir;

    fn def(namespace: &str, symbol: &str, forward_to: &str) -> ShimDefinition {
        synthesize(&SymbolGapRecord {
            symbol: symbol.to_string(),
            namespace: namespace.to_string(),
            signature: "float(float)".parse().unwrap(),
            forward_to: forward_to.to_string(),
            targets: vec![TargetPattern::parse("thumbv6m-none-eabi").unwrap()],
            note: None,
        })
        .unwrap()
    }

    fn target(s: &str) -> TargetId {
        TargetId::parse(s).unwrap()
    }

    #[test]
    fn test_render_std_round() {
        let round = def("std", "round", "round");
        let def_guard = round.guard_macro();
        let set = ShimSet::new(target("thumbv6m-none-eabi"), vec![round]).unwrap();
        let header = set.render_header();
        let guard = format!("STDSHIM_INJECT_{}_H", set.short_fingerprint().to_uppercase());

        assert!(header.contains(&format!("#ifndef {}\n#define {}\n", guard, guard)));
        assert!(header.contains("#ifdef __cplusplus\n#include <cmath>\n"));
        assert!(header.contains(&format!(
            "#ifndef {g}\n\
             #define {g}\n\
             namespace std {{\n\
             inline float round(float x) {{ return static_cast<float>(::round(static_cast<double>(x))); }}\n\
             }}\n\
             #endif\n",
            g = def_guard
        )));
        assert!(!header.contains("math.h"));
        assert!(header.trim_end().ends_with(&format!("#endif /* {} */", guard)));
    }

    #[test]
    fn test_render_global_is_c_compatible() {
        let set = ShimSet::new(
            target("thumbv6m-none-eabi"),
            vec![def("std", "round", "round"), def("", "truncf", "trunc")],
        )
        .unwrap();
        let header = set.render_header();

        let math_h = header.find("#include <math.h>").unwrap();
        let cplusplus = header.find("#ifdef __cplusplus").unwrap();
        let truncf = header.find("static inline float truncf").unwrap();
        assert!(math_h < truncf && truncf < cplusplus);
    }

    #[test]
    fn test_guards_balance() {
        let set = ShimSet::new(
            target("thumbv6m-none-eabi"),
            vec![
                def("std", "round", "round"),
                def("std", "floor", "floorf"),
                def("", "ceilf", "ceil"),
            ],
        )
        .unwrap();
        let header = set.render_header();
        let opens = header
            .lines()
            .filter(|l| l.starts_with("#ifndef") || l.starts_with("#ifdef"))
            .count();
        let closes = header.lines().filter(|l| l.starts_with("#endif")).count();
        assert_eq!(opens, closes);
        assert_eq!(opens, 5);
    }

    #[test]
    fn test_identical_definitions_collapse() {
        let set = ShimSet::new(
            target("thumbv6m-none-eabi"),
            vec![def("std", "round", "round"), def("std", "round", "round")],
        )
        .unwrap();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_conflicting_definitions_rejected() {
        let err = ShimSet::new(
            target("thumbv6m-none-eabi"),
            vec![def("std", "round", "round"), def("std", "round", "roundf")],
        )
        .unwrap_err();
        assert!(matches!(err, ShimError::DuplicateDefinition { .. }));
    }

    #[test]
    fn test_fingerprint_ignores_target_and_order() {
        let a = ShimSet::new(
            target("thumbv6m-none-eabi"),
            vec![def("std", "round", "round"), def("std", "trunc", "trunc")],
        )
        .unwrap();
        let b = ShimSet::new(
            target("riscv32imc-unknown-none-elf"),
            vec![def("std", "trunc", "trunc"), def("std", "round", "round")],
        )
        .unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.render_header(), b.render_header());

        let c = ShimSet::new(target("thumbv6m-none-eabi"), vec![def("std", "round", "round")])
            .unwrap();
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_plan_writes_header_once() {
        let tmp = TempDir::new().unwrap();
        let set = ShimSet::new(target("thumbv6m-none-eabi"), vec![def("std", "round", "round")])
            .unwrap();
        let expected_path = set.header_path(tmp.path());

        let plan = plan_injection(set.clone(), tmp.path()).unwrap();
        assert_eq!(plan.header.as_deref(), Some(expected_path.as_path()));
        let written = std::fs::read_to_string(&expected_path).unwrap();
        assert_eq!(written, set.render_header());

        let mtime = std::fs::metadata(&expected_path).unwrap().modified().unwrap();
        let again = plan_injection(set, tmp.path()).unwrap();
        assert_eq!(again, plan);
        assert_eq!(
            std::fs::metadata(&expected_path).unwrap().modified().unwrap(),
            mtime
        );
    }

    #[test]
    fn test_render_keeps_namespaces_that_fold_alike() {
        let nested = def("a::b", "round", "round");
        let joined = def("a_b", "round", "round");
        let guards = [nested.guard_macro(), joined.guard_macro()];
        let set = ShimSet::new(target("thumbv6m-none-eabi"), vec![nested, joined]).unwrap();
        let header = set.render_header();

        assert_eq!(set.definitions().len(), 2);
        for guard in &guards {
            assert_eq!(header.matches(&format!("#ifndef {}\n", guard)).count(), 1);
        }
        assert!(header.contains("namespace a_b {"));
    }

    #[test]
    fn test_empty_set_prepends_nothing() {
        let tmp = TempDir::new().unwrap();
        let set = ShimSet::new(target("x86_64-unknown-linux-gnu"), Vec::new()).unwrap();
        let plan = plan_injection(set, tmp.path()).unwrap();
        assert!(!plan.is_needed());
        assert!(plan.force_include_args(ToolchainPlatform::Gcc).is_empty());
        assert!(!tmp.path().join(SHIM_DIR_NAME).exists());

        let mut cmd = CommandSpec::new("g++");
        plan.apply_to(&mut cmd);
        assert!(cmd.args.is_empty());
    }

    #[test]
    fn test_apply_to_command() {
        let plan = InjectionPlan {
            target: target("thumbv6m-none-eabi"),
            header: Some(PathBuf::from("/out/stdshim/0123/stdshim_inject.h")),
            definitions: Vec::new(),
        };
        let mut cmd = CommandSpec::new("arm-none-eabi-g++").arg("-c");
        plan.apply_to(&mut cmd);
        assert_eq!(
            cmd.args,
            vec!["-c", "-include", "/out/stdshim/0123/stdshim_inject.h"]
        );
        assert_eq!(
            plan.force_include_args(ToolchainPlatform::Msvc),
            vec!["/FI/out/stdshim/0123/stdshim_inject.h"]
        );
    }
}
