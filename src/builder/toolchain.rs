//! Toolchain families and the flags needed to prepend a header to a compile.
//!
//! The shim header is never `#include`d by upstream sources; it is pushed
//! ahead of every translation unit with the compiler's force-include flag:
//!
//! | Family | Flag |
//! |--------|------|
//! | GCC / Clang / Apple Clang | `-include <path>` |
//! | MSVC | `/FI<path>` |

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// The platform/family of a toolchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolchainPlatform {
    /// GCC (GNU Compiler Collection)
    Gcc,
    /// Clang/LLVM
    Clang,
    /// Apple Clang (macOS)
    AppleClang,
    /// Microsoft Visual C++
    Msvc,
}

impl ToolchainPlatform {
    /// Get the platform name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolchainPlatform::Gcc => "gcc",
            ToolchainPlatform::Clang => "clang",
            ToolchainPlatform::AppleClang => "apple-clang",
            ToolchainPlatform::Msvc => "msvc",
        }
    }

    /// Whether the driver accepts GCC-style flags.
    pub fn is_gcc_like(&self) -> bool {
        !matches!(self, ToolchainPlatform::Msvc)
    }

    /// Guess the family from a compiler executable name.
    ///
    /// Handles cross prefixes (`arm-none-eabi-g++`) and suffixes (`.exe`).
    pub fn from_compiler_path(path: &Path) -> Self {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        if stem == "cl" || stem == "clang-cl" {
            ToolchainPlatform::Msvc
        } else if stem.contains("clang") {
            ToolchainPlatform::Clang
        } else {
            ToolchainPlatform::Gcc
        }
    }

    /// Arguments that force-include `header` ahead of every source file.
    pub fn force_include_args(&self, header: &Path) -> Vec<String> {
        if self.is_gcc_like() {
            vec!["-include".to_string(), header.display().to_string()]
        } else {
            vec![format!("/FI{}", header.display())]
        }
    }

    /// Flag that parses and type-checks without producing output.
    pub fn syntax_only_flag(&self) -> &'static str {
        if self.is_gcc_like() {
            "-fsyntax-only"
        } else {
            "/Zs"
        }
    }
}

impl std::fmt::Display for ToolchainPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ToolchainPlatform {
    type Err = ToolchainPlatformParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gcc" | "gnu" => Ok(ToolchainPlatform::Gcc),
            "clang" | "llvm" => Ok(ToolchainPlatform::Clang),
            "apple-clang" | "appleclang" => Ok(ToolchainPlatform::AppleClang),
            "msvc" | "cl" => Ok(ToolchainPlatform::Msvc),
            _ => Err(ToolchainPlatformParseError(s.to_string())),
        }
    }
}

/// Error returned when parsing an invalid toolchain platform.
#[derive(Debug, Clone)]
pub struct ToolchainPlatformParseError(pub String);

impl std::fmt::Display for ToolchainPlatformParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid toolchain '{}', valid values: gcc, clang, apple-clang, msvc",
            self.0
        )
    }
}

impl std::error::Error for ToolchainPlatformParseError {}

/// Something a compile step can be configured through.
///
/// Implemented for `cc::Build` (build scripts) and [`CommandSpec`] (direct
/// compiler invocations such as the gap probe).
pub trait CompilationBuilder {
    fn flag(&mut self, s: &str) -> &mut Self;

    /// The toolchain family the flags are for.
    fn platform(&self) -> ToolchainPlatform;

    /// Prepend `header` to every translation unit.
    fn force_include(&mut self, header: &Path) -> &mut Self {
        let args = self.platform().force_include_args(header);
        for arg in &args {
            self.flag(arg);
        }
        self
    }
}

impl CompilationBuilder for cc::Build {
    fn flag(&mut self, s: &str) -> &mut Self {
        cc::Build::flag(self, s)
    }

    fn platform(&self) -> ToolchainPlatform {
        match self.try_get_compiler() {
            Ok(tool) if tool.is_like_msvc() => ToolchainPlatform::Msvc,
            Ok(tool) if tool.is_like_clang() => ToolchainPlatform::Clang,
            Ok(_) => ToolchainPlatform::Gcc,
            Err(e) => {
                tracing::warn!("Could not detect the C/C++ compiler ({}), assuming GCC flags", e);
                ToolchainPlatform::Gcc
            }
        }
    }
}

/// A command to execute, with program, arguments, and environment.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// The program to run (e.g., "arm-none-eabi-g++", "cl.exe")
    pub program: PathBuf,
    /// Command arguments
    pub args: Vec<String>,
    /// Environment variables to set
    pub env: Vec<(String, String)>,
    /// Toolchain family of `program`
    pub platform: ToolchainPlatform,
}

impl CommandSpec {
    /// Create a new command spec, guessing the family from the program name.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        let program = program.into();
        let platform = ToolchainPlatform::from_compiler_path(&program);
        CommandSpec {
            program,
            args: Vec::new(),
            env: Vec::new(),
            platform,
        }
    }

    /// Override the toolchain family.
    pub fn with_platform(mut self, platform: ToolchainPlatform) -> Self {
        self.platform = platform;
        self
    }

    /// Add an argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments.
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(|a| a.into()));
        self
    }

    /// Add an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

impl CompilationBuilder for CommandSpec {
    fn flag(&mut self, s: &str) -> &mut Self {
        self.args.push(s.to_string());
        self
    }

    fn platform(&self) -> ToolchainPlatform {
        self.platform
    }
}
