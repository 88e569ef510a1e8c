//! Configuration file support.
//!
//! Two configuration file locations are read:
//! - Global: `~/.stdshim/config.toml` - User-wide defaults
//! - Project: `<manifest dir>/.stdshim/config.toml` - Project-specific overrides
//!
//! Project config takes precedence over global config, and environment
//! variables take precedence over both:
//!
//! | Variable | Key |
//! |----------|-----|
//! | `STDSHIM_REGISTRY` | `shim.registry` |
//! | `STDSHIM_VERIFY` | `shim.verify_numerics` |
//! | `STDSHIM_TOOLCHAIN` | `shim.toolchain` |

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::builder::toolchain::ToolchainPlatform;

/// Environment variable overriding the registry path.
pub const ENV_REGISTRY: &str = "STDSHIM_REGISTRY";
/// Environment variable toggling numeric verification.
pub const ENV_VERIFY: &str = "STDSHIM_VERIFY";
/// Environment variable overriding the toolchain family.
pub const ENV_TOOLCHAIN: &str = "STDSHIM_TOOLCHAIN";

/// Every environment variable that affects the result.
pub const ENV_VARS: &[&str] = &[ENV_REGISTRY, ENV_VERIFY, ENV_TOOLCHAIN];

/// stdshim configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Shim generation settings
    pub shim: ShimConfig,

    /// Compile probe settings
    pub probe: ProbeConfig,
}

/// Shim generation settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShimConfig {
    /// Registry file replacing the built-in one
    pub registry: Option<PathBuf>,

    /// Verify forwarding definitions numerically (default: true)
    pub verify_numerics: Option<bool>,

    /// Toolchain family override (gcc, clang, apple-clang, msvc)
    pub toolchain: Option<ToolchainPlatform>,

    /// Write `stdshim-report.json` next to the header (default: true)
    pub report: Option<bool>,
}

/// Compile probe settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// C++ compiler used for probing (default: $CXX, then c++/g++/clang++)
    pub cxx: Option<PathBuf>,

    /// Extra arguments passed to every probe compile
    pub args: Vec<String>,
}

impl Config {
    /// Load configuration from a file.
    ///
    /// A relative `shim.registry` is resolved against the directory that
    /// contains the `.stdshim` directory.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        let mut config: Config = toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;

        if let Some(root) = path.parent().and_then(Path::parent) {
            config.shim.registry = config.shim.registry.map(|r| root.join(r));
        }

        Ok(config)
    }

    /// Load configuration, using defaults only if the file doesn't exist.
    ///
    /// A file that exists but cannot be read or parsed is an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::trace!("No config at {}", path.display());
            Ok(Self::default())
        }
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        if other.shim.registry.is_some() {
            self.shim.registry = other.shim.registry;
        }
        if other.shim.verify_numerics.is_some() {
            self.shim.verify_numerics = other.shim.verify_numerics;
        }
        if other.shim.toolchain.is_some() {
            self.shim.toolchain = other.shim.toolchain;
        }
        if other.shim.report.is_some() {
            self.shim.report = other.shim.report;
        }

        if other.probe.cxx.is_some() {
            self.probe.cxx = other.probe.cxx;
        }
        if !other.probe.args.is_empty() {
            self.probe.args = other.probe.args;
        }
    }

    /// Apply environment overrides, reading variables through `var`.
    ///
    /// Empty variables are treated as unset; any other value that does not
    /// parse is an error.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        let var = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        if let Some(registry) = var(ENV_REGISTRY) {
            self.shim.registry = Some(PathBuf::from(registry));
        }
        if let Some(verify) = var(ENV_VERIFY) {
            let verify = parse_bool(&verify).with_context(|| {
                format!("invalid {}={:?}: expected 0/1/true/false", ENV_VERIFY, verify)
            })?;
            self.shim.verify_numerics = Some(verify);
        }
        if let Some(toolchain) = var(ENV_TOOLCHAIN) {
            let toolchain = toolchain
                .trim()
                .parse::<ToolchainPlatform>()
                .with_context(|| format!("invalid {}", ENV_TOOLCHAIN))?;
            self.shim.toolchain = Some(toolchain);
        }
        Ok(())
    }

    /// Whether forwarding definitions are numerically verified.
    pub fn verify_numerics(&self) -> bool {
        self.shim.verify_numerics.unwrap_or(true)
    }

    /// Whether the JSON report is written.
    pub fn report_enabled(&self) -> bool {
        self.shim.report.unwrap_or(true)
    }

    /// The toolchain override, if any.
    pub fn toolchain(&self) -> Option<ToolchainPlatform> {
        self.shim.toolchain
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (.stdshim/config.toml)
/// 2. Global config (~/.stdshim/config.toml)
/// 3. Defaults
pub fn load_config(global_path: Option<&Path>, project_path: &Path) -> Result<Config> {
    let mut config = Config::default();

    // Load global config first
    if let Some(global_path) = global_path {
        config.merge(Config::load_or_default(global_path)?);
    }

    // Project config overrides global
    config.merge(Config::load_or_default(project_path)?);

    Ok(config)
}

/// Load configuration for a project, including environment overrides.
pub fn discover(project_root: &Path) -> Result<Config> {
    let global = global_config_path();
    let mut config = load_config(global.as_deref(), &project_config_path(project_root))?;
    config.apply_env(|key| std::env::var(key).ok())?;
    Ok(config)
}

/// Get the global stdshim config directory (~/.stdshim).
pub fn global_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".stdshim"))
}

/// Get the global config path (~/.stdshim/config.toml).
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the project config path (.stdshim/config.toml).
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(".stdshim").join("config.toml")
}
