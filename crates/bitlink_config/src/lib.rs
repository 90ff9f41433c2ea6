//! Bridge configuration
//!
//! A single process-wide setting decides which libraries may be dispatched through
//! their embedded bitcode. Everything else here has a fixed default and is only
//! overridable from a config file.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Environment variable listing the library base names eligible for bitcode dispatch.
pub const BITCODE_LIBS_ENV: &str = "BITLINK_BITCODE_LIBS";

/// Name of the always-needed runtime library whose modules every context gets.
pub const DEFAULT_BASE_LIBRARY: &str = "libbase";

/// Prefix identifying a library's initialization entry point (`init_<library>`).
pub const DEFAULT_INIT_PREFIX: &str = "init_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Library base names enabled for bitcode dispatch. `None` means the setting was
    /// never provided, in which case every library is loaded natively.
    pub bitcode_libs: Option<Vec<String>>,

    /// Base name of the runtime library re-registered into every new context.
    pub base_library: String,

    /// Symbol prefix of library initialization entry points.
    pub init_prefix: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bitcode_libs: None,
            base_library: DEFAULT_BASE_LIBRARY.to_string(),
            init_prefix: DEFAULT_INIT_PREFIX.to_string(),
        }
    }
}

impl BridgeConfig {
    /// Configuration with an explicit eligibility list.
    pub fn with_bitcode_libs<I, S>(libs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            bitcode_libs: Some(libs.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// Load configuration from the environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var(BITCODE_LIBS_ENV) {
            let libs = parse_library_list(&val);
            debug!(env = BITCODE_LIBS_ENV, libraries = ?libs, "bitcode libraries");
            config.bitcode_libs = Some(libs);
        }

        config
    }

    /// Load configuration from a TOML file
    #[cfg(feature = "toml-config")]
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: BridgeConfig = toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Load configuration from a TOML file (stub when toml feature is disabled)
    #[cfg(not(feature = "toml-config"))]
    pub fn from_file(_path: &Path) -> anyhow::Result<Self> {
        anyhow::bail!("TOML support not enabled. Enable the 'toml-config' feature.")
    }

    /// Environment settings take precedence over whatever was loaded before.
    pub fn merge_with_env(mut self) -> Self {
        if let Ok(val) = std::env::var(BITCODE_LIBS_ENV) {
            self.bitcode_libs = Some(parse_library_list(&val));
        }
        self
    }

    /// Whether the eligibility setting was provided at all.
    pub fn is_configured(&self) -> bool {
        self.bitcode_libs.is_some()
    }

    /// Whether `library` (a base name such as `libFoo`) may use its embedded bitcode.
    pub fn is_bitcode_enabled(&self, library: &str) -> bool {
        match &self.bitcode_libs {
            Some(libs) => libs.iter().any(|lib| lib == library),
            None => false,
        }
    }

    /// Whether `symbol` names a library initialization entry point.
    pub fn is_init_symbol(&self, symbol: &str) -> bool {
        symbol.starts_with(&self.init_prefix)
    }

    /// Initialization entry point name for `library`.
    pub fn init_symbol_for(&self, library: &str) -> String {
        format!("{}{library}", self.init_prefix)
    }
}

/// Split a comma separated library list, ignoring blank items.
pub fn parse_library_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
