//! Compiler configuration
//!
//! A small TOML file (`ctc.toml` by default) tunes the surface behavior of
//! the binary: how many diagnostics a phase flush prints, whether warnings
//! fail the build, and which intermediate forms to dump. A missing file
//! means defaults; a malformed one is a user error.

use serde::Deserialize;
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompilerConfig {
    /// Most messages a single phase flush will print
    pub report_limit: usize,
    /// Treat a build with warnings as failed
    pub werror: bool,
    pub dump: DumpConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DumpConfig {
    /// Dump the resolved tree IR to stdout
    pub tree: bool,
    /// Dump the lowered SSA to stdout
    pub ssa: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            report_limit: 20,
            werror: false,
            dump: DumpConfig::default(),
        }
    }
}

impl CompilerConfig {
    /// Load from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::parse(&text)
    }

    /// Parse TOML text
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(ConfigError::Parse)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "cannot read config: {}", e),
            ConfigError::Parse(e) => write!(f, "cannot parse config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CompilerConfig::default();
        assert_eq!(config.report_limit, 20);
        assert!(!config.werror);
        assert!(!config.dump.tree);
        assert!(!config.dump.ssa);
    }

    #[test]
    fn test_parse_overrides() {
        let config = CompilerConfig::parse(
            r#"
            report_limit = 5
            werror = true

            [dump]
            tree = true
            ssa = true
            "#,
        )
        .unwrap();
        assert_eq!(config.report_limit, 5);
        assert!(config.werror);
        assert!(config.dump.tree);
        assert!(config.dump.ssa);
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        assert!(CompilerConfig::parse("optimize = 3").is_err());
        assert!(CompilerConfig::parse("[dump]\nhlir = true").is_err());
    }
}
