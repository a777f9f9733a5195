//! Runtime configuration types.

use std::fs;
use std::path::Path;

use serde::Deserialize;

/// Errors raised while loading a [`RuntimeConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Runtime configuration for the VM
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Maximum call depth. The value stack holds `frames_max * 256` slots.
    pub frames_max: usize,
    /// Whether GC is enabled (default: true)
    pub gc_enabled: bool,
    /// Collect before every allocation
    pub gc_stress: bool,
    /// Bytes allocated before the first collection
    pub gc_initial_threshold: usize,
    /// Lower bound for the threshold computed after a collection
    pub gc_min_threshold: usize,
    /// Next threshold = live bytes * growth factor
    pub gc_growth_factor: usize,
    /// Log a collection summary when the VM is dropped
    pub gc_stats: bool,
    /// Log every executed instruction together with the stack
    pub trace_execution: bool,
}

impl RuntimeConfig {
    /// Slots available per call frame on the value stack.
    pub const SLOTS_PER_FRAME: usize = 256;

    pub fn stack_max(&self) -> usize {
        self.frames_max * Self::SLOTS_PER_FRAME
    }

    /// Parse a configuration from TOML text. Missing keys keep their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Configuration that collects on every allocation.
    pub fn stress() -> Self {
        Self {
            gc_stress: true,
            ..Self::default()
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            frames_max: 64,
            gc_enabled: true,
            gc_stress: false,
            gc_initial_threshold: 1024 * 1024,
            gc_min_threshold: 1024 * 1024,
            gc_growth_factor: 2,
            gc_stats: false,
            trace_execution: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.frames_max, 64);
        assert_eq!(config.stack_max(), 64 * 256);
        assert!(config.gc_enabled);
        assert!(!config.gc_stress);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RuntimeConfig::from_toml_str("gc_stress = true\nframes_max = 8\n").unwrap();
        assert!(config.gc_stress);
        assert_eq!(config.frames_max, 8);
        assert_eq!(config.gc_growth_factor, 2);
    }

    #[test]
    fn test_invalid_toml() {
        let err = RuntimeConfig::from_toml_str("frames_max = \"many\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "gc_stats = true").unwrap();
        writeln!(file, "gc_initial_threshold = 4096").unwrap();

        let config = RuntimeConfig::load(file.path()).unwrap();
        assert!(config.gc_stats);
        assert_eq!(config.gc_initial_threshold, 4096);
    }

    #[test]
    fn test_load_missing_file() {
        let err = RuntimeConfig::load(Path::new("/nonexistent/loxvm.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
