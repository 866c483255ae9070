//! Bootstrap run configuration
//!
//! Two YAML documents drive a run:
//! - `BootstrapConfig` (scheduler knobs: concurrency, timeouts, checkpoint TTL)
//! - `DimensionCatalog` (which dimensions exist and how they are tiered), see [`io`]
//!
//! Both use a versioned schema (`version: 1`).
//!
//! ```rust,ignore
//! let config = BootstrapConfig::from_yaml("bootstrap.yaml")?;
//! let catalog = DimensionCatalog::from_yaml("dimensions.yaml")?;
//! ```

pub mod error;
pub mod io;

pub use error::{ConfigError, ConfigResult};
pub use io::{CatalogFileV1, ConfigFileV1, DimensionCatalog, DimensionEntry};

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const SUPPORTED_VERSIONS: &[u32] = &[1];

/// Upper bound when `concurrency = 0` resolves from the core count.
const AUTO_CONCURRENCY_CAP: usize = 8;

/// How the tiers are walked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Tiers in order, dimensions inside a tier concurrently (bounded).
    #[default]
    Tiered,
    /// One dimension at a time, tier by tier.
    Sequential,
}

impl ExecutionMode {
    pub fn from_str(s: &str) -> ConfigResult<Self> {
        match s.to_lowercase().as_str() {
            "tiered" => Ok(Self::Tiered),
            "sequential" => Ok(Self::Sequential),
            _ => Err(ConfigError::UnknownMode(s.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tiered => "tiered",
            Self::Sequential => "sequential",
        }
    }
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BootstrapConfig {
    /// Max dimensions running at once inside a tier (0=auto, 1..=64)
    pub concurrency: usize,

    /// Tiered (parallel within tier) or strictly sequential
    pub mode: ExecutionMode,

    /// Explorer deadline per dimension (1..=3600)
    pub explore_timeout_secs: u64,

    /// Formatter deadline per dimension (1..=3600)
    pub format_timeout_secs: u64,

    /// Analysis text shorter than this skips the Format phase
    pub min_analysis_chars: usize,

    /// Checkpoint freshness window (60..=86400)
    pub checkpoint_ttl_secs: u64,

    /// Max chars of analysis text kept in a fallback digest summary
    pub digest_summary_chars: usize,

    /// `created_by` stamp on emitted artifacts
    pub artifact_created_by: String,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            mode: ExecutionMode::Tiered,
            explore_timeout_secs: 180,
            format_timeout_secs: 120,
            min_analysis_chars: 100,
            checkpoint_ttl_secs: 3600,
            digest_summary_chars: 500,
            artifact_created_by: "bootstrap".to_string(),
        }
    }
}

impl BootstrapConfig {
    /// Validate configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.concurrency > 64 {
            return Err(ConfigError::range_with_hint(
                "concurrency",
                self.concurrency,
                0,
                64,
                "Concurrency must be reasonable (0=auto)",
            ));
        }

        for (field, value) in [
            ("explore_timeout_secs", self.explore_timeout_secs),
            ("format_timeout_secs", self.format_timeout_secs),
        ] {
            if !(1..=3600).contains(&value) {
                return Err(ConfigError::range_with_hint(
                    field,
                    value,
                    1,
                    3600,
                    "Agent phases need a finite deadline of at most one hour",
                ));
            }
        }

        if !(60..=86_400).contains(&self.checkpoint_ttl_secs) {
            return Err(ConfigError::range_with_hint(
                "checkpoint_ttl_secs",
                self.checkpoint_ttl_secs,
                60,
                86_400,
                "Checkpoints older than a day are never useful for resume",
            ));
        }

        if self.digest_summary_chars == 0 {
            return Err(ConfigError::range_with_hint(
                "digest_summary_chars",
                self.digest_summary_chars,
                1,
                usize::MAX,
                "Fallback digests need a non-empty summary",
            ));
        }

        Ok(())
    }

    /// Resolved permit count for the tier semaphore
    pub fn effective_concurrency(&self) -> usize {
        if self.concurrency == 0 {
            num_cpus::get().clamp(1, AUTO_CONCURRENCY_CAP)
        } else {
            self.concurrency
        }
    }

    pub fn explore_timeout(&self) -> Duration {
        Duration::from_secs(self.explore_timeout_secs)
    }

    pub fn format_timeout(&self) -> Duration {
        Duration::from_secs(self.format_timeout_secs)
    }

    pub fn checkpoint_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.checkpoint_ttl_secs as i64)
    }

    /// Load from a YAML file (`version: 1`)
    pub fn from_yaml(path: impl AsRef<std::path::Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> ConfigResult<Self> {
        let file: ConfigFileV1 = serde_yaml::from_str(content)?;
        check_version(file.version)?;

        let config = file.config.unwrap_or_default();
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> ConfigResult<String> {
        let file = ConfigFileV1 {
            version: Some(1),
            config: Some(self.clone()),
        };
        serde_yaml::to_string(&file).map_err(ConfigError::Yaml)
    }
}

pub(crate) fn check_version(version: Option<u32>) -> ConfigResult<()> {
    match version {
        None => Err(ConfigError::MissingVersion),
        Some(v) if SUPPORTED_VERSIONS.contains(&v) => Ok(()),
        Some(found) => Err(ConfigError::UnsupportedVersion {
            found,
            supported: SUPPORTED_VERSIONS.to_vec(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config_is_valid() {
        let config = BootstrapConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.explore_timeout(), Duration::from_secs(180));
        assert_eq!(config.format_timeout(), Duration::from_secs(120));
        assert_eq!(config.min_analysis_chars, 100);
        assert_eq!(config.checkpoint_ttl(), chrono::Duration::hours(1));
    }

    #[test]
    fn test_auto_concurrency_is_bounded() {
        let config = BootstrapConfig {
            concurrency: 0,
            ..Default::default()
        };
        let n = config.effective_concurrency();
        assert!(n >= 1);
        assert!(n <= AUTO_CONCURRENCY_CAP);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let config = BootstrapConfig {
            concurrency: 65,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Range { .. })));

        let config = BootstrapConfig {
            format_timeout_secs: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Range { .. })));

        let config = BootstrapConfig {
            checkpoint_ttl_secs: 10,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Range { .. })));
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = BootstrapConfig {
            concurrency: 2,
            mode: ExecutionMode::Sequential,
            ..Default::default()
        };

        let yaml = config.to_yaml().unwrap();
        assert!(yaml.contains("version: 1"));
        assert!(yaml.contains("mode: sequential"));

        let parsed = BootstrapConfig::from_yaml_str(&yaml).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_yaml_partial_overrides_keep_defaults() {
        let yaml_content = r#"
version: 1
config:
  concurrency: 5
  explore_timeout_secs: 60
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(yaml_content.as_bytes()).unwrap();

        let config = BootstrapConfig::from_yaml(temp_file.path()).unwrap();
        assert_eq!(config.concurrency, 5);
        assert_eq!(config.explore_timeout_secs, 60);
        assert_eq!(config.format_timeout_secs, 120);
        assert_eq!(config.mode, ExecutionMode::Tiered);
    }

    #[test]
    fn test_yaml_missing_version() {
        let result = BootstrapConfig::from_yaml_str("config:\n  concurrency: 2\n");
        assert!(matches!(result, Err(ConfigError::MissingVersion)));
    }

    #[test]
    fn test_yaml_unsupported_version() {
        let result = BootstrapConfig::from_yaml_str("version: 2\n");
        assert!(matches!(
            result,
            Err(ConfigError::UnsupportedVersion { found: 2, .. })
        ));
    }

    #[test]
    fn test_yaml_unknown_field_rejected() {
        let result = BootstrapConfig::from_yaml_str("version: 1\nconfig:\n  concurency: 2\n");
        assert!(matches!(result, Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn test_execution_mode_parse() {
        assert_eq!(
            ExecutionMode::from_str("Sequential").unwrap(),
            ExecutionMode::Sequential
        );
        assert!(matches!(
            ExecutionMode::from_str("parallel"),
            Err(ConfigError::UnknownMode(_))
        ));
    }
}
