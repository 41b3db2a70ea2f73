//! Engine configuration.

use std::path::Path;
use std::time::Duration;

use ratchet_resolve::ResolverConfig;
use serde::{Deserialize, Serialize};

/// Errors loading a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid YAML for [`EngineConfig`]
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Configuration for the scheduling engine.
///
/// ```yaml
/// default_check_interval: 1m
/// scheduling_interval: 10s
/// max_candidates_per_input: 100
/// max_search_steps: 100000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Interval for checkables without `check_every`
    #[serde(with = "duration_str")]
    pub default_check_interval: Duration,

    /// Period of the scheduling loop
    #[serde(with = "duration_str")]
    pub scheduling_interval: Duration,

    /// Newest candidates kept per input
    pub max_candidates_per_input: usize,

    /// Candidate attempts before a resolution gives up
    pub max_search_steps: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let resolver = ResolverConfig::default();
        Self {
            default_check_interval: Duration::from_secs(60),
            scheduling_interval: Duration::from_secs(10),
            max_candidates_per_input: resolver.max_candidates_per_input,
            max_search_steps: resolver.max_search_steps,
        }
    }
}

impl EngineConfig {
    /// Parse a YAML document. Missing fields take their defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml(&raw)
    }

    /// Set the default check interval.
    pub fn with_default_check_interval(mut self, interval: Duration) -> Self {
        self.default_check_interval = interval;
        self
    }

    /// Set the scheduling interval.
    pub fn with_scheduling_interval(mut self, interval: Duration) -> Self {
        self.scheduling_interval = interval;
        self
    }

    /// Set the per-input candidate cutoff.
    pub fn with_max_candidates_per_input(mut self, max: usize) -> Self {
        self.max_candidates_per_input = max;
        self
    }

    /// Set the search step cutoff.
    pub fn with_max_search_steps(mut self, max: usize) -> Self {
        self.max_search_steps = max;
        self
    }

    /// Resolver bounds.
    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig::default()
            .with_max_candidates_per_input(self.max_candidates_per_input)
            .with_max_search_steps(self.max_search_steps)
    }
}

/// Durations as `30s`, `5m`, `1h30m` strings.
mod duration_str {
    use std::time::Duration;

    use ratchet_check::parse_duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(*duration))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_duration(&raw).map_err(serde::de::Error::custom)
    }

    pub fn format(duration: Duration) -> String {
        let millis = duration.as_millis();
        let secs = duration.as_secs();
        if millis % 1000 != 0 {
            format!("{}ms", millis)
        } else if secs != 0 && secs % 3600 == 0 {
            format!("{}h", secs / 3600)
        } else if secs != 0 && secs % 60 == 0 {
            format!("{}m", secs / 60)
        } else {
            format!("{}s", secs)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.default_check_interval, Duration::from_secs(60));
        assert_eq!(config.scheduling_interval, Duration::from_secs(10));
        assert_eq!(config.resolver_config(), ResolverConfig::default());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = EngineConfig::from_yaml("default_check_interval: 1h30m\nmax_search_steps: 50\n").unwrap();
        assert_eq!(config.default_check_interval, Duration::from_secs(5400));
        assert_eq!(config.scheduling_interval, Duration::from_secs(10));
        assert_eq!(config.max_search_steps, 50);
        assert_eq!(config.max_candidates_per_input, 100);
    }

    #[test]
    fn test_invalid_duration_rejected() {
        assert!(EngineConfig::from_yaml("scheduling_interval: soon\n").is_err());
    }

    #[test]
    fn test_yaml_output_reads_back() {
        let config = EngineConfig::default()
            .with_scheduling_interval(Duration::from_millis(1500))
            .with_default_check_interval(Duration::from_secs(120));
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(yaml.contains("1500ms"));
        assert!(yaml.contains("2m"));
        assert_eq!(EngineConfig::from_yaml(&yaml).unwrap(), config);
    }

    #[test]
    fn test_load_missing_file() {
        let err = EngineConfig::load("/nonexistent/ratchet.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
