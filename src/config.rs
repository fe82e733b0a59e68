use std::error::Error;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

pub const CONFIG_FILE: &str = "config.toml";
const MAX_WINDOW_MINUTES: u64 = 525_600;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub resolver: ResolverConfig,
    pub detectors: DetectorConfig,
    pub safeguard: SafeguardConfig,
    pub activation: ActivationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ResolverConfig {
    pub resolve_threshold: f64,
    pub ambiguous_threshold: f64,
    pub near_tie_margin: f64,
    pub mismatch_threshold: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            resolve_threshold: 0.85,
            ambiguous_threshold: 0.5,
            near_tie_margin: 0.1,
            mismatch_threshold: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DetectorConfig {
    pub subdirectory_confidence: f64,
    pub depth_cap: usize,
    pub depth_decay: f64,
    pub depth_floor: f64,
    pub git_remote_confidence: f64,
    pub marker_cap: f64,
    pub marker_max_levels: usize,
    pub markers: Vec<String>,
    pub fuzzy_threshold: f64,
    pub fuzzy_cap: f64,
    pub header_scan_lines: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            subdirectory_confidence: 0.9,
            depth_cap: 3,
            depth_decay: 0.05,
            depth_floor: 0.5,
            git_remote_confidence: 0.95,
            marker_cap: 0.8,
            marker_max_levels: 5,
            markers: [
                ".git",
                "Cargo.toml",
                "package.json",
                "pyproject.toml",
                "go.mod",
                ".projctx",
            ]
            .iter()
            .map(|marker| (*marker).to_string())
            .collect(),
            fuzzy_threshold: 0.6,
            fuzzy_cap: 0.85,
            header_scan_lines: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SafeguardConfig {
    pub window_entries: usize,
    /// Zero disables the time window; only `window_entries` applies.
    pub window_minutes: u64,
    pub switch_limit: usize,
    pub mismatch_limit: usize,
    pub validation_error_limit: usize,
}

impl Default for SafeguardConfig {
    fn default() -> Self {
        Self {
            window_entries: 50,
            window_minutes: 60,
            switch_limit: 10,
            mismatch_limit: 5,
            validation_error_limit: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivationRule {
    pub pattern: String,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ActivationConfig {
    pub threshold: f64,
    pub rules: Vec<ActivationRule>,
}

impl Default for ActivationConfig {
    fn default() -> Self {
        let rules = [
            ("parse-prd", 1.0),
            ("parse prd", 1.0),
            ("generate tasks", 0.7),
            ("expand task", 0.5),
            ("requirements", 0.3),
            ("prd", 0.3),
            ("rm -rf", 0.8),
            ("git reset --hard", 0.8),
            ("drop table", 0.8),
            ("delete", 0.4),
            ("overwrite", 0.4),
            ("project", 0.1),
        ];
        Self {
            threshold: 0.5,
            rules: rules
                .iter()
                .map(|(pattern, weight)| ActivationRule {
                    pattern: (*pattern).to_string(),
                    weight: *weight,
                })
                .collect(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Toml(toml::de::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "I/O error reading config: {}", err),
            ConfigError::Toml(err) => write!(f, "invalid config TOML: {}", err),
            ConfigError::Invalid(message) => write!(f, "invalid config: {}", message),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigError::Io(err) => Some(err),
            ConfigError::Toml(err) => Some(err),
            ConfigError::Invalid(_) => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        ConfigError::Io(value)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(value: toml::de::Error) -> Self {
        ConfigError::Toml(value)
    }
}

impl Config {
    /// A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(raw) => Self::from_toml(&raw),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(err.into()),
        }
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let resolver = &self.resolver;
        let detectors = &self.detectors;
        for (field, value) in [
            ("resolver.resolve_threshold", resolver.resolve_threshold),
            ("resolver.ambiguous_threshold", resolver.ambiguous_threshold),
            ("resolver.near_tie_margin", resolver.near_tie_margin),
            ("resolver.mismatch_threshold", resolver.mismatch_threshold),
            (
                "detectors.subdirectory_confidence",
                detectors.subdirectory_confidence,
            ),
            ("detectors.depth_decay", detectors.depth_decay),
            ("detectors.depth_floor", detectors.depth_floor),
            (
                "detectors.git_remote_confidence",
                detectors.git_remote_confidence,
            ),
            ("detectors.marker_cap", detectors.marker_cap),
            ("detectors.fuzzy_threshold", detectors.fuzzy_threshold),
            ("detectors.fuzzy_cap", detectors.fuzzy_cap),
            ("activation.threshold", self.activation.threshold),
        ] {
            require_unit_interval(field, value)?;
        }

        if resolver.ambiguous_threshold > resolver.resolve_threshold {
            return Err(ConfigError::Invalid(format!(
                "resolver.ambiguous_threshold ({}) must not exceed resolver.resolve_threshold ({})",
                resolver.ambiguous_threshold, resolver.resolve_threshold
            )));
        }
        if detectors.depth_floor > detectors.subdirectory_confidence {
            return Err(ConfigError::Invalid(
                "detectors.depth_floor must not exceed detectors.subdirectory_confidence"
                    .to_string(),
            ));
        }
        if self.safeguard.window_minutes > MAX_WINDOW_MINUTES {
            return Err(ConfigError::Invalid(format!(
                "safeguard.window_minutes must not exceed {} (one year)",
                MAX_WINDOW_MINUTES
            )));
        }
        if self.safeguard.window_entries == 0 {
            return Err(ConfigError::Invalid(
                "safeguard.window_entries must be positive".to_string(),
            ));
        }
        if let Some(rule) = self
            .activation
            .rules
            .iter()
            .find(|rule| rule.pattern.trim().is_empty() || !rule.weight.is_finite())
        {
            return Err(ConfigError::Invalid(format!(
                "activation rule '{}' needs a non-empty pattern and a finite weight",
                rule.pattern
            )));
        }
        Ok(())
    }
}

fn require_unit_interval(field: &str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{} must be within [0, 1], got {}",
            field, value
        )))
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::{Config, ConfigError};

    #[test]
    fn defaults_match_documented_thresholds() {
        let config = Config::default();
        assert_eq!(config.resolver.resolve_threshold, 0.85);
        assert_eq!(config.resolver.ambiguous_threshold, 0.5);
        assert_eq!(config.resolver.near_tie_margin, 0.1);
        assert_eq!(config.detectors.fuzzy_threshold, 0.6);
        assert_eq!(config.safeguard.window_entries, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_remaining_defaults() {
        let config = Config::from_toml(
            r#"
[resolver]
resolve_threshold = 0.9

[safeguard]
mismatch_limit = 2
"#,
        )
        .expect("partial config should load");
        assert_eq!(config.resolver.resolve_threshold, 0.9);
        assert_eq!(config.resolver.near_tie_margin, 0.1);
        assert_eq!(config.safeguard.mismatch_limit, 2);
        assert_eq!(config.detectors.depth_cap, 3);
    }

    #[test]
    fn rejects_out_of_range_and_inverted_thresholds() {
        let err = Config::from_toml("[resolver]\nresolve_threshold = 1.5\n")
            .expect_err("out of range should fail");
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = Config::from_toml("[resolver]\nresolve_threshold = 0.4\n")
            .expect_err("ambiguous above resolve should fail");
        assert!(err.to_string().contains("must not exceed"));
    }

    #[test]
    fn rejects_unbounded_time_window() {
        let err = Config::from_toml("[safeguard]\nwindow_minutes = 10000000000\n")
            .expect_err("huge window should fail");
        assert!(err.to_string().contains("safeguard.window_minutes"));
        assert!(Config::from_toml("[safeguard]\nwindow_minutes = 525600\n").is_ok());
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = Config::from_toml("[resolver]\nresolve = 0.9\n").expect_err("unknown key");
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn missing_file_loads_defaults() {
        let path = PathBuf::from("/nonexistent/projctx/config.toml");
        let config = Config::load(&path).expect("missing file is not an error");
        assert_eq!(config, Config::default());
    }
}
