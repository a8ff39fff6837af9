//! Configuration loading and policy construction
//!
//! Configuration is TOML, discovered through a hierarchy (environment
//! variable, XDG config dir, home dotfile, project-local file) with explicit
//! paths winning. Tunable policy constants — the holistic multiplier, the
//! integrity target and tolerance, queue interleave bursts — live here
//! rather than as hard-coded literals.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use log::{debug, info};
use toml::Value;

use crate::queue::QueuePolicy;
use crate::scoring::integrity::IntegrityPolicy;
use crate::scoring::policy::{DetectorRegistry, ScoringPolicy, DEFAULT_SUBJECTIVE_DIMENSIONS};

/// Flattened configuration: section -> key -> value
pub type Configuration = HashMap<String, HashMap<String, String>>;

/// Environment variable naming an explicit config file
const CONFIG_ENV_VAR: &str = "CODELEDGER_CONFIG";

/// Configuration manager with section fallback
pub struct ConfigManager {
    config: Configuration,
    config_file_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Build from an in-memory configuration (primarily for tests)
    pub fn from_config(config: Configuration) -> Self {
        Self {
            config,
            config_file_path: None,
        }
    }

    /// Load configuration using the discovery hierarchy.
    pub fn load() -> Result<Self> {
        for path in discovery_paths() {
            if path.exists() {
                info!("Loading configuration from: {}", path.display());
                return Self::load_from_file(path);
            }
        }
        debug!("No configuration file found; using defaults");
        Ok(Self {
            config: Configuration::new(),
            config_file_path: None,
        })
    }

    /// Load configuration from an explicit file path.
    pub fn load_from_file(path: PathBuf) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = parse_toml_config(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(Self {
            config,
            config_file_path: Some(path),
        })
    }

    pub fn config_file_path(&self) -> Option<&PathBuf> {
        self.config_file_path.as_ref()
    }

    /// Get a value, falling back to the `base` section.
    pub fn get_value(&self, section: &str, key: &str) -> Option<&String> {
        self.config
            .get(section)
            .and_then(|s| s.get(key))
            .or_else(|| self.config.get("base").and_then(|s| s.get(key)))
    }

    pub fn get_bool(&self, section: &str, key: &str) -> Result<Option<bool>> {
        match self.get_value(section, key) {
            Some(value) => match value.to_lowercase().as_str() {
                "true" => Ok(Some(true)),
                "false" => Ok(Some(false)),
                _ => Err(anyhow::anyhow!(
                    "Invalid boolean for {}.{}: {}",
                    section,
                    key,
                    value
                )),
            },
            None => Ok(None),
        }
    }

    pub fn get_f64(&self, section: &str, key: &str) -> Result<Option<f64>> {
        match self.get_value(section, key) {
            Some(value) => value
                .parse::<f64>()
                .map(Some)
                .with_context(|| format!("Invalid number for {}.{}: {}", section, key, value)),
            None => Ok(None),
        }
    }

    pub fn get_u64(&self, section: &str, key: &str) -> Result<Option<u64>> {
        match self.get_value(section, key) {
            Some(value) => value
                .parse::<u64>()
                .map(Some)
                .with_context(|| format!("Invalid integer for {}.{}: {}", section, key, value)),
            None => Ok(None),
        }
    }

    /// Comma-separated list value.
    pub fn get_list(&self, section: &str, key: &str) -> Option<Vec<String>> {
        self.get_value(section, key).map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
    }

    /// Assemble the scoring policy from `[scoring]`.
    pub fn scoring_policy(&self) -> Result<ScoringPolicy> {
        let defaults = ScoringPolicy::default();
        Ok(ScoringPolicy {
            registry: DetectorRegistry::builtin(),
            holistic_multiplier: self
                .get_f64("scoring", "holistic-multiplier")?
                .unwrap_or(defaults.holistic_multiplier),
            subjective_checks: self
                .get_u64("scoring", "subjective-checks")?
                .unwrap_or(defaults.subjective_checks),
            subjective_dimensions: self
                .get_list("scoring", "subjective-dimensions")
                .unwrap_or_else(|| {
                    DEFAULT_SUBJECTIVE_DIMENSIONS
                        .iter()
                        .map(|d| d.to_string())
                        .collect()
                }),
        })
    }

    /// Assemble the integrity policy from `[integrity]`.
    pub fn integrity_policy(&self) -> Result<IntegrityPolicy> {
        let defaults = IntegrityPolicy::default();
        let enabled = self.get_bool("integrity", "enabled")?.unwrap_or(true);
        if !enabled {
            return Ok(IntegrityPolicy {
                target: None,
                tolerance: defaults.tolerance,
            });
        }
        Ok(IntegrityPolicy {
            target: Some(
                self.get_f64("integrity", "target")?
                    .unwrap_or(defaults.target.unwrap_or(95.0)),
            ),
            tolerance: self
                .get_f64("integrity", "tolerance")?
                .unwrap_or(defaults.tolerance),
        })
    }

    /// Assemble the queue policy from `[queue]`.
    pub fn queue_policy(&self) -> Result<QueuePolicy> {
        let defaults = QueuePolicy::default();
        Ok(QueuePolicy {
            subjective_threshold: self
                .get_f64("queue", "subjective-threshold")?
                .unwrap_or(defaults.subjective_threshold),
            objective_burst: self
                .get_u64("queue", "objective-burst")?
                .map(|v| v as usize)
                .unwrap_or(defaults.objective_burst),
            subjective_burst: self
                .get_u64("queue", "subjective-burst")?
                .map(|v| v as usize)
                .unwrap_or(defaults.subjective_burst),
        })
    }
}

/// Discovery paths in order of precedence.
fn discovery_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        paths.push(PathBuf::from(env_path));
    }
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("codeledger").join("config.toml"));
    }
    if let Some(home_dir) = dirs::home_dir() {
        paths.push(home_dir.join(".codeledger.toml"));
    }
    paths.push(PathBuf::from("./.codeledger.toml"));
    debug!("Config discovery paths: {:?}", paths);
    paths
}

/// Parse TOML into the flattened section/key/value map.
///
/// Top-level scalars land in the `base` section; one level of tables becomes
/// named sections.
fn parse_toml_config(content: &str) -> Result<Configuration> {
    let root: Value = content.parse().context("Failed to parse TOML content")?;
    let Value::Table(table) = root else {
        return Ok(Configuration::new());
    };

    let mut config = Configuration::new();
    for (key, value) in table {
        match value {
            Value::Table(section) => {
                let entries = config.entry(key).or_default();
                for (subkey, subvalue) in section {
                    entries.insert(subkey, scalar_to_string(&subvalue));
                }
            }
            scalar => {
                config
                    .entry("base".to_string())
                    .or_default()
                    .insert(key, scalar_to_string(&scalar));
            }
        }
    }
    Ok(config)
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Integer(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Boolean(b) => b.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_sections_and_base() {
        let config = parse_toml_config(
            r#"
quiet = true

[scoring]
holistic-multiplier = 8.0
subjective-checks = 20

[integrity]
target = 90.0
"#,
        )
        .unwrap();

        assert_eq!(config["base"]["quiet"], "true");
        assert_eq!(config["scoring"]["holistic-multiplier"], "8.0");
        assert_eq!(config["integrity"]["target"], "90.0");
    }

    #[test]
    fn test_base_fallback() {
        let file = NamedTempFile::new().unwrap();
        fs::write(&file, "[base]\nlog-format = \"json\"\n").unwrap();
        let manager = ConfigManager::load_from_file(file.path().to_path_buf()).unwrap();
        assert_eq!(manager.get_value("scan", "log-format").unwrap(), "json");
    }

    #[test]
    fn test_default_policies_without_config() {
        let manager = ConfigManager::from_config(Configuration::new());
        let scoring = manager.scoring_policy().unwrap();
        assert_eq!(scoring.holistic_multiplier, 10.0);
        assert_eq!(scoring.subjective_checks, 10);
        assert!(!scoring.subjective_dimensions.is_empty());

        let integrity = manager.integrity_policy().unwrap();
        assert_eq!(integrity.target, Some(95.0));
        assert_eq!(integrity.tolerance, 0.05);

        let queue = manager.queue_policy().unwrap();
        assert_eq!(queue.objective_burst, 3);
        assert_eq!(queue.subjective_threshold, 100.0);
    }

    #[test]
    fn test_policies_from_toml() {
        let file = NamedTempFile::new().unwrap();
        fs::write(
            &file,
            r#"
[scoring]
holistic-multiplier = 5.0
subjective-dimensions = "naming_quality, logic_clarity"

[integrity]
target = 90.0
tolerance = 0.5

[queue]
objective-burst = 2
"#,
        )
        .unwrap();
        let manager = ConfigManager::load_from_file(file.path().to_path_buf()).unwrap();

        let scoring = manager.scoring_policy().unwrap();
        assert_eq!(scoring.holistic_multiplier, 5.0);
        assert_eq!(
            scoring.subjective_dimensions,
            vec!["naming_quality".to_string(), "logic_clarity".to_string()]
        );

        let integrity = manager.integrity_policy().unwrap();
        assert_eq!(integrity.target, Some(90.0));
        assert_eq!(integrity.tolerance, 0.5);

        assert_eq!(manager.queue_policy().unwrap().objective_burst, 2);
    }

    #[test]
    fn test_integrity_disabled() {
        let file = NamedTempFile::new().unwrap();
        fs::write(&file, "[integrity]\nenabled = false\n").unwrap();
        let manager = ConfigManager::load_from_file(file.path().to_path_buf()).unwrap();
        assert_eq!(manager.integrity_policy().unwrap().target, None);
    }

    #[test]
    fn test_invalid_values_error() {
        let file = NamedTempFile::new().unwrap();
        fs::write(&file, "[integrity]\ntarget = \"very high\"\n").unwrap();
        let manager = ConfigManager::load_from_file(file.path().to_path_buf()).unwrap();
        assert!(manager.integrity_policy().is_err());
    }
}
