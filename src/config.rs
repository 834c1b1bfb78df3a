//! Configuration discovery and loading
//!
//! This module handles the configuration discovery hierarchy:
//! 1. Current directory: ./shipwright.toml or ./.shipwright/config.toml
//! 2. User config: ~/.shipwright/config.toml
//! 3. System config: /etc/shipwright/config.toml
//! 4. Built-in defaults
//!
//! API base URLs can then be overridden from the environment.

use crate::analyzer::AnalyzerConfig;
use crate::deployment::OrchestratorConfig;
use crate::env;
use serde::{Deserialize, Serialize};
use std::env as std_env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid TOML in {path:?}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("Could not determine home directory")]
    NoHomeDir,
}

/// Settings for the platform adapters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformsConfig {
    pub vercel_api_url: String,
    pub netlify_api_url: String,
    /// Deploy through the provider CLI even when an API token is available
    pub prefer_cli: bool,
    pub request_timeout: Duration,
    /// Upper bound for a single CLI deploy command
    pub command_timeout: Duration,
}

impl Default for PlatformsConfig {
    fn default() -> Self {
        Self {
            vercel_api_url: env::endpoints::VERCEL_API_URL.to_string(),
            netlify_api_url: env::endpoints::NETLIFY_API_URL.to_string(),
            prefer_cli: false,
            request_timeout: Duration::from_secs(30),
            command_timeout: Duration::from_secs(900),
        }
    }
}

/// Top-level configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShipwrightConfig {
    pub analyzer: AnalyzerConfig,
    pub orchestrator: OrchestratorConfig,
    pub platforms: PlatformsConfig,
}

impl ShipwrightConfig {
    pub fn from_toml_str(content: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Load from TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content, path)
    }

    /// Save to TOML file
    pub fn to_toml_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply API base URL overrides read through `lookup`
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let targets = [
            (env::vars::GITHUB_API_URL, &mut self.analyzer.github_api_url),
            (env::vars::VERCEL_API_URL, &mut self.platforms.vercel_api_url),
            (env::vars::NETLIFY_API_URL, &mut self.platforms.netlify_api_url),
        ];

        for (var, target) in targets {
            if let Some(value) = lookup(var).filter(|value| !value.trim().is_empty()) {
                debug!("{} overrides {} with {}", var, target, value);
                *target = value.trim().to_string();
            }
        }
    }

    /// Reject settings that would make the orchestrator or analyzer misbehave
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("analyzer.github_api_url", &self.analyzer.github_api_url),
            ("platforms.vercel_api_url", &self.platforms.vercel_api_url),
            ("platforms.netlify_api_url", &self.platforms.netlify_api_url),
        ] {
            Url::parse(value)
                .map_err(|e| ConfigError::Invalid(format!("{} '{}': {}", name, value, e)))?;
        }

        if self.analyzer.manifest_paths.is_empty() {
            return Err(ConfigError::Invalid(
                "analyzer.manifest_paths must list at least one path".to_string(),
            ));
        }

        for (name, policy) in [
            ("orchestrator.submit_backoff", &self.orchestrator.submit_backoff),
            ("orchestrator.poll_backoff", &self.orchestrator.poll_backoff),
        ] {
            if policy.max_attempts == 0 {
                return Err(ConfigError::Invalid(format!(
                    "{}.max_attempts must be at least 1",
                    name
                )));
            }
            if !policy.multiplier.is_finite() || policy.multiplier < 1.0 {
                return Err(ConfigError::Invalid(format!(
                    "{}.multiplier must be a finite value >= 1.0",
                    name
                )));
            }
        }

        if self.orchestrator.poll_deadline.is_zero() {
            return Err(ConfigError::Invalid(
                "orchestrator.poll_deadline must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// Configuration discovery system
pub struct ConfigDiscovery;

impl ConfigDiscovery {
    /// Discover and load configuration using the hierarchy, then apply
    /// environment overrides
    pub fn discover_config() -> Result<ShipwrightConfig, ConfigError> {
        let mut config = match Self::find_config_file() {
            Some(config_path) => {
                info!("Loading configuration from: {:?}", config_path);
                ShipwrightConfig::from_toml_file(config_path)?
            }
            None => {
                info!("No configuration file found, using defaults");
                ShipwrightConfig::default()
            }
        };

        config.apply_env_overrides(|name| std_env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Find configuration file using discovery hierarchy
    pub fn find_config_file() -> Option<PathBuf> {
        Self::first_existing(&Self::config_candidates())
    }

    fn first_existing(candidates: &[PathBuf]) -> Option<PathBuf> {
        for candidate in candidates {
            debug!("Checking for config file: {:?}", candidate);
            if candidate.is_file() {
                debug!("Found config file: {:?}", candidate);
                return Some(candidate.clone());
            }
        }

        debug!("No config file found in discovery hierarchy");
        None
    }

    /// List of configuration file candidates in priority order
    pub fn config_candidates() -> Vec<PathBuf> {
        Self::candidates_for(std_env::current_dir().ok().as_deref(), Self::home_dir().as_deref())
    }

    fn candidates_for(current_dir: Option<&Path>, home_dir: Option<&Path>) -> Vec<PathBuf> {
        let mut candidates = Vec::new();

        if let Some(current_dir) = current_dir {
            candidates.push(env::root_config_file_path(current_dir));
            candidates.push(env::local_config_file_path(current_dir));
        }

        if let Some(home_dir) = home_dir {
            candidates.push(env::user_config_file_path(home_dir));
        }

        #[cfg(unix)]
        candidates.push(PathBuf::from(env::SYSTEM_CONFIG_FILE_PATH));

        candidates
    }

    fn home_dir() -> Option<PathBuf> {
        std_env::var("HOME")
            .ok()
            .or_else(|| std_env::var("USERPROFILE").ok())
            .map(PathBuf::from)
    }

    /// Create a default config file in the user's home directory
    pub fn create_default_user_config() -> Result<PathBuf, ConfigError> {
        let home_dir = Self::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Self::create_default_config_in(&home_dir)
    }

    pub fn create_default_config_in(home_dir: &Path) -> Result<PathBuf, ConfigError> {
        let config_dir = env::user_config_dir_path(home_dir);
        let config_path = env::user_config_file_path(home_dir);

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir).map_err(|source| ConfigError::Write {
                path: config_dir.clone(),
                source,
            })?;
            info!("Created configuration directory: {:?}", config_dir);
        }

        if config_path.exists() {
            warn!("Configuration file already exists: {:?}", config_path);
        } else {
            ShipwrightConfig::default().to_toml_file(&config_path)?;
            info!("Created default configuration file: {:?}", config_path);
        }

        Ok(config_path)
    }

    /// Human-readable description of the discovery hierarchy
    pub fn discovery_report() -> String {
        let candidates = Self::config_candidates();
        let mut report = String::from("Configuration Discovery Hierarchy:\n\n");

        for (i, candidate) in candidates.iter().enumerate() {
            let status = if candidate.is_file() {
                "✓ EXISTS"
            } else if candidate.exists() {
                "✗ NOT A FILE"
            } else {
                "✗ NOT FOUND"
            };
            report.push_str(&format!("  {}. {:?} - {}\n", i + 1, candidate, status));
        }

        report.push('\n');
        match Self::first_existing(&candidates) {
            Some(found) => report.push_str(&format!("Active configuration: {:?}\n", found)),
            None => report.push_str("Active configuration: Built-in defaults\n"),
        }
        report
    }
}
