//! Command line argument parsing
//!
//! This module handles CLI argument parsing with subcommands:
//! - `analyze`: Detect a repository's framework and rank platforms
//! - `deploy`: Run one deployment job to completion
//! - `platforms`: List supported platforms and their requirements
//! - `show-config`: Show configuration discovery information

use crate::platform::{DeploymentConfig, Platform, PlatformOptions};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug)]
pub enum ExecutionMode {
    Analyze(AnalyzeConfig),
    Deploy(DeployConfig),
    Platforms { json: bool },
    ShowConfig,
}

#[derive(Debug)]
pub struct AnalyzeConfig {
    pub repo: String,
    pub git_ref: Option<String>,
    pub local_path: Option<PathBuf>,
    pub config_override: Option<PathBuf>,
    pub json: bool,
}

#[derive(Debug)]
pub struct DeployConfig {
    pub repo: String,
    /// Target platform; the analyzer's recommendation is used when unset
    pub platform: Option<Platform>,
    pub local_path: Option<PathBuf>,
    pub environment: Option<String>,
    pub deployment: DeploymentConfig,
    pub config_override: Option<PathBuf>,
    pub prefer_cli: bool,
    pub deadline: Option<Duration>,
}

#[derive(Debug, Parser)]
#[command(name = "shipwright")]
#[command(author = "Shipwright Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Analyze repositories and deploy them to hosting platforms")]
#[command(long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Detect the framework of a repository and score each platform
    Analyze {
        /// Repository as owner/repo or a GitHub URL
        repo: String,
        /// Branch, tag or commit to read manifests from
        #[arg(long = "ref")]
        git_ref: Option<String>,
        /// Read manifests from a local checkout instead of GitHub
        #[arg(short = 'p', long = "path")]
        path: Option<PathBuf>,
        /// Configuration file path
        #[arg(short = 'c', long = "config")]
        config: Option<PathBuf>,
        /// Print the analysis as JSON
        #[arg(long = "json")]
        json: bool,
    },
    /// Deploy a repository and wait for the result
    Deploy {
        /// Repository as owner/repo or a GitHub URL
        repo: String,
        /// Target platform (defaults to the analyzer's recommendation)
        #[arg(short = 't', long = "platform")]
        platform: Option<Platform>,
        /// Local checkout used by CLI-based deployments
        #[arg(short = 'p', long = "path")]
        path: Option<PathBuf>,
        /// Target environment, e.g. production or preview
        #[arg(short = 'e', long = "environment")]
        environment: Option<String>,
        /// Environment variable for the deployment (repeatable)
        #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_key_value)]
        env_vars: Vec<(String, String)>,
        /// Platform option such as account_id or region (repeatable)
        #[arg(short = 'o', long = "option", value_name = "KEY=VALUE", value_parser = parse_key_value)]
        options: Vec<(String, String)>,
        /// Project name on the provider
        #[arg(long = "project-name")]
        project_name: Option<String>,
        /// Branch to deploy
        #[arg(short = 'b', long = "branch")]
        branch: Option<String>,
        /// Framework override
        #[arg(long = "framework")]
        framework: Option<String>,
        /// Build command override
        #[arg(long = "build-command")]
        build_command: Option<String>,
        /// Start command override
        #[arg(long = "start-command")]
        start_command: Option<String>,
        /// Directory inside the repository to deploy
        #[arg(long = "root-directory")]
        root_directory: Option<String>,
        /// Deploy through the provider CLI even when an API token is set
        #[arg(long = "prefer-cli")]
        prefer_cli: bool,
        /// Polling deadline in seconds
        #[arg(long = "timeout", value_name = "SECS")]
        timeout: Option<u64>,
        /// Configuration file path
        #[arg(short = 'c', long = "config")]
        config: Option<PathBuf>,
    },
    /// List supported platforms and their required options
    Platforms {
        /// Print platform descriptors as JSON
        #[arg(long = "json")]
        json: bool,
    },
    /// Show configuration discovery information
    ShowConfig,
}

impl Args {
    pub fn parse() -> Self {
        Parser::parse()
    }

    pub fn mode(self) -> Result<ExecutionMode, String> {
        match self.command {
            Some(Commands::Analyze {
                repo,
                git_ref,
                path,
                config,
                json,
            }) => Ok(ExecutionMode::Analyze(AnalyzeConfig {
                repo,
                git_ref,
                local_path: path,
                config_override: config,
                json,
            })),
            Some(Commands::Deploy {
                repo,
                platform,
                path,
                environment,
                env_vars,
                options,
                project_name,
                branch,
                framework,
                build_command,
                start_command,
                root_directory,
                prefer_cli,
                timeout,
                config,
            }) => {
                let options = match (platform, options.is_empty()) {
                    (_, true) => None,
                    (Some(platform), false) => Some(build_platform_options(platform, &options)?),
                    (None, false) => {
                        return Err("--option requires an explicit --platform".to_string());
                    }
                };

                Ok(ExecutionMode::Deploy(DeployConfig {
                    repo,
                    platform,
                    local_path: path,
                    environment,
                    deployment: DeploymentConfig {
                        env_vars: env_vars.into_iter().collect(),
                        project_name,
                        branch,
                        framework,
                        build_command,
                        start_command,
                        root_directory,
                        options,
                    },
                    config_override: config,
                    prefer_cli,
                    deadline: timeout.map(Duration::from_secs),
                }))
            }
            Some(Commands::Platforms { json }) => Ok(ExecutionMode::Platforms { json }),
            Some(Commands::ShowConfig) => Ok(ExecutionMode::ShowConfig),
            None => Err(
                "No command specified. Use 'shipwright --help' to see available commands."
                    .to_string(),
            ),
        }
    }
}

/// Parse a `KEY=VALUE` argument
pub fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

/// Build typed platform options from `key=value` pairs
pub fn build_platform_options(
    platform: Platform,
    pairs: &[(String, String)],
) -> Result<PlatformOptions, String> {
    let known: Vec<&str> = platform
        .descriptor()
        .fields
        .iter()
        .map(|field| field.name)
        .collect();

    let mut object: BTreeMap<String, serde_json::Value> = BTreeMap::new();
    object.insert("platform".to_string(), platform.as_str().into());
    for (key, value) in pairs {
        if !known.contains(&key.as_str()) {
            return Err(format!(
                "unknown option '{}' for {} (expected one of: {})",
                key,
                platform,
                known.join(", ")
            ));
        }
        object.insert(key.clone(), value.clone().into());
    }

    serde_json::to_value(object)
        .and_then(serde_json::from_value)
        .map_err(|e| format!("invalid options for {}: {}", platform, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("API_URL=https://x.dev/?a=b").unwrap(),
            ("API_URL".to_string(), "https://x.dev/?a=b".to_string())
        );
        assert!(parse_key_value("MISSING").is_err());
        assert!(parse_key_value("=value").is_err());
    }

    #[test]
    fn test_deploy_mode_builds_config() {
        let args = Args::try_parse_from([
            "shipwright",
            "deploy",
            "acme/site",
            "--platform",
            "cloudflare",
            "--env",
            "API_URL=https://api.acme.dev",
            "--option",
            "account_id=abc123",
            "--timeout",
            "60",
        ])
        .unwrap();

        let ExecutionMode::Deploy(config) = args.mode().unwrap() else {
            panic!("expected deploy mode");
        };
        assert_eq!(config.platform, Some(Platform::Cloudflare));
        assert_eq!(config.deadline, Some(Duration::from_secs(60)));
        assert_eq!(
            config.deployment.env_vars.get("API_URL").map(String::as_str),
            Some("https://api.acme.dev")
        );
        assert_eq!(
            config.deployment.options,
            Some(PlatformOptions::Cloudflare {
                account_id: "abc123".to_string()
            })
        );
        config.deployment.validate(Platform::Cloudflare).unwrap();
    }

    #[test]
    fn test_options_need_platform() {
        let args = Args::try_parse_from([
            "shipwright",
            "deploy",
            "acme/site",
            "--option",
            "region=us-east-1",
        ])
        .unwrap();
        assert!(args.mode().is_err());
    }

    #[test]
    fn test_unknown_option_rejected() {
        let err = build_platform_options(
            Platform::Gcp,
            &[("zone".to_string(), "us-central1-a".to_string())],
        )
        .unwrap_err();
        assert!(err.contains("project_id"));
    }

    #[test]
    fn test_analyze_and_misc_modes() {
        let args = Args::try_parse_from(["shipwright", "analyze", "acme/site", "--json"]).unwrap();
        assert!(matches!(args.mode().unwrap(), ExecutionMode::Analyze(AnalyzeConfig { json: true, .. })));

        let args = Args::try_parse_from(["shipwright", "platforms"]).unwrap();
        assert!(matches!(args.mode().unwrap(), ExecutionMode::Platforms { json: false }));

        let args = Args::try_parse_from(["shipwright", "show-config"]).unwrap();
        assert!(matches!(args.mode().unwrap(), ExecutionMode::ShowConfig));
    }
}
