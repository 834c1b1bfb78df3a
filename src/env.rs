//! Environment constants and path utilities for shipwright.
//!
//! This module centralizes hardcoded paths, default endpoints and environment
//! variable names so they can be changed in one place.

use std::path::{Path, PathBuf};

/// Main application directory name (hidden directory like .git, .vscode)
pub const SHIPWRIGHT_DIR_NAME: &str = ".shipwright";

/// Configuration file name inside the application directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Configuration file name looked up in the current directory
pub const LOCAL_CONFIG_FILE_NAME: &str = "shipwright.toml";

/// System-wide configuration file
pub const SYSTEM_CONFIG_FILE_PATH: &str = "/etc/shipwright/config.toml";

/// Upstream API endpoints used when no override is configured
pub mod endpoints {
    pub const GITHUB_API_URL: &str = "https://api.github.com";
    pub const VERCEL_API_URL: &str = "https://api.vercel.com";
    pub const NETLIFY_API_URL: &str = "https://api.netlify.com/api/v1";
}

/// Environment variables consumed at startup
pub mod vars {
    pub const GITHUB_API_URL: &str = "GITHUB_API_URL";
    pub const VERCEL_API_URL: &str = "VERCEL_API_URL";
    pub const NETLIFY_API_URL: &str = "NETLIFY_API_URL";

    pub const GITHUB_TOKEN: &str = "GITHUB_TOKEN";
    pub const VERCEL_TOKEN: &str = "VERCEL_TOKEN";
    pub const NETLIFY_TOKEN: &str = "NETLIFY_AUTH_TOKEN";
    pub const CLOUDFLARE_TOKEN: &str = "CLOUDFLARE_API_TOKEN";
    pub const AWS_TOKEN: &str = "AWS_ACCESS_KEY_ID";
    pub const AZURE_TOKEN: &str = "AZURE_CLIENT_SECRET";
    pub const GCP_TOKEN: &str = "GCP_ACCESS_TOKEN";
}

/// Manifest lookup locations
pub mod manifest {
    /// Primary manifest path at the repository root
    pub const PRIMARY_PATH: &str = "package.json";

    /// Nested locations probed in order when the root has no manifest
    pub const FALLBACK_PATHS: &[&str] = &[
        "frontend/package.json",
        "client/package.json",
        "web/package.json",
        "app/package.json",
    ];
}

/// Build the main .shipwright directory path from a base directory
pub fn shipwright_dir_path(base: &Path) -> PathBuf {
    base.join(SHIPWRIGHT_DIR_NAME)
}

/// Build the config path inside a project's .shipwright directory
pub fn local_config_file_path(workspace_root: &Path) -> PathBuf {
    shipwright_dir_path(workspace_root).join(CONFIG_FILE_NAME)
}

/// Build the `shipwright.toml` path in a directory
pub fn root_config_file_path(dir: &Path) -> PathBuf {
    dir.join(LOCAL_CONFIG_FILE_NAME)
}

/// Build the user config directory path (~/.shipwright)
pub fn user_config_dir_path(home_dir: &Path) -> PathBuf {
    shipwright_dir_path(home_dir)
}

/// Build the user config file path (~/.shipwright/config.toml)
pub fn user_config_file_path(home_dir: &Path) -> PathBuf {
    user_config_dir_path(home_dir).join(CONFIG_FILE_NAME)
}
