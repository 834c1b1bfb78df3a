use crate::deployment::types::ErrorKind;
use crate::env;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

static ENV_VAR_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Z_][A-Z0-9_]*$").unwrap_or_else(|e| panic!("invalid env var regex: {e}"))
});

/// Supported hosting platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Vercel,
    Netlify,
    Cloudflare,
    Aws,
    Azure,
    Gcp,
}

impl Platform {
    pub const ALL: [Platform; 6] = [
        Platform::Vercel,
        Platform::Netlify,
        Platform::Cloudflare,
        Platform::Aws,
        Platform::Azure,
        Platform::Gcp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Vercel => "vercel",
            Platform::Netlify => "netlify",
            Platform::Cloudflare => "cloudflare",
            Platform::Aws => "aws",
            Platform::Azure => "azure",
            Platform::Gcp => "gcp",
        }
    }

    /// Static description of the platform: endpoints, credentials, CLI and fields
    pub fn descriptor(&self) -> &'static PlatformDescriptor {
        match self {
            Platform::Vercel => &VERCEL,
            Platform::Netlify => &NETLIFY,
            Platform::Cloudflare => &CLOUDFLARE,
            Platform::Aws => &AWS,
            Platform::Azure => &AZURE,
            Platform::Gcp => &GCP,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = AdapterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "vercel" => Ok(Platform::Vercel),
            "netlify" => Ok(Platform::Netlify),
            "cloudflare" | "cloudflare-pages" => Ok(Platform::Cloudflare),
            "aws" | "amplify" => Ok(Platform::Aws),
            "azure" => Ok(Platform::Azure),
            "gcp" | "google" | "cloud-run" => Ok(Platform::Gcp),
            other => Err(AdapterError::Validation(format!(
                "unsupported platform '{}'",
                other
            ))),
        }
    }
}

/// A platform-specific configuration field
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub required: bool,
    pub description: &'static str,
}

/// Static per-platform metadata
#[derive(Debug)]
pub struct PlatformDescriptor {
    pub platform: Platform,
    pub display_name: &'static str,
    /// Default REST API base URL, if the platform has a first-class HTTP adapter
    pub api_base_url: Option<&'static str>,
    pub token_env_var: &'static str,
    pub cli_program: &'static str,
    /// Package passed to `npx` when the CLI program is not installed
    pub npx_package: Option<&'static str>,
    pub dashboard_url: &'static str,
    pub fields: &'static [FieldSpec],
}

static VERCEL: PlatformDescriptor = PlatformDescriptor {
    platform: Platform::Vercel,
    display_name: "Vercel",
    api_base_url: Some(env::endpoints::VERCEL_API_URL),
    token_env_var: env::vars::VERCEL_TOKEN,
    cli_program: "vercel",
    npx_package: Some("vercel"),
    dashboard_url: "https://vercel.com/dashboard",
    fields: &[FieldSpec {
        name: "team_id",
        required: false,
        description: "Team scope for projects owned by a team",
    }],
};

static NETLIFY: PlatformDescriptor = PlatformDescriptor {
    platform: Platform::Netlify,
    display_name: "Netlify",
    api_base_url: Some(env::endpoints::NETLIFY_API_URL),
    token_env_var: env::vars::NETLIFY_TOKEN,
    cli_program: "netlify",
    npx_package: Some("netlify-cli"),
    dashboard_url: "https://app.netlify.com",
    fields: &[FieldSpec {
        name: "site_id",
        required: false,
        description: "Existing site to build instead of looking one up by name",
    }],
};

static CLOUDFLARE: PlatformDescriptor = PlatformDescriptor {
    platform: Platform::Cloudflare,
    display_name: "Cloudflare Pages",
    api_base_url: None,
    token_env_var: env::vars::CLOUDFLARE_TOKEN,
    cli_program: "wrangler",
    npx_package: Some("wrangler"),
    dashboard_url: "https://dash.cloudflare.com",
    fields: &[FieldSpec {
        name: "account_id",
        required: true,
        description: "Cloudflare account that owns the Pages project",
    }],
};

static AWS: PlatformDescriptor = PlatformDescriptor {
    platform: Platform::Aws,
    display_name: "AWS Amplify",
    api_base_url: None,
    token_env_var: env::vars::AWS_TOKEN,
    cli_program: "amplify",
    npx_package: Some("@aws-amplify/cli"),
    dashboard_url: "https://console.aws.amazon.com/amplify/home",
    fields: &[
        FieldSpec {
            name: "region",
            required: true,
            description: "AWS region hosting the app",
        },
        FieldSpec {
            name: "app_id",
            required: false,
            description: "Existing Amplify app id",
        },
    ],
};

static AZURE: PlatformDescriptor = PlatformDescriptor {
    platform: Platform::Azure,
    display_name: "Azure Static Web Apps",
    api_base_url: None,
    token_env_var: env::vars::AZURE_TOKEN,
    cli_program: "swa",
    npx_package: Some("@azure/static-web-apps-cli"),
    dashboard_url: "https://portal.azure.com",
    fields: &[
        FieldSpec {
            name: "resource_group",
            required: true,
            description: "Resource group containing the app",
        },
        FieldSpec {
            name: "app_name",
            required: true,
            description: "Static Web App name",
        },
    ],
};

static GCP: PlatformDescriptor = PlatformDescriptor {
    platform: Platform::Gcp,
    display_name: "Google Cloud Run",
    api_base_url: None,
    token_env_var: env::vars::GCP_TOKEN,
    cli_program: "gcloud",
    npx_package: None,
    dashboard_url: "https://console.cloud.google.com/run",
    fields: &[
        FieldSpec {
            name: "project_id",
            required: true,
            description: "GCP project id",
        },
        FieldSpec {
            name: "region",
            required: true,
            description: "Cloud Run region",
        },
    ],
};

/// Platform-specific options, one variant per platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "platform", rename_all = "lowercase")]
pub enum PlatformOptions {
    Vercel {
        team_id: Option<String>,
    },
    Netlify {
        site_id: Option<String>,
    },
    Cloudflare {
        account_id: String,
    },
    Aws {
        region: String,
        app_id: Option<String>,
    },
    Azure {
        resource_group: String,
        app_name: String,
    },
    Gcp {
        project_id: String,
        region: String,
    },
}

impl PlatformOptions {
    pub fn platform(&self) -> Platform {
        match self {
            PlatformOptions::Vercel { .. } => Platform::Vercel,
            PlatformOptions::Netlify { .. } => Platform::Netlify,
            PlatformOptions::Cloudflare { .. } => Platform::Cloudflare,
            PlatformOptions::Aws { .. } => Platform::Aws,
            PlatformOptions::Azure { .. } => Platform::Azure,
            PlatformOptions::Gcp { .. } => Platform::Gcp,
        }
    }

    /// Values of the required fields, paired with their names
    fn required_values(&self) -> Vec<(&'static str, &str)> {
        match self {
            PlatformOptions::Vercel { .. } | PlatformOptions::Netlify { .. } => Vec::new(),
            PlatformOptions::Cloudflare { account_id } => vec![("account_id", account_id)],
            PlatformOptions::Aws { region, .. } => vec![("region", region)],
            PlatformOptions::Azure {
                resource_group,
                app_name,
            } => vec![("resource_group", resource_group), ("app_name", app_name)],
            PlatformOptions::Gcp { project_id, region } => {
                vec![("project_id", project_id), ("region", region)]
            }
        }
    }

    /// Check the options against the platform they are used with
    pub fn validate(&self, platform: Platform) -> Result<(), AdapterError> {
        if self.platform() != platform {
            return Err(AdapterError::Validation(format!(
                "options for {} supplied to a {} deployment",
                self.platform(),
                platform
            )));
        }
        for (name, value) in self.required_values() {
            if value.trim().is_empty() {
                return Err(AdapterError::Validation(format!(
                    "{} requires a non-empty '{}'",
                    platform.descriptor().display_name,
                    name
                )));
            }
        }
        Ok(())
    }
}

/// User-supplied deployment configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    #[serde(default)]
    pub env_vars: BTreeMap<String, String>,
    pub project_name: Option<String>,
    pub branch: Option<String>,
    pub framework: Option<String>,
    pub build_command: Option<String>,
    pub start_command: Option<String>,
    pub root_directory: Option<String>,
    pub options: Option<PlatformOptions>,
}

impl DeploymentConfig {
    /// Validate the configuration for a target platform
    pub fn validate(&self, platform: Platform) -> Result<(), AdapterError> {
        for name in self.env_vars.keys() {
            if !is_valid_env_var_name(name) {
                return Err(AdapterError::Validation(format!(
                    "invalid environment variable name '{}': must match ^[A-Z_][A-Z0-9_]*$",
                    name
                )));
            }
        }

        if let Some(name) = &self.project_name
            && name.trim().is_empty()
        {
            return Err(AdapterError::Validation(
                "project name must not be empty".to_string(),
            ));
        }

        match &self.options {
            Some(options) => options.validate(platform),
            None => {
                let missing: Vec<&str> = platform
                    .descriptor()
                    .fields
                    .iter()
                    .filter(|field| field.required)
                    .map(|field| field.name)
                    .collect();
                if missing.is_empty() {
                    Ok(())
                } else {
                    Err(AdapterError::Validation(format!(
                        "{} requires options: {}",
                        platform.descriptor().display_name,
                        missing.join(", ")
                    )))
                }
            }
        }
    }
}

pub fn is_valid_env_var_name(name: &str) -> bool {
    ENV_VAR_NAME.is_match(name)
}

/// Everything an adapter needs to start a deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub job_id: uuid::Uuid,
    pub repo_url: String,
    pub repo_path: Option<String>,
    pub config: DeploymentConfig,
}

impl SubmitRequest {
    /// Project name to use on the provider, derived from the repository if unset
    pub fn project_name(&self) -> String {
        if let Some(name) = &self.config.project_name {
            return name.clone();
        }
        self.repo_url
            .trim_end_matches('/')
            .trim_end_matches(".git")
            .rsplit(['/', ':'])
            .next()
            .filter(|segment| !segment.is_empty())
            .map(|segment| segment.to_lowercase())
            .unwrap_or_else(|| format!("deploy-{}", self.job_id.simple()))
    }

    /// `owner/repo` slug for GitHub-hosted repositories
    pub fn repo_slug(&self) -> Option<String> {
        crate::analyzer::RepoRef::parse(&self.repo_url)
            .ok()
            .map(|repo| repo.slug())
    }
}

/// Canonical provider-side deployment state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderState {
    Queued,
    Building,
    Ready,
    Error,
    Canceled,
    Unknown(String),
}

impl ProviderState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProviderState::Ready | ProviderState::Error | ProviderState::Canceled
        )
    }

    /// Provider-style label used in one-shot run results
    pub fn ready_state(&self) -> &str {
        match self {
            ProviderState::Queued => "QUEUED",
            ProviderState::Building => "BUILDING",
            ProviderState::Ready => "READY",
            ProviderState::Error => "ERROR",
            ProviderState::Canceled => "CANCELED",
            ProviderState::Unknown(label) => label,
        }
    }
}

/// Result of a successful submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub deployment_id: String,
    pub url: Option<String>,
    pub state: ProviderState,
}

/// Snapshot of a deployment as reported by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub deployment_id: String,
    pub state: ProviderState,
    pub url: Option<String>,
    pub message: Option<String>,
}

/// Errors raised by platform adapters
#[derive(Debug, Clone, thiserror::Error)]
pub enum AdapterError {
    #[error("Invalid deployment request: {0}")]
    Validation(String),
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("Rate limited by provider, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },
    #[error("Network error: {0}")]
    Network(String),
    #[error("Provider unavailable (HTTP {status}): {message}")]
    Unavailable { status: u16, message: String },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Provider rejected request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("Deployment command failed: {0}")]
    Command(String),
    #[error("Unexpected provider response: {0}")]
    InvalidResponse(String),
    #[error("No adapter registered for {0}")]
    UnsupportedPlatform(Platform),
}

impl AdapterError {
    /// Whether the failure is worth retrying with backoff
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AdapterError::Network(_)
                | AdapterError::Unavailable { .. }
                | AdapterError::RateLimited { .. }
        )
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AdapterError::Validation(_) | AdapterError::UnsupportedPlatform(_) => {
                ErrorKind::Validation
            }
            AdapterError::Auth(_) => ErrorKind::Auth,
            AdapterError::RateLimited { .. }
            | AdapterError::Network(_)
            | AdapterError::Unavailable { .. } => ErrorKind::TransientNetwork,
            AdapterError::NotFound(_) => ErrorKind::NotFound,
            AdapterError::Rejected { .. }
            | AdapterError::Command(_)
            | AdapterError::InvalidResponse(_) => ErrorKind::ProviderTerminal,
        }
    }

    /// Classify a non-success HTTP status from a platform API
    pub fn from_status(status: u16, message: String, retry_after: Option<Duration>) -> Self {
        match status {
            401 | 403 => AdapterError::Auth(message),
            404 => AdapterError::NotFound(message),
            429 => AdapterError::RateLimited { retry_after },
            400 | 409 | 422 => AdapterError::Validation(message),
            s if s >= 500 => AdapterError::Unavailable { status: s, message },
            s => AdapterError::Rejected { status: s, message },
        }
    }
}

impl From<reqwest::Error> for AdapterError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            AdapterError::InvalidResponse(error.to_string())
        } else {
            AdapterError::Network(error.to_string())
        }
    }
}
