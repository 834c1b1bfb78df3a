//! CLI-backed platform adapter
//!
//! Runs the provider's deployment command (`vercel`, `netlify`, `wrangler`,
//! `amplify`, `swa`, `gcloud`) in the repository checkout and recovers the
//! deployment URL from its free-form output. Programs that are not installed
//! are resolved through `npx --yes <package>` when the platform ships one.
//!
//! ## URL recovery
//!
//! Output is unstructured, so recovery is a fixed three-step pipeline:
//!
//! 1. **Pattern match**: the profile's URL patterns are tried in order
//! 2. **Lookup**: the expected production URL (e.g. `https://{project}.vercel.app`)
//!    is looked up through the provider API, when a lookup is configured
//! 3. **Placeholder**: the deployment is reported at the provider dashboard
//!    with a note to check it there
//!
//! The command runs to completion inside `submit`. Only deployments the
//! lookup found still building are kept for `query_status`, which refreshes
//! them through the lookup and forgets them once they are terminal.

use crate::platform::adapter::{DeploymentLookup, PlatformAdapter};
use crate::platform::types::{
    AdapterError, Platform, PlatformOptions, ProviderState, StatusReport, SubmitRequest,
    Submission,
};
use dashmap::DashMap;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info, warn};
use which::which;

const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(900);

/// How to drive one platform's deployment CLI
#[derive(Debug, Clone)]
pub struct CliProfile {
    pub platform: Platform,
    pub program: String,
    pub npx_package: Option<String>,
    /// Argument templates; `{project}`, `{dir}`, `{branch}` and option fields are substituted
    pub args: Vec<String>,
    pub token_env_var: String,
    pub url_patterns: Vec<Regex>,
    /// Template for the expected production URL used by the lookup step
    pub candidate_url: Option<String>,
    pub dashboard_url: String,
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(pattern)
                .unwrap_or_else(|e| panic!("invalid URL pattern {:?}: {}", pattern, e))
        })
        .collect()
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

impl CliProfile {
    /// Built-in profile for a platform's official CLI
    pub fn for_platform(platform: Platform) -> Self {
        let descriptor = platform.descriptor();
        let (args, patterns, candidate_url): (Vec<String>, Vec<Regex>, Option<&str>) =
            match platform {
                Platform::Vercel => (
                    strings(&["deploy", "--prod", "--yes", "--cwd", "{dir}"]),
                    compile(&[
                        r"(?m)Production:\s*(https://\S+)",
                        r"https://[a-z0-9][a-z0-9-]*\.vercel\.app",
                    ]),
                    Some("https://{project}.vercel.app"),
                ),
                Platform::Netlify => (
                    strings(&["deploy", "--prod", "--dir", "{dir}", "--json"]),
                    compile(&[
                        r#""url"\s*:\s*"(https://[^"]+)""#,
                        r"(?m)Website URL:\s*(https://\S+)",
                        r"https://[a-z0-9][a-z0-9-]*\.netlify\.app",
                    ]),
                    Some("https://{project}.netlify.app"),
                ),
                Platform::Cloudflare => (
                    strings(&[
                        "pages",
                        "deploy",
                        "{dir}",
                        "--project-name",
                        "{project}",
                        "--branch",
                        "{branch}",
                    ]),
                    compile(&[
                        r"(?m)Deployment complete!.*?(https://\S+)",
                        r"https://(?:[a-z0-9-]+\.)?[a-z0-9-]+\.pages\.dev",
                    ]),
                    Some("https://{project}.pages.dev"),
                ),
                Platform::Aws => (
                    strings(&["publish", "--yes"]),
                    compile(&[r"https://[a-z0-9-]+\.[a-z0-9]+\.amplifyapp\.com"]),
                    None,
                ),
                Platform::Azure => (
                    strings(&[
                        "deploy",
                        "{dir}",
                        "--env",
                        "production",
                        "--app-name",
                        "{app_name}",
                        "--resource-group",
                        "{resource_group}",
                    ]),
                    compile(&[
                        r"(?m)Project deployed to\s*(https://\S+)",
                        r"https://[a-z0-9.-]+\.azurestaticapps\.net",
                    ]),
                    None,
                ),
                Platform::Gcp => (
                    strings(&[
                        "run",
                        "deploy",
                        "{project}",
                        "--source",
                        "{dir}",
                        "--project",
                        "{project_id}",
                        "--region",
                        "{region}",
                        "--quiet",
                    ]),
                    compile(&[
                        r"(?m)Service URL:\s*(https://\S+)",
                        r"https://[a-z0-9-]+\.a\.run\.app",
                    ]),
                    None,
                ),
            };

        Self {
            platform,
            program: descriptor.cli_program.to_string(),
            npx_package: descriptor.npx_package.map(str::to_string),
            args,
            token_env_var: descriptor.token_env_var.to_string(),
            url_patterns: patterns,
            candidate_url: candidate_url.map(str::to_string),
            dashboard_url: descriptor.dashboard_url.to_string(),
        }
    }

    /// Replace the program and argument templates, keeping the platform's URL handling
    pub fn with_command(mut self, program: impl Into<String>, args: Vec<String>) -> Self {
        self.program = program.into();
        self.npx_package = None;
        self.args = args;
        self
    }
}

/// Which pipeline step produced a deployment URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlSource {
    Pattern,
    Lookup,
    Placeholder,
}

/// Outcome of URL recovery from command output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDeployment {
    pub report: StatusReport,
    pub source: UrlSource,
}

/// Step 1: first URL matched by the ordered patterns
pub fn extract_url(output: &str, patterns: &[Regex]) -> Option<String> {
    patterns.iter().find_map(|pattern| {
        pattern.captures(output).map(|captures| {
            captures
                .get(1)
                .or_else(|| captures.get(0))
                .map(|m| m.as_str())
                .unwrap_or_default()
                .trim_end_matches(['.', ',', ')', '"', '\''])
                .to_string()
        })
    })
}

/// Run the full URL recovery pipeline for a finished command
pub async fn resolve_deployment(
    output: &str,
    profile: &CliProfile,
    vars: &HashMap<&'static str, String>,
    fallback_id: &str,
    lookup: Option<&dyn DeploymentLookup>,
) -> ResolvedDeployment {
    if let Some(url) = extract_url(output, &profile.url_patterns) {
        let deployment_id = url
            .trim_start_matches("https://")
            .trim_end_matches('/')
            .to_string();
        return ResolvedDeployment {
            report: StatusReport {
                deployment_id,
                state: ProviderState::Ready,
                url: Some(url),
                message: None,
            },
            source: UrlSource::Pattern,
        };
    }

    if let (Some(lookup), Some(template)) = (lookup, &profile.candidate_url) {
        let candidate = render(template, vars);
        match lookup.lookup_by_url(&candidate).await {
            Ok(Some(mut report)) => {
                if report.url.is_none() {
                    report.url = Some(candidate);
                }
                return ResolvedDeployment {
                    report,
                    source: UrlSource::Lookup,
                };
            }
            Ok(None) => debug!("No deployment found at {}", candidate),
            Err(e) => warn!("Deployment lookup for {} failed: {}", candidate, e),
        }
    }

    ResolvedDeployment {
        report: StatusReport {
            deployment_id: fallback_id.to_string(),
            state: ProviderState::Ready,
            url: Some(profile.dashboard_url.clone()),
            message: Some(format!(
                "{} finished but did not report a URL; check the provider dashboard",
                profile.program
            )),
        },
        source: UrlSource::Placeholder,
    }
}

/// Substitute `{name}` placeholders
pub fn render(template: &str, vars: &HashMap<&'static str, String>) -> String {
    vars.iter().fold(template.to_string(), |acc, (name, value)| {
        acc.replace(&format!("{{{}}}", name), value)
    })
}

/// Placeholder values for a submission
fn template_vars(request: &SubmitRequest, dir: &Path) -> HashMap<&'static str, String> {
    let mut vars = HashMap::new();
    vars.insert("project", request.project_name());
    vars.insert("dir", dir.display().to_string());
    vars.insert(
        "branch",
        request.config.branch.clone().unwrap_or_else(|| "main".to_string()),
    );

    match &request.config.options {
        Some(PlatformOptions::Vercel { team_id: Some(team) }) => {
            vars.insert("team_id", team.clone());
        }
        Some(PlatformOptions::Netlify { site_id: Some(site) }) => {
            vars.insert("site_id", site.clone());
        }
        Some(PlatformOptions::Cloudflare { account_id }) => {
            vars.insert("account_id", account_id.clone());
        }
        Some(PlatformOptions::Aws { region, app_id }) => {
            vars.insert("region", region.clone());
            if let Some(app_id) = app_id {
                vars.insert("app_id", app_id.clone());
            }
        }
        Some(PlatformOptions::Azure {
            resource_group,
            app_name,
        }) => {
            vars.insert("resource_group", resource_group.clone());
            vars.insert("app_name", app_name.clone());
        }
        Some(PlatformOptions::Gcp { project_id, region }) => {
            vars.insert("project_id", project_id.clone());
            vars.insert("region", region.clone());
        }
        _ => {}
    }
    vars
}

/// Classify a failed command from its stderr
fn classify_failure(program: &str, code: Option<i32>, stderr: &str) -> AdapterError {
    let lower = stderr.to_lowercase();
    let tail: String = stderr
        .lines()
        .rev()
        .take(5)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect::<Vec<_>>()
        .join("\n");
    let message = format!(
        "{} exited with code {}: {}",
        program,
        code.map(|c| c.to_string()).unwrap_or_else(|| "none".to_string()),
        tail.trim()
    );

    if ["unauthorized", "not authorized", "invalid token", "not logged in", "authentication"]
        .iter()
        .any(|needle| lower.contains(needle))
    {
        AdapterError::Auth(message)
    } else if ["etimedout", "econnreset", "enotfound", "network error", "socket hang up"]
        .iter()
        .any(|needle| lower.contains(needle))
    {
        AdapterError::Network(message)
    } else {
        AdapterError::Command(message)
    }
}

/// Adapter that shells out to a platform CLI
pub struct CliAdapter {
    profile: CliProfile,
    token: Option<String>,
    lookup: Option<Arc<dyn DeploymentLookup>>,
    command_timeout: Duration,
    /// Deployments still building when the command returned
    pending: DashMap<String, StatusReport>,
}

impl CliAdapter {
    pub fn new(profile: CliProfile) -> Self {
        Self {
            profile,
            token: None,
            lookup: None,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            pending: DashMap::new(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_lookup(mut self, lookup: Arc<dyn DeploymentLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn profile(&self) -> &CliProfile {
        &self.profile
    }

    /// Locate the program, falling back to `npx --yes <package>`
    fn resolve_program(&self) -> Result<(PathBuf, Vec<String>), AdapterError> {
        if let Ok(path) = which(&self.profile.program) {
            return Ok((path, Vec::new()));
        }
        if let Some(package) = &self.profile.npx_package
            && let Ok(npx) = which("npx")
        {
            debug!(
                "{} not installed, resolving through npx {}",
                self.profile.program, package
            );
            return Ok((npx, vec!["--yes".to_string(), package.clone()]));
        }
        Err(AdapterError::Command(format!(
            "'{}' is not installed and cannot be resolved through npx",
            self.profile.program
        )))
    }

    fn working_dir(request: &SubmitRequest) -> Result<PathBuf, AdapterError> {
        let repo_path = request.repo_path.as_deref().ok_or_else(|| {
            AdapterError::Validation(
                "CLI deployments need a local checkout (repo_path)".to_string(),
            )
        })?;
        let mut dir = PathBuf::from(repo_path);
        if let Some(root) = &request.config.root_directory {
            dir = dir.join(root);
        }
        Ok(dir)
    }
}

#[async_trait::async_trait]
impl PlatformAdapter for CliAdapter {
    fn platform(&self) -> Platform {
        self.profile.platform
    }

    fn adapter_name(&self) -> &'static str {
        "cli"
    }

    async fn submit(&self, request: &SubmitRequest) -> Result<Submission, AdapterError> {
        let dir = Self::working_dir(request)?;
        let vars = template_vars(request, &dir);
        let (program, mut args) = self.resolve_program()?;
        args.extend(self.profile.args.iter().map(|arg| render(arg, &vars)));

        let command_line = std::iter::once(program.display().to_string())
            .chain(args.iter().cloned())
            .map(|part| shell_escape::escape(part.into()).into_owned())
            .collect::<Vec<_>>()
            .join(" ");
        info!("Job {}: running {}", request.job_id, command_line);

        let mut command = Command::new(&program);
        command
            .args(&args)
            .envs(&request.config.env_vars)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if dir.is_dir() {
            command.current_dir(&dir);
        }
        if let Some(token) = &self.token {
            command.env(&self.profile.token_env_var, token);
        }
        if let Some(account_id) = vars.get("account_id") {
            command.env("CLOUDFLARE_ACCOUNT_ID", account_id);
        }
        if self.profile.platform == Platform::Aws
            && let Some(region) = vars.get("region")
        {
            command.env("AWS_REGION", region);
        }

        let start = Instant::now();
        let output = tokio::time::timeout(self.command_timeout, command.output())
            .await
            .map_err(|_| {
                AdapterError::Command(format!(
                    "{} did not finish within {:?}",
                    self.profile.program, self.command_timeout
                ))
            })?
            .map_err(|e| {
                AdapterError::Command(format!("failed to run {}: {}", program.display(), e))
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!(
            "{} finished in {:.2}s | exit={:?} | stdout={} bytes | stderr={} bytes",
            self.profile.program,
            start.elapsed().as_secs_f64(),
            output.status.code(),
            output.stdout.len(),
            output.stderr.len()
        );

        if !output.status.success() {
            return Err(classify_failure(
                &self.profile.program,
                output.status.code(),
                &stderr,
            ));
        }

        // Some CLIs print the final URL on stderr
        let combined = format!("{}\n{}", stdout, stderr);
        let fallback_id = format!("cli-{}", request.job_id.simple());
        let resolved = resolve_deployment(
            &combined,
            &self.profile,
            &vars,
            &fallback_id,
            self.lookup.as_deref(),
        )
        .await;

        if resolved.source == UrlSource::Placeholder {
            warn!(
                "Job {}: no deployment URL recovered from {} output",
                request.job_id, self.profile.program
            );
        }

        let report = resolved.report;
        if !report.state.is_terminal() {
            self.pending
                .insert(report.deployment_id.clone(), report.clone());
        }
        Ok(Submission {
            deployment_id: report.deployment_id,
            url: report.url,
            state: report.state,
        })
    }

    async fn query_status(&self, deployment_id: &str) -> Result<StatusReport, AdapterError> {
        let recorded = self
            .pending
            .get(deployment_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AdapterError::NotFound(format!("deployment {}", deployment_id)))?;

        let report = match (&self.lookup, recorded.url.as_deref()) {
            (Some(lookup), Some(url)) => match lookup.lookup_by_url(url).await? {
                Some(mut report) => {
                    report.deployment_id = recorded.deployment_id.clone();
                    if report.url.is_none() {
                        report.url = recorded.url.clone();
                    }
                    report
                }
                None => recorded,
            },
            _ => recorded,
        };

        if report.state.is_terminal() {
            self.pending.remove(deployment_id);
        }
        Ok(report)
    }

    async fn cancel(&self, deployment_id: &str) -> Result<(), AdapterError> {
        self.pending.remove(deployment_id);
        // The command has already run to completion by the time an id exists
        debug!(
            "Cancel requested for CLI deployment {}; nothing left to stop",
            deployment_id
        );
        Ok(())
    }
}
