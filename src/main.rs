use anyhow::{Context, Result};
use shipwright::analyzer::{
    FrameworkAnalysis, FrameworkAnalyzer, LocalManifestSource, ManifestSource, RepoRef,
};
use shipwright::cli::{self, AnalyzeConfig, Args, DeployConfig, ExecutionMode};
use shipwright::config::{ConfigDiscovery, ShipwrightConfig};
use shipwright::deployment::{
    Admission, DeploymentOrchestrator, DeploymentQueue, DeploymentResult, JobRequest, JobStatus,
};
use shipwright::env;
use shipwright::github::GitHubClient;
use shipwright::platform::{AdapterRegistry, Platform};
use shipwright::store::{MemoryTokenStore, TokenStore};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("shipwright=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mode = match Args::parse().mode() {
        Ok(mode) => mode,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(cli::EXIT_FAILURE);
        }
    };

    let code = match run(mode).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            cli::EXIT_FAILURE
        }
    };
    std::process::exit(code);
}

async fn run(mode: ExecutionMode) -> Result<i32> {
    match mode {
        ExecutionMode::Analyze(config) => run_analyze(config).await,
        ExecutionMode::Deploy(config) => run_deploy(config).await,
        ExecutionMode::Platforms { json } => {
            show_platforms(json).await?;
            Ok(cli::EXIT_SUCCESS)
        }
        ExecutionMode::ShowConfig => {
            show_config()?;
            Ok(cli::EXIT_SUCCESS)
        }
    }
}

fn load_config(config_override: Option<&Path>) -> Result<ShipwrightConfig> {
    match config_override {
        Some(path) => {
            info!("Loading configuration override from: {:?}", path);
            let mut config = ShipwrightConfig::from_toml_file(path)
                .with_context(|| format!("loading configuration from {:?}", path))?;
            config.apply_env_overrides(|name| std::env::var(name).ok());
            config.validate()?;
            Ok(config)
        }
        None => ConfigDiscovery::discover_config().context("discovering configuration"),
    }
}

fn build_analyzer(
    config: &ShipwrightConfig,
    local_path: Option<&Path>,
) -> Result<FrameworkAnalyzer> {
    let source: Arc<dyn ManifestSource> = match local_path {
        Some(path) => Arc::new(LocalManifestSource::new(path)),
        None => Arc::new(GitHubClient::new(
            &config.analyzer.github_api_url,
            std::env::var(env::vars::GITHUB_TOKEN).ok(),
            config.analyzer.request_timeout,
        )?),
    };
    Ok(FrameworkAnalyzer::new(source, config.analyzer.clone()))
}

async fn analyze(
    analyzer: &FrameworkAnalyzer,
    repo: &str,
    git_ref: Option<&str>,
) -> Result<FrameworkAnalysis> {
    let mut repo = RepoRef::parse(repo)?;
    if let Some(git_ref) = git_ref {
        repo = repo.with_ref(git_ref);
    }
    Ok(analyzer.analyze_repo(&repo).await?)
}

async fn run_analyze(config: AnalyzeConfig) -> Result<i32> {
    let settings = load_config(config.config_override.as_deref())?;
    let analyzer = build_analyzer(&settings, config.local_path.as_deref())?;
    let analysis = analyze(&analyzer, &config.repo, config.git_ref.as_deref()).await?;

    if config.json {
        println!("{}", serde_json::to_string_pretty(&analysis)?);
        return Ok(cli::EXIT_SUCCESS);
    }

    println!("Repository:  {}", analysis.repo_key);
    println!("Framework:   {}", analysis.framework);
    println!(
        "Manifest:    {}",
        analysis.manifest_path.as_deref().unwrap_or("(none found)")
    );
    println!();

    let mut ranked: Vec<(Platform, u8)> = analysis
        .scores
        .iter()
        .map(|(platform, score)| (*platform, *score))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    for (platform, score) in ranked {
        println!(
            "  {:<24} {:>3}",
            platform.descriptor().display_name,
            score
        );
    }

    if let Some(platform) = analysis.recommended_platform() {
        println!();
        println!("Recommended: {}", platform);
    }
    Ok(cli::EXIT_SUCCESS)
}

async fn run_deploy(config: DeployConfig) -> Result<i32> {
    let mut settings = load_config(config.config_override.as_deref())?;
    if config.prefer_cli {
        settings.platforms.prefer_cli = true;
    }
    if let Some(deadline) = config.deadline {
        settings.orchestrator.poll_deadline = deadline;
    }

    let platform = match config.platform {
        Some(platform) => platform,
        None => {
            let analyzer = build_analyzer(&settings, config.local_path.as_deref())?;
            let analysis = analyze(&analyzer, &config.repo, config.deployment.branch.as_deref())
                .await
                .context("choosing a platform")?;
            let platform = analysis
                .recommended_platform()
                .context("analysis produced no platform scores")?;
            info!(
                "Detected {}; deploying to recommended platform {}",
                analysis.framework, platform
            );
            platform
        }
    };

    let tokens = MemoryTokenStore::from_env();
    let registry = AdapterRegistry::from_config(&settings.platforms, &tokens).await?;
    let queue = DeploymentQueue::new(DeploymentOrchestrator::new(
        registry,
        settings.orchestrator.clone(),
    ));

    let mut request = JobRequest::new(&config.repo, platform).with_config(config.deployment);
    if let Some(path) = &config.local_path {
        request = request.with_repo_path(path.display().to_string());
    }
    if let Some(environment) = config.environment {
        request = request.with_environment(environment);
    }

    let handle = match queue.enqueue(request).await {
        Admission::Accepted(handle) => handle,
        Admission::Rejected(rejection) => {
            eprintln!("Deployment rejected: {}", rejection.reason);
            return Ok(cli::EXIT_FAILURE);
        }
    };

    let job = tokio::select! {
        result = handle.wait() => result?,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, canceling job {}", handle.id());
            handle.cancel();
            handle.wait().await?
        }
    };

    if job.status == JobStatus::Succeeded {
        let result = DeploymentResult::try_from(&job)?;
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        eprintln!(
            "Deployment {}: {}",
            job.status,
            job.reason().unwrap_or("no reason recorded")
        );
    }
    Ok(cli::exit_code(job.status))
}

async fn show_platforms(json: bool) -> Result<()> {
    let tokens = MemoryTokenStore::from_env();
    let mut rows = Vec::new();

    for platform in Platform::ALL {
        let descriptor = platform.descriptor();
        let has_token = tokens.get(platform).await?.is_some();
        rows.push(serde_json::json!({
            "platform": platform.as_str(),
            "name": descriptor.display_name,
            "tokenEnv": descriptor.token_env_var,
            "tokenSet": has_token,
            "cli": descriptor.cli_program,
            "dashboard": descriptor.dashboard_url,
            "fields": descriptor
                .fields
                .iter()
                .map(|field| serde_json::json!({
                    "name": field.name,
                    "required": field.required,
                    "description": field.description,
                }))
                .collect::<Vec<_>>(),
        }));

        if !json {
            let required: Vec<&str> = descriptor
                .fields
                .iter()
                .filter(|field| field.required)
                .map(|field| field.name)
                .collect();
            println!(
                "{:<11} {:<24} token {:<22} {:<8} cli {:<9} required: {}",
                platform.as_str(),
                descriptor.display_name,
                descriptor.token_env_var,
                if has_token { "(set)" } else { "(unset)" },
                descriptor.cli_program,
                if required.is_empty() {
                    "-".to_string()
                } else {
                    required.join(", ")
                }
            );
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    }
    Ok(())
}

fn show_config() -> Result<()> {
    print!("{}", ConfigDiscovery::discovery_report());
    let config = ConfigDiscovery::discover_config()?;
    println!();
    println!("Effective configuration:");
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}
