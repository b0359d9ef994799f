//! Subcommand handlers.

use anyhow::Context;
use ragscope_core::config::{RagConfig, load_config};
use ragscope_core::models::pull_model;
use ragscope_ml::health::check_health;
use ragscope_ml::rag::Query;
use ragscope_ml::services::RagServices;
use ragscope_ml::run_gateway;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP gateway until Ctrl-C
    Serve {
        /// Bind address (overrides server.host)
        #[arg(long)]
        host: Option<String>,
        /// Port (overrides server.port)
        #[arg(short, long)]
        port: Option<u16>,
        /// Pull the configured models before serving
        #[arg(long)]
        pull_models: bool,
    },
    /// Ingest a local .pdf or .txt file
    Ingest {
        file: PathBuf,
    },
    /// Answer a question and print the scored result as JSON
    Query {
        question: String,
        /// Number of chunks to retrieve
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },
    /// Probe the vector store and the model service
    Health,
    /// Download the configured models into the model service
    Pull,
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Write a default .ragscope/config.toml into the workspace
    Init,
}

pub async fn handle_command(
    command: Commands,
    workspace: &Path,
    config_file: Option<&Path>,
) -> anyhow::Result<()> {
    let config = || load(workspace, config_file);
    match command {
        Commands::Serve {
            host,
            port,
            pull_models,
        } => handle_serve(config()?, host, port, pull_models).await,
        Commands::Ingest { file } => handle_ingest(config()?, &file).await,
        Commands::Query { question, top_k } => handle_query(config()?, question, top_k).await,
        Commands::Health => handle_health(config()?).await,
        Commands::Pull => pull_configured_models(&config()?).await,
        Commands::Config { action } => handle_config(action, workspace, config_file),
    }
}

fn load(workspace: &Path, config_file: Option<&Path>) -> anyhow::Result<RagConfig> {
    let config = load_config(Some(workspace), config_file)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    Ok(resolve_paths(config, workspace))
}

/// Anchor relative storage directories at the workspace.
fn resolve_paths(mut config: RagConfig, workspace: &Path) -> RagConfig {
    if config.store.persist_dir.is_relative() {
        config.store.persist_dir = workspace.join(&config.store.persist_dir);
    }
    if config.tracking.local_dir.is_relative() {
        config.tracking.local_dir = workspace.join(&config.tracking.local_dir);
    }
    config
}

async fn handle_serve(
    mut config: RagConfig,
    host: Option<String>,
    port: Option<u16>,
    pull_models: bool,
) -> anyhow::Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    if pull_models {
        pull_configured_models(&config).await?;
    }

    let host = config.server.host.clone();
    let port = config.server.port;
    let services = RagServices::from_config(config).context("failed to initialize services")?;
    run_gateway(Arc::new(services), &host, port)
        .await
        .with_context(|| format!("gateway failed on {host}:{port}"))
}

async fn handle_ingest(config: RagConfig, file: &Path) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("cannot read {}", file.display()))?;
    let filename = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let services = RagServices::from_config(config).context("failed to initialize services")?;
    let report = services.ingest.ingest(&filename, bytes).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn handle_query(
    config: RagConfig,
    question: String,
    top_k: Option<usize>,
) -> anyhow::Result<()> {
    let query = Query::new(question, top_k.unwrap_or(config.query.default_top_k))?;
    let services = RagServices::from_config(config).context("failed to initialize services")?;
    let answer = services.query.answer(query).await?;
    println!("{}", serde_json::to_string_pretty(&answer)?);
    Ok(())
}

async fn handle_health(config: RagConfig) -> anyhow::Result<()> {
    let services = RagServices::from_config(config).context("failed to initialize services")?;
    let report = check_health(&services).await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Models that must exist in the model service for `config` to work.
fn required_models(config: &RagConfig) -> Vec<String> {
    let mut models = vec![
        config.models.generation_model.clone(),
        config.models.judge_model.clone(),
    ];
    if config.embedding.provider == "ollama" {
        models.push(config.models.embedding_model.clone());
    }
    let mut unique: Vec<String> = Vec::with_capacity(models.len());
    for model in models {
        if !unique.contains(&model) {
            unique.push(model);
        }
    }
    unique
}

async fn pull_configured_models(config: &RagConfig) -> anyhow::Result<()> {
    let timeout = Duration::from_secs(config.models.request_timeout_secs.max(600));
    for model in required_models(config) {
        pull_model(&config.models.base_url, &model, timeout)
            .await
            .with_context(|| format!("failed to pull model '{model}'"))?;
        println!("Pulled {model}");
    }
    Ok(())
}

fn handle_config(
    action: ConfigAction,
    workspace: &Path,
    config_file: Option<&Path>,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load(workspace, config_file)?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
        ConfigAction::Init => {
            let config_dir = workspace.join(".ragscope");
            std::fs::create_dir_all(&config_dir)?;

            let config_path = config_dir.join("config.toml");
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }

            std::fs::write(&config_path, RagConfig::default().to_toml_string()?)?;
            println!("Created default configuration at: {}", config_path.display());
            Ok(())
        }
    }
}
