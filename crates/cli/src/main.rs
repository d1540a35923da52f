//! toolflow CLI — the main entry point.
//!
//! Commands:
//! - `serve` — spawn the configured tool sessions and start the HTTP gateway
//! - `tools` — print the aggregated tool catalog and exit
//! - `check` — load and validate the configuration

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use toolflow_config::AppConfig;
use toolflow_core::{Provider, ToolSession};
use toolflow_engine::OrchestratorContext;
use toolflow_registry::{StdioSession, aggregate};

mod provider;

use provider::{DisabledProvider, HttpCompletionProvider};

#[derive(Parser)]
#[command(name = "toolflow", about = "toolflow — tool-orchestration engine", version)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "toolflow.toml", env = "TOOLFLOW_CONFIG")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print the aggregated tool catalog
    Tools,

    /// Validate the configuration and exit
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let mut config = AppConfig::load(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;

    match cli.command {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.gateway.port = port;
            }
            let provider = build_provider(&config)?;
            let ctx = build_context(provider, config);
            toolflow_gateway::serve(Arc::new(ctx)).await?;
        }

        Commands::Tools => {
            // Listing the catalog only talks to the tool backends, so a
            // missing completion endpoint must not block it.
            let ctx = build_context(Arc::new(DisabledProvider), config);
            let agent = ctx.agent(None);
            let catalog = aggregate(&ctx.sessions, &agent, &ctx.config.custom_tools).await;
            for descriptor in catalog.descriptors() {
                println!("{:<36} {}", descriptor.name, descriptor.description);
            }
            println!("\n{} tools", catalog.len());
        }

        Commands::Check => {
            println!("configuration is valid: {config:?}");
        }
    }

    Ok(())
}

fn build_provider(config: &AppConfig) -> anyhow::Result<Arc<dyn Provider>> {
    let api_url = config
        .provider
        .api_url
        .clone()
        .context("provider.api_url is required to reach the completion endpoint")?;
    Ok(Arc::new(HttpCompletionProvider::new(
        config.provider.name.clone(),
        api_url,
        config.api_key.clone(),
    )))
}

/// Spawn the configured subprocess sessions and assemble the context.
fn build_context(provider: Arc<dyn Provider>, config: AppConfig) -> OrchestratorContext {
    let mut sessions: HashMap<String, Arc<dyn ToolSession>> = HashMap::new();
    for (name, session_config) in &config.sessions {
        match StdioSession::spawn(
            name.clone(),
            &session_config.command,
            &session_config.args,
            &session_config.env,
        ) {
            Ok(session) => {
                info!(session = %name, command = %session_config.command, "session spawned");
                sessions.insert(name.clone(), Arc::new(session));
            }
            // One bad session must not take the rest of the catalog down.
            Err(e) => warn!(session = %name, error = %e, "session failed to spawn; skipping"),
        }
    }

    OrchestratorContext::new(provider, sessions, config)
}
