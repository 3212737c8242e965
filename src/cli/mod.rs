//! Command-line interface: argument parsing and dependency wiring.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use crate::application::{ControllerDeps, IterationController};
use crate::domain::ports::{CiBridge, LlmGateway, RecordStore, SourceControl};
use crate::infrastructure::anthropic::{AnthropicBatchClient, AnthropicClientConfig};
use crate::infrastructure::config::{Config, Credentials};
use crate::infrastructure::database::{DatabaseConnection, SqliteRecordStore};
use crate::infrastructure::git::Workspace;
use crate::infrastructure::github::{GitHubCiBridge, GitHubClient};
use crate::infrastructure::logging::Logger;
use crate::infrastructure::shutdown::Shutdown;
use crate::services::{Gateway, MemoryService, ToolDeps, ToolRegistry};

#[derive(Parser)]
#[command(name = "autograft", about = "Autonomous software-change agent", version)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(long, global = true, default_value = "autograft.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Iterate until one change merges.
    Run,
    /// Run exactly one iteration.
    Iterate,
    /// Close stray agent PRs and delete their branches.
    Cleanup,
    /// Inspect the memory store.
    Memory {
        #[command(subcommand)]
        command: MemoryCommand,
    },
}

#[derive(Subcommand)]
pub enum MemoryCommand {
    /// Print the assembled memory context.
    Context,
    /// Search memories.
    Recall { query: String },
    /// Show one memory by id.
    Show { id: i64 },
}

/// The wired object graph.
struct App {
    controller: IterationController,
    memory: Arc<MemoryService>,
    workspace: Arc<dyn SourceControl>,
    _logger: Logger,
}

async fn build(config_path: &PathBuf) -> Result<App> {
    let config = Config::load_or_default(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let logger = Logger::init(&config.logging)?;
    let credentials = Credentials::from_env()?;

    let shutdown = Shutdown::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received; unwinding");
                shutdown.trigger();
            }
        });
    }

    let db = DatabaseConnection::new(&config.database.url).await?;
    db.migrate().await?;
    let store: Arc<dyn RecordStore> = Arc::new(SqliteRecordStore::new(db.pool().clone()));

    let batch_client = AnthropicBatchClient::new(AnthropicClientConfig::new(
        credentials.anthropic_api_key.clone(),
    ))?;
    let gateway: Arc<dyn LlmGateway> = Arc::new(Gateway::new(
        Arc::new(batch_client),
        store.clone(),
        config.llm.clone(),
        shutdown.clone(),
    ));

    let memory = Arc::new(MemoryService::new(
        store.clone(),
        gateway.clone(),
        config.agent.memory_context_budget,
    ));

    let workspace: Arc<dyn SourceControl> = Arc::new(Workspace::new(
        &config.repo.workspace,
        &credentials.github_token,
        &config.repo.owner,
        &config.repo.name,
        config.repo.main_branch.clone(),
        config.agent.branch_prefix.clone(),
    ));

    let github = GitHubClient::new(
        credentials.github_token.clone(),
        config.repo.owner.clone(),
        config.repo.name.clone(),
    );
    let ci: Arc<dyn CiBridge> = Arc::new(GitHubCiBridge::new(
        github,
        config.repo.main_branch.clone(),
        config.agent.branch_prefix.clone(),
        shutdown.clone(),
    ));

    let tools = Arc::new(ToolRegistry::new(ToolDeps {
        workspace: workspace.clone(),
        memory: memory.clone(),
        store: store.clone(),
    }));

    let controller = IterationController::new(
        ControllerDeps {
            gateway,
            memory: memory.clone(),
            workspace: workspace.clone(),
            ci,
            store,
            tools,
        },
        config.agent.max_fix_attempts,
    );

    Ok(App {
        controller,
        memory,
        workspace,
        _logger: logger,
    })
}

pub async fn run(cli: Cli) -> Result<()> {
    let app = build(&cli.config).await?;
    match cli.command {
        Command::Run => {
            // The working copy must exist before anything touches it.
            app.workspace.clone_repo().await?;
            app.controller.run().await?;
            println!("merged");
            Ok(())
        }
        Command::Iterate => {
            app.workspace.clone_repo().await?;
            let merged = app.controller.iterate().await?;
            if merged {
                println!("merged");
                Ok(())
            } else {
                anyhow::bail!("iteration finished without a merge")
            }
        }
        Command::Cleanup => {
            app.controller.cleanup_stray_prs().await;
            Ok(())
        }
        Command::Memory { command } => {
            let output = match command {
                MemoryCommand::Context => app.memory.get_context().await?,
                MemoryCommand::Recall { query } => app.memory.recall(&query).await?,
                MemoryCommand::Show { id } => app.memory.recall_by_id(id).await?,
            };
            println!("{output}");
            Ok(())
        }
    }
}
