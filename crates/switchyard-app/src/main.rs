//! Switchyard application binary - composition root.
//!
//! 1. Load configuration from TOML
//! 2. Open the SQLite conversation store
//! 3. Pick the reasoning provider (HTTP, or scripted with `--offline`)
//! 4. Build the orchestrator and run one CLI command

mod cli;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use switchyard_chat::{Orchestrator, ProcessContext, ProcessResult};
use switchyard_core::config::SwitchyardConfig;
use switchyard_core::reasoning::SharedProvider;
use switchyard_core::types::HandlerId;
use switchyard_llm::{OpenAiProvider, ScriptedProvider};
use switchyard_router::{SharedDataProvider, StaticDataProvider};
use switchyard_storage::Database;

use cli::{CliArgs, Command};

/// Expand ~ to home directory in a path string.
fn resolve_data_dir(data_dir: &str) -> PathBuf {
    if data_dir.starts_with("~/") || data_dir.starts_with("~\\") {
        #[cfg(target_os = "windows")]
        let home = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
        #[cfg(not(target_os = "windows"))]
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(&data_dir[2..])
    } else {
        PathBuf::from(data_dir)
    }
}

fn print_answer(result: &ProcessResult) {
    println!("{}", result.response);
    println!();
    println!(
        "[{} | confidence {:.2} | thread {}]",
        result.handler_id, result.confidence, result.thread_id
    );
    if result.requires_confirmation {
        println!(
            "Re-run with --thread {} and --confirm {} or --reject {}.",
            result.thread_id, result.handler_id, result.handler_id
        );
    }
}

async fn run(orchestrator: &Orchestrator, command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Ask {
            query,
            thread,
            confirm,
            reject,
            json,
        } => {
            let context = match (confirm, reject) {
                (Some(id), _) => ProcessContext::confirming(HandlerId::new(id), true),
                (None, Some(id)) => ProcessContext::confirming(HandlerId::new(id), false),
                (None, None) => ProcessContext::default(),
            };
            let result = orchestrator.process(&query.join(" "), thread.as_deref(), context).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_answer(&result);
            }
        }
        Command::History { thread, limit, enrich } => {
            let history = orchestrator.history(&thread, limit, enrich)?;
            println!("{}", serde_json::to_string_pretty(&history)?);
        }
        Command::Insights { thread } => match orchestrator.insights(&thread)? {
            Some(insights) => println!("{}", serde_json::to_string_pretty(&insights)?),
            None => println!("No summaries yet for thread {}", thread),
        },
        Command::Summarize { thread } => match orchestrator.summarize_now(&thread).await? {
            Some(summary) => println!("{}", serde_json::to_string_pretty(&summary)?),
            None => println!("Nothing new to summarize for thread {}", thread),
        },
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let mut config = SwitchyardConfig::load_or_default(&config_file);
    if let Some(dir) = args.resolve_data_dir() {
        config.general.data_dir = dir;
    }

    // Tracing. Logs go to stderr so answers can be piped.
    let log_level = args
        .resolve_log_level()
        .unwrap_or_else(|| config.general.log_level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting Switchyard v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration loaded");
    config.validate()?;

    // Storage.
    let data_dir = resolve_data_dir(&config.general.data_dir);
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }
    let db_path = data_dir.join("switchyard.db");
    let db = Arc::new(Database::new(&db_path)?);
    tracing::info!(path = %db_path.display(), "SQLite database opened");

    // Reasoning provider.
    let provider: SharedProvider = if args.offline {
        tracing::info!("Offline mode: using the scripted reasoning provider");
        Arc::new(ScriptedProvider::echo())
    } else {
        tracing::info!(base_url = %config.reasoning.base_url, model = %config.reasoning.model, "Reasoning provider configured");
        Arc::new(OpenAiProvider::from_config(&config.reasoning))
    };

    let data: SharedDataProvider = Arc::new(StaticDataProvider::for_profiles(&config.catalog.handlers));
    let orchestrator = Orchestrator::from_parts(&config, provider, db, data)?;

    let outcome = run(&orchestrator, args.command).await;
    orchestrator.shutdown().await;
    outcome
}
