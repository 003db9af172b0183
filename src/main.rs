use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dailyquill::config::Config;
use dailyquill::metrics;
use dailyquill::orchestrator::{Orchestrator, RunStatus};
use dailyquill::scheduler::{DailyTrigger, RunHandler, RunTrigger};
use dailyquill::server::{ApiServer, AppState};
use dailyquill::status::StatusReporter;
use dailyquill::storage::{open_store, seed_categories};

#[derive(Parser)]
#[command(
    name = "dailyquill",
    version,
    about = "Daily multilingual article generator with quota accounting",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ./dailyquill.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the config file
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API and the daily trigger
    Serve,

    /// Execute one generation run and exit
    Run {
        /// Bypass the timing gate
        #[arg(long)]
        manual: bool,
    },

    /// Generate one master article
    Generate {
        /// Category slug; the largest deficit is used when omitted
        #[arg(short, long)]
        category: Option<String>,

        /// Prefer the provider's web search model
        #[arg(long)]
        web_search: bool,
    },

    /// Translate an existing master article
    Translate {
        /// Master article slug
        #[arg(short, long)]
        slug: String,

        /// Target language code
        #[arg(short, long)]
        lang: String,

        /// Chunk count, 0 for automatic (0-10)
        #[arg(long, allow_hyphen_values = true)]
        max_chunks: Option<i64>,
    },

    /// Print today's progress
    Status,

    /// Create the schema and seed categories
    InitDb,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    let format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| config.logging.format.clone());
    setup_tracing(&format, &config.logging.level, cli.verbose)?;

    if let Err(e) = metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics disabled");
    }

    let store = open_store(&config.database)
        .await
        .context("Failed to open content store")?;
    let categories = seed_categories(store.as_ref(), &config.categories).await?;
    tracing::info!(categories = categories.len(), "Categories seeded");

    if let Commands::InitDb = cli.command {
        println!("Store ready with {} categories", categories.len());
        return Ok(());
    }

    let orchestrator = Arc::new(Orchestrator::from_config(&config, store)?);

    match cli.command {
        Commands::Serve => serve(&config, orchestrator).await?,

        Commands::Run { manual } => {
            let trigger = if manual {
                RunTrigger::Manual
            } else {
                RunTrigger::Scheduled
            };
            let report = orchestrator.run(trigger, Utc::now()).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.status == RunStatus::Error {
                anyhow::bail!(
                    "run ended in error: {}",
                    report.error_summary().unwrap_or_default()
                );
            }
        }

        Commands::Generate {
            category,
            web_search,
        } => {
            tracing::info!(category = ?category, web_search = %web_search, "Starting generate command");
            let result = orchestrator
                .manual_generate(category.as_deref(), web_search.then_some(true), Utc::now())
                .await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }

        Commands::Translate {
            slug,
            lang,
            max_chunks,
        } => {
            tracing::info!(slug = %slug, lang = %lang, max_chunks = ?max_chunks, "Starting translate command");
            let result = orchestrator
                .manual_translate(&slug, &lang, max_chunks, Utc::now())
                .await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }

        Commands::Status => {
            let reporter = StatusReporter::for_orchestrator(&orchestrator);
            let report = reporter.today(Utc::now()).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Commands::InitDb => {}
    }

    Ok(())
}

async fn serve(config: &Config, orchestrator: Arc<Orchestrator>) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handler: Arc<dyn RunHandler> = orchestrator.clone();
    let trigger = DailyTrigger::new(handler, config.tick_interval(), config.window.run_on_startup)?;
    let trigger_task = tokio::spawn(trigger.run(shutdown_rx.clone()));

    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received");
        let _ = signal_tx.send(true);
    });

    let server = ApiServer::new(config.server.clone(), AppState::new(orchestrator));
    let mut server_rx = shutdown_rx;
    server
        .start_with_shutdown(async move {
            let _ = server_rx.wait_for(|stop| *stop).await;
        })
        .await?;

    let _ = shutdown_tx.send(true);
    trigger_task.await.context("Trigger task panicked")?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            tracing_subscriber::EnvFilter::new("dailyquill=debug,info")
        } else {
            tracing_subscriber::EnvFilter::new(format!("dailyquill={level},warn"))
        }
    });

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    Ok(())
}
