//! Metamorph Runtime
//!
//! Entry point for the self-rewriting agent. Handles CLI args, first-run
//! setup, and hands control to the lifecycle supervisor.

use anyhow::Result;
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use metamorph::config;
use metamorph::journal::Journal;
use metamorph::lifecycle;
use metamorph::setup;
use metamorph::store::CodeStore;
use metamorph::types::{AgentConfig, LogLevel};

const VERSION: &str = "0.1.0";

/// Metamorph -- Self-Rewriting Agent Runtime
#[derive(Parser, Debug)]
#[command(
    name = "metamorph",
    version = VERSION,
    about = "Metamorph -- Self-Rewriting Agent Runtime",
    long_about = "A supervised loop that asks an LLM to rewrite its own source image, \
                  validates the candidate, commits it behind a backup, and re-execs."
)]
struct Cli {
    /// Start the supervised mutation loop (first run triggers setup wizard)
    #[arg(long)]
    run: bool,

    /// Run exactly one evolution cycle and exit without re-exec
    #[arg(long)]
    once: bool,

    /// Show current agent status
    #[arg(long)]
    status: bool,

    /// Re-run the interactive setup wizard
    #[arg(long)]
    setup: bool,

    /// Directive for the next mutation (overrides the configured one)
    #[arg(long)]
    directive: Option<String>,
}

/// Install the global tracing subscriber. `RUST_LOG` wins over the
/// configured level.
fn init_tracing(level: &LogLevel) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_filter()));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .try_init()
        .ok();
}

// ---- Status Command ---------------------------------------------------------

/// Display the current agent status.
fn show_status() {
    let Some(config) = config::load_config() else {
        println!("Metamorph is not configured. Run: metamorph --setup");
        return;
    };

    let store = CodeStore::new(
        config::resolve_path(&config.source_path),
        config::resolve_path(&config.backup_dir),
    );
    let backups = store.list_backups();

    let providers: Vec<String> = config
        .providers
        .iter()
        .map(|p| format!("{} ({})", p.name, p.model))
        .collect();

    println!(
        r#"
=== METAMORPH STATUS ===
Name:       {}
Source:     {}
Backups:    {} kept (max {})
Providers:  {}
Directive:  {}
Journal:    {}
Version:    {}
========================
"#,
        config.name,
        config.source_path,
        backups.len(),
        config.max_backups,
        providers.join(" -> "),
        config.directive.as_deref().unwrap_or("(autonomous)"),
        config.journal_path,
        config.version,
    );

    if let Ok(journal) = Journal::open(config::resolve_path(&config.journal_path)) {
        let recent = journal.tail(5);
        if !recent.is_empty() {
            println!("Recent activity:");
            for line in recent {
                println!("  {}", line);
            }
            println!();
        }
    }
}

// ---- Main Run ---------------------------------------------------------------

/// Resolve the config (first run triggers the wizard), then either run a
/// single cycle or hand off to the supervisor.
async fn run(once: bool, directive: Option<String>) -> Result<()> {
    let config = match config::load_config() {
        Some(c) => c,
        None => setup::run_setup_wizard()?,
    };

    let mut config: AgentConfig = config;
    init_tracing(&config.log_level);
    config::validate_config(&mut config)?;

    info!(
        "metamorph v{} starting ({} provider(s))",
        VERSION,
        config.providers.len()
    );

    if once {
        let record = lifecycle::run_once(&config, directive).await?;
        println!(
            "{}",
            serde_json::to_string_pretty(&record).unwrap_or_default()
        );
        return Ok(());
    }

    tokio::select! {
        _ = shutdown_signal() => {
            info!("shutting down gracefully");
        }
        result = lifecycle::run_supervisor(&config, directive) => {
            result?;
        }
    }

    Ok(())
}

/// Resolves when SIGINT or SIGTERM arrives.
async fn shutdown_signal() {
    let ctrl_c = signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to register SIGTERM handler");

        tokio::select! {
            _ = ctrl_c => {
                info!("received SIGINT");
            }
            _ = sigterm.recv() => {
                info!("received SIGTERM");
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("Failed to register Ctrl+C handler");
    }
}

// ---- Entry Point -----------------------------------------------------------

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.status {
        show_status();
        return;
    }

    if cli.setup {
        match setup::run_setup_wizard() {
            Ok(_config) => {
                println!("Setup complete.");
            }
            Err(e) => {
                eprintln!("Setup failed: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    if cli.run || cli.once {
        if let Err(e) = run(cli.once, cli.directive).await {
            eprintln!("Fatal: {:#}", e);
            std::process::exit(1);
        }
        return;
    }

    // Default: show help hints
    println!("Run \"metamorph --help\" for usage information.");
    println!("Run \"metamorph --run\" to start the mutation loop.");
}
