use anyhow::Result;
use attest_node::cli::{self, Cli, Commands};
use attest_node::config::LoggingConfig;
use attest_node::logging;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Init { output, name } = &cli.command {
        init_fallback_logging(cli.verbose);
        cli::run_init(output, name.clone())?;
        return Ok(());
    }

    let config = cli.load_config()?;
    if let Err(e) = logging::init_logging(&config.logging, cli.verbose) {
        eprintln!("Failed to initialize logging: {}", e);
        init_fallback_logging(cli.verbose);
    }

    match cli.command {
        Commands::Start {
            data_dir,
            ledger_fixture,
        } => cli::run_start(config, data_dir, ledger_fixture).await,
        Commands::Issue { transaction_id } => cli::run_issue(config, transaction_id).await,
        Commands::Pending => cli::run_pending(config).await,
        Commands::Init { .. } => Ok(()),
    }
}

fn init_fallback_logging(verbose: u8) {
    let level = match verbose {
        0 => LoggingConfig::default().level,
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("attest={}", level)),
        ))
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
