//! Market structure analyzer - main entry point
//!
//! This binary provides two subcommands:
//! - analyze: Run one analysis cycle for a single instrument
//! - run: Run the continuous polling loop over all enabled assets

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "market-structure")]
#[command(about = "Multi-method market-structure signal engine for futures instruments", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one analysis cycle for a single instrument
    Analyze {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/analyzer.json")]
        config: String,

        /// Instrument to analyze (e.g. winfut, wdofut)
        #[arg(short, long)]
        instrument: String,

        /// Strategy profile name (conservador, moderado, agressivo)
        #[arg(short, long)]
        profile: Option<String>,
    },

    /// Run the continuous analysis loop
    Run {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/analyzer.json")]
        config: String,

        /// Restrict the loop to one strategy profile
        #[arg(short, long)]
        profile: Option<String>,
    },
}

fn setup_logging(verbose: bool, command_name: &str) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    let level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(true);

    // Same format as console, without ANSI colors
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_appender)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!("Logging initialized");
    info!("Log file: {}", log_path.display());

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let command_name = match &cli.command {
        Commands::Analyze { .. } => "analyze",
        Commands::Run { .. } => "run",
    };

    setup_logging(cli.verbose, command_name)?;

    match cli.command {
        Commands::Analyze {
            config,
            instrument,
            profile,
        } => commands::analyze::run(config, instrument, profile),

        Commands::Run { config, profile } => commands::run::run(config, profile),
    }
}
