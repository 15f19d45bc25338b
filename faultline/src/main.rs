use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;

use faultline_core::observability::init_logging;
use faultline_core::{Config, ErrorReporter};

mod incident;

#[derive(Parser)]
#[command(name = "faultline")]
#[command(about = "Replay incidents and inspect error recovery settings", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Feed an incident export through the reporter and print the report
    Replay {
        /// JSON array of incident records
        #[arg(long)]
        input: PathBuf,

        /// Configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the un-jittered backoff schedule
    Backoff {
        /// Number of attempts to show
        #[arg(long)]
        attempts: Option<u32>,

        /// Configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Validate a configuration file and print the effective settings
    CheckConfig {
        /// Configuration file
        path: PathBuf,
    },
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => {
            let mut config = Config::default();
            config.apply_env_overrides();
            config.validate()?;
            Ok(config)
        }
    }
}

async fn replay(input: PathBuf, config: Config) -> anyhow::Result<()> {
    let json = std::fs::read_to_string(&input)
        .with_context(|| format!("reading incidents from {}", input.display()))?;
    let incidents = incident::parse_incidents(&json)?;

    let reporter = ErrorReporter::new(config.reporter)?;
    for record in &incidents {
        let error = record.to_app_error();
        for _ in 0..record.occurrences.max(1) {
            reporter.report(&error, &record.context);
        }
    }
    reporter.flush().await;

    tracing::info!(
        incidents = incidents.len(),
        cached = reporter.cached_count(),
        "replay complete"
    );
    println!("{}", serde_json::to_string_pretty(&reporter.generate_report())?);
    Ok(())
}

fn backoff(attempts: Option<u32>, config: &Config) {
    let attempts = attempts.unwrap_or(config.recovery.max_attempts);
    let policy = config.recovery.backoff.clone().without_jitter();
    for (index, delay) in policy.schedule(attempts).iter().enumerate() {
        println!("attempt {}: {}ms", index + 1, delay.as_millis());
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Replay { input, config } => {
            let config = load_config(config.as_ref())?;
            init_logging(&config.observability.logging)?;
            replay(input, config).await?;
        }
        Commands::Backoff { attempts, config } => {
            let config = load_config(config.as_ref())?;
            backoff(attempts, &config);
        }
        Commands::CheckConfig { path } => {
            let config = load_config(Some(&path))?;
            println!("{}", config.to_toml_string()?);
        }
    }

    Ok(())
}
