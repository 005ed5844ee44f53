use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use voicedetect::config::{load_config, BootstrapConfig};
use voicedetect::model::BootstrapModel;
use voicedetect::{extract_features, Config, VoiceDetector, N_FEATURES};

/// Synthetic Voice Detector
#[derive(Parser)]
#[command(name = "voicedetect")]
#[command(about = "Classify speech recordings as AI-generated or human")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet output
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify an audio file and print the result as JSON
    Detect {
        /// Input audio file (WAV/MP3/FLAC/OGG)
        input: PathBuf,

        /// Custom configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Model artifact overriding the configured path
        #[arg(long, env = "VOICEDETECT_MODEL_PATH")]
        model: Option<PathBuf>,

        /// Scaler artifact overriding the configured path
        #[arg(long, env = "VOICEDETECT_SCALER_PATH")]
        scaler: Option<PathBuf>,

        /// Include the grouped feature analysis
        #[arg(long)]
        detailed: bool,

        /// Abandon the run after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Print the named feature vector of an audio file as JSON
    Features {
        input: PathBuf,

        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Train the placeholder forest and save it as a model artifact
    ExportModel {
        output: PathBuf,

        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Validate configuration file
    ValidateConfig {
        /// Configuration file to validate
        config: PathBuf,
    },
    /// Show default configuration
    ShowConfig,
}

fn init_logging(verbose: bool, quiet: bool) {
    let default_level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn config_or_default(path: Option<PathBuf>) -> anyhow::Result<Config> {
    match path {
        Some(path) => load_config(&path).with_context(|| format!("loading {}", path.display())),
        None => Ok(Config::default()),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.verbose && cli.quiet {
        anyhow::bail!("Cannot specify both --verbose and --quiet");
    }
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Detect {
            input,
            config,
            model,
            scaler,
            detailed,
            timeout_ms,
        } => {
            let mut config = config_or_default(config)?;
            if let Some(model) = model {
                config.model.model_path = model;
            }
            if let Some(scaler) = scaler {
                config.model.scaler_path = scaler;
            }
            let timeout = Duration::from_millis(timeout_ms.unwrap_or(config.pipeline.timeout_ms));

            let bytes = std::fs::read(&input).with_context(|| format!("reading {}", input.display()))?;
            let detector = Arc::new(VoiceDetector::new(config)?);
            let result = if detailed {
                detector.detect_detailed_with_timeout(bytes, timeout)?
            } else {
                detector.detect_with_timeout(bytes, timeout)?
            };
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Features { input, config } => {
            let config = config_or_default(config)?;
            let bytes = std::fs::read(&input).with_context(|| format!("reading {}", input.display()))?;
            let features = extract_features(&bytes, &config.audio)?;

            let named: Vec<serde_json::Value> = features
                .named()
                .into_iter()
                .enumerate()
                .map(|(index, (name, value))| {
                    serde_json::json!({ "index": index, "name": name, "value": value })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&named)?);
        }
        Commands::ExportModel { output, config } => {
            let bootstrap: BootstrapConfig = config_or_default(config)?.model.bootstrap;
            let model = BootstrapModel::train(&bootstrap, N_FEATURES)?;
            model.into_forest().save(&output)?;
            println!("Model saved to {}", output.display());
        }
        Commands::ValidateConfig { config } => {
            let config = load_config(config)?;
            println!("Configuration is valid");
            if let Ok(json) = serde_json::to_string_pretty(&config) {
                println!("{}", json);
            }
        }
        Commands::ShowConfig => {
            let config = Config::default();
            let json = serde_json::to_string_pretty(&config)?;
            println!("{}", json);
        }
    }

    Ok(())
}
