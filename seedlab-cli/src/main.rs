mod report;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use seedlab_core::config::SeedlabConfig;
use seedlab_core::pms::store::describe;
use seedlab_core::pms::{
    self, parse_rounded_weight, MemoryStore, PmsAnalysis, PmsError, PmsSession, PmsSnapshot,
    StoreHandle, WeightStatistics,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version, about = "Thousand-seed-weight repetition engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a stored analysis snapshot (JSON)
    Evaluate {
        /// Path to the snapshot file
        snapshot: PathBuf,
        /// Print flags as JSON instead of a report
        #[arg(long)]
        json: bool,
    },
    /// Compute mean, deviation and CV of a list of weights
    Cv {
        /// Weights in grams
        #[arg(required = true)]
        weights: Vec<f64>,
        /// Compare against the coarse seed threshold
        #[arg(long)]
        coarse: bool,
    },
    /// Run a full analysis against an in-memory store
    Simulate {
        /// Expected repetitions per tanda
        #[arg(short, long)]
        expected: u32,
        /// Coarse (chaffy) seed lot
        #[arg(long)]
        coarse: bool,
        /// Weights in grams, added in order
        #[arg(required = true)]
        weights: Vec<f64>,
        /// Rounded final weight to set once the data allows it
        #[arg(long)]
        rounded: Option<String>,
        /// Finalize the analysis after the last weight
        #[arg(long)]
        finalize: bool,
        /// Approve the analysis after finalizing
        #[arg(long, requires = "finalize")]
        approve: bool,
        /// Print the final snapshot as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show or initialize configuration
    Config {
        /// Write the current configuration to disk
        #[arg(long)]
        init: bool,
    },
}

/// Get the seedlab data directory
fn seedlab_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("SEEDLAB_DATA_DIR") {
        return Ok(PathBuf::from(dir));
    }
    let home = dirs::home_dir().ok_or_else(|| anyhow!("Could not determine home directory"))?;
    Ok(home.join(".seedlab"))
}

fn load_config() -> Result<SeedlabConfig> {
    let dir = seedlab_dir()?;
    SeedlabConfig::load_or_default(&dir)
        .with_context(|| format!("Failed to load configuration from {:?}", dir))
}

/// `RUST_LOG` when set, warnings otherwise.
fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(tracing::Level::WARN.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Evaluate { snapshot, json } => {
            cmd_evaluate(&snapshot, json)?;
        }
        Commands::Cv { weights, coarse } => {
            cmd_cv(&weights, coarse)?;
        }
        Commands::Simulate {
            expected,
            coarse,
            weights,
            rounded,
            finalize,
            approve,
            json,
        } => {
            let options = SimulateOptions {
                rounded,
                finalize,
                approve,
                json,
            };
            cmd_simulate(expected, coarse, &weights, options).await?;
        }
        Commands::Config { init } => {
            cmd_config(init)?;
        }
    }

    Ok(())
}

// =============================================================================
// Evaluate
// =============================================================================

fn cmd_evaluate(path: &Path, json: bool) -> Result<()> {
    let config = load_config()?;
    let raw = fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    let snapshot: PmsSnapshot =
        serde_json::from_str(&raw).with_context(|| format!("Failed to parse {:?}", path))?;
    snapshot.validate()?;
    tracing::debug!(
        "Evaluating analysis {} with {} repetition(s)",
        snapshot.analysis.id,
        snapshot.total()
    );

    let flags = snapshot.flags(&config.policy);
    if json {
        let out = serde_json::json!({
            "analysis_id": snapshot.analysis.id,
            "flags": flags,
            "tandas": snapshot.grouped_by_tanda(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        report::print_snapshot(&snapshot, &flags);
    }
    Ok(())
}

// =============================================================================
// CV
// =============================================================================

fn cmd_cv(weights: &[f64], coarse: bool) -> Result<()> {
    if let Some(bad) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
        return Err(anyhow!("Weights must be non-negative numbers, got {bad}"));
    }
    let config = load_config()?;
    let stats = WeightStatistics::from_weights(weights);
    report::print_statistics(stats.as_ref());

    let threshold = config.policy.cv_threshold(coarse);
    let acceptable = pms::stats::is_acceptable(stats.and_then(|s| s.cv), threshold);
    println!(
        "Acceptable at {threshold:.3}%: {}",
        if acceptable { "yes" } else { "no" }
    );
    Ok(())
}

// =============================================================================
// Simulate
// =============================================================================

struct SimulateOptions {
    rounded: Option<String>,
    finalize: bool,
    approve: bool,
    json: bool,
}

async fn cmd_simulate(
    expected: u32,
    coarse: bool,
    weights: &[f64],
    options: SimulateOptions,
) -> Result<()> {
    let config = load_config()?;
    let store = MemoryStore::new(config.policy);
    store.insert_analysis(PmsAnalysis::new("simulation", expected, coarse), Vec::new())?;
    let handle: StoreHandle = Arc::new(store);
    let mut session = PmsSession::load(handle, "simulation", config.policy).await?;

    for (i, &weight) in weights.iter().enumerate() {
        match session.add_repetition(weight).await {
            Ok(rep) => println!("Added {}", describe(&rep)),
            Err(PmsError::AddRefused(decision)) => {
                println!(
                    "Stopped: {} ({} weight(s) not recorded)",
                    decision,
                    weights.len() - i
                );
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }

    if let Some(text) = options.rounded.as_deref() {
        let value = parse_rounded_weight(text)?;
        session.set_rounded_weight(value).await?;
    }
    if options.finalize {
        session.finalize().await?;
    }
    if options.approve {
        session.approve().await?;
    }

    let snapshot = session.snapshot();
    if options.json {
        println!("{}", serde_json::to_string_pretty(snapshot)?);
    } else {
        println!();
        report::print_snapshot(snapshot, &session.flags());
    }
    Ok(())
}

// =============================================================================
// Config
// =============================================================================

fn cmd_config(init: bool) -> Result<()> {
    let config = load_config()?;

    if init {
        config
            .persist()
            .with_context(|| format!("Failed to write {:?}", config.config_path()))?;
        println!("Wrote {}", config.config_path().display());
    }

    println!("Data directory: {}", config.data_dir.display());
    println!("Max repetitions: {}", config.policy.max_repetitions);
    println!("Fine CV threshold: {:.3}%", config.policy.fine_cv_threshold);
    println!("Coarse CV threshold: {:.3}%", config.policy.coarse_cv_threshold);
    Ok(())
}
