//! Placement Predictor
//!
//! Serves the CGPA to package predictor and offers command line access to
//! the model and the visitor counters.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use placement_predictor::model::{parse_cgpa, LinearModel, ModelSource};
use placement_predictor::store::Storage;
use placement_predictor::{AppConfig, AppState, PredictorError, Tier};

#[derive(Parser)]
#[command(name = "placement-predictor")]
#[command(version)]
#[command(about = "Predict placement packages from CGPA and serve the predictor web app", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Settings file (JSON, or TOML with a .toml extension)
    #[arg(short, long, global = true, env = "PREDICTOR_CONFIG")]
    config: Option<PathBuf>,

    /// Directory for the counter file, event logs and model file
    #[arg(long, global = true, env = "DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// MongoDB connection string (file storage is used when absent)
    #[arg(long, global = true, env = "MONGODB_URI", hide_env_values = true)]
    mongodb_uri: Option<String>,

    /// MongoDB database name
    #[arg(long, global = true, env = "MONGODB_DATABASE")]
    database: Option<String>,

    /// Where the model coefficients come from
    #[arg(long, global = true, value_enum)]
    model_source: Option<ModelSource>,

    /// Token required by /debug and /admin endpoints
    #[arg(long, global = true, env = "ADMIN_TOKEN", hide_env_values = true)]
    admin_token: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the web server (default)
    Serve {
        /// Address to bind
        #[arg(long, env = "HOST")]
        host: Option<String>,

        /// Port to bind
        #[arg(short, long, env = "PORT")]
        port: Option<u16>,
    },

    /// Predict the package for one CGPA
    Predict {
        /// CGPA between 0 and 10
        #[arg(allow_hyphen_values = true)]
        cgpa: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the visitor and prediction counters
    Counts {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Reset the counters on every storage tier
    Reset,

    /// Fit the model on the built-in sample and write the model file
    Train {
        /// Output path (defaults to the configured model file)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn init_tracing(verbose: bool, json: bool) {
    let default_filter = if verbose {
        "placement_predictor=debug,tower_http=debug,info"
    } else {
        "placement_predictor=info,warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Settings file, then flags and environment on top.
fn resolve_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;

    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(uri) = &cli.mongodb_uri {
        config.database.uri = Some(uri.clone());
    }
    if let Some(name) = &cli.database {
        config.database.name = name.clone();
    }
    if let Some(source) = cli.model_source {
        config.model.source = source;
    }
    if let Some(token) = &cli.admin_token {
        config.admin_token = Some(token.clone());
    }

    Ok(config)
}

fn exit_with(err: &PredictorError) -> ! {
    eprintln!("{} {}", "Error:".red().bold(), err);
    std::process::exit(err.exit_code());
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let mut config = match resolve_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            std::process::exit(7);
        }
    };

    match cli.command.unwrap_or(Commands::Serve {
        host: None,
        port: None,
    }) {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }

            let state = match AppState::from_config(config).await {
                Ok(s) => Arc::new(s),
                Err(e) => exit_with(&e),
            };
            placement_predictor::serve(state)
                .await
                .context("server failed")?;
        }

        Commands::Predict { cgpa, json } => {
            let model = LinearModel::from_source(config.model.source, &config.model_file())
                .unwrap_or_else(|e| exit_with(&e));
            let cgpa = parse_cgpa(&cgpa).unwrap_or_else(|e| exit_with(&e));
            let package = model.predict_rounded(cgpa);

            if json {
                println!(
                    "{}",
                    serde_json::json!({ "cgpa": cgpa, "prediction": package })
                );
            } else {
                println!(
                    "Predicted package for CGPA {}: {} LPA",
                    cgpa,
                    format!("{package:.2}").green().bold()
                );
            }
        }

        Commands::Counts { json } => {
            if let Err(e) = config.validate() {
                exit_with(&e);
            }
            let storage = Storage::connect(&config).await?;
            let counts = storage.counters.get_counts().await;

            if json {
                println!("{}", serde_json::to_string_pretty(&counts)?);
            } else {
                println!("{}", "Counters".bold());
                println!("  Total users: {}", counts.total_users);
                println!("  Predictions: {}", counts.predictions);
            }
        }

        Commands::Reset => {
            if let Err(e) = config.validate() {
                exit_with(&e);
            }
            let storage = Storage::connect(&config).await?;
            let report = storage.counters.reset().await;

            if report.is_complete() {
                println!("{} Counters reset", "✓".green().bold());
            } else {
                for status in report.failed() {
                    eprintln!(
                        "{} {} tier not reset: {}",
                        "✗".red().bold(),
                        status.tier,
                        status.error.as_deref().unwrap_or("unknown error")
                    );
                }
                let failed = PredictorError::storage(
                    report.failed().map(|s| s.tier).next().unwrap_or(Tier::Database),
                    "counter reset incomplete",
                );
                exit_with(&failed);
            }
        }

        Commands::Train { output } => {
            let path = output.unwrap_or_else(|| config.model_file());
            let model = LinearModel::fit_builtin().unwrap_or_else(|e| exit_with(&e));
            model
                .save(&path)
                .with_context(|| format!("failed to write {}", path.display()))?;

            println!("{} Model written to {}", "✓".green().bold(), path.display());
            println!("  slope:     {:.8}", model.slope);
            println!("  intercept: {:.8}", model.intercept);
            println!("  samples:   {}", model.samples);
        }
    }

    Ok(())
}
