//! Command-line definitions and command handlers

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tracing::info;

use crate::api::{create_router, AppState};
use crate::config::ServiceConfig;
use crate::error::{Result, SomniaError};
use crate::interpreter::{DreamInterpreter, LoadOutcome};
use crate::model::ModelLoader;
use crate::verify::{self, HashReport, VerifyStatus};

/// Somnia - dream interpretation service
#[derive(Parser, Debug)]
#[command(name = "somnia")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Model selection flags shared by `serve` and `interpret`
#[derive(Args, Debug, Clone, Default)]
pub struct ModelArgs {
    /// Registry model identifier (overrides MODEL_ID)
    #[arg(long)]
    pub model: Option<String>,

    /// Local snapshot directory (overrides MODEL_PATH)
    #[arg(long)]
    pub model_path: Option<PathBuf>,

    /// Generation budget per request (overrides MAX_NEW_TOKENS)
    #[arg(short = 'n', long)]
    pub max_new_tokens: Option<usize>,

    /// Fixed sampling seed (overrides SEED)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Skip model loading and answer from the keyword analyzer
    #[arg(long)]
    pub no_model: bool,

    /// Keep the model on the CPU
    #[arg(long)]
    pub cpu: bool,
}

impl ModelArgs {
    /// Apply the flags on top of environment configuration
    pub fn apply(&self, config: &mut ServiceConfig) {
        if let Some(model) = &self.model {
            config.model_id.clone_from(model);
        }
        if let Some(path) = &self.model_path {
            config.model_path = Some(path.clone());
        }
        if let Some(n) = self.max_new_tokens {
            config.generation.max_new_tokens = n;
        }
        if let Some(seed) = self.seed {
            config.generation.seed = Some(seed);
        }
        config.skip_model |= self.no_model;
        config.force_cpu |= self.cpu;
    }
}

/// Subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP service
    ///
    /// Examples:
    ///   somnia serve
    ///   somnia serve --port 8080 --model-path ./models/deepseek-ai/DeepSeek-R1-Distill-Qwen-7B
    ///   somnia serve --no-model
    Serve {
        /// Host to bind (overrides HOST)
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind (overrides PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Answer 503 instead of using the keyword analyzer when no model is loaded
        #[arg(long)]
        no_fallback: bool,

        /// Model selection
        #[command(flatten)]
        model: ModelArgs,
    },
    /// Interpret a dream from the terminal
    ///
    /// Interactive when TEXT is omitted: `exit` quits, `summary` shows the
    /// last inference log, `info` shows the model.
    Interpret {
        /// Dream description
        #[arg(value_name = "TEXT")]
        text: Option<String>,

        /// Print the inference log after each answer
        #[arg(short, long)]
        verbose: bool,

        /// Model selection
        #[command(flatten)]
        model: ModelArgs,
    },
    /// Compute or verify SHA-256 digests of model files
    Verify {
        /// Model directory
        #[arg(long)]
        path: PathBuf,

        /// JSON map of file name to expected digest
        #[arg(long)]
        reference: Option<PathBuf>,

        /// Write computed digests to this JSON file
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Show version and resolved configuration
    Info,
}

/// Load the model once and fix the interpreter mode
///
/// Loading blocks, so it runs on the blocking pool.
pub async fn load_interpreter(config: &ServiceConfig) -> DreamInterpreter {
    let outcome = if config.skip_model {
        LoadOutcome::Skipped
    } else {
        let loader = ModelLoader::new(config.clone());
        match tokio::task::spawn_blocking(move || loader.load()).await {
            Ok(Ok(engine)) => LoadOutcome::Loaded(engine),
            Ok(Err(e)) => LoadOutcome::Failed(e),
            Err(e) => LoadOutcome::Failed(SomniaError::ModelLoad {
                reason: format!("Loader task failed: {e}"),
            }),
        }
    };
    DreamInterpreter::from_outcome(outcome, config.fallback_enabled)
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}

/// Run the HTTP service until interrupted
pub async fn handle_serve(config: ServiceConfig) -> Result<()> {
    config.validate()?;

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| SomniaError::InvalidConfiguration(format!("Invalid address: {e}")))?;

    let interpreter = Arc::new(load_interpreter(&config).await);
    info!(
        mode = interpreter.mode().as_str(),
        model_loaded = interpreter.model_loaded(),
        "Interpreter ready"
    );
    let app = create_router(AppState::new(interpreter));

    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        SomniaError::UnsupportedOperation {
            operation: "bind".to_string(),
            reason: format!("Failed to bind {addr}: {e}"),
        }
    })?;

    info!(%addr, "Listening");
    println!("Server listening on http://{addr}");
    println!();
    println!("Endpoints:");
    println!("  GET  /          - Web page");
    println!("  GET  /health    - Health check");
    println!("  POST /interpret - Interpret a dream");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| SomniaError::UnsupportedOperation {
            operation: "serve".to_string(),
            reason: format!("Server error: {e}"),
        })
}

/// Print a verification report
pub fn print_report(report: &HashReport) {
    println!("Model path:   {}", report.model_path.display());
    println!("Total files:  {}", report.total_files);
    for (name, digest) in &report.hashes {
        println!("  {name}: {}...", &digest[..16.min(digest.len())]);
    }
    match report.status {
        VerifyStatus::Calculated => println!("Status: calculated ({} digests)", report.hashes.len()),
        VerifyStatus::Verified => println!("Status: verified, all files match"),
        VerifyStatus::Mismatch => {
            println!(
                "Status: mismatch ({} differing, {} missing)",
                report.mismatched_files.len(),
                report.missing_files.len()
            );
            for name in &report.mismatched_files {
                println!("  mismatched: {name}");
            }
            for name in &report.missing_files {
                println!("  missing:    {name}");
            }
        },
    }
}

/// Hash a model directory, optionally against a reference
pub fn handle_verify(
    path: &Path,
    reference: Option<&Path>,
    output: Option<&Path>,
) -> Result<HashReport> {
    let reference = reference.map(verify::load_reference).transpose()?;
    let report = verify::verify_dir(path, reference.as_ref())?;
    if let Some(output) = output {
        verify::save_hashes(&report.hashes, output)?;
        println!("Digests written to {}", output.display());
    }
    print_report(&report);
    Ok(report)
}

/// Print version and configuration
pub fn handle_info(config: &ServiceConfig) {
    println!("somnia {}", crate::VERSION);
    println!();
    println!("Model:          {}", config.model_id);
    println!("Revision:       {}", config.revision);
    match &config.model_path {
        Some(path) => println!("Model path:     {}", path.display()),
        None => println!("Model path:     (resolve from caches or registry)"),
    }
    println!("Hub cache:      {}", config.registry.hub_cache_dir().display());
    if let Some(endpoint) = &config.registry.endpoint {
        println!("Hub endpoint:   {endpoint}");
    }
    println!(
        "Generation:     max_new_tokens={} temperature={} top_p={}",
        config.generation.max_new_tokens, config.generation.temperature, config.generation.top_p
    );
    println!("Fallback:       {}", if config.fallback_enabled { "enabled" } else { "disabled" });
    println!("Bind:           {}:{}", config.host, config.port);
}
