//! ShotCheck CLI - Bridge interface for the presentation layer
//!
//! Commands: classify, overlay, check
//! Outputs JSON to stdout, logs to stderr
//! Returns 2 when critical issues are found

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use shotcheck_core::{
    AnalysisResult, CheckRequest, CompliancePipeline, ImageLoader, LoaderConfig, RuleClassifier,
};

#[derive(Parser)]
#[command(name = "shotcheck-cli")]
#[command(about = "ShotCheck CLI - Product Image Compliance Checker")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to loader config (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Per-image load timeout in milliseconds (overrides config)
    #[arg(long)]
    timeout_ms: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify an analysis result into critical/important/minor issues
    Classify {
        /// JSON payload (AnalysisResult)
        #[arg(short, long, conflicts_with = "payload_file")]
        payload: Option<String>,

        /// File containing the JSON payload
        #[arg(long)]
        payload_file: Option<PathBuf>,

        /// Non-white pixel count from before a fix attempt
        #[arg(short, long)]
        baseline: Option<i64>,
    },

    /// Paint non-white background pixels red using the segmentation mask
    Overlay {
        /// Source image URL or path
        #[arg(short, long)]
        source: String,

        /// Mask image URL or path
        #[arg(short, long)]
        mask: String,

        /// Write the PNG here instead of emitting a data URL
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Classify and build the overlay in one report
    Check {
        /// JSON payload (CheckRequest)
        #[arg(short, long, conflicts_with = "payload_file")]
        payload: Option<String>,

        /// File containing the JSON payload
        #[arg(long)]
        payload_file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    ExitCode::from(run(Cli::parse()).await)
}

const EXIT_OK: u8 = 0;
const EXIT_FAILURE: u8 = 1;
const EXIT_CRITICAL: u8 = 2;

async fn run(cli: Cli) -> u8 {
    match cli.command {
        Commands::Classify { payload, payload_file, baseline } => {
            let payload = match read_payload(payload, payload_file) {
                Ok(p) => p,
                Err(e) => {
                    emit_error(&e);
                    return EXIT_FAILURE;
                }
            };
            let result = match AnalysisResult::from_json(&payload) {
                Ok(r) => r,
                Err(e) => {
                    emit_error(&format!("Invalid payload: {}", e));
                    return EXIT_FAILURE;
                }
            };

            let issues = RuleClassifier::new().classify(Some(&result), baseline);
            if !emit(&issues) {
                return EXIT_FAILURE;
            }
            if issues.has_critical() {
                EXIT_CRITICAL
            } else {
                EXIT_OK
            }
        }

        Commands::Overlay { source, mask, out } => {
            let config = match load_config(cli.config.as_deref(), cli.timeout_ms) {
                Ok(c) => c,
                Err(e) => {
                    emit_error(&e);
                    return EXIT_FAILURE;
                }
            };
            let loader = ImageLoader::new(config);
            let output = match loader.composite(&source, &mask).await {
                Ok(o) => o,
                Err(e) => {
                    let body = serde_json::json!({
                        "success": false,
                        "failedImage": e.role(),
                        "error": e.to_string(),
                    });
                    emit(&body);
                    return EXIT_FAILURE;
                }
            };

            let body = match out {
                Some(path) => {
                    if let Err(e) = fs::write(&path, &output.png) {
                        emit_error(&format!("Failed to write {}: {}", path.display(), e));
                        return EXIT_FAILURE;
                    }
                    serde_json::json!({
                        "success": true,
                        "path": path.display().to_string(),
                        "width": output.width,
                        "height": output.height,
                        "flaggedPixels": output.flagged_pixels,
                        "sha256": output.sha256(),
                    })
                }
                None => serde_json::json!({
                    "success": true,
                    "dataUrl": output.to_data_url(),
                    "width": output.width,
                    "height": output.height,
                    "flaggedPixels": output.flagged_pixels,
                    "sha256": output.sha256(),
                }),
            };
            if emit(&body) {
                EXIT_OK
            } else {
                EXIT_FAILURE
            }
        }

        Commands::Check { payload, payload_file } => {
            let config = match load_config(cli.config.as_deref(), cli.timeout_ms) {
                Ok(c) => c,
                Err(e) => {
                    emit_error(&e);
                    return EXIT_FAILURE;
                }
            };
            let payload = match read_payload(payload, payload_file) {
                Ok(p) => p,
                Err(e) => {
                    emit_error(&e);
                    return EXIT_FAILURE;
                }
            };
            let request: CheckRequest = match serde_json::from_str(&payload) {
                Ok(r) => r,
                Err(e) => {
                    emit_error(&format!("Invalid payload: {}", e));
                    return EXIT_FAILURE;
                }
            };

            let pipeline = CompliancePipeline::new(config);
            match pipeline.check(&request).await {
                Ok(report) => {
                    if !emit(&report) {
                        return EXIT_FAILURE;
                    }
                    if report.issues.has_critical() {
                        EXIT_CRITICAL
                    } else {
                        EXIT_OK
                    }
                }
                Err(e) => {
                    emit_error(&e.to_string());
                    EXIT_FAILURE
                }
            }
        }
    }
}

fn load_config(path: Option<&Path>, timeout_ms: Option<u64>) -> Result<LoaderConfig, String> {
    let config = match path {
        Some(path) => LoaderConfig::load_from_file(path).map_err(|e| e.to_string())?,
        None => LoaderConfig::default(),
    };
    Ok(match timeout_ms {
        Some(ms) => config.with_load_timeout_ms(ms),
        None => config,
    })
}

fn read_payload(inline: Option<String>, file: Option<PathBuf>) -> Result<String, String> {
    match (inline, file) {
        (Some(p), _) => Ok(p),
        (None, Some(path)) => fs::read_to_string(&path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e)),
        (None, None) => Err("Either --payload or --payload-file is required".to_string()),
    }
}

fn emit<T: Serialize>(value: &T) -> bool {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{}", json);
            true
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize output");
            false
        }
    }
}

fn emit_error(message: &str) {
    println!("{}", serde_json::json!({ "error": message }));
}
