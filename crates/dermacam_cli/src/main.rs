//! dermacam CLI: serve the prediction API, run it on local files, and
//! create weight files.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use dermacam_core::backend::{GradBackend, NdArray};
use dermacam_core::Seed;
use dermacam_models::checkpoint::metadata_path;
use dermacam_models::{init_weights, load_or_build, CheckpointMetadata, DermNetConfig};
use dermacam_serve::config::DEFAULT_MAX_UPLOAD_BYTES;
use dermacam_serve::{DiagnosisService, ServeConfig, ServerState};

#[derive(Parser)]
#[command(name = "dermacam")]
#[command(author, version)]
#[command(about = "Skin-lesion classification with Grad-CAM explanations")]
#[command(long_about = "dermacam: classify dermoscopic images into nine lesion types and
explain the top prediction with a Grad-CAM heatmap.

EXAMPLES:
  # Serve the HTTP API on port 8000
  dermacam serve --weights models/dermnet.mpk

  # Classify a local image and save the overlay
  dermacam predict --image lesion.jpg --overlay lesion_cam.png

  # Write seeded weights and their metadata sidecar
  dermacam init-weights --output models/dermnet.mpk --seed 7

ENVIRONMENT:
  DERMACAM_BIND, DERMACAM_WEIGHTS, DERMACAM_TARGET_LAYER,
  DERMACAM_TIMEOUT_SECS, DERMACAM_MAX_UPLOAD_BYTES, DERMACAM_DEBUG_ERRORS
  RUST_LOG overrides -v")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP prediction service
    Serve {
        #[command(flatten)]
        model: ModelArgs,

        /// Address to listen on
        #[arg(long, env = "DERMACAM_BIND", default_value = "127.0.0.1:8000", value_name = "ADDR")]
        bind: SocketAddr,

        /// Per-request deadline in seconds
        #[arg(long, env = "DERMACAM_TIMEOUT_SECS", default_value = "30", value_name = "SECS")]
        timeout_secs: u64,

        /// Largest accepted upload in bytes
        #[arg(long, env = "DERMACAM_MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES, value_name = "BYTES")]
        max_upload_bytes: usize,

        /// Include error causes in error responses
        #[arg(long, env = "DERMACAM_DEBUG_ERRORS")]
        debug_errors: bool,
    },
    /// Classify and explain a local image
    Predict {
        #[command(flatten)]
        model: ModelArgs,

        /// Image file to classify
        #[arg(long, value_name = "PATH")]
        image: PathBuf,

        /// Write the rendered overlay PNG here
        #[arg(long, value_name = "PATH")]
        overlay: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "summary")]
        format: OutputFormat,
    },
    /// Write freshly initialised weights and a metadata sidecar
    InitWeights {
        /// Output weights path (`.mpk`)
        #[arg(long, value_name = "PATH")]
        output: PathBuf,

        /// Seed for the weights
        #[arg(long, default_value = "42", value_name = "SEED")]
        seed: u64,

        /// JSON file with a DermNet configuration
        #[arg(long, value_name = "PATH")]
        model_config: Option<PathBuf>,
    },
}

#[derive(Args)]
struct ModelArgs {
    /// Weights file; seeded fresh weights are used if it does not exist
    #[arg(long, env = "DERMACAM_WEIGHTS", value_name = "PATH")]
    weights: Option<PathBuf>,

    /// Layer to compute Grad-CAM at (e.g. block4)
    #[arg(long, env = "DERMACAM_TARGET_LAYER", value_name = "NAME")]
    target_layer: Option<String>,

    /// JSON file with a DermNet configuration
    #[arg(long, value_name = "PATH")]
    model_config: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable summary
    Summary,
    /// Machine-readable JSON
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(log_level).into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Serve {
            model,
            bind,
            timeout_secs,
            max_upload_bytes,
            debug_errors,
        } => handle_serve(model, bind, timeout_secs, max_upload_bytes, debug_errors),
        Commands::Predict {
            model,
            image,
            overlay,
            format,
        } => handle_predict(model, image, overlay, format),
        Commands::InitWeights {
            output,
            seed,
            model_config,
        } => handle_init_weights(output, seed, model_config),
    }
}

fn read_model_config(path: &Path) -> Result<DermNetConfig> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read model config {}", path.display()))?;
    serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse model config {}", path.display()))
}

/// Resolve the network configuration: explicit file, else the weights'
/// metadata sidecar, else defaults; then apply the target layer override.
fn resolve_model_config(args: &ModelArgs) -> Result<DermNetConfig> {
    let mut config = match (&args.model_config, &args.weights) {
        (Some(path), _) => read_model_config(path)?,
        (None, Some(weights)) if metadata_path(weights).exists() => {
            let sidecar = metadata_path(weights);
            CheckpointMetadata::load(&sidecar)
                .with_context(|| format!("Failed to read metadata {}", sidecar.display()))?
                .config
        }
        _ => DermNetConfig::default(),
    };
    if let Some(layer) = &args.target_layer {
        config.target_layer = layer.clone();
    }
    Ok(config)
}

fn build_service(args: &ModelArgs, config: &ServeConfig) -> Result<DiagnosisService> {
    let model_config = resolve_model_config(args)?;
    let device = Default::default();
    let classifier = load_or_build::<GradBackend>(args.weights.as_deref(), &model_config, &device)
        .context("Failed to build classifier")?;
    DiagnosisService::from_dermnet(classifier, config).context("Failed to start diagnosis service")
}

fn handle_serve(
    model: ModelArgs,
    bind: SocketAddr,
    timeout_secs: u64,
    max_upload_bytes: usize,
    debug_errors: bool,
) -> Result<()> {
    if timeout_secs == 0 {
        bail!("--timeout-secs must be at least 1");
    }
    let config = ServeConfig::default()
        .with_bind_addr(bind)
        .with_request_timeout(Duration::from_secs(timeout_secs))
        .with_max_upload_bytes(max_upload_bytes)
        .with_error_details(debug_errors);

    let service = build_service(&model, &config)?;
    let state = Arc::new(ServerState::new(config, service));

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime
        .block_on(dermacam_serve::run_server(state))
        .context("Server error")
}

fn handle_predict(
    model: ModelArgs,
    image: PathBuf,
    overlay: Option<PathBuf>,
    format: OutputFormat,
) -> Result<()> {
    let bytes =
        std::fs::read(&image).with_context(|| format!("Failed to read {}", image.display()))?;

    let service = build_service(&model, &ServeConfig::default())?;
    let diagnosis = service
        .analyze(&bytes)
        .with_context(|| format!("Failed to analyze {}", image.display()))?;

    if let Some(path) = &overlay {
        let png = BASE64
            .decode(&diagnosis.visualization)
            .context("Overlay is not valid base64")?;
        std::fs::write(path, png)
            .with_context(|| format!("Failed to write overlay {}", path.display()))?;
    }

    let saliency = &diagnosis.saliency;
    match format {
        OutputFormat::Json => {
            let report = serde_json::json!({
                "image": image.display().to_string(),
                "predictions": diagnosis.predictions,
                "heatmap": {
                    "class": saliency.class(),
                    "layer": service.target_layer(),
                    "degenerate": saliency.is_degenerate(),
                    "max": saliency.max(),
                    "mean": saliency.mean(),
                    "peak": saliency.peak(),
                    "source_resolution": saliency.source_resolution(),
                },
                "overlay": overlay.as_ref().map(|p| p.display().to_string()),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Summary => {
            println!("Image: {}", image.display());
            println!("Weights: {}", service.weights());
            println!("─────────────────────────────────────────");
            for (rank, prediction) in diagnosis.predictions.iter().enumerate() {
                println!(
                    "  {}. {:<28} {:>6.2}%",
                    rank + 1,
                    prediction.class,
                    prediction.probability * 100.0
                );
            }
            println!("─────────────────────────────────────────");
            let (h, w) = saliency.source_resolution();
            if saliency.is_degenerate() {
                println!(
                    "Grad-CAM ({}, {}x{}): no positive evidence, heatmap is empty",
                    service.target_layer(),
                    h,
                    w
                );
            } else {
                let (row, col) = saliency.peak();
                println!(
                    "Grad-CAM ({}, {}x{}): peak at ({}, {}), mean {:.3}",
                    service.target_layer(),
                    h,
                    w,
                    row,
                    col,
                    saliency.mean()
                );
            }
            if let Some(path) = &overlay {
                println!("Overlay written to {}", path.display());
            }
        }
    }
    Ok(())
}

fn handle_init_weights(output: PathBuf, seed: u64, model_config: Option<PathBuf>) -> Result<()> {
    let config = match &model_config {
        Some(path) => read_model_config(path)?,
        None => DermNetConfig::default(),
    }
    .with_seed(Seed::new(seed));

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let device = Default::default();
    let written = init_weights::<NdArray>(&config, &output, &device)
        .with_context(|| format!("Failed to write weights to {}", output.display()))?;

    println!("Weights written to {}", written.display());
    println!("Metadata written to {}", metadata_path(&output).display());
    println!(
        "Architecture: DermNet filters {:?}, hidden {:?}, seed {}",
        config.n_filters,
        config.hidden,
        config.seed.value()
    );
    Ok(())
}
