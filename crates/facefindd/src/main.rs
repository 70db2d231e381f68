use anyhow::{bail, Context, Result};
use clap::Parser;
use facefind_core::{JpegCropWriter, OnnxFaceFinder};
use facefindd::{Config, Dispatcher, ResponseEncoder};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Match query photos against a face gallery over a stdin/stdout line protocol.
///
/// Each input line is `<image_path>,<cache_directory>`; each response is one
/// JSON array line. Send `quit` to stop.
#[derive(Parser)]
#[command(name = "facefindd", version)]
struct Cli {
    /// Directory of known-identity images.
    gallery: PathBuf,

    /// ONNX model directory (overrides FACEFIND_MODEL_DIR).
    #[arg(long)]
    model_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    // Stdout is the protocol stream; all diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(dir) = cli.model_dir {
        config.model_dir = dir;
    }

    if !cli.gallery.is_dir() {
        bail!("gallery directory not found: {}", cli.gallery.display());
    }

    tracing::info!(
        gallery = %cli.gallery.display(),
        model_dir = %config.model_dir.display(),
        "facefindd starting"
    );

    let finder = OnnxFaceFinder::load(&config.model_dir).context("loading recognition models")?;
    let encoder = ResponseEncoder::new(JpegCropWriter::new(config.jpeg_quality));
    let mut dispatcher = Dispatcher::new(finder, encoder, cli.gallery, config.find_options());

    tracing::info!("facefindd ready");

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let termination = dispatcher.run(stdin.lock(), &mut stdout.lock())?;

    tracing::info!(?termination, "facefindd shutting down");
    Ok(())
}
