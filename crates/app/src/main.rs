mod api;
mod devices;

use std::{
    future::IntoFuture,
    path::{Path, PathBuf},
};

use chromatic_core::{
    AppConfig, ChromaticError, ControlLoop, ExtractMode, Preset, Region, Result,
};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;

use devices::{FileCapture, JsonLinesSink};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, bind } => {
            let config = AppConfig::load(config)?;
            init_tracing(&config.log_level);
            run_live(config, bind).await
        }
        Commands::Sample {
            config,
            image,
            mode,
        } => {
            let config = match config {
                Some(path) => AppConfig::load(path)?,
                None => AppConfig::default(),
            };
            init_tracing(&config.log_level);
            run_sample(&config, &image, mode)
        }
    }
}

async fn run_live(config: AppConfig, bind: Option<String>) -> Result<()> {
    let regions = config.regions()?;
    if regions.is_empty() {
        return Err(ChromaticError::invalid("no lights are configured"));
    }

    let capture = FileCapture::open(&config.video.device)?;
    let mut control = ControlLoop::new(capture, JsonLinesSink::stdout(), regions, config.extractor());
    control.configure_capture(&config.video.capture_config())?;

    let (handle, commands) = chromatic_core::channel();
    let (done, finished) = oneshot::channel();
    std::thread::Builder::new()
        .name("control-loop".into())
        .spawn(move || {
            let _ = done.send(control.run(commands));
        })?;

    let bind = bind.unwrap_or(config.bind);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!(%bind, "control surface listening");
    let server = axum::serve(listener, api::router(handle.clone())).into_future();

    let finished = async move {
        finished
            .await
            .unwrap_or_else(|_| Err(ChromaticError::msg("control loop thread panicked")))
    };
    tokio::pin!(finished);

    tokio::select! {
        result = &mut finished => return result,
        served = server => served?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted, stopping control loop");
            handle.stop()?;
        }
    }

    finished.await
}

#[derive(Serialize)]
struct RegionReport {
    id: u32,
    rect: String,
    hex: String,
    xyy: [f32; 3],
}

fn run_sample(config: &AppConfig, path: &Path, mode: Option<ExtractMode>) -> Result<()> {
    let mut regions = config.regions()?;
    if regions.is_empty() {
        regions.push(Preset::Whole.region(0));
    }

    let mut extraction = config.extraction.clone();
    if let Some(mode) = mode {
        extraction.mode = mode;
    }
    let extractor = AppConfig {
        extraction,
        ..config.clone()
    }
    .extractor();

    let frame = chromatic_core::frame_from_image(image::open(path)?);
    tracing::info!(image = %path.display(), width = frame.width(), height = frame.height(), mode = ?extractor.mode(), "sampling image");

    let sample = extractor.sample(&frame, &regions);
    let report: Vec<RegionReport> = regions
        .iter()
        .filter_map(|region: &Region| {
            let color = sample.get(&region.id())?;
            Some(RegionReport {
                id: region.id(),
                rect: region.rectangle(frame.width(), frame.height()).to_string(),
                hex: color.hex(),
                xyy: color.chromaticity(),
            })
        })
        .collect();

    let rendered = serde_json::to_string_pretty(&report)
        .map_err(|err| ChromaticError::msg(err.to_string()))?;
    println!("{rendered}");
    Ok(())
}

fn init_tracing(level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Ambient lighting controller", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Capture frames and stream region colours until stopped over HTTP.
    Run {
        /// Path to the JSON configuration file.
        #[arg(short, long)]
        config: PathBuf,
        /// Overrides the listen address from the configuration.
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Print the colour of every configured region for a single image.
    Sample {
        /// Optional configuration file providing the light bindings.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Image to sample.
        image: PathBuf,
        /// Extraction mode, overriding the configuration.
        #[arg(short, long)]
        mode: Option<ExtractMode>,
    },
}
