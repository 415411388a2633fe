use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{Level, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use dream_canvas::config::Configuration;
use dream_canvas::service::StableDiffusionClient;
use dream_canvas::tasks::{generator::Generator, viewer};

#[derive(Debug, Parser)]
#[command(
    name = "dream-canvas",
    version,
    about = "Pan through an endlessly tiled, endlessly regenerated image"
)]
struct Args {
    /// Path to YAML config; built-in defaults are used when omitted
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,
    /// Override the generation prompt
    #[arg(long)]
    prompt: Option<String>,
    /// Override the image service base URL
    #[arg(long = "base-url", value_name = "URL")]
    base_url: Option<String>,
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbosity: u8) -> Result<()> {
    // map -v to log level
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let mut filter = EnvFilter::from_default_env();
    for directive in [
        format!("dream_canvas={level}"),
        "winit=warn".to_string(),
        "reqwest=warn".to_string(),
        "hyper=warn".to_string(),
    ] {
        filter = filter.add_directive(
            directive
                .parse()
                .with_context(|| format!("invalid log directive {directive}"))?,
        );
    }
    fmt().with_env_filter(filter).with_target(true).init();
    Ok(())
}

fn load_config(args: &Args) -> Result<Configuration> {
    let mut cfg = match args.config.as_ref() {
        Some(path) => Configuration::from_yaml_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => Configuration::default(),
    };
    if let Some(prompt) = args.prompt.clone() {
        cfg.generation.prompt = prompt;
    }
    if let Some(base_url) = args.base_url.clone() {
        cfg.service.base_url = base_url;
    }
    cfg.validated().context("invalid configuration values")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose)?;

    let cfg = load_config(&args)?;
    tracing::debug!("effective configuration:\n{:#?}", cfg);

    let client = StableDiffusionClient::from_config(&cfg.service)
        .context("failed to build image service client")?;
    let cancel = CancellationToken::new();

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "failed to listen for ctrl-c");
                return;
            }
            info!("ctrl-c received; shutting down");
            cancel.cancel();
        });
    }

    let (generator, worker) = Generator::spawn(client, cancel.clone());
    let generator = Arc::new(generator);
    info!(
        base_url = %cfg.service.base_url,
        prompt = %cfg.generation.prompt,
        "starting viewer"
    );

    // winit wants the main thread.
    let result = viewer::run_windowed(cfg, generator.clone(), cancel.clone());

    cancel.cancel();
    if let Err(err) = worker.await {
        warn!(error = %err, "generation worker ended abnormally");
    }
    let status = generator.status();
    info!(
        delivered = status.delivered,
        failed = status.failed,
        "shutdown complete"
    );
    result
}
