use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use realeyez_lib::{logging, AnalysisController, ErrorCallback, PipelineConfig, SyntheticSource};

/// Play a synthetic video and estimate its deepfake probability in realtime.
#[derive(Parser, Debug)]
#[command(name = "realeyez", version)]
struct Cli {
    /// Pipeline configuration file (JSON). Missing file means defaults.
    #[arg(long, env = "REALEYEZ_CONFIG", default_value = "realeyez.json")]
    config: PathBuf,

    /// Inference service root; overrides the file and environment.
    #[arg(long)]
    base_url: Option<String>,

    /// Length of the synthetic video in seconds.
    #[arg(long, default_value_t = 10.0)]
    duration: f64,

    /// Frame rate of the synthetic video.
    #[arg(long, default_value_t = 30.0)]
    fps: f64,

    #[arg(long, default_value_t = 640)]
    width: u32,

    #[arg(long, default_value_t = 360)]
    height: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init(logging::DEFAULT_FILTER);
    let cli = Cli::parse();

    let mut config = PipelineConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?
        .with_env_overrides()
        .context("applying environment overrides")?;
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
    }
    config.validate()?;
    info!("inference endpoint: {}", config.frame_endpoint());

    let failures = Arc::new(AtomicU64::new(0));
    let on_error: ErrorCallback = {
        let failures = Arc::clone(&failures);
        Arc::new(move |_, _| {
            failures.fetch_add(1, Ordering::Relaxed);
        })
    };

    let source = Arc::new(SyntheticSource::new(
        cli.width,
        cli.height,
        cli.fps,
        cli.duration,
    ));
    let controller = AnalysisController::spawn(config, source.clone(), Some(on_error))
        .context("starting analysis pipeline")?;
    let mut visible = controller.subscribe();
    let mut analyzing = controller.watch_analyzing();

    source.play();
    let session = controller.start();
    info!(
        "analysing {:.1}s of {}x{} synthetic video as {}",
        source.duration_secs(),
        cli.width,
        cli.height,
        session.id()
    );

    loop {
        tokio::select! {
            changed = visible.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = visible.borrow_and_update().clone();
                match state.last_updated_at {
                    Some(at) => info!("{at}: {:.1}% deepfake", state.probability),
                    None => info!("estimate reset"),
                }
            }
            _ = analyzing.wait_for(|busy| !*busy) => break,
            _ = tokio::signal::ctrl_c() => {
                controller.stop(&session);
                break;
            }
        }
    }

    let snapshot = controller.stats();
    info!(
        "done: {} submitted, {} applied, {} failed",
        snapshot.frames_submitted,
        snapshot.results_applied,
        failures.load(Ordering::Relaxed)
    );
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}
