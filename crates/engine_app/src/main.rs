//! # engine_app: demo runner
//!
//! Loads a demo scene into an [`Engine`] and runs the frame loop until the
//! frame limit is reached or Ctrl-C is pressed.
//!
//! ## Configuration
//!
//! `ENGINE_MAX_LOOPS_PER_SECOND` and `ENGINE_MAX_FRAMES` are read from the
//! environment first; command line flags override them.

mod demo;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use engine_core::{Engine, EngineConfig};

#[derive(Debug, Parser)]
#[command(name = "engine_app", about = "Run a demo scene through the frame scheduler")]
struct Args {
    /// Maximum frames per second (0 = unlimited).
    #[arg(long)]
    max_fps: Option<f32>,

    /// Stop after this many frames (0 = run until Ctrl-C).
    #[arg(long)]
    frames: Option<u64>,

    /// Number of spinning entities in the demo scene.
    #[arg(long, default_value_t = 8)]
    entities: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("engine_app=info".parse()?)
                .add_directive("engine_core=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let mut config = EngineConfig::from_env()?;
    if let Some(max_fps) = args.max_fps {
        config = config.with_max_loops_per_second(max_fps);
    }
    if let Some(frames) = args.frames {
        config = config.with_max_frames(frames);
    }

    let mut engine = Engine::new(config)?;
    let counter = engine.add_module::<demo::FrameCounter>()?;
    engine.load_scene(demo::build_scene(args.entities).await?).await?;

    let stop = engine.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping after the current frame");
            stop.stop();
        }
    });

    let frames = engine.run().await;
    if let Err(err) = engine.shutdown().await {
        warn!(error = %err, "shutdown did not complete cleanly");
    }

    info!(
        frames,
        counted = counter.map_or(0, |c| c.frames()),
        "engine shut down"
    );
    Ok(())
}
