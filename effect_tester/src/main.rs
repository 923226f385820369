use anyhow::{Context as _, bail};
use clap::Parser;
use image_processor::{
    AnimationController, EffectName, FrameSource, GeometricOp, ImageProcessor, ProcessorConfig, SessionEvent,
};
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser, Debug)]
#[command(name = "effect_tester", version)]
/// Plays an effect on an image and writes the frames it produces.
struct Cli {
    /// Where the final frame is saved (png, jpg, bmp or webp).
    output: Option<PathBuf>,

    /// Image to load. Without it the last loaded image is restored from the cache.
    #[arg(long, short)]
    input: Option<PathBuf>,

    /// Effect label or bare name, e.g. "2. Invert Colours" or "invert colours".
    #[arg(long, default_value = "1. Flip Byte Array")]
    effect: String,

    /// Animation speed, 1 (slowest) to 10 (fastest).
    #[arg(long, default_value_t = 10)]
    speed: u8,

    /// Number of animation frames to collect before stopping.
    #[arg(long, default_value_t = 10)]
    ticks: u64,

    /// Also write every frame as frame_NNNN.png (NNNN is the tick) into this directory.
    #[arg(long)]
    frames_dir: Option<PathBuf>,

    /// Directory holding the last-image cache.
    #[arg(long, conflicts_with = "no_cache")]
    cache_dir: Option<PathBuf>,

    /// Neither read nor update the last-image cache.
    #[arg(long, default_value_t = false)]
    no_cache: bool,

    /// List the available effects and geometric operations, then exit.
    #[arg(long, default_value_t = false)]
    list: bool,

    /// Log at debug level.
    #[arg(long, short, default_value_t = false)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Argument Parsing & Setup ---
    let cli = Cli::parse();
    if cli.verbose {
        tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();
    } else {
        tracing_subscriber::fmt::init();
    }

    if cli.list {
        for effect in EffectName::ALL {
            let note = if effect.is_pixel_addressed() { "  (32-bit BGRA only)" } else { "" };
            println!("{}{note}", effect.label());
        }
        for op in GeometricOp::ALL {
            println!("geometry: {op}");
        }
        return Ok(());
    }
    let Some(output) = cli.output.clone() else {
        bail!("an output path is required unless --list is given");
    };

    // --- 2. Processor Initialization ---
    let mut config = ProcessorConfig {
        initial_effect: cli.effect.clone(),
        ..ProcessorConfig::default()
    };
    if cli.no_cache {
        config.cache_dir = None;
    } else if let Some(dir) = &cli.cache_dir {
        config.cache_dir = Some(dir.clone());
    }
    let processor = ImageProcessor::new(config).context("invalid processor configuration")?;
    // Reject a bad selection up front; the loop would otherwise tick without frames.
    processor.library().lookup(&cli.effect)?;

    // --- 3. Image Loading ---
    let controller = AnimationController::new(processor);
    if let Some(input) = &cli.input {
        controller
            .load_image(input)
            .await
            .with_context(|| format!("load image '{}'", input.display()))?;
    } else if !controller.status().await.image_loaded {
        bail!("no --input given and no cached image to restore");
    }
    controller.set_speed(cli.speed).await?;

    if let Some(dir) = &cli.frames_dir {
        std::fs::create_dir_all(dir).with_context(|| format!("create frames dir '{}'", dir.display()))?;
    }

    // --- 4. Main Animation Loop ---
    let mut events = controller.subscribe();
    if cli.ticks > 0 {
        controller.play().await?;
    }
    let mut collected = 0u64;
    let mut frame_writes = Vec::new();
    while collected < cli.ticks {
        match events.recv().await {
            Ok(SessionEvent::FrameUpdated {
                source: FrameSource::Tick(tick),
                buffer,
                ..
            }) => {
                // --- 5. Frame Output ---
                // Encoding runs off the runtime so the receiver keeps draining events.
                // Files are named by tick, so frames dropped to lag show up as gaps.
                if let Some(dir) = &cli.frames_dir {
                    let path = dir.join(format!("frame_{tick:04}.png"));
                    let processor = controller.processor().clone();
                    frame_writes.push(tokio::task::spawn_blocking(move || {
                        processor
                            .save_image(&buffer, &path)
                            .with_context(|| format!("write frame '{}'", path.display()))
                    }));
                }
                tracing::debug!(tick, collected, "frame collected");
                collected += 1;
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "frame events were dropped");
            }
            Err(RecvError::Closed) => bail!("session closed before {} frames arrived", cli.ticks),
        }
    }

    // --- 6. Shutdown ---
    controller.stop().await?;
    controller.join_loop().await;
    for write in frame_writes {
        write.await.context("frame writer panicked")??;
    }
    controller
        .save(&output)
        .await
        .with_context(|| format!("save output '{}'", output.display()))?;

    println!("Processing complete. {collected} frames, output saved to {}", output.display());
    Ok(())
}
