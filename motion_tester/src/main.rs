use anyhow::{Context, Result, bail};
use futures::StreamExt;
use grid_motion::{
    ChangedCell, Config, DetectionTimeline, FrameBroadcaster, FrameGate, GateConfig, I420Frame, MotionEvent,
    Rotation,
};
use image::{GrayImage, Rgb, RgbImage, imageops};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_FRAME_INTERVAL_MS: u64 = 33;
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Argument Parsing & Setup ---
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        println!("Usage: motion_tester <frames_dir> <output_dir> [frame_interval_ms] [rotation] [config.toml]");
        return Ok(());
    }
    let input_dir = PathBuf::from(&args[1]);
    let output_dir = PathBuf::from(&args[2]);
    let frame_interval_ms = match args.get(3) {
        Some(arg) => arg.parse::<u64>().context("frame interval must be a whole number of milliseconds")?,
        None => DEFAULT_FRAME_INTERVAL_MS,
    }
    .max(1);
    let rotation = match args.get(4) {
        Some(arg) => arg.parse::<i32>().context("rotation must be 0, 90, 180 or 270")?,
        None => 0,
    };
    let config = match args.get(5) {
        Some(path) => Config::load(Path::new(path))?,
        None => Config::default(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    // --- 2. Frame Loading ---
    let frames = Arc::new(load_frames(&input_dir)?);
    if frames.is_empty() {
        bail!("no decodable frames in {}", input_dir.display());
    }
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;
    info!(frames = frames.len(), frame_interval_ms, rotation, "replaying frames");

    // --- 3. Detector Initialization ---
    let gate = FrameGate::new(GateConfig::from(&config.detection))?;
    let timeline = Arc::new(DetectionTimeline::new(gate.sample_interval()));
    gate.set_listener(timeline.clone());
    let mut events = Box::pin(gate.events());

    let source = Arc::new(FrameBroadcaster::new());
    gate.configure(config.detection.request(), source.clone());
    if !gate.is_started() {
        warn!("detection is disabled in the config, nothing will be reported");
    }
    timeline.begin();

    // --- 4. Replay Loop ---
    let mut replay = {
        let frames = Arc::clone(&frames);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(frame_interval_ms));
            for image in frames.iter() {
                ticker.tick().await;
                source.deliver(&I420Frame::from_luma_image(image, rotation));
            }
        })
    };

    let upright = Rotation::from_degrees_or_identity(rotation);
    let mut motion_events = 0usize;
    loop {
        tokio::select! {
            event = events.next() => match event {
                Some(event) => {
                    motion_events += handle_event(&event, &frames, frame_interval_ms, upright, &output_dir)?;
                }
                None => break,
            },
            finished = &mut replay => {
                finished.context("replay task failed")?;
                break;
            }
        }
    }

    // --- 5. Drain & Report ---
    while let Ok(Some(event)) = tokio::time::timeout(DRAIN_TIMEOUT, events.next()).await {
        motion_events += handle_event(&event, &frames, frame_interval_ms, upright, &output_dir)?;
    }
    gate.dispose();

    let timeline_path = output_dir.join("timeline.json");
    std::fs::write(&timeline_path, timeline.to_json()?)
        .with_context(|| format!("failed to write {}", timeline_path.display()))?;

    println!(
        "Processing complete. {} events with motion, timeline saved to {}",
        motion_events,
        timeline_path.display()
    );
    Ok(())
}

/// Prints the event and renders an overlay when it carries motion. Returns 1 for motion.
fn handle_event(
    event: &MotionEvent,
    frames: &[GrayImage],
    frame_interval_ms: u64,
    rotation: Rotation,
    output_dir: &Path,
) -> Result<usize> {
    println!("{}", event.to_json()?);
    if event.cells.is_empty() {
        return Ok(0);
    }

    // Frames are delivered on a fixed cadence from session start.
    let index = ((event.timestamp_ms / frame_interval_ms) as usize).min(frames.len() - 1);
    let overlay = render_overlay(&frames[index], rotation, &event.cells);
    let path = output_dir.join(format!("motion_{:05}.png", event.sequence));
    overlay
        .save(&path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(1)
}

fn load_frames(dir: &Path) -> Result<Vec<GrayImage>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .collect();
    paths.sort();

    let mut frames = Vec::with_capacity(paths.len());
    for path in paths {
        match image::open(&path) {
            Ok(image) => frames.push(image.to_luma8()),
            Err(e) => warn!(path = %path.display(), error = %e, "skipping undecodable file"),
        }
    }
    Ok(frames)
}

/// Dims the upright frame and paints changed cells over it.
fn render_overlay(frame: &GrayImage, rotation: Rotation, cells: &[ChangedCell]) -> RgbImage {
    let upright = match rotation {
        Rotation::Deg0 => frame.clone(),
        Rotation::Deg90 => imageops::rotate90(frame),
        Rotation::Deg180 => imageops::rotate180(frame),
        Rotation::Deg270 => imageops::rotate270(frame),
    };
    let (width, height) = upright.dimensions();

    // Multiply by 0.4 to push inactive regions into the background.
    let mut overlay = RgbImage::from_fn(width, height, |x, y| {
        let dimmed = (upright.get_pixel(x, y).0[0] as f32 * 0.4) as u8;
        Rgb([dimmed, dimmed, dimmed])
    });

    for cell in cells {
        let x0 = (cell.rect.left * width as f32).round() as u32;
        let y0 = (cell.rect.top * height as f32).round() as u32;
        let x1 = ((cell.rect.right * width as f32).round() as u32).min(width);
        let y1 = ((cell.rect.bottom * height as f32).round() as u32).min(height);
        for y in y0..y1 {
            for x in x0..x1 {
                let luma = upright.get_pixel(x, y).0[0];
                overlay.put_pixel(x, y, Rgb([255, luma / 2, luma / 2]));
            }
        }
    }
    overlay
}
