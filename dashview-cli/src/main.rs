//! Dashview CLI Tool
//!
//! Command-line interface for listing dashcam events, playing them back
//! headlessly and rendering multi-camera snapshots.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dashview_core::{
    format_clock, BlockingPool, CameraRole, Category, EventId, EventLibrary, FrameSlot, InlineDispatcher, PlayState,
    PlaybackSession, Viewer, ViewerConfig,
};
use dashview_decoder::{FfmpegBackend, GridCompositor};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dashview")]
#[command(about = "Browse and replay multi-camera dashcam footage")]
#[command(version)]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List recording events found under a footage root
    Scan {
        /// Footage root containing SavedClips, SentryClips and RecentClips
        root: PathBuf,

        /// Only list events of this category (saved, sentry, recent)
        #[arg(long)]
        category: Option<Category>,

        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Play an event headlessly, reporting the clock and camera status
    Play {
        /// Footage root
        root: PathBuf,

        /// Event id as printed by `scan`
        #[arg(long)]
        event: String,

        /// Playback speed factor
        #[arg(long)]
        speed: Option<f64>,

        /// Start position in seconds
        #[arg(long)]
        from: Option<f64>,

        /// Restart from the beginning at the end of the event
        #[arg(long = "loop")]
        looping: bool,

        /// Stop after this many wall-clock seconds
        #[arg(long)]
        seconds: Option<f64>,
    },

    /// Render all cameras at one position into a grid image
    Snapshot {
        /// Footage root
        root: PathBuf,

        /// Event id as printed by `scan`
        #[arg(long)]
        event: String,

        /// Position in seconds from the start of the event
        #[arg(long)]
        at: f64,

        /// Output image path (format taken from the extension)
        #[arg(short, long)]
        output: PathBuf,

        /// Width of each camera tile
        #[arg(long, default_value = "640")]
        tile_width: u32,

        /// Height of each camera tile
        #[arg(long, default_value = "480")]
        tile_height: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Scan { root, category, json } => scan_footage(&root, &config, category, json)?,

        Commands::Play {
            root,
            event,
            speed,
            from,
            looping,
            seconds,
        } => play_event(root, config, event, speed, from, looping, seconds).await?,

        Commands::Snapshot {
            root,
            event,
            at,
            output,
            tile_width,
            tile_height,
        } => {
            let compositor = GridCompositor::new(tile_width, tile_height);
            tokio::task::spawn_blocking(move || snapshot(&root, &config, &event, at, &output, &compositor))
                .await
                .context("Snapshot task failed")??
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<ViewerConfig> {
    match path {
        Some(path) => ViewerConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(ViewerConfig::default()),
    }
}

fn scan_footage(root: &Path, config: &ViewerConfig, category: Option<Category>, json: bool) -> Result<()> {
    let library = EventLibrary::scan(root, config).context("Failed to scan footage root")?;
    let events = library.list(category);
    let summary = library.summary();

    if json {
        let ignored: Vec<_> = summary
            .ignored
            .iter()
            .map(|f| serde_json::json!({ "path": f.path, "reason": f.reason.to_string() }))
            .collect();
        let output = serde_json::json!({
            "root": summary.root,
            "events": events,
            "segments": summary.per_category,
            "ignored": ignored,
            "missing_folders": summary.missing_folders,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Footage root: {}", root.display());
    for (category, count) in &summary.per_category {
        println!("  {:<7} {} segments", category.as_str(), count);
    }
    for folder in &summary.missing_folders {
        println!("  {:<7} folder {} not found", folder.as_str(), folder.folder_name());
    }
    if !summary.ignored.is_empty() {
        println!("  Ignored {} files", summary.ignored.len());
    }

    println!();
    if events.is_empty() {
        println!("No events found");
        return Ok(());
    }
    for event in &events {
        let cameras: Vec<_> = event.cameras.iter().map(|c| c.token()).collect();
        println!(
            "{:<30} {:<7} {}  {:>8}  {:>3} segments  [{}]",
            event.id.as_str(),
            event.category.as_str(),
            event.start.format("%Y-%m-%d %H:%M:%S"),
            format_clock(event.duration_secs),
            event.segment_count,
            cameras.join(", ")
        );
    }

    Ok(())
}

fn describe(role: CameraRole, slot: &FrameSlot) -> String {
    match slot.frame() {
        Some(frame) => format!("{}@{:.2}", role.token(), frame.pts),
        None => format!("{}:--", role.token()),
    }
}

async fn play_event(
    root: PathBuf,
    mut config: ViewerConfig,
    event: String,
    speed: Option<f64>,
    from: Option<f64>,
    looping: bool,
    seconds: Option<f64>,
) -> Result<()> {
    config.playback.looping |= looping;
    let workers = config.playback.decode_workers;
    let backend = Arc::new(FfmpegBackend::new());
    let dispatcher = Arc::new(BlockingPool::new(tokio::runtime::Handle::current(), workers));

    let mut viewer = Viewer::new(root, config, backend, dispatcher).context("Failed to scan footage root")?;
    let id = EventId::from(event);
    viewer
        .open_event(&id)
        .await
        .with_context(|| format!("Failed to open event {}", id))?;

    if let Some(speed) = speed {
        viewer.set_speed(speed).await.context("Failed to set speed")?;
    }
    viewer.play().await?;
    if let Some(from) = from {
        viewer.seek(from).await?;
    }

    let deadline = seconds.map(|s| Instant::now() + Duration::from_secs_f64(s.max(0.0)));
    let mut report = tokio::time::interval(Duration::from_secs(1));
    loop {
        report.tick().await;

        let Some(state) = viewer.current_state().await else {
            bail!("Playback session ended unexpectedly");
        };
        let mut cameras = Vec::new();
        for role in CameraRole::KNOWN {
            cameras.push(describe(role, &viewer.poll_frame(role).await));
        }
        info!("{} [{}] {}", state.label(), state.play_state, cameras.join(" "));

        if state.play_state == PlayState::Stopped {
            break;
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
    }

    viewer.close().await;
    Ok(())
}

fn snapshot(
    root: &Path,
    config: &ViewerConfig,
    event: &str,
    at: f64,
    output: &Path,
    compositor: &GridCompositor,
) -> Result<()> {
    let library = EventLibrary::scan(root, config).context("Failed to scan footage root")?;
    let id = EventId::from(event);
    let Some(event) = library.get(&id).cloned() else {
        bail!("Unknown event: {}", id);
    };

    let mut session = PlaybackSession::open(
        event,
        Arc::new(FfmpegBackend::new()),
        Arc::new(InlineDispatcher),
        &config.timeline,
        &config.playback,
    )
    .with_context(|| format!("Failed to open event {}", id))?;

    session.play()?;
    session.pause()?;
    session.seek(at)?;
    session.tick(Instant::now())?;

    let frames: Vec<_> = CameraRole::KNOWN
        .iter()
        .map(|&role| (role, session.poll_frame(role)))
        .collect();
    for (role, slot) in &frames {
        if !slot.is_image() && session.cameras().any(|c| c == *role) {
            warn!("No frame for {} camera at {:.2}s", role, at);
        }
    }

    let grid = compositor.compose(frames.iter().map(|(role, slot)| (*role, slot)));
    grid.save(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    let state = session.state();
    info!(
        "Wrote {} at {} ({})",
        output.display(),
        state.label(),
        frames
            .iter()
            .map(|(role, slot)| describe(*role, slot))
            .collect::<Vec<_>>()
            .join(" ")
    );
    session.close();
    Ok(())
}
