use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use presence_capture::{
    spawn_engine, CaptureConfig, CaptureSession, GeofencedSink, SessionOutcome, TokioScheduler,
};
use presence_core::{Frame, GeoLocation, Geofence};
use tracing_subscriber::EnvFilter;

mod console;
mod replay;
mod rpc;

use console::{render_report, ConsoleStatus};
use replay::{list_frames, ReplaySource};
use rpc::{CliSink, RpcSubmissionSink};

#[derive(Parser)]
#[command(name = "presence", version, about = "Liveness-gated face attendance capture")]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check still images for face suitability (exposure, contrast, size)
    Score {
        #[arg(required = true)]
        images: Vec<PathBuf>,
        /// Print one JSON object per image
        #[arg(long)]
        json: bool,
    },
    /// Print the dissimilarity of two images (0 = identical, 255 = inverted)
    Diff { a: PathBuf, b: PathBuf },
    /// Run the liveness check over the images of a directory, in name order
    Evaluate {
        dir: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Run a full capture session against a directory of replayed frames
    Run {
        /// Directory of frames standing in for the camera
        #[arg(long)]
        frames: PathBuf,
        /// JSON-RPC endpoint; without it the submission is a dry run
        #[arg(long)]
        submit_url: Option<String>,
        #[arg(long, requires = "lon", allow_hyphen_values = true)]
        lat: Option<f64>,
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lon: Option<f64>,
        /// TOML file of `[[area]]` entries checked before submitting
        #[arg(long)]
        geofence: Option<PathBuf>,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Commands::Score { images, json } => score_images(&images, json),
        Commands::Diff { a, b } => diff_images(&a, &b),
        Commands::Evaluate { dir, config, json } => evaluate_dir(&dir, config.as_deref(), json),
        Commands::Run {
            frames,
            submit_url,
            lat,
            lon,
            geofence,
            config,
            json,
        } => {
            let location = match (lat, lon) {
                (Some(lat), Some(lon)) => Some(GeoLocation::new(lat, lon)),
                _ => None,
            };
            run_session(
                frames,
                submit_url,
                location,
                geofence.as_deref(),
                config.as_deref(),
                json,
            )
            .await
        }
    }
}

fn read_frame(path: &Path) -> Result<Frame> {
    let data = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(Frame::new(data))
}

fn score_images(images: &[PathBuf], json: bool) -> Result<ExitCode> {
    let mut all_accepted = true;
    for path in images {
        let frame = read_frame(path)?;
        match presence_core::measure(frame.data()) {
            Ok(stats) => {
                let accepted = stats.is_valid_face();
                all_accepted &= accepted;
                if json {
                    let line = serde_json::json!({
                        "path": path.display().to_string(),
                        "accepted": accepted,
                        "stats": stats,
                    });
                    println!("{line}");
                } else {
                    println!(
                        "{}: {} (brightness {:.1}, contrast {:.1}, {} px)",
                        path.display(),
                        if accepted { "accepted" } else { "rejected" },
                        stats.brightness,
                        stats.contrast,
                        stats.pixel_count
                    );
                }
            }
            Err(e) => {
                all_accepted = false;
                if json {
                    let line = serde_json::json!({
                        "path": path.display().to_string(),
                        "accepted": false,
                        "error": e.to_string(),
                    });
                    println!("{line}");
                } else {
                    println!("{}: rejected ({e})", path.display());
                }
            }
        }
    }
    Ok(if all_accepted {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn diff_images(a: &Path, b: &Path) -> Result<ExitCode> {
    let (fa, fb) = (read_frame(a)?, read_frame(b)?);
    let difference = presence_core::try_diff(&fa, &fb).context("failed to compare images")?;
    println!("{difference:.3}");
    Ok(ExitCode::SUCCESS)
}

fn evaluate_dir(dir: &Path, config: Option<&Path>, json: bool) -> Result<ExitCode> {
    let config = CaptureConfig::load(config).context("failed to load capture config")?;
    let paths = list_frames(dir).with_context(|| format!("failed to list {}", dir.display()))?;
    if paths.is_empty() {
        bail!("no images found in {}", dir.display());
    }
    let frames = paths
        .iter()
        .map(|p| read_frame(p))
        .collect::<Result<Vec<_>>>()?;

    let result = presence_core::evaluate(&frames, config.required_frames, &config.liveness);
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!(
            "{}: avg {:.2}, peak {:.2} over {} pairs{}",
            if result.is_live { "live" } else { "not live" },
            result.avg_variation,
            result.max_variation,
            result.frame_pairs_analysed,
            result
                .rejection
                .map(|r| format!(" ({r:?})"))
                .unwrap_or_default()
        );
    }
    Ok(if result.is_live {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn load_geofence(path: &Path) -> Result<Geofence> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read geofence {}", path.display()))?;
    let fence: Geofence = toml::from_str(&text)
        .with_context(|| format!("invalid geofence {}", path.display()))?;
    for area in &fence.areas {
        if !(area.radius_m > 0.0) {
            bail!("geofence area {:?} needs a positive radius_m", area.name);
        }
    }
    Ok(fence)
}

async fn run_session(
    frames: PathBuf,
    submit_url: Option<String>,
    location: Option<GeoLocation>,
    geofence: Option<&Path>,
    config: Option<&Path>,
    json: bool,
) -> Result<ExitCode> {
    let config = CaptureConfig::load(config).context("failed to load capture config")?;
    let fence = match geofence {
        Some(path) => load_geofence(path)?,
        None => Geofence::default(),
    };
    tracing::info!(
        frames = %frames.display(),
        areas = fence.areas.len(),
        dry_run = submit_url.is_none(),
        "starting capture"
    );

    let sink = match submit_url {
        Some(url) => CliSink::Rpc(RpcSubmissionSink::new(url)),
        None => CliSink::DryRun,
    };
    let session = CaptureSession::new(
        config,
        ReplaySource::new(frames),
        location,
        GeofencedSink::new(fence, sink),
        ConsoleStatus,
        TokioScheduler,
    )
    .context("invalid capture config")?;
    let engine = spawn_engine(session).context("failed to start capture engine")?;

    let start = engine.start();
    tokio::pin!(start);
    let report = tokio::select! {
        report = &mut start => report,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted, cancelling session");
            engine.cancel();
            start.await
        }
    }
    .context("capture session failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_report(&report));
    }

    let submitted = report.submission.as_ref().map(|s| s.success).unwrap_or(false);
    Ok(if report.outcome == SessionOutcome::Succeeded && submitted {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
