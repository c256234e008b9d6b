use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::object_manager::SyncOutcome;
use crate::progress::Progress;
use crate::scene_file::SceneFile;
use crate::server::{RecordingServer, ServerCall};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a scene file against a recording render server
    Sync {
        /// Scene description (JSON)
        #[arg(long)]
        scene: PathBuf,

        /// Number of frames to synchronize
        #[arg(long, default_value_t = 1)]
        frames: usize,

        /// Write the session log here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,

        /// Destroy every object after the last frame
        #[arg(long)]
        teardown: bool,
    },
}

/// Everything a session sent to the server, frame by frame.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionLog {
    pub outcomes: Vec<SyncOutcome>,
    pub calls: Vec<ServerCall>,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Sync {
            scene,
            frames,
            out,
            teardown,
        } => {
            let file = SceneFile::from_file(&scene)?;
            let log = replay(&file, frames, teardown)?;
            write_log(&log, out.as_deref())?;
        }
    }
    Ok(())
}

/// Build the scene from `file` and synchronize it for `frames` frames.
///
/// Frame `n > 0` first applies `file.frames[n - 1]` when present.
pub fn replay(file: &SceneFile, frames: usize, teardown: bool) -> Result<SessionLog> {
    file.validate().map_err(|e| anyhow::anyhow!(e))?;
    let mut scene = file.build_scene()?;
    let mut server = RecordingServer::new();
    let progress = Progress::new();
    let mut outcomes = Vec::with_capacity(frames);

    log::info!(
        "Synchronizing {} objects over {} frame(s)",
        scene.object_count(),
        frames
    );

    for frame in 0..frames {
        scene.settings.first_frame = frame == 0;
        if frame > 0 {
            if let Some(edits) = file.frames.get(frame - 1) {
                file.apply_frame(&mut scene, edits, &mut server)
                    .with_context(|| format!("Failed to apply edits for frame {}", frame))?;
            }
        }

        let outcome = scene
            .synchronize_objects(&mut server, &progress)
            .with_context(|| format!("Synchronization failed on frame {}", frame))?;
        match &outcome {
            SyncOutcome::Skipped => log::info!("Frame {}: nothing to do", frame),
            SyncOutcome::Completed(report) => log::info!(
                "Frame {}: {} upload(s), {} failed",
                frame,
                report.total_uploads(),
                report.failed_uploads
            ),
            SyncOutcome::Cancelled { .. } => log::warn!("Frame {}: cancelled", frame),
        }
        outcomes.push(outcome);
    }

    if teardown {
        scene.clear(&mut server)?;
        log::info!("Teardown: {} delete(s)", server.deleted_names().len());
    }

    Ok(SessionLog {
        outcomes,
        calls: server.take_calls(),
    })
}

fn write_log(log: &SessionLog, out: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(log)?;
    match out {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write session log to {:?}", path))?;
            println!("Session log written to {:?}", path);
        }
        None => println!("{}", json),
    }
    Ok(())
}
