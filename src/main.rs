//! Drome CLI - play, render and inspect rhythm patches

use clap::{Parser, Subcommand};
use drome::patch::PatchFile;
use drome::pattern_array::PatternArray;
use drome::render::{render_patch, RenderConfig};
use drome::scheduler::Scheduler;
use drome::tone::TracingToneGenerator;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "drome")]
#[command(about = "Drome live coding rhythm engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a patch in real time, logging every note
    Play {
        /// Patch file (.toml)
        patch: PathBuf,

        /// Seconds to play before stopping
        #[arg(short, long, default_value = "8.0")]
        seconds: f64,

        /// Override the patch tempo (BPM)
        #[arg(short, long)]
        tempo: Option<f64>,
    },

    /// Schedule a patch offline and print the resulting notes
    Render {
        /// Patch file (.toml)
        patch: PathBuf,

        /// Seconds of timeline to render
        #[arg(short, long, default_value = "8.0")]
        seconds: f64,

        /// Print one JSON object per note
        #[arg(long)]
        json: bool,
    },

    /// Print a Euclidean rhythm
    Euclid {
        pulses: usize,
        steps: usize,

        #[arg(default_value = "0", allow_hyphen_values = true)]
        rotation: i64,

        /// Repeat each step this many times
        #[arg(long, default_value = "1")]
        stretch: usize,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Play {
            patch,
            seconds,
            tempo,
        } => {
            let patch = PatchFile::load(&patch)?;
            let scheduler = Scheduler::realtime(patch.clock.clone(), TracingToneGenerator)?;
            patch.install(&scheduler)?;
            if let Some(bpm) = tempo {
                scheduler.set_tempo(bpm);
            }

            scheduler.on_iteration_start(|n| debug!("Starting iteration {}", n));

            info!("▶ Playing for {:.1}s (step {:.3}s)", seconds, scheduler.step_duration());
            scheduler.start();
            std::thread::sleep(Duration::from_secs_f64(seconds.max(0.0)));
            let stats = scheduler.stats();
            scheduler.stop();

            info!(
                "⏹ Stopped: {} steps, {} notes, {} dropped, {} failed",
                stats.fired_steps, stats.dispatched_notes, stats.dropped_steps, stats.failed_notes
            );
        }

        Commands::Render {
            patch,
            seconds,
            json,
        } => {
            let patch = PatchFile::load(&patch)?;
            let rendered = render_patch(
                &patch,
                &RenderConfig {
                    start_time: 0.0,
                    duration: seconds,
                },
            )?;

            for note in &rendered.notes {
                if json {
                    println!("{}", serde_json::to_string(note)?);
                } else {
                    println!(
                        "{:>9.4}  {:>9.2} Hz  {:<8}  gain {:.2}",
                        note.time, note.frequency, note.waveform, note.gain
                    );
                }
            }
            info!("{} note(s) in {:.2}s", rendered.notes.len(), seconds);
        }

        Commands::Euclid {
            pulses,
            steps,
            rotation,
            stretch,
        } => {
            let pattern = PatternArray::euclid(pulses, steps, rotation).stretch(stretch);
            println!("{}", pattern);
            println!("{:?}", pattern.values());
        }
    }

    Ok(())
}
