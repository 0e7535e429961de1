//! Offline rendering of patches to note lists
//!
//! Runs the real scheduler against a manual clock that jumps from poll to
//! poll, so the output is exactly what a live session would have sent to
//! the tone generator, minus the waiting.

use crate::clock::ManualClock;
use crate::error::Result;
use crate::patch::PatchFile;
use crate::scheduler::{Scheduler, SchedulerStats};
use crate::timer::ManualTimer;
use crate::tone::{RecordingToneGenerator, ToneRequest};
use tracing::debug;

/// Configuration for offline rendering
#[derive(Debug, Clone, PartialEq)]
pub struct RenderConfig {
    /// Clock time at which playback starts
    pub start_time: f64,
    /// Seconds of timeline to render
    pub duration: f64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            start_time: 0.0,
            duration: 8.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    /// Notes starting before the end of the render window, in dispatch order
    pub notes: Vec<ToneRequest>,
    pub stats: SchedulerStats,
}

pub fn render_patch(patch: &PatchFile, config: &RenderConfig) -> Result<Rendered> {
    let clock = ManualClock::new(config.start_time);
    let timer = ManualTimer::new();
    let recorder = RecordingToneGenerator::new();

    let scheduler = Scheduler::new(patch.clock.clone(), clock.clone(), timer.clone(), recorder.clone())?;
    patch.install(&scheduler)?;
    scheduler.start();

    let poll = patch.clock.poll_interval;
    let polls = (config.duration / poll).floor() as u64;
    for i in 1..=polls {
        clock.set(config.start_time + i as f64 * poll);
        timer.fire();
    }

    let stats = scheduler.stats();
    scheduler.stop();

    let end = config.start_time + config.duration;
    let notes: Vec<ToneRequest> = recorder.take().into_iter().filter(|n| n.time < end).collect();
    debug!("Rendered {} note(s) over {:.2}s", notes.len(), config.duration);

    Ok(Rendered { notes, stats })
}
