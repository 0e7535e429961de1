//! Lookahead scheduler
//!
//! A coarse recurring timer polls the clock every `poll_interval`. Each
//! poll pre-schedules every step whose virtual phase falls inside
//! `[now, now + poll_interval + lookahead_overlap)`, handing the
//! quantized phase to every registered voice. The phase cursor advances
//! by exactly one step duration per step, so timing never drifts with
//! the poll jitter; the overlap covers a late poll.
//!
//! All scheduler state sits behind one mutex that the timer callback
//! shares, which keeps ticks strictly non-reentrant. Voice edits never
//! take that lock: they publish snapshots through [`VoiceHandle`].

use crate::clock::{ClockSource, SystemClock};
use crate::error::ConfigError;
use crate::registry::{VoiceHandle, VoiceId, VoiceRegistry};
use crate::timer::{RecurringTimer, ThreadTimer, TimerHandle};
use crate::tone::ToneGenerator;
use crate::voice::StepEvent;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, error, trace, warn};

/// Timing configuration, loadable from the `[clock]` table of a patch file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Seconds per scheduler step (one full voice cycle)
    pub step_duration: f64,
    /// Overrides `step_duration` with `(60 / bpm) * 4` when set
    pub tempo: Option<f64>,
    /// Seconds between clock polls
    pub poll_interval: f64,
    /// Extra lookahead beyond the next poll, absorbing late polls
    pub lookahead_overlap: f64,
    /// Headroom before the first step after a cold start
    pub min_latency: f64,
    /// Phase rounding resolution in seconds
    pub quantization: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            step_duration: 0.5,
            tempo: None,
            poll_interval: 0.1,
            lookahead_overlap: 0.05,
            min_latency: 0.01,
            quantization: 1e-4,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(bpm) = self.tempo {
            positive("tempo", bpm)?;
        }
        positive("poll_interval", self.poll_interval)?;
        positive("quantization", self.quantization)?;
        check_step_duration(self.effective_step_duration(), self.quantization)?;
        crate::tone::non_negative("lookahead_overlap", self.lookahead_overlap)?;
        crate::tone::non_negative("min_latency", self.min_latency)?;
        Ok(())
    }

    pub fn effective_step_duration(&self) -> f64 {
        match self.tempo {
            Some(bpm) => tempo_to_step_duration(bpm),
            None => self.step_duration,
        }
    }
}

/// Step duration of one 4-beat bar at `bpm`
pub fn tempo_to_step_duration(bpm: f64) -> f64 {
    (60.0 / bpm) * 4.0
}

/// A step shorter than the quantization grid rounds back onto the same
/// phase and the tick loop would never reach the lookahead bound.
fn check_step_duration(step: f64, quantization: f64) -> Result<f64, ConfigError> {
    if step.is_finite() && step > 0.0 && step >= quantization {
        Ok(step)
    } else {
        Err(ConfigError::InvalidStepDuration(step))
    }
}

fn positive(name: &'static str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::InvalidTiming { name, value })
    }
}

/// Running counters, reset by `stop`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Steps handed to the voices
    pub fired_steps: u64,
    /// Steps whose phase was already behind the clock
    pub dropped_steps: u64,
    pub dispatched_notes: u64,
    pub failed_notes: u64,
    pub voice_panics: u64,
    pub observer_panics: u64,
}

pub type IterationCallback = Box<dyn FnMut(u64) + Send>;

struct SchedulerState {
    config: SchedulerConfig,
    step_duration: f64,
    /// `None` until the first tick after a cold start
    phase: Option<f64>,
    tick: u64,
    paused: bool,
    /// Bumped by every start so stale timer callbacks can tell they are stale
    generation: u64,
    voices: VoiceRegistry,
    observers: Vec<IterationCallback>,
    tone: Box<dyn ToneGenerator>,
    stats: SchedulerStats,
}

impl SchedulerState {
    fn tick(&mut self, now: f64) {
        let lookahead = now + self.config.poll_interval + self.config.lookahead_overlap;
        let mut phase = *self.phase.get_or_insert(now + self.config.min_latency);
        let mut dropped = 0u64;

        while phase < lookahead {
            phase = quantize(phase, self.config.quantization);

            if phase >= now {
                let event = StepEvent {
                    time: phase,
                    cycle: self.tick,
                    step_duration: self.step_duration,
                };
                trace!(phase, tick = self.tick, "step");
                fire_voices(&self.voices, self.tone.as_mut(), &mut self.stats, &event);
                self.stats.fired_steps += 1;
            } else {
                dropped += 1;
            }

            phase += self.step_duration;
            self.phase = Some(phase);
            self.tick += 1;
            notify_observers(&mut self.observers, self.tick, &mut self.stats);
        }

        if dropped > 0 {
            self.stats.dropped_steps += dropped;
            warn!("Dropped {} stale step(s) behind the clock", dropped);
        }
    }
}

fn fire_voices(
    voices: &VoiceRegistry,
    tone: &mut dyn ToneGenerator,
    stats: &mut SchedulerStats,
    event: &StepEvent,
) {
    for handle in voices.iter() {
        let voice = handle.snapshot();
        match catch_unwind(AssertUnwindSafe(|| voice.fire(event, &mut *tone))) {
            Ok(summary) => {
                stats.dispatched_notes += summary.dispatched as u64;
                stats.failed_notes += summary.failed as u64;
            }
            Err(_) => {
                stats.voice_panics += 1;
                error!("{} panicked while firing at {:.4}s; skipped", handle.id(), event.time);
            }
        }
    }
}

fn notify_observers(observers: &mut [IterationCallback], tick: u64, stats: &mut SchedulerStats) {
    for observer in observers.iter_mut() {
        if catch_unwind(AssertUnwindSafe(|| observer(tick))).is_err() {
            stats.observer_panics += 1;
            error!("Iteration observer panicked at tick {}; skipped", tick);
        }
    }
}

fn quantize(phase: f64, resolution: f64) -> f64 {
    let scale = 1.0 / resolution;
    (phase * scale).round() / scale
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The clock: owns the phase cursor, the voices and the polling timer
pub struct Scheduler {
    state: Arc<Mutex<SchedulerState>>,
    clock: Arc<dyn ClockSource>,
    timer: Box<dyn RecurringTimer>,
    handle: Mutex<Option<TimerHandle>>,
}

impl Scheduler {
    pub fn new<C, T, G>(config: SchedulerConfig, clock: C, timer: T, tone: G) -> Result<Self, ConfigError>
    where
        C: ClockSource + 'static,
        T: RecurringTimer + 'static,
        G: ToneGenerator + 'static,
    {
        config.validate()?;

        let state = SchedulerState {
            step_duration: config.effective_step_duration(),
            config,
            phase: None,
            tick: 0,
            paused: true,
            generation: 0,
            voices: VoiceRegistry::new(),
            observers: Vec::new(),
            tone: Box::new(tone),
            stats: SchedulerStats::default(),
        };

        Ok(Self {
            state: Arc::new(Mutex::new(state)),
            clock: Arc::new(clock),
            timer: Box::new(timer),
            handle: Mutex::new(None),
        })
    }

    /// Wall clock and a background timer thread
    pub fn realtime<G>(config: SchedulerConfig, tone: G) -> Result<Self, ConfigError>
    where
        G: ToneGenerator + 'static,
    {
        Self::new(config, SystemClock::new(), ThreadTimer, tone)
    }

    /// Tick once right away, then keep polling. No-op while running.
    ///
    /// After `pause` the timeline resumes from the same phase; after
    /// `stop` the phase re-anchors to the current time.
    pub fn start(&self) {
        let mut handle = lock(&self.handle);

        let (generation, interval) = {
            let mut state = lock(&self.state);
            if !state.paused {
                return;
            }
            state.generation += 1;
            state.tick(self.clock.now());
            state.paused = false;
            debug!(
                phase = state.phase.unwrap_or(0.0),
                tick = state.tick,
                "Scheduler started"
            );
            (state.generation, state.config.poll_interval)
        };

        let state = Arc::clone(&self.state);
        let clock = Arc::clone(&self.clock);
        *handle = Some(self.timer.schedule_recurring(
            Duration::from_secs_f64(interval),
            Box::new(move || {
                let mut state = lock(&state);
                if state.paused || state.generation != generation {
                    return;
                }
                state.tick(clock.now());
            }),
        ));
    }

    /// Stop polling but keep phase and tick so `start` resumes seamlessly
    pub fn pause(&self) {
        let mut handle = lock(&self.handle);
        if let Some(timer) = handle.take() {
            timer.cancel();
        }
        let mut state = lock(&self.state);
        state.paused = true;
        debug!(phase = state.phase.unwrap_or(0.0), tick = state.tick, "Scheduler paused");
    }

    /// Stop polling and forget the time base
    pub fn stop(&self) {
        let mut handle = lock(&self.handle);
        if let Some(timer) = handle.take() {
            timer.cancel();
        }
        let mut state = lock(&self.state);
        state.paused = true;
        state.phase = None;
        state.tick = 0;
        state.stats = SchedulerStats::default();
        debug!("Scheduler stopped");
    }

    /// Apply `transform` to the step duration; returns the new value.
    ///
    /// Steps already scheduled keep their times; only later phase
    /// increments use the new duration.
    pub fn set_step_duration<F>(&self, transform: F) -> Result<f64, ConfigError>
    where
        F: FnOnce(f64) -> f64,
    {
        let mut state = lock(&self.state);
        let next = check_step_duration(transform(state.step_duration), state.config.quantization)?;
        debug!(from = state.step_duration, to = next, "Step duration changed");
        state.step_duration = next;
        Ok(next)
    }

    /// Set the step duration to one 4-beat bar; ignored unless `bpm > 0`
    pub fn set_tempo(&self, bpm: f64) {
        if !bpm.is_finite() || bpm <= 0.0 {
            return;
        }
        let step = tempo_to_step_duration(bpm);
        if let Err(e) = self.set_step_duration(|_| step) {
            debug!("Ignoring tempo {} bpm: {}", bpm, e);
        }
    }

    /// Add a voice at the end of the fire order; `replace` drops all others first
    pub fn register_voice(&self, voice: crate::voice::Voice, replace: bool) -> VoiceHandle {
        let mut state = lock(&self.state);
        if replace {
            state.voices.clear();
        }
        let handle = state.voices.insert(voice);
        debug!("Registered {}", handle.id());
        handle
    }

    pub fn remove_voice(&self, id: VoiceId) -> bool {
        lock(&self.state).voices.remove(id)
    }

    pub fn clear_voices(&self) {
        lock(&self.state).voices.clear();
    }

    pub fn voice(&self, id: VoiceId) -> Option<VoiceHandle> {
        lock(&self.state).voices.get(id)
    }

    /// Registered voices in fire order
    pub fn voice_ids(&self) -> Vec<VoiceId> {
        lock(&self.state).voices.ids()
    }

    /// Call `callback` with the new tick count after every step.
    ///
    /// Runs inside the tick with the scheduler locked; it must not call
    /// back into the scheduler. A panicking callback is logged and counted
    /// in [`SchedulerStats::observer_panics`].
    pub fn on_iteration_start<F>(&self, callback: F)
    where
        F: FnMut(u64) + Send + 'static,
    {
        lock(&self.state).observers.push(Box::new(callback));
    }

    pub fn step_duration(&self) -> f64 {
        lock(&self.state).step_duration
    }

    pub fn is_paused(&self) -> bool {
        lock(&self.state).paused
    }

    /// Phase of the next unscheduled step; 0 before the first tick
    pub fn phase(&self) -> f64 {
        lock(&self.state).phase.unwrap_or(0.0)
    }

    pub fn tick_count(&self) -> u64 {
        lock(&self.state).tick
    }

    pub fn stats(&self) -> SchedulerStats {
        lock(&self.state).stats
    }

    pub fn config(&self) -> SchedulerConfig {
        lock(&self.state).config.clone()
    }

    pub fn now(&self) -> f64 {
        self.clock.now()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Some(timer) = lock(&self.handle).take() {
            timer.cancel();
        }
    }
}
