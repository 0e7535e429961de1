//! # Drome - Live Coding Rhythm Engine
//!
//! Drome decides *what* sounds and *when*: voices chain declarative
//! pattern operations (notes, Euclidean gates, speed-ups, stretched gate
//! arrays) and a lookahead scheduler turns a coarse, jittery polling timer
//! into drift-free note times. How a note is synthesized is left to a
//! [`ToneGenerator`](tone::ToneGenerator).
//!
//! ## Core Features
//!
//! - **Lookahead Scheduling**: each poll pre-schedules every step inside
//!   `[now, now + poll_interval + overlap)`
//! - **Resumable Timeline**: `pause` keeps the phase, `stop` forgets it
//! - **Euclidean Rhythms**: Bjorklund distribution with rotation
//! - **Round-Robin Gating**: gates walk the note list across cycles
//! - **Live Edits**: voices are immutable snapshots swapped atomically
//! - **Structured Patches**: voices described as TOML operation lists
//!
//! ## Quick Start
//!
//! ```rust
//! use drome::clock::ManualClock;
//! use drome::scheduler::{Scheduler, SchedulerConfig};
//! use drome::timer::ManualTimer;
//! use drome::tone::{RecordingToneGenerator, Waveform};
//! use drome::voice::Voice;
//!
//! let clock = ManualClock::new(0.0);
//! let timer = ManualTimer::new();
//! let recorder = RecordingToneGenerator::new();
//! let scheduler = Scheduler::new(
//!     SchedulerConfig::default(),
//!     clock.clone(),
//!     timer.clone(),
//!     recorder.clone(),
//! )
//! .unwrap();
//!
//! // drome.synth("sawtooth", 8).note(48).euclid(3, 8)
//! let voice = Voice::with_sound(Waveform::Sawtooth, Some(8))
//!     .note(&[48.0])
//!     .unwrap()
//!     .euclid(3, 8, 0)
//!     .unwrap();
//! scheduler.register_voice(voice, false);
//!
//! scheduler.start(); // fires the first step right away
//! assert_eq!(recorder.requests().len(), 3);
//!
//! clock.set(0.4);
//! timer.fire(); // next poll reaches the step at 0.51s
//! assert_eq!(recorder.requests().len(), 6);
//! ```
//!
//! ## Euclidean Rhythm
//!
//! ```rust
//! use drome::pattern_array::euclid;
//!
//! assert_eq!(euclid(3, 8, 0).to_string(), "x..x..x.");
//! assert_eq!(euclid(3, 8, 1).to_string(), ".x..x..x");
//! ```
//!
//! ## Architecture
//!
//! - [`euclid`] / [`pattern_array`]: pure step-array transforms
//! - [`voice`]: note schedule, gating and `fire`
//! - [`registry`]: voices with stable ids and lock-free snapshots
//! - [`clock`] / [`timer`]: injectable time source and polling
//! - [`scheduler`]: phase accumulation and the lookahead loop
//! - [`patch`]: TOML patch files
//! - [`render`]: offline rendering of a patch to a note list
//! - [`tone`]: the tone generator boundary

pub mod clock;
pub mod error;
pub mod euclid;
pub mod patch;
pub mod pattern_array;
pub mod registry;
pub mod render;
pub mod scheduler;
pub mod timer;
pub mod tone;
pub mod voice;
