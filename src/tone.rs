//! Tone generator boundary
//!
//! The engine decides what sounds and when; synthesis lives behind
//! [`ToneGenerator`]. Each fired note becomes one [`ToneRequest`], handed
//! over fire-and-forget.

use crate::error::{ConfigError, DispatchError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;

/// Oscillator shape
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    #[default]
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

impl FromStr for Waveform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sine" | "sin" => Ok(Waveform::Sine),
            "square" | "sq" => Ok(Waveform::Square),
            "sawtooth" | "saw" => Ok(Waveform::Sawtooth),
            "triangle" | "tri" => Ok(Waveform::Triangle),
            _ => Err(format!("Unknown waveform: {}", s)),
        }
    }
}

impl fmt::Display for Waveform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Waveform::Sine => "sine",
            Waveform::Square => "square",
            Waveform::Sawtooth => "sawtooth",
            Waveform::Triangle => "triangle",
        };
        f.write_str(name)
    }
}

/// Envelope settings in seconds (sustain is a level in 0..=1)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Adsr {
    pub attack: f64,
    pub decay: f64,
    pub sustain: f64,
    pub release: f64,
}

impl Default for Adsr {
    fn default() -> Self {
        Self {
            attack: 0.001,
            decay: 0.001,
            sustain: 1.0,
            release: 0.001,
        }
    }
}

impl Adsr {
    /// Validated envelope; every field must be finite and non-negative
    pub fn new(attack: f64, decay: f64, sustain: f64, release: f64) -> Result<Self, ConfigError> {
        Ok(Self {
            attack: non_negative("attack", attack)?,
            decay: non_negative("decay", decay)?,
            sustain: non_negative("sustain", sustain)?.min(1.0),
            release: non_negative("release", release)?,
        })
    }

    /// Total length of the timed segments
    pub fn timed_length(&self) -> f64 {
        self.attack + self.decay + self.release
    }

    /// Envelope that fits inside `duration`.
    ///
    /// When the note is shorter than attack + decay + release, all three
    /// segments shrink by the same factor instead of overlapping.
    pub fn fit_to(&self, duration: f64) -> Self {
        let total = self.timed_length();
        if duration >= total || total <= 0.0 {
            return *self;
        }
        let scale = duration.max(0.0) / total;
        Self {
            attack: self.attack * scale,
            decay: self.decay * scale,
            sustain: self.sustain,
            release: self.release * scale,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    Lowpass,
    Highpass,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub kind: FilterKind,
    pub frequency: f64,
    pub q: f64,
}

impl Filter {
    pub fn new(kind: FilterKind, frequency: f64, q: f64) -> Result<Self, ConfigError> {
        Ok(Self {
            kind,
            frequency: non_negative("filter frequency", frequency)?,
            q: non_negative("filter q", q)?,
        })
    }
}

/// One note handed to the tone generator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToneRequest {
    /// Absolute start time on the scheduler clock (seconds)
    pub time: f64,
    pub frequency: f64,
    /// Note length; the scheduler's step duration
    pub duration: f64,
    pub waveform: Waveform,
    pub harmonics: Option<u32>,
    pub adsr: Adsr,
    pub gain: f64,
    pub filter: Option<Filter>,
}

/// Consumer of fired notes.
///
/// Expected to start audio near `request.time`, to squeeze the envelope
/// into the note duration (see [`Adsr::fit_to`]), and to have no other
/// effect visible to the scheduler.
pub trait ToneGenerator: Send {
    fn render(&mut self, request: &ToneRequest) -> Result<(), DispatchError>;
}

impl<F> ToneGenerator for F
where
    F: FnMut(&ToneRequest) -> Result<(), DispatchError> + Send,
{
    fn render(&mut self, request: &ToneRequest) -> Result<(), DispatchError> {
        self(request)
    }
}

/// Logs every request; the default sink when no audio backend is attached
#[derive(Debug, Default)]
pub struct TracingToneGenerator;

impl ToneGenerator for TracingToneGenerator {
    fn render(&mut self, request: &ToneRequest) -> Result<(), DispatchError> {
        info!(
            time = request.time,
            freq = request.frequency,
            wave = %request.waveform,
            gain = request.gain,
            "note"
        );
        Ok(())
    }
}

/// Collects requests into a shared list
#[derive(Debug, Clone, Default)]
pub struct RecordingToneGenerator {
    requests: Arc<Mutex<Vec<ToneRequest>>>,
}

impl RecordingToneGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything rendered so far
    pub fn requests(&self) -> Vec<ToneRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Drain the recorded requests
    pub fn take(&self) -> Vec<ToneRequest> {
        std::mem::take(&mut *self.requests.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl ToneGenerator for RecordingToneGenerator {
    fn render(&mut self, request: &ToneRequest) -> Result<(), DispatchError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        Ok(())
    }
}

/// MIDI note number to frequency in Hz (A4 = 69 = 440 Hz)
pub fn note_to_frequency(note: f64) -> f64 {
    440.0 * 2f64.powf((note - 69.0) / 12.0)
}

pub(crate) fn non_negative(name: &'static str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::InvalidParameter { name, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_to_frequency() {
        assert!((note_to_frequency(69.0) - 440.0).abs() < 1e-9);
        assert!((note_to_frequency(60.0) - 261.6256).abs() < 1e-3);
        assert!((note_to_frequency(81.0) - 880.0).abs() < 1e-9);
    }

    #[test]
    fn test_fit_to_scales_proportionally() {
        let adsr = Adsr::new(0.2, 0.2, 0.5, 0.4).unwrap();
        let fitted = adsr.fit_to(0.4);
        assert!((fitted.attack - 0.1).abs() < 1e-12);
        assert!((fitted.decay - 0.1).abs() < 1e-12);
        assert!((fitted.release - 0.2).abs() < 1e-12);
        assert_eq!(fitted.sustain, 0.5);
        assert!((fitted.timed_length() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_fit_to_leaves_long_notes_alone() {
        let adsr = Adsr::new(0.01, 0.1, 0.5, 0.1).unwrap();
        assert_eq!(adsr.fit_to(2.0), adsr);
    }

    #[test]
    fn test_adsr_rejects_negative() {
        assert!(matches!(
            Adsr::new(-0.1, 0.0, 0.0, 0.0),
            Err(ConfigError::InvalidParameter { name: "attack", .. })
        ));
        assert!(Adsr::new(0.0, f64::NAN, 0.0, 0.0).is_err());
    }

    #[test]
    fn test_waveform_parse() {
        assert_eq!("saw".parse::<Waveform>().unwrap(), Waveform::Sawtooth);
        assert_eq!("Triangle".parse::<Waveform>().unwrap(), Waveform::Triangle);
        assert!("custom".parse::<Waveform>().is_err());
    }

    #[test]
    fn test_recording_generator_shares_log() {
        let recorder = RecordingToneGenerator::new();
        let mut sink = recorder.clone();
        let request = ToneRequest {
            time: 1.0,
            frequency: 440.0,
            duration: 0.5,
            waveform: Waveform::Sine,
            harmonics: None,
            adsr: Adsr::default(),
            gain: 1.0,
            filter: None,
        };
        sink.render(&request).unwrap();
        assert_eq!(recorder.requests(), vec![request]);
        assert_eq!(recorder.take().len(), 1);
        assert!(recorder.requests().is_empty());
    }
}
