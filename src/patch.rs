//! User patches as structured data
//!
//! Instead of evaluating user code, a patch is a list of operation
//! records per voice, each one mapping onto a single [`Voice`] builder
//! call. Patch files are TOML:
//!
//! ```toml
//! [clock]
//! tempo = 30
//!
//! [[voice]]
//! name = "bass"
//! ops = [
//!     { op = "sound", waveform = "sawtooth" },
//!     { op = "note", notes = [43, 43, 50, 53] },
//!     { op = "euclid", pulses = 3, steps = 8 },
//!     { op = "lpf", frequency = 800 },
//! ]
//! ```

use crate::error::{ConfigError, DromeError, Result};
use crate::pattern_array::PatternArray;
use crate::registry::VoiceHandle;
use crate::scheduler::{Scheduler, SchedulerConfig};
use crate::tone::Waveform;
use crate::voice::Voice;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// A single value or a list, like `note(60)` and `note([60, 64])`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Values {
    One(f64),
    Many(Vec<f64>),
}

impl Values {
    pub fn as_slice(&self) -> &[f64] {
        match self {
            Values::One(v) => std::slice::from_ref(v),
            Values::Many(vs) => vs,
        }
    }
}

fn one() -> usize {
    1
}

fn unit_q() -> f64 {
    1.0
}

/// One builder call on a voice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PatchOp {
    /// MIDI note numbers
    Note { notes: Values },
    /// Raw frequencies in Hz
    Freq { hz: Values },
    Fast { multiplier: f64 },
    Euclid {
        pulses: usize,
        steps: usize,
        #[serde(default)]
        rotation: i64,
    },
    /// Arbitrary gates, optionally stretched before use
    Structure {
        gates: Vec<i64>,
        #[serde(default = "one")]
        stretch: usize,
    },
    Sound {
        waveform: Waveform,
        #[serde(default)]
        harmonics: Option<u32>,
    },
    Gain { gain: f64 },
    Adsr {
        attack: f64,
        #[serde(default)]
        decay: f64,
        #[serde(default)]
        sustain: f64,
        #[serde(default)]
        release: f64,
    },
    Att { seconds: f64 },
    Dec { seconds: f64 },
    Sus { level: f64 },
    Rel { seconds: f64 },
    Hpf {
        frequency: f64,
        #[serde(default = "unit_q")]
        q: f64,
    },
    Lpf {
        frequency: f64,
        #[serde(default = "unit_q")]
        q: f64,
    },
}

impl PatchOp {
    pub fn apply(&self, voice: Voice) -> std::result::Result<Voice, ConfigError> {
        match self {
            PatchOp::Note { notes } => voice.note(notes.as_slice()),
            PatchOp::Freq { hz } => voice.freq(hz.as_slice()),
            PatchOp::Fast { multiplier } => voice.fast(*multiplier),
            PatchOp::Euclid {
                pulses,
                steps,
                rotation,
            } => voice.euclid(*pulses, *steps, *rotation),
            PatchOp::Structure { gates, stretch } => {
                let gates = PatternArray::new(gates.clone()).stretch(*stretch);
                voice.structure(&gates)
            }
            PatchOp::Sound {
                waveform,
                harmonics,
            } => Ok(voice.sound(*waveform, *harmonics)),
            PatchOp::Gain { gain } => voice.gain(*gain),
            PatchOp::Adsr {
                attack,
                decay,
                sustain,
                release,
            } => voice.adsr(*attack, *decay, *sustain, *release),
            PatchOp::Att { seconds } => voice.att(*seconds),
            PatchOp::Dec { seconds } => voice.dec(*seconds),
            PatchOp::Sus { level } => voice.sus(*level),
            PatchOp::Rel { seconds } => voice.rel(*seconds),
            PatchOp::Hpf { frequency, q } => voice.hpf(*frequency, *q),
            PatchOp::Lpf { frequency, q } => voice.lpf(*frequency, *q),
        }
    }
}

/// Apply every op in order, stopping at the first error
pub fn apply_ops(voice: Voice, ops: &[PatchOp]) -> std::result::Result<Voice, ConfigError> {
    ops.iter().try_fold(voice, Voice::apply)
}

impl Voice {
    pub fn apply(self, op: &PatchOp) -> std::result::Result<Voice, ConfigError> {
        op.apply(self)
    }
}

impl VoiceHandle {
    /// Apply `ops` to the live voice as one snapshot; nothing changes on error
    pub fn apply(&self, ops: &[PatchOp]) -> std::result::Result<(), ConfigError> {
        self.update(|voice| apply_ops(voice, ops))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoicePatch {
    pub name: String,
    #[serde(default)]
    pub ops: Vec<PatchOp>,
}

impl VoicePatch {
    pub fn build(&self) -> Result<Voice> {
        apply_ops(Voice::new(), &self.ops).map_err(|source| DromeError::Voice {
            name: self.name.clone(),
            source,
        })
    }
}

/// Clock settings plus voices, in fire order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatchFile {
    #[serde(default)]
    pub clock: SchedulerConfig,
    #[serde(default, rename = "voice")]
    pub voices: Vec<VoicePatch>,
}

impl PatchFile {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let patch: PatchFile = toml::from_str(source)?;
        patch.clock.validate()?;
        Ok(patch)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| DromeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded patch from {}", path.display());
        Self::from_toml_str(&source)
    }

    /// Build every voice; fails on the first invalid one
    pub fn build_voices(&self) -> Result<Vec<(String, Voice)>> {
        self.voices
            .iter()
            .map(|patch| Ok((patch.name.clone(), patch.build()?)))
            .collect()
    }

    /// Replace the scheduler's voices with this patch's voices.
    ///
    /// All voices are built before the registry is touched, so an invalid
    /// patch leaves the running voices playing.
    pub fn install(&self, scheduler: &Scheduler) -> Result<Vec<(String, VoiceHandle)>> {
        let voices = self.build_voices()?;
        scheduler.clear_voices();

        let handles = voices
            .into_iter()
            .map(|(name, voice)| {
                let handle = scheduler.register_voice(voice, false);
                debug!("{} -> {}", name, handle.id());
                (name, handle)
            })
            .collect::<Vec<_>>();

        info!("Installed {} voice(s)", handles.len());
        Ok(handles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATCH: &str = r#"
[clock]
tempo = 30
poll_interval = 0.05

[[voice]]
name = "lead"
ops = [
    { op = "sound", waveform = "square", harmonics = 12 },
    { op = "note", notes = 57 },
    { op = "euclid", pulses = 3, steps = 8 },
    { op = "adsr", attack = 0.001, decay = 0.333 },
]

[[voice]]
name = "bass"
ops = [
    { op = "sound", waveform = "sawtooth" },
    { op = "note", notes = [43, 43, 43, 50, 43, 43, 53, 54] },
    { op = "lpf", frequency = 800 },
    { op = "adsr", attack = 0.001, decay = 0.25 },
    { op = "fast", multiplier = 2 },
    { op = "gain", gain = 1.5 },
]
"#;

    #[test]
    fn test_parse_patch_file() {
        let patch = PatchFile::from_toml_str(PATCH).unwrap();
        assert_eq!(patch.clock.tempo, Some(30.0));
        assert_eq!(patch.clock.effective_step_duration(), 8.0);
        assert_eq!(patch.voices.len(), 2);
        assert_eq!(patch.voices[0].name, "lead");
        assert_eq!(
            patch.voices[0].ops[2],
            PatchOp::Euclid {
                pulses: 3,
                steps: 8,
                rotation: 0
            }
        );
    }

    #[test]
    fn test_build_voices() {
        let patch = PatchFile::from_toml_str(PATCH).unwrap();
        let voices = patch.build_voices().unwrap();

        let (_, lead) = &voices[0];
        assert_eq!(lead.step_count(), 8);
        assert_eq!(lead.params().waveform, Waveform::Square);
        assert_eq!(lead.params().harmonics, Some(12));
        assert_eq!(lead.params().adsr.release, 0.001);

        let (_, bass) = &voices[1];
        assert_eq!(bass.step_count(), 16);
        assert_eq!(bass.params().gain, 1.5);
        assert!(bass.params().filter.is_some());
    }

    #[test]
    fn test_invalid_op_names_voice() {
        let patch = PatchFile::from_toml_str(
            r#"
[[voice]]
name = "broken"
ops = [{ op = "euclid", pulses = 3, steps = 0 }]
"#,
        )
        .unwrap();
        match patch.build_voices() {
            Err(DromeError::Voice { name, source }) => {
                assert_eq!(name, "broken");
                assert_eq!(source, ConfigError::ZeroSteps);
            }
            other => panic!("unexpected result: {:?}", other.map(|v| v.len())),
        }
    }

    #[test]
    fn test_invalid_clock_rejected() {
        let result = PatchFile::from_toml_str("[clock]\nstep_duration = -1.0\n");
        assert!(matches!(result, Err(DromeError::Config(ConfigError::InvalidStepDuration(_)))));
    }

    #[test]
    fn test_unknown_op_is_parse_error() {
        let result = PatchFile::from_toml_str("[[voice]]\nname = \"x\"\nops = [{ op = \"reverse\" }]\n");
        assert!(matches!(result, Err(DromeError::Parse(_))));
    }

    #[test]
    fn test_structure_op_stretches() {
        let op = PatchOp::Structure {
            gates: vec![1, 0],
            stretch: 2,
        };
        let voice = op.apply(Voice::new().freq(&[100.0]).unwrap()).unwrap();
        assert_eq!(voice.sequence(0), vec![Some(100.0), Some(100.0), None, None]);
    }
}
