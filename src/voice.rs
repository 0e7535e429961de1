//! Voices: one instrument's note schedule plus its synthesis parameters
//!
//! A [`Voice`] is an immutable snapshot. Every builder call consumes the
//! snapshot and returns a complete new one, so a voice is never observed
//! half-edited (for instance a new gate pattern paired with a stale note
//! list). Publishing the new snapshot to a running scheduler goes through
//! [`VoiceHandle`](crate::registry::VoiceHandle).
//!
//! The schedule is a list of steps, each either a rest or the k-th pulse
//! of the cycle. Pulses draw from a note pool in round-robin order that
//! carries over between cycles: in cycle `c` pulse `k` plays
//! `pool[(c * pulses_per_cycle + k) % pool.len()]`.

use crate::error::{ConfigError, DispatchError};
use crate::euclid;
use crate::tone::{non_negative, Adsr, Filter, FilterKind, ToneGenerator, ToneRequest, Waveform};
use tracing::warn;

const MIDDLE_C_HZ: f64 = 261.63;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Rest,
    Pulse(usize),
}

/// Parameters forwarded verbatim to the tone generator
#[derive(Debug, Clone, PartialEq)]
pub struct SynthParams {
    pub waveform: Waveform,
    pub harmonics: Option<u32>,
    pub gain: f64,
    pub adsr: Adsr,
    pub filter: Option<Filter>,
}

impl Default for SynthParams {
    fn default() -> Self {
        Self {
            waveform: Waveform::Sine,
            harmonics: None,
            gain: 1.0,
            adsr: Adsr::default(),
            filter: None,
        }
    }
}

/// The scheduler step a voice is fired for
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepEvent {
    /// Quantized phase of the step (seconds on the scheduler clock)
    pub time: f64,
    /// Scheduler tick count at this step; selects the round-robin cycle
    pub cycle: u64,
    /// Scheduler step duration when the step fired
    pub step_duration: f64,
}

/// Outcome of one `fire` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FireSummary {
    pub dispatched: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Voice {
    pool: Vec<Option<f64>>,
    steps: Vec<Step>,
    pulses_per_cycle: usize,
    params: SynthParams,
}

impl Default for Voice {
    fn default() -> Self {
        Self::from_pool(vec![Some(MIDDLE_C_HZ)])
    }
}

impl Voice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Voice with a waveform preset, like `synth("sawtooth", 8)`
    pub fn with_sound(waveform: Waveform, harmonics: Option<u32>) -> Self {
        Self::new().sound(waveform, harmonics)
    }

    /// Un-gated schedule playing the pool once per cycle
    fn from_pool(pool: Vec<Option<f64>>) -> Self {
        let steps = (0..pool.len()).map(Step::Pulse).collect();
        Self {
            pulses_per_cycle: pool.len(),
            pool,
            steps,
            params: SynthParams::default(),
        }
    }

    // ----- timing and gating -----

    /// Play MIDI note numbers, one per step
    pub fn note(self, notes: &[f64]) -> Result<Self, ConfigError> {
        for &n in notes {
            if !n.is_finite() {
                return Err(ConfigError::InvalidParameter { name: "note", value: n });
            }
        }
        let frequencies: Vec<f64> = notes
            .iter()
            .map(|&n| crate::tone::note_to_frequency(n))
            .collect();
        self.with_frequencies(&frequencies)
    }

    /// Play raw frequencies in Hz, one per step; 0 Hz is a rest
    pub fn freq(self, frequencies: &[f64]) -> Result<Self, ConfigError> {
        for &f in frequencies {
            non_negative("frequency", f)?;
        }
        self.with_frequencies(frequencies)
    }

    fn with_frequencies(self, frequencies: &[f64]) -> Result<Self, ConfigError> {
        if frequencies.is_empty() {
            return Err(ConfigError::EmptyNotes);
        }
        let pool = frequencies
            .iter()
            .map(|&f| if f > 0.0 { Some(f) } else { None })
            .collect();
        Ok(Self {
            params: self.params,
            ..Self::from_pool(pool)
        })
    }

    /// Resample the schedule to `floor(len * multiplier)` steps by cyclic indexing
    pub fn fast(self, multiplier: f64) -> Result<Self, ConfigError> {
        if !multiplier.is_finite() || multiplier < 0.0 {
            return Err(ConfigError::InvalidMultiplier(multiplier));
        }
        let old_len = self.steps.len();
        let new_len = (old_len as f64 * multiplier).floor() as usize;
        if new_len == 0 {
            return Err(ConfigError::InvalidMultiplier(multiplier));
        }
        let steps = (0..new_len).map(|i| self.steps[i % old_len]).collect();
        Ok(Self { steps, ..self })
    }

    /// Gate the current notes with a Euclidean rhythm of `steps` slots
    pub fn euclid(self, pulses: usize, steps: usize, rotation: i64) -> Result<Self, ConfigError> {
        if steps == 0 {
            return Err(ConfigError::ZeroSteps);
        }
        self.structure(&euclid::euclid(pulses, steps, rotation))
    }

    /// Gate the current notes with an arbitrary pattern; non-zero steps sound.
    ///
    /// The notes of the current cycle-0 sequence (rests included) become
    /// the pool that the new pulses walk through.
    pub fn structure(self, gates: &[i64]) -> Result<Self, ConfigError> {
        if gates.is_empty() {
            return Err(ConfigError::EmptyGatePattern);
        }
        let pool = self.sequence(0);

        let mut pulses = 0;
        let steps = gates
            .iter()
            .map(|&g| {
                if g == 0 {
                    Step::Rest
                } else {
                    pulses += 1;
                    Step::Pulse(pulses - 1)
                }
            })
            .collect();

        Ok(Self {
            pool,
            steps,
            pulses_per_cycle: pulses,
            params: self.params,
        })
    }

    // ----- synthesis parameters -----

    pub fn sound(mut self, waveform: Waveform, harmonics: Option<u32>) -> Self {
        self.params.waveform = waveform;
        if harmonics.is_some() {
            self.params.harmonics = harmonics;
        }
        self
    }

    pub fn gain(mut self, gain: f64) -> Result<Self, ConfigError> {
        self.params.gain = non_negative("gain", gain)?;
        Ok(self)
    }

    /// Whole envelope; zero times fall back to 1ms
    pub fn adsr(mut self, attack: f64, decay: f64, sustain: f64, release: f64) -> Result<Self, ConfigError> {
        let adsr = Adsr::new(attack, decay, sustain, release)?;
        self.params.adsr = Adsr {
            attack: or_floor(adsr.attack, 0.001),
            decay: or_floor(adsr.decay, 0.001),
            sustain: adsr.sustain,
            release: or_floor(adsr.release, 0.001),
        };
        Ok(self)
    }

    pub fn att(mut self, attack: f64) -> Result<Self, ConfigError> {
        self.params.adsr.attack = or_floor(non_negative("attack", attack)?, 0.01);
        Ok(self)
    }

    pub fn dec(mut self, decay: f64) -> Result<Self, ConfigError> {
        self.params.adsr.decay = or_floor(non_negative("decay", decay)?, 0.01);
        Ok(self)
    }

    pub fn sus(mut self, sustain: f64) -> Result<Self, ConfigError> {
        self.params.adsr.sustain = or_floor(non_negative("sustain", sustain)?, 0.01).min(1.0);
        Ok(self)
    }

    pub fn rel(mut self, release: f64) -> Result<Self, ConfigError> {
        self.params.adsr.release = or_floor(non_negative("release", release)?, 0.01);
        Ok(self)
    }

    pub fn hpf(mut self, frequency: f64, q: f64) -> Result<Self, ConfigError> {
        self.params.filter = Some(Filter::new(FilterKind::Highpass, frequency, q)?);
        Ok(self)
    }

    pub fn lpf(mut self, frequency: f64, q: f64) -> Result<Self, ConfigError> {
        self.params.filter = Some(Filter::new(FilterKind::Lowpass, frequency, q)?);
        Ok(self)
    }

    // ----- inspection -----

    pub fn params(&self) -> &SynthParams {
        &self.params
    }

    /// Number of steps in one cycle of the schedule
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Onsets per cycle
    pub fn pulses_per_cycle(&self) -> usize {
        self.pulses_per_cycle
    }

    /// Time between consecutive steps for a given scheduler step duration
    pub fn step_offset(&self, step_duration: f64) -> f64 {
        step_duration / self.steps.len() as f64
    }

    /// Resolved notes of one cycle; `None` marks a rest
    pub fn sequence(&self, cycle: u64) -> Vec<Option<f64>> {
        self.steps.iter().map(|&step| self.resolve(step, cycle)).collect()
    }

    fn resolve(&self, step: Step, cycle: u64) -> Option<f64> {
        match step {
            Step::Rest => None,
            Step::Pulse(k) => {
                let n = self.pool.len();
                let base = (cycle % n as u64) as usize * (self.pulses_per_cycle % n);
                self.pool[(base + k) % n]
            }
        }
    }

    // ----- playback -----

    /// Dispatch every sounding step of one cycle, in step order.
    ///
    /// A rejected note is logged and skipped; the rest of the cycle still plays.
    pub fn fire(&self, event: &StepEvent, tone: &mut dyn ToneGenerator) -> FireSummary {
        let offset = self.step_offset(event.step_duration);
        let mut summary = FireSummary::default();

        for (i, &step) in self.steps.iter().enumerate() {
            let Some(frequency) = self.resolve(step, event.cycle) else {
                continue;
            };

            let request = ToneRequest {
                time: event.time + offset * i as f64,
                frequency,
                duration: event.step_duration,
                waveform: self.params.waveform,
                harmonics: self.params.harmonics,
                adsr: self.params.adsr,
                gain: self.params.gain,
                filter: self.params.filter,
            };

            match tone.render(&request) {
                Ok(()) => summary.dispatched += 1,
                Err(e) => {
                    report_dispatch_failure(&e);
                    summary.failed += 1;
                }
            }
        }

        summary
    }
}

fn report_dispatch_failure(error: &DispatchError) {
    warn!("Skipping note: {}", error);
}

fn or_floor(value: f64, floor: f64) -> f64 {
    if value == 0.0 {
        floor
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tone::RecordingToneGenerator;

    const A: f64 = 100.0;
    const B: f64 = 200.0;
    const C: f64 = 300.0;
    const D: f64 = 400.0;

    fn event(time: f64, cycle: u64) -> StepEvent {
        StepEvent {
            time,
            cycle,
            step_duration: 2.0,
        }
    }

    #[test]
    fn test_default_voice_plays_middle_c() {
        let voice = Voice::new();
        assert_eq!(voice.sequence(0), vec![Some(MIDDLE_C_HZ)]);
        assert_eq!(voice.step_count(), 1);
    }

    #[test]
    fn test_note_maps_midi_and_sets_offset() {
        let voice = Voice::new().note(&[69.0, 81.0]).unwrap();
        let seq = voice.sequence(0);
        assert!((seq[0].unwrap() - 440.0).abs() < 1e-9);
        assert!((seq[1].unwrap() - 880.0).abs() < 1e-9);
        assert_eq!(voice.step_offset(2.0), 1.0);
    }

    #[test]
    fn test_note_rejects_empty() {
        assert_eq!(Voice::new().note(&[]), Err(ConfigError::EmptyNotes));
    }

    #[test]
    fn test_fast_cycles_notes() {
        let voice = Voice::new().freq(&[A, B, C, D]).unwrap().fast(2.0).unwrap();
        let seq = voice.sequence(0);
        assert_eq!(seq.len(), 8);
        let original = [A, B, C, D];
        for (i, f) in seq.iter().enumerate() {
            assert_eq!(*f, Some(original[i % 4]));
        }
        assert_eq!(voice.step_offset(2.0), 0.25);
    }

    #[test]
    fn test_fast_truncates_with_floor() {
        let voice = Voice::new().freq(&[A, B, C]).unwrap().fast(0.5).unwrap();
        assert_eq!(voice.sequence(0), vec![Some(A)]);
        let voice = Voice::new().freq(&[A, B, C, D]).unwrap().fast(1.5).unwrap();
        assert_eq!(voice.sequence(0), vec![Some(A), Some(B), Some(C), Some(D), Some(A), Some(B)]);
    }

    #[test]
    fn test_fast_rejects_empty_result() {
        let voice = Voice::new().freq(&[A, B]).unwrap();
        assert_eq!(voice.clone().fast(0.2), Err(ConfigError::InvalidMultiplier(0.2)));
        assert!(voice.clone().fast(f64::INFINITY).is_err());
        assert!(voice.fast(-1.0).is_err());
    }

    #[test]
    fn test_euclid_gates_consume_notes_in_order() {
        let voice = Voice::new().freq(&[A, B]).unwrap().euclid(3, 8, 0).unwrap();
        assert_eq!(voice.step_count(), 8);
        assert_eq!(voice.step_offset(2.0), 0.25);
        assert_eq!(
            voice.sequence(0),
            vec![Some(A), None, None, Some(B), None, None, Some(A), None]
        );
    }

    #[test]
    fn test_euclid_round_robin_carries_across_cycles() {
        let voice = Voice::new().freq(&[A, B]).unwrap().euclid(3, 8, 0).unwrap();
        let sounding = |cycle| -> Vec<f64> { voice.sequence(cycle).into_iter().flatten().collect() };
        assert_eq!(sounding(0), vec![A, B, A]);
        assert_eq!(sounding(1), vec![B, A, B]);
        assert_eq!(sounding(2), vec![A, B, A]);

        // A sparse pattern still reaches every note over repeated cycles
        let sparse = Voice::new().freq(&[A, B, C, D]).unwrap().euclid(1, 4, 0).unwrap();
        let firsts: Vec<_> = (0..4).map(|c| sparse.sequence(c)[0]).collect();
        assert_eq!(firsts, vec![Some(A), Some(B), Some(C), Some(D)]);
    }

    #[test]
    fn test_euclid_then_fast() {
        let voice = Voice::new()
            .freq(&[A, B, C, D])
            .unwrap()
            .euclid(5, 8, -1)
            .unwrap()
            .fast(2.0)
            .unwrap();
        let seq = voice.sequence(0);
        assert_eq!(seq.len(), 16);
        assert_eq!(&seq[..8], &seq[8..]);
        assert_eq!(seq.iter().flatten().count(), 10);
    }

    #[test]
    fn test_euclid_rejects_zero_steps() {
        assert_eq!(Voice::new().euclid(3, 0, 0), Err(ConfigError::ZeroSteps));
    }

    #[test]
    fn test_structure_with_stretched_pattern() {
        let gates = crate::pattern_array::euclid(1, 2, 0).stretch(2);
        let voice = Voice::new().freq(&[A]).unwrap().structure(&gates).unwrap();
        assert_eq!(voice.sequence(0), vec![Some(A), Some(A), None, None]);
        assert_eq!(Voice::new().structure(&[]), Err(ConfigError::EmptyGatePattern));
    }

    #[test]
    fn test_note_after_euclid_drops_gates() {
        let voice = Voice::new().euclid(3, 8, 0).unwrap().freq(&[A, B]).unwrap();
        assert_eq!(voice.sequence(0), vec![Some(A), Some(B)]);
    }

    #[test]
    fn test_parameter_setters_do_not_touch_timing() {
        let base = Voice::new().freq(&[A, B]).unwrap().euclid(3, 8, 1).unwrap();
        let styled = base
            .clone()
            .sound(Waveform::Sawtooth, Some(8))
            .gain(1.5)
            .unwrap()
            .lpf(800.0, 1.0)
            .unwrap()
            .adsr(0.001, 0.25, 0.0, 0.0)
            .unwrap();
        assert_eq!(styled.sequence(0), base.sequence(0));
        assert_eq!(styled.params().waveform, Waveform::Sawtooth);
        assert_eq!(styled.params().harmonics, Some(8));
        assert_eq!(styled.params().adsr.release, 0.001);
        assert_eq!(styled.params().filter.unwrap().kind, FilterKind::Lowpass);
        assert!(base.gain(-1.0).is_err());
    }

    #[test]
    fn test_single_envelope_setters_floor_zero() {
        let voice = Voice::new().att(0.0).unwrap().sus(0.0).unwrap().rel(0.3).unwrap();
        assert_eq!(voice.params().adsr.attack, 0.01);
        assert_eq!(voice.params().adsr.sustain, 0.01);
        assert_eq!(voice.params().adsr.release, 0.3);
    }

    #[test]
    fn test_fire_dispatches_in_step_order() {
        let voice = Voice::new().freq(&[A, B]).unwrap().euclid(3, 8, 0).unwrap();
        let recorder = RecordingToneGenerator::new();
        let mut sink = recorder.clone();

        let summary = voice.fire(&event(10.0, 0), &mut sink);
        assert_eq!(summary, FireSummary { dispatched: 3, failed: 0 });

        let requests = recorder.requests();
        let times: Vec<f64> = requests.iter().map(|r| r.time).collect();
        assert_eq!(times, vec![10.0, 10.75, 11.5]);
        let freqs: Vec<f64> = requests.iter().map(|r| r.frequency).collect();
        assert_eq!(freqs, vec![A, B, A]);
        assert!(requests.iter().all(|r| r.duration == 2.0));
    }

    #[test]
    fn test_fire_skips_rejected_notes() {
        let voice = Voice::new().freq(&[A, B, C]).unwrap();
        let mut calls = 0;
        let mut flaky = |request: &ToneRequest| {
            calls += 1;
            if request.frequency == B {
                Err(DispatchError::Rejected {
                    time: request.time,
                    reason: "voice limit".into(),
                })
            } else {
                Ok(())
            }
        };
        let summary = voice.fire(&event(0.0, 0), &mut flaky);
        assert_eq!(summary, FireSummary { dispatched: 2, failed: 1 });
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_freq_zero_is_rest() {
        let voice = Voice::new().freq(&[A, 0.0]).unwrap();
        assert_eq!(voice.sequence(0), vec![Some(A), None]);
    }
}
