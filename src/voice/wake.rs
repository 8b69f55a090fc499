//! Wake word gating
//!
//! Gates the pipeline on a wake phrase using a hybrid approach: local
//! energy detection finds candidate speech segments, the transcript of a
//! segment is then checked for the configured phrase.

use crate::voice::AudioFrame;

/// Minimum audio energy threshold to consider speech
pub const ENERGY_THRESHOLD: f32 = 0.03;

/// Minimum duration of speech to produce a candidate (in samples at 16kHz)
const MIN_SPEECH_SAMPLES: usize = 4800; // 0.3 seconds

/// Silence duration to consider end of a candidate segment (in samples)
const SILENCE_SAMPLES: usize = 8000; // 0.5 seconds

/// State of the wake gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// Waiting for speech energy
    Idle,
    /// Accumulating a candidate segment
    Accumulating,
    /// Wake phrase confirmed, pipeline open
    Open,
}

/// Decides when the pipeline wakes up
///
/// Implementations observe raw frames and report when a candidate speech
/// segment is ready for transcript verification. The gate stays closed
/// until [`WakeWordGate::verify`] confirms the phrase.
pub trait WakeWordGate: Send {
    /// Feed a captured frame; returns true when a candidate segment is
    /// complete and should be transcribed for verification
    fn observe(&mut self, frame: &AudioFrame) -> bool;

    /// Check a transcript for the wake phrase, opening the gate on match
    fn verify(&mut self, transcript: &str) -> bool;

    /// Take the accumulated candidate samples, clearing them
    fn take_segment(&mut self) -> Vec<f32>;

    /// Whether the gate is open (wake phrase confirmed)
    fn is_open(&self) -> bool;

    /// Close the gate and drop any accumulated audio
    fn reset(&mut self);
}

/// Energy-based wake gate
pub struct EnergyWakeGate {
    wake_phrases: Vec<String>,
    state: GateState,
    segment: Vec<f32>,
    /// Samples in the segment that carried speech energy
    speech_counter: usize,
    silence_counter: usize,
}

impl EnergyWakeGate {
    /// Create a gate for the given wake phrases (e.g. "hey murmur")
    #[must_use]
    pub fn new(wake_phrases: Vec<String>) -> Self {
        let normalized: Vec<String> = wake_phrases
            .into_iter()
            .map(|w| w.to_lowercase().trim().to_string())
            .collect();

        tracing::debug!(wake_phrases = ?normalized, "wake gate initialized");

        Self {
            wake_phrases: normalized,
            state: GateState::Idle,
            segment: Vec::new(),
            speech_counter: 0,
            silence_counter: 0,
        }
    }

    /// Get current state
    #[must_use]
    pub const fn state(&self) -> GateState {
        self.state
    }

    /// Get the configured wake phrases
    #[must_use]
    pub fn wake_phrases(&self) -> &[String] {
        &self.wake_phrases
    }
}

impl WakeWordGate for EnergyWakeGate {
    fn observe(&mut self, frame: &AudioFrame) -> bool {
        let energy = calculate_energy(&frame.samples);
        let is_speech = energy > ENERGY_THRESHOLD;

        match self.state {
            GateState::Idle => {
                if is_speech {
                    self.state = GateState::Accumulating;
                    self.segment.clear();
                    self.segment.extend_from_slice(&frame.samples);
                    self.speech_counter = frame.samples.len();
                    self.silence_counter = 0;
                    tracing::trace!(energy, "speech detected, accumulating");
                }
            }
            GateState::Accumulating => {
                self.segment.extend_from_slice(&frame.samples);

                if is_speech {
                    self.speech_counter += frame.samples.len();
                    self.silence_counter = 0;
                } else {
                    self.silence_counter += frame.samples.len();
                }

                // Enough speech followed by silence: candidate ready
                if self.silence_counter > SILENCE_SAMPLES
                    && self.speech_counter > MIN_SPEECH_SAMPLES
                {
                    tracing::debug!(samples = self.segment.len(), "candidate segment complete");
                    return true;
                }

                // Too much silence without enough speech
                if self.silence_counter > SILENCE_SAMPLES * 2 {
                    tracing::trace!("segment timeout, resetting");
                    self.reset();
                }
            }
            GateState::Open => {}
        }

        false
    }

    fn verify(&mut self, transcript: &str) -> bool {
        let normalized = transcript.to_lowercase();

        for phrase in &self.wake_phrases {
            if normalized.contains(phrase.as_str()) {
                tracing::info!(phrase, transcript, "wake phrase detected");
                self.state = GateState::Open;
                return true;
            }
        }

        self.reset();
        false
    }

    fn take_segment(&mut self) -> Vec<f32> {
        self.speech_counter = 0;
        self.silence_counter = 0;
        std::mem::take(&mut self.segment)
    }

    fn is_open(&self) -> bool {
        self.state == GateState::Open
    }

    fn reset(&mut self) {
        self.state = GateState::Idle;
        self.segment.clear();
        self.speech_counter = 0;
        self.silence_counter = 0;
    }
}

/// Calculate RMS energy of audio samples
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn calculate_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Whether a frame carries speech energy
#[must_use]
pub fn is_speech(samples: &[f32]) -> bool {
    calculate_energy(samples) > ENERGY_THRESHOLD
}
