//! Audio capture, wake word gating, speech recognition, synthesis, playback

pub mod capture;
pub mod playback;
pub mod stt;
pub mod tts;
pub mod wake;

pub use capture::{samples_to_wav, AudioCapture, AudioFrame, FRAME_SIZE, SAMPLE_RATE};
pub use playback::{AudioPlayback, PlaybackSink};
pub use stt::{DeepgramRecognizer, RecognitionResult, SpeechRecognizer, WhisperRecognizer};
pub use tts::{ElevenLabsSynthesizer, OpenAiSynthesizer, ResponseSynthesizer};
pub use wake::{EnergyWakeGate, GateState, WakeWordGate};
