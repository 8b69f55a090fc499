//! Murmur - Wake-word driven voice assistant
//!
//! This library provides the core functionality for the murmur assistant:
//! - Voice processing (wake word gating, STT, TTS, playback)
//! - Dialogue orchestration (turn lifecycle, barge-in, timeouts)
//! - Task agents (filesystem, web search, spreadsheets)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Microphone                        │
//! └────────────────────┬────────────────────────────────┘
//!                      │ frames
//! ┌────────────────────▼────────────────────────────────┐
//! │                 Orchestrator                         │
//! │   Wake Gate  │  STT  │  Router  │  TTS  │ Playback │
//! └────────────────────┬────────────────────────────────┘
//!                      │ turns
//! ┌────────────────────▼────────────────────────────────┐
//! │                    Agents                            │
//! │   Filesystem  │  Web Search  │  Spreadsheet  │ ...  │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod agents;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod session;
pub mod voice;

pub use agents::{Agent, AgentRegistry};
pub use config::{ApiKeys, Config, OrchestratorConfig, VoiceConfig};
pub use error::{Error, Result};
pub use orchestrator::{DialogueState, Orchestrator};
pub use session::{AgentResult, Session, Turn, TurnId, TurnOutcome, Utterance};
pub use voice::{
    AudioCapture, AudioFrame, AudioPlayback, PlaybackSink, RecognitionResult, ResponseSynthesizer,
    SpeechRecognizer, WakeWordGate,
};
