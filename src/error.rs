//! Error types for the murmur assistant

use thiserror::Error;

/// Result type alias for murmur operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the assistant
///
/// None of these is fatal to the dialogue loop: the orchestrator reports the
/// failure (usually as a spoken apology) and returns to idle. Only loss of
/// the capture device itself escapes `run()`.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech recognition failed
    #[error("recognition error: {0}")]
    Recognition(String),

    /// Speech recognition did not complete in time
    #[error("recognition timed out after {0:?}")]
    RecognitionTimeout(std::time::Duration),

    /// No agent scored the request above zero
    #[error("no agent available for: {0}")]
    NoAgentAvailable(String),

    /// Agent execution failed
    #[error("agent error: {0}")]
    Agent(String),

    /// Agent execution exceeded its budget
    #[error("agent {agent} timed out after {timeout:?}")]
    AgentTimeout {
        /// Name of the agent that ran over
        agent: String,
        /// Configured per-agent budget
        timeout: std::time::Duration,
    },

    /// Speech synthesis failed
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Audio playback failed
    #[error("playback error: {0}")]
    Playback(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Spreadsheet parsing error
    #[error("spreadsheet error: {0}")]
    Spreadsheet(#[from] csv::Error),
}
