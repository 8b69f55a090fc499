//! Speech recognition
//!
//! Turns sealed utterance audio into text with a confidence score. Only a
//! final result may start a turn; partial results are informational.

use async_trait::async_trait;

use crate::{Error, Result};

/// Transcription of an utterance
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionResult {
    /// Recognized text
    pub text: String,
    /// Confidence in [0.0, 1.0]
    pub confidence: f32,
    /// Whether this is the final result for the utterance
    pub is_final: bool,
}

impl RecognitionResult {
    /// A final result with the given text and confidence
    #[must_use]
    pub fn final_result(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
            is_final: true,
        }
    }
}

/// Transcribes utterance audio
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Transcribe WAV audio bytes
    ///
    /// # Errors
    ///
    /// Returns error if the recognition backend fails
    async fn recognize(&self, audio: &[u8]) -> Result<RecognitionResult>;
}

/// Response from `OpenAI` Whisper transcription API
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Recognizer backed by `OpenAI` Whisper
pub struct WhisperRecognizer {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl WhisperRecognizer {
    /// Create a Whisper recognizer
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(api_key: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "OpenAI API key required for Whisper".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
        })
    }
}

#[async_trait]
impl SpeechRecognizer for WhisperRecognizer {
    async fn recognize(&self, audio: &[u8]) -> Result<RecognitionResult> {
        tracing::debug!(audio_bytes = audio.len(), "starting Whisper transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio.to_vec())
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Recognition(e.to_string()))?,
            )
            .text("model", self.model.clone());

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/transcriptions")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Whisper request failed");
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Whisper API error");
            return Err(Error::Recognition(format!(
                "Whisper API error {status}: {body}"
            )));
        }

        let result: WhisperResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse Whisper response");
            e
        })?;

        // Whisper reports no confidence; treat any non-empty transcript as firm
        let confidence = if result.text.trim().is_empty() { 0.0 } else { 1.0 };

        tracing::info!(transcript = %result.text, "transcription complete");
        Ok(RecognitionResult::final_result(result.text, confidence))
    }
}

/// Response from Deepgram transcription API
#[derive(serde::Deserialize)]
struct DeepgramResponse {
    results: DeepgramResults,
}

#[derive(serde::Deserialize)]
struct DeepgramResults {
    channels: Vec<DeepgramChannel>,
}

#[derive(serde::Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(serde::Deserialize)]
struct DeepgramAlternative {
    transcript: String,
    confidence: f32,
}

/// Recognizer backed by Deepgram
pub struct DeepgramRecognizer {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl DeepgramRecognizer {
    /// Create a Deepgram recognizer
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(api_key: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("Deepgram API key required".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
        })
    }
}

#[async_trait]
impl SpeechRecognizer for DeepgramRecognizer {
    async fn recognize(&self, audio: &[u8]) -> Result<RecognitionResult> {
        tracing::debug!(audio_bytes = audio.len(), "starting Deepgram transcription");

        let url = format!(
            "https://api.deepgram.com/v1/listen?model={}&punctuate=true",
            self.model
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Token {}", self.api_key))
            .header("Content-Type", "audio/wav")
            .body(audio.to_vec())
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Deepgram request failed");
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Deepgram API error");
            return Err(Error::Recognition(format!(
                "Deepgram API error {status}: {body}"
            )));
        }

        let result: DeepgramResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse Deepgram response");
            e
        })?;

        let alternative = result
            .results
            .channels
            .first()
            .and_then(|c| c.alternatives.first());

        let (transcript, confidence) = alternative
            .map(|a| (a.transcript.clone(), a.confidence))
            .unwrap_or_default();

        tracing::info!(transcript = %transcript, confidence, "transcription complete");
        Ok(RecognitionResult::final_result(transcript, confidence))
    }
}
