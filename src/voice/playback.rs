//! Audio playback to speakers
//!
//! Playback is interruptible: the player polls its cancellation token at
//! frame granularity, and returning from [`PlaybackSink::play`] is the
//! acknowledgement that output has stopped. A superseding turn must not
//! start speaking until that acknowledgement arrives.

use std::io::Cursor;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

/// Sample rate for playback (matches common TTS output)
const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Poll interval while playing; bounds how long a stop can take
const POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(10);

/// Plays synthesized audio
#[async_trait]
pub trait PlaybackSink: Send + Sync {
    /// Play synthesized audio (MP3 bytes) until done or `cancel` fires
    ///
    /// Returns true if playback ran to completion, false if it was
    /// interrupted. In both cases output has stopped by the time this
    /// returns.
    ///
    /// # Errors
    ///
    /// Returns error if decoding fails or the output device fails
    async fn play(&self, audio: Vec<u8>, cancel: &CancellationToken) -> Result<bool>;
}

/// Plays audio to the default output device
pub struct AudioPlayback {
    config: StreamConfig,
}

impl AudioPlayback {
    /// Create a new audio playback instance
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
            })
            .or_else(|| {
                // Fallback: try stereo
                device.supported_output_configs().ok()?.find(|c| {
                    c.channels() == 2
                        && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                        && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
                })
            })
            .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(PLAYBACK_SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = PLAYBACK_SAMPLE_RATE,
            channels = config.channels,
            "audio playback initialized"
        );

        Ok(Self { config })
    }

    /// Play raw f32 samples until done or `cancel` fires
    ///
    /// The cpal stream is not `Send`, so the whole play runs on a blocking
    /// worker thread and this future stays spawnable.
    ///
    /// # Errors
    ///
    /// Returns error if the output device fails
    pub async fn play_samples(&self, samples: Vec<f32>, cancel: &CancellationToken) -> Result<bool> {
        if samples.is_empty() {
            return Ok(true);
        }

        let config = self.config.clone();
        let cancel = cancel.clone();

        tokio::task::spawn_blocking(move || play_samples_blocking(&config, &samples, &cancel))
            .await
            .map_err(|e| Error::Playback(format!("playback task failed: {e}")))?
    }
}

fn play_samples_blocking(
    config: &StreamConfig,
    samples: &[f32],
    cancel: &CancellationToken,
) -> Result<bool> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Playback("no output device".to_string()))?;

    let channels = config.channels as usize;

    let sample_count = samples.len();
    let samples = Arc::new(samples.to_vec());
    let position = Arc::new(Mutex::new(0usize));
    let finished = Arc::new(Mutex::new(false));

    let samples_cb = Arc::clone(&samples);
    let position_cb = Arc::clone(&position);
    let finished_cb = Arc::clone(&finished);

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let Ok(mut pos) = position_cb.lock() else {
                    return;
                };

                for frame in data.chunks_mut(channels) {
                    let sample = if *pos < samples_cb.len() {
                        samples_cb[*pos]
                    } else {
                        if let Ok(mut done) = finished_cb.lock() {
                            *done = true;
                        }
                        0.0
                    };

                    for out in frame.iter_mut() {
                        *out = sample;
                    }

                    if *pos < samples_cb.len() {
                        *pos += 1;
                    }
                }
            },
            |err| {
                tracing::error!(error = %err, "audio playback error");
            },
            None,
        )
        .map_err(|e| Error::Playback(e.to_string()))?;

    stream.play().map_err(|e| Error::Playback(e.to_string()))?;

    let duration_ms = (sample_count as u64 * 1000) / u64::from(PLAYBACK_SAMPLE_RATE);
    let deadline = std::time::Instant::now() + std::time::Duration::from_millis(duration_ms + 500);

    let completed = loop {
        if cancel.is_cancelled() {
            tracing::debug!("playback interrupted");
            break false;
        }
        if finished.lock().map_or(true, |done| *done) {
            break true;
        }
        if std::time::Instant::now() > deadline {
            break true;
        }
        std::thread::sleep(POLL_INTERVAL);
    };

    // Dropping the stream stops output; once we return, the stop is
    // acknowledged
    drop(stream);
    tracing::debug!(samples = sample_count, completed, "playback finished");

    Ok(completed)
}

#[async_trait]
impl PlaybackSink for AudioPlayback {
    async fn play(&self, audio: Vec<u8>, cancel: &CancellationToken) -> Result<bool> {
        let samples = decode_mp3(&audio)?;
        self.play_samples(samples, cancel).await
    }
}

/// Decode MP3 bytes to f32 samples
///
/// # Errors
///
/// Returns error if the MP3 data is malformed
pub fn decode_mp3(mp3_data: &[u8]) -> Result<Vec<f32>> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                // Convert i16 samples to f32 and handle stereo to mono
                let frame_samples: Vec<f32> = if frame.channels == 2 {
                    // Stereo: average channels
                    frame
                        .data
                        .chunks(2)
                        .map(|chunk| {
                            let left = f32::from(chunk[0]) / 32768.0;
                            let right =
                                f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                            f32::midpoint(left, right)
                        })
                        .collect()
                } else {
                    // Mono
                    frame.data.iter().map(|&s| f32::from(s) / 32768.0).collect()
                };

                samples.extend(frame_samples);
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Playback(format!("MP3 decode error: {e}"))),
        }
    }

    Ok(samples)
}
