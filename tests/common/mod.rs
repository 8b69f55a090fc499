//! Shared test utilities: pipeline mocks and an audio frame feeder
//!
//! The mocks let orchestrator scenarios run without audio hardware or
//! network access. Synthesized "audio" is just the reply text as bytes, so
//! playback records are assertable strings.

#![allow(dead_code)]
#![allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use murmur::session::TurnId;
use murmur::voice::stt::RecognitionResult;
use murmur::voice::{AudioFrame, FRAME_SIZE, PlaybackSink, ResponseSynthesizer, SpeechRecognizer};
use murmur::{Agent, Error, Result};

/// Recognizer that pops queued results in order
pub struct MockRecognizer {
    queue: Mutex<VecDeque<Result<RecognitionResult>>>,
    delay: Mutex<Duration>,
}

impl MockRecognizer {
    pub fn new(results: Vec<Result<RecognitionResult>>) -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(results.into()),
            delay: Mutex::new(Duration::ZERO),
        })
    }

    pub fn push(&self, result: Result<RecognitionResult>) {
        self.queue.lock().unwrap().push_back(result);
    }

    /// Delay applied to every recognition from now on
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }
}

#[async_trait]
impl SpeechRecognizer for MockRecognizer {
    async fn recognize(&self, _audio: &[u8]) -> Result<RecognitionResult> {
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Recognition("mock queue empty".to_string())))
    }
}

/// Synthesizer that returns the text itself as audio bytes
#[derive(Default)]
pub struct MockSynthesizer {
    synthesized: Mutex<Vec<String>>,
}

impl MockSynthesizer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn synthesized(&self) -> Vec<String> {
        self.synthesized.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResponseSynthesizer for MockSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        self.synthesized.lock().unwrap().push(text.to_string());
        Ok(text.as_bytes().to_vec())
    }
}

/// A single playback the mock sink observed
#[derive(Debug, Clone)]
pub struct PlayRecord {
    pub text: String,
    pub completed: bool,
}

/// Playback sink that "plays" for a configured duration and honors the
/// cancellation token
pub struct MockPlayback {
    duration: Duration,
    stop_delay: Duration,
    records: Mutex<Vec<PlayRecord>>,
}

impl MockPlayback {
    pub fn new(duration: Duration) -> Arc<Self> {
        Self::with_stop_delay(duration, Duration::ZERO)
    }

    /// Sink that keeps playing for `stop_delay` after a cancellation
    /// before acknowledging the stop
    pub fn with_stop_delay(duration: Duration, stop_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            duration,
            stop_delay,
            records: Mutex::new(Vec::new()),
        })
    }

    pub fn records(&self) -> Vec<PlayRecord> {
        self.records.lock().unwrap().clone()
    }

    /// Texts that played to completion
    pub fn completed_texts(&self) -> Vec<String> {
        self.records()
            .into_iter()
            .filter(|r| r.completed)
            .map(|r| r.text)
            .collect()
    }
}

#[async_trait]
impl PlaybackSink for MockPlayback {
    async fn play(&self, audio: Vec<u8>, cancel: &CancellationToken) -> Result<bool> {
        let text = String::from_utf8_lossy(&audio).into_owned();
        let completed = tokio::select! {
            () = tokio::time::sleep(self.duration) => true,
            () = cancel.cancelled() => {
                if !self.stop_delay.is_zero() {
                    tokio::time::sleep(self.stop_delay).await;
                }
                false
            }
        };
        self.records
            .lock()
            .unwrap()
            .push(PlayRecord { text, completed });
        Ok(completed)
    }
}

/// What the mock agent saw and did
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub turn_id: TurnId,
    pub text: String,
    pub cancelled: bool,
}

/// Agent with a fixed score, reply, and execution delay
pub struct MockAgent {
    name: &'static str,
    score: f32,
    reply: String,
    delay: Duration,
    fail: bool,
    executions: Arc<Mutex<Vec<ExecutionRecord>>>,
}

impl MockAgent {
    pub fn new(name: &'static str, score: f32, reply: &str) -> Self {
        Self {
            name,
            score,
            reply: reply.to_string(),
            delay: Duration::ZERO,
            fail: false,
            executions: Arc::new(Mutex::new(Vec::new())),
        }
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    #[must_use]
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Shared handle to this agent's execution log
    pub fn executions_handle(&self) -> Arc<Mutex<Vec<ExecutionRecord>>> {
        Arc::clone(&self.executions)
    }
}

#[async_trait]
impl Agent for MockAgent {
    fn name(&self) -> &str {
        self.name
    }

    fn can_handle(&self, _text: &str) -> f32 {
        self.score
    }

    async fn execute(
        &self,
        turn_id: TurnId,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let cancelled = if self.delay.is_zero() {
            false
        } else {
            tokio::select! {
                () = tokio::time::sleep(self.delay) => false,
                () = cancel.cancelled() => true,
            }
        };

        self.executions.lock().unwrap().push(ExecutionRecord {
            turn_id,
            text: text.to_string(),
            cancelled,
        });

        if cancelled {
            return Err(Error::Agent("cancelled".to_string()));
        }
        if self.fail {
            return Err(Error::Agent("mock failure".to_string()));
        }
        Ok(self.reply.clone())
    }
}

/// Feeds synthetic 10ms frames with monotonically increasing timestamps
pub struct FrameFeeder {
    tx: mpsc::Sender<AudioFrame>,
    next_ms: u64,
}

impl FrameFeeder {
    pub fn new(tx: mpsc::Sender<AudioFrame>) -> Self {
        Self { tx, next_ms: 0 }
    }

    async fn send(&mut self, samples: Vec<f32>) {
        let frame = AudioFrame {
            samples,
            timestamp: Duration::from_millis(self.next_ms),
        };
        self.next_ms += 10;
        self.tx.send(frame).await.expect("orchestrator gone");
    }

    /// Feed `ms` of loud sine frames (reads as speech)
    pub async fn speak(&mut self, ms: u64) {
        for _ in 0..ms / 10 {
            let base = self.next_ms;
            let samples: Vec<f32> = (0..FRAME_SIZE)
                .map(|i| {
                    let t = (base as usize * 16 + i) as f32 / 16000.0;
                    0.3 * (2.0 * std::f32::consts::PI * 440.0 * t).sin()
                })
                .collect();
            self.send(samples).await;
        }
    }

    /// Feed `ms` of silence frames
    pub async fn silence(&mut self, ms: u64) {
        for _ in 0..ms / 10 {
            self.send(vec![0.0; FRAME_SIZE]).await;
        }
    }
}

/// Poll until `check` returns true or the timeout elapses
pub async fn wait_for<F: FnMut() -> bool>(mut check: F, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() > deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
