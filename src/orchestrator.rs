//! Dialogue orchestration
//!
//! The orchestrator owns the whole pipeline: wake gating, utterance
//! capture, recognition, agent dispatch, and response playback. It is the
//! single writer of [`Session`] state; recognition, agents, and playback
//! run as spawned tasks that report back over an event channel tagged with
//! the turn they belong to. Results for a superseded turn are dropped on
//! arrival.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::agents::AgentRegistry;
use crate::config::OrchestratorConfig;
use crate::session::{AgentResult, Session, TurnId, TurnOutcome, Utterance};
use crate::voice::stt::RecognitionResult;
use crate::voice::wake::{self, WakeWordGate};
use crate::voice::{samples_to_wav, AudioFrame, PlaybackSink, ResponseSynthesizer, SpeechRecognizer, SAMPLE_RATE};
use crate::{Error, Result};

const WAKE_ACK: &str = "Yes?";
const APOLOGY_UNCLEAR: &str = "Sorry, I didn't catch that";
const APOLOGY_FAILURE: &str = "Sorry, something went wrong";
const APOLOGY_NO_AGENT: &str = "Sorry, I can't help with that yet";

/// Pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogueState {
    /// Gate closed, waiting for the wake phrase
    Idle,
    /// Gate open, accumulating an utterance
    Listening,
    /// Utterance sealed, recognition in flight
    Recognizing,
    /// Final text accepted, agent in flight
    Dispatching,
    /// Agent replied, speaking the response
    Responding,
}

/// Completion events from spawned pipeline tasks
enum Event {
    WakeTranscribed {
        generation: u64,
        result: Result<RecognitionResult>,
    },
    UtteranceRecognized {
        generation: u64,
        result: Result<RecognitionResult>,
    },
    AgentFinished(AgentResult),
    PlaybackFinished {
        turn_id: TurnId,
        completed: bool,
        error: Option<String>,
    },
}

enum Step {
    Shutdown,
    Frame(AudioFrame),
    FramesClosed,
    Event(Event),
}

/// Drives the dialogue pipeline
pub struct Orchestrator {
    wake_phrase: String,
    policy: OrchestratorConfig,
    gate: Box<dyn WakeWordGate>,
    recognizer: Arc<dyn SpeechRecognizer>,
    synthesizer: Arc<dyn ResponseSynthesizer>,
    playback: Arc<dyn PlaybackSink>,
    registry: Arc<AgentRegistry>,

    session: Session,
    state: DialogueState,
    utterance: Option<Utterance>,

    /// Generation counters so late task completions can be recognized
    wake_generation: u64,
    recognition_generation: u64,

    /// Playback of a cancelled turn we are still waiting on
    pending_stop: Option<TurnId>,
    /// Reply held back until the pending stop is acknowledged
    deferred_reply: Option<(TurnId, String)>,
    /// Prompt held back until the pending stop is acknowledged
    deferred_prompt: Option<&'static str>,

    /// Token for prompts not tied to a turn (acks, apologies)
    prompt_cancel: CancellationToken,

    events_tx: mpsc::Sender<Event>,
    events_rx: mpsc::Receiver<Event>,
    frames_rx: mpsc::Receiver<AudioFrame>,
    shutdown: CancellationToken,
}

impl Orchestrator {
    /// Create an orchestrator over the given pipeline components
    ///
    /// `frames_rx` carries captured audio; the orchestrator runs until
    /// `shutdown` fires or the frame source closes.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        wake_phrase: String,
        policy: OrchestratorConfig,
        gate: Box<dyn WakeWordGate>,
        recognizer: Arc<dyn SpeechRecognizer>,
        synthesizer: Arc<dyn ResponseSynthesizer>,
        playback: Arc<dyn PlaybackSink>,
        registry: Arc<AgentRegistry>,
        frames_rx: mpsc::Receiver<AudioFrame>,
        shutdown: CancellationToken,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(64);
        let prompt_cancel = shutdown.child_token();

        Self {
            wake_phrase: wake_phrase.to_lowercase(),
            policy,
            gate,
            recognizer,
            synthesizer,
            playback,
            registry,
            session: Session::new(),
            state: DialogueState::Idle,
            utterance: None,
            wake_generation: 0,
            recognition_generation: 0,
            pending_stop: None,
            deferred_reply: None,
            deferred_prompt: None,
            prompt_cancel,
            events_tx,
            events_rx,
            frames_rx,
            shutdown,
        }
    }

    /// Run the dialogue loop until shutdown
    ///
    /// # Errors
    ///
    /// Currently infallible at the loop level; component failures are
    /// spoken as apologies and logged rather than tearing the loop down.
    pub async fn run(mut self) -> Result<()> {
        tracing::info!(wake_phrase = %self.wake_phrase, "orchestrator started");

        loop {
            let step = tokio::select! {
                () = self.shutdown.cancelled() => Step::Shutdown,
                frame = self.frames_rx.recv() => {
                    frame.map_or(Step::FramesClosed, Step::Frame)
                }
                event = self.events_rx.recv() => {
                    // A sender lives in self, so recv cannot return None
                    event.map_or(Step::Shutdown, Step::Event)
                }
            };

            match step {
                Step::Shutdown => {
                    tracing::info!("shutdown requested");
                    break;
                }
                Step::FramesClosed => {
                    tracing::info!("frame source closed, stopping");
                    break;
                }
                Step::Frame(frame) => self.on_frame(frame),
                Step::Event(event) => self.on_event(event),
            }
        }

        self.session.cancel_active();
        Ok(())
    }

    /// Current pipeline state
    #[must_use]
    pub const fn state(&self) -> DialogueState {
        self.state
    }

    fn on_frame(&mut self, frame: AudioFrame) {
        if self.state == DialogueState::Listening {
            self.on_listening_frame(frame);
            return;
        }

        // In every other state the gate watches for a wake phrase; during
        // an active turn a confirmed wake is a barge-in
        if self.gate.observe(&frame) {
            let samples = self.gate.take_segment();
            self.spawn_wake_check(samples);
        }
    }

    fn on_listening_frame(&mut self, frame: AudioFrame) {
        let now = frame.timestamp;
        let speech = wake::is_speech(&frame.samples);

        let Some(utterance) = self.utterance.as_mut() else {
            return;
        };
        utterance.push(frame, speech);

        if utterance.silence_since(now) >= self.policy.silence_timeout() {
            self.seal_utterance();
        }
    }

    /// Close the open utterance and hand it to recognition
    fn seal_utterance(&mut self) {
        let Some(mut utterance) = self.utterance.take() else {
            return;
        };
        utterance.seal();

        if utterance.speech_duration() < self.policy.min_speech() {
            tracing::debug!(
                speech = ?utterance.speech_duration(),
                "utterance below minimum speech, discarding"
            );
            self.to_idle();
            return;
        }

        let samples = utterance.samples();
        tracing::debug!(samples = samples.len(), "utterance sealed");

        self.state = DialogueState::Recognizing;
        // Gate closes again so a new wake phrase can barge in
        self.gate.reset();

        self.recognition_generation += 1;
        let generation = self.recognition_generation;
        let recognizer = Arc::clone(&self.recognizer);
        let budget = self.policy.recognition_timeout();
        let tx = self.events_tx.clone();

        tokio::spawn(async move {
            let result = recognize_samples(recognizer.as_ref(), &samples, budget).await;
            let _ = tx.send(Event::UtteranceRecognized { generation, result }).await;
        });
    }

    fn spawn_wake_check(&mut self, samples: Vec<f32>) {
        self.wake_generation += 1;
        let generation = self.wake_generation;
        let recognizer = Arc::clone(&self.recognizer);
        let budget = self.policy.recognition_timeout();
        let tx = self.events_tx.clone();

        tokio::spawn(async move {
            let result = recognize_samples(recognizer.as_ref(), &samples, budget).await;
            let _ = tx.send(Event::WakeTranscribed { generation, result }).await;
        });
    }

    fn on_event(&mut self, event: Event) {
        match event {
            Event::WakeTranscribed { generation, result } => {
                self.on_wake_transcribed(generation, result);
            }
            Event::UtteranceRecognized { generation, result } => {
                self.on_utterance_recognized(generation, result);
            }
            Event::AgentFinished(result) => self.on_agent_finished(result),
            Event::PlaybackFinished {
                turn_id,
                completed,
                error,
            } => self.on_playback_finished(turn_id, completed, error),
        }
    }

    fn on_wake_transcribed(&mut self, generation: u64, result: Result<RecognitionResult>) {
        if generation != self.wake_generation {
            tracing::trace!(generation, "stale wake check dropped");
            return;
        }

        let result = match result {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!(error = %e, "wake check transcription failed");
                self.gate.reset();
                return;
            }
        };

        if !self.gate.verify(&result.text) {
            return;
        }

        // Confirmed wake while a turn is in flight supersedes it
        self.prompt_cancel.cancel();
        self.prompt_cancel = self.shutdown.child_token();
        self.deferred_prompt = None;
        // A reply still held back never reached the sink, so its turn has
        // no playback to acknowledge; any earlier stop we are waiting on
        // stays pending
        let was_deferred = self.deferred_reply.take().is_some();

        let was_responding = self.state == DialogueState::Responding;
        if let Some(old) = self.session.cancel_active() {
            tracing::info!(superseded = %old, "barge-in");
            if was_responding && !was_deferred {
                // New speech must wait for this playback's stop ack
                self.pending_stop = Some(old);
            }
        }

        let command = extract_command(&result.text, &self.wake_phrase);
        if command.is_empty() {
            self.say(WAKE_ACK);
            self.utterance = Some(Utterance::new());
            self.state = DialogueState::Listening;
            tracing::info!("wake phrase confirmed, listening");
        } else {
            // The wake utterance already carried the request; close the
            // gate again so a later wake phrase can barge in
            self.gate.reset();
            self.handle_final_result(RecognitionResult {
                text: command,
                confidence: result.confidence,
                is_final: true,
            });
        }
    }

    fn on_utterance_recognized(&mut self, generation: u64, result: Result<RecognitionResult>) {
        // Anything but the recognition we are waiting on is stale; this
        // also makes duplicate final results a no-op
        if self.state != DialogueState::Recognizing || generation != self.recognition_generation {
            tracing::debug!(generation, "stale recognition result dropped");
            return;
        }

        match result {
            Err(e) => {
                tracing::warn!(error = %e, "recognition failed");
                self.say(APOLOGY_UNCLEAR);
                self.to_idle();
            }
            Ok(r) if !r.is_final => {
                tracing::trace!(partial = %r.text, "partial result ignored");
            }
            Ok(r) => self.handle_final_result(r),
        }
    }

    /// Accept or reject a final recognition result and dispatch a turn
    fn handle_final_result(&mut self, result: RecognitionResult) {
        if result.text.trim().is_empty() {
            tracing::debug!("empty transcript");
            self.say(APOLOGY_UNCLEAR);
            self.to_idle();
            return;
        }

        // Exactly at threshold is accepted
        if result.confidence < self.policy.confidence_threshold {
            tracing::info!(
                confidence = result.confidence,
                threshold = self.policy.confidence_threshold,
                "confidence below threshold, rejecting"
            );
            self.say(APOLOGY_UNCLEAR);
            self.to_idle();
            return;
        }

        let agent = match self.registry.route(&result.text, None) {
            Ok(agent) => agent.name().to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "no agent for request");
                self.say(APOLOGY_NO_AGENT);
                self.to_idle();
                return;
            }
        };

        let (turn_id, cancel) =
            self.session
                .begin_turn(result.text.clone(), result.confidence, agent.clone());
        self.state = DialogueState::Dispatching;
        tracing::info!(turn = %turn_id, agent = %agent, text = %result.text, "turn dispatched");

        let registry = Arc::clone(&self.registry);
        let budget = self.policy.agent_timeout();
        let tx = self.events_tx.clone();
        let text = result.text;

        tokio::spawn(async move {
            let reply = match tokio::time::timeout(
                budget,
                registry.dispatch(&agent, turn_id, &text, &cancel),
            )
            .await
            {
                Ok(Ok(reply)) => Ok(reply),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err(Error::AgentTimeout {
                    agent,
                    timeout: budget,
                }
                .to_string()),
            };

            let _ = tx
                .send(Event::AgentFinished(AgentResult {
                    turn_id,
                    reply,
                    produced_at: Instant::now(),
                }))
                .await;
        });
    }

    fn on_agent_finished(&mut self, result: AgentResult) {
        if !self.session.is_active(result.turn_id) {
            tracing::debug!(turn = %result.turn_id, "stale agent result dropped");
            return;
        }

        match result.reply {
            Ok(reply) => {
                tracing::debug!(turn = %result.turn_id, reply_len = reply.len(), "agent replied");
                self.start_response(result.turn_id, reply);
            }
            Err(e) => {
                tracing::warn!(turn = %result.turn_id, error = %e, "agent failed");
                self.session.close_turn(result.turn_id, TurnOutcome::Failed);
                self.say(APOLOGY_FAILURE);
                self.to_idle();
            }
        }
    }

    fn start_response(&mut self, turn_id: TurnId, reply: String) {
        self.state = DialogueState::Responding;

        if self.pending_stop.is_some() {
            // The superseded turn's playback has not acknowledged its stop
            // yet; responding now would overlap output
            tracing::debug!(turn = %turn_id, "response deferred until stop is acknowledged");
            self.deferred_reply = Some((turn_id, reply));
            return;
        }

        self.spawn_speak(turn_id, reply);
    }

    fn spawn_speak(&mut self, turn_id: TurnId, reply: String) {
        let Some(cancel) = self.session.active_token() else {
            return;
        };
        let synthesizer = Arc::clone(&self.synthesizer);
        let playback = Arc::clone(&self.playback);
        let budget = self.policy.synthesis_timeout();
        let tx = self.events_tx.clone();

        tokio::spawn(async move {
            let outcome = speak(
                synthesizer.as_ref(),
                playback.as_ref(),
                &reply,
                &cancel,
                budget,
            )
            .await;

            let event = match outcome {
                Ok(completed) => Event::PlaybackFinished {
                    turn_id,
                    completed,
                    error: None,
                },
                Err(e) => Event::PlaybackFinished {
                    turn_id,
                    completed: false,
                    error: Some(e.to_string()),
                },
            };
            let _ = tx.send(event).await;
        });
    }

    fn on_playback_finished(&mut self, turn_id: TurnId, completed: bool, error: Option<String>) {
        if self.pending_stop == Some(turn_id) {
            self.pending_stop = None;
            tracing::debug!(turn = %turn_id, "playback stop acknowledged");

            if let Some((next, reply)) = self.deferred_reply.take()
                && self.session.is_active(next)
            {
                // A held reply supersedes any held prompt
                self.deferred_prompt = None;
                self.spawn_speak(next, reply);
            } else if let Some(text) = self.deferred_prompt.take() {
                self.spawn_prompt(text);
            }
            return;
        }

        if !self.session.is_active(turn_id) {
            tracing::debug!(turn = %turn_id, "stale playback completion dropped");
            return;
        }

        if let Some(e) = error {
            tracing::warn!(turn = %turn_id, error = %e, "response playback failed");
            self.session.close_turn(turn_id, TurnOutcome::Failed);
            self.to_idle();
            return;
        }

        self.session.close_turn(turn_id, TurnOutcome::Succeeded);
        tracing::info!(turn = %turn_id, completed, "turn complete");
        self.to_idle();
    }

    /// Return to idle; the gate must confirm a wake phrase again
    fn to_idle(&mut self) {
        self.state = DialogueState::Idle;
        self.utterance = None;
        self.gate.reset();
    }

    /// Speak a prompt that belongs to no turn (wake ack, apologies)
    ///
    /// Held back while a cancelled playback has not yet acknowledged its
    /// stop, so two writers never overlap on the sink.
    fn say(&mut self, text: &'static str) {
        if self.pending_stop.is_some() {
            self.deferred_prompt = Some(text);
            return;
        }
        self.spawn_prompt(text);
    }

    fn spawn_prompt(&self, text: &'static str) {
        let synthesizer = Arc::clone(&self.synthesizer);
        let playback = Arc::clone(&self.playback);
        let budget = self.policy.synthesis_timeout();
        let cancel = self.prompt_cancel.clone();

        tokio::spawn(async move {
            if let Err(e) = speak(synthesizer.as_ref(), playback.as_ref(), text, &cancel, budget).await
            {
                tracing::warn!(error = %e, text, "prompt playback failed");
            }
        });
    }
}

/// Encode samples and transcribe within a budget
async fn recognize_samples(
    recognizer: &dyn SpeechRecognizer,
    samples: &[f32],
    budget: std::time::Duration,
) -> Result<RecognitionResult> {
    let wav = samples_to_wav(samples, SAMPLE_RATE)?;
    match tokio::time::timeout(budget, recognizer.recognize(&wav)).await {
        Ok(result) => result,
        Err(_) => Err(Error::RecognitionTimeout(budget)),
    }
}

/// Synthesize within a budget and play until done or cancelled
async fn speak(
    synthesizer: &dyn ResponseSynthesizer,
    playback: &dyn PlaybackSink,
    text: &str,
    cancel: &CancellationToken,
    budget: std::time::Duration,
) -> Result<bool> {
    tracing::debug!(text, "speaking");
    let audio = tokio::time::timeout(budget, synthesizer.synthesize(text))
        .await
        .map_err(|_| Error::Synthesis(format!("synthesis timed out after {budget:?}")))??;

    if cancel.is_cancelled() {
        return Ok(false);
    }
    playback.play(audio, cancel).await
}

/// Extract the request after the wake phrase
///
/// The phrase is matched case-insensitively over the transcript itself so
/// the remainder keeps its casing. Case folding can change byte lengths,
/// so offsets from a lowercased copy must never be applied back to the
/// original text.
fn extract_command(transcript: &str, wake_phrase: &str) -> String {
    for (start, _) in transcript.char_indices() {
        if let Some(len) = phrase_prefix_len(&transcript[start..], wake_phrase) {
            return transcript[start + len..]
                .trim_start_matches(|c: char| c.is_whitespace() || c == ',' || c == '.')
                .trim_end()
                .to_string();
        }
    }
    transcript.trim().to_string()
}

/// Byte length of the prefix of `haystack` that matches `phrase` after
/// case folding both sides, if there is one
fn phrase_prefix_len(haystack: &str, phrase: &str) -> Option<usize> {
    let mut wanted = phrase.chars().flat_map(char::to_lowercase);
    let mut pending = wanted.next();
    for (i, c) in haystack.char_indices() {
        if pending.is_none() {
            return Some(i);
        }
        for folded in c.to_lowercase() {
            match pending {
                Some(p) if p == folded => pending = wanted.next(),
                _ => return None,
            }
        }
    }
    pending.is_none().then_some(haystack.len())
}
