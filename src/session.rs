//! Session state: utterances, turns, and the single-active-turn invariant
//!
//! All types here are mutated only by the orchestrator task. The invariant
//! the whole module exists to enforce: at most one [`Turn`] is active
//! (dispatched but not closed) at any instant.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::voice::AudioFrame;

/// Identifier for one request/response exchange
///
/// Monotonically increasing per session; stale async results are recognized
/// by comparing against the active turn's id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TurnId(pub u64);

impl std::fmt::Display for TurnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "turn-{}", self.0)
    }
}

/// Outcome of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Dispatched, no result yet
    Pending,
    /// Response fully played
    Succeeded,
    /// Agent or downstream stage failed
    Failed,
    /// Superseded by barge-in
    Cancelled,
}

/// One request/response exchange
#[derive(Debug, Clone)]
pub struct Turn {
    /// Turn identifier
    pub id: TurnId,
    /// Final recognized text that created this turn
    pub text: String,
    /// Confidence of the final recognition result
    pub confidence: f32,
    /// Name of the agent the turn was routed to
    pub agent: String,
    /// When the agent was dispatched
    pub dispatched_at: Instant,
    /// Current outcome
    pub outcome: TurnOutcome,
}

impl Turn {
    /// Whether the turn is still open (pending dispatch/response)
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.outcome == TurnOutcome::Pending
    }
}

/// Result produced by an agent, tagged with the turn it answers
#[derive(Debug, Clone)]
pub struct AgentResult {
    /// Turn this result answers
    pub turn_id: TurnId,
    /// Reply text, or an error description
    pub reply: std::result::Result<String, String>,
    /// When the result was produced
    pub produced_at: Instant,
}

/// A wake-bounded span of captured speech
///
/// Created on wake detection, appended to while speech continues, sealed on
/// silence timeout. Frames are strictly ordered by capture timestamp;
/// out-of-order frames are dropped.
#[derive(Debug)]
pub struct Utterance {
    frames: Vec<AudioFrame>,
    /// Timestamp of the last frame that contained speech energy
    last_voice_at: Option<Duration>,
    speech: Duration,
    sealed: bool,
}

impl Utterance {
    /// Start a new utterance at wake detection
    #[must_use]
    pub const fn new() -> Self {
        Self {
            frames: Vec::new(),
            last_voice_at: None,
            speech: Duration::ZERO,
            sealed: false,
        }
    }

    /// Append a frame, enforcing timestamp ordering
    ///
    /// Returns false (and drops the frame) if it is out of order or the
    /// utterance is already sealed.
    pub fn push(&mut self, frame: AudioFrame, is_speech: bool) -> bool {
        if self.sealed {
            return false;
        }
        if let Some(last) = self.frames.last()
            && frame.timestamp <= last.timestamp
        {
            tracing::warn!(
                frame_ts = ?frame.timestamp,
                last_ts = ?last.timestamp,
                "dropping out-of-order audio frame"
            );
            return false;
        }
        if is_speech {
            self.last_voice_at = Some(frame.timestamp);
            self.speech += frame.duration();
        }
        self.frames.push(frame);
        true
    }

    /// Silence accumulated since the last speech frame, relative to `now`
    #[must_use]
    pub fn silence_since(&self, now: Duration) -> Duration {
        let reference = self
            .last_voice_at
            .or_else(|| self.frames.first().map(|f| f.timestamp))
            .unwrap_or(now);
        now.saturating_sub(reference)
    }

    /// Total speech duration accumulated so far
    #[must_use]
    pub const fn speech_duration(&self) -> Duration {
        self.speech
    }

    /// Seal the utterance; no further frames are accepted
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    /// Whether the utterance has been sealed
    #[must_use]
    pub const fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Frames in capture order
    #[must_use]
    pub fn frames(&self) -> &[AudioFrame] {
        &self.frames
    }

    /// Concatenated samples of all frames
    #[must_use]
    pub fn samples(&self) -> Vec<f32> {
        let total: usize = self.frames.iter().map(|f| f.samples.len()).sum();
        let mut out = Vec::with_capacity(total);
        for frame in &self.frames {
            out.extend_from_slice(&frame.samples);
        }
        out
    }

    /// Whether any frames have been captured
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl Default for Utterance {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide dialogue state
///
/// Holds the single active turn, the monotonic turn counter, and the
/// cancellation token for the active turn's in-flight work.
#[derive(Debug)]
pub struct Session {
    active: Option<Turn>,
    counter: u64,
    cancel: Option<CancellationToken>,
}

impl Session {
    /// Create an empty session
    #[must_use]
    pub const fn new() -> Self {
        Self {
            active: None,
            counter: 0,
            cancel: None,
        }
    }

    /// The currently active turn, if any
    #[must_use]
    pub const fn active(&self) -> Option<&Turn> {
        self.active.as_ref()
    }

    /// Whether `id` is the active turn
    #[must_use]
    pub fn is_active(&self, id: TurnId) -> bool {
        self.active.as_ref().is_some_and(|t| t.id == id)
    }

    /// Number of turns begun so far
    #[must_use]
    pub const fn turn_count(&self) -> u64 {
        self.counter
    }

    /// Begin a new turn, superseding and cancelling any active one
    ///
    /// Returns the new turn's id and its cancellation token. If a turn was
    /// active its token is fired and it is closed as cancelled, so the
    /// single-active-turn invariant holds across the swap.
    pub fn begin_turn(&mut self, text: String, confidence: f32, agent: String) -> (TurnId, CancellationToken) {
        self.cancel_active();

        self.counter += 1;
        let id = TurnId(self.counter);
        let token = CancellationToken::new();

        self.active = Some(Turn {
            id,
            text,
            confidence,
            agent,
            dispatched_at: Instant::now(),
            outcome: TurnOutcome::Pending,
        });
        self.cancel = Some(token.clone());

        (id, token)
    }

    /// Cancel and close the active turn, if any
    ///
    /// Fires the turn's cancellation token so in-flight agent work and
    /// playback stop promptly. Returns the cancelled turn's id.
    pub fn cancel_active(&mut self) -> Option<TurnId> {
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
        self.active.take().map(|mut turn| {
            turn.outcome = TurnOutcome::Cancelled;
            tracing::debug!(turn = %turn.id, "turn cancelled");
            turn.id
        })
    }

    /// Close the active turn with a final outcome
    ///
    /// No-op if `id` is not the active turn (the closure raced a barge-in).
    pub fn close_turn(&mut self, id: TurnId, outcome: TurnOutcome) {
        if self.is_active(id) {
            if let Some(mut turn) = self.active.take() {
                turn.outcome = outcome;
                tracing::debug!(turn = %turn.id, ?outcome, "turn closed");
            }
            self.cancel = None;
        }
    }

    /// Cancellation token of the active turn
    #[must_use]
    pub fn active_token(&self) -> Option<CancellationToken> {
        self.cancel.clone()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(ts_ms: u64) -> AudioFrame {
        AudioFrame {
            samples: vec![0.0; 160],
            timestamp: Duration::from_millis(ts_ms),
        }
    }

    #[test]
    fn test_single_active_turn() {
        let mut session = Session::new();
        let (first, first_token) = session.begin_turn("one".into(), 0.9, "general".into());
        assert!(session.is_active(first));

        let (second, _) = session.begin_turn("two".into(), 0.9, "general".into());
        // The first turn is gone and its token fired
        assert!(!session.is_active(first));
        assert!(session.is_active(second));
        assert!(first_token.is_cancelled());
        assert_eq!(session.turn_count(), 2);
    }

    #[test]
    fn test_close_ignores_stale_id() {
        let mut session = Session::new();
        let (first, _) = session.begin_turn("one".into(), 0.9, "general".into());
        let (second, _) = session.begin_turn("two".into(), 0.9, "general".into());

        session.close_turn(first, TurnOutcome::Succeeded);
        assert!(session.is_active(second), "stale close must not touch the active turn");

        session.close_turn(second, TurnOutcome::Succeeded);
        assert!(session.active().is_none());
    }

    #[test]
    fn test_utterance_ordering() {
        let mut utterance = Utterance::new();
        assert!(utterance.push(frame(0), true));
        assert!(utterance.push(frame(10), true));
        // Out of order: dropped
        assert!(!utterance.push(frame(5), true));
        assert_eq!(utterance.frames().len(), 2);
    }

    #[test]
    fn test_utterance_seal_rejects_frames() {
        let mut utterance = Utterance::new();
        assert!(utterance.push(frame(0), true));
        utterance.seal();
        assert!(!utterance.push(frame(10), true));
        assert!(utterance.is_sealed());
    }

    #[test]
    fn test_utterance_silence_tracking() {
        let mut utterance = Utterance::new();
        utterance.push(frame(0), true);
        utterance.push(frame(10), true);
        utterance.push(frame(20), false);
        utterance.push(frame(30), false);
        assert_eq!(
            utterance.silence_since(Duration::from_millis(900)),
            Duration::from_millis(890)
        );
    }
}
