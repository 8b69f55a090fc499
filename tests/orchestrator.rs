//! Dialogue loop integration tests
//!
//! Drives the orchestrator with synthetic audio frames and mock pipeline
//! components; no audio hardware or network access required.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use common::{FrameFeeder, MockAgent, MockPlayback, MockRecognizer, MockSynthesizer, wait_for};
use murmur::config::OrchestratorConfig;
use murmur::voice::EnergyWakeGate;
use murmur::voice::stt::RecognitionResult;
use murmur::{AgentRegistry, Orchestrator};

const WAKE: &str = "hey murmur";
const WAIT: Duration = Duration::from_secs(2);

fn test_policy() -> OrchestratorConfig {
    OrchestratorConfig {
        silence_timeout_ms: 800,
        confidence_threshold: 0.6,
        recognition_timeout_ms: 2_000,
        agent_timeout_ms: 2_000,
        synthesis_timeout_ms: 2_000,
        min_speech_ms: 300,
    }
}

fn ok(text: &str, confidence: f32) -> murmur::Result<RecognitionResult> {
    Ok(RecognitionResult::final_result(text, confidence))
}

struct Harness {
    recognizer: Arc<MockRecognizer>,
    synthesizer: Arc<MockSynthesizer>,
    playback: Arc<MockPlayback>,
    feeder: FrameFeeder,
    shutdown: CancellationToken,
}

impl Harness {
    fn start(
        policy: OrchestratorConfig,
        results: Vec<murmur::Result<RecognitionResult>>,
        agents: Vec<MockAgent>,
        play_ms: u64,
    ) -> Self {
        Self::start_with(
            policy,
            results,
            agents,
            MockPlayback::new(Duration::from_millis(play_ms)),
        )
    }

    fn start_with(
        policy: OrchestratorConfig,
        results: Vec<murmur::Result<RecognitionResult>>,
        agents: Vec<MockAgent>,
        playback: Arc<MockPlayback>,
    ) -> Self {
        let recognizer = MockRecognizer::new(results);
        let synthesizer = MockSynthesizer::new();

        let mut registry = AgentRegistry::new();
        for agent in agents {
            registry.register(Box::new(agent));
        }

        let (frames_tx, frames_rx) = mpsc::channel(1024);
        let shutdown = CancellationToken::new();

        let orchestrator = Orchestrator::new(
            WAKE.to_string(),
            policy,
            Box::new(EnergyWakeGate::new(vec![WAKE.to_string()])),
            recognizer.clone(),
            synthesizer.clone(),
            playback.clone(),
            Arc::new(registry),
            frames_rx,
            shutdown.clone(),
        );
        tokio::spawn(orchestrator.run());

        Self {
            recognizer,
            synthesizer,
            playback,
            feeder: FrameFeeder::new(frames_tx),
            shutdown,
        }
    }

    /// Speech then enough silence for the gate to produce a wake candidate
    async fn wake(&mut self) {
        self.feeder.speak(400).await;
        self.feeder.silence(600).await;
    }

    /// A spoken command: speech then the silence timeout
    async fn utter(&mut self) {
        self.feeder.speak(400).await;
        self.feeder.silence(900).await;
    }

    async fn wait_played(&self, text: &str) -> bool {
        let playback = Arc::clone(&self.playback);
        let text = text.to_string();
        wait_for(
            move || playback.completed_texts().iter().any(|t| *t == text),
            WAIT,
        )
        .await
    }

    async fn wait_synthesized(&self, text: &str, count: usize) -> bool {
        let synthesizer = Arc::clone(&self.synthesizer);
        let text = text.to_string();
        wait_for(
            move || {
                synthesizer
                    .synthesized()
                    .iter()
                    .filter(|t| **t == text)
                    .count()
                    >= count
            },
            WAIT,
        )
        .await
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[tokio::test]
async fn test_wake_then_command_roundtrip() {
    let agent = MockAgent::new("clock", 0.8, "It is noon.");
    let executions = agent.executions_handle();

    let mut h = Harness::start(
        test_policy(),
        vec![ok(WAKE, 1.0), ok("what time is it", 0.9)],
        vec![agent],
        20,
    );

    h.wake().await;
    assert!(h.wait_synthesized("Yes?", 1).await, "wake ack not spoken");

    h.utter().await;
    assert!(h.wait_played("It is noon.").await, "reply not played");

    let executions = executions.lock().unwrap();
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].text, "what time is it");
    assert!(!executions[0].cancelled);
}

#[tokio::test]
async fn test_command_in_wake_utterance_skips_ack() {
    let agent = MockAgent::new("clock", 0.8, "It is noon.");
    let executions = agent.executions_handle();

    let mut h = Harness::start(
        test_policy(),
        vec![ok("hey murmur what time is it", 1.0)],
        vec![agent],
        20,
    );

    h.wake().await;
    assert!(h.wait_played("It is noon.").await);

    assert!(
        !h.synthesizer.synthesized().iter().any(|t| t == "Yes?"),
        "ack should be skipped when the wake utterance carries a command"
    );
    assert_eq!(executions.lock().unwrap()[0].text, "what time is it");
}

#[tokio::test]
async fn test_low_confidence_rejected() {
    let agent = MockAgent::new("clock", 0.8, "It is noon.");
    let executions = agent.executions_handle();

    let mut h = Harness::start(
        test_policy(),
        vec![ok(WAKE, 1.0), ok("mumble mumble", 0.59)],
        vec![agent],
        20,
    );

    h.wake().await;
    assert!(h.wait_synthesized("Yes?", 1).await);
    h.utter().await;

    assert!(h.wait_synthesized("Sorry, I didn't catch that", 1).await);
    assert!(executions.lock().unwrap().is_empty(), "no turn should dispatch");
}

#[tokio::test]
async fn test_confidence_exactly_at_threshold_accepted() {
    let agent = MockAgent::new("clock", 0.8, "It is noon.");
    let executions = agent.executions_handle();

    let mut h = Harness::start(
        test_policy(),
        vec![ok(WAKE, 1.0), ok("what time is it", 0.6)],
        vec![agent],
        20,
    );

    h.wake().await;
    assert!(h.wait_synthesized("Yes?", 1).await);
    h.utter().await;

    assert!(h.wait_played("It is noon.").await);
    assert_eq!(executions.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_empty_transcript_apologizes() {
    let agent = MockAgent::new("clock", 0.8, "It is noon.");
    let executions = agent.executions_handle();

    let mut h = Harness::start(
        test_policy(),
        vec![ok(WAKE, 1.0), ok("", 1.0)],
        vec![agent],
        20,
    );

    h.wake().await;
    assert!(h.wait_synthesized("Yes?", 1).await);
    h.utter().await;

    assert!(h.wait_synthesized("Sorry, I didn't catch that", 1).await);
    assert!(executions.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_silent_utterance_discarded_without_apology() {
    let agent = MockAgent::new("clock", 0.8, "It is noon.");

    let mut h = Harness::start(
        test_policy(),
        vec![ok(WAKE, 1.0), ok(WAKE, 1.0)],
        vec![agent],
        20,
    );

    h.wake().await;
    assert!(h.wait_synthesized("Yes?", 1).await);

    // Say nothing; the utterance seals with no speech and is dropped
    h.feeder.silence(900).await;

    // Pipeline is idle again: a fresh wake works
    h.wake().await;
    assert!(h.wait_synthesized("Yes?", 2).await);

    assert!(
        !h.synthesizer
            .synthesized()
            .iter()
            .any(|t| t.starts_with("Sorry")),
        "silent utterance must not trigger an apology"
    );
}

#[tokio::test]
async fn test_agent_failure_apologizes_and_recovers() {
    let agent = MockAgent::new("flaky", 0.8, "unused").failing();

    let mut h = Harness::start(
        test_policy(),
        vec![ok(WAKE, 1.0), ok("do something", 0.9), ok(WAKE, 1.0)],
        vec![agent],
        20,
    );

    h.wake().await;
    assert!(h.wait_synthesized("Yes?", 1).await);
    h.utter().await;
    assert!(h.wait_synthesized("Sorry, something went wrong", 1).await);

    // Loop is back in idle and accepts the next wake
    h.wake().await;
    assert!(h.wait_synthesized("Yes?", 2).await);
}

#[tokio::test]
async fn test_barge_in_cancels_inflight_agent() {
    let agent = MockAgent::new("slow", 0.9, "slow reply").with_delay(Duration::from_millis(500));
    let executions = agent.executions_handle();

    let mut h = Harness::start(
        test_policy(),
        vec![
            ok(WAKE, 1.0),
            ok("first request", 0.9),
            ok(WAKE, 1.0),
            ok("second request", 0.9),
        ],
        vec![agent],
        20,
    );

    h.wake().await;
    assert!(h.wait_synthesized("Yes?", 1).await);
    h.utter().await;

    // Barge in while the first agent call is still running
    tokio::time::sleep(Duration::from_millis(50)).await;
    h.wake().await;
    assert!(h.wait_synthesized("Yes?", 2).await);
    h.utter().await;

    assert!(h.wait_played("slow reply").await, "second turn reply not played");

    let executions = executions.lock().unwrap();
    assert_eq!(executions.len(), 2);
    assert!(executions[0].cancelled, "superseded agent call must be cancelled");
    assert!(!executions[1].cancelled);

    // The superseded turn produced no apology and no reply of its own
    assert_eq!(h.playback.completed_texts().iter().filter(|t| t.as_str() == "slow reply").count(), 1);
    assert!(
        !h.synthesizer
            .synthesized()
            .iter()
            .any(|t| t == "Sorry, something went wrong"),
        "stale agent result must be dropped silently"
    );
}

#[tokio::test]
async fn test_barge_in_interrupts_playback_before_next_response() {
    let agent = MockAgent::new("talker", 0.9, "a very long answer");

    let mut h = Harness::start(
        test_policy(),
        vec![
            ok(WAKE, 1.0),
            ok("first request", 0.9),
            ok("hey murmur second request", 1.0),
        ],
        vec![agent],
        500,
    );

    h.wake().await;
    assert!(h.wait_synthesized("Yes?", 1).await);
    h.utter().await;
    assert!(h.wait_synthesized("a very long answer", 1).await);

    // Barge in mid-playback with a wake utterance that carries the command
    tokio::time::sleep(Duration::from_millis(50)).await;
    h.wake().await;

    let playback = Arc::clone(&h.playback);
    assert!(
        wait_for(
            move || playback.records().iter().filter(|r| r.text == "a very long answer").count() == 2,
            WAIT,
        )
        .await,
        "second response not played"
    );

    let records: Vec<_> = h
        .playback
        .records()
        .into_iter()
        .filter(|r| r.text == "a very long answer")
        .collect();
    assert!(!records[0].completed, "first playback must be interrupted");
    assert!(records[1].completed, "second playback must run to completion");
}

#[tokio::test]
async fn test_double_barge_in_during_slow_stop_still_responds() {
    let agent = MockAgent::new("talker", 0.9, "answer");

    let mut h = Harness::start_with(
        test_policy(),
        vec![
            ok(WAKE, 1.0),
            ok("first request", 0.9),
            ok("hey murmur second request", 1.0),
            ok("hey murmur third request", 1.0),
        ],
        vec![agent],
        MockPlayback::with_stop_delay(Duration::from_millis(500), Duration::from_millis(300)),
    );

    h.wake().await;
    assert!(h.wait_synthesized("Yes?", 1).await);
    h.utter().await;
    assert!(h.wait_synthesized("answer", 1).await, "first reply not spoken");

    // Two barge-ins in quick succession: the second lands while the first
    // interrupted playback is still winding down from its cancellation
    h.wake().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    h.wake().await;

    assert!(
        h.wait_played("answer").await,
        "reply after double barge-in never played"
    );
}

#[tokio::test]
async fn test_wake_ack_waits_for_interrupted_playback() {
    let agent = MockAgent::new("talker", 0.9, "long answer");

    let mut h = Harness::start_with(
        test_policy(),
        vec![ok(WAKE, 1.0), ok("first request", 0.9), ok(WAKE, 1.0)],
        vec![agent],
        MockPlayback::with_stop_delay(Duration::from_millis(2_000), Duration::from_millis(300)),
    );

    h.wake().await;
    assert!(h.wait_synthesized("Yes?", 1).await);
    h.utter().await;
    assert!(h.wait_synthesized("long answer", 1).await);

    // Barge in mid-playback with a bare wake phrase
    tokio::time::sleep(Duration::from_millis(50)).await;
    h.wake().await;

    // The ack holds until the cancelled playback acknowledges its stop
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        h.synthesizer
            .synthesized()
            .iter()
            .filter(|t| t.as_str() == "Yes?")
            .count(),
        1,
        "ack must wait for the interrupted playback to stop"
    );

    assert!(h.wait_synthesized("Yes?", 2).await, "ack never spoken after the stop");
}

#[tokio::test]
async fn test_agent_timeout_apologizes() {
    let mut policy = test_policy();
    policy.agent_timeout_ms = 100;

    let agent = MockAgent::new("stuck", 0.9, "never").with_delay(Duration::from_secs(5));

    let mut h = Harness::start(
        policy,
        vec![ok(WAKE, 1.0), ok("hang forever", 0.9)],
        vec![agent],
        20,
    );

    h.wake().await;
    assert!(h.wait_synthesized("Yes?", 1).await);
    h.utter().await;

    assert!(h.wait_synthesized("Sorry, something went wrong", 1).await);
    assert!(h.playback.completed_texts().iter().all(|t| t != "never"));
}

#[tokio::test]
async fn test_recognition_timeout_apologizes() {
    let mut policy = test_policy();
    policy.recognition_timeout_ms = 100;

    let agent = MockAgent::new("clock", 0.8, "It is noon.");
    let executions = agent.executions_handle();

    let mut h = Harness::start(policy, vec![ok(WAKE, 1.0)], vec![agent], 20);

    h.wake().await;
    assert!(h.wait_synthesized("Yes?", 1).await);

    // Recognition of the command exceeds its budget
    h.recognizer.set_delay(Duration::from_millis(500));
    h.recognizer.push(ok("too late", 0.9));
    h.utter().await;

    assert!(h.wait_synthesized("Sorry, I didn't catch that", 1).await);
    assert!(executions.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_speech_without_wake_phrase_is_ignored() {
    let agent = MockAgent::new("clock", 0.8, "It is noon.");
    let executions = agent.executions_handle();

    let mut h = Harness::start(
        test_policy(),
        vec![ok("just some chatter", 1.0)],
        vec![agent],
        20,
    );

    h.wake().await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(h.synthesizer.synthesized().is_empty(), "gate must stay closed");
    assert!(executions.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_no_capable_agent_apologizes() {
    let agent = MockAgent::new("mute", 0.0, "unused");
    let executions = agent.executions_handle();

    let mut h = Harness::start(
        test_policy(),
        vec![ok(WAKE, 1.0), ok("do a thing", 0.9)],
        vec![agent],
        20,
    );

    h.wake().await;
    assert!(h.wait_synthesized("Yes?", 1).await);
    h.utter().await;

    assert!(h.wait_synthesized("Sorry, I can't help with that yet", 1).await);
    assert!(executions.lock().unwrap().is_empty());
}
