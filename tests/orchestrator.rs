//! Orchestrator integration tests
//!
//! Exercises the state machine's concurrency discipline with scripted mock
//! collaborators: single-flight dispatch, token staleness, history
//! bounding, cancellation, timeout recovery, and degradation.

use std::sync::Arc;
use std::time::Duration;

use aura_assistant::{ConversationState, Orchestrator, Stage, Trigger};

mod common;
use common::{
    EchoResponder, FailingResponder, InstantListener, MockSpeaker, ScriptedResponder,
    ScriptedTranscriber, quick_timeouts, settle,
};

/// Tick until the orchestrator reaches `want`, settling between attempts
async fn tick_until(orchestrator: &mut Orchestrator, want: ConversationState) {
    for _ in 0..40 {
        if orchestrator.tick() == want {
            return;
        }
        settle().await;
    }
    panic!("orchestrator never reached {want:?}");
}

#[tokio::test]
async fn full_turn_walks_through_every_state() {
    let (transcriber, transcripts) = ScriptedTranscriber::with_script();
    let (responder, replies) = ScriptedResponder::with_script();
    let (speaker, playback_done) = MockSpeaker::gated();

    let mut orchestrator = Orchestrator::new(
        Arc::new(InstantListener),
        transcriber,
        responder,
        speaker.clone(),
        quick_timeouts(),
    );

    assert_eq!(orchestrator.state(), ConversationState::Idle);
    assert!(orchestrator.pending_stage().is_none());

    orchestrator.on_trigger(Trigger::Start);
    assert_eq!(orchestrator.state(), ConversationState::Listening);
    assert_eq!(orchestrator.pending_stage(), Some(Stage::Transcribe));

    transcripts.send(Ok("hello".to_string())).unwrap();
    tick_until(&mut orchestrator, ConversationState::Thinking).await;
    assert_eq!(orchestrator.pending_stage(), Some(Stage::Respond));

    replies.send(Ok("hi there".to_string())).unwrap();
    tick_until(&mut orchestrator, ConversationState::Speaking).await;
    assert_eq!(orchestrator.pending_stage(), Some(Stage::Speak));

    // The turn is recorded as soon as the reply is composed
    let history = orchestrator.history().snapshot();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].user_text, "hello");
    assert_eq!(history[0].assistant_text, "hi there");

    playback_done.send(()).unwrap();
    tick_until(&mut orchestrator, ConversationState::Idle).await;
    assert!(orchestrator.pending_stage().is_none());
    assert_eq!(speaker.spoken().await, vec!["hi there"]);
}

#[tokio::test]
async fn start_while_busy_is_a_no_op() {
    let (transcriber, transcripts) = ScriptedTranscriber::with_script();
    let (responder, _replies) = ScriptedResponder::with_script();

    let mut orchestrator = Orchestrator::new(
        Arc::new(InstantListener),
        transcriber.clone(),
        responder,
        MockSpeaker::instant(),
        quick_timeouts(),
    );

    orchestrator.on_trigger(Trigger::Start);
    settle().await;

    // Repeated starts must not dispatch a second worker
    orchestrator.on_trigger(Trigger::Start);
    orchestrator.on_trigger(Trigger::Start);
    settle().await;

    assert_eq!(orchestrator.state(), ConversationState::Listening);
    assert_eq!(transcriber.calls(), 1);

    transcripts.send(Ok("hello".to_string())).unwrap();
    tick_until(&mut orchestrator, ConversationState::Thinking).await;

    orchestrator.on_trigger(Trigger::Start);
    assert_eq!(orchestrator.state(), ConversationState::Thinking);
    assert_eq!(transcriber.calls(), 1);
}

#[tokio::test]
async fn late_result_after_cancel_is_dropped() {
    let (transcriber, transcripts) = ScriptedTranscriber::with_script();
    let (responder, _replies) = ScriptedResponder::with_script();

    let mut orchestrator = Orchestrator::new(
        Arc::new(InstantListener),
        transcriber,
        responder,
        MockSpeaker::instant(),
        quick_timeouts(),
    );

    orchestrator.on_trigger(Trigger::Start);
    settle().await;

    orchestrator.on_trigger(Trigger::Cancel);
    assert_eq!(orchestrator.tick(), ConversationState::Idle);
    assert!(orchestrator.pending_stage().is_none());

    // The worker finishes after the cancel; its result is stale
    transcripts.send(Ok("too late".to_string())).unwrap();
    settle().await;

    assert_eq!(orchestrator.tick(), ConversationState::Idle);
    assert!(orchestrator.history().is_empty());
}

#[tokio::test]
async fn cancel_from_speaking_stops_speaker_exactly_once() {
    let (transcriber, transcripts) = ScriptedTranscriber::with_script();
    let (responder, replies) = ScriptedResponder::with_script();
    let (speaker, _playback_done) = MockSpeaker::gated();

    let mut orchestrator = Orchestrator::new(
        Arc::new(InstantListener),
        transcriber,
        responder,
        speaker.clone(),
        quick_timeouts(),
    );

    orchestrator.on_trigger(Trigger::Start);
    transcripts.send(Ok("hello".to_string())).unwrap();
    tick_until(&mut orchestrator, ConversationState::Thinking).await;
    replies.send(Ok("a very long reply".to_string())).unwrap();
    tick_until(&mut orchestrator, ConversationState::Speaking).await;

    orchestrator.on_trigger(Trigger::Cancel);
    assert_eq!(orchestrator.tick(), ConversationState::Idle);
    assert_eq!(speaker.stops(), 1);

    // A second cancel in idle must not reach the speaker
    orchestrator.on_trigger(Trigger::Cancel);
    orchestrator.tick();
    assert_eq!(speaker.stops(), 1);
}

#[tokio::test]
async fn capture_timeout_recovers_exactly_once() {
    let (transcriber, _transcripts) = ScriptedTranscriber::with_script();
    let (responder, _replies) = ScriptedResponder::with_script();

    let mut orchestrator = Orchestrator::new(
        Arc::new(InstantListener),
        transcriber,
        responder,
        MockSpeaker::instant(),
        quick_timeouts(),
    );

    orchestrator.on_trigger(Trigger::Start);
    assert_eq!(orchestrator.state(), ConversationState::Listening);

    // No transcript ever arrives; the 1s deadline must fire
    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(orchestrator.tick(), ConversationState::Idle);
    assert!(orchestrator.pending_stage().is_none());
    assert!(orchestrator.history().is_empty());

    // Expiry must not repeat on later ticks
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(orchestrator.tick(), ConversationState::Idle);

    // And the machine still accepts a fresh turn
    orchestrator.on_trigger(Trigger::Start);
    assert_eq!(orchestrator.state(), ConversationState::Listening);
}

#[tokio::test]
async fn responder_timeout_speaks_the_fallback() {
    let (transcriber, transcripts) = ScriptedTranscriber::with_script();
    let (responder, _replies) = ScriptedResponder::with_script();
    let speaker = MockSpeaker::instant();

    let mut orchestrator = Orchestrator::new(
        Arc::new(InstantListener),
        transcriber,
        responder,
        speaker.clone(),
        quick_timeouts(),
    );

    orchestrator.on_trigger(Trigger::Start);
    transcripts.send(Ok("hello".to_string())).unwrap();
    tick_until(&mut orchestrator, ConversationState::Thinking).await;

    // No reply ever arrives; the deadline routes a fallback through Speaking
    tokio::time::sleep(Duration::from_millis(1200)).await;
    tick_until(&mut orchestrator, ConversationState::Idle).await;

    let history = orchestrator.history().snapshot();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].user_text, "hello");
    assert!(!history[0].assistant_text.is_empty());
    assert_eq!(speaker.spoken().await, vec![history[0].assistant_text.clone()]);
}

#[tokio::test]
async fn failing_responder_yields_a_stable_canned_turn() {
    let (transcriber, transcripts) = ScriptedTranscriber::with_script();

    let mut orchestrator = Orchestrator::new(
        Arc::new(InstantListener),
        transcriber,
        Arc::new(FailingResponder),
        MockSpeaker::instant(),
        quick_timeouts(),
    );

    for text in ["first question", "second question"] {
        orchestrator.on_trigger(Trigger::Start);
        transcripts.send(Ok(text.to_string())).unwrap();
        tick_until(&mut orchestrator, ConversationState::Idle).await;
    }

    let history = orchestrator.history().snapshot();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].user_text, "first question");
    assert_eq!(history[1].user_text, "second question");
    // Degradation is stable: the same canned reply every time
    assert!(!history[0].assistant_text.is_empty());
    assert_eq!(history[0].assistant_text, history[1].assistant_text);
}

#[tokio::test]
async fn history_keeps_only_the_most_recent_turns() {
    let (transcriber, transcripts) = ScriptedTranscriber::with_script();

    let mut orchestrator = Orchestrator::new(
        Arc::new(InstantListener),
        transcriber,
        Arc::new(EchoResponder),
        MockSpeaker::instant(),
        quick_timeouts(),
    );

    for i in 0..25 {
        transcripts.send(Ok(format!("utterance {i}"))).unwrap();
        orchestrator.on_trigger(Trigger::Start);
        tick_until(&mut orchestrator, ConversationState::Idle).await;
    }

    let history = orchestrator.history().snapshot();
    assert_eq!(history.len(), 20);
    assert_eq!(history[0].user_text, "utterance 5");
    assert_eq!(history[19].user_text, "utterance 24");
    assert_eq!(history[19].assistant_text, "echo: utterance 24");
}

#[tokio::test]
async fn empty_transcription_returns_to_idle() {
    let (transcriber, transcripts) = ScriptedTranscriber::with_script();
    let (responder, _replies) = ScriptedResponder::with_script();

    let mut orchestrator = Orchestrator::new(
        Arc::new(InstantListener),
        transcriber,
        responder,
        MockSpeaker::instant(),
        quick_timeouts(),
    );

    orchestrator.on_trigger(Trigger::Start);
    transcripts.send(Ok("   ".to_string())).unwrap();
    tick_until(&mut orchestrator, ConversationState::Idle).await;

    assert!(orchestrator.history().is_empty());
    assert!(orchestrator.pending_stage().is_none());
}

#[tokio::test]
async fn quit_stops_admitting_triggers() {
    let (transcriber, _transcripts) = ScriptedTranscriber::with_script();
    let (responder, _replies) = ScriptedResponder::with_script();

    let mut orchestrator = Orchestrator::new(
        Arc::new(InstantListener),
        transcriber,
        responder,
        MockSpeaker::instant(),
        quick_timeouts(),
    );

    orchestrator.on_trigger(Trigger::Quit);
    assert!(orchestrator.is_quitting());

    orchestrator.on_trigger(Trigger::Start);
    assert_eq!(orchestrator.state(), ConversationState::Idle);
    assert!(orchestrator.pending_stage().is_none());

    // Nothing outstanding: shutdown returns without waiting out the grace
    let started = std::time::Instant::now();
    orchestrator.shutdown().await;
    assert!(started.elapsed() < Duration::from_millis(500));
}

#[tokio::test]
async fn quit_while_speaking_stops_playback() {
    let (transcriber, transcripts) = ScriptedTranscriber::with_script();
    let (responder, replies) = ScriptedResponder::with_script();
    let (speaker, _playback_done) = MockSpeaker::gated();

    let mut orchestrator = Orchestrator::new(
        Arc::new(InstantListener),
        transcriber,
        responder,
        speaker.clone(),
        quick_timeouts(),
    );

    orchestrator.on_trigger(Trigger::Start);
    transcripts.send(Ok("hello".to_string())).unwrap();
    tick_until(&mut orchestrator, ConversationState::Thinking).await;
    replies.send(Ok("hi".to_string())).unwrap();
    tick_until(&mut orchestrator, ConversationState::Speaking).await;

    orchestrator.on_trigger(Trigger::Quit);
    assert!(orchestrator.is_quitting());
    assert_eq!(speaker.stops(), 1);
}
