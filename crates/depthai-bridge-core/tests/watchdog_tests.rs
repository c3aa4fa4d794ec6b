mod common;

use common::*;
use depthai_bridge_core::{
    Channel, DispatchLoop, LoopState, PacketBatch, Termination, Watchdog, watchdog::Verdict,
};
use rand::Rng;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

fn run_scripted(pipeline: ScriptedPipeline, clock: ManualClock) -> (DispatchLoop, Termination) {
    let config = config_with("1.1", &["left"], "10s");
    let mut dispatch = DispatchLoop::new(
        config,
        ScriptedConnector::new(pipeline),
        Arc::new(RecordingPublisher::new()),
        RecordingSideChannel::new(),
    )
    .with_clock(Arc::new(clock));

    let termination = dispatch.run();
    (dispatch, termination)
}

#[test]
fn test_silent_device_expires_after_timeout() {
    let clock = ManualClock::new();
    let pipeline = ScriptedPipeline::new(clock.clone(), Duration::from_secs(1));

    let (dispatch, termination) = run_scripted(pipeline, clock);

    assert_eq!(termination, Termination::Watchdog);
    assert_eq!(termination.exit_code(), 10);
    assert_eq!(dispatch.state(), LoopState::TerminatedWatchdog);

    // 10 s timeout polled once per second: the 11th poll is past the deadline.
    let stats = dispatch.diagnostics().stats.snapshot();
    assert_eq!(stats.polls, 11);
    assert_eq!(stats.empty_polls, 11);
}

#[test]
fn test_batch_pushes_deadline_forward() {
    let clock = ManualClock::new();
    let pipeline = ScriptedPipeline::new(clock.clone(), Duration::from_secs(1))
        .then_batch(PacketBatch::new(vec![], vec![mono_packet("left", "left", 7)]))
        .then_empty(11)
        .then_batch(PacketBatch::new(vec![], vec![mono_packet("left", "left", 9)]));
    let script = pipeline.script();

    let (dispatch, termination) = run_scripted(pipeline, clock);

    assert_eq!(termination, Termination::Watchdog);

    // Fed at t=1 s, so the deadline is t=11 s and the poll at t=12 s expires.
    let diagnostics = dispatch.diagnostics();
    let stats = diagnostics.stats.snapshot();
    assert_eq!(stats.polls, 12);
    assert_eq!(stats.empty_polls, 11);
    assert_eq!(diagnostics.counters.count("left", None), 1);

    // Nothing is processed after expiry.
    assert_eq!(script.lock().unwrap().len(), 1);
}

#[test]
fn test_nn_packets_alone_feed_the_watchdog() {
    let clock = ManualClock::new();
    let pipeline = ScriptedPipeline::new(clock.clone(), Duration::from_secs(1))
        .then_empty(5)
        .then_batch(PacketBatch::new(vec![nn_packet("rgb")], vec![]));

    let (dispatch, termination) = run_scripted(pipeline, clock);

    assert_eq!(termination, Termination::Watchdog);
    // Fed at t=6 s, expired at t=17 s.
    assert_eq!(dispatch.diagnostics().stats.snapshot().polls, 17);
}

#[test]
fn test_unconfigured_streams_feed_the_watchdog() {
    let clock = ManualClock::new();
    let publisher = RecordingPublisher::new();
    let pipeline = ScriptedPipeline::new(clock.clone(), Duration::from_secs(1))
        .then_empty(5)
        .then_batch(PacketBatch::new(vec![], vec![mono_packet("right", "right", 3)]));

    let mut dispatch = DispatchLoop::new(
        config_with("1.1", &["left"], "10s"),
        ScriptedConnector::new(pipeline),
        Arc::new(publisher.clone()),
        RecordingSideChannel::new(),
    )
    .with_clock(Arc::new(clock));

    assert_eq!(dispatch.run(), Termination::Watchdog);

    // The ignored packet still proves the device alive: fed at t=6 s,
    // expired at t=17 s.
    let diagnostics = dispatch.diagnostics();
    let stats = diagnostics.stats.snapshot();
    assert_eq!(stats.polls, 17);
    assert_eq!(stats.ignored, 1);
    assert_eq!(stats.routed, 0);
    assert!(publisher.messages().is_empty());
    assert!(diagnostics.counters.snapshot().is_empty());
}

#[test]
fn test_failing_polls_end_in_watchdog_expiry() {
    let clock = ManualClock::new();
    let pipeline = ScriptedPipeline::new(clock.clone(), Duration::from_secs(2)).then_error(100);

    let (dispatch, termination) = run_scripted(pipeline, clock);

    assert_eq!(termination, Termination::Watchdog);
    let stats = dispatch.diagnostics().stats.snapshot();
    assert_eq!(stats.polls, 6);
    assert_eq!(stats.poll_errors, 6);
    assert_eq!(stats.empty_polls, 6);
}

#[test]
fn test_expiry_publishes_nothing_further() {
    let clock = ManualClock::new();
    let publisher = RecordingPublisher::new();
    let pipeline = ScriptedPipeline::new(clock.clone(), Duration::from_secs(4))
        .then_empty(3)
        .then_batch(PacketBatch::new(vec![], vec![mono_packet("left", "left", 1)]));

    let config = config_with("1.1", &["left"], "10s");
    let mut dispatch = DispatchLoop::new(
        config,
        ScriptedConnector::new(pipeline),
        Arc::new(publisher.clone()),
        RecordingSideChannel::new(),
    )
    .with_clock(Arc::new(clock));

    assert_eq!(dispatch.run(), Termination::Watchdog);
    // The device only resumes after the deadline has passed.
    assert!(publisher.on(Channel::Left).is_empty());
}

#[test]
fn test_random_poll_sequences_match_reference() {
    let mut rng = rand::rng();
    let timeout = Duration::from_millis(500);

    for _ in 0..200 {
        let start = Instant::now();
        let mut now = start;
        let mut watchdog = Watchdog::new(timeout, now);
        let mut last_fed = start;

        for _ in 0..50 {
            now += Duration::from_millis(rng.random_range(0..200));
            let batch_len = if rng.random_bool(0.3) {
                rng.random_range(1..4)
            } else {
                0
            };

            let verdict = watchdog.observe(batch_len, now);
            if batch_len > 0 {
                assert_eq!(verdict, Verdict::Fed);
                last_fed = now;
            } else if now - last_fed > timeout {
                assert_eq!(verdict, Verdict::Expired);
                break;
            } else {
                assert_eq!(verdict, Verdict::Waiting);
            }
            assert_eq!(watchdog.deadline(), last_fed + timeout);
        }
    }
}
