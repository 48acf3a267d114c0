//! End-to-end session scenarios against the scripted engine and the
//! loopback channel.

use std::thread;
use std::time::Duration;

use oratio_core::channel::loopback::LoopbackChannel;
use oratio_core::channel::AudioFormat;
use oratio_core::events::SessionStatus;
use oratio_core::session::DIGIT_VARIABLE;
use oratio_core::synth::scripted::{patterned_chunk, ScriptedEngine};
use oratio_core::{
    DigitPolicy, Disposition, OratioError, SessionConfig, SessionController,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Small frames and a short prime delay keep wall-clock time down while
/// still exercising real pacing.
fn quick_config() -> SessionConfig {
    SessionConfig {
        buffer_capacity: 4096,
        frame_bytes: 160,
        prime_delay_ms: 5,
        ..SessionConfig::default()
    }
}

#[test]
fn bursty_synthesis_relays_byte_exact_audio() {
    init_tracing();

    // Chunks bigger and smaller than a frame, against a ring that cannot
    // hold the whole utterance at once: backpressure has to engage.
    let chunks = vec![
        patterned_chunk(700, 0),
        patterned_chunk(90, 50),
        patterned_chunk(610, 100),
        patterned_chunk(320, 150),
    ];
    let expected: Vec<u8> = chunks.iter().flatten().copied().collect();

    let config = SessionConfig {
        buffer_capacity: 512,
        ..quick_config()
    };
    let controller = SessionController::new(config.clone());
    let mut engine = ScriptedEngine::new(chunks);
    let (mut channel, _driver) = LoopbackChannel::pair();

    let outcome = controller
        .speak(&mut engine, &mut channel, "a longer announcement")
        .unwrap();

    assert_eq!(outcome.disposition, Disposition::Completed);
    assert_eq!(channel.written_audio(), expected);
    assert!(channel
        .frames()
        .iter()
        .all(|f| f.payload.len() <= config.frame_bytes && !f.is_empty()));
    assert_eq!(outcome.stats.bytes_in, expected.len());
    assert_eq!(outcome.stats.bytes_out, expected.len());
    assert_eq!(engine.stop_count(), 0);
}

#[test]
fn hangup_mid_stream_cancels_and_stops_the_engine() {
    init_tracing();

    // A slow, chatty engine so plenty of stream remains when the far end
    // goes away.
    let mut engine = ScriptedEngine::new(vec![patterned_chunk(160, 0); 100])
        .with_chunk_gap(Duration::from_millis(4));
    let controller = SessionController::new(quick_config());
    let (mut channel, driver) = LoopbackChannel::pair();

    let hangup = thread::spawn(move || {
        thread::sleep(Duration::from_millis(60));
        driver.hang_up();
    });

    let outcome = controller
        .speak(&mut engine, &mut channel, "you will not hear all of this")
        .unwrap();
    hangup.join().unwrap();

    assert_eq!(outcome.disposition, Disposition::HungUp);
    assert!(outcome.disposition.should_end_call());
    assert!(outcome.digits.is_empty());
    assert_eq!(outcome.stats.engine_stops, 1);
    // Hangup path leaves the write format alone.
    assert_eq!(channel.write_format(), AudioFormat::Ulaw);
    assert_eq!(controller.status(), SessionStatus::HungUp);
}

#[test]
fn barge_in_collects_three_digits() {
    init_tracing();

    let mut config = quick_config();
    config.digit_policy = DigitPolicy::Collect {
        max_digits: 3,
        timeout_ms: 500,
    };
    let controller = SessionController::new(config);
    let mut digit_rx = controller.subscribe_digits();

    let mut engine = ScriptedEngine::new(vec![patterned_chunk(160, 0); 100])
        .with_chunk_gap(Duration::from_millis(4));
    let (mut channel, driver) = LoopbackChannel::pair();

    // '5' interrupts playback, '2' and '9' arrive before the inter-digit
    // timeout.
    driver.press_key(53);
    let feeder = thread::spawn(move || {
        thread::sleep(Duration::from_millis(30));
        driver.press_key(50);
        thread::sleep(Duration::from_millis(30));
        driver.press_key(57);
    });

    let outcome = controller
        .speak(&mut engine, &mut channel, "enter your extension")
        .unwrap();
    feeder.join().unwrap();

    assert_eq!(outcome.disposition, Disposition::Interrupted);
    assert_eq!(outcome.digits, "529");
    assert_eq!(channel.variable(DIGIT_VARIABLE), Some("529"));
    assert_eq!(outcome.stats.engine_stops, 1);

    let collected: String = (0..3)
        .map(|_| digit_rx.try_recv().expect("digit event").digit)
        .collect();
    assert_eq!(collected, "529");
}

#[test]
fn unknown_keypress_codes_are_not_collected() {
    init_tracing();

    let mut config = quick_config();
    config.digit_policy = DigitPolicy::Collect {
        max_digits: 1,
        timeout_ms: 300,
    };
    let controller = SessionController::new(config);

    let mut engine = ScriptedEngine::new(vec![patterned_chunk(160, 0); 50])
        .with_chunk_gap(Duration::from_millis(4));
    let (mut channel, driver) = LoopbackChannel::pair();

    // An unrecognized code still interrupts playback but never lands in
    // the result; the real digit behind it does.
    driver.press_key(99);
    driver.press_key(53);

    let outcome = controller
        .speak(&mut engine, &mut channel, "press any key")
        .unwrap();

    assert_eq!(outcome.digits, "5");
    assert_eq!(channel.variable(DIGIT_VARIABLE), Some("5"));
}

#[test]
fn silent_caller_times_out_after_clean_playback() {
    init_tracing();

    let mut config = quick_config();
    config.digit_policy = DigitPolicy::Collect {
        max_digits: 3,
        timeout_ms: 40,
    };
    let controller = SessionController::new(config);

    let mut engine = ScriptedEngine::new(vec![patterned_chunk(320, 0)]);
    let (mut channel, _driver) = LoopbackChannel::pair();

    let outcome = controller
        .speak(&mut engine, &mut channel, "please make a selection")
        .unwrap();

    assert_eq!(outcome.disposition, Disposition::Completed);
    assert!(outcome.digits.is_empty());
    assert_eq!(channel.variable(DIGIT_VARIABLE), None);
    assert_eq!(outcome.stats.bytes_out, 320);
}

#[test]
fn status_events_trace_a_clean_session() {
    init_tracing();

    let controller = SessionController::new(quick_config());
    let mut status_rx = controller.subscribe_status();

    let mut engine = ScriptedEngine::new(vec![patterned_chunk(160, 0)]);
    let (mut channel, _driver) = LoopbackChannel::pair();

    controller
        .speak(&mut engine, &mut channel, "short and sweet")
        .unwrap();

    let statuses: Vec<SessionStatus> = std::iter::from_fn(|| status_rx.try_recv().ok())
        .map(|event| event.status)
        .collect();
    assert_eq!(
        statuses,
        vec![
            SessionStatus::Preparing,
            SessionStatus::Streaming,
            SessionStatus::Completed,
        ]
    );
}

#[test]
fn port_open_failure_is_fatal_and_reported() {
    init_tracing();

    let controller = SessionController::new(quick_config());
    let mut engine = ScriptedEngine::new(vec![patterned_chunk(160, 0)]).failing_port_open();
    let (mut channel, _driver) = LoopbackChannel::pair();

    let err = controller
        .speak(&mut engine, &mut channel, "never spoken")
        .unwrap_err();

    assert!(matches!(err, OratioError::PortOpen(_)));
    assert_eq!(controller.status(), SessionStatus::Failed);
    assert!(channel.frames().is_empty());
}
