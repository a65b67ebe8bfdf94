//! End-to-end tests for tactus-core: sensor frames through extraction,
//! buffering, matching and gating in one flow.

use std::time::Duration;

use tactus_core::{
    BodyFrame, ChannelEvent, ChannelLayout, ClockDomain, FloorRef, GestureExtractor, HitExtractor,
    Performer, Pipeline, Point, RawHit, Timestamp, TimedMessage,
};

const SAMPLE_DURATION: Duration = Duration::from_nanos(20_833); // 48 kHz

fn layout() -> ChannelLayout {
    ChannelLayout {
        timeline: 1,
        inputs: vec![2, 3],
        outputs: vec![5, 6],
    }
}

fn beat() -> TimedMessage {
    TimedMessage {
        offset_samples: 0,
        event: ChannelEvent::NoteOn {
            channel: 1,
            note: 61,
            velocity: 100,
        },
    }
}

fn standing_frame(seconds: f64) -> BodyFrame {
    BodyFrame {
        timestamp: Timestamp::from_seconds(seconds),
        hand_left: Point { x: 195.0, y: 300.0 },
        hand_right: Point { x: 205.0, y: 300.0 },
        spine_shoulder: Point { x: 200.0, y: 150.0 },
        foot_left: Point { x: 190.0, y: 400.0 },
        foot_right: Point { x: 210.0, y: 400.0 },
    }
}

fn lifted_frame(seconds: f64) -> BodyFrame {
    let mut frame = standing_frame(seconds);
    frame.foot_right.y = 340.0;
    frame
}

/// A dancer who lifts a foot and stomps it down on the beat opens their
/// gate; holding still afterwards scores nothing further.
#[test]
fn stomp_on_the_beat_opens_the_gate() {
    let floor = FloorRef { y: 400.0 };
    let mut pipeline: Pipeline = Pipeline::new(120.0, 16);
    let mut dancers = vec![Performer::<GestureExtractor, 200>::new(GestureExtractor::new(
        10.0, 30.0,
    ))];

    // Lift at 9.5 s, feet together again at 10.02 s - a stomp, 20 ms after
    // the beat and well inside the 125 ms window.
    dancers[0].push_frame(&lifted_frame(9.5), &floor);
    dancers[0].push_frame(&standing_frame(10.02), &floor);

    let mut messages = vec![beat()];
    let outcome = pipeline.process_tick(
        &layout(),
        &mut dancers,
        &mut messages,
        Timestamp::from_seconds(10.0),
        SAMPLE_DURATION,
        |p| p.accuracy(),
    );

    assert_eq!(outcome.matched, 1);
    assert!(dancers[0].gate());
    assert_eq!(dancers[0].accuracy(), 1);
}

/// Pose changes that never resolve into a stomp count as off-beat once a
/// beat demands evaluation.
#[test]
fn posing_without_a_stomp_misses_the_beat() {
    let floor = FloorRef { y: 400.0 };
    let mut pipeline: Pipeline = Pipeline::new(120.0, 16);
    let mut dancers = vec![Performer::<GestureExtractor, 200>::new(GestureExtractor::new(
        10.0, 30.0,
    ))];

    // Only a lift, never back down: no stomp candidate exists.
    dancers[0].push_frame(&lifted_frame(9.9), &floor);

    let mut messages = vec![beat()];
    let outcome = pipeline.process_tick(
        &layout(),
        &mut dancers,
        &mut messages,
        Timestamp::from_seconds(10.0),
        SAMPLE_DURATION,
        |p| p.accuracy(),
    );

    assert_eq!(outcome.missed, 1);
    assert!(!dancers[0].gate());
    assert_eq!(dancers[0].accuracy(), -1);
}

/// A drummer's debounced hits score tick by tick, and the accuracy drifts
/// unbounded in either direction over a long session.
#[test]
fn drummer_accuracy_drifts_without_clamp() {
    let mut pipeline: Pipeline = Pipeline::new(120.0, 16);
    let mut drummers = vec![Performer::<HitExtractor, 10>::new(HitExtractor::new(100, 5))];

    // 200 beats, every hit 300 ms late: every evaluation is a miss.
    for i in 0..200u32 {
        let beat_time = 10.0 + f64::from(i);
        drummers[0].push_event(tactus_core::HitEvent {
            timestamp: Timestamp::from_seconds(beat_time + 0.3),
            note: 38,
            velocity: 100,
        });
        let mut messages = vec![beat()];
        pipeline.process_tick(
            &layout(),
            &mut drummers,
            &mut messages,
            Timestamp::from_seconds(beat_time),
            SAMPLE_DURATION,
            |_| (),
        );
    }

    assert_eq!(drummers[0].accuracy(), -200);
}

/// The raw-hit path end to end: debounce in extraction, then matching.
#[test]
fn rebound_strikes_do_not_double_score() {
    let mut pipeline: Pipeline = Pipeline::new(120.0, 16);
    let mut drummers = vec![Performer::<HitExtractor, 10>::new(HitExtractor::new(100, 5))];

    // A strike with a 0.4 ms rebound: one event lands in the buffer.
    let strike = RawHit {
        timestamp: Timestamp::from_seconds(10.01),
        note: 38,
        velocity: 90,
    };
    let rebound = RawHit {
        timestamp: Timestamp::from_seconds(10.0104),
        note: 38,
        velocity: 15,
    };
    drummers[0].push_frame(&strike, &());
    drummers[0].push_frame(&rebound, &());
    assert_eq!(drummers[0].events().len(), 1);

    let mut messages = vec![beat()];
    let outcome = pipeline.process_tick(
        &layout(),
        &mut drummers,
        &mut messages,
        Timestamp::from_seconds(10.0),
        SAMPLE_DURATION,
        |_| (),
    );
    assert_eq!(outcome.matched, 1);
    assert_eq!(drummers[0].accuracy(), 1);
}

/// Timestamps drawn from a realigned clock keep working in the pipeline:
/// the handshake shifts the origin, not the arithmetic.
#[test]
fn matching_works_on_a_realigned_clock() {
    let mut clock = ClockDomain::new();
    clock.set_zero_from_reference_seconds(clock.zero_reference_seconds() - 100.0);
    let tick_start = clock.now();
    assert!(tick_start.seconds() >= 100.0);

    let mut pipeline: Pipeline = Pipeline::new(120.0, 16);
    let mut drummers = vec![Performer::<HitExtractor, 10>::new(HitExtractor::new(100, 5))];
    drummers[0].push_event(tactus_core::HitEvent {
        timestamp: tick_start.after(Duration::from_millis(30)),
        note: 38,
        velocity: 100,
    });

    let mut messages = vec![beat()];
    let outcome = pipeline.process_tick(
        &layout(),
        &mut drummers,
        &mut messages,
        tick_start,
        SAMPLE_DURATION,
        |_| (),
    );
    assert_eq!(outcome.matched, 1);
}
