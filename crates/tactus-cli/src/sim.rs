//! Simulated sensors for running nodes without hardware.
//!
//! Both sources derive their behavior deterministically from the engine
//! clock, so two runs against the same origin produce the same rhythm: a
//! drummer cycling through a fixed pattern of timing offsets, and a dancer
//! who lifts a foot late in each beat and plants it on the beat line.

use std::time::Duration;

use tactus_core::{BodyFrame, ClockDomain, Point, RawHit, Timestamp};
use tactus_engine::{FrameSource, SourceFrame};

/// Timing offsets in seconds around each beat, cycled; two entries land
/// outside a sixteenth-note window at 120 BPM, so the score breathes.
const HIT_PATTERN: [f64; 8] = [0.010, -0.020, 0.030, 0.180, 0.0, -0.015, 0.250, 0.005];

/// Strike velocities cycled alongside the pattern.
const HIT_VELOCITIES: [u8; 4] = [96, 104, 88, 100];

/// A drum pad played around the shared beat grid.
pub struct SimulatedDrummer {
    clock: ClockDomain,
    period_nanos: i64,
    next_beat_nanos: i64,
    step: usize,
}

impl SimulatedDrummer {
    /// Start on the next whole beat of `clock` at `bpm`.
    pub fn new(clock: ClockDomain, bpm: f64) -> Self {
        let period_nanos = (60.0 / bpm * 1e9) as i64;
        let now = clock.now().nanos();
        let next_beat_nanos = (now.div_euclid(period_nanos) + 1) * period_nanos;
        Self {
            clock,
            period_nanos,
            next_beat_nanos,
            step: 0,
        }
    }
}

impl FrameSource for SimulatedDrummer {
    type Frame = RawHit;

    fn poll(&mut self) -> Result<Option<SourceFrame<RawHit>>, String> {
        std::thread::sleep(Duration::from_millis(2));
        let offset = HIT_PATTERN[self.step % HIT_PATTERN.len()];
        let due = self.next_beat_nanos + (offset * 1e9) as i64;
        if self.clock.now().nanos() < due {
            return Ok(None);
        }
        let frame = RawHit {
            timestamp: Timestamp::from_nanos(due),
            note: 38,
            velocity: HIT_VELOCITIES[self.step % HIT_VELOCITIES.len()],
        };
        self.step += 1;
        self.next_beat_nanos += self.period_nanos;
        Ok(Some(SourceFrame {
            identity: 38,
            frame,
        }))
    }
}

/// A dancer stamped out at ~30 frames per second.
///
/// The right foot lifts through the middle of each beat and lands with the
/// beat line; the arms move to a new corner every fourth beat, driving the
/// reported key category.
pub struct SimulatedDancer {
    clock: ClockDomain,
    period_nanos: i64,
    floor_y: f32,
}

impl SimulatedDancer {
    /// Create a dancer on the beat grid of `clock` at `bpm`.
    pub fn new(clock: ClockDomain, bpm: f64, floor_y: f32) -> Self {
        Self {
            clock,
            period_nanos: (60.0 / bpm * 1e9) as i64,
            floor_y,
        }
    }

    fn arm_targets(&self, beat_index: i64) -> (Point, Point) {
        let shoulder_y = 150.0;
        // Cycle the four corners: left-up, right-up, both-up, both-down.
        match (beat_index.div_euclid(4)).rem_euclid(4) {
            0 => (
                Point { x: 120.0, y: shoulder_y - 60.0 },
                Point { x: 150.0, y: shoulder_y - 60.0 },
            ),
            1 => (
                Point { x: 250.0, y: shoulder_y - 60.0 },
                Point { x: 280.0, y: shoulder_y - 60.0 },
            ),
            2 => (
                Point { x: 195.0, y: shoulder_y - 60.0 },
                Point { x: 205.0, y: shoulder_y - 60.0 },
            ),
            _ => (
                Point { x: 195.0, y: shoulder_y + 120.0 },
                Point { x: 205.0, y: shoulder_y + 120.0 },
            ),
        }
    }
}

impl FrameSource for SimulatedDancer {
    type Frame = BodyFrame;

    fn poll(&mut self) -> Result<Option<SourceFrame<BodyFrame>>, String> {
        std::thread::sleep(Duration::from_millis(33));
        let now = self.clock.now();
        let phase = now.nanos().rem_euclid(self.period_nanos);
        let beat_index = now.nanos().div_euclid(self.period_nanos);

        // Foot airborne through the back half of the beat, planted at the
        // line. 60 sensor units of lift clears the 30-unit tolerance.
        let in_air = phase > self.period_nanos * 11 / 20 && phase < self.period_nanos * 19 / 20;
        let right_foot_y = if in_air { self.floor_y - 60.0 } else { self.floor_y };

        let (hand_left, hand_right) = self.arm_targets(beat_index);
        let frame = BodyFrame {
            timestamp: now,
            hand_left,
            hand_right,
            spine_shoulder: Point { x: 200.0, y: 150.0 },
            foot_left: Point { x: 190.0, y: self.floor_y },
            foot_right: Point { x: 210.0, y: right_foot_y },
        };
        Ok(Some(SourceFrame {
            identity: 0,
            frame,
        }))
    }
}
