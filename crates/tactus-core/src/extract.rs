//! Source-specific event extraction strategies.
//!
//! Each strategy implements [`ExtractEvents`]: it classifies one raw frame
//! against configurable tolerances and emits an event only when the
//! resulting category differs from the previous frame's, so a held pose
//! never floods the buffer with duplicates.

use std::time::Duration;

use tracing::trace;

use crate::event::{GestureEvent, HitEvent, Pose, Zone};
use crate::performer::ExtractEvents;
use crate::ring::RingBuffer;
use crate::time::Timestamp;

/// A 2D sensor-space point. Screen convention: y grows downward, so a hand
/// *above* the shoulder has a *smaller* y than the shoulder.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    /// Horizontal position in sensor units.
    pub x: f32,
    /// Vertical position in sensor units, growing downward.
    pub y: f32,
}

/// One motion-capture frame: the joint positions the classifier needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyFrame {
    /// Acquisition time.
    pub timestamp: Timestamp,
    /// Left hand position.
    pub hand_left: Point,
    /// Right hand position.
    pub hand_right: Point,
    /// Shoulder-line reference point.
    pub spine_shoulder: Point,
    /// Left foot position.
    pub foot_left: Point,
    /// Right foot position.
    pub foot_right: Point,
}

/// Floor reference the feet classifier measures against.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FloorRef {
    /// Vertical position of the floor in sensor units.
    pub y: f32,
}

/// Horizontal hand placement relative to the shoulder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandDirection {
    Left,
    Middle,
    Right,
    Undecided,
}

/// Minimum height difference between the feet before a single-foot lift is
/// recognized, in sensor units.
const LIFT_DEADBAND: f32 = 10.0;

/// Maximum height difference between the feet for a two-foot lift to count
/// as a jump rather than noise, in sensor units.
const JUMP_DEADBAND: f32 = 30.0;

/// Extracts discrete [`GestureEvent`]s from motion-capture frames.
///
/// Arms are classified into a high/mid/low x left/middle/right grid around
/// the shoulder line; feet into down-down, one-up and jump categories
/// around the floor reference. Tolerances control how far a joint must
/// stray from the reference before its row changes.
///
/// Also derives a loudness factor from lift height: the highest lift seen
/// so far maps to full volume, lower lifts scale proportionally.
#[derive(Debug, Clone)]
pub struct GestureExtractor {
    hand_tolerance: f32,
    foot_tolerance: f32,
    last_arm_pose: Option<Pose>,
    last_feet_pose: Option<Pose>,
    last_lift_height: f32,
    max_lift_height: f32,
    volume_factor: f32,
}

impl GestureExtractor {
    /// Create an extractor with the given tolerances, in sensor units.
    pub fn new(hand_tolerance: f32, foot_tolerance: f32) -> Self {
        Self {
            hand_tolerance,
            foot_tolerance,
            last_arm_pose: None,
            last_feet_pose: None,
            last_lift_height: 0.0,
            max_lift_height: 0.0,
            volume_factor: 1.0,
        }
    }

    /// Sensitivity of hand classification.
    pub fn hand_tolerance(&self) -> f32 {
        self.hand_tolerance
    }

    /// Update hand sensitivity.
    pub fn set_hand_tolerance(&mut self, tolerance: f32) {
        self.hand_tolerance = tolerance;
    }

    /// Sensitivity of stomp detection.
    pub fn foot_tolerance(&self) -> f32 {
        self.foot_tolerance
    }

    /// Update stomp sensitivity.
    pub fn set_foot_tolerance(&mut self, tolerance: f32) {
        self.foot_tolerance = tolerance;
    }

    /// Loudness scale derived from lift height, `0.0..=1.0`.
    pub fn volume_factor(&self) -> f32 {
        self.volume_factor
    }

    fn hand_direction(&self, frame: &BodyFrame) -> HandDirection {
        let tol = self.hand_tolerance;
        let shoulder = frame.spine_shoulder.x;
        let (l, r) = (frame.hand_left.x, frame.hand_right.x);
        if l < shoulder - tol && r < shoulder - tol {
            HandDirection::Left
        } else if (shoulder - tol..=shoulder + tol).contains(&l)
            && (shoulder - tol..=shoulder + tol).contains(&r)
        {
            HandDirection::Middle
        } else if l > shoulder + tol && r > shoulder + tol {
            HandDirection::Right
        } else {
            HandDirection::Undecided
        }
    }

    fn classify_arms(&mut self, frame: &BodyFrame, out: &mut Vec<GestureEvent>) {
        let tol = self.hand_tolerance;
        let shoulder = frame.spine_shoulder.y;
        let (l, r) = (frame.hand_left.y, frame.hand_right.y);

        // Row first (y grows downward: above the shoulder means smaller y).
        let row = if l < shoulder - tol && r < shoulder - tol {
            (Pose::HIGH_LEFT, Pose::HIGH_RIGHT)
        } else if (shoulder - tol..=shoulder + tol).contains(&l)
            && (shoulder - tol..=shoulder + tol).contains(&r)
        {
            (Pose::MID_LEFT, Pose::MID_RIGHT)
        } else if l > shoulder + tol && r > shoulder + tol {
            (Pose::LOW_LEFT, Pose::LOW_RIGHT)
        } else {
            // Hands straddle the reference line: no stable category.
            return;
        };

        let pose = match self.hand_direction(frame) {
            HandDirection::Left => row.0,
            HandDirection::Right => row.1,
            HandDirection::Middle => row.0 | row.1,
            HandDirection::Undecided => return,
        };

        if self.last_arm_pose != Some(pose) {
            let magnitude = (f64::from((l + r) / 2.0 - shoulder)).round() as i32;
            trace!(?pose, magnitude, "arm pose changed");
            out.push(GestureEvent {
                timestamp: frame.timestamp,
                zone: Zone::Arms,
                pose,
                magnitude,
            });
            self.last_arm_pose = Some(pose);
        }
    }

    fn classify_feet(&mut self, frame: &BodyFrame, floor: &FloorRef, out: &mut Vec<GestureEvent>) {
        let tol = self.foot_tolerance;
        let on_floor = floor.y - tol;
        let (l, r) = (frame.foot_left.y, frame.foot_right.y);
        let height_diff = l - r;

        let pose = if l >= on_floor && r >= on_floor {
            Some(Pose::BOTH_LOW)
        } else if l >= on_floor && r < on_floor && height_diff.abs() > LIFT_DEADBAND {
            Some(Pose::LOW_LEFT | Pose::HIGH_RIGHT)
        } else if l < on_floor && r >= on_floor && height_diff.abs() > LIFT_DEADBAND {
            Some(Pose::HIGH_LEFT | Pose::LOW_RIGHT)
        } else if l < on_floor && r < on_floor && height_diff.abs() < JUMP_DEADBAND {
            Some(Pose::HIGH_LEFT | Pose::HIGH_RIGHT)
        } else {
            None
        };

        let Some(pose) = pose else { return };

        let lift = match pose {
            p if p == Pose::BOTH_LOW => 0.0,
            p if p == Pose::LOW_LEFT | Pose::HIGH_RIGHT => floor.y - r,
            p if p == Pose::HIGH_LEFT | Pose::LOW_RIGHT => floor.y - l,
            _ => (floor.y - l).max(floor.y - r),
        };

        if self.last_feet_pose != Some(pose) {
            trace!(?pose, lift, "feet pose changed");
            out.push(GestureEvent {
                timestamp: frame.timestamp,
                zone: Zone::Feet,
                pose,
                magnitude: f64::from(height_diff).round() as i32,
            });
            self.last_feet_pose = Some(pose);
            self.last_lift_height = lift;
            if pose != Pose::BOTH_LOW {
                self.update_volume_factor();
            }
        } else if pose != Pose::BOTH_LOW && lift > self.last_lift_height {
            // Same category but the foot keeps rising: track the peak so
            // the loudness factor reflects the full lift, without emitting
            // a duplicate event.
            self.last_lift_height = lift;
            self.update_volume_factor();
        }
    }

    fn update_volume_factor(&mut self) {
        if self.last_lift_height > self.max_lift_height {
            self.max_lift_height = self.last_lift_height;
            self.volume_factor = 1.0;
        } else if self.max_lift_height > 0.0 {
            self.volume_factor = self.last_lift_height / self.max_lift_height;
        }
    }
}

impl ExtractEvents for GestureExtractor {
    type Frame = BodyFrame;
    type Context = FloorRef;
    type Event = GestureEvent;

    fn extract(&mut self, frame: &BodyFrame, context: &FloorRef, out: &mut Vec<GestureEvent>) {
        let start = out.len();
        self.classify_arms(frame, out);
        self.classify_feet(frame, context, out);
        // Arm and feet changes from one frame share its timestamp. The
        // buffer requires strictly increasing stamps, so order them a
        // nanosecond apart in emission order.
        for i in start + 1..out.len() {
            if out[i].timestamp <= out[i - 1].timestamp {
                out[i].timestamp = out[i - 1].timestamp.after(Duration::from_nanos(1));
            }
        }
    }
}

/// A raw drum-pad strike as delivered by the percussion sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawHit {
    /// Acquisition time.
    pub timestamp: Timestamp,
    /// Note number identifying the pad.
    pub note: u8,
    /// Strike velocity, 0..=127.
    pub velocity: u8,
}

/// Number of recent hits the rolling velocity average covers.
const VELOCITY_WINDOW: usize = 10;

/// Bounds of the velocity-accuracy score.
const VELOCITY_ACCURACY_EDGE: i32 = 10;

/// Extracts debounced [`HitEvent`]s from raw drum strikes.
///
/// A pad rebound produces a burst of strikes within a millisecond; only the
/// first survives. The extractor also tracks how the performer's strike
/// strength relates to a configured target level: a rolling average over
/// the last ten hits, and a bounded score that drifts up when hitting too
/// hard and down when hitting too soft.
#[derive(Debug, Clone)]
pub struct HitExtractor {
    debounce: Duration,
    target_velocity: u8,
    velocity_tolerance: u8,
    last_emitted: Option<Timestamp>,
    recent: RingBuffer<u8, VELOCITY_WINDOW>,
    velocity_accuracy: i32,
}

impl HitExtractor {
    /// Create an extractor with the default 1 ms debounce.
    pub fn new(target_velocity: u8, velocity_tolerance: u8) -> Self {
        Self::with_debounce(target_velocity, velocity_tolerance, Duration::from_millis(1))
    }

    /// Create an extractor with an explicit debounce interval.
    pub fn with_debounce(target_velocity: u8, velocity_tolerance: u8, debounce: Duration) -> Self {
        Self {
            debounce,
            target_velocity,
            velocity_tolerance,
            last_emitted: None,
            recent: RingBuffer::new(),
            velocity_accuracy: 0,
        }
    }

    /// Rolling average velocity over the last ten hits; 0 before any hit.
    pub fn average_velocity(&self) -> i32 {
        if self.recent.is_empty() {
            return 0;
        }
        let sum: i64 = self.recent.iter().map(|&v| i64::from(v)).sum();
        (sum / self.recent.len() as i64) as i32
    }

    /// Bounded score of strike strength against the target level.
    ///
    /// Positive means consistently too hard, negative too soft. Clamped to
    /// +-10 so one loud stretch cannot bury later improvement.
    pub fn velocity_accuracy(&self) -> i32 {
        self.velocity_accuracy
    }

    fn score_velocity(&mut self, velocity: u8) {
        let low = self.target_velocity.saturating_sub(self.velocity_tolerance);
        let high = self.target_velocity.saturating_add(self.velocity_tolerance);
        if velocity < low && self.velocity_accuracy > -VELOCITY_ACCURACY_EDGE {
            self.velocity_accuracy -= 1;
        } else if velocity > high && self.velocity_accuracy < VELOCITY_ACCURACY_EDGE {
            self.velocity_accuracy += 1;
        }
    }
}

impl ExtractEvents for HitExtractor {
    type Frame = RawHit;
    type Context = ();
    type Event = HitEvent;

    fn extract(&mut self, frame: &RawHit, _context: &(), out: &mut Vec<HitEvent>) {
        if let Some(last) = self.last_emitted
            && frame.timestamp.distance(last) <= self.debounce
        {
            trace!(note = frame.note, "strike debounced");
            return;
        }
        self.last_emitted = Some(frame.timestamp);
        self.recent.push(frame.velocity);
        self.score_velocity(frame.velocity);
        out.push(HitEvent {
            timestamp: frame.timestamp,
            note: frame.note,
            velocity: frame.velocity,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(nanos: i64) -> BodyFrame {
        // Neutral: hands hanging below the shoulder near the spine, feet on
        // a floor at y=400.
        BodyFrame {
            timestamp: Timestamp::from_nanos(nanos),
            hand_left: Point { x: 195.0, y: 300.0 },
            hand_right: Point { x: 205.0, y: 300.0 },
            spine_shoulder: Point { x: 200.0, y: 150.0 },
            foot_left: Point { x: 190.0, y: 400.0 },
            foot_right: Point { x: 210.0, y: 400.0 },
        }
    }

    const FLOOR: FloorRef = FloorRef { y: 400.0 };

    #[test]
    fn first_frame_always_emits() {
        let mut extractor = GestureExtractor::new(10.0, 30.0);
        let mut out = Vec::new();
        extractor.extract(&frame(1), &FLOOR, &mut out);
        // Arms low-middle and feet both-down are both new categories.
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].zone, Zone::Arms);
        assert_eq!(out[0].pose, Pose::BOTH_LOW);
        assert_eq!(out[1].zone, Zone::Feet);
        assert_eq!(out[1].pose, Pose::BOTH_LOW);
    }

    #[test]
    fn unchanged_category_emits_nothing() {
        let mut extractor = GestureExtractor::new(10.0, 30.0);
        let mut out = Vec::new();
        extractor.extract(&frame(1), &FLOOR, &mut out);
        out.clear();
        extractor.extract(&frame(2), &FLOOR, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn hands_above_shoulder_classify_high() {
        let mut extractor = GestureExtractor::new(10.0, 30.0);
        let mut out = Vec::new();
        extractor.extract(&frame(1), &FLOOR, &mut out);
        out.clear();

        let mut raised = frame(2);
        raised.hand_left.y = 100.0;
        raised.hand_right.y = 100.0;
        extractor.extract(&raised, &FLOOR, &mut out);
        let arm = out.iter().find(|e| e.zone == Zone::Arms).expect("arm event");
        assert_eq!(arm.pose, Pose::HIGH_LEFT | Pose::HIGH_RIGHT);
        assert!(arm.magnitude < 0, "above the line means negative offset");
    }

    #[test]
    fn hands_to_one_side_classify_left_or_right() {
        let mut extractor = GestureExtractor::new(10.0, 30.0);
        let mut out = Vec::new();

        let mut pose = frame(1);
        pose.hand_left = Point { x: 120.0, y: 100.0 };
        pose.hand_right = Point { x: 150.0, y: 100.0 };
        extractor.extract(&pose, &FLOOR, &mut out);
        let arm = out.iter().find(|e| e.zone == Zone::Arms).expect("arm event");
        assert_eq!(arm.pose, Pose::HIGH_LEFT);
    }

    #[test]
    fn straddling_hands_emit_nothing() {
        let mut extractor = GestureExtractor::new(10.0, 30.0);
        let mut out = Vec::new();
        let mut split = frame(1);
        split.hand_left.y = 100.0; // one up, one down
        extractor.extract(&split, &FLOOR, &mut out);
        assert!(out.iter().all(|e| e.zone != Zone::Arms));
    }

    #[test]
    fn single_foot_lift_is_detected() {
        let mut extractor = GestureExtractor::new(10.0, 30.0);
        let mut out = Vec::new();
        extractor.extract(&frame(1), &FLOOR, &mut out);
        out.clear();

        let mut lifted = frame(2);
        lifted.foot_right.y = 340.0; // right foot 60 units up
        extractor.extract(&lifted, &FLOOR, &mut out);
        let feet = out.iter().find(|e| e.zone == Zone::Feet).expect("feet event");
        assert_eq!(feet.pose, Pose::LOW_LEFT | Pose::HIGH_RIGHT);
        assert_eq!(extractor.volume_factor(), 1.0);
    }

    #[test]
    fn lower_second_lift_scales_volume_factor() {
        let mut extractor = GestureExtractor::new(10.0, 30.0);
        let mut out = Vec::new();
        extractor.extract(&frame(1), &FLOOR, &mut out);

        let mut high = frame(2);
        high.foot_right.y = 300.0; // 100 units
        extractor.extract(&high, &FLOOR, &mut out);

        extractor.extract(&frame(3), &FLOOR, &mut out); // back down

        let mut low = frame(4);
        low.foot_right.y = 350.0; // 50 units
        extractor.extract(&low, &FLOOR, &mut out);

        assert!((extractor.volume_factor() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn jump_requires_similar_heights() {
        let mut extractor = GestureExtractor::new(10.0, 30.0);
        let mut out = Vec::new();
        extractor.extract(&frame(1), &FLOOR, &mut out);
        out.clear();

        let mut jump = frame(2);
        jump.foot_left.y = 330.0;
        jump.foot_right.y = 340.0;
        extractor.extract(&jump, &FLOOR, &mut out);
        let feet = out.iter().find(|e| e.zone == Zone::Feet).expect("feet event");
        assert!(feet.pose.both_feet_up());
    }

    #[test]
    fn debounce_drops_rebound_strikes() {
        let mut extractor = HitExtractor::new(100, 5);
        let mut out = Vec::new();
        let hit = |nanos| RawHit {
            timestamp: Timestamp::from_nanos(nanos),
            note: 38,
            velocity: 90,
        };
        extractor.extract(&hit(0), &(), &mut out);
        extractor.extract(&hit(500_000), &(), &mut out); // 0.5 ms later
        extractor.extract(&hit(2_000_000), &(), &mut out); // 2 ms later
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn average_velocity_covers_last_ten_hits() {
        let mut extractor = HitExtractor::new(100, 5);
        let mut out = Vec::new();
        for i in 0..12 {
            let hit = RawHit {
                timestamp: Timestamp::from_nanos(i * 10_000_000),
                note: 38,
                velocity: if i < 2 { 0 } else { 80 },
            };
            extractor.extract(&hit, &(), &mut out);
        }
        // The two zero-velocity hits fell out of the window.
        assert_eq!(extractor.average_velocity(), 80);
    }

    #[test]
    fn velocity_accuracy_is_clamped() {
        let mut extractor = HitExtractor::new(100, 5);
        let mut out = Vec::new();
        for i in 0..50 {
            let hit = RawHit {
                timestamp: Timestamp::from_nanos(i * 10_000_000),
                note: 38,
                velocity: 127,
            };
            extractor.extract(&hit, &(), &mut out);
        }
        assert_eq!(extractor.velocity_accuracy(), 10);
    }

    #[test]
    fn in_range_velocity_leaves_score_alone() {
        let mut extractor = HitExtractor::new(100, 5);
        let mut out = Vec::new();
        for i in 0..10 {
            let hit = RawHit {
                timestamp: Timestamp::from_nanos(i * 10_000_000),
                note: 38,
                velocity: 102,
            };
            extractor.extract(&hit, &(), &mut out);
        }
        assert_eq!(extractor.velocity_accuracy(), 0);
    }
}
