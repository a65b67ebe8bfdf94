//! Event records stored in performer and note-history buffers.

use bitflags::bitflags;

use crate::ring::{MatchCandidate, RingBuffer, Timestamped};
use crate::time::Timestamp;

bitflags! {
    /// Bit-set of body positions, combinable per side.
    ///
    /// For arms the rows read high/mid/low relative to the shoulder line;
    /// for feet only `HIGH_*` (lifted) and `LOW_*` (on the floor) are used.
    /// `HIGH_LEFT | HIGH_RIGHT` means both sides high, and so on.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Pose: u8 {
        /// Left side above the reference line.
        const HIGH_LEFT = 1;
        /// Right side above the reference line.
        const HIGH_RIGHT = 2;
        /// Left side at the reference line.
        const MID_LEFT = 4;
        /// Right side at the reference line.
        const MID_RIGHT = 8;
        /// Left side below the reference line.
        const LOW_LEFT = 16;
        /// Right side below the reference line.
        const LOW_RIGHT = 32;
    }
}

impl Pose {
    /// Neutral sentinel: both sides low. Used when a buffer holds no arm
    /// pose yet and as the resting feet pose.
    pub const BOTH_LOW: Pose = Pose::LOW_LEFT.union(Pose::LOW_RIGHT);

    /// Left foot lifted off the floor.
    pub fn left_foot_up(self) -> bool {
        self.contains(Pose::HIGH_LEFT)
    }

    /// Right foot lifted off the floor.
    pub fn right_foot_up(self) -> bool {
        self.contains(Pose::HIGH_RIGHT)
    }

    /// Both feet on the floor.
    pub fn both_feet_down(self) -> bool {
        self.contains(Pose::BOTH_LOW)
    }

    /// Both feet lifted (a jump).
    pub fn both_feet_up(self) -> bool {
        self.contains(Pose::HIGH_LEFT.union(Pose::HIGH_RIGHT))
    }
}

/// Body zone a gesture belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    /// Hand/arm gestures, classified against the shoulder line.
    Arms,
    /// Foot gestures, classified against the floor reference.
    Feet,
}

/// A discrete pose change extracted from a motion-sensor frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureEvent {
    /// Creation time.
    pub timestamp: Timestamp,
    /// Which body zone changed.
    pub zone: Zone,
    /// The new pose category.
    pub pose: Pose,
    /// Distance from the reference: floor height difference for feet,
    /// offset from the shoulder line for arms. Sensor units.
    pub magnitude: i32,
}

impl Timestamped for GestureEvent {
    fn timestamp(&self) -> Timestamp {
        self.timestamp
    }
}

impl MatchCandidate for GestureEvent {
    /// Dancers are matched on stomps, not on every pose change.
    fn latest_candidate<const N: usize>(buffer: &RingBuffer<Self, N>) -> Option<Timestamp> {
        buffer.latest_stomp().map(|e| e.timestamp)
    }
}

/// A debounced drum hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HitEvent {
    /// Creation time.
    pub timestamp: Timestamp,
    /// Note number identifying the pad that was struck.
    pub note: u8,
    /// Strike velocity, 0..=127.
    pub velocity: u8,
}

impl Timestamped for HitEvent {
    fn timestamp(&self) -> Timestamp {
        self.timestamp
    }
}

impl MatchCandidate for HitEvent {}

/// A timeline tick (metronome beat) recorded in the shared note history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeatEvent {
    /// Absolute time of the beat within the clock domain.
    pub timestamp: Timestamp,
    /// Note number carried by the metronome message.
    pub note: u8,
    /// Velocity carried by the metronome message.
    pub velocity: u8,
}

impl Timestamped for BeatEvent {
    fn timestamp(&self) -> Timestamp {
        self.timestamp
    }
}

impl<const N: usize> RingBuffer<GestureEvent, N> {
    /// Most recent arm pose, skipping any intervening foot events.
    ///
    /// Returns the [`Pose::BOTH_LOW`] sentinel when the buffer holds no arm
    /// pose. A domain default, not an error.
    pub fn latest_arm_pose(&self) -> Pose {
        self.iter()
            .rev()
            .find(|e| e.zone == Zone::Arms)
            .map_or(Pose::BOTH_LOW, |e| e.pose)
    }

    /// Most recent stomp: a feet-together event preceded, anywhere earlier
    /// in the buffer, by an event with at least one foot lifted.
    ///
    /// `None` when no such pair exists - standing still is not a stomp.
    pub fn latest_stomp(&self) -> Option<&GestureEvent> {
        let events: Vec<&GestureEvent> = self.iter().collect();
        for (i, event) in events.iter().enumerate().rev() {
            if event.zone == Zone::Feet && event.pose.both_feet_down() {
                let lifted_before = events[..i].iter().any(|e| {
                    e.zone == Zone::Feet
                        && (e.pose.left_foot_up() || e.pose.right_foot_up() || e.pose.both_feet_up())
                });
                if lifted_before {
                    return Some(*event);
                }
            }
        }
        None
    }
}
