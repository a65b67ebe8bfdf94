//! The performer model: one scored, gated event stream per tracked source.

use tracing::trace;

use crate::ring::{RingBuffer, Timestamped};
use crate::time::Timestamp;

/// Capability of turning one raw sensor frame into discrete events.
///
/// Implementations compare the incoming frame against the previously seen
/// category and emit an event only when the category changed; the very
/// first frame after construction always emits. `Context` carries whatever
/// external reference the classification needs (a floor point for motion
/// capture, nothing for a drum pad).
pub trait ExtractEvents {
    /// Raw frame delivered by the sensor collaborator.
    type Frame;
    /// External reference needed to classify a frame.
    type Context;
    /// Discrete event type produced.
    type Event: Timestamped;

    /// Extract zero or more events from one frame.
    fn extract(&mut self, frame: &Self::Frame, context: &Self::Context, out: &mut Vec<Self::Event>);
}

/// A tracked source of rhythmic intent: a dancer's limbs, a drum pad.
///
/// Owns one event buffer fed by the sensor thread and the per-performer
/// matching state written by the real-time tick: an unbounded accuracy
/// score, the audibility gate, and the timestamp of the last timeline beat
/// already matched (to prevent double-counting a beat).
pub struct Performer<X: ExtractEvents, const N: usize> {
    events: RingBuffer<X::Event, N>,
    extractor: X,
    accuracy: i64,
    gate: bool,
    active: bool,
    volume_factor: f32,
    last_matched_beat: Option<Timestamp>,
    scratch: Vec<X::Event>,
}

impl<X: ExtractEvents, const N: usize> Performer<X, N> {
    /// Create a performer around an extraction strategy.
    pub fn new(extractor: X) -> Self {
        Self {
            events: RingBuffer::new(),
            extractor,
            accuracy: 0,
            gate: false,
            active: false,
            volume_factor: 1.0,
            last_matched_beat: None,
            scratch: Vec::new(),
        }
    }

    /// Run the extraction strategy on one raw frame, pushing each produced
    /// event individually.
    pub fn push_frame(&mut self, frame: &X::Frame, context: &X::Context) {
        self.scratch.clear();
        self.extractor.extract(frame, context, &mut self.scratch);
        for event in self.scratch.drain(..) {
            // Invariant: buffer timestamps are strictly increasing. Stale or
            // duplicate-timestamp events are dropped, not an error.
            if let Some(latest) = self.events.latest()
                && event.timestamp() <= latest.timestamp()
            {
                trace!(at = %event.timestamp(), "dropping non-monotonic event");
                continue;
            }
            self.events.push(event);
        }
    }

    /// Push an already-extracted event, subject to the same monotonicity
    /// invariant as [`Performer::push_frame`].
    pub fn push_event(&mut self, event: X::Event) {
        if let Some(latest) = self.events.latest()
            && event.timestamp() <= latest.timestamp()
        {
            trace!(at = %event.timestamp(), "dropping non-monotonic event");
            return;
        }
        self.events.push(event);
    }

    /// The performer's event buffer.
    pub fn events(&self) -> &RingBuffer<X::Event, N> {
        &self.events
    }

    /// Mutable access to the event buffer (changed-flag consumption).
    pub fn events_mut(&mut self) -> &mut RingBuffer<X::Event, N> {
        &mut self.events
    }

    /// The extraction strategy, for source-specific derived values.
    pub fn extractor(&self) -> &X {
        &self.extractor
    }

    /// Mutable access to the extraction strategy (tolerance updates).
    pub fn extractor_mut(&mut self) -> &mut X {
        &mut self.extractor
    }

    /// Current accuracy score. Unbounded in both directions.
    pub fn accuracy(&self) -> i64 {
        self.accuracy
    }

    /// +1. No upper clamp.
    pub fn increase_accuracy(&mut self) {
        self.accuracy += 1;
    }

    /// -1. No lower clamp.
    pub fn decrease_accuracy(&mut self) {
        self.accuracy -= 1;
    }

    /// Whether this performer's instrument channel is audible this tick.
    pub fn gate(&self) -> bool {
        self.gate
    }

    /// Open or close the gate. The matching pipeline is the only writer.
    pub fn set_gate(&mut self, open: bool) {
        self.gate = open;
    }

    /// Whether the performer takes part in matching.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Enable matching for this performer.
    pub fn activate(&mut self) {
        self.active = true;
    }

    /// Disable matching for this performer.
    pub fn deactivate(&mut self) {
        self.active = false;
    }

    /// Source-derived loudness scale in `0.0..=1.0`.
    pub fn volume_factor(&self) -> f32 {
        self.volume_factor
    }

    /// Update the loudness scale from the owning engine.
    pub fn set_volume_factor(&mut self, factor: f32) {
        self.volume_factor = factor;
    }

    /// Timestamp of the last note-history beat already matched.
    pub fn last_matched_beat(&self) -> Option<Timestamp> {
        self.last_matched_beat
    }

    /// Record a beat as matched so it is never counted twice.
    pub fn set_last_matched_beat(&mut self, beat: Timestamp) {
        self.last_matched_beat = Some(beat);
    }
}
