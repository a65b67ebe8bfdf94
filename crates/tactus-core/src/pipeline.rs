//! Matching and gating pipeline, run once per real-time tick.
//!
//! The host hands over one ordered batch of timed messages per tick. The
//! pipeline splits timeline beats into the shared note history, scores each
//! performer's latest matchable event against the newest beat within a
//! tempo-derived tolerance window, opens or closes the audibility gates,
//! and reroutes or mutes the instrument-channel messages accordingly.

use std::time::Duration;

use tracing::{debug, trace};

use crate::event::BeatEvent;
use crate::performer::{ExtractEvents, Performer};
use crate::ring::{MatchCandidate, RingBuffer};
use crate::time::{Timestamp, tolerance_window};

/// Capacity of the shared note-history buffer.
pub const NOTE_HISTORY_CAPACITY: usize = 30;

/// Payload of one timed host message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelEvent {
    /// A note starts sounding on a channel.
    NoteOn {
        /// Channel the message arrived on.
        channel: u8,
        /// Note number.
        note: u8,
        /// Velocity, 0..=127.
        velocity: u8,
    },
    /// A note stops sounding on a channel.
    NoteOff {
        /// Channel the message arrived on.
        channel: u8,
        /// Note number.
        note: u8,
    },
    /// Anything else; passed through untouched.
    Other,
}

/// One timed message within a tick's batch, stamped with its offset from
/// the start of the tick in samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedMessage {
    /// Offset from the tick start, in samples.
    pub offset_samples: u32,
    /// The message payload.
    pub event: ChannelEvent,
}

/// Channel convention mapping messages to performers.
///
/// Messages on `timeline` carry metronome beats. A message on
/// `inputs[i]` belongs to performer `i` and is rerouted to `outputs[i]`
/// while that performer's gate is open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelLayout {
    /// Channel carrying timeline/metronome beats.
    pub timeline: u8,
    /// Input channel per performer index.
    pub inputs: Vec<u8>,
    /// Output channel per performer index.
    pub outputs: Vec<u8>,
}

impl ChannelLayout {
    /// The performer index listening on `channel`, if any.
    pub fn performer_for(&self, channel: u8) -> Option<usize> {
        self.inputs.iter().position(|&c| c == channel)
    }
}

/// What one tick of matching produced.
#[derive(Debug)]
pub struct TickOutcome<S> {
    /// Performers whose evaluation succeeded this tick.
    pub matched: usize,
    /// Performers whose evaluation failed this tick.
    pub missed: usize,
    /// State snapshots of every performer evaluated this tick, in
    /// performer order. Empty when nothing was evaluated.
    pub states: Vec<S>,
}

impl<S> TickOutcome<S> {
    /// Whether any performer was evaluated this tick.
    pub fn evaluated(&self) -> bool {
        self.matched + self.missed > 0
    }
}

/// The per-process matching pipeline.
///
/// Owns the shared note-history buffer and the tempo parameters the
/// tolerance window is derived from. Single-threaded by design: the
/// real-time tick is its only caller.
#[derive(Debug)]
pub struct Pipeline<const H: usize = NOTE_HISTORY_CAPACITY> {
    note_history: RingBuffer<BeatEvent, H>,
    bpm: f64,
    note_unit: u32,
}

impl<const H: usize> Pipeline<H> {
    /// Create a pipeline. Callers must guarantee `bpm > 0` and
    /// `note_unit > 0`; configuration validation enforces this upstream.
    pub fn new(bpm: f64, note_unit: u32) -> Self {
        debug_assert!(bpm > 0.0);
        debug_assert!(note_unit > 0);
        Self {
            note_history: RingBuffer::new(),
            bpm,
            note_unit,
        }
    }

    /// Current tempo in beats per minute.
    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Change the tempo.
    pub fn set_bpm(&mut self, bpm: f64) {
        debug_assert!(bpm > 0.0);
        self.bpm = bpm;
    }

    /// Note subdivision the tolerance window is derived from.
    pub fn note_unit(&self) -> u32 {
        self.note_unit
    }

    /// Change the tolerance subdivision (larger = stricter).
    pub fn set_note_unit(&mut self, note_unit: u32) {
        debug_assert!(note_unit > 0);
        self.note_unit = note_unit;
    }

    /// The shared note-history buffer.
    pub fn note_history(&self) -> &RingBuffer<BeatEvent, H> {
        &self.note_history
    }

    /// Run one tick: split the batch, score performers, gate channels.
    ///
    /// `tick_start` is the clock reading at the start of this processing
    /// call; message offsets are converted to absolute timestamps with
    /// `sample_duration`. `snapshot` is invoked for every performer that
    /// was evaluated this tick (matched or missed) so the caller can
    /// assemble a state message without the pipeline knowing about wire
    /// formats.
    pub fn process_tick<X, const N: usize, S, F>(
        &mut self,
        layout: &ChannelLayout,
        performers: &mut [Performer<X, N>],
        messages: &mut Vec<TimedMessage>,
        tick_start: Timestamp,
        sample_duration: Duration,
        mut snapshot: F,
    ) -> TickOutcome<S>
    where
        X: ExtractEvents,
        X::Event: MatchCandidate,
        F: FnMut(&Performer<X, N>) -> S,
    {
        // Step 1: record timeline beats before any performer is evaluated.
        for msg in messages.iter() {
            if let ChannelEvent::NoteOn {
                channel,
                note,
                velocity,
            } = msg.event
                && channel == layout.timeline
            {
                let at = tick_start.after(sample_duration * msg.offset_samples);
                trace!(%at, note, "timeline beat");
                self.note_history.push(BeatEvent {
                    timestamp: at,
                    note,
                    velocity,
                });
            }
        }

        // Steps 2 and 3: evaluate each performer against the newest beat.
        let mut outcome = TickOutcome {
            matched: 0,
            missed: 0,
            states: Vec::new(),
        };
        let history_changed = self.note_history.changed();
        if let Some(beat) = self.note_history.latest().copied() {
            let window = tolerance_window(self.bpm, self.note_unit);
            for performer in performers.iter_mut() {
                if performer.events().is_empty() {
                    continue;
                }
                let fresh_event = performer.events().changed()
                    && performer.last_matched_beat() != Some(beat.timestamp);
                if fresh_event {
                    performer.events_mut().take_changed();
                }
                if !fresh_event && !history_changed {
                    continue;
                }

                let matched = X::Event::latest_candidate(performer.events())
                    .is_some_and(|event| {
                        beat.timestamp.before(window) < event && event < beat.timestamp.after(window)
                    });
                if matched {
                    performer.set_last_matched_beat(beat.timestamp);
                    performer.increase_accuracy();
                    performer.set_gate(true);
                    outcome.matched += 1;
                } else {
                    performer.decrease_accuracy();
                    performer.set_gate(false);
                    outcome.missed += 1;
                }
                debug!(
                    matched,
                    accuracy = performer.accuracy(),
                    beat = %beat.timestamp,
                    "performer evaluated"
                );
                outcome.states.push(snapshot(performer));
            }
        }

        // Step 4: reroute or mute instrument-channel messages with the
        // gates decided above.
        messages.retain_mut(|msg| match &mut msg.event {
            ChannelEvent::NoteOn { channel, .. } => {
                if *channel == layout.timeline {
                    return true;
                }
                match layout.performer_for(*channel) {
                    Some(index) => {
                        if performers.get(index).is_some_and(Performer::gate) {
                            if let Some(out) = layout.outputs.get(index) {
                                *channel = *out;
                            }
                            true
                        } else {
                            false
                        }
                    }
                    // Not part of the convention: pass through untouched.
                    None => true,
                }
            }
            // Note-offs follow their channel mapping unconditionally so a
            // gate closing mid-note never leaves it hanging.
            ChannelEvent::NoteOff { channel, .. } => {
                if let Some(index) = layout.performer_for(*channel)
                    && let Some(out) = layout.outputs.get(index)
                {
                    *channel = *out;
                }
                true
            }
            ChannelEvent::Other => true,
        });

        // Step 5: the beat has now been offered to every performer.
        self.note_history.take_changed();

        outcome
    }
}

impl Default for Pipeline<NOTE_HISTORY_CAPACITY> {
    fn default() -> Self {
        Self::new(120.0, 16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::HitEvent;
    use crate::extract::{HitExtractor, RawHit};

    type HitPerformer = Performer<HitExtractor, 10>;

    fn layout() -> ChannelLayout {
        ChannelLayout {
            timeline: 1,
            inputs: vec![2, 3],
            outputs: vec![5, 6],
        }
    }

    fn beat_at(offset_samples: u32) -> TimedMessage {
        TimedMessage {
            offset_samples,
            event: ChannelEvent::NoteOn {
                channel: 1,
                note: 61,
                velocity: 100,
            },
        }
    }

    fn instrument_on(channel: u8) -> TimedMessage {
        TimedMessage {
            offset_samples: 0,
            event: ChannelEvent::NoteOn {
                channel,
                note: 60,
                velocity: 90,
            },
        }
    }

    fn push_hit(performer: &mut HitPerformer, seconds: f64) {
        performer.push_event(HitEvent {
            timestamp: Timestamp::from_seconds(seconds),
            note: 38,
            velocity: 100,
        });
    }

    fn run_tick(
        pipeline: &mut Pipeline,
        performers: &mut [HitPerformer],
        messages: &mut Vec<TimedMessage>,
        tick_start_seconds: f64,
    ) -> TickOutcome<i64> {
        pipeline.process_tick(
            &layout(),
            performers,
            messages,
            Timestamp::from_seconds(tick_start_seconds),
            Duration::from_nanos(20_833), // 48 kHz
            |p| p.accuracy(),
        )
    }

    #[test]
    fn event_inside_window_matches() {
        // BPM 120, unit 16: window (240/120)/16 = 0.125 s.
        let mut pipeline = Pipeline::new(120.0, 16);
        let mut performers = vec![HitPerformer::new(HitExtractor::new(100, 5))];
        push_hit(&mut performers[0], 10.05);

        let mut messages = vec![beat_at(0)];
        let outcome = run_tick(&mut pipeline, &mut performers, &mut messages, 10.0);

        assert_eq!(outcome.matched, 1);
        assert_eq!(outcome.missed, 0);
        assert_eq!(performers[0].accuracy(), 1);
        assert!(performers[0].gate());
        assert_eq!(outcome.states, vec![1]);
    }

    #[test]
    fn event_outside_window_misses() {
        let mut pipeline = Pipeline::new(120.0, 16);
        let mut performers = vec![HitPerformer::new(HitExtractor::new(100, 5))];
        push_hit(&mut performers[0], 10.20); // outside (9.875, 10.125)

        let mut messages = vec![beat_at(0)];
        let outcome = run_tick(&mut pipeline, &mut performers, &mut messages, 10.0);

        assert_eq!(outcome.missed, 1);
        assert_eq!(performers[0].accuracy(), -1);
        assert!(!performers[0].gate());
    }

    #[test]
    fn exact_coincidence_always_matches() {
        for (bpm, unit) in [(1.0, 1), (120.0, 16), (960.0, 64)] {
            let mut pipeline = Pipeline::new(bpm, unit);
            let mut performers = vec![HitPerformer::new(HitExtractor::new(100, 5))];
            push_hit(&mut performers[0], 10.0);

            let mut messages = vec![beat_at(0)];
            let outcome = run_tick(&mut pipeline, &mut performers, &mut messages, 10.0);
            assert_eq!(outcome.matched, 1, "bpm={bpm} unit={unit}");
        }
    }

    #[test]
    fn a_beat_is_never_matched_twice() {
        let mut pipeline = Pipeline::new(120.0, 16);
        let mut performers = vec![HitPerformer::new(HitExtractor::new(100, 5))];
        push_hit(&mut performers[0], 10.05);

        let mut messages = vec![beat_at(0)];
        run_tick(&mut pipeline, &mut performers, &mut messages, 10.0);
        assert_eq!(performers[0].accuracy(), 1);

        // A second event near the same beat must not score again.
        push_hit(&mut performers[0], 10.06);
        let mut messages = Vec::new();
        let outcome = run_tick(&mut pipeline, &mut performers, &mut messages, 10.01);
        assert!(!outcome.evaluated());
        assert_eq!(performers[0].accuracy(), 1);
    }

    #[test]
    fn new_beat_reevaluates_standing_event() {
        let mut pipeline = Pipeline::new(120.0, 16);
        let mut performers = vec![HitPerformer::new(HitExtractor::new(100, 5))];
        push_hit(&mut performers[0], 10.05);

        let mut messages = vec![beat_at(0)];
        run_tick(&mut pipeline, &mut performers, &mut messages, 10.0);
        assert_eq!(performers[0].accuracy(), 1);

        // The next beat arrives; the stale event no longer fits its window
        // and the performer is marked off-beat without producing anything.
        let mut messages = vec![beat_at(0)];
        let outcome = run_tick(&mut pipeline, &mut performers, &mut messages, 11.0);
        assert_eq!(outcome.missed, 1);
        assert_eq!(performers[0].accuracy(), 0);
        assert!(!performers[0].gate());
    }

    #[test]
    fn empty_buffers_mean_no_decision() {
        let mut pipeline = Pipeline::new(120.0, 16);
        let mut performers = vec![HitPerformer::new(HitExtractor::new(100, 5))];

        // No beat yet: an event alone decides nothing.
        push_hit(&mut performers[0], 1.0);
        let mut messages = Vec::new();
        let outcome = run_tick(&mut pipeline, &mut performers, &mut messages, 1.0);
        assert!(!outcome.evaluated());
        assert_eq!(performers[0].accuracy(), 0);
    }

    #[test]
    fn open_gate_reroutes_to_output_channel() {
        let mut pipeline = Pipeline::new(120.0, 16);
        let mut performers = vec![HitPerformer::new(HitExtractor::new(100, 5))];
        push_hit(&mut performers[0], 10.0);

        let mut messages = vec![beat_at(0), instrument_on(2)];
        run_tick(&mut pipeline, &mut performers, &mut messages, 10.0);

        assert_eq!(messages.len(), 2);
        assert_eq!(
            messages[1].event,
            ChannelEvent::NoteOn {
                channel: 5,
                note: 60,
                velocity: 90
            }
        );
    }

    #[test]
    fn closed_gate_mutes_instrument_messages() {
        let mut pipeline = Pipeline::new(120.0, 16);
        let mut performers = vec![HitPerformer::new(HitExtractor::new(100, 5))];
        push_hit(&mut performers[0], 20.0); // way off the beat

        let mut messages = vec![beat_at(0), instrument_on(2)];
        run_tick(&mut pipeline, &mut performers, &mut messages, 10.0);

        // The instrument message was dropped, the beat passed through.
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0], beat_at(0));
    }

    #[test]
    fn messages_for_absent_performers_are_muted() {
        let mut pipeline = Pipeline::new(120.0, 16);
        let mut performers: Vec<HitPerformer> =
            vec![HitPerformer::new(HitExtractor::new(100, 5))];

        // Channel 3 maps to performer 1, which does not exist.
        let mut messages = vec![instrument_on(3)];
        run_tick(&mut pipeline, &mut performers, &mut messages, 10.0);
        assert!(messages.is_empty());
    }

    #[test]
    fn unrelated_channels_pass_through() {
        let mut pipeline = Pipeline::new(120.0, 16);
        let mut performers: Vec<HitPerformer> = Vec::new();

        let mut messages = vec![
            instrument_on(9),
            TimedMessage {
                offset_samples: 4,
                event: ChannelEvent::Other,
            },
        ];
        let before = messages.clone();
        run_tick(&mut pipeline, &mut performers, &mut messages, 10.0);
        assert_eq!(messages, before);
    }

    #[test]
    fn note_off_follows_mapping_even_when_gate_closes() {
        let mut pipeline = Pipeline::new(120.0, 16);
        let mut performers = vec![HitPerformer::new(HitExtractor::new(100, 5))];
        push_hit(&mut performers[0], 20.0); // gate will close

        let mut messages = vec![
            beat_at(0),
            TimedMessage {
                offset_samples: 8,
                event: ChannelEvent::NoteOff {
                    channel: 2,
                    note: 60,
                },
            },
        ];
        run_tick(&mut pipeline, &mut performers, &mut messages, 10.0);
        assert_eq!(
            messages[1].event,
            ChannelEvent::NoteOff {
                channel: 5,
                note: 60
            }
        );
    }

    #[test]
    fn beats_are_stamped_with_their_sample_offset() {
        let mut pipeline: Pipeline = Pipeline::new(120.0, 16);
        let mut performers: Vec<HitPerformer> = Vec::new();

        let mut messages = vec![beat_at(480)]; // 10 ms into the tick at 48 kHz
        pipeline.process_tick(
            &layout(),
            &mut performers,
            &mut messages,
            Timestamp::from_seconds(1.0),
            Duration::from_nanos(20_833),
            |_| (),
        );

        let beat = pipeline.note_history().latest().expect("beat recorded");
        let offset = beat.timestamp.nanos() - Timestamp::from_seconds(1.0).nanos();
        assert_eq!(offset, 480 * 20_833);
    }
}
