//! Tactus Core - performer-synchronization primitives
//!
//! This crate provides the building blocks of the tactus engine: a
//! per-process clock domain, bounded event buffers, scored performers fed
//! by pluggable sensor-event extraction, and the per-tick matching and
//! gating pipeline that decides who is playing in time.
//!
//! # Core Abstractions
//!
//! ## Time
//!
//! - [`ClockDomain`] - one monotonic clock per process with an adjustable
//!   zero-point, realigned once by the cross-process handshake
//! - [`Timestamp`] - opaque ordered instant with total `after`/`before`
//!   arithmetic
//! - [`tolerance_window`] - tempo plus note subdivision to time span
//!
//! ## Buffers
//!
//! - [`RingBuffer`] - fixed-capacity, overwrite-on-full, edge-triggered
//!   change detection via a version counter and a take-and-clear flag
//! - [`Timestamped`] / [`MatchCandidate`] - capabilities of buffered
//!   records
//!
//! ## Performers
//!
//! - [`Performer`] - one event stream with an unbounded accuracy score,
//!   an audibility gate, and double-count protection per timeline beat
//! - [`ExtractEvents`] - raw frame to discrete events, category-change
//!   gated
//! - [`GestureExtractor`] / [`HitExtractor`] - the motion-capture and
//!   drum-pad strategies
//!
//! ## Matching
//!
//! - [`Pipeline`] - per-tick split/score/gate/reroute over a batch of
//!   [`TimedMessage`]s
//!
//! # Concurrency
//!
//! Nothing in this crate spawns threads or blocks. Buffers follow a
//! single-writer/single-reader discipline; the process-level wiring (a
//! sensor thread writing, the real-time tick reading, IPC threads merging
//! remote state) lives in `tactus-engine`.

mod event;
mod extract;
mod performer;
mod pipeline;
mod ring;
mod time;

pub use event::{BeatEvent, GestureEvent, HitEvent, Pose, Zone};
pub use extract::{BodyFrame, FloorRef, GestureExtractor, HitExtractor, Point, RawHit};
pub use performer::{ExtractEvents, Performer};
pub use pipeline::{
    ChannelEvent, ChannelLayout, NOTE_HISTORY_CAPACITY, Pipeline, TickOutcome, TimedMessage,
};
pub use ring::{MatchCandidate, RingBuffer, Timestamped};
pub use time::{ClockDomain, Timestamp, tolerance_window};
