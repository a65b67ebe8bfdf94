//! Clock domain and musical timing arithmetic.
//!
//! Every process owns exactly one [`ClockDomain`]; all timestamps flowing
//! through buffers, performers and the matching pipeline are drawn from it.
//! The domain has an adjustable *zero-point*: by default the process start,
//! optionally realigned once from a wall-clock reference so that several
//! processes share a common origin without sharing a clock source.

use std::fmt;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// An opaque, strictly-ordered instant on the process clock.
///
/// Internally signed nanoseconds relative to the clock's zero-point. The
/// value may be negative: a coordinating process can place the common origin
/// *after* another process started.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Construct from raw nanoseconds relative to the zero-point.
    pub fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    /// Construct from seconds relative to the zero-point.
    pub fn from_seconds(seconds: f64) -> Self {
        Self((seconds * 1e9) as i64)
    }

    /// Raw nanoseconds relative to the zero-point.
    pub fn nanos(self) -> i64 {
        self.0
    }

    /// Seconds relative to the zero-point.
    pub fn seconds(self) -> f64 {
        self.0 as f64 / 1e9
    }

    /// The instant `duration` after `self`. Pure and total.
    pub fn after(self, duration: Duration) -> Self {
        Self(self.0.saturating_add(duration.as_nanos() as i64))
    }

    /// The instant `duration` before `self`. Pure and total.
    pub fn before(self, duration: Duration) -> Self {
        Self(self.0.saturating_sub(duration.as_nanos() as i64))
    }

    /// Absolute distance between two timestamps.
    pub fn distance(self, other: Timestamp) -> Duration {
        Duration::from_nanos(self.0.abs_diff(other.0))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

/// Tolerance window derived from a tempo and a note subdivision.
///
/// `(240 / bpm) / note_unit` seconds: at 120 BPM a 16th-note unit yields
/// 0.125 s. Callers must guarantee `bpm > 0` and `note_unit > 0`; the
/// contract is debug-asserted, not checked in release builds.
pub fn tolerance_window(bpm: f64, note_unit: u32) -> Duration {
    debug_assert!(bpm > 0.0, "bpm must be positive");
    debug_assert!(note_unit > 0, "note_unit must be positive");
    Duration::from_secs_f64((240.0 / bpm) / f64::from(note_unit))
}

/// Per-process monotonic clock with an adjustable zero-point.
///
/// The domain captures a monotonic anchor and a wall-clock anchor once, at
/// construction. All later queries are derived from the monotonic anchor
/// only, so [`ClockDomain::now`] never jumps even if the system wall clock
/// is adjusted. The wall anchor exists solely to express the monotonic
/// stream on the shared wall timeline for the cross-process handshake.
///
/// One instance per process, passed by reference to whoever needs time.
#[derive(Debug, Clone)]
pub struct ClockDomain {
    anchor: Instant,
    anchor_wall_nanos: i64,
    zero_wall_nanos: i64,
}

impl ClockDomain {
    /// Create a domain with the zero-point at "now".
    pub fn new() -> Self {
        let anchor = Instant::now();
        let anchor_wall_nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_nanos() as i64);
        Self {
            anchor,
            anchor_wall_nanos,
            zero_wall_nanos: anchor_wall_nanos,
        }
    }

    /// Monotonic nanoseconds since the Unix epoch.
    ///
    /// Wall anchor plus monotonic elapsed time: strictly increasing, immune
    /// to wall-clock adjustments after construction. This is the value a
    /// coordinating process writes into the handshake file.
    pub fn wall_nanos(&self) -> i64 {
        self.anchor_wall_nanos
            .saturating_add(self.anchor.elapsed().as_nanos() as i64)
    }

    /// Current time relative to the zero-point.
    pub fn now(&self) -> Timestamp {
        Timestamp(self.wall_nanos() - self.zero_wall_nanos)
    }

    /// Realign the zero-point to `seconds` on the shared wall timeline.
    ///
    /// A pure reassignment: calling twice with the same input yields the
    /// same `now()` stream, shifted identically. Must be called at most
    /// once, before steady-state processing begins.
    pub fn set_zero_from_reference_seconds(&mut self, seconds: f64) {
        self.zero_wall_nanos = (seconds * 1e9) as i64;
    }

    /// The zero-point expressed on the shared wall timeline, in seconds.
    pub fn zero_reference_seconds(&self) -> f64 {
        self.zero_wall_nanos as f64 / 1e9
    }
}

impl Default for ClockDomain {
    fn default() -> Self {
        Self::new()
    }
}
