//! One-shot clock handshake between cooperating processes.
//!
//! The coordinating process writes a small file before steady state
//! begins: its wall-clock start instant in nanoseconds and a signed offset
//! in seconds. Every other process reads the file at most once and realigns
//! its [`ClockDomain`] zero-point, after which all processes agree on what
//! "time zero" means without ever sharing a clock source.

use std::path::Path;

use tracing::{info, warn};

use tactus_core::ClockDomain;

use crate::error::SyncError;

/// The reference pair written by the coordinating process.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Handshake {
    /// Coordinator's wall-clock start instant, nanoseconds since the Unix
    /// epoch.
    pub origin_wall_nanos: i64,
    /// Signed playback offset in seconds (negative while counting in).
    pub offset_seconds: f64,
}

impl Handshake {
    /// Capture the reference pair from a coordinator's clock.
    pub fn from_clock(clock: &ClockDomain, offset_seconds: f64) -> Self {
        Self {
            origin_wall_nanos: clock.wall_nanos(),
            offset_seconds,
        }
    }

    /// Realign `clock` so its zero-point lands on the shared origin.
    ///
    /// Idempotent: the zero-point is recomputed from the reference alone.
    pub fn apply(&self, clock: &mut ClockDomain) {
        let reference = self.origin_wall_nanos as f64 / 1e9 + self.offset_seconds.abs();
        clock.set_zero_from_reference_seconds(reference);
    }
}

/// Write the handshake file. Called once by the coordinating process,
/// before steady-state processing begins.
pub fn write_handshake(path: impl AsRef<Path>, handshake: &Handshake) -> Result<(), SyncError> {
    let text = format!(
        "{} {}\n",
        handshake.origin_wall_nanos, handshake.offset_seconds
    );
    std::fs::write(path.as_ref(), text)?;
    Ok(())
}

/// Read the handshake file: two whitespace-separated numeric fields.
pub fn read_handshake(path: impl AsRef<Path>) -> Result<Handshake, SyncError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let mut fields = text.split_whitespace();

    let origin = fields
        .next()
        .ok_or_else(|| SyncError::handshake_format(path, "missing origin field"))?;
    let offset = fields
        .next()
        .ok_or_else(|| SyncError::handshake_format(path, "missing offset field"))?;
    if fields.next().is_some() {
        return Err(SyncError::handshake_format(path, "trailing fields"));
    }

    let origin_wall_nanos = origin
        .parse::<i64>()
        .map_err(|e| SyncError::handshake_format(path, format!("origin: {e}")))?;
    let offset_seconds = offset
        .parse::<f64>()
        .map_err(|e| SyncError::handshake_format(path, format!("offset: {e}")))?;

    Ok(Handshake {
        origin_wall_nanos,
        offset_seconds,
    })
}

/// Read the handshake file and realign `clock`, degrading gracefully.
///
/// A missing or corrupt file costs timing accuracy, not the process: the
/// clock keeps its local zero-point and the failure is logged. Returns
/// whether the clock was realigned.
pub fn align_clock(path: impl AsRef<Path>, clock: &mut ClockDomain) -> bool {
    let path = path.as_ref();
    match read_handshake(path) {
        Ok(handshake) => {
            handshake.apply(clock);
            info!(
                origin = handshake.origin_wall_nanos,
                offset = handshake.offset_seconds,
                "clock aligned to shared origin"
            );
            true
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "handshake unavailable, keeping local zero");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("origin");
        let handshake = Handshake {
            origin_wall_nanos: 1_722_000_000_123_456_789,
            offset_seconds: -5.0,
        };
        write_handshake(&path, &handshake).expect("write");
        assert_eq!(read_handshake(&path).expect("read"), handshake);
    }

    #[test]
    fn missing_file_is_an_error_not_a_panic() {
        assert!(read_handshake("/no/such/handshake").is_err());
    }

    #[test]
    fn garbage_is_a_format_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("origin");
        std::fs::write(&path, "not numbers at all").expect("write");
        assert!(matches!(
            read_handshake(&path),
            Err(SyncError::HandshakeFormat { .. })
        ));
    }

    #[test]
    fn one_field_is_a_format_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("origin");
        std::fs::write(&path, "123456789").expect("write");
        assert!(matches!(
            read_handshake(&path),
            Err(SyncError::HandshakeFormat { .. })
        ));
    }

    #[test]
    fn apply_is_idempotent() {
        let mut clock = ClockDomain::new();
        let handshake = Handshake {
            origin_wall_nanos: clock.wall_nanos() - 10_000_000_000,
            offset_seconds: -2.0,
        };
        handshake.apply(&mut clock);
        let zero_first = clock.zero_reference_seconds();
        handshake.apply(&mut clock);
        assert_eq!(clock.zero_reference_seconds(), zero_first);
    }

    #[test]
    fn align_clock_survives_missing_file() {
        let mut clock = ClockDomain::new();
        let before = clock.zero_reference_seconds();
        assert!(!align_clock("/no/such/handshake", &mut clock));
        assert_eq!(clock.zero_reference_seconds(), before);
    }

    #[test]
    fn aligned_clocks_agree_on_the_origin() {
        // Two processes: the coordinator captures its start, a node applies
        // the same reference. Their zero-points coincide exactly.
        let coordinator = ClockDomain::new();
        let handshake = Handshake::from_clock(&coordinator, -5.0);

        let mut node_a = ClockDomain::new();
        let mut node_b = ClockDomain::new();
        handshake.apply(&mut node_a);
        handshake.apply(&mut node_b);
        assert_eq!(
            node_a.zero_reference_seconds(),
            node_b.zero_reference_seconds()
        );
    }
}
