//! Wire format for performer-state messages.
//!
//! MessagePack-encoded, length-prefixed frames. Every field is an integer
//! or an enum and round-trips exactly; `-1` (or [`Tune::None`]) marks a
//! field the sender has no opinion on, so a merge never clobbers a
//! locally-authoritative value with "unset".

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use tactus_core::Pose;

use crate::error::SyncError;

/// Hard ceiling on an incoming frame's announced payload length. A state
/// bundle is a few hundred bytes; anything near this limit is a corrupt
/// or hostile peer.
pub const MAX_FRAME_BYTES: usize = 64 * 1024;

/// Sentinel for integer fields the sender leaves unset.
pub const UNSET: i32 = -1;

/// Musical key category derived from a dancer's latest arm pose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Tune {
    /// No opinion; never overwrites a merged value.
    #[default]
    None,
    /// Arms high on the left.
    LeftUp,
    /// Arms low on the left.
    LeftDown,
    /// Both arms high.
    MiddleUp,
    /// Both arms low.
    MiddleDown,
    /// Arms high on the right.
    RightUp,
    /// Arms low on the right.
    RightDown,
}

impl From<Pose> for Tune {
    /// Map an arm pose to its key category. Mixed or mid-height poses
    /// carry no opinion.
    fn from(pose: Pose) -> Self {
        if pose == Pose::HIGH_LEFT {
            Tune::LeftUp
        } else if pose == Pose::HIGH_RIGHT {
            Tune::RightUp
        } else if pose == Pose::LOW_LEFT {
            Tune::LeftDown
        } else if pose == Pose::LOW_RIGHT {
            Tune::RightDown
        } else if pose.contains(Pose::HIGH_LEFT | Pose::HIGH_RIGHT) {
            Tune::MiddleUp
        } else if pose.contains(Pose::LOW_LEFT | Pose::LOW_RIGHT) {
            Tune::MiddleDown
        } else {
            Tune::None
        }
    }
}

/// Compact scored state of one performer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformerState {
    /// Running accuracy score; always authoritative from the sender.
    pub accuracy: i64,
    /// Derived key category, [`Tune::None`] when the source has none.
    pub tune: Tune,
    /// Per-channel volumes 0..=127, [`UNSET`] where the sender has no
    /// opinion.
    pub channel_volumes: [i32; 3],
}

impl Default for PerformerState {
    fn default() -> Self {
        Self {
            accuracy: 0,
            tune: Tune::None,
            channel_volumes: [UNSET; 3],
        }
    }
}

impl PerformerState {
    /// Fold `incoming` into `self`, honoring the unset sentinels.
    ///
    /// Accuracy is always taken from the sender; tune and volumes only
    /// when set, preserving locally-authoritative values.
    pub fn merge_from(&mut self, incoming: &PerformerState) {
        self.accuracy = incoming.accuracy;
        if incoming.tune != Tune::None {
            self.tune = incoming.tune;
        }
        for (local, &remote) in self.channel_volumes.iter_mut().zip(&incoming.channel_volumes) {
            if remote != UNSET {
                *local = remote;
            }
        }
    }
}

/// One state message: every performer a process wants to report.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StateBundle {
    /// Per-performer records, in the sender's performer order.
    pub performers: Vec<PerformerState>,
}

impl StateBundle {
    /// Merge `incoming` record-by-record, growing with defaults when the
    /// sender reports more performers than known locally.
    pub fn merge_from(&mut self, incoming: &StateBundle) {
        if self.performers.len() < incoming.performers.len() {
            self.performers
                .resize(incoming.performers.len(), PerformerState::default());
        }
        for (local, remote) in self.performers.iter_mut().zip(&incoming.performers) {
            local.merge_from(remote);
        }
    }
}

/// Encode a bundle into a length-prefixed frame.
pub fn encode_frame(bundle: &StateBundle) -> Result<Vec<u8>, SyncError> {
    let payload = rmp_serde::to_vec(bundle)?;
    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Write one frame to a stream.
pub fn write_frame(writer: &mut impl Write, bundle: &StateBundle) -> Result<(), SyncError> {
    let frame = encode_frame(bundle)?;
    writer.write_all(&frame)?;
    Ok(())
}

/// Read one frame from a stream. Blocks until a full frame arrives;
/// returns an I/O error on disconnect.
pub fn read_frame(reader: &mut impl Read) -> Result<StateBundle, SyncError> {
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;
    let len = u32::from_le_bytes(len_bytes) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(SyncError::OversizedFrame {
            len,
            max: MAX_FRAME_BYTES,
        });
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    Ok(rmp_serde::from_slice(&payload)?)
}
