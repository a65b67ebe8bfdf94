//! Cross-process synchronization for the tactus engine.
//!
//! Two concerns, both deliberately small:
//!
//! - **Clock handshake**: a coordinating process writes its wall-clock
//!   start instant and a signed offset to a well-known file, once; every
//!   other process reads it at most once and realigns its
//!   [`tactus_core::ClockDomain`] zero-point. See [`Handshake`] and
//!   [`align_clock`].
//! - **State channel**: a named Unix-domain socket carrying length-prefixed
//!   MessagePack frames of [`PerformerState`] records. The coordinator runs
//!   a [`StateServer`] fanning states in and the merged result out;
//!   nodes connect a [`StateClient`]. All blocking I/O lives on dedicated
//!   threads behind bounded queues, so the real-time tick only ever calls
//!   `try_send`/`try_recv`.
//!
//! Both degrade rather than fail: a missing handshake file or a dead
//! channel is logged and processing continues on local state.

mod channel;
mod error;
mod handshake;
mod wire;

pub use channel::{StateClient, StateServer};
pub use error::SyncError;
pub use handshake::{Handshake, align_clock, read_handshake, write_handshake};
pub use wire::{
    MAX_FRAME_BYTES, PerformerState, StateBundle, Tune, UNSET, encode_frame, read_frame,
    write_frame,
};
