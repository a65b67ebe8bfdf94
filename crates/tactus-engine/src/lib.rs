//! Process-level assembly for the tactus engine.
//!
//! This crate wires the pieces of `tactus-core` and `tactus-sync` into one
//! running process with the three concurrency domains the design calls
//! for:
//!
//! - a **sensor thread** ([`SensorThread`]) polling a blocking
//!   [`FrameSource`] and writing performer buffers through a short-held
//!   mutex, with a cooperative stop flag and bounded join;
//! - the **real-time tick** ([`SyncEngine::process_tick`]), the host
//!   callback entry point - it takes the performer lock briefly, runs the
//!   matching pipeline, and hands state to the channel with a
//!   non-blocking `try_send`;
//! - the **IPC threads** owned by `tactus-sync`, delivering remote state
//!   through bounded queues folded in at the start of each tick.
//!
//! Failure scoping follows the design taxonomy: configuration problems
//! and sensor-spawn failure are fail-fast [`EngineError`]s (the engine
//! shuts down cleanly); a missing handshake or an unreachable coordinator
//! degrades to offline operation with a warning; nothing here terminates
//! the host process.

mod engine;
mod error;
mod sensor;

pub use engine::{
    MotionEngine, PercussionEngine, PerformerSet, ReportState, SyncEngine, SyncRole, TickReport,
};
pub use error::EngineError;
pub use sensor::{FrameSource, SensorThread, SourceFrame};
