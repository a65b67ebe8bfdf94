//! Error types for engine assembly.

use thiserror::Error;

/// Errors that can occur while assembling or running an engine.
///
/// Only construction-time problems surface here; steady-state degradations
/// (handshake missing, channel down, empty buffers) are logged and
/// processing continues.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The configuration cannot be run
    #[error("configuration rejected: {0}")]
    Config(#[from] tactus_config::ConfigError),

    /// The sensor thread could not be started. Fatal for the owning
    /// engine, which shuts down cleanly rather than run half-initialized.
    #[error("failed to start sensor thread: {0}")]
    SensorThread(#[source] std::io::Error),

    /// A sync-layer failure during construction
    #[error("sync failure: {0}")]
    Sync(#[from] tactus_sync::SyncError),
}
