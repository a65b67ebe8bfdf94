//! Error types for handshake and channel operations.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in the cross-process sync layer.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Socket or file I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding a state message failed
    #[error("failed to encode state message: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// Decoding a state message failed
    #[error("failed to decode state message: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// The handshake file did not contain two numeric fields
    #[error("malformed handshake file '{path}': {reason}")]
    HandshakeFormat {
        /// Path of the offending file.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// An incoming frame announced an implausible length
    #[error("frame of {len} bytes exceeds the {max}-byte limit")]
    OversizedFrame {
        /// Announced payload length.
        len: usize,
        /// Accepted maximum.
        max: usize,
    },
}

impl SyncError {
    /// Create a handshake-format error.
    pub fn handshake_format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        SyncError::HandshakeFormat {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_format_display_names_the_file() {
        let err = SyncError::handshake_format("/tmp/origin", "expected two fields");
        let msg = err.to_string();
        assert!(msg.contains("/tmp/origin"), "got: {msg}");
        assert!(msg.contains("expected two fields"), "got: {msg}");
    }

    #[test]
    fn oversized_frame_display() {
        let err = SyncError::OversizedFrame { len: 1 << 30, max: 1 << 16 };
        assert!(err.to_string().contains("exceeds"));
    }
}
