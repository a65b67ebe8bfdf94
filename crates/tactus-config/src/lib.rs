//! Configuration for the tactus performer-synchronization engine.
//!
//! One TOML file describes a whole process: tempo and matching tolerance,
//! the channel convention tying host messages to performers, per-source
//! sensor tolerances, and the cross-process sync endpoints. Loading and
//! validation are separate steps so a caller can inspect a config it would
//! refuse to run.

mod error;

pub use error::ConfigError;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Tempo and matching-tolerance settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Tempo of the shared timeline in beats per minute.
    pub bpm: f64,
    /// Note subdivision the tolerance window is derived from; 16 means a
    /// sixteenth-note window.
    pub tolerance_note_unit: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            tolerance_note_unit: 16,
        }
    }
}

/// Channel convention for host message batches.
///
/// Messages on `timeline` carry metronome beats; a message on `inputs[i]`
/// belongs to performer `i` and is rerouted to `outputs[i]` while that
/// performer's gate is open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Channel carrying timeline beats.
    pub timeline: u8,
    /// Input channel per performer index.
    pub inputs: Vec<u8>,
    /// Output channel per performer index.
    pub outputs: Vec<u8>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            timeline: 1,
            inputs: vec![2, 3],
            outputs: vec![5, 6],
        }
    }
}

/// Motion-capture classification tolerances, in sensor units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// How far a hand must stray from the shoulder line before its row
    /// changes.
    pub hand_tolerance: f32,
    /// How far a foot must rise above the floor before it counts as
    /// lifted.
    pub foot_tolerance: f32,
    /// Vertical position of the floor reference.
    pub floor_y: f32,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            hand_tolerance: 10.0,
            foot_tolerance: 30.0,
            floor_y: 400.0,
        }
    }
}

/// Drum-pad settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PercussionConfig {
    /// Velocity the performer should aim for.
    pub target_velocity: u8,
    /// Accepted deviation around the target before the velocity score
    /// moves.
    pub velocity_tolerance: u8,
    /// Debounce interval for pad rebounds, in milliseconds.
    pub debounce_ms: u64,
}

impl Default for PercussionConfig {
    fn default() -> Self {
        Self {
            target_velocity: 100,
            velocity_tolerance: 5,
            debounce_ms: 1,
        }
    }
}

/// Cross-process sync endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Path of the Unix-domain socket the coordinator listens on.
    pub socket_path: PathBuf,
    /// Path of the one-shot clock-handshake file.
    pub handshake_path: PathBuf,
    /// Depth of the bounded queue between the real-time tick and the IPC
    /// writer thread.
    pub send_queue_depth: usize,
    /// Signed playback offset in seconds the coordinator writes into the
    /// handshake; negative while counting in.
    pub start_offset_seconds: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from("/tmp/tactus.sock"),
            handshake_path: PathBuf::from("/tmp/tactus-origin"),
            send_queue_depth: 64,
            start_offset_seconds: -5.0,
        }
    }
}

/// Complete configuration of one tactus process.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TactusConfig {
    /// Tempo and tolerance.
    pub timing: TimingConfig,
    /// Channel convention.
    pub channels: ChannelConfig,
    /// Motion-capture tolerances.
    pub motion: MotionConfig,
    /// Drum-pad settings.
    pub percussion: PercussionConfig,
    /// Cross-process endpoints.
    pub sync: SyncConfig,
}

impl TactusConfig {
    /// Load a configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        Ok(toml::from_str(&text)?)
    }

    /// Save the configuration as TOML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let text = toml::to_string_pretty(self)?;
        std::fs::write(path, text).map_err(|e| ConfigError::write_file(path, e))
    }

    /// Check the configuration for values the engine cannot run with.
    ///
    /// The matching pipeline requires `bpm > 0` and a non-zero note unit;
    /// the channel convention must be unambiguous.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timing.bpm.is_nan() || self.timing.bpm <= 0.0 {
            return Err(ConfigError::invalid("timing.bpm", "must be positive"));
        }
        if self.timing.tolerance_note_unit == 0 {
            return Err(ConfigError::invalid(
                "timing.tolerance_note_unit",
                "must be positive",
            ));
        }
        if self.channels.inputs.len() != self.channels.outputs.len() {
            return Err(ConfigError::invalid(
                "channels",
                "inputs and outputs must pair up",
            ));
        }
        let mut seen = self.channels.inputs.clone();
        seen.push(self.channels.timeline);
        seen.sort_unstable();
        let unique = seen.len();
        seen.dedup();
        if seen.len() != unique {
            return Err(ConfigError::invalid(
                "channels",
                "timeline and input channels must be distinct",
            ));
        }
        if self.sync.send_queue_depth == 0 {
            return Err(ConfigError::invalid(
                "sync.send_queue_depth",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}
