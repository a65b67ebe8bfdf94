//! Sensor acquisition thread with cooperative shutdown.
//!
//! Sensor drivers are external collaborators: the engine only requires a
//! blocking [`FrameSource`] it can poll in a loop. The loop checks a stop
//! flag every iteration and the owner joins with a bounded timeout, so a
//! wedged driver can delay shutdown but never hang it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::warn;

use crate::error::EngineError;

/// One raw frame tagged with the sensor identity that produced it: a
/// tracked body index, a drum-pad note. New identities create performers
/// lazily.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceFrame<F> {
    /// Stable identity of the producing source.
    pub identity: u32,
    /// The raw frame.
    pub frame: F,
}

/// A blocking sensor driver the acquisition loop polls.
pub trait FrameSource: Send + 'static {
    /// Raw frame type this driver produces.
    type Frame: Send;

    /// Acquire the next frame. May block briefly (one sensor period);
    /// `Ok(None)` means nothing new this poll. Errors are logged and
    /// polling continues after a short backoff.
    fn poll(&mut self) -> Result<Option<SourceFrame<Self::Frame>>, String>;
}

/// Backoff after a failed poll, so a broken driver does not spin.
const POLL_BACKOFF: Duration = Duration::from_millis(50);

/// How long [`SensorThread::stop`] waits for the loop to exit.
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Owns the acquisition loop thread.
pub struct SensorThread {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SensorThread {
    /// Spawn the loop: poll `source`, hand every frame to `on_frame`.
    ///
    /// `on_frame` runs on the sensor thread; the engine passes a closure
    /// that takes the short-held performer lock and pushes the frame.
    /// Spawn failure is fatal for the owning engine.
    pub fn spawn<S, F>(mut source: S, mut on_frame: F) -> Result<Self, EngineError>
    where
        S: FrameSource,
        F: FnMut(SourceFrame<S::Frame>) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let loop_stop = Arc::clone(&stop);
        let handle = std::thread::Builder::new()
            .name("tactus-sensor".into())
            .spawn(move || {
                while !loop_stop.load(Ordering::Relaxed) {
                    match source.poll() {
                        Ok(Some(frame)) => on_frame(frame),
                        Ok(None) => {}
                        Err(e) => {
                            warn!(error = %e, "sensor poll failed");
                            std::thread::sleep(POLL_BACKOFF);
                        }
                    }
                }
            })
            .map_err(EngineError::SensorThread)?;
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Signal the loop to stop and join it, bounded by a timeout.
    /// Idempotent.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        let Some(handle) = self.handle.take() else {
            return;
        };
        let deadline = std::time::Instant::now() + JOIN_TIMEOUT;
        while !handle.is_finished() {
            if std::time::Instant::now() >= deadline {
                warn!("sensor thread did not stop in time, detaching");
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        if handle.join().is_err() {
            warn!("sensor thread panicked");
        }
    }
}

impl Drop for SensorThread {
    fn drop(&mut self) {
        self.stop();
    }
}
