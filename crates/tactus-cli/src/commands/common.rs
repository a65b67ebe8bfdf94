//! Shared tick-loop driver for the coordinator and node commands.
//!
//! The real deployment embeds the engine in an audio host whose callback
//! delivers one message batch per block. The CLI stands in for that host:
//! a paced loop that synthesizes metronome beats on the timeline channel
//! and hands each batch to [`SyncEngine::process_tick`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::debug;

use tactus_engine::{ReportState, SyncEngine, TickReport};
use tactus_core::{ChannelEvent, ExtractEvents, MatchCandidate, Timestamp, TimedMessage};

/// Note number the metronome ticks with.
pub const METRONOME_NOTE: u8 = 61;

/// Install a Ctrl+C handler that clears the returned flag.
pub fn shutdown_flag() -> anyhow::Result<Arc<AtomicBool>> {
    let running = Arc::new(AtomicBool::new(true));
    let handle = Arc::clone(&running);
    ctrlc::set_handler(move || {
        println!("\nStopping...");
        handle.store(false, Ordering::SeqCst);
    })?;
    Ok(running)
}

/// Pacing and metronome parameters of the simulated host.
pub struct HostLoop {
    /// Samples per second of the simulated host.
    pub sample_rate: u32,
    /// Samples per processing block.
    pub block_size: u32,
    /// Tempo of the metronome written onto the timeline channel.
    pub bpm: f64,
    /// Channel carrying the metronome.
    pub timeline_channel: u8,
    /// Stop after this long, if set.
    pub duration: Option<Duration>,
}

impl HostLoop {
    /// Drive `engine` tick by tick until the flag clears or the duration
    /// elapses. Returns the accumulated report.
    pub fn run<X, const N: usize>(
        &self,
        engine: &mut SyncEngine<X, N>,
        running: &AtomicBool,
    ) -> TickReport
    where
        X: ExtractEvents + Clone + ReportState,
        X::Event: MatchCandidate,
    {
        let block_duration =
            Duration::from_secs_f64(f64::from(self.block_size) / f64::from(self.sample_rate));
        let sample_nanos = 1_000_000_000 / i64::from(self.sample_rate);
        let beat_period = Duration::from_secs_f64(60.0 / self.bpm);

        let started = engine.clock().now();
        let mut next_beat = first_beat_after(started, beat_period);
        let mut totals = TickReport::default();

        while running.load(Ordering::SeqCst) {
            let block_start = engine.clock().now();
            if let Some(limit) = self.duration
                && block_start.nanos() - started.nanos() >= limit.as_nanos() as i64
            {
                break;
            }
            let block_end = block_start.after(block_duration);

            let mut messages = Vec::new();
            while next_beat < block_end {
                let offset = (next_beat.nanos() - block_start.nanos()).max(0) / sample_nanos;
                messages.push(TimedMessage {
                    offset_samples: offset as u32,
                    event: ChannelEvent::NoteOn {
                        channel: self.timeline_channel,
                        note: METRONOME_NOTE,
                        velocity: 100,
                    },
                });
                next_beat = next_beat.after(beat_period);
            }

            let report = engine.process_tick(&mut messages);
            if report.matched + report.missed > 0 {
                debug!(
                    matched = report.matched,
                    missed = report.missed,
                    delivered = report.delivered,
                    "tick"
                );
            }
            totals.matched += report.matched;
            totals.missed += report.missed;
            totals.delivered += report.delivered;

            std::thread::sleep(block_duration);
        }
        totals
    }
}

/// The first whole-beat instant at or after `t` (beats lie on multiples of
/// the period from the clock zero, so every aligned process agrees on
/// them).
fn first_beat_after(t: Timestamp, period: Duration) -> Timestamp {
    let period_nanos = period.as_nanos() as i64;
    let beats_done = t.nanos().div_euclid(period_nanos);
    Timestamp::from_nanos((beats_done + 1) * period_nanos)
}
