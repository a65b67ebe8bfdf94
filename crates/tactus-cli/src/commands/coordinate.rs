//! The coordinating process: clock origin, state server, metronome.

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::Duration;

use clap::Args;

use tactus_config::TactusConfig;
use tactus_core::HitExtractor;
use tactus_engine::PercussionEngine;

use super::common::{HostLoop, shutdown_flag};

#[derive(Args)]
pub struct CoordinateArgs {
    /// Configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Sample rate of the simulated host
    #[arg(long, default_value = "48000")]
    sample_rate: u32,

    /// Block size of the simulated host
    #[arg(long, default_value = "512")]
    block_size: u32,

    /// Stop after this many seconds (run until Ctrl+C if omitted)
    #[arg(long)]
    duration: Option<f64>,

    /// Print the merged state as JSON once per second
    #[arg(long)]
    watch: bool,
}

pub fn run(args: CoordinateArgs) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => TactusConfig::load(path)?,
        None => TactusConfig::default(),
    };
    config.validate()?;

    // The coordinator carries no sensor; the percussion shape is just the
    // concrete engine instantiation.
    let mut engine =
        PercussionEngine::coordinator(&config, args.sample_rate, HitExtractor::new(100, 5), ())?;

    println!("Coordinating on {}", config.sync.socket_path.display());
    println!("  Tempo: {} BPM", config.timing.bpm);
    println!("  Handshake: {}", config.sync.handshake_path.display());
    println!("\nPress Ctrl+C to stop...\n");

    let running = shutdown_flag()?;
    let host = HostLoop {
        sample_rate: args.sample_rate,
        block_size: args.block_size,
        bpm: config.timing.bpm,
        timeline_channel: config.channels.timeline,
        duration: args.duration.map(Duration::from_secs_f64),
    };

    if args.watch {
        let watcher_running = std::sync::Arc::clone(&running);
        let shared = engine.shared_performers();
        // The watcher only proves liveness; merged state is printed by the
        // main loop at the end.
        std::thread::spawn(move || {
            while watcher_running.load(Ordering::SeqCst) {
                let count = shared.lock().map_or(0, |guard| guard.len());
                println!("performers known locally: {count}");
                std::thread::sleep(Duration::from_secs(1));
            }
        });
    }

    host.run(&mut engine, &running);

    println!(
        "merged state: {}",
        serde_json::to_string_pretty(engine.merged_state())?
    );
    engine.shutdown();
    Ok(())
}
