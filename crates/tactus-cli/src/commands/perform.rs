//! A sensor node: simulated performer, matching, state reporting.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, ValueEnum};

use tactus_config::TactusConfig;
use tactus_core::{FloorRef, GestureExtractor, HitExtractor};
use tactus_engine::{MotionEngine, PercussionEngine};

use super::common::{HostLoop, shutdown_flag};
use crate::sim::{SimulatedDancer, SimulatedDrummer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SourceKind {
    /// Motion-capture dancer
    Motion,
    /// Drum pad
    Percussion,
}

#[derive(Args)]
pub struct PerformArgs {
    /// Configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Which simulated sensor to run
    #[arg(short, long, value_enum, default_value_t = SourceKind::Percussion)]
    source: SourceKind,

    /// Sample rate of the simulated host
    #[arg(long, default_value = "48000")]
    sample_rate: u32,

    /// Block size of the simulated host
    #[arg(long, default_value = "512")]
    block_size: u32,

    /// Stop after this many seconds (run until Ctrl+C if omitted)
    #[arg(long)]
    duration: Option<f64>,
}

pub fn run(args: PerformArgs) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => TactusConfig::load(path)?,
        None => TactusConfig::default(),
    };
    config.validate()?;

    println!("Performing as {:?}", args.source);
    println!("  Coordinator: {}", config.sync.socket_path.display());
    println!("  Tempo: {} BPM", config.timing.bpm);
    println!("\nPress Ctrl+C to stop...\n");

    let running = shutdown_flag()?;
    let host = HostLoop {
        sample_rate: args.sample_rate,
        block_size: args.block_size,
        bpm: config.timing.bpm,
        timeline_channel: config.channels.timeline,
        duration: args.duration.map(Duration::from_secs_f64),
    };

    match args.source {
        SourceKind::Percussion => {
            let extractor = HitExtractor::with_debounce(
                config.percussion.target_velocity,
                config.percussion.velocity_tolerance,
                Duration::from_millis(config.percussion.debounce_ms),
            );
            let mut engine = PercussionEngine::node(&config, args.sample_rate, extractor, ())?;
            engine.attach_sensor(SimulatedDrummer::new(
                engine.clock().clone(),
                config.timing.bpm,
            ))?;

            let totals = host.run(&mut engine, &running);
            println!(
                "matched {} / missed {} beats",
                totals.matched, totals.missed
            );
            let shared = engine.shared_performers();
            if let Ok(guard) = shared.lock() {
                for (index, performer) in guard.performers().iter().enumerate() {
                    println!(
                        "performer {index}: accuracy {}, avg velocity {}",
                        performer.accuracy(),
                        performer.extractor().average_velocity()
                    );
                }
            }
            engine.shutdown();
        }
        SourceKind::Motion => {
            let extractor = GestureExtractor::new(
                config.motion.hand_tolerance,
                config.motion.foot_tolerance,
            );
            let floor = FloorRef {
                y: config.motion.floor_y,
            };
            let mut engine = MotionEngine::node(&config, args.sample_rate, extractor, floor)?;
            engine.attach_sensor(SimulatedDancer::new(
                engine.clock().clone(),
                config.timing.bpm,
                config.motion.floor_y,
            ))?;

            let totals = host.run(&mut engine, &running);
            println!(
                "matched {} / missed {} beats",
                totals.matched, totals.missed
            );
            let shared = engine.shared_performers();
            if let Ok(guard) = shared.lock() {
                for (index, performer) in guard.performers().iter().enumerate() {
                    println!(
                        "performer {index}: accuracy {}, volume factor {:.2}",
                        performer.accuracy(),
                        performer.extractor().volume_factor()
                    );
                }
            }
            engine.shutdown();
        }
    }
    Ok(())
}
