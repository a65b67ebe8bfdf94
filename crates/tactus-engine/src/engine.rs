//! Process-level engine: performers, pipeline, sensor thread and sync
//! wiring behind one tick entry point.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{info, warn};

use tactus_config::TactusConfig;
use tactus_core::{
    ChannelLayout, ClockDomain, ExtractEvents, GestureExtractor, HitExtractor, MatchCandidate,
    Performer, Pipeline, TimedMessage,
};
use tactus_sync::{
    Handshake, PerformerState, StateBundle, StateClient, StateServer, Tune, UNSET, align_clock,
    write_handshake,
};

use crate::error::EngineError;
use crate::sensor::{FrameSource, SensorThread, SourceFrame};

/// Source-specific state a performer contributes to the wire bundle.
pub trait ReportState: ExtractEvents + Sized {
    /// Snapshot one performer for sending.
    fn report<const N: usize>(performer: &Performer<Self, N>) -> PerformerState;
}

impl ReportState for GestureExtractor {
    /// Dancers report their key category from the latest arm pose.
    fn report<const N: usize>(performer: &Performer<Self, N>) -> PerformerState {
        PerformerState {
            accuracy: performer.accuracy(),
            tune: Tune::from(performer.events().latest_arm_pose()),
            channel_volumes: [UNSET; 3],
        }
    }
}

impl ReportState for HitExtractor {
    /// Drummers report their rolling average velocity on the percussion
    /// volume slot.
    fn report<const N: usize>(performer: &Performer<Self, N>) -> PerformerState {
        PerformerState {
            accuracy: performer.accuracy(),
            tune: Tune::None,
            channel_volumes: [UNSET, UNSET, performer.extractor().average_velocity()],
        }
    }
}

/// The performers of one process, created lazily as sensor identities
/// appear (a newly tracked body, a first strike on an unknown pad).
pub struct PerformerSet<X: ExtractEvents, const N: usize> {
    performers: Vec<Performer<X, N>>,
    identities: HashMap<u32, usize>,
    template: X,
}

impl<X: ExtractEvents, const N: usize> PerformerSet<X, N> {
    /// Create an empty set; new performers clone `template`.
    pub fn new(template: X) -> Self {
        Self {
            performers: Vec::new(),
            identities: HashMap::new(),
            template,
        }
    }

    /// Performers created so far, in creation order.
    pub fn performers(&self) -> &[Performer<X, N>] {
        &self.performers
    }

    /// Mutable view for the matching pipeline.
    pub fn performers_mut(&mut self) -> &mut [Performer<X, N>] {
        &mut self.performers
    }

    /// Number of performers created so far.
    pub fn len(&self) -> usize {
        self.performers.len()
    }

    /// Whether any sensor identity has appeared yet.
    pub fn is_empty(&self) -> bool {
        self.performers.is_empty()
    }
}

impl<X: ExtractEvents + Clone, const N: usize> PerformerSet<X, N> {
    /// Index of the performer owning `identity`, creating it on first
    /// sight.
    pub fn index_for(&mut self, identity: u32) -> usize {
        if let Some(&index) = self.identities.get(&identity) {
            return index;
        }
        let index = self.performers.len();
        info!(identity, index, "new performer");
        let mut performer = Performer::new(self.template.clone());
        performer.activate();
        self.performers.push(performer);
        self.identities.insert(identity, index);
        index
    }

    /// Route one raw frame to its performer.
    pub fn push_frame(&mut self, identity: u32, frame: &X::Frame, context: &X::Context) {
        let index = self.index_for(identity);
        self.performers[index].push_frame(frame, context);
    }
}

/// Which end of the state channel this process holds.
pub enum SyncRole {
    /// Runs the server, merges every node's states, fans the result out.
    Coordinator(StateServer),
    /// Sends own states, applies the merged state received back.
    Node(StateClient),
    /// No channel; purely local operation after a degraded setup.
    Offline,
}

impl SyncRole {
    fn shutdown(&mut self) {
        match self {
            SyncRole::Coordinator(server) => server.shutdown(),
            SyncRole::Node(client) => client.shutdown(),
            SyncRole::Offline => {}
        }
    }
}

/// What one engine tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickReport {
    /// Performers that matched the beat this tick.
    pub matched: usize,
    /// Performers that missed the beat this tick.
    pub missed: usize,
    /// Peers the resulting state reached (queue or broadcast).
    pub delivered: usize,
}

/// One process's synchronization engine.
///
/// Owns the clock domain, the matching pipeline, the performer set shared
/// with the sensor thread behind a short-held mutex, and the sync role.
/// [`SyncEngine::process_tick`] is the host-callback entry point; it never
/// blocks on I/O.
pub struct SyncEngine<X: ExtractEvents, const N: usize> {
    clock: ClockDomain,
    pipeline: Pipeline,
    layout: ChannelLayout,
    performers: Arc<Mutex<PerformerSet<X, N>>>,
    context: X::Context,
    role: SyncRole,
    merged: StateBundle,
    sensor: Option<SensorThread>,
    sample_duration: Duration,
    stopped: AtomicBool,
}

/// Motion-capture engine: dancers with 200-event gesture buffers.
pub type MotionEngine = SyncEngine<GestureExtractor, 200>;

/// Percussion engine: drum pads with ten-hit buffers.
pub type PercussionEngine = SyncEngine<HitExtractor, 10>;

impl<X, const N: usize> SyncEngine<X, N>
where
    X: ExtractEvents + Clone,
    X::Event: MatchCandidate,
{
    /// Assemble the coordinating process: write the clock handshake, bind
    /// the state server. A server that cannot bind degrades to offline
    /// operation with a warning; an invalid configuration is refused.
    pub fn coordinator(
        config: &TactusConfig,
        sample_rate: u32,
        template: X,
        context: X::Context,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let clock = ClockDomain::new();
        let handshake = Handshake::from_clock(&clock, config.sync.start_offset_seconds);
        if let Err(e) = write_handshake(&config.sync.handshake_path, &handshake) {
            warn!(error = %e, "could not write handshake file");
        }
        let role = match StateServer::bind(&config.sync.socket_path, config.sync.send_queue_depth)
        {
            Ok(server) => SyncRole::Coordinator(server),
            Err(e) => {
                warn!(error = %e, "state server unavailable, running offline");
                SyncRole::Offline
            }
        };
        Ok(Self::assemble(config, clock, role, sample_rate, template, context))
    }

    /// Assemble a sensor node: align the clock from the handshake file,
    /// connect to the coordinator. Both degrade gracefully when the
    /// coordinator has not started yet.
    pub fn node(
        config: &TactusConfig,
        sample_rate: u32,
        template: X,
        context: X::Context,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let mut clock = ClockDomain::new();
        align_clock(&config.sync.handshake_path, &mut clock);
        let role = match StateClient::connect(&config.sync.socket_path, config.sync.send_queue_depth)
        {
            Ok(client) => SyncRole::Node(client),
            Err(e) => {
                warn!(error = %e, "coordinator unreachable, running offline");
                SyncRole::Offline
            }
        };
        Ok(Self::assemble(config, clock, role, sample_rate, template, context))
    }

    fn assemble(
        config: &TactusConfig,
        clock: ClockDomain,
        role: SyncRole,
        sample_rate: u32,
        template: X,
        context: X::Context,
    ) -> Self {
        Self {
            clock,
            pipeline: Pipeline::new(config.timing.bpm, config.timing.tolerance_note_unit),
            layout: ChannelLayout {
                timeline: config.channels.timeline,
                inputs: config.channels.inputs.clone(),
                outputs: config.channels.outputs.clone(),
            },
            performers: Arc::new(Mutex::new(PerformerSet::new(template))),
            context,
            role,
            merged: StateBundle::default(),
            sensor: None,
            sample_duration: Duration::from_secs_f64(1.0 / f64::from(sample_rate)),
            stopped: AtomicBool::new(false),
        }
    }

    /// Run one real-time tick over the host's message batch.
    ///
    /// Folds in any state the IPC threads delivered, runs the matching
    /// pipeline under the short-held performer lock, then hands the
    /// resulting snapshot to the channel without blocking.
    pub fn process_tick(&mut self, messages: &mut Vec<TimedMessage>) -> TickReport
    where
        X: ReportState,
    {
        let mut received_any = false;
        match &self.role {
            SyncRole::Coordinator(server) => {
                while let Some(bundle) = server.try_recv() {
                    self.merged.merge_from(&bundle);
                    received_any = true;
                }
            }
            SyncRole::Node(client) => {
                while let Some(bundle) = client.try_recv() {
                    self.merged.merge_from(&bundle);
                    received_any = true;
                }
            }
            SyncRole::Offline => {}
        }

        let tick_start = self.clock.now();
        let outcome = {
            let mut guard = self
                .performers
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            self.pipeline.process_tick(
                &self.layout,
                guard.performers_mut(),
                messages,
                tick_start,
                self.sample_duration,
                |p| X::report(p),
            )
        };

        let mut delivered = 0;
        let evaluated = outcome.evaluated();
        if evaluated || received_any {
            match &self.role {
                SyncRole::Node(client) if evaluated => {
                    let bundle = StateBundle {
                        performers: outcome.states,
                    };
                    if client.try_send(bundle) {
                        delivered = 1;
                    }
                }
                SyncRole::Coordinator(server) => {
                    if evaluated {
                        self.merged.merge_from(&StateBundle {
                            performers: outcome.states,
                        });
                    }
                    match server.broadcast(&self.merged) {
                        Ok(count) => delivered = count,
                        Err(e) => warn!(error = %e, "broadcast failed"),
                    }
                }
                _ => {}
            }
        }

        TickReport {
            matched: outcome.matched,
            missed: outcome.missed,
            delivered,
        }
    }

    /// Start the sensor acquisition loop feeding this engine's performers.
    ///
    /// Spawn failure is fatal for this engine: it shuts itself down cleanly
    /// and returns the error rather than run half-initialized.
    pub fn attach_sensor<S>(&mut self, source: S) -> Result<(), EngineError>
    where
        S: FrameSource<Frame = X::Frame>,
        X: Send + 'static,
        X::Event: Send + 'static,
        X::Context: Clone + Send + 'static,
    {
        let performers = Arc::clone(&self.performers);
        let context = self.context.clone();
        match SensorThread::spawn(source, move |sf: SourceFrame<X::Frame>| {
            let mut guard = performers.lock().unwrap_or_else(PoisonError::into_inner);
            guard.push_frame(sf.identity, &sf.frame, &context);
        }) {
            Ok(thread) => {
                self.sensor = Some(thread);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "sensor start failed, shutting engine down");
                self.shutdown();
                Err(e)
            }
        }
    }
}

impl<X: ExtractEvents, const N: usize> SyncEngine<X, N> {
    /// The engine's clock domain.
    pub fn clock(&self) -> &ClockDomain {
        &self.clock
    }

    /// The merged cross-process state as of the last tick.
    pub fn merged_state(&self) -> &StateBundle {
        &self.merged
    }

    /// Shared handle to the performer set (display, tests).
    pub fn shared_performers(&self) -> Arc<Mutex<PerformerSet<X, N>>> {
        Arc::clone(&self.performers)
    }

    /// Stop the sensor loop and close the channel. Idempotent; also runs
    /// on drop.
    pub fn shutdown(&mut self) {
        if self.stopped.swap(true, Ordering::Relaxed) {
            return;
        }
        if let Some(mut sensor) = self.sensor.take() {
            sensor.stop();
        }
        self.role.shutdown();
        info!("engine shut down");
    }
}

impl<X: ExtractEvents, const N: usize> Drop for SyncEngine<X, N> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
