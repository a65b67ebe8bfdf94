//! Named bidirectional channel carrying performer-state bundles.
//!
//! The coordinating process runs a [`StateServer`] on a Unix-domain
//! socket; every other process connects a [`StateClient`]. All socket I/O
//! happens on dedicated threads. The real-time side only ever touches
//! bounded queues through `try_send`/`try_recv`, so a slow or dead peer
//! can never stall a tick: a full queue drops the bundle and logs.

use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use tracing::{debug, info, warn};

use crate::error::SyncError;
use crate::wire::{StateBundle, encode_frame, read_frame};

/// Accept-loop poll interval while no client is knocking.
const ACCEPT_POLL: Duration = Duration::from_millis(10);

/// How long shutdown waits for an I/O thread before letting go.
const JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Join `handle` but give up after [`JOIN_TIMEOUT`]; a thread stuck in the
/// kernel must not wedge shutdown.
fn join_with_timeout(handle: JoinHandle<()>, name: &str) {
    let deadline = std::time::Instant::now() + JOIN_TIMEOUT;
    while !handle.is_finished() {
        if std::time::Instant::now() >= deadline {
            warn!(thread = name, "thread did not stop in time, detaching");
            return;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    if handle.join().is_err() {
        warn!(thread = name, "thread panicked");
    }
}

/// Spawn a reader thread that forwards every decoded frame into `tx` until
/// the stream closes. A full queue drops the bundle: state messages are
/// snapshots, the next one supersedes anything lost.
fn spawn_reader(
    mut stream: UnixStream,
    tx: Sender<StateBundle>,
    name: String,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new().name(name.clone()).spawn(move || {
        loop {
            match read_frame(&mut stream) {
                Ok(bundle) => match tx.try_send(bundle) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        warn!(thread = %name, "inbound queue full, dropping state bundle");
                    }
                    Err(TrySendError::Disconnected(_)) => break,
                },
                Err(e) => {
                    debug!(thread = %name, error = %e, "peer stream closed");
                    break;
                }
            }
        }
    })
}

/// The coordinator's end of the channel: fans in bundles from every
/// connected node and fans the merged state back out.
pub struct StateServer {
    stop: Arc<AtomicBool>,
    incoming: Receiver<StateBundle>,
    clients: Arc<Mutex<Vec<UnixStream>>>,
    accept_handle: Option<JoinHandle<()>>,
    socket_path: PathBuf,
}

impl StateServer {
    /// Bind the named socket and start accepting clients.
    ///
    /// A stale socket file from a previous run is removed first.
    pub fn bind(path: impl AsRef<Path>, queue_depth: usize) -> Result<Self, SyncError> {
        let path = path.as_ref();
        let _ = std::fs::remove_file(path);
        let listener = UnixListener::bind(path)?;
        listener.set_nonblocking(true)?;

        let stop = Arc::new(AtomicBool::new(false));
        let (tx, incoming) = crossbeam_channel::bounded(queue_depth);
        let clients: Arc<Mutex<Vec<UnixStream>>> = Arc::new(Mutex::new(Vec::new()));

        let accept_stop = Arc::clone(&stop);
        let accept_clients = Arc::clone(&clients);
        let accept_handle = std::thread::Builder::new()
            .name("tactus-accept".into())
            .spawn(move || {
                let mut next_client = 0usize;
                while !accept_stop.load(Ordering::Relaxed) {
                    match listener.accept() {
                        Ok((stream, _)) => {
                            info!(client = next_client, "state client connected");
                            if let Err(e) = Self::admit(
                                &accept_clients,
                                stream,
                                tx.clone(),
                                next_client,
                            ) {
                                warn!(error = %e, "failed to admit client");
                            }
                            next_client += 1;
                        }
                        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                            std::thread::sleep(ACCEPT_POLL);
                        }
                        Err(e) => {
                            warn!(error = %e, "accept failed");
                            std::thread::sleep(ACCEPT_POLL);
                        }
                    }
                }
            })?;

        Ok(Self {
            stop,
            incoming,
            clients,
            accept_handle: Some(accept_handle),
            socket_path: path.to_path_buf(),
        })
    }

    fn admit(
        clients: &Mutex<Vec<UnixStream>>,
        stream: UnixStream,
        tx: Sender<StateBundle>,
        index: usize,
    ) -> std::io::Result<()> {
        stream.set_nonblocking(false)?;
        let reader = stream.try_clone()?;
        // Reader threads exit on their own when the stream closes; the
        // writer half is kept for broadcasts and shut down on drop.
        spawn_reader(reader, tx, format!("tactus-node-rx-{index}"))?;
        if let Ok(mut guard) = clients.lock() {
            guard.push(stream);
        }
        Ok(())
    }

    /// Next bundle received from any client, if one is queued.
    pub fn try_recv(&self) -> Option<StateBundle> {
        self.incoming.try_recv().ok()
    }

    /// Send `bundle` to every connected client, pruning dead connections.
    /// Returns how many clients received it.
    pub fn broadcast(&self, bundle: &StateBundle) -> Result<usize, SyncError> {
        use std::io::Write;

        let frame = encode_frame(bundle)?;
        let mut delivered = 0usize;
        if let Ok(mut guard) = self.clients.lock() {
            guard.retain_mut(|stream| match stream.write_all(&frame) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(e) => {
                    debug!(error = %e, "dropping dead client");
                    false
                }
            });
        }
        Ok(delivered)
    }

    /// Number of currently connected clients.
    pub fn client_count(&self) -> usize {
        self.clients.lock().map_or(0, |guard| guard.len())
    }

    /// Stop accepting, close every client and remove the socket file.
    /// Idempotent.
    pub fn shutdown(&mut self) {
        if self.stop.swap(true, Ordering::Relaxed) {
            return;
        }
        if let Ok(mut guard) = self.clients.lock() {
            for stream in guard.drain(..) {
                let _ = stream.shutdown(std::net::Shutdown::Both);
            }
        }
        if let Some(handle) = self.accept_handle.take() {
            join_with_timeout(handle, "tactus-accept");
        }
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

impl Drop for StateServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A node's end of the channel: sends its own performer states, receives
/// the merged state fanned out by the coordinator.
pub struct StateClient {
    outgoing: Option<Sender<StateBundle>>,
    incoming: Receiver<StateBundle>,
    stream: UnixStream,
    writer_handle: Option<JoinHandle<()>>,
    reader_handle: Option<JoinHandle<()>>,
}

impl StateClient {
    /// Connect to the coordinator's socket.
    pub fn connect(path: impl AsRef<Path>, queue_depth: usize) -> Result<Self, SyncError> {
        let stream = UnixStream::connect(path.as_ref())?;
        let writer_stream = stream.try_clone()?;
        let reader_stream = stream.try_clone()?;

        let (out_tx, out_rx) = crossbeam_channel::bounded::<StateBundle>(queue_depth);
        let (in_tx, incoming) = crossbeam_channel::bounded(queue_depth);

        // Writer drains the bounded queue; it ends when the sender side is
        // dropped at shutdown or the socket dies.
        let writer_handle = std::thread::Builder::new()
            .name("tactus-ipc-tx".into())
            .spawn(move || {
                let mut writer = writer_stream;
                for bundle in &out_rx {
                    if let Err(e) = crate::wire::write_frame(&mut writer, &bundle) {
                        warn!(error = %e, "state send failed, stopping writer");
                        break;
                    }
                }
            })?;

        let reader_handle = spawn_reader(reader_stream, in_tx, "tactus-ipc-rx".into())?;

        Ok(Self {
            outgoing: Some(out_tx),
            incoming,
            stream,
            writer_handle: Some(writer_handle),
            reader_handle: Some(reader_handle),
        })
    }

    /// Queue a bundle for sending without blocking. Returns `false` when
    /// the queue is full or the connection is gone; either way the caller
    /// carries on.
    pub fn try_send(&self, bundle: StateBundle) -> bool {
        let Some(outgoing) = &self.outgoing else {
            return false;
        };
        match outgoing.try_send(bundle) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("send queue full, dropping state bundle");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                warn!("state channel disconnected");
                false
            }
        }
    }

    /// Next merged bundle from the coordinator, if one is queued.
    pub fn try_recv(&self) -> Option<StateBundle> {
        self.incoming.try_recv().ok()
    }

    /// Close the connection and stop both I/O threads. Idempotent.
    pub fn shutdown(&mut self) {
        // Dropping the sender ends the writer loop once its queue drains.
        self.outgoing.take();
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
        if let Some(handle) = self.writer_handle.take() {
            join_with_timeout(handle, "tactus-ipc-tx");
        }
        if let Some(handle) = self.reader_handle.take() {
            join_with_timeout(handle, "tactus-ipc-rx");
        }
    }
}

impl Drop for StateClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}
