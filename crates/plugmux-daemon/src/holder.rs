//! Per-plugin stdio holder
//!
//! A [`StdioHolder`] fronts one plugin child process. It owns the child's
//! three byte streams, demultiplexes the stdout event protocol to session
//! listeners, collects stderr into a rolling window, and tracks liveness
//! through heartbeat events. All failure paths converge on [`StdioHolder::stop`],
//! which is idempotent.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Instant};

use plugmux_core::prelude::*;
use plugmux_core::{EventKind, PluginEvent};

use crate::registry::{invoke_contained, PluginRegistry};
use crate::ring::ErrorRing;

/// How often the liveness waiter rechecks the heartbeat clock.
pub const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Stdout inactivity after which [`StdioHolder::wait`] declares the plugin dead.
///
/// Four polling periods, so a single missed heartbeat does not trip the deadline.
pub const INACTIVITY_DEADLINE: Duration = Duration::from_secs(20);

/// Per-iteration stderr read buffer size.
const STDERR_BUF_LEN: usize = 1024;

/// Queue depth for pending stdin writes.
const STDIN_QUEUE_LEN: usize = 32;

/// Callback receiving the raw `data` blob of a session or error event.
pub type SessionCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;

type PluginStdin = Box<dyn AsyncWrite + Send + Unpin>;

/// Per-holder listener maps, mutated only under the holder's mutex.
#[derive(Default)]
struct ListenerMaps {
    session: HashMap<String, SessionCallback>,
    error: HashMap<String, SessionCallback>,
}

/// Owns one plugin child's stdio streams and the tasks draining them.
///
/// Created through [`PluginRegistry::register`]; the spawn path then calls
/// [`start`](Self::start) with the child's streams. Any exit of the stdout
/// demultiplexer -- EOF, read error, or an explicit [`stop`](Self::stop) --
/// tears the holder down and unblocks every waiter exactly once.
pub struct StdioHolder {
    id: String,
    plugin_identity: String,

    stdin_tx: mpsc::Sender<Vec<u8>>,
    stdin_rx: Mutex<Option<mpsc::Receiver<Vec<u8>>>>,

    listeners: Mutex<ListenerMaps>,
    ring: Mutex<ErrorRing>,

    started: AtomicBool,
    last_active_at: Mutex<Instant>,

    // Single-shot termination signal: flipped to true at most once, under
    // the `shutdown_closed` mutex.
    shutdown_tx: watch::Sender<bool>,
    shutdown_closed: Mutex<bool>,

    registry: Weak<PluginRegistry>,
    weak_self: Weak<StdioHolder>,
}

impl std::fmt::Debug for StdioHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioHolder")
            .field("id", &self.id)
            .field("plugin_identity", &self.plugin_identity)
            .field("started", &self.started.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl StdioHolder {
    pub(crate) fn new(
        id: String,
        plugin_identity: String,
        registry: Weak<PluginRegistry>,
    ) -> Arc<Self> {
        let (stdin_tx, stdin_rx) = mpsc::channel(STDIN_QUEUE_LEN);
        let (shutdown_tx, _) = watch::channel(false);

        Arc::new_cyclic(|weak_self| Self {
            id,
            plugin_identity,
            stdin_tx,
            stdin_rx: Mutex::new(Some(stdin_rx)),
            listeners: Mutex::new(ListenerMaps::default()),
            ring: Mutex::new(ErrorRing::new()),
            started: AtomicBool::new(false),
            last_active_at: Mutex::new(Instant::now()),
            shutdown_tx,
            shutdown_closed: Mutex::new(false),
            registry,
            weak_self: weak_self.clone(),
        })
    }

    /// Opaque holder id, unique within the registry.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Plugin identity string, used only for diagnostics.
    pub fn plugin_identity(&self) -> &str {
        &self.plugin_identity
    }

    /// Whether the stdout demultiplexer has begun running.
    pub fn started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    // ─────────────────────────────────────────────────────────
    // Startup
    // ─────────────────────────────────────────────────────────

    /// Spawn the demultiplexer and collector tasks over the child's streams.
    ///
    /// The stdout task owns teardown from here on: when it exits, the holder
    /// stops. Calling `start` a second time is a logged no-op.
    pub fn start(
        &self,
        stdin: impl AsyncWrite + Send + Unpin + 'static,
        stdout: impl AsyncRead + Send + Unpin + 'static,
        stderr: impl AsyncRead + Send + Unpin + 'static,
    ) {
        let stdin_rx = self.stdin_rx.lock().unwrap().take();
        let Some(stdin_rx) = stdin_rx else {
            warn!("holder {} already started", self.id);
            return;
        };
        // Holders only exist behind an Arc, so the upgrade cannot fail here.
        let Some(this) = self.weak_self.upgrade() else {
            return;
        };

        tokio::spawn(Self::stdin_writer(
            self.plugin_identity.clone(),
            Box::new(stdin) as PluginStdin,
            stdin_rx,
            self.shutdown_tx.subscribe(),
        ));
        tokio::spawn(this.clone().run_stdout(stdout));
        tokio::spawn(this.run_stderr(stderr));
    }

    // ─────────────────────────────────────────────────────────
    // Stdout demultiplexer
    // ─────────────────────────────────────────────────────────

    /// Read stdout line-by-line and dispatch each decoded envelope.
    ///
    /// Per-line decode failures never propagate; the only exit conditions
    /// are stream closure, a scanner failure, or the termination signal.
    async fn run_stdout(self: Arc<Self>, stdout: impl AsyncRead + Send + Unpin) {
        self.started.store(true, Ordering::SeqCst);

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut lines = BufReader::new(stdout).lines();

        loop {
            tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(line)) => self.dispatch_line(&line),
                    Ok(None) => {
                        debug!("plugin {}: stdout closed", self.plugin_identity);
                        break;
                    }
                    Err(e) => {
                        warn!("plugin {}: stdout read failed: {}", self.plugin_identity, e);
                        break;
                    }
                },
                _ = shutdown_rx.wait_for(|stopped| *stopped) => break,
            }
        }

        self.stop();
    }

    fn dispatch_line(&self, line: &str) {
        let Some(event) = PluginEvent::parse(line) else {
            return;
        };

        match event.event {
            EventKind::Log => match event.log_payload() {
                Ok(payload) => {
                    info!("plugin {}: {}", self.plugin_identity, payload.message);
                }
                Err(e) => {
                    warn!(
                        "plugin {}: undecodable log payload: {}",
                        self.plugin_identity, e
                    );
                }
            },
            EventKind::Session => self.dispatch_session(&event),
            EventKind::Error => {
                error!("plugin {}: {}", self.plugin_identity, event.data_str());
            }
            EventKind::Heartbeat => {
                *self.last_active_at.lock().unwrap() = Instant::now();
            }
            EventKind::Unknown => {}
        }
    }

    /// Fan a `session` event out to broadcast listeners, then to the session
    /// listener registered under the envelope's session id.
    fn dispatch_session(&self, event: &PluginEvent) {
        let data = event.data_bytes();

        if let Some(registry) = self.registry.upgrade() {
            registry.dispatch_broadcast(&self.id, data);
        }

        // Snapshot the callback under the lock, invoke outside it: a listener
        // that registers another listener must not deadlock.
        let listener = {
            let maps = self.listeners.lock().unwrap();
            maps.session.get(&event.session_id).cloned()
        };
        if let Some(callback) = listener {
            invoke_contained("session listener", &self.plugin_identity, || {
                callback(data)
            });
        }
    }

    // ─────────────────────────────────────────────────────────
    // Stderr collector
    // ─────────────────────────────────────────────────────────

    /// Stream stderr into the error ring, one newline-terminated chunk per read.
    ///
    /// Any read error ends capture for the rest of the child's life; stderr
    /// closure in practice coincides with child exit, which also terminates
    /// the stdout task.
    async fn run_stderr(self: Arc<Self>, mut stderr: impl AsyncRead + Send + Unpin) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            let mut buf = [0u8; STDERR_BUF_LEN];
            tokio::select! {
                read = stderr.read(&mut buf) => match read {
                    Ok(0) => break,
                    Ok(n) => self.record_stderr(&buf[..n]),
                    Err(e) => {
                        debug!("plugin {}: stderr read failed: {}", self.plugin_identity, e);
                        break;
                    }
                },
                _ = shutdown_rx.wait_for(|stopped| *stopped) => break,
            }
        }
    }

    fn record_stderr(&self, bytes: &[u8]) {
        let mut chunk = Vec::with_capacity(bytes.len() + 1);
        chunk.extend_from_slice(bytes);
        chunk.push(b'\n');
        self.ring.lock().unwrap().append(&chunk);
    }

    // ─────────────────────────────────────────────────────────
    // Stdin writer
    // ─────────────────────────────────────────────────────────

    async fn stdin_writer(
        plugin_identity: String,
        mut stdin: PluginStdin,
        mut rx: mpsc::Receiver<Vec<u8>>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                msg = rx.recv() => match msg {
                    Some(data) => {
                        if let Err(e) = stdin.write_all(&data).await {
                            error!("plugin {}: stdin write failed: {}", plugin_identity, e);
                            break;
                        }
                        if let Err(e) = stdin.flush().await {
                            error!("plugin {}: stdin flush failed: {}", plugin_identity, e);
                            break;
                        }
                    }
                    None => break,
                },
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
    }

    /// Queue bytes for the plugin's stdin.
    ///
    /// The payload is written verbatim: caller-supplied boundaries are
    /// preserved and nothing is appended.
    pub async fn write(&self, data: Vec<u8>) -> Result<()> {
        self.stdin_tx
            .send(data)
            .await
            .map_err(|_| Error::channel_send("plugin stdin"))
    }

    // ─────────────────────────────────────────────────────────
    // Listener registration
    // ─────────────────────────────────────────────────────────

    /// Register the callback receiving `session` events addressed to `session_id`.
    pub fn register_session_listener(
        &self,
        session_id: impl Into<String>,
        callback: impl Fn(&[u8]) + Send + Sync + 'static,
    ) {
        let mut maps = self.listeners.lock().unwrap();
        maps.session.insert(session_id.into(), Arc::new(callback));
    }

    pub fn unregister_session_listener(&self, session_id: &str) {
        self.listeners.lock().unwrap().session.remove(session_id);
    }

    /// Register the error callback held for `session_id`.
    ///
    /// The demultiplexer itself does not dispatch to error listeners;
    /// `error` events are logged only. The map is maintained for higher
    /// layers addressing sessions through the registry.
    pub fn register_error_listener(
        &self,
        session_id: impl Into<String>,
        callback: impl Fn(&[u8]) + Send + Sync + 'static,
    ) {
        let mut maps = self.listeners.lock().unwrap();
        maps.error.insert(session_id.into(), Arc::new(callback));
    }

    pub fn unregister_error_listener(&self, session_id: &str) {
        self.listeners.lock().unwrap().error.remove(session_id);
    }

    // ─────────────────────────────────────────────────────────
    // Liveness
    // ─────────────────────────────────────────────────────────

    /// Block until the holder terminates or the plugin goes inactive.
    ///
    /// Rechecks the heartbeat clock every [`HEALTH_POLL_INTERVAL`]; returns
    /// [`Error::PluginNotActive`] once more than [`INACTIVITY_DEADLINE`] has
    /// passed since the last heartbeat. On orderly termination, returns
    /// whatever the stderr ring currently reports (possibly nothing).
    /// Calling after termination yields [`Error::HealthNotArmed`].
    pub async fn wait(&self) -> Result<()> {
        let mut shutdown_rx = {
            let closed = self.shutdown_closed.lock().unwrap();
            if *closed {
                return Err(Error::HealthNotArmed);
            }
            self.shutdown_tx.subscribe()
        };

        let mut ticker = interval_at(
            Instant::now() + HEALTH_POLL_INTERVAL,
            HEALTH_POLL_INTERVAL,
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let last_active = *self.last_active_at.lock().unwrap();
                    if last_active.elapsed() > INACTIVITY_DEADLINE {
                        return Err(Error::PluginNotActive);
                    }
                }
                _ = shutdown_rx.wait_for(|stopped| *stopped) => {
                    return self.error();
                }
            }
        }
    }

    /// Current stderr capture as an error, or `Ok(())` when nothing is fresh.
    pub fn error(&self) -> Result<()> {
        match self.ring.lock().unwrap().snapshot() {
            Some(message) => Err(Error::PluginStderr { message }),
            None => Ok(()),
        }
    }

    // ─────────────────────────────────────────────────────────
    // Teardown
    // ─────────────────────────────────────────────────────────

    /// Tear the holder down. Safe to call any number of times.
    ///
    /// Fires the termination signal exactly once, which ends the three stream
    /// tasks (each drops its stream, closing the descriptor) and unblocks all
    /// waiters, then removes the holder from the registry index. Does not
    /// wait for the tasks to finish.
    pub fn stop(&self) {
        {
            let mut closed = self.shutdown_closed.lock().unwrap();
            if !*closed {
                *closed = true;
                let _ = self.shutdown_tx.send(true);
                debug!("holder {} stopped (plugin {})", self.id, self.plugin_identity);
            }
        }

        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.id);
        }
    }
}
