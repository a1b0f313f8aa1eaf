//! Process-wide holder index and session-event broadcast listeners
//!
//! The registry is the handle higher layers use to reach a plugin's holder:
//! lookup, stdin writes, liveness waits, teardown, and listener registration
//! all go through it. It also carries the broadcast listener set invoked for
//! every `session` event on every holder, in registration order.

use std::collections::{BTreeMap, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use plugmux_core::prelude::*;

use crate::holder::StdioHolder;

/// Callback receiving `(holder_id, data)` for every session event on every holder.
pub type BroadcastCallback = Arc<dyn Fn(&str, &[u8]) + Send + Sync>;

/// Token identifying a broadcast listener registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BroadcastId(u64);

/// Process-wide index of live holders plus the broadcast listener set.
///
/// Both maps are guarded by their own mutex; critical sections cover map
/// mutation only. Dispatch iterates a snapshot taken under the lock and
/// invokes callbacks outside it, so a listener may register or unregister
/// other listeners freely.
pub struct PluginRegistry {
    holders: Mutex<HashMap<String, Arc<StdioHolder>>>,
    // Keyed by a monotonic registration id so dispatch follows registration order.
    broadcast: Mutex<BTreeMap<u64, BroadcastCallback>>,
    next_broadcast_id: AtomicU64,
    weak_self: Weak<PluginRegistry>,
}

impl PluginRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            holders: Mutex::new(HashMap::new()),
            broadcast: Mutex::new(BTreeMap::new()),
            next_broadcast_id: AtomicU64::new(1),
            weak_self: weak_self.clone(),
        })
    }

    // ─────────────────────────────────────────────────────────
    // Holder index
    // ─────────────────────────────────────────────────────────

    /// Create a holder for a plugin child and insert it into the index.
    ///
    /// Ids are opaque and single-use: an id removed by [`stop`](Self::stop)
    /// must not be registered again.
    pub fn register(
        &self,
        id: impl Into<String>,
        plugin_identity: impl Into<String>,
    ) -> Result<Arc<StdioHolder>> {
        let id = id.into();
        let holder = StdioHolder::new(id.clone(), plugin_identity.into(), self.weak_self.clone());

        let mut holders = self.holders.lock().unwrap();
        if holders.contains_key(&id) {
            return Err(Error::holder_conflict(id));
        }
        holders.insert(id, holder.clone());
        Ok(holder)
    }

    /// Look up a holder by id.
    pub fn get(&self, id: &str) -> Option<Arc<StdioHolder>> {
        self.holders.lock().unwrap().get(id).cloned()
    }

    /// Snapshot of the ids currently registered.
    pub fn ids(&self) -> Vec<String> {
        self.holders.lock().unwrap().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.holders.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.holders.lock().unwrap().is_empty()
    }

    pub(crate) fn remove(&self, id: &str) {
        self.holders.lock().unwrap().remove(id);
    }

    // ─────────────────────────────────────────────────────────
    // Per-holder operations, addressed by id
    // ─────────────────────────────────────────────────────────

    /// Tear down the holder registered under `id`.
    pub fn stop(&self, id: &str) -> Result<()> {
        let holder = self.get(id).ok_or_else(|| Error::holder_not_found(id))?;
        holder.stop();
        Ok(())
    }

    /// Block until the holder terminates or its plugin goes inactive.
    pub async fn wait(&self, id: &str) -> Result<()> {
        let holder = self.get(id).ok_or_else(|| Error::holder_not_found(id))?;
        holder.wait().await
    }

    /// Current stderr capture of the holder, or `Ok(())` when nothing is fresh.
    pub fn error(&self, id: &str) -> Result<()> {
        let holder = self.get(id).ok_or_else(|| Error::holder_not_found(id))?;
        holder.error()
    }

    /// Queue bytes for the plugin's stdin, boundaries preserved verbatim.
    pub async fn write(&self, id: &str, data: Vec<u8>) -> Result<()> {
        let holder = self.get(id).ok_or_else(|| Error::holder_not_found(id))?;
        holder.write(data).await
    }

    /// Register a session listener on the holder registered under `holder_id`.
    pub fn register_session_listener(
        &self,
        holder_id: &str,
        session_id: impl Into<String>,
        callback: impl Fn(&[u8]) + Send + Sync + 'static,
    ) -> Result<()> {
        let holder = self
            .get(holder_id)
            .ok_or_else(|| Error::holder_not_found(holder_id))?;
        holder.register_session_listener(session_id, callback);
        Ok(())
    }

    /// Register an error listener on the holder registered under `holder_id`.
    pub fn register_error_listener(
        &self,
        holder_id: &str,
        session_id: impl Into<String>,
        callback: impl Fn(&[u8]) + Send + Sync + 'static,
    ) -> Result<()> {
        let holder = self
            .get(holder_id)
            .ok_or_else(|| Error::holder_not_found(holder_id))?;
        holder.register_error_listener(session_id, callback);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────
    // Broadcast listeners
    // ─────────────────────────────────────────────────────────

    /// Register a callback invoked for every session event on every holder.
    pub fn register_broadcast(
        &self,
        callback: impl Fn(&str, &[u8]) + Send + Sync + 'static,
    ) -> BroadcastId {
        let id = self.next_broadcast_id.fetch_add(1, Ordering::SeqCst);
        self.broadcast.lock().unwrap().insert(id, Arc::new(callback));
        BroadcastId(id)
    }

    pub fn unregister_broadcast(&self, id: BroadcastId) {
        self.broadcast.lock().unwrap().remove(&id.0);
    }

    /// Invoke every broadcast listener registered at this moment, in
    /// registration order. Called by the stdout demultiplexer before
    /// per-session dispatch.
    pub(crate) fn dispatch_broadcast(&self, holder_id: &str, data: &[u8]) {
        let snapshot: Vec<BroadcastCallback> =
            self.broadcast.lock().unwrap().values().cloned().collect();
        for callback in snapshot {
            invoke_contained("broadcast listener", holder_id, || {
                callback(holder_id, data)
            });
        }
    }
}

/// Run a listener callback, containing any panic so it cannot tear down the
/// demultiplexer.
pub(crate) fn invoke_contained(what: &str, who: &str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        error!("{} for {} panicked", what, who);
    }
}
