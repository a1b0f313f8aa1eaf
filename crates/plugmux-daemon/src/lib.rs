//! # plugmux-daemon - Plugin Process Multiplexing
//!
//! Fronts long-running plugin child processes that speak a line-delimited
//! JSON event protocol over stdout. One [`StdioHolder`] per child parses and
//! demultiplexes the event stream to per-session listeners, fans session
//! events out to process-wide broadcast listeners, collects stderr into a
//! rolling diagnostic window, and tracks liveness through heartbeat events.
//!
//! Depends on [`plugmux_core`] for the event protocol and error handling.
//!
//! ## Public API
//!
//! ### Holder
//! - [`StdioHolder`] - Per-child stream ownership, dispatch, liveness, teardown
//! - [`HEALTH_POLL_INTERVAL`] / [`INACTIVITY_DEADLINE`] - Liveness timing
//!
//! ### Registry
//! - [`PluginRegistry`] - Process-wide holder index and broadcast listeners
//! - [`BroadcastId`] - Token for unregistering a broadcast listener
//!
//! ### Process Management
//! - [`PluginProcess`] - Spawn a plugin child and wire it into a holder
//! - [`SpawnConfig`] - Launch configuration for plugin children
//!
//! ### Diagnostics
//! - [`ErrorRing`] - Rolling window over recent stderr output

pub mod config;
pub mod holder;
pub mod process;
pub mod registry;
pub mod ring;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_utils;

// Public API re-exports
pub use config::SpawnConfig;
pub use holder::{SessionCallback, StdioHolder, HEALTH_POLL_INTERVAL, INACTIVITY_DEADLINE};
pub use process::{next_holder_id, PluginProcess};
pub use registry::{BroadcastCallback, BroadcastId, PluginRegistry};
pub use ring::{ErrorRing, ERR_FRESHNESS_TTL, MAX_ERR_MSG_LEN};
