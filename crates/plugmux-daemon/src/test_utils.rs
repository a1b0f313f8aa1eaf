//! Test utilities for driving holders over in-memory pipes
//!
//! Operates at the stream level, not the process level: the returned pipe
//! ends stand in for a plugin child's stdio, so tests can feed envelope
//! lines and stderr bytes without spawning anything.

use std::sync::Arc;

use tokio::io::{duplex, DuplexStream};

use crate::holder::StdioHolder;
use crate::registry::PluginRegistry;

/// Pipe capacity for test streams.
const PIPE_CAP: usize = 64 * 1024;

/// A started holder plus the plugin-side ends of its stdio pipes.
pub struct TestHolder {
    pub registry: Arc<PluginRegistry>,
    pub holder: Arc<StdioHolder>,
    /// Plugin-side stdout: write envelope lines here.
    pub stdout: DuplexStream,
    /// Plugin-side stderr: write diagnostic bytes here.
    pub stderr: DuplexStream,
    /// Plugin-side stdin: read host writes here.
    pub stdin: DuplexStream,
}

/// Register a holder in a fresh registry and start it over in-memory pipes.
pub fn start_test_holder(id: &str) -> TestHolder {
    let registry = PluginRegistry::new();
    start_test_holder_in(&registry, id)
}

/// Register a holder in the given registry and start it over in-memory pipes.
pub fn start_test_holder_in(registry: &Arc<PluginRegistry>, id: &str) -> TestHolder {
    let holder = registry
        .register(id, format!("{id}-plugin"))
        .expect("holder id is fresh");

    let (stdout_host, stdout_plugin) = duplex(PIPE_CAP);
    let (stderr_host, stderr_plugin) = duplex(PIPE_CAP);
    let (stdin_host, stdin_plugin) = duplex(PIPE_CAP);

    holder.start(stdin_host, stdout_host, stderr_host);

    TestHolder {
        registry: registry.clone(),
        holder,
        stdout: stdout_plugin,
        stderr: stderr_plugin,
        stdin: stdin_plugin,
    }
}
