//! Plugin child-process management

use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::process::{Child, Command};

use plugmux_core::prelude::*;

use crate::config::SpawnConfig;
use crate::holder::StdioHolder;
use crate::registry::PluginRegistry;

/// Global holder id counter
static HOLDER_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generate a unique holder id
pub fn next_holder_id() -> String {
    format!("plugin-{}", HOLDER_ID_COUNTER.fetch_add(1, Ordering::SeqCst))
}

/// Manages one plugin child process wired into a holder.
pub struct PluginProcess {
    /// The child process handle
    child: Child,
    /// The holder demultiplexing the child's stdio
    holder: Arc<StdioHolder>,
    /// Process ID for logging
    pid: Option<u32>,
}

impl PluginProcess {
    /// Spawn a plugin child process and register its stdio holder.
    ///
    /// The child gets fully piped stdio; its streams are handed to the
    /// holder, which starts the demultiplexer and collector tasks before
    /// this returns.
    pub async fn spawn(registry: &Arc<PluginRegistry>, config: &SpawnConfig) -> Result<Self> {
        config.validate()?;

        info!("Spawning plugin process: {}", config.identity);

        let mut command = Command::new(&config.command);
        command
            .args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true); // Critical: cleanup on drop
        if let Some(dir) = &config.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|e| Error::ProcessSpawn {
            reason: e.to_string(),
        })?;

        let pid = child.id();
        info!("Plugin {} started with PID: {:?}", config.identity, pid);

        let stdin = child.stdin.take().expect("stdin was configured");
        let stdout = child.stdout.take().expect("stdout was configured");
        let stderr = child.stderr.take().expect("stderr was configured");

        let holder = registry.register(next_holder_id(), config.identity.clone())?;
        holder.start(stdin, stdout, stderr);

        Ok(Self { child, holder, pid })
    }

    /// The holder demultiplexing this child's stdio.
    pub fn holder(&self) -> &Arc<StdioHolder> {
        &self.holder
    }

    /// Get the process ID
    pub fn id(&self) -> Option<u32> {
        self.pid
    }

    /// Check if the process is still running
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Shut down the plugin process.
    ///
    /// 1. Stop the holder (closes the child's stdin, ending well-behaved plugins)
    /// 2. Wait with timeout
    /// 3. Force kill if needed
    pub async fn shutdown(&mut self) -> Result<()> {
        info!("Shutting down plugin {}", self.holder.plugin_identity());

        self.holder.stop();

        match tokio::time::timeout(Duration::from_secs(5), self.child.wait()).await {
            Ok(Ok(status)) => {
                info!(
                    "Plugin {} exited: {:?}",
                    self.holder.plugin_identity(),
                    status
                );
                Ok(())
            }
            Ok(Err(e)) => {
                warn!("Error waiting for plugin process: {}", e);
                self.force_kill().await
            }
            Err(_) => {
                warn!("Timeout waiting for plugin exit");
                self.force_kill().await
            }
        }
    }

    /// Force kill the process
    async fn force_kill(&mut self) -> Result<()> {
        warn!("Force killing plugin {}", self.holder.plugin_identity());
        self.child
            .kill()
            .await
            .map_err(|e| Error::process(format!("Failed to kill: {}", e)))
    }
}

impl Drop for PluginProcess {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            warn!(
                "PluginProcess {} dropped while still running",
                self.holder.plugin_identity()
            );
        }
        // kill_on_drop(true) handles actual cleanup
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_holder_id_uniqueness() {
        let id1 = next_holder_id();
        let id2 = next_holder_id();
        assert_ne!(id1, id2);
        assert!(id1.starts_with("plugin-"));
    }

    #[tokio::test]
    async fn test_spawn_missing_binary() {
        let registry = PluginRegistry::new();
        let config = SpawnConfig::new("ghost", "/nonexistent/plugin-binary");

        let result = PluginProcess::spawn(&registry, &config).await;
        assert!(matches!(result, Err(Error::ProcessSpawn { .. })));
        // Nothing was registered for the failed spawn.
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_spawn_invalid_config() {
        let registry = PluginRegistry::new();
        let config = SpawnConfig::new("", "");

        let result = PluginProcess::spawn(&registry, &config).await;
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawn_round_trip_through_cat() {
        use std::sync::Mutex;

        // `cat` copies stdin to stdout, so a written envelope comes straight
        // back through the demultiplexer.
        let registry = PluginRegistry::new();
        let config = SpawnConfig::new("cat-plugin", "cat");
        let mut process = PluginProcess::spawn(&registry, &config).await.unwrap();

        let received = Arc::new(Mutex::new(Vec::new()));
        {
            let received = received.clone();
            process.holder().register_session_listener("s1", move |data| {
                received.lock().unwrap().push(data.to_vec());
            });
        }

        process
            .holder()
            .write(b"{\"session_id\":\"s1\",\"event\":\"session\",\"data\":{\"ok\":true}}\n".to_vec())
            .await
            .unwrap();

        // Poll until the event has made the round trip.
        for _ in 0..100 {
            if !received.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(*received.lock().unwrap(), vec![br#"{"ok":true}"#.to_vec()]);

        process.shutdown().await.unwrap();
        assert!(registry.is_empty());
    }
}
