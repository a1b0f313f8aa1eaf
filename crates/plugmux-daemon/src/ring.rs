//! Rolling capture of recent plugin stderr output

use std::time::Duration;

use tokio::time::Instant;

/// Maximum bytes retained from a plugin's stderr.
pub const MAX_ERR_MSG_LEN: usize = 1024;

/// How long captured stderr stays current.
pub const ERR_FRESHNESS_TTL: Duration = Duration::from_secs(60);

/// Sliding window over the most recent stderr bytes.
///
/// Appends converge on the trailing [`MAX_ERR_MSG_LEN`] bytes; snapshots go
/// stale [`ERR_FRESHNESS_TTL`] after the last append. The window holds raw
/// bytes rather than a string so that the cap can cut through multi-byte
/// characters without panicking; snapshots render lossily.
#[derive(Debug, Default)]
pub struct ErrorRing {
    buf: Vec<u8>,
    last_updated_at: Option<Instant>,
}

impl ErrorRing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes, dropping the oldest overflow beyond the cap.
    pub fn append(&mut self, bytes: &[u8]) {
        if bytes.len() >= MAX_ERR_MSG_LEN {
            // A single append can exceed the cap on its own; only its tail survives.
            self.buf.clear();
            self.buf
                .extend_from_slice(&bytes[bytes.len() - MAX_ERR_MSG_LEN..]);
        } else {
            let overflow = (self.buf.len() + bytes.len()).saturating_sub(MAX_ERR_MSG_LEN);
            if overflow > 0 {
                self.buf.drain(..overflow);
            }
            self.buf.extend_from_slice(bytes);
        }
        self.last_updated_at = Some(Instant::now());
    }

    /// Current capture as text, or `None` when empty or stale.
    pub fn snapshot(&self) -> Option<String> {
        let updated_at = self.last_updated_at?;
        if updated_at.elapsed() >= ERR_FRESHNESS_TTL {
            return None;
        }
        if self.buf.is_empty() {
            return None;
        }
        Some(String::from_utf8_lossy(&self.buf).into_owned())
    }

    /// Bytes currently retained.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}
