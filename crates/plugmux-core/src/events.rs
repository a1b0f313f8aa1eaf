//! Typed events for the plugin stdio protocol
//!
//! A plugin writes one JSON envelope per stdout line:
//!
//! ```json
//! { "session_id": "...", "event": "session", "data": { ... } }
//! ```
//!
//! The `data` blob is opaque at this layer and forwarded to consumers
//! byte-for-byte; only `log` payloads have a known schema.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::error::{Error, Result};

/// Envelope tag of one stdout line. Unrecognized tags collapse to `Unknown`
/// and are dropped by the demultiplexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Log,
    Session,
    Error,
    Heartbeat,
    #[serde(other)]
    Unknown,
}

/// One decoded stdout line from a plugin process.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PluginEvent {
    /// Addressing key for `session` events; empty or absent otherwise.
    #[serde(default)]
    pub session_id: String,
    pub event: EventKind,
    /// Opaque payload, kept verbatim. `heartbeat` events omit it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Box<RawValue>>,
}

/// `data` payload of a `log` event.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogPayload {
    pub message: String,
}

impl PluginEvent {
    /// Parse one stdout line (terminator already stripped).
    ///
    /// Empty lines and lines that fail JSON decoding yield `None`; neither
    /// is an error at this layer.
    pub fn parse(line: &str) -> Option<Self> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }
        serde_json::from_str(trimmed).ok()
    }

    /// The raw `data` blob exactly as the plugin sent it.
    pub fn data_str(&self) -> &str {
        self.data.as_ref().map(|d| d.get()).unwrap_or("null")
    }

    /// The raw `data` blob as bytes, for listener dispatch.
    pub fn data_bytes(&self) -> &[u8] {
        self.data_str().as_bytes()
    }

    /// Decode the inner log payload. Only meaningful when `event == Log`.
    pub fn log_payload(&self) -> Result<LogPayload> {
        let data = self
            .data
            .as_ref()
            .ok_or_else(|| Error::protocol("log event carries no data"))?;
        Ok(serde_json::from_str(data.get())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_session_event() {
        let event =
            PluginEvent::parse(r#"{"session_id":"a","event":"session","data":{"x":1}}"#).unwrap();
        assert_eq!(event.event, EventKind::Session);
        assert_eq!(event.session_id, "a");
        assert_eq!(event.data_str(), r#"{"x":1}"#);
    }

    #[test]
    fn test_parse_heartbeat_without_data() {
        let event = PluginEvent::parse(r#"{"session_id":"","event":"heartbeat"}"#).unwrap();
        assert_eq!(event.event, EventKind::Heartbeat);
        assert_eq!(event.data_str(), "null");
    }

    #[test]
    fn test_parse_unknown_tag() {
        let event =
            PluginEvent::parse(r#"{"session_id":"","event":"telemetry","data":{}}"#).unwrap();
        assert_eq!(event.event, EventKind::Unknown);
    }

    #[test]
    fn test_parse_invalid_json() {
        assert!(PluginEvent::parse("not json").is_none());
        assert!(PluginEvent::parse(r#"{"event":}"#).is_none());
    }

    #[test]
    fn test_parse_empty_line() {
        assert!(PluginEvent::parse("").is_none());
        assert!(PluginEvent::parse("   ").is_none());
    }

    #[test]
    fn test_parse_missing_event_tag() {
        // An envelope without a tag is malformed, not unknown.
        assert!(PluginEvent::parse(r#"{"session_id":"a","data":{}}"#).is_none());
    }

    #[test]
    fn test_data_preserved_verbatim() {
        // Key order and spacing inside `data` must survive untouched.
        let raw = r#"{"session_id":"a","event":"session","data":{"z": 1, "a": [2, 3]}}"#;
        let event = PluginEvent::parse(raw).unwrap();
        assert_eq!(event.data_str(), r#"{"z": 1, "a": [2, 3]}"#);
    }

    #[test]
    fn test_log_payload_decodes() {
        let event = PluginEvent::parse(
            r#"{"session_id":"","event":"log","data":{"message":"booted"}}"#,
        )
        .unwrap();
        let payload = event.log_payload().unwrap();
        assert_eq!(payload.message, "booted");
    }

    #[test]
    fn test_log_payload_malformed() {
        let event =
            PluginEvent::parse(r#"{"session_id":"","event":"log","data":{"level":"info"}}"#)
                .unwrap();
        assert!(event.log_payload().is_err());

        let event = PluginEvent::parse(r#"{"session_id":"","event":"log"}"#).unwrap();
        assert!(event.log_payload().is_err());
    }
}
