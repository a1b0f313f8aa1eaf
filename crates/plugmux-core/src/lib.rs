//! # plugmux-core - Core Domain Types
//!
//! Foundation crate for plugmux. Provides the plugin stdio event protocol,
//! error handling, and logging setup.
//!
//! This crate has **zero internal dependencies** -- it only depends on external
//! crates (serde, serde_json, thiserror, tracing).
//!
//! ## Public API
//!
//! ### Events (`events`)
//! - [`PluginEvent`] - One decoded stdout line from a plugin process
//! - [`EventKind`] - Closed set of envelope tags with an `Unknown` catch-all
//! - [`LogPayload`] - Decoded `data` of a `log` event
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Custom error enum spanning process, protocol, and holder layers
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//! - [`ResultExt`] - Extension trait for adding error context
//!
//! ## Prelude
//!
//! Import commonly used types with:
//! ```rust
//! use plugmux_core::prelude::*;
//! ```

pub mod error;
pub mod events;
pub mod logging;

/// Prelude for common imports used throughout all plugmux crates
pub mod prelude {
    pub use super::error::{Error, Result, ResultExt};
    pub use tracing::{debug, error, info, instrument, trace, warn};
}

// Re-export commonly used types at crate root for convenience
pub use error::{Error, Result, ResultExt};
pub use events::{EventKind, LogPayload, PluginEvent};
