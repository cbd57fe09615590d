//! Quill Runtime - lifecycle layer for Quill bots.
//!
//! This crate provides:
//! - [`BotRuntime`]: builds a bot over a transport and runs it
//! - [`config`]: figment-based configuration (file, environment, overrides)
//! - [`logging`]: tracing subscriber setup driven by configuration
//!
//! ```ignore
//! use quill_runtime::BotRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = BotRuntime::builder()
//!         .definition(&NotesBot)
//!         .build(transport)
//!         .await?;
//!
//!     runtime.run_until_signal().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{BotSettings, ConfigError, ConfigLoader, ConfigResult, QuillConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{BotRuntime, RuntimeBuilder};

pub use tracing;
pub use tracing_subscriber;

/// Logging macros for bot code.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
