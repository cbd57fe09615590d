//! # Quill
//!
//! A small runtime for chat bots on a channel-based messaging platform.
//!
//! Quill dispatches incoming messages to command handlers and keeps
//! application data as messages in a dedicated database channel, which it
//! reads back through search.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐ notifications ┌────────────┐  first match  ┌─────────┐
//! │ Transport │──────────────▶│ Dispatcher │──────────────▶│ Command │
//! └───────────┘               └────────────┘   (gated)     └────┬────┘
//!       ▲                                                      │
//!       │ send            ┌──────────────┐   push / get        │
//!       └─────────────────│    Outbox    │◀──── ChannelStore ◀─┤
//!                         └──────────────┘◀──── reply ─────────┘
//! ```
//!
//! - **Transport**: the messaging backend (see [`core::Transport`])
//! - **Dispatcher**: drops own and stale messages, picks one command
//! - **Outbox**: every send goes through one background worker
//! - **ChannelStore**: cache-first key/value records in a channel
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use quill::prelude::*;
//!
//! let commands = CommandTable::new().with(
//!     Command::new("/hello", |ctx| async move {
//!         ctx.reply_to_sender("Hello!");
//!         Ok(())
//!     })
//!     .mentioned(),
//! );
//!
//! let runtime = BotRuntime::new(BotSettings::new("hellobot", org_id), transport, commands).await?;
//! runtime.run_until_signal().await?;
//! ```
//!
//! ## Features
//!
//! - `toml-config`: load `quill.toml` files (default)
//! - `json-log`: JSON log output

pub use quill_core as core;
pub use quill_framework as framework;
pub use quill_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use quill::prelude::*;
/// ```
pub mod prelude {
    // Runtime
    pub use quill_runtime::{BotRuntime, BotSettings, QuillConfig, RuntimeError, RuntimeResult};

    // Commands
    pub use quill_framework::{
        BotDefinition, BotHandle, Command, CommandContext, CommandTable, DispatchOutcome, Gate,
    };

    // Messages, transports and storage
    pub use quill_core::{
        BoxedTransport, ChannelStore, IncomingMessage, LocalTransport, MemberState,
        OutboundMessage, Transport,
    };

    // Logging
    pub use quill_runtime::prelude::*;
}

pub use quill_core::{ChannelStore, LocalTransport, Transport};
pub use quill_framework::{BotDefinition, Command, CommandTable};
pub use quill_runtime::BotRuntime;
