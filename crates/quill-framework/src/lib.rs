//! # Quill Framework
//!
//! Command handling on top of [`quill_core`].
//!
//! This layer provides:
//! - [`Command`] and [`CommandTable`]: ordered trigger/handler pairs
//! - [`Gate`]: composable capability checks (`mentioned`, `admin_only`, ...)
//! - [`BotHandle`] and [`CommandContext`]: what handlers work with
//! - [`Dispatcher`]: routes incoming messages to at most one handler
//! - [`BotDefinition`]: how a concrete bot describes itself to the runtime

pub mod command;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod gate;

pub use command::{BotDefinition, Command, CommandTable, HandlerFn};
pub use context::{BotHandle, BotIdentity, CommandContext};
pub use dispatcher::{DEFAULT_MESSAGE_AGE_LIMIT, DispatchOutcome, Dispatcher};
pub use error::HandlerError;
pub use gate::{CheckFn, Gate, is_admin_member, is_mentioned};
