//! Commands and the command table.
//!
//! A [`Command`] is a trigger, a list of [`Gate`]s and an async handler. A
//! [`CommandTable`] keeps commands in registration order, which is also
//! match order.
//!
//! Triggers match as **substrings** of the message text, so `/new` also
//! fires for `/newer`. Register longer triggers first when they share a
//! prefix.
//!
//! ```rust,ignore
//! use quill_framework::{Command, CommandTable};
//!
//! let table = CommandTable::new()
//!     .with(Command::new("/hello", |ctx| async move {
//!         ctx.reply_to_sender("Hello!");
//!         Ok(())
//!     }).mentioned())
//!     .with(Command::new("/coolio", |ctx| async move {
//!         ctx.reply("You're an admin!");
//!         Ok(())
//!     }).admin_only());
//! ```

use std::future::Future;
use std::sync::Arc;

use quill_core::BoxFuture;

use crate::context::CommandContext;
use crate::gate::Gate;

/// A type-erased command handler.
pub type HandlerFn =
    Arc<dyn Fn(CommandContext) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// A trigger, its gates and its handler.
#[derive(Clone)]
pub struct Command {
    trigger: String,
    gates: Vec<Gate>,
    handler: HandlerFn,
}

impl Command {
    /// Creates an ungated command.
    pub fn new<F, Fut>(trigger: impl Into<String>, handler: F) -> Self
    where
        F: Fn(CommandContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            trigger: trigger.into(),
            gates: Vec::new(),
            handler: Arc::new(move |ctx| -> BoxFuture<'static, anyhow::Result<()>> {
                Box::pin(handler(ctx))
            }),
        }
    }

    /// Adds a gate. Gates run in the order they are added.
    pub fn gate(mut self, gate: Gate) -> Self {
        self.gates.push(gate);
        self
    }

    /// Requires an `@username` mention.
    pub fn mentioned(self) -> Self {
        self.gate(Gate::Mentioned)
    }

    /// Requires a channel owner or admin.
    pub fn admin_only(self) -> Self {
        self.gate(Gate::AdminOnly)
    }

    /// Requires an org owner or admin.
    pub fn org_admin_only(self) -> Self {
        self.gate(Gate::OrgAdminOnly)
    }

    /// Requires a channel or org owner or admin.
    pub fn from_admin(self) -> Self {
        self.gate(Gate::FromAdmin)
    }

    /// Requires a custom check to pass.
    pub fn check<F>(self, check: F) -> Self
    where
        F: Fn(&CommandContext) -> bool + Send + Sync + 'static,
    {
        self.gate(Gate::custom(check))
    }

    /// The trigger string.
    pub fn trigger(&self) -> &str {
        &self.trigger
    }

    /// The gates, in evaluation order.
    pub fn gates(&self) -> &[Gate] {
        &self.gates
    }

    /// Returns whether the trigger occurs anywhere in `text`.
    pub fn matches(&self, text: &str) -> bool {
        text.contains(self.trigger.as_str())
    }

    /// Returns the first gate that rejects `ctx`, if any.
    pub async fn first_failing_gate(&self, ctx: &CommandContext) -> Option<&Gate> {
        for gate in &self.gates {
            if !gate.allows(ctx).await {
                return Some(gate);
            }
        }
        None
    }

    /// Runs the handler without checking gates.
    pub fn call(&self, ctx: CommandContext) -> BoxFuture<'static, anyhow::Result<()>> {
        (self.handler)(ctx)
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("trigger", &self.trigger)
            .field("gates", &self.gates)
            .finish_non_exhaustive()
    }
}

/// Commands in registration order.
#[derive(Debug, Clone, Default)]
pub struct CommandTable {
    commands: Vec<Command>,
}

impl CommandTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a command.
    pub fn add(&mut self, command: Command) {
        self.commands.push(command);
    }

    /// Appends a command (builder pattern).
    pub fn with(mut self, command: Command) -> Self {
        self.commands.push(command);
        self
    }

    /// The first command whose trigger occurs in `text`.
    pub fn find(&self, text: &str) -> Option<&Command> {
        self.commands.iter().find(|command| command.matches(text))
    }

    /// Number of commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Iterates over commands in match order.
    pub fn iter(&self) -> impl Iterator<Item = &Command> {
        self.commands.iter()
    }

    /// The triggers, in match order.
    pub fn triggers(&self) -> Vec<&str> {
        self.commands.iter().map(Command::trigger).collect()
    }
}

impl FromIterator<Command> for CommandTable {
    fn from_iter<I: IntoIterator<Item = Command>>(iter: I) -> Self {
        Self {
            commands: iter.into_iter().collect(),
        }
    }
}

/// A concrete bot: a name and its commands.
pub trait BotDefinition: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// The command table, in match order.
    fn commands(&self) -> CommandTable;
}
