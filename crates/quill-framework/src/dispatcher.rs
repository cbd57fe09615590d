//! Command dispatcher.
//!
//! For every incoming message the [`Dispatcher`]:
//!
//! 1. drops messages authored by the bot itself
//! 2. drops messages older than the configured age limit
//! 3. finds the first registered command whose trigger occurs in the text
//! 4. evaluates that command's gates in order
//! 5. awaits the handler inline
//!
//! At most one handler runs per message. Handler errors, and panics raised
//! by either a gate or the handler, are caught here and logged; dispatch of
//! the next message is unaffected.
//!
//! Every decision is returned as a [`DispatchOutcome`].

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use tracing::{Instrument, Level, debug, error, span, trace};

use quill_core::{IncomingMessage, Notification, unix_millis_now};

use crate::command::CommandTable;
use crate::context::{BotHandle, CommandContext};
use crate::error::HandlerError;

/// Default maximum age of a message that can still trigger a command.
pub const DEFAULT_MESSAGE_AGE_LIMIT: Duration = Duration::from_secs(120);

/// What the dispatcher did with a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The bot wrote the message itself.
    IgnoredOwnMessage,
    /// The message was older than the age limit.
    IgnoredStale {
        /// Age at dispatch time.
        age: Duration,
    },
    /// No trigger occurs in the text.
    NoMatch,
    /// A command matched but one of its gates rejected the message.
    Gated {
        /// Trigger of the matched command.
        trigger: String,
        /// Name of the rejecting gate.
        gate: &'static str,
    },
    /// The handler ran to completion.
    Handled {
        /// Trigger of the matched command.
        trigger: String,
    },
    /// The handler returned an error or panicked.
    Failed {
        /// Trigger of the matched command.
        trigger: String,
        /// What went wrong.
        error: HandlerError,
    },
}

impl DispatchOutcome {
    /// Returns whether a handler was invoked.
    pub fn invoked_handler(&self) -> bool {
        matches!(self, Self::Handled { .. } | Self::Failed { .. })
    }
}

/// Result of the gate checks and handler for one matched command.
enum Verdict {
    Gated(&'static str),
    Ran(anyhow::Result<()>),
}

/// Routes messages to the command table.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    table: CommandTable,
    bot: BotHandle,
    age_limit: Duration,
}

impl Dispatcher {
    /// Creates a dispatcher for `bot`.
    pub fn new(table: CommandTable, bot: BotHandle, age_limit: Duration) -> Self {
        Self {
            table,
            bot,
            age_limit,
        }
    }

    /// The command table.
    pub fn table(&self) -> &CommandTable {
        &self.table
    }

    /// The bot handle passed to handlers.
    pub fn bot(&self) -> &BotHandle {
        &self.bot
    }

    /// The age limit.
    pub fn age_limit(&self) -> Duration {
        self.age_limit
    }

    /// Dispatches every regular message of a notification, in order.
    pub async fn handle_notification(&self, notification: Notification) -> Vec<DispatchOutcome> {
        if notification.regular_messages.is_empty() {
            trace!(
                kind = %notification.notification_type,
                "Notification without regular messages ignored"
            );
            return Vec::new();
        }

        let mut outcomes = Vec::with_capacity(notification.regular_messages.len());
        for message in notification.regular_messages {
            outcomes.push(self.dispatch(message.conform_other_data()).await);
        }
        outcomes
    }

    /// Dispatches one message against the current wall clock.
    pub async fn dispatch(&self, message: IncomingMessage) -> DispatchOutcome {
        self.dispatch_at(message, unix_millis_now()).await
    }

    /// Dispatches one message, judging its age against `now_millis`.
    pub async fn dispatch_at(&self, message: IncomingMessage, now_millis: i64) -> DispatchOutcome {
        let span = span!(
            Level::DEBUG,
            "dispatch",
            channel_id = %message.channel_id,
            sender = %message.sender_account_id
        );

        async move {
            if message.is_from(self.bot.account_id()) {
                trace!("Own message ignored");
                return DispatchOutcome::IgnoredOwnMessage;
            }

            if let Some(age) = message.age_at(now_millis)
                && age > self.age_limit
            {
                debug!(age_secs = age.as_secs(), "Stale message ignored");
                return DispatchOutcome::IgnoredStale { age };
            }

            let Some(command) = self.table.find(&message.text) else {
                trace!("No trigger matched");
                return DispatchOutcome::NoMatch;
            };
            let trigger = command.trigger().to_string();

            // Gate checks can run user closures, so they share the unwind
            // boundary with the handler.
            let ctx = CommandContext::new(message, self.bot.clone());
            let guarded = async move {
                if let Some(gate) = command.first_failing_gate(&ctx).await {
                    return Verdict::Gated(gate.name());
                }
                debug!(trigger = command.trigger(), "Running command");
                Verdict::Ran(command.call(ctx).await)
            };

            match AssertUnwindSafe(guarded).catch_unwind().await {
                Ok(Verdict::Gated(gate)) => {
                    debug!(trigger = %trigger, gate, "Command gated");
                    DispatchOutcome::Gated { trigger, gate }
                }
                Ok(Verdict::Ran(Ok(()))) => DispatchOutcome::Handled { trigger },
                Ok(Verdict::Ran(Err(e))) => {
                    let error = HandlerError::from(e);
                    error!(trigger = %trigger, error = %error, "Command handler failed");
                    DispatchOutcome::Failed { trigger, error }
                }
                Err(payload) => {
                    let error = HandlerError::from_panic(payload.as_ref());
                    error!(trigger = %trigger, error = %error, "Command panicked");
                    DispatchOutcome::Failed { trigger, error }
                }
            }
        }
        .instrument(span)
        .await
    }
}
