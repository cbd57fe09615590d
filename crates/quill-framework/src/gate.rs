//! Capability gates.
//!
//! A [`Gate`] is a predicate a command must pass before its handler runs.
//! Gates are evaluated in the order they were added and the first failing
//! gate stops the command silently: no reply, no error.
//!
//! | Gate | Passes when |
//! |------|-------------|
//! | [`Gate::Mentioned`] | `@username` appears in the text, any case |
//! | [`Gate::AdminOnly`] | sender is an owner/admin of the channel and is not the bot |
//! | [`Gate::OrgAdminOnly`] | sender is an owner/admin of the org and is not the bot |
//! | [`Gate::FromAdmin`] | either of the two above |
//! | [`Gate::Custom`] | the supplied closure returns `true` |

use std::sync::Arc;

use tracing::warn;

use quill_core::{MemberInfo, TransportResult};

use crate::context::CommandContext;

/// A synchronous predicate over the command context.
pub type CheckFn = Arc<dyn Fn(&CommandContext) -> bool + Send + Sync>;

/// A predicate evaluated before a command handler.
#[derive(Clone)]
pub enum Gate {
    /// The bot is `@`-mentioned.
    Mentioned,
    /// The sender administers the channel.
    AdminOnly,
    /// The sender administers the org.
    OrgAdminOnly,
    /// The sender administers the channel or the org.
    FromAdmin,
    /// Any other check.
    Custom(CheckFn),
}

impl Gate {
    /// Wraps a closure as a gate.
    pub fn custom<F>(check: F) -> Self
    where
        F: Fn(&CommandContext) -> bool + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(check))
    }

    /// Short name used in logs and dispatch outcomes.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Mentioned => "mentioned",
            Self::AdminOnly => "admin_only",
            Self::OrgAdminOnly => "org_admin_only",
            Self::FromAdmin => "from_admin",
            Self::Custom(_) => "custom",
        }
    }

    /// Evaluates the gate.
    ///
    /// Membership lookups that fail count as "not an admin".
    pub async fn allows(&self, ctx: &CommandContext) -> bool {
        match self {
            Self::Mentioned => is_mentioned(ctx.text(), ctx.bot().username()),
            Self::AdminOnly => !from_self(ctx) && channel_admin(ctx).await,
            Self::OrgAdminOnly => !from_self(ctx) && org_admin(ctx).await,
            Self::FromAdmin => {
                !from_self(ctx) && (channel_admin(ctx).await || org_admin(ctx).await)
            }
            Self::Custom(check) => check(ctx),
        }
    }
}

impl std::fmt::Debug for Gate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Returns whether `text` mentions `@username`, ignoring case.
pub fn is_mentioned(text: &str, username: &str) -> bool {
    if username.is_empty() {
        return false;
    }
    let needle = format!("@{}", username.to_lowercase());
    text.to_lowercase().contains(&needle)
}

/// Returns whether `account_id` is an owner or admin in `members`.
pub fn is_admin_member(members: &[MemberInfo], account_id: &str) -> bool {
    members
        .iter()
        .any(|member| member.account_id == account_id && member.state.is_admin())
}

fn from_self(ctx: &CommandContext) -> bool {
    ctx.sender() == ctx.bot().account_id()
}

async fn channel_admin(ctx: &CommandContext) -> bool {
    let members = ctx
        .bot()
        .transport()
        .enumerate_channel_members(ctx.channel_id())
        .await;
    admin_in(members, ctx.sender(), "channel")
}

async fn org_admin(ctx: &CommandContext) -> bool {
    let bot = ctx.bot();
    let members = bot.transport().enumerate_org_members(bot.org_id()).await;
    admin_in(members, ctx.sender(), "org")
}

fn admin_in(members: TransportResult<Vec<MemberInfo>>, account_id: &str, scope: &str) -> bool {
    match members {
        Ok(members) => is_admin_member(&members, account_id),
        Err(e) => {
            warn!(scope, error = %e, "Failed to enumerate members, treating sender as non-admin");
            false
        }
    }
}
