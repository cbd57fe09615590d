//! Respond Bot Example
//!
//! Two gated commands:
//!
//! - `/hello` answers only when the bot is mentioned
//! - `/coolio` answers only channel owners and admins
//!
//! Runs against an in-memory [`LocalTransport`] with a scripted
//! conversation, then prints the channel.
//!
//! # Usage
//!
//! ```bash
//! cargo run --package respond-bot
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use quill::core::unix_millis_now;
use quill::prelude::*;
use quill::runtime::logging::{LoggingBuilder, SpanEvents};

const ORG: &str = "demo-org";

struct RespondBot;

impl BotDefinition for RespondBot {
    fn name(&self) -> &str {
        "respond_bot"
    }

    fn commands(&self) -> CommandTable {
        CommandTable::new()
            .with(
                Command::new("/hello", |ctx: CommandContext| async move {
                    ctx.reply("Hello!");
                    Ok(())
                })
                .mentioned(),
            )
            .with(
                Command::new("/coolio", |ctx: CommandContext| async move {
                    ctx.reply("Come on y'all let's take a ride...");
                    Ok(())
                })
                .admin_only(),
            )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logging must be set up before the runtime logs anything.
    LoggingBuilder::new()
        .with_level(Level::INFO)
        .directive("quill_framework=debug")
        .span_events(SpanEvents::LIFECYCLE)
        .init();

    let transport = Arc::new(LocalTransport::new("respondbot-account"));
    let lounge = transport.add_channel(ORG, "lounge");
    transport.add_channel_member(&lounge, "alice", MemberState::Member);
    transport.add_channel_member(&lounge, "carol", MemberState::Admin);

    let runtime = BotRuntime::from_definition(
        BotSettings::new("respondbot", ORG),
        transport.clone(),
        &RespondBot,
    )
    .await?;

    let script = [
        ("alice", "/hello"),
        ("alice", "hey @RespondBot /hello"),
        ("alice", "/coolio"),
        ("carol", "/coolio"),
    ];

    let report = runtime
        .run_until(async {
            for (sender, text) in script {
                transport.deliver(
                    IncomingMessage::new(sender, &lounge, text)
                        .with_creation_time(unix_millis_now()),
                );
            }
            if !transport.wait_for_sent(2, Duration::from_secs(5)).await {
                warn!("Timed out waiting for replies");
            }
        })
        .await?;

    for message in transport.channel_log(&lounge) {
        info!(sender = %message.sender_account_id, "{}", message.text);
    }
    info!(%report, "Respond bot finished");

    Ok(())
}
