//! Notes Bot Example
//!
//! Saves notes in the bot's database channel and reads the latest one back.
//!
//! ```text
//! @notesbot /new buy milk   -> "Your note has been saved!"
//! @notesbot /last           -> "buy milk"
//! ```
//!
//! Settings come from `quill.toml` and `QUILL_*` variables when present;
//! the demo fills in the required ones programmatically. The backend is an
//! in-memory [`LocalTransport`] fed with a short scripted conversation.
//!
//! # Usage
//!
//! ```bash
//! cargo run --package notes-bot
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use quill::core::unix_millis_now;
use quill::prelude::*;
use serde_json::Value;

const ORG: &str = "demo-org";
const NOTE: &str = "note";

// ============================================================================
// Bot Definition
// ============================================================================

struct NotesBot;

impl BotDefinition for NotesBot {
    fn name(&self) -> &str {
        "notes_bot"
    }

    fn commands(&self) -> CommandTable {
        CommandTable::new()
            .with(Command::new("/new", save_note).mentioned())
            .with(Command::new("/last", show_last_note).mentioned())
    }
}

/// Saves everything after `/new` as a note.
async fn save_note(ctx: CommandContext) -> Result<()> {
    let note = note_text(ctx.text());
    if note.is_empty() {
        ctx.reply("Usage: /new <text>");
        return Ok(());
    }

    ctx.store().push(NOTE, note).await?;
    ctx.reply("Your note has been saved!");
    Ok(())
}

/// Replies with the most recent note.
async fn show_last_note(ctx: CommandContext) -> Result<()> {
    let reply = match ctx.store().last(NOTE).await? {
        Some(Value::String(note)) => note,
        Some(other) => other.to_string(),
        None => "No notes yet.".to_string(),
    };
    ctx.reply(reply);
    Ok(())
}

fn note_text(text: &str) -> &str {
    text.split_once("/new").map_or("", |(_, rest)| rest).trim()
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let transport = Arc::new(LocalTransport::new("notesbot-account"));
    let general = transport.add_channel(ORG, "general");

    let runtime = BotRuntime::builder()
        .set("bot.username", "notesbot")
        .set("bot.org_id", ORG)
        .set("bot.prefetch_keys", vec![NOTE])
        .definition(&NotesBot)
        .build(transport.clone())
        .await?;

    let script = [
        ("alice", "@notesbot /last"),
        ("alice", "@notesbot /new buy milk"),
        ("bob", "@notesbot /new call the plumber"),
        ("alice", "/last"),
        ("alice", "@notesbot /last"),
    ];

    let report = runtime
        .run_until(async {
            for (sender, text) in script {
                transport.deliver(
                    IncomingMessage::new(sender, &general, text)
                        .with_creation_time(unix_millis_now()),
                );
            }
            if !transport.wait_for_sent(6, Duration::from_secs(5)).await {
                warn!("Timed out waiting for replies");
            }
        })
        .await?;

    for message in transport.channel_log(&general) {
        info!(sender = %message.sender_account_id, "{}", message.text);
    }
    info!(%report, "Notes bot finished");

    Ok(())
}
