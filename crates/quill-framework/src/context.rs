//! What a command handler gets to work with.
//!
//! - [`BotHandle`] is the bot as seen from a handler: its identity, the
//!   outbound queue, the channel store and read access to the transport.
//!   It is cheap to clone and shared by every dispatch.
//! - [`CommandContext`] pairs the triggering message with the handle.
//!
//! Every send made through these types goes through the outbound queue, so
//! they return as soon as the message is queued.

use std::sync::Arc;

use tracing::debug;

use quill_core::{
    BoxedTransport, ChannelInfo, ChannelStore, IncomingMessage, OutboundMessage, Outbox,
    TransportResult,
};

/// Who the bot is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity {
    /// Account id the transport is logged in as.
    pub account_id: String,
    /// Username, used for `@` mentions.
    pub username: String,
    /// Org the bot operates in.
    pub org_id: String,
}

impl BotIdentity {
    /// Creates an identity.
    pub fn new(
        account_id: impl Into<String>,
        username: impl Into<String>,
        org_id: impl Into<String>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            username: username.into(),
            org_id: org_id.into(),
        }
    }
}

/// Shared handle to a running bot.
#[derive(Clone)]
pub struct BotHandle {
    identity: Arc<BotIdentity>,
    transport: BoxedTransport,
    outbox: Outbox,
    store: Arc<ChannelStore>,
}

impl BotHandle {
    /// Creates a handle.
    pub fn new(
        identity: BotIdentity,
        transport: BoxedTransport,
        outbox: Outbox,
        store: Arc<ChannelStore>,
    ) -> Self {
        Self {
            identity: Arc::new(identity),
            transport,
            outbox,
            store,
        }
    }

    /// The bot's identity.
    pub fn identity(&self) -> &BotIdentity {
        &self.identity
    }

    /// Account id of the bot.
    pub fn account_id(&self) -> &str {
        &self.identity.account_id
    }

    /// Username of the bot.
    pub fn username(&self) -> &str {
        &self.identity.username
    }

    /// Org the bot operates in.
    pub fn org_id(&self) -> &str {
        &self.identity.org_id
    }

    /// The channel store.
    pub fn store(&self) -> &ChannelStore {
        &self.store
    }

    /// The shared transport, for read-side calls such as enumeration.
    pub fn transport(&self) -> &BoxedTransport {
        &self.transport
    }

    /// Queues a fully built message.
    pub fn send_message(&self, message: OutboundMessage) {
        self.outbox.enqueue(message);
    }

    /// Queues a text message for a channel of the bot's org.
    pub fn message_channel(&self, channel_id: &str, body: impl Into<String>) {
        self.send_message(OutboundMessage::new(self.org_id(), channel_id, body));
    }

    /// Queues a text message highlighting the given accounts.
    pub fn message_channel_highlighted(
        &self,
        channel_id: &str,
        body: impl Into<String>,
        highlight: Vec<String>,
    ) {
        self.send_message(
            OutboundMessage::new(self.org_id(), channel_id, body).with_highlight(highlight),
        );
    }

    /// Replies in the channel `message` came from.
    pub fn reply(&self, message: &IncomingMessage, body: impl Into<String>) {
        self.message_channel(&message.channel_id, body);
    }

    /// Replies in the channel `message` came from, highlighting accounts.
    pub fn reply_highlighted(
        &self,
        message: &IncomingMessage,
        body: impl Into<String>,
        highlight: Vec<String>,
    ) {
        self.message_channel_highlighted(&message.channel_id, body, highlight);
    }

    /// Lists the channels of the bot's org.
    pub async fn channels(&self) -> TransportResult<Vec<ChannelInfo>> {
        self.transport.enumerate_channels(self.org_id()).await
    }

    /// Queues `body` for every channel of the org except the database
    /// channel. Returns how many messages were queued.
    pub async fn message_all_channels(&self, body: impl Into<String>) -> TransportResult<usize> {
        let body = body.into();
        let db_channel = &self.store.settings().db_channel;

        let mut queued = 0;
        for channel in self.channels().await? {
            if &channel.name == db_channel {
                continue;
            }
            self.message_channel(&channel.id, body.clone());
            queued += 1;
        }

        debug!(channels = queued, "Broadcast queued");
        Ok(queued)
    }
}

impl std::fmt::Debug for BotHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotHandle")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

/// The context a command handler runs with.
#[derive(Debug, Clone)]
pub struct CommandContext {
    message: Arc<IncomingMessage>,
    bot: BotHandle,
}

impl CommandContext {
    /// Creates a context for `message`.
    pub fn new(message: IncomingMessage, bot: BotHandle) -> Self {
        Self {
            message: Arc::new(message),
            bot,
        }
    }

    /// The triggering message.
    pub fn message(&self) -> &IncomingMessage {
        &self.message
    }

    /// Text of the triggering message.
    pub fn text(&self) -> &str {
        &self.message.text
    }

    /// Author of the triggering message.
    pub fn sender(&self) -> &str {
        &self.message.sender_account_id
    }

    /// Channel of the triggering message.
    pub fn channel_id(&self) -> &str {
        &self.message.channel_id
    }

    /// The bot handle.
    pub fn bot(&self) -> &BotHandle {
        &self.bot
    }

    /// The channel store.
    pub fn store(&self) -> &ChannelStore {
        self.bot.store()
    }

    /// Replies in the channel the message came from.
    pub fn reply(&self, body: impl Into<String>) {
        self.bot.reply(&self.message, body);
    }

    /// Replies and highlights the sender.
    pub fn reply_to_sender(&self, body: impl Into<String>) {
        self.bot
            .reply_highlighted(&self.message, body, vec![self.sender().to_string()]);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use quill_core::{LocalTransport, OutboundWorker, StoreSettings, outbound_queue};
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    pub(crate) const BOT: &str = "bot-account";
    pub(crate) const ORG: &str = "org-1";

    /// A bot handle over a fresh local transport. The outbound worker is
    /// returned unstarted.
    pub(crate) async fn test_bot() -> (Arc<LocalTransport>, BotHandle, OutboundWorker, CancellationToken) {
        let transport = Arc::new(LocalTransport::new(BOT));
        let stop = CancellationToken::new();
        let (outbox, worker) = outbound_queue(transport.clone(), stop.clone());
        let store = ChannelStore::open(
            transport.clone(),
            outbox.clone(),
            BOT,
            StoreSettings::new(ORG),
        )
        .await
        .unwrap();
        let identity = BotIdentity::new(BOT, "quillbot", ORG);
        let bot = BotHandle::new(identity, transport.clone(), outbox, Arc::new(store));
        (transport, bot, worker, stop)
    }

    #[tokio::test]
    async fn test_reply_goes_through_queue() {
        let (transport, bot, worker, stop) = test_bot().await;
        let chan = transport.add_channel(ORG, "general");
        let ctx = CommandContext::new(IncomingMessage::new("ann", &chan, "/hello"), bot);

        ctx.reply("hi");
        ctx.reply_to_sender("hi again");
        assert!(transport.sent().is_empty());

        let handle = tokio::spawn(worker.run_forever());
        assert!(transport.wait_for_sent(2, std::time::Duration::from_secs(5)).await);
        stop.cancel();
        handle.await.unwrap();

        let sent = transport.sent();
        assert_eq!(sent[0].channel_id, chan);
        assert_eq!(sent[0].body, "hi");
        assert_eq!(sent[1].other_data, Some(json!({ "highlighted": ["ann"] })));
    }

    #[tokio::test]
    async fn test_message_all_channels_skips_db_channel() {
        let (transport, bot, _worker, _stop) = test_bot().await;
        transport.add_channel(ORG, "general");
        transport.add_channel(ORG, "random");
        transport.add_channel(ORG, quill_core::DEFAULT_DB_CHANNEL);
        transport.add_channel("other-org", "elsewhere");

        assert_eq!(bot.channels().await.unwrap().len(), 3);
        assert_eq!(bot.message_all_channels("announcement").await.unwrap(), 2);
    }
}
