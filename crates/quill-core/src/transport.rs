//! The transport capability consumed by the runtime.
//!
//! A [`Transport`] is the messaging backend client: it sends, searches and
//! enumerates, and it runs the notification loop that feeds incoming
//! messages to a single registered [`NotificationHandler`].
//!
//! The runtime shares one transport between the outbound worker (which only
//! calls [`Transport::send_message`]) and the notification loop, so
//! implementations must be safe to use from both concurrently.

use std::sync::Arc;

use async_trait::async_trait;
pub use futures::future::BoxFuture;

use crate::error::TransportResult;
use crate::message::{ChannelInfo, IncomingMessage, MemberInfo, Notification, OutboundMessage};

/// Callback invoked by the transport for every notification.
///
/// The transport awaits the returned future before delivering the next
/// notification, so handlers run sequentially on the notification path.
pub type NotificationHandler = Arc<dyn Fn(Notification) -> BoxFuture<'static, ()> + Send + Sync>;

/// Messaging backend client.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Returns the account id the transport is logged in as.
    async fn account_id(&self) -> TransportResult<String>;

    /// Sends a message.
    async fn send_message(&self, message: &OutboundMessage) -> TransportResult<()>;

    /// Searches a channel for messages containing `query`.
    ///
    /// Results are expected in chronological order.
    async fn search(
        &self,
        org_id: &str,
        channel_id: &str,
        query: &str,
    ) -> TransportResult<Vec<IncomingMessage>>;

    /// Lists all channels of an org visible to the bot.
    async fn enumerate_channels(&self, org_id: &str) -> TransportResult<Vec<ChannelInfo>>;

    /// Lists the members of a channel.
    async fn enumerate_channel_members(&self, channel_id: &str)
    -> TransportResult<Vec<MemberInfo>>;

    /// Lists the members of an org.
    async fn enumerate_org_members(&self, org_id: &str) -> TransportResult<Vec<MemberInfo>>;

    /// Creates a channel and returns its id.
    async fn new_channel(&self, org_id: &str, name: &str) -> TransportResult<String>;

    /// Registers the notification callback, replacing any previous one.
    fn set_notification_handler(&self, handler: NotificationHandler);

    /// Runs the notification loop until [`Transport::terminate`] is called.
    async fn process_notifications(&self) -> TransportResult<()>;

    /// Stops the notification loop. Must be idempotent and callable from
    /// any thread.
    fn terminate(&self);
}

/// A shared transport trait object.
pub type BoxedTransport = Arc<dyn Transport>;
