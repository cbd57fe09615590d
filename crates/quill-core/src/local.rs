//! In-process transport.
//!
//! [`LocalTransport`] keeps orgs, channels, members and message logs in
//! memory. Notifications are fed in with [`LocalTransport::inject`] or
//! [`LocalTransport::deliver`] and handed to the registered handler by
//! [`Transport::process_notifications`].
//!
//! Besides driving the demo bots, it is the test double of the workspace:
//! it counts searches and channel creations, records every sent message and
//! can fail or hold sends on demand.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{Notify, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{TransportError, TransportResult};
use crate::message::{
    ChannelInfo, IncomingMessage, MemberInfo, MemberState, Notification, OutboundMessage,
    unix_millis_now,
};
use crate::transport::{NotificationHandler, Transport};

struct LocalChannel {
    org_id: String,
    info: ChannelInfo,
    members: Vec<MemberInfo>,
    log: Vec<IncomingMessage>,
}

#[derive(Default)]
struct LocalState {
    channels: Vec<LocalChannel>,
    org_members: HashMap<String, Vec<MemberInfo>>,
    sent: Vec<OutboundMessage>,
    fail_sends_containing: Option<String>,
    fail_searches: bool,
    next_channel: usize,
}

impl LocalState {
    fn channel_mut(&mut self, channel_id: &str) -> Option<&mut LocalChannel> {
        self.channels.iter_mut().find(|c| c.info.id == channel_id)
    }

    fn channel(&self, channel_id: &str) -> Option<&LocalChannel> {
        self.channels.iter().find(|c| c.info.id == channel_id)
    }

    fn create_channel(&mut self, org_id: &str, name: &str) -> String {
        self.next_channel += 1;
        let id = format!("chan-{}", self.next_channel);
        self.channels.push(LocalChannel {
            org_id: org_id.to_string(),
            info: ChannelInfo {
                id: id.clone(),
                name: name.to_string(),
            },
            members: Vec::new(),
            log: Vec::new(),
        });
        id
    }
}

/// An in-memory messaging backend.
pub struct LocalTransport {
    account_id: String,
    state: Mutex<LocalState>,
    handler: RwLock<Option<NotificationHandler>>,
    inbox_tx: mpsc::UnboundedSender<Notification>,
    inbox_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Notification>>,
    shutdown: CancellationToken,
    activity: Notify,
    sends_paused: watch::Sender<bool>,
    send_attempts: AtomicUsize,
    search_calls: AtomicUsize,
    new_channel_calls: AtomicUsize,
}

impl LocalTransport {
    /// Creates an empty backend where the bot is logged in as `account_id`.
    pub fn new(account_id: impl Into<String>) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (sends_paused, _) = watch::channel(false);
        Self {
            account_id: account_id.into(),
            state: Mutex::new(LocalState::default()),
            handler: RwLock::new(None),
            inbox_tx,
            inbox_rx: tokio::sync::Mutex::new(inbox_rx),
            shutdown: CancellationToken::new(),
            activity: Notify::new(),
            sends_paused,
            send_attempts: AtomicUsize::new(0),
            search_calls: AtomicUsize::new(0),
            new_channel_calls: AtomicUsize::new(0),
        }
    }

    // ─── Fixtures ───

    /// Creates a channel and returns its id. Not counted as a `new_channel`
    /// call.
    pub fn add_channel(&self, org_id: &str, name: &str) -> String {
        self.state.lock().create_channel(org_id, name)
    }

    /// Adds or updates a channel member.
    pub fn add_channel_member(&self, channel_id: &str, account_id: &str, state: MemberState) {
        if let Some(channel) = self.state.lock().channel_mut(channel_id) {
            channel.members.retain(|m| m.account_id != account_id);
            channel.members.push(MemberInfo::new(account_id, state));
        }
    }

    /// Adds or updates an org member.
    pub fn add_org_member(&self, org_id: &str, account_id: &str, state: MemberState) {
        let mut guard = self.state.lock();
        let members = guard.org_members.entry(org_id.to_string()).or_default();
        members.retain(|m| m.account_id != account_id);
        members.push(MemberInfo::new(account_id, state));
    }

    /// Appends a message to a channel log without notifying anyone.
    ///
    /// Ignored when the channel does not exist.
    pub fn post(&self, message: IncomingMessage) {
        if let Some(channel) = self.state.lock().channel_mut(&message.channel_id) {
            channel.log.push(message);
        }
    }

    /// Queues a notification for the handler.
    pub fn inject(&self, notification: Notification) {
        if self.inbox_tx.send(notification).is_err() {
            debug!("Local inbox closed, notification discarded");
        }
    }

    /// Posts a message to its channel and notifies the handler about it.
    pub fn deliver(&self, message: IncomingMessage) {
        self.post(message.clone());
        self.inject(Notification::messages(vec![message]));
    }

    // ─── Failure injection ───

    /// Makes every send whose body contains `pattern` fail.
    pub fn fail_sends_containing(&self, pattern: impl Into<String>) {
        self.state.lock().fail_sends_containing = Some(pattern.into());
    }

    /// Makes every search fail.
    pub fn fail_searches(&self, fail: bool) {
        self.state.lock().fail_searches = fail;
    }

    /// Holds every send until [`resume_sends`](Self::resume_sends).
    pub fn pause_sends(&self) {
        self.sends_paused.send_replace(true);
    }

    /// Releases held sends.
    pub fn resume_sends(&self) {
        self.sends_paused.send_replace(false);
    }

    // ─── Inspection ───

    /// Every message accepted by `send_message`, in send order.
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.state.lock().sent.clone()
    }

    /// Bodies of [`sent`](Self::sent).
    pub fn sent_bodies(&self) -> Vec<String> {
        self.state.lock().sent.iter().map(|m| m.body.clone()).collect()
    }

    /// The message log of a channel.
    pub fn channel_log(&self, channel_id: &str) -> Vec<IncomingMessage> {
        self.state
            .lock()
            .channel(channel_id)
            .map(|c| c.log.clone())
            .unwrap_or_default()
    }

    /// Id of the first channel called `name` in `org_id`.
    pub fn channel_named(&self, org_id: &str, name: &str) -> Option<String> {
        self.state
            .lock()
            .channels
            .iter()
            .find(|c| c.org_id == org_id && c.info.name == name)
            .map(|c| c.info.id.clone())
    }

    /// Number of `search` calls so far.
    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    /// Number of `new_channel` calls so far.
    pub fn new_channel_calls(&self) -> usize {
        self.new_channel_calls.load(Ordering::SeqCst)
    }

    /// Number of `send_message` calls so far, including failed and held ones.
    pub fn send_attempts(&self) -> usize {
        self.send_attempts.load(Ordering::SeqCst)
    }

    /// Whether [`Transport::terminate`] has been called.
    pub fn is_terminated(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Waits until at least `count` messages have been sent.
    pub async fn wait_for_sent(&self, count: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, || self.state.lock().sent.len() >= count)
            .await
    }

    /// Waits until `send_message` has been entered at least `count` times.
    pub async fn wait_for_send_attempts(&self, count: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, || self.send_attempts() >= count).await
    }

    async fn wait_until(&self, timeout: Duration, done: impl Fn() -> bool) -> bool {
        tokio::time::timeout(timeout, async {
            loop {
                let notified = self.activity.notified();
                if done() {
                    return;
                }
                notified.await;
            }
        })
        .await
        .is_ok()
    }
}

impl std::fmt::Debug for LocalTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalTransport")
            .field("account_id", &self.account_id)
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn account_id(&self) -> TransportResult<String> {
        Ok(self.account_id.clone())
    }

    async fn send_message(&self, message: &OutboundMessage) -> TransportResult<()> {
        self.send_attempts.fetch_add(1, Ordering::SeqCst);
        self.activity.notify_waiters();

        let mut paused = self.sends_paused.subscribe();
        // The sender half lives in `self`, so the wait cannot fail.
        let _ = paused.wait_for(|held| !*held).await;

        let result = {
            let mut state = self.state.lock();
            let rejected = state
                .fail_sends_containing
                .as_deref()
                .is_some_and(|pattern| message.body.contains(pattern));

            if rejected {
                Err(TransportError::SendFailed(format!(
                    "send to '{}' rejected",
                    message.channel_id
                )))
            } else {
                state.sent.push(message.clone());
                let account_id = self.account_id.clone();
                if let Some(channel) = state.channel_mut(&message.channel_id) {
                    let mut posted =
                        IncomingMessage::new(account_id, &message.channel_id, &message.body)
                            .with_creation_time(unix_millis_now());
                    posted.other_data = message.other_data.clone();
                    channel.log.push(posted);
                }
                Ok(())
            }
        };

        self.activity.notify_waiters();
        result
    }

    async fn search(
        &self,
        org_id: &str,
        channel_id: &str,
        query: &str,
    ) -> TransportResult<Vec<IncomingMessage>> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);

        let state = self.state.lock();
        if state.fail_searches {
            return Err(TransportError::Other("search unavailable".to_string()));
        }
        let channel = state
            .channel(channel_id)
            .filter(|c| c.org_id == org_id)
            .ok_or_else(|| TransportError::channel_not_found(channel_id))?;

        Ok(channel
            .log
            .iter()
            .filter(|m| m.text.contains(query))
            .cloned()
            .collect())
    }

    async fn enumerate_channels(&self, org_id: &str) -> TransportResult<Vec<ChannelInfo>> {
        Ok(self
            .state
            .lock()
            .channels
            .iter()
            .filter(|c| c.org_id == org_id)
            .map(|c| c.info.clone())
            .collect())
    }

    async fn enumerate_channel_members(
        &self,
        channel_id: &str,
    ) -> TransportResult<Vec<MemberInfo>> {
        self.state
            .lock()
            .channel(channel_id)
            .map(|c| c.members.clone())
            .ok_or_else(|| TransportError::channel_not_found(channel_id))
    }

    async fn enumerate_org_members(&self, org_id: &str) -> TransportResult<Vec<MemberInfo>> {
        Ok(self
            .state
            .lock()
            .org_members
            .get(org_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn new_channel(&self, org_id: &str, name: &str) -> TransportResult<String> {
        self.new_channel_calls.fetch_add(1, Ordering::SeqCst);
        let id = self.state.lock().create_channel(org_id, name);
        debug!(org_id, name, channel_id = %id, "Local channel created");
        Ok(id)
    }

    fn set_notification_handler(&self, handler: NotificationHandler) {
        *self.handler.write() = Some(handler);
    }

    async fn process_notifications(&self) -> TransportResult<()> {
        let mut inbox = self.inbox_rx.lock().await;
        info!(account_id = %self.account_id, "Local notification loop started");

        loop {
            let notification = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break,
                next = inbox.recv() => match next {
                    Some(notification) => notification,
                    None => break,
                },
            };

            let handler = self.handler.read().clone();
            match handler {
                Some(handler) => handler(notification).await,
                None => debug!("No notification handler registered, dropping notification"),
            }
            self.activity.notify_waiters();
        }

        info!("Local notification loop stopped");
        Ok(())
    }

    fn terminate(&self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::BoxFuture;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_search_is_substring_in_log_order() {
        let transport = LocalTransport::new("bot");
        let chan = transport.add_channel("org", "db");
        transport.post(IncomingMessage::new("bot", &chan, r#"{"note":"a"}"#));
        transport.post(IncomingMessage::new("bot", &chan, "unrelated"));
        transport.post(IncomingMessage::new("bot", &chan, r#"{"note":"b"}"#));

        let found = transport.search("org", &chan, "note").await.unwrap();
        let texts: Vec<_> = found.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec![r#"{"note":"a"}"#, r#"{"note":"b"}"#]);
        assert_eq!(transport.search_calls(), 1);
    }

    #[tokio::test]
    async fn test_search_unknown_channel() {
        let transport = LocalTransport::new("bot");
        let err = transport.search("org", "nope", "x").await.unwrap_err();
        assert!(matches!(err, TransportError::NotFound { kind: "channel", .. }));
    }

    #[tokio::test]
    async fn test_sent_message_lands_in_channel_log() {
        let transport = LocalTransport::new("bot");
        let chan = transport.add_channel("org", "general");

        transport
            .send_message(&OutboundMessage::new("org", &chan, "hello"))
            .await
            .unwrap();

        let log = transport.channel_log(&chan);
        assert_eq!(log.len(), 1);
        assert!(log[0].is_from("bot"));
        assert!(log[0].creation_time.is_some());
    }

    #[tokio::test]
    async fn test_notifications_reach_handler_until_terminate() {
        let transport = Arc::new(LocalTransport::new("bot"));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        transport.set_notification_handler(Arc::new(move |n: Notification| -> BoxFuture<'static, ()> {
            let sink = sink.clone();
            Box::pin(async move {
                sink.lock().extend(n.regular_messages.into_iter().map(|m| m.text));
            })
        }));

        let chan = transport.add_channel("org", "general");
        transport.deliver(IncomingMessage::new("user", &chan, "one"));
        transport.deliver(IncomingMessage::new("user", &chan, "two"));

        let runner = transport.clone();
        let handle = tokio::spawn(async move { runner.process_notifications().await });

        assert!(
            transport
                .wait_until(Duration::from_secs(5), || seen.lock().len() == 2)
                .await
        );
        transport.terminate();
        transport.terminate();
        handle.await.unwrap().unwrap();

        assert_eq!(*seen.lock(), vec!["one", "two"]);
        assert!(transport.is_terminated());
    }

    #[tokio::test]
    async fn test_members() {
        let transport = LocalTransport::new("bot");
        let chan = transport.add_channel("org", "general");
        transport.add_channel_member(&chan, "ann", MemberState::Member);
        transport.add_channel_member(&chan, "ann", MemberState::Admin);
        transport.add_org_member("org", "bob", MemberState::Owner);

        let members = transport.enumerate_channel_members(&chan).await.unwrap();
        assert_eq!(members, vec![MemberInfo::new("ann", MemberState::Admin)]);

        let org = transport.enumerate_org_members("org").await.unwrap();
        assert_eq!(org, vec![MemberInfo::new("bob", MemberState::Owner)]);
        assert!(transport.enumerate_org_members("other").await.unwrap().is_empty());
    }
}
