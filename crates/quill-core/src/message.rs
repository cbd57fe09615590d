//! Message model shared by the transport, the dispatcher and the store.
//!
//! The wire names follow the messaging backend (`senderAccountId`,
//! `creationTime`, ...), so every type here derives serde with camelCase
//! renaming.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Current wall-clock time in milliseconds since the Unix epoch, the unit of
/// [`IncomingMessage::creation_time`].
pub fn unix_millis_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or_default()
}

/// A message received from the transport, either through a notification or
/// as a search result.
///
/// Read-only to the runtime: the dispatcher and the store only inspect it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingMessage {
    /// Server-assigned message id, when the backend provides one.
    #[serde(default)]
    pub id: Option<String>,
    /// Account that authored the message.
    pub sender_account_id: String,
    /// Channel the message was posted in.
    pub channel_id: String,
    /// Text body.
    #[serde(default)]
    pub text: String,
    /// Creation time in milliseconds since the Unix epoch.
    #[serde(default)]
    pub creation_time: Option<i64>,
    /// Free-form metadata attached by the sender.
    #[serde(default)]
    pub other_data: Option<Value>,
}

impl IncomingMessage {
    /// Creates a message with the given author, channel and text.
    pub fn new(
        sender_account_id: impl Into<String>,
        channel_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            sender_account_id: sender_account_id.into(),
            channel_id: channel_id.into(),
            text: text.into(),
            creation_time: None,
            other_data: None,
        }
    }

    /// Sets the creation time (milliseconds since the Unix epoch).
    pub fn with_creation_time(mut self, millis: i64) -> Self {
        self.creation_time = Some(millis);
        self
    }

    /// Sets the metadata payload.
    pub fn with_other_data(mut self, other_data: Value) -> Self {
        self.other_data = Some(other_data);
        self
    }

    /// Returns whether the message was authored by `account_id`.
    pub fn is_from(&self, account_id: &str) -> bool {
        self.sender_account_id == account_id
    }

    /// Returns the message age relative to `now_millis`, if the message
    /// carries a creation time.
    ///
    /// Messages stamped in the future report an age of zero.
    pub fn age_at(&self, now_millis: i64) -> Option<Duration> {
        self.creation_time
            .map(|created| Duration::from_millis(now_millis.saturating_sub(created).max(0) as u64))
    }

    /// Normalises `other_data` into structured JSON.
    ///
    /// Some backends deliver the metadata as a JSON-encoded string. If it
    /// parses, it is replaced by the parsed value; otherwise it is left as is.
    pub fn conform_other_data(mut self) -> Self {
        if let Some(Value::String(raw)) = &self.other_data
            && let Ok(parsed) = serde_json::from_str::<Value>(raw)
        {
            self.other_data = Some(parsed);
        }
        self
    }

    /// Account ids listed under `otherData.highlighted`.
    pub fn highlighted(&self) -> Vec<&str> {
        self.other_data
            .as_ref()
            .and_then(|data| data.get("highlighted"))
            .and_then(Value::as_array)
            .map(|ids| ids.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

/// A batch of messages delivered to the runtime's notification handler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Backend-specific notification kind (e.g. "message").
    #[serde(default)]
    pub notification_type: String,
    /// Regular chat messages carried by the notification.
    #[serde(default)]
    pub regular_messages: Vec<IncomingMessage>,
}

impl Notification {
    /// Creates a message notification carrying the given messages.
    pub fn messages(regular_messages: Vec<IncomingMessage>) -> Self {
        Self {
            notification_type: "message".to_string(),
            regular_messages,
        }
    }
}

/// A message waiting to be sent by the outbound worker.
///
/// Immutable once enqueued; consumed exactly once.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    /// Target channel.
    pub channel_id: String,
    /// Org the channel belongs to.
    pub org_id: String,
    /// Text body.
    pub body: String,
    /// Attachment references understood by the transport.
    pub attachments: Option<Vec<String>>,
    /// Metadata sent alongside the body.
    pub other_data: Option<Value>,
    /// Accounts that should receive a push notification.
    pub push_notify_account_ids: Option<Vec<String>>,
    /// Per-send timeout passed through to the transport.
    pub timeout: Option<Duration>,
}

impl OutboundMessage {
    /// Creates a plain text message for a channel.
    pub fn new(
        org_id: impl Into<String>,
        channel_id: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            org_id: org_id.into(),
            body: body.into(),
            attachments: None,
            other_data: None,
            push_notify_account_ids: None,
            timeout: None,
        }
    }

    /// Attaches files by reference.
    pub fn with_attachments(mut self, attachments: Vec<String>) -> Self {
        self.attachments = Some(attachments);
        self
    }

    /// Sets the metadata payload.
    pub fn with_other_data(mut self, other_data: Value) -> Self {
        self.other_data = Some(other_data);
        self
    }

    /// Highlights the given accounts (stored as `otherData.highlighted`).
    pub fn with_highlight(self, account_ids: Vec<String>) -> Self {
        self.with_other_data(serde_json::json!({ "highlighted": account_ids }))
    }

    /// Requests push notifications for the given accounts.
    pub fn with_push_notify(mut self, account_ids: Vec<String>) -> Self {
        self.push_notify_account_ids = Some(account_ids);
        self
    }

    /// Sets the transport-level send timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A channel visible to the bot within an org.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    /// Channel id.
    pub id: String,
    /// Channel display name.
    pub name: String,
}

/// Membership state of an account in a channel or org.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MemberState {
    /// Owner (`o`).
    Owner,
    /// Administrator (`a`).
    Admin,
    /// Regular member (`m`).
    Member,
    /// Any state code this runtime does not interpret.
    Other(String),
}

impl MemberState {
    /// Returns whether the state grants administrative rights.
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Owner | Self::Admin)
    }

    /// The backend's single-letter state code.
    pub fn as_code(&self) -> &str {
        match self {
            Self::Owner => "o",
            Self::Admin => "a",
            Self::Member => "m",
            Self::Other(code) => code,
        }
    }
}

impl From<String> for MemberState {
    fn from(code: String) -> Self {
        match code.as_str() {
            "o" => Self::Owner,
            "a" => Self::Admin,
            "m" => Self::Member,
            _ => Self::Other(code),
        }
    }
}

impl From<MemberState> for String {
    fn from(state: MemberState) -> Self {
        state.as_code().to_string()
    }
}

/// A member of a channel or org.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberInfo {
    /// Member account id.
    pub account_id: String,
    /// Membership state.
    pub state: MemberState,
}

impl MemberInfo {
    /// Creates a member entry.
    pub fn new(account_id: impl Into<String>, state: MemberState) -> Self {
        Self {
            account_id: account_id.into(),
            state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_incoming_message_wire_names() {
        let raw = json!({
            "senderAccountId": "acct-1",
            "channelId": "chan-1",
            "text": "/hello",
            "creationTime": 1_700_000_000_000i64
        });

        let msg: IncomingMessage = serde_json::from_value(raw).unwrap();
        assert_eq!(msg.sender_account_id, "acct-1");
        assert_eq!(msg.channel_id, "chan-1");
        assert_eq!(msg.creation_time, Some(1_700_000_000_000));
        assert!(msg.other_data.is_none());
    }

    #[test]
    fn test_age_without_creation_time() {
        let msg = IncomingMessage::new("a", "c", "hi");
        assert_eq!(msg.age_at(5_000), None);
    }

    #[test]
    fn test_age_is_clamped_for_future_messages() {
        let msg = IncomingMessage::new("a", "c", "hi").with_creation_time(10_000);
        assert_eq!(msg.age_at(4_000), Some(Duration::ZERO));
        assert_eq!(msg.age_at(12_500), Some(Duration::from_millis(2_500)));
    }

    #[test]
    fn test_conform_other_data_parses_json_string() {
        let msg = IncomingMessage::new("a", "c", "hi")
            .with_other_data(Value::String(r#"{"highlighted":["bot"]}"#.to_string()))
            .conform_other_data();

        assert_eq!(msg.other_data, Some(json!({ "highlighted": ["bot"] })));
        assert_eq!(msg.highlighted(), vec!["bot"]);
    }

    #[test]
    fn test_conform_other_data_keeps_unparseable_string() {
        let msg = IncomingMessage::new("a", "c", "hi")
            .with_other_data(Value::String("not json".to_string()))
            .conform_other_data();

        assert_eq!(msg.other_data, Some(Value::String("not json".to_string())));
        assert!(msg.highlighted().is_empty());
    }

    #[test]
    fn test_member_state_codes() {
        let member: MemberInfo =
            serde_json::from_value(json!({ "accountId": "x", "state": "a" })).unwrap();
        assert_eq!(member.state, MemberState::Admin);
        assert!(member.state.is_admin());

        let other = MemberState::from("z".to_string());
        assert_eq!(other, MemberState::Other("z".to_string()));
        assert!(!other.is_admin());
        assert_eq!(String::from(MemberState::Owner), "o");
    }

    #[test]
    fn test_outbound_highlight() {
        let msg = OutboundMessage::new("org", "chan", "hey").with_highlight(vec!["u1".into()]);
        assert_eq!(msg.other_data, Some(json!({ "highlighted": ["u1"] })));
    }
}
