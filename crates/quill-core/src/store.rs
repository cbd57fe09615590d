//! Channel-backed key/value store.
//!
//! Records live as messages in a dedicated database channel, one
//! [`Record`] per message, so the channel doubles as an append-only,
//! searchable log. A per-instance cache sits in front of it:
//!
//! - [`ChannelStore::get`] serves cached keys without touching the network.
//!   A miss searches the channel once and rebuilds the values from the bot's
//!   own records. Miss results are not cached unless
//!   [`StoreSettings::cache_search_results`] is set.
//! - [`ChannelStore::push`] appends to the cache first and then enqueues the
//!   record on the outbound queue, so local reads see the value even while the
//!   send is pending or after it fails.
//!
//! A cold `get` suspends the caller for the duration of a search. Handlers
//! that need low dispatch latency should list their keys in
//! [`StoreSettings::prefetch_keys`].
//!
//! There is no cross-process consistency: another process reading the same
//! channel only ever sees what search returns.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, trace};

use crate::error::StoreResult;
use crate::message::{IncomingMessage, OutboundMessage};
use crate::outbound::Outbox;
use crate::record::Record;
use crate::transport::BoxedTransport;

/// Default name of the database channel.
pub const DEFAULT_DB_CHANNEL: &str = "QUILL_DB_CHANNEL";

/// Settings of a [`ChannelStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSettings {
    /// Org that owns the database channel.
    pub org_id: String,
    /// Name of the database channel.
    pub db_channel: String,
    /// Keys loaded into the cache when the store opens.
    pub prefetch_keys: Vec<String>,
    /// Cache the result of a miss. Off by default: every miss searches.
    pub cache_search_results: bool,
}

impl StoreSettings {
    /// Creates settings for the given org using the default channel name.
    pub fn new(org_id: impl Into<String>) -> Self {
        Self {
            org_id: org_id.into(),
            db_channel: DEFAULT_DB_CHANNEL.to_string(),
            prefetch_keys: Vec::new(),
            cache_search_results: false,
        }
    }

    /// Sets the database channel name.
    pub fn with_db_channel(mut self, name: impl Into<String>) -> Self {
        self.db_channel = name.into();
        self
    }

    /// Sets the keys to warm at open time.
    pub fn with_prefetch_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prefetch_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Enables caching of miss results.
    pub fn with_search_caching(mut self, enabled: bool) -> Self {
        self.cache_search_results = enabled;
        self
    }
}

/// Cache-first key/value store over a database channel.
pub struct ChannelStore {
    transport: BoxedTransport,
    outbox: Outbox,
    account_id: String,
    settings: StoreSettings,
    cache: Mutex<HashMap<String, Vec<Value>>>,
    binding: tokio::sync::Mutex<Option<String>>,
}

impl std::fmt::Debug for ChannelStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelStore")
            .field("account_id", &self.account_id)
            .field("settings", &self.settings)
            .field("cached_keys", &self.cache.lock().len())
            .finish()
    }
}

impl ChannelStore {
    /// Opens the store and prefetches the configured keys.
    ///
    /// Records are only trusted when authored by `account_id`.
    pub async fn open(
        transport: BoxedTransport,
        outbox: Outbox,
        account_id: impl Into<String>,
        settings: StoreSettings,
    ) -> StoreResult<Self> {
        let store = Self {
            transport,
            outbox,
            account_id: account_id.into(),
            settings,
            cache: Mutex::new(HashMap::new()),
            binding: tokio::sync::Mutex::new(None),
        };
        store.prefetch().await?;
        Ok(store)
    }

    async fn prefetch(&self) -> StoreResult<()> {
        for key in &self.settings.prefetch_keys {
            let values = self.search_records(key).await?;
            debug!(key = %key, records = values.len(), "Prefetched key");
            self.cache.lock().insert(key.clone(), values);
        }

        if !self.settings.prefetch_keys.is_empty() {
            info!(
                keys = self.settings.prefetch_keys.len(),
                db_channel = %self.settings.db_channel,
                "Channel store cache warmed"
            );
        }
        Ok(())
    }

    /// Returns every value stored under `key`, oldest first.
    pub async fn get(&self, key: &str) -> StoreResult<Vec<Value>> {
        let cached = self.cache.lock().get(key).cloned();
        if let Some(values) = cached {
            trace!(key, "Cache hit");
            return Ok(values);
        }

        let values = self.search_records(key).await?;
        if self.settings.cache_search_results {
            self.cache
                .lock()
                .entry(key.to_string())
                .or_insert_with(|| values.clone());
        }
        Ok(values)
    }

    /// Returns the most recent value stored under `key`.
    pub async fn last(&self, key: &str) -> StoreResult<Option<Value>> {
        Ok(self.get(key).await?.pop())
    }

    /// Like [`get`](Self::get), decoding every value into `T`.
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Vec<T>> {
        self.get(key)
            .await?
            .into_iter()
            .map(|value| serde_json::from_value(value).map_err(Into::into))
            .collect()
    }

    /// Appends `value` under `key`.
    ///
    /// The cache is updated before anything touches the network. An error
    /// means the database channel could not be resolved; the value stays
    /// visible to this instance either way.
    pub async fn push<V: Serialize>(&self, key: &str, value: V) -> StoreResult<()> {
        let value = serde_json::to_value(value)?;
        let body = Record::new(key, value.clone()).encode();

        self.cache
            .lock()
            .entry(key.to_string())
            .or_default()
            .push(value);

        let channel_id = self.db_channel_id().await?;
        self.outbox
            .enqueue(OutboundMessage::new(&self.settings.org_id, channel_id, body));
        debug!(key, "Record queued");
        Ok(())
    }

    /// Resolves the database channel, creating it when no channel of that
    /// name exists. The id is cached after the first resolution.
    pub async fn db_channel_id(&self) -> StoreResult<String> {
        let mut binding = self.binding.lock().await;
        if let Some(id) = binding.as_ref() {
            return Ok(id.clone());
        }

        let name = &self.settings.db_channel;
        let channels = self.transport.enumerate_channels(&self.settings.org_id).await?;
        let id = match channels.into_iter().find(|channel| &channel.name == name) {
            Some(channel) => channel.id,
            None => {
                info!(db_channel = %name, "Creating database channel");
                self.transport.new_channel(&self.settings.org_id, name).await?
            }
        };

        debug!(db_channel = %name, channel_id = %id, "Database channel bound");
        *binding = Some(id.clone());
        Ok(id)
    }

    /// Returns whether `key` is currently served from the cache.
    pub fn is_cached(&self, key: &str) -> bool {
        self.cache.lock().contains_key(key)
    }

    /// The account whose records this store trusts.
    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    /// The store settings.
    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    async fn search_records(&self, key: &str) -> StoreResult<Vec<Value>> {
        let channel_id = self.db_channel_id().await?;
        let messages = self
            .transport
            .search(&self.settings.org_id, &channel_id, key)
            .await?;
        Ok(records_from_messages(&messages, key, &self.account_id))
    }
}

/// Rebuilds the values stored under `key` from search results.
///
/// A message counts only if it was authored by `account_id` and its body is
/// a record for `key`. Everything else is skipped. Search order is kept.
pub fn records_from_messages(messages: &[IncomingMessage], key: &str, account_id: &str) -> Vec<Value> {
    messages
        .iter()
        .filter_map(|message| {
            if !message.is_from(account_id) {
                trace!(sender = %message.sender_account_id, "Skipping foreign record");
                return None;
            }
            match Record::decode(&message.text) {
                Some(record) if record.key == key => Some(record.value),
                _ => {
                    trace!(key, "Skipping message that is not a record for this key");
                    None
                }
            }
        })
        .collect()
}
