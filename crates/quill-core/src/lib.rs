//! # Quill Core
//!
//! The building blocks of the Quill bot runtime.
//!
//! ## Components
//!
//! - **Transport contract**: the [`Transport`] trait is everything the
//!   runtime needs from a messaging backend: send, search, enumerate, create
//!   channels and run a notification loop.
//! - **Message model**: [`IncomingMessage`], [`OutboundMessage`],
//!   [`Notification`] and the member/channel descriptions.
//! - **Outbound queue**: [`Outbox`] and [`OutboundWorker`] decouple senders
//!   from network latency. See [`outbound`] for the shutdown contract.
//! - **Channel store**: [`ChannelStore`] is a cache-first key/value store
//!   persisted as records in a database channel.
//! - **Local transport**: [`LocalTransport`] is an in-memory backend for
//!   demos and tests.
//!
//! ## Data Flow
//!
//! ```text
//!                ┌──────────────┐  search   ┌───────────┐
//!  handler ─────▶│ ChannelStore │──────────▶│           │
//!     │          └──────┬───────┘           │ Transport │
//!     │   enqueue       │ enqueue           │           │
//!     ▼                 ▼                   │           │
//!  ┌─────────────────────────┐   send       │           │
//!  │ Outbox ═▶ OutboundWorker│─────────────▶│           │
//!  └─────────────────────────┘              └───────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use quill_core::{ChannelStore, LocalTransport, StoreSettings, outbound_queue};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! let transport = Arc::new(LocalTransport::new("bot"));
//! let stop = CancellationToken::new();
//! let (outbox, worker) = outbound_queue(transport.clone(), stop.clone());
//! tokio::spawn(worker.run_forever());
//!
//! let store = ChannelStore::open(transport, outbox, "bot", StoreSettings::new("org")).await?;
//! store.push("note", "buy milk").await?;
//! assert_eq!(store.last("note").await?, Some("buy milk".into()));
//! ```

pub mod error;
pub mod local;
pub mod message;
pub mod outbound;
pub mod record;
pub mod store;
pub mod transport;

pub use error::{StoreError, StoreResult, TransportError, TransportResult};
pub use local::LocalTransport;
pub use message::{
    ChannelInfo, IncomingMessage, MemberInfo, MemberState, Notification, OutboundMessage,
    unix_millis_now,
};
pub use outbound::{OutboundWorker, Outbox, WorkerReport, outbound_queue};
pub use record::Record;
pub use store::{ChannelStore, DEFAULT_DB_CHANNEL, StoreSettings, records_from_messages};
pub use transport::{BoxFuture, BoxedTransport, NotificationHandler, Transport};
