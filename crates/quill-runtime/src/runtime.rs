//! Bot lifecycle.
//!
//! A [`BotRuntime`] wires a transport, an outbound queue, a channel store
//! and a dispatcher together, then drives them:
//!
//! - [`BotRuntime::run`] starts the sender task and the notification loop,
//!   either awaiting the loop (blocking) or spawning it
//! - [`BotRuntime::cleanup`] stops both loops; it is synchronous and
//!   idempotent, so it can be called from anywhere
//! - [`BotRuntime::shutdown`] cleans up and waits for both tasks
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use quill_runtime::{BotRuntime, config::BotSettings};
//!
//! let runtime = BotRuntime::new(
//!     BotSettings::new("notesbot", org_id),
//!     transport,
//!     commands,
//! ).await?;
//!
//! runtime.run_until_signal().await?;
//! ```
//!
//! # From Configuration
//!
//! ```rust,ignore
//! let runtime = BotRuntime::builder()
//!     .config_file("quill.toml")
//!     .definition(&NotesBot)
//!     .build(transport)
//!     .await?;
//! ```

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use quill_core::{
    BoxFuture, BoxedTransport, ChannelInfo, ChannelStore, IncomingMessage, Notification,
    OutboundMessage, OutboundWorker, TransportResult, WorkerReport, outbound_queue,
};
use quill_framework::{BotDefinition, BotHandle, BotIdentity, CommandTable, Dispatcher};

use crate::config::{BotSettings, ConfigLoader, QuillConfig, validate_bot_settings};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;

/// A running (or runnable) bot.
pub struct BotRuntime {
    /// Name used in logs.
    name: String,
    settings: BotSettings,
    transport: BoxedTransport,
    dispatcher: Arc<Dispatcher>,
    stop: CancellationToken,
    /// The outbound worker until the sender task takes it.
    worker: Mutex<Option<OutboundWorker>>,
    sender_task: Mutex<Option<JoinHandle<WorkerReport>>>,
    notification_task: Mutex<Option<JoinHandle<TransportResult<()>>>>,
    running: AtomicBool,
}

impl BotRuntime {
    /// Builds a bot over `transport`.
    ///
    /// Validates `settings`, resolves the bot's account id, opens the
    /// channel store (prefetching the configured keys) and registers the
    /// dispatcher as the transport's notification handler. Nothing runs
    /// until [`run`](Self::run).
    pub async fn new(
        settings: BotSettings,
        transport: BoxedTransport,
        commands: CommandTable,
    ) -> RuntimeResult<Self> {
        validate_bot_settings(&settings)?;

        let account_id = transport.account_id().await?;
        let stop = CancellationToken::new();
        let (outbox, worker) = outbound_queue(transport.clone(), stop.clone());

        let store = ChannelStore::open(
            transport.clone(),
            outbox.clone(),
            &account_id,
            settings.store_settings(),
        )
        .await?;

        let identity = BotIdentity::new(&account_id, &settings.username, &settings.org_id);
        let bot = BotHandle::new(identity, transport.clone(), outbox, Arc::new(store));
        let dispatcher = Arc::new(Dispatcher::new(
            commands,
            bot,
            settings.message_age_limit(),
        ));

        // The dispatcher owns the transport, so the handler must not own the dispatcher.
        let weak = Arc::downgrade(&dispatcher);
        transport.set_notification_handler(Arc::new(
            move |notification: Notification| -> BoxFuture<'static, ()> {
                let weak = weak.clone();
                Box::pin(async move {
                    match weak.upgrade() {
                        Some(dispatcher) => {
                            dispatcher.handle_notification(notification).await;
                        }
                        None => debug!("Bot runtime dropped, notification ignored"),
                    }
                })
            },
        ));

        info!(
            account_id = %account_id,
            username = %settings.username,
            org_id = %settings.org_id,
            commands = dispatcher.table().len(),
            "Bot runtime initialized"
        );

        Ok(Self {
            name: settings.username.clone(),
            settings,
            transport,
            dispatcher,
            stop,
            worker: Mutex::new(Some(worker)),
            sender_task: Mutex::new(None),
            notification_task: Mutex::new(None),
            running: AtomicBool::new(false),
        })
    }

    /// Builds a bot from a [`BotDefinition`].
    pub async fn from_definition(
        settings: BotSettings,
        transport: BoxedTransport,
        definition: &dyn BotDefinition,
    ) -> RuntimeResult<Self> {
        let mut runtime = Self::new(settings, transport, definition.commands()).await?;
        runtime.name = definition.name().to_string();
        Ok(runtime)
    }

    /// Initializes logging from `config`, then builds the bot.
    pub async fn from_config(
        config: &QuillConfig,
        transport: BoxedTransport,
        commands: CommandTable,
    ) -> RuntimeResult<Self> {
        logging::init_from_config(&config.logging);

        info!(
            log_level = %config.logging.level,
            log_format = ?config.logging.format,
            "Runtime initialized from configuration"
        );

        Self::new(config.bot.clone(), transport, commands).await
    }

    /// Creates a runtime builder that loads configuration.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Starts the bot.
    ///
    /// With `block`, awaits the notification loop and shuts down when it
    /// ends, whether it ended normally or with an error. Without `block`,
    /// spawns the loop and returns; call [`shutdown`](Self::shutdown) later.
    ///
    /// Calling `run` on a running or shut down bot logs a warning and
    /// returns.
    pub async fn run(&self, block: bool) -> RuntimeResult<()> {
        if self.stop.is_cancelled() {
            warn!(bot = %self.name, "Bot runtime has been shut down and cannot run again");
            return Ok(());
        }
        if self.running.swap(true, Ordering::SeqCst) {
            warn!(bot = %self.name, "Bot runtime is already running");
            return Ok(());
        }

        self.start_sender();

        if block {
            info!(bot = %self.name, "Bot is running");
            let result = self.transport.process_notifications().await;
            if let Err(e) = &result {
                error!(bot = %self.name, error = %e, "Notification loop failed");
            }
            self.shutdown().await?;
            result?;
        } else {
            let transport = self.transport.clone();
            let handle = tokio::spawn(async move { transport.process_notifications().await });
            *self.notification_task.lock() = Some(handle);
            info!(bot = %self.name, "Bot is running in the background");
        }

        Ok(())
    }

    /// Starts in the background, waits for `shutdown`, then shuts down.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<WorkerReport>
    where
        F: Future<Output = ()>,
    {
        self.run(false).await?;
        shutdown.await;
        self.shutdown().await
    }

    /// Runs until Ctrl+C or SIGTERM.
    pub async fn run_until_signal(&self) -> RuntimeResult<WorkerReport> {
        info!(bot = %self.name, "Press Ctrl+C to stop");
        self.run_until(wait_for_shutdown()).await
    }

    /// Signals both loops to stop. Does not wait for them.
    pub fn cleanup(&self) {
        if !self.stop.is_cancelled() {
            info!(bot = %self.name, "Stopping bot runtime");
        }
        self.stop.cancel();
        self.transport.terminate();
    }

    /// Stops the bot and waits for its tasks.
    ///
    /// Returns what the outbound worker did. Messages still queued when
    /// the worker stops are dropped and counted in the report. If the bot
    /// never ran, the worker is run once here so the count is still
    /// reported.
    ///
    /// Both tasks are always joined and the bot is always marked stopped.
    /// If either task panicked, the first such failure is returned after
    /// that.
    pub async fn shutdown(&self) -> RuntimeResult<WorkerReport> {
        self.cleanup();
        let mut failure: Option<RuntimeError> = None;

        let notification = self.notification_task.lock().take();
        if let Some(handle) = notification {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(bot = %self.name, error = %e, "Notification loop failed"),
                Err(e) => {
                    error!(bot = %self.name, error = %e, "Notification task failed");
                    failure = Some(e.into());
                }
            }
        }

        let sender = self.sender_task.lock().take();
        let report = match sender {
            Some(handle) => match handle.await {
                Ok(report) => report,
                Err(e) => {
                    error!(bot = %self.name, error = %e, "Sender task failed");
                    if failure.is_none() {
                        failure = Some(e.into());
                    }
                    WorkerReport::default()
                }
            },
            None => {
                let worker = self.worker.lock().take();
                match worker {
                    Some(worker) => worker.run_forever().await,
                    None => WorkerReport::default(),
                }
            }
        };

        self.running.store(false, Ordering::SeqCst);
        info!(bot = %self.name, %report, "Bot runtime stopped");
        match failure {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    fn start_sender(&self) {
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            *self.sender_task.lock() = Some(tokio::spawn(worker.run_forever()));
        }
    }

    /// Returns whether the bot is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Name used in logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The settings the bot was built with.
    pub fn settings(&self) -> &BotSettings {
        &self.settings
    }

    /// The account id resolved from the transport.
    pub fn account_id(&self) -> &str {
        self.bot().account_id()
    }

    /// The handle passed to command handlers.
    pub fn bot(&self) -> &BotHandle {
        self.dispatcher.bot()
    }

    /// The dispatcher.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// The channel store.
    pub fn store(&self) -> &ChannelStore {
        self.bot().store()
    }

    // =========================================================================
    // Messaging
    // =========================================================================

    /// Queues a fully built message.
    pub fn send_message(&self, message: OutboundMessage) {
        self.bot().send_message(message);
    }

    /// Queues a text message for a channel of the bot's org.
    pub fn message_channel(&self, channel_id: &str, body: impl Into<String>) {
        self.bot().message_channel(channel_id, body);
    }

    /// Replies in the channel `message` came from.
    pub fn reply(&self, message: &IncomingMessage, body: impl Into<String>) {
        self.bot().reply(message, body);
    }

    /// Replies in the channel `message` came from, highlighting accounts.
    pub fn reply_highlighted(
        &self,
        message: &IncomingMessage,
        body: impl Into<String>,
        highlight: Vec<String>,
    ) {
        self.bot().reply_highlighted(message, body, highlight);
    }

    /// Lists the channels of the bot's org.
    pub async fn channels(&self) -> RuntimeResult<Vec<ChannelInfo>> {
        Ok(self.bot().channels().await?)
    }

    /// Queues `body` for every channel except the database channel.
    pub async fn message_all_channels(&self, body: impl Into<String>) -> RuntimeResult<usize> {
        Ok(self.bot().message_all_channels(body).await?)
    }
}

impl std::fmt::Debug for BotRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotRuntime")
            .field("name", &self.name)
            .field("settings", &self.settings)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl Drop for BotRuntime {
    fn drop(&mut self) {
        if self.is_running() {
            self.cleanup();
        }
    }
}

/// Waits for Ctrl+C or SIGTERM.
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => {
                        info!("Received Ctrl+C, shutting down");
                    }
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM, shutting down");
                    }
                }
                return;
            }
            Err(e) => warn!(error = %e, "Failed to register SIGTERM handler"),
        }
    }

    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => error!(error = %e, "Failed to listen for Ctrl+C, shutting down"),
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Loads configuration, then builds a [`BotRuntime`].
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    commands: CommandTable,
    name: Option<String>,
}

impl RuntimeBuilder {
    /// Creates a builder that searches the current directory.
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
            commands: CommandTable::new(),
            name: None,
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g., "development", "production").
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges configuration programmatically.
    pub fn merge(mut self, config: QuillConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Sets a single configuration value by dotted path.
    pub fn set<V: serde::Serialize>(mut self, key: &str, value: V) -> Self {
        self.config_loader = self.config_loader.set(key, value);
        self
    }

    /// Sets the command table.
    pub fn commands(mut self, commands: CommandTable) -> Self {
        self.commands = commands;
        self
    }

    /// Takes the name and command table from a bot definition.
    pub fn definition(mut self, definition: &dyn BotDefinition) -> Self {
        self.name = Some(definition.name().to_string());
        self.commands = definition.commands();
        self
    }

    /// Loads the configuration and builds the bot over `transport`.
    pub async fn build(self, transport: BoxedTransport) -> RuntimeResult<BotRuntime> {
        let config = self.config_loader.load()?;
        let mut runtime = BotRuntime::from_config(&config, transport, self.commands).await?;
        if let Some(name) = self.name {
            runtime.name = name;
        }
        Ok(runtime)
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::{LocalTransport, MemberState, Transport, unix_millis_now};
    use quill_framework::Command;
    use std::time::Duration;

    const BOT: &str = "bot-account";
    const ORG: &str = "org-1";
    const WAIT: Duration = Duration::from_secs(5);

    fn settings() -> BotSettings {
        BotSettings::new("quillbot", ORG)
    }

    fn greeter() -> CommandTable {
        CommandTable::new()
            .with(
                Command::new("/hello", |ctx| async move {
                    ctx.reply_to_sender("Hello!");
                    Ok(())
                })
                .mentioned(),
            )
            .with(
                Command::new("/coolio", |ctx| async move {
                    ctx.reply("You're an admin!");
                    Ok(())
                })
                .admin_only(),
            )
    }

    fn notes() -> CommandTable {
        CommandTable::new()
            .with(Command::new("/new ", |ctx| async move {
                let note = ctx.text().split_once("/new ").map_or("", |(_, n)| n).trim();
                ctx.store().push("note", note).await?;
                ctx.reply("Noted.");
                Ok(())
            }))
            .with(Command::new("/last", |ctx| async move {
                let reply = match ctx.store().last("note").await? {
                    Some(serde_json::Value::String(note)) => format!("Last note: {note}"),
                    _ => "No notes yet.".to_string(),
                };
                ctx.reply(reply);
                Ok(())
            }))
    }

    fn from(sender: &str, channel: &str, text: &str) -> IncomingMessage {
        IncomingMessage::new(sender, channel, text).with_creation_time(unix_millis_now())
    }

    #[tokio::test]
    async fn test_commands_answer_through_the_queue() {
        let transport = Arc::new(LocalTransport::new(BOT));
        let general = transport.add_channel(ORG, "general");
        transport.add_channel_member(&general, "admin", MemberState::Admin);

        let runtime = BotRuntime::new(settings(), transport.clone(), greeter())
            .await
            .unwrap();
        runtime.run(false).await.unwrap();
        assert!(runtime.is_running());

        transport.deliver(from("alice", &general, "/hello"));
        transport.deliver(from("alice", &general, "@QuillBot /hello"));
        transport.deliver(from("alice", &general, "/coolio"));
        transport.deliver(from("admin", &general, "/coolio"));
        assert!(transport.wait_for_sent(2, WAIT).await);

        let report = runtime.shutdown().await.unwrap();
        assert_eq!(report.sent, 2);
        assert!(!runtime.is_running());

        let sent = transport.sent();
        assert_eq!(sent[0].body, "Hello!");
        assert_eq!(
            sent[0].other_data,
            Some(serde_json::json!({ "highlighted": ["alice"] }))
        );
        assert_eq!(sent[1].body, "You're an admin!");
        assert!(transport.is_terminated());
    }

    #[tokio::test]
    async fn test_notes_survive_a_restart() {
        let transport = Arc::new(LocalTransport::new(BOT));
        let general = transport.add_channel(ORG, "general");

        let first = BotRuntime::new(settings(), transport.clone(), notes())
            .await
            .unwrap();
        first.run(false).await.unwrap();
        transport.deliver(from("alice", &general, "/new buy milk"));
        transport.deliver(from("alice", &general, "/last"));
        assert!(transport.wait_for_sent(3, WAIT).await);
        first.shutdown().await.unwrap();

        let bodies = transport.sent_bodies();
        assert!(bodies.contains(&r#"{"note":"buy milk"}"#.to_string()));
        assert!(bodies.contains(&"Last note: buy milk".to_string()));

        let mut restarted = settings();
        restarted.prefetch_keys = vec!["note".into()];
        let second = BotRuntime::new(restarted, transport.clone(), notes())
            .await
            .unwrap();
        assert!(second.store().is_cached("note"));
        assert_eq!(
            second.store().last("note").await.unwrap(),
            Some(serde_json::json!("buy milk"))
        );
    }

    #[tokio::test]
    async fn test_blocking_run_cleans_up_when_the_loop_ends() {
        let transport = Arc::new(LocalTransport::new(BOT));
        let runtime = Arc::new(
            BotRuntime::new(settings(), transport.clone(), greeter())
                .await
                .unwrap(),
        );

        let handle = tokio::spawn({
            let runtime = runtime.clone();
            async move { runtime.run(true).await }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        transport.terminate();

        tokio::time::timeout(WAIT, handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(!runtime.is_running());

        // A stopped bot does not start again.
        runtime.run(false).await.unwrap();
        assert!(!runtime.is_running());
    }

    #[tokio::test]
    async fn test_second_run_is_a_no_op() {
        let transport = Arc::new(LocalTransport::new(BOT));
        let runtime = BotRuntime::new(settings(), transport.clone(), greeter())
            .await
            .unwrap();

        runtime.run(false).await.unwrap();
        runtime.run(false).await.unwrap();
        assert!(runtime.is_running());

        runtime.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_cleanup_is_idempotent() {
        let transport = Arc::new(LocalTransport::new(BOT));
        let runtime = BotRuntime::new(settings(), transport.clone(), greeter())
            .await
            .unwrap();
        runtime.run(false).await.unwrap();

        runtime.cleanup();
        runtime.cleanup();
        assert!(transport.is_terminated());

        runtime.shutdown().await.unwrap();
        let again = runtime.shutdown().await.unwrap();
        assert_eq!(again, WorkerReport::default());
    }

    #[tokio::test]
    async fn test_shutdown_without_run_reports_dropped_messages() {
        let transport = Arc::new(LocalTransport::new(BOT));
        let general = transport.add_channel(ORG, "general");
        let runtime = BotRuntime::new(settings(), transport.clone(), greeter())
            .await
            .unwrap();

        runtime.message_channel(&general, "never sent");
        runtime.message_channel(&general, "me neither");

        let report = runtime.shutdown().await.unwrap();
        assert_eq!(report.sent, 0);
        assert_eq!(report.dropped, 2);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_skips_the_database_channel() {
        let transport = Arc::new(LocalTransport::new(BOT));
        transport.add_channel(ORG, "general");
        transport.add_channel(ORG, "random");
        transport.add_channel(ORG, "QUILL_DB_CHANNEL");

        let runtime = BotRuntime::new(settings(), transport.clone(), greeter())
            .await
            .unwrap();
        runtime.run(false).await.unwrap();

        assert_eq!(runtime.message_all_channels("hi all").await.unwrap(), 2);
        assert!(transport.wait_for_sent(2, WAIT).await);
        runtime.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_settings_are_rejected() {
        let transport = Arc::new(LocalTransport::new(BOT));
        let err = BotRuntime::new(BotSettings::new("", ORG), transport, greeter())
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Config(_)));
    }

    #[tokio::test]
    async fn test_prefetch_failure_is_a_store_error() {
        let transport = Arc::new(LocalTransport::new(BOT));
        transport.fail_searches(true);

        let mut with_prefetch = settings();
        with_prefetch.prefetch_keys = vec!["note".into()];
        let err = BotRuntime::new(with_prefetch, transport, notes())
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Store(_)));
    }

    #[tokio::test]
    async fn test_run_until_returns_the_worker_report() {
        let transport = Arc::new(LocalTransport::new(BOT));
        let general = transport.add_channel(ORG, "general");
        let runtime = BotRuntime::new(settings(), transport.clone(), greeter())
            .await
            .unwrap();

        let report = runtime
            .run_until(async {
                transport.deliver(from("alice", &general, "@quillbot /hello"));
                transport.wait_for_sent(1, WAIT).await;
            })
            .await
            .unwrap();
        assert_eq!(report.sent, 1);
    }

    #[tokio::test]
    async fn test_failing_commands_do_not_stop_the_loop() {
        let transport = Arc::new(LocalTransport::new(BOT));
        let general = transport.add_channel(ORG, "general");
        let commands = CommandTable::new()
            .with(
                Command::new("/boom", |ctx| async move {
                    ctx.reply("unreachable");
                    Ok(())
                })
                .check(|_| panic!("gate boom")),
            )
            .with(Command::new("/fail", |_ctx| async { anyhow::bail!("no luck") }))
            .with(Command::new("/panic", |_ctx| async { panic!("handler boom") }))
            .with(Command::new("/ping", |ctx| async move {
                ctx.reply("pong");
                Ok(())
            }));

        let runtime = BotRuntime::new(settings(), transport.clone(), commands)
            .await
            .unwrap();
        runtime.run(false).await.unwrap();

        transport.deliver(from("alice", &general, "/boom"));
        transport.deliver(from("alice", &general, "/fail"));
        transport.deliver(from("alice", &general, "/panic"));
        transport.deliver(from("alice", &general, "/ping"));
        assert!(transport.wait_for_sent(1, WAIT).await);
        assert!(runtime.is_running());

        let report = runtime.shutdown().await.unwrap();
        assert_eq!(report.sent, 1);
        assert_eq!(transport.sent_bodies(), vec!["pong".to_string()]);
    }

    async fn dying_loop() -> TransportResult<()> {
        panic!("notification loop died")
    }

    #[tokio::test]
    async fn test_shutdown_joins_the_sender_after_a_failed_loop() {
        let transport = Arc::new(LocalTransport::new(BOT));
        let general = transport.add_channel(ORG, "general");
        let runtime = BotRuntime::new(settings(), transport.clone(), greeter())
            .await
            .unwrap();
        runtime.run(false).await.unwrap();

        let live = runtime.notification_task.lock().replace(tokio::spawn(dying_loop()));
        runtime.message_channel(&general, "still delivered");
        assert!(transport.wait_for_sent(1, WAIT).await);

        let err = runtime.shutdown().await.unwrap_err();
        assert!(matches!(err, RuntimeError::TaskJoin(_)));
        assert!(!runtime.is_running());
        assert!(runtime.sender_task.lock().is_none());
        assert_eq!(transport.sent_bodies(), vec!["still delivered".to_string()]);

        // The replaced loop still ends once the transport is terminated.
        if let Some(handle) = live {
            tokio::time::timeout(WAIT, handle).await.unwrap().unwrap().unwrap();
        }
        assert_eq!(runtime.shutdown().await.unwrap(), WorkerReport::default());
    }
}
