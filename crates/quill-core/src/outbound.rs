//! Outbound message queue.
//!
//! Command handlers never talk to the transport's send path directly. They
//! push [`OutboundMessage`]s into an [`Outbox`], which never blocks, and a
//! single [`OutboundWorker`] drains the queue in FIFO order.
//!
//! ```text
//! handler ──┐
//! handler ──┼──▶ Outbox ══ unbounded FIFO ══▶ OutboundWorker ──▶ Transport::send_message
//! store   ──┘
//! ```
//!
//! # Shutdown
//!
//! Cancelling the worker's stop token makes it exit before it takes the next
//! message. A send that is already in flight is allowed to finish. Messages
//! still queued at that point are **dropped**, counted in
//! [`WorkerReport::dropped`] and logged. Callers that need durability must
//! persist their data before enqueueing.
//!
//! # Delivery
//!
//! Delivery is best-effort: a failed send is logged and discarded, never
//! retried or requeued.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::message::OutboundMessage;
use crate::transport::BoxedTransport;

/// Creates a connected outbox/worker pair.
///
/// The worker stops when `stop` is cancelled or when every [`Outbox`] clone
/// has been dropped.
pub fn outbound_queue(transport: BoxedTransport, stop: CancellationToken) -> (Outbox, OutboundWorker) {
    let (tx, rx) = mpsc::unbounded_channel();
    let outbox = Outbox { tx };
    let worker = OutboundWorker {
        rx,
        transport,
        stop,
    };
    (outbox, worker)
}

/// Producer handle of the outbound queue.
///
/// Cheap to clone; every clone feeds the same worker.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<OutboundMessage>,
}

impl Outbox {
    /// Queues a message for sending.
    ///
    /// Never blocks and never fails visibly. Once the worker has shut down
    /// the message is accepted and discarded.
    pub fn enqueue(&self, message: OutboundMessage) {
        if let Err(mpsc::error::SendError(message)) = self.tx.send(message) {
            debug!(
                channel_id = %message.channel_id,
                "Outbound worker has stopped, discarding message"
            );
        }
    }

    /// Returns whether the worker side has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Counters reported by [`OutboundWorker::run_forever`] when it exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerReport {
    /// Messages the transport accepted.
    pub sent: usize,
    /// Messages whose send failed and were discarded.
    pub failed: usize,
    /// Messages still queued at shutdown, never sent.
    pub dropped: usize,
}

impl std::fmt::Display for WorkerReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} sent, {} failed, {} dropped",
            self.sent, self.failed, self.dropped
        )
    }
}

/// The single consumer of the outbound queue.
pub struct OutboundWorker {
    rx: mpsc::UnboundedReceiver<OutboundMessage>,
    transport: BoxedTransport,
    stop: CancellationToken,
}

impl OutboundWorker {
    /// Drains the queue until the stop token is cancelled.
    ///
    /// Waits on the queue and the stop token together, so an idle worker
    /// reacts to shutdown immediately without polling.
    pub async fn run_forever(mut self) -> WorkerReport {
        info!("Outbound worker started");
        let mut report = WorkerReport::default();

        loop {
            let message = tokio::select! {
                biased;
                () = self.stop.cancelled() => break,
                next = self.rx.recv() => match next {
                    Some(message) => message,
                    None => {
                        debug!("All outboxes dropped, outbound worker exiting");
                        break;
                    }
                },
            };

            self.deliver(message, &mut report).await;
        }

        report.dropped = self.discard_pending();
        if report.dropped > 0 {
            warn!(
                dropped = report.dropped,
                "Outbound worker stopped with undelivered messages, dropping them"
            );
        }

        info!(%report, "Outbound worker has ended");
        report
    }

    async fn deliver(&self, message: OutboundMessage, report: &mut WorkerReport) {
        debug!(channel_id = %message.channel_id, "Sending queued message");

        match self.transport.send_message(&message).await {
            Ok(()) => report.sent += 1,
            Err(e) => {
                report.failed += 1;
                error!(
                    channel_id = %message.channel_id,
                    error = %e,
                    "Failed to send queued message, discarding it"
                );
            }
        }
    }

    /// Closes the queue and empties it, returning how many messages were lost.
    fn discard_pending(&mut self) -> usize {
        self.rx.close();
        let mut dropped = 0;
        while self.rx.try_recv().is_ok() {
            dropped += 1;
        }
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalTransport;
    use std::sync::Arc;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    fn setup() -> (Arc<LocalTransport>, Outbox, OutboundWorker, CancellationToken) {
        let transport = Arc::new(LocalTransport::new("bot"));
        let stop = CancellationToken::new();
        let (outbox, worker) = outbound_queue(transport.clone(), stop.clone());
        (transport, outbox, worker, stop)
    }

    #[tokio::test]
    async fn test_messages_are_sent_in_enqueue_order() {
        let (transport, outbox, worker, stop) = setup();

        for i in 0..5 {
            outbox.enqueue(OutboundMessage::new("org", "chan", format!("msg-{i}")));
        }

        let handle = tokio::spawn(worker.run_forever());
        assert!(transport.wait_for_sent(5, WAIT).await);

        stop.cancel();
        let report = handle.await.unwrap();

        assert_eq!(
            transport.sent_bodies(),
            vec!["msg-0", "msg-1", "msg-2", "msg-3", "msg-4"]
        );
        assert_eq!(report.sent, 5);
        assert_eq!(report.dropped, 0);
    }

    #[tokio::test]
    async fn test_failed_send_is_discarded_and_worker_continues() {
        let (transport, outbox, worker, stop) = setup();
        transport.fail_sends_containing("boom");

        outbox.enqueue(OutboundMessage::new("org", "chan", "first"));
        outbox.enqueue(OutboundMessage::new("org", "chan", "boom"));
        outbox.enqueue(OutboundMessage::new("org", "chan", "last"));

        let handle = tokio::spawn(worker.run_forever());
        assert!(transport.wait_for_sent(2, WAIT).await);

        stop.cancel();
        let report = handle.await.unwrap();

        assert_eq!(transport.sent_bodies(), vec!["first", "last"]);
        assert_eq!(report.failed, 1);
        assert_eq!(report.sent, 2);
    }

    #[tokio::test]
    async fn test_stop_drops_undelivered_messages() {
        let (transport, outbox, worker, stop) = setup();
        transport.pause_sends();

        outbox.enqueue(OutboundMessage::new("org", "chan", "a"));
        outbox.enqueue(OutboundMessage::new("org", "chan", "b"));
        outbox.enqueue(OutboundMessage::new("org", "chan", "c"));

        let handle = tokio::spawn(worker.run_forever());

        // "a" is in flight; the stop must not interrupt it.
        assert!(transport.wait_for_send_attempts(1, WAIT).await);
        stop.cancel();
        transport.resume_sends();

        let report = tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();

        assert_eq!(transport.sent_bodies(), vec!["a"]);
        assert_eq!(report.sent, 1);
        assert_eq!(report.dropped, 2);
    }

    #[tokio::test]
    async fn test_idle_worker_stops_promptly() {
        let (_transport, _outbox, worker, stop) = setup();
        let handle = tokio::spawn(worker.run_forever());

        stop.cancel();
        let report = tokio::time::timeout(Duration::from_millis(500), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report, WorkerReport::default());
    }

    #[tokio::test]
    async fn test_enqueue_after_shutdown_is_silent() {
        let (transport, outbox, worker, stop) = setup();
        stop.cancel();
        worker.run_forever().await;

        assert!(outbox.is_closed());
        outbox.enqueue(OutboundMessage::new("org", "chan", "late"));
        assert!(transport.sent_bodies().is_empty());
    }
}
