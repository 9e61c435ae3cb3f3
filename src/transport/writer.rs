//! Write multiplexer.
//!
//! One task owns the socket's write half and serialises three classes of
//! outbound frames onto it:
//!
//! | Queue | Frame |
//! |-------|-------|
//! | data  | text / binary |
//! | ping  | ping |
//! | close | close |
//!
//! Producers block when a queue is full. Once shutdown is requested every
//! enqueue fails with [`Error::ConnectionClosed`], including producers that
//! were already parked on a full queue.
//!
//! Data frames are stamped with the socket epoch current at enqueue time.
//! A reconnect hands the writer a new write half together with the next
//! epoch, and data frames stamped for an earlier socket are dropped rather
//! than written to the new one.

// ============================================================================
// Imports
// ============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use futures_util::SinkExt;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};

use super::config::QueueCapacity;
use super::dial::WsSink;
use super::shutdown::ShutdownSignal;

// ============================================================================
// Constants
// ============================================================================

/// Upper bound on the goodbye close frame at exit.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

// ============================================================================
// Outbound
// ============================================================================

/// Data frame tagged with the socket epoch it was queued for.
#[derive(Debug)]
pub(crate) struct Stamped {
    epoch: u64,
    message: Message,
}

/// New write half from the reconnect controller.
pub(crate) struct Handover {
    pub(crate) epoch: u64,
    pub(crate) sink: WsSink,
}

/// Producer side of the three outbound queues.
pub(crate) struct Outbound {
    data: mpsc::Sender<Stamped>,
    ping: mpsc::Sender<Bytes>,
    close: mpsc::Sender<Option<CloseFrame>>,
    shutdown: ShutdownSignal,
    /// Epoch of the newest socket handed to the writer.
    epoch: AtomicU64,
}

/// Consumer side, owned by the writer task.
pub(crate) struct Inbox {
    data: mpsc::Receiver<Stamped>,
    ping: mpsc::Receiver<Bytes>,
    close: mpsc::Receiver<Option<CloseFrame>>,
}

/// Creates the three bounded queues.
pub(crate) fn queues(capacity: QueueCapacity, shutdown: ShutdownSignal) -> (Outbound, Inbox) {
    let (data_tx, data_rx) = mpsc::channel(capacity.data);
    let (ping_tx, ping_rx) = mpsc::channel(capacity.ping);
    let (close_tx, close_rx) = mpsc::channel(capacity.close);

    (
        Outbound {
            data: data_tx,
            ping: ping_tx,
            close: close_tx,
            shutdown,
            epoch: AtomicU64::new(0),
        },
        Inbox {
            data: data_rx,
            ping: ping_rx,
            close: close_rx,
        },
    )
}

impl Outbound {
    /// Enqueues a text or binary frame.
    pub(crate) async fn data(&self, message: Message) -> Result<()> {
        let stamped = Stamped {
            epoch: self.epoch(),
            message,
        };
        self.enqueue(&self.data, stamped).await
    }

    /// Enqueues a ping frame.
    pub(crate) async fn ping(&self, payload: Bytes) -> Result<()> {
        self.enqueue(&self.ping, payload).await
    }

    /// Enqueues a close frame.
    pub(crate) async fn close(&self, frame: Option<CloseFrame>) -> Result<()> {
        self.enqueue(&self.close, frame).await
    }

    /// Epoch new data frames are stamped with.
    #[inline]
    pub(crate) fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Stamps later data frames for the socket handed over as `epoch`.
    ///
    /// Call only after the [`Handover`] carrying `epoch` has been sent.
    #[inline]
    pub(crate) fn advance_epoch(&self, epoch: u64) {
        self.epoch.store(epoch, Ordering::Release);
    }

    async fn enqueue<T>(&self, queue: &mpsc::Sender<T>, item: T) -> Result<()> {
        if self.shutdown.is_requested() {
            return Err(Error::ConnectionClosed);
        }

        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(Error::ConnectionClosed),
            sent = queue.send(item) => sent.map_err(|_| Error::ConnectionClosed),
        }
    }
}

// ============================================================================
// Writer
// ============================================================================

/// The write multiplexer task.
pub(crate) struct Writer {
    sink: WsSink,
    /// Epoch of `sink`.
    epoch: u64,
    inbox: Inbox,
    /// Replacement write halves from the reconnect controller.
    sinks: mpsc::Receiver<Handover>,
    shutdown: ShutdownSignal,
    retry_delay: Duration,
    url: String,
}

impl Writer {
    pub(crate) fn new(
        sink: WsSink,
        inbox: Inbox,
        sinks: mpsc::Receiver<Handover>,
        shutdown: ShutdownSignal,
        retry_delay: Duration,
        url: String,
    ) -> Self {
        Self {
            sink,
            epoch: 0,
            inbox,
            sinks,
            shutdown,
            retry_delay,
            url,
        }
    }

    /// Runs until shutdown is requested.
    pub(crate) async fn run(mut self) {
        loop {
            let frame = tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => break,

                Some(handover) = self.sinks.recv() => {
                    debug!(
                        url = %self.url,
                        epoch = handover.epoch,
                        "Writer switched to new socket"
                    );
                    self.sink = handover.sink;
                    self.epoch = handover.epoch;
                    continue;
                }

                Some(frame) = self.inbox.close.recv() => Message::Close(frame),
                Some(payload) = self.inbox.ping.recv() => Message::Ping(payload),
                Some(stamped) = self.inbox.data.recv() => {
                    if stamped.epoch < self.epoch {
                        debug!(
                            url = %self.url,
                            queued_for = stamped.epoch,
                            current = self.epoch,
                            "Frame queued for previous socket, dropped"
                        );
                        continue;
                    }
                    stamped.message
                }

                else => break,
            };

            let kind = frame_kind(&frame);
            let written = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                written = self.sink.send(frame) => written,
            };

            match written {
                Ok(()) => trace!(url = %self.url, kind, "Frame written"),
                Err(e) => {
                    warn!(url = %self.url, kind, error = %e, "Write failed, frame dropped");
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = sleep(self.retry_delay) => {}
                    }
                }
            }
        }

        self.finish().await;
    }

    /// Best-effort goodbye on the current socket.
    async fn finish(&mut self) {
        let goodbye = async {
            let _ = self.sink.send(Message::Close(None)).await;
            let _ = self.sink.close().await;
        };
        if timeout(CLOSE_TIMEOUT, goodbye).await.is_err() {
            debug!(url = %self.url, "Close frame not flushed in time");
        }
        debug!(url = %self.url, "Writer terminated");
    }
}

fn frame_kind(message: &Message) -> &'static str {
    match message {
        Message::Text(_) => "text",
        Message::Binary(_) => "binary",
        Message::Ping(_) => "ping",
        Message::Pong(_) => "pong",
        Message::Close(_) => "close",
        Message::Frame(_) => "frame",
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use futures_util::StreamExt;
    use tokio::time::Instant;
    use tokio_test::{assert_pending, assert_ready, task};

    use crate::transport::ConnectionConfig;
    use crate::transport::dial::{WsSource, dial};
    use crate::transport::testing::{ServerSocket, TestServer, next_text};

    async fn socket_pair(server: &TestServer) -> (WsSink, WsSource, ServerSocket) {
        let config = ConnectionConfig::new(server.url("/ws"));
        let (client, socket) = tokio::join!(dial(&config), server.accept());
        let (sink, source) = client.unwrap().split();
        (sink, source, socket)
    }

    fn writer(
        sink: WsSink,
        inbox: Inbox,
        sinks: mpsc::Receiver<Handover>,
        shutdown: &ShutdownSignal,
        retry_delay: Duration,
    ) -> Writer {
        Writer::new(
            sink,
            inbox,
            sinks,
            shutdown.clone(),
            retry_delay,
            "ws://test".to_string(),
        )
    }

    fn tiny() -> QueueCapacity {
        QueueCapacity {
            data: 2,
            ping: 1,
            close: 1,
        }
    }

    #[tokio::test]
    async fn test_full_queue_blocks_producer() {
        let shutdown = ShutdownSignal::new();
        let (outbound, mut inbox) = queues(tiny(), shutdown.clone());

        outbound.data(Message::text("1")).await.unwrap();
        outbound.data(Message::text("2")).await.unwrap();

        let mut third = task::spawn(outbound.data(Message::text("3")));
        assert_pending!(third.poll());

        let first = inbox.data.recv().await.unwrap();
        assert_eq!(first.message, Message::text("1"));

        assert!(third.is_woken());
        assert_ready!(third.poll()).unwrap();

        assert_eq!(inbox.data.recv().await.unwrap().message, Message::text("2"));
        assert_eq!(inbox.data.recv().await.unwrap().message, Message::text("3"));
    }

    #[tokio::test]
    async fn test_shutdown_releases_blocked_producer() {
        let shutdown = ShutdownSignal::new();
        let (outbound, _inbox) = queues(tiny(), shutdown.clone());

        outbound.ping(Bytes::new()).await.unwrap();
        let mut blocked = task::spawn(outbound.ping(Bytes::new()));
        assert_pending!(blocked.poll());

        shutdown.request();
        assert!(blocked.is_woken());
        let result = assert_ready!(blocked.poll());
        assert!(matches!(result, Err(Error::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_enqueue_after_shutdown_fails_fast() {
        let shutdown = ShutdownSignal::new();
        let (outbound, _inbox) = queues(tiny(), shutdown.clone());
        shutdown.request();

        assert!(matches!(
            outbound.data(Message::text("x")).await,
            Err(Error::ConnectionClosed)
        ));
        assert!(matches!(
            outbound.close(None).await,
            Err(Error::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_data_is_stamped_with_current_epoch() {
        let (outbound, mut inbox) = queues(tiny(), ShutdownSignal::new());

        outbound.data(Message::text("before")).await.unwrap();
        outbound.advance_epoch(3);
        outbound.data(Message::text("after")).await.unwrap();

        assert_eq!(inbox.data.recv().await.unwrap().epoch, 0);
        assert_eq!(inbox.data.recv().await.unwrap().epoch, 3);
        assert_eq!(outbound.epoch(), 3);
    }

    #[tokio::test]
    async fn test_write_failure_backs_off_and_continues() {
        let server = TestServer::bind().await;
        let (mut broken, _broken_source, _broken_socket) = socket_pair(&server).await;
        let _ = broken.close().await;
        let (fresh, _source, mut socket) = socket_pair(&server).await;

        let shutdown = ShutdownSignal::new();
        let (outbound, inbox) = queues(tiny(), shutdown.clone());
        let (sinks_tx, sinks_rx) = mpsc::channel(1);
        let retry_delay = Duration::from_millis(300);
        let task = tokio::spawn(writer(broken, inbox, sinks_rx, &shutdown, retry_delay).run());

        let started = Instant::now();
        outbound.data(Message::text("lost")).await.unwrap();
        sleep(Duration::from_millis(50)).await;

        sinks_tx
            .send(Handover {
                epoch: 1,
                sink: fresh,
            })
            .await
            .unwrap();
        outbound.advance_epoch(1);
        outbound.data(Message::text("after")).await.unwrap();

        assert_eq!(next_text(&mut socket).await.unwrap(), "after");
        assert!(started.elapsed() >= retry_delay);

        shutdown.request();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_frames_for_previous_socket_are_dropped() {
        let server = TestServer::bind().await;
        let (old, old_source, mut old_socket) = socket_pair(&server).await;
        let (fresh, _source, mut socket) = socket_pair(&server).await;

        let shutdown = ShutdownSignal::new();
        let (outbound, inbox) = queues(tiny(), shutdown.clone());
        let (sinks_tx, sinks_rx) = mpsc::channel(1);

        outbound.data(Message::text("stale")).await.unwrap();
        sinks_tx
            .send(Handover {
                epoch: 1,
                sink: fresh,
            })
            .await
            .unwrap();
        outbound.advance_epoch(1);
        outbound.data(Message::text("current")).await.unwrap();

        let task = tokio::spawn(
            writer(old, inbox, sinks_rx, &shutdown, Duration::from_millis(10)).run(),
        );
        assert_eq!(next_text(&mut socket).await.unwrap(), "current");

        shutdown.request();
        task.await.unwrap();
        drop(old_source);
        assert_eq!(next_text(&mut old_socket).await, None);
    }

    #[test]
    fn test_frame_kind() {
        assert_eq!(frame_kind(&Message::text("a")), "text");
        assert_eq!(frame_kind(&Message::Ping(Bytes::new())), "ping");
        assert_eq!(frame_kind(&Message::Close(None)), "close");
    }
}
