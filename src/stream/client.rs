use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::config::{ConnectionState, ConnectionStats, StreamConfig};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Upper bound on the best-effort close handshake
const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(500);

/// Self-healing duplex text channel to the conversation server
///
/// Cloning is cheap; all clones drive the same connection. Inbound messages
/// are handed to the [`Inbound`] mailbox returned by [`StreamClient::new`],
/// never delivered from the network tasks directly.
#[derive(Clone)]
pub struct StreamClient {
    shared: Arc<Shared>,
}

struct Shared {
    config: StreamConfig,
    state: watch::Sender<ConnectionState>,
    outbound: Mutex<VecDeque<String>>,
    outbound_ready: Notify,
    inbound_tx: mpsc::UnboundedSender<String>,
    /// Client-level token; each connection generation gets a child
    shutdown: CancellationToken,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    attempts: AtomicU64,
    connections: AtomicU64,
    sent: AtomicU64,
    received: AtomicU64,
}

/// Ordered mailbox of complete inbound messages
///
/// Owned by the single consumer context. Reports end of stream once the
/// client is closed, even if messages are still buffered.
pub struct Inbound {
    rx: mpsc::UnboundedReceiver<String>,
    closed: CancellationToken,
}

impl Inbound {
    /// Wait for the next message
    pub async fn recv(&mut self) -> Option<String> {
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => None,
            msg = self.rx.recv() => msg,
        }
    }

    /// Take the next buffered message without waiting
    pub fn try_recv(&mut self) -> Option<String> {
        if self.closed.is_cancelled() {
            return None;
        }
        self.rx.try_recv().ok()
    }
}

impl StreamClient {
    /// Create a disconnected client and its inbound mailbox
    pub fn new(config: StreamConfig) -> (Self, Inbound) {
        // wss:// needs a process-wide provider; later installs fail harmlessly
        let _ = rustls::crypto::ring::default_provider().install_default();

        let (inbound_tx, rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let shutdown = CancellationToken::new();

        let client = Self {
            shared: Arc::new(Shared {
                config,
                state,
                outbound: Mutex::new(VecDeque::new()),
                outbound_ready: Notify::new(),
                inbound_tx,
                shutdown: shutdown.clone(),
                supervisor: Mutex::new(None),
                attempts: AtomicU64::new(0),
                connections: AtomicU64::new(0),
                sent: AtomicU64::new(0),
                received: AtomicU64::new(0),
            }),
        };

        let inbound = Inbound {
            rx,
            closed: shutdown,
        };

        (client, inbound)
    }

    /// Ensure the connection supervisor is running without waiting for it
    ///
    /// Single-flight: while a supervisor is alive (connecting, open, or
    /// waiting to retry) this is a no-op.
    pub fn start(&self) {
        if self.shared.shutdown.is_cancelled() {
            warn!("Stream client is closed; ignoring connect");
            return;
        }

        let mut supervisor = lock(&self.shared.supervisor);
        if supervisor.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        *supervisor = Some(tokio::spawn(supervise(Arc::clone(&self.shared))));
    }

    /// Connect and wait until the channel is open
    ///
    /// Retries forever at the configured interval; returns early only if the
    /// client is closed meanwhile.
    pub async fn connect(&self) {
        self.start();

        let mut state = self.shared.state.subscribe();
        tokio::select! {
            _ = self.shared.shutdown.cancelled() => {}
            _ = state.wait_for(|s| *s == ConnectionState::Open) => {}
        }
    }

    /// Queue a text payload for transmission
    ///
    /// Fire-and-forget: dropped with a warning when the channel is not open.
    pub fn send(&self, text: impl Into<String>) {
        let text = text.into();
        if text.is_empty() {
            return;
        }

        if self.state() != ConnectionState::Open {
            warn!("Not connected; message skipped ({} bytes)", text.len());
            return;
        }

        lock(&self.shared.outbound).push_back(text);
        self.shared.outbound_ready.notify_one();
    }

    /// Tear down the connection and stop reconnecting
    ///
    /// Pending payloads are discarded. Idempotent.
    pub async fn close(&self) {
        if !self.shared.shutdown.is_cancelled() {
            info!("Closing stream client");
            self.shared.shutdown.cancel();
        }

        lock(&self.shared.outbound).clear();

        let handle = lock(&self.shared.supervisor).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Stream supervisor panicked: {}", e);
            }
        }

        // The send loop may have requeued an in-flight payload on its way out
        lock(&self.shared.outbound).clear();
        self.shared.set_state(ConnectionState::Disconnected);
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Watch connection state transitions
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }

    /// Payloads waiting for the send loop
    pub fn queued(&self) -> usize {
        lock(&self.shared.outbound).len()
    }

    pub fn stats(&self) -> ConnectionStats {
        ConnectionStats {
            attempts: self.shared.attempts.load(Ordering::SeqCst),
            connections: self.shared.connections.load(Ordering::SeqCst),
            sent: self.shared.sent.load(Ordering::SeqCst),
            received: self.shared.received.load(Ordering::SeqCst),
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.shared.config
    }
}

impl Shared {
    fn set_state(&self, next: ConnectionState) {
        let changed = self.state.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            *state = next;
            true
        });

        if changed {
            debug!("Connection state -> {:?}", next);
        }
    }

    /// Attempt to open the channel until it succeeds or the client is closed
    async fn open_with_retry(&self) -> Option<WsStream> {
        self.set_state(ConnectionState::Connecting);

        loop {
            if self.shutdown.is_cancelled() {
                return None;
            }

            self.attempts.fetch_add(1, Ordering::SeqCst);
            info!("Connecting to {}...", self.config.url);

            let attempt = tokio::time::timeout(
                self.config.connect_timeout(),
                tokio_tungstenite::connect_async(self.config.url.as_str()),
            );

            let result = tokio::select! {
                _ = self.shutdown.cancelled() => return None,
                result = attempt => result,
            };

            match result {
                Ok(Ok((ws, _response))) => return Some(ws),
                Ok(Err(e)) => warn!("Connection failed: {}", e),
                Err(_) => warn!(
                    "Connection attempt timed out after {} ms",
                    self.config.connect_timeout_ms
                ),
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => return None,
                _ = tokio::time::sleep(self.config.reconnect_interval()) => {}
            }
        }
    }

    fn pop_outbound(&self) -> Option<String> {
        lock(&self.outbound).pop_front()
    }

    fn requeue_front(&self, payload: String) {
        if self.shutdown.is_cancelled() {
            return;
        }
        lock(&self.outbound).push_front(payload);
    }
}

/// Owns reconnection: one connection generation at a time
async fn supervise(shared: Arc<Shared>) {
    while let Some(ws) = shared.open_with_retry().await {
        let generation = shared.shutdown.child_token();
        let (sink, source) = ws.split();

        shared.connections.fetch_add(1, Ordering::SeqCst);
        shared.set_state(ConnectionState::Open);
        info!("Connected to {}", shared.config.url);

        let recv_task = tokio::spawn(receive_loop(
            Arc::clone(&shared),
            source,
            generation.clone(),
        ));
        let send_task = tokio::spawn(send_loop(Arc::clone(&shared), sink, generation.clone()));

        // Only the receive side decides that a generation is over
        if let Err(e) = recv_task.await {
            error!("Receive task panicked: {}", e);
        }
        generation.cancel();
        if let Err(e) = send_task.await {
            error!("Send task panicked: {}", e);
        }

        shared.set_state(ConnectionState::Disconnected);

        if shared.shutdown.is_cancelled() {
            break;
        }
        info!("Connection lost; reconnecting");
    }

    shared.set_state(ConnectionState::Disconnected);
    debug!("Stream supervisor stopped");
}

async fn receive_loop(shared: Arc<Shared>, mut source: WsSource, generation: CancellationToken) {
    loop {
        let frame = tokio::select! {
            _ = generation.cancelled() => break,
            frame = source.next() => frame,
        };

        // tungstenite reassembles continuation frames into whole messages
        let text = match frame {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(_) => {
                    warn!("Dropping binary frame that is not valid UTF-8");
                    continue;
                }
            },
            Some(Ok(Message::Close(frame))) => {
                warn!("Server closed connection: {:?}", frame);
                break;
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                warn!("Receive error: {}", e);
                break;
            }
            None => {
                warn!("Connection stream ended");
                break;
            }
        };

        if generation.is_cancelled() {
            break;
        }

        shared.received.fetch_add(1, Ordering::SeqCst);
        if shared.inbound_tx.send(text).is_err() {
            debug!("Inbound mailbox dropped; discarding message");
        }
    }
}

async fn send_loop(shared: Arc<Shared>, mut sink: WsSink, generation: CancellationToken) {
    'generation: loop {
        while let Some(payload) = shared.pop_outbound() {
            // A feed that has not completed buffered nothing, so the payload can be retried
            let fed = tokio::select! {
                biased;
                _ = generation.cancelled() => {
                    shared.requeue_front(payload);
                    break 'generation;
                }
                result = sink.feed(Message::Text(payload.clone())) => result,
            };

            if let Err(e) = fed {
                warn!("Send error: {}", e);
                shared.requeue_front(payload);
                break 'generation;
            }

            // Once buffered, the frame belongs to this connection and is never resent
            let flushed = tokio::select! {
                biased;
                _ = generation.cancelled() => {
                    debug!("Connection ended while flushing; last payload may be lost");
                    break 'generation;
                }
                result = sink.flush() => result,
            };

            if let Err(e) = flushed {
                warn!("Flush error, last payload may be lost: {}", e);
                break 'generation;
            }

            shared.sent.fetch_add(1, Ordering::SeqCst);
        }

        tokio::select! {
            _ = generation.cancelled() => break,
            _ = shared.outbound_ready.notified() => {}
        }
    }

    if shared.shutdown.is_cancelled() {
        let handshake = async {
            sink.send(Message::Close(None)).await?;
            sink.close().await
        };

        match tokio::time::timeout(CLOSE_HANDSHAKE_TIMEOUT, handshake).await {
            Ok(Ok(())) => debug!("Close handshake sent"),
            Ok(Err(e)) => debug!("Close handshake failed: {}", e),
            Err(_) => debug!("Close handshake timed out"),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
