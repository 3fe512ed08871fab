// Shared fixtures for integration tests
//
// A loopback WebSocket server standing in for the conversation server, plus
// fake collaborators whose probes let tests drive and observe them.

#![allow(dead_code)]

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use loqa_converse::capability::{
    ImageCapture, PlaybackDone, SpeechSink, TranscriptEvent, TranscriptionSource,
};
use loqa_converse::CapturedImage;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

pub const WAIT: Duration = Duration::from_secs(5);

/// Fail the test instead of hanging
pub async fn within<F: Future>(fut: F) -> Result<F::Output> {
    tokio::time::timeout(WAIT, fut)
        .await
        .context("timed out waiting")
}

/// Poll `cond` until it holds
pub async fn eventually(mut cond: impl FnMut() -> bool) -> Result<()> {
    within(async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
}

// ============================================================================
// Loopback server
// ============================================================================

pub struct TestServer {
    pub addr: SocketAddr,
    connections: mpsc::UnboundedReceiver<ServerConn>,
    accept_task: JoinHandle<()>,
}

impl TestServer {
    pub async fn bind() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        Ok(Self::serve(listener))
    }

    /// Serve on a listener the test already owns
    pub fn serve(listener: TcpListener) -> Self {
        let addr = listener.local_addr().expect("listener address");
        let (tx, connections) = mpsc::unbounded_channel();

        let accept_task = tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                match tokio_tungstenite::accept_async(tcp).await {
                    Ok(ws) => {
                        if tx.send(ServerConn { ws }).is_err() {
                            break;
                        }
                    }
                    Err(e) => eprintln!("handshake failed: {e}"),
                }
            }
        });

        Self {
            addr,
            connections,
            accept_task,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub async fn next_connection(&mut self) -> Result<ServerConn> {
        within(self.connections.recv())
            .await?
            .context("server stopped accepting")
    }

    /// Check for a connection without waiting
    pub fn try_next_connection(&mut self) -> Option<ServerConn> {
        self.connections.try_recv().ok()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

pub struct ServerConn {
    ws: WebSocketStream<TcpStream>,
}

impl ServerConn {
    /// Next text message, or `None` once the client closed
    pub async fn recv_text(&mut self) -> Result<Option<String>> {
        within(async {
            while let Some(frame) = self.ws.next().await {
                match frame {
                    Ok(Message::Text(text)) => return Some(text),
                    Ok(Message::Close(_)) | Err(_) => return None,
                    Ok(_) => continue,
                }
            }
            None
        })
        .await
    }

    pub async fn send_text(&mut self, text: &str) -> Result<()> {
        self.ws.send(Message::Text(text.to_string())).await?;
        Ok(())
    }
}

// ============================================================================
// Fake collaborators
// ============================================================================

pub struct FakeTranscriber {
    capturing: Arc<AtomicBool>,
    starts: Arc<AtomicUsize>,
    events: Option<mpsc::UnboundedReceiver<TranscriptEvent>>,
}

/// Test side of a [`FakeTranscriber`]
#[derive(Clone)]
pub struct TranscriberProbe {
    tx: mpsc::UnboundedSender<TranscriptEvent>,
    capturing: Arc<AtomicBool>,
    starts: Arc<AtomicUsize>,
}

pub fn fake_transcriber() -> (FakeTranscriber, TranscriberProbe) {
    let (tx, rx) = mpsc::unbounded_channel();
    let capturing = Arc::new(AtomicBool::new(false));
    let starts = Arc::new(AtomicUsize::new(0));

    (
        FakeTranscriber {
            capturing: Arc::clone(&capturing),
            starts: Arc::clone(&starts),
            events: Some(rx),
        },
        TranscriberProbe {
            tx,
            capturing,
            starts,
        },
    )
}

impl TranscriberProbe {
    pub fn say(&self, text: &str) {
        self.tx
            .send(TranscriptEvent::Final(text.to_string()))
            .expect("session dropped transcripts");
    }

    pub fn partial(&self, text: &str) {
        self.tx
            .send(TranscriptEvent::Partial(text.to_string()))
            .expect("session dropped transcripts");
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl TranscriptionSource for FakeTranscriber {
    async fn start_capture(&mut self) -> Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.capturing.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_capture(&mut self) -> Result<()> {
        self.capturing.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<TranscriptEvent>> {
        self.events.take()
    }

    fn name(&self) -> &str {
        "fake"
    }
}

#[derive(Default)]
struct SpeakerShared {
    spoken: Mutex<Vec<String>>,
    current: Mutex<Option<oneshot::Sender<()>>>,
    stops: AtomicUsize,
}

/// Speech sink that finishes only when the test says so
pub struct FakeSpeaker {
    shared: Arc<SpeakerShared>,
}

#[derive(Clone)]
pub struct SpeakerProbe {
    shared: Arc<SpeakerShared>,
}

pub fn fake_speaker() -> (FakeSpeaker, SpeakerProbe) {
    let shared = Arc::new(SpeakerShared::default());
    (
        FakeSpeaker {
            shared: Arc::clone(&shared),
        },
        SpeakerProbe { shared },
    )
}

impl SpeakerProbe {
    pub fn spoken(&self) -> Vec<String> {
        self.shared.spoken.lock().unwrap().clone()
    }

    /// Signal completion of the current playback
    pub fn finish(&self) {
        if let Some(done) = self.shared.current.lock().unwrap().take() {
            let _ = done.send(());
        }
    }

    pub fn stops(&self) -> usize {
        self.shared.stops.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SpeechSink for FakeSpeaker {
    async fn speak_now(&mut self, text: &str) -> Result<PlaybackDone> {
        let (tx, rx) = oneshot::channel();
        self.shared.spoken.lock().unwrap().push(text.to_string());
        // Replacing the sender interrupts the previous playback
        *self.shared.current.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.shared.stops.fetch_add(1, Ordering::SeqCst);
        self.shared.current.lock().unwrap().take();
        Ok(())
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// Image capture with a canned outcome
pub struct FakeCamera {
    image: Option<CapturedImage>,
}

impl FakeCamera {
    pub fn failing() -> Self {
        Self { image: None }
    }

    pub fn returning(image: CapturedImage) -> Self {
        Self { image: Some(image) }
    }
}

impl ImageCapture for FakeCamera {
    fn try_capture(&mut self) -> Result<CapturedImage> {
        self.image.clone().context("camera is not playing")
    }
}
