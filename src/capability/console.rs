use anyhow::Result;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{PlaybackDone, SpeechSink, TranscriptEvent, TranscriptionSource};

/// Treats each line typed on stdin as a final transcript
///
/// Lines entered while capture is stopped are dropped, the same way a
/// microphone would not hear them.
pub struct StdinTranscriber {
    capturing: Arc<AtomicBool>,
    events: Option<mpsc::UnboundedReceiver<TranscriptEvent>>,
    /// Only set for async readers; blocking readers run on a detached thread
    reader_task: Option<JoinHandle<()>>,
}

impl StdinTranscriber {
    /// Read the process's stdin
    ///
    /// Stdin is read on a dedicated OS thread. A blocking read cannot be
    /// cancelled, and on a runtime blocking task it would keep the process
    /// alive after Ctrl-C until the next line arrives.
    pub fn new() -> Self {
        Self::from_blocking_reader(std::io::BufReader::new(std::io::stdin()))
    }

    /// Read lines from a blocking source on a detached thread
    ///
    /// The thread ends at EOF, on a read error, or on the first line after
    /// the event receiver is dropped.
    pub fn from_blocking_reader<R>(reader: R) -> Self
    where
        R: std::io::BufRead + Send + 'static,
    {
        let capturing = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::unbounded_channel();

        let is_capturing = Arc::clone(&capturing);
        let spawned = std::thread::Builder::new()
            .name("stdin-transcriber".to_string())
            .spawn(move || {
                for line in reader.lines() {
                    let line = match line {
                        Ok(line) => line,
                        Err(e) => {
                            warn!("Failed to read transcript line: {}", e);
                            break;
                        }
                    };

                    if !forward_line(&is_capturing, &tx, line) {
                        break;
                    }
                }

                debug!("Transcript reader stopped");
            });

        // The sender went down with the closure, so the session sees a closed stream
        if let Err(e) = spawned {
            error!("Failed to start transcript reader thread: {}", e);
        }

        Self {
            capturing,
            events: Some(rx),
            reader_task: None,
        }
    }

    /// Read lines from any async source (used by tests)
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let capturing = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::unbounded_channel();

        let is_capturing = Arc::clone(&capturing);
        let reader_task = tokio::spawn(async move {
            let mut lines = reader.lines();

            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Failed to read transcript line: {}", e);
                        break;
                    }
                };

                if !forward_line(&is_capturing, &tx, line) {
                    break;
                }
            }

            debug!("Transcript reader stopped");
        });

        Self {
            capturing,
            events: Some(rx),
            reader_task: Some(reader_task),
        }
    }
}

/// Returns false once nobody is listening for transcripts
fn forward_line(
    capturing: &AtomicBool,
    tx: &mpsc::UnboundedSender<TranscriptEvent>,
    line: String,
) -> bool {
    if !capturing.load(Ordering::SeqCst) {
        debug!("Not capturing; dropping input line");
        return true;
    }

    tx.send(TranscriptEvent::Final(line)).is_ok()
}

impl Default for StdinTranscriber {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for StdinTranscriber {
    fn drop(&mut self) {
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
    }
}

#[async_trait::async_trait]
impl TranscriptionSource for StdinTranscriber {
    async fn start_capture(&mut self) -> Result<()> {
        if !self.capturing.swap(true, Ordering::SeqCst) {
            print!("you> ");
            std::io::stdout().flush().ok();
        }
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
        "stdin"
    }
}

/// Prints replies and simulates playback time proportional to their length
pub struct ConsoleSpeaker {
    per_word: Duration,
    current: Option<JoinHandle<()>>,
}

impl ConsoleSpeaker {
    pub fn new(per_word: Duration) -> Self {
        Self {
            per_word,
            current: None,
        }
    }

    fn interrupt(&mut self) {
        if let Some(task) = self.current.take() {
            task.abort();
        }
    }
}

impl Default for ConsoleSpeaker {
    fn default() -> Self {
        Self::new(Duration::from_millis(250))
    }
}

#[async_trait::async_trait]
impl SpeechSink for ConsoleSpeaker {
    async fn speak_now(&mut self, text: &str) -> Result<PlaybackDone> {
        self.interrupt();

        println!("agent> {}", text);

        let words = text.split_whitespace().count().max(1) as u32;
        let duration = self.per_word * words;
        let (done_tx, done_rx) = oneshot::channel();

        self.current = Some(tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = done_tx.send(());
        }));

        info!("Speaking {} words (~{} ms)", words, duration.as_millis());

        Ok(done_rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.interrupt();
        Ok(())
    }

    fn name(&self) -> &str {
        "console"
    }
}

impl Drop for ConsoleSpeaker {
    fn drop(&mut self) {
        self.interrupt();
    }
}
