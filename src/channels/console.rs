//! Console channel: stdin in, stdout out.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bus::{InboundMessage, MessageBus, OutboundMessage};
use crate::error::{FemtoError, Result};

use super::Channel;

/// Channel name used by the console adapter.
pub const CONSOLE_CHANNEL: &str = "cli";

type Input = Box<dyn AsyncBufRead + Send + Unpin>;
type Output = Box<dyn Write + Send>;

/// Reads one message per line and prints replies.
///
/// Every line becomes an inbound message on `cli:<chat_id>`. Empty lines
/// are ignored; end of input stops the reader.
pub struct ConsoleChannel {
    bus: Arc<MessageBus>,
    chat_id: String,
    running: Arc<AtomicBool>,
    input: Mutex<Option<Input>>,
    output: StdMutex<Output>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl ConsoleChannel {
    /// Console on the process's stdin and stdout.
    pub fn new(bus: Arc<MessageBus>, chat_id: &str) -> Self {
        Self::with_io(
            bus,
            chat_id,
            Box::new(BufReader::new(tokio::io::stdin())),
            Box::new(std::io::stdout()),
        )
    }

    /// Console over arbitrary streams.
    pub fn with_io(bus: Arc<MessageBus>, chat_id: &str, input: Input, output: Output) -> Self {
        Self {
            bus,
            chat_id: chat_id.to_string(),
            running: Arc::new(AtomicBool::new(false)),
            input: Mutex::new(Some(input)),
            output: StdMutex::new(output),
            reader: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Channel for ConsoleChannel {
    fn name(&self) -> &str {
        CONSOLE_CHANNEL
    }

    async fn start(&self) -> Result<()> {
        let Some(input) = self.input.lock().await.take() else {
            return Err(FemtoError::Channel(
                "console input already consumed".into(),
            ));
        };
        self.running.store(true, Ordering::SeqCst);

        let bus = Arc::clone(&self.bus);
        let chat_id = self.chat_id.clone();
        let running = Arc::clone(&self.running);
        let handle = tokio::spawn(async move {
            let mut lines = input.lines();
            while running.load(Ordering::SeqCst) {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "Console read failed");
                        break;
                    }
                };
                let text = line.trim();
                if text.is_empty() {
                    continue;
                }
                let msg = InboundMessage::new(CONSOLE_CHANNEL, "user", &chat_id, text);
                if bus.publish_inbound(msg).await.is_err() {
                    break;
                }
            }
            running.store(false, Ordering::SeqCst);
            debug!("Console reader finished");
        });
        *self.reader.lock().await = Some(handle);
        info!(chat_id = %self.chat_id, "Console channel started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.reader.lock().await.take() {
            handle.abort();
        }
        Ok(())
    }

    async fn send(&self, msg: OutboundMessage) -> Result<()> {
        let mut out = self
            .output
            .lock()
            .map_err(|_| FemtoError::Channel("console output lock poisoned".into()))?;
        writeln!(out, "{}", msg.content)?;
        out.flush()?;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<StdMutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_lines_become_inbound_messages() {
        let bus = Arc::new(MessageBus::new());
        let input: Input = Box::new(BufReader::new(&b"hello\n\n  world  \n"[..]));
        let console = ConsoleChannel::with_io(bus.clone(), "me", input, Box::new(std::io::sink()));

        console.start().await.unwrap();
        let first = bus.consume_inbound().await.unwrap();
        let second = bus.consume_inbound().await.unwrap();
        assert_eq!(first.content, "hello");
        assert_eq!(second.content, "world");
        assert_eq!(second.session_key().to_string(), "cli:me");

        assert!(console.start().await.is_err());
        console.stop().await.unwrap();
        assert!(!console.is_running());
    }

    #[tokio::test]
    async fn test_send_writes_line() {
        let buf = SharedBuf::default();
        let console = ConsoleChannel::with_io(
            Arc::new(MessageBus::new()),
            "me",
            Box::new(BufReader::new(&b""[..])),
            Box::new(buf.clone()),
        );
        console
            .send(OutboundMessage::new("cli", "me", "hi there"))
            .await
            .unwrap();
        assert_eq!(String::from_utf8(buf.0.lock().unwrap().clone()).unwrap(), "hi there\n");
    }
}
