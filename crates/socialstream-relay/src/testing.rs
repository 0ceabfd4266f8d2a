//! Scripted in-memory transport for unit tests.

use crate::RelayError;
use crate::transport::{Connector, Transport};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Counters shared between a test and the transports it scripts.
#[derive(Debug, Clone, Default)]
pub(crate) struct Probe {
    pub sent: Arc<Mutex<Vec<String>>>,
    pub connects: Arc<AtomicUsize>,
    pub connected: Arc<AtomicUsize>,
    pub closes: Arc<AtomicUsize>,
}

impl Probe {
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_tags(&self) -> Vec<String> {
        self.sent()
            .iter()
            .map(|frame| {
                let value: serde_json::Value = serde_json::from_str(frame).unwrap();
                value["type"].as_str().unwrap().to_string()
            })
            .collect()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn connected(&self) -> usize {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// Connector whose server side is driven by the test through `server`.
pub(crate) struct ScriptedConnector {
    pub probe: Probe,
    pub connect_delay: Duration,
    pub close_delay: Duration,
    /// 1-based index of the send that fails.
    pub fail_send_at: Option<usize>,
    pub refuse: bool,
    frames: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
}

impl ScriptedConnector {
    /// Returns the connector and the sender the test uses to push server
    /// frames. Dropping the sender closes the connection from the server side.
    pub fn new() -> (Self, mpsc::UnboundedSender<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Self {
            probe: Probe::default(),
            connect_delay: Duration::ZERO,
            close_delay: Duration::ZERO,
            fail_send_at: None,
            refuse: false,
            frames: Mutex::new(Some(rx)),
        };
        (connector, tx)
    }
}

impl Connector for ScriptedConnector {
    type Transport = ScriptedTransport;

    async fn connect(&self, _url: &str) -> Result<ScriptedTransport, RelayError> {
        self.probe.connects.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.connect_delay).await;
        if self.refuse {
            return Err(RelayError::Transport("connection refused".into()));
        }
        let frames = self.frames.lock().unwrap().take().unwrap_or_else(|| {
            let (_, rx) = mpsc::unbounded_channel();
            rx
        });
        self.probe.connected.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptedTransport {
            probe: self.probe.clone(),
            frames,
            close_delay: self.close_delay,
            fail_send_at: self.fail_send_at,
            attempts: 0,
        })
    }
}

pub(crate) struct ScriptedTransport {
    probe: Probe,
    frames: mpsc::UnboundedReceiver<String>,
    close_delay: Duration,
    fail_send_at: Option<usize>,
    attempts: usize,
}

impl Transport for ScriptedTransport {
    async fn send(&mut self, frame: String) -> Result<(), RelayError> {
        self.attempts += 1;
        if self.fail_send_at == Some(self.attempts) {
            return Err(RelayError::Transport("broken pipe".into()));
        }
        self.probe.sent.lock().unwrap().push(frame);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, RelayError>> {
        self.frames.recv().await.map(Ok)
    }

    async fn close(self) -> Result<(), RelayError> {
        tokio::time::sleep(self.close_delay).await;
        self.probe.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Poll `cond` until it holds or `timeout` passes.
pub(crate) fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

pub(crate) fn server_msg(role: &str, content: &str) -> String {
    serde_json::json!({
        "type": "SERVER_MSG",
        "data": {"role": role, "content": content, "type": "said"}
    })
    .to_string()
}
