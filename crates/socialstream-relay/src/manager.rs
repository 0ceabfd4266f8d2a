//! Connection manager.
//!
//! Bridges the render loop, which must never block on the network, and one
//! persistent connection driven by a dedicated background thread. The two
//! sides share exactly three things: the outbound queue, the inbound queue,
//! and the session status. The transport itself never leaves the background
//! thread.

use crate::status::{ClosedNotifier, ClosedSignal, SharedStatus, closed_signal};
use crate::transport::{Connector, Transport, WsConnector};
use crate::{RelayConfig, RelayError, RelayEvent};
use socialstream_core::{InboundEvent, OutboundCommand, SessionStatus};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Timeouts applied by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerOptions {
    pub shutdown_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self::from(&RelayConfig::default())
    }
}

impl From<&RelayConfig> for ManagerOptions {
    fn from(config: &RelayConfig) -> Self {
        Self {
            shutdown_timeout: config.shutdown_timeout(),
            connect_timeout: config.connect_timeout(),
        }
    }
}

/// Outcome of [`ConnectionManager::stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stopped {
    /// Nothing was running.
    NotRunning,
    /// The background context closed within the timeout.
    Confirmed,
    /// Still closing; a later [`ConnectionManager::poll`] will observe it.
    TimedOut,
}

/// Owns one connection handle at a time.
pub struct ConnectionManager<C: Connector = WsConnector> {
    connector: Arc<C>,
    options: ManagerOptions,
    status: SharedStatus,
    outbound_tx: mpsc::UnboundedSender<OutboundCommand>,
    /// Receiver waiting for the next session; `None` while a session owns it.
    pending_outbound: Option<mpsc::UnboundedReceiver<OutboundCommand>>,
    inbound_tx: mpsc::UnboundedSender<RelayEvent>,
    inbound_rx: mpsc::UnboundedReceiver<RelayEvent>,
    handle: Option<SessionHandle>,
}

/// Foreground view of one background session.
struct SessionHandle {
    url: String,
    cancel: CancellationToken,
    closed: ClosedSignal,
    thread: Option<JoinHandle<()>>,
}

impl ConnectionManager<WsConnector> {
    /// Websocket manager configured from `config`.
    pub fn from_config(config: &RelayConfig) -> Self {
        Self::with_connector(WsConnector, ManagerOptions::from(config))
    }
}

impl<C: Connector> ConnectionManager<C> {
    pub fn with_connector(connector: C, options: ManagerOptions) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            connector: Arc::new(connector),
            options,
            status: SharedStatus::default(),
            outbound_tx,
            pending_outbound: Some(outbound_rx),
            inbound_tx,
            inbound_rx,
            handle: None,
        }
    }

    /// Current status. Does not reap a finished session; see [`Self::poll`].
    pub fn status(&self) -> SessionStatus {
        self.status.get()
    }

    pub fn is_running(&self) -> bool {
        self.status().is_active()
    }

    /// URL of the live session, if any.
    pub fn url(&self) -> Option<&str> {
        self.handle.as_ref().map(|h| h.url.as_str())
    }

    /// Start a session against `url` without blocking.
    ///
    /// Fails with [`RelayError::AlreadyRunning`] while a previous session is
    /// running or still closing, so there is never a second live transport.
    pub fn start(&mut self, url: &str) -> Result<(), RelayError> {
        self.poll();
        if self.handle.is_some() {
            tracing::warn!("start ignored: session to {} still active", url);
            return Err(RelayError::AlreadyRunning);
        }

        let outbound_rx = match self.pending_outbound.take() {
            Some(rx) => rx,
            None => {
                let (tx, rx) = mpsc::unbounded_channel();
                self.outbound_tx = tx;
                rx
            }
        };
        let cancel = CancellationToken::new();
        let (notifier, closed) = closed_signal();

        let session = BackgroundSession {
            connector: Arc::clone(&self.connector),
            url: url.to_string(),
            connect_timeout: self.options.connect_timeout,
            cancel: cancel.clone(),
            outbound: outbound_rx,
            inbound: self.inbound_tx.clone(),
        };
        let guard = CloseGuard {
            status: self.status.clone(),
            notifier: Some(notifier),
        };

        self.status.set(SessionStatus::Running);
        let thread = std::thread::Builder::new()
            .name("socialstream-relay".to_string())
            .spawn(move || session.run(guard));

        match thread {
            Ok(thread) => {
                tracing::info!("session started: {}", url);
                self.handle = Some(SessionHandle {
                    url: url.to_string(),
                    cancel,
                    closed,
                    thread: Some(thread),
                });
                Ok(())
            }
            Err(e) => {
                // The closure (and the guard in it) is dropped, which resets
                // the status; the outbound receiver went with it.
                tracing::warn!("failed to spawn relay thread: {}", e);
                Err(RelayError::Spawn(e))
            }
        }
    }

    /// Queue a command for the server. Never blocks.
    ///
    /// Commands queued before the transport connects are delivered once it
    /// does, in order. Once a session has ended the command is dropped and
    /// [`RelayError::SessionClosed`] is returned.
    pub fn send(&self, command: OutboundCommand) -> Result<(), RelayError> {
        let tag = command.tag();
        self.outbound_tx.send(command).map_err(|_| {
            tracing::warn!("dropping {}: session closed", tag);
            RelayError::SessionClosed
        })
    }

    /// Request shutdown and wait (bounded) for the background context.
    pub fn stop(&mut self) -> Stopped {
        self.poll();
        let Some(handle) = self.handle.as_mut() else {
            return Stopped::NotRunning;
        };

        handle.cancel.cancel();
        self.status
            .transition(SessionStatus::Running, SessionStatus::Closing);

        if handle.closed.wait(self.options.shutdown_timeout) {
            self.reap();
            Stopped::Confirmed
        } else {
            tracing::warn!(
                "session to {} still shutting down after {:?}",
                handle.url,
                self.options.shutdown_timeout
            );
            Stopped::TimedOut
        }
    }

    /// Reap a session whose background context has finished. Never blocks.
    pub fn poll(&mut self) -> SessionStatus {
        if let Some(handle) = self.handle.as_mut()
            && handle.closed.is_set()
        {
            self.reap();
        }
        self.status()
    }

    /// Next inbound event, if any.
    pub fn try_recv(&mut self) -> Option<RelayEvent> {
        self.inbound_rx.try_recv().ok()
    }

    /// Every inbound event queued so far, in arrival order.
    pub fn drain(&mut self) -> Vec<RelayEvent> {
        std::iter::from_fn(|| self.inbound_rx.try_recv().ok()).collect()
    }

    fn reap(&mut self) {
        let Some(mut handle) = self.handle.take() else {
            return;
        };
        if let Some(thread) = handle.thread.take() {
            // The closed signal fires as the thread unwinds its last frame,
            // so this join is immediate.
            if thread.join().is_err() {
                tracing::warn!("relay thread for {} panicked", handle.url);
            }
        }
        tracing::info!("session closed: {}", handle.url);
    }
}

impl<C: Connector> Drop for ConnectionManager<C> {
    fn drop(&mut self) {
        if let Some(handle) = &self.handle {
            handle.cancel.cancel();
        }
    }
}

/// Fires the closed signal exactly once when the background thread exits,
/// whichever way it exits.
struct CloseGuard {
    status: SharedStatus,
    notifier: Option<ClosedNotifier>,
}

impl Drop for CloseGuard {
    fn drop(&mut self) {
        self.status.set(SessionStatus::Idle);
        if let Some(notifier) = self.notifier.take() {
            notifier.notify();
        }
    }
}

/// Why the background loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Cancelled,
    EndSim,
    RemoteClosed,
    SendFailed,
    ManagerDropped,
}

/// Everything the background thread owns.
struct BackgroundSession<C: Connector> {
    connector: Arc<C>,
    url: String,
    connect_timeout: Duration,
    cancel: CancellationToken,
    outbound: mpsc::UnboundedReceiver<OutboundCommand>,
    inbound: mpsc::UnboundedSender<RelayEvent>,
}

impl<C: Connector> BackgroundSession<C> {
    fn run(self, guard: CloseGuard) {
        let _guard = guard;
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                self.push(RelayEvent::ConnectFailed {
                    reason: format!("runtime unavailable: {e}"),
                });
                return;
            }
        };
        runtime.block_on(self.drive());
    }

    async fn drive(mut self) {
        let connect = tokio::time::timeout(self.connect_timeout, self.connector.connect(&self.url));
        let connected = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                tracing::debug!("cancelled while connecting to {}", self.url);
                return;
            }
            result = connect => result,
        };

        let mut transport = match connected {
            Ok(Ok(transport)) => transport,
            Ok(Err(e)) => {
                tracing::warn!("connection to {} failed: {}", self.url, e);
                self.push(RelayEvent::ConnectFailed {
                    reason: e.to_string(),
                });
                return;
            }
            Err(_) => {
                let e = RelayError::ConnectTimeout {
                    url: self.url.clone(),
                };
                tracing::warn!("{}", e);
                self.push(RelayEvent::ConnectFailed {
                    reason: e.to_string(),
                });
                return;
            }
        };
        tracing::info!("connected to {}", self.url);

        let exit = self.pump(&mut transport).await;
        tracing::debug!("relay loop for {} exited: {:?}", self.url, exit);

        let discarded = self.discard_outbound();
        if discarded > 0 {
            tracing::debug!("discarded {} queued commands", discarded);
        }

        if let Err(e) = transport.close().await {
            tracing::debug!("error closing transport to {}: {}", self.url, e);
        }
    }

    /// Interleave the send and receive duties until one of them ends the
    /// session. Inbound frames win ties so an `END_SIM` stops forwarding of
    /// anything still queued.
    async fn pump(&mut self, transport: &mut C::Transport) -> Exit {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Exit::Cancelled,
                frame = transport.recv() => match frame {
                    Some(Ok(text)) => {
                        tracing::debug!("<- {}", text);
                        let event = InboundEvent::decode(&text);
                        let end = event == InboundEvent::EndSim;
                        self.push(event.into());
                        if end {
                            return Exit::EndSim;
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!("receive from {} failed: {}", self.url, e);
                        self.push(RelayEvent::Disconnected {
                            reason: Some(e.to_string()),
                        });
                        return Exit::RemoteClosed;
                    }
                    None => {
                        self.push(RelayEvent::Disconnected { reason: None });
                        return Exit::RemoteClosed;
                    }
                },
                command = self.outbound.recv() => {
                    let Some(command) = command else {
                        return Exit::ManagerDropped;
                    };
                    let frame = match command.encode() {
                        Ok(frame) => frame,
                        Err(e) => {
                            tracing::warn!("dropping unencodable {}: {}", command.tag(), e);
                            continue;
                        }
                    };
                    tracing::debug!("-> {}", frame);
                    if let Err(e) = transport.send(frame).await {
                        tracing::warn!("failed to send {}: {}", command.tag(), e);
                        self.push(RelayEvent::SendFailed {
                            reason: e.to_string(),
                        });
                        return Exit::SendFailed;
                    }
                }
            }
        }
    }

    fn discard_outbound(&mut self) -> usize {
        self.outbound.close();
        std::iter::from_fn(|| self.outbound.try_recv().ok()).count()
    }

    fn push(&self, event: RelayEvent) {
        // Only fails if the manager is gone, in which case nobody is listening.
        let _ = self.inbound.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedConnector, server_msg, wait_until};
    use std::time::Instant;

    const URL: &str = "ws://test/ws/simulation?token=t";
    const PATIENCE: Duration = Duration::from_secs(5);

    fn options(shutdown_ms: u64) -> ManagerOptions {
        ManagerOptions {
            shutdown_timeout: Duration::from_millis(shutdown_ms),
            connect_timeout: Duration::from_secs(5),
        }
    }

    fn start_sim() -> OutboundCommand {
        OutboundCommand::start_sim(
            "env",
            ["a1".into(), "a2".into()],
            ["m1".into(), "m2".into()],
        )
    }

    fn drain_until(manager: &mut ConnectionManager<ScriptedConnector>, n: usize) -> Vec<RelayEvent> {
        let mut events = Vec::new();
        wait_until(PATIENCE, || {
            events.extend(manager.drain());
            events.len() >= n
        });
        events
    }

    #[test]
    fn commands_sent_before_connect_arrive_in_order() {
        let (mut connector, _server) = ScriptedConnector::new();
        connector.connect_delay = Duration::from_millis(100);
        let probe = connector.probe.clone();
        let mut manager = ConnectionManager::with_connector(connector, options(1000));

        manager.send(start_sim()).unwrap();
        manager.start(URL).unwrap();
        manager.send(OutboundCommand::FinishSim).unwrap();
        manager.send(start_sim()).unwrap();
        assert_eq!(probe.connected(), 0);

        assert!(wait_until(PATIENCE, || probe.sent().len() == 3));
        assert_eq!(probe.sent_tags(), ["START_SIM", "FINISH_SIM", "START_SIM"]);
        assert_eq!(manager.stop(), Stopped::Confirmed);
    }

    #[test]
    fn stop_when_idle_is_a_noop() {
        let (connector, _server) = ScriptedConnector::new();
        let probe = connector.probe.clone();
        let mut manager = ConnectionManager::with_connector(connector, options(100));

        assert_eq!(manager.stop(), Stopped::NotRunning);
        assert_eq!(manager.stop(), Stopped::NotRunning);
        assert_eq!(manager.status(), SessionStatus::Idle);
        assert_eq!(probe.closes(), 0);
    }

    #[test]
    fn second_start_does_not_open_another_transport() {
        let (connector, _server) = ScriptedConnector::new();
        let probe = connector.probe.clone();
        let mut manager = ConnectionManager::with_connector(connector, options(1000));

        manager.start(URL).unwrap();
        assert!(matches!(manager.start(URL), Err(RelayError::AlreadyRunning)));
        assert!(wait_until(PATIENCE, || probe.connected() == 1));
        assert!(matches!(manager.start(URL), Err(RelayError::AlreadyRunning)));

        assert_eq!(manager.stop(), Stopped::Confirmed);
        assert_eq!(probe.connects(), 1);
        assert_eq!(probe.closes(), 1);
        assert_eq!(manager.status(), SessionStatus::Idle);
    }

    #[test]
    fn end_sim_closes_session_and_rejects_later_commands() {
        let (connector, server) = ScriptedConnector::new();
        let probe = connector.probe.clone();
        let mut manager = ConnectionManager::with_connector(connector, options(1000));

        manager.start(URL).unwrap();
        manager.send(start_sim()).unwrap();
        assert!(wait_until(PATIENCE, || probe.sent().len() == 1));

        server.send(r#"{"type":"END_SIM"}"#.to_string()).unwrap();
        assert!(wait_until(PATIENCE, || manager.poll() == SessionStatus::Idle));

        assert!(matches!(
            manager.send(OutboundCommand::FinishSim),
            Err(RelayError::SessionClosed)
        ));
        assert_eq!(manager.drain(), vec![RelayEvent::Frame(InboundEvent::EndSim)]);
        assert_eq!(probe.sent_tags(), ["START_SIM"]);
        assert_eq!(manager.stop(), Stopped::NotRunning);
        assert_eq!(probe.closes(), 1);
    }

    #[test]
    fn commands_queued_when_end_sim_arrives_are_not_forwarded() {
        let (mut connector, server) = ScriptedConnector::new();
        connector.connect_delay = Duration::from_millis(50);
        let probe = connector.probe.clone();
        let mut manager = ConnectionManager::with_connector(connector, options(1000));

        // END_SIM is already waiting when the transport comes up, and so are
        // both commands.
        server.send(r#"{"type":"END_SIM"}"#.to_string()).unwrap();
        manager.send(OutboundCommand::FinishSim).unwrap();
        manager.send(OutboundCommand::FinishSim).unwrap();
        manager.start(URL).unwrap();

        assert!(wait_until(PATIENCE, || manager.poll() == SessionStatus::Idle));
        assert!(probe.sent().is_empty());
        assert_eq!(probe.closes(), 1);
        assert_eq!(manager.drain(), vec![RelayEvent::Frame(InboundEvent::EndSim)]);
    }

    #[test]
    fn failed_send_is_reported_and_stop_still_completes() {
        let (mut connector, _server) = ScriptedConnector::new();
        connector.fail_send_at = Some(2);
        let probe = connector.probe.clone();
        let mut manager = ConnectionManager::with_connector(connector, options(500));

        manager.start(URL).unwrap();
        manager.send(start_sim()).unwrap();
        manager.send(OutboundCommand::FinishSim).unwrap();
        let _ = manager.send(start_sim());

        let events = drain_until(&mut manager, 1);
        assert!(matches!(
            events.as_slice(),
            [RelayEvent::SendFailed { reason }] if reason.contains("broken pipe")
        ));
        assert_eq!(probe.sent_tags(), ["START_SIM"]);

        let began = Instant::now();
        let stopped = manager.stop();
        assert!(matches!(stopped, Stopped::Confirmed | Stopped::NotRunning));
        assert!(began.elapsed() < Duration::from_millis(500));
        assert_eq!(probe.closes(), 1);
    }

    #[test]
    fn slow_close_times_out_then_completes_once() {
        let (mut connector, _server) = ScriptedConnector::new();
        connector.close_delay = Duration::from_millis(300);
        let probe = connector.probe.clone();
        let mut manager = ConnectionManager::with_connector(connector, options(50));

        manager.start(URL).unwrap();
        assert!(wait_until(PATIENCE, || probe.connected() == 1));

        assert_eq!(manager.stop(), Stopped::TimedOut);
        assert_eq!(manager.status(), SessionStatus::Closing);
        assert!(matches!(manager.start(URL), Err(RelayError::AlreadyRunning)));

        assert!(wait_until(PATIENCE, || manager.poll() == SessionStatus::Idle));
        assert_eq!(probe.closes(), 1);
        assert_eq!(manager.stop(), Stopped::NotRunning);
        assert_eq!(probe.closes(), 1);
    }

    #[test]
    fn stop_during_connect_is_prompt() {
        let (mut connector, _server) = ScriptedConnector::new();
        connector.connect_delay = Duration::from_secs(30);
        let probe = connector.probe.clone();
        let mut manager = ConnectionManager::with_connector(connector, options(1000));

        manager.start(URL).unwrap();
        assert!(wait_until(PATIENCE, || probe.connects() == 1));
        assert_eq!(manager.stop(), Stopped::Confirmed);
        assert_eq!(probe.closes(), 0);
        assert!(manager.drain().is_empty());
    }

    #[test]
    fn remote_close_is_an_implicit_end() {
        let (connector, server) = ScriptedConnector::new();
        let probe = connector.probe.clone();
        let mut manager = ConnectionManager::with_connector(connector, options(1000));

        manager.start(URL).unwrap();
        assert!(wait_until(PATIENCE, || probe.connected() == 1));
        drop(server);

        let events = drain_until(&mut manager, 1);
        assert_eq!(events, vec![RelayEvent::Disconnected { reason: None }]);
        assert!(wait_until(PATIENCE, || manager.poll() == SessionStatus::Idle));
        assert_eq!(probe.closes(), 1);
    }

    #[test]
    fn refused_connection_reports_and_allows_retry() {
        let (mut connector, _server) = ScriptedConnector::new();
        connector.refuse = true;
        let probe = connector.probe.clone();
        let mut manager = ConnectionManager::with_connector(connector, options(1000));

        manager.start(URL).unwrap();
        let events = drain_until(&mut manager, 1);
        assert!(matches!(events.as_slice(), [RelayEvent::ConnectFailed { .. }]));
        assert!(wait_until(PATIENCE, || manager.poll() == SessionStatus::Idle));

        manager.start(URL).unwrap();
        assert!(wait_until(PATIENCE, || probe.connects() == 2));
        assert_eq!(probe.closes(), 0);
    }

    #[test]
    fn inbound_burst_is_delivered_once_in_order() {
        let (connector, server) = ScriptedConnector::new();
        let mut manager = ConnectionManager::with_connector(connector, options(1000));

        manager.start(URL).unwrap();
        for i in 0..200 {
            server.send(server_msg("Ava Lee", &i.to_string())).unwrap();
        }

        let events = drain_until(&mut manager, 200);
        let contents: Vec<String> = events
            .into_iter()
            .map(|event| match event {
                RelayEvent::Frame(InboundEvent::ServerMsg(msg)) => msg.content,
                other => panic!("unexpected event {other:?}"),
            })
            .collect();
        let expected: Vec<String> = (0..200).map(|i| i.to_string()).collect();
        assert_eq!(contents, expected);
        assert!(manager.drain().is_empty());
        assert_eq!(manager.stop(), Stopped::Confirmed);
    }
}
