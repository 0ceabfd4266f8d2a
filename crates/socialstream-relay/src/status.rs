//! Cross-thread session status and the one-shot closed signal.

use socialstream_core::SessionStatus;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc;
use std::time::Duration;

const IDLE: u8 = 0;
const RUNNING: u8 = 1;
const CLOSING: u8 = 2;

fn encode(status: SessionStatus) -> u8 {
    match status {
        SessionStatus::Idle => IDLE,
        SessionStatus::Running => RUNNING,
        SessionStatus::Closing => CLOSING,
    }
}

fn decode(raw: u8) -> SessionStatus {
    match raw {
        RUNNING => SessionStatus::Running,
        CLOSING => SessionStatus::Closing,
        _ => SessionStatus::Idle,
    }
}

/// Status flag readable from both the render loop and the background thread.
#[derive(Debug, Clone, Default)]
pub(crate) struct SharedStatus(Arc<AtomicU8>);

impl SharedStatus {
    pub(crate) fn get(&self) -> SessionStatus {
        decode(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, status: SessionStatus) {
        self.0.store(encode(status), Ordering::Release);
    }

    /// Move `from` -> `to`; returns false if the status was something else.
    pub(crate) fn transition(&self, from: SessionStatus, to: SessionStatus) -> bool {
        self.0
            .compare_exchange(encode(from), encode(to), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Create a fresh closed signal pair for one session.
pub(crate) fn closed_signal() -> (ClosedNotifier, ClosedSignal) {
    let (tx, rx) = mpsc::sync_channel(1);
    (ClosedNotifier(tx), ClosedSignal { rx, fired: false })
}

/// Background half. Consumed on notify, so it fires at most once.
#[derive(Debug)]
pub(crate) struct ClosedNotifier(mpsc::SyncSender<()>);

impl ClosedNotifier {
    pub(crate) fn notify(self) {
        // Receiver may already be gone if the manager was dropped.
        let _ = self.0.try_send(());
    }
}

/// Foreground half.
#[derive(Debug)]
pub(crate) struct ClosedSignal {
    rx: mpsc::Receiver<()>,
    fired: bool,
}

impl ClosedSignal {
    /// Non-blocking check.
    pub(crate) fn is_set(&mut self) -> bool {
        if !self.fired {
            self.fired = !matches!(self.rx.try_recv(), Err(mpsc::TryRecvError::Empty));
        }
        self.fired
    }

    /// Block up to `timeout` for the signal.
    pub(crate) fn wait(&mut self, timeout: Duration) -> bool {
        if !self.fired {
            self.fired = !matches!(
                self.rx.recv_timeout(timeout),
                Err(mpsc::RecvTimeoutError::Timeout)
            );
        }
        self.fired
    }
}
