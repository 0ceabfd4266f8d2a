//! Relay errors.

use socialstream_core::FrameError;
use tokio_tungstenite::tungstenite;

/// Errors surfaced by the relay.
///
/// Only `start`, `send`, and session setup return these to the caller.
/// Failures inside the background connection are converted into
/// [`RelayEvent`](crate::RelayEvent)s instead.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("a session is already running")]
    AlreadyRunning,
    #[error("session has closed; command dropped")]
    SessionClosed,
    #[error("could not start background connection: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("connection to {url} timed out")]
    ConnectTimeout { url: String },
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("transport error: {0}")]
    Transport(String),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("{0}")]
    InvalidSelection(String),
    #[error(transparent)]
    Lookup(#[from] crate::LookupError),
    #[error("lookup service returned no {0}")]
    EmptyCatalog(&'static str),
}
