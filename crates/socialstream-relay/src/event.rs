//! Inbound queue entries.

use socialstream_core::InboundEvent;

/// What the background connection hands to the render loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    /// A decoded frame from the server.
    Frame(InboundEvent),
    /// The transport could not be established; the session is idle.
    ConnectFailed { reason: String },
    /// A command could not be written; the session has ended and any
    /// commands still queued were discarded.
    SendFailed { reason: String },
    /// The server closed or the connection broke mid-session.
    Disconnected { reason: Option<String> },
}

impl From<InboundEvent> for RelayEvent {
    fn from(event: InboundEvent) -> Self {
        RelayEvent::Frame(event)
    }
}
