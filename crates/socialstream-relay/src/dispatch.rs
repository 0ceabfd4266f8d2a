//! Maps inbound relay events onto session state.
//!
//! Dispatch never blocks and never fails: anything the session cannot use is
//! turned into a [`Notice`] for the user.

use crate::{RelayEvent, SessionState};
use socialstream_core::InboundEvent;
use std::fmt;

/// Something the front end should show the user. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// `ERROR` frame from the server, verbatim.
    ServerError(String),
    UnknownMessageType(String),
    MalformedFrame(String),
    ConnectionFailed(String),
    SendFailed(String),
    ConnectionLost(String),
    /// `stop()` did not see the background context close in time.
    StillShuttingDown,
    Rejected(String),
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::ServerError(content) => write!(f, "Server error: {content}"),
            Notice::UnknownMessageType(tag) => write!(f, "Unknown message type: {tag}"),
            Notice::MalformedFrame(reason) => write!(f, "Could not read server message: {reason}"),
            Notice::ConnectionFailed(reason) => write!(f, "Could not connect: {reason}"),
            Notice::SendFailed(reason) => write!(f, "Could not send to server: {reason}"),
            Notice::ConnectionLost(reason) => write!(f, "Connection lost: {reason}"),
            Notice::StillShuttingDown => f.write_str("Still shutting down the previous session"),
            Notice::Rejected(reason) => f.write_str(reason),
        }
    }
}

/// Result of dispatching one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// A message was appended to history.
    Appended,
    Notice(Notice),
    /// The session is over and has been marked idle. The caller stops the
    /// connection manager.
    Ended(Option<Notice>),
}

/// Apply one event to `state`.
pub fn dispatch(event: RelayEvent, state: &mut SessionState) -> Effect {
    match event {
        RelayEvent::Frame(frame) => match frame {
            InboundEvent::ServerMsg(message) => {
                state.history.push(message);
                Effect::Appended
            }
            InboundEvent::EndSim => {
                tracing::info!("simulation ended by server");
                state.set_active(false);
                Effect::Ended(None)
            }
            InboundEvent::Error { content } => {
                tracing::warn!("server reported error: {}", content);
                Effect::Notice(Notice::ServerError(content))
            }
            InboundEvent::Unknown { tag } => {
                tracing::warn!("unknown message type {}", tag);
                Effect::Notice(Notice::UnknownMessageType(tag))
            }
            InboundEvent::Malformed { raw, reason } => {
                tracing::warn!("malformed frame ({}): {}", reason, raw);
                Effect::Notice(Notice::MalformedFrame(reason))
            }
        },
        RelayEvent::ConnectFailed { reason } => {
            state.set_active(false);
            Effect::Ended(Some(Notice::ConnectionFailed(reason)))
        }
        RelayEvent::SendFailed { reason } => {
            state.set_active(false);
            Effect::Ended(Some(Notice::SendFailed(reason)))
        }
        RelayEvent::Disconnected { reason } => {
            state.set_active(false);
            Effect::Ended(reason.map(Notice::ConnectionLost))
        }
    }
}
