//! Core types for the SocialStream simulation relay.
//!
//! This crate provides the wire protocol spoken with a remote simulation
//! server and the records a front end renders. It performs no I/O; the relay
//! crate owns connections and threads.

mod lookup;
mod message;
mod protocol;

pub use lookup::{AgentProfile, Scenario};
pub use message::{ContentView, MessageKind, RenderingMessage};
pub use protocol::{FrameError, InboundEvent, OutboundCommand, StartSim};

/// Session lifecycle status shared between the render loop and the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionStatus {
    /// No live connection.
    #[default]
    Idle,
    /// Background connection is up or being established.
    Running,
    /// Shutdown requested, waiting for the background context to close.
    Closing,
}

impl SessionStatus {
    /// Whether the render loop should keep polling.
    pub fn is_active(&self) -> bool {
        !matches!(self, SessionStatus::Idle)
    }
}
