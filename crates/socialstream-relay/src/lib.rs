//! Realtime session relay for SocialStream.
//!
//! A render loop that must never block talks to a remote simulation server
//! through a [`ConnectionManager`]: commands go in through a non-blocking
//! outbound queue, events come back through an inbound queue the loop drains
//! on its own schedule, and a single status flag says whether a session is
//! live. The websocket itself lives on a dedicated background thread.
//!
//! ```no_run
//! use socialstream_relay::{ChatSession, ConnectionManager, LookupClient, RelayConfig, SessionState};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RelayConfig::default();
//! let lookup = LookupClient::new(&config.lookup_url, config.connect_timeout())?;
//! let state = SessionState::load(&lookup)?;
//! let mut session = ChatSession::new(
//!     state,
//!     ConnectionManager::from_config(&config),
//!     config.endpoint_url()?,
//! );
//! session.start_simulation()?;
//! while session.is_active() {
//!     let report = session.pump();
//!     // redraw session.state().history, show report.notices
//!     std::thread::sleep(config.poll_interval());
//! }
//! # Ok(())
//! # }
//! ```

mod config;
mod dispatch;
mod error;
mod event;
mod lookup;
mod manager;
mod render;
mod session;
mod status;
mod transport;

#[cfg(test)]
mod testing;

pub use config::{ConfigError, RelayConfig};
pub use dispatch::{Effect, Notice, dispatch};
pub use error::RelayError;
pub use event::RelayEvent;
pub use lookup::{LookupClient, LookupError};
pub use manager::{ConnectionManager, ManagerOptions, Stopped};
pub use render::{Control, Renderer, RoleClass, classify_role, run_render_loop};
pub use session::{ChatSession, PumpReport, SessionState, StopRequest};
pub use transport::{Connector, Transport, WsConnector, WsTransport};

pub use socialstream_core::SessionStatus;
