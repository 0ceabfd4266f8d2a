//! Render loop driver and role classification for front ends.
//!
//! The loop only ever does non-blocking queue reads, status reads and a
//! fixed sleep between redraws. All waiting on the network happens on the
//! connection manager's background thread.

use crate::session::{ChatSession, PumpReport, SessionState, StopRequest};
use crate::transport::Connector;
use std::time::Duration;

/// What the front end wants after a redraw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Control {
    #[default]
    Continue,
    /// Ask the server to finish (evaluate and send `END_SIM`).
    Finish,
    /// Drop the connection now.
    Abort,
}

/// A front end that can draw session state.
pub trait Renderer {
    fn render(&mut self, state: &SessionState, report: &PumpReport) -> Control;
}

/// Drive `session` until it stops, then draw once more.
///
/// Returns the number of redraws.
pub fn run_render_loop<C, R>(session: &mut ChatSession<C>, renderer: &mut R, interval: Duration) -> usize
where
    C: Connector,
    R: Renderer + ?Sized,
{
    let mut frames = 0;

    while session.is_active() {
        let report = session.pump();
        frames += 1;
        match renderer.render(session.state(), &report) {
            Control::Continue => {}
            Control::Finish => {
                if let StopRequest::Stopped(stopped) = session.stop_simulation() {
                    tracing::info!("finish request undeliverable, stopped: {:?}", stopped);
                }
            }
            Control::Abort => {
                let stopped = session.shutdown();
                tracing::info!("render loop aborted session: {:?}", stopped);
            }
        }
        if !session.is_active() {
            break;
        }
        std::thread::sleep(interval);
    }

    let report = session.pump();
    frames += 1;
    renderer.render(session.state(), &report);
    frames
}

/// How a history entry should be presented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleClass {
    /// Not shown (scenario background).
    Hidden,
    Info,
    Environment,
    Observation,
    Evaluation,
    /// Spoken by one of the two agents.
    Agent(String),
}

/// Classify a message role given the two selected agent names.
pub fn classify_role(role: &str, agent_names: [&str; 2]) -> RoleClass {
    match role {
        "Background Info" => RoleClass::Hidden,
        "System" => RoleClass::Info,
        "Environment" => RoleClass::Environment,
        "Observation" => RoleClass::Observation,
        "General" => RoleClass::Evaluation,
        "Agent 1" => RoleClass::Agent(agent_names[0].to_string()),
        "Agent 2" => RoleClass::Agent(agent_names[1].to_string()),
        name if agent_names.contains(&name) => RoleClass::Agent(name.to_string()),
        _ => RoleClass::Info,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::{ConnectionManager, ManagerOptions};
    use crate::session::tests::sample_state;
    use crate::testing::{ScriptedConnector, server_msg};

    #[derive(Default)]
    struct Recorder {
        history_lens: Vec<usize>,
        finish_after: Option<usize>,
    }

    impl Renderer for Recorder {
        fn render(&mut self, state: &SessionState, _report: &PumpReport) -> Control {
            self.history_lens.push(state.history.len());
            match self.finish_after {
                Some(n) if state.history.len() >= n => Control::Finish,
                _ => Control::Continue,
            }
        }
    }

    fn options() -> ManagerOptions {
        ManagerOptions {
            shutdown_timeout: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn loop_exits_after_end_sim_with_final_redraw() {
        let (connector, server) = ScriptedConnector::new();
        let mut session = ChatSession::new(
            sample_state(),
            ConnectionManager::with_connector(connector, options()),
            "ws://test",
        );
        session.start_simulation().unwrap();
        for turn in ["one", "two"] {
            server.send(server_msg("Ava Lee", turn)).unwrap();
        }
        server.send(r#"{"type":"END_SIM"}"#.to_string()).unwrap();

        let mut recorder = Recorder::default();
        let frames = run_render_loop(&mut session, &mut recorder, Duration::from_millis(5));

        assert_eq!(frames, recorder.history_lens.len());
        assert_eq!(recorder.history_lens.last(), Some(&2));
        assert!(!session.is_active());
    }

    #[test]
    fn finish_control_sends_finish_sim() {
        let (connector, server) = ScriptedConnector::new();
        let probe = connector.probe.clone();
        let mut session = ChatSession::new(
            sample_state(),
            ConnectionManager::with_connector(connector, options()),
            "ws://test",
        );
        session.start_simulation().unwrap();
        server.send(server_msg("Ava Lee", "hello")).unwrap();

        // Plays the server: answers FINISH_SIM with END_SIM.
        let responder = std::thread::spawn(move || {
            crate::testing::wait_until(Duration::from_secs(5), || {
                probe.sent_tags().contains(&"FINISH_SIM".to_string())
            });
            server.send(r#"{"type":"END_SIM"}"#.to_string()).unwrap();
        });

        let mut recorder = Recorder {
            finish_after: Some(1),
            ..Default::default()
        };
        run_render_loop(&mut session, &mut recorder, Duration::from_millis(5));
        responder.join().unwrap();
        assert!(!session.is_active());
        assert_eq!(session.state().history.len(), 1);
    }

    #[test]
    fn roles_map_to_classes() {
        let agents = ["Ava Lee", "Ben Ortiz"];
        assert_eq!(classify_role("Background Info", agents), RoleClass::Hidden);
        assert_eq!(classify_role("Environment", agents), RoleClass::Environment);
        assert_eq!(classify_role("General", agents), RoleClass::Evaluation);
        assert_eq!(classify_role("Agent 2", agents), RoleClass::Agent("Ben Ortiz".into()));
        assert_eq!(classify_role("Ava Lee", agents), RoleClass::Agent("Ava Lee".into()));
        assert_eq!(classify_role("Narrator", agents), RoleClass::Info);
    }
}
