//! Session state and the chat session driving one simulation at a time.

use crate::dispatch::{Effect, Notice, dispatch};
use crate::manager::{ConnectionManager, Stopped};
use crate::transport::{Connector, WsConnector};
use crate::{LookupClient, RelayError};
use socialstream_core::{AgentProfile, OutboundCommand, RenderingMessage, Scenario, SessionStatus};

const STOP_FIRST: &str = "Please stop the conversation first.";
const DIFFERENT_AGENTS: &str = "Please select different agents";

/// Everything a front end renders for one session.
///
/// Built once per session with [`SessionState::initialize`]; the choices can
/// only change while no simulation is active.
#[derive(Debug, Clone)]
pub struct SessionState {
    scenarios: Vec<Scenario>,
    agents: Vec<AgentProfile>,
    models: Vec<String>,
    scenario_choice: String,
    agent_choices: [String; 2],
    model_choices: [String; 2],
    /// Conversation so far, in arrival order.
    pub history: Vec<RenderingMessage>,
    active: bool,
}

impl SessionState {
    /// Defaults to the first scenario, the first two agents, and the first
    /// model for both agents.
    pub fn initialize(
        scenarios: Vec<Scenario>,
        agents: Vec<AgentProfile>,
        models: Vec<String>,
    ) -> Result<Self, RelayError> {
        let scenario_choice = scenarios
            .first()
            .ok_or(RelayError::EmptyCatalog("scenarios"))?
            .codename
            .clone();
        let first = agents.first().ok_or(RelayError::EmptyCatalog("agents"))?;
        let second = agents.get(1).unwrap_or(first);
        let agent_choices = [first.full_name(), second.full_name()];
        let model = models.first().ok_or(RelayError::EmptyCatalog("models"))?;
        let model_choices = [model.clone(), model.clone()];

        Ok(Self {
            scenarios,
            agents,
            models,
            scenario_choice,
            agent_choices,
            model_choices,
            history: Vec::new(),
            active: false,
        })
    }

    /// Query the lookup service once and initialize from its answers.
    pub fn load(lookup: &LookupClient) -> Result<Self, RelayError> {
        Self::initialize(lookup.scenarios()?, lookup.agents()?, lookup.models()?)
    }

    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    pub fn agents(&self) -> &[AgentProfile] {
        &self.agents
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub(crate) fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// The selected scenario.
    pub fn scenario(&self) -> Option<&Scenario> {
        self.scenarios
            .iter()
            .find(|s| s.codename == self.scenario_choice)
    }

    /// Full names of the two selected agents.
    pub fn agent_names(&self) -> [&str; 2] {
        [&self.agent_choices[0], &self.agent_choices[1]]
    }

    pub fn model_choices(&self) -> [&str; 2] {
        [&self.model_choices[0], &self.model_choices[1]]
    }

    fn agent(&self, name: &str) -> Option<&AgentProfile> {
        self.agents.iter().find(|a| a.full_name() == name)
    }

    fn ensure_idle(&self) -> Result<(), RelayError> {
        if self.active {
            return Err(RelayError::InvalidSelection(STOP_FIRST.to_string()));
        }
        Ok(())
    }

    pub fn choose_scenario(&mut self, codename: &str) -> Result<(), RelayError> {
        self.ensure_idle()?;
        if !self.scenarios.iter().any(|s| s.codename == codename) {
            return Err(RelayError::InvalidSelection(format!(
                "unknown scenario {codename}"
            )));
        }
        self.scenario_choice = codename.to_string();
        Ok(())
    }

    /// Pick the agent for `slot` (0 or 1) by full name.
    pub fn choose_agent(&mut self, slot: usize, name: &str) -> Result<(), RelayError> {
        self.ensure_idle()?;
        if self.agent(name).is_none() {
            return Err(RelayError::InvalidSelection(format!("unknown agent {name}")));
        }
        let choice = self
            .agent_choices
            .get_mut(slot)
            .ok_or_else(|| RelayError::InvalidSelection(format!("no agent slot {slot}")))?;
        *choice = name.to_string();
        Ok(())
    }

    /// Pick the model for `slot` (0 or 1).
    pub fn choose_model(&mut self, slot: usize, model: &str) -> Result<(), RelayError> {
        self.ensure_idle()?;
        if !self.models.iter().any(|m| m == model) {
            return Err(RelayError::InvalidSelection(format!("unknown model {model}")));
        }
        let choice = self
            .model_choices
            .get_mut(slot)
            .ok_or_else(|| RelayError::InvalidSelection(format!("no model slot {slot}")))?;
        *choice = model.to_string();
        Ok(())
    }

    /// The `START_SIM` command for the current choices.
    pub fn start_command(&self) -> Result<OutboundCommand, RelayError> {
        if self.agent_choices[0] == self.agent_choices[1] {
            return Err(RelayError::InvalidSelection(DIFFERENT_AGENTS.to_string()));
        }
        let scenario = self.scenario().ok_or_else(|| {
            RelayError::InvalidSelection(format!("unknown scenario {}", self.scenario_choice))
        })?;
        let pk = |name: &str| {
            self.agent(name)
                .map(|a| a.pk.clone())
                .ok_or_else(|| RelayError::InvalidSelection(format!("unknown agent {name}")))
        };
        Ok(OutboundCommand::start_sim(
            scenario.pk.clone(),
            [pk(&self.agent_choices[0])?, pk(&self.agent_choices[1])?],
            self.model_choices.clone(),
        ))
    }
}

/// What one [`ChatSession::pump`] pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PumpReport {
    /// Messages appended to history.
    pub appended: usize,
    pub notices: Vec<Notice>,
    /// The session ended during this pass.
    pub ended: bool,
}

impl PumpReport {
    pub fn needs_redraw(&self) -> bool {
        self.appended > 0 || self.ended || !self.notices.is_empty()
    }
}

/// Outcome of a user stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopRequest {
    NotRunning,
    /// `FINISH_SIM` queued; the server will evaluate and send `END_SIM`.
    Finishing,
    /// The connection was shut down directly.
    Stopped(Stopped),
}

/// Session state plus the connection manager that feeds it.
pub struct ChatSession<C: Connector = WsConnector> {
    state: SessionState,
    manager: ConnectionManager<C>,
    endpoint: String,
    finish_requested: bool,
}

impl<C: Connector> ChatSession<C> {
    pub fn new(state: SessionState, manager: ConnectionManager<C>, endpoint: impl Into<String>) -> Self {
        Self {
            state,
            manager,
            endpoint: endpoint.into(),
            finish_requested: false,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut SessionState {
        &mut self.state
    }

    pub fn status(&self) -> SessionStatus {
        self.manager.status()
    }

    pub fn is_active(&self) -> bool {
        self.state.active
    }

    /// Validate choices, connect, and queue `START_SIM`.
    pub fn start_simulation(&mut self) -> Result<(), RelayError> {
        if self.state.active {
            return Err(RelayError::AlreadyRunning);
        }
        let command = self.state.start_command()?;
        self.manager.start(&self.endpoint)?;
        if let Err(e) = self.manager.send(command) {
            // The background context is already gone; nothing was started.
            self.manager.stop();
            return Err(e);
        }

        self.state.history.clear();
        self.state.active = true;
        self.finish_requested = false;
        tracing::info!(
            "starting simulation in {} with {} and {}",
            self.state.scenario_choice,
            self.state.agent_choices[0],
            self.state.agent_choices[1]
        );
        Ok(())
    }

    /// Ask the server to wrap up. Falls back to a direct shutdown when the
    /// request cannot be delivered.
    pub fn stop_simulation(&mut self) -> StopRequest {
        if !self.state.active {
            return StopRequest::NotRunning;
        }
        if self.finish_requested {
            return StopRequest::Finishing;
        }
        match self.manager.send(OutboundCommand::FinishSim) {
            Ok(()) => {
                self.finish_requested = true;
                StopRequest::Finishing
            }
            Err(_) => StopRequest::Stopped(self.shutdown()),
        }
    }

    /// Stop the connection without waiting for the server.
    pub fn shutdown(&mut self) -> Stopped {
        self.state.active = false;
        self.manager.stop()
    }

    /// Drain every queued event and apply it, in arrival order.
    pub fn pump(&mut self) -> PumpReport {
        let mut report = PumpReport::default();
        // Sampled before draining: every event the background pushed before
        // going idle is then already in the queue.
        let went_idle = self.manager.poll() == SessionStatus::Idle;

        for event in self.manager.drain() {
            match dispatch(event, &mut self.state) {
                Effect::Appended => report.appended += 1,
                Effect::Notice(notice) => report.notices.push(notice),
                Effect::Ended(notice) => {
                    report.notices.extend(notice);
                    report.ended = true;
                    if self.manager.stop() == Stopped::TimedOut {
                        report.notices.push(Notice::StillShuttingDown);
                    }
                }
            }
        }

        // Background exited without a terminating event.
        if self.state.active && went_idle {
            tracing::debug!("connection went idle without END_SIM");
            self.state.active = false;
            report.ended = true;
        }

        report
    }
}
