//! Demo catalog and scripted episodes.

use serde_json::json;
use socialstream_core::{AgentProfile, MessageKind, RenderingMessage, Scenario, StartSim};
use std::collections::VecDeque;

pub fn scenarios() -> Vec<Scenario> {
    vec![
        Scenario {
            codename: "borrow_money".into(),
            pk: "env-borrow".into(),
            scenario: "Two roommates at the end of the month. One needs to borrow \
                       money for rent, the other is saving for a trip."
                .into(),
        },
        Scenario {
            codename: "job_offer".into(),
            pk: "env-offer".into(),
            scenario: "A hiring manager and a candidate negotiate a salary. \
                       Both want the deal to close this week."
                .into(),
        },
        Scenario {
            codename: "shared_dinner".into(),
            pk: "env-dinner".into(),
            scenario: "Friends split one last slice of cake. Each wants it.".into(),
        },
    ]
}

pub fn agents() -> Vec<AgentProfile> {
    [
        ("Ava", "Lee", "agent-ava"),
        ("Ben", "Ortiz", "agent-ben"),
        ("Chloe", "Nakamura", "agent-chloe"),
    ]
    .into_iter()
    .map(|(first, last, pk)| AgentProfile {
        first_name: first.into(),
        last_name: last.into(),
        pk: pk.into(),
    })
    .collect()
}

pub fn models() -> Vec<String> {
    ["gpt-4o-mini", "gpt-4o", "llama-3-70b-chat"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// A scripted episode: queued turns, then an evaluation.
#[derive(Debug)]
pub struct Episode {
    turns: VecDeque<RenderingMessage>,
    names: [String; 2],
}

impl Episode {
    /// Build an episode for a `START_SIM` request.
    ///
    /// Fails with a message for the client when the scenario or an agent is
    /// not in the catalog.
    pub fn new(request: &StartSim, turns: usize) -> Result<Self, String> {
        let scenario = scenarios()
            .into_iter()
            .find(|s| s.pk == request.env_id)
            .ok_or_else(|| format!("Unknown scenario: {}", request.env_id))?;
        let catalog = agents();
        let lookup = |pk: &str| {
            catalog
                .iter()
                .find(|a| a.pk == pk)
                .map(AgentProfile::full_name)
                .ok_or_else(|| format!("Unknown agent: {pk}"))
        };
        let names = [lookup(&request.agent_ids[0])?, lookup(&request.agent_ids[1])?];

        let mut queue = VecDeque::with_capacity(turns + 2);
        queue.push_back(RenderingMessage::new(
            "Background Info",
            scenario.scenario.clone(),
            comment(),
        ));
        queue.push_back(RenderingMessage::new(
            "Environment",
            format!(
                "{} ({}) and {} ({}) begin.",
                names[0], request.agent_models[0], names[1], request.agent_models[1]
            ),
            comment(),
        ));
        for turn in 0..turns {
            let speaker = &names[turn % 2];
            let listener = &names[(turn + 1) % 2];
            // Every third turn is sent as a structured action.
            let message = if turn % 3 == 2 {
                let action = json!({
                    "action_type": "speak",
                    "argument": format!("Let's settle this, {listener}."),
                });
                RenderingMessage::new(speaker.clone(), action.to_string(), MessageKind::Action)
            } else {
                RenderingMessage::new(
                    speaker.clone(),
                    format!("Turn {}: {} makes a point to {}.", turn + 1, speaker, listener),
                    comment(),
                )
            };
            queue.push_back(message);
        }

        Ok(Self { turns: queue, names })
    }

    /// Next scripted turn, if any remain.
    pub fn next_turn(&mut self) -> Option<RenderingMessage> {
        self.turns.pop_front()
    }

    /// Drop the remaining turns.
    pub fn finish(&mut self) {
        self.turns.clear();
    }

    /// Evaluation lines sent before `END_SIM`.
    pub fn evaluation(&self) -> Vec<RenderingMessage> {
        vec![
            RenderingMessage::new(
                "Agent 1",
                format!("{} kept the conversation on track.", self.names[0]),
                comment(),
            ),
            RenderingMessage::new(
                "Agent 2",
                format!("{} reached a reasonable outcome.", self.names[1]),
                comment(),
            ),
            RenderingMessage::new("General", "Both agents stayed in character.", comment()),
        ]
    }
}

fn comment() -> MessageKind {
    MessageKind::Other("comment".into())
}
