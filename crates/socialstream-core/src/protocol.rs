//! Wire protocol.
//!
//! Every frame is a JSON object `{"type": TAG, "data": ...}`. Outbound
//! commands go from the relay to the simulation server; inbound events come
//! back. Inbound decoding never fails: frames that cannot be understood become
//! explicit fallback variants so the dispatcher can report them.

use crate::RenderingMessage;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const START_SIM: &str = "START_SIM";
const FINISH_SIM: &str = "FINISH_SIM";
const SERVER_MSG: &str = "SERVER_MSG";
const END_SIM: &str = "END_SIM";
const ERROR: &str = "ERROR";

/// Frame envelope shared by both directions.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    tag: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    data: Value,
}

/// Payload of a `START_SIM` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartSim {
    /// Scenario primary key.
    pub env_id: String,
    pub agent_ids: [String; 2],
    pub agent_models: [String; 2],
}

/// Commands sent from the relay to the simulation server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundCommand {
    /// Start a simulation in a scenario with two agents.
    StartSim(StartSim),
    /// Ask the server to wrap up (evaluate and end) the running simulation.
    FinishSim,
}

impl OutboundCommand {
    pub fn start_sim(
        env_id: impl Into<String>,
        agent_ids: [String; 2],
        agent_models: [String; 2],
    ) -> Self {
        OutboundCommand::StartSim(StartSim {
            env_id: env_id.into(),
            agent_ids,
            agent_models,
        })
    }

    /// The frame's `type` tag.
    pub fn tag(&self) -> &'static str {
        match self {
            OutboundCommand::StartSim(_) => START_SIM,
            OutboundCommand::FinishSim => FINISH_SIM,
        }
    }

    /// Encode as a text frame.
    pub fn encode(&self) -> Result<String, FrameError> {
        let data = match self {
            OutboundCommand::StartSim(start) => serde_json::to_value(start)?,
            OutboundCommand::FinishSim => Value::String(String::new()),
        };
        let envelope = Envelope {
            tag: self.tag().to_string(),
            data,
        };
        Ok(serde_json::to_string(&envelope)?)
    }

    /// Decode a text frame (server side).
    pub fn decode(text: &str) -> Result<Self, FrameError> {
        let envelope: Envelope = serde_json::from_str(text)?;
        match envelope.tag.as_str() {
            START_SIM => Ok(OutboundCommand::StartSim(serde_json::from_value(
                envelope.data,
            )?)),
            FINISH_SIM => Ok(OutboundCommand::FinishSim),
            _ => Err(FrameError::UnknownTag(envelope.tag)),
        }
    }
}

/// Events received from the simulation server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// One conversation turn (or evaluation line) to append to history.
    ServerMsg(RenderingMessage),
    /// The simulation has ended.
    EndSim,
    /// Application error reported by the server.
    Error { content: String },
    /// Well-formed frame with a tag this client does not know.
    Unknown { tag: String },
    /// Frame that could not be decoded at all.
    Malformed { raw: String, reason: String },
}

impl InboundEvent {
    /// Decode a text frame. Never fails; see [`InboundEvent::Unknown`] and
    /// [`InboundEvent::Malformed`].
    pub fn decode(text: &str) -> Self {
        let malformed = |reason: String| InboundEvent::Malformed {
            raw: text.to_string(),
            reason,
        };

        let envelope: Envelope = match serde_json::from_str(text) {
            Ok(envelope) => envelope,
            Err(e) => return malformed(e.to_string()),
        };

        match envelope.tag.as_str() {
            SERVER_MSG => match serde_json::from_value(envelope.data) {
                Ok(message) => InboundEvent::ServerMsg(message),
                Err(e) => malformed(e.to_string()),
            },
            END_SIM => InboundEvent::EndSim,
            ERROR => match serde_json::from_value::<ErrorData>(envelope.data) {
                Ok(data) => InboundEvent::Error {
                    content: data.content,
                },
                Err(e) => malformed(e.to_string()),
            },
            _ => InboundEvent::Unknown { tag: envelope.tag },
        }
    }

    /// Encode as a text frame (server side).
    pub fn encode(&self) -> Result<String, FrameError> {
        let envelope = match self {
            InboundEvent::ServerMsg(message) => Envelope {
                tag: SERVER_MSG.to_string(),
                data: serde_json::to_value(message)?,
            },
            InboundEvent::EndSim => Envelope {
                tag: END_SIM.to_string(),
                data: Value::Null,
            },
            InboundEvent::Error { content } => Envelope {
                tag: ERROR.to_string(),
                data: serde_json::to_value(ErrorData {
                    content: content.clone(),
                })?,
            },
            InboundEvent::Unknown { tag } => return Err(FrameError::UnknownTag(tag.clone())),
            InboundEvent::Malformed { reason, .. } => {
                return Err(FrameError::Unencodable(reason.clone()));
            }
        };
        Ok(serde_json::to_string(&envelope)?)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ErrorData {
    content: String,
}

/// Error encoding or decoding a frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid frame json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown frame type: {0}")]
    UnknownTag(String),
    #[error("fallback event cannot be sent: {0}")]
    Unencodable(String),
}
