//! Observable event union
//!
//! Everything a subscriber can see is one of these variants. The union is
//! closed: the push channel serializes it with a `type` discriminator and
//! clients switch on that string.

use crate::store::{AgentStatus, TeamStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A chat message after routing normalization.
///
/// `tag`/`tag_body` are filled when the text leads with an uppercase
/// bracket tag (`[DONE] shipped it`); both stay `None` otherwise.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub time: DateTime<Utc>,
    pub team_id: String,
    pub channel: String,
    pub nick: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag_body: Option<String>,
}

/// Events delivered to push-channel subscribers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A chat message passed through the router
    Message { message: ChatMessage },

    /// An agent heartbeat was accepted
    Heartbeat {
        team_id: String,
        agent_id: String,
        at: DateTime<Utc>,
    },

    /// An agent changed lifecycle state
    AgentStatus {
        team_id: String,
        agent_id: String,
        status: AgentStatus,
    },

    /// A team changed lifecycle state
    TeamStatus {
        team_id: String,
        status: TeamStatus,
    },

    /// A console attachment was established
    #[serde(rename = "console.attached")]
    ConsoleAttached { team_id: String, agent_id: String },

    /// Raw console output, base64-encoded
    #[serde(rename = "console.data")]
    ConsoleData {
        team_id: String,
        agent_id: String,
        data: String,
    },

    /// A console attachment was torn down
    #[serde(rename = "console.detached")]
    ConsoleDetached { team_id: String, agent_id: String },
}

impl Event {
    /// The team this event belongs to, for subscription scope matching.
    pub fn team_id(&self) -> &str {
        match self {
            Event::Message { message } => &message.team_id,
            Event::Heartbeat { team_id, .. }
            | Event::AgentStatus { team_id, .. }
            | Event::TeamStatus { team_id, .. }
            | Event::ConsoleAttached { team_id, .. }
            | Event::ConsoleData { team_id, .. }
            | Event::ConsoleDetached { team_id, .. } => team_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(team: &str, channel: &str, text: &str) -> ChatMessage {
        ChatMessage {
            time: Utc::now(),
            team_id: team.to_string(),
            channel: channel.to_string(),
            nick: "dev-1".to_string(),
            text: text.to_string(),
            tag: None,
            tag_body: None,
        }
    }

    #[test]
    fn wire_discriminators() {
        let cases = [
            (
                Event::Message {
                    message: msg("t1", "#main", "hello"),
                },
                "message",
            ),
            (
                Event::Heartbeat {
                    team_id: "t1".into(),
                    agent_id: "dev-a1".into(),
                    at: Utc::now(),
                },
                "heartbeat",
            ),
            (
                Event::AgentStatus {
                    team_id: "t1".into(),
                    agent_id: "dev-a1".into(),
                    status: AgentStatus::Live,
                },
                "agent_status",
            ),
            (
                Event::TeamStatus {
                    team_id: "t1".into(),
                    status: TeamStatus::Running,
                },
                "team_status",
            ),
            (
                Event::ConsoleAttached {
                    team_id: "t1".into(),
                    agent_id: "dev-a1".into(),
                },
                "console.attached",
            ),
            (
                Event::ConsoleData {
                    team_id: "t1".into(),
                    agent_id: "dev-a1".into(),
                    data: "aGk=".into(),
                },
                "console.data",
            ),
            (
                Event::ConsoleDetached {
                    team_id: "t1".into(),
                    agent_id: "dev-a1".into(),
                },
                "console.detached",
            ),
        ];

        for (event, expected) in cases {
            let value = serde_json::to_value(&event).unwrap();
            assert_eq!(value["type"], expected, "discriminator for {event:?}");
        }
    }

    #[test]
    fn scope_is_owning_team() {
        let event = Event::TeamStatus {
            team_id: "t9".into(),
            status: TeamStatus::Stopped,
        };
        assert_eq!(event.team_id(), "t9");

        let event = Event::Message {
            message: msg("t3", "#code", "x"),
        };
        assert_eq!(event.team_id(), "t3");
    }

    #[test]
    fn events_round_trip_json() {
        let event = Event::AgentStatus {
            team_id: "t1".into(),
            agent_id: "dev-a1".into(),
            status: AgentStatus::Stalled,
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn message_omits_null_tag_fields() {
        let event = Event::Message {
            message: msg("t1", "#main", "plain"),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert!(value["message"].get("tag").is_none());
        assert!(value["message"].get("tag_body").is_none());
    }
}
