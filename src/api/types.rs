//! API request and response types

use crate::events::ChatMessage;
use crate::store::{Agent, Team, Template, TemplateAgent};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Request to create a new team
#[derive(Debug, Deserialize)]
pub struct CreateTeamRequest {
    pub name: String,
    pub repo: RepoSpec,
    pub agents: Vec<AgentBody>,
    #[serde(default)]
    pub channels: Option<Vec<String>>,
}

/// Repository binding for a team
#[derive(Debug, Deserialize)]
pub struct RepoSpec {
    pub url: String,
}

/// One requested agent
#[derive(Debug, Deserialize)]
pub struct AgentBody {
    pub role: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub runtime: Option<String>,
}

/// Request to patch a team
#[derive(Debug, Deserialize)]
pub struct PatchTeamRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub channels: Option<Vec<String>>,
}

/// Team entity plus its roster
#[derive(Debug, Serialize)]
pub struct TeamResponse {
    #[serde(flatten)]
    pub team: Team,
    pub agents: Vec<Agent>,
}

/// Response with all teams for the principal
#[derive(Debug, Serialize)]
pub struct TeamListResponse {
    pub teams: Vec<TeamResponse>,
}

/// Sidecar control body: `{message}` for nudge/directive, `{command: []}`
/// for exec
#[derive(Debug, Deserialize, Default)]
pub struct ControlRequest {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub command: Option<Vec<String>>,
}

/// Request to publish a chat line
#[derive(Debug, Deserialize)]
pub struct SayRequest {
    pub text: String,
}

/// Snapshot of a channel's ring buffer
#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub messages: Vec<ChatMessage>,
}

/// Response carrying one published message
#[derive(Debug, Serialize)]
pub struct SayResponse {
    pub message: ChatMessage,
}

/// Template create/update body
#[derive(Debug, Deserialize)]
pub struct TemplateRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub agents: Vec<TemplateAgent>,
    #[serde(default)]
    pub env: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Response with all templates visible to the principal
#[derive(Debug, Serialize)]
pub struct TemplateListResponse {
    pub templates: Vec<Template>,
}

/// One-shot push-channel token
#[derive(Debug, Serialize)]
pub struct WsTokenResponse {
    pub token: String,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
