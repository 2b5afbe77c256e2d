//! Store schema and persistent entity types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS teams (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    name TEXT NOT NULL,
    repo_url TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'creating',
    channels TEXT NOT NULL,
    chat_port INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,

    UNIQUE (tenant_id, name)
);

CREATE INDEX IF NOT EXISTS idx_teams_tenant ON teams(tenant_id);

CREATE TABLE IF NOT EXISTS agents (
    id TEXT NOT NULL,
    team_id TEXT NOT NULL,
    role TEXT NOT NULL,
    model TEXT,
    runtime TEXT,
    status TEXT NOT NULL DEFAULT 'spawning',
    last_heartbeat_at TEXT,
    created_at TEXT NOT NULL,

    PRIMARY KEY (team_id, id),
    FOREIGN KEY (team_id) REFERENCES teams(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_agents_team ON agents(team_id);

CREATE TABLE IF NOT EXISTS team_tombstones (
    id TEXT PRIMARY KEY,
    deleted_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS templates (
    id TEXT PRIMARY KEY,
    tenant_id TEXT,
    name TEXT NOT NULL,
    description TEXT,
    builtin BOOLEAN NOT NULL DEFAULT 0,
    agents TEXT NOT NULL,
    env TEXT,
    tags TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_templates_tenant ON templates(tenant_id);
";

/// Channels handed to a team that does not pick its own
pub const DEFAULT_CHANNELS: &[&str] = &["#main", "#tasks", "#code", "#testing", "#merges"];

/// Upper bound on channels per team
pub const MAX_CHANNELS: usize = 20;

// ============================================================================
// Team
// ============================================================================

/// Team lifecycle states
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TeamStatus {
    Creating,
    Running,
    Stopped,
    Error,
    Deleted,
}

impl TeamStatus {
    /// Whether the state machine permits moving to `next`.
    ///
    /// Error is non-terminal: an operator may retry start or delete from it.
    /// Deleted is terminal.
    pub fn can_transition_to(self, next: TeamStatus) -> bool {
        use TeamStatus::{Creating, Deleted, Error, Running, Stopped};
        match (self, next) {
            (Creating, Running | Error | Deleted) => true,
            (Running, Stopped | Error | Deleted) => true,
            (Stopped, Running | Error | Deleted) => true,
            (Error, Running | Stopped | Deleted) => true,
            (Deleted, _) | (_, Creating) => false,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TeamStatus::Creating => "creating",
            TeamStatus::Running => "running",
            TeamStatus::Stopped => "stopped",
            TeamStatus::Error => "error",
            TeamStatus::Deleted => "deleted",
        }
    }
}

impl fmt::Display for TeamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TeamStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "creating" => Ok(TeamStatus::Creating),
            "running" => Ok(TeamStatus::Running),
            "stopped" => Ok(TeamStatus::Stopped),
            "error" => Ok(TeamStatus::Error),
            "deleted" => Ok(TeamStatus::Deleted),
            other => Err(format!("unknown team status: {other}")),
        }
    }
}

/// Team record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub repo_url: String,
    pub status: TeamStatus,
    pub channels: Vec<String>,
    pub chat_port: u16,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Agent
// ============================================================================

/// Agent lifecycle states
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Spawning,
    Live,
    Stalled,
    Dead,
    Removed,
}

impl AgentStatus {
    /// Removed is terminal; dead agents are only revived by the operator
    /// deleting and re-adding them.
    pub fn can_transition_to(self, next: AgentStatus) -> bool {
        use AgentStatus::{Dead, Live, Removed, Spawning, Stalled};
        match (self, next) {
            (Spawning, Live | Removed) => true,
            (Live, Stalled | Removed) => true,
            (Stalled, Live | Dead | Removed) => true,
            (Dead, Removed) => true,
            (Removed, _) => false,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AgentStatus::Spawning => "spawning",
            AgentStatus::Live => "live",
            AgentStatus::Stalled => "stalled",
            AgentStatus::Dead => "dead",
            AgentStatus::Removed => "removed",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AgentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "spawning" => Ok(AgentStatus::Spawning),
            "live" => Ok(AgentStatus::Live),
            "stalled" => Ok(AgentStatus::Stalled),
            "dead" => Ok(AgentStatus::Dead),
            "removed" => Ok(AgentStatus::Removed),
            other => Err(format!("unknown agent status: {other}")),
        }
    }
}

/// Agent record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub team_id: String,
    pub role: String,
    pub model: Option<String>,
    pub runtime: Option<String>,
    pub status: AgentStatus,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Template
// ============================================================================

/// One agent slot in a template roster
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TemplateAgent {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
}

/// Reusable agent roster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    /// None for builtins
    pub tenant_id: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub builtin: bool,
    pub agents: Vec<TemplateAgent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<std::collections::BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn team_transitions() {
        use TeamStatus::{Creating, Deleted, Error, Running, Stopped};

        assert!(Creating.can_transition_to(Running));
        assert!(Creating.can_transition_to(Error));
        assert!(Running.can_transition_to(Stopped));
        assert!(Stopped.can_transition_to(Running));
        assert!(Error.can_transition_to(Running));
        assert!(Error.can_transition_to(Deleted));
        assert!(Running.can_transition_to(Deleted));

        // Deleted is terminal, creating is never re-entered
        assert!(!Deleted.can_transition_to(Running));
        assert!(!Stopped.can_transition_to(Creating));
        assert!(!Running.can_transition_to(Running));
    }

    #[test]
    fn agent_transitions() {
        use AgentStatus::{Dead, Live, Removed, Spawning, Stalled};

        assert!(Spawning.can_transition_to(Live));
        assert!(Live.can_transition_to(Stalled));
        assert!(Stalled.can_transition_to(Live));
        assert!(Stalled.can_transition_to(Dead));
        assert!(Dead.can_transition_to(Removed));

        // Dead agents are not auto-restarted
        assert!(!Dead.can_transition_to(Live));
        assert!(!Removed.can_transition_to(Spawning));
        // Spawning cannot stall before its first heartbeat
        assert!(!Spawning.can_transition_to(Stalled));
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            TeamStatus::Creating,
            TeamStatus::Running,
            TeamStatus::Stopped,
            TeamStatus::Error,
            TeamStatus::Deleted,
        ] {
            assert_eq!(status.as_str().parse::<TeamStatus>().unwrap(), status);
        }
        for status in [
            AgentStatus::Spawning,
            AgentStatus::Live,
            AgentStatus::Stalled,
            AgentStatus::Dead,
            AgentStatus::Removed,
        ] {
            assert_eq!(status.as_str().parse::<AgentStatus>().unwrap(), status);
        }
    }
}
