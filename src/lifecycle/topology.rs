//! Compose topology rendering
//!
//! One team becomes one compose project: an ircd service, a shared
//! workspace volume, and one service per agent. This is a fixed template,
//! not a compose synthesizer; anything fancier belongs outside the core.

use crate::sidecar::FIFO_PATH;
use crate::store::{Agent, Team};

/// Default image for agent containers, overridable per agent via `runtime`
pub const DEFAULT_AGENT_IMAGE: &str = "warroom/agent:latest";

/// Image for the per-team chat daemon
pub const IRCD_IMAGE: &str = "warroom/ircd:latest";

/// Service name of the chat daemon inside every project
pub const IRCD_SERVICE: &str = "ircd";

/// Stable compose project name for a team
pub fn project_name(team_id: &str) -> String {
    format!("wr-{team_id}")
}

/// Render the compose file for a team and its roster.
pub fn render_compose(team: &Team, agents: &[Agent]) -> String {
    let mut yaml = String::new();
    yaml.push_str("services:\n");

    yaml.push_str(&format!("  {IRCD_SERVICE}:\n"));
    yaml.push_str(&format!("    image: {IRCD_IMAGE}\n"));
    yaml.push_str("    ports:\n");
    yaml.push_str(&format!("      - \"{}:6667\"\n", team.chat_port));
    yaml.push_str("    networks: [team]\n");

    for agent in agents {
        let image = agent.runtime.as_deref().unwrap_or(DEFAULT_AGENT_IMAGE);
        yaml.push_str(&format!("  {}:\n", agent.id));
        yaml.push_str(&format!("    image: {image}\n"));
        yaml.push_str("    environment:\n");
        yaml.push_str(&format!("      WARROOM_TEAM_ID: \"{}\"\n", team.id));
        yaml.push_str(&format!("      WARROOM_AGENT_ID: \"{}\"\n", agent.id));
        yaml.push_str(&format!("      WARROOM_AGENT_ROLE: \"{}\"\n", agent.role));
        yaml.push_str(&format!("      WARROOM_REPO_URL: \"{}\"\n", team.repo_url));
        yaml.push_str(&format!("      WARROOM_CHAT_HOST: \"{IRCD_SERVICE}\"\n"));
        yaml.push_str("      WARROOM_CHAT_PORT: \"6667\"\n");
        yaml.push_str(&format!("      WARROOM_CONTROL_FIFO: \"{FIFO_PATH}\"\n"));
        if let Some(model) = &agent.model {
            yaml.push_str(&format!("      WARROOM_AGENT_MODEL: \"{model}\"\n"));
        }
        yaml.push_str("    volumes:\n");
        yaml.push_str("      - workspace:/workspace\n");
        yaml.push_str("    networks: [team]\n");
        yaml.push_str(&format!("    depends_on: [{IRCD_SERVICE}]\n"));
    }

    yaml.push_str("volumes:\n");
    yaml.push_str("  workspace:\n");
    yaml.push_str("networks:\n");
    yaml.push_str("  team:\n");
    yaml
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{AgentStatus, TeamStatus};
    use chrono::Utc;

    fn team() -> Team {
        Team {
            id: "t1".to_string(),
            tenant_id: "acme".to_string(),
            name: "alpha".to_string(),
            repo_url: "https://example.com/repo.git".to_string(),
            status: TeamStatus::Creating,
            channels: vec!["#main".to_string()],
            chat_port: 16_660,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn agent(id: &str, runtime: Option<&str>) -> Agent {
        Agent {
            id: id.to_string(),
            team_id: "t1".to_string(),
            role: "dev".to_string(),
            model: None,
            runtime: runtime.map(String::from),
            status: AgentStatus::Spawning,
            last_heartbeat_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn project_names_are_stable() {
        assert_eq!(project_name("t1"), "wr-t1");
    }

    #[test]
    fn renders_ircd_and_agent_services() {
        let yaml = render_compose(&team(), &[agent("dev-a1", None), agent("rev-b2", None)]);
        assert!(yaml.contains("  ircd:\n"));
        assert!(yaml.contains("  dev-a1:\n"));
        assert!(yaml.contains("  rev-b2:\n"));
        assert!(yaml.contains("\"16660:6667\""));
        assert!(yaml.contains("WARROOM_TEAM_ID: \"t1\""));
        assert!(yaml.contains("WARROOM_CONTROL_FIFO: \"/run/agent/control\""));
        assert!(yaml.contains("workspace:/workspace"));
    }

    #[test]
    fn agent_runtime_overrides_image() {
        let yaml = render_compose(&team(), &[agent("dev-a1", Some("ghcr.io/acme/dev:2"))]);
        assert!(yaml.contains("image: ghcr.io/acme/dev:2"));
        assert!(!yaml.contains(DEFAULT_AGENT_IMAGE));
    }
}
