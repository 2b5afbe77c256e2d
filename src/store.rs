//! Persistent stores for teams and templates
//!
//! A single sqlite database holds both stores. Every mutation goes through
//! the connection mutex (global write serialization); reads return owned
//! snapshots. Restart reconstructs the same team/template set; reconciling
//! with the container runtime is the lifecycle layer's job.

mod schema;

pub use schema::*;

use crate::error::OrchestratorError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("team not found: {0}")]
    TeamNotFound(String),
    #[error("agent not found: {0}")]
    AgentNotFound(String),
    #[error("template not found: {0}")]
    TemplateNotFound(String),
    #[error("name already exists: {0}")]
    NameExists(String),
    #[error("builtin templates are read-only: {0}")]
    BuiltinReadOnly(String),
}

impl From<StoreError> for OrchestratorError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::TeamNotFound(id) => OrchestratorError::NotFound(format!("team {id}")),
            StoreError::AgentNotFound(id) => OrchestratorError::NotFound(format!("agent {id}")),
            StoreError::TemplateNotFound(id) => {
                OrchestratorError::NotFound(format!("template {id}"))
            }
            StoreError::NameExists(name) => {
                OrchestratorError::Conflict(format!("name already exists: {name}"))
            }
            StoreError::BuiltinReadOnly(id) => {
                OrchestratorError::Conflict(format!("builtin template is read-only: {id}"))
            }
            StoreError::Sqlite(e) => OrchestratorError::Internal(e.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create the database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(SCHEMA)?;
        seed_builtin_templates(&conn)?;
        Ok(())
    }

    // ==================== Team Operations ====================

    /// Insert a new team and its initial roster in one transaction.
    pub fn create_team(&self, team: &Team, agents: &[Agent]) -> StoreResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let channels = serde_json::to_string(&team.channels).unwrap_or_else(|_| "[]".to_string());
        tx.execute(
            "INSERT INTO teams (id, tenant_id, name, repo_url, status, channels, chat_port, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![
                team.id,
                team.tenant_id,
                team.name,
                team.repo_url,
                team.status.as_str(),
                channels,
                team.chat_port,
                team.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| map_unique_violation(e, &team.name))?;

        for agent in agents {
            insert_agent_row(&tx, agent)?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Get a team by id
    pub fn get_team(&self, id: &str) -> StoreResult<Team> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, tenant_id, name, repo_url, status, channels, chat_port, created_at, updated_at
             FROM teams WHERE id = ?1",
        )?;

        stmt.query_row(params![id], row_to_team).map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::TeamNotFound(id.to_string()),
            other => StoreError::Sqlite(other),
        })
    }

    /// All teams owned by a tenant, newest first
    pub fn list_teams(&self, tenant_id: &str) -> StoreResult<Vec<Team>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, tenant_id, name, repo_url, status, channels, chat_port, created_at, updated_at
             FROM teams WHERE tenant_id = ?1 ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map(params![tenant_id], row_to_team)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Every persisted team, for startup reconciliation
    pub fn list_all_teams(&self) -> StoreResult<Vec<Team>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, tenant_id, name, repo_url, status, channels, chat_port, created_at, updated_at
             FROM teams ORDER BY created_at",
        )?;
        let rows = stmt.query_map([], row_to_team)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn update_team_status(&self, id: &str, status: TeamStatus) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE teams SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, status.as_str(), Utc::now().to_rfc3339()],
        )?;
        if changed == 0 {
            return Err(StoreError::TeamNotFound(id.to_string()));
        }
        Ok(())
    }

    pub fn rename_team(&self, id: &str, name: &str) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn
            .execute(
                "UPDATE teams SET name = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, name, Utc::now().to_rfc3339()],
            )
            .map_err(|e| map_unique_violation(e, name))?;
        if changed == 0 {
            return Err(StoreError::TeamNotFound(id.to_string()));
        }
        Ok(())
    }

    pub fn update_team_channels(&self, id: &str, channels: &[String]) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let json = serde_json::to_string(channels).unwrap_or_else(|_| "[]".to_string());
        let changed = conn.execute(
            "UPDATE teams SET channels = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, json, Utc::now().to_rfc3339()],
        )?;
        if changed == 0 {
            return Err(StoreError::TeamNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Remove a team and its roster, leaving a tombstone.
    ///
    /// Idempotent: deleting an already-deleted team is a no-op.
    pub fn delete_team(&self, id: &str) -> StoreResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM agents WHERE team_id = ?1", params![id])?;
        tx.execute("DELETE FROM teams WHERE id = ?1", params![id])?;
        tx.execute(
            "INSERT OR IGNORE INTO team_tombstones (id, deleted_at) VALUES (?1, ?2)",
            params![id, Utc::now().to_rfc3339()],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn is_tombstoned(&self, id: &str) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT 1 FROM team_tombstones WHERE id = ?1")?;
        Ok(stmt.exists(params![id])?)
    }

    /// Next free chat port at or above `base`.
    pub fn next_chat_port(&self, base: u16) -> StoreResult<u16> {
        let conn = self.conn.lock().unwrap();
        let max: Option<u16> = conn.query_row(
            "SELECT MAX(chat_port) FROM teams",
            [],
            |row| row.get(0),
        )?;
        Ok(match max {
            Some(port) if port >= base => port + 1,
            _ => base,
        })
    }

    // ==================== Agent Operations ====================

    pub fn insert_agent(&self, agent: &Agent) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        insert_agent_row(&conn, agent)
    }

    pub fn get_agent(&self, team_id: &str, agent_id: &str) -> StoreResult<Agent> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, team_id, role, model, runtime, status, last_heartbeat_at, created_at
             FROM agents WHERE team_id = ?1 AND id = ?2",
        )?;
        stmt.query_row(params![team_id, agent_id], row_to_agent)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    StoreError::AgentNotFound(agent_id.to_string())
                }
                other => StoreError::Sqlite(other),
            })
    }

    /// Current roster, excluding removed agents
    pub fn list_agents(&self, team_id: &str) -> StoreResult<Vec<Agent>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, team_id, role, model, runtime, status, last_heartbeat_at, created_at
             FROM agents WHERE team_id = ?1 AND status != 'removed' ORDER BY created_at",
        )?;
        let rows = stmt.query_map(params![team_id], row_to_agent)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn update_agent_status(
        &self,
        team_id: &str,
        agent_id: &str,
        status: AgentStatus,
    ) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE agents SET status = ?3 WHERE team_id = ?1 AND id = ?2",
            params![team_id, agent_id, status.as_str()],
        )?;
        if changed == 0 {
            return Err(StoreError::AgentNotFound(agent_id.to_string()));
        }
        Ok(())
    }

    pub fn record_agent_heartbeat(
        &self,
        team_id: &str,
        agent_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE agents SET last_heartbeat_at = ?3 WHERE team_id = ?1 AND id = ?2",
            params![team_id, agent_id, at.to_rfc3339()],
        )?;
        if changed == 0 {
            return Err(StoreError::AgentNotFound(agent_id.to_string()));
        }
        Ok(())
    }

    // ==================== Template Operations ====================

    pub fn create_template(&self, template: &Template) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        insert_template_row(&conn, template).map_err(|e| map_unique_violation(e, &template.name))
    }

    pub fn get_template(&self, id: &str) -> StoreResult<Template> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, tenant_id, name, description, builtin, agents, env, tags, created_at
             FROM templates WHERE id = ?1",
        )?;
        stmt.query_row(params![id], row_to_template)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    StoreError::TemplateNotFound(id.to_string())
                }
                other => StoreError::Sqlite(other),
            })
    }

    /// Builtins plus the tenant's own templates
    pub fn list_templates(&self, tenant_id: &str) -> StoreResult<Vec<Template>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, tenant_id, name, description, builtin, agents, env, tags, created_at
             FROM templates WHERE builtin = 1 OR tenant_id = ?1 ORDER BY builtin DESC, created_at",
        )?;
        let rows = stmt.query_map(params![tenant_id], row_to_template)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn update_template(&self, template: &Template) -> StoreResult<()> {
        let existing = self.get_template(&template.id)?;
        if existing.builtin {
            return Err(StoreError::BuiltinReadOnly(template.id.clone()));
        }
        let conn = self.conn.lock().unwrap();
        let agents = serde_json::to_string(&template.agents).unwrap_or_else(|_| "[]".to_string());
        let env = template
            .env
            .as_ref()
            .and_then(|e| serde_json::to_string(e).ok());
        let tags = serde_json::to_string(&template.tags).unwrap_or_else(|_| "[]".to_string());
        conn.execute(
            "UPDATE templates SET name = ?2, description = ?3, agents = ?4, env = ?5, tags = ?6
             WHERE id = ?1",
            params![
                template.id,
                template.name,
                template.description,
                agents,
                env,
                tags
            ],
        )?;
        Ok(())
    }

    pub fn delete_template(&self, id: &str) -> StoreResult<()> {
        let existing = self.get_template(id)?;
        if existing.builtin {
            return Err(StoreError::BuiltinReadOnly(id.to_string()));
        }
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM templates WHERE id = ?1", params![id])?;
        Ok(())
    }
}

// ==================== Row Mapping ====================

fn row_to_team(row: &rusqlite::Row<'_>) -> rusqlite::Result<Team> {
    let status: String = row.get(4)?;
    let channels: String = row.get(5)?;
    Ok(Team {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        name: row.get(2)?,
        repo_url: row.get(3)?,
        status: status.parse().unwrap_or(TeamStatus::Error),
        channels: serde_json::from_str(&channels).unwrap_or_default(),
        chat_port: row.get(6)?,
        created_at: parse_datetime(&row.get::<_, String>(7)?),
        updated_at: parse_datetime(&row.get::<_, String>(8)?),
    })
}

fn row_to_agent(row: &rusqlite::Row<'_>) -> rusqlite::Result<Agent> {
    let status: String = row.get(5)?;
    let heartbeat: Option<String> = row.get(6)?;
    Ok(Agent {
        id: row.get(0)?,
        team_id: row.get(1)?,
        role: row.get(2)?,
        model: row.get(3)?,
        runtime: row.get(4)?,
        status: status.parse().unwrap_or(AgentStatus::Dead),
        last_heartbeat_at: heartbeat.as_deref().map(parse_datetime),
        created_at: parse_datetime(&row.get::<_, String>(7)?),
    })
}

fn row_to_template(row: &rusqlite::Row<'_>) -> rusqlite::Result<Template> {
    let agents: String = row.get(5)?;
    let env: Option<String> = row.get(6)?;
    let tags: Option<String> = row.get(7)?;
    Ok(Template {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        builtin: row.get(4)?,
        agents: serde_json::from_str(&agents).unwrap_or_default(),
        env: env.as_deref().and_then(|e| serde_json::from_str(e).ok()),
        tags: tags
            .as_deref()
            .and_then(|t| serde_json::from_str(t).ok())
            .unwrap_or_default(),
        created_at: parse_datetime(&row.get::<_, String>(8)?),
    })
}

fn insert_agent_row(conn: &Connection, agent: &Agent) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO agents (id, team_id, role, model, runtime, status, last_heartbeat_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            agent.id,
            agent.team_id,
            agent.role,
            agent.model,
            agent.runtime,
            agent.status.as_str(),
            agent.last_heartbeat_at.map(|t| t.to_rfc3339()),
            agent.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn insert_template_row(conn: &Connection, template: &Template) -> rusqlite::Result<()> {
    let agents = serde_json::to_string(&template.agents).unwrap_or_else(|_| "[]".to_string());
    let env = template
        .env
        .as_ref()
        .and_then(|e| serde_json::to_string(e).ok());
    let tags = serde_json::to_string(&template.tags).unwrap_or_else(|_| "[]".to_string());
    conn.execute(
        "INSERT INTO templates (id, tenant_id, name, description, builtin, agents, env, tags, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            template.id,
            template.tenant_id,
            template.name,
            template.description,
            template.builtin,
            agents,
            env,
            tags,
            template.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Builtin rosters available to every tenant. Loaded once; `INSERT OR
/// IGNORE` keeps restarts idempotent.
fn seed_builtin_templates(conn: &Connection) -> rusqlite::Result<()> {
    let builtins: &[(&str, &str, &str, &[(&str, Option<&str>)])] = &[
        (
            "builtin-solo-dev",
            "solo-dev",
            "One developer agent",
            &[("dev", None)],
        ),
        (
            "builtin-pair",
            "pair",
            "Developer plus reviewer",
            &[("dev", None), ("reviewer", None)],
        ),
        (
            "builtin-full-squad",
            "full-squad",
            "Developer, reviewer, tester and merge captain",
            &[
                ("dev", None),
                ("reviewer", None),
                ("tester", None),
                ("merge-captain", None),
            ],
        ),
    ];

    for (id, name, description, roster) in builtins {
        let agents: Vec<TemplateAgent> = roster
            .iter()
            .map(|(role, model)| TemplateAgent {
                role: (*role).to_string(),
                model: model.map(String::from),
                runtime: None,
            })
            .collect();
        let agents_json = serde_json::to_string(&agents).unwrap_or_else(|_| "[]".to_string());
        conn.execute(
            "INSERT OR IGNORE INTO templates (id, tenant_id, name, description, builtin, agents, env, tags, created_at)
             VALUES (?1, NULL, ?2, ?3, 1, ?4, NULL, '[]', ?5)",
            params![id, name, description, agents_json, Utc::now().to_rfc3339()],
        )?;
    }
    Ok(())
}

fn map_unique_violation(err: rusqlite::Error, name: &str) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(code, _)
            if code.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            StoreError::NameExists(name.to_string())
        }
        _ => StoreError::Sqlite(err),
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn team(id: &str, tenant: &str, name: &str) -> Team {
        Team {
            id: id.to_string(),
            tenant_id: tenant.to_string(),
            name: name.to_string(),
            repo_url: "https://example.com/repo.git".to_string(),
            status: TeamStatus::Creating,
            channels: DEFAULT_CHANNELS.iter().map(|c| (*c).to_string()).collect(),
            chat_port: 16_660,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn agent(id: &str, team_id: &str, role: &str) -> Agent {
        Agent {
            id: id.to_string(),
            team_id: team_id.to_string(),
            role: role.to_string(),
            model: None,
            runtime: None,
            status: AgentStatus::Spawning,
            last_heartbeat_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn team_crud_round_trip() {
        let db = Database::open_in_memory().unwrap();
        db.create_team(&team("t1", "acme", "alpha"), &[agent("dev-1", "t1", "dev")])
            .unwrap();

        let loaded = db.get_team("t1").unwrap();
        assert_eq!(loaded.name, "alpha");
        assert_eq!(loaded.status, TeamStatus::Creating);
        assert_eq!(loaded.channels.len(), 5);

        db.update_team_status("t1", TeamStatus::Running).unwrap();
        assert_eq!(db.get_team("t1").unwrap().status, TeamStatus::Running);

        let roster = db.list_agents("t1").unwrap();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].role, "dev");
    }

    #[test]
    fn duplicate_team_name_per_tenant_rejected() {
        let db = Database::open_in_memory().unwrap();
        db.create_team(&team("t1", "acme", "alpha"), &[]).unwrap();

        let err = db.create_team(&team("t2", "acme", "alpha"), &[]).unwrap_err();
        assert!(matches!(err, StoreError::NameExists(_)));

        // Same name under a different tenant is fine
        db.create_team(&team("t3", "globex", "alpha"), &[]).unwrap();
    }

    #[test]
    fn delete_tombstones_and_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        db.create_team(&team("t1", "acme", "alpha"), &[agent("dev-1", "t1", "dev")])
            .unwrap();

        db.delete_team("t1").unwrap();
        assert!(db.is_tombstoned("t1").unwrap());
        assert!(matches!(
            db.get_team("t1").unwrap_err(),
            StoreError::TeamNotFound(_)
        ));

        // Second delete is a no-op
        db.delete_team("t1").unwrap();
        assert!(db.is_tombstoned("t1").unwrap());
    }

    #[test]
    fn heartbeat_and_status_updates() {
        let db = Database::open_in_memory().unwrap();
        db.create_team(&team("t1", "acme", "alpha"), &[agent("dev-1", "t1", "dev")])
            .unwrap();

        let at = Utc::now();
        db.record_agent_heartbeat("t1", "dev-1", at).unwrap();
        db.update_agent_status("t1", "dev-1", AgentStatus::Live)
            .unwrap();

        let loaded = db.get_agent("t1", "dev-1").unwrap();
        assert_eq!(loaded.status, AgentStatus::Live);
        assert!(loaded.last_heartbeat_at.is_some());

        assert!(matches!(
            db.record_agent_heartbeat("t1", "ghost", at).unwrap_err(),
            StoreError::AgentNotFound(_)
        ));
    }

    #[test]
    fn removed_agents_leave_the_roster() {
        let db = Database::open_in_memory().unwrap();
        db.create_team(
            &team("t1", "acme", "alpha"),
            &[agent("dev-1", "t1", "dev"), agent("rev-1", "t1", "reviewer")],
        )
        .unwrap();

        db.update_agent_status("t1", "rev-1", AgentStatus::Removed)
            .unwrap();
        let roster = db.list_agents("t1").unwrap();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].id, "dev-1");
    }

    #[test]
    fn chat_port_allocation_counts_up() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.next_chat_port(16_660).unwrap(), 16_660);

        let mut t = team("t1", "acme", "alpha");
        t.chat_port = 16_660;
        db.create_team(&t, &[]).unwrap();
        assert_eq!(db.next_chat_port(16_660).unwrap(), 16_661);
    }

    #[test]
    fn builtin_templates_seeded_and_read_only() {
        let db = Database::open_in_memory().unwrap();
        let templates = db.list_templates("acme").unwrap();
        assert!(templates.iter().any(|t| t.name == "solo-dev"));
        assert!(templates.iter().all(|t| t.builtin));

        let builtin = db.get_template("builtin-pair").unwrap();
        assert_eq!(builtin.agents.len(), 2);

        assert!(matches!(
            db.delete_template("builtin-pair").unwrap_err(),
            StoreError::BuiltinReadOnly(_)
        ));
        let mut edited = builtin;
        edited.name = "hacked".to_string();
        assert!(matches!(
            db.update_template(&edited).unwrap_err(),
            StoreError::BuiltinReadOnly(_)
        ));
    }

    #[test]
    fn custom_templates_scoped_to_tenant() {
        let db = Database::open_in_memory().unwrap();
        let template = Template {
            id: "tpl-1".to_string(),
            tenant_id: Some("acme".to_string()),
            name: "my-roster".to_string(),
            description: None,
            builtin: false,
            agents: vec![TemplateAgent {
                role: "dev".to_string(),
                model: Some("fast".to_string()),
                runtime: None,
            }],
            env: None,
            tags: vec!["ci".to_string()],
            created_at: Utc::now(),
        };
        db.create_template(&template).unwrap();

        let acme = db.list_templates("acme").unwrap();
        assert!(acme.iter().any(|t| t.id == "tpl-1"));
        let globex = db.list_templates("globex").unwrap();
        assert!(!globex.iter().any(|t| t.id == "tpl-1"));

        db.delete_template("tpl-1").unwrap();
        assert!(matches!(
            db.get_template("tpl-1").unwrap_err(),
            StoreError::TemplateNotFound(_)
        ));
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warroom.db");

        {
            let db = Database::open(&path).unwrap();
            db.create_team(&team("t1", "acme", "alpha"), &[agent("dev-1", "t1", "dev")])
                .unwrap();
            db.update_team_status("t1", TeamStatus::Running).unwrap();
        }

        let db = Database::open(&path).unwrap();
        let loaded = db.get_team("t1").unwrap();
        assert_eq!(loaded.status, TeamStatus::Running);
        assert_eq!(db.list_agents("t1").unwrap().len(), 1);
    }
}
