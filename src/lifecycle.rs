//! Team and agent lifecycle management
//!
//! Owns the team registry and drives both state machines. Every per-team
//! operation runs under that team's lock, so a stop can never interleave
//! with a concurrent roster change; operations on different teams run in
//! parallel. Container work is bounded by a two-minute deadline on top of
//! whatever the driver enforces internally.

pub mod topology;

use crate::auth::Principal;
use crate::broadcast::Broadcaster;
use crate::chat::{ChatClient, ChatConnector, ChatSessionSpec, InboundMessage};
use crate::driver::{ContainerDriver, ServiceStatus, Topology};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::events::{ChatMessage, Event};
use crate::liveness::LivenessTracker;
use crate::router::Router;
use crate::sidecar::SidecarControl;
use crate::store::{
    Agent, AgentStatus, Database, Team, TeamStatus, DEFAULT_CHANNELS, MAX_CHANNELS,
};
use chrono::Utc;
use rand::Rng;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use topology::{project_name, render_compose, IRCD_SERVICE};

/// Outer deadline around every container driver call
const DRIVER_DEADLINE: Duration = Duration::from_secs(120);

/// How often the startup window polls for first heartbeats
const STARTUP_POLL: Duration = Duration::from_millis(500);

/// Nick the orchestrator itself uses on team chat
const GATEWAY_NICK: &str = "warroom";

/// Nick attached to messages published through the REST surface
const OPERATOR_NICK: &str = "operator";

/// Requested agent, before ids are allocated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSpec {
    pub role: String,
    pub model: Option<String>,
    pub runtime: Option<String>,
}

/// Requested team, as submitted by a tenant
#[derive(Debug, Clone)]
pub struct TeamSpec {
    pub name: String,
    pub repo_url: String,
    pub agents: Vec<AgentSpec>,
    pub channels: Option<Vec<String>>,
}

/// Patchable team fields
#[derive(Debug, Clone, Default)]
pub struct TeamPatch {
    pub name: Option<String>,
    pub channels: Option<Vec<String>>,
}

/// Read-only lookup surface consumed by the push channel, so it never
/// holds the concrete manager.
pub trait TeamDirectory: Send + Sync {
    /// Resolve a team if the principal owns it. A team owned by someone
    /// else is indistinguishable from a missing one.
    fn owned_team(&self, principal: &Principal, team_id: &str) -> OrchestratorResult<Team>;

    fn roster(&self, team_id: &str) -> OrchestratorResult<Vec<Agent>>;
}

pub struct LifecycleManager {
    store: Database,
    driver: Arc<dyn ContainerDriver>,
    chat: Arc<dyn ChatConnector>,
    router: Arc<Router>,
    broadcaster: Arc<Broadcaster>,
    sidecar: Arc<SidecarControl>,
    liveness: Arc<LivenessTracker>,
    startup_window: Duration,
    chat_port_base: u16,
    team_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    chat_clients: Mutex<HashMap<String, Arc<dyn ChatClient>>>,
    /// Cancellation for in-flight creates; a delete cancels and the
    /// bring-up task discards its results at the next suspension point.
    create_cancels: Mutex<HashMap<String, CancellationToken>>,
}

impl LifecycleManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Database,
        driver: Arc<dyn ContainerDriver>,
        chat: Arc<dyn ChatConnector>,
        router: Arc<Router>,
        broadcaster: Arc<Broadcaster>,
        sidecar: Arc<SidecarControl>,
        liveness: Arc<LivenessTracker>,
        startup_window: Duration,
        chat_port_base: u16,
    ) -> Self {
        Self {
            store,
            driver,
            chat,
            router,
            broadcaster,
            sidecar,
            liveness,
            startup_window,
            chat_port_base,
            team_locks: Mutex::new(HashMap::new()),
            chat_clients: Mutex::new(HashMap::new()),
            create_cancels: Mutex::new(HashMap::new()),
        }
    }

    // ==================== Team Operations ====================

    /// Validate and persist a new team, then bring its containers up in
    /// the background. Returns immediately with the team in `creating`.
    pub async fn create_team(
        self: &Arc<Self>,
        principal: &Principal,
        spec: TeamSpec,
    ) -> OrchestratorResult<(Team, Vec<Agent>)> {
        let channels = validate_team_spec(&spec)?;

        let team_id = format!("t-{}", short_id());
        let now = Utc::now();
        let team = Team {
            id: team_id.clone(),
            tenant_id: principal.tenant_id.clone(),
            name: spec.name.trim().to_string(),
            repo_url: spec.repo_url.trim().to_string(),
            status: TeamStatus::Creating,
            channels,
            chat_port: self.store.next_chat_port(self.chat_port_base)?,
            created_at: now,
            updated_at: now,
        };
        let agents: Vec<Agent> = spec
            .agents
            .iter()
            .map(|agent| new_agent(&team_id, agent))
            .collect();

        self.store.create_team(&team, &agents)?;
        self.emit_team_status(&team_id, TeamStatus::Creating);
        for agent in &agents {
            self.liveness.track(&team_id, &agent.id, AgentStatus::Spawning);
        }

        let cancel = CancellationToken::new();
        self.create_cancels
            .lock()
            .unwrap()
            .insert(team_id.clone(), cancel.clone());

        let manager = self.clone();
        let bring_up_team = team.clone();
        let bring_up_agents = agents.clone();
        tokio::spawn(async move {
            manager.bring_up(bring_up_team, bring_up_agents, cancel).await;
        });

        Ok((team, agents))
    }

    /// Background half of create: containers, chat, startup window.
    async fn bring_up(self: Arc<Self>, team: Team, agents: Vec<Agent>, cancel: CancellationToken) {
        let team_id = team.id.clone();
        let lock = self.team_lock(&team_id);
        let _guard = lock.lock().await;

        let outcome = self.bring_up_inner(&team, &agents, &cancel).await;
        self.create_cancels.lock().unwrap().remove(&team_id);

        if cancel.is_cancelled() {
            // A delete raced the create; it owns teardown from here.
            tracing::info!(team_id = %team_id, "create cancelled, discarding bring-up");
            return;
        }

        match outcome {
            Ok(()) => {
                if let Err(err) = self.store.update_team_status(&team_id, TeamStatus::Running) {
                    tracing::error!(team_id = %team_id, error = %err, "cannot persist running status");
                    return;
                }
                self.emit_team_status(&team_id, TeamStatus::Running);
                tracing::info!(team_id = %team_id, "team is running");
            }
            Err(err) => {
                tracing::warn!(team_id = %team_id, error = %err, "team bring-up failed");
                if self
                    .store
                    .update_team_status(&team_id, TeamStatus::Error)
                    .is_ok()
                {
                    self.emit_team_status(&team_id, TeamStatus::Error);
                }
            }
        }
    }

    async fn bring_up_inner(
        &self,
        team: &Team,
        agents: &[Agent],
        cancel: &CancellationToken,
    ) -> OrchestratorResult<()> {
        if cancel.is_cancelled() {
            return Ok(());
        }
        let topology = Topology {
            project: project_name(&team.id),
            compose_yaml: render_compose(team, agents),
        };
        with_deadline(self.driver.up(&topology)).await??;
        if cancel.is_cancelled() {
            return Ok(());
        }

        self.connect_chat(team).await?;
        if cancel.is_cancelled() {
            return Ok(());
        }

        // Startup window: every agent must heartbeat once.
        let deadline = tokio::time::Instant::now() + self.startup_window;
        loop {
            if self.liveness.all_heartbeated(&team.id) {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(OrchestratorError::DriverFailure(format!(
                    "not all agents heartbeated within {}s",
                    self.startup_window.as_secs()
                )));
            }
            tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                () = tokio::time::sleep(STARTUP_POLL) => {}
            }
        }
    }

    /// Bring a stopped (or errored) team back up.
    pub async fn start_team(&self, principal: &Principal, team_id: &str) -> OrchestratorResult<Team> {
        let lock = self.team_lock(team_id);
        let _guard = lock.lock().await;

        let team = self.owned_team(principal, team_id)?;
        if !team.status.can_transition_to(TeamStatus::Running) {
            return Err(OrchestratorError::Conflict(format!(
                "cannot start a team in state {}",
                team.status
            )));
        }

        let agents = self.store.list_agents(team_id)?;
        let topology = Topology {
            project: project_name(team_id),
            compose_yaml: render_compose(&team, &agents),
        };
        with_deadline(self.driver.up(&topology)).await??;
        self.connect_chat(&team).await?;

        for agent in &agents {
            self.store
                .update_agent_status(team_id, &agent.id, AgentStatus::Spawning)?;
            self.liveness.track(team_id, &agent.id, AgentStatus::Spawning);
        }

        self.store.update_team_status(team_id, TeamStatus::Running)?;
        self.emit_team_status(team_id, TeamStatus::Running);
        self.store.get_team(team_id).map_err(Into::into)
    }

    /// Bring the containers down but keep all configuration.
    pub async fn stop_team(&self, principal: &Principal, team_id: &str) -> OrchestratorResult<Team> {
        let lock = self.team_lock(team_id);
        let _guard = lock.lock().await;

        let team = self.owned_team(principal, team_id)?;
        if !team.status.can_transition_to(TeamStatus::Stopped) {
            return Err(OrchestratorError::Conflict(format!(
                "cannot stop a team in state {}",
                team.status
            )));
        }

        self.teardown_runtime(team_id).await?;
        self.store.update_team_status(team_id, TeamStatus::Stopped)?;
        self.emit_team_status(team_id, TeamStatus::Stopped);
        self.store.get_team(team_id).map_err(Into::into)
    }

    /// Tear everything down and tombstone the id. Idempotent.
    pub async fn delete_team(&self, principal: &Principal, team_id: &str) -> OrchestratorResult<()> {
        // Cancel an in-flight create before taking the team lock; the
        // bring-up task drops out at its next suspension point.
        if let Some(cancel) = self.create_cancels.lock().unwrap().remove(team_id) {
            cancel.cancel();
        }

        let lock = self.team_lock(team_id);
        let _guard = lock.lock().await;

        if self.store.is_tombstoned(team_id)? {
            return Ok(());
        }
        let team = match self.store.get_team(team_id) {
            Ok(team) => team,
            Err(crate::store::StoreError::TeamNotFound(_)) => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        if team.tenant_id != principal.tenant_id {
            return Err(OrchestratorError::NotFound(format!("team {team_id}")));
        }

        self.teardown_runtime(team_id).await?;
        self.router.clear(team_id);
        self.store.delete_team(team_id)?;
        self.emit_team_status(team_id, TeamStatus::Deleted);
        Ok(())
    }

    /// Rename any time; channel edits only while stopped, because a live
    /// chat server would need reconnection.
    pub async fn update_team(
        &self,
        principal: &Principal,
        team_id: &str,
        patch: TeamPatch,
    ) -> OrchestratorResult<Team> {
        let lock = self.team_lock(team_id);
        let _guard = lock.lock().await;

        let team = self.owned_team(principal, team_id)?;

        if let Some(name) = &patch.name {
            if name.trim().is_empty() {
                return Err(OrchestratorError::Validation(
                    "team name cannot be empty".to_string(),
                ));
            }
            self.store.rename_team(team_id, name.trim())?;
        }

        if let Some(channels) = &patch.channels {
            if team.status != TeamStatus::Stopped {
                return Err(OrchestratorError::Conflict(
                    "channels can only change while the team is stopped".to_string(),
                ));
            }
            let normalized = validate_channels(channels)?;
            self.store.update_team_channels(team_id, &normalized)?;
        }

        self.store.get_team(team_id).map_err(Into::into)
    }

    // ==================== Roster Operations ====================

    /// Add an agent. On a running team the container comes up immediately
    /// and the agent joins chat through its own process.
    pub async fn add_agent(
        &self,
        principal: &Principal,
        team_id: &str,
        spec: AgentSpec,
    ) -> OrchestratorResult<Agent> {
        if spec.role.trim().is_empty() {
            return Err(OrchestratorError::Validation(
                "agent role cannot be empty".to_string(),
            ));
        }

        let lock = self.team_lock(team_id);
        let _guard = lock.lock().await;

        let team = self.owned_team(principal, team_id)?;
        let agent = new_agent(team_id, &spec);
        self.store.insert_agent(&agent)?;

        if team.status == TeamStatus::Running {
            let agents = self.store.list_agents(team_id)?;
            let topology = Topology {
                project: project_name(team_id),
                compose_yaml: render_compose(&team, &agents),
            };
            with_deadline(self.driver.up(&topology)).await??;
            self.liveness.track(team_id, &agent.id, AgentStatus::Spawning);
        }

        self.broadcaster.publish(&Event::AgentStatus {
            team_id: team_id.to_string(),
            agent_id: agent.id.clone(),
            status: AgentStatus::Spawning,
        });
        Ok(agent)
    }

    /// Remove an agent from the roster and take its container down.
    pub async fn remove_agent(
        &self,
        principal: &Principal,
        team_id: &str,
        agent_id: &str,
    ) -> OrchestratorResult<()> {
        let lock = self.team_lock(team_id);
        let _guard = lock.lock().await;

        let team = self.owned_team(principal, team_id)?;
        let agent = self.store.get_agent(team_id, agent_id)?;
        if agent.status == AgentStatus::Removed {
            return Ok(());
        }

        self.sidecar.close_agent(team_id, agent_id);
        self.liveness.forget(team_id, agent_id);
        if team.status == TeamStatus::Running {
            with_deadline(self.driver.remove_service(&project_name(team_id), agent_id)).await??;
        }

        self.store
            .update_agent_status(team_id, agent_id, AgentStatus::Removed)?;
        self.broadcaster.publish(&Event::AgentStatus {
            team_id: team_id.to_string(),
            agent_id: agent_id.to_string(),
            status: AgentStatus::Removed,
        });
        Ok(())
    }

    // ==================== Chat Surface ====================

    /// Publish a line to a team channel on behalf of the operator. The
    /// gateway does not echo our own traffic back, so the message is also
    /// routed locally to hit the ring buffer and the subscribers.
    pub async fn say(
        &self,
        principal: &Principal,
        team_id: &str,
        channel: &str,
        text: &str,
    ) -> OrchestratorResult<ChatMessage> {
        let team = self.owned_team(principal, team_id)?;
        let channel = normalize_channel(channel)?;
        if !team.channels.contains(&channel) {
            return Err(OrchestratorError::NotFound(format!(
                "channel {channel} on team {team_id}"
            )));
        }

        let client = self
            .chat_clients
            .lock()
            .unwrap()
            .get(team_id)
            .cloned()
            .ok_or_else(|| {
                OrchestratorError::Conflict(format!("team {team_id} has no live chat gateway"))
            })?;
        client.say(&channel, text).await?;

        let inbound = InboundMessage {
            team_id: team_id.to_string(),
            channel: channel.clone(),
            nick: OPERATOR_NICK.to_string(),
            text: text.to_string(),
            time: Utc::now(),
        };
        let (tag, tag_body) = crate::router::parse_tag(&inbound.text);
        let message = ChatMessage {
            time: inbound.time,
            team_id: inbound.team_id.clone(),
            channel: inbound.channel.clone(),
            nick: inbound.nick.clone(),
            text: inbound.text.trim().to_string(),
            tag,
            tag_body,
        };
        self.router.route(inbound);
        Ok(message)
    }

    /// Ring buffer snapshot for a channel.
    pub fn recent_messages(
        &self,
        principal: &Principal,
        team_id: &str,
        channel: &str,
    ) -> OrchestratorResult<Vec<ChatMessage>> {
        let team = self.owned_team(principal, team_id)?;
        let channel = normalize_channel(channel)?;
        if !team.channels.contains(&channel) {
            return Err(OrchestratorError::NotFound(format!(
                "channel {channel} on team {team_id}"
            )));
        }
        Ok(self.router.recent(team_id, &channel))
    }

    // ==================== Rehydration ====================

    /// Reconcile persisted teams against what the container runtime still
    /// has after a restart. Never auto-starts a stopped team.
    pub async fn rehydrate(&self) -> OrchestratorResult<()> {
        for team in self.store.list_all_teams()? {
            let lock = self.team_lock(&team.id);
            let _guard = lock.lock().await;

            let agents = self.store.list_agents(&team.id)?;
            let reconciled = match self.driver.status(&project_name(&team.id)).await {
                Ok(statuses) => reconcile_status(&agents, &statuses),
                Err(err) => {
                    tracing::warn!(team_id = %team.id, error = %err, "rehydrate: driver status failed");
                    TeamStatus::Error
                }
            };

            if reconciled == TeamStatus::Running {
                if let Err(err) = self.connect_chat(&team).await {
                    tracing::warn!(team_id = %team.id, error = %err, "rehydrate: chat reconnect failed");
                }
                for agent in &agents {
                    self.liveness.track(&team.id, &agent.id, agent.status);
                }
            }

            if reconciled != team.status {
                self.store.update_team_status(&team.id, reconciled)?;
            }
            self.emit_team_status(&team.id, reconciled);
            tracing::info!(
                team_id = %team.id,
                status = %reconciled,
                "rehydrated team"
            );
        }
        Ok(())
    }

    // ==================== Internals ====================

    fn team_lock(&self, team_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.team_locks
            .lock()
            .unwrap()
            .entry(team_id.to_string())
            .or_default()
            .clone()
    }

    fn owned_team_impl(&self, principal: &Principal, team_id: &str) -> OrchestratorResult<Team> {
        let team = self.store.get_team(team_id)?;
        if team.tenant_id != principal.tenant_id {
            return Err(OrchestratorError::NotFound(format!("team {team_id}")));
        }
        Ok(team)
    }

    /// Connect the gateway client and bind the router as its sink.
    async fn connect_chat(&self, team: &Team) -> OrchestratorResult<()> {
        let (sink, mut inbound_rx) = mpsc::channel::<InboundMessage>(256);
        let spec = ChatSessionSpec {
            team_id: team.id.clone(),
            host: "127.0.0.1".to_string(),
            port: team.chat_port,
            nick: GATEWAY_NICK.to_string(),
            channels: team.channels.clone(),
        };
        let client = self.chat.connect(spec, sink).await?;

        if let Some(old) = self
            .chat_clients
            .lock()
            .unwrap()
            .insert(team.id.clone(), client)
        {
            tokio::spawn(async move { old.shutdown().await });
        }

        let router = self.router.clone();
        tokio::spawn(async move {
            while let Some(inbound) = inbound_rx.recv().await {
                router.route(inbound);
            }
        });
        Ok(())
    }

    /// Shared teardown for stop and delete: console attachments, chat
    /// client, liveness entries, containers.
    async fn teardown_runtime(&self, team_id: &str) -> OrchestratorResult<()> {
        self.sidecar.close_team(team_id);
        self.liveness.forget_team(team_id);
        let client = self.chat_clients.lock().unwrap().remove(team_id);
        if let Some(client) = client {
            client.shutdown().await;
        }
        with_deadline(self.driver.down(&project_name(team_id))).await??;
        Ok(())
    }

    fn emit_team_status(&self, team_id: &str, status: TeamStatus) {
        self.broadcaster.publish(&Event::TeamStatus {
            team_id: team_id.to_string(),
            status,
        });
    }

    // ==================== Read Surface ====================

    pub fn get_team(&self, principal: &Principal, team_id: &str) -> OrchestratorResult<Team> {
        self.owned_team_impl(principal, team_id)
    }

    pub fn list_teams(&self, principal: &Principal) -> OrchestratorResult<Vec<Team>> {
        Ok(self.store.list_teams(&principal.tenant_id)?)
    }

    pub fn team_roster(&self, team_id: &str) -> OrchestratorResult<Vec<Agent>> {
        Ok(self.store.list_agents(team_id)?)
    }
}

impl TeamDirectory for LifecycleManager {
    fn owned_team(&self, principal: &Principal, team_id: &str) -> OrchestratorResult<Team> {
        self.owned_team_impl(principal, team_id)
    }

    fn roster(&self, team_id: &str) -> OrchestratorResult<Vec<Agent>> {
        self.team_roster(team_id)
    }
}

// ==================== Pure Helpers ====================

/// Wrap a driver future in the lifecycle-level deadline.
async fn with_deadline<T, F>(future: F) -> OrchestratorResult<T>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(DRIVER_DEADLINE, future)
        .await
        .map_err(|_| {
            OrchestratorError::DriverUnavailable(format!(
                "driver call exceeded {}s deadline",
                DRIVER_DEADLINE.as_secs()
            ))
        })
}

/// Decide a team's post-restart status from what the runtime reports.
///
/// Running only when every agent container is up; nothing up means a
/// clean stop; anything in between needs an operator.
pub fn reconcile_status(agents: &[Agent], statuses: &[ServiceStatus]) -> TeamStatus {
    let running: Vec<&str> = statuses
        .iter()
        .filter(|s| s.running)
        .map(|s| s.service.as_str())
        .collect();

    if running.is_empty() {
        return TeamStatus::Stopped;
    }

    let all_agents_up = agents
        .iter()
        .all(|agent| running.contains(&agent.id.as_str()));
    let ircd_up = running.contains(&IRCD_SERVICE);

    if all_agents_up && ircd_up {
        TeamStatus::Running
    } else {
        TeamStatus::Error
    }
}

fn validate_team_spec(spec: &TeamSpec) -> OrchestratorResult<Vec<String>> {
    if spec.name.trim().is_empty() {
        return Err(OrchestratorError::Validation(
            "team name cannot be empty".to_string(),
        ));
    }
    validate_repo_url(&spec.repo_url)?;
    if spec.agents.is_empty() {
        return Err(OrchestratorError::Validation(
            "a team needs at least one agent".to_string(),
        ));
    }
    if spec.agents.iter().any(|a| a.role.trim().is_empty()) {
        return Err(OrchestratorError::Validation(
            "agent role cannot be empty".to_string(),
        ));
    }

    match &spec.channels {
        None => Ok(DEFAULT_CHANNELS.iter().map(|c| (*c).to_string()).collect()),
        Some(channels) => validate_channels(channels),
    }
}

fn validate_repo_url(url: &str) -> OrchestratorResult<()> {
    let url = url.trim();
    let well_formed = url.starts_with("https://")
        || url.starts_with("http://")
        || url.starts_with("ssh://")
        || url.starts_with("git://")
        || url.starts_with("file://")
        || (url.contains('@') && url.contains(':'));
    if url.is_empty() || !well_formed {
        return Err(OrchestratorError::Validation(format!(
            "repository url is not well-formed: {url}"
        )));
    }
    Ok(())
}

/// Normalize and bound a requested channel list.
pub fn validate_channels(channels: &[String]) -> OrchestratorResult<Vec<String>> {
    if channels.is_empty() {
        return Err(OrchestratorError::Validation(
            "channel list cannot be empty".to_string(),
        ));
    }
    if channels.len() > MAX_CHANNELS {
        return Err(OrchestratorError::Validation(format!(
            "at most {MAX_CHANNELS} channels per team"
        )));
    }
    let mut normalized = Vec::with_capacity(channels.len());
    for channel in channels {
        let channel = normalize_channel(channel)?;
        if !normalized.contains(&channel) {
            normalized.push(channel);
        }
    }
    Ok(normalized)
}

/// Accept `main`, `#main` or the URL-encoded `%23main` (already decoded by
/// the transport) and yield the canonical `#main`.
pub fn normalize_channel(raw: &str) -> OrchestratorResult<String> {
    let trimmed = raw.trim();
    let name = trimmed.strip_prefix('#').unwrap_or(trimmed);
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(OrchestratorError::Validation(format!(
            "invalid channel name: {raw}"
        )));
    }
    Ok(format!("#{name}"))
}

fn new_agent(team_id: &str, spec: &AgentSpec) -> Agent {
    let role = spec.role.trim().to_lowercase();
    Agent {
        id: format!("{}-{}", role_slug(&role), short_id()),
        team_id: team_id.to_string(),
        role,
        model: spec.model.clone(),
        runtime: spec.runtime.clone(),
        status: AgentStatus::Spawning,
        last_heartbeat_at: None,
        created_at: Utc::now(),
    }
}

fn role_slug(role: &str) -> String {
    let slug: String = role
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c
            } else {
                '-'
            }
        })
        .collect();
    slug.trim_matches('-').to_string()
}

fn short_id() -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..6)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}
