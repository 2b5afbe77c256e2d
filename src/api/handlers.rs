//! HTTP request handlers

use super::types::{
    AgentBody, ControlRequest, CreateTeamRequest, ErrorResponse, MessagesResponse,
    PatchTeamRequest, SayRequest, SayResponse, TeamListResponse, TeamResponse,
    TemplateListResponse, TemplateRequest, WsTokenResponse,
};
use super::ws::ws_handler;
use super::AppState;
use crate::auth::Principal;
use crate::error::OrchestratorError;
use crate::lifecycle::{AgentSpec, TeamPatch, TeamSpec};
use crate::store::Template;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Liveness of the orchestrator itself
        .route("/healthz", get(healthz))
        // Team CRUD
        .route("/teams", post(create_team).get(list_teams))
        .route(
            "/teams/:id",
            get(get_team).patch(patch_team).delete(delete_team),
        )
        // Lifecycle transitions
        .route("/teams/:id/start", post(start_team))
        .route("/teams/:id/stop", post(stop_team))
        // Roster
        .route("/teams/:id/agents", post(add_agent))
        .route("/teams/:id/agents/:aid", axum::routing::delete(remove_agent))
        // Sidecar control
        .route("/teams/:id/agents/:aid/nudge", post(nudge_agent))
        .route("/teams/:id/agents/:aid/interrupt", post(interrupt_agent))
        .route("/teams/:id/agents/:aid/directive", post(directive_agent))
        .route("/teams/:id/agents/:aid/exec", post(exec_agent))
        // Channel messages
        .route(
            "/teams/:id/channels/:name/messages",
            get(get_messages).post(post_message),
        )
        // Heartbeat ingestion; auth-exempt, reachable only from inside the
        // team's container network
        .route("/heartbeat/:team/:agent", post(heartbeat))
        // Templates
        .route("/templates", get(list_templates).post(create_template))
        .route(
            "/templates/:id",
            put(update_template).delete(delete_template),
        )
        // One-shot push-channel tokens
        .route("/ws-tokens", post(mint_ws_token))
        // Long-lived push channel
        .route("/ws", get(ws_handler))
        .with_state(state)
}

// ============================================================
// Principal resolution
// ============================================================

/// Resolve the bearer key to a principal; everything except the heartbeat
/// ingestion path goes through here.
fn principal(state: &AppState, headers: &HeaderMap) -> Result<Principal, AppError> {
    let raw = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("missing authorization header".to_string()))?;
    let token = raw
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Unauthorized("expected bearer authorization".to_string()))?;
    state
        .tenants
        .resolve(token)
        .ok_or_else(|| AppError::Unauthorized("unknown api key".to_string()))
}

// ============================================================
// Teams
// ============================================================

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

async fn create_team(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateTeamRequest>,
) -> Result<(StatusCode, Json<TeamResponse>), AppError> {
    let principal = principal(&state, &headers)?;
    let spec = TeamSpec {
        name: req.name,
        repo_url: req.repo.url,
        agents: req.agents.into_iter().map(agent_spec).collect(),
        channels: req.channels,
    };
    let (team, agents) = state.lifecycle.create_team(&principal, spec).await?;
    Ok((StatusCode::CREATED, Json(TeamResponse { team, agents })))
}

async fn list_teams(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<TeamListResponse>, AppError> {
    let principal = principal(&state, &headers)?;
    let teams = state.lifecycle.list_teams(&principal)?;
    let mut out = Vec::with_capacity(teams.len());
    for team in teams {
        let agents = state.lifecycle.team_roster(&team.id)?;
        out.push(TeamResponse { team, agents });
    }
    Ok(Json(TeamListResponse { teams: out }))
}

async fn get_team(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<TeamResponse>, AppError> {
    let principal = principal(&state, &headers)?;
    let team = state.lifecycle.get_team(&principal, &id)?;
    let agents = state.lifecycle.team_roster(&id)?;
    Ok(Json(TeamResponse { team, agents }))
}

async fn patch_team(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<PatchTeamRequest>,
) -> Result<Json<TeamResponse>, AppError> {
    let principal = principal(&state, &headers)?;
    let patch = TeamPatch {
        name: req.name,
        channels: req.channels,
    };
    let team = state.lifecycle.update_team(&principal, &id, patch).await?;
    let agents = state.lifecycle.team_roster(&id)?;
    Ok(Json(TeamResponse { team, agents }))
}

async fn delete_team(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let principal = principal(&state, &headers)?;
    state.lifecycle.delete_team(&principal, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn start_team(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<TeamResponse>, AppError> {
    let principal = principal(&state, &headers)?;
    let team = state.lifecycle.start_team(&principal, &id).await?;
    let agents = state.lifecycle.team_roster(&id)?;
    Ok(Json(TeamResponse { team, agents }))
}

async fn stop_team(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<TeamResponse>, AppError> {
    let principal = principal(&state, &headers)?;
    let team = state.lifecycle.stop_team(&principal, &id).await?;
    let agents = state.lifecycle.team_roster(&id)?;
    Ok(Json(TeamResponse { team, agents }))
}

// ============================================================
// Roster
// ============================================================

fn agent_spec(body: AgentBody) -> AgentSpec {
    AgentSpec {
        role: body.role,
        model: body.model,
        runtime: body.runtime,
    }
}

async fn add_agent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<AgentBody>,
) -> Result<(StatusCode, Json<crate::store::Agent>), AppError> {
    let principal = principal(&state, &headers)?;
    let agent = state
        .lifecycle
        .add_agent(&principal, &id, agent_spec(req))
        .await?;
    Ok((StatusCode::CREATED, Json(agent)))
}

async fn remove_agent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, aid)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    let principal = principal(&state, &headers)?;
    state.lifecycle.remove_agent(&principal, &id, &aid).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================
// Sidecar control
// ============================================================

/// Ownership check shared by the control endpoints.
fn check_agent(state: &AppState, principal: &Principal, team_id: &str, agent_id: &str) -> Result<(), AppError> {
    state.lifecycle.get_team(principal, team_id)?;
    let roster = state.lifecycle.team_roster(team_id)?;
    if !roster.iter().any(|a| a.id == agent_id) {
        return Err(OrchestratorError::NotFound(format!("agent {agent_id}")).into());
    }
    Ok(())
}

fn required_message(req: &ControlRequest) -> Result<&str, AppError> {
    req.message
        .as_deref()
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| {
            OrchestratorError::Validation("a message body is required".to_string()).into()
        })
}

async fn nudge_agent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, aid)): Path<(String, String)>,
    Json(req): Json<ControlRequest>,
) -> Result<StatusCode, AppError> {
    let principal = principal(&state, &headers)?;
    check_agent(&state, &principal, &id, &aid)?;
    state
        .sidecar
        .nudge(&id, &aid, required_message(&req)?)
        .await?;
    Ok(StatusCode::ACCEPTED)
}

async fn interrupt_agent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, aid)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    let principal = principal(&state, &headers)?;
    check_agent(&state, &principal, &id, &aid)?;
    state.sidecar.interrupt(&id, &aid).await?;
    Ok(StatusCode::ACCEPTED)
}

async fn directive_agent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, aid)): Path<(String, String)>,
    Json(req): Json<ControlRequest>,
) -> Result<StatusCode, AppError> {
    let principal = principal(&state, &headers)?;
    check_agent(&state, &principal, &id, &aid)?;
    state
        .sidecar
        .directive(&id, &aid, required_message(&req)?)
        .await?;
    Ok(StatusCode::ACCEPTED)
}

async fn exec_agent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, aid)): Path<(String, String)>,
    Json(req): Json<ControlRequest>,
) -> Result<StatusCode, AppError> {
    let principal = principal(&state, &headers)?;
    check_agent(&state, &principal, &id, &aid)?;
    let command = req.command.as_deref().unwrap_or(&[]);
    state.sidecar.exec(&id, &aid, command).await?;
    Ok(StatusCode::ACCEPTED)
}

// ============================================================
// Channel messages
// ============================================================

async fn get_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, name)): Path<(String, String)>,
) -> Result<Json<MessagesResponse>, AppError> {
    let principal = principal(&state, &headers)?;
    let messages = state.lifecycle.recent_messages(&principal, &id, &name)?;
    Ok(Json(MessagesResponse { messages }))
}

async fn post_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, name)): Path<(String, String)>,
    Json(req): Json<SayRequest>,
) -> Result<Json<SayResponse>, AppError> {
    let principal = principal(&state, &headers)?;
    if req.text.trim().is_empty() {
        return Err(OrchestratorError::Validation("message text cannot be empty".to_string()).into());
    }
    let message = state
        .lifecycle
        .say(&principal, &id, &name, &req.text)
        .await?;
    Ok(Json(SayResponse { message }))
}

// ============================================================
// Heartbeats
// ============================================================

/// Auth-exempt by design: the agent container cannot hold a tenant key.
/// Unknown (team, agent) pairs are ignored but still answered 200 so a
/// probe cannot distinguish live ids from dead ones.
async fn heartbeat(
    State(state): State<AppState>,
    Path((team, agent)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    state.liveness.record_heartbeat(&team, &agent, Utc::now())?;
    Ok(StatusCode::OK)
}

// ============================================================
// Templates
// ============================================================

async fn list_templates(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<TemplateListResponse>, AppError> {
    let principal = principal(&state, &headers)?;
    let templates = state
        .store
        .list_templates(&principal.tenant_id)
        .map_err(OrchestratorError::from)?;
    Ok(Json(TemplateListResponse { templates }))
}

async fn create_template(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<TemplateRequest>,
) -> Result<(StatusCode, Json<Template>), AppError> {
    let principal = principal(&state, &headers)?;
    if req.name.trim().is_empty() {
        return Err(OrchestratorError::Validation("template name cannot be empty".to_string()).into());
    }
    if req.agents.is_empty() {
        return Err(
            OrchestratorError::Validation("template needs at least one agent".to_string()).into(),
        );
    }
    let template = Template {
        id: format!("tpl-{}", uuid::Uuid::new_v4()),
        tenant_id: Some(principal.tenant_id),
        name: req.name,
        description: req.description,
        builtin: false,
        agents: req.agents,
        env: req.env,
        tags: req.tags,
        created_at: Utc::now(),
    };
    state
        .store
        .create_template(&template)
        .map_err(OrchestratorError::from)?;
    Ok((StatusCode::CREATED, Json(template)))
}

async fn update_template(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<TemplateRequest>,
) -> Result<Json<Template>, AppError> {
    let principal = principal(&state, &headers)?;
    let existing = state
        .store
        .get_template(&id)
        .map_err(OrchestratorError::from)?;
    if existing.tenant_id.as_deref() != Some(principal.tenant_id.as_str()) && !existing.builtin {
        return Err(OrchestratorError::NotFound(format!("template {id}")).into());
    }

    let template = Template {
        id: existing.id.clone(),
        tenant_id: existing.tenant_id.clone(),
        name: req.name,
        description: req.description,
        builtin: existing.builtin,
        agents: req.agents,
        env: req.env,
        tags: req.tags,
        created_at: existing.created_at,
    };
    state
        .store
        .update_template(&template)
        .map_err(OrchestratorError::from)?;
    Ok(Json(template))
}

async fn delete_template(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let principal = principal(&state, &headers)?;
    let existing = state
        .store
        .get_template(&id)
        .map_err(OrchestratorError::from)?;
    if existing.tenant_id.as_deref() != Some(principal.tenant_id.as_str()) && !existing.builtin {
        return Err(OrchestratorError::NotFound(format!("template {id}")).into());
    }
    state
        .store
        .delete_template(&id)
        .map_err(OrchestratorError::from)?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================
// Push-channel tokens
// ============================================================

async fn mint_ws_token(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<WsTokenResponse>, AppError> {
    let principal = principal(&state, &headers)?;
    let token = state.tokens.mint(&principal);
    Ok(Json(WsTokenResponse { token }))
}

// ============================================================
// Error mapping
// ============================================================

/// Transport-level error; everything below the handlers speaks
/// `OrchestratorError`.
#[derive(Debug)]
pub enum AppError {
    Core(OrchestratorError),
    Unauthorized(String),
}

impl From<OrchestratorError> for AppError {
    fn from(err: OrchestratorError) -> Self {
        AppError::Core(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Core(err) => {
                let status = match &err {
                    OrchestratorError::Validation(_) => StatusCode::BAD_REQUEST,
                    OrchestratorError::NotFound(_) => StatusCode::NOT_FOUND,
                    OrchestratorError::Conflict(_) => StatusCode::CONFLICT,
                    OrchestratorError::DriverUnavailable(_) | OrchestratorError::Transient(_) => {
                        StatusCode::SERVICE_UNAVAILABLE
                    }
                    OrchestratorError::DriverFailure(_) => StatusCode::BAD_GATEWAY,
                    OrchestratorError::OverflowClosed | OrchestratorError::Internal(_) => {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    tracing::error!(error = %err, "internal error");
                }
                (status, err.to_string())
            }
        };
        (status, Json(ErrorResponse::new(message))).into_response()
    }
}
