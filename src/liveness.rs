//! Heartbeat tracking and stall escalation
//!
//! Heartbeats arrive from inside team container networks; a background
//! ticker classifies agents as live / stalled / dead and walks the
//! escalation ladder (nudge, interrupt, mark dead). Escalation actions are
//! fired on their own tasks so a wedged container can never block the scan.

use crate::broadcast::Broadcaster;
use crate::error::OrchestratorResult;
use crate::events::Event;
use crate::sidecar::SidecarControl;
use crate::store::{AgentStatus, Database};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Scan granularity of the background ticker
const TICK: Duration = Duration::from_secs(1);

/// What the nudge says when an agent goes quiet
const STALL_NUDGE: &str = "no heartbeat received, report status";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    None,
    Nudged,
    Interrupted,
    Dead,
}

struct TrackedAgent {
    status: AgentStatus,
    /// Wall-clock timestamp, persisted and carried on events
    last_at: Option<DateTime<Utc>>,
    /// Monotonic timestamp, drives the escalation math
    last_instant: Option<Instant>,
    stage: Stage,
}

/// One escalation decision produced by a scan
enum Action {
    Stall { team_id: String, agent_id: String },
    Interrupt { team_id: String, agent_id: String },
    MarkDead { team_id: String, agent_id: String },
}

pub struct LivenessTracker {
    store: Database,
    broadcaster: Arc<Broadcaster>,
    sidecar: Arc<SidecarControl>,
    stall_timeout: Duration,
    entries: Mutex<HashMap<(String, String), TrackedAgent>>,
}

impl LivenessTracker {
    pub fn new(
        store: Database,
        broadcaster: Arc<Broadcaster>,
        sidecar: Arc<SidecarControl>,
        stall_timeout: Duration,
    ) -> Self {
        Self {
            store,
            broadcaster,
            sidecar,
            stall_timeout,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Start watching an agent. Called when its container comes up and on
    /// rehydration.
    pub fn track(&self, team_id: &str, agent_id: &str, status: AgentStatus) {
        self.entries.lock().unwrap().insert(
            (team_id.to_string(), agent_id.to_string()),
            TrackedAgent {
                status,
                last_at: None,
                last_instant: None,
                stage: Stage::None,
            },
        );
    }

    pub fn forget(&self, team_id: &str, agent_id: &str) {
        self.entries
            .lock()
            .unwrap()
            .remove(&(team_id.to_string(), agent_id.to_string()));
    }

    pub fn forget_team(&self, team_id: &str) {
        self.entries
            .lock()
            .unwrap()
            .retain(|(team, _), _| team != team_id);
    }

    /// Whether every tracked agent of a team has heartbeated at least once.
    pub fn all_heartbeated(&self, team_id: &str) -> bool {
        let entries = self.entries.lock().unwrap();
        entries
            .iter()
            .filter(|((team, _), _)| team == team_id)
            .all(|(_, entry)| entry.last_at.is_some())
    }

    /// Ingest one heartbeat. Returns whether it was accepted.
    ///
    /// Unknown or removed agents are ignored without mutating anything;
    /// the ingestion endpoint still answers 200 to them. Timestamps are
    /// monotonic per agent: an out-of-order heartbeat is dropped.
    pub fn record_heartbeat(
        &self,
        team_id: &str,
        agent_id: &str,
        at: DateTime<Utc>,
    ) -> OrchestratorResult<bool> {
        let key = (team_id.to_string(), agent_id.to_string());

        {
            let mut entries = self.entries.lock().unwrap();
            let Some(entry) = entries.get_mut(&key) else {
                return Ok(false);
            };
            if entry.status == AgentStatus::Removed || entry.status == AgentStatus::Dead {
                return Ok(false);
            }
            if entry.last_at.is_some_and(|prev| at < prev) {
                return Ok(false);
            }
            entry.last_at = Some(at);
            entry.last_instant = Some(Instant::now());
            entry.stage = Stage::None;
        }

        self.store.record_agent_heartbeat(team_id, agent_id, at)?;
        self.broadcaster.publish(&Event::Heartbeat {
            team_id: team_id.to_string(),
            agent_id: agent_id.to_string(),
            at,
        });

        let revived = {
            let mut entries = self.entries.lock().unwrap();
            match entries.get_mut(&key) {
                Some(entry)
                    if matches!(entry.status, AgentStatus::Spawning | AgentStatus::Stalled) =>
                {
                    entry.status = AgentStatus::Live;
                    true
                }
                _ => false,
            }
        };
        if revived {
            self.transition(team_id, agent_id, AgentStatus::Live)?;
        }

        Ok(true)
    }

    /// Run the escalation ticker until cancelled.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(TICK);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                () = cancel.cancelled() => return,
                _ = interval.tick() => self.scan(),
            }
        }
    }

    /// One escalation pass over all tracked agents.
    fn scan(&self) {
        let now = Instant::now();
        let actions: Vec<Action> = {
            let mut entries = self.entries.lock().unwrap();
            let mut actions = Vec::new();
            for ((team_id, agent_id), entry) in entries.iter_mut() {
                if !matches!(entry.status, AgentStatus::Live | AgentStatus::Stalled) {
                    continue;
                }
                let Some(last) = entry.last_instant else {
                    continue;
                };
                let elapsed = now.duration_since(last);

                let next = match entry.stage {
                    Stage::None if elapsed >= self.stall_timeout => Some((
                        Stage::Nudged,
                        Action::Stall {
                            team_id: team_id.clone(),
                            agent_id: agent_id.clone(),
                        },
                    )),
                    Stage::Nudged if elapsed >= self.stall_timeout * 2 => Some((
                        Stage::Interrupted,
                        Action::Interrupt {
                            team_id: team_id.clone(),
                            agent_id: agent_id.clone(),
                        },
                    )),
                    Stage::Interrupted if elapsed >= self.stall_timeout * 3 => Some((
                        Stage::Dead,
                        Action::MarkDead {
                            team_id: team_id.clone(),
                            agent_id: agent_id.clone(),
                        },
                    )),
                    _ => None,
                };

                if let Some((stage, action)) = next {
                    entry.stage = stage;
                    match stage {
                        Stage::Nudged => entry.status = AgentStatus::Stalled,
                        Stage::Dead => entry.status = AgentStatus::Dead,
                        _ => {}
                    }
                    actions.push(action);
                }
            }
            actions
        };

        for action in actions {
            self.apply(action);
        }
    }

    fn apply(&self, action: Action) {
        match action {
            Action::Stall { team_id, agent_id } => {
                if let Err(err) = self.transition(&team_id, &agent_id, AgentStatus::Stalled) {
                    tracing::warn!(%team_id, %agent_id, error = %err, "stall transition failed");
                }
                let sidecar = self.sidecar.clone();
                tokio::spawn(async move {
                    if let Err(err) = sidecar.nudge(&team_id, &agent_id, STALL_NUDGE).await {
                        tracing::warn!(%team_id, %agent_id, error = %err, "stall nudge failed");
                    }
                });
            }
            Action::Interrupt { team_id, agent_id } => {
                let sidecar = self.sidecar.clone();
                tokio::spawn(async move {
                    if let Err(err) = sidecar.interrupt(&team_id, &agent_id).await {
                        tracing::warn!(%team_id, %agent_id, error = %err, "stall interrupt failed");
                    }
                });
            }
            Action::MarkDead { team_id, agent_id } => {
                tracing::warn!(%team_id, %agent_id, "agent escalated to dead");
                if let Err(err) = self.transition(&team_id, &agent_id, AgentStatus::Dead) {
                    tracing::warn!(%team_id, %agent_id, error = %err, "dead transition failed");
                }
            }
        }
    }

    /// Persist a status change and make it observable.
    fn transition(
        &self,
        team_id: &str,
        agent_id: &str,
        status: AgentStatus,
    ) -> OrchestratorResult<()> {
        self.store.update_agent_status(team_id, agent_id, status)?;
        self.broadcaster.publish(&Event::AgentStatus {
            team_id: team_id.to_string(),
            agent_id: agent_id.to_string(),
            status,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::Scope;
    use crate::driver::testing::{DriverCall, MockDriver};
    use crate::store::{Agent, Team, TeamStatus, DEFAULT_CHANNELS};

    fn seed_store() -> Database {
        let db = Database::open_in_memory().unwrap();
        let team = Team {
            id: "t1".to_string(),
            tenant_id: "acme".to_string(),
            name: "alpha".to_string(),
            repo_url: "https://example.com/repo.git".to_string(),
            status: TeamStatus::Running,
            channels: DEFAULT_CHANNELS.iter().map(|c| (*c).to_string()).collect(),
            chat_port: 16_660,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let agent = Agent {
            id: "dev-a1".to_string(),
            team_id: "t1".to_string(),
            role: "dev".to_string(),
            model: None,
            runtime: None,
            status: AgentStatus::Spawning,
            last_heartbeat_at: None,
            created_at: Utc::now(),
        };
        db.create_team(&team, &[agent]).unwrap();
        db
    }

    fn setup(stall: Duration) -> (Arc<LivenessTracker>, Arc<MockDriver>, Arc<Broadcaster>) {
        let store = seed_store();
        let broadcaster = Arc::new(Broadcaster::new(256));
        let driver = Arc::new(MockDriver::new());
        let sidecar = Arc::new(SidecarControl::new(driver.clone(), broadcaster.clone()));
        let tracker = Arc::new(LivenessTracker::new(
            store,
            broadcaster.clone(),
            sidecar,
            stall,
        ));
        (tracker, driver, broadcaster)
    }

    fn sidecar_commands(driver: &MockDriver) -> Vec<String> {
        driver
            .recorded()
            .into_iter()
            .filter_map(|call| match call {
                DriverCall::Exec { env, .. } => env.first().map(|(_, line)| line.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn first_heartbeat_transitions_spawning_to_live() {
        let (tracker, _driver, hub) = setup(Duration::from_secs(60));
        let mut sub = hub.subscribe(Scope::Team("t1".into()));
        tracker.track("t1", "dev-a1", AgentStatus::Spawning);

        let accepted = tracker
            .record_heartbeat("t1", "dev-a1", Utc::now())
            .unwrap();
        assert!(accepted);
        assert!(tracker.all_heartbeated("t1"));

        let heartbeat = sub.recv().await.unwrap();
        assert!(matches!(heartbeat, Event::Heartbeat { .. }));
        let status = sub.recv().await.unwrap();
        assert_eq!(
            status,
            Event::AgentStatus {
                team_id: "t1".into(),
                agent_id: "dev-a1".into(),
                status: AgentStatus::Live,
            }
        );

        let stored = tracker.store.get_agent("t1", "dev-a1").unwrap();
        assert_eq!(stored.status, AgentStatus::Live);
        assert!(stored.last_heartbeat_at.is_some());
    }

    #[tokio::test]
    async fn unknown_agent_heartbeat_is_ignored() {
        let (tracker, _driver, _hub) = setup(Duration::from_secs(60));

        let accepted = tracker.record_heartbeat("t1", "ghost", Utc::now()).unwrap();
        assert!(!accepted);
        // Untracked agents are ignored even if persisted
        let accepted = tracker
            .record_heartbeat("t1", "dev-a1", Utc::now())
            .unwrap();
        assert!(!accepted);
        assert!(tracker
            .store
            .get_agent("t1", "dev-a1")
            .unwrap()
            .last_heartbeat_at
            .is_none());
    }

    #[tokio::test]
    async fn out_of_order_heartbeats_are_dropped() {
        let (tracker, _driver, _hub) = setup(Duration::from_secs(60));
        tracker.track("t1", "dev-a1", AgentStatus::Spawning);

        let newer = Utc::now();
        let older = newer - chrono::Duration::seconds(10);
        assert!(tracker.record_heartbeat("t1", "dev-a1", newer).unwrap());
        assert!(!tracker.record_heartbeat("t1", "dev-a1", older).unwrap());

        let stored = tracker.store.get_agent("t1", "dev-a1").unwrap();
        assert_eq!(
            stored.last_heartbeat_at.unwrap().timestamp(),
            newer.timestamp()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn escalation_walks_nudge_interrupt_dead() {
        let stall = Duration::from_secs(2);
        let (tracker, driver, _hub) = setup(stall);
        tracker.track("t1", "dev-a1", AgentStatus::Spawning);
        tracker
            .record_heartbeat("t1", "dev-a1", Utc::now())
            .unwrap();

        let cancel = CancellationToken::new();
        tokio::spawn(tracker.clone().run(cancel.clone()));

        // T+2s: stalled, nudge dispatched
        tokio::time::sleep(Duration::from_millis(2_100)).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            tracker.store.get_agent("t1", "dev-a1").unwrap().status,
            AgentStatus::Stalled
        );
        assert!(sidecar_commands(&driver)
            .iter()
            .any(|line| line.starts_with("nudge ")));

        // T+4s: interrupt dispatched
        tokio::time::sleep(Duration::from_secs(2)).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(sidecar_commands(&driver).contains(&"interrupt".to_string()));

        // T+6s: dead
        tokio::time::sleep(Duration::from_secs(2)).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            tracker.store.get_agent("t1", "dev-a1").unwrap().status,
            AgentStatus::Dead
        );

        // Dead agents get no further escalation and reject heartbeats
        assert!(!tracker.record_heartbeat("t1", "dev-a1", Utc::now()).unwrap());
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_revives_a_stalled_agent() {
        let stall = Duration::from_secs(2);
        let (tracker, driver, _hub) = setup(stall);
        tracker.track("t1", "dev-a1", AgentStatus::Spawning);
        tracker
            .record_heartbeat("t1", "dev-a1", Utc::now())
            .unwrap();

        let cancel = CancellationToken::new();
        tokio::spawn(tracker.clone().run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(2_100)).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            tracker.store.get_agent("t1", "dev-a1").unwrap().status,
            AgentStatus::Stalled
        );

        tracker
            .record_heartbeat("t1", "dev-a1", Utc::now())
            .unwrap();
        assert_eq!(
            tracker.store.get_agent("t1", "dev-a1").unwrap().status,
            AgentStatus::Live
        );

        // The ladder restarts from the top: next step is a nudge again,
        // not an interrupt.
        tokio::time::sleep(Duration::from_millis(2_100)).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        let commands = sidecar_commands(&driver);
        assert_eq!(
            commands
                .iter()
                .filter(|line| line.starts_with("nudge "))
                .count(),
            2
        );
        assert!(!commands.contains(&"interrupt".to_string()));
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn forgetting_stops_escalation() {
        let stall = Duration::from_secs(2);
        let (tracker, driver, _hub) = setup(stall);
        tracker.track("t1", "dev-a1", AgentStatus::Spawning);
        tracker
            .record_heartbeat("t1", "dev-a1", Utc::now())
            .unwrap();
        tracker.forget_team("t1");

        let cancel = CancellationToken::new();
        tokio::spawn(tracker.clone().run(cancel.clone()));
        tokio::time::sleep(Duration::from_secs(7)).await;

        assert!(sidecar_commands(&driver).is_empty());
        cancel.cancel();
    }
}
