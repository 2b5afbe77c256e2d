//! Sidecar control channel
//!
//! Each agent container runs a sidecar that tails a named pipe and
//! interprets single-line commands. We reach the pipe through the driver's
//! exec primitive, carrying the payload in an environment variable so no
//! part of it is ever interpolated into shell text. Console attachments
//! share one interactive session per agent, reference-counted.

use crate::broadcast::Broadcaster;
use crate::driver::{ContainerDriver, DriverError};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::events::Event;
use crate::lifecycle::topology::project_name;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Where the sidecar listens inside the container
pub const FIFO_PATH: &str = "/run/agent/control";

/// Wall deadline for every non-attach operation
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(15);

/// Environment variable carrying the command line into the container
const CMD_ENV: &str = "WARROOM_CMD";

/// Client half of a shared console attachment.
///
/// Output bytes are not carried here; they are published as
/// `console.data` events so every team subscriber sees the same stream.
pub struct ConsoleHandle {
    pub input: mpsc::Sender<Vec<u8>>,
}

struct PtyShare {
    input_tx: mpsc::Sender<Vec<u8>>,
    refcount: usize,
    stop: CancellationToken,
}

/// Command injection and console attachment for agent containers
pub struct SidecarControl {
    driver: Arc<dyn ContainerDriver>,
    broadcaster: Arc<Broadcaster>,
    attachments: Mutex<HashMap<(String, String), PtyShare>>,
}

impl SidecarControl {
    pub fn new(driver: Arc<dyn ContainerDriver>, broadcaster: Arc<Broadcaster>) -> Self {
        Self {
            driver,
            broadcaster,
            attachments: Mutex::new(HashMap::new()),
        }
    }

    pub async fn nudge(&self, team_id: &str, agent_id: &str, text: &str) -> OrchestratorResult<()> {
        self.send_command(team_id, agent_id, &format!("nudge {}", single_line(text)))
            .await
    }

    pub async fn interrupt(&self, team_id: &str, agent_id: &str) -> OrchestratorResult<()> {
        self.send_command(team_id, agent_id, "interrupt").await
    }

    pub async fn directive(
        &self,
        team_id: &str,
        agent_id: &str,
        text: &str,
    ) -> OrchestratorResult<()> {
        self.send_command(team_id, agent_id, &format!("directive {}", single_line(text)))
            .await
    }

    /// `argv` is an ordered argument sequence; tokenization is the
    /// sidecar's concern.
    pub async fn exec(
        &self,
        team_id: &str,
        agent_id: &str,
        argv: &[String],
    ) -> OrchestratorResult<()> {
        if argv.is_empty() {
            return Err(OrchestratorError::Validation(
                "exec requires at least one argument".to_string(),
            ));
        }
        let joined = argv
            .iter()
            .map(|a| single_line(a))
            .collect::<Vec<_>>()
            .join(" ");
        self.send_command(team_id, agent_id, &format!("exec {joined}"))
            .await
    }

    /// Write one newline-terminated line into the sidecar FIFO.
    async fn send_command(
        &self,
        team_id: &str,
        agent_id: &str,
        line: &str,
    ) -> OrchestratorResult<()> {
        let project = project_name(team_id);
        let argv = vec![
            "/bin/sh".to_string(),
            "-c".to_string(),
            format!("printf '%s\\n' \"${CMD_ENV}\" > {FIFO_PATH}"),
        ];
        let env = vec![(CMD_ENV.to_string(), line.to_string())];

        let result = tokio::time::timeout(
            COMMAND_TIMEOUT,
            self.driver.exec(&project, agent_id, &argv, &env),
        )
        .await
        .map_err(|_| DriverError::Timeout(COMMAND_TIMEOUT.as_secs()))?;

        let output = result?;
        if output.exit_code != 0 {
            return Err(OrchestratorError::DriverFailure(format!(
                "sidecar write exited with {}: {}",
                output.exit_code, output.stderr
            )));
        }
        Ok(())
    }

    // ==================== Console Attachments ====================

    /// Attach to an agent's console. The first attachment opens the
    /// driver's interactive exec; later ones share it. Output is fanned
    /// out as `console.data` events.
    pub async fn attach(&self, team_id: &str, agent_id: &str) -> OrchestratorResult<ConsoleHandle> {
        let key = (team_id.to_string(), agent_id.to_string());

        if let Some(input) = self.share_existing(&key) {
            self.broadcaster.publish(&Event::ConsoleAttached {
                team_id: team_id.to_string(),
                agent_id: agent_id.to_string(),
            });
            return Ok(ConsoleHandle { input });
        }

        let project = project_name(team_id);
        let streams = self.driver.attach(&project, agent_id).await?;

        // A concurrent first attach may have won while we were opening;
        // keep its session and drop ours.
        if let Some(input) = self.share_existing(&key) {
            streams.stop.cancel();
            self.broadcaster.publish(&Event::ConsoleAttached {
                team_id: team_id.to_string(),
                agent_id: agent_id.to_string(),
            });
            return Ok(ConsoleHandle { input });
        }

        let input_tx = streams.input.clone();
        self.attachments.lock().unwrap().insert(
            key,
            PtyShare {
                input_tx: input_tx.clone(),
                refcount: 1,
                stop: streams.stop.clone(),
            },
        );

        // Attached goes out before any console.data from the pump.
        self.broadcaster.publish(&Event::ConsoleAttached {
            team_id: team_id.to_string(),
            agent_id: agent_id.to_string(),
        });
        self.spawn_output_pump(team_id.to_string(), agent_id.to_string(), streams.output);

        Ok(ConsoleHandle { input: input_tx })
    }

    fn share_existing(&self, key: &(String, String)) -> Option<mpsc::Sender<Vec<u8>>> {
        let mut attachments = self.attachments.lock().unwrap();
        attachments.get_mut(key).map(|share| {
            share.refcount += 1;
            share.input_tx.clone()
        })
    }

    /// Drop one attachment; the last one closes the upstream exec.
    pub fn detach(&self, team_id: &str, agent_id: &str) {
        let key = (team_id.to_string(), agent_id.to_string());
        let mut attachments = self.attachments.lock().unwrap();
        let Some(share) = attachments.get_mut(&key) else {
            return;
        };
        share.refcount -= 1;
        if share.refcount == 0 {
            share.stop.cancel();
            attachments.remove(&key);
            drop(attachments);
            self.broadcaster.publish(&Event::ConsoleDetached {
                team_id: team_id.to_string(),
                agent_id: agent_id.to_string(),
            });
        }
    }

    /// Tear down every attachment for an agent (agent removal).
    pub fn close_agent(&self, team_id: &str, agent_id: &str) {
        let key = (team_id.to_string(), agent_id.to_string());
        if let Some(share) = self.attachments.lock().unwrap().remove(&key) {
            share.stop.cancel();
            self.broadcaster.publish(&Event::ConsoleDetached {
                team_id: team_id.to_string(),
                agent_id: agent_id.to_string(),
            });
        }
    }

    /// Tear down every attachment a team owns (stop/delete).
    pub fn close_team(&self, team_id: &str) {
        let drained: Vec<((String, String), PtyShare)> = {
            let mut attachments = self.attachments.lock().unwrap();
            let keys: Vec<_> = attachments
                .keys()
                .filter(|(team, _)| team == team_id)
                .cloned()
                .collect();
            keys.into_iter()
                .filter_map(|key| attachments.remove_entry(&key))
                .collect()
        };
        for ((team, agent), share) in drained {
            share.stop.cancel();
            self.broadcaster.publish(&Event::ConsoleDetached {
                team_id: team,
                agent_id: agent,
            });
        }
    }

    #[allow(dead_code)] // Used in tests
    pub fn attachment_count(&self, team_id: &str, agent_id: &str) -> usize {
        self.attachments
            .lock()
            .unwrap()
            .get(&(team_id.to_string(), agent_id.to_string()))
            .map_or(0, |share| share.refcount)
    }

    fn spawn_output_pump(
        &self,
        team_id: String,
        agent_id: String,
        mut output: mpsc::Receiver<Vec<u8>>,
    ) {
        let broadcaster = self.broadcaster.clone();
        tokio::spawn(async move {
            while let Some(chunk) = output.recv().await {
                broadcaster.publish(&Event::ConsoleData {
                    team_id: team_id.clone(),
                    agent_id: agent_id.clone(),
                    data: BASE64.encode(&chunk),
                });
            }
        });
    }
}

/// The FIFO protocol is one command per line; payload newlines would be
/// parsed as extra commands.
fn single_line(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}
