//! `docker compose` driver
//!
//! Thin adapter: render-to-disk, then shell out. Unreachable-daemon errors
//! are distinguished from failed operations by inspecting stderr, which is
//! the only signal the CLI gives us.

use super::{ConsoleStreams, ContainerDriver, DriverError, ExecOutput, ServiceStatus, Topology};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Generous inner deadline; the lifecycle layer wraps calls in its own.
const COMPOSE_TIMEOUT: Duration = Duration::from_secs(110);

pub struct ComposeDriver {
    state_dir: PathBuf,
}

impl ComposeDriver {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    fn compose_file(&self, project: &str) -> PathBuf {
        self.state_dir.join(project).join("docker-compose.yml")
    }

    async fn run_compose(
        &self,
        project: &str,
        args: &[&str],
    ) -> Result<ExecOutput, DriverError> {
        let file = self.compose_file(project);
        let mut command = Command::new("docker");
        command
            .arg("compose")
            .arg("-p")
            .arg(project)
            .arg("-f")
            .arg(&file)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(COMPOSE_TIMEOUT, command.output())
            .await
            .map_err(|_| DriverError::Timeout(COMPOSE_TIMEOUT.as_secs()))?
            .map_err(|e| DriverError::Unavailable(format!("failed to spawn docker: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let exit_code = output.status.code().unwrap_or(-1);

        if !output.status.success() {
            return Err(classify_failure(&stderr));
        }

        Ok(ExecOutput {
            exit_code,
            stdout,
            stderr,
        })
    }
}

/// Daemon-connectivity failures are retry-safe; everything else needs an
/// operator.
fn classify_failure(stderr: &str) -> DriverError {
    let lowered = stderr.to_lowercase();
    if lowered.contains("cannot connect to the docker daemon")
        || lowered.contains("connection refused")
        || lowered.contains("is the docker daemon running")
    {
        DriverError::Unavailable(stderr.trim().to_string())
    } else {
        DriverError::Failed(stderr.trim().to_string())
    }
}

#[async_trait]
impl ContainerDriver for ComposeDriver {
    async fn up(&self, topology: &Topology) -> Result<(), DriverError> {
        let dir = self.state_dir.join(&topology.project);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| DriverError::Failed(format!("cannot create project dir: {e}")))?;
        tokio::fs::write(self.compose_file(&topology.project), &topology.compose_yaml)
            .await
            .map_err(|e| DriverError::Failed(format!("cannot write compose file: {e}")))?;

        self.run_compose(&topology.project, &["up", "-d", "--remove-orphans"])
            .await?;
        Ok(())
    }

    async fn down(&self, project: &str) -> Result<(), DriverError> {
        self.run_compose(project, &["down", "--volumes", "--remove-orphans"])
            .await?;
        Ok(())
    }

    async fn remove_service(&self, project: &str, service: &str) -> Result<(), DriverError> {
        self.run_compose(project, &["rm", "-sf", service]).await?;
        Ok(())
    }

    async fn status(&self, project: &str) -> Result<Vec<ServiceStatus>, DriverError> {
        let output = self
            .run_compose(project, &["ps", "--all", "--format", "json"])
            .await?;
        Ok(parse_ps_output(&output.stdout))
    }

    async fn exec(
        &self,
        project: &str,
        service: &str,
        argv: &[String],
        env: &[(String, String)],
    ) -> Result<ExecOutput, DriverError> {
        let mut args: Vec<String> = vec!["exec".to_string(), "-T".to_string()];
        for (key, value) in env {
            args.push("-e".to_string());
            args.push(format!("{key}={value}"));
        }
        args.push(service.to_string());
        args.extend(argv.iter().cloned());

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run_compose(project, &arg_refs).await
    }

    async fn attach(&self, project: &str, service: &str) -> Result<ConsoleStreams, DriverError> {
        let file = self.compose_file(project);
        let mut child = Command::new("docker")
            .arg("compose")
            .arg("-p")
            .arg(project)
            .arg("-f")
            .arg(&file)
            .args(["attach", service])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DriverError::Unavailable(format!("failed to spawn docker: {e}")))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| DriverError::Failed("attach: no stdin pipe".to_string()))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| DriverError::Failed("attach: no stdout pipe".to_string()))?;

        let (output_tx, output_rx) = mpsc::channel::<Vec<u8>>(64);
        let (input_tx, mut input_rx) = mpsc::channel::<Vec<u8>>(64);
        let stop = CancellationToken::new();

        // Output pump: child stdout -> channel
        let pump_stop = stop.clone();
        tokio::spawn(async move {
            let mut buf = [0u8; 4096];
            loop {
                tokio::select! {
                    () = pump_stop.cancelled() => break,
                    read = stdout.read(&mut buf) => {
                        match read {
                            Ok(0) | Err(_) => break,
                            Ok(n) => {
                                if output_tx.send(buf[..n].to_vec()).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                }
            }
        });

        // Input pump: channel -> child stdin; owns the child so that stop
        // kills the attach session.
        let input_stop = stop.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = input_stop.cancelled() => break,
                    chunk = input_rx.recv() => {
                        let Some(chunk) = chunk else { break };
                        if stdin.write_all(&chunk).await.is_err() {
                            break;
                        }
                    }
                }
            }
            let _ = child.kill().await;
        });

        Ok(ConsoleStreams {
            output: output_rx,
            input: input_tx,
            stop,
        })
    }
}

/// `docker compose ps --format json` emits one JSON object per line.
fn parse_ps_output(stdout: &str) -> Vec<ServiceStatus> {
    stdout
        .lines()
        .filter_map(|line| {
            let value: serde_json::Value = serde_json::from_str(line.trim()).ok()?;
            let service = value.get("Service")?.as_str()?.to_string();
            let state = value.get("State").and_then(|s| s.as_str()).unwrap_or("");
            Some(ServiceStatus {
                service,
                running: state.eq_ignore_ascii_case("running"),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ps_lines() {
        let stdout = concat!(
            r#"{"Service":"ircd","State":"running","Name":"wr-t1-ircd-1"}"#,
            "\n",
            r#"{"Service":"dev-a1","State":"exited","Name":"wr-t1-dev-a1-1"}"#,
            "\n",
        );
        let statuses = parse_ps_output(stdout);
        assert_eq!(
            statuses,
            vec![
                ServiceStatus {
                    service: "ircd".to_string(),
                    running: true
                },
                ServiceStatus {
                    service: "dev-a1".to_string(),
                    running: false
                },
            ]
        );
    }

    #[test]
    fn ps_parse_skips_garbage() {
        assert!(parse_ps_output("").is_empty());
        assert!(parse_ps_output("not json\n{}\n").is_empty());
    }

    #[test]
    fn failure_classification() {
        assert!(matches!(
            classify_failure("Cannot connect to the Docker daemon at unix:///var/run/docker.sock"),
            DriverError::Unavailable(_)
        ));
        assert!(matches!(
            classify_failure("pull access denied for ghcr.io/acme/agent"),
            DriverError::Failed(_)
        ));
    }
}
