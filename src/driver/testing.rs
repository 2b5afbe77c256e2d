//! Mock container driver
//!
//! Backs unit tests and `WARROOM_DRIVER=mock` demo mode: every operation
//! succeeds instantly unless a failure is scripted, and every call is
//! recorded for assertions.

use super::{ConsoleStreams, ContainerDriver, DriverError, ExecOutput, ServiceStatus, Topology};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Record of one driver invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
    Up {
        project: String,
    },
    Down {
        project: String,
    },
    RemoveService {
        project: String,
        service: String,
    },
    Status {
        project: String,
    },
    Exec {
        project: String,
        service: String,
        argv: Vec<String>,
        env: Vec<(String, String)>,
    },
    Attach {
        project: String,
        service: String,
    },
}

#[derive(Default)]
pub struct MockDriver {
    pub calls: Mutex<Vec<DriverCall>>,
    /// Error returned by the next `up` call, if any
    pub fail_up: Mutex<Option<DriverError>>,
    /// Error returned by every `exec` call, if any
    pub fail_exec: Mutex<Option<DriverError>>,
    /// Scripted `status` responses per project; missing project = empty
    pub statuses: Mutex<HashMap<String, Vec<ServiceStatus>>>,
    /// Bytes pre-loaded into the output side of every new attach
    pub attach_output: Mutex<Vec<Vec<u8>>>,
    /// Everything written into any attach's input side
    pub attach_input: Arc<Mutex<Vec<u8>>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(dead_code)] // Used in tests
    pub fn recorded(&self) -> Vec<DriverCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Script the status response for a project.
    #[allow(dead_code)] // Used in tests
    pub fn set_status(&self, project: &str, statuses: Vec<ServiceStatus>) {
        self.statuses
            .lock()
            .unwrap()
            .insert(project.to_string(), statuses);
    }

    /// Convenience: mark every given service as running.
    #[allow(dead_code)] // Used in tests
    pub fn set_all_running(&self, project: &str, services: &[&str]) {
        self.set_status(
            project,
            services
                .iter()
                .map(|s| ServiceStatus {
                    service: (*s).to_string(),
                    running: true,
                })
                .collect(),
        );
    }
}

#[async_trait]
impl ContainerDriver for MockDriver {
    async fn up(&self, topology: &Topology) -> Result<(), DriverError> {
        self.calls.lock().unwrap().push(DriverCall::Up {
            project: topology.project.clone(),
        });
        if let Some(err) = self.fail_up.lock().unwrap().take() {
            return Err(err);
        }
        Ok(())
    }

    async fn down(&self, project: &str) -> Result<(), DriverError> {
        self.calls.lock().unwrap().push(DriverCall::Down {
            project: project.to_string(),
        });
        self.statuses.lock().unwrap().remove(project);
        Ok(())
    }

    async fn remove_service(&self, project: &str, service: &str) -> Result<(), DriverError> {
        self.calls.lock().unwrap().push(DriverCall::RemoveService {
            project: project.to_string(),
            service: service.to_string(),
        });
        Ok(())
    }

    async fn status(&self, project: &str) -> Result<Vec<ServiceStatus>, DriverError> {
        self.calls.lock().unwrap().push(DriverCall::Status {
            project: project.to_string(),
        });
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .get(project)
            .cloned()
            .unwrap_or_default())
    }

    async fn exec(
        &self,
        project: &str,
        service: &str,
        argv: &[String],
        env: &[(String, String)],
    ) -> Result<ExecOutput, DriverError> {
        self.calls.lock().unwrap().push(DriverCall::Exec {
            project: project.to_string(),
            service: service.to_string(),
            argv: argv.to_vec(),
            env: env.to_vec(),
        });
        if let Some(err) = self.fail_exec.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(ExecOutput {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
        })
    }

    async fn attach(&self, project: &str, service: &str) -> Result<ConsoleStreams, DriverError> {
        self.calls.lock().unwrap().push(DriverCall::Attach {
            project: project.to_string(),
            service: service.to_string(),
        });

        let (output_tx, output_rx) = mpsc::channel::<Vec<u8>>(64);
        let (input_tx, mut input_rx) = mpsc::channel::<Vec<u8>>(64);
        let stop = CancellationToken::new();

        for chunk in self.attach_output.lock().unwrap().drain(..) {
            let _ = output_tx.try_send(chunk);
        }

        // Keep the output side open until stop so attachments stay live,
        // and capture everything the caller writes.
        let sink = self.attach_input.clone();
        let drain_stop = stop.clone();
        tokio::spawn(async move {
            let _keep_open = output_tx;
            loop {
                tokio::select! {
                    () = drain_stop.cancelled() => break,
                    chunk = input_rx.recv() => {
                        let Some(chunk) = chunk else { break };
                        sink.lock().unwrap().extend_from_slice(&chunk);
                    }
                }
            }
        });

        Ok(ConsoleStreams {
            output: output_rx,
            input: input_tx,
            stop,
        })
    }
}
