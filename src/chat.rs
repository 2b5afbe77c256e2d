//! Chat gateway seam
//!
//! The orchestrator speaks to each team's embedded chat server through the
//! `ChatClient` interface; the production implementation is a minimal IRC
//! line client. Inbound traffic is pushed into a sink channel owned by the
//! router; the core never polls the chat server.

pub mod irc;

#[cfg(test)]
pub mod testing;

use crate::error::OrchestratorError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Outbound queue depth while the gateway connection is down
pub const OFFLINE_SEND_QUEUE: usize = 64;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    #[error("chat gateway connection failed: {0}")]
    Connection(String),
    #[error("outbound backlog full")]
    Backlogged,
    #[error("chat client is shut down")]
    Closed,
}

impl From<ChatError> for OrchestratorError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::Backlogged => {
                OrchestratorError::Conflict("chat send backlog is full".to_string())
            }
            ChatError::Connection(msg) => OrchestratorError::Transient(msg),
            ChatError::Closed => OrchestratorError::Conflict("chat client closed".to_string()),
        }
    }
}

/// A raw message as received from the chat gateway, before routing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub team_id: String,
    pub channel: String,
    pub nick: String,
    pub text: String,
    pub time: DateTime<Utc>,
}

/// Everything needed to bring up one team's gateway connection
#[derive(Debug, Clone)]
pub struct ChatSessionSpec {
    pub team_id: String,
    pub host: String,
    pub port: u16,
    pub nick: String,
    pub channels: Vec<String>,
}

/// Per-team connection to the embedded chat server
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Join an additional channel on the live connection.
    async fn join(&self, channel: &str) -> Result<(), ChatError>;

    /// Send a line to a channel. Queues while disconnected; a full queue
    /// is an error, not a silent drop.
    async fn say(&self, channel: &str, text: &str) -> Result<(), ChatError>;

    /// Tear the connection down and stop the reconnect loop.
    async fn shutdown(&self);
}

/// Factory seam so the lifecycle manager can be tested without a chat
/// server.
#[async_trait]
pub trait ChatConnector: Send + Sync {
    async fn connect(
        &self,
        spec: ChatSessionSpec,
        sink: mpsc::Sender<InboundMessage>,
    ) -> Result<Arc<dyn ChatClient>, ChatError>;
}

#[async_trait]
impl<T: ChatClient + ?Sized> ChatClient for Arc<T> {
    async fn join(&self, channel: &str) -> Result<(), ChatError> {
        (**self).join(channel).await
    }

    async fn say(&self, channel: &str, text: &str) -> Result<(), ChatError> {
        (**self).say(channel, text).await
    }

    async fn shutdown(&self) {
        (**self).shutdown().await;
    }
}
