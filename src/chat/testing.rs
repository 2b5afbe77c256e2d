//! Mock chat implementations for tests

use super::{ChatClient, ChatConnector, ChatError, ChatSessionSpec, InboundMessage};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Records outbound traffic; inbound traffic is injected through the sink
/// captured at connect time.
#[derive(Default)]
pub struct MockChatClient {
    pub said: Mutex<Vec<(String, String)>>,
    pub joined: Mutex<Vec<String>>,
    pub shut_down: Mutex<bool>,
}

#[async_trait]
impl ChatClient for MockChatClient {
    async fn join(&self, channel: &str) -> Result<(), ChatError> {
        self.joined.lock().unwrap().push(channel.to_string());
        Ok(())
    }

    async fn say(&self, channel: &str, text: &str) -> Result<(), ChatError> {
        self.said
            .lock()
            .unwrap()
            .push((channel.to_string(), text.to_string()));
        Ok(())
    }

    async fn shutdown(&self) {
        *self.shut_down.lock().unwrap() = true;
    }
}

/// Connection made through a [`MockChatConnector`]
pub struct MockConnection {
    pub spec: ChatSessionSpec,
    pub client: Arc<MockChatClient>,
    pub sink: mpsc::Sender<InboundMessage>,
}

/// Hands out [`MockChatClient`]s and keeps every connection for inspection.
#[derive(Default)]
pub struct MockChatConnector {
    pub connections: Mutex<Vec<MockConnection>>,
    pub fail_connect: Mutex<bool>,
}

impl MockChatConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a message into the sink of the most recent connection for a
    /// team, as if the gateway had delivered it.
    pub async fn inject(&self, team_id: &str, inbound: InboundMessage) {
        let sink = {
            let connections = self.connections.lock().unwrap();
            connections
                .iter()
                .rev()
                .find(|c| c.spec.team_id == team_id)
                .map(|c| c.sink.clone())
        };
        if let Some(sink) = sink {
            let _ = sink.send(inbound).await;
        }
    }
}

#[async_trait]
impl ChatConnector for MockChatConnector {
    async fn connect(
        &self,
        spec: ChatSessionSpec,
        sink: mpsc::Sender<InboundMessage>,
    ) -> Result<Arc<dyn ChatClient>, ChatError> {
        if *self.fail_connect.lock().unwrap() {
            return Err(ChatError::Connection("mock connect failure".to_string()));
        }
        let client = Arc::new(MockChatClient::default());
        self.connections.lock().unwrap().push(MockConnection {
            spec,
            client: client.clone(),
            sink,
        });
        Ok(client)
    }
}
