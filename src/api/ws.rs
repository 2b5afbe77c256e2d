//! Push-channel subscription mux
//!
//! One long-lived duplex connection per client: auth handshake, a team
//! subscription fed by the broadcaster, and console control frames relayed
//! to the sidecar layer. Console bytes travel base64-encoded inside JSON
//! frames in both directions.
//!
//! Backpressure: outbound frames go through a bounded queue; when it
//! overflows the connection is closed with a terminal frame instead of
//! silently dropping frames. Protocol-level pings run every 30s and two
//! missed pongs close the connection.

use super::AppState;
use crate::auth::Principal;
use crate::broadcast::{Scope, Subscription};
use crate::sidecar::ConsoleHandle;
use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    response::Response,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use futures::{SinkExt, Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Outbound frame queue per connection
const SEND_QUEUE: usize = 256;

const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Pings allowed to go unanswered before the connection is dropped
const MAX_MISSED_PONGS: u32 = 2;

/// Frames a client may send
#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientFrame {
    Auth {
        token: String,
    },
    Subscribe {
        #[serde(rename = "teamId")]
        team_id: String,
    },
    #[serde(rename = "console.attach")]
    ConsoleAttach {
        #[serde(rename = "agentId")]
        agent_id: String,
    },
    #[serde(rename = "console.detach")]
    ConsoleDetach {
        #[serde(rename = "agentId")]
        agent_id: String,
    },
    #[serde(rename = "console.input")]
    ConsoleInput {
        #[serde(rename = "agentId")]
        agent_id: String,
        /// base64 keystrokes
        data: String,
    },
}

pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| session(state, socket))
}

/// Why the session loop ended
enum Exit {
    /// Peer went away or protocol violation; just clean up
    Closed,
    /// Outbound queue or broadcaster queue overflowed; owes the client a
    /// terminal frame
    Overflowed,
    /// Auth failed; owes the client an error frame
    AuthFailed(String),
}

struct Session {
    state: AppState,
    principal: Option<Principal>,
    team_id: Option<String>,
    subscription: Option<Subscription>,
    attachments: HashMap<String, ConsoleHandle>,
    out_tx: mpsc::Sender<Message>,
}

async fn session(state: AppState, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(SEND_QUEUE);
    let (terminal_tx, mut terminal_rx) = oneshot::channel::<Message>();

    // Writer half: drains the bounded queue; a terminal frame preempts it
    // and closes the socket.
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                terminal = &mut terminal_rx => {
                    if let Ok(frame) = terminal {
                        let _ = sink.send(frame).await;
                    }
                    let _ = sink.close().await;
                    return;
                }
                frame = out_rx.recv() => {
                    let Some(frame) = frame else {
                        let _ = sink.close().await;
                        return;
                    };
                    if sink.send(frame).await.is_err() {
                        return;
                    }
                }
            }
        }
    });

    let mut session = Session {
        state,
        principal: None,
        team_id: None,
        subscription: None,
        attachments: HashMap::new(),
        out_tx,
    };

    let exit = session.run(&mut stream).await;

    match exit {
        Exit::Closed => {}
        Exit::Overflowed => {
            let frame = Message::Text(json!({ "type": "overflow_closed" }).to_string());
            let _ = terminal_tx.send(frame);
        }
        Exit::AuthFailed(reason) => {
            let frame = Message::Text(json!({ "type": "error", "error": reason }).to_string());
            let _ = terminal_tx.send(frame);
        }
    }

    session.cleanup();
    drop(session);
    let _ = writer.await;
}

impl Session {
    async fn run(
        &mut self,
        stream: &mut (impl Stream<Item = Result<Message, axum::Error>> + Unpin),
    ) -> Exit {
        let mut ping = tokio::time::interval(PING_INTERVAL);
        ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ping.reset();
        let mut missed_pongs: u32 = 0;

        loop {
            tokio::select! {
                frame = stream.next() => {
                    let Some(Ok(frame)) = frame else { return Exit::Closed };
                    match frame {
                        Message::Text(text) => {
                            match self.handle_frame(&text).await {
                                Ok(()) => {}
                                Err(exit) => return exit,
                            }
                        }
                        Message::Pong(_) => missed_pongs = 0,
                        Message::Close(_) => return Exit::Closed,
                        Message::Ping(_) | Message::Binary(_) => {}
                    }
                }
                event = recv_event(&mut self.subscription) => {
                    match event {
                        Some(event) => {
                            let text = match serde_json::to_string(&event) {
                                Ok(text) => text,
                                Err(_) => continue,
                            };
                            if self.enqueue(Message::Text(text)).is_err() {
                                return Exit::Overflowed;
                            }
                        }
                        None => {
                            // Broadcaster cut us off for falling behind.
                            return Exit::Overflowed;
                        }
                    }
                }
                _ = ping.tick() => {
                    missed_pongs += 1;
                    if missed_pongs > MAX_MISSED_PONGS {
                        return Exit::Closed;
                    }
                    if self.enqueue(Message::Ping(Vec::new())).is_err() {
                        return Exit::Overflowed;
                    }
                }
            }
        }
    }

    async fn handle_frame(&mut self, text: &str) -> Result<(), Exit> {
        let frame: ClientFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(_) => {
                self.send_error("malformed frame")?;
                return Ok(());
            }
        };

        match frame {
            ClientFrame::Auth { token } => self.handle_auth(&token),
            ClientFrame::Subscribe { team_id } => self.handle_subscribe(&team_id),
            ClientFrame::ConsoleAttach { agent_id } => self.handle_attach(&agent_id).await,
            ClientFrame::ConsoleDetach { agent_id } => {
                self.handle_detach(&agent_id);
                Ok(())
            }
            ClientFrame::ConsoleInput { agent_id, data } => {
                self.handle_input(&agent_id, &data).await;
                Ok(())
            }
        }
    }

    /// Either a tenant bearer key or a one-shot exchange token.
    fn handle_auth(&mut self, token: &str) -> Result<(), Exit> {
        let principal = self
            .state
            .tokens
            .consume(token)
            .or_else(|| self.state.tenants.resolve(token));
        match principal {
            Some(principal) => {
                self.principal = Some(principal);
                self.send_json(json!({ "type": "authenticated" }))
            }
            None => Err(Exit::AuthFailed("invalid token".to_string())),
        }
    }

    fn handle_subscribe(&mut self, team_id: &str) -> Result<(), Exit> {
        let Some(principal) = self.principal.clone() else {
            return Err(Exit::AuthFailed("subscribe before auth".to_string()));
        };
        if self.state.directory.owned_team(&principal, team_id).is_err() {
            return Err(Exit::AuthFailed(format!("no such team: {team_id}")));
        }

        if let Some(old) = self.subscription.take() {
            self.state.broadcaster.unsubscribe(old.id);
        }
        self.subscription = Some(
            self.state
                .broadcaster
                .subscribe(Scope::Team(team_id.to_string())),
        );
        self.team_id = Some(team_id.to_string());
        self.send_json(json!({ "type": "subscribed", "teamId": team_id }))
    }

    async fn handle_attach(&mut self, agent_id: &str) -> Result<(), Exit> {
        let Some(team_id) = self.team_id.clone() else {
            self.send_error("attach before subscribe")?;
            return Ok(());
        };
        if self.attachments.contains_key(agent_id) {
            self.send_error("already attached")?;
            return Ok(());
        }
        let known = self
            .state
            .directory
            .roster(&team_id)
            .map(|roster| roster.iter().any(|a| a.id == agent_id))
            .unwrap_or(false);
        if !known {
            self.send_error("unknown agent")?;
            return Ok(());
        }

        // Input frames that raced this open are sitting behind us in the
        // websocket stream; they are handled (or dropped) once the outcome
        // of this open is known.
        match self.state.sidecar.attach(&team_id, agent_id).await {
            Ok(handle) => {
                self.attachments.insert(agent_id.to_string(), handle);
                Ok(())
            }
            Err(err) => {
                tracing::warn!(team_id = %team_id, agent_id = %agent_id, error = %err, "console attach failed");
                self.send_error("console attach failed")
            }
        }
    }

    fn handle_detach(&mut self, agent_id: &str) {
        if self.attachments.remove(agent_id).is_some() {
            if let Some(team_id) = &self.team_id {
                self.state.sidecar.detach(team_id, agent_id);
            }
        }
    }

    /// Keystrokes for an agent without a live attachment are dropped, per
    /// the open-failure contract.
    async fn handle_input(&mut self, agent_id: &str, data: &str) {
        let Some(handle) = self.attachments.get(agent_id) else {
            return;
        };
        let Ok(bytes) = BASE64.decode(data) else {
            return;
        };
        let _ = handle.input.send(bytes).await;
    }

    fn send_json(&self, value: serde_json::Value) -> Result<(), Exit> {
        self.enqueue(Message::Text(value.to_string()))
            .map_err(|()| Exit::Overflowed)
    }

    fn send_error(&self, message: &str) -> Result<(), Exit> {
        self.send_json(json!({ "type": "error", "error": message }))
    }

    fn enqueue(&self, frame: Message) -> Result<(), ()> {
        self.out_tx.try_send(frame).map_err(|_| ())
    }

    fn cleanup(&mut self) {
        if let Some(team_id) = &self.team_id {
            for agent_id in self.attachments.keys() {
                self.state.sidecar.detach(team_id, agent_id);
            }
        }
        self.attachments.clear();
        if let Some(subscription) = self.subscription.take() {
            self.state.broadcaster.unsubscribe(subscription.id);
        }
    }
}

/// Pending forever while unsubscribed so the select arm never fires.
async fn recv_event(subscription: &mut Option<Subscription>) -> Option<crate::events::Event> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_frames_parse() {
        assert_eq!(
            serde_json::from_str::<ClientFrame>(r#"{"type":"auth","token":"k"}"#).unwrap(),
            ClientFrame::Auth {
                token: "k".to_string()
            }
        );
        assert_eq!(
            serde_json::from_str::<ClientFrame>(r#"{"type":"subscribe","teamId":"t-1"}"#).unwrap(),
            ClientFrame::Subscribe {
                team_id: "t-1".to_string()
            }
        );
        assert_eq!(
            serde_json::from_str::<ClientFrame>(r#"{"type":"console.attach","agentId":"dev-a1"}"#)
                .unwrap(),
            ClientFrame::ConsoleAttach {
                agent_id: "dev-a1".to_string()
            }
        );
        assert_eq!(
            serde_json::from_str::<ClientFrame>(
                r#"{"type":"console.input","agentId":"dev-a1","data":"bHMK"}"#
            )
            .unwrap(),
            ClientFrame::ConsoleInput {
                agent_id: "dev-a1".to_string(),
                data: "bHMK".to_string()
            }
        );
    }

    #[test]
    fn unknown_frame_types_are_rejected() {
        assert!(serde_json::from_str::<ClientFrame>(r#"{"type":"evil"}"#).is_err());
        assert!(serde_json::from_str::<ClientFrame>("not json").is_err());
        assert!(serde_json::from_str::<ClientFrame>(r#"{"type":"subscribe"}"#).is_err());
    }
}
