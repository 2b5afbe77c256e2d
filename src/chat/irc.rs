//! Minimal IRC line client
//!
//! Speaks just enough of the protocol for an embedded team daemon: NICK,
//! USER, JOIN, PRIVMSG, PING/PONG. One connection per team, reconnecting
//! with exponential backoff (1s start, 30s cap). Outbound sends are queued
//! through a bounded channel that survives reconnects.

use super::{
    ChatClient, ChatConnector, ChatError, ChatSessionSpec, InboundMessage, OFFLINE_SEND_QUEUE,
};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const BACKOFF_START: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(30);

/// One parsed server line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrcLine {
    Ping(String),
    Privmsg {
        nick: String,
        target: String,
        text: String,
    },
    Other,
}

/// Parse a raw IRC server line.
///
/// `:dev-1!agent@10.0.0.4 PRIVMSG #tasks :[DONE] shipped` becomes a
/// `Privmsg`; anything unrecognized is `Other`.
pub fn parse_line(line: &str) -> IrcLine {
    let line = line.trim_end_matches(['\r', '\n']);

    if let Some(token) = line.strip_prefix("PING ") {
        return IrcLine::Ping(token.trim_start_matches(':').to_string());
    }

    let Some(rest) = line.strip_prefix(':') else {
        return IrcLine::Other;
    };
    let Some((prefix, command_rest)) = rest.split_once(' ') else {
        return IrcLine::Other;
    };
    let Some(params) = command_rest.strip_prefix("PRIVMSG ") else {
        return IrcLine::Other;
    };
    let Some((target, text)) = params.split_once(" :") else {
        return IrcLine::Other;
    };

    let nick = prefix.split('!').next().unwrap_or(prefix);
    IrcLine::Privmsg {
        nick: nick.to_string(),
        target: target.trim().to_string(),
        text: text.to_string(),
    }
}

/// Production `ChatClient` over TCP
pub struct IrcChatClient {
    outbound_tx: mpsc::Sender<String>,
    cancel: CancellationToken,
}

#[async_trait]
impl ChatClient for IrcChatClient {
    async fn join(&self, channel: &str) -> Result<(), ChatError> {
        self.send_line(format!("JOIN {channel}"))
    }

    async fn say(&self, channel: &str, text: &str) -> Result<(), ChatError> {
        self.send_line(format!("PRIVMSG {channel} :{text}"))
    }

    async fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl IrcChatClient {
    fn send_line(&self, line: String) -> Result<(), ChatError> {
        if self.cancel.is_cancelled() {
            return Err(ChatError::Closed);
        }
        match self.outbound_tx.try_send(line) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(ChatError::Backlogged),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(ChatError::Closed),
        }
    }
}

/// Production connector: spawns the per-team connection task
pub struct IrcConnector;

#[async_trait]
impl ChatConnector for IrcConnector {
    async fn connect(
        &self,
        spec: ChatSessionSpec,
        sink: mpsc::Sender<InboundMessage>,
    ) -> Result<Arc<dyn ChatClient>, ChatError> {
        let (outbound_tx, outbound_rx) = mpsc::channel(OFFLINE_SEND_QUEUE);
        let cancel = CancellationToken::new();

        tokio::spawn(connection_loop(
            spec,
            sink,
            outbound_rx,
            cancel.clone(),
        ));

        Ok(Arc::new(IrcChatClient {
            outbound_tx,
            cancel,
        }))
    }
}

/// Owns the socket for one team; reconnects until cancelled.
async fn connection_loop(
    spec: ChatSessionSpec,
    sink: mpsc::Sender<InboundMessage>,
    mut outbound_rx: mpsc::Receiver<String>,
    cancel: CancellationToken,
) {
    let mut backoff = BACKOFF_START;

    loop {
        if cancel.is_cancelled() {
            return;
        }

        let stream = tokio::select! {
            () = cancel.cancelled() => return,
            conn = TcpStream::connect((spec.host.as_str(), spec.port)) => conn,
        };

        match stream {
            Ok(stream) => {
                tracing::info!(team_id = %spec.team_id, port = spec.port, "chat gateway connected");
                backoff = BACKOFF_START;
                session(&spec, stream, &sink, &mut outbound_rx, &cancel).await;
                if cancel.is_cancelled() {
                    return;
                }
                tracing::warn!(team_id = %spec.team_id, "chat gateway disconnected, reconnecting");
            }
            Err(err) => {
                tracing::warn!(
                    team_id = %spec.team_id,
                    error = %err,
                    backoff_secs = backoff.as_secs(),
                    "chat gateway unreachable"
                );
            }
        }

        tokio::select! {
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(backoff) => {}
        }
        backoff = (backoff * 2).min(BACKOFF_CAP);
    }
}

/// One connected session. Returns when the socket drops or on cancel.
async fn session(
    spec: &ChatSessionSpec,
    stream: TcpStream,
    sink: &mpsc::Sender<InboundMessage>,
    outbound_rx: &mut mpsc::Receiver<String>,
    cancel: &CancellationToken,
) {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    let registration = format!(
        "NICK {nick}\r\nUSER {nick} 0 * :{nick}\r\n",
        nick = spec.nick
    );
    if write_half.write_all(registration.as_bytes()).await.is_err() {
        return;
    }
    for channel in &spec.channels {
        if write_half
            .write_all(format!("JOIN {channel}\r\n").as_bytes())
            .await
            .is_err()
        {
            return;
        }
    }

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                let _ = write_half.write_all(b"QUIT :shutting down\r\n").await;
                return;
            }
            line = lines.next_line() => {
                let Ok(Some(line)) = line else { return };
                match parse_line(&line) {
                    IrcLine::Ping(token) => {
                        if write_half.write_all(format!("PONG :{token}\r\n").as_bytes()).await.is_err() {
                            return;
                        }
                    }
                    IrcLine::Privmsg { nick, target, text } => {
                        let inbound = InboundMessage {
                            team_id: spec.team_id.clone(),
                            channel: target,
                            nick,
                            text,
                            time: Utc::now(),
                        };
                        if sink.send(inbound).await.is_err() {
                            // Router side is gone; nothing left to do.
                            return;
                        }
                    }
                    IrcLine::Other => {}
                }
            }
            outbound = outbound_rx.recv() => {
                let Some(line) = outbound else { return };
                if write_half.write_all(format!("{line}\r\n").as_bytes()).await.is_err() {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_privmsg() {
        let line = ":dev-1!agent@10.0.0.4 PRIVMSG #tasks :[DONE] shipped";
        assert_eq!(
            parse_line(line),
            IrcLine::Privmsg {
                nick: "dev-1".to_string(),
                target: "#tasks".to_string(),
                text: "[DONE] shipped".to_string(),
            }
        );
    }

    #[test]
    fn parses_privmsg_with_colons_in_text() {
        let line = ":rev-2 PRIVMSG #code :note: see http://example.com";
        assert_eq!(
            parse_line(line),
            IrcLine::Privmsg {
                nick: "rev-2".to_string(),
                target: "#code".to_string(),
                text: "note: see http://example.com".to_string(),
            }
        );
    }

    #[test]
    fn parses_ping() {
        assert_eq!(
            parse_line("PING :irc.local"),
            IrcLine::Ping("irc.local".to_string())
        );
        assert_eq!(parse_line("PING token"), IrcLine::Ping("token".to_string()));
    }

    #[test]
    fn ignores_noise() {
        assert_eq!(parse_line(""), IrcLine::Other);
        assert_eq!(parse_line(":server 001 dev-1 :welcome"), IrcLine::Other);
        assert_eq!(parse_line("NOTICE hello"), IrcLine::Other);
        assert_eq!(parse_line(":x PRIVMSG #chan"), IrcLine::Other);
    }

    #[tokio::test]
    async fn backlogged_queue_returns_conflict_shaped_error() {
        let (outbound_tx, _outbound_rx) = mpsc::channel(1);
        let client = IrcChatClient {
            outbound_tx,
            cancel: CancellationToken::new(),
        };

        client.say("#main", "first").await.unwrap();
        let err = client.say("#main", "second").await.unwrap_err();
        assert_eq!(err, ChatError::Backlogged);
    }

    #[tokio::test]
    async fn shutdown_closes_the_client() {
        let (outbound_tx, _outbound_rx) = mpsc::channel(4);
        let client = IrcChatClient {
            outbound_tx,
            cancel: CancellationToken::new(),
        };
        client.shutdown().await;
        assert_eq!(
            client.say("#main", "late").await.unwrap_err(),
            ChatError::Closed
        );
    }
}
