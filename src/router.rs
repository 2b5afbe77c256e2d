//! Chat message routing
//!
//! Every inbound chat line passes through here: bracket-tag parsing,
//! append to the per-(team, channel) ring buffer, then hand-off to the
//! broadcaster. Routing is serialized per team (one shard lock each) and
//! concurrent across teams.

use crate::broadcast::Broadcaster;
use crate::chat::InboundMessage;
use crate::events::{ChatMessage, Event};
use regex::Regex;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, OnceLock, RwLock};

/// Default ring capacity per (team, channel)
pub const DEFAULT_BUFFER_CAPACITY: usize = 500;

type TeamBuffers = HashMap<String, VecDeque<ChatMessage>>;

/// Router over per-team ring buffer shards
pub struct Router {
    shards: RwLock<HashMap<String, Arc<Mutex<TeamBuffers>>>>,
    capacity: usize,
    broadcaster: Arc<Broadcaster>,
}

impl Router {
    pub fn new(capacity: usize, broadcaster: Arc<Broadcaster>) -> Self {
        Self {
            shards: RwLock::new(HashMap::new()),
            capacity,
            broadcaster,
        }
    }

    /// Normalize, buffer and broadcast one inbound message.
    pub fn route(&self, inbound: InboundMessage) {
        let (tag, tag_body) = parse_tag(&inbound.text);
        let message = ChatMessage {
            time: inbound.time,
            team_id: inbound.team_id,
            channel: inbound.channel,
            nick: inbound.nick,
            text: inbound.text.trim().to_string(),
            tag,
            tag_body,
        };

        let shard = self.shard_for(&message.team_id);
        // Buffer append and publish happen under the shard lock so that
        // buffer order and delivery order agree per (team, channel).
        let mut buffers = shard.lock().unwrap();
        let buffer = buffers
            .entry(message.channel.clone())
            .or_insert_with(|| VecDeque::with_capacity(self.capacity.min(64)));
        if buffer.len() == self.capacity {
            buffer.pop_front();
        }
        buffer.push_back(message.clone());
        self.broadcaster.publish(&Event::Message { message });
    }

    /// Consistent snapshot of the most recent messages on a channel.
    pub fn recent(&self, team_id: &str, channel: &str) -> Vec<ChatMessage> {
        let shards = self.shards.read().unwrap();
        let Some(shard) = shards.get(team_id) else {
            return Vec::new();
        };
        let buffers = shard.lock().unwrap();
        buffers
            .get(channel)
            .map(|buffer| buffer.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop every buffer a team owns. Called on team delete.
    pub fn clear(&self, team_id: &str) {
        self.shards.write().unwrap().remove(team_id);
    }

    fn shard_for(&self, team_id: &str) -> Arc<Mutex<TeamBuffers>> {
        if let Some(shard) = self.shards.read().unwrap().get(team_id) {
            return shard.clone();
        }
        self.shards
            .write()
            .unwrap()
            .entry(team_id.to_string())
            .or_default()
            .clone()
    }
}

/// Extract a leading uppercase bracket tag.
///
/// `[DONE] task completed` yields `("DONE", "task completed")`. Lowercase
/// or mixed-case bracket contents are not tags by policy.
pub fn parse_tag(text: &str) -> (Option<String>, Option<String>) {
    static TAG_RE: OnceLock<Regex> = OnceLock::new();
    let re = TAG_RE.get_or_init(|| Regex::new(r"^\[([A-Z_]+)\]\s*(.*)$").unwrap());

    let trimmed = text.trim();
    match re.captures(trimmed) {
        Some(caps) => {
            let tag = caps.get(1).map(|m| m.as_str().to_string());
            let body = caps.get(2).map(|m| m.as_str().trim().to_string());
            (tag, body)
        }
        None => (None, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::Scope;
    use chrono::Utc;
    use proptest::prelude::*;

    fn inbound(team: &str, channel: &str, nick: &str, text: &str) -> InboundMessage {
        InboundMessage {
            team_id: team.to_string(),
            channel: channel.to_string(),
            nick: nick.to_string(),
            text: text.to_string(),
            time: Utc::now(),
        }
    }

    fn router(capacity: usize) -> (Router, Arc<Broadcaster>) {
        let hub = Arc::new(Broadcaster::new(1024));
        (Router::new(capacity, hub.clone()), hub)
    }

    #[test]
    fn tag_parsing_truth_table() {
        assert_eq!(
            parse_tag("[DONE] task completed"),
            (Some("DONE".into()), Some("task completed".into()))
        );
        assert_eq!(
            parse_tag("[NEEDS_REVIEW]   pr 42"),
            (Some("NEEDS_REVIEW".into()), Some("pr 42".into()))
        );
        // Uppercase-only policy
        assert_eq!(parse_tag("[done] task completed"), (None, None));
        assert_eq!(parse_tag("[Done] task"), (None, None));
        // Plain text
        assert_eq!(parse_tag("just chatting"), (None, None));
        // Tag with no body
        assert_eq!(parse_tag("[ACK]"), (Some("ACK".into()), Some(String::new())));
        // Tag not at the start
        assert_eq!(parse_tag("see [DONE] above"), (None, None));
    }

    #[test]
    fn routes_into_buffer_and_broadcast() {
        let (router, hub) = router(10);
        let mut sub = hub.subscribe(Scope::Team("t1".into()));

        router.route(inbound("t1", "#tasks", "dev-1", "[DONE] task completed"));
        router.route(inbound("t1", "#tasks", "dev-1", "just chatting"));

        let snapshot = router.recent("t1", "#tasks");
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].tag.as_deref(), Some("DONE"));
        assert_eq!(snapshot[0].tag_body.as_deref(), Some("task completed"));
        assert_eq!(snapshot[1].tag, None);
        assert_eq!(snapshot[1].tag_body, None);

        let first = futures::executor::block_on(sub.recv()).unwrap();
        match first {
            Event::Message { message } => assert_eq!(message.tag.as_deref(), Some("DONE")),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn ring_overwrites_oldest_on_overflow() {
        let (router, _hub) = router(3);
        for i in 0..5 {
            router.route(inbound("t1", "#main", "dev-1", &format!("m{i}")));
        }

        let snapshot = router.recent("t1", "#main");
        let texts: Vec<&str> = snapshot.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["m2", "m3", "m4"]);
    }

    #[test]
    fn channels_are_independent() {
        let (router, _hub) = router(10);
        router.route(inbound("t1", "#main", "dev-1", "a"));
        router.route(inbound("t1", "#code", "dev-1", "b"));
        router.route(inbound("t2", "#main", "rev-1", "c"));

        assert_eq!(router.recent("t1", "#main").len(), 1);
        assert_eq!(router.recent("t1", "#code").len(), 1);
        assert_eq!(router.recent("t2", "#main").len(), 1);
        assert!(router.recent("t1", "#testing").is_empty());
    }

    #[test]
    fn clear_drops_all_team_buffers() {
        let (router, _hub) = router(10);
        router.route(inbound("t1", "#main", "dev-1", "a"));
        router.route(inbound("t1", "#code", "dev-1", "b"));
        router.route(inbound("t2", "#main", "rev-1", "c"));

        router.clear("t1");
        assert!(router.recent("t1", "#main").is_empty());
        assert!(router.recent("t1", "#code").is_empty());
        assert_eq!(router.recent("t2", "#main").len(), 1);
    }

    proptest! {
        #[test]
        fn well_formed_tags_always_parse(tag in "[A-Z_]{1,12}", body in "[ -~]{0,40}") {
            let text = format!("[{tag}] {body}");
            let (parsed_tag, parsed_body) = parse_tag(&text);
            prop_assert_eq!(parsed_tag, Some(tag));
            prop_assert_eq!(parsed_body, Some(body.trim().to_string()));
        }

        #[test]
        fn parse_never_panics(text in "\\PC{0,80}") {
            let _ = parse_tag(&text);
        }

        #[test]
        fn buffer_never_exceeds_capacity(count in 1usize..40) {
            let (router, _hub) = router(8);
            for i in 0..count {
                router.route(inbound("t1", "#main", "dev-1", &format!("m{i}")));
            }
            let snapshot = router.recent("t1", "#main");
            prop_assert!(snapshot.len() <= 8);
            prop_assert_eq!(snapshot.last().unwrap().text.clone(), format!("m{}", count - 1));
        }
    }
}
