//! Topic-addressable event fan-out
//!
//! Subscribers get a bounded delivery queue. Delivery never blocks the
//! publisher: a subscriber whose queue is full when an event arrives is
//! terminated with an overflow indicator and unregistered. Events for one
//! team are published from one path at a time, so per-team order is
//! preserved end to end.

use crate::events::Event;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// What a subscription wants to see
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// One team's events
    Team(String),
    /// Everything (internal consumers only; the push channel always binds
    /// to a team)
    All,
}

impl Scope {
    fn matches(&self, event: &Event) -> bool {
        match self {
            Scope::Team(id) => event.team_id() == id,
            Scope::All => true,
        }
    }
}

struct SubscriberHandle {
    scope: Scope,
    tx: mpsc::Sender<Event>,
    overflowed: Arc<AtomicBool>,
}

/// Receiving half handed to the subscriber.
///
/// `recv()` yields events until the queue closes. After `None`, check
/// `was_overflowed()`: true means the broadcaster cut this subscriber off
/// for falling behind and the consumer owes its client a terminal frame.
pub struct Subscription {
    pub id: u64,
    rx: mpsc::Receiver<Event>,
    overflowed: Arc<AtomicBool>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    pub fn was_overflowed(&self) -> bool {
        self.overflowed.load(Ordering::Acquire)
    }
}

/// Fan-out hub shared by the router, the liveness tracker and the
/// lifecycle manager.
pub struct Broadcaster {
    subscribers: Mutex<HashMap<u64, SubscriberHandle>>,
    next_id: AtomicU64,
    queue_capacity: usize,
}

impl Broadcaster {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            queue_capacity,
        }
    }

    /// Register a subscriber for a scope.
    pub fn subscribe(&self, scope: Scope) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let overflowed = Arc::new(AtomicBool::new(false));

        self.subscribers.lock().unwrap().insert(
            id,
            SubscriberHandle {
                scope,
                tx,
                overflowed: overflowed.clone(),
            },
        );

        Subscription { id, rx, overflowed }
    }

    /// Drop a subscription (client went away).
    pub fn unsubscribe(&self, id: u64) {
        self.subscribers.lock().unwrap().remove(&id);
    }

    /// Deliver an event to every matching subscriber.
    ///
    /// Best-effort under slow consumers: a full queue terminates that
    /// subscriber rather than dropping this one event and keeping the
    /// subscription alive with a gap.
    pub fn publish(&self, event: &Event) {
        let mut overflowed_ids = Vec::new();
        {
            let subscribers = self.subscribers.lock().unwrap();
            for (id, handle) in subscribers.iter() {
                if !handle.scope.matches(event) {
                    continue;
                }
                match handle.tx.try_send(event.clone()) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        handle.overflowed.store(true, Ordering::Release);
                        overflowed_ids.push(*id);
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        overflowed_ids.push(*id);
                    }
                }
            }
        }

        if !overflowed_ids.is_empty() {
            let mut subscribers = self.subscribers.lock().unwrap();
            for id in overflowed_ids {
                if subscribers.remove(&id).is_some() {
                    tracing::warn!(subscription_id = id, "subscriber dropped");
                }
            }
        }
    }

    #[allow(dead_code)] // Used in tests
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::TeamStatus;

    fn team_status(team: &str) -> Event {
        Event::TeamStatus {
            team_id: team.to_string(),
            status: TeamStatus::Running,
        }
    }

    #[tokio::test]
    async fn delivers_to_matching_scope_only() {
        let hub = Broadcaster::new(8);
        let mut team_a = hub.subscribe(Scope::Team("a".into()));
        let mut all = hub.subscribe(Scope::All);

        hub.publish(&team_status("a"));
        hub.publish(&team_status("b"));

        assert_eq!(team_a.recv().await.unwrap().team_id(), "a");
        assert_eq!(all.recv().await.unwrap().team_id(), "a");
        assert_eq!(all.recv().await.unwrap().team_id(), "b");
    }

    #[tokio::test]
    async fn preserves_publish_order_per_team() {
        let hub = Broadcaster::new(16);
        let mut sub = hub.subscribe(Scope::Team("a".into()));

        for i in 0..10 {
            hub.publish(&Event::AgentStatus {
                team_id: "a".into(),
                agent_id: format!("dev-{i}"),
                status: crate::store::AgentStatus::Live,
            });
        }

        for i in 0..10 {
            match sub.recv().await.unwrap() {
                Event::AgentStatus { agent_id, .. } => {
                    assert_eq!(agent_id, format!("dev-{i}"));
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn slow_subscriber_is_cut_off_not_blocked_on() {
        let hub = Broadcaster::new(4);
        let mut slow = hub.subscribe(Scope::Team("a".into()));

        // Five publishes against a queue of four; none of them block.
        for _ in 0..5 {
            hub.publish(&team_status("a"));
        }

        assert_eq!(hub.subscriber_count(), 0);

        // The four queued events drain, then the closed queue reports the
        // overflow so the consumer can emit a terminal frame.
        for _ in 0..4 {
            assert!(slow.recv().await.is_some());
        }
        assert!(slow.recv().await.is_none());
        assert!(slow.was_overflowed());
    }

    #[tokio::test]
    async fn overflow_of_one_subscriber_spares_the_rest() {
        let hub = Broadcaster::new(2);
        let mut slow = hub.subscribe(Scope::Team("a".into()));
        let mut healthy = hub.subscribe(Scope::Team("a".into()));

        // The healthy subscriber keeps reading; the slow one never does.
        for _ in 0..3 {
            hub.publish(&team_status("a"));
            assert!(healthy.recv().await.is_some());
        }

        // Slow one dropped, healthy one untouched.
        assert_eq!(hub.subscriber_count(), 1);
        assert!(!healthy.was_overflowed());

        while slow.recv().await.is_some() {}
        assert!(slow.was_overflowed());
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let hub = Broadcaster::new(4);
        let sub = hub.subscribe(Scope::Team("a".into()));
        hub.unsubscribe(sub.id);
        hub.publish(&team_status("a"));
        assert_eq!(hub.subscriber_count(), 0);

        let mut sub = sub;
        assert!(sub.recv().await.is_none());
        assert!(!sub.was_overflowed());
    }
}
