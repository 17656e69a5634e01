//! C8: Event Fan-out (§4.8). An in-process subscription registry delivering
//! `ChangeEvent`s to authorized WebSocket subscribers. No persistent pub/sub —
//! everything here dies with the process, per spec §1 non-goals.

use std::collections::HashSet;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use task_core::event::{ChangeEvent, EntityType};

/// Bound on a subscriber's outbound queue before it's disconnected (§4.8).
pub const BACKPRESSURE_DISCONNECT_CODE: u16 = 4002;
pub const UNAUTHENTICATED_CLOSE_CODE: u16 = 4001;

/// What one connection wants to hear about.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SubscriptionFilter {
    pub entity: Option<EntityType>,
    #[serde(default)]
    pub ids: HashSet<String>,
}

impl SubscriptionFilter {
    fn matches(&self, event: &ChangeEvent) -> bool {
        if let Some(entity) = self.entity {
            if entity != event.entity_type {
                return false;
            }
        }
        if !self.ids.is_empty() && !self.ids.contains(&event.entity_id.to_string()) {
            return false;
        }
        true
    }
}

/// Message delivered over `/ws` for a matching mutation.
#[derive(Debug, Clone, Serialize)]
pub struct WsChangeMessage {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub entity: EntityType,
    pub id: String,
    pub action: String,
    pub actor: String,
    pub timestamp: String,
}

impl From<&ChangeEvent> for WsChangeMessage {
    fn from(event: &ChangeEvent) -> Self {
        Self {
            kind: "change",
            entity: event.entity_type,
            id: event.entity_id.to_string(),
            action: event.action.clone(),
            actor: event.actor_user_id.clone(),
            timestamp: event.timestamp.to_rfc3339(),
        }
    }
}

struct Subscription {
    id: u64,
    user_id: String,
    filter: SubscriptionFilter,
    sender: tokio::sync::mpsc::Sender<WsChangeMessage>,
}

/// Checks whether `user_id` may see `event` per §4.8: same owner, or — for
/// tasks — the actor is in the entity's assignees. Assignee membership is
/// checked by the caller before publish (the registry only knows owners);
/// `is_assignee` lets `publish` accept that pre-computed fact.
fn authorized(user_id: &str, event: &ChangeEvent, is_assignee: bool) -> bool {
    user_id == event.actor_user_id || is_assignee
}

/// In-process registry of live WS subscriptions, keyed by an opaque
/// connection id. Delivery happens outside the registry's lock: `publish`
/// takes a snapshot of matching senders, then sends.
pub struct FanoutRegistry {
    subscriptions: Mutex<Vec<Subscription>>,
    next_id: Mutex<u64>,
}

impl Default for FanoutRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FanoutRegistry {
    pub fn new() -> Self {
        Self { subscriptions: Mutex::new(Vec::new()), next_id: Mutex::new(0) }
    }

    pub fn subscribe(
        &self,
        user_id: String,
        filter: SubscriptionFilter,
    ) -> (u64, tokio::sync::mpsc::Receiver<WsChangeMessage>) {
        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let id = {
            let mut next_id = self.next_id.lock().expect("fanout id mutex poisoned");
            *next_id += 1;
            *next_id
        };
        self.subscriptions
            .lock()
            .expect("fanout registry mutex poisoned")
            .push(Subscription { id, user_id, filter, sender: tx });
        (id, rx)
    }

    pub fn unsubscribe(&self, id: u64) {
        self.subscriptions.lock().expect("fanout registry mutex poisoned").retain(|s| s.id != id);
    }

    /// Delivers `event` to every matching, authorized subscriber. `assignee`
    /// is the event's owning task's assignee set, used by the
    /// same-owner-or-assignee rule for `EntityType::Task` events.
    pub async fn publish(&self, event: &ChangeEvent, assignees: &[String]) {
        let message = WsChangeMessage::from(event);
        let targets: Vec<(u64, tokio::sync::mpsc::Sender<WsChangeMessage>)> = {
            let subs = self.subscriptions.lock().expect("fanout registry mutex poisoned");
            subs.iter()
                .filter(|s| {
                    let is_assignee = event.entity_type == EntityType::Task && assignees.contains(&s.user_id);
                    authorized(&s.user_id, event, is_assignee) && s.filter.matches(event)
                })
                .map(|s| (s.id, s.sender.clone()))
                .collect()
        };
        let mut overflowed = Vec::new();
        for (id, sender) in targets {
            if sender.try_send(message.clone()).is_err() {
                overflowed.push(id);
            }
        }
        // A full queue means the subscriber isn't draining fast enough; drop
        // it so its `Receiver::recv` returns `None` and the connection
        // handler closes with `BACKPRESSURE_DISCONNECT_CODE`.
        if !overflowed.is_empty() {
            self.subscriptions
                .lock()
                .expect("fanout registry mutex poisoned")
                .retain(|s| !overflowed.contains(&s.id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn event(entity_type: EntityType, actor: &str) -> ChangeEvent {
        ChangeEvent {
            entity_type,
            entity_id: Uuid::new_v4(),
            actor_user_id: actor.to_string(),
            action: "update".to_string(),
            payload_digest: "abc".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn owner_receives_matching_event() {
        let registry = FanoutRegistry::new();
        let (_id, mut rx) = registry.subscribe(
            "u1".to_string(),
            SubscriptionFilter { entity: Some(EntityType::Task), ids: HashSet::new() },
        );
        registry.publish(&event(EntityType::Task, "u1"), &[]).await;
        let msg = rx.try_recv().expect("expected delivery");
        assert_eq!(msg.entity, EntityType::Task);
    }

    #[tokio::test]
    async fn other_user_is_not_delivered() {
        let registry = FanoutRegistry::new();
        let (_id, mut rx) = registry.subscribe(
            "u2".to_string(),
            SubscriptionFilter { entity: None, ids: HashSet::new() },
        );
        registry.publish(&event(EntityType::Task, "u1"), &[]).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn assignee_is_authorized_for_task_events() {
        let registry = FanoutRegistry::new();
        let (_id, mut rx) = registry.subscribe(
            "assignee-1".to_string(),
            SubscriptionFilter { entity: None, ids: HashSet::new() },
        );
        registry.publish(&event(EntityType::Task, "u1"), &["assignee-1".to_string()]).await;
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn overflowed_subscriber_is_dropped_from_registry() {
        let registry = FanoutRegistry::new();
        let (_id, rx) = registry.subscribe(
            "u1".to_string(),
            SubscriptionFilter { entity: None, ids: HashSet::new() },
        );
        for _ in 0..70 {
            registry.publish(&event(EntityType::Task, "u1"), &[]).await;
        }
        assert_eq!(registry.subscriptions.lock().unwrap().len(), 0);
        drop(rx);
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let registry = FanoutRegistry::new();
        let (id, mut rx) = registry.subscribe(
            "u1".to_string(),
            SubscriptionFilter { entity: None, ids: HashSet::new() },
        );
        registry.unsubscribe(id);
        registry.publish(&event(EntityType::Task, "u1"), &[]).await;
        assert!(rx.try_recv().is_err());
    }
}
