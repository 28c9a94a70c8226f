//! Filtered fan-out bus with bounded replay

use crate::filter::EventFilter;
use accord_types::{ProtocolEventEnvelope, SubscriptionId};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tokio::sync::{mpsc, RwLock};

/// Bus tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Envelopes retained for replay queries; older ones are evicted.
    pub history_capacity: usize,

    /// Per-subscriber channel depth. A subscriber that falls this far
    /// behind starts losing its own events, nobody else's.
    pub subscriber_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            history_capacity: 1024,
            subscriber_capacity: 256,
        }
    }
}

struct Subscription {
    id: SubscriptionId,
    filter: EventFilter,
    tx: mpsc::Sender<ProtocolEventEnvelope>,
}

/// Routes protocol event envelopes to matching subscribers.
///
/// Each subscriber owns a bounded channel; delivery uses `try_send`, so a
/// full channel drops the event for that subscriber only. Closed
/// subscribers are swept out on the next publish.
pub struct EventBus {
    config: BusConfig,
    subscriptions: RwLock<Vec<Subscription>>,
    history: RwLock<VecDeque<ProtocolEventEnvelope>>,
    counts: DashMap<&'static str, u64>,
}

impl EventBus {
    pub fn new(config: BusConfig) -> Self {
        Self {
            history: RwLock::new(VecDeque::with_capacity(config.history_capacity)),
            config,
            subscriptions: RwLock::new(Vec::new()),
            counts: DashMap::new(),
        }
    }

    /// Record the envelope in the replay history and deliver it to every
    /// matching subscriber. Returns how many subscribers received it.
    pub async fn publish(&self, envelope: ProtocolEventEnvelope) -> usize {
        *self.counts.entry(envelope.event.event_type()).or_insert(0) += 1;

        {
            let mut history = self.history.write().await;
            if history.len() == self.config.history_capacity {
                history.pop_front();
            }
            history.push_back(envelope.clone());
        }

        let subs = self.subscriptions.read().await;
        let mut delivered = 0;
        let mut closed = Vec::new();

        for sub in subs.iter() {
            if sub.filter.matches(&envelope) {
                match sub.tx.try_send(envelope.clone()) {
                    Ok(()) => delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::warn!(
                            subscription_id = %sub.id,
                            event_type = envelope.event.event_type(),
                            "subscriber channel full, dropping event"
                        );
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        closed.push(sub.id);
                    }
                }
            }
        }
        drop(subs);

        if !closed.is_empty() {
            let mut subs = self.subscriptions.write().await;
            subs.retain(|s| !closed.contains(&s.id));
            tracing::debug!(removed = closed.len(), "swept closed subscriptions");
        }

        delivered
    }

    /// Register a subscriber. Returns its id and the receiving end of its
    /// channel.
    pub async fn subscribe(
        &self,
        filter: EventFilter,
    ) -> (SubscriptionId, mpsc::Receiver<ProtocolEventEnvelope>) {
        let (tx, rx) = mpsc::channel(self.config.subscriber_capacity);
        let id = SubscriptionId::generate();
        self.subscriptions
            .write()
            .await
            .push(Subscription { id, filter, tx });
        tracing::debug!(subscription_id = %id, "subscription registered");
        (id, rx)
    }

    /// Remove a subscription. Removing one that is already gone is a
    /// no-op; the return value reports whether anything was removed.
    pub async fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.subscriptions.write().await;
        let before = subs.len();
        subs.retain(|s| s.id != id);
        let removed = subs.len() != before;
        if removed {
            tracing::debug!(subscription_id = %id, "subscription removed");
        }
        removed
    }

    /// Replay up to `limit` of the most recent retained envelopes matching
    /// `filter`, oldest first.
    pub async fn query(&self, filter: &EventFilter, limit: usize) -> Vec<ProtocolEventEnvelope> {
        let history = self.history.read().await;
        let mut matched: Vec<_> = history
            .iter()
            .rev()
            .filter(|e| filter.matches(e))
            .take(limit)
            .cloned()
            .collect();
        matched.reverse();
        matched
    }

    pub async fn subscription_count(&self) -> usize {
        self.subscriptions.read().await.len()
    }

    pub async fn stats(&self) -> BusStats {
        let events_by_type: HashMap<String, u64> = self
            .counts
            .iter()
            .map(|entry| (entry.key().to_string(), *entry.value()))
            .collect();
        BusStats {
            total_published: events_by_type.values().sum(),
            history_len: self.history.read().await.len(),
            subscription_count: self.subscriptions.read().await.len(),
            events_by_type,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}

#[derive(Debug, Clone)]
pub struct BusStats {
    pub total_published: u64,
    pub history_len: usize,
    pub subscription_count: usize,
    pub events_by_type: HashMap<String, u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use accord_types::{DemandId, NegotiationId, ProtocolEvent, SceneId};

    fn submitted(negotiation_id: NegotiationId) -> ProtocolEventEnvelope {
        ProtocolEventEnvelope::new(ProtocolEvent::DemandSubmitted {
            negotiation_id,
            demand_id: DemandId::generate(),
            scene_id: SceneId::new("scene-1"),
            text: "build an online store".into(),
        })
    }

    fn completed(negotiation_id: NegotiationId) -> ProtocolEventEnvelope {
        ProtocolEventEnvelope::new(ProtocolEvent::NegotiationCompleted {
            negotiation_id,
            offer_count: 2,
        })
    }

    #[tokio::test]
    async fn test_publish_reaches_matching_subscribers_only() {
        let bus = EventBus::default();
        let target = NegotiationId::generate();
        let other = NegotiationId::generate();

        let (_all_id, mut all_rx) = bus.subscribe(EventFilter::new()).await;
        let (_one_id, mut one_rx) = bus.subscribe(EventFilter::new().negotiation(target)).await;

        assert_eq!(bus.publish(submitted(target)).await, 2);
        assert_eq!(bus.publish(submitted(other)).await, 1);

        assert_eq!(
            one_rx.recv().await.unwrap().negotiation_id,
            Some(target)
        );
        assert!(one_rx.try_recv().is_err());

        assert_eq!(all_rx.recv().await.unwrap().negotiation_id, Some(target));
        assert_eq!(all_rx.recv().await.unwrap().negotiation_id, Some(other));
    }

    #[tokio::test]
    async fn test_slow_subscriber_loses_only_its_own_events() {
        let bus = EventBus::new(BusConfig {
            subscriber_capacity: 1,
            ..BusConfig::default()
        });
        let id = NegotiationId::generate();

        let (_slow_id, mut slow_rx) = bus.subscribe(EventFilter::new()).await;
        let (_fast_id, mut fast_rx) = bus.subscribe(EventFilter::new()).await;

        // slow never drains; its one-slot channel fills after the first
        assert_eq!(bus.publish(submitted(id)).await, 2);
        assert_eq!(bus.publish(completed(id)).await, 1);
        assert_eq!(bus.publish(completed(id)).await, 1);

        assert!(fast_rx.recv().await.is_some());
        assert!(fast_rx.recv().await.is_some());
        assert!(fast_rx.recv().await.is_some());

        assert!(slow_rx.recv().await.is_some());
        assert!(slow_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent() {
        let bus = EventBus::default();
        let (id, _rx) = bus.subscribe(EventFilter::new()).await;

        assert!(bus.unsubscribe(id).await);
        assert!(!bus.unsubscribe(id).await);
        assert_eq!(bus.subscription_count().await, 0);
    }

    #[tokio::test]
    async fn test_closed_subscriber_swept_on_publish() {
        let bus = EventBus::default();
        let (_id, rx) = bus.subscribe(EventFilter::new()).await;
        drop(rx);

        assert_eq!(bus.publish(submitted(NegotiationId::generate())).await, 0);
        assert_eq!(bus.subscription_count().await, 0);
    }

    #[tokio::test]
    async fn test_history_evicts_oldest() {
        let bus = EventBus::new(BusConfig {
            history_capacity: 3,
            ..BusConfig::default()
        });

        let ids: Vec<_> = (0..5).map(|_| NegotiationId::generate()).collect();
        for id in &ids {
            bus.publish(submitted(*id)).await;
        }

        let replayed = bus.query(&EventFilter::new(), 100).await;
        assert_eq!(replayed.len(), 3);
        let replayed_ids: Vec<_> = replayed.iter().filter_map(|e| e.negotiation_id).collect();
        assert_eq!(replayed_ids, ids[2..]);
    }

    #[tokio::test]
    async fn test_query_filters_and_limits_to_most_recent() {
        let bus = EventBus::default();
        let id = NegotiationId::generate();

        bus.publish(submitted(id)).await;
        bus.publish(completed(id)).await;
        bus.publish(submitted(id)).await;

        let only_completed = bus
            .query(&EventFilter::new().event_type("negotiation.completed"), 10)
            .await;
        assert_eq!(only_completed.len(), 1);

        // limit keeps the most recent matches
        let latest = bus.query(&EventFilter::new(), 1).await;
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].event.event_type(), "demand.submitted");
    }

    #[tokio::test]
    async fn test_stats_count_by_type() {
        let bus = EventBus::default();
        let id = NegotiationId::generate();

        bus.publish(submitted(id)).await;
        bus.publish(submitted(id)).await;
        bus.publish(completed(id)).await;

        let stats = bus.stats().await;
        assert_eq!(stats.total_published, 3);
        assert_eq!(stats.history_len, 3);
        assert_eq!(stats.events_by_type.get("demand.submitted"), Some(&2));
        assert_eq!(stats.events_by_type.get("negotiation.completed"), Some(&1));
    }
}
