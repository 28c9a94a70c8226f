//! Relays bridging the bus onto external streaming transports

use crate::bus::EventBus;
use crate::error::EventResult;
use crate::filter::EventFilter;
use accord_types::{ProtocolEvent, ProtocolEventEnvelope, SubscriptionId};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// One-way streaming sink, typically a websocket or server-sent-events
/// connection held elsewhere.
#[async_trait]
pub trait StreamTransport: Send + Sync {
    async fn send(&self, envelope: &ProtocolEventEnvelope) -> EventResult<()>;

    /// Called exactly once when the relay ends, whatever the cause.
    async fn close(&self);
}

/// Handle to a running relay task.
pub struct StreamRelay {
    subscription_id: SubscriptionId,
    handle: JoinHandle<()>,
}

impl StreamRelay {
    /// Start forwarding envelopes matching `filter` onto `transport`.
    ///
    /// A handshake envelope carrying the subscription id is sent before
    /// anything else, so the far side can correlate the stream. A transport
    /// failure tears the relay down: the subscription is removed and the
    /// transport closed. Unsubscribing ends the forward loop the same way.
    pub async fn spawn(
        bus: Arc<EventBus>,
        filter: EventFilter,
        transport: Arc<dyn StreamTransport>,
    ) -> EventResult<StreamRelay> {
        let (subscription_id, mut rx) = bus.subscribe(filter).await;

        let handshake =
            ProtocolEventEnvelope::new(ProtocolEvent::StreamHandshake { subscription_id });
        if let Err(err) = transport.send(&handshake).await {
            bus.unsubscribe(subscription_id).await;
            transport.close().await;
            return Err(err);
        }
        tracing::debug!(subscription_id = %subscription_id, "stream relay started");

        let handle = tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                if let Err(err) = transport.send(&envelope).await {
                    tracing::warn!(
                        subscription_id = %subscription_id,
                        error = %err,
                        "stream transport failed, tearing relay down"
                    );
                    bus.unsubscribe(subscription_id).await;
                    break;
                }
            }
            transport.close().await;
            tracing::debug!(subscription_id = %subscription_id, "stream relay finished");
        });

        Ok(StreamRelay {
            subscription_id,
            handle,
        })
    }

    pub fn subscription_id(&self) -> SubscriptionId {
        self.subscription_id
    }

    /// Detach the relay from the bus and wait for the forward loop to
    /// drain and close the transport.
    pub async fn shutdown(self, bus: &EventBus) {
        bus.unsubscribe(self.subscription_id).await;
        let _ = self.handle.await;
    }
}
