use std::{fmt, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Events pushed by the broker monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RealtimeEvent {
    #[serde(rename_all = "camelCase")]
    MessageArrived { topic_name: String },

    #[serde(rename_all = "camelCase")]
    TopicUpdated { topic_id: String, message_count: u64 },

    #[serde(rename_all = "camelCase")]
    TopicMetrics {
        topic_id: String,
        message_count: u64,
        throughput_per_second: f64,
        throughput_per_minute: f64,
        #[serde(default)]
        last_message_at: Option<DateTime<Utc>>,
        #[serde(default)]
        consumer_active: bool,
    },

    #[serde(rename_all = "camelCase")]
    ConnectionStatus { connection_id: String, status: String },
}

impl RealtimeEvent {
    pub fn subject(&self) -> &'static str {
        match self {
            RealtimeEvent::MessageArrived { .. } => "message",
            RealtimeEvent::TopicUpdated { .. } => "topic-update",
            RealtimeEvent::TopicMetrics { .. } => "topic-metrics",
            RealtimeEvent::ConnectionStatus { .. } => "connection-status",
        }
    }
}

/// One consumer of the bus. Each aggregate (graph, topic catalog, ...) gets
/// its own handler and its own receiver.
#[async_trait]
pub trait AggregateHandler: Send + Sync {
    async fn handle(&self, event: &RealtimeEvent);

    fn name(&self) -> &'static str;
}

impl fmt::Debug for dyn AggregateHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateHandler")
            .field("impl", &self.name())
            .finish()
    }
}

/// Typed fan-out channel between the transport and the aggregates.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<RealtimeEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Returns the number of handlers that will see the event.
    pub fn publish(&self, event: RealtimeEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RealtimeEvent> {
        self.sender.subscribe()
    }

    /// Spawns a task feeding every event to `handler` until the returned
    /// subscription is cancelled or the bus is dropped.
    pub fn attach(&self, handler: Arc<dyn AggregateHandler>) -> Subscription {
        let mut rx = self.sender.subscribe();
        let token = CancellationToken::new();
        let child = token.clone();
        let name = handler.name();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = child.cancelled() => break,
                    received = rx.recv() => match received {
                        Ok(event) => {
                            if child.is_cancelled() {
                                break;
                            }
                            handler.handle(&event).await;
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(handler = name, skipped, "realtime handler lagged behind the bus");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
            debug!(handler = name, "realtime subscription finished");
        });

        Subscription {
            name,
            token,
            handle: Mutex::new(Some(handle)),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Handle on an attached handler. Cancelling is idempotent.
#[derive(Debug)]
pub struct Subscription {
    name: &'static str,
    token: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Subscription {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled()
    }

    /// Stops delivery without waiting for an in-progress event.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Stops delivery and waits for the task to exit, so no handler call can
    /// land after this returns.
    pub async fn unsubscribe(&self) {
        self.token.cancel();
        let handle = self.handle.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(handler = self.name, error = %e, "realtime task ended abnormally");
            }
        }
    }
}
