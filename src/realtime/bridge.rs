use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, trace};

use crate::{
    flow::{
        editor::{FlowEditor, SharedEditor},
        model::NodeDataPatch,
    },
    realtime::bus::{AggregateHandler, RealtimeEvent},
};

/// Merges broker events into the live graph.
///
/// Only signal fields are touched; status follows from the graph's own
/// derivation. Events are never snapshotted and never dirty the document.
#[derive(Debug, Clone)]
pub struct RealtimeBridge {
    editor: SharedEditor,
}

impl RealtimeBridge {
    pub fn new(editor: SharedEditor) -> Arc<Self> {
        Arc::new(Self { editor })
    }

    /// Applies one event and returns how many nodes it touched.
    pub fn apply(editor: &mut FlowEditor, event: &RealtimeEvent) -> usize {
        let touched = match event {
            RealtimeEvent::MessageArrived { topic_name } => {
                let now = Utc::now();
                let mut touched = 0;
                for id in editor.graph().find_topics(None, Some(topic_name)) {
                    let count = editor
                        .graph()
                        .node(&id)
                        .and_then(|n| n.data.message_count)
                        .unwrap_or(0);
                    let patch = NodeDataPatch {
                        message_count: Some(count.saturating_add(1)),
                        last_message_at: Some(now),
                        ..Default::default()
                    };
                    if editor.apply_metrics(&id, patch) {
                        touched += 1;
                    }
                }
                touched
            }

            RealtimeEvent::TopicUpdated { topic_id, message_count } => {
                let ids = editor.graph().find_topics(Some(topic_id), None);
                ids.iter()
                    .filter(|id| editor.apply_metrics(id, NodeDataPatch::new().with_message_count(*message_count)))
                    .count()
            }

            RealtimeEvent::TopicMetrics {
                topic_id,
                message_count,
                throughput_per_second,
                throughput_per_minute,
                last_message_at,
                consumer_active,
            } => {
                let mut touched = 0;
                for id in editor.graph().find_topics(Some(topic_id), None) {
                    let current = editor.graph().node(&id).and_then(|n| n.data.last_message_at);
                    if let (Some(incoming), Some(current)) = (last_message_at, current) {
                        if *incoming < current {
                            debug!(node_id = %id, %incoming, %current, "ignoring stale topic metrics");
                            continue;
                        }
                    }
                    let patch = NodeDataPatch {
                        message_count: Some(*message_count),
                        throughput: Some(*throughput_per_second),
                        throughput_per_minute: Some(*throughput_per_minute),
                        last_message_at: *last_message_at,
                        consumer_active: Some(*consumer_active),
                        ..Default::default()
                    };
                    if editor.apply_metrics(&id, patch) {
                        touched += 1;
                    }
                }
                touched
            }

            RealtimeEvent::ConnectionStatus { connection_id, status } => {
                let ids = editor.graph().find_connection(connection_id);
                ids.iter()
                    .filter(|id| editor.apply_metrics(id, NodeDataPatch::new().with_connection_status(status.clone())))
                    .count()
            }
        };

        if touched == 0 {
            trace!(subject = event.subject(), "event matched no node");
        }
        touched
    }
}

#[async_trait]
impl AggregateHandler for RealtimeBridge {
    async fn handle(&self, event: &RealtimeEvent) {
        let mut editor = self.editor.lock().await;
        Self::apply(&mut editor, event);
    }

    fn name(&self) -> &'static str {
        "RealtimeBridge"
    }
}
