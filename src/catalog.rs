//! Topic and connection catalogs consumed by the graph engine.
//!
//! The real catalogs live behind the console's REST layer; the engine only
//! reads them and asks them to flip a topic's monitoring flag.

use std::{fmt, fs, path::Path, sync::Arc};

use anyhow::Context;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

use crate::realtime::{AggregateHandler, RealtimeEvent};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TopicInfo {
    pub id: String,
    pub name: String,
    pub connection_id: String,
    #[serde(default)]
    pub monitored: bool,
    #[serde(default)]
    pub message_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub id: String,
    pub name: String,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// On-disk shape of a catalog export.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CatalogSnapshot {
    #[serde(default)]
    pub topics: Vec<TopicInfo>,
    #[serde(default)]
    pub connections: Vec<ConnectionInfo>,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("unknown topic `{0}`")]
    UnknownTopic(String),

    #[error("catalog backend failed: {0}")]
    Backend(String),
}

#[async_trait]
pub trait TopicCatalog: Send + Sync {
    /// All topics, in catalog order.
    async fn topics(&self) -> Vec<TopicInfo>;

    async fn connections(&self) -> Vec<ConnectionInfo>;

    /// Flips monitoring for a topic and returns the new flag.
    async fn toggle_monitoring(&self, topic_id: &str) -> Result<bool, CatalogError>;

    fn name(&self) -> &'static str;
}

impl fmt::Debug for dyn TopicCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopicCatalog")
            .field("impl", &self.name())
            .finish()
    }
}

/// Catalog kept in memory. Also follows the event bus so its counters and
/// connection statuses stay current.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    topics: RwLock<Vec<TopicInfo>>,
    connections: RwLock<Vec<ConnectionInfo>>,
}

impl InMemoryCatalog {
    pub fn new(topics: Vec<TopicInfo>, connections: Vec<ConnectionInfo>) -> Arc<Self> {
        Arc::new(Self {
            topics: RwLock::new(topics),
            connections: RwLock::new(connections),
        })
    }

    pub fn from_snapshot(snapshot: CatalogSnapshot) -> Arc<Self> {
        Self::new(snapshot.topics, snapshot.connections)
    }

    /// Reads a JSON catalog export.
    pub fn from_file(path: &Path) -> anyhow::Result<Arc<Self>> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog: {}", path.display()))?;
        let snapshot: CatalogSnapshot = serde_json::from_str(&contents)
            .with_context(|| format!("Invalid catalog JSON in {}", path.display()))?;
        info!(
            topics = snapshot.topics.len(),
            connections = snapshot.connections.len(),
            "Loaded catalog from {}",
            path.display()
        );
        Ok(Self::from_snapshot(snapshot))
    }

    pub async fn topic(&self, topic_id: &str) -> Option<TopicInfo> {
        self.topics.read().await.iter().find(|t| t.id == topic_id).cloned()
    }

    pub async fn connection(&self, connection_id: &str) -> Option<ConnectionInfo> {
        self.connections
            .read()
            .await
            .iter()
            .find(|c| c.id == connection_id)
            .cloned()
    }
}

#[async_trait]
impl TopicCatalog for InMemoryCatalog {
    async fn topics(&self) -> Vec<TopicInfo> {
        self.topics.read().await.clone()
    }

    async fn connections(&self) -> Vec<ConnectionInfo> {
        self.connections.read().await.clone()
    }

    async fn toggle_monitoring(&self, topic_id: &str) -> Result<bool, CatalogError> {
        let mut topics = self.topics.write().await;
        let topic = topics
            .iter_mut()
            .find(|t| t.id == topic_id)
            .ok_or_else(|| CatalogError::UnknownTopic(topic_id.to_string()))?;
        topic.monitored = !topic.monitored;
        info!(%topic_id, monitored = topic.monitored, "Toggled topic monitoring");
        Ok(topic.monitored)
    }

    fn name(&self) -> &'static str {
        "InMemoryCatalog"
    }
}

#[async_trait]
impl AggregateHandler for InMemoryCatalog {
    async fn handle(&self, event: &RealtimeEvent) {
        match event {
            RealtimeEvent::MessageArrived { topic_name } => {
                let mut topics = self.topics.write().await;
                for topic in topics.iter_mut().filter(|t| &t.name == topic_name) {
                    topic.message_count = topic.message_count.saturating_add(1);
                }
            }
            RealtimeEvent::TopicUpdated { topic_id, message_count }
            | RealtimeEvent::TopicMetrics { topic_id, message_count, .. } => {
                let mut topics = self.topics.write().await;
                if let Some(topic) = topics.iter_mut().find(|t| &t.id == topic_id) {
                    topic.message_count = *message_count;
                }
            }
            RealtimeEvent::ConnectionStatus { connection_id, status } => {
                let mut connections = self.connections.write().await;
                if let Some(connection) = connections.iter_mut().find(|c| &c.id == connection_id) {
                    connection.status = Some(status.clone());
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "InMemoryCatalog"
    }
}
