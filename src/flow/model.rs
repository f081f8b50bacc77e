use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::flow::status::Status;

/// The four kinds of element a topology diagram can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum NodeType {
    Application,
    Topic,
    ConsumerGroup,
    Database,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Application => "application",
            NodeType::Topic => "topic",
            NodeType::ConsumerGroup => "consumerGroup",
            NodeType::Database => "database",
        }
    }

    /// Label given to a node dropped from the palette.
    pub fn default_label(&self) -> &'static str {
        match self {
            NodeType::Application => "New Application",
            NodeType::Topic => "New Topic",
            NodeType::ConsumerGroup => "Consumer Group",
            NodeType::Database => "Database",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Payload of a node.
///
/// Known fields are typed; anything else a renderer stores on the node
/// round-trips through `extra` untouched. `status` is derived and is rewritten
/// by the graph after every mutation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeData {
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sublabel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default)]
    pub status: Status,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_name: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub monitored: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub throughput: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub throughput_per_minute: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer_active: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NodeData {
    pub fn labeled(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Default::default()
        }
    }

    /// Shallow merge: only fields present in `patch` are written.
    pub fn apply(&mut self, patch: NodeDataPatch) {
        let NodeDataPatch {
            label,
            sublabel,
            color,
            topic_id,
            topic_name,
            monitored,
            message_count,
            throughput,
            throughput_per_minute,
            last_message_at,
            consumer_active,
            connection_id,
            connection_status,
            health,
            extra,
        } = patch;

        if let Some(v) = label {
            self.label = v;
        }
        if sublabel.is_some() {
            self.sublabel = sublabel;
        }
        if color.is_some() {
            self.color = color;
        }
        if topic_id.is_some() {
            self.topic_id = topic_id;
        }
        if topic_name.is_some() {
            self.topic_name = topic_name;
        }
        if let Some(v) = monitored {
            self.monitored = v;
        }
        if message_count.is_some() {
            self.message_count = message_count;
        }
        if throughput.is_some() {
            self.throughput = throughput;
        }
        if throughput_per_minute.is_some() {
            self.throughput_per_minute = throughput_per_minute;
        }
        if last_message_at.is_some() {
            self.last_message_at = last_message_at;
        }
        if consumer_active.is_some() {
            self.consumer_active = consumer_active;
        }
        if connection_id.is_some() {
            self.connection_id = connection_id;
        }
        if connection_status.is_some() {
            self.connection_status = connection_status;
        }
        if health.is_some() {
            self.health = health;
        }
        for (key, value) in extra {
            if TYPED_DATA_KEYS.contains(&key.as_str()) {
                debug!(%key, "dropping free-form field that shadows a typed one");
                continue;
            }
            self.extra.insert(key, value);
        }
    }

    /// Copies the live metric fields of `other` over this payload.
    /// Used when restoring a snapshot so counters do not roll back. Only the
    /// fields the realtime bridge writes are carried.
    pub fn carry_metrics_from(&mut self, other: &NodeData) {
        self.message_count = other.message_count;
        self.throughput = other.throughput;
        self.throughput_per_minute = other.throughput_per_minute;
        self.last_message_at = other.last_message_at;
        self.consumer_active = other.consumer_active;
        self.connection_status = other.connection_status.clone();
    }
}

/// Wire names of the typed [`NodeData`] fields. `extra` never holds these,
/// otherwise the node would serialize a key twice.
const TYPED_DATA_KEYS: &[&str] = &[
    "label",
    "sublabel",
    "color",
    "status",
    "topicId",
    "topicName",
    "monitored",
    "messageCount",
    "throughput",
    "throughputPerMinute",
    "lastMessageAt",
    "consumerActive",
    "connectionId",
    "connectionStatus",
    "health",
];

/// A partial update for [`NodeData`]. There is no `status` field: status can
/// only change through the signals it is derived from.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeDataPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sublabel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitored: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub throughput: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub throughput_per_minute: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer_active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NodeDataPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn with_monitored(mut self, monitored: bool) -> Self {
        self.monitored = Some(monitored);
        self
    }

    pub fn with_message_count(mut self, count: u64) -> Self {
        self.message_count = Some(count);
        self
    }

    pub fn with_throughput(mut self, per_second: f64) -> Self {
        self.throughput = Some(per_second);
        self
    }

    pub fn with_connection_status(mut self, status: impl Into<String>) -> Self {
        self.connection_status = Some(status.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// What a user may edit: drops the fields owned by the realtime feed and
    /// free-form keys that shadow typed ones.
    pub fn into_user_edit(mut self) -> Self {
        self.extra.retain(|key, _| !TYPED_DATA_KEYS.contains(&key.as_str()));
        Self {
            message_count: None,
            throughput: None,
            throughput_per_minute: None,
            last_message_at: None,
            consumer_active: None,
            connection_status: None,
            ..self
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub data: NodeData,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub selected: bool,
}

impl Node {
    pub fn new(id: impl Into<String>, node_type: NodeType, position: Position, data: NodeData) -> Self {
        Self {
            id: id.into(),
            node_type,
            position,
            data,
            selected: false,
        }
    }

    pub fn is_topic(&self) -> bool {
        self.node_type == NodeType::Topic
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    #[default]
    Laser,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EdgeData {
    pub status: Status,
    pub color: String,
    pub active: bool,
}

impl Default for EdgeData {
    fn default() -> Self {
        Self {
            status: Status::Inactive,
            color: Status::Inactive.color().to_string(),
            active: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(rename = "type", default)]
    pub kind: EdgeKind,
    #[serde(default)]
    pub animated: bool,
    #[serde(default)]
    pub data: EdgeData,
}

impl Edge {
    pub fn new(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            kind: EdgeKind::Laser,
            animated: false,
            data: EdgeData::default(),
        }
    }

    /// An edge with the conventional `e-{source}-{target}` id.
    pub fn between(source: &str, target: &str) -> Self {
        Self::new(edge_id(source, target), source, target)
    }

    pub fn touches(&self, node_id: &str) -> bool {
        self.source == node_id || self.target == node_id
    }
}

/// The persisted unit: a full node/edge set plus display flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FlowDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub live_mode: bool,
    #[serde(default)]
    pub auto_layout: bool,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl FlowDocument {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            description: None,
            nodes: Vec::new(),
            edges: Vec::new(),
            live_mode: false,
            auto_layout: false,
            updated_at: Utc::now(),
        }
    }
}

pub fn connection_node_id(connection_id: &str) -> String {
    format!("connection-{}", connection_id)
}

pub fn topic_node_id(topic_id: &str) -> String {
    format!("topic-{}", topic_id)
}

pub fn edge_id(source: &str, target: &str) -> String {
    format!("e-{}-{}", source, target)
}
