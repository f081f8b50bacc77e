//! Status derivation for nodes and edges.
//!
//! Status is never stored as ground truth: every function here recomputes it
//! from the signals carried on a node (monitoring flag, counters, the last
//! reported connection status). Callers re-run these after any mutation that
//! could change a signal.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::flow::model::{Edge, Node, NodeData, NodeType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Active,
    #[default]
    Connected,
    Inactive,
    Unmonitored,
    Warning,
    Error,
    Connecting,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Active => "active",
            Status::Connected => "connected",
            Status::Inactive => "inactive",
            Status::Unmonitored => "unmonitored",
            Status::Warning => "warning",
            Status::Error => "error",
            Status::Connecting => "connecting",
        }
    }

    /// Fixed edge palette.
    pub fn color(&self) -> &'static str {
        match self {
            Status::Active => "#22c55e",
            Status::Connected => "#3b82f6",
            Status::Inactive => "#6b7280",
            Status::Unmonitored => "#9ca3af",
            Status::Warning => "#f59e0b",
            Status::Error => "#ef4444",
            Status::Connecting => "#a855f7",
        }
    }

    /// Statuses that animate an edge while live mode is on.
    pub fn is_flowing(&self) -> bool {
        matches!(self, Status::Active | Status::Connected)
    }

    /// Maps an externally reported status word onto the internal vocabulary.
    /// Unknown words yield `None` so the caller can pick its own fallback.
    pub fn from_signal(signal: &str) -> Option<Status> {
        match signal.trim().to_ascii_lowercase().as_str() {
            "active" => Some(Status::Active),
            "connected" | "online" | "healthy" | "ok" | "up" => Some(Status::Connected),
            "connecting" | "reconnecting" | "pending" => Some(Status::Connecting),
            "warning" | "degraded" => Some(Status::Warning),
            "error" | "failed" | "failure" => Some(Status::Error),
            "disconnected" | "inactive" | "idle" | "down" | "offline" => Some(Status::Inactive),
            "unmonitored" => Some(Status::Unmonitored),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Topic rule: unmonitored wins, then any traffic makes it active.
pub fn topic_status(data: &NodeData) -> Status {
    if !data.monitored {
        Status::Unmonitored
    } else if has_traffic(data) {
        Status::Active
    } else {
        Status::Connected
    }
}

/// Derives a node's status from its own signals.
pub fn node_status(node_type: NodeType, data: &NodeData) -> Status {
    match node_type {
        NodeType::Topic => topic_status(data),
        NodeType::Application => data
            .connection_status
            .as_deref()
            .and_then(Status::from_signal)
            .unwrap_or(Status::Connected),
        NodeType::ConsumerGroup | NodeType::Database => data
            .health
            .as_deref()
            .and_then(Status::from_signal)
            .unwrap_or(Status::Connected),
    }
}

fn has_traffic(data: &NodeData) -> bool {
    data.message_count.unwrap_or(0) > 0 || data.throughput.unwrap_or(0.0) > 0.0
}

/// Whether a node counts as carrying activity for the edge rule.
/// Only topics can be idle; every other node type is treated as active.
pub fn is_node_active(node: &Node) -> bool {
    match node.node_type {
        NodeType::Topic => has_traffic(&node.data),
        _ => true,
    }
}

/// Edge rule, first match wins.
pub fn edge_status(source: &Node, target: &Node) -> Status {
    let ends = [source, target];
    let either = |status: Status| ends.iter().any(|n| n.data.status == status);

    if either(Status::Error) {
        Status::Error
    } else if either(Status::Warning) {
        Status::Warning
    } else if either(Status::Connecting) {
        Status::Connecting
    } else if ends
        .iter()
        .any(|n| n.node_type == NodeType::Topic && n.data.status == Status::Unmonitored)
    {
        Status::Unmonitored
    } else if ends.iter().any(|n| !is_node_active(n)) {
        Status::Inactive
    } else {
        Status::Active
    }
}

pub fn edge_animated(status: Status, live_mode: bool) -> bool {
    live_mode && status.is_flowing()
}

/// Rewrites every derived field of `edge` from its two endpoints.
pub fn derive_edge(edge: &mut Edge, source: &Node, target: &Node, live_mode: bool) {
    let status = edge_status(source, target);
    edge.data.status = status;
    edge.data.color = status.color().to_string();
    edge.data.active = status == Status::Active;
    edge.animated = edge_animated(status, live_mode);
}
