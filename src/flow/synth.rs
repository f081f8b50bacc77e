//! Builds a fresh topology from the monitored topics and their connections.

use tracing::warn;

use crate::{
    catalog::{ConnectionInfo, TopicInfo},
    flow::{
        model::{connection_node_id, topic_node_id, Edge, Node, NodeData, NodeType, Position},
        status::{derive_edge, node_status},
    },
};

pub const APPLICATION_COLUMN_X: f64 = 100.0;
pub const TOPIC_COLUMN_X: f64 = 400.0;
pub const FIRST_ROW_Y: f64 = 100.0;
pub const TOPIC_ROW_SPACING: f64 = 100.0;
pub const GROUP_GAP: f64 = 50.0;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Topology {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

/// Lays out one application node per connection that owns at least one
/// monitored topic, with that connection's topics stacked to its right.
///
/// Returns `None` when nothing is monitored. Output depends only on the input
/// order, so the same catalog always yields the same ids and positions.
pub fn synthesize(topics: &[TopicInfo], connections: &[ConnectionInfo], live_mode: bool) -> Option<Topology> {
    // group by connection, first-seen order
    let mut groups: Vec<(&str, Vec<&TopicInfo>)> = Vec::new();
    for topic in topics.iter().filter(|t| t.monitored) {
        match groups.iter_mut().find(|(cid, _)| *cid == topic.connection_id) {
            Some((_, members)) => members.push(topic),
            None => groups.push((topic.connection_id.as_str(), vec![topic])),
        }
    }
    if groups.is_empty() {
        return None;
    }

    let mut topology = Topology::default();
    let mut y_offset = FIRST_ROW_Y;

    for (connection_id, members) in &groups {
        let app = application_node(connection_id, connections, y_offset);
        let app_id = app.id.clone();
        topology.nodes.push(app);

        for (index, topic) in members.iter().enumerate() {
            let position = Position::new(TOPIC_COLUMN_X, y_offset + index as f64 * TOPIC_ROW_SPACING);
            let node = topic_node(topic, position);
            topology.edges.push(Edge::between(&app_id, &node.id));
            topology.nodes.push(node);
        }

        y_offset += (members.len() as f64 + 1.0) * TOPIC_ROW_SPACING + GROUP_GAP;
    }

    for edge in &mut topology.edges {
        let source = topology.nodes.iter().find(|n| n.id == edge.source);
        let target = topology.nodes.iter().find(|n| n.id == edge.target);
        if let (Some(s), Some(t)) = (source, target) {
            derive_edge(edge, s, t, live_mode);
        }
    }

    Some(topology)
}

fn application_node(connection_id: &str, connections: &[ConnectionInfo], y: f64) -> Node {
    let mut data = NodeData::default();
    data.connection_id = Some(connection_id.to_string());
    match connections.iter().find(|c| c.id == connection_id) {
        Some(connection) => {
            data.label = connection.name.clone();
            data.sublabel = Some(connection.address.clone());
            data.connection_status = connection.status.clone();
        }
        None => {
            warn!(%connection_id, "monitored topic references an unknown connection");
            data.label = connection_id.to_string();
        }
    }

    let mut node = Node::new(
        connection_node_id(connection_id),
        NodeType::Application,
        Position::new(APPLICATION_COLUMN_X, y),
        data,
    );
    node.data.status = node_status(node.node_type, &node.data);
    node
}

fn topic_node(topic: &TopicInfo, position: Position) -> Node {
    let mut data = NodeData::labeled(topic.name.clone());
    data.topic_id = Some(topic.id.clone());
    data.topic_name = Some(topic.name.clone());
    data.message_count = Some(topic.message_count);
    data.monitored = topic.monitored;

    let mut node = Node::new(topic_node_id(&topic.id), NodeType::Topic, position, data);
    node.data.status = node_status(node.node_type, &node.data);
    node
}
