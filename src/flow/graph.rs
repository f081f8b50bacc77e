use std::collections::HashSet;

use thiserror::Error;
use tracing::{debug, warn};

use crate::flow::{
    history::Snapshot,
    model::{Edge, Node, NodeDataPatch, NodeType, Position},
    status::{derive_edge, node_status},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("node `{0}` already exists")]
    DuplicateNode(String),

    #[error("edge `{0}` already exists")]
    DuplicateEdge(String),

    #[error("edge `{edge}` references unknown node `{node}`")]
    MissingEndpoint { edge: String, node: String },

    #[error("cannot connect node `{0}` to itself")]
    SelfLoop(String),

    #[error("`{source_id}` is already connected to `{target_id}`")]
    AlreadyConnected { source_id: String, target_id: String },
}

/// Owns the node and edge collections.
///
/// Every mutator keeps two things true on return: no edge references a
/// missing node, and every `status` (node and edge) matches what the status
/// rules derive from the current signals. Node order is preserved because
/// layout is positional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphModel {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    live_mode: bool,
}

impl GraphModel {
    pub fn new(live_mode: bool) -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            live_mode,
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn edge(&self, id: &str) -> Option<&Edge> {
        self.edges.iter().find(|e| e.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn live_mode(&self) -> bool {
        self.live_mode
    }

    /// Toggling live mode only changes edge animation.
    pub fn set_live_mode(&mut self, live_mode: bool) {
        if self.live_mode != live_mode {
            self.live_mode = live_mode;
            self.refresh_edges();
        }
    }

    pub fn add_node(&mut self, mut node: Node) -> Result<(), GraphError> {
        if self.node(&node.id).is_some() {
            return Err(GraphError::DuplicateNode(node.id));
        }
        node.data.status = node_status(node.node_type, &node.data);
        self.nodes.push(node);
        Ok(())
    }

    pub fn add_edge(&mut self, mut edge: Edge) -> Result<(), GraphError> {
        if self.edge(&edge.id).is_some() {
            return Err(GraphError::DuplicateEdge(edge.id));
        }
        let (source, target) = match (self.node(&edge.source), self.node(&edge.target)) {
            (Some(s), Some(t)) => (s, t),
            (None, _) => {
                return Err(GraphError::MissingEndpoint {
                    node: edge.source.clone(),
                    edge: edge.id,
                });
            }
            (_, None) => {
                return Err(GraphError::MissingEndpoint {
                    node: edge.target.clone(),
                    edge: edge.id,
                });
            }
        };
        derive_edge(&mut edge, source, target, self.live_mode);
        self.edges.push(edge);
        Ok(())
    }

    /// Merges `patch` into the node's data, then re-derives the node's status
    /// and the status of every edge touching it. Returns `false` when the node
    /// does not exist.
    pub fn update_node_data(&mut self, id: &str, patch: NodeDataPatch) -> bool {
        let Some(node) = self.nodes.iter_mut().find(|n| n.id == id) else {
            return false;
        };
        node.data.apply(patch);
        node.data.status = node_status(node.node_type, &node.data);
        self.refresh_edges_touching(id);
        true
    }

    pub fn move_node(&mut self, id: &str, position: Position) -> bool {
        match self.nodes.iter_mut().find(|n| n.id == id) {
            Some(node) => {
                node.position = position;
                true
            }
            None => false,
        }
    }

    pub fn set_selected(&mut self, id: &str, selected: bool) -> bool {
        match self.nodes.iter_mut().find(|n| n.id == id) {
            Some(node) => {
                node.selected = selected;
                true
            }
            None => false,
        }
    }

    pub fn clear_selection(&mut self) {
        for node in &mut self.nodes {
            node.selected = false;
        }
    }

    pub fn selected_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.selected).count()
    }

    /// Removes the node and every edge touching it in one step.
    pub fn delete_node(&mut self, id: &str) -> bool {
        let before = self.nodes.len();
        self.nodes.retain(|n| n.id != id);
        if self.nodes.len() == before {
            return false;
        }
        self.edges.retain(|e| !e.touches(id));
        true
    }

    /// Removes all selected nodes plus their edges; returns how many nodes went.
    pub fn delete_selected(&mut self) -> usize {
        let doomed: HashSet<String> = self
            .nodes
            .iter()
            .filter(|n| n.selected)
            .map(|n| n.id.clone())
            .collect();
        if doomed.is_empty() {
            return 0;
        }
        self.nodes.retain(|n| !doomed.contains(&n.id));
        self.edges
            .retain(|e| !doomed.contains(&e.source) && !doomed.contains(&e.target));
        doomed.len()
    }

    pub fn delete_edge(&mut self, id: &str) -> bool {
        let before = self.edges.len();
        self.edges.retain(|e| e.id != id);
        self.edges.len() != before
    }

    pub fn connected(&self, source: &str, target: &str) -> bool {
        self.edges
            .iter()
            .any(|e| e.source == source && e.target == target)
    }

    /// Swaps in a whole new node/edge set.
    ///
    /// Duplicate ids keep their first occurrence and edges pointing at
    /// missing nodes are dropped, so a damaged document still loads into a
    /// consistent model. Returns the number of discarded elements.
    pub fn replace(&mut self, nodes: Vec<Node>, edges: Vec<Edge>) -> usize {
        let mut discarded = 0;
        let mut seen = HashSet::new();
        self.nodes = nodes
            .into_iter()
            .filter(|n| {
                let fresh = seen.insert(n.id.clone());
                if !fresh {
                    warn!(node_id = %n.id, "dropping duplicate node");
                    discarded += 1;
                }
                fresh
            })
            .collect();

        let mut seen_edges = HashSet::new();
        let known: HashSet<&str> = self.nodes.iter().map(|n| n.id.as_str()).collect();
        let kept: Vec<Edge> = edges
            .into_iter()
            .filter(|e| {
                if !known.contains(e.source.as_str()) || !known.contains(e.target.as_str()) {
                    warn!(edge_id = %e.id, source = %e.source, target = %e.target, "dropping dangling edge");
                    discarded += 1;
                    false
                } else if !seen_edges.insert(e.id.clone()) {
                    warn!(edge_id = %e.id, "dropping duplicate edge");
                    discarded += 1;
                    false
                } else {
                    true
                }
            })
            .collect();
        self.edges = kept;
        self.refresh_statuses();
        discarded
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.edges.clear();
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
        }
    }

    pub fn nodes_mut(&mut self) -> &mut [Node] {
        &mut self.nodes
    }

    /// Re-derives every node and edge status.
    pub fn refresh_statuses(&mut self) {
        for node in &mut self.nodes {
            node.data.status = node_status(node.node_type, &node.data);
        }
        self.refresh_edges();
    }

    fn refresh_edges(&mut self) {
        let nodes = &self.nodes;
        let live_mode = self.live_mode;
        for edge in &mut self.edges {
            refresh_edge(edge, nodes, live_mode);
        }
    }

    fn refresh_edges_touching(&mut self, node_id: &str) {
        let nodes = &self.nodes;
        let live_mode = self.live_mode;
        for edge in self.edges.iter_mut().filter(|e| e.touches(node_id)) {
            refresh_edge(edge, nodes, live_mode);
        }
    }

    /// Topic nodes matching a topic id, or by name when no id is available.
    pub fn find_topics(&self, topic_id: Option<&str>, topic_name: Option<&str>) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|n| n.node_type == NodeType::Topic)
            .filter(|n| match (topic_id, topic_name) {
                (Some(id), _) => n.data.topic_id.as_deref() == Some(id),
                (None, Some(name)) => {
                    n.data.topic_name.as_deref() == Some(name)
                        || (n.data.topic_name.is_none() && n.data.label == name)
                }
                (None, None) => false,
            })
            .map(|n| n.id.clone())
            .collect()
    }

    pub fn find_connection(&self, connection_id: &str) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|n| n.node_type == NodeType::Application)
            .filter(|n| n.data.connection_id.as_deref() == Some(connection_id))
            .map(|n| n.id.clone())
            .collect()
    }
}

fn refresh_edge(edge: &mut Edge, nodes: &[Node], live_mode: bool) {
    let source = nodes.iter().find(|n| n.id == edge.source);
    let target = nodes.iter().find(|n| n.id == edge.target);
    match (source, target) {
        (Some(s), Some(t)) => derive_edge(edge, s, t, live_mode),
        _ => debug!(edge_id = %edge.id, "edge endpoint missing during refresh"),
    }
}
