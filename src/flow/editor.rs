use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    catalog::{ConnectionInfo, TopicInfo},
    command::Outcome,
    flow::{
        graph::{GraphError, GraphModel},
        history::{HistoryManager, Snapshot},
        layout::apply_grid,
        model::{Edge, FlowDocument, Node, NodeData, NodeDataPatch, NodeType, Position},
        synth::synthesize,
    },
};

pub const DEFAULT_FLOW_NAME: &str = "Untitled diagram";

/// The editor is shared by the command surface, the realtime bridge and the
/// autosave task. Every mutator runs to completion under this lock.
pub type SharedEditor = Arc<Mutex<FlowEditor>>;

/// Structural-change notifications for renderers.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphChange {
    Structure,
    NodeData { node_id: String },
    Moved { node_id: String },
    LiveMode(bool),
    Loaded { flow_id: Option<String> },
    Reset,
}

/// Identity of the document currently open in the editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowMeta {
    pub id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<&FlowDocument> for FlowMeta {
    fn from(doc: &FlowDocument) -> Self {
        Self {
            id: doc.id.clone(),
            name: doc.name.clone(),
            description: doc.description.clone(),
            updated_at: doc.updated_at,
        }
    }
}

/// Live diagram state: the graph, its history and the document flags.
///
/// User gestures snapshot before they mutate and mark the document dirty.
/// Metric merges from the realtime bridge go through
/// [`FlowEditor::apply_metrics`], which does neither.
#[derive(Debug)]
pub struct FlowEditor {
    graph: GraphModel,
    history: HistoryManager,
    auto_layout: bool,
    current_flow: Option<FlowMeta>,
    has_unsaved_changes: bool,
    revision: u64,
    generation: u64,
    drag_active: bool,
    changes: broadcast::Sender<GraphChange>,
}

impl FlowEditor {
    pub fn new(live_mode: bool, auto_layout: bool) -> Self {
        let (changes, _) = broadcast::channel(128);
        Self {
            graph: GraphModel::new(live_mode),
            history: HistoryManager::new(),
            auto_layout,
            current_flow: None,
            has_unsaved_changes: false,
            revision: 0,
            generation: 0,
            drag_active: false,
            changes,
        }
    }

    pub fn shared(self) -> SharedEditor {
        Arc::new(Mutex::new(self))
    }

    pub fn graph(&self) -> &GraphModel {
        &self.graph
    }

    pub fn nodes(&self) -> &[Node] {
        self.graph.nodes()
    }

    pub fn edges(&self) -> &[Edge] {
        self.graph.edges()
    }

    pub fn live_mode(&self) -> bool {
        self.graph.live_mode()
    }

    pub fn auto_layout_enabled(&self) -> bool {
        self.auto_layout
    }

    pub fn current_flow(&self) -> Option<&FlowMeta> {
        self.current_flow.as_ref()
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.has_unsaved_changes
    }

    /// Bumped by every user edit; lets a save tell whether edits landed
    /// while it was in flight.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Bumped whenever a different document replaces the live one (load,
    /// open, new diagram). A save only records its result against the
    /// generation it started from.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GraphChange> {
        self.changes.subscribe()
    }

    fn notify(&self, change: GraphChange) {
        let _ = self.changes.send(change);
    }

    fn checkpoint(&mut self) {
        self.history.record(self.graph.snapshot());
    }

    fn touched(&mut self, change: GraphChange) {
        self.has_unsaved_changes = true;
        self.revision += 1;
        self.notify(change);
    }

    pub fn add_node(&mut self, node: Node) -> Result<(), GraphError> {
        let before = self.graph.snapshot();
        self.graph.add_node(node)?;
        self.history.record(before);
        self.touched(GraphChange::Structure);
        Ok(())
    }

    /// Palette drop. Returns the new node's id.
    pub fn create_node(&mut self, node_type: NodeType, position: Position) -> Result<String, GraphError> {
        let id = format!("{}-{}", node_type.as_str(), Uuid::new_v4());
        let data = NodeData::labeled(node_type.default_label());
        self.add_node(Node::new(id.clone(), node_type, position, data))?;
        debug!(node_id = %id, node_type = node_type.as_str(), "created node");
        Ok(id)
    }

    pub fn add_edge(&mut self, edge: Edge) -> Result<(), GraphError> {
        let before = self.graph.snapshot();
        self.graph.add_edge(edge)?;
        self.history.record(before);
        self.touched(GraphChange::Structure);
        Ok(())
    }

    /// Connect gesture between two existing nodes. Returns the edge id.
    pub fn connect(&mut self, source: &str, target: &str) -> Result<String, GraphError> {
        if source == target {
            return Err(GraphError::SelfLoop(source.to_string()));
        }
        if self.graph.connected(source, target) {
            return Err(GraphError::AlreadyConnected {
                source_id: source.to_string(),
                target_id: target.to_string(),
            });
        }
        let edge = Edge::between(source, target);
        let id = edge.id.clone();
        self.add_edge(edge)?;
        Ok(id)
    }

    /// Direct user edit of a node's data (label, color, ...). Live metric
    /// fields in `patch` are ignored.
    pub fn edit_node(&mut self, id: &str, patch: NodeDataPatch) -> bool {
        let patch = patch.into_user_edit();
        if self.graph.node(id).is_none() || patch.is_empty() {
            return false;
        }
        self.checkpoint();
        self.graph.update_node_data(id, patch);
        self.touched(GraphChange::NodeData { node_id: id.to_string() });
        true
    }

    /// Merge of externally observed metrics. No history, no dirty flag.
    pub fn apply_metrics(&mut self, id: &str, patch: NodeDataPatch) -> bool {
        if !self.graph.update_node_data(id, patch) {
            return false;
        }
        self.notify(GraphChange::NodeData { node_id: id.to_string() });
        true
    }

    pub fn set_monitored(&mut self, id: &str, monitored: bool) -> bool {
        match self.graph.node(id) {
            Some(node) if node.is_topic() => {}
            _ => return false,
        }
        self.edit_node(id, NodeDataPatch::new().with_monitored(monitored))
    }

    pub fn topic_id_of(&self, node_id: &str) -> Option<String> {
        self.graph
            .node(node_id)
            .filter(|n| n.is_topic())
            .and_then(|n| n.data.topic_id.clone())
    }

    /// Starts a drag; one snapshot covers the whole gesture.
    pub fn begin_drag(&mut self) {
        if !self.drag_active {
            self.checkpoint();
            self.drag_active = true;
        }
    }

    pub fn drag_to(&mut self, id: &str, position: Position) -> bool {
        if self.graph.node(id).is_none() {
            return false;
        }
        self.begin_drag();
        self.graph.move_node(id, position);
        self.notify(GraphChange::Moved { node_id: id.to_string() });
        true
    }

    pub fn end_drag(&mut self) {
        if self.drag_active {
            self.drag_active = false;
            self.touched(GraphChange::Structure);
        }
    }

    pub fn move_node(&mut self, id: &str, position: Position) -> bool {
        if self.graph.node(id).is_none() {
            return false;
        }
        self.checkpoint();
        self.graph.move_node(id, position);
        self.touched(GraphChange::Moved { node_id: id.to_string() });
        true
    }

    /// Selection is view state: not snapshotted, not dirtying.
    pub fn select(&mut self, id: &str, selected: bool) -> bool {
        self.graph.set_selected(id, selected)
    }

    pub fn clear_selection(&mut self) {
        self.graph.clear_selection();
    }

    pub fn delete_node(&mut self, id: &str) -> bool {
        if self.graph.node(id).is_none() {
            return false;
        }
        self.checkpoint();
        self.graph.delete_node(id);
        self.touched(GraphChange::Structure);
        true
    }

    pub fn delete_selected(&mut self) -> usize {
        if self.graph.selected_count() == 0 {
            return 0;
        }
        self.checkpoint();
        let removed = self.graph.delete_selected();
        self.touched(GraphChange::Structure);
        removed
    }

    pub fn delete_edge(&mut self, id: &str) -> bool {
        if self.graph.edge(id).is_none() {
            return false;
        }
        self.checkpoint();
        self.graph.delete_edge(id);
        self.touched(GraphChange::Structure);
        true
    }

    /// Only edge animation depends on live mode; subscriptions stay up.
    pub fn set_live_mode(&mut self, live_mode: bool) {
        if self.graph.live_mode() == live_mode {
            return;
        }
        self.graph.set_live_mode(live_mode);
        self.touched(GraphChange::LiveMode(live_mode));
    }

    pub fn set_auto_layout(&mut self, enabled: bool) {
        if self.auto_layout != enabled {
            self.auto_layout = enabled;
            self.touched(GraphChange::Structure);
        }
    }

    pub fn auto_layout(&mut self) -> Outcome {
        if self.graph.is_empty() {
            return Outcome::fail("There are no nodes to arrange");
        }
        self.checkpoint();
        apply_grid(self.graph.nodes_mut());
        self.touched(GraphChange::Structure);
        Outcome::ok("Nodes arranged on a grid")
            .with_counts(self.graph.nodes().len(), self.graph.edges().len())
    }

    /// Replaces the diagram with a topology built from the catalog.
    /// Leaves everything untouched when no topic is monitored.
    pub fn auto_generate(&mut self, topics: &[TopicInfo], connections: &[ConnectionInfo]) -> Outcome {
        let Some(topology) = synthesize(topics, connections, self.graph.live_mode()) else {
            return Outcome::fail("No monitored topics. Enable monitoring on at least one topic first.");
        };
        self.checkpoint();
        let (nodes_count, edges_count) = (topology.nodes.len(), topology.edges.len());
        self.graph.replace(topology.nodes, topology.edges);
        self.touched(GraphChange::Structure);
        info!(nodes_count, edges_count, "Generated topology from monitored topics");
        Outcome::ok(format!(
            "Generated {} nodes and {} edges from monitored topics",
            nodes_count, edges_count
        ))
        .with_counts(nodes_count, edges_count)
    }

    pub fn undo(&mut self) -> bool {
        if !self.history.can_undo() {
            return false;
        }
        match self.history.undo(self.graph.snapshot()) {
            Some(previous) => {
                self.restore(previous);
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        if !self.history.can_redo() {
            return false;
        }
        match self.history.redo(self.graph.snapshot()) {
            Some(next) => {
                self.restore(next);
                true
            }
            None => false,
        }
    }

    // Live counters of surviving nodes are kept; they are not user edits.
    fn restore(&mut self, mut snapshot: Snapshot) {
        for node in &mut snapshot.nodes {
            if let Some(live) = self.graph.node(&node.id) {
                node.data.carry_metrics_from(&live.data);
            }
        }
        self.graph.replace(snapshot.nodes, snapshot.edges);
        self.drag_active = false;
        self.touched(GraphChange::Structure);
    }

    /// Builds the persisted form of the live diagram.
    pub fn to_document(&self, name: Option<String>) -> FlowDocument {
        let meta = self.current_flow.as_ref();
        FlowDocument {
            id: meta.and_then(|m| m.id.clone()),
            name: name
                .or_else(|| meta.map(|m| m.name.clone()))
                .unwrap_or_else(|| DEFAULT_FLOW_NAME.to_string()),
            description: meta.and_then(|m| m.description.clone()),
            nodes: self.graph.nodes().to_vec(),
            edges: self.graph.edges().to_vec(),
            live_mode: self.graph.live_mode(),
            auto_layout: self.auto_layout,
            updated_at: Utc::now(),
        }
    }

    /// Replaces the diagram wholesale with a stored document.
    pub fn load_document(&mut self, document: FlowDocument) {
        let meta = FlowMeta::from(&document);
        self.graph.set_live_mode(document.live_mode);
        let dropped = self.graph.replace(document.nodes, document.edges);
        if dropped > 0 {
            info!(dropped, flow = %meta.name, "Discarded inconsistent elements while loading");
        }
        self.auto_layout = document.auto_layout;
        self.history.clear();
        self.drag_active = false;
        self.has_unsaved_changes = false;
        self.revision += 1;
        self.generation += 1;
        let flow_id = meta.id.clone();
        self.current_flow = Some(meta);
        self.notify(GraphChange::Loaded { flow_id });
    }

    /// Records a completed save taken at `revision` within `generation`.
    /// Returns `false` and changes nothing when another document was loaded
    /// meanwhile. The dirty flag only clears if nothing was edited since.
    pub fn mark_saved(&mut self, document: &FlowDocument, revision: u64, generation: u64) -> bool {
        if self.generation != generation {
            return false;
        }
        self.current_flow = Some(FlowMeta::from(document));
        if self.revision == revision {
            self.has_unsaved_changes = false;
        }
        true
    }

    /// "New diagram": forgets the in-memory document, not the stored one.
    pub fn new_diagram(&mut self) {
        self.graph.clear();
        self.history.clear();
        self.current_flow = None;
        self.has_unsaved_changes = false;
        self.drag_active = false;
        self.revision += 1;
        self.generation += 1;
        self.notify(GraphChange::Reset);
    }
}

impl Default for FlowEditor {
    fn default() -> Self {
        Self::new(true, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::status::Status;

    fn topic_info(id: &str, connection: &str, monitored: bool) -> TopicInfo {
        TopicInfo {
            id: id.into(),
            name: id.into(),
            connection_id: connection.into(),
            monitored,
            message_count: 0,
        }
    }

    fn connection(id: &str) -> ConnectionInfo {
        ConnectionInfo {
            id: id.into(),
            name: id.into(),
            address: "localhost:9092".into(),
            status: None,
        }
    }

    fn editor_with_graph() -> FlowEditor {
        let mut editor = FlowEditor::new(true, false);
        editor.auto_generate(
            &[topic_info("t1", "c1", true), topic_info("t2", "c1", true)],
            &[connection("c1")],
        );
        editor
    }

    #[test]
    fn gestures_snapshot_and_dirty() {
        let mut editor = FlowEditor::default();
        let id = editor.create_node(NodeType::Database, Position::new(5.0, 5.0)).unwrap();
        assert!(id.starts_with("database-"));
        assert_eq!(editor.nodes()[0].data.label, "Database");
        assert!(editor.can_undo());
        assert!(editor.has_unsaved_changes());
    }

    #[test]
    fn palette_topics_start_unmonitored() {
        let mut editor = FlowEditor::default();
        let id = editor.create_node(NodeType::Topic, Position::default()).unwrap();
        assert_eq!(editor.graph().node(&id).unwrap().data.status, Status::Unmonitored);
    }

    #[test]
    fn connect_rejects_bad_gestures() {
        let mut editor = editor_with_graph();
        assert!(matches!(editor.connect("topic-t1", "topic-t1"), Err(GraphError::SelfLoop(_))));
        assert!(matches!(
            editor.connect("connection-c1", "topic-t1"),
            Err(GraphError::AlreadyConnected { .. })
        ));
        assert!(matches!(
            editor.connect("topic-t1", "missing"),
            Err(GraphError::MissingEndpoint { .. })
        ));
        let id = editor.connect("topic-t1", "topic-t2").unwrap();
        assert_eq!(id, "e-topic-t1-topic-t2");
    }

    #[test]
    fn failed_gesture_leaves_history_alone() {
        let mut editor = editor_with_graph();
        let depth = editor.history().undo_len();
        let _ = editor.connect("topic-t1", "missing");
        assert_eq!(editor.history().undo_len(), depth);
    }

    #[test]
    fn undo_redo_walks_history() {
        let mut editor = editor_with_graph();
        let generated = editor.graph().snapshot();

        editor.delete_node("topic-t1");
        let after_delete = editor.graph().snapshot();

        assert!(editor.undo());
        assert_eq!(editor.graph().snapshot(), generated);
        assert!(editor.redo());
        assert_eq!(editor.graph().snapshot(), after_delete);
        assert!(!editor.redo());
    }

    #[test]
    fn new_gesture_clears_redo() {
        let mut editor = editor_with_graph();
        editor.delete_node("topic-t1");
        editor.undo();
        assert!(editor.can_redo());
        editor.move_node("topic-t2", Position::new(1.0, 1.0));
        assert!(!editor.can_redo());
    }

    #[test]
    fn undo_keeps_live_counters() {
        let mut editor = editor_with_graph();
        editor.auto_layout();
        editor.apply_metrics("topic-t1", NodeDataPatch::new().with_message_count(77));

        assert!(editor.undo());
        let t1 = editor.graph().node("topic-t1").unwrap();
        assert_eq!(t1.position, Position::new(400.0, 100.0));
        assert_eq!(t1.data.message_count, Some(77));
        assert_eq!(t1.data.status, Status::Active);
    }

    #[test]
    fn metrics_do_not_dirty_or_snapshot() {
        let mut editor = FlowEditor::default();
        let mut doc = FlowDocument::new("loaded");
        doc.nodes.push(Node::new("t", NodeType::Topic, Position::default(), NodeData::labeled("t")));
        editor.load_document(doc);

        assert!(editor.apply_metrics("t", NodeDataPatch::new().with_message_count(3)));
        assert!(!editor.has_unsaved_changes());
        assert!(!editor.can_undo());
        assert!(!editor.apply_metrics("ghost", NodeDataPatch::new().with_message_count(3)));
    }

    #[test]
    fn drag_is_one_history_entry() {
        let mut editor = editor_with_graph();
        let depth = editor.history().undo_len();
        editor.begin_drag();
        editor.drag_to("topic-t1", Position::new(10.0, 10.0));
        editor.drag_to("topic-t1", Position::new(20.0, 20.0));
        editor.end_drag();
        assert_eq!(editor.history().undo_len(), depth + 1);
        assert_eq!(editor.graph().node("topic-t1").unwrap().position, Position::new(20.0, 20.0));
    }

    #[test]
    fn auto_generate_without_monitored_topics_changes_nothing() {
        let mut editor = editor_with_graph();
        let before = editor.graph().snapshot();
        let depth = editor.history().undo_len();

        let outcome = editor.auto_generate(&[topic_info("t9", "c1", false)], &[connection("c1")]);
        assert!(!outcome.success);
        assert_eq!(editor.graph().snapshot(), before);
        assert_eq!(editor.history().undo_len(), depth);
    }

    #[test]
    fn auto_layout_on_empty_diagram_fails_softly() {
        let mut editor = FlowEditor::default();
        assert!(!editor.auto_layout().success);
        assert!(!editor.can_undo());
    }

    #[test]
    fn live_mode_toggle_stops_animation() {
        let mut editor = editor_with_graph();
        editor.apply_metrics("topic-t1", NodeDataPatch::new().with_message_count(1));
        assert!(editor.edges().iter().any(|e| e.animated));
        editor.set_live_mode(false);
        assert!(editor.edges().iter().all(|e| !e.animated));
    }

    #[test]
    fn load_clears_history_and_dirty_flag() {
        let mut editor = editor_with_graph();
        let mut doc = editor.to_document(Some("saved".into()));
        doc.id = Some("abc".into());
        doc.live_mode = false;

        editor.load_document(doc);
        assert!(!editor.can_undo());
        assert!(!editor.can_redo());
        assert!(!editor.has_unsaved_changes());
        assert!(!editor.live_mode());
        assert_eq!(editor.current_flow().unwrap().id.as_deref(), Some("abc"));
    }

    #[test]
    fn save_only_clears_dirty_when_revision_matches() {
        let mut editor = editor_with_graph();
        let doc = editor.to_document(None);
        let revision = editor.revision();
        editor.move_node("topic-t1", Position::new(0.0, 0.0));

        let generation = editor.generation();
        assert!(editor.mark_saved(&doc, revision, generation));
        assert!(editor.has_unsaved_changes());

        let revision = editor.revision();
        assert!(editor.mark_saved(&doc, revision, generation));
        assert!(!editor.has_unsaved_changes());
        assert_eq!(editor.current_flow().unwrap().name, DEFAULT_FLOW_NAME);
    }

    #[test]
    fn save_result_is_ignored_after_the_document_changed() {
        let mut editor = editor_with_graph();
        let mut doc = editor.to_document(Some("first".into()));
        doc.id = Some("first-id".into());
        let (revision, generation) = (editor.revision(), editor.generation());

        editor.new_diagram();
        assert!(!editor.mark_saved(&doc, revision, generation));
        assert!(editor.current_flow().is_none());
    }

    #[test]
    fn status_in_an_edit_is_not_stored() {
        let mut editor = editor_with_graph();
        let patch: NodeDataPatch = serde_json::from_value(serde_json::json!({"status": "error"})).unwrap();
        assert!(!editor.edit_node("topic-t1", patch));
        assert!(!editor.can_undo());

        let patch: NodeDataPatch =
            serde_json::from_value(serde_json::json!({"label": "orders", "status": "error"})).unwrap();
        assert!(editor.edit_node("topic-t1", patch));
        let node = editor.graph().node("topic-t1").unwrap();
        assert_eq!(node.data.label, "orders");
        assert!(!node.data.extra.contains_key("status"));

        let json = serde_json::to_string(&editor.to_document(None)).unwrap();
        let back: FlowDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(back.nodes, editor.nodes());
    }

    #[test]
    fn user_edits_to_health_are_undone() {
        let mut editor = FlowEditor::default();
        let id = editor.create_node(NodeType::Database, Position::default()).unwrap();
        let mut patch = NodeDataPatch::new();
        patch.health = Some("error".into());
        assert!(editor.edit_node(&id, patch));
        assert_eq!(editor.graph().node(&id).unwrap().data.status, Status::Error);

        assert!(editor.undo());
        let node = editor.graph().node(&id).unwrap();
        assert_eq!(node.data.health, None);
        assert_eq!(node.data.status, Status::Connected);
    }

    #[test]
    fn edits_cannot_write_live_metrics() {
        let mut editor = editor_with_graph();
        assert!(!editor.edit_node("topic-t1", NodeDataPatch::new().with_message_count(7)));
        assert_ne!(editor.graph().node("topic-t1").unwrap().data.message_count, Some(7));
    }

    #[test]
    fn change_notifications_are_published() {
        let mut editor = FlowEditor::default();
        let mut rx = editor.subscribe();
        editor.create_node(NodeType::Application, Position::default()).unwrap();
        editor.new_diagram();
        assert_eq!(rx.try_recv().unwrap(), GraphChange::Structure);
        assert_eq!(rx.try_recv().unwrap(), GraphChange::Reset);
        assert!(editor.nodes().is_empty());
    }
}
