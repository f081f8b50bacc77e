// tests/flow_test.rs
use serde_json::json;
use topoflow::catalog::{ConnectionInfo, TopicInfo};
use topoflow::flow::editor::FlowEditor;
use topoflow::flow::graph::GraphModel;
use topoflow::flow::history::HISTORY_LIMIT;
use topoflow::flow::model::{Edge, Node, NodeData, NodeDataPatch, NodeType, Position};
use topoflow::flow::status::Status;

fn topic(id: &str, connection: &str, monitored: bool) -> TopicInfo {
    TopicInfo {
        id: id.into(),
        name: format!("{}-name", id),
        connection_id: connection.into(),
        monitored,
        message_count: 0,
    }
}

fn connection(id: &str) -> ConnectionInfo {
    ConnectionInfo {
        id: id.into(),
        name: format!("{} cluster", id),
        address: format!("{}:9092", id),
        status: None,
    }
}

fn generated_editor() -> FlowEditor {
    let mut editor = FlowEditor::new(true, false);
    let outcome = editor.auto_generate(
        &[
            topic("t1", "conn1", true),
            topic("t2", "conn1", true),
            topic("t3", "conn2", true),
            topic("t4", "conn3", false),
        ],
        &[connection("conn1"), connection("conn2"), connection("conn3")],
    );
    assert!(outcome.success);
    editor
}

#[test]
fn auto_generate_shape() {
    let editor = generated_editor();
    let topics = editor.nodes().iter().filter(|n| n.node_type == NodeType::Topic).count();
    let apps = editor.nodes().iter().filter(|n| n.node_type == NodeType::Application).count();
    assert_eq!((topics, apps), (3, 2));
    assert_eq!(editor.edges().len(), 3);
    assert!(editor.graph().node("connection-conn3").is_none());
}

#[test]
fn cascade_delete_leaves_no_dangling_edges() {
    let mut editor = generated_editor();
    editor.select("connection-conn1", true);
    editor.select("topic-t3", true);
    assert_eq!(editor.delete_selected(), 2);

    for deleted in ["connection-conn1", "topic-t3"] {
        assert!(editor.edges().iter().all(|e| !e.touches(deleted)));
    }
    assert!(editor.edges().is_empty());
    assert_eq!(editor.nodes().len(), 3);
}

#[test]
fn undo_symmetry_over_many_mutations() {
    let mut editor = FlowEditor::default();
    let a = editor.create_node(NodeType::Application, Position::new(0.0, 0.0)).unwrap();
    let b = editor.create_node(NodeType::Database, Position::new(300.0, 0.0)).unwrap();
    let before = editor.graph().snapshot();

    editor.connect(&a, &b).unwrap();
    editor.move_node(&a, Position::new(50.0, 50.0));
    editor.edit_node(&b, NodeDataPatch::new().with_label("orders-db"));
    editor.auto_layout();
    editor.delete_node(&a);

    for _ in 0..5 {
        assert!(editor.undo());
    }
    assert_eq!(editor.graph().snapshot(), before);
}

#[test]
fn undo_on_empty_history_changes_nothing() {
    let mut editor = FlowEditor::default();
    let before = editor.graph().snapshot();
    assert!(!editor.undo());
    assert!(!editor.redo());
    assert_eq!(editor.graph().snapshot(), before);
}

#[test]
fn history_is_capped() {
    let mut editor = FlowEditor::default();
    for i in 0..(HISTORY_LIMIT + 5) {
        editor
            .create_node(NodeType::Application, Position::new(i as f64, 0.0))
            .unwrap();
    }
    let mut undone = 0;
    while editor.undo() {
        undone += 1;
    }
    assert_eq!(undone, HISTORY_LIMIT);
    assert_eq!(editor.nodes().len(), 5);
}

#[test]
fn merge_patch_keeps_user_fields() {
    let mut graph = GraphModel::new(true);
    let mut data = NodeData::labeled("orders");
    data.color = Some("#ff0000".into());
    data.monitored = true;
    data.extra.insert("owner".into(), json!("team-a"));
    graph
        .add_node(Node::new("t", NodeType::Topic, Position::new(7.0, 8.0), data))
        .unwrap();

    assert!(graph.update_node_data("t", NodeDataPatch::new().with_message_count(42)));
    let node = graph.node("t").unwrap();
    assert_eq!(node.data.label, "orders");
    assert_eq!(node.data.color.as_deref(), Some("#ff0000"));
    assert_eq!(node.data.extra["owner"], json!("team-a"));
    assert_eq!(node.position, Position::new(7.0, 8.0));
    assert_eq!(node.data.message_count, Some(42));
    assert_eq!(node.data.status, Status::Active);
}

#[test]
fn error_endpoint_wins_edge_precedence() {
    let mut graph = GraphModel::new(true);
    let mut app = NodeData::labeled("app");
    app.connection_status = Some("error".into());
    graph
        .add_node(Node::new("app", NodeType::Application, Position::default(), app))
        .unwrap();
    let mut busy = NodeData::labeled("busy");
    busy.monitored = true;
    busy.message_count = Some(9);
    graph
        .add_node(Node::new("busy", NodeType::Topic, Position::default(), busy))
        .unwrap();
    graph.add_edge(Edge::between("app", "busy")).unwrap();

    assert_eq!(graph.node("busy").unwrap().data.status, Status::Active);
    let edge = &graph.edges()[0];
    assert_eq!(edge.data.status, Status::Error);
    assert_eq!(edge.data.color, Status::Error.color());
    assert!(!edge.animated);
}

#[test]
fn auto_layout_grid_positions() {
    let mut editor = generated_editor();
    assert!(editor.auto_layout().success);
    let positions: Vec<(f64, f64)> = editor.nodes().iter().map(|n| (n.position.x, n.position.y)).collect();
    assert_eq!(
        positions,
        vec![(100.0, 100.0), (350.0, 100.0), (600.0, 100.0), (850.0, 100.0), (100.0, 250.0)]
    );

    let once = editor.graph().snapshot();
    editor.auto_layout();
    assert_eq!(editor.graph().snapshot(), once);
}

#[test]
fn document_json_shape() {
    let editor = generated_editor();
    let doc = editor.to_document(Some("shape".into()));
    let value = serde_json::to_value(&doc).unwrap();

    assert_eq!(value["name"], "shape");
    assert_eq!(value["liveMode"], true);
    assert_eq!(value["nodes"][1]["type"], "topic");
    assert_eq!(value["nodes"][1]["data"]["topicId"], "t1");
    assert_eq!(value["edges"][0]["type"], "laser");
    assert_eq!(value["edges"][0]["data"]["status"], "inactive");
}
