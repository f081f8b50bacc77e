// src/command.rs

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{
    flow::{
        graph::GraphError,
        model::{NodeDataPatch, NodeType, Position},
    },
    persistence::PersistenceError,
};

/// Everything a user (or a script) can ask the engine to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Command {
    #[serde(rename_all = "camelCase")]
    CreateNode { node_type: NodeType, position: Position },

    Connect { source: String, target: String },

    #[serde(rename_all = "camelCase")]
    EditNode { node_id: String, patch: NodeDataPatch },

    #[serde(rename_all = "camelCase")]
    MoveNode { node_id: String, position: Position },

    #[serde(rename_all = "camelCase")]
    SelectNode { node_id: String, selected: bool },

    #[serde(rename_all = "camelCase")]
    DeleteNode { node_id: String },

    DeleteSelected,

    #[serde(rename_all = "camelCase")]
    DeleteEdge { edge_id: String },

    /// Flips monitoring on the catalog topic behind a topic node.
    #[serde(rename_all = "camelCase")]
    ToggleMonitoring { node_id: String },

    AutoLayout,
    AutoGenerate,
    Undo,
    Redo,

    SetLiveMode { enabled: bool },
    SetAutoLayout { enabled: bool },

    Save {
        #[serde(default)]
        name: Option<String>,
    },

    /// Loads the most recently updated stored diagram.
    Load,

    #[serde(rename_all = "camelCase")]
    Open { flow_id: String },

    #[serde(rename_all = "camelCase")]
    DeleteFlow { flow_id: String },

    NewDiagram,
}

impl Command {
    pub fn label(&self) -> &'static str {
        match self {
            Command::CreateNode { .. } => "createNode",
            Command::Connect { .. } => "connect",
            Command::EditNode { .. } => "editNode",
            Command::MoveNode { .. } => "moveNode",
            Command::SelectNode { .. } => "selectNode",
            Command::DeleteNode { .. } => "deleteNode",
            Command::DeleteSelected => "deleteSelected",
            Command::DeleteEdge { .. } => "deleteEdge",
            Command::ToggleMonitoring { .. } => "toggleMonitoring",
            Command::AutoLayout => "autoLayout",
            Command::AutoGenerate => "autoGenerate",
            Command::Undo => "undo",
            Command::Redo => "redo",
            Command::SetLiveMode { .. } => "setLiveMode",
            Command::SetAutoLayout { .. } => "setAutoLayout",
            Command::Save { .. } => "save",
            Command::Load => "load",
            Command::Open { .. } => "open",
            Command::DeleteFlow { .. } => "deleteFlow",
            Command::NewDiagram => "newDiagram",
        }
    }
}

/// User-facing result of a command. Failures are reported here rather than
/// raised, so a caller can always render `message`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edges_count: Option<usize>,
}

impl Outcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            nodes_count: None,
            edges_count: None,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            nodes_count: None,
            edges_count: None,
        }
    }

    pub fn with_counts(mut self, nodes: usize, edges: usize) -> Self {
        self.nodes_count = Some(nodes);
        self.edges_count = Some(edges);
        self
    }
}

impl From<GraphError> for Outcome {
    fn from(e: GraphError) -> Self {
        Outcome::fail(e.to_string())
    }
}

impl From<PersistenceError> for Outcome {
    fn from(e: PersistenceError) -> Self {
        Outcome::fail(e.to_string())
    }
}
