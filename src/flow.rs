// src/flow.rs

pub mod editor;
pub mod graph;
pub mod history;
pub mod layout;
pub mod model;
pub mod status;
pub mod synth;

pub use editor::{FlowEditor, FlowMeta, GraphChange, SharedEditor};
pub use graph::{GraphError, GraphModel};
pub use history::{HistoryManager, Snapshot, HISTORY_LIMIT};
pub use model::{Edge, FlowDocument, Node, NodeData, NodeDataPatch, NodeType, Position};
pub use status::Status;
pub use synth::{synthesize, Topology};
