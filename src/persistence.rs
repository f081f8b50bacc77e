// src/persistence.rs

pub mod autosave;
pub mod gateway;
pub mod store;

use thiserror::Error;

pub use autosave::Autosave;
pub use gateway::{AutosaveOutcome, PersistenceGateway};
pub use store::{read_document, write_document, FileFlowStore, FlowStore, InMemoryFlowStore, StoreFormat};

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Cannot save an empty diagram. Add at least one node first.")]
    EmptyDiagram,

    #[error("A save is already in progress")]
    SaveInProgress,

    #[error("No saved diagrams found")]
    NothingSaved,

    #[error("flow `{0}` not found")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("store error: {0}")]
    Store(String),
}

impl From<serde_json::Error> for PersistenceError {
    fn from(e: serde_json::Error) -> Self {
        PersistenceError::Serialization(format!("JSON: {}", e))
    }
}

impl From<serde_yaml_bw::Error> for PersistenceError {
    fn from(e: serde_yaml_bw::Error) -> Self {
        PersistenceError::Serialization(format!("YAML: {}", e))
    }
}
