use std::{
    fmt, fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{flow::model::FlowDocument, persistence::PersistenceError};

/// Backing store for saved diagrams.
#[async_trait]
pub trait FlowStore: Send + Sync {
    /// Stored documents, most recently updated first.
    async fn list(&self) -> Result<Vec<FlowDocument>, PersistenceError>;

    /// Stores a new document and returns it with its assigned id.
    async fn create(&self, document: FlowDocument) -> Result<FlowDocument, PersistenceError>;

    async fn update(&self, id: &str, document: FlowDocument) -> Result<FlowDocument, PersistenceError>;

    /// Removing an unknown id is not an error.
    async fn delete(&self, id: &str) -> Result<(), PersistenceError>;

    fn name(&self) -> &'static str;
}

impl fmt::Debug for dyn FlowStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowStore").field("impl", &self.name()).finish()
    }
}

fn newest_first(documents: &mut [FlowDocument]) {
    documents.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
}

#[derive(Debug, Default)]
pub struct InMemoryFlowStore {
    documents: DashMap<String, FlowDocument>,
}

impl InMemoryFlowStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[async_trait]
impl FlowStore for InMemoryFlowStore {
    async fn list(&self) -> Result<Vec<FlowDocument>, PersistenceError> {
        let mut documents: Vec<FlowDocument> = self.documents.iter().map(|e| e.value().clone()).collect();
        newest_first(&mut documents);
        Ok(documents)
    }

    async fn create(&self, mut document: FlowDocument) -> Result<FlowDocument, PersistenceError> {
        let id = Uuid::new_v4().to_string();
        document.id = Some(id.clone());
        document.updated_at = Utc::now();
        self.documents.insert(id, document.clone());
        Ok(document)
    }

    async fn update(&self, id: &str, mut document: FlowDocument) -> Result<FlowDocument, PersistenceError> {
        let mut slot = self
            .documents
            .get_mut(id)
            .ok_or_else(|| PersistenceError::NotFound(id.to_string()))?;
        document.id = Some(id.to_string());
        document.updated_at = Utc::now();
        *slot = document.clone();
        Ok(document)
    }

    async fn delete(&self, id: &str) -> Result<(), PersistenceError> {
        self.documents.remove(id);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "InMemoryFlowStore"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreFormat {
    #[default]
    Json,
    Yaml,
}

impl StoreFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            StoreFormat::Json => "json",
            StoreFormat::Yaml => "yaml",
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path
            .extension()
            .and_then(|os| os.to_str())
            .unwrap_or_default()
            .to_lowercase();
        match ext.as_str() {
            "json" => Some(StoreFormat::Json),
            "yaml" | "yml" => Some(StoreFormat::Yaml),
            _ => None,
        }
    }
}

/// Reads a document, choosing the parser by file extension.
pub fn read_document(path: &Path) -> Result<FlowDocument, PersistenceError> {
    let format = StoreFormat::from_path(path).ok_or_else(|| {
        PersistenceError::Serialization(format!(
            "unsupported extension on {} (expected .json, .yaml or .yml)",
            path.display()
        ))
    })?;
    let contents = fs::read_to_string(path)?;
    let document = match format {
        StoreFormat::Json => serde_json::from_str(&contents)?,
        StoreFormat::Yaml => serde_yaml_bw::from_str(&contents)?,
    };
    Ok(document)
}

/// Writes a document, choosing the serializer by file extension.
pub fn write_document(path: &Path, document: &FlowDocument) -> Result<(), PersistenceError> {
    let format = StoreFormat::from_path(path).ok_or_else(|| {
        PersistenceError::Serialization(format!(
            "unsupported extension on {} (expected .json, .yaml or .yml)",
            path.display()
        ))
    })?;
    let contents = match format {
        StoreFormat::Json => serde_json::to_string_pretty(document)?,
        StoreFormat::Yaml => serde_yaml_bw::to_string(document)?,
    };
    fs::write(path, contents)?;
    Ok(())
}

/// One file per document under `dir`, named `<id>.<ext>`.
#[derive(Debug, Clone)]
pub struct FileFlowStore {
    dir: PathBuf,
    format: StoreFormat,
}

impl FileFlowStore {
    pub fn new(dir: impl Into<PathBuf>, format: StoreFormat) -> Result<Arc<Self>, PersistenceError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Arc::new(Self { dir, format }))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", id, self.format.extension()))
    }

    /// Any file holding `id`, whatever format it was written in.
    fn existing_paths(&self, id: &str) -> Vec<PathBuf> {
        ["json", "yaml", "yml"]
            .iter()
            .map(|ext| self.dir.join(format!("{}.{}", id, ext)))
            .filter(|p| p.exists())
            .collect()
    }

    fn check_id(id: &str) -> Result<(), PersistenceError> {
        if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
            return Err(PersistenceError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl FlowStore for FileFlowStore {
    async fn list(&self) -> Result<Vec<FlowDocument>, PersistenceError> {
        let mut documents = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !path.is_file() || StoreFormat::from_path(&path).is_none() {
                continue;
            }
            match read_document(&path) {
                Ok(mut document) => {
                    if document.id.is_none() {
                        document.id = path.file_stem().and_then(|s| s.to_str()).map(str::to_string);
                    }
                    documents.push(document);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable flow file"),
            }
        }
        newest_first(&mut documents);
        Ok(documents)
    }

    async fn create(&self, mut document: FlowDocument) -> Result<FlowDocument, PersistenceError> {
        let id = Uuid::new_v4().to_string();
        document.id = Some(id.clone());
        document.updated_at = Utc::now();
        let path = self.path_for(&id);
        write_document(&path, &document)?;
        debug!(path = %path.display(), "created flow file");
        Ok(document)
    }

    async fn update(&self, id: &str, mut document: FlowDocument) -> Result<FlowDocument, PersistenceError> {
        Self::check_id(id)?;
        let existing = self.existing_paths(id);
        if existing.is_empty() {
            return Err(PersistenceError::NotFound(id.to_string()));
        }
        document.id = Some(id.to_string());
        document.updated_at = Utc::now();
        let path = self.path_for(id);
        write_document(&path, &document)?;
        // a format switch leaves the old file behind otherwise
        for stale in existing.into_iter().filter(|p| *p != path) {
            fs::remove_file(&stale)?;
        }
        Ok(document)
    }

    async fn delete(&self, id: &str) -> Result<(), PersistenceError> {
        Self::check_id(id)?;
        for path in self.existing_paths(id) {
            fs::remove_file(&path)?;
            debug!(path = %path.display(), "deleted flow file");
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "FileFlowStore"
    }
}
