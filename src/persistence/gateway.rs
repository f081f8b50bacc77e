use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::{
    flow::{editor::SharedEditor, model::FlowDocument},
    persistence::{store::FlowStore, PersistenceError},
};

/// What one autosave tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum AutosaveOutcome {
    Disabled,
    Empty,
    Busy,
    Saved { flow_id: String },
    Failed(String),
}

/// Clears the in-flight flag however the save ends.
struct SavingGuard<'a>(&'a AtomicBool);

impl Drop for SavingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Moves documents between the editor and a [`FlowStore`].
///
/// At most one save is in flight at any time; a second caller gets
/// [`PersistenceError::SaveInProgress`] instead of queueing. The editor stays
/// editable while a write is pending.
#[derive(Debug)]
pub struct PersistenceGateway {
    editor: SharedEditor,
    store: Arc<dyn FlowStore>,
    saving: AtomicBool,
    autosave_enabled: AtomicBool,
    last_autosave_at: RwLock<Option<DateTime<Utc>>>,
}

impl PersistenceGateway {
    pub fn new(editor: SharedEditor, store: Arc<dyn FlowStore>, autosave_enabled: bool) -> Arc<Self> {
        Arc::new(Self {
            editor,
            store,
            saving: AtomicBool::new(false),
            autosave_enabled: AtomicBool::new(autosave_enabled),
            last_autosave_at: RwLock::new(None),
        })
    }

    pub fn editor(&self) -> &SharedEditor {
        &self.editor
    }

    pub fn store(&self) -> &Arc<dyn FlowStore> {
        &self.store
    }

    pub fn is_saving(&self) -> bool {
        self.saving.load(Ordering::Acquire)
    }

    /// Saves the live diagram, creating the stored document on first save and
    /// updating it afterwards.
    pub async fn save(&self, name: Option<String>) -> Result<FlowDocument, PersistenceError> {
        if self
            .saving
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(PersistenceError::SaveInProgress);
        }
        let _guard = SavingGuard(&self.saving);

        // 1) capture the document under the lock
        let (document, revision, generation) = {
            let editor = self.editor.lock().await;
            if editor.graph().is_empty() {
                return Err(PersistenceError::EmptyDiagram);
            }
            (editor.to_document(name), editor.revision(), editor.generation())
        };

        // 2) write without holding the editor
        let saved = match document.id.clone() {
            Some(id) => match self.store.update(&id, document.clone()).await {
                Err(PersistenceError::NotFound(_)) => {
                    info!(flow_id = %id, "stored flow vanished; saving as a new document");
                    let mut fresh = document;
                    fresh.id = None;
                    self.store.create(fresh).await
                }
                other => other,
            },
            None => self.store.create(document).await,
        }
        .inspect_err(|e| error!(store = self.store.name(), error = %e, "save failed"))?;

        // 3) record the result, unless another document was opened meanwhile
        if !self.editor.lock().await.mark_saved(&saved, revision, generation) {
            info!(
                flow_id = saved.id.as_deref().unwrap_or_default(),
                "Live document changed during save; not re-binding the editor"
            );
        }
        info!(
            target: "flow_event",
            flow_id = saved.id.as_deref().unwrap_or_default(),
            name = %saved.name,
            nodes = saved.nodes.len(),
            edges = saved.edges.len(),
            "Saved flow"
        );
        Ok(saved)
    }

    /// Replaces the live diagram with `document` and clears history.
    pub async fn load(&self, document: FlowDocument) {
        info!(
            target: "flow_event",
            flow_id = document.id.as_deref().unwrap_or_default(),
            name = %document.name,
            nodes = document.nodes.len(),
            "Loaded flow"
        );
        self.editor.lock().await.load_document(document);
    }

    pub async fn list(&self) -> Result<Vec<FlowDocument>, PersistenceError> {
        self.store.list().await
    }

    pub async fn open(&self, id: &str) -> Result<FlowDocument, PersistenceError> {
        let document = self
            .store
            .list()
            .await?
            .into_iter()
            .find(|d| d.id.as_deref() == Some(id))
            .ok_or_else(|| PersistenceError::NotFound(id.to_string()))?;
        self.load(document.clone()).await;
        Ok(document)
    }

    /// Loads the most recently updated stored document.
    pub async fn load_latest(&self) -> Result<FlowDocument, PersistenceError> {
        let document = self
            .store
            .list()
            .await?
            .into_iter()
            .next()
            .ok_or(PersistenceError::NothingSaved)?;
        self.load(document.clone()).await;
        Ok(document)
    }

    /// Removes a stored document. Returns whether the live diagram was reset
    /// because it was the one deleted.
    pub async fn delete(&self, id: &str) -> Result<bool, PersistenceError> {
        self.store
            .delete(id)
            .await
            .inspect_err(|e| error!(flow_id = %id, error = %e, "delete failed"))?;

        let mut editor = self.editor.lock().await;
        let is_current = editor
            .current_flow()
            .and_then(|f| f.id.as_deref())
            .is_some_and(|current| current == id);
        if is_current {
            editor.new_diagram();
        }
        info!(target: "flow_event", flow_id = %id, reset = is_current, "Deleted flow");
        Ok(is_current)
    }

    pub async fn new_diagram(&self) {
        self.editor.lock().await.new_diagram();
    }

    pub fn autosave_enabled(&self) -> bool {
        self.autosave_enabled.load(Ordering::Acquire)
    }

    pub fn set_autosave(&self, enabled: bool) {
        self.autosave_enabled.store(enabled, Ordering::Release);
        info!(enabled, "Autosave toggled");
    }

    pub fn toggle_autosave(&self) -> bool {
        let enabled = !self.autosave_enabled.fetch_xor(true, Ordering::AcqRel);
        info!(enabled, "Autosave toggled");
        enabled
    }

    pub async fn last_autosave_at(&self) -> Option<DateTime<Utc>> {
        *self.last_autosave_at.read().await
    }

    /// One autosave attempt. Never returns an error: failures are logged and
    /// the next tick simply tries again.
    pub async fn autosave_tick(&self) -> AutosaveOutcome {
        if !self.autosave_enabled() {
            return AutosaveOutcome::Disabled;
        }
        if self.is_saving() {
            return AutosaveOutcome::Busy;
        }
        if self.editor.lock().await.graph().is_empty() {
            return AutosaveOutcome::Empty;
        }

        match self.save(None).await {
            Ok(saved) => {
                let now = Utc::now();
                *self.last_autosave_at.write().await = Some(now);
                let flow_id = saved.id.unwrap_or_default();
                info!(target: "flow_event", %flow_id, at = %now, "Autosaved flow");
                AutosaveOutcome::Saved { flow_id }
            }
            Err(PersistenceError::SaveInProgress) => AutosaveOutcome::Busy,
            Err(PersistenceError::EmptyDiagram) => AutosaveOutcome::Empty,
            Err(e) => {
                warn!(error = %e, "Autosave failed; retrying on the next tick");
                AutosaveOutcome::Failed(e.to_string())
            }
        }
    }
}
