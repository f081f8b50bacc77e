// src/context.rs

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    catalog::TopicCatalog,
    command::{Command, Outcome},
    config::EngineConfig,
    flow::editor::{FlowEditor, SharedEditor},
    persistence::{Autosave, FlowStore, PersistenceGateway},
    realtime::{AggregateHandler, EventBus, RealtimeBridge, Subscription},
};

/// Owns one editor session and everything wired to it: the realtime
/// subscriptions, the persistence gateway and the autosave timer.
///
/// Built explicitly by the caller and torn down with [`FlowContext::dispose`].
#[derive(Debug)]
pub struct FlowContext {
    config: EngineConfig,
    editor: SharedEditor,
    catalog: Arc<dyn TopicCatalog>,
    bus: EventBus,
    gateway: Arc<PersistenceGateway>,
    bridge: Arc<RealtimeBridge>,
    subscriptions: Mutex<Vec<Subscription>>,
    bridge_attached: AtomicBool,
    autosave: Mutex<Option<Autosave>>,
    disposed: AtomicBool,
}

impl FlowContext {
    /// Wires the components without starting any task.
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn FlowStore>,
        catalog: Arc<dyn TopicCatalog>,
        bus: EventBus,
    ) -> Arc<Self> {
        let editor = FlowEditor::new(config.live_mode, config.auto_layout).shared();
        let gateway = PersistenceGateway::new(editor.clone(), store, config.autosave_enabled);
        let bridge = RealtimeBridge::new(editor.clone());
        Arc::new(Self {
            config,
            editor,
            catalog,
            bus,
            gateway,
            bridge,
            subscriptions: Mutex::new(Vec::new()),
            bridge_attached: AtomicBool::new(false),
            autosave: Mutex::new(None),
            disposed: AtomicBool::new(false),
        })
    }

    /// Builds the context, subscribes the graph to the bus and starts the
    /// autosave timer.
    pub async fn init(
        config: EngineConfig,
        store: Arc<dyn FlowStore>,
        catalog: Arc<dyn TopicCatalog>,
        bus: EventBus,
    ) -> Arc<Self> {
        let ctx = Self::new(config, store, catalog, bus);
        ctx.attach_realtime().await;
        ctx.start_autosave().await;
        info!(
            live_mode = ctx.config.live_mode,
            autosave_secs = ctx.config.autosave_secs,
            "Flow context initialised"
        );
        ctx
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn editor(&self) -> &SharedEditor {
        &self.editor
    }

    pub fn gateway(&self) -> &Arc<PersistenceGateway> {
        &self.gateway
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn catalog(&self) -> &Arc<dyn TopicCatalog> {
        &self.catalog
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Subscribes the graph bridge once; later calls are no-ops.
    pub async fn attach_realtime(&self) {
        if self.is_disposed() || self.bridge_attached.swap(true, Ordering::AcqRel) {
            return;
        }
        let subscription = self.bus.attach(self.bridge.clone());
        self.subscriptions.lock().await.push(subscription);
    }

    /// Subscribes another aggregate (e.g. a catalog) for the context's lifetime.
    pub async fn attach(&self, handler: Arc<dyn AggregateHandler>) {
        if self.is_disposed() {
            warn!(handler = handler.name(), "attach after dispose ignored");
            return;
        }
        let subscription = self.bus.attach(handler);
        self.subscriptions.lock().await.push(subscription);
    }

    pub async fn start_autosave(&self) {
        if self.is_disposed() {
            return;
        }
        let mut slot = self.autosave.lock().await;
        if slot.is_none() {
            *slot = Some(Autosave::spawn(self.gateway.clone(), self.config.autosave_period()));
        }
    }

    /// Runs one command against the session. Never panics on bad input;
    /// every failure comes back as an unsuccessful [`Outcome`].
    pub async fn execute(&self, command: Command) -> Outcome {
        debug!(command = command.label(), "executing command");
        match command {
            Command::CreateNode { node_type, position } => {
                match self.editor.lock().await.create_node(node_type, position) {
                    Ok(id) => Outcome::ok(format!("Created {} node {}", node_type.as_str(), id)),
                    Err(e) => e.into(),
                }
            }
            Command::Connect { source, target } => match self.editor.lock().await.connect(&source, &target) {
                Ok(id) => Outcome::ok(format!("Connected {} to {} ({})", source, target, id)),
                Err(e) => e.into(),
            },
            Command::EditNode { node_id, patch } => {
                if self.editor.lock().await.edit_node(&node_id, patch) {
                    Outcome::ok(format!("Updated {}", node_id))
                } else {
                    Outcome::fail(format!("Nothing to update on `{}`", node_id))
                }
            }
            Command::MoveNode { node_id, position } => {
                if self.editor.lock().await.move_node(&node_id, position) {
                    Outcome::ok(format!("Moved {}", node_id))
                } else {
                    Outcome::fail(format!("Node `{}` does not exist", node_id))
                }
            }
            Command::SelectNode { node_id, selected } => {
                if self.editor.lock().await.select(&node_id, selected) {
                    Outcome::ok(format!("{} {}", if selected { "Selected" } else { "Deselected" }, node_id))
                } else {
                    Outcome::fail(format!("Node `{}` does not exist", node_id))
                }
            }
            Command::DeleteNode { node_id } => {
                if self.editor.lock().await.delete_node(&node_id) {
                    Outcome::ok(format!("Deleted {}", node_id))
                } else {
                    Outcome::ok(format!("Node `{}` was already gone", node_id))
                }
            }
            Command::DeleteSelected => {
                let removed = self.editor.lock().await.delete_selected();
                Outcome::ok(format!("Deleted {} selected nodes", removed))
            }
            Command::DeleteEdge { edge_id } => {
                if self.editor.lock().await.delete_edge(&edge_id) {
                    Outcome::ok(format!("Deleted {}", edge_id))
                } else {
                    Outcome::ok(format!("Edge `{}` was already gone", edge_id))
                }
            }
            Command::ToggleMonitoring { node_id } => self.toggle_monitoring(&node_id).await,
            Command::AutoLayout => self.editor.lock().await.auto_layout(),
            Command::AutoGenerate => self.auto_generate().await,
            Command::Undo => {
                if self.editor.lock().await.undo() {
                    Outcome::ok("Undone")
                } else {
                    Outcome::fail("Nothing to undo")
                }
            }
            Command::Redo => {
                if self.editor.lock().await.redo() {
                    Outcome::ok("Redone")
                } else {
                    Outcome::fail("Nothing to redo")
                }
            }
            Command::SetLiveMode { enabled } => {
                self.editor.lock().await.set_live_mode(enabled);
                Outcome::ok(format!("Live mode {}", on_off(enabled)))
            }
            Command::SetAutoLayout { enabled } => {
                self.editor.lock().await.set_auto_layout(enabled);
                Outcome::ok(format!("Auto layout {}", on_off(enabled)))
            }
            Command::Save { name } => match self.gateway.save(name).await {
                Ok(saved) => Outcome::ok(format!("Saved \"{}\"", saved.name))
                    .with_counts(saved.nodes.len(), saved.edges.len()),
                Err(e) => e.into(),
            },
            Command::Load => match self.gateway.load_latest().await {
                Ok(doc) => Outcome::ok(format!("Loaded \"{}\"", doc.name)).with_counts(doc.nodes.len(), doc.edges.len()),
                Err(e) => e.into(),
            },
            Command::Open { flow_id } => match self.gateway.open(&flow_id).await {
                Ok(doc) => Outcome::ok(format!("Loaded \"{}\"", doc.name)).with_counts(doc.nodes.len(), doc.edges.len()),
                Err(e) => e.into(),
            },
            Command::DeleteFlow { flow_id } => match self.gateway.delete(&flow_id).await {
                Ok(true) => Outcome::ok(format!("Deleted {}; started a new diagram", flow_id)),
                Ok(false) => Outcome::ok(format!("Deleted {}", flow_id)),
                Err(e) => e.into(),
            },
            Command::NewDiagram => {
                self.gateway.new_diagram().await;
                Outcome::ok("Started a new diagram")
            }
        }
    }

    /// Flips monitoring on the catalog, then mirrors the new flag onto the
    /// topic node.
    pub async fn toggle_monitoring(&self, node_id: &str) -> Outcome {
        let Some(topic_id) = self.editor.lock().await.topic_id_of(node_id) else {
            return Outcome::fail(format!("`{}` is not a catalog topic", node_id));
        };

        let monitored = match self.catalog.toggle_monitoring(&topic_id).await {
            Ok(flag) => flag,
            Err(e) => {
                warn!(%topic_id, error = %e, "monitoring toggle rejected by catalog");
                return Outcome::fail(e.to_string());
            }
        };

        self.editor.lock().await.set_monitored(node_id, monitored);
        Outcome::ok(format!(
            "Monitoring {} for {}",
            if monitored { "enabled" } else { "disabled" },
            topic_id
        ))
    }

    /// Rebuilds the diagram from the catalog's monitored topics.
    pub async fn auto_generate(&self) -> Outcome {
        let topics = self.catalog.topics().await;
        let connections = self.catalog.connections().await;
        let outcome = self.editor.lock().await.auto_generate(&topics, &connections);
        if !outcome.success {
            info!(target: "flow_event", message = %outcome.message, "Auto-generate skipped");
        }
        outcome
    }

    /// Stops realtime delivery and the autosave timer. Safe to call twice;
    /// no bus event reaches the editor after this returns.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let subscriptions: Vec<Subscription> = self.subscriptions.lock().await.drain(..).collect();
        for subscription in &subscriptions {
            subscription.unsubscribe().await;
        }
        let autosave = self.autosave.lock().await.take();
        if let Some(autosave) = autosave {
            autosave.shutdown().await;
        }
        info!(subscriptions = subscriptions.len(), "Flow context disposed");
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled { "on" } else { "off" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        catalog::{ConnectionInfo, InMemoryCatalog, TopicInfo},
        flow::model::{NodeType, Position},
        persistence::InMemoryFlowStore,
    };

    fn catalog() -> Arc<InMemoryCatalog> {
        InMemoryCatalog::new(
            vec![TopicInfo {
                id: "t1".into(),
                name: "orders".into(),
                connection_id: "c1".into(),
                monitored: true,
                message_count: 0,
            }],
            vec![ConnectionInfo {
                id: "c1".into(),
                name: "local".into(),
                address: "localhost:9092".into(),
                status: None,
            }],
        )
    }

    fn context() -> Arc<FlowContext> {
        FlowContext::new(
            EngineConfig::default(),
            InMemoryFlowStore::new(),
            catalog(),
            EventBus::default(),
        )
    }

    #[tokio::test]
    async fn create_node_command_uses_typed_payload() {
        let ctx = context();
        let outcome = ctx
            .execute(Command::CreateNode {
                node_type: NodeType::ConsumerGroup,
                position: Position::new(10.0, 20.0),
            })
            .await;
        assert!(outcome.success);
        let editor = ctx.editor().lock().await;
        assert_eq!(editor.nodes()[0].node_type, NodeType::ConsumerGroup);
        assert_eq!(editor.nodes()[0].position, Position::new(10.0, 20.0));
    }

    #[tokio::test]
    async fn toggling_monitoring_updates_catalog_and_node() {
        let ctx = context();
        assert!(ctx.execute(Command::AutoGenerate).await.success);

        let outcome = ctx.toggle_monitoring("topic-t1").await;
        assert!(outcome.success, "{}", outcome.message);
        let editor = ctx.editor().lock().await;
        let node = editor.graph().node("topic-t1").unwrap();
        assert!(!node.data.monitored);
        assert_eq!(node.data.status, crate::flow::status::Status::Unmonitored);
        drop(editor);

        assert!(!ctx.catalog().topics().await[0].monitored);
        assert!(!ctx.toggle_monitoring("connection-c1").await.success);
    }

    #[tokio::test]
    async fn save_of_empty_diagram_is_a_soft_failure() {
        let ctx = context();
        let outcome = ctx.execute(Command::Save { name: None }).await;
        assert!(!outcome.success);
        assert!(outcome.message.contains("empty"));
    }

    #[tokio::test]
    async fn deleting_unknown_ids_is_not_an_error() {
        let ctx = context();
        assert!(ctx.execute(Command::DeleteNode { node_id: "ghost".into() }).await.success);
        assert!(ctx.execute(Command::DeleteEdge { edge_id: "ghost".into() }).await.success);
        assert!(!ctx.execute(Command::Undo).await.success);
    }

    #[tokio::test]
    async fn dispose_is_idempotent() {
        let ctx = FlowContext::init(
            EngineConfig::default(),
            InMemoryFlowStore::new(),
            catalog(),
            EventBus::default(),
        )
        .await;
        ctx.dispose().await;
        ctx.dispose().await;
        assert!(ctx.is_disposed());
    }
}
