// tests/realtime_test.rs
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use topoflow::catalog::{ConnectionInfo, InMemoryCatalog, TopicCatalog, TopicInfo};
use topoflow::command::Command;
use topoflow::config::EngineConfig;
use topoflow::context::FlowContext;
use topoflow::flow::editor::GraphChange;
use topoflow::flow::status::Status;
use topoflow::persistence::InMemoryFlowStore;
use topoflow::realtime::{EventBus, RealtimeEvent};

fn catalog() -> Arc<InMemoryCatalog> {
    InMemoryCatalog::new(
        vec![
            TopicInfo {
                id: "t1".into(),
                name: "orders".into(),
                connection_id: "c1".into(),
                monitored: true,
                message_count: 0,
            },
            TopicInfo {
                id: "t2".into(),
                name: "payments".into(),
                connection_id: "c1".into(),
                monitored: true,
                message_count: 0,
            },
        ],
        vec![ConnectionInfo {
            id: "c1".into(),
            name: "local".into(),
            address: "localhost:9092".into(),
            status: Some("connected".into()),
        }],
    )
}

async fn live_context() -> (Arc<FlowContext>, Arc<InMemoryCatalog>, EventBus) {
    let bus = EventBus::new(64);
    let catalog = catalog();
    let mut config = EngineConfig::default();
    config.autosave_enabled = false;
    let ctx = FlowContext::init(config, InMemoryFlowStore::new(), catalog.clone(), bus.clone()).await;
    ctx.attach(catalog.clone()).await;
    assert!(ctx.execute(Command::AutoGenerate).await.success);
    (ctx, catalog, bus)
}

async fn wait_until<F>(ctx: &FlowContext, mut check: F)
where
    F: FnMut(&topoflow::flow::editor::FlowEditor) -> bool,
{
    timeout(Duration::from_secs(2), async {
        loop {
            if check(&*ctx.editor().lock().await) {
                break;
            }
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("timed out waiting for the editor");
}

#[tokio::test]
async fn bus_events_reach_graph_and_catalog() {
    let (ctx, catalog, bus) = live_context().await;

    bus.publish(RealtimeEvent::TopicUpdated { topic_id: "t1".into(), message_count: 12 });
    wait_until(&ctx, |e| e.graph().node("topic-t1").and_then(|n| n.data.message_count) == Some(12)).await;

    let editor = ctx.editor().lock().await;
    assert_eq!(editor.graph().node("topic-t1").unwrap().data.status, Status::Active);
    let edge = editor.graph().edge("e-connection-c1-topic-t1").unwrap();
    assert!(edge.animated);
    drop(editor);

    timeout(Duration::from_secs(2), async {
        while catalog.topic("t1").await.map(|t| t.message_count) != Some(12) {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("catalog never caught up");

    ctx.dispose().await;
}

#[tokio::test]
async fn live_mode_off_stops_animation_but_keeps_subscription() {
    let (ctx, _catalog, bus) = live_context().await;

    assert!(ctx.execute(Command::SetLiveMode { enabled: false }).await.success);
    bus.publish(RealtimeEvent::MessageArrived { topic_name: "payments".into() });
    wait_until(&ctx, |e| e.graph().node("topic-t2").and_then(|n| n.data.message_count) == Some(1)).await;

    let editor = ctx.editor().lock().await;
    assert!(editor.edges().iter().all(|e| !e.animated));
    assert_eq!(
        editor.graph().edge("e-connection-c1-topic-t2").unwrap().data.status,
        Status::Active
    );
    drop(editor);
    ctx.dispose().await;
}

#[tokio::test]
async fn no_updates_after_dispose() {
    let (ctx, _catalog, bus) = live_context().await;
    ctx.dispose().await;
    ctx.dispose().await;

    bus.publish(RealtimeEvent::TopicUpdated { topic_id: "t1".into(), message_count: 99 });
    sleep(Duration::from_millis(30)).await;
    assert_eq!(
        ctx.editor().lock().await.graph().node("topic-t1").unwrap().data.message_count,
        Some(0)
    );
}

#[tokio::test]
async fn events_for_deleted_nodes_are_ignored() {
    let (ctx, _catalog, bus) = live_context().await;
    assert!(ctx.execute(Command::DeleteNode { node_id: "topic-t1".into() }).await.success);

    bus.publish(RealtimeEvent::TopicUpdated { topic_id: "t1".into(), message_count: 5 });
    bus.publish(RealtimeEvent::TopicUpdated { topic_id: "t2".into(), message_count: 6 });
    wait_until(&ctx, |e| e.graph().node("topic-t2").and_then(|n| n.data.message_count) == Some(6)).await;

    let editor = ctx.editor().lock().await;
    assert!(editor.graph().node("topic-t1").is_none());
    assert_eq!(editor.nodes().len(), 2);
    drop(editor);
    ctx.dispose().await;
}

#[tokio::test]
async fn connection_failure_turns_edges_red() {
    let (ctx, _catalog, bus) = live_context().await;
    let mut changes = ctx.editor().lock().await.subscribe();

    bus.publish(RealtimeEvent::ConnectionStatus {
        connection_id: "c1".into(),
        status: "failed".into(),
    });
    let change = timeout(Duration::from_secs(2), changes.recv()).await.unwrap().unwrap();
    assert_eq!(change, GraphChange::NodeData { node_id: "connection-c1".into() });

    let editor = ctx.editor().lock().await;
    assert!(editor.edges().iter().all(|e| e.data.status == Status::Error));
    drop(editor);
    ctx.dispose().await;
}

#[tokio::test]
async fn monitoring_toggle_round_trip() {
    let (ctx, catalog, _bus) = live_context().await;

    assert!(ctx.execute(Command::ToggleMonitoring { node_id: "topic-t2".into() }).await.success);
    assert!(!catalog.topics().await[1].monitored);
    assert_eq!(
        ctx.editor().lock().await.graph().node("topic-t2").unwrap().data.status,
        Status::Unmonitored
    );

    // regenerate now drops the unmonitored topic
    assert!(ctx.execute(Command::AutoGenerate).await.success);
    assert!(ctx.editor().lock().await.graph().node("topic-t2").is_none());

    assert!(ctx.execute(Command::Undo).await.success);
    assert!(ctx.editor().lock().await.graph().node("topic-t2").is_some());
    ctx.dispose().await;
}
