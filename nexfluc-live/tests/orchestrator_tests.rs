//! Session orchestration: debounce, supersession, reset and isolation
//!
//! Runs on a paused clock; derivation latency is controlled by the input
//! text (graph inputs starting with "slow" and insight inputs ending with
//! "slow" take five seconds).

use nexfluc_common::events::{DerivationStream, EventBus, NexflucEvent};
use nexfluc_live::db::{PersistedRecord, RecordSink};
use nexfluc_live::session::{
    GraphDeriver, InsightDeriver, SessionDeps, SessionHandle, SessionRegistry, SessionSettings,
    StreamState,
};
use nexfluc_live::types::{
    ConversationMessage, Entity, EntityKind, GraphSnapshot, InsightRecord, Speaker,
    TranscriptEvent,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::sleep;
use uuid::Uuid;

struct ScriptedGraph {
    calls: AtomicUsize,
}

#[async_trait::async_trait]
impl GraphDeriver for ScriptedGraph {
    async fn derive_graph(&self, text: &str, _previous: Option<Arc<GraphSnapshot>>) -> GraphSnapshot {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = if text.starts_with("slow") { 5000 } else { 10 };
        sleep(Duration::from_millis(delay)).await;
        GraphSnapshot {
            nodes: vec![Entity::new(text, EntityKind::Concept, 7, None)],
            ..Default::default()
        }
    }
}

struct ScriptedInsight;

#[async_trait::async_trait]
impl InsightDeriver for ScriptedInsight {
    async fn derive_insight(&self, text: &str) -> InsightRecord {
        let delay = if text.ends_with("slow") { 5000 } else { 10 };
        sleep(Duration::from_millis(delay)).await;
        InsightRecord {
            summary: text.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Default)]
struct MemorySink {
    records: Mutex<Vec<PersistedRecord>>,
}

#[async_trait::async_trait]
impl RecordSink for MemorySink {
    async fn save(&self, record: PersistedRecord) -> nexfluc_common::Result<()> {
        self.records.lock().unwrap().push(record);
        Ok(())
    }
}

struct Harness {
    graph: Arc<ScriptedGraph>,
    sink: Arc<MemorySink>,
    event_bus: EventBus,
}

impl Harness {
    fn new() -> Self {
        Self {
            graph: Arc::new(ScriptedGraph {
                calls: AtomicUsize::new(0),
            }),
            sink: Arc::new(MemorySink::default()),
            event_bus: EventBus::new(256),
        }
    }

    fn deps(&self) -> SessionDeps {
        SessionDeps {
            graph: self.graph.clone(),
            insight: Arc::new(ScriptedInsight),
            sink: Some(self.sink.clone()),
            event_bus: self.event_bus.clone(),
            settings: SessionSettings::default(),
        }
    }

    fn spawn(&self) -> SessionHandle {
        SessionHandle::spawn(Uuid::new_v4(), self.deps())
    }
}

fn partial(text: &str) -> TranscriptEvent {
    TranscriptEvent::Partial {
        text: text.to_string(),
    }
}

fn drain(rx: &mut broadcast::Receiver<NexflucEvent>) -> Vec<NexflucEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test(start_paused = true)]
async fn test_slow_stale_result_never_overwrites_newer_epoch() {
    let harness = Harness::new();
    let mut events = harness.event_bus.subscribe();
    let session = harness.spawn();

    // Epoch 1 fires at 1000 ms and resolves at 6000 ms
    session
        .push_transcript(partial("slow: our startup Acme builds things"))
        .await
        .unwrap();
    sleep(Duration::from_millis(1500)).await;

    // Epoch 2 fires at 2500 ms and resolves at 2510 ms
    session
        .push_transcript(partial("fast: Acme builds analytics for markets"))
        .await
        .unwrap();
    sleep(Duration::from_millis(1500)).await;

    let graph = session.latest_graph().unwrap();
    assert_eq!(graph.epoch, 2);
    assert_eq!(graph.nodes[0].label, "fast: Acme builds analytics for markets");

    sleep(Duration::from_millis(4000)).await;

    let graph = session.latest_graph().unwrap();
    assert_eq!(graph.epoch, 2, "stale epoch 1 must not be published");
    assert_eq!(harness.graph.calls.load(Ordering::SeqCst), 2);

    let discarded: Vec<_> = drain(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            NexflucEvent::DerivationDiscarded {
                stream,
                epoch,
                current_epoch,
                ..
            } => Some((stream, epoch, current_epoch)),
            _ => None,
        })
        .collect();
    assert_eq!(discarded, vec![(DerivationStream::Graph, 1, 2)]);
}

#[tokio::test(start_paused = true)]
async fn test_inputs_within_window_coalesce_into_one_derivation() {
    let harness = Harness::new();
    let session = harness.spawn();

    for text in [
        "we are building a startup",
        "we are building a startup for",
        "we are building a startup for analytics",
    ] {
        session.push_transcript(partial(text)).await.unwrap();
        sleep(Duration::from_millis(300)).await;
    }

    sleep(Duration::from_millis(1500)).await;

    assert_eq!(harness.graph.calls.load(Ordering::SeqCst), 1);
    let graph = session.latest_graph().unwrap();
    assert_eq!(graph.epoch, 3);
    assert_eq!(graph.nodes[0].label, "we are building a startup for analytics");
}

#[tokio::test(start_paused = true)]
async fn test_short_and_repeated_input_schedules_nothing() {
    let harness = Harness::new();
    let session = harness.spawn();

    session.push_transcript(partial("too short")).await.unwrap();
    sleep(Duration::from_millis(1500)).await;
    assert!(session.latest_graph().is_none());

    session
        .push_transcript(partial("long enough to qualify here"))
        .await
        .unwrap();
    sleep(Duration::from_millis(1500)).await;
    session
        .push_transcript(partial("long enough to qualify here"))
        .await
        .unwrap();
    sleep(Duration::from_millis(1500)).await;

    assert_eq!(harness.graph.calls.load(Ordering::SeqCst), 1);
    let status = session.status().await.unwrap();
    assert_eq!(status.graph.state, StreamState::Published(1));
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_discards_in_flight_results() {
    let harness = Harness::new();
    let mut events = harness.event_bus.subscribe();
    let session = harness.spawn();
    let initial = session.status().await.unwrap().generation;

    session
        .push_transcript(partial("slow: a derivation that outlives the connection"))
        .await
        .unwrap();
    sleep(Duration::from_millis(1500)).await;
    assert_eq!(
        session.status().await.unwrap().graph.state,
        StreamState::Deriving(1)
    );

    let generation = session.reconnect().await.unwrap();
    assert_ne!(generation, initial);

    sleep(Duration::from_millis(6000)).await;

    assert!(session.latest_graph().is_none());
    let status = session.status().await.unwrap();
    assert_eq!(status.generation, generation);
    assert_eq!(status.graph.epoch, 0);
    assert_eq!(status.graph.state, StreamState::Idle);
    assert_eq!(status.committed_chars, 0);

    let events = drain(&mut events);
    assert!(events
        .iter()
        .any(|e| matches!(e, NexflucEvent::SessionReset { generation: g, .. } if *g == generation)));
    assert!(events.iter().any(|e| matches!(
        e,
        NexflucEvent::DerivationDiscarded {
            epoch: 1,
            current_epoch: 0,
            ..
        }
    )));
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_clears_published_snapshots() {
    let harness = Harness::new();
    let session = harness.spawn();

    session
        .push_transcript(TranscriptEvent::Committed {
            text: "Our startup Acme builds analytics".to_string(),
        })
        .await
        .unwrap();
    sleep(Duration::from_millis(2500)).await;
    assert!(session.latest_graph().is_some());
    assert!(session.latest_insight().is_some());

    session.reconnect().await.unwrap();
    assert!(session.latest_graph().is_none());
    assert!(session.latest_insight().is_none());
    assert_eq!(session.insight_input().await.unwrap(), "");
}

#[tokio::test(start_paused = true)]
async fn test_sessions_are_isolated() {
    let harness = Harness::new();
    let registry = SessionRegistry::new(harness.deps());
    let a = registry.create().await;
    let b = registry.create().await;

    a.push_transcript(partial("only session a hears this text"))
        .await
        .unwrap();
    sleep(Duration::from_millis(1500)).await;

    assert_eq!(a.latest_graph().unwrap().epoch, 1);
    assert!(b.latest_graph().is_none());
    assert_eq!(b.status().await.unwrap().graph.epoch, 0);

    registry.remove(a.id()).await.unwrap();
    sleep(Duration::from_millis(10)).await;
    assert!(a.status().await.is_err());
    assert!(b.status().await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_published_insight_is_persisted_with_latest_graph() {
    let harness = Harness::new();
    let session = harness.spawn();

    session
        .push_transcript(TranscriptEvent::Committed {
            text: "Our startup Acme builds analytics".to_string(),
        })
        .await
        .unwrap();
    session
        .push_message(ConversationMessage {
            source: Speaker::User,
            message: "Who else does this?".to_string(),
        })
        .await
        .unwrap();

    // Graph publishes at ~1010 ms, insight at ~2010 ms
    sleep(Duration::from_millis(2500)).await;

    let insight = session.latest_insight().unwrap();
    assert_eq!(insight.epoch, 2);
    assert_eq!(
        insight.summary,
        "Our startup Acme builds analytics\nUser: Who else does this?"
    );

    let records = harness.sink.records.lock().unwrap();
    assert_eq!(records.len(), 1);
    match &records[0] {
        PersistedRecord::Insight(save) => {
            assert_eq!(save.session_id, session.id());
            assert_eq!(save.record.epoch, 2);
            assert_eq!(save.nodes.len(), 1);
            assert_eq!(save.transcript, insight.summary);
        }
        other => panic!("expected insight record, got {}", other.kind()),
    }
}

#[tokio::test(start_paused = true)]
async fn test_slow_stale_insight_is_neither_published_nor_persisted() {
    let harness = Harness::new();
    let mut events = harness.event_bus.subscribe();
    let session = harness.spawn();

    // Insight epoch 1 fires at 2000 ms and resolves at 7000 ms
    session
        .push_transcript(TranscriptEvent::Committed {
            text: "Our startup Acme builds analytics slow".to_string(),
        })
        .await
        .unwrap();
    sleep(Duration::from_millis(2500)).await;
    assert_eq!(
        session.status().await.unwrap().insight.state,
        StreamState::Deriving(1)
    );

    // Epoch 2 fires at 4500 ms and resolves at 4510 ms
    session
        .push_message(ConversationMessage {
            source: Speaker::User,
            message: "Answer this one fast".to_string(),
        })
        .await
        .unwrap();
    sleep(Duration::from_millis(2500)).await;
    assert_eq!(session.latest_insight().unwrap().epoch, 2);

    sleep(Duration::from_millis(3000)).await;

    let insight = session.latest_insight().unwrap();
    assert_eq!(insight.epoch, 2, "stale insight epoch 1 must not be published");
    assert!(insight.summary.ends_with("User: Answer this one fast"));

    let records = harness.sink.records.lock().unwrap();
    assert_eq!(records.len(), 1);
    match &records[0] {
        PersistedRecord::Insight(save) => assert_eq!(save.record.epoch, 2),
        other => panic!("expected insight record, got {}", other.kind()),
    }

    let discarded: Vec<_> = drain(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            NexflucEvent::DerivationDiscarded {
                stream,
                epoch,
                current_epoch,
                ..
            } => Some((stream, epoch, current_epoch)),
            _ => None,
        })
        .collect();
    assert_eq!(discarded, vec![(DerivationStream::Insight, 1, 2)]);
}
