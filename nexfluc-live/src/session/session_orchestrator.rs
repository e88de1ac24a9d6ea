//! Session actor
//!
//! One tokio task per session owns all session state. A single `select!`
//! loop consumes:
//! - commands from the `SessionHandle` (transcript, messages, reconnect, status)
//! - debounce deadlines of the graph and insight streams
//! - derivation completions, tagged with (generation, epoch)
//!
//! Derivations run on spawned tasks and are never cancelled. A completion is
//! published only if its generation is the session's current generation and
//! its epoch is still the stream's current epoch.

use super::stream_state::{Publication, StreamController, StreamState};
use super::transcript_buffer::TranscriptBuffer;
use super::{GraphDeriver, InsightDeriver};
use crate::db::{save_detached, InsightSave, PersistedRecord, RecordSink};
use crate::types::{ConversationMessage, GraphSnapshot, InsightRecord, TranscriptEvent};
use chrono::{DateTime, Utc};
use nexfluc_common::config::PipelineSettings;
use nexfluc_common::events::{DerivationStream, EventBus, NexflucEvent};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, trace};
use uuid::Uuid;

const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// Session handle errors
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session {0} is closed")]
    Closed(Uuid),
}

/// Timing and trigger parameters shared by all sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub graph_debounce: Duration,
    pub insight_debounce: Duration,
    pub min_trigger_chars: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&PipelineSettings::default())
    }
}

impl From<&PipelineSettings> for SessionSettings {
    fn from(settings: &PipelineSettings) -> Self {
        Self {
            graph_debounce: Duration::from_millis(settings.graph_debounce_ms),
            insight_debounce: Duration::from_millis(settings.insight_debounce_ms),
            min_trigger_chars: settings.min_trigger_chars,
        }
    }
}

/// Collaborators injected into every session
#[derive(Clone)]
pub struct SessionDeps {
    pub graph: Arc<dyn GraphDeriver>,
    pub insight: Arc<dyn InsightDeriver>,
    /// Published insights are saved here when present
    pub sink: Option<Arc<dyn RecordSink>>,
    pub event_bus: EventBus,
    pub settings: SessionSettings,
}

/// Per-stream part of `SessionStatus`
#[derive(Debug, Clone, Serialize)]
pub struct StreamStatus {
    pub epoch: u64,
    pub state: StreamState,
    pub in_flight: usize,
}

impl From<&StreamController> for StreamStatus {
    fn from(stream: &StreamController) -> Self {
        Self {
            epoch: stream.epoch(),
            state: stream.state(),
            in_flight: stream.in_flight(),
        }
    }
}

/// Point-in-time view of a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub session_id: Uuid,
    pub generation: Uuid,
    pub created_at: DateTime<Utc>,
    pub committed_chars: usize,
    pub has_partial: bool,
    pub message_count: usize,
    pub graph: StreamStatus,
    pub insight: StreamStatus,
}

enum SessionCommand {
    Transcript(TranscriptEvent),
    Message(ConversationMessage),
    Reconnect { reply: oneshot::Sender<Uuid> },
    Status { reply: oneshot::Sender<SessionStatus> },
    InsightInput { reply: oneshot::Sender<String> },
    Close,
}

enum DerivationOutput {
    Graph(GraphSnapshot),
    Insight { record: InsightRecord, input: String },
}

struct DerivationDone {
    generation: Uuid,
    epoch: u64,
    output: DerivationOutput,
}

impl DerivationDone {
    fn stream(&self) -> DerivationStream {
        match self.output {
            DerivationOutput::Graph(_) => DerivationStream::Graph,
            DerivationOutput::Insight { .. } => DerivationStream::Insight,
        }
    }
}

/// Cloneable handle to a running session actor
#[derive(Clone)]
pub struct SessionHandle {
    id: Uuid,
    created_at: DateTime<Utc>,
    commands: mpsc::Sender<SessionCommand>,
    graph_rx: watch::Receiver<Option<Arc<GraphSnapshot>>>,
    insight_rx: watch::Receiver<Option<Arc<InsightRecord>>>,
}

impl SessionHandle {
    /// Spawn the actor for a new session
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(id: Uuid, deps: SessionDeps) -> Self {
        let (commands, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (graph_tx, graph_rx) = watch::channel(None);
        let (insight_tx, insight_rx) = watch::channel(None);
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let created_at = Utc::now();

        let settings = deps.settings;
        let actor = SessionActor {
            id,
            created_at,
            generation: Uuid::new_v4(),
            buffer: TranscriptBuffer::new(),
            messages: Vec::new(),
            graph: StreamController::new(
                DerivationStream::Graph,
                settings.graph_debounce,
                settings.min_trigger_chars,
            ),
            insight: StreamController::new(
                DerivationStream::Insight,
                settings.insight_debounce,
                settings.min_trigger_chars,
            ),
            graph_tx,
            insight_tx,
            done_tx,
            deps,
        };

        tokio::spawn(actor.run(command_rx, done_rx));

        Self {
            id,
            created_at,
            commands,
            graph_rx,
            insight_rx,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    async fn send(&self, command: SessionCommand) -> Result<(), SessionError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SessionError::Closed(self.id))
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(build(reply)).await?;
        rx.await.map_err(|_| SessionError::Closed(self.id))
    }

    pub async fn push_transcript(&self, event: TranscriptEvent) -> Result<(), SessionError> {
        self.send(SessionCommand::Transcript(event)).await
    }

    pub async fn push_message(&self, message: ConversationMessage) -> Result<(), SessionError> {
        self.send(SessionCommand::Message(message)).await
    }

    /// Disconnect/reconnect; returns the new generation id
    pub async fn reconnect(&self) -> Result<Uuid, SessionError> {
        self.request(|reply| SessionCommand::Reconnect { reply }).await
    }

    pub async fn status(&self) -> Result<SessionStatus, SessionError> {
        self.request(|reply| SessionCommand::Status { reply }).await
    }

    /// Committed transcript plus rendered conversation messages
    pub async fn insight_input(&self) -> Result<String, SessionError> {
        self.request(|reply| SessionCommand::InsightInput { reply }).await
    }

    /// Stop the actor; in-flight derivations finish and are dropped
    pub async fn close(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Close).await
    }

    pub fn latest_graph(&self) -> Option<Arc<GraphSnapshot>> {
        self.graph_rx.borrow().clone()
    }

    pub fn latest_insight(&self) -> Option<Arc<InsightRecord>> {
        self.insight_rx.borrow().clone()
    }

    pub fn subscribe_graph(&self) -> watch::Receiver<Option<Arc<GraphSnapshot>>> {
        self.graph_rx.clone()
    }

    pub fn subscribe_insight(&self) -> watch::Receiver<Option<Arc<InsightRecord>>> {
        self.insight_rx.clone()
    }
}

struct SessionActor {
    id: Uuid,
    created_at: DateTime<Utc>,
    generation: Uuid,
    buffer: TranscriptBuffer,
    messages: Vec<ConversationMessage>,
    graph: StreamController,
    insight: StreamController,
    graph_tx: watch::Sender<Option<Arc<GraphSnapshot>>>,
    insight_tx: watch::Sender<Option<Arc<InsightRecord>>>,
    done_tx: mpsc::UnboundedSender<DerivationDone>,
    deps: SessionDeps,
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

impl SessionActor {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<SessionCommand>,
        mut completions: mpsc::UnboundedReceiver<DerivationDone>,
    ) {
        info!(session_id = %self.id, generation = %self.generation, "Session started");
        self.emit(NexflucEvent::SessionConnected {
            session_id: self.id,
            generation: self.generation,
            timestamp: Utc::now(),
        });

        loop {
            let graph_deadline = self.graph.deadline();
            let insight_deadline = self.insight.deadline();

            tokio::select! {
                command = commands.recv() => match command {
                    Some(SessionCommand::Close) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(done) = completions.recv() => self.handle_completion(done),
                _ = sleep_until_opt(graph_deadline) => self.start_graph(),
                _ = sleep_until_opt(insight_deadline) => self.start_insight(),
            }
        }

        info!(session_id = %self.id, "Session closed");
        self.emit(NexflucEvent::SessionClosed {
            session_id: self.id,
            timestamp: Utc::now(),
        });
    }

    fn emit(&self, event: NexflucEvent) {
        let event_type = event.event_type();
        if self.deps.event_bus.emit(event).is_err() {
            trace!(session_id = %self.id, event_type, "No event subscribers");
        }
    }

    fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Transcript(event) => {
                let committed = matches!(event, TranscriptEvent::Committed { .. });
                self.buffer.apply(event);
                self.offer_graph();
                if committed {
                    self.offer_insight();
                }
            }
            SessionCommand::Message(message) => {
                self.messages.push(message);
                self.offer_insight();
            }
            SessionCommand::Reconnect { reply } => {
                self.reset();
                let _ = reply.send(self.generation);
            }
            SessionCommand::Status { reply } => {
                let _ = reply.send(self.status());
            }
            SessionCommand::InsightInput { reply } => {
                let _ = reply.send(self.insight_input());
            }
            SessionCommand::Close => {}
        }
    }

    fn insight_input(&self) -> String {
        let mut parts = Vec::with_capacity(self.messages.len() + 1);
        if !self.buffer.committed().is_empty() {
            parts.push(self.buffer.committed().to_string());
        }
        parts.extend(self.messages.iter().map(ConversationMessage::render));
        parts.join("\n")
    }

    fn offer_graph(&mut self) {
        let input = self.buffer.visible();
        if self.graph.offer(input, Instant::now()) {
            debug!(session_id = %self.id, epoch = self.graph.epoch(), "Graph derivation scheduled");
        }
    }

    fn offer_insight(&mut self) {
        let input = self.insight_input();
        if self.insight.offer(input, Instant::now()) {
            debug!(session_id = %self.id, epoch = self.insight.epoch(), "Insight derivation scheduled");
        }
    }

    fn start_graph(&mut self) {
        let Some((epoch, input)) = self.graph.fire() else {
            return;
        };
        debug!(session_id = %self.id, epoch, "Graph derivation started");

        let deriver = Arc::clone(&self.deps.graph);
        let previous = self.graph_tx.borrow().clone();
        let done_tx = self.done_tx.clone();
        let generation = self.generation;

        tokio::spawn(async move {
            let snapshot = deriver.derive_graph(&input, previous).await;
            let _ = done_tx.send(DerivationDone {
                generation,
                epoch,
                output: DerivationOutput::Graph(snapshot),
            });
        });
    }

    fn start_insight(&mut self) {
        let Some((epoch, input)) = self.insight.fire() else {
            return;
        };
        debug!(session_id = %self.id, epoch, "Insight derivation started");

        let deriver = Arc::clone(&self.deps.insight);
        let done_tx = self.done_tx.clone();
        let generation = self.generation;

        tokio::spawn(async move {
            let record = deriver.derive_insight(&input).await;
            let _ = done_tx.send(DerivationDone {
                generation,
                epoch,
                output: DerivationOutput::Insight { record, input },
            });
        });
    }

    fn handle_completion(&mut self, done: DerivationDone) {
        let stream = done.stream();
        let controller = match stream {
            DerivationStream::Graph => &mut self.graph,
            DerivationStream::Insight => &mut self.insight,
        };

        let publication = if done.generation == self.generation {
            controller.resolve(done.epoch)
        } else {
            Publication::Discarded {
                current_epoch: controller.epoch(),
            }
        };

        if let Publication::Discarded { current_epoch } = publication {
            debug!(
                session_id = %self.id,
                stream = %stream,
                epoch = done.epoch,
                current_epoch,
                stale_generation = done.generation != self.generation,
                "Derivation superseded, result discarded"
            );
            self.emit(NexflucEvent::DerivationDiscarded {
                session_id: self.id,
                stream,
                epoch: done.epoch,
                current_epoch,
                timestamp: Utc::now(),
            });
            return;
        }

        match done.output {
            DerivationOutput::Graph(snapshot) => self.publish_graph(done.epoch, snapshot),
            DerivationOutput::Insight { record, input } => {
                self.publish_insight(done.epoch, record, input)
            }
        }
    }

    fn publish_graph(&mut self, epoch: u64, mut snapshot: GraphSnapshot) {
        snapshot.epoch = epoch;
        let (node_count, edge_count) = (snapshot.nodes.len(), snapshot.edges.len());
        self.graph_tx.send_replace(Some(Arc::new(snapshot)));

        info!(session_id = %self.id, epoch, node_count, edge_count, "Graph published");
        self.emit(NexflucEvent::GraphPublished {
            session_id: self.id,
            epoch,
            node_count,
            edge_count,
            timestamp: Utc::now(),
        });
    }

    fn publish_insight(&mut self, epoch: u64, mut record: InsightRecord, input: String) {
        record.epoch = epoch;
        let similar_item_count = record.similar_items.len();
        let record = Arc::new(record);
        self.insight_tx.send_replace(Some(Arc::clone(&record)));

        info!(session_id = %self.id, epoch, similar_item_count, "Insight published");
        self.emit(NexflucEvent::InsightPublished {
            session_id: self.id,
            epoch,
            similar_item_count,
            timestamp: Utc::now(),
        });

        if let Some(sink) = &self.deps.sink {
            let graph = self.graph_tx.borrow().clone();
            let (nodes, edges) = graph
                .map(|g| (g.nodes.clone(), g.edges.clone()))
                .unwrap_or_default();
            save_detached(
                Arc::clone(sink),
                PersistedRecord::Insight(InsightSave {
                    session_id: self.id,
                    transcript: input,
                    record,
                    nodes,
                    edges,
                }),
            );
        }
    }

    fn reset(&mut self) {
        self.generation = Uuid::new_v4();
        self.buffer.clear();
        self.messages.clear();
        self.graph.reset();
        self.insight.reset();
        self.graph_tx.send_replace(None);
        self.insight_tx.send_replace(None);

        info!(session_id = %self.id, generation = %self.generation, "Session reset");
        self.emit(NexflucEvent::SessionReset {
            session_id: self.id,
            generation: self.generation,
            timestamp: Utc::now(),
        });
    }

    fn status(&self) -> SessionStatus {
        SessionStatus {
            session_id: self.id,
            generation: self.generation,
            created_at: self.created_at,
            committed_chars: self.buffer.committed().chars().count(),
            has_partial: self.buffer.partial().is_some(),
            message_count: self.messages.len(),
            graph: StreamStatus::from(&self.graph),
            insight: StreamStatus::from(&self.insight),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Entity, EntityKind, Speaker};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Graph deriver producing one node labelled with the input text
    struct EchoGraph {
        calls: AtomicUsize,
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl GraphDeriver for EchoGraph {
        async fn derive_graph(
            &self,
            text: &str,
            _previous: Option<Arc<GraphSnapshot>>,
        ) -> GraphSnapshot {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            GraphSnapshot {
                nodes: vec![Entity::new(text, EntityKind::Concept, 7, None)],
                ..Default::default()
            }
        }
    }

    struct EchoInsight;

    #[async_trait::async_trait]
    impl InsightDeriver for EchoInsight {
        async fn derive_insight(&self, text: &str) -> InsightRecord {
            InsightRecord {
                summary: text.to_string(),
                ..Default::default()
            }
        }
    }

    fn spawn_session(graph: Arc<EchoGraph>) -> SessionHandle {
        SessionHandle::spawn(
            Uuid::new_v4(),
            SessionDeps {
                graph,
                insight: Arc::new(EchoInsight),
                sink: None,
                event_bus: EventBus::new(100),
                settings: SessionSettings::default(),
            },
        )
    }

    fn echo_graph(delay_ms: u64) -> Arc<EchoGraph> {
        Arc::new(EchoGraph {
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(delay_ms),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_graph_published_after_debounce() {
        let session = spawn_session(echo_graph(10));
        session
            .push_transcript(TranscriptEvent::Committed {
                text: "Our startup Acme builds analytics".to_string(),
            })
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(session.latest_graph().is_none());

        tokio::time::sleep(Duration::from_millis(600)).await;
        let graph = session.latest_graph().unwrap();
        assert_eq!(graph.epoch, 1);
        assert_eq!(graph.nodes[0].label, "Our startup Acme builds analytics");
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_does_not_feed_insight_stream() {
        let session = spawn_session(echo_graph(0));
        session
            .push_transcript(TranscriptEvent::Partial {
                text: "a partial that is long enough".to_string(),
            })
            .await
            .unwrap();

        let status = session.status().await.unwrap();
        assert_eq!(status.graph.state, StreamState::Pending(1));
        assert_eq!(status.insight.state, StreamState::Idle);
        assert!(status.has_partial);
    }

    #[tokio::test(start_paused = true)]
    async fn test_messages_render_into_insight_input() {
        let session = spawn_session(echo_graph(0));
        session
            .push_transcript(TranscriptEvent::Committed {
                text: "We build tools.".to_string(),
            })
            .await
            .unwrap();
        session
            .push_message(ConversationMessage {
                source: Speaker::Ai,
                message: "Who is the customer?".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(
            session.insight_input().await.unwrap(),
            "We build tools.\nAI Agent: Who is the customer?"
        );

        tokio::time::sleep(Duration::from_millis(2100)).await;
        let insight = session.latest_insight().unwrap();
        assert_eq!(insight.epoch, 1);
        assert!(insight.summary.ends_with("Who is the customer?"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_session_rejects_commands() {
        let session = spawn_session(echo_graph(0));
        session.close().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let result = session.status().await;
        assert!(matches!(result, Err(SessionError::Closed(id)) if id == session.id()));
    }
}
