//! Session controller: owns one streaming attempt end to end.
//!
//! `Idle -> Requesting -> Streaming -> {Completed | Failed | Cancelled}`.
//! Each submit spawns a task that drives transport chunks through the
//! decoder, framer, classifier and timeline, and delivers changes to a
//! [`RenderSink`]. A newer submit or an explicit cancel makes the older
//! session's callbacks no-ops.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::StreamExt as _;
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;
use tracing::{Instrument as _, debug, info, warn};

use crate::config::ClientConfig;
use crate::decode::ChunkDecoder;
use crate::delivery::{DEFAULT_COALESCE_INTERVAL, DeliveryScheduler};
use crate::errors::{ClientError, GENERIC_FAILURE_MESSAGE};
use crate::event::classify;
use crate::framing::{EventFramer, RawEvent};
use crate::model::QueryRequest;
use crate::observability::session_span;
use crate::sink::RenderSink;
use crate::timeline::{Change, Timeline};
use crate::transport::Transport;

/// Lifecycle state of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Requesting,
    Streaming,
    Completed,
    Failed,
    Cancelled,
}

impl SessionState {
    /// Requesting or streaming.
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Requesting | Self::Streaming)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Terminal result of a session.
#[derive(Clone, Debug)]
pub enum SessionOutcome {
    /// Upstream finished. `terminated` is false when the body ended
    /// without a `done` record; the last accumulated state is final.
    Completed { timeline: Timeline, terminated: bool },
    /// Transport failure or upstream error. The timeline's answer is
    /// cleared and loading tool calls are marked `error`.
    Failed { message: String, timeline: Timeline },
    /// Cancelled by the caller or superseded by a newer submit.
    Cancelled,
}

impl SessionOutcome {
    pub fn state(&self) -> SessionState {
        match self {
            Self::Completed { .. } => SessionState::Completed,
            Self::Failed { .. } => SessionState::Failed,
            Self::Cancelled => SessionState::Cancelled,
        }
    }

    /// Final answer text for a completed session.
    pub fn answer(&self) -> Option<&str> {
        match self {
            Self::Completed { timeline, .. } => Some(timeline.answer()),
            _ => None,
        }
    }

    pub fn timeline(&self) -> Option<&Timeline> {
        match self {
            Self::Completed { timeline, .. } | Self::Failed { timeline, .. } => Some(timeline),
            Self::Cancelled => None,
        }
    }
}

/// Handle used to cancel a running session.
#[derive(Clone)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    /// Requests cancellation.
    ///
    /// Cancellation is cooperative: the session stops reading at its next
    /// suspension point and no further callbacks reach the sink.
    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }
}

#[derive(Clone)]
struct ActiveSession {
    abort: AbortHandle,
    state: watch::Receiver<SessionState>,
}

/// Issues queries and tracks the single current session.
pub struct SessionController {
    transport: Arc<dyn Transport>,
    coalesce_interval: Duration,
    generation: Arc<AtomicU64>,
    active: watch::Sender<Option<ActiveSession>>,
}

impl SessionController {
    /// Creates a controller with the default coalescing window.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            coalesce_interval: DEFAULT_COALESCE_INTERVAL,
            generation: Arc::new(AtomicU64::new(0)),
            active: watch::Sender::new(None),
        }
    }

    /// Creates a controller that takes its coalescing window from `config`.
    pub fn with_config(transport: Arc<dyn Transport>, config: &ClientConfig) -> Self {
        Self::new(transport).coalesce_interval(config.coalesce_interval)
    }

    /// Overrides the answer coalescing window.
    pub fn coalesce_interval(mut self, interval: Duration) -> Self {
        self.coalesce_interval = interval;
        self
    }

    /// Starts a session for `request`, delivering changes to `sink`.
    ///
    /// A session still running from an earlier submit is cancelled and its
    /// remaining callbacks are suppressed. Must be called from within a
    /// Tokio runtime.
    pub fn submit(
        &self,
        request: QueryRequest,
        sink: Arc<dyn RenderSink>,
    ) -> Result<SessionHandle, ClientError> {
        if request.query.trim().is_empty() {
            return Err(ClientError::Validation("query must not be empty".into()));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| ClientError::protocol_msg("submit requires a Tokio runtime"))?;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let session_id = uuid::Uuid::new_v4();
        let (abort_tx, abort_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(SessionState::Requesting);
        let (final_tx, final_rx) = oneshot::channel();
        let abort = AbortHandle { tx: abort_tx };

        let previous = self.active.send_replace(Some(ActiveSession {
            abort: abort.clone(),
            state: state_rx.clone(),
        }));
        if let Some(previous) = previous {
            if previous.state.borrow().is_busy() {
                info!(session_id = %session_id, generation, "superseding busy session");
            }
            previous.abort.abort();
        }

        let task = SessionTask {
            transport: self.transport.clone(),
            request,
            delivery: Delivery {
                sink,
                liveness: Liveness {
                    generation,
                    current: self.generation.clone(),
                    abort_rx: abort_rx.clone(),
                },
            },
            coalesce_interval: self.coalesce_interval,
            state_tx,
            abort_rx,
        };
        let span = session_span(session_id, generation, task.request.mode);
        runtime.spawn(run_session(task, final_tx).instrument(span));

        Ok(SessionHandle {
            id: session_id,
            state: state_rx,
            final_rx,
            abort,
        })
    }

    /// Cancels the current session, if any.
    pub fn cancel(&self) {
        if let Some(active) = self.active.send_replace(None) {
            active.abort.abort();
        }
    }

    /// Controller-level state: `Idle` unless a session is requesting or
    /// streaming.
    pub fn state(&self) -> SessionState {
        match &*self.active.borrow() {
            Some(active) => {
                let state = *active.state.borrow();
                if state.is_busy() {
                    state
                } else {
                    SessionState::Idle
                }
            }
            None => SessionState::Idle,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.state().is_busy()
    }
}

/// Handle to one submitted session.
pub struct SessionHandle {
    id: uuid::Uuid,
    state: watch::Receiver<SessionState>,
    final_rx: oneshot::Receiver<SessionOutcome>,
    abort: AbortHandle,
}

impl SessionHandle {
    pub fn id(&self) -> uuid::Uuid {
        self.id
    }

    /// Current state of this session; terminal states are retained.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Receiver notified on every state transition.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Cancels this session.
    pub fn abort(&self) {
        self.abort.abort();
    }

    /// Waits for the terminal outcome.
    pub async fn finish(self) -> Result<SessionOutcome, ClientError> {
        self.final_rx
            .await
            .map_err(|_| ClientError::protocol_msg("session task ended without an outcome"))
    }
}

/// Gate checked before every delivery: the session must still be the
/// controller's current generation and must not have been aborted.
#[derive(Clone)]
struct Liveness {
    generation: u64,
    current: Arc<AtomicU64>,
    abort_rx: watch::Receiver<bool>,
}

impl Liveness {
    fn is_live(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.generation && !*self.abort_rx.borrow()
    }
}

struct Delivery {
    sink: Arc<dyn RenderSink>,
    liveness: Liveness,
}

impl Delivery {
    fn emit(&self, f: impl FnOnce(&dyn RenderSink)) {
        if self.liveness.is_live() {
            f(self.sink.as_ref());
        }
    }
}

struct SessionTask {
    transport: Arc<dyn Transport>,
    request: QueryRequest,
    delivery: Delivery,
    coalesce_interval: Duration,
    state_tx: watch::Sender<SessionState>,
    abort_rx: watch::Receiver<bool>,
}

async fn run_session(mut task: SessionTask, final_tx: oneshot::Sender<SessionOutcome>) {
    let outcome = task.drive().await;
    let state = outcome.state();
    task.set_state(state);
    info!(state = ?state, "session finished");
    task.delivery.emit(|sink| sink.on_finished(&outcome));
    let _ = final_tx.send(outcome);
}

impl SessionTask {
    fn set_state(&self, state: SessionState) {
        self.state_tx.send_replace(state);
    }

    async fn drive(&mut self) -> SessionOutcome {
        info!("session requesting");
        let opened = tokio::select! {
            biased;
            _ = wait_for_abort(&mut self.abort_rx) => return SessionOutcome::Cancelled,
            opened = self.transport.open(&self.request) => opened,
        };

        let response = match opened {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "transport failed to open stream");
                return self.fail(Timeline::new(), &mut self.scheduler(), GENERIC_FAILURE_MESSAGE);
            }
        };
        if !response.is_success() {
            warn!(status = response.status, "upstream returned non-success status");
            return self.fail(Timeline::new(), &mut self.scheduler(), GENERIC_FAILURE_MESSAGE);
        }
        let Some(mut body) = response.body else {
            warn!("upstream response has no body");
            return self.fail(Timeline::new(), &mut self.scheduler(), GENERIC_FAILURE_MESSAGE);
        };

        self.set_state(SessionState::Streaming);
        debug!("session streaming");

        let mut decoder = ChunkDecoder::new();
        let mut framer = EventFramer::new();
        let mut timeline = Timeline::new();
        let mut scheduler = self.scheduler();

        loop {
            let deadline = scheduler.deadline();
            tokio::select! {
                biased;
                _ = wait_for_abort(&mut self.abort_rx) => {
                    scheduler.discard();
                    return SessionOutcome::Cancelled;
                }
                _ = sleep_until(deadline) => {
                    if scheduler.take_due(Instant::now()) {
                        self.delivery.emit(|sink| sink.on_answer(timeline.answer()));
                    }
                }
                next = body.next() => match next {
                    Some(Ok(chunk)) => {
                        debug!(bytes = chunk.len(), "chunk received");
                        let text = decoder.decode(&chunk);
                        let events = framer.feed(&text);
                        if let Some(outcome) = self.apply_all(events, &mut timeline, &mut scheduler) {
                            return outcome;
                        }
                    }
                    Some(Err(err)) => {
                        warn!(error = %err, "stream read failed");
                        return self.fail(timeline, &mut scheduler, GENERIC_FAILURE_MESSAGE);
                    }
                    None => {
                        let mut events = framer.feed(&decoder.finish());
                        events.extend(framer.flush());
                        if let Some(outcome) = self.apply_all(events, &mut timeline, &mut scheduler) {
                            return outcome;
                        }
                        warn!("stream ended without a done record; treating as complete");
                        return self.complete(timeline, &mut scheduler, false);
                    }
                }
            }
        }
    }

    fn scheduler(&self) -> DeliveryScheduler {
        DeliveryScheduler::new(self.coalesce_interval)
    }

    fn apply_all(
        &self,
        events: Vec<RawEvent>,
        timeline: &mut Timeline,
        scheduler: &mut DeliveryScheduler,
    ) -> Option<SessionOutcome> {
        for raw in events {
            let event = match classify(&raw) {
                Ok(event) => event,
                Err(reason) => {
                    warn!(reason = %reason, "dropping record");
                    continue;
                }
            };
            debug!(kind = event.kind(), "event");
            match timeline.apply(event) {
                Change::None => {}
                Change::Answer => scheduler.notify(Instant::now()),
                Change::Narration {
                    source,
                    item,
                    reopened,
                } => {
                    if let Some(call) = reopened.and_then(|i| timeline.tool_call_at(i)) {
                        self.delivery.emit(|sink| sink.on_tool_call_start(call));
                    }
                    if let Some(content) = timeline.narration_at(item) {
                        self.delivery
                            .emit(|sink| sink.on_narration(&source, content));
                    }
                }
                Change::NarrationComplete { source } => {
                    self.delivery.emit(|sink| sink.on_narration_complete(&source));
                }
                Change::ToolCallStarted { item } => {
                    if let Some(call) = timeline.tool_call_at(item) {
                        self.delivery.emit(|sink| sink.on_tool_call_start(call));
                    }
                }
                Change::ToolCallResolved { item } => {
                    if let Some(call) = timeline.tool_call_at(item) {
                        self.delivery.emit(|sink| sink.on_tool_call_end(call));
                    }
                }
                Change::Completed => {
                    return Some(self.complete(std::mem::take(timeline), scheduler, true));
                }
                Change::Failed { message } => {
                    warn!(message = %message, "upstream reported an error");
                    return Some(self.fail(std::mem::take(timeline), scheduler, &message));
                }
            }
        }
        None
    }

    fn complete(
        &self,
        timeline: Timeline,
        scheduler: &mut DeliveryScheduler,
        terminated: bool,
    ) -> SessionOutcome {
        scheduler.flush();
        self.delivery.emit(|sink| sink.on_answer(timeline.answer()));
        SessionOutcome::Completed {
            timeline,
            terminated,
        }
    }

    fn fail(
        &self,
        mut timeline: Timeline,
        scheduler: &mut DeliveryScheduler,
        message: &str,
    ) -> SessionOutcome {
        scheduler.discard();
        for item in timeline.fail() {
            if let Some(call) = timeline.tool_call_at(item) {
                self.delivery.emit(|sink| sink.on_tool_call_end(call));
            }
        }
        self.delivery.emit(|sink| sink.on_failure(message));
        SessionOutcome::Failed {
            message: message.to_string(),
            timeline,
        }
    }
}

async fn wait_for_abort(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // Every abort handle is gone; nothing can cancel this session.
            std::future::pending::<()>().await;
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}
