//! Conversation orchestrator.
//!
//! Consumes events one at a time. Each event goes through the decision
//! tier, whose result updates the summary and the fact store and may open a
//! reply. Replies run as detached tasks, so the next decision can start
//! while a reply is still being generated.

use crate::chat::ChatSink;
use crate::clock::{Clock, SystemClock};
use crate::conversation::decision::{DecisionAgent, DecisionResult};
use crate::conversation::reply::ReplyAgent;
use crate::conversation::state::{ConversationState, SharedState, StateSnapshot};
use crate::defaults;
use crate::error::{CohostError, Result};
use crate::memory::FactStore;
use crate::queue::{Event, EventQueue};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// How an event was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// The decision tier saw no reason to reply.
    NoResponse,
    /// A reply was wanted but the last one is too recent.
    CoolingDown,
    /// A reply task was started.
    ReplyDispatched,
}

pub struct ConversationOrchestrator {
    decision: DecisionAgent,
    reply: Arc<ReplyAgent>,
    facts: Arc<FactStore>,
    sink: Arc<dyn ChatSink>,
    state: SharedState,
    clock: Arc<dyn Clock>,
    cooldown: Duration,
    replies: TaskTracker,
    replies_cancel: CancellationToken,
}

impl ConversationOrchestrator {
    pub fn new(
        decision: DecisionAgent,
        reply: ReplyAgent,
        facts: Arc<FactStore>,
        sink: Arc<dyn ChatSink>,
    ) -> Self {
        Self {
            decision,
            reply: Arc::new(reply),
            facts,
            sink,
            state: ConversationState::default().shared(),
            clock: Arc::new(SystemClock),
            cooldown: Duration::from_secs(defaults::REPLY_COOLDOWN_SECS),
            replies: TaskTracker::new(),
            replies_cancel: CancellationToken::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Uses `state` instead of a fresh one, e.g. to keep it across runs.
    pub fn with_state(mut self, state: SharedState) -> Self {
        self.state = state;
        self
    }

    pub fn state(&self) -> SharedState {
        self.state.clone()
    }

    /// Consumes `queue` until it closes or `cancel` fires.
    pub async fn run(&self, queue: &EventQueue, cancel: &CancellationToken) {
        info!("Conversation loop started");

        while let Some(event) = queue.dequeue_until(cancel).await {
            let started = Instant::now();
            let result = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.process_event(event.clone()) => result,
            };

            match result {
                Ok(outcome) => info!(
                    "Processed message username={} outcome={:?} duration={:?}",
                    event.username,
                    outcome,
                    started.elapsed()
                ),
                Err(e) => error!(
                    "Failed to process message username={} text={:?} duration={:?}: {}",
                    event.username,
                    event.text,
                    started.elapsed(),
                    e
                ),
            }
        }

        info!("Conversation loop stopped");
    }

    /// Runs the decision pipeline for one event.
    ///
    /// Errors fail this event only: the decision call, malformed output, or
    /// a fact write that could not be persisted.
    pub async fn process_event(&self, event: Event) -> Result<EventOutcome> {
        let facts = self.facts.format();
        let mut snapshot = self.state.read().await.snapshot(facts);

        let decision = self
            .decision
            .decide(&event, &snapshot, self.clock.now(), &self.clock.wall_now())
            .await?;

        self.state.write().await.summary = decision.new_summary.clone();
        snapshot.summary = decision.new_summary.clone();

        self.apply_facts(&decision)?;

        if !decision.need_response {
            debug!("Response is not required username={}", event.username);
            return Ok(EventOutcome::NoResponse);
        }

        let now = self.clock.now();
        if !self.state.write().await.try_begin_reply(now, self.cooldown) {
            info!(
                "Reply suppressed by cooldown username={} cooldown={:?}",
                event.username, self.cooldown
            );
            return Ok(EventOutcome::CoolingDown);
        }

        self.dispatch_reply(event, snapshot);
        Ok(EventOutcome::ReplyDispatched)
    }

    /// Removals first, then additions. The two are independent: a rejected
    /// removal does not stop the additions.
    fn apply_facts(&self, decision: &DecisionResult) -> Result<()> {
        if !decision.remove_facts.is_empty() {
            match decision
                .removal_indices()
                .and_then(|indices| self.facts.remove_by_index(&indices))
            {
                Ok(_) => {}
                Err(e @ CohostError::Validation { .. }) => {
                    warn!(
                        "Fact removal rejected positions={:?}: {}",
                        decision.remove_facts, e
                    );
                }
                Err(e) => return Err(e),
            }
        }

        self.facts.add(&decision.add_facts)?;
        Ok(())
    }

    fn dispatch_reply(&self, event: Event, snapshot: StateSnapshot) {
        let reply = self.reply.clone();
        let sink = self.sink.clone();
        let state = self.state.clone();
        let clock = self.clock.clone();
        let cancel = self.replies_cancel.clone();

        self.replies.spawn(async move {
            let generate = async {
                let text = reply.reply(&event, &snapshot, &clock.wall_now()).await?;
                sink.send(&text).await?;
                Ok::<_, CohostError>(text)
            };
            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    state.write().await.abandon_reply();
                    info!("Reply cancelled username={}", event.username);
                    return;
                }
                result = generate => result,
            };

            let mut state = state.write().await;
            match result {
                Ok(text) => {
                    state.finish_reply(
                        clock.now(),
                        clock.wall_now(),
                        &reply.identity().username,
                        &text,
                    );
                    info!(
                        "Replied to message username={} sink={} text={:?}",
                        event.username,
                        sink.name(),
                        text
                    );
                }
                Err(e) => {
                    state.abandon_reply();
                    error!(
                        "Failed to generate reply username={} text={:?}: {}",
                        event.username, event.text, e
                    );
                }
            }
        });
    }

    /// Stops reply tasks still waiting on the model or the sink. Replies
    /// dispatched afterwards are cancelled immediately.
    pub fn cancel_replies(&self) {
        self.replies_cancel.cancel();
    }

    /// Waits for every reply task started so far.
    pub async fn wait_for_replies(&self) {
        self.replies.close();
        self.replies.wait().await;
        self.replies.reopen();
    }

    /// Reply tasks still running.
    pub fn replies_in_flight(&self) -> usize {
        self.replies.len()
    }
}
