//! Run supervisor: wires transcription, chat and the conversation loop for one
//! stream and restarts the whole run whenever it terminates.

use crate::audio::{AudioDecoder, FfmpegDecoder};
use crate::chat::{ChatMessage, ChatSink, ChatSource, LogSink, StdoutSink};
use crate::config::Config;
use crate::conversation::{
    BotIdentity, ConversationOrchestrator, ConversationState, DecisionAgent, ReplyAgent,
};
use crate::error::Result;
use crate::llm::{LlmClient, OpenAiClient};
use crate::memory::FactStore;
use crate::queue::EventQueue;
use crate::stt::{RecognitionConfig, Recognizer, WebSocketRecognizer};
use crate::transcribe::{TerminationCause, TranscriptionContext, TranscriptionSupervisor};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

pub struct Engine {
    supervisor: Arc<TranscriptionSupervisor>,
    orchestrator: Arc<ConversationOrchestrator>,
    chat: Arc<dyn ChatSource>,
    queue: Arc<EventQueue>,
    url: String,
    channel: String,
    ignore_chat: bool,
    backoff: Duration,
    runs: AtomicU64,
}

impl Engine {
    pub fn new(
        supervisor: TranscriptionSupervisor,
        orchestrator: ConversationOrchestrator,
        chat: Arc<dyn ChatSource>,
        url: impl Into<String>,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            supervisor: Arc::new(supervisor),
            orchestrator: Arc::new(orchestrator),
            chat,
            queue: Arc::new(EventQueue::new()),
            url: url.into(),
            channel: channel.into(),
            ignore_chat: false,
            backoff: Duration::from_secs(crate::defaults::RESTART_BACKOFF_SECS),
            runs: AtomicU64::new(0),
        }
    }

    /// Builds the production engine: ffmpeg, WebSocket recognition and
    /// OpenAI-compatible LLM tiers.
    pub fn from_config(config: &Config, chat: Arc<dyn ChatSource>) -> Result<Self> {
        config.validate()?;

        let decoder: Arc<dyn AudioDecoder> = Arc::new(FfmpegDecoder::new(&config.audio.ffmpeg));
        let recognition = RecognitionConfig {
            model: config.stt.model.clone(),
            language: config.stt.language.clone(),
            ..Default::default()
        };
        let recognizer: Arc<dyn Recognizer> = Arc::new(
            WebSocketRecognizer::new(&config.stt.endpoint, recognition)
                .with_api_key(&config.stt.api_key),
        );

        let identity = BotIdentity::new(&config.stream.channel, &config.stream.username);
        let tiers = &config.llm;
        let decision_llm: Arc<dyn LlmClient> = Arc::new(OpenAiClient::new(
            &tiers.decision.base_url,
            &tiers.decision.token,
            &tiers.decision.model,
        )?);
        let reply_llm: Arc<dyn LlmClient> = Arc::new(OpenAiClient::new(
            &tiers.reply.base_url,
            &tiers.reply.token,
            &tiers.reply.model,
        )?);

        let decision = DecisionAgent::new(decision_llm, identity.clone())
            .with_sampling(tiers.decision.temperature, tiers.decision.max_tokens);
        let reply = ReplyAgent::new(reply_llm, identity)
            .with_sampling(tiers.reply.temperature, tiers.reply.max_tokens);

        let facts = Arc::new(FactStore::open(config.memory.facts_path.clone())?);
        let sink: Arc<dyn ChatSink> = if config.stream.disable_notifications {
            Arc::new(LogSink)
        } else {
            Arc::new(StdoutSink)
        };

        let orchestrator = ConversationOrchestrator::new(decision, reply, facts, sink)
            .with_cooldown(config.conversation.cooldown())
            .with_state(ConversationState::new(config.conversation.history_size).shared());

        info!(
            "Engine configured channel={} decision_model={} reply_model={} facts={}",
            config.stream.channel,
            tiers.decision.model,
            tiers.reply.model,
            config.memory.facts_path.display()
        );

        Ok(Self::new(
            TranscriptionSupervisor::new(decoder, recognizer),
            orchestrator,
            chat,
            &config.stream.url,
            &config.stream.channel,
        )
        .with_queue_capacity(config.conversation.queue_capacity)
        .with_ignore_chat(config.stream.ignore_chat)
        .with_backoff(config.stream.restart_backoff()))
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue = Arc::new(EventQueue::with_capacity(capacity));
        self
    }

    pub fn with_ignore_chat(mut self, ignore_chat: bool) -> Self {
        self.ignore_chat = ignore_chat;
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn queue(&self) -> &EventQueue {
        &self.queue
    }

    pub fn orchestrator(&self) -> &ConversationOrchestrator {
        &self.orchestrator
    }

    /// Runs started so far.
    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::SeqCst)
    }

    /// Restarts runs until `shutdown` fires, then cancels and reaps reply
    /// tasks.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!("Engine started url={} channel={}", self.url, self.channel);

        while !shutdown.is_cancelled() {
            let cause = self.run_once(&shutdown).await;
            if cause.is_shutdown() {
                break;
            }

            error!(
                "Run terminated cause={} restarting_in={:?}",
                cause, self.backoff
            );
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.backoff) => {}
            }
        }

        self.queue.close();
        self.orchestrator.cancel_replies();
        self.orchestrator.wait_for_replies().await;
        info!("Engine stopped runs={}", self.runs());
    }

    /// One run: transcription, chat and the conversation loop share a fresh
    /// context and stop together.
    pub async fn run_once(&self, shutdown: &CancellationToken) -> TerminationCause {
        let run = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        let ctx = TranscriptionContext::new(shutdown);
        let tasks = TaskTracker::new();
        info!("Run started run={}", run);

        if let Some(phrases) = ctx.take_phrases() {
            tasks.spawn(forward_phrases(
                phrases,
                self.queue.clone(),
                self.channel.clone(),
                ctx.child_token(),
            ));
        }

        {
            let ctx = ctx.clone();
            let chat = self.chat.clone();
            let queue = self.queue.clone();
            let ignore_chat = self.ignore_chat;
            tasks.spawn(async move {
                let listener = move |message: ChatMessage| {
                    if ignore_chat {
                        debug!("Chat message ignored username={}", message.username);
                        return;
                    }
                    queue.add(&message.username, &message.text);
                };

                let cause = match chat.run(&listener, ctx.child_token()).await {
                    Ok(()) if ctx.is_cancelled() => return,
                    Ok(()) => TerminationCause::Chat(format!("{} source finished", chat.name())),
                    Err(e) => TerminationCause::Chat(e.to_string()),
                };
                warn!("Chat source stopped source={}: {}", chat.name(), cause);
                ctx.cancel(cause);
            });
        }

        {
            let orchestrator = self.orchestrator.clone();
            let queue = self.queue.clone();
            let token = ctx.child_token();
            tasks.spawn(async move { orchestrator.run(&queue, &token).await });
        }

        let cause = self.supervisor.run(ctx, &self.url).await;

        tasks.close();
        tasks.wait().await;
        info!("Run finished run={} cause={}", run, cause);
        cause
    }
}

/// Moves recognized phrases into the event queue under the channel's name.
async fn forward_phrases(
    mut phrases: mpsc::Receiver<String>,
    queue: Arc<EventQueue>,
    channel: String,
    cancel: CancellationToken,
) {
    loop {
        let phrase = tokio::select! {
            _ = cancel.cancelled() => break,
            phrase = phrases.recv() => phrase,
        };
        let Some(phrase) = phrase else { break };

        debug!("Phrase recognized text={:?}", phrase);
        queue.add(&channel, &phrase);
    }
}
