//! Session orchestrator: the explicit loop that drives turns, hands tool
//! calls to the scheduler, folds their results and decides whether to
//! continue without the user.

pub mod events;
pub mod limits;

pub use events::{PendingConfirmation, SessionEvent};
pub use limits::{SessionLimits, SessionState};

use std::sync::Arc;

use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::config::{RheoConfig, DEFAULT_CONTEXT_WINDOW};
use crate::error::ErrorCategory;
use crate::history::{
    CharEstimator, CompressionInfo, CompressionOptions, HistoryManager, HistorySummarizer,
    ModelSummarizer, TokenCounter, TranscriptDigest,
};
use crate::next_speaker::{NextSpeakerOracle, Speaker};
use crate::provider::{BackendHandle, ModelBackend, RetryingBackend};
use crate::scheduler::{
    ApprovalMemory, CompletedBatch, ConfirmationOutcome, SchedulerObserver, ToolCallScheduler,
};
use crate::tools::ToolRegistry;
use crate::turn::{TurnEvent, TurnExecutor};
use crate::types::Message;
use crate::util::usage::TokenStatistics;

/// Where a drive of the loop starts.
enum Resume {
    /// A new message from the user.
    Input(String),
    /// The active tool batch; fold it once it completes.
    Batch,
}

/// One conversation: a transcript, a turn budget and the tools it may run.
pub struct Session {
    id: String,
    config: RheoConfig,
    limits: SessionLimits,
    backend: BackendHandle,
    registry: ToolRegistry,
    system_instruction: Option<String>,
    history: HistoryManager,
    scheduler: ToolCallScheduler,
    oracle: NextSpeakerOracle,
    summarizer: Arc<dyn HistorySummarizer>,
    counter: Arc<dyn TokenCounter>,
    state: SessionState,
    statistics: TokenStatistics,
    /// Model that started the current message.
    turn_model: Option<String>,
    /// Turns the current message may still take, across confirmations.
    turns_left: usize,
    prompt_seq: u64,
}

impl Session {
    /// Create a session. The backend is wrapped with the configured retry policy.
    pub fn new(config: RheoConfig, backend: Arc<dyn ModelBackend>, registry: ToolRegistry) -> Self {
        let backend: Arc<dyn ModelBackend> =
            Arc::new(RetryingBackend::new(backend, config.retry_policy()));
        let limits = SessionLimits::from_config(&config);
        let scheduler = ToolCallScheduler::new(registry.clone(), config.max_concurrent_tools);
        let id = uuid::Uuid::new_v4().simple().to_string();
        tracing::debug!(
            session = %id,
            model = backend.model_id(),
            tools = registry.len(),
            "Session created"
        );
        Self {
            id,
            state: SessionState::new(limits.max_session_turns),
            backend: BackendHandle::new(backend),
            registry,
            system_instruction: None,
            history: HistoryManager::new(),
            scheduler,
            oracle: NextSpeakerOracle::new(),
            summarizer: Arc::new(TranscriptDigest::default()),
            counter: Arc::new(CharEstimator),
            statistics: TokenStatistics::new(),
            turn_model: None,
            turns_left: limits.max_turns_per_message,
            limits,
            prompt_seq: 0,
            config,
        }
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn with_history(mut self, history: HistoryManager) -> Self {
        self.history = history;
        self
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn HistorySummarizer>) -> Self {
        self.summarizer = summarizer;
        self
    }

    /// Summarize compressed history with the active model instead of the
    /// local digest. Follows model switches.
    pub fn with_model_summarizer(mut self) -> Self {
        self.summarizer = Arc::new(ModelSummarizer::new(self.backend.clone()));
        self
    }

    pub fn with_token_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        self.counter = counter;
        self
    }

    /// Rebuilds the scheduler, so call before the first message.
    pub fn with_scheduler_observer(mut self, observer: SchedulerObserver) -> Self {
        let approvals = self.scheduler.approvals().clone();
        self.scheduler =
            ToolCallScheduler::new(self.registry.clone(), self.config.max_concurrent_tools)
                .with_approvals(approvals)
                .with_observer(observer);
        self
    }

    /// Share a statistics sink with other sessions.
    pub fn with_statistics(mut self, statistics: TokenStatistics) -> Self {
        self.statistics = statistics;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &RheoConfig {
        &self.config
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn statistics(&self) -> &TokenStatistics {
        &self.statistics
    }

    pub fn scheduler(&self) -> &ToolCallScheduler {
        &self.scheduler
    }

    pub fn approvals(&self) -> &ApprovalMemory {
        self.scheduler.approvals()
    }

    /// A handle front-ends can use to observe or switch the active model.
    pub fn backend(&self) -> BackendHandle {
        self.backend.clone()
    }

    /// Switch models. An in-flight message stops recursing at its next
    /// decision point.
    pub fn switch_backend(&self, backend: Arc<dyn ModelBackend>) {
        let backend: Arc<dyn ModelBackend> =
            Arc::new(RetryingBackend::new(backend, self.config.retry_policy()));
        self.backend.switch_to(backend);
    }

    /// Process one user message.
    ///
    /// The stream ends when the model yields to the user, a turn fails, a
    /// call needs confirmation, a limit is hit or `cancel` fires.
    pub fn send_message(
        &mut self,
        input: impl Into<String>,
        cancel: CancellationToken,
    ) -> impl Stream<Item = SessionEvent> + Send + '_ {
        let input = input.into();
        async_stream::stream! {
            self.release_stranded_calls();
            if self.scheduler.has_awaiting_approval() {
                yield SessionEvent::error(
                    "tool calls are awaiting confirmation; resolve them first",
                    ErrorCategory::InvalidState,
                );
                return;
            }
            // A batch left running by an abandoned stream is folded first.
            if let Some(batch) = self.scheduler.wait_for_completion().await {
                for event in self.fold(batch) {
                    yield event;
                }
            }

            self.turn_model = Some(self.backend.model_id());
            self.turns_left = self.limits.max_turns_per_message;
            let driven = self.drive(Resume::Input(input), cancel);
            futures::pin_mut!(driven);
            while let Some(event) = driven.next().await {
                yield event;
            }
        }
    }

    /// Answer a confirmation prompt. Once no call of the batch is left
    /// waiting, the batch's results are folded and the loop continues.
    pub fn resolve_confirmation(
        &mut self,
        call_id: impl Into<String>,
        outcome: ConfirmationOutcome,
        cancel: CancellationToken,
    ) -> impl Stream<Item = SessionEvent> + Send + '_ {
        let call_id = call_id.into();
        async_stream::stream! {
            self.release_stranded_calls();
            let resolved = self
                .scheduler
                .resolve_confirmation(&call_id, outcome, cancel.clone());
            if let Err(error) = resolved {
                yield SessionEvent::error(error.to_string(), error.category());
                return;
            }
            let pending = self.pending_confirmations();
            if !pending.is_empty() {
                yield SessionEvent::AwaitingConfirmation { calls: pending };
                return;
            }
            let driven = self.drive(Resume::Batch, cancel);
            futures::pin_mut!(driven);
            while let Some(event) = driven.next().await {
                yield event;
            }
        }
    }

    /// Cancel every parked or queued call and fold the batch without
    /// continuing the conversation.
    pub async fn abort_pending_tools(&mut self) -> Vec<SessionEvent> {
        self.scheduler.abort_pending();
        match self.scheduler.wait_for_completion().await {
            Some(batch) => self.fold(batch),
            None => Vec::new(),
        }
    }

    /// Calls a dropped stream left mid-validation have no driver any more;
    /// cancel them so their batch can complete.
    fn release_stranded_calls(&self) {
        let stranded = self.scheduler.abort_unvalidated();
        if stranded > 0 {
            tracing::warn!(
                session = %self.id,
                stranded,
                "Cancelled tool calls abandoned during validation"
            );
        }
    }

    /// Calls currently waiting for a decision.
    pub fn pending_confirmations(&self) -> Vec<PendingConfirmation> {
        self.scheduler
            .awaiting_approval()
            .iter()
            .filter_map(PendingConfirmation::from_state)
            .collect()
    }

    fn drive(
        &mut self,
        resume: Resume,
        cancel: CancellationToken,
    ) -> impl Stream<Item = SessionEvent> + Send + '_ {
        async_stream::stream! {
            let mut next_input = match resume {
                Resume::Input(input) => Some(input),
                Resume::Batch => None,
            };

            loop {
                let input = match next_input.take() {
                    Some(input) => input,
                    None => {
                        if let Some(batch) = self.scheduler.wait_for_completion().await {
                            for event in self.fold(batch) {
                                yield event;
                            }
                        }
                        if cancel.is_cancelled() {
                            return;
                        }
                        if let Some(event) = self.model_switch() {
                            yield event;
                            return;
                        }
                        self.config.continue_prompt.clone()
                    }
                };

                if self.turns_left == 0 {
                    tracing::info!(
                        session = %self.id,
                        max_turns_per_message = self.limits.max_turns_per_message,
                        "Turn budget for this message exhausted"
                    );
                    return;
                }
                self.turns_left -= 1;

                let turn = match self.state.begin_turn() {
                    Ok(turn) => turn,
                    Err(error) => {
                        tracing::info!(session = %self.id, %error, "Session turn limit reached");
                        yield SessionEvent::SessionTurnLimitReached {
                            max_turns: self.state.max_turns,
                        };
                        return;
                    }
                };

                if let Some(info) = self.compress_if_needed(&cancel).await {
                    yield SessionEvent::HistoryCompressed { info };
                }

                self.prompt_seq += 1;
                let prompt_id = format!("{}#{}", self.id, self.prompt_seq);
                let backend = self.backend.current();
                let model = backend.model_id().to_string();
                tracing::debug!(
                    session = %self.id,
                    turn,
                    model = %model,
                    prompt_id = %prompt_id,
                    "Starting turn"
                );

                let executor = TurnExecutor::new(backend)
                    .with_tools(self.registry.declarations())
                    .with_system_instruction(self.system_instruction.clone())
                    .with_debug(self.config.debug);
                let mut requests = Vec::new();
                let mut failed = false;
                {
                    let events = executor.run(&mut self.history, input, prompt_id, cancel.clone());
                    futures::pin_mut!(events);
                    while let Some(event) = events.next().await {
                        match event {
                            TurnEvent::Content(text) => yield SessionEvent::Content { text },
                            TurnEvent::Thought(text) => yield SessionEvent::Thought { text },
                            TurnEvent::ToolCallRequest(request) => {
                                requests.push(request.clone());
                                yield SessionEvent::ToolCallRequest { request };
                            }
                            TurnEvent::Error(error) => {
                                failed = true;
                                yield SessionEvent::Error {
                                    message: error.message,
                                    category: error.category,
                                };
                            }
                            TurnEvent::TokenUsage(usage) => {
                                self.state.record_usage(&usage);
                                self.statistics.record(&model, &usage);
                                yield SessionEvent::TokenUsage {
                                    model: model.clone(),
                                    usage,
                                };
                            }
                        }
                    }
                }

                if !requests.is_empty() {
                    // Scheduled even after an abort, so every recorded call gets a result.
                    if let Err(error) = self.scheduler.schedule(requests, cancel.clone()).await {
                        yield SessionEvent::error(error.to_string(), error.category());
                        return;
                    }
                    if cancel.is_cancelled() {
                        self.scheduler.abort_pending();
                    }
                    let pending = self.pending_confirmations();
                    if !pending.is_empty() {
                        yield SessionEvent::AwaitingConfirmation { calls: pending };
                        return;
                    }
                    continue;
                }

                if failed || cancel.is_cancelled() {
                    return;
                }
                if let Some(event) = self.model_switch() {
                    yield event;
                    return;
                }

                let verdict = self
                    .oracle
                    .check(&*self.backend.current(), &self.history.curated(), cancel.clone())
                    .await;
                if verdict.next_speaker != Speaker::Model || cancel.is_cancelled() {
                    return;
                }
                tracing::debug!(
                    session = %self.id,
                    reasoning = %verdict.reasoning,
                    "Model continues"
                );
                next_input = Some(self.config.continue_prompt.clone());
            }
        }
    }

    /// Append each call's result in request order.
    fn fold(&mut self, batch: CompletedBatch) -> Vec<SessionEvent> {
        tracing::debug!(
            session = %self.id,
            batch_id = batch.batch_id,
            calls = batch.calls.len(),
            "Folding tool results"
        );
        batch
            .calls
            .iter()
            .map(|call| {
                self.history.append(Message::tool_result(call.to_tool_result()));
                SessionEvent::ToolCallCompleted {
                    call_id: call.request.call_id.clone(),
                    name: call.request.name.clone(),
                    status: call.status,
                    display: call.display(),
                }
            })
            .collect()
    }

    fn model_switch(&self) -> Option<SessionEvent> {
        let from = self.turn_model.clone()?;
        let to = self.backend.model_id();
        if from == to {
            return None;
        }
        tracing::info!(
            session = %self.id,
            from = %from,
            to = %to,
            "Model switched; stopping automatic continuation"
        );
        Some(SessionEvent::ModelSwitched { from, to })
    }

    async fn compress_if_needed(
        &mut self,
        cancel: &CancellationToken,
    ) -> Option<CompressionInfo> {
        let settings = &self.config.compression;
        if !settings.enabled {
            return None;
        }
        let context_window = settings.context_window.unwrap_or_else(|| {
            match self.backend.current().capabilities().context_length {
                0 => DEFAULT_CONTEXT_WINDOW,
                length => length,
            }
        });
        let options = CompressionOptions {
            threshold_fraction: settings.threshold_fraction,
            preserve_fraction: settings.preserve_fraction,
            context_window,
            force: false,
        };
        let info = self
            .history
            .compress(options, &*self.counter, &*self.summarizer, cancel.clone())
            .await?;
        self.state.compression_watermark = Some(info.compressed_tokens);
        Some(info)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("model", &self.backend.model_id())
            .field("messages", &self.history.len())
            .field("state", &self.state)
            .finish()
    }
}
