//! Tool call scheduler: validation, confirmation gating, bounded concurrent
//! execution and once-per-batch completion notification.

pub mod approvals;
pub mod events;
pub mod state;

pub use approvals::{ApprovalMemory, ConfirmationOutcome};
pub use events::{observer_channel, SchedulerEvent, SchedulerObserver};
pub use state::{CancelReason, CompletedBatch, ToolCallState, ToolCallStatus};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::error::{ErrorCategory, RheoError};
use crate::tools::validation::validate_arguments;
use crate::tools::{
    OutputCallback, RiskAssessment, Tool, ToolArguments, ToolExecutionContext, ToolOutput,
    ToolRegistry,
};
use crate::types::ToolCallRequest;

/// The set of calls handed over by one turn.
struct Batch {
    id: u64,
    order: Vec<String>,
    calls: HashMap<String, ToolCallState>,
    notified: bool,
}

impl Batch {
    fn all_terminal(&self) -> bool {
        self.calls.values().all(|call| call.status.is_terminal())
    }

    fn ordered(&self) -> Vec<ToolCallState> {
        self.order
            .iter()
            .filter_map(|id| self.calls.get(id).cloned())
            .collect()
    }
}

/// State shared with spawned executions.
struct Shared {
    registry: ToolRegistry,
    approvals: ApprovalMemory,
    semaphore: Arc<Semaphore>,
    observer: Option<SchedulerObserver>,
    active: Mutex<Option<Batch>>,
    completions: mpsc::UnboundedSender<CompletedBatch>,
}

/// Owns the lifecycle of every proposed tool call.
///
/// One batch is active at a time. A batch stays active until its completion
/// has been received through [`wait_for_completion`](Self::wait_for_completion)
/// or [`take_completed`](Self::take_completed), so a new batch can never
/// overlap the notification of the previous one.
pub struct ToolCallScheduler {
    shared: Arc<Shared>,
    completions_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<CompletedBatch>>,
    next_batch_id: AtomicU64,
}

impl ToolCallScheduler {
    pub fn new(registry: ToolRegistry, max_concurrent: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(Shared {
                registry,
                approvals: ApprovalMemory::new(),
                semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
                observer: None,
                active: Mutex::new(None),
                completions: tx,
            }),
            completions_rx: tokio::sync::Mutex::new(rx),
            next_batch_id: AtomicU64::new(1),
        }
    }

    /// Register an observer. Call before the first batch.
    pub fn with_observer(mut self, observer: SchedulerObserver) -> Self {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.observer = Some(observer);
        }
        self
    }

    /// Share auto-approvals with another owner. Call before the first batch.
    pub fn with_approvals(mut self, approvals: ApprovalMemory) -> Self {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.approvals = approvals;
        }
        self
    }

    pub fn approvals(&self) -> &ApprovalMemory {
        &self.shared.approvals
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.shared.registry
    }

    /// Accept a batch of requests, validate each in arrival order and start
    /// the ones that need no confirmation.
    ///
    /// Returns the batch id. Fails if a previous batch is still active.
    pub async fn schedule(
        &self,
        requests: Vec<ToolCallRequest>,
        cancel: CancellationToken,
    ) -> Result<u64, RheoError> {
        if requests.is_empty() {
            return Err(RheoError::InvalidArgument("empty tool call batch".to_string()));
        }
        let batch_id = {
            let mut active = self.shared.lock();
            if let Some(batch) = active.as_ref() {
                return Err(RheoError::InvalidState(format!(
                    "tool batch {} is still active",
                    batch.id
                )));
            }
            let batch_id = self.next_batch_id.fetch_add(1, Ordering::Relaxed);
            let mut order = Vec::with_capacity(requests.len());
            let mut calls = HashMap::with_capacity(requests.len());
            for request in requests {
                if calls.contains_key(&request.call_id) {
                    tracing::warn!(
                        call_id = %request.call_id,
                        "Duplicate tool call id in batch; ignoring"
                    );
                    continue;
                }
                order.push(request.call_id.clone());
                calls.insert(request.call_id.clone(), ToolCallState::new(request));
            }
            *active = Some(Batch {
                id: batch_id,
                order: order.clone(),
                calls,
                notified: false,
            });
            tracing::debug!(batch_id, calls = order.len(), "Scheduled tool batch");
            batch_id
        };

        let order = self
            .shared
            .lock()
            .as_ref()
            .map(|batch| batch.order.clone())
            .unwrap_or_default();
        for call_id in order {
            self.prepare(&call_id, &cancel).await;
        }
        self.shared.check_completion();
        Ok(batch_id)
    }

    /// Validate one call and route it to approval or execution.
    async fn prepare(&self, call_id: &str, cancel: &CancellationToken) {
        let shared = &self.shared;
        if cancel.is_cancelled() {
            shared.cancel_call(call_id, CancelReason::Aborted);
            return;
        }
        if !shared.transition(call_id, ToolCallStatus::Validating) {
            return;
        }
        let Some(request) = shared.request(call_id) else {
            return;
        };

        let Some(tool) = shared.registry.get(&request.name) else {
            shared.fail(
                call_id,
                format!("Tool \"{}\" not found in registry", request.name),
                ErrorCategory::ToolExecution,
            );
            return;
        };

        let args = ToolArguments::new(request.args.clone());
        let checked = validate_arguments(args.raw(), &tool.parameters().schema)
            .and_then(|()| tool.validate(&args));
        if let Err(message) = checked {
            tracing::debug!(call_id, tool = %request.name, %message, "Tool arguments rejected");
            shared.fail(
                call_id,
                format!("Invalid arguments: {message}"),
                ErrorCategory::Validation,
            );
            return;
        }
        let description = tool.describe(&args);

        let confirmation = match tool.should_confirm(&args, cancel.child_token()).await {
            Ok(confirmation) => confirmation,
            Err(error) => {
                shared.fail(call_id, error.to_string(), error.category());
                return;
            }
        };
        if cancel.is_cancelled() {
            shared.cancel_call(call_id, CancelReason::Aborted);
            return;
        }

        let gated = confirmation
            .as_ref()
            .filter(|details| details.risk.requires_confirmation);
        let auto_approved = gated
            .map(|details| {
                shared
                    .approvals
                    .is_auto_approved(&details.class_key(&request.name))
            })
            .unwrap_or(false);

        shared.update(call_id, |state| {
            state.description = Some(description);
            state.risk = Some(
                confirmation
                    .as_ref()
                    .map(|details| details.risk.clone())
                    .unwrap_or_else(RiskAssessment::safe),
            );
            state.confirmation = confirmation.clone();
            if auto_approved {
                state.outcome = Some(ConfirmationOutcome::ProceedAlways);
            }
        });

        match gated {
            Some(details) if !auto_approved => {
                if shared.transition(call_id, ToolCallStatus::AwaitingApproval) {
                    tracing::info!(
                        call_id,
                        tool = %request.name,
                        risk = %details.risk.level,
                        "Tool call awaiting approval"
                    );
                    shared.emit(SchedulerEvent::AwaitingApproval {
                        call_id: call_id.to_string(),
                        name: request.name.clone(),
                        details: details.clone(),
                    });
                }
            }
            _ => {
                if shared.transition(call_id, ToolCallStatus::Scheduled) {
                    self.spawn_execution(call_id, tool, args, request, cancel.clone());
                }
            }
        }
    }

    fn spawn_execution(
        &self,
        call_id: &str,
        tool: Arc<dyn Tool>,
        args: ToolArguments,
        request: ToolCallRequest,
        cancel: CancellationToken,
    ) {
        let shared = self.shared.clone();
        let call_id = call_id.to_string();
        tokio::spawn(async move {
            shared.execute(call_id, tool, args, request, cancel).await;
        });
    }

    /// Answer a pending confirmation.
    ///
    /// `Cancel` ends the call without running it. Proceeding schedules it
    /// under `cancel`; `ProceedAlways` also remembers the call's risk class.
    pub fn resolve_confirmation(
        &self,
        call_id: &str,
        outcome: ConfirmationOutcome,
        cancel: CancellationToken,
    ) -> Result<(), RheoError> {
        let shared = &self.shared;
        let state = shared
            .snapshot_call(call_id)
            .ok_or_else(|| RheoError::CallNotFound(call_id.to_string()))?;
        if state.status != ToolCallStatus::AwaitingApproval {
            return Err(RheoError::InvalidState(format!(
                "tool call {call_id} is {}, not awaiting approval",
                state.status
            )));
        }
        shared.update(call_id, |state| state.outcome = Some(outcome));
        tracing::info!(call_id, tool = %state.name(), %outcome, "Confirmation resolved");

        if cancel.is_cancelled() {
            shared.cancel_call(call_id, CancelReason::Aborted);
        } else if !outcome.allows_execution() {
            shared.cancel_call(call_id, CancelReason::User);
        } else {
            if outcome == ConfirmationOutcome::ProceedAlways {
                if let Some(details) = &state.confirmation {
                    shared.approvals.remember(details.class_key(state.name()));
                }
            }
            match shared.registry.get(state.name()) {
                Some(tool) => {
                    if shared.transition(call_id, ToolCallStatus::Scheduled) {
                        let args = ToolArguments::new(state.request.args.clone());
                        self.spawn_execution(call_id, tool, args, state.request.clone(), cancel);
                    }
                }
                None => {
                    // Unregistered while parked.
                    shared.update(call_id, |state| {
                        state.error = Some(format!(
                            "Tool \"{}\" is no longer registered",
                            state.request.name
                        ));
                        state.error_category = Some(ErrorCategory::ToolExecution);
                    });
                    shared.cancel_call(call_id, CancelReason::Aborted);
                }
            }
        }
        shared.check_completion();
        Ok(())
    }

    /// Cancel every call that has not started executing.
    pub fn abort_pending(&self) {
        self.abort_matching(|status| {
            matches!(
                status,
                ToolCallStatus::Proposed
                    | ToolCallStatus::Validating
                    | ToolCallStatus::AwaitingApproval
                    | ToolCallStatus::Scheduled
            )
        });
    }

    /// Cancel calls whose validation was abandoned mid-way, leaving parked
    /// and running calls alone.
    ///
    /// Validation is driven by the caller of [`schedule`](Self::schedule), so
    /// a dropped `schedule` future strands its remaining calls. Returns how
    /// many were cancelled.
    pub fn abort_unvalidated(&self) -> usize {
        self.abort_matching(|status| {
            matches!(status, ToolCallStatus::Proposed | ToolCallStatus::Validating)
        })
    }

    fn abort_matching(&self, selected: impl Fn(ToolCallStatus) -> bool) -> usize {
        let pending: Vec<String> = self
            .snapshot()
            .into_iter()
            .filter(|call| selected(call.status))
            .map(|call| call.request.call_id)
            .collect();
        for call_id in &pending {
            self.shared.cancel_call(call_id, CancelReason::Aborted);
        }
        if !pending.is_empty() {
            tracing::debug!(cancelled = pending.len(), "Aborted pending tool calls");
        }
        self.shared.check_completion();
        pending.len()
    }

    /// Wait for the active batch to finish and release it.
    ///
    /// Returns `None` when no batch is active.
    pub async fn wait_for_completion(&self) -> Option<CompletedBatch> {
        let mut rx = self.completions_rx.lock().await;
        let completed = match rx.try_recv() {
            Ok(completed) => completed,
            Err(_) => {
                if self.active_batch_id().is_none() {
                    return None;
                }
                rx.recv().await?
            }
        };
        self.release(completed.batch_id);
        Some(completed)
    }

    /// A finished batch, if one is waiting to be folded.
    pub fn take_completed(&self) -> Option<CompletedBatch> {
        let completed = self.completions_rx.try_lock().ok()?.try_recv().ok()?;
        self.release(completed.batch_id);
        Some(completed)
    }

    fn release(&self, batch_id: u64) {
        let mut active = self.shared.lock();
        if active.as_ref().is_some_and(|batch| batch.id == batch_id) {
            *active = None;
        }
    }

    pub fn active_batch_id(&self) -> Option<u64> {
        self.shared.lock().as_ref().map(|batch| batch.id)
    }

    /// Calls of the active batch, in request order.
    pub fn snapshot(&self) -> Vec<ToolCallState> {
        self.shared
            .lock()
            .as_ref()
            .map(Batch::ordered)
            .unwrap_or_default()
    }

    pub fn awaiting_approval(&self) -> Vec<ToolCallState> {
        self.snapshot()
            .into_iter()
            .filter(|call| call.status == ToolCallStatus::AwaitingApproval)
            .collect()
    }

    pub fn has_awaiting_approval(&self) -> bool {
        !self.awaiting_approval().is_empty()
    }

    /// True when no batch is active.
    pub fn is_idle(&self) -> bool {
        self.active_batch_id().is_none()
    }
}

impl Shared {
    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Batch>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: SchedulerEvent) {
        if let Some(observer) = &self.observer {
            observer(event);
        }
    }

    fn update<R>(&self, call_id: &str, f: impl FnOnce(&mut ToolCallState) -> R) -> Option<R> {
        self.lock()
            .as_mut()
            .and_then(|batch| batch.calls.get_mut(call_id))
            .map(f)
    }

    fn snapshot_call(&self, call_id: &str) -> Option<ToolCallState> {
        self.update(call_id, |state| state.clone())
    }

    fn request(&self, call_id: &str) -> Option<ToolCallRequest> {
        self.update(call_id, |state| state.request.clone())
    }

    /// Apply a lifecycle transition; false when it is not allowed.
    fn transition(&self, call_id: &str, next: ToolCallStatus) -> bool {
        let changed = self.update(call_id, |state| {
            state
                .transition(next)
                .map(|()| state.name().to_string())
        });
        let name = match changed {
            Some(Ok(name)) => name,
            Some(Err(error)) => {
                tracing::debug!(call_id, %error, "Ignoring tool call transition");
                return false;
            }
            None => return false,
        };
        tracing::debug!(call_id, tool = %name, status = %next, "Tool call status changed");
        self.emit(SchedulerEvent::StatusChanged {
            call_id: call_id.to_string(),
            name,
            status: next,
        });
        true
    }

    fn fail(&self, call_id: &str, message: String, category: ErrorCategory) {
        self.update(call_id, |state| {
            state.error = Some(message);
            state.error_category = Some(category);
        });
        self.transition(call_id, ToolCallStatus::Error);
    }

    fn cancel_call(&self, call_id: &str, reason: CancelReason) {
        let previous = self.update(call_id, |state| state.cancel_reason.replace(reason));
        if !self.transition(call_id, ToolCallStatus::Cancelled) {
            self.update(call_id, |state| state.cancel_reason = previous.flatten());
        }
    }

    fn finish(&self, call_id: &str, outcome: Result<ToolOutput, RheoError>) {
        let status = match outcome {
            Ok(output) => {
                let failed = output.error.clone();
                self.update(call_id, |state| {
                    state.result = Some(output);
                    if let Some(message) = &failed {
                        state.error = Some(message.clone());
                        state.error_category = Some(ErrorCategory::ToolExecution);
                    }
                });
                if failed.is_some() {
                    ToolCallStatus::Error
                } else {
                    ToolCallStatus::Success
                }
            }
            Err(error) => {
                self.update(call_id, |state| {
                    state.error = Some(error.to_string());
                    state.error_category = Some(match error.category() {
                        ErrorCategory::Validation => ErrorCategory::Validation,
                        ErrorCategory::Canceled => ErrorCategory::Canceled,
                        _ => ErrorCategory::ToolExecution,
                    });
                });
                ToolCallStatus::Error
            }
        };
        self.transition(call_id, status);
    }

    async fn execute(
        self: Arc<Self>,
        call_id: String,
        tool: Arc<dyn Tool>,
        args: ToolArguments,
        request: ToolCallRequest,
        cancel: CancellationToken,
    ) {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            permit = self.semaphore.clone().acquire_owned() => permit.ok(),
        };
        let Some(_permit) = permit else {
            self.cancel_call(&call_id, CancelReason::Aborted);
            self.check_completion();
            return;
        };
        if cancel.is_cancelled() {
            self.cancel_call(&call_id, CancelReason::Aborted);
            self.check_completion();
            return;
        }
        if !self.transition(&call_id, ToolCallStatus::Executing) {
            self.check_completion();
            return;
        }

        let ctx = ToolExecutionContext {
            call_id: call_id.clone(),
            prompt_id: request.prompt_id.clone(),
        };
        let on_output: OutputCallback = {
            let shared = self.clone();
            let call_id = call_id.clone();
            Arc::new(move |chunk: String| {
                shared.emit(SchedulerEvent::OutputUpdate {
                    call_id: call_id.clone(),
                    chunk,
                });
            })
        };

        // Runs to completion even after an abort; the tool decides how to stop.
        let outcome = tool.execute(&args, &ctx, cancel, Some(on_output)).await;
        if let Err(error) = &outcome {
            tracing::debug!(
                call_id = %call_id,
                tool = %request.name,
                %error,
                "Tool execution failed"
            );
        }
        self.finish(&call_id, outcome);
        self.check_completion();
    }

    /// Send the batch's completion exactly once, after its last call ends.
    fn check_completion(&self) {
        let completed = {
            let mut active = self.lock();
            let Some(batch) = active.as_mut() else {
                return;
            };
            if batch.notified || !batch.all_terminal() {
                return;
            }
            batch.notified = true;
            CompletedBatch {
                batch_id: batch.id,
                calls: batch.ordered(),
            }
        };
        tracing::debug!(
            batch_id = completed.batch_id,
            calls = completed.calls.len(),
            "Tool batch complete"
        );
        self.emit(SchedulerEvent::BatchCompleted {
            batch_id: completed.batch_id,
            call_ids: completed
                .calls
                .iter()
                .map(|call| call.request.call_id.clone())
                .collect(),
        });
        let _ = self.completions.send(completed);
    }
}
