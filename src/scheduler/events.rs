//! Observer notifications from the scheduler.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::state::ToolCallStatus;
use crate::tools::ConfirmationDetails;

/// What the scheduler reports to UIs.
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerEvent {
    StatusChanged {
        call_id: String,
        name: String,
        status: ToolCallStatus,
    },
    AwaitingApproval {
        call_id: String,
        name: String,
        details: ConfirmationDetails,
    },
    /// Incremental output from a running tool.
    OutputUpdate { call_id: String, chunk: String },
    BatchCompleted { batch_id: u64, call_ids: Vec<String> },
}

/// Callback receiving scheduler events.
pub type SchedulerObserver = Arc<dyn Fn(SchedulerEvent) + Send + Sync>;

/// An observer paired with the stream it feeds.
pub fn observer_channel() -> (SchedulerObserver, UnboundedReceiverStream<SchedulerEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let observer: SchedulerObserver = Arc::new(move |event| {
        let _ = tx.send(event);
    });
    (observer, UnboundedReceiverStream::new(rx))
}
