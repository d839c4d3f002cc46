//! Progress events emitted while a pipeline runs.
//!
//! Events are advisory. A slow or dropped receiver never changes the
//! outcome of a run.

use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub enum PipelineEvent {
    StageStarted {
        stage: String,
        workers: usize,
        seeded: usize,
    },
    ItemStarted {
        stage: String,
        item: String,
    },
    ItemCompleted {
        stage: String,
        item: String,
        routed: usize,
    },
    ItemFailed {
        stage: String,
        item: String,
        error: String,
        fatal: bool,
    },
    ItemsDiscarded {
        stage: String,
        count: usize,
    },
    GuardTripped {
        stage: String,
        reason: String,
    },
    WorkerExited {
        stage: String,
        worker: usize,
    },
    StageCompleted {
        stage: String,
        succeeded: u64,
        failed: u64,
        discarded: u64,
    },
}

/// Optional event sink shared by the coordinator and its workers.
#[derive(Clone, Default)]
pub(crate) struct EventSink {
    tx: Option<mpsc::Sender<PipelineEvent>>,
}

impl EventSink {
    pub(crate) fn new(tx: Option<mpsc::Sender<PipelineEvent>>) -> Self {
        Self { tx }
    }

    pub(crate) async fn emit(&self, event: PipelineEvent) {
        if let Some(ref tx) = self.tx {
            let _ = tx.send(event).await;
        }
    }
}
