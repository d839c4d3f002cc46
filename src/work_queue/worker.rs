//! Per-stage worker loop.
//!
//! A worker cycles POLLING -> PROCESSING -> ROUTING -> POLLING until its
//! stage can no longer receive work, then EXITED. It exits only after every
//! upstream stage has lost all of its workers and its own stage is
//! exhausted; upstream is checked first so that anything an upstream worker
//! enqueued before exiting is visible to the exhaustion check.

use std::any::Any;
use std::fmt::Display;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tracing::{debug, error, info, warn};

use super::events::{EventSink, PipelineEvent};
use super::guard::FatalGuard;
use super::stage::{Routed, StageConfig};
use super::state::PipelineState;

enum WorkerState<T> {
    Polling,
    Processing(T),
    Routing(Vec<Routed<T>>),
    Exited,
}

pub(crate) struct Worker<T> {
    pub(crate) id: usize,
    pub(crate) stage: usize,
    pub(crate) config: StageConfig<T>,
    pub(crate) state: Arc<PipelineState<T>>,
    pub(crate) guard: Arc<FatalGuard>,
    pub(crate) poll_interval: Duration,
    pub(crate) events: EventSink,
}

impl<T> Worker<T>
where
    T: Display + Send + 'static,
{
    pub(crate) async fn run(self) {
        debug!("Worker {}#{} started", self.config.name, self.id);

        let mut current = WorkerState::Polling;
        loop {
            current = match current {
                WorkerState::Polling => self.poll().await,
                WorkerState::Processing(item) => self.process(item).await,
                WorkerState::Routing(routed) => {
                    self.route(routed);
                    self.state.mark_done(self.stage);
                    WorkerState::Polling
                }
                WorkerState::Exited => break,
            };
        }

        self.exit().await;
    }

    async fn poll(&self) -> WorkerState<T> {
        loop {
            // Register for wakeups before checking, so an enqueue that lands
            // between the check and the wait is not missed.
            let wake = self.state.wake_signal(self.stage).notified();
            tokio::pin!(wake);
            wake.as_mut().enable();

            if self.config.guarded && self.guard.is_set() {
                let dropped = self.state.drain(self.stage);
                if !dropped.is_empty() {
                    self.state.record_discarded(self.stage, dropped.len());
                    debug!(
                        "Stage '{}' discarded {} queued items after fatal guard",
                        self.config.name,
                        dropped.len()
                    );
                    self.events
                        .emit(PipelineEvent::ItemsDiscarded {
                            stage: self.config.name.clone(),
                            count: dropped.len(),
                        })
                        .await;
                }
            } else if let Some(item) = self.state.try_dequeue(self.stage) {
                return WorkerState::Processing(item);
            }

            if self.state.upstream_finished(self.stage)
                && self.state.is_stage_exhausted(self.stage)
            {
                return WorkerState::Exited;
            }

            let _ = tokio::time::timeout(self.poll_interval, wake).await;
        }
    }

    async fn process(&self, item: T) -> WorkerState<T> {
        let label = item.to_string();
        debug!("[{}#{}] processing {}", self.config.name, self.id, label);
        self.events
            .emit(PipelineEvent::ItemStarted {
                stage: self.config.name.clone(),
                item: label.clone(),
            })
            .await;

        let outcome = AssertUnwindSafe(self.config.delegate.process(item))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(routed)) => {
                self.state.record_success(self.stage);
                self.events
                    .emit(PipelineEvent::ItemCompleted {
                        stage: self.config.name.clone(),
                        item: label,
                        routed: routed.len(),
                    })
                    .await;
                WorkerState::Routing(routed)
            }
            Ok(Err(e)) => {
                self.state.record_failure(self.stage);
                let fatal = e.is_fatal();
                if fatal {
                    let reason = e.to_string();
                    if self.guard.trip(Some(reason.clone())) {
                        error!(
                            "[{}#{}] fatal error on {}, halting guarded stages: {}",
                            self.config.name, self.id, label, reason
                        );
                        self.state.wake_all();
                        self.events
                            .emit(PipelineEvent::GuardTripped {
                                stage: self.config.name.clone(),
                                reason,
                            })
                            .await;
                    } else {
                        warn!(
                            "[{}#{}] fatal error on {} after guard was set: {}",
                            self.config.name, self.id, label, e
                        );
                    }
                } else {
                    warn!("[{}#{}] {} failed: {}", self.config.name, self.id, label, e);
                }
                self.events
                    .emit(PipelineEvent::ItemFailed {
                        stage: self.config.name.clone(),
                        item: label,
                        error: e.to_string(),
                        fatal,
                    })
                    .await;
                WorkerState::Routing(Vec::new())
            }
            Err(panic) => {
                self.state.record_panic(self.stage);
                let message = panic_message(panic.as_ref());
                error!(
                    "[{}#{}] delegate panicked on {}: {}",
                    self.config.name, self.id, label, message
                );
                self.events
                    .emit(PipelineEvent::ItemFailed {
                        stage: self.config.name.clone(),
                        item: label,
                        error: format!("panic: {}", message),
                        fatal: false,
                    })
                    .await;
                WorkerState::Routing(Vec::new())
            }
        }
    }

    fn route(&self, routed: Vec<Routed<T>>) {
        if routed.is_empty() {
            return;
        }

        let stage_count = self.state.stage_count();
        if self.stage + 1 == stage_count {
            warn!(
                "Terminal stage '{}' returned {} items, discarding",
                self.config.name,
                routed.len()
            );
            return;
        }

        for Routed { stage, item } in routed {
            if stage <= self.stage || stage >= stage_count {
                warn!(
                    "Stage '{}' routed {} to stage {}, which is not downstream",
                    self.config.name, item, stage
                );
                continue;
            }
            self.state.enqueue(stage, item);
        }
    }

    async fn exit(&self) {
        let last = self.state.worker_exited(self.stage);
        debug!("Worker {}#{} exited", self.config.name, self.id);
        self.events
            .emit(PipelineEvent::WorkerExited {
                stage: self.config.name.clone(),
                worker: self.id,
            })
            .await;

        if last {
            self.state.wake_downstream(self.stage);
            let snap = self.state.snapshot(self.stage);
            info!(
                "Stage '{}' finished: {} succeeded, {} failed, {} discarded",
                snap.name, snap.succeeded, snap.failed, snap.discarded
            );
            self.events
                .emit(PipelineEvent::StageCompleted {
                    stage: snap.name,
                    succeeded: snap.succeeded,
                    failed: snap.failed,
                    discarded: snap.discarded,
                })
                .await;
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
