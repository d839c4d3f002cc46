//! Shared per-run queue state.
//!
//! Each stage owns a FIFO of pending items and a count of items that have
//! been popped but not yet finished. Both live under one lock so that
//! "queue empty and nothing active" is observed as a single snapshot.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use tokio::sync::Notify;
use tracing::{error, warn};

/// Pending items and in-flight count for one stage.
#[derive(Debug)]
pub struct StageQueue<T> {
    items: VecDeque<T>,
    active: usize,
    depth_warned: bool,
}

impl<T> Default for StageQueue<T> {
    fn default() -> Self {
        Self {
            items: VecDeque::new(),
            active: 0,
            depth_warned: false,
        }
    }
}

impl<T> StageQueue<T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn active(&self) -> usize {
        self.active
    }

    fn is_exhausted(&self) -> bool {
        self.items.is_empty() && self.active == 0
    }
}

/// Monotonic per-stage counters. Diagnostic only.
#[derive(Debug, Default)]
struct StageStats {
    enqueued: AtomicU64,
    dequeued: AtomicU64,
    completed: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    discarded: AtomicU64,
    panicked: AtomicU64,
}

/// Point-in-time copy of a stage's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageSnapshot {
    pub name: String,
    pub enqueued: u64,
    pub dequeued: u64,
    pub completed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub discarded: u64,
    pub panicked: u64,
    pub remaining: usize,
    pub active: usize,
}

struct StageSlot<T> {
    name: String,
    queue: Mutex<StageQueue<T>>,
    stats: StageStats,
    live_workers: AtomicUsize,
    wake: Notify,
}

/// Queues, counters and wake signals for every stage of one pipeline run.
///
/// Stages are addressed by index; index order is the topological order, so
/// every stage below `i` is upstream of `i`.
pub struct PipelineState<T> {
    stages: Vec<StageSlot<T>>,
    warn_depth: usize,
}

impl<T> PipelineState<T> {
    /// Create state for the named stages. A `warn_depth` of zero disables
    /// the queue depth warning.
    pub fn new<S: Into<String>>(names: impl IntoIterator<Item = S>, warn_depth: usize) -> Self {
        let stages = names
            .into_iter()
            .map(|name| StageSlot {
                name: name.into(),
                queue: Mutex::new(StageQueue::default()),
                stats: StageStats::default(),
                live_workers: AtomicUsize::new(0),
                wake: Notify::new(),
            })
            .collect();
        Self { stages, warn_depth }
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    fn lock(&self, stage: usize) -> MutexGuard<'_, StageQueue<T>> {
        // A poisoned lock still holds consistent data: nothing panics while
        // the queue is half-updated.
        self.stages[stage]
            .queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append an item to a stage's queue. Never blocks on anything but the
    /// stage lock and never fails.
    pub fn enqueue(&self, stage: usize, item: T) {
        self.enqueue_many(stage, std::iter::once(item));
    }

    /// Append several items under one lock acquisition.
    pub fn enqueue_many(&self, stage: usize, items: impl IntoIterator<Item = T>) {
        let slot = &self.stages[stage];
        let added = {
            let mut queue = self.lock(stage);
            let before = queue.items.len();
            queue.items.extend(items);
            let added = queue.items.len() - before;
            if self.warn_depth > 0 && !queue.depth_warned && queue.items.len() >= self.warn_depth
            {
                queue.depth_warned = true;
                warn!(
                    "Stage '{}' queue depth reached {} items",
                    slot.name,
                    queue.items.len()
                );
            }
            added
        };
        if added > 0 {
            slot.stats
                .enqueued
                .fetch_add(added as u64, Ordering::Relaxed);
            slot.wake.notify_waiters();
        }
    }

    /// Pop the head item and count it as active, in one step.
    pub fn try_dequeue(&self, stage: usize) -> Option<T> {
        let item = {
            let mut queue = self.lock(stage);
            let item = queue.items.pop_front();
            if item.is_some() {
                queue.active += 1;
                self.rearm_depth_warning(&mut queue);
            }
            item
        };
        if item.is_some() {
            self.stages[stage]
                .stats
                .dequeued
                .fetch_add(1, Ordering::Relaxed);
        }
        item
    }

    /// Remove every queued item without marking any of them active.
    pub fn drain(&self, stage: usize) -> Vec<T> {
        let mut queue = self.lock(stage);
        let drained: Vec<T> = queue.items.drain(..).collect();
        self.rearm_depth_warning(&mut queue);
        drained
    }

    fn rearm_depth_warning(&self, queue: &mut StageQueue<T>) {
        if queue.depth_warned && queue.items.len() < self.warn_depth / 2 {
            queue.depth_warned = false;
        }
    }

    /// Finish one previously dequeued item.
    pub fn mark_done(&self, stage: usize) {
        let slot = &self.stages[stage];
        {
            let mut queue = self.lock(stage);
            if queue.active == 0 {
                error!("mark_done on stage '{}' with no active items", slot.name);
            } else {
                queue.active -= 1;
            }
        }
        slot.stats.completed.fetch_add(1, Ordering::Relaxed);
        slot.wake.notify_waiters();
    }

    /// True iff the queue is empty and nothing is in flight, read under one lock.
    pub fn is_stage_exhausted(&self, stage: usize) -> bool {
        self.lock(stage).is_exhausted()
    }

    pub fn queue_len(&self, stage: usize) -> usize {
        self.lock(stage).len()
    }

    pub fn active(&self, stage: usize) -> usize {
        self.lock(stage).active()
    }

    pub(crate) fn worker_started(&self, stage: usize) {
        self.stages[stage]
            .live_workers
            .fetch_add(1, Ordering::AcqRel);
    }

    /// Record a worker exit. Returns true if it was the stage's last worker.
    pub(crate) fn worker_exited(&self, stage: usize) -> bool {
        let previous = self.stages[stage]
            .live_workers
            .fetch_sub(1, Ordering::AcqRel);
        previous == 1
    }

    pub fn live_workers(&self, stage: usize) -> usize {
        self.stages[stage].live_workers.load(Ordering::Acquire)
    }

    /// True once every stage upstream of `stage` has no live workers left.
    pub fn upstream_finished(&self, stage: usize) -> bool {
        self.stages[..stage]
            .iter()
            .all(|slot| slot.live_workers.load(Ordering::Acquire) == 0)
    }

    pub(crate) fn wake_signal(&self, stage: usize) -> &Notify {
        &self.stages[stage].wake
    }

    /// Wake idle workers of every stage downstream of `stage`.
    pub(crate) fn wake_downstream(&self, stage: usize) {
        for slot in &self.stages[stage + 1..] {
            slot.wake.notify_waiters();
        }
    }

    pub(crate) fn wake_all(&self) {
        for slot in &self.stages {
            slot.wake.notify_waiters();
        }
    }

    pub(crate) fn record_success(&self, stage: usize) {
        self.stages[stage]
            .stats
            .succeeded
            .fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self, stage: usize) {
        self.stages[stage]
            .stats
            .failed
            .fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_panic(&self, stage: usize) {
        let stats = &self.stages[stage].stats;
        stats.panicked.fetch_add(1, Ordering::Relaxed);
        stats.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_discarded(&self, stage: usize, count: usize) {
        self.stages[stage]
            .stats
            .discarded
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self, stage: usize) -> StageSnapshot {
        let slot = &self.stages[stage];
        let (remaining, active) = {
            let queue = self.lock(stage);
            (queue.len(), queue.active())
        };
        StageSnapshot {
            name: slot.name.clone(),
            enqueued: slot.stats.enqueued.load(Ordering::Relaxed),
            dequeued: slot.stats.dequeued.load(Ordering::Relaxed),
            completed: slot.stats.completed.load(Ordering::Relaxed),
            succeeded: slot.stats.succeeded.load(Ordering::Relaxed),
            failed: slot.stats.failed.load(Ordering::Relaxed),
            discarded: slot.stats.discarded.load(Ordering::Relaxed),
            panicked: slot.stats.panicked.load(Ordering::Relaxed),
            remaining,
            active,
        }
    }
}
