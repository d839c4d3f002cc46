//! Work queue engine tests.
//!
//! Exercise fan-out, fatal-guard halting, failure isolation, panics and
//! setup validation through the public `Pipeline` API.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use ytacquire::repository::{MemoryVideoStore, VideoStore};
use ytacquire::work_queue::{
    DelegateError, EngineOptions, GuardState, Pipeline, PipelineError, PipelineEvent, Routed,
    StageConfig, StageDelegate,
};

fn fast_options() -> EngineOptions {
    EngineOptions {
        poll_interval: Duration::from_millis(10),
        ..EngineOptions::default()
    }
}

/// Emits `children` derived items per input, routed to `target`.
struct FanOut {
    target: usize,
    children: usize,
}

#[async_trait]
impl StageDelegate<String> for FanOut {
    async fn process(&self, item: String) -> Result<Vec<Routed<String>>, DelegateError> {
        Ok((0..self.children)
            .map(|i| Routed::to(self.target, format!("{}-{}", item, i)))
            .collect())
    }
}

/// Records every item it sees.
#[derive(Default)]
struct Collect {
    seen: Mutex<Vec<String>>,
}

#[async_trait]
impl StageDelegate<String> for Collect {
    async fn process(&self, item: String) -> Result<Vec<Routed<String>>, DelegateError> {
        self.seen.lock().unwrap().push(item);
        Ok(Vec::new())
    }
}

/// Fails with `error` for one specific item, succeeds for the rest.
struct FailOn {
    item: String,
    fatal: bool,
    calls: Mutex<Vec<String>>,
}

#[async_trait]
impl StageDelegate<String> for FailOn {
    async fn process(&self, item: String) -> Result<Vec<Routed<String>>, DelegateError> {
        self.calls.lock().unwrap().push(item.clone());
        if item == self.item {
            if self.fatal {
                return Err(DelegateError::QuotaExceeded("daily quota".into()));
            }
            return Err(DelegateError::NotFound(item));
        }
        Ok(Vec::new())
    }
}

fn items(prefix: &str, n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("{}{}", prefix, i)).collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fan_out_reaches_next_stage() {
    let collect = Arc::new(Collect::default());
    let report = Pipeline::new("fanout")
        .stage(StageConfig::new(
            "parents",
            2,
            Arc::new(FanOut {
                target: 1,
                children: 2,
            }),
        ))
        .stage(StageConfig::new("children", 3, collect.clone()))
        .options(fast_options())
        .run(vec![items("p", 3)])
        .await
        .unwrap();

    let seen: HashSet<String> = collect.seen.lock().unwrap().iter().cloned().collect();
    assert_eq!(seen.len(), 6);
    assert!(seen.contains("p1-0") && seen.contains("p3-1"));

    let children = report.stage("children").unwrap();
    assert_eq!(children.stats.enqueued, 6);
    assert_eq!(children.stats.succeeded, 6);
    assert!(report.is_drained());
    assert_eq!(report.guard, GuardState::Clear);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn quota_error_halts_guarded_stage() {
    let delegate = Arc::new(FailOn {
        item: "b2".into(),
        fatal: true,
        calls: Mutex::new(Vec::new()),
    });

    let report = Pipeline::new("quota")
        .stage(StageConfig::new("retrieve", 1, delegate.clone()).guarded())
        .options(fast_options())
        .run(vec![items("b", 5)])
        .await
        .unwrap();

    assert_eq!(*delegate.calls.lock().unwrap(), vec!["b1", "b2"]);
    assert_eq!(
        report.guard,
        GuardState::SetWithReason("Quota exceeded: daily quota".into())
    );

    let stats = &report.stage("retrieve").unwrap().stats;
    assert_eq!(stats.succeeded, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.discarded, 3);
    assert!(report.is_drained());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unguarded_stage_finishes_after_guard_trips() {
    // Stage 0 fans out then trips the guard on its second item; stage 1 is
    // unguarded and must still process everything it was given.
    struct FanThenQuota;

    #[async_trait]
    impl StageDelegate<String> for FanThenQuota {
        async fn process(&self, item: String) -> Result<Vec<Routed<String>>, DelegateError> {
            if item == "q2" {
                return Err(DelegateError::RateLimited("429".into()));
            }
            Ok(vec![Routed::to(1, format!("{}-a", item)), Routed::to(1, format!("{}-b", item))])
        }
    }

    let collect = Arc::new(Collect::default());
    let report = Pipeline::new("mixed")
        .stage(StageConfig::new("retrieve", 1, Arc::new(FanThenQuota)).guarded())
        .stage(StageConfig::new("save", 4, collect.clone()))
        .options(fast_options())
        .run(vec![items("q", 4)])
        .await
        .unwrap();

    assert!(report.guard.is_set());
    let mut seen = collect.seen.lock().unwrap().clone();
    seen.sort();
    assert_eq!(seen, vec!["q1-a", "q1-b"]);
    assert_eq!(report.stage("retrieve").unwrap().stats.discarded, 2);
    assert!(report.is_drained());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn single_failure_does_not_stop_others() {
    let delegate = Arc::new(FailOn {
        item: "v7".into(),
        fatal: false,
        calls: Mutex::new(Vec::new()),
    });

    let report = Pipeline::new("isolation")
        .stage(StageConfig::new("videos", 3, delegate.clone()).guarded())
        .options(fast_options())
        .run(vec![items("v", 10)])
        .await
        .unwrap();

    let stats = &report.stage("videos").unwrap().stats;
    assert_eq!(stats.succeeded, 9);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.completed, stats.dequeued);
    assert_eq!(delegate.calls.lock().unwrap().len(), 10);
    assert_eq!(report.guard, GuardState::Clear);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn panicking_delegate_keeps_worker_alive() {
    struct PanicOnce {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl StageDelegate<String> for PanicOnce {
        async fn process(&self, item: String) -> Result<Vec<Routed<String>>, DelegateError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if item == "x1" {
                panic!("delegate bug");
            }
            Ok(Vec::new())
        }
    }

    let delegate = Arc::new(PanicOnce {
        calls: AtomicUsize::new(0),
    });
    let report = Pipeline::new("panics")
        .stage(StageConfig::new("only", 1, delegate.clone()))
        .options(fast_options())
        .run(vec![items("x", 3)])
        .await
        .unwrap();

    assert_eq!(delegate.calls.load(Ordering::SeqCst), 3);
    let stats = &report.stage("only").unwrap().stats;
    assert_eq!(stats.panicked, 1);
    assert_eq!(stats.succeeded, 2);
    assert!(report.is_drained());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn seeds_on_later_stage_only() {
    let collect = Arc::new(Collect::default());
    let report = Pipeline::new("late")
        .stage(StageConfig::new(
            "first",
            2,
            Arc::new(FanOut {
                target: 1,
                children: 1,
            }),
        ))
        .stage(StageConfig::new("second", 2, collect.clone()))
        .options(fast_options())
        .run(vec![Vec::new(), items("s", 4)])
        .await
        .unwrap();

    assert_eq!(collect.seen.lock().unwrap().len(), 4);
    assert_eq!(report.stage("first").unwrap().stats.dequeued, 0);
}

#[tokio::test]
async fn events_follow_the_run() {
    let (tx, mut rx) = mpsc::channel(1024);
    let collect = Arc::new(Collect::default());

    Pipeline::new("events")
        .stage(StageConfig::new("only", 2, collect))
        .options(fast_options())
        .events(tx)
        .run(vec![items("e", 3)])
        .await
        .unwrap();

    let mut completed = 0;
    let mut stage_done = 0;
    let mut exited = 0;
    while let Some(event) = rx.recv().await {
        match event {
            PipelineEvent::ItemCompleted { .. } => completed += 1,
            PipelineEvent::StageCompleted { succeeded, .. } => {
                stage_done += 1;
                assert_eq!(succeeded, 3);
            }
            PipelineEvent::WorkerExited { .. } => exited += 1,
            _ => {}
        }
    }
    assert_eq!(completed, 3);
    assert_eq!(stage_done, 1);
    assert_eq!(exited, 2);
}

#[tokio::test]
async fn dropped_event_receiver_does_not_matter() {
    let (tx, rx) = mpsc::channel(1);
    drop(rx);

    let report = Pipeline::new("deaf")
        .stage(StageConfig::new("only", 2, Arc::new(Collect::default())))
        .options(fast_options())
        .events(tx)
        .run(vec![items("d", 5)])
        .await
        .unwrap();
    assert_eq!(report.stage("only").unwrap().stats.succeeded, 5);
}

#[tokio::test]
async fn setup_errors() {
    let collect = || Arc::new(Collect::default());

    let none: Pipeline<String> = Pipeline::new("empty");
    assert!(matches!(
        none.run(vec![items("a", 1)]).await,
        Err(PipelineError::NoStages)
    ));

    let zero = Pipeline::new("zero").stage(StageConfig::new("only", 0, collect()));
    assert!(matches!(
        zero.run(vec![items("a", 1)]).await,
        Err(PipelineError::InvalidWorkerCount { count: 0, .. })
    ));

    let too_many = Pipeline::new("wide").stage(StageConfig::new("only", 65, collect()));
    assert!(matches!(
        too_many.run(vec![items("a", 1)]).await,
        Err(PipelineError::InvalidWorkerCount { count: 65, max: 64, .. })
    ));

    let extra_seeds = Pipeline::new("seeds").stage(StageConfig::new("only", 1, collect()));
    assert!(matches!(
        extra_seeds.run(vec![items("a", 1), items("b", 1)]).await,
        Err(PipelineError::TooManySeedLists { given: 2, stages: 1 })
    ));

    let nothing = Pipeline::new("idle").stage(StageConfig::new("only", 1, collect()));
    assert!(matches!(
        nothing.run(vec![Vec::new()]).await,
        Err(PipelineError::NoWork)
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn discovery_writes_are_idempotent() {
    struct Persist {
        store: Arc<MemoryVideoStore>,
    }

    #[async_trait]
    impl StageDelegate<String> for Persist {
        async fn process(&self, item: String) -> Result<Vec<Routed<String>>, DelegateError> {
            self.store.seed_pending(&[item]).await?;
            Ok(Vec::new())
        }
    }

    let store = Arc::new(MemoryVideoStore::new());
    let mut seeds = items("id", 20);
    seeds.extend(items("id", 20));

    for _ in 0..2 {
        Pipeline::new("persist")
            .stage(StageConfig::new(
                "videos",
                8,
                Arc::new(Persist {
                    store: store.clone(),
                }),
            ))
            .options(fast_options())
            .run(vec![seeds.clone()])
            .await
            .unwrap();
    }

    assert_eq!(store.counts().await.unwrap().ids, 20);
}
