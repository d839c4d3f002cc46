//! Pipeline coordinator: validates, seeds, launches and joins workers.

use std::fmt::Display;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{error, info};

use super::error::PipelineError;
use super::events::{EventSink, PipelineEvent};
use super::guard::{FatalGuard, GuardState};
use super::stage::StageConfig;
use super::state::{PipelineState, StageSnapshot};
use super::worker::Worker;

/// Default upper bound on workers for a single stage.
pub const DEFAULT_MAX_WORKERS_PER_STAGE: usize = 64;

/// Default queue depth at which a warning is logged.
pub const DEFAULT_QUEUE_WARN_DEPTH: usize = 100_000;

/// Engine tuning shared by every stage of a pipeline.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Upper bound on how long an idle worker sleeps before re-polling.
    pub poll_interval: Duration,
    pub queue_warn_depth: usize,
    pub max_workers_per_stage: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            queue_warn_depth: DEFAULT_QUEUE_WARN_DEPTH,
            max_workers_per_stage: DEFAULT_MAX_WORKERS_PER_STAGE,
        }
    }
}

/// Final statistics for one stage.
#[derive(Debug, Clone)]
pub struct StageReport {
    pub workers: usize,
    pub stats: StageSnapshot,
}

impl StageReport {
    pub fn name(&self) -> &str {
        &self.stats.name
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub name: String,
    pub stages: Vec<StageReport>,
    pub guard: GuardState,
    pub elapsed: Duration,
}

impl PipelineReport {
    pub fn stage(&self, name: &str) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.name() == name)
    }

    /// True when every queue is empty and nothing is left in flight.
    pub fn is_drained(&self) -> bool {
        self.stages
            .iter()
            .all(|s| s.stats.remaining == 0 && s.stats.active == 0)
    }

    pub fn total_failed(&self) -> u64 {
        self.stages.iter().map(|s| s.stats.failed).sum()
    }
}

/// A chain of stages run to natural completion.
pub struct Pipeline<T> {
    name: String,
    stages: Vec<StageConfig<T>>,
    options: EngineOptions,
    events: Option<mpsc::Sender<PipelineEvent>>,
}

impl<T> Pipeline<T>
where
    T: Display + Send + 'static,
{
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
            options: EngineOptions::default(),
            events: None,
        }
    }

    /// Append a stage. Stages run downstream in the order they are added.
    pub fn stage(mut self, config: StageConfig<T>) -> Self {
        self.stages.push(config);
        self
    }

    pub fn options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn events(mut self, tx: mpsc::Sender<PipelineEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    /// Check stage configuration and seeds without starting anything.
    pub fn validate(&self, seeds: &[Vec<T>]) -> Result<(), PipelineError> {
        if self.stages.is_empty() {
            return Err(PipelineError::NoStages);
        }

        let max = self.options.max_workers_per_stage;
        for stage in &self.stages {
            if stage.workers == 0 || stage.workers > max {
                return Err(PipelineError::InvalidWorkerCount {
                    stage: stage.name.clone(),
                    count: stage.workers,
                    max,
                });
            }
        }

        if seeds.len() > self.stages.len() {
            return Err(PipelineError::TooManySeedLists {
                given: seeds.len(),
                stages: self.stages.len(),
            });
        }

        if seeds.iter().all(|s| s.is_empty()) {
            return Err(PipelineError::NoWork);
        }

        Ok(())
    }

    /// Run until every worker of every stage has exited.
    ///
    /// `seeds[i]` is enqueued on stage `i` before any worker starts. Errors
    /// are only returned for setup problems; per-item failures show up in
    /// the report.
    pub async fn run(self, seeds: Vec<Vec<T>>) -> Result<PipelineReport, PipelineError> {
        self.validate(&seeds)?;

        let started = Instant::now();
        let state = Arc::new(PipelineState::new(
            self.stages.iter().map(|s| s.name.clone()),
            self.options.queue_warn_depth,
        ));
        let guard = Arc::new(FatalGuard::new());
        let events = EventSink::new(self.events.clone());

        let mut seeded = vec![0usize; self.stages.len()];
        for (stage, items) in seeds.into_iter().enumerate() {
            seeded[stage] = items.len();
            state.enqueue_many(stage, items);
        }

        // Every worker is counted live before any of them runs, so no
        // downstream worker can see an upstream stage as finished early.
        for (index, stage) in self.stages.iter().enumerate() {
            for _ in 0..stage.workers {
                state.worker_started(index);
            }
        }

        info!(
            "Starting pipeline '{}' with stages [{}]",
            self.name,
            self.stage_names().join(" -> ")
        );

        let mut handles = Vec::new();
        for (index, stage) in self.stages.iter().enumerate() {
            events
                .emit(PipelineEvent::StageStarted {
                    stage: stage.name.clone(),
                    workers: stage.workers,
                    seeded: seeded[index],
                })
                .await;

            for id in 0..stage.workers {
                let worker = Worker {
                    id,
                    stage: index,
                    config: stage.clone(),
                    state: Arc::clone(&state),
                    guard: Arc::clone(&guard),
                    poll_interval: self.options.poll_interval,
                    events: events.clone(),
                };
                handles.push(tokio::spawn(worker.run()));
            }
        }

        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                error!("Worker task in pipeline '{}' failed: {}", self.name, e);
            }
        }

        let stages: Vec<StageReport> = self
            .stages
            .iter()
            .enumerate()
            .map(|(index, stage)| StageReport {
                workers: stage.workers,
                stats: state.snapshot(index),
            })
            .collect();

        let report = PipelineReport {
            name: self.name,
            stages,
            guard: guard.state(),
            elapsed: started.elapsed(),
        };

        if !report.is_drained() {
            error!(
                "Pipeline '{}' finished with work still queued or active",
                report.name
            );
        }
        info!(
            "Pipeline '{}' finished in {:.1}s",
            report.name,
            report.elapsed.as_secs_f64()
        );

        Ok(report)
    }
}
