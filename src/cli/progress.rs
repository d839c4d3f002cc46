//! Run progress display: a spinner fed by pipeline events and a final summary.

use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::work_queue::{GuardState, PipelineEvent, PipelineReport};

/// Running totals kept by the event consumer.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EventTally {
    pub completed: usize,
    pub failed: usize,
    pub discarded: usize,
}

impl EventTally {
    fn apply(&mut self, event: &PipelineEvent) {
        match event {
            PipelineEvent::ItemCompleted { .. } => self.completed += 1,
            PipelineEvent::ItemFailed { .. } => self.failed += 1,
            PipelineEvent::ItemsDiscarded { count, .. } => self.discarded += count,
            _ => {}
        }
    }

    fn message(&self, current: &str) -> String {
        format!(
            "{} done, {} failed | {}",
            self.completed, self.failed, current
        )
    }
}

/// Spawn a spinner that follows `PipelineEvent`s until the sender side closes.
pub fn spawn_progress(label: &str) -> (mpsc::Sender<PipelineEvent>, JoinHandle<EventTally>) {
    let (tx, mut rx) = mpsc::channel::<PipelineEvent>(256);

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message(format!("Starting {}...", label));

    let handle = tokio::spawn(async move {
        let mut tally = EventTally::default();
        while let Some(event) = rx.recv().await {
            tally.apply(&event);
            match event {
                PipelineEvent::StageStarted {
                    stage,
                    workers,
                    seeded,
                } if seeded > 0 => {
                    pb.println(format!(
                        "{} {}: {} workers, {} seeded",
                        style("→").cyan(),
                        stage,
                        workers,
                        seeded
                    ));
                }
                PipelineEvent::ItemStarted { stage, item } => {
                    pb.set_message(tally.message(&format!("{}: {}", stage, item)));
                }
                PipelineEvent::ItemFailed {
                    stage,
                    item,
                    error,
                    fatal: false,
                } => {
                    pb.println(format!(
                        "{} {} {}: {}",
                        style("✗").red(),
                        stage,
                        item,
                        error
                    ));
                }
                PipelineEvent::GuardTripped { stage, reason } => {
                    pb.println(format!(
                        "{} {} hit a fatal error, stopping new work: {}",
                        style("!").yellow(),
                        stage,
                        reason
                    ));
                }
                PipelineEvent::StageCompleted { stage, .. } => {
                    pb.set_message(tally.message(&format!("{} finished", stage)));
                }
                _ => {}
            }
        }
        pb.finish_and_clear();
        tally
    });

    (tx, handle)
}

/// Print the per-stage summary table and any guard warning.
pub fn print_report(report: &PipelineReport) {
    println!(
        "\n{} {} finished in {:.1}s",
        style("✓").green(),
        report.name,
        report.elapsed.as_secs_f64()
    );
    println!(
        "  {:<12} {:>8} {:>10} {:>8} {:>10} {:>8}",
        style("stage").bold(),
        style("workers").bold(),
        style("succeeded").bold(),
        style("failed").bold(),
        style("discarded").bold(),
        style("panics").bold()
    );
    for stage in &report.stages {
        let stats = &stage.stats;
        println!(
            "  {:<12} {:>8} {:>10} {:>8} {:>10} {:>8}",
            stats.name, stage.workers, stats.succeeded, stats.failed, stats.discarded, stats.panicked
        );
    }

    match &report.guard {
        GuardState::Clear => {}
        GuardState::Set => println!(
            "{} Run halted early; remaining work was left for the next run",
            style("!").yellow()
        ),
        GuardState::SetWithReason(reason) => println!(
            "{} Run halted early: {}",
            style("!").yellow(),
            reason
        ),
    }
    if !report.is_drained() {
        println!(
            "{} Work was still queued when the run ended",
            style("✗").red()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tally() {
        let mut tally = EventTally::default();
        tally.apply(&PipelineEvent::ItemCompleted {
            stage: "save".into(),
            item: "a".into(),
            routed: 0,
        });
        tally.apply(&PipelineEvent::ItemFailed {
            stage: "retrieve".into(),
            item: "b".into(),
            error: "boom".into(),
            fatal: true,
        });
        tally.apply(&PipelineEvent::ItemsDiscarded {
            stage: "retrieve".into(),
            count: 4,
        });

        assert_eq!(tally.completed, 1);
        assert_eq!(tally.failed, 1);
        assert_eq!(tally.discarded, 4);
        assert_eq!(tally.message("save: a"), "1 done, 1 failed | save: a");
    }

    #[tokio::test]
    async fn test_progress_task_ends_when_senders_drop() {
        let (tx, handle) = spawn_progress("test");
        tx.send(PipelineEvent::ItemCompleted {
            stage: "videos".into(),
            item: "x".into(),
            routed: 0,
        })
        .await
        .unwrap();
        drop(tx);

        let tally = handle.await.unwrap();
        assert_eq!(tally.completed, 1);
    }
}
