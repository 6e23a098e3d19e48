//! # Action Executor
//!
//! Dispatches completed actions to the execution target, or parks them in the
//! pending queue while the target is not ready. Capability failures are logged and
//! reported, never propagated: one failed write must not end the turn.

use std::sync::Arc;
use tracing::{info, warn};

use crate::application::queue::PendingActionQueue;
use crate::domain::traits::ExecutionTarget;
use crate::domain::types::{Action, CommandOutcome};
use crate::strings::logs;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchStatus {
    /// File written or directory created.
    Applied,
    /// Command ran; the exit code is informational.
    Ran(CommandOutcome),
    /// Target unavailable; parked in the pending queue.
    Queued,
    /// The capability returned an error.
    Failed(String),
}

/// Summary of draining the pending queue.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FlushReport {
    /// First file written by the flush, surfaced so the caller can open it.
    pub first_file: Option<String>,
    pub applied: usize,
    pub failed: usize,
}

impl FlushReport {
    /// Folds a later flush of the same turn into this one.
    pub fn absorb(&mut self, other: FlushReport) {
        if self.first_file.is_none() {
            self.first_file = other.first_file;
        }
        self.applied += other.applied;
        self.failed += other.failed;
    }

    fn record(&mut self, status: &DispatchStatus) {
        match status {
            DispatchStatus::Failed(_) => self.failed += 1,
            DispatchStatus::Applied | DispatchStatus::Ran(_) => self.applied += 1,
            DispatchStatus::Queued => {}
        }
    }
}

#[derive(Clone)]
pub struct ActionExecutor {
    target: Arc<dyn ExecutionTarget>,
}

impl ActionExecutor {
    pub fn new(target: Arc<dyn ExecutionTarget>) -> Self {
        Self { target }
    }

    pub fn is_ready(&self) -> bool {
        self.target.is_ready()
    }

    /// Applies `action` now if the target is ready and nothing is waiting ahead of it,
    /// otherwise queues it behind the pending actions.
    pub async fn execute(&self, action: &Action, queue: &mut PendingActionQueue) -> DispatchStatus {
        if !queue.is_empty() || !self.target.is_ready() {
            info!("{}", logs::action_queued(action));
            queue.push(action.clone());
            return DispatchStatus::Queued;
        }
        self.apply(action).await
    }

    /// Calls the matching capability and waits for it to finish.
    pub async fn apply(&self, action: &Action) -> DispatchStatus {
        match action {
            Action::File { path, content } => match self.target.write_file(path, content).await {
                Ok(()) => {
                    info!("{}", logs::file_written(path, content.len()));
                    DispatchStatus::Applied
                }
                Err(e) => {
                    warn!("{}", logs::dispatch_failed(action, &e));
                    DispatchStatus::Failed(format!("{:#}", e))
                }
            },
            Action::Directory { path } => match self.target.create_directory(path).await {
                Ok(()) => {
                    info!("{}", logs::directory_created(path));
                    DispatchStatus::Applied
                }
                Err(e) => {
                    warn!("{}", logs::dispatch_failed(action, &e));
                    DispatchStatus::Failed(format!("{:#}", e))
                }
            },
            Action::Shell { command } => match self.target.run_command(command).await {
                Ok(outcome) => {
                    info!("{}", logs::command_finished(command, outcome.exit_code));
                    DispatchStatus::Ran(outcome)
                }
                Err(e) => {
                    warn!("{}", logs::dispatch_failed(action, &e));
                    DispatchStatus::Failed(format!("{:#}", e))
                }
            },
        }
    }

    /// Drains the queue: directories, then files, then commands, each in arrival order.
    pub async fn flush(&self, queue: &mut PendingActionQueue) -> FlushReport {
        let mut report = FlushReport::default();

        for path in queue.take_directories() {
            let status = self.apply(&Action::Directory { path }).await;
            report.record(&status);
        }

        for file in queue.take_files() {
            let path = file.path.clone();
            let status = self
                .apply(&Action::File {
                    path: file.path,
                    content: file.content,
                })
                .await;
            if status == DispatchStatus::Applied && report.first_file.is_none() {
                report.first_file = Some(path);
            }
            report.record(&status);
        }

        for command in queue.take_commands() {
            let status = self.apply(&Action::Shell { command }).await;
            report.record(&status);
        }

        info!("{}", logs::queue_flushed(report.applied, report.failed));
        report
    }
}
