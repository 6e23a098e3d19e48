//! # Feed Manager
//!
//! Keeps the progress view for the current turn: the action being streamed right now,
//! a rolling list of recent activity, and a checkpoint for every completed action.
//! Rendered as an "active" view while streaming and a summary once the turn ends.

use chrono::Local;

use crate::application::executor::{DispatchStatus, FlushReport};
use crate::application::tokenizer::ParserState;
use crate::domain::paths::WorkDir;
use crate::domain::types::{Action, ActionKind};
use crate::strings::messages;

const RECENT_LIMIT: usize = 15;
const OUTPUT_PREVIEW: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeedMode {
    Active,
    Final,
    Stopped,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeedEntryKind {
    Checkpoint, // Completed action
    Activity,   // Transient progress
}

#[derive(Debug, Clone)]
struct FeedEntry {
    timestamp: String,
    kind: FeedEntryKind,
    label: String,
    content: String,
    output: Option<String>,
}

impl FeedEntry {
    fn new(kind: FeedEntryKind, label: &str, content: String) -> Self {
        Self {
            timestamp: Local::now().format("%H:%M:%S").to_string(),
            kind,
            label: label.to_string(),
            content,
            output: None,
        }
    }

    fn format_active(&self) -> String {
        let mut result = match self.kind {
            FeedEntryKind::Checkpoint => {
                format!("[{}] **✅ {}**: {}\n", self.timestamp, self.label, self.content)
            }
            FeedEntryKind::Activity => format!("[{}] 🔄 {}\n", self.timestamp, self.content),
        };

        if let Some(output) = self.output.as_deref().filter(|o| !o.is_empty()) {
            let preview = match output.char_indices().nth(OUTPUT_PREVIEW) {
                Some((cut, _)) => format!("{}...", &output[..cut]),
                None => output.to_string(),
            };
            result.push_str(&format!("```\n{}\n```\n", preview));
        }

        result
    }
}

#[derive(Debug, Clone)]
pub struct FeedManager {
    entries: Vec<FeedEntry>,
    mode: FeedMode,
    current_task: Option<String>,
    active: Option<String>,
    recent_activities: Vec<String>,
    work_dir: WorkDir,
}

impl FeedManager {
    pub fn new(work_dir: WorkDir) -> Self {
        Self {
            entries: Vec::new(),
            mode: FeedMode::Active,
            current_task: None,
            active: None,
            recent_activities: Vec::new(),
            work_dir,
        }
    }

    pub fn initialize(&mut self) {
        self.entries.clear();
        self.mode = FeedMode::Active;
        self.current_task = None;
        self.active = None;
        self.recent_activities.clear();
    }

    pub fn mode(&self) -> FeedMode {
        self.mode
    }

    pub fn set_task(&mut self, task: &str) {
        if task.is_empty() {
            self.current_task = None;
        } else {
            self.current_task = Some(task.to_string());
        }
    }

    /// Mirrors the action the tokenizer is currently inside, if any.
    pub fn track_parser(&mut self, state: &ParserState) {
        self.active = match (state.inside_action, state.action_type) {
            (true, Some(ActionKind::File)) => state
                .action_path
                .as_deref()
                .map(|path| messages::writing_file(&self.work_dir.display(path))),
            (true, Some(_)) => Some(messages::PREPARING_COMMAND.to_string()),
            _ => None,
        };
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn add_activity(&mut self, content: String) {
        self.recent_activities.push(format!("• {}", content));
        if self.recent_activities.len() > RECENT_LIMIT {
            self.recent_activities.remove(0);
        }
        self.entries.push(FeedEntry::new(FeedEntryKind::Activity, "System", content));
    }

    pub fn add_checkpoint(&mut self, label: &str, content: String) {
        self.entries.push(FeedEntry::new(FeedEntryKind::Checkpoint, label, content));
    }

    pub fn update_last_entry(&mut self, output: String) {
        if let Some(entry) = self.entries.last_mut() {
            entry.output = Some(output);
        }
    }

    /// Adds the checkpoint for a dispatched action.
    pub fn record_dispatch(&mut self, action: &Action, status: &DispatchStatus) {
        let subject = match action {
            Action::File { path, .. } | Action::Directory { path } => self.work_dir.display(path),
            Action::Shell { command } => format!("`{}`", command),
        };

        match status {
            DispatchStatus::Applied => {
                let label = match action {
                    Action::Directory { .. } => messages::LABEL_CREATED,
                    _ => messages::LABEL_WROTE,
                };
                self.add_checkpoint(label, subject);
            }
            DispatchStatus::Ran(outcome) => {
                if let Action::Shell { command } = action {
                    self.add_activity(messages::running_command(command));
                }
                self.add_checkpoint(
                    messages::LABEL_RAN,
                    format!("{} ({})", subject, messages::exit_code(outcome.exit_code)),
                );
                self.update_last_entry(outcome.output.clone());
            }
            DispatchStatus::Queued => self.add_checkpoint(messages::LABEL_QUEUED, subject),
            DispatchStatus::Failed(err) => {
                self.add_checkpoint(messages::LABEL_FAILED, subject);
                self.update_last_entry(err.clone());
            }
        }
    }

    pub fn record_flush(&mut self, report: &FlushReport) {
        self.add_activity(messages::flushed(report.applied, report.failed));
    }

    /// Completed checkpoints as `label: content`, oldest first.
    pub fn checkpoints(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|entry| entry.kind == FeedEntryKind::Checkpoint)
            .map(|entry| format!("{}: {}", entry.label, entry.content))
            .collect()
    }

    pub fn finalize(&mut self, mode: FeedMode) {
        self.active = None;
        self.mode = mode;
    }

    pub fn render(&self) -> String {
        match self.mode {
            FeedMode::Active => self.format_active(),
            FeedMode::Final => self.format_summary(messages::FEED_FINAL),
            FeedMode::Stopped => self.format_summary(messages::FEED_STOPPED),
            FeedMode::Failed => self.format_summary(messages::FEED_FAILED),
        }
    }

    fn format_active(&self) -> String {
        let mut content = format!("{}\n\n", messages::FEED_ACTIVE);
        if let Some(task) = &self.current_task {
            content.push_str(&format!("**Task**: {}\n\n", task));
        }
        if let Some(active) = &self.active {
            content.push_str(&format!("**Now**: {}\n\n", active));
        }
        content.push_str(&format!("**Recent Activity** (last {}):\n", RECENT_LIMIT));
        for activity in &self.recent_activities {
            content.push_str(&format!("{}\n", activity));
        }
        if !self.entries.is_empty() {
            content.push_str("\n**Latest Details**:\n");
            let start = self.entries.len().saturating_sub(5);
            for entry in &self.entries[start..] {
                content.push_str(&entry.format_active());
            }
        }
        content
    }

    fn format_summary(&self, header: &str) -> String {
        let mut content = format!("{}\n\n", header);
        if let Some(task) = &self.current_task {
            content.push_str(&format!("**Task**: {}\n\n", task));
        }
        content.push_str("**Summary**:\n");
        for line in self.checkpoints() {
            content.push_str(&format!("• {}\n", line));
        }
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        content.push_str(&format!("\n**Completed**: {}", timestamp));
        content
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::CommandOutcome;

    fn feed() -> FeedManager {
        FeedManager::new(WorkDir::default())
    }

    #[test]
    fn test_checkpoints_use_display_paths() {
        let mut feed = feed();
        feed.record_dispatch(&Action::directory("/home/project/src"), &DispatchStatus::Applied);
        feed.record_dispatch(
            &Action::file("/home/project/src/App.tsx", "x"),
            &DispatchStatus::Applied,
        );
        feed.record_dispatch(&Action::shell("npm install"), &DispatchStatus::Queued);

        assert_eq!(
            feed.checkpoints(),
            vec!["Created: src", "Wrote: src/App.tsx", "Queued: `npm install`"]
        );
    }

    #[test]
    fn test_command_output_attached() {
        let mut feed = feed();
        let outcome = CommandOutcome {
            exit_code: 2,
            output: "boom".into(),
        };
        feed.record_dispatch(&Action::shell("make"), &DispatchStatus::Ran(outcome));
        let rendered = feed.render();
        assert!(rendered.contains("Running: `make`"));
        assert!(rendered.contains("exit code 2"));
        assert!(rendered.contains("```\nboom\n```"));
    }

    #[test]
    fn test_recent_activity_is_bounded() {
        let mut feed = feed();
        for i in 0..20 {
            feed.add_activity(format!("step {}", i));
        }
        let rendered = feed.render();
        assert!(!rendered.contains("• step 4\n"));
        assert!(rendered.contains("• step 5\n"));
        assert!(rendered.contains("• step 19\n"));
    }

    #[test]
    fn test_tracks_active_action() {
        let mut feed = feed();
        let mut state = ParserState::new();
        state.inside_action = true;
        state.action_type = Some(ActionKind::File);
        state.action_path = Some("/home/project/src/App.tsx".into());
        feed.track_parser(&state);
        assert_eq!(feed.active(), Some("Writing `src/App.tsx`"));

        state.action_type = Some(ActionKind::Shell);
        state.action_path = None;
        feed.track_parser(&state);
        assert_eq!(feed.active(), Some(messages::PREPARING_COMMAND));

        feed.track_parser(&ParserState::new());
        assert_eq!(feed.active(), None);
    }

    #[test]
    fn test_final_render_and_initialize() {
        let mut feed = feed();
        feed.set_task("Todo App");
        feed.record_dispatch(&Action::file("/home/project/a.ts", ""), &DispatchStatus::Applied);
        feed.finalize(FeedMode::Final);

        let rendered = feed.render();
        assert!(rendered.starts_with(messages::FEED_FINAL));
        assert!(rendered.contains("**Task**: Todo App"));
        assert!(rendered.contains("• Wrote: a.ts"));

        feed.initialize();
        assert_eq!(feed.mode(), FeedMode::Active);
        assert!(feed.checkpoints().is_empty());
    }
}
