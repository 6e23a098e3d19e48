//! # Domain Types
//!
//! Common data structures and enums used across the parsing and dispatch logic.

use serde::{Deserialize, Serialize};

/// The `type` attribute of an action tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    File,
    Directory,
    Shell,
    Command,
}

impl ActionKind {
    /// Parses a `type` attribute value. Matching ignores case and surrounding whitespace.
    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "file" => Some(ActionKind::File),
            "directory" => Some(ActionKind::Directory),
            "shell" => Some(ActionKind::Shell),
            "command" => Some(ActionKind::Command),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::File => "file",
            ActionKind::Directory => "directory",
            ActionKind::Shell => "shell",
            ActionKind::Command => "command",
        }
    }

    /// Shell and command actions both end up as a command run.
    pub fn is_command(&self) -> bool {
        matches!(self, ActionKind::Shell | ActionKind::Command)
    }
}

/// A single side effect extracted from the model's output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Action {
    File { path: String, content: String },
    Directory { path: String },
    Shell { command: String },
}

impl Action {
    pub fn file(path: impl Into<String>, content: impl Into<String>) -> Self {
        Action::File {
            path: path.into(),
            content: content.into(),
        }
    }

    pub fn directory(path: impl Into<String>) -> Self {
        Action::Directory { path: path.into() }
    }

    pub fn shell(command: impl Into<String>) -> Self {
        Action::Shell {
            command: command.into(),
        }
    }

    /// Key used for duplicate suppression: the path for files/directories, the command string otherwise.
    pub fn key(&self) -> &str {
        match self {
            Action::File { path, .. } => path,
            Action::Directory { path } => path,
            Action::Shell { command } => command,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Action::File { .. } => "file",
            Action::Directory { .. } => "directory",
            Action::Shell { .. } => "shell",
        }
    }
}

/// Result of a command run by the execution target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutcome {
    pub exit_code: i32,
    pub output: String,
}
