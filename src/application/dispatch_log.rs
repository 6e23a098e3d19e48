//! # Dispatch Log
//!
//! Turn-scoped record of what the incremental passes already handed to the executor
//! (applied, queued or failed). The final re-parse consults it so that a re-scan from
//! offset zero does not repeat side effects, while still re-writing a file whose body
//! came out different from what was written incrementally.

use std::collections::{HashMap, HashSet};

use crate::domain::types::Action;

#[derive(Debug, Default, Clone)]
pub struct DispatchLog {
    /// Incremental dispatches in order; the index is the action's ordinal in the stream.
    sequence: Vec<Action>,
    /// Latest content handed out per file path.
    files: HashMap<String, String>,
    commands: HashSet<String>,
    directories: HashSet<String>,
}

impl DispatchLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an incremental dispatch.
    pub fn record(&mut self, action: &Action) {
        self.sequence.push(action.clone());
        self.remember(action);
    }

    /// Updates the per-key indexes without touching the sequence. Used by the final pass.
    pub fn remember(&mut self, action: &Action) {
        match action {
            Action::File { path, content } => {
                self.files.insert(path.clone(), content.clone());
            }
            Action::Directory { path } => {
                self.directories.insert(path.clone());
            }
            Action::Shell { command } => {
                self.commands.insert(command.clone());
            }
        }
    }

    /// Whether the final pass can skip `action`, found at position `ordinal` of the re-scan.
    pub fn is_handled(&self, ordinal: usize, action: &Action) -> bool {
        if self.sequence.get(ordinal) == Some(action) {
            return true;
        }
        match action {
            Action::File { path, content } => self.files.get(path) == Some(content),
            Action::Directory { path } => self.directories.contains(path),
            Action::Shell { command } => self.commands.contains(command),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_action_same_ordinal_is_handled() {
        let mut log = DispatchLog::new();
        log.record(&Action::file("/home/project/a.ts", "v1"));
        log.record(&Action::file("/home/project/a.ts", "v2"));

        // Both writes of the same path replay cleanly on the final pass.
        assert!(log.is_handled(0, &Action::file("/home/project/a.ts", "v1")));
        assert!(log.is_handled(1, &Action::file("/home/project/a.ts", "v2")));
    }

    #[test]
    fn test_changed_file_content_is_not_handled() {
        let mut log = DispatchLog::new();
        log.record(&Action::file("/home/project/a.ts", "export default"));
        assert!(!log.is_handled(0, &Action::file("/home/project/a.ts", "export default App")));

        log.remember(&Action::file("/home/project/a.ts", "export default App"));
        assert!(log.is_handled(3, &Action::file("/home/project/a.ts", "export default App")));
        // `remember` leaves the ordinal sequence alone.
        assert!(!log.is_handled(1, &Action::file("/home/project/a.ts", "export default")));
    }

    #[test]
    fn test_commands_and_directories_by_key() {
        let mut log = DispatchLog::new();
        log.record(&Action::directory("/home/project/src"));
        log.record(&Action::shell("npm install"));

        assert!(log.is_handled(7, &Action::shell("npm install")));
        assert!(log.is_handled(7, &Action::directory("/home/project/src")));
        assert!(!log.is_handled(1, &Action::shell("npm run dev")));
    }
}
