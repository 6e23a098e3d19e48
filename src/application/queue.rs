//! # Pending Action Queue
//!
//! Buffers actions that were ready before the execution target was. Three ordered lists,
//! append-only until drained. Each `take_*` empties its list before the caller applies
//! anything, so a second readiness signal finds nothing left to flush.

use crate::domain::types::Action;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFile {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Default, Clone)]
pub struct PendingActionQueue {
    files: Vec<PendingFile>,
    directories: Vec<String>,
    commands: Vec<String>,
}

impl PendingActionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, action: Action) {
        match action {
            Action::File { path, content } => self.files.push(PendingFile { path, content }),
            Action::Directory { path } => self.directories.push(path),
            Action::Shell { command } => self.commands.push(command),
        }
    }

    pub fn len(&self) -> usize {
        self.files.len() + self.directories.len() + self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.files.clear();
        self.directories.clear();
        self.commands.clear();
    }

    pub fn take_directories(&mut self) -> Vec<String> {
        std::mem::take(&mut self.directories)
    }

    pub fn take_files(&mut self) -> Vec<PendingFile> {
        std::mem::take(&mut self.files)
    }

    pub fn take_commands(&mut self) -> Vec<String> {
        std::mem::take(&mut self.commands)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_sorts_into_lists_in_arrival_order() {
        let mut queue = PendingActionQueue::new();
        queue.push(Action::shell("npm install"));
        queue.push(Action::directory("/home/project/a"));
        queue.push(Action::file("/home/project/a/x.ts", "1"));
        queue.push(Action::directory("/home/project/b"));
        queue.push(Action::shell("npm run dev"));
        assert_eq!(queue.len(), 5);

        assert_eq!(queue.take_directories(), vec!["/home/project/a", "/home/project/b"]);
        assert_eq!(
            queue.take_files(),
            vec![PendingFile {
                path: "/home/project/a/x.ts".into(),
                content: "1".into()
            }]
        );
        assert_eq!(queue.take_commands(), vec!["npm install", "npm run dev"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_take_empties_list() {
        let mut queue = PendingActionQueue::new();
        queue.push(Action::directory("/home/project/a"));
        assert_eq!(queue.take_directories().len(), 1);
        assert!(queue.take_directories().is_empty());
    }

    #[test]
    fn test_clear() {
        let mut queue = PendingActionQueue::new();
        queue.push(Action::file("/home/project/a.ts", ""));
        queue.push(Action::shell("ls"));
        queue.clear();
        assert!(queue.is_empty());
    }
}
