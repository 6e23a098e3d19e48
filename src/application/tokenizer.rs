//! # Action Tokenizer
//!
//! Incremental state machine over the raw accumulated response text.
//! Each call to [`ActionTokenizer::advance`] resumes from the cursor stored in
//! [`ParserState`], emits every action whose closing tag has arrived, and stops at the
//! first byte it cannot fully interpret yet (a partial open tag, or an action body whose
//! closing tag is still missing). A byte is never consumed before it is understood, so
//! any chunking of the same stream produces the same actions.

use tracing::debug;

use crate::application::attributes::{decode_entities, extract_attribute};
use crate::domain::config::ParserConfig;
use crate::domain::paths::WorkDir;
use crate::domain::types::{Action, ActionKind};
use crate::strings::logs;

pub const ACTION_OPEN: &str = "<boltAction";
pub const ACTION_CLOSE: &str = "</boltAction>";
pub const ARTIFACT_OPEN: &str = "<boltArtifact";

const MARKDOWN_EXTENSIONS: [&str; 3] = [".md", ".mdx", ".markdown"];

/// Per-turn parser state. Owned by the turn driver.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ParserState {
    /// Offset into the raw accumulator already scanned.
    pub cursor: usize,
    pub inside_action: bool,
    pub action_type: Option<ActionKind>,
    /// Normalized path, only for file actions.
    pub action_path: Option<String>,
    /// Body text of the open file action carried across chunks.
    pub accumulated_content: String,
    /// Paths dispatched or queued this turn, in first-seen order.
    pub completed_files: Vec<String>,
    /// Commands dispatched or queued this turn, in first-seen order.
    pub completed_commands: Vec<String>,
    /// Action tags accepted (recognized type with its required attributes).
    pub recognized_tags: usize,
}

impl ParserState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepares the mandatory final re-parse: rescan from offset zero with empty completed sets.
    pub fn reset_for_final(&mut self) {
        self.cursor = 0;
        self.close_action();
        self.completed_files.clear();
        self.completed_commands.clear();
        self.recognized_tags = 0;
    }

    fn open_action(&mut self, kind: ActionKind, path: Option<String>) {
        self.inside_action = true;
        self.action_type = Some(kind);
        self.action_path = path;
        self.accumulated_content.clear();
    }

    fn close_action(&mut self) {
        self.inside_action = false;
        self.action_type = None;
        self.action_path = None;
        self.accumulated_content.clear();
    }

    /// Drops an action left open at stream end, returning its kind and path.
    pub fn discard_open_action(&mut self) -> Option<(ActionKind, Option<String>)> {
        if !self.inside_action {
            return None;
        }
        let open = self.action_type.map(|kind| (kind, self.action_path.clone()));
        self.close_action();
        open
    }

    /// Returns `true` if the path was not yet recorded.
    pub fn mark_file_completed(&mut self, path: &str) -> bool {
        insert_unique(&mut self.completed_files, path)
    }

    /// Returns `true` if the command was not yet recorded.
    pub fn mark_command_completed(&mut self, command: &str) -> bool {
        insert_unique(&mut self.completed_commands, command)
    }

    /// At most one action is open, and a closed state carries no leftovers.
    pub fn is_consistent(&self) -> bool {
        if self.inside_action {
            self.action_type.is_some()
        } else {
            self.action_type.is_none()
                && self.action_path.is_none()
                && self.accumulated_content.is_empty()
        }
    }
}

fn insert_unique(list: &mut Vec<String>, value: &str) -> bool {
    if list.iter().any(|existing| existing == value) {
        false
    } else {
        list.push(value.to_string());
        true
    }
}

/// Actions emitted by a single `advance` call.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ScanOutcome {
    pub actions: Vec<Action>,
    /// The iteration bound stopped this call early; the next call resumes at the cursor.
    pub hit_limit: bool,
}

enum Step {
    /// Progress was made; keep scanning.
    Continue,
    /// An action completed; keep scanning.
    Emit(Action),
    /// Need more bytes.
    Wait,
}

#[derive(Debug, Clone)]
pub struct ActionTokenizer {
    work_dir: WorkDir,
    max_iterations: usize,
    strip_code_fences: bool,
}

impl ActionTokenizer {
    pub fn new(work_dir: WorkDir, config: &ParserConfig) -> Self {
        Self {
            work_dir,
            max_iterations: config.max_iterations.max(1),
            strip_code_fences: config.strip_code_fences,
        }
    }

    pub fn work_dir(&self) -> &WorkDir {
        &self.work_dir
    }

    /// Scans `raw` from `state.cursor` forward and returns the actions completed by this call, in order.
    pub fn advance(&self, raw: &str, state: &mut ParserState) -> ScanOutcome {
        let mut outcome = ScanOutcome::default();

        if state.cursor > raw.len() || !raw.is_char_boundary(state.cursor) {
            debug!("{}", logs::cursor_out_of_range(state.cursor, raw.len()));
            return outcome;
        }

        let mut iterations = 0;
        loop {
            if iterations >= self.max_iterations {
                debug!("{}", logs::iteration_limit(self.max_iterations, state.cursor));
                outcome.hit_limit = true;
                break;
            }
            iterations += 1;

            let step = if state.inside_action {
                self.step_inside(raw, state)
            } else {
                self.step_scanning(raw, state)
            };

            match step {
                Step::Continue => {}
                Step::Emit(action) => outcome.actions.push(action),
                Step::Wait => break,
            }
        }

        outcome
    }

    fn step_scanning(&self, raw: &str, state: &mut ParserState) -> Step {
        let cursor = state.cursor;
        let hay = &raw[cursor..];

        let Some(rel) = hay.find(ACTION_OPEN) else {
            // Only prose left; hold back a trailing fragment that may grow into a tag.
            state.cursor = cursor + safe_prefix_len(hay, ACTION_OPEN);
            return Step::Wait;
        };

        let start = cursor + rel;
        let after_marker = start + ACTION_OPEN.len();

        match raw[after_marker..].chars().next() {
            None => {
                state.cursor = start;
                return Step::Wait;
            }
            Some(c) if c.is_whitespace() || c == '>' || c == '/' => {}
            Some(_) => {
                // `<boltActionX...` is not our tag.
                state.cursor = after_marker;
                return Step::Continue;
            }
        }

        let Some(gt) = raw[after_marker..].find('>') else {
            state.cursor = start;
            return Step::Wait;
        };
        let tag_end = after_marker + gt + 1;
        let tag = &raw[start..tag_end];
        state.cursor = tag_end;

        let self_closing = tag[..tag.len() - 1].trim_end().ends_with('/');

        let Some(kind) = extract_attribute(tag, "type").and_then(|t| ActionKind::from_str(&t))
        else {
            debug!("{}", logs::skipped_tag("unknown or missing type", tag));
            return Step::Continue;
        };

        match kind {
            ActionKind::File => {
                let Some(raw_path) = extract_attribute(tag, "filePath").filter(|p| !p.is_empty())
                else {
                    debug!("{}", logs::skipped_tag("file action without filePath", tag));
                    return Step::Continue;
                };
                let path = self.work_dir.normalize(&raw_path);
                state.recognized_tags += 1;
                if self_closing {
                    return Step::Emit(Action::file(path, String::new()));
                }
                state.open_action(ActionKind::File, Some(path));
                Step::Continue
            }
            ActionKind::Directory => {
                let Some(raw_path) = extract_attribute(tag, "dirPath").filter(|p| !p.is_empty())
                else {
                    debug!("{}", logs::skipped_tag("directory action without dirPath", tag));
                    return Step::Continue;
                };
                state.recognized_tags += 1;
                // No body: dispatch right away without entering an action.
                Step::Emit(Action::directory(self.work_dir.normalize(&raw_path)))
            }
            ActionKind::Shell | ActionKind::Command => {
                state.recognized_tags += 1;
                if self_closing {
                    debug!("{}", logs::skipped_tag("self-closing command action", tag));
                    return Step::Continue;
                }
                state.open_action(kind, None);
                Step::Continue
            }
        }
    }

    fn step_inside(&self, raw: &str, state: &mut ParserState) -> Step {
        let cursor = state.cursor;
        let hay = &raw[cursor..];

        let Some(rel) = hay.find(ACTION_CLOSE) else {
            // Only file bodies are carried across chunks; command bodies are read once complete.
            if state.action_type == Some(ActionKind::File) {
                let safe = safe_prefix_len(hay, ACTION_CLOSE);
                state.accumulated_content.push_str(&hay[..safe]);
                state.cursor = cursor + safe;
            }
            return Step::Wait;
        };

        let close = cursor + rel;
        let mut body = std::mem::take(&mut state.accumulated_content);
        body.push_str(&raw[cursor..close]);
        state.cursor = close + ACTION_CLOSE.len();

        let kind = state.action_type;
        let path = state.action_path.take();
        state.close_action();

        let content = decode_entities(&body).trim().to_string();

        match (kind, path) {
            (Some(ActionKind::File), Some(path)) => {
                let content = if self.strip_code_fences && !is_markdown(&path) {
                    match strip_wrapping_fence(&content) {
                        Some(inner) => inner.to_string(),
                        None => content,
                    }
                } else {
                    content
                };
                Step::Emit(Action::file(path, content))
            }
            (Some(kind), _) if kind.is_command() => {
                if content.is_empty() {
                    debug!("{}", logs::EMPTY_COMMAND_SKIPPED);
                    Step::Continue
                } else {
                    Step::Emit(Action::shell(content))
                }
            }
            _ => Step::Continue,
        }
    }
}

/// Length of `hay` that can be consumed without swallowing a trailing prefix of `marker`.
/// e.g. `("text <bolt", "<boltAction")` -> 5
pub fn safe_prefix_len(hay: &str, marker: &str) -> usize {
    for k in (1..marker.len()).rev() {
        if hay.ends_with(&marker[..k]) {
            return hay.len() - k;
        }
    }
    hay.len()
}

fn is_markdown(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    MARKDOWN_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Inner text of a body wrapped in exactly one markdown fence.
fn strip_wrapping_fence(content: &str) -> Option<&str> {
    let body = content.strip_prefix("```")?;
    let (_info, body) = body.split_once('\n')?;
    let body = body.strip_suffix("```")?;
    if body.lines().any(|line| line.trim_start().starts_with("```")) {
        return None;
    }
    Some(body.trim_end_matches(['\n', '\r']))
}
