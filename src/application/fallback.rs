//! # Fallback Extraction
//!
//! Best-effort recovery for finished responses that used plain markdown code fences
//! instead of the action tags. A fence becomes a command only when its language is a
//! shell, and a file only when a path can be read from its info string, the line right
//! before it, or its first line. Everything else is logged and ignored.

use regex::Regex;
use tracing::debug;

use crate::domain::paths::WorkDir;
use crate::domain::types::Action;
use crate::strings::logs;

pub const SHELL_LANGUAGES: [&str; 5] = ["bash", "sh", "shell", "zsh", "command"];

const PATH_LABELS: [&str; 3] = ["filename:", "file:", "path:"];

/// A fenced block found in the response.
#[derive(Debug, Clone)]
struct FencedBlock<'a> {
    language: String,
    /// Text after the language on the opening fence line, e.g. `src/App.tsx` in ```` ```tsx src/App.tsx ````.
    info: &'a str,
    preceding: Option<&'a str>,
    lines: Vec<&'a str>,
}

/// Extracts actions from fenced code blocks, in document order.
pub fn extract_fallback_actions(text: &str, work_dir: &WorkDir) -> Vec<Action> {
    let mut actions = Vec::new();

    for block in fenced_blocks(text) {
        if SHELL_LANGUAGES.contains(&block.language.as_str()) {
            let command = shell_command(&block.lines);
            if command.is_empty() {
                debug!("{}", logs::fallback_ignored(&block.language, "empty shell block"));
            } else {
                actions.push(Action::shell(command));
            }
            continue;
        }

        if let Some((path, body)) = file_target(&block) {
            actions.push(Action::file(work_dir.normalize(&path), body));
        } else {
            debug!("{}", logs::fallback_ignored(&block.language, "no file path"));
        }
    }

    actions
}

fn fenced_blocks(text: &str) -> Vec<FencedBlock<'_>> {
    let lines: Vec<&str> = text.lines().collect();
    let mut blocks = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let Some(opening) = lines[i].trim_start().strip_prefix("```") else {
            i += 1;
            continue;
        };

        let opening = opening.trim();
        let (language, info) = match opening.split_once(|c: char| c.is_whitespace() || c == ':') {
            Some((lang, info)) => (lang, info.trim()),
            None => (opening, ""),
        };

        let Some(close) = (i + 1..lines.len()).find(|&j| lines[j].trim() == "```") else {
            debug!("{}", logs::fallback_ignored(language, "unterminated fence"));
            break;
        };

        let preceding = i
            .checked_sub(1)
            .map(|j| lines[j])
            .filter(|line| !line.trim().is_empty());

        blocks.push(FencedBlock {
            language: language.to_ascii_lowercase(),
            info,
            preceding,
            lines: lines[i + 1..close].to_vec(),
        });
        i = close + 1;
    }

    blocks
}

/// Joins a shell block into one command, dropping `$ ` prompts and blank edges.
fn shell_command(lines: &[&str]) -> String {
    lines
        .iter()
        .map(|line| {
            let trimmed = line.trim_start();
            trimmed.strip_prefix("$ ").unwrap_or(*line)
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Path and body for a file block: the fence info string, the line before the fence,
/// or a path comment on the first line (which is then dropped from the body).
fn file_target(block: &FencedBlock<'_>) -> Option<(String, String)> {
    let body = || block.lines.join("\n").trim().to_string();

    if let Some(path) = path_from_line(block.info) {
        return Some((path, body()));
    }

    if let Some(path) = block.preceding.and_then(path_from_line) {
        return Some((path, body()));
    }

    let first = block.lines.iter().position(|line| !line.trim().is_empty())?;
    let path = path_from_line(block.lines[first])?;
    let rest = block.lines[first + 1..].join("\n").trim().to_string();
    Some((path, rest))
}

/// Reads a path out of a comment or label line such as `// src/App.tsx`,
/// `# main.py`, `<!-- index.html -->`, `**File:** src/a.ts` or ``Create `src/a.ts`:``.
pub fn path_from_line(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    if let Some(path) = backticked_path(line) {
        return Some(path);
    }

    let mut candidate = line;
    for prefix in ["<!--", "/*", "//", "--", ";"] {
        if let Some(rest) = candidate.strip_prefix(prefix) {
            candidate = rest;
            break;
        }
    }
    candidate = candidate.trim_start_matches('#');
    for suffix in ["-->", "*/"] {
        if let Some(rest) = candidate.trim_end().strip_suffix(suffix) {
            candidate = rest;
            break;
        }
    }

    let mut candidate = candidate.trim().trim_matches('*').trim();
    let lower = candidate.to_ascii_lowercase();
    for label in PATH_LABELS {
        if lower.starts_with(label) {
            candidate = candidate[label.len()..].trim().trim_matches('*').trim();
            break;
        }
    }

    let candidate = candidate.trim_end_matches(':').trim();
    looks_like_path(candidate).then(|| candidate.to_string())
}

fn backticked_path(line: &str) -> Option<String> {
    let re = Regex::new(r"`([^`\s]+)`").ok()?;
    re.captures_iter(line)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .filter(|candidate| looks_like_path(candidate))
        .last()
        .map(str::to_string)
}

fn looks_like_path(candidate: &str) -> bool {
    let Ok(re) = Regex::new(r"^(?:\./|/)?[A-Za-z0-9_@.\-\[\]]+(?:/[A-Za-z0-9_@.\-\[\]]+)*$") else {
        return false;
    };
    if !re.is_match(candidate) {
        return false;
    }
    let file_name = candidate.rsplit('/').next().unwrap_or(candidate);
    let has_extension = file_name
        .rsplit_once('.')
        .is_some_and(|(_, ext)| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()));
    // Require an extension, or a directory component for names like `docker/Dockerfile`.
    (has_extension || candidate.contains('/')) && !candidate.chars().all(|c| c == '.' || c == '/')
}
