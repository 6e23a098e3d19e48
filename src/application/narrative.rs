//! # Narrative Extraction
//!
//! Derives the human-readable text shown for a response from the entire raw accumulator.
//! Presentation only: the tokenizer alone decides what gets written or run.

use regex::Regex;

use crate::application::attributes::extract_attribute;
use crate::application::tokenizer::{ACTION_OPEN, ARTIFACT_OPEN, safe_prefix_len};
use crate::strings::messages;

/// Picks the narrative, in priority order:
/// 1. the `title` of an outer artifact tag,
/// 2. the prose before the first action/artifact tag,
/// 3. a summary of the files touched so far,
/// 4. a placeholder while streaming, or the tag-stripped text on the final parse.
pub fn extract_narrative(raw: &str, completed_files: &[String], is_final: bool) -> String {
    if let Some(title) = artifact_title(raw) {
        return title;
    }

    let leading = leading_prose(raw).trim();
    if !leading.is_empty() {
        return leading.to_string();
    }

    if !completed_files.is_empty() {
        return messages::created_files(completed_files);
    }

    if is_final {
        strip_tags(raw)
    } else {
        messages::PROCESSING.to_string()
    }
}

fn artifact_title(raw: &str) -> Option<String> {
    let start = raw.find(ARTIFACT_OPEN)?;
    let end = raw[start..].find('>')? + start + 1;
    extract_attribute(&raw[start..end], "title").filter(|title| !title.is_empty())
}

/// Text before the first tag, without a trailing fragment that may still become a tag.
fn leading_prose(raw: &str) -> &str {
    let first_tag = [raw.find(ACTION_OPEN), raw.find(ARTIFACT_OPEN)]
        .into_iter()
        .flatten()
        .min();
    match first_tag {
        Some(pos) => &raw[..pos],
        None => {
            let safe = safe_prefix_len(raw, ACTION_OPEN).min(safe_prefix_len(raw, ARTIFACT_OPEN));
            &raw[..safe]
        }
    }
}

/// Removes action blocks and artifact wrappers, keeping the surrounding prose.
pub fn strip_tags(raw: &str) -> String {
    let action_block = Regex::new(r"(?s)<boltAction\b[^>]*?/>|<boltAction\b[^>]*>.*?</boltAction>");
    let artifact_tag = Regex::new(r"</?boltArtifact\b[^>]*>");
    let (Ok(action_block), Ok(artifact_tag)) = (action_block, artifact_tag) else {
        return raw.trim().to_string();
    };

    let without_actions = action_block.replace_all(raw, "");
    let stripped = artifact_tag.replace_all(&without_actions, "");

    stripped
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
