//! # Attribute Extraction
//!
//! Pulls a named attribute out of a single opening tag and decodes XML/HTML entities.
//! Attribute names match case-insensitively; values may be double-quoted, single-quoted
//! or bare (terminated by whitespace or `>`).

use quick_xml::escape::unescape;
use regex::Regex;
use std::borrow::Cow;

/// Longest entity reference considered, e.g. `&#x1F600;`.
const MAX_ENTITY_LEN: usize = 12;

/// Returns the decoded, trimmed value of `name` in `tag`, trying double-quoted,
/// single-quoted and then unquoted forms.
pub fn extract_attribute(tag: &str, name: &str) -> Option<String> {
    let name = regex::escape(name);
    let patterns = [
        format!(r#"(?i)(?:^|[\s<])\b{}\s*=\s*"([^"]*)""#, name),
        format!(r#"(?i)(?:^|[\s<])\b{}\s*=\s*'([^']*)'"#, name),
        format!(r#"(?i)(?:^|[\s<])\b{}\s*=\s*([^\s"'>][^\s>]*)"#, name),
    ];

    for pattern in &patterns {
        let Ok(re) = Regex::new(pattern) else {
            continue;
        };
        if let Some(value) = re.captures(tag).and_then(|caps| caps.get(1)) {
            let raw = value.as_str();
            // A bare value directly before a self-closing `/>` must not keep the slash.
            let raw = if raw.ends_with('/') && tag[value.end()..].trim_start().starts_with('>') {
                raw.trim_end_matches('/')
            } else {
                raw
            };
            if raw.is_empty() {
                continue;
            }
            return Some(decode_entities(raw).trim().to_string());
        }
    }
    None
}

/// Decodes entity references (`&lt;`, `&amp;`, `&#60;`, `&#x3C;` ...).
/// Anything that is not a well-formed, known reference (a bare `&&`, `&nbsp;`) is kept verbatim.
pub fn decode_entities(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let candidate = &rest[amp..];
        match entity_end(candidate) {
            Some(end) => match unescape(&candidate[..end]) {
                Ok(decoded) => {
                    out.push_str(&decoded);
                    rest = &candidate[end..];
                }
                Err(_) => {
                    out.push('&');
                    rest = &candidate[1..];
                }
            },
            None => {
                out.push('&');
                rest = &candidate[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// Byte length of `&name;` at the start of `text`, if it is shaped like an entity reference.
fn entity_end(text: &str) -> Option<usize> {
    let body = text.get(1..)?;
    for (idx, ch) in body.char_indices() {
        if idx >= MAX_ENTITY_LEN {
            return None;
        }
        match ch {
            ';' if idx > 0 => return Some(idx + 2),
            c if c.is_ascii_alphanumeric() || (c == '#' && idx == 0) => {}
            _ => return None,
        }
    }
    None
}
