//! Frontmatter block handling.
//!
//! The block is recognized structurally: the first line of the document is
//! exactly `---`, and the block runs to the next line that is exactly `---`.
//! Only the inner text is handed to a YAML parser. Edits are line-level
//! patches so the rest of the block keeps its formatting, comments and key
//! order.

use serde_yaml::{Mapping, Value};

pub const DELIMITER: &str = "---";

/// A document split at the end of its frontmatter block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Split<'a> {
    /// Everything up to and including the closing delimiter line (and its
    /// line break). Empty when there is no frontmatter.
    pub prefix: &'a str,
    /// Text between the delimiter lines, without the delimiters.
    pub inner: Option<&'a str>,
    /// The rest of the document.
    pub body: &'a str,
}

fn is_delimiter(line: &str) -> bool {
    line.trim_end_matches(['\r', '\n']).trim_end() == DELIMITER
}

/// Split `text` into frontmatter prefix and body.
pub fn split(text: &str) -> Split<'_> {
    let none = Split {
        prefix: "",
        inner: None,
        body: text,
    };

    let Some(first_nl) = text.find('\n') else {
        return none;
    };
    if !is_delimiter(&text[..first_nl]) {
        return none;
    }

    let inner_start = first_nl + 1;
    let mut pos = inner_start;
    while pos <= text.len() {
        let line_end = text[pos..].find('\n').map(|i| pos + i);
        let line = &text[pos..line_end.unwrap_or(text.len())];
        if is_delimiter(line) {
            let prefix_end = line_end.map(|i| i + 1).unwrap_or(text.len());
            return Split {
                prefix: &text[..prefix_end],
                inner: Some(&text[inner_start..pos]),
                body: &text[prefix_end..],
            };
        }
        match line_end {
            Some(i) => pos = i + 1,
            None => break,
        }
    }
    none
}

/// Parse the inner text of a frontmatter block into a YAML mapping.
///
/// An empty block parses to an empty mapping. A block whose top level is
/// not a mapping is an error.
pub fn parse(inner: &str) -> Result<Mapping, String> {
    if inner.trim().is_empty() {
        return Ok(Mapping::new());
    }
    match serde_yaml::from_str::<Value>(inner) {
        Ok(Value::Mapping(map)) => Ok(map),
        Ok(Value::Null) => Ok(Mapping::new()),
        Ok(_) => Err("frontmatter is not a key/value mapping".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

/// Scalar value of `field` as text, if present. Non-scalar values yield
/// `Some` of an empty string so callers treat them as unusable.
pub fn scalar_field(map: &Mapping, field: &str) -> Option<String> {
    match map.get(Value::String(field.to_string()))? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => Some(String::new()),
    }
}

fn key_line_value<'a>(line: &'a str, field: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(field)?;
    rest.strip_prefix(':')
}

/// Textual lookup of a top-level `field:` line, for blocks that do not parse.
pub fn textual_field(inner: &str, field: &str) -> Option<String> {
    inner.lines().find_map(|line| {
        let value = key_line_value(line.trim_end_matches('\r'), field)?.trim();
        let unquoted = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
            .unwrap_or(value);
        if unquoted.is_empty() {
            None
        } else {
            Some(unquoted.to_string())
        }
    })
}

/// Set a top-level scalar `field` to `value` with a line-level patch.
///
/// An existing `field:` line (plus any indented continuation lines) is
/// replaced in place; otherwise the line is appended at the end of the
/// block. A document without frontmatter gets a new block.
pub fn set_field(text: &str, field: &str, value: &str) -> String {
    let parts = split(text);
    let Some(inner) = parts.inner else {
        return format!("{DELIMITER}\n{field}: {value}\n{DELIMITER}\n{text}");
    };

    let eol = if parts.prefix.contains("\r\n") { "\r\n" } else { "\n" };
    let new_line = format!("{field}: {value}");

    let mut lines: Vec<String> = Vec::new();
    let mut replaced = false;
    let mut skipping_continuation = false;
    for line in inner.lines() {
        let line = line.trim_end_matches('\r');
        if skipping_continuation {
            if line.starts_with(' ') || line.starts_with('\t') || line.starts_with("- ") {
                continue;
            }
            skipping_continuation = false;
        }
        if !replaced && key_line_value(line, field).is_some() {
            lines.push(new_line.clone());
            replaced = true;
            skipping_continuation = true;
            continue;
        }
        lines.push(line.to_string());
    }
    if !replaced {
        lines.push(new_line);
    }

    let opening_len = parts.prefix.find('\n').map(|i| i + 1).unwrap_or(0);
    let opening = &parts.prefix[..opening_len];
    let closing = &parts.prefix[opening_len + inner.len()..];

    let mut out = String::with_capacity(text.len() + value.len() + field.len() + 4);
    out.push_str(opening);
    for line in &lines {
        out.push_str(line);
        out.push_str(eol);
    }
    out.push_str(closing);
    out.push_str(parts.body);
    out
}
