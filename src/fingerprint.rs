//! Content fingerprints over the tracked body.
//!
//! The tracked body is the text after the frontmatter block and before the
//! first boundary marker. It is normalized (CRLF to LF, trailing whitespace
//! stripped, one final newline) and hashed with SHA-256. An empty tracked
//! body hashes the single-newline sentinel, so it is distinct from a
//! document with no marker, which has no fingerprint at all.

use sha2::{Digest, Sha256};

use crate::frontmatter;

/// The tracked body of `text`, or `None` when the boundary marker is absent.
pub fn tracked_body<'a>(text: &'a str, boundary: &str) -> Option<&'a str> {
    let body = frontmatter::split(text).body;
    body.find(boundary).map(|idx| &body[..idx])
}

/// Normalize a tracked body for hashing.
pub fn normalize(region: &str) -> String {
    if region.trim().is_empty() {
        return "\n".to_string();
    }
    let mut normalized = region.replace("\r\n", "\n").trim_end().to_string();
    normalized.push('\n');
    normalized
}

/// SHA-256 hex digest of already-normalized content.
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Fingerprint of the tracked body of `text`, or `None` without a marker.
pub fn fingerprint(text: &str, boundary: &str) -> Option<String> {
    tracked_body(text, boundary).map(|region| hash_content(&normalize(region)))
}

/// Make a document trackable by inserting the boundary marker after the
/// last non-blank line of its body. Trailing blank lines are dropped; the
/// last content line keeps its bytes. Documents that already contain the
/// marker are returned unchanged. The frontmatter block is never touched.
pub fn insert_boundary(text: &str, boundary: &str) -> String {
    let parts = frontmatter::split(text);
    if parts.body.contains(boundary) {
        return text.to_string();
    }

    let eol = if text.contains("\r\n") { "\r\n" } else { "\n" };
    let content = without_trailing_blank_lines(parts.body);

    let mut out = String::with_capacity(text.len() + boundary.len() + 4);
    out.push_str(parts.prefix);
    if content.trim().is_empty() {
        out.push_str(eol);
    } else {
        out.push_str(content);
        out.push_str(eol);
        out.push_str(eol);
    }
    out.push_str(boundary);
    out.push_str(eol);
    out
}

/// `body` up to the end of its last line holding non-whitespace text, line
/// break excluded.
fn without_trailing_blank_lines(body: &str) -> &str {
    let Some(last) = body.rfind(|c: char| !c.is_whitespace()) else {
        return "";
    };
    let line_end = body[last..].find('\n').map_or(body.len(), |i| last + i);
    let line = &body[..line_end];
    line.strip_suffix('\r').unwrap_or(line)
}
