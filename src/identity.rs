//! Stable document identifiers in frontmatter.
//!
//! A document keeps a genuine identifier forever. Placeholder values
//! (containing `template`, the all-zero UUID, or anything not shaped like
//! a hyphenated UUID) are replaced with a fresh random one. Duplicate
//! genuine identifiers are reported by the caller, never rewritten.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::OsRng;
use rand::TryRngCore;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::frontmatter;

pub const NIL_IDENTIFIER: &str = "00000000-0000-0000-0000-000000000000";

const GROUP_LENGTHS: [usize; 5] = [8, 4, 4, 4, 12];

/// Five hyphen-separated hex groups of 8-4-4-4-12 digits.
fn has_canonical_shape(value: &str) -> bool {
    let groups: Vec<&str> = value.split('-').collect();
    groups.len() == GROUP_LENGTHS.len()
        && groups
            .iter()
            .zip(GROUP_LENGTHS)
            .all(|(group, len)| group.len() == len && group.chars().all(|c| c.is_ascii_hexdigit()))
}

/// True when `value` is not a usable identifier.
pub fn is_placeholder(value: &str) -> bool {
    let value = value.trim();
    value.contains("template") || value == NIL_IDENTIFIER || !has_canonical_shape(value)
}

/// A freshly generated identifier and whether it came from the weaker
/// fallback generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedId {
    pub value: String,
    pub degraded: bool,
}

/// Generate a random UUID from the OS random source, falling back to a
/// hashed clock/counter identifier when the OS source fails.
pub fn generate() -> GeneratedId {
    let mut bytes = [0u8; 16];
    match OsRng.try_fill_bytes(&mut bytes) {
        Ok(()) => GeneratedId {
            value: uuid::Builder::from_random_bytes(bytes).into_uuid().to_string(),
            degraded: false,
        },
        Err(e) => {
            tracing::warn!(
                degraded_identifier = true,
                error = %e,
                "OS random source unavailable, using fallback identifier generator"
            );
            GeneratedId {
                value: fallback_identifier(),
                degraded: true,
            }
        }
    }
}

/// Weaker identifier: hex groups cut from a hash of the clock, the process
/// id and a process-local counter. Unique within a run, not across hosts.
fn fallback_identifier() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let mut hasher = Sha256::new();
    hasher.update(nanos.to_le_bytes());
    hasher.update(std::process::id().to_le_bytes());
    hasher.update(COUNTER.fetch_add(1, Ordering::Relaxed).to_le_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    // Shape it as a v4 UUID so it passes the placeholder check on later runs.
    uuid::Builder::from_random_bytes(bytes).into_uuid().to_string()
}

/// What [`ensure_identifier`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityChange {
    /// The document already had a genuine identifier.
    Kept(String),
    /// A missing or placeholder identifier was replaced.
    Assigned {
        previous: Option<String>,
        id: GeneratedId,
    },
}

#[derive(Debug, Clone)]
pub struct IdentityResult {
    pub text: String,
    pub change: IdentityChange,
    /// Set when the frontmatter did not parse and a textual patch was used.
    pub malformed: Option<String>,
}

/// Ensure `text` carries a genuine identifier in frontmatter `field`.
pub fn ensure_identifier(text: &str, field: &str) -> IdentityResult {
    ensure_identifier_with(text, field, generate)
}

pub fn ensure_identifier_with<F>(text: &str, field: &str, generator: F) -> IdentityResult
where
    F: FnOnce() -> GeneratedId,
{
    let parts = frontmatter::split(text);
    let mut malformed = None;

    let existing = match parts.inner {
        None => None,
        Some(inner) => match frontmatter::parse(inner) {
            Ok(map) => frontmatter::scalar_field(&map, field),
            Err(reason) => {
                malformed = Some(reason);
                frontmatter::textual_field(inner, field)
            }
        },
    };

    if let Some(value) = &existing {
        if !is_placeholder(value) {
            return IdentityResult {
                text: text.to_string(),
                change: IdentityChange::Kept(value.trim().to_string()),
                malformed,
            };
        }
    }

    let id = generator();
    IdentityResult {
        text: frontmatter::set_field(text, field, &id.value),
        change: IdentityChange::Assigned {
            previous: existing,
            id,
        },
        malformed,
    }
}

/// Parse an identifier as a UUID, for callers that need the typed value.
pub fn parse_identifier(value: &str) -> Option<Uuid> {
    if is_placeholder(value) {
        return None;
    }
    Uuid::parse_str(value.trim()).ok()
}
