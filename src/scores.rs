//! Read-only access to the scoring collaborator's output.
//!
//! Three shapes are understood:
//!
//! | Shape | Recognized by |
//! |-------|---------------|
//! | `scores_by_source_path` JSON | top-level `scores_by_source_path` object |
//! | legacy export JSON | top-level `ai_scores` object |
//! | scorer SQLite database | `.db`, `.sqlite` or `.sqlite3` extension |
//!
//! In the database, links come from `ai_relationships`. Tags come from
//! `note_tags` joined to `notes` when the scorer has generated any.
//!
//! Anything else, including a missing file, is
//! [`LinkerError::UpstreamDataMissing`]: annotation cannot proceed without it.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::error::LinkerError;
use crate::models::Candidate;
use crate::sections::rank_candidates;
use crate::store::normalize_path;

/// Scored link candidates and suggested tags, keyed by source path.
#[derive(Debug, Clone, Default)]
pub struct ScoreData {
    links: HashMap<String, Vec<Candidate>>,
    tags: HashMap<String, Vec<String>>,
}

impl ScoreData {
    /// Ranked candidates for `source`, empty when the scorer has none.
    pub fn candidates_for(&self, source: &str) -> &[Candidate] {
        self.links.get(source).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn tags_for(&self, source: &str) -> &[String] {
        self.tags.get(source).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn source_count(&self) -> usize {
        self.links.len()
    }

    pub fn push_candidate(&mut self, source: &str, candidate: Candidate) {
        let candidate = Candidate {
            target: normalize_path(&candidate.target),
            ..candidate
        };
        self.links
            .entry(normalize_path(source))
            .or_default()
            .push(candidate);
    }

    pub fn set_tags(&mut self, source: &str, tags: Vec<String>) {
        self.tags.insert(normalize_path(source), tags);
    }

    fn finish(mut self) -> Self {
        for list in self.links.values_mut() {
            rank_candidates(list);
        }
        self
    }
}

/// One row of `scores_by_source_path`: `[target, score]` or
/// `[target, score, similarity]`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScoreRow {
    Triple(String, f64, f64),
    Pair(String, f64),
}

#[derive(Debug, Deserialize)]
struct LegacyEntry {
    source_path: String,
    target_path: String,
    ai_score: Option<f64>,
    #[serde(default)]
    jina_similarity: Option<f64>,
}

/// Load scoring data from `path`.
pub async fn load_scores(path: &Path) -> Result<ScoreData, LinkerError> {
    let shown = path.display().to_string();
    if !path.is_file() {
        return Err(LinkerError::upstream(&shown, "file not found"));
    }

    let is_sqlite = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("db" | "sqlite" | "sqlite3")
    );
    let data = if is_sqlite {
        load_sqlite(path).await?
    } else {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| LinkerError::upstream(&shown, e.to_string()))?;
        parse_json(&raw).map_err(|reason| LinkerError::upstream(&shown, reason))?
    };

    tracing::info!(path = %shown, sources = data.source_count(), "loaded scoring data");
    Ok(data.finish())
}

/// Parse either JSON shape.
pub fn parse_json(raw: &str) -> Result<ScoreData, String> {
    let root: Value = serde_json::from_str(raw).map_err(|e| format!("invalid JSON: {}", e))?;
    let Value::Object(root) = root else {
        return Err("top level is not a JSON object".to_string());
    };

    let mut data = ScoreData::default();

    if let Some(scores) = root.get("scores_by_source_path") {
        let scores: HashMap<String, Vec<ScoreRow>> = serde_json::from_value(scores.clone())
            .map_err(|e| format!("scores_by_source_path: {}", e))?;
        for (source, rows) in scores {
            for row in rows {
                let (target, score, similarity) = match row {
                    ScoreRow::Triple(t, s, sim) => (t, s, sim),
                    ScoreRow::Pair(t, s) => (t, s, 0.0),
                };
                data.push_candidate(
                    &source,
                    Candidate {
                        target,
                        score,
                        similarity,
                    },
                );
            }
        }
    } else if let Some(legacy) = root.get("ai_scores") {
        let legacy: HashMap<String, LegacyEntry> = serde_json::from_value(legacy.clone())
            .map_err(|e| format!("ai_scores: {}", e))?;
        for entry in legacy.into_values() {
            let Some(score) = entry.ai_score else {
                continue;
            };
            data.push_candidate(
                &entry.source_path,
                Candidate {
                    target: entry.target_path,
                    score,
                    similarity: entry.jina_similarity.unwrap_or(0.0),
                },
            );
        }
    } else {
        return Err("expected a `scores_by_source_path` or `ai_scores` object".to_string());
    }

    if let Some(tags) = root.get("tags_by_source_path") {
        let tags: HashMap<String, Vec<String>> = serde_json::from_value(tags.clone())
            .map_err(|e| format!("tags_by_source_path: {}", e))?;
        for (source, list) in tags {
            data.set_tags(&source, list);
        }
    }

    Ok(data)
}

async fn load_sqlite(path: &Path) -> Result<ScoreData, LinkerError> {
    let shown = path.display().to_string();
    let upstream = |e: sqlx::Error| LinkerError::upstream(&shown, e.to_string());

    let options = SqliteConnectOptions::new()
        .filename(path)
        .read_only(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .map_err(upstream)?;

    let rows = sqlx::query_as::<_, (String, String, f64, f64)>(
        "SELECT sp.file_path, tp.file_path,
                CAST(r.ai_score AS REAL),
                CAST(COALESCE(r.jina_similarity, 0.0) AS REAL)
         FROM ai_relationships r
         JOIN file_paths sp ON sp.id = r.source_file_id
         JOIN file_paths tp ON tp.id = r.target_file_id
         WHERE r.ai_score IS NOT NULL",
    )
    .fetch_all(&pool)
    .await
    .map_err(upstream)?;

    // Tag generation is a separate, optional scorer step.
    let tag_tables: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master
         WHERE type = 'table' AND name IN ('notes', 'note_tags')",
    )
    .fetch_one(&pool)
    .await
    .map_err(upstream)?;
    let tag_rows = if tag_tables == 2 {
        sqlx::query_as::<_, (String, String)>(
            "SELECT n.file_name, t.tag
             FROM note_tags t
             JOIN notes n ON n.note_id = t.note_id
             ORDER BY n.file_name, t.rowid",
        )
        .fetch_all(&pool)
        .await
        .map_err(upstream)?
    } else {
        Vec::new()
    };
    pool.close().await;

    let mut data = ScoreData::default();
    for (source, target, score, similarity) in rows {
        data.push_candidate(
            &source,
            Candidate {
                target,
                score,
                similarity,
            },
        );
    }

    let mut tags: HashMap<String, Vec<String>> = HashMap::new();
    for (source, tag) in tag_rows {
        tags.entry(source).or_default().push(tag);
    }
    for (source, list) in tags {
        data.set_tags(&source, list);
    }
    Ok(data)
}
