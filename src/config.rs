use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub vault: VaultConfig,
    #[serde(default)]
    pub exclude: ExcludeConfig,
    #[serde(default)]
    pub markers: MarkersConfig,
    #[serde(default)]
    pub links: LinksConfig,
    #[serde(default)]
    pub tags: TagsConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub batch: BatchConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VaultConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string()]
}

/// Folder and filename exclusion rules. See [`crate::exclude::PathMatcher`].
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ExcludeConfig {
    #[serde(default)]
    pub folders: Vec<String>,
    #[serde(default)]
    pub files: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MarkersConfig {
    #[serde(default = "default_boundary")]
    pub boundary: String,
}

impl Default for MarkersConfig {
    fn default() -> Self {
        Self {
            boundary: default_boundary(),
        }
    }
}

pub const DEFAULT_BOUNDARY_MARKER: &str = "<!-- HASH_BOUNDARY -->";

fn default_boundary() -> String {
    DEFAULT_BOUNDARY_MARKER.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LinksConfig {
    #[serde(default = "default_links_title")]
    pub title: String,
    #[serde(default = "default_links_start")]
    pub start: String,
    #[serde(default = "default_links_end")]
    pub end: String,
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    #[serde(default = "default_max_links")]
    pub max_links: usize,
}

impl Default for LinksConfig {
    fn default() -> Self {
        Self {
            title: default_links_title(),
            start: default_links_start(),
            end: default_links_end(),
            min_score: default_min_score(),
            max_links: default_max_links(),
        }
    }
}

fn default_links_title() -> String {
    "## Suggested Links".to_string()
}
fn default_links_start() -> String {
    "<!-- LINKS_START -->".to_string()
}
fn default_links_end() -> String {
    "<!-- LINKS_END -->".to_string()
}
fn default_min_score() -> f64 {
    7.0
}
fn default_max_links() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct TagsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_tags_title")]
    pub title: String,
    #[serde(default = "default_tags_start")]
    pub start: String,
    #[serde(default = "default_tags_end")]
    pub end: String,
    #[serde(default = "default_max_tags")]
    pub max_tags: usize,
}

impl Default for TagsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            title: default_tags_title(),
            start: default_tags_start(),
            end: default_tags_end(),
            max_tags: default_max_tags(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_tags_title() -> String {
    "## Suggested Tags".to_string()
}
fn default_tags_start() -> String {
    "<!-- TAGS_START -->".to_string()
}
fn default_tags_end() -> String {
    "<!-- TAGS_END -->".to_string()
}
fn default_max_tags() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScoringConfig {
    #[serde(default = "default_scores_file")]
    pub scores_file: PathBuf,
    #[serde(default = "default_fingerprints_file")]
    pub fingerprints_file: PathBuf,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            scores_file: default_scores_file(),
            fingerprints_file: default_fingerprints_file(),
        }
    }
}

fn default_scores_file() -> PathBuf {
    PathBuf::from(".vault-linker/ai_scores.json")
}
fn default_fingerprints_file() -> PathBuf {
    PathBuf::from(".vault-linker/fingerprints.json")
}

#[derive(Debug, Deserialize, Clone)]
pub struct IdentityConfig {
    #[serde(default = "default_identity_field")]
    pub field: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            field: default_identity_field(),
        }
    }
}

fn default_identity_field() -> String {
    "id".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct BatchConfig {
    #[serde(default = "default_batch_size")]
    pub size: usize,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    /// When true, `annotate` inserts a boundary marker into documents that
    /// lack one instead of skipping them.
    #[serde(default)]
    pub insert_missing_boundary: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            size: default_batch_size(),
            cache_capacity: default_cache_capacity(),
            insert_missing_boundary: false,
        }
    }
}

fn default_batch_size() -> usize {
    20
}
fn default_cache_capacity() -> usize {
    1000
}

impl Config {
    /// Config rooted at `root` with every other setting at its default.
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        Self {
            vault: VaultConfig {
                root: root.into(),
                include_globs: default_include_globs(),
                exclude_globs: Vec::new(),
                follow_symlinks: false,
            },
            exclude: ExcludeConfig::default(),
            markers: MarkersConfig::default(),
            links: LinksConfig::default(),
            tags: TagsConfig::default(),
            scoring: ScoringConfig::default(),
            identity: IdentityConfig::default(),
            batch: BatchConfig::default(),
        }
    }

    /// Resolve a data-file path: absolute paths are kept, relative ones
    /// are taken relative to the vault root.
    pub fn resolve_data_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.vault.root.join(path)
        }
    }

    pub fn scores_path(&self) -> PathBuf {
        self.resolve_data_path(&self.scoring.scores_file)
    }

    pub fn fingerprints_path(&self) -> PathBuf {
        self.resolve_data_path(&self.scoring.fingerprints_file)
    }

    pub fn validate(&self) -> Result<()> {
        let boundary = &self.markers.boundary;
        if boundary.trim().is_empty() {
            anyhow::bail!("markers.boundary must not be empty");
        }

        if self.batch.size == 0 {
            anyhow::bail!("batch.size must be > 0");
        }
        if self.batch.cache_capacity == 0 {
            anyhow::bail!("batch.cache_capacity must be > 0");
        }
        if self.links.max_links == 0 {
            anyhow::bail!("links.max_links must be > 0");
        }
        if self.tags.max_tags == 0 {
            anyhow::bail!("tags.max_tags must be > 0");
        }
        if self.identity.field.trim().is_empty() || self.identity.field.contains(':') {
            anyhow::bail!("identity.field must be a plain frontmatter key");
        }

        let section_markers = [
            ("links.start", &self.links.start),
            ("links.end", &self.links.end),
            ("tags.start", &self.tags.start),
            ("tags.end", &self.tags.end),
        ];
        for (i, (name, marker)) in section_markers.iter().enumerate() {
            if marker.trim().is_empty() {
                anyhow::bail!("{} must not be empty", name);
            }
            if marker.contains(boundary.as_str()) || boundary.contains(marker.as_str()) {
                anyhow::bail!("{} must not overlap with markers.boundary", name);
            }
            for (other_name, other) in &section_markers[i + 1..] {
                if marker == other {
                    anyhow::bail!("{} and {} must be distinct", name, other_name);
                }
            }
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    if !config.vault.root.is_dir() {
        anyhow::bail!(
            "vault.root does not exist or is not a directory: {}",
            config.vault.root.display()
        );
    }

    Ok(config)
}
