//! Folder and filename exclusion rules.
//!
//! A document is excluded when its path matches any folder rule or its
//! filename (with or without extension) matches any filename rule.
//! Matching is pure string work and never touches the filesystem.
//!
//! Folder rules match when the path starts with `rule/`, equals `rule`, or
//! contains `/rule/`. Filename rules are tried in this order:
//!
//! | Rule shape | Match |
//! |------------|-------|
//! | any | exact equality |
//! | `^name$` | equality with `name` |
//! | contains `*` | case-insensitive glob, `*` = any run of characters |
//! | otherwise | case-insensitive substring |

use anyhow::Result;
use regex::Regex;

use crate::config::ExcludeConfig;

#[derive(Debug)]
enum FileRule {
    Anchored { raw: String, inner: String },
    Glob { raw: String, re: Regex },
    Substring { raw: String, lowered: String },
}

impl FileRule {
    fn compile(rule: &str) -> Result<Self> {
        let raw = rule.to_string();
        if rule.len() >= 2 && rule.starts_with('^') && rule.ends_with('$') {
            let inner = rule[1..rule.len() - 1].to_string();
            return Ok(FileRule::Anchored { raw, inner });
        }
        if rule.contains('*') {
            let body = rule
                .split('*')
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(".*");
            let re = Regex::new(&format!("(?is)^{}$", body))?;
            return Ok(FileRule::Glob { raw, re });
        }
        Ok(FileRule::Substring {
            lowered: rule.to_lowercase(),
            raw,
        })
    }

    fn matches(&self, name: &str) -> bool {
        match self {
            FileRule::Anchored { raw, inner } => name == raw || name == inner,
            FileRule::Glob { raw, re } => name == raw || re.is_match(name),
            FileRule::Substring { raw, lowered } => {
                name == raw || name.to_lowercase().contains(lowered.as_str())
            }
        }
    }
}

/// Compiled exclusion rules.
#[derive(Debug)]
pub struct PathMatcher {
    folders: Vec<String>,
    files: Vec<FileRule>,
}

impl PathMatcher {
    pub fn new(folders: &[String], files: &[String]) -> Result<Self> {
        let folders = folders
            .iter()
            .map(|f| f.trim().trim_matches('/').to_string())
            .filter(|f| !f.is_empty())
            .collect();
        let files = files
            .iter()
            .map(|f| f.trim())
            .filter(|f| !f.is_empty())
            .map(FileRule::compile)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { folders, files })
    }

    pub fn from_config(config: &ExcludeConfig) -> Result<Self> {
        Self::new(&config.folders, &config.files)
    }

    /// Returns true when `path` must not be processed.
    pub fn is_excluded(&self, path: &str) -> bool {
        self.excluded_by_folder(path) || self.excluded_by_filename(path)
    }

    fn excluded_by_folder(&self, path: &str) -> bool {
        self.folders.iter().any(|rule| {
            path == rule
                || path.starts_with(&format!("{}/", rule))
                || path.contains(&format!("/{}/", rule))
        })
    }

    fn excluded_by_filename(&self, path: &str) -> bool {
        if self.files.is_empty() {
            return false;
        }
        let file_name = path.rsplit('/').next().unwrap_or(path);
        let stem = match file_name.rfind('.') {
            Some(idx) if idx > 0 => &file_name[..idx],
            _ => file_name,
        };
        self.files
            .iter()
            .any(|rule| rule.matches(file_name) || rule.matches(stem))
    }
}
