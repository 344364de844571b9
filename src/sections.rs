//! Machine-owned annotation sections after the boundary marker.
//!
//! Every rewrite is anchored on the first boundary marker in the body.
//! Text before it is copied byte for byte. After it, every known section
//! kind is stripped (repeatedly, so stray duplicates from older writers
//! collapse), the requested blocks are appended in the caller's order, and
//! whatever user text was left in the zone follows after a blank line.
//! Applying the same sections to the output reproduces it exactly.

use std::cmp::Ordering;
use std::collections::HashSet;

use anyhow::Result;
use regex::Regex;

use crate::config::Config;
use crate::frontmatter;
use crate::models::Candidate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionKind {
    Links,
    Tags,
}

impl SectionKind {
    /// Every kind this crate has ever written, in canonical output order.
    pub const ALL: [SectionKind; 2] = [SectionKind::Links, SectionKind::Tags];

    pub fn as_str(&self) -> &'static str {
        match self {
            SectionKind::Links => "links",
            SectionKind::Tags => "tags",
        }
    }
}

/// Literal title line and start/end markers of one section kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionMarkers {
    pub title: String,
    pub start: String,
    pub end: String,
}

impl SectionMarkers {
    pub fn new(title: &str, start: &str, end: &str) -> Self {
        Self {
            title: title.to_string(),
            start: start.to_string(),
            end: end.to_string(),
        }
    }

    fn strip_pattern(&self) -> Result<Regex> {
        let pattern = format!(
            r"(?s)\s*(?:{}[ \t]*\r?\n\s*)?{}.*?{}\s*",
            regex::escape(self.title.trim()),
            regex::escape(&self.start),
            regex::escape(&self.end),
        );
        Ok(Regex::new(&pattern)?)
    }

    /// Render a block: title, start marker, one line per bullet, end marker.
    /// No bullets renders the empty string, which removes the section.
    pub fn render(&self, bullets: &[String]) -> String {
        if bullets.is_empty() {
            return String::new();
        }
        let mut out = String::new();
        out.push_str(self.title.trim());
        out.push('\n');
        out.push_str(&self.start);
        out.push('\n');
        for bullet in bullets {
            out.push_str("- ");
            out.push_str(bullet);
            out.push('\n');
        }
        out.push_str(&self.end);
        out
    }
}

struct KnownSection {
    markers: SectionMarkers,
    pattern: Regex,
}

/// Result of splitting a document at its boundary marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundarySplit<'a> {
    pub prefix: &'a str,
    pub before: &'a str,
    pub after: &'a str,
}

pub struct SectionEditor {
    boundary: String,
    links: KnownSection,
    tags: KnownSection,
}

impl SectionEditor {
    pub fn new(boundary: &str, links: SectionMarkers, tags: SectionMarkers) -> Result<Self> {
        Ok(Self {
            boundary: boundary.to_string(),
            links: KnownSection {
                pattern: links.strip_pattern()?,
                markers: links,
            },
            tags: KnownSection {
                pattern: tags.strip_pattern()?,
                markers: tags,
            },
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.markers.boundary,
            SectionMarkers::new(&config.links.title, &config.links.start, &config.links.end),
            SectionMarkers::new(&config.tags.title, &config.tags.start, &config.tags.end),
        )
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    fn known(&self, kind: SectionKind) -> &KnownSection {
        match kind {
            SectionKind::Links => &self.links,
            SectionKind::Tags => &self.tags,
        }
    }

    pub fn markers(&self, kind: SectionKind) -> &SectionMarkers {
        &self.known(kind).markers
    }

    /// Split at the first boundary marker in the body, or `None`.
    pub fn split<'a>(&self, text: &'a str) -> Option<BoundarySplit<'a>> {
        let parts = frontmatter::split(text);
        let idx = parts.body.find(&self.boundary)?;
        Some(BoundarySplit {
            prefix: parts.prefix,
            before: &parts.body[..idx],
            after: &parts.body[idx + self.boundary.len()..],
        })
    }

    /// Remove every known section from annotation-zone text. Returns the
    /// trimmed leftover and whether anything was removed.
    pub fn strip_sections(&self, after: &str) -> (String, bool) {
        let mut current = after.to_string();
        let mut removed = false;
        loop {
            let mut changed = false;
            for kind in SectionKind::ALL {
                let next = self
                    .known(kind)
                    .pattern
                    .replace_all(&current, "\n\n")
                    .into_owned();
                if next != current {
                    current = next;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
            removed = true;
        }
        (current.trim().to_string(), removed)
    }

    /// Rewrite the annotation zone of `text` with `sections`, each a kind
    /// and its rendered block. An empty block removes that kind. Documents
    /// without a boundary marker are returned unchanged.
    ///
    /// Output uses the document's line ending (CRLF if the input has any).
    /// If the rewrite would move the boundary, the input is returned as is.
    pub fn apply(&self, text: &str, sections: &[(SectionKind, String)]) -> String {
        let Some(split) = self.split(text) else {
            return text.to_string();
        };

        let (leftover, removed_any) = self.strip_sections(split.after);

        let eol = line_ending(text);
        let mut seen = HashSet::new();
        let blocks: Vec<String> = sections
            .iter()
            .filter(|(kind, _)| seen.insert(*kind))
            .map(|(_, block)| block.trim())
            .filter(|block| !block.is_empty())
            .map(|block| block.replace("\r\n", "\n").replace('\n', eol))
            .collect();

        if blocks.is_empty() && !removed_any {
            return text.to_string();
        }

        let mut out = String::with_capacity(text.len() + blocks.iter().map(|b| b.len() + 4).sum::<usize>());
        out.push_str(split.prefix);
        out.push_str(split.before);
        out.push_str(&self.boundary);
        if !blocks.is_empty() {
            let separator = format!("{eol}{eol}");
            out.push_str(eol);
            out.push_str(&blocks.join(separator.as_str()));
        }
        if !leftover.is_empty() {
            out.push_str(eol);
            out.push_str(eol);
            out.push_str(&leftover);
        }
        out.push_str(eol);
        self.anchored(text, &split, out)
    }

    /// Drop everything after the boundary marker, machine-owned or not.
    /// A zone holding only whitespace is left alone.
    pub fn truncate(&self, text: &str) -> String {
        let Some(split) = self.split(text) else {
            return text.to_string();
        };
        if split.after.trim().is_empty() {
            return text.to_string();
        }
        let mut out = String::with_capacity(split.prefix.len() + split.before.len() + self.boundary.len() + 2);
        out.push_str(split.prefix);
        out.push_str(split.before);
        out.push_str(&self.boundary);
        out.push_str(line_ending(text));
        self.anchored(text, &split, out)
    }

    /// `out` if its boundary still sits where it did in `text`, else `text`.
    /// Trailing lines such as a bare `---` can otherwise close an
    /// unterminated frontmatter block and swallow the boundary.
    fn anchored(&self, text: &str, original: &BoundarySplit<'_>, out: String) -> String {
        let keeps_anchor = self.split(&out).is_some_and(|s| {
            s.prefix.len() == original.prefix.len() && s.before.len() == original.before.len()
        });
        if keeps_anchor {
            out
        } else {
            tracing::debug!("rewrite would move the boundary marker, leaving document as is");
            text.to_string()
        }
    }

    /// Remove every machine-owned section, keeping user text in the zone.
    pub fn clear(&self, text: &str) -> String {
        let empty: Vec<(SectionKind, String)> =
            SectionKind::ALL.iter().map(|k| (*k, String::new())).collect();
        self.apply(text, &empty)
    }
}

fn line_ending(text: &str) -> &'static str {
    if text.contains("\r\n") {
        "\r\n"
    } else {
        "\n"
    }
}

/// Rank candidates: relevance score descending, then raw similarity
/// descending, then target path for a stable order.
pub fn rank_candidates(candidates: &mut [Candidate]) {
    candidates.sort_by(compare_rank);
}

fn compare_rank(a: &Candidate, b: &Candidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.similarity.total_cmp(&a.similarity))
        .then_with(|| a.target.cmp(&b.target))
}

/// Choose the candidates that make it into a links block: at or above
/// `min_score`, resolvable, at most `max_links`, in ranked order.
pub fn select_links<'a, F>(
    candidates: &'a [Candidate],
    min_score: f64,
    max_links: usize,
    resolvable: F,
) -> Vec<&'a Candidate>
where
    F: Fn(&Candidate) -> bool,
{
    let mut ranked: Vec<&'a Candidate> =
        candidates.iter().filter(|c| c.score >= min_score).collect();
    ranked.sort_by(|a, b| compare_rank(a, b));

    let mut seen = HashSet::new();
    ranked
        .into_iter()
        .filter(|c| seen.insert(c.target.as_str()))
        .filter(|c| resolvable(c))
        .take(max_links)
        .collect()
}

/// Wiki-link text for a target path: the path without its `.md` extension.
pub fn link_text(target: &str) -> String {
    let target = target.strip_suffix(".md").unwrap_or(target);
    format!("[[{}]]", target)
}

pub fn render_links(
    markers: &SectionMarkers,
    candidates: &[Candidate],
    min_score: f64,
    max_links: usize,
    resolvable: impl Fn(&Candidate) -> bool,
) -> String {
    let bullets: Vec<String> = select_links(candidates, min_score, max_links, resolvable)
        .into_iter()
        .map(|c| link_text(&c.target))
        .collect();
    markers.render(&bullets)
}

/// Normalize a tag for output: no leading `#`, inner whitespace as `-`.
pub fn tag_text(tag: &str) -> Option<String> {
    let cleaned = tag.trim().trim_start_matches('#').trim();
    if cleaned.is_empty() {
        return None;
    }
    let joined = cleaned.split_whitespace().collect::<Vec<_>>().join("-");
    Some(format!("#{}", joined))
}

pub fn render_tags(markers: &SectionMarkers, tags: &[String], max_tags: usize) -> String {
    let mut seen = HashSet::new();
    let bullets: Vec<String> = tags
        .iter()
        .filter_map(|t| tag_text(t))
        .filter(|t| seen.insert(t.clone()))
        .take(max_tags)
        .collect();
    markers.render(&bullets)
}

#[cfg(test)]
mod tests {
    use super::*;

    const B: &str = "<!-- HASH_BOUNDARY -->";

    fn editor() -> SectionEditor {
        SectionEditor::new(
            B,
            SectionMarkers::new("## Links", "<!-- LINKS_START -->", "<!-- LINKS_END -->"),
            SectionMarkers::new("## Tags", "<!-- TAGS_START -->", "<!-- TAGS_END -->"),
        )
        .unwrap()
    }

    fn links_block(targets: &[&str]) -> String {
        let e = editor();
        let bullets: Vec<String> = targets.iter().map(|t| link_text(t)).collect();
        e.markers(SectionKind::Links).render(&bullets)
    }

    #[test]
    fn end_to_end_single_link() {
        let e = editor();
        let doc = "---\nid: x\n---\nHello\n<!-- HASH_BOUNDARY -->\n";
        let block = links_block(&["Other.md"]);
        let out = e.apply(doc, &[(SectionKind::Links, block.clone())]);
        assert_eq!(
            out,
            "---\nid: x\n---\nHello\n<!-- HASH_BOUNDARY -->\n## Links\n<!-- LINKS_START -->\n- [[Other]]\n<!-- LINKS_END -->\n"
        );
        let again = e.apply(&out, &[(SectionKind::Links, block)]);
        assert_eq!(again, out);
    }

    #[test]
    fn no_marker_returns_input() {
        let e = editor();
        let doc = "---\nid: x\n---\nHello\n";
        assert_eq!(e.apply(doc, &[(SectionKind::Links, links_block(&["a.md"]))]), doc);
    }

    #[test]
    fn before_boundary_preserved_byte_for_byte() {
        let e = editor();
        let doc = "  odd\r\n spacing\t\n<!-- HASH_BOUNDARY -->old trailing";
        let out = e.apply(doc, &[(SectionKind::Links, links_block(&["a.md"]))]);
        assert!(out.starts_with("  odd\r\n spacing\t\n<!-- HASH_BOUNDARY -->"));
    }

    #[test]
    fn duplicates_collapse_to_one() {
        let e = editor();
        let stray = links_block(&["old.md"]);
        let doc = format!("Body\n{}\n{}\n\n{}\n", B, stray, stray);
        let out = e.apply(&doc, &[(SectionKind::Links, links_block(&["new.md"]))]);
        assert_eq!(out.matches("<!-- LINKS_START -->").count(), 1);
        assert!(out.contains("[[new]]"));
        assert!(!out.contains("[[old]]"));
    }

    #[test]
    fn user_content_in_zone_kept_after_sections() {
        let e = editor();
        let doc = format!("Body\n{}\n{}\n\nMy own note.\n", B, links_block(&["old.md"]));
        let out = e.apply(&doc, &[(SectionKind::Links, links_block(&["new.md"]))]);
        assert!(out.ends_with("<!-- LINKS_END -->\n\nMy own note.\n"));
        assert_eq!(e.apply(&out, &[(SectionKind::Links, links_block(&["new.md"]))]), out);
    }

    #[test]
    fn empty_block_removes_section() {
        let e = editor();
        let doc = format!("Body\n{}\n{}\n", B, links_block(&["old.md"]));
        let out = e.apply(&doc, &[(SectionKind::Links, String::new())]);
        assert_eq!(out, format!("Body\n{}\n", B));
    }

    #[test]
    fn nothing_to_do_leaves_text_alone() {
        let e = editor();
        let doc = "Body\n<!-- HASH_BOUNDARY -->\n\n  user text  ";
        assert_eq!(e.apply(doc, &[(SectionKind::Links, String::new())]), doc);
    }

    #[test]
    fn other_kinds_are_stripped_too() {
        let e = editor();
        let tags = render_tags(e.markers(SectionKind::Tags), &["a".to_string()], 5);
        let doc = format!("Body\n{}\n{}\n", B, tags);
        let out = e.apply(&doc, &[(SectionKind::Links, links_block(&["x.md"]))]);
        assert!(!out.contains("TAGS_START"));
        assert!(out.contains("LINKS_START"));
    }

    #[test]
    fn blocks_follow_caller_order() {
        let e = editor();
        let tags = render_tags(e.markers(SectionKind::Tags), &["t".to_string()], 5);
        let out = e.apply(
            "B\n<!-- HASH_BOUNDARY -->",
            &[(SectionKind::Tags, tags), (SectionKind::Links, links_block(&["x.md"]))],
        );
        let tag_pos = out.find("TAGS_START").unwrap();
        let link_pos = out.find("LINKS_START").unwrap();
        assert!(tag_pos < link_pos);
    }

    #[test]
    fn untitled_stray_markers_are_removed() {
        let e = editor();
        let doc = format!("Body\n{}\n<!-- LINKS_START -->\n- [[x]]\n<!-- LINKS_END -->\n", B);
        assert_eq!(e.clear(&doc), format!("Body\n{}\n", B));
    }

    #[test]
    fn only_first_boundary_counts() {
        let e = editor();
        let doc = format!("Body\n{}\nzone\n{}\n", B, B);
        let out = e.apply(&doc, &[(SectionKind::Links, links_block(&["x.md"]))]);
        assert!(out.starts_with(&format!("Body\n{}\n## Links", B)));
        assert!(out.ends_with(&format!("zone\n{}\n", B)));
    }

    #[test]
    fn crlf_document_keeps_crlf() {
        let e = editor();
        let doc = "Hello\r\n<!-- HASH_BOUNDARY -->\r\n## Links\r\n<!-- LINKS_START -->\r\n- [[x]]\r\n<!-- LINKS_END -->\r\n";
        let block = links_block(&["x.md"]);
        assert_eq!(e.apply(doc, &[(SectionKind::Links, block.clone())]), doc);

        let fresh = e.apply("Hello\r\n<!-- HASH_BOUNDARY -->\r\n", &[(SectionKind::Links, block)]);
        assert_eq!(fresh, doc);
    }

    #[test]
    fn rewrite_that_would_close_frontmatter_is_refused() {
        let e = editor();
        let doc = "---\n<!-- HASH_BOUNDARY -->---";
        let tags = render_tags(e.markers(SectionKind::Tags), &["t".to_string()], 5);
        assert_eq!(e.apply(doc, &[(SectionKind::Tags, tags)]), doc);
        assert_eq!(e.truncate(doc), "---\n<!-- HASH_BOUNDARY -->\n");
    }

    #[test]
    fn truncate_drops_whole_zone() {
        let e = editor();
        let doc = format!("Body\n{}\n{}\n\nmy own text\n", B, links_block(&["a.md"]));
        assert_eq!(e.truncate(&doc), format!("Body\n{}\n", B));
        assert_eq!(e.truncate(&format!("Body\n{}\n  \n", B)), format!("Body\n{}\n  \n", B));
        assert_eq!(e.truncate("no marker\n"), "no marker\n");
    }

    fn cand(target: &str, score: f64, similarity: f64) -> Candidate {
        Candidate {
            target: target.to_string(),
            score,
            similarity,
        }
    }

    #[test]
    fn ranking_ties_break_on_similarity() {
        let mut c = vec![cand("a.md", 8.0, 0.7), cand("b.md", 9.0, 0.1), cand("c.md", 8.0, 0.9)];
        rank_candidates(&mut c);
        let order: Vec<&str> = c.iter().map(|c| c.target.as_str()).collect();
        assert_eq!(order, vec!["b.md", "c.md", "a.md"]);
    }

    #[test]
    fn selection_applies_threshold_resolution_and_limit() {
        let c = vec![
            cand("gone.md", 10.0, 0.9),
            cand("a.md", 9.0, 0.8),
            cand("b.md", 8.0, 0.8),
            cand("low.md", 3.0, 0.99),
            cand("c.md", 7.0, 0.5),
        ];
        let chosen = select_links(&c, 7.0, 2, |c| c.target != "gone.md");
        let targets: Vec<&str> = chosen.iter().map(|c| c.target.as_str()).collect();
        assert_eq!(targets, vec!["a.md", "b.md"]);
    }

    #[test]
    fn render_links_empty_when_nothing_qualifies() {
        let e = editor();
        let c = vec![cand("a.md", 1.0, 0.1)];
        assert_eq!(render_links(e.markers(SectionKind::Links), &c, 7.0, 5, |_| true), "");
    }

    #[test]
    fn tags_normalized_and_deduplicated() {
        let e = editor();
        let tags: Vec<String> = ["#rust", "rust", "systems programming", " ", "b"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let block = render_tags(e.markers(SectionKind::Tags), &tags, 2);
        assert_eq!(
            block,
            "## Tags\n<!-- TAGS_START -->\n- #rust\n- #systems-programming\n<!-- TAGS_END -->"
        );
    }

    mod properties {
        use super::*;
        use crate::fingerprint::fingerprint;
        use proptest::prelude::*;

        const FRAGMENTS: &[&str] = &[
            "---",
            "\n",
            "\r\n",
            " ",
            "\t",
            "<!-- HASH_BOUNDARY -->",
            "## Links",
            "<!-- LINKS_START -->",
            "<!-- LINKS_END -->",
            "## Tags",
            "<!-- TAGS_START -->",
            "<!-- TAGS_END -->",
            "- [[x]]",
            "id: 1",
            "text",
        ];

        fn document() -> impl Strategy<Value = String> {
            prop::collection::vec(prop::sample::select(FRAGMENTS.to_vec()), 0..16)
                .prop_map(|parts| parts.concat())
        }

        fn sections() -> impl Strategy<Value = Vec<(SectionKind, String)>> {
            let e = editor();
            let links = e.markers(SectionKind::Links).clone();
            let tags = e.markers(SectionKind::Tags).clone();
            (0usize..3, 0usize..3, any::<bool>()).prop_map(move |(n_links, n_tags, tags_first)| {
                let link_bullets: Vec<String> =
                    (0..n_links).map(|i| link_text(&format!("n{}.md", i))).collect();
                let tag_bullets: Vec<String> = (0..n_tags).map(|i| format!("#t{}", i)).collect();
                let mut out = vec![
                    (SectionKind::Links, links.render(&link_bullets)),
                    (SectionKind::Tags, tags.render(&tag_bullets)),
                ];
                if tags_first {
                    out.reverse();
                }
                out
            })
        }

        proptest! {
            #[test]
            fn apply_is_idempotent(doc in document(), s in sections()) {
                let e = editor();
                let once = e.apply(&doc, &s);
                prop_assert_eq!(e.apply(&once, &s), once);
            }

            #[test]
            fn text_before_boundary_is_kept(doc in document(), s in sections()) {
                let e = editor();
                let out = e.apply(&doc, &s);
                if let Some(split) = e.split(&doc) {
                    let kept = split.prefix.len() + split.before.len() + B.len();
                    prop_assert_eq!(&out[..kept], &doc[..kept]);
                }
            }

            #[test]
            fn fingerprint_survives_rewrites(doc in document(), s in sections()) {
                let e = editor();
                prop_assert_eq!(fingerprint(&e.apply(&doc, &s), B), fingerprint(&doc, B));
                prop_assert_eq!(fingerprint(&e.clear(&doc), B), fingerprint(&doc, B));
                prop_assert_eq!(fingerprint(&e.truncate(&doc), B), fingerprint(&doc, B));
            }

            #[test]
            fn documents_without_marker_are_untouched(doc in document(), s in sections()) {
                let e = editor();
                let doc = doc.replace(B, "");
                prop_assert_eq!(fingerprint(&doc, B), None);
                prop_assert_eq!(e.apply(&doc, &s), doc.clone());
                prop_assert_eq!(e.truncate(&doc), doc);
            }
        }
    }
}
