//! Pinned inline-content extractor.
//!
//! Scans the current note for annotation-prefixed trailing text or
//! explicitly delimited blocks and splices each match into alternating
//! literal-text and link segments. Broken links degrade to literal text so
//! user-visible content is never dropped.

use regex::Regex;

use crate::link::{file_stem, LinkInfo};
use crate::settings::{NavSettings, PinnedSetting};
use crate::vault::{split_frontmatter, Vault};

/// One segment of extracted content, in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentSegment {
    Text(String),
    Link(LinkInfo),
}

/// One pinned content item: the annotation's display prefix plus the
/// tokenized span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteContent {
    pub prefix: String,
    pub content: Vec<ContentSegment>,
}

/// Extract pinned content items from `file`, ordered by appearance in the
/// text (not by annotation or alphabetically).
pub fn get_pinned_note_contents(
    vault: &dyn Vault,
    file: &str,
    settings: &NavSettings,
) -> Vec<NoteContent> {
    let Some(text) = vault.read_text(file) else {
        return Vec::new();
    };
    let (_, body) = split_frontmatter(&text);
    let tokenizer = SpanTokenizer::new();

    let mut found: Vec<(usize, NoteContent)> = Vec::new();
    for setting in &settings.pinned {
        if setting.annotation.is_empty() {
            continue;
        }
        for (offset, span) in extract_spans(body, setting) {
            let content = tokenizer.tokenize(vault, file, &span);
            if !content.is_empty() {
                found.push((
                    offset,
                    NoteContent {
                        prefix: setting.prefix.clone(),
                        content,
                    },
                ));
            }
        }
    }
    found.sort_by_key(|(offset, _)| *offset);
    found.into_iter().map(|(_, content)| content).collect()
}

/// Raw spans for one annotation, with their byte offsets in `body`.
fn extract_spans(body: &str, setting: &PinnedSetting) -> Vec<(usize, String)> {
    let mut spans = Vec::new();
    let annotation = setting.annotation.as_str();
    let markers = match (&setting.begin_marker, &setting.end_marker) {
        (Some(begin), Some(end)) if !begin.is_empty() && !end.is_empty() => {
            Some((begin.as_str(), end.as_str()))
        }
        _ => None,
    };

    let mut cursor = 0usize;
    while let Some(rel) = body[cursor..].find(annotation) {
        let at = cursor + rel;
        let after = at + annotation.len();
        cursor = after;

        let rest = &body[after..];
        if let Some((begin, end)) = markers {
            if let Some(inner) = rest.strip_prefix(begin) {
                // Delimited block: lazy match, embedded newlines collapse to
                // single spaces.
                if let Some(close) = inner.find(end) {
                    let span = collapse_newlines(&inner[..close]);
                    cursor = after + begin.len() + close + end.len();
                    spans.push((at, span));
                }
                continue;
            }
        }
        let line_end = rest.find('\n').unwrap_or(rest.len());
        let span = rest[..line_end].trim().to_string();
        if !span.is_empty() {
            spans.push((at, span));
        }
        cursor = after + line_end;
    }
    spans
}

fn collapse_newlines(span: &str) -> String {
    span.split('\n')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Splits a raw span into literal and link segments. Candidates are probed
/// left to right; at equal offsets wikilinks beat markdown links beat bare
/// URLs.
struct SpanTokenizer {
    wiki: Regex,
    markdown: Regex,
    url: Regex,
}

impl SpanTokenizer {
    fn new() -> Self {
        Self {
            wiki: Regex::new(r"\[\[([^\[\]]+)\]\]").expect("static pattern"),
            markdown: Regex::new(r"\[([^\]]*)\]\(([^)]+)\)").expect("static pattern"),
            url: Regex::new(r"https?://[^\s<>)\]]+").expect("static pattern"),
        }
    }

    fn tokenize(&self, vault: &dyn Vault, file: &str, span: &str) -> Vec<ContentSegment> {
        let mut segments: Vec<ContentSegment> = Vec::new();
        let mut cursor = 0usize;

        while cursor < span.len() {
            let rest = &span[cursor..];
            let candidates = [
                self.wiki.find(rest).map(|m| (m.start(), Candidate::Wiki)),
                self.markdown
                    .find(rest)
                    .map(|m| (m.start(), Candidate::Markdown)),
                self.url.find(rest).map(|m| (m.start(), Candidate::Url)),
            ];
            // min_by_key on (offset, declaration order) keeps the wiki >
            // markdown > URL priority for ties.
            let Some((start, kind)) = candidates.into_iter().flatten().min_by_key(|(s, _)| *s)
            else {
                push_text(&mut segments, rest);
                break;
            };

            if start > 0 {
                push_text(&mut segments, &rest[..start]);
            }
            let tail = &rest[start..];
            let (consumed, segment) = match kind {
                Candidate::Wiki => {
                    let m = self.wiki.captures(tail).expect("just matched");
                    let whole = m.get(0).expect("whole match");
                    (whole.end(), resolve_wiki(vault, file, &m[1], whole.as_str()))
                }
                Candidate::Markdown => {
                    let m = self.markdown.captures(tail).expect("just matched");
                    let whole = m.get(0).expect("whole match");
                    (
                        whole.end(),
                        resolve_markdown(vault, file, &m[1], &m[2], whole.as_str()),
                    )
                }
                Candidate::Url => {
                    let m = self.url.find(tail).expect("just matched");
                    (
                        m.end(),
                        ContentSegment::Link(LinkInfo::external(m.as_str(), m.as_str())),
                    )
                }
            };
            match segment {
                ContentSegment::Text(text) => push_text(&mut segments, &text),
                link => segments.push(link),
            }
            cursor += start + consumed;
        }
        segments
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Candidate {
    Wiki,
    Markdown,
    Url,
}

fn push_text(segments: &mut Vec<ContentSegment>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(ContentSegment::Text(last)) = segments.last_mut() {
        last.push_str(text);
    } else {
        segments.push(ContentSegment::Text(text.to_string()));
    }
}

fn resolve_wiki(vault: &dyn Vault, file: &str, inner: &str, raw: &str) -> ContentSegment {
    let without_alias = inner.split_once('|').map_or(inner, |(left, _)| left);
    let target = without_alias
        .split_once('#')
        .map_or(without_alias, |(left, _)| left)
        .trim();
    match vault.resolve_link(target, file) {
        Some(resolved) => {
            let display = inner
                .split_once('|')
                .map(|(_, alias)| alias.trim().to_string())
                .unwrap_or_else(|| file_stem(&resolved).to_string());
            ContentSegment::Link(LinkInfo::internal(resolved, display))
        }
        // Broken reference: keep the raw text visible.
        None => ContentSegment::Text(raw.to_string()),
    }
}

fn resolve_markdown(
    vault: &dyn Vault,
    file: &str,
    label: &str,
    target: &str,
    raw: &str,
) -> ContentSegment {
    let target = target.trim().trim_matches(['<', '>']);
    if crate::link::is_external_url(target) {
        let display = if label.trim().is_empty() {
            target.to_string()
        } else {
            label.trim().to_string()
        };
        return ContentSegment::Link(LinkInfo::external(target, display));
    }
    let stripped = target.split_once('#').map_or(target, |(left, _)| left).trim();
    match vault.resolve_link(stripped, file) {
        Some(resolved) => {
            let display = if label.trim().is_empty() {
                file_stem(&resolved).to_string()
            } else {
                label.trim().to_string()
            };
            ContentSegment::Link(LinkInfo::internal(resolved, display))
        }
        None => ContentSegment::Text(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::MemoryVault;

    fn pinned(annotation: &str, prefix: &str) -> PinnedSetting {
        PinnedSetting {
            annotation: annotation.into(),
            prefix: prefix.into(),
            ..PinnedSetting::default()
        }
    }

    fn settings_with(pinned: Vec<PinnedSetting>) -> NavSettings {
        NavSettings {
            pinned,
            ..NavSettings::default()
        }
    }

    #[test]
    fn rest_of_line_with_mixed_segments() {
        let mut vault = MemoryVault::new();
        vault.add_file("Other.md", "");
        vault.add_file(
            "Note.md",
            "intro\n📍 see [[Other]] and https://example.com now\noutro",
        );
        let settings = settings_with(vec![pinned("📍", "📍")]);

        let contents = get_pinned_note_contents(&vault, "Note.md", &settings);
        assert_eq!(contents.len(), 1);
        assert_eq!(
            contents[0].content,
            vec![
                ContentSegment::Text("see ".into()),
                ContentSegment::Link(LinkInfo::internal("Other.md", "Other")),
                ContentSegment::Text(" and ".into()),
                ContentSegment::Link(LinkInfo::external("https://example.com", "https://example.com")),
                ContentSegment::Text(" now".into()),
            ]
        );
    }

    #[test]
    fn delimited_block_collapses_newlines() {
        let mut vault = MemoryVault::new();
        vault.add_file("Note.md", "📍{first line\nsecond line}\ntrailing");
        let mut setting = pinned("📍", "pin");
        setting.begin_marker = Some("{".into());
        setting.end_marker = Some("}".into());
        let settings = settings_with(vec![setting]);

        let contents = get_pinned_note_contents(&vault, "Note.md", &settings);
        assert_eq!(contents.len(), 1);
        assert_eq!(
            contents[0].content,
            vec![ContentSegment::Text("first line second line".into())]
        );
    }

    #[test]
    fn broken_link_degrades_to_text() {
        let mut vault = MemoryVault::new();
        vault.add_file("Note.md", "📍 before [[Missing]] after");
        let settings = settings_with(vec![pinned("📍", "📍")]);

        let contents = get_pinned_note_contents(&vault, "Note.md", &settings);
        assert_eq!(
            contents[0].content,
            vec![ContentSegment::Text("before [[Missing]] after".into())]
        );
    }

    #[test]
    fn items_ordered_by_appearance_across_annotations() {
        let mut vault = MemoryVault::new();
        vault.add_file("Note.md", "⭐ starred first\n📍 pinned second\n⭐ starred third");
        let settings = settings_with(vec![pinned("📍", "pin"), pinned("⭐", "star")]);

        let contents = get_pinned_note_contents(&vault, "Note.md", &settings);
        let prefixes: Vec<&str> = contents.iter().map(|c| c.prefix.as_str()).collect();
        assert_eq!(prefixes, vec!["star", "pin", "star"]);
    }

    #[test]
    fn wiki_beats_markdown_at_same_offset() {
        let mut vault = MemoryVault::new();
        vault.add_file("Other.md", "");
        // "[[Other]](x)" parses as a wikilink followed by literal "(x)".
        vault.add_file("Note.md", "📍 [[Other]](x)");
        let settings = settings_with(vec![pinned("📍", "📍")]);

        let contents = get_pinned_note_contents(&vault, "Note.md", &settings);
        assert_eq!(
            contents[0].content,
            vec![
                ContentSegment::Link(LinkInfo::internal("Other.md", "Other")),
                ContentSegment::Text("(x)".into()),
            ]
        );
    }

    #[test]
    fn rest_of_line_skips_block_marker_lines() {
        let mut vault = MemoryVault::new();
        vault.add_file("Note.md", "📍{block content}\n📍 plain line");
        let mut setting = pinned("📍", "📍");
        setting.begin_marker = Some("{".into());
        setting.end_marker = Some("}".into());
        let settings = settings_with(vec![setting]);

        let contents = get_pinned_note_contents(&vault, "Note.md", &settings);
        assert_eq!(contents.len(), 2);
        assert_eq!(
            contents[0].content,
            vec![ContentSegment::Text("block content".into())]
        );
        assert_eq!(
            contents[1].content,
            vec![ContentSegment::Text("plain line".into())]
        );
    }
}
