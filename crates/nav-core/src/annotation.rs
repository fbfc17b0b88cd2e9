//! Annotation-prefixed link scanner.
//!
//! For each configured annotation two regexes are built, one matching
//! `annotation + optional space + wikilink` and one the markdown-link form.
//! Backlink-mode annotations scan every file linking to the current note and
//! report the backlinking files whose annotated link resolves to it;
//! current-note annotations scan the note's own text. Results stream out in
//! per-file batches over an mpsc channel so large vaults render
//! progressively, and the whole scan aborts with [`NavError::Cancelled`] as
//! soon as the caller's token fires.

use std::collections::HashMap;

use regex::Regex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use crate::error::{NavError, NavResult};
use crate::link::{escape_regex, file_stem, LinkInfo, PrefixedLink};
use crate::settings::{AnnotationMode, AnnotationSetting, NavSettings};
use crate::vault::{split_frontmatter, Vault};

/// Placeholder in a literal annotation that matches any single emoji.
pub const EMOJI_PLACEHOLDER: &str = "{emoji}";

/// Character class for a single emoji, optionally followed by a variation
/// selector.
const EMOJI_CLASS: &str = "[\\p{Emoji_Presentation}\\p{Extended_Pictographic}]\\u{FE0F}?";

#[derive(Debug)]
struct CompiledAnnotation {
    prefix: String,
    mode: AnnotationMode,
    wiki: Regex,
    markdown: Regex,
    strip_variation_selectors: bool,
}

fn compile_annotation(setting: &AnnotationSetting) -> Option<CompiledAnnotation> {
    if setting.pattern.is_empty() {
        return None;
    }
    let base = if setting.is_regex {
        setting.pattern.clone()
    } else {
        let mut literal = setting.pattern.clone();
        if setting.strip_variation_selectors {
            literal.retain(|c| c != '\u{FE0E}' && c != '\u{FE0F}');
        }
        literal
            .split(EMOJI_PLACEHOLDER)
            .map(escape_regex)
            .collect::<Vec<_>>()
            .join(EMOJI_CLASS)
    };
    let space = if setting.allow_space { "[ \\t]*" } else { "" };
    let wiki = format!("(?:{base}){space}\\[\\[([^\\[\\]]+)\\]\\]");
    let markdown = format!("(?:{base}){space}\\[([^\\]]*)\\]\\(([^)]+)\\)");
    let compile = |pattern: &str| match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(err) => {
            warn!(pattern, %err, "annotation regex failed to compile, skipping");
            None
        }
    };
    Some(CompiledAnnotation {
        prefix: setting.prefix.clone(),
        mode: setting.mode,
        wiki: compile(&wiki)?,
        markdown: compile(&markdown)?,
        strip_variation_selectors: setting.strip_variation_selectors,
    })
}

/// Remove frontmatter, fenced code blocks, and inline code spans, none of
/// which count as annotation material.
pub fn sanitize_scan_text(text: &str) -> String {
    let (_, body) = split_frontmatter(text);
    let mut out = String::with_capacity(body.len());
    let mut in_fence = false;
    for line in body.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            out.push('\n');
            continue;
        }
        if in_fence {
            out.push('\n');
            continue;
        }
        out.push_str(&strip_inline_code(line));
        out.push('\n');
    }
    out
}

fn strip_inline_code(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;
    while let Some(open) = rest.find('`') {
        match rest[open + 1..].find('`') {
            Some(close_rel) => {
                out.push_str(&rest[..open]);
                rest = &rest[open + 1 + close_rel + 1..];
            }
            None => break,
        }
    }
    out.push_str(rest);
    out
}

/// Scans backlinking files (and the current note) for annotation-prefixed
/// links. Owns a per-session content cache so unchanged backlinks are read
/// at most once across scans; the cache is cleared whenever annotation
/// configuration changes.
#[derive(Debug, Default)]
pub struct AnnotationScanner {
    content_cache: HashMap<String, String>,
}

impl AnnotationScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop cached file contents. Matching rules depend on the configured
    /// annotation strings, so settings changes invalidate everything.
    pub fn clear_cache(&mut self) {
        self.content_cache.clear();
    }

    /// Drop one file's cached content after it changed on disk.
    pub fn invalidate(&mut self, path: &str) {
        self.content_cache.remove(path);
    }

    /// Stream annotated links for `file` in per-source batches.
    ///
    /// Checks `cancel` before each file and at every send; a fired token
    /// surfaces as [`NavError::Cancelled`], a dropped receiver as
    /// [`NavError::ConsumerGone`]. Both mean "stop promptly", only the
    /// latter is unexpected.
    pub async fn search_annotated_links(
        &mut self,
        vault: &(dyn Vault + Send + Sync),
        settings: &NavSettings,
        file: &str,
        tx: &mpsc::Sender<Vec<PrefixedLink>>,
        cancel: &CancellationToken,
    ) -> NavResult<()> {
        let compiled: Vec<CompiledAnnotation> = settings
            .annotations
            .iter()
            .filter_map(compile_annotation)
            .collect();
        if compiled.is_empty() {
            return Ok(());
        }

        let current: Vec<&CompiledAnnotation> = compiled
            .iter()
            .filter(|a| a.mode == AnnotationMode::CurrentNote)
            .collect();
        let backlink: Vec<&CompiledAnnotation> = compiled
            .iter()
            .filter(|a| a.mode == AnnotationMode::Backlink)
            .collect();

        if !current.is_empty() {
            if let Some(text) = self.cached_text(vault, file) {
                let links = scan_current_note(vault, file, &text, &current);
                if !links.is_empty() {
                    send_batch(tx, cancel, links).await?;
                }
            }
        }

        if backlink.is_empty() {
            return Ok(());
        }
        for source in vault.backlinks_of(file) {
            if cancel.is_cancelled() {
                return Err(NavError::Cancelled);
            }
            let Some(text) = self.cached_text(vault, &source) else {
                // Source vanished mid-scan: no result for this item, carry on.
                continue;
            };
            let links = scan_backlink_source(vault, file, &source, &text, &backlink);
            trace!(source, hits = links.len(), "annotation scan");
            if !links.is_empty() {
                send_batch(tx, cancel, links).await?;
            }
        }
        Ok(())
    }

    fn cached_text(&mut self, vault: &dyn Vault, path: &str) -> Option<String> {
        if let Some(text) = self.content_cache.get(path) {
            return Some(text.clone());
        }
        let text = sanitize_scan_text(&vault.read_text(path)?);
        self.content_cache.insert(path.to_string(), text.clone());
        Some(text)
    }
}

async fn send_batch(
    tx: &mpsc::Sender<Vec<PrefixedLink>>,
    cancel: &CancellationToken,
    links: Vec<PrefixedLink>,
) -> NavResult<()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(NavError::Cancelled),
        sent = tx.send(links) => sent.map_err(|_| NavError::ConsumerGone),
    }
}

/// Matches in a backlinking file whose target resolves to `file` produce one
/// link per (annotation, source) back to the source file.
fn scan_backlink_source(
    vault: &dyn Vault,
    file: &str,
    source: &str,
    text: &str,
    annotations: &[&CompiledAnnotation],
) -> Vec<PrefixedLink> {
    let mut links = Vec::new();
    for annotation in annotations {
        let text = annotation.matchable_text(text);
        let mut hit = false;
        for captures in annotation.wiki.captures_iter(&text) {
            let target = wiki_target(&captures[1]);
            if vault.resolve_link(target, source).as_deref() == Some(file) {
                hit = true;
                break;
            }
        }
        if !hit {
            for captures in annotation.markdown.captures_iter(&text) {
                let target = markdown_target(&captures[2]);
                if vault.resolve_link(target, source).as_deref() == Some(file) {
                    hit = true;
                    break;
                }
            }
        }
        if hit {
            links.push(PrefixedLink::new(
                annotation.prefix.clone(),
                LinkInfo::internal(source, file_stem(source)),
            ));
        }
    }
    links
}

/// Current-note annotations report the links themselves, in text order.
fn scan_current_note(
    vault: &dyn Vault,
    file: &str,
    text: &str,
    annotations: &[&CompiledAnnotation],
) -> Vec<PrefixedLink> {
    let mut links = Vec::new();
    for annotation in annotations {
        let text = annotation.matchable_text(text);
        for captures in annotation.wiki.captures_iter(&text) {
            let raw = &captures[1];
            let target = wiki_target(raw);
            let display = raw
                .split_once('|')
                .map(|(_, alias)| alias.trim().to_string());
            if let Some(resolved) = vault.resolve_link(target, file) {
                let display = display.unwrap_or_else(|| file_stem(&resolved).to_string());
                links.push(PrefixedLink::new(
                    annotation.prefix.clone(),
                    LinkInfo::internal(resolved, display),
                ));
            }
        }
        for captures in annotation.markdown.captures_iter(&text) {
            let label = captures[1].trim().to_string();
            let raw_target = captures[2].trim();
            if crate::link::is_external_url(raw_target) {
                let display = if label.is_empty() {
                    raw_target.to_string()
                } else {
                    label
                };
                links.push(PrefixedLink::new(
                    annotation.prefix.clone(),
                    LinkInfo::external(raw_target, display),
                ));
            } else if let Some(resolved) = vault.resolve_link(markdown_target(raw_target), file) {
                let display = if label.is_empty() {
                    file_stem(&resolved).to_string()
                } else {
                    label
                };
                links.push(PrefixedLink::new(
                    annotation.prefix.clone(),
                    LinkInfo::internal(resolved, display),
                ));
            }
        }
    }
    links
}

impl CompiledAnnotation {
    fn matchable_text<'a>(&self, text: &'a str) -> std::borrow::Cow<'a, str> {
        if self.strip_variation_selectors {
            std::borrow::Cow::Owned(
                text.chars()
                    .filter(|c| *c != '\u{FE0E}' && *c != '\u{FE0F}')
                    .collect(),
            )
        } else {
            std::borrow::Cow::Borrowed(text)
        }
    }
}

fn wiki_target(raw: &str) -> &str {
    let without_alias = raw.split_once('|').map_or(raw, |(left, _)| left);
    without_alias
        .split_once('#')
        .map_or(without_alias, |(left, _)| left)
        .trim()
}

fn markdown_target(raw: &str) -> &str {
    let trimmed = raw.trim().trim_matches(['<', '>']);
    trimmed.split_once('#').map_or(trimmed, |(left, _)| left).trim()
}
