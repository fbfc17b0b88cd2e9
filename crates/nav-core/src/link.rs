//! Link-text and path utilities.
//!
//! Pure functions shared by every resolver: wikilink and markdown-link
//! parsing, bare-URL detection, folder containment tests, regex escaping, and
//! the numeric-aware string ordering used by all engine sorts.

use serde::{Deserialize, Serialize};

/// A resolved or external link ready for display.
///
/// `destination` is a vault-relative file path when internal, or a URL when
/// `is_external` is set. External destinations are never existence-checked,
/// so `is_resolved` only carries meaning for internal links.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkInfo {
    pub destination: String,
    pub is_external: bool,
    pub is_resolved: bool,
    pub display_text: String,
}

impl LinkInfo {
    pub fn internal(destination: impl Into<String>, display_text: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            is_external: false,
            is_resolved: true,
            display_text: display_text.into(),
        }
    }

    pub fn unresolved(destination: impl Into<String>, display_text: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            is_external: false,
            is_resolved: false,
            display_text: display_text.into(),
        }
    }

    pub fn external(url: impl Into<String>, display_text: impl Into<String>) -> Self {
        let url = url.into();
        let display_text = display_text.into();
        Self {
            destination: url,
            is_external: true,
            is_resolved: false,
            display_text,
        }
    }
}

/// A link carrying its display-order sort key and visual marker.
///
/// The prefix is commonly an emoji; the empty string is a valid prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixedLink {
    pub prefix: String,
    pub link: LinkInfo,
}

impl PrefixedLink {
    pub fn new(prefix: impl Into<String>, link: LinkInfo) -> Self {
        Self {
            prefix: prefix.into(),
            link,
        }
    }
}

/// Result of parsing a wikilink or markdown link out of raw text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLink {
    /// Link target with any `#heading` suffix stripped.
    pub path: String,
    /// Explicit display text (wikilink alias or markdown label), if present.
    pub display: Option<String>,
}

/// Parse `[[path|display]]` / `[[path#heading]]` forms.
///
/// Returns `None` for anything that is not a complete, non-empty wikilink.
pub fn parse_wiki_link(text: &str) -> Option<ParsedLink> {
    let inner = text.trim().strip_prefix("[[")?.strip_suffix("]]")?;
    if inner.contains("[[") || inner.contains("]]") {
        return None;
    }
    let (target, display) = match inner.split_once('|') {
        Some((left, right)) => (left, Some(right.trim().to_string())),
        None => (inner, None),
    };
    let path = target
        .split_once('#')
        .map_or(target, |(left, _)| left)
        .trim();
    if path.is_empty() {
        return None;
    }
    Some(ParsedLink {
        path: path.to_string(),
        display: display.filter(|d| !d.is_empty()),
    })
}

/// Parse `[label](target)` forms. Angle brackets around the target are
/// stripped; a `#heading` suffix is removed from internal targets.
pub fn parse_markdown_link(text: &str) -> Option<ParsedLink> {
    let trimmed = text.trim();
    let rest = trimmed.strip_prefix('[')?;
    let close = rest.find(']')?;
    let label = &rest[..close];
    let after = &rest[close + 1..];
    let target_raw = after.strip_prefix('(')?.strip_suffix(')')?;
    let target = target_raw.trim().trim_matches(['<', '>']).trim();
    if target.is_empty() {
        return None;
    }
    let path = if is_external_url(target) {
        target.to_string()
    } else {
        let stripped = target.split_once('#').map_or(target, |(left, _)| left).trim();
        if stripped.is_empty() {
            return None;
        }
        stripped.to_string()
    };
    let display = label.trim();
    Some(ParsedLink {
        path,
        display: (!display.is_empty()).then(|| display.to_string()),
    })
}

/// True for `http://` and `https://` targets.
pub fn is_external_url(text: &str) -> bool {
    text.starts_with("http://") || text.starts_with("https://")
}

/// Escape a literal string for embedding in a regular expression.
pub fn escape_regex(text: &str) -> String {
    regex::escape(text)
}

/// Final path segment without the `.md` extension.
pub fn file_stem(path: &str) -> &str {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.strip_suffix(".md").unwrap_or(name)
}

/// Parent folder of a vault-relative path; the empty string is the vault root.
pub fn parent_folder(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(dir, _)| dir)
}

/// Whether `path` lives inside `folder`. With `recursive` unset, only direct
/// children count. Containment is by whole path segments, never substrings;
/// the empty folder is the vault root and contains everything.
pub fn folder_contains(folder: &str, path: &str, recursive: bool) -> bool {
    let rest = if folder.is_empty() {
        path
    } else {
        match path.strip_prefix(folder) {
            Some(rest) => match rest.strip_prefix('/') {
                Some(rest) => rest,
                None => return false,
            },
            None => return false,
        }
    };
    if rest.is_empty() {
        return false;
    }
    recursive || !rest.contains('/')
}

/// Numeric-aware lexical ordering: digit runs compare as numbers, everything
/// else byte-wise. `"note2" < "note10"`, ties broken by shorter-first.
pub fn numeric_compare(a: &str, b: &str) -> std::cmp::Ordering {
    use std::cmp::Ordering;

    let mut ai = a.char_indices().peekable();
    let mut bi = b.char_indices().peekable();

    loop {
        match (ai.peek().copied(), bi.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some((apos, ac)), Some((bpos, bc))) => {
                if ac.is_ascii_digit() && bc.is_ascii_digit() {
                    let a_run = digit_run(a, apos);
                    let b_run = digit_run(b, bpos);
                    let a_num = a_run.trim_start_matches('0');
                    let b_num = b_run.trim_start_matches('0');
                    let ord = a_num
                        .len()
                        .cmp(&b_num.len())
                        .then_with(|| a_num.cmp(b_num))
                        .then_with(|| a_run.len().cmp(&b_run.len()));
                    if ord != Ordering::Equal {
                        return ord;
                    }
                    for _ in 0..a_run.len() {
                        ai.next();
                    }
                    for _ in 0..b_run.len() {
                        bi.next();
                    }
                } else {
                    match ac.cmp(&bc) {
                        Ordering::Equal => {
                            ai.next();
                            bi.next();
                        }
                        ord => return ord,
                    }
                }
            }
        }
    }
}

fn digit_run(s: &str, start: usize) -> &str {
    let end = s[start..]
        .find(|c: char| !c.is_ascii_digit())
        .map_or(s.len(), |off| start + off);
    &s[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Ordering;

    #[test]
    fn parse_wiki_link_with_alias() {
        let parsed = parse_wiki_link("[[file|display]]").unwrap();
        assert_eq!(parsed.path, "file");
        assert_eq!(parsed.display.as_deref(), Some("display"));
    }

    #[test]
    fn parse_wiki_link_strips_heading() {
        let parsed = parse_wiki_link("[[file#header]]").unwrap();
        assert_eq!(parsed.path, "file");
        assert_eq!(parsed.display, None);
    }

    #[test]
    fn parse_wiki_link_rejects_malformed() {
        assert_eq!(parse_wiki_link("[[file"), None);
        assert_eq!(parse_wiki_link("[file]"), None);
        assert_eq!(parse_wiki_link("[[]]"), None);
        assert_eq!(parse_wiki_link("[[#heading]]"), None);
    }

    #[test]
    fn parse_markdown_link_internal_and_external() {
        let parsed = parse_markdown_link("[notes](Projects/Alpha.md#goals)").unwrap();
        assert_eq!(parsed.path, "Projects/Alpha.md");
        assert_eq!(parsed.display.as_deref(), Some("notes"));

        let parsed = parse_markdown_link("[spec](https://example.com/spec#top)").unwrap();
        assert_eq!(parsed.path, "https://example.com/spec#top");

        assert_eq!(parse_markdown_link("[label]"), None);
        assert_eq!(parse_markdown_link("(target)"), None);
    }

    #[test]
    fn folder_containment_is_segment_wise() {
        assert!(folder_contains("Projects", "Projects/Alpha.md", false));
        assert!(!folder_contains("Projects", "Projects/Sub/Deep.md", false));
        assert!(folder_contains("Projects", "Projects/Sub/Deep.md", true));
        assert!(!folder_contains("Proj", "Projects/Alpha.md", true));
        assert!(folder_contains("", "TopLevel.md", false));
        assert!(!folder_contains("", "Sub/Note.md", false));
        assert!(folder_contains("", "Sub/Note.md", true));
    }

    #[test]
    fn file_stem_drops_folders_and_extension() {
        assert_eq!(file_stem("Projects/Alpha.md"), "Alpha");
        assert_eq!(file_stem("Alpha.md"), "Alpha");
        assert_eq!(file_stem("Projects/readme"), "readme");
        assert_eq!(parent_folder("Projects/Alpha.md"), "Projects");
        assert_eq!(parent_folder("Alpha.md"), "");
    }

    #[test]
    fn numeric_compare_orders_digit_runs_numerically() {
        assert_eq!(numeric_compare("note2", "note10"), Ordering::Less);
        assert_eq!(numeric_compare("note10", "note10"), Ordering::Equal);
        assert_eq!(numeric_compare("a2b", "a2a"), Ordering::Greater);
        assert_eq!(numeric_compare("02", "2"), Ordering::Greater);
        assert_eq!(numeric_compare("alpha", "beta"), Ordering::Less);
    }
}
