//! Vault oracle boundary.
//!
//! The engine never touches storage directly: hosts implement [`Vault`] over
//! whatever backs their notes (the bundled app walks a folder of markdown
//! files) and the resolvers consume it as a trusted oracle for file
//! existence, link resolution, backlinks, raw text, and frontmatter.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::link::{file_stem, folder_contains, parent_folder};

/// A single frontmatter property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<PropertyValue>),
}

impl PropertyValue {
    /// Flatten to the string values this property contributes: string
    /// scalars as-is, numbers and booleans stringified, lists one level
    /// deep. Nulls contribute nothing.
    pub fn strings(&self) -> Vec<String> {
        match self {
            PropertyValue::Null => Vec::new(),
            PropertyValue::Bool(b) => vec![b.to_string()],
            PropertyValue::Number(n) => vec![format_number(*n)],
            PropertyValue::String(s) => vec![s.clone()],
            PropertyValue::List(items) => items
                .iter()
                .flat_map(|item| match item {
                    PropertyValue::List(_) => Vec::new(),
                    other => other.strings(),
                })
                .collect(),
        }
    }

    /// Scalar sort key for property-based folder sorting.
    pub fn sort_key(&self) -> Option<String> {
        match self {
            PropertyValue::Null | PropertyValue::List(_) => None,
            other => other.strings().into_iter().next(),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

impl From<serde_yaml::Value> for PropertyValue {
    fn from(value: serde_yaml::Value) -> Self {
        match value {
            serde_yaml::Value::Null => PropertyValue::Null,
            serde_yaml::Value::Bool(b) => PropertyValue::Bool(b),
            serde_yaml::Value::Number(n) => PropertyValue::Number(n.as_f64().unwrap_or(0.0)),
            serde_yaml::Value::String(s) => PropertyValue::String(s),
            serde_yaml::Value::Sequence(seq) => {
                PropertyValue::List(seq.into_iter().map(PropertyValue::from).collect())
            }
            // Nested mappings and tagged values are not link material.
            _ => PropertyValue::Null,
        }
    }
}

/// Per-file structured property bag keyed by property name.
pub type PropertyBag = BTreeMap<String, PropertyValue>;

/// Creation and modification timestamps in milliseconds since the epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileTimes {
    pub created: i64,
    pub modified: i64,
}

/// Change events the incremental caches consume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VaultEvent {
    FileCreated { path: String },
    FileDeleted { path: String },
    FileRenamed { path: String, old_path: String },
    MetadataChanged { path: String },
    FolderCreated { path: String },
    FolderDeleted { path: String },
    FolderRenamed { path: String, old_path: String },
}

/// Read-only oracle over the host's file graph and metadata index.
///
/// All paths are vault-relative with `/` separators and no leading slash.
pub trait Vault {
    fn file_exists(&self, path: &str) -> bool;

    /// Resolve raw link text (as written inside `[[...]]` or a markdown
    /// target) to a canonical vault path, relative to the linking file.
    fn resolve_link(&self, link_text: &str, from_path: &str) -> Option<String>;

    /// Every markdown file in the vault.
    fn all_files(&self) -> Vec<String>;

    /// Files whose resolved links include `path`.
    fn backlinks_of(&self, path: &str) -> Vec<String>;

    /// Raw text of a file, `None` if it no longer exists.
    fn read_text(&self, path: &str) -> Option<String>;

    /// Parsed frontmatter property bag; empty when absent or malformed.
    fn frontmatter(&self, path: &str) -> PropertyBag;

    fn file_times(&self, path: &str) -> FileTimes;

    /// Files directly or transitively under a folder.
    fn files_under(&self, folder: &str, recursive: bool) -> Vec<String> {
        self.all_files()
            .into_iter()
            .filter(|path| folder_contains(folder, path, recursive))
            .collect()
    }

    /// Every folder path that currently holds at least one file.
    fn all_folders(&self) -> Vec<String> {
        let mut folders: Vec<String> = Vec::new();
        for file in self.all_files() {
            let mut dir = parent_folder(&file);
            while !dir.is_empty() {
                if !folders.iter().any(|f| f == dir) {
                    folders.push(dir.to_string());
                }
                dir = parent_folder(dir);
            }
        }
        folders.sort();
        folders
    }
}

/// Split raw note text into its YAML frontmatter block and body.
pub fn split_frontmatter(text: &str) -> (Option<&str>, &str) {
    let Some(rest) = text.strip_prefix("---\n").or_else(|| text.strip_prefix("---\r\n")) else {
        return (None, text);
    };
    for marker in ["\n---\n", "\n---\r\n"] {
        if let Some(end) = rest.find(marker) {
            return (Some(&rest[..end]), &rest[end + marker.len()..]);
        }
    }
    if let Some(stripped) = rest.strip_suffix("\n---").or_else(|| rest.strip_suffix("\n---\n")) {
        return (Some(stripped), "");
    }
    (None, text)
}

/// Parse the frontmatter block of `text` into a property bag. Malformed YAML
/// yields an empty bag rather than an error.
pub fn parse_frontmatter(text: &str) -> PropertyBag {
    let (Some(block), _) = split_frontmatter(text) else {
        return PropertyBag::new();
    };
    match serde_yaml::from_str::<serde_yaml::Value>(block) {
        Ok(serde_yaml::Value::Mapping(map)) => map
            .into_iter()
            .filter_map(|(key, value)| {
                key.as_str()
                    .map(|k| (k.to_string(), PropertyValue::from(value)))
            })
            .collect(),
        _ => PropertyBag::new(),
    }
}

/// In-memory vault backed by plain maps.
///
/// Used as the test double for every resolver and as a reference for host
/// implementations; backlinks are recomputed from wikilinks on demand.
#[derive(Debug, Default)]
pub struct MemoryVault {
    files: BTreeMap<String, MemoryFile>,
}

#[derive(Debug, Default)]
struct MemoryFile {
    text: String,
    properties: PropertyBag,
    times: FileTimes,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, path: &str, text: &str) {
        self.files.insert(
            path.to_string(),
            MemoryFile {
                text: text.to_string(),
                properties: parse_frontmatter(text),
                times: FileTimes::default(),
            },
        );
    }

    pub fn add_file_with_times(&mut self, path: &str, text: &str, times: FileTimes) {
        self.add_file(path, text);
        if let Some(file) = self.files.get_mut(path) {
            file.times = times;
        }
    }

    pub fn remove_file(&mut self, path: &str) {
        self.files.remove(path);
    }

    pub fn set_text(&mut self, path: &str, text: &str) {
        let entry = self.files.entry(path.to_string()).or_default();
        entry.text = text.to_string();
        entry.properties = parse_frontmatter(text);
    }
}

impl Vault for MemoryVault {
    fn file_exists(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    fn resolve_link(&self, link_text: &str, from_path: &str) -> Option<String> {
        let text = link_text.trim();
        if text.is_empty() {
            return None;
        }
        let mut candidates = vec![text.to_string(), format!("{text}.md")];
        let dir = parent_folder(from_path);
        if !dir.is_empty() {
            candidates.push(format!("{dir}/{text}"));
            candidates.push(format!("{dir}/{text}.md"));
        }
        for candidate in &candidates {
            if self.files.contains_key(candidate) {
                return Some(candidate.clone());
            }
        }
        // Shortest-path style fallback: unique stem match anywhere.
        let matches: Vec<&String> = self
            .files
            .keys()
            .filter(|path| file_stem(path) == text)
            .collect();
        matches.first().map(|path| (*path).clone())
    }

    fn all_files(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }

    fn backlinks_of(&self, path: &str) -> Vec<String> {
        let mut sources = Vec::new();
        for (source, file) in &self.files {
            if source == path {
                continue;
            }
            let has_link = extract_wiki_targets(&file.text)
                .iter()
                .any(|target| self.resolve_link(target, source).as_deref() == Some(path));
            if has_link {
                sources.push(source.clone());
            }
        }
        sources
    }

    fn read_text(&self, path: &str) -> Option<String> {
        self.files.get(path).map(|file| file.text.clone())
    }

    fn frontmatter(&self, path: &str) -> PropertyBag {
        self.files
            .get(path)
            .map(|file| file.properties.clone())
            .unwrap_or_default()
    }

    fn file_times(&self, path: &str) -> FileTimes {
        self.files.get(path).map(|file| file.times).unwrap_or_default()
    }
}

/// Wikilink targets appearing in `text`, aliases and headings stripped.
pub fn extract_wiki_targets(text: &str) -> Vec<String> {
    let mut targets = Vec::new();
    let mut cursor = 0usize;
    while let Some(open_rel) = text[cursor..].find("[[") {
        let start = cursor + open_rel + 2;
        let Some(close_rel) = text[start..].find("]]") else {
            break;
        };
        let end = start + close_rel;
        cursor = end + 2;

        let raw = &text[start..end];
        let without_alias = raw.split_once('|').map_or(raw, |(left, _)| left);
        let target = without_alias
            .split_once('#')
            .map_or(without_alias, |(left, _)| left)
            .trim();
        if !target.is_empty() {
            targets.push(target.to_string());
        }
    }
    targets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frontmatter_parses_scalars_and_lists() {
        let text = "---\nup: \"[[Index]]\"\nrank: 3\ntags:\n  - a\n  - b\n---\nbody";
        let bag = parse_frontmatter(text);
        assert_eq!(
            bag.get("up"),
            Some(&PropertyValue::String("[[Index]]".into()))
        );
        assert_eq!(bag.get("rank"), Some(&PropertyValue::Number(3.0)));
        assert_eq!(
            bag.get("tags").map(|v| v.strings()),
            Some(vec!["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn frontmatter_malformed_yaml_is_empty() {
        assert!(parse_frontmatter("---\n: [bad\n---\nbody").is_empty());
        assert!(parse_frontmatter("no frontmatter").is_empty());
    }

    #[test]
    fn split_frontmatter_returns_body() {
        let (block, body) = split_frontmatter("---\nkey: 1\n---\nrest");
        assert_eq!(block, Some("key: 1"));
        assert_eq!(body, "rest");

        let (block, body) = split_frontmatter("plain");
        assert_eq!(block, None);
        assert_eq!(body, "plain");
    }

    #[test]
    fn memory_vault_resolves_links_and_backlinks() {
        let mut vault = MemoryVault::new();
        vault.add_file("Projects/Alpha.md", "# Alpha");
        vault.add_file("Daily/2024-01-01.md", "saw [[Alpha]] today");
        vault.add_file("Other.md", "nothing here");

        assert_eq!(
            vault.resolve_link("Alpha", "Daily/2024-01-01.md").as_deref(),
            Some("Projects/Alpha.md")
        );
        assert_eq!(
            vault.backlinks_of("Projects/Alpha.md"),
            vec!["Daily/2024-01-01.md".to_string()]
        );
        assert!(vault.resolve_link("Missing", "Other.md").is_none());
    }

    #[test]
    fn files_under_honors_recursive_flag() {
        let mut vault = MemoryVault::new();
        vault.add_file("Projects/Alpha.md", "");
        vault.add_file("Projects/Sub/Deep.md", "");
        vault.add_file("Top.md", "");

        assert_eq!(
            vault.files_under("Projects", false),
            vec!["Projects/Alpha.md".to_string()]
        );
        assert_eq!(vault.files_under("Projects", true).len(), 2);
        assert_eq!(vault.all_folders(), vec!["Projects", "Projects/Sub"]);
    }
}
