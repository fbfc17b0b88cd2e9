//! File-system backed vault.
//!
//! Walks the vault root for markdown files and serves the engine's
//! [`Vault`] oracle from an in-memory snapshot. `refresh` rescans the tree
//! and reports what changed as [`VaultEvent`]s for the incremental caches.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::UNIX_EPOCH;

use anyhow::{Context, Result};
use nav_core::{
    file_stem, parent_folder, parse_frontmatter, FileTimes, PropertyBag, Vault, VaultEvent,
};
use regex::Regex;
use tracing::debug;

struct FileEntry {
    text: String,
    properties: PropertyBag,
    times: FileTimes,
}

#[derive(Default)]
struct VaultState {
    files: BTreeMap<String, FileEntry>,
    folders: BTreeSet<String>,
    /// target path -> source paths, rebuilt on every scan.
    backlinks: HashMap<String, Vec<String>>,
}

pub struct FsVault {
    root: PathBuf,
    state: RwLock<VaultState>,
}

impl FsVault {
    pub fn open(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root)?;
        let vault = Self {
            root,
            state: RwLock::new(VaultState::default()),
        };
        let state = vault.scan()?;
        *vault.state.write().expect("vault lock") = state;
        Ok(vault)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Rescan the tree and diff against the previous snapshot. Content
    /// changes surface as `MetadataChanged`; a move shows up as a
    /// delete/create pair.
    pub fn refresh(&self) -> Result<Vec<VaultEvent>> {
        let new = self.scan()?;
        let mut state = self.state.write().expect("vault lock");
        let mut events = Vec::new();

        for path in state.files.keys() {
            if !new.files.contains_key(path) {
                events.push(VaultEvent::FileDeleted { path: path.clone() });
            }
        }
        for (path, entry) in &new.files {
            match state.files.get(path) {
                None => events.push(VaultEvent::FileCreated { path: path.clone() }),
                Some(old) if old.text != entry.text => {
                    events.push(VaultEvent::MetadataChanged { path: path.clone() });
                }
                Some(_) => {}
            }
        }
        for folder in state.folders.difference(&new.folders) {
            events.push(VaultEvent::FolderDeleted {
                path: folder.clone(),
            });
        }
        for folder in new.folders.difference(&state.folders) {
            events.push(VaultEvent::FolderCreated {
                path: folder.clone(),
            });
        }

        debug!(events = events.len(), "vault refresh");
        *state = new;
        Ok(events)
    }

    fn scan(&self) -> Result<VaultState> {
        let mut state = VaultState::default();
        self.scan_dir(&self.root, "", &mut state)?;
        state.backlinks = build_backlinks(&state);
        Ok(state)
    }

    fn scan_dir(&self, dir: &Path, relative: &str, state: &mut VaultState) -> Result<()> {
        let entries = fs::read_dir(dir)
            .with_context(|| format!("reading vault directory {}", dir.display()))?;
        for entry in entries.flatten() {
            let path = entry.path();
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };
            if name.starts_with('.') {
                continue;
            }
            let rel = if relative.is_empty() {
                name.clone()
            } else {
                format!("{relative}/{name}")
            };
            if path.is_dir() {
                state.folders.insert(rel.clone());
                self.scan_dir(&path, &rel, state)?;
            } else if path.extension().map_or(false, |e| e == "md") {
                let text = fs::read_to_string(&path).unwrap_or_default();
                let properties = parse_frontmatter(&text);
                let times = read_times(&path);
                state.files.insert(
                    rel,
                    FileEntry {
                        text,
                        properties,
                        times,
                    },
                );
            }
        }
        Ok(())
    }
}

fn read_times(path: &Path) -> FileTimes {
    let Ok(metadata) = fs::metadata(path) else {
        return FileTimes::default();
    };
    let millis = |time: std::io::Result<std::time::SystemTime>| {
        time.ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    };
    FileTimes {
        created: millis(metadata.created()),
        modified: millis(metadata.modified()),
    }
}

fn build_backlinks(state: &VaultState) -> HashMap<String, Vec<String>> {
    let wiki = Regex::new(r"\[\[([^\[\]]+)\]\]").expect("static pattern");
    let markdown = Regex::new(r"\[[^\]]*\]\(([^)]+)\)").expect("static pattern");
    let mut map: HashMap<String, BTreeSet<String>> = HashMap::new();

    for (source, entry) in &state.files {
        let mut targets: Vec<String> = Vec::new();
        for captures in wiki.captures_iter(&entry.text) {
            targets.push(link_target(&captures[1]).to_string());
        }
        for captures in markdown.captures_iter(&entry.text) {
            targets.push(link_target(&captures[1]).to_string());
        }
        for target in targets {
            if let Some(resolved) = resolve_in(state, &target, source) {
                if resolved != *source {
                    map.entry(resolved).or_default().insert(source.clone());
                }
            }
        }
    }
    map.into_iter()
        .map(|(target, sources)| (target, sources.into_iter().collect()))
        .collect()
}

fn link_target(raw: &str) -> &str {
    let without_alias = raw.split_once('|').map_or(raw, |(left, _)| left);
    let trimmed = without_alias.trim().trim_matches(['<', '>']);
    trimmed.split_once('#').map_or(trimmed, |(left, _)| left).trim()
}

fn resolve_in(state: &VaultState, link_text: &str, from_path: &str) -> Option<String> {
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
        if state.files.contains_key(candidate) {
            return Some(candidate.clone());
        }
    }
    state
        .files
        .keys()
        .find(|path| file_stem(path) == text)
        .cloned()
}

impl Vault for FsVault {
    fn file_exists(&self, path: &str) -> bool {
        self.state
            .read()
            .expect("vault lock")
            .files
            .contains_key(path)
    }

    fn resolve_link(&self, link_text: &str, from_path: &str) -> Option<String> {
        resolve_in(&self.state.read().expect("vault lock"), link_text, from_path)
    }

    fn all_files(&self) -> Vec<String> {
        self.state
            .read()
            .expect("vault lock")
            .files
            .keys()
            .cloned()
            .collect()
    }

    fn backlinks_of(&self, path: &str) -> Vec<String> {
        self.state
            .read()
            .expect("vault lock")
            .backlinks
            .get(path)
            .cloned()
            .unwrap_or_default()
    }

    fn read_text(&self, path: &str) -> Option<String> {
        self.state
            .read()
            .expect("vault lock")
            .files
            .get(path)
            .map(|entry| entry.text.clone())
    }

    fn frontmatter(&self, path: &str) -> PropertyBag {
        self.state
            .read()
            .expect("vault lock")
            .files
            .get(path)
            .map(|entry| entry.properties.clone())
            .unwrap_or_default()
    }

    fn file_times(&self, path: &str) -> FileTimes {
        self.state
            .read()
            .expect("vault lock")
            .files
            .get(path)
            .map(|entry| entry.times)
            .unwrap_or_default()
    }

    fn all_folders(&self) -> Vec<String> {
        self.state
            .read()
            .expect("vault lock")
            .folders
            .iter()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, rel: &str, text: &str) {
        let path = dir.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    #[test]
    fn scans_markdown_tree_with_relative_paths() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a.md", "");
        write(&dir, "Projects/b.md", "");
        write(&dir, "Projects/notes.txt", "ignored");
        write(&dir, ".hidden/c.md", "ignored");

        let vault = FsVault::open(dir.path().to_path_buf()).unwrap();
        assert_eq!(vault.all_files(), vec!["Projects/b.md", "a.md"]);
        assert_eq!(vault.all_folders(), vec!["Projects"]);
        assert!(vault.file_exists("Projects/b.md"));
    }

    #[test]
    fn resolves_links_and_backlinks() {
        let dir = TempDir::new().unwrap();
        write(&dir, "Target.md", "");
        write(&dir, "Other/Source.md", "see [[Target]] and [x](Target.md)");

        let vault = FsVault::open(dir.path().to_path_buf()).unwrap();
        assert_eq!(
            vault.resolve_link("Target", "Other/Source.md"),
            Some("Target.md".into())
        );
        assert_eq!(vault.backlinks_of("Target.md"), vec!["Other/Source.md"]);
    }

    #[test]
    fn frontmatter_and_times_are_read() {
        let dir = TempDir::new().unwrap();
        write(&dir, "note.md", "---\nup: \"[[x]]\"\n---\nbody");

        let vault = FsVault::open(dir.path().to_path_buf()).unwrap();
        assert!(vault.frontmatter("note.md").contains_key("up"));
        assert!(vault.file_times("note.md").modified > 0);
    }

    #[test]
    fn refresh_reports_create_change_delete() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a.md", "one");
        let vault = FsVault::open(dir.path().to_path_buf()).unwrap();

        write(&dir, "b.md", "");
        write(&dir, "a.md", "two");
        let events = vault.refresh().unwrap();
        assert!(events.contains(&VaultEvent::FileCreated { path: "b.md".into() }));
        assert!(events.contains(&VaultEvent::MetadataChanged { path: "a.md".into() }));

        fs::remove_file(dir.path().join("b.md")).unwrap();
        let events = vault.refresh().unwrap();
        assert_eq!(events, vec![VaultEvent::FileDeleted { path: "b.md".into() }]);
    }

    #[test]
    fn refresh_reports_folder_changes() {
        let dir = TempDir::new().unwrap();
        let vault = FsVault::open(dir.path().to_path_buf()).unwrap();

        write(&dir, "Projects/a.md", "");
        let events = vault.refresh().unwrap();
        assert!(events.contains(&VaultEvent::FolderCreated {
            path: "Projects".into()
        }));
    }
}
