//! Folder-adjacency index.
//!
//! Each configured folder group resolves its glob patterns against the live
//! folder tree into concrete [`FolderEntry`] instances; every entry keeps its
//! own sorted member list and answers previous/next by array position.
//! Membership is by exact path equality, and the list is re-sorted after
//! every insertion.

use std::cmp::Ordering;

use globset::{Glob, GlobSet, GlobSetBuilder};
use regex::Regex;
use tracing::{debug, warn};

use crate::link::{file_stem, folder_contains, numeric_compare};
use crate::settings::{FilterPattern, FilterTarget, FolderGroup, NavSettings, SortKey, SortSpec};
use crate::vault::Vault;

/// Adjacency answer for one folder-group entry containing the queried file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderAdjacent {
    pub group_index: usize,
    /// Up to `max_links` members before the file, farthest first so that
    /// left-to-right rendering reads in list order.
    pub previous: Vec<String>,
    /// Up to `max_links` members after the file, nearest first.
    pub next: Vec<String>,
    /// The group's configured parent, when it resolves to an existing file.
    pub parent: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
enum SortValue {
    Text(String),
    Number(i64),
    Missing,
}

#[derive(Debug, Clone)]
struct MemberRow {
    path: String,
    file_name: String,
    sort_value: SortValue,
}

/// Sorted member list for one physical folder matched by a group pattern.
#[derive(Debug)]
struct FolderEntry {
    folder: String,
    members: Vec<MemberRow>,
}

impl FolderEntry {
    fn build(vault: &dyn Vault, group: &FolderGroup, folder: &str) -> Self {
        let include = compile_filter(group.include_filter.as_ref());
        let exclude = compile_filter(group.exclude_filter.as_ref());
        let mut members: Vec<MemberRow> = vault
            .files_under(folder, group.recursive)
            .into_iter()
            .filter(|path| passes_filters(vault, &include, &exclude, path))
            .map(|path| member_row(vault, &group.sort, path))
            .collect();
        sort_members(&mut members, &group.sort);
        debug!(folder, members = members.len(), "folder entry built");
        Self {
            folder: folder.to_string(),
            members,
        }
    }

    fn claims(&self, group: &FolderGroup, path: &str) -> bool {
        folder_contains(&self.folder, path, group.recursive)
    }

    fn position(&self, path: &str) -> Option<usize> {
        self.members.iter().position(|row| row.path == path)
    }

    fn remove(&mut self, path: &str) {
        self.members.retain(|row| row.path != path);
    }

    fn insert(&mut self, vault: &dyn Vault, group: &FolderGroup, path: &str) {
        let include = compile_filter(group.include_filter.as_ref());
        let exclude = compile_filter(group.exclude_filter.as_ref());
        if !passes_filters(vault, &include, &exclude, path) {
            return;
        }
        self.remove(path);
        self.members.push(member_row(vault, &group.sort, path.to_string()));
        sort_members(&mut self.members, &group.sort);
    }
}

fn member_row(vault: &dyn Vault, sort: &SortSpec, path: String) -> MemberRow {
    let file_name = file_stem(&path).to_string();
    let sort_value = match &sort.key {
        SortKey::FileName => SortValue::Text(file_name.clone()),
        SortKey::Created => SortValue::Number(vault.file_times(&path).created),
        SortKey::Modified => SortValue::Number(vault.file_times(&path).modified),
        SortKey::Property(name) => vault
            .frontmatter(&path)
            .get(name)
            .and_then(|value| value.sort_key())
            .map_or(SortValue::Missing, SortValue::Text),
    };
    MemberRow {
        path,
        file_name,
        sort_value,
    }
}

fn sort_members(members: &mut [MemberRow], sort: &SortSpec) {
    members.sort_by(|a, b| {
        let primary = compare_sort_values(&a.sort_value, &b.sort_value);
        let primary = if sort.descending {
            primary.reverse()
        } else {
            primary
        };
        primary
            .then_with(|| numeric_compare(&a.file_name, &b.file_name))
            .then_with(|| a.path.cmp(&b.path))
    });
}

fn compare_sort_values(a: &SortValue, b: &SortValue) -> Ordering {
    match (a, b) {
        (SortValue::Number(x), SortValue::Number(y)) => x.cmp(y),
        (SortValue::Text(x), SortValue::Text(y)) => numeric_compare(x, y),
        (SortValue::Missing, SortValue::Missing) => Ordering::Equal,
        // Files without a sort value sink to the end.
        (SortValue::Missing, _) => Ordering::Greater,
        (_, SortValue::Missing) => Ordering::Less,
        (SortValue::Number(_), SortValue::Text(_)) => Ordering::Less,
        (SortValue::Text(_), SortValue::Number(_)) => Ordering::Greater,
    }
}

fn compile_filter(filter: Option<&FilterPattern>) -> Option<(FilterTarget, Option<Regex>)> {
    filter.map(|f| {
        let regex = Regex::new(&f.pattern);
        if regex.is_err() {
            warn!(pattern = %f.pattern, "filter regex failed to compile, treating as no match");
        }
        (f.target.clone(), regex.ok())
    })
}

fn passes_filters(
    vault: &dyn Vault,
    include: &Option<(FilterTarget, Option<Regex>)>,
    exclude: &Option<(FilterTarget, Option<Regex>)>,
    path: &str,
) -> bool {
    if let Some((target, regex)) = include {
        // A broken include pattern matches nothing.
        let matched = regex
            .as_ref()
            .is_some_and(|re| filter_matches(vault, target, re, path));
        if !matched {
            return false;
        }
    }
    if let Some((target, regex)) = exclude {
        let matched = regex
            .as_ref()
            .is_some_and(|re| filter_matches(vault, target, re, path));
        if matched {
            return false;
        }
    }
    true
}

fn filter_matches(vault: &dyn Vault, target: &FilterTarget, regex: &Regex, path: &str) -> bool {
    match target {
        FilterTarget::FileName => regex.is_match(file_stem(path)),
        FilterTarget::Property(name) => vault
            .frontmatter(path)
            .get(name)
            .map(|value| value.strings())
            .is_some_and(|values| values.iter().any(|v| regex.is_match(v))),
    }
}

#[derive(Debug)]
struct GroupState {
    group_index: usize,
    include: Option<GlobSet>,
    exclude: Option<GlobSet>,
    entries: Vec<FolderEntry>,
}

impl GroupState {
    fn matches_folder(&self, folder: &str) -> bool {
        let included = self
            .include
            .as_ref()
            .is_some_and(|set| set.is_match(folder));
        let excluded = self
            .exclude
            .as_ref()
            .is_some_and(|set| set.is_match(folder));
        included && !excluded
    }
}

fn build_globset(patterns: &[String]) -> Option<GlobSet> {
    if patterns.is_empty() {
        return None;
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        match Glob::new(pattern) {
            Ok(glob) => {
                builder.add(glob);
            }
            Err(err) => {
                warn!(pattern, %err, "folder glob failed to compile, skipping");
            }
        }
    }
    builder.build().ok()
}

/// Per-group folder membership caches answering windowed adjacency queries.
#[derive(Debug, Default)]
pub struct FolderLinkIndex {
    groups: Vec<GroupState>,
}

impl FolderLinkIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-resolve every group's glob patterns against the live folder tree
    /// and rebuild all member lists. Called at activation and on settings
    /// changes touching folder groups.
    pub fn rebuild(&mut self, vault: &dyn Vault, settings: &NavSettings) {
        self.groups = settings
            .folder_groups
            .iter()
            .enumerate()
            .map(|(group_index, group)| {
                let include = build_globset(&group.patterns);
                let exclude = build_globset(&group.exclude_patterns);
                let mut state = GroupState {
                    group_index,
                    include,
                    exclude,
                    entries: Vec::new(),
                };
                for folder in vault.all_folders() {
                    if state.matches_folder(&folder) {
                        state.entries.push(FolderEntry::build(vault, group, &folder));
                    }
                }
                state
            })
            .collect();
    }

    /// One adjacency answer per group entry that contains `file`.
    pub fn get_adjacent_files(
        &self,
        vault: &dyn Vault,
        settings: &NavSettings,
        file: &str,
    ) -> Vec<FolderAdjacent> {
        let mut results = Vec::new();
        for state in &self.groups {
            let Some(group) = settings.folder_groups.get(state.group_index) else {
                continue;
            };
            for entry in &state.entries {
                let Some(pos) = entry.position(file) else {
                    continue;
                };
                let window = group.max_links;
                let start = pos.saturating_sub(window);
                let previous: Vec<String> = entry.members[start..pos]
                    .iter()
                    .map(|row| row.path.clone())
                    .collect();
                let next: Vec<String> = entry.members[pos + 1..]
                    .iter()
                    .take(window)
                    .map(|row| row.path.clone())
                    .collect();
                let parent = group
                    .parent
                    .iter()
                    .filter(|path| vault.file_exists(path))
                    .cloned()
                    .collect();
                results.push(FolderAdjacent {
                    group_index: state.group_index,
                    previous,
                    next,
                    parent,
                });
            }
        }
        results
    }

    pub fn on_file_created(&mut self, vault: &dyn Vault, settings: &NavSettings, path: &str) {
        self.for_claiming_entries(settings, path, |entry, group| {
            entry.insert(vault, group, path);
        });
    }

    pub fn on_file_deleted(&mut self, settings: &NavSettings, path: &str) {
        self.for_claiming_entries(settings, path, |entry, _| entry.remove(path));
    }

    pub fn on_file_renamed(
        &mut self,
        vault: &dyn Vault,
        settings: &NavSettings,
        path: &str,
        old_path: &str,
    ) {
        self.on_file_deleted(settings, old_path);
        self.on_file_created(vault, settings, path);
    }

    /// A property change can move a file within (or out of) a sorted list, so
    /// the row is removed and reinserted.
    pub fn on_metadata_changed(&mut self, vault: &dyn Vault, settings: &NavSettings, path: &str) {
        self.for_claiming_entries(settings, path, |entry, group| {
            entry.remove(path);
            entry.insert(vault, group, path);
        });
    }

    pub fn on_folder_created(&mut self, vault: &dyn Vault, settings: &NavSettings, folder: &str) {
        for state in &mut self.groups {
            let Some(group) = settings.folder_groups.get(state.group_index) else {
                continue;
            };
            if state.matches_folder(folder) && !state.entries.iter().any(|e| e.folder == folder) {
                state.entries.push(FolderEntry::build(vault, group, folder));
            }
        }
    }

    pub fn on_folder_deleted(&mut self, folder: &str) {
        for state in &mut self.groups {
            state
                .entries
                .retain(|entry| entry.folder != folder && !folder_contains(folder, &entry.folder, true));
        }
    }

    pub fn on_folder_renamed(
        &mut self,
        vault: &dyn Vault,
        settings: &NavSettings,
        folder: &str,
        old_folder: &str,
    ) {
        self.on_folder_deleted(old_folder);
        self.on_folder_created(vault, settings, folder);
    }

    fn for_claiming_entries<F>(&mut self, settings: &NavSettings, path: &str, mut apply: F)
    where
        F: FnMut(&mut FolderEntry, &FolderGroup),
    {
        for state in &mut self.groups {
            let Some(group) = settings.folder_groups.get(state.group_index) else {
                continue;
            };
            for entry in &mut state.entries {
                if entry.claims(group, path) {
                    apply(entry, group);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{FilterPattern, FilterTarget, FolderGroup, SortKey};
    use crate::vault::MemoryVault;

    fn group(patterns: &[&str]) -> FolderGroup {
        FolderGroup {
            patterns: patterns.iter().map(|s| s.to_string()).collect(),
            max_links: 1,
            ..FolderGroup::default()
        }
    }

    fn settings_with(groups: Vec<FolderGroup>) -> NavSettings {
        NavSettings {
            folder_groups: groups,
            ..NavSettings::default()
        }
    }

    fn vault_with(paths: &[&str]) -> MemoryVault {
        let mut vault = MemoryVault::new();
        for path in paths {
            vault.add_file(path, "");
        }
        vault
    }

    #[test]
    fn window_of_two_around_third_member() {
        let mut g = group(&["Projects"]);
        g.max_links = 2;
        let settings = settings_with(vec![g]);
        let vault = vault_with(&[
            "Projects/a1.md",
            "Projects/a2.md",
            "Projects/a3.md",
            "Projects/a4.md",
            "Projects/a5.md",
        ]);
        let mut index = FolderLinkIndex::new();
        index.rebuild(&vault, &settings);

        let results = index.get_adjacent_files(&vault, &settings, "Projects/a3.md");
        assert_eq!(results.len(), 1);
        assert_eq!(
            results[0].previous,
            vec!["Projects/a1.md".to_string(), "Projects/a2.md".to_string()]
        );
        assert_eq!(
            results[0].next,
            vec!["Projects/a4.md".to_string(), "Projects/a5.md".to_string()]
        );
    }

    #[test]
    fn adjacency_is_symmetric() {
        let settings = settings_with(vec![group(&["Projects"])]);
        let vault = vault_with(&["Projects/a.md", "Projects/b.md", "Projects/c.md"]);
        let mut index = FolderLinkIndex::new();
        index.rebuild(&vault, &settings);

        let b = &index.get_adjacent_files(&vault, &settings, "Projects/b.md")[0];
        assert_eq!(b.previous, vec!["Projects/a.md".to_string()]);
        let a = &index.get_adjacent_files(&vault, &settings, "Projects/a.md")[0];
        assert_eq!(a.next, vec!["Projects/b.md".to_string()]);
    }

    #[test]
    fn numeric_aware_name_sort() {
        let settings = settings_with(vec![group(&["Notes"])]);
        let vault = vault_with(&["Notes/note10.md", "Notes/note2.md", "Notes/note1.md"]);
        let mut index = FolderLinkIndex::new();
        index.rebuild(&vault, &settings);

        let result = &index.get_adjacent_files(&vault, &settings, "Notes/note2.md")[0];
        assert_eq!(result.previous, vec!["Notes/note1.md".to_string()]);
        assert_eq!(result.next, vec!["Notes/note10.md".to_string()]);
    }

    #[test]
    fn property_sort_with_metadata_repositioning() {
        let mut g = group(&["Books"]);
        g.sort.key = SortKey::Property("rank".into());
        let settings = settings_with(vec![g]);
        let mut vault = MemoryVault::new();
        vault.add_file("Books/a.md", "---\nrank: 3\n---\n");
        vault.add_file("Books/b.md", "---\nrank: 1\n---\n");
        vault.add_file("Books/c.md", "---\nrank: 2\n---\n");
        let mut index = FolderLinkIndex::new();
        index.rebuild(&vault, &settings);

        let result = &index.get_adjacent_files(&vault, &settings, "Books/c.md")[0];
        assert_eq!(result.previous, vec!["Books/b.md".to_string()]);
        assert_eq!(result.next, vec!["Books/a.md".to_string()]);

        // Moving a's rank below b must reposition it after a metadata event.
        vault.set_text("Books/a.md", "---\nrank: 0\n---\n");
        index.on_metadata_changed(&vault, &settings, "Books/a.md");
        let result = &index.get_adjacent_files(&vault, &settings, "Books/c.md")[0];
        assert_eq!(result.previous, vec!["Books/b.md".to_string()]);
        assert_eq!(result.next, vec![] as Vec<String>);
    }

    #[test]
    fn glob_groups_and_folder_events() {
        let settings = settings_with(vec![group(&["Projects/*"])]);
        let vault = vault_with(&["Projects/Alpha/one.md", "Projects/Alpha/two.md"]);
        let mut index = FolderLinkIndex::new();
        index.rebuild(&vault, &settings);

        let results = index.get_adjacent_files(&vault, &settings, "Projects/Alpha/one.md");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].next, vec!["Projects/Alpha/two.md".to_string()]);

        index.on_folder_deleted("Projects/Alpha");
        assert!(index
            .get_adjacent_files(&vault, &settings, "Projects/Alpha/one.md")
            .is_empty());

        index.on_folder_created(&vault, &settings, "Projects/Alpha");
        assert_eq!(
            index
                .get_adjacent_files(&vault, &settings, "Projects/Alpha/one.md")
                .len(),
            1
        );
    }

    #[test]
    fn broken_include_regex_excludes_everything() {
        let mut g = group(&["Notes"]);
        g.include_filter = Some(FilterPattern {
            target: FilterTarget::FileName,
            pattern: "([".into(),
        });
        let settings = settings_with(vec![g]);
        let vault = vault_with(&["Notes/a.md", "Notes/b.md"]);
        let mut index = FolderLinkIndex::new();
        index.rebuild(&vault, &settings);
        assert!(index
            .get_adjacent_files(&vault, &settings, "Notes/a.md")
            .is_empty());
    }

    #[test]
    fn parent_requires_existing_file() {
        let mut g = group(&["Notes"]);
        g.parent = Some("Index.md".into());
        let settings = settings_with(vec![g.clone()]);
        let vault = vault_with(&["Notes/a.md", "Notes/b.md"]);
        let mut index = FolderLinkIndex::new();
        index.rebuild(&vault, &settings);
        let result = &index.get_adjacent_files(&vault, &settings, "Notes/a.md")[0];
        assert!(result.parent.is_empty());

        let vault = vault_with(&["Notes/a.md", "Notes/b.md", "Index.md"]);
        let mut index = FolderLinkIndex::new();
        index.rebuild(&vault, &settings);
        let result = &index.get_adjacent_files(&vault, &settings, "Notes/a.md")[0];
        assert_eq!(result.parent, vec!["Index.md".to_string()]);
    }
}
