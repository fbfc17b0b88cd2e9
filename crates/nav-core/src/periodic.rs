//! Periodic-note index.
//!
//! Maintains, per granularity, a map from canonical date UID to note path
//! plus a sorted UID array. UIDs are lexically monotonic by construction, so
//! previous/next queries are a binary search over the sorted array. The two
//! structures always hold the same key set; every mutation updates both.

use std::collections::HashMap;

use chrono::format::{parse as chrono_parse, Parsed, StrftimeItems};
use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::link::{file_stem, folder_contains};
use crate::settings::{GranularitySettings, NavSettings};
use crate::vault::Vault;

/// Periodic-note granularity, in classification precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl Granularity {
    pub const ALL: [Granularity; 5] = [
        Granularity::Day,
        Granularity::Week,
        Granularity::Month,
        Granularity::Quarter,
        Granularity::Year,
    ];

    /// Canonical date UID for this granularity. Lexical order equals
    /// chronological order for every variant.
    pub fn uid(self, date: NaiveDate) -> String {
        match self {
            Granularity::Day => date.format("%Y-%m-%d").to_string(),
            Granularity::Week => {
                let iso = date.iso_week();
                format!("{:04}-W{:02}", iso.year(), iso.week())
            }
            Granularity::Month => date.format("%Y-%m").to_string(),
            Granularity::Quarter => format!("{:04}-Q{}", date.year(), quarter_of(date)),
            Granularity::Year => date.format("%Y").to_string(),
        }
    }
}

fn quarter_of(date: NaiveDate) -> u32 {
    (date.month0() / 3) + 1
}

/// Render a note filename stem for `date` using the granularity's configured
/// format. Quarter formats use the `{q}` token for the quarter digit.
pub fn stem_from_date(format: &str, date: NaiveDate) -> String {
    let expanded = format.replace("{q}", &quarter_of(date).to_string());
    date.format(&expanded).to_string()
}

/// Parse a filename stem back into a date. Fields the format leaves
/// unspecified are completed to the start of the period.
pub fn date_from_stem(format: &str, stem: &str) -> Option<NaiveDate> {
    if format.is_empty() {
        return None;
    }
    if format.contains("{q}") {
        for q in 1u32..=4 {
            let candidate = format.replace("{q}", &q.to_string());
            if let Some(date) = parse_with_defaults(&candidate, stem, Some(q)) {
                return Some(date);
            }
        }
        return None;
    }
    parse_with_defaults(format, stem, None)
}

fn parse_with_defaults(format: &str, stem: &str, quarter: Option<u32>) -> Option<NaiveDate> {
    let mut parsed = Parsed::new();
    chrono_parse(&mut parsed, stem, StrftimeItems::new(format)).ok()?;

    if let (Some(isoyear), Some(isoweek)) = (parsed.isoyear, parsed.isoweek) {
        return NaiveDate::from_isoywd_opt(isoyear, isoweek, Weekday::Mon);
    }

    let year = parsed.year?;
    let month = parsed
        .month
        .or(quarter.map(|q| (q - 1) * 3 + 1))
        .unwrap_or(1);
    let day = parsed.day.unwrap_or(1);
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Adjacency answer for one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeriodicAdjacent {
    /// `None` when the file is not a periodic note; not an error.
    pub granularity: Option<Granularity>,
    pub previous: Option<String>,
    pub next: Option<String>,
    /// Path of the parent note. When `parent_date` is also set the note does
    /// not exist yet and this is the would-be path (a virtual link).
    pub parent: Option<String>,
    pub parent_date: Option<NaiveDate>,
    pub parent_granularity: Option<Granularity>,
}

#[derive(Debug, Default)]
struct GranularityCache {
    by_uid: HashMap<String, String>,
    sorted_uids: Vec<String>,
}

impl GranularityCache {
    fn insert(&mut self, uid: String, path: String) {
        if self.by_uid.insert(uid.clone(), path).is_none() {
            let pos = self.sorted_uids.partition_point(|u| u < &uid);
            self.sorted_uids.insert(pos, uid);
        }
    }

    fn remove(&mut self, uid: &str) {
        if self.by_uid.remove(uid).is_some() {
            if let Ok(pos) = self.sorted_uids.binary_search_by(|u| u.as_str().cmp(uid)) {
                self.sorted_uids.remove(pos);
            }
        }
    }

    fn neighbors(&self, uid: &str) -> (Option<&String>, Option<&String>) {
        let Ok(pos) = self.sorted_uids.binary_search_by(|u| u.as_str().cmp(uid)) else {
            return (None, None);
        };
        let previous = pos
            .checked_sub(1)
            .and_then(|p| self.sorted_uids.get(p))
            .and_then(|u| self.by_uid.get(u));
        let next = self
            .sorted_uids
            .get(pos + 1)
            .and_then(|u| self.by_uid.get(u));
        (previous, next)
    }
}

/// Sorted-by-date index of periodic notes, one cache per active granularity.
#[derive(Debug, Default)]
pub struct PeriodicNoteIndex {
    caches: HashMap<Granularity, GranularityCache>,
}

impl PeriodicNoteIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify a path against the active granularities: first granularity
    /// whose folder contains the path and whose format parses the stem wins.
    pub fn classify(
        &self,
        settings: &NavSettings,
        path: &str,
    ) -> Option<(Granularity, NaiveDate)> {
        classify_among(settings, &settings.periodic.active(), path)
    }

    /// Previous/next/parent lookup for `file`.
    pub fn search_adjacent_notes(&self, settings: &NavSettings, file: &str) -> PeriodicAdjacent {
        let Some((granularity, date)) = self.classify(settings, file) else {
            return PeriodicAdjacent::default();
        };
        let cfg = settings.periodic.for_granularity(granularity);

        let mut result = PeriodicAdjacent {
            granularity: Some(granularity),
            ..PeriodicAdjacent::default()
        };

        if cfg.show_previous_next {
            if let Some(cache) = self.caches.get(&granularity) {
                let uid = granularity.uid(date);
                let (previous, next) = cache.neighbors(&uid);
                result.previous = previous.cloned();
                result.next = next.cloned();
            }
        }

        if let Some(parent_granularity) = cfg.parent {
            let parent_cfg = settings.periodic.for_granularity(parent_granularity);
            if !parent_cfg.format.is_empty() {
                result.parent_granularity = Some(parent_granularity);
                let parent_uid = parent_granularity.uid(date);
                let existing = self
                    .caches
                    .get(&parent_granularity)
                    .and_then(|cache| cache.by_uid.get(&parent_uid));
                match existing {
                    Some(path) => result.parent = Some(path.clone()),
                    None => {
                        // Creatable but not yet existing: report the would-be
                        // path and keep the date so callers can offer
                        // create-on-click.
                        result.parent = Some(would_be_path(parent_cfg, date));
                        result.parent_date = Some(date);
                    }
                }
            }
        }

        result
    }

    /// Cache maintenance classifies against the indexed set, not just the
    /// active one: a granularity that is only a parent target must still be
    /// cached so existing parent notes resolve to their real path.
    pub fn on_file_created(&mut self, settings: &NavSettings, path: &str) {
        if let Some((granularity, date)) = classify_indexed(settings, path) {
            let uid = granularity.uid(date);
            debug!(path, uid, "periodic index insert");
            self.caches
                .entry(granularity)
                .or_default()
                .insert(uid, path.to_string());
        }
    }

    pub fn on_file_deleted(&mut self, settings: &NavSettings, path: &str) {
        if let Some((granularity, date)) = classify_indexed(settings, path) {
            let uid = granularity.uid(date);
            if let Some(cache) = self.caches.get_mut(&granularity) {
                cache.remove(&uid);
            }
        }
    }

    pub fn on_file_renamed(&mut self, settings: &NavSettings, path: &str, old_path: &str) {
        self.on_file_deleted(settings, old_path);
        self.on_file_created(settings, path);
    }

    /// Full rebuild from the vault. Called when settings change granularity
    /// activation or parent chains, since that can change which granularities
    /// need caching at all.
    pub fn update_entire_cache(&mut self, vault: &dyn Vault, settings: &NavSettings) {
        self.caches.clear();
        for path in vault.all_files() {
            self.on_file_created(settings, &path);
        }
    }
}

fn classify_among(
    settings: &NavSettings,
    granularities: &[Granularity],
    path: &str,
) -> Option<(Granularity, NaiveDate)> {
    for &granularity in granularities {
        let cfg = settings.periodic.for_granularity(granularity);
        if !folder_contains(&cfg.folder, path, true) {
            continue;
        }
        if let Some(date) = date_from_stem(&cfg.format, file_stem(path)) {
            return Some((granularity, date));
        }
    }
    None
}

fn classify_indexed(settings: &NavSettings, path: &str) -> Option<(Granularity, NaiveDate)> {
    classify_among(settings, &settings.periodic.indexed(), path)
}

fn would_be_path(cfg: &GranularitySettings, date: NaiveDate) -> String {
    let stem = stem_from_date(&cfg.format, date);
    if cfg.folder.is_empty() {
        format!("{stem}.md")
    } else {
        format!("{}/{stem}.md", cfg.folder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::MemoryVault;

    fn daily_settings() -> NavSettings {
        let mut settings = NavSettings::default();
        settings.periodic.day.enabled = true;
        settings.periodic.day.folder = "Daily".into();
        settings.periodic.day.format = "%Y-%m-%d".into();
        settings.periodic.month.enabled = true;
        settings.periodic.month.folder = "Monthly".into();
        settings.periodic.month.format = "%Y-%m".into();
        settings.periodic.day.parent = Some(Granularity::Month);
        settings
    }

    fn build_index(settings: &NavSettings, paths: &[&str]) -> PeriodicNoteIndex {
        let mut vault = MemoryVault::new();
        for path in paths {
            vault.add_file(path, "");
        }
        let mut index = PeriodicNoteIndex::new();
        index.update_entire_cache(&vault, settings);
        index
    }

    #[test]
    fn uids_are_lexically_chronological() {
        let a = NaiveDate::from_ymd_opt(2024, 9, 30).unwrap();
        let b = NaiveDate::from_ymd_opt(2024, 10, 1).unwrap();
        for granularity in Granularity::ALL {
            assert!(granularity.uid(a) <= granularity.uid(b), "{granularity:?}");
        }
        assert_eq!(Granularity::Quarter.uid(b), "2024-Q4");
        assert_eq!(Granularity::Week.uid(b), "2024-W40");
    }

    #[test]
    fn quarter_stems_round_trip() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 20).unwrap();
        let stem = stem_from_date("%Y-Q{q}", date);
        assert_eq!(stem, "2024-Q2");
        let parsed = date_from_stem("%Y-Q{q}", &stem).unwrap();
        assert_eq!(parsed, NaiveDate::from_ymd_opt(2024, 4, 1).unwrap());
    }

    #[test]
    fn week_stems_parse_to_monday() {
        let parsed = date_from_stem("%G-W%V", "2024-W03").unwrap();
        assert_eq!(parsed.iso_week().week(), 3);
        assert_eq!(parsed.weekday(), Weekday::Mon);
    }

    #[test]
    fn classification_is_first_match_wins() {
        let settings = daily_settings();
        let index = PeriodicNoteIndex::new();
        assert_eq!(
            index.classify(&settings, "Daily/2024-01-15.md").map(|c| c.0),
            Some(Granularity::Day)
        );
        assert_eq!(
            index.classify(&settings, "Monthly/2024-01.md").map(|c| c.0),
            Some(Granularity::Month)
        );
        assert_eq!(index.classify(&settings, "Notes/Plain.md"), None);
        assert_eq!(index.classify(&settings, "Daily/not-a-date.md"), None);
    }

    #[test]
    fn previous_next_are_adjacent_and_symmetric() {
        let settings = daily_settings();
        let index = build_index(
            &settings,
            &[
                "Daily/2024-01-01.md",
                "Daily/2024-01-03.md",
                "Daily/2024-01-07.md",
            ],
        );

        let middle = index.search_adjacent_notes(&settings, "Daily/2024-01-03.md");
        assert_eq!(middle.previous.as_deref(), Some("Daily/2024-01-01.md"));
        assert_eq!(middle.next.as_deref(), Some("Daily/2024-01-07.md"));

        // Symmetry: my previous must report me as its next.
        let first = index.search_adjacent_notes(&settings, "Daily/2024-01-01.md");
        assert_eq!(first.previous, None);
        assert_eq!(first.next.as_deref(), Some("Daily/2024-01-03.md"));
        let last = index.search_adjacent_notes(&settings, "Daily/2024-01-07.md");
        assert_eq!(last.previous.as_deref(), Some("Daily/2024-01-03.md"));
        assert_eq!(last.next, None);
    }

    #[test]
    fn virtual_parent_until_created() {
        let settings = daily_settings();
        let mut index = build_index(&settings, &["Daily/2024-01-15.md"]);

        let result = index.search_adjacent_notes(&settings, "Daily/2024-01-15.md");
        assert_eq!(result.parent.as_deref(), Some("Monthly/2024-01.md"));
        assert!(result.parent_date.is_some());
        assert_eq!(result.parent_granularity, Some(Granularity::Month));

        index.on_file_created(&settings, "Monthly/2024-01.md");
        let result = index.search_adjacent_notes(&settings, "Daily/2024-01-15.md");
        assert_eq!(result.parent.as_deref(), Some("Monthly/2024-01.md"));
        assert_eq!(result.parent_date, None);
    }

    #[test]
    fn disabled_parent_granularity_still_resolves_existing_note() {
        let mut settings = daily_settings();
        settings.periodic.month.enabled = false;
        let index = build_index(&settings, &["Daily/2024-01-15.md", "Monthly/2024-01.md"]);

        // Month is only a parent target, but the existing note must win over
        // a virtual link.
        let result = index.search_adjacent_notes(&settings, "Daily/2024-01-15.md");
        assert_eq!(result.parent.as_deref(), Some("Monthly/2024-01.md"));
        assert_eq!(result.parent_date, None);

        // The monthly note itself is not an active periodic note.
        let month = index.search_adjacent_notes(&settings, "Monthly/2024-01.md");
        assert_eq!(month.granularity, None);
    }

    #[test]
    fn rename_repositions_single_entry() {
        let settings = daily_settings();
        let mut index = build_index(&settings, &["Daily/2024-01-01.md", "Daily/2024-01-02.md"]);

        index.on_file_renamed(&settings, "Daily/2024-01-05.md", "Daily/2024-01-01.md");
        let result = index.search_adjacent_notes(&settings, "Daily/2024-01-02.md");
        assert_eq!(result.previous, None);
        assert_eq!(result.next.as_deref(), Some("Daily/2024-01-05.md"));
    }

    #[test]
    fn disabled_previous_next_yields_empty_slots() {
        let mut settings = daily_settings();
        settings.periodic.day.show_previous_next = false;
        let index = build_index(&settings, &["Daily/2024-01-01.md", "Daily/2024-01-02.md"]);
        let result = index.search_adjacent_notes(&settings, "Daily/2024-01-01.md");
        assert_eq!(result.granularity, Some(Granularity::Day));
        assert_eq!(result.next, None);
    }
}
