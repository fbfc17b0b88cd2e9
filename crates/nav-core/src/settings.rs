//! Engine settings.
//!
//! The persisted settings document is JSON with an explicit `version` field;
//! [`NavSettings::load`] applies stepwise migrations before typed
//! deserialization so older documents keep working. At runtime settings are
//! immutable snapshots: applying a change swaps in a whole new value and the
//! controller re-runs a forced update, never mutating an in-flight pass.

use serde::{Deserialize, Serialize};

use crate::error::{NavError, NavResult};
use crate::periodic::Granularity;

/// Current settings document version.
pub const SETTINGS_VERSION: u32 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavSettings {
    pub version: u32,
    pub periodic: PeriodicSettings,
    pub folder_groups: Vec<FolderGroup>,
    pub property_mappings: Vec<PropertyMapping>,
    pub three_way_properties: ThreeWayPropertySettings,
    pub reciprocal_pairs: Vec<ReciprocalPair>,
    pub annotations: Vec<AnnotationSetting>,
    pub pinned: Vec<PinnedSetting>,
    pub aggregation: AggregationSettings,
}

impl Default for NavSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            periodic: PeriodicSettings::default(),
            folder_groups: Vec::new(),
            property_mappings: Vec::new(),
            three_way_properties: ThreeWayPropertySettings::default(),
            reciprocal_pairs: Vec::new(),
            annotations: Vec::new(),
            pinned: Vec::new(),
            aggregation: AggregationSettings::default(),
        }
    }
}

impl NavSettings {
    /// Parse a persisted settings document, migrating old versions in place.
    pub fn load(json: &str) -> NavResult<Self> {
        let mut value: serde_json::Value = serde_json::from_str(json)?;
        migrate(&mut value)?;
        serde_json::from_value(value).map_err(NavError::Json)
    }

    pub fn to_json(&self) -> NavResult<String> {
        serde_json::to_string_pretty(self).map_err(NavError::Json)
    }

    /// Which cache-bearing sections differ between two snapshots. The
    /// controller uses this to decide which resolvers must rebuild.
    pub fn diff(&self, other: &NavSettings) -> SettingsChange {
        SettingsChange {
            periodic: self.periodic != other.periodic,
            folders: self.folder_groups != other.folder_groups,
            reciprocal: self.reciprocal_pairs != other.reciprocal_pairs,
            annotations: self.annotations != other.annotations,
        }
    }
}

/// Per-section change flags produced by [`NavSettings::diff`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettingsChange {
    pub periodic: bool,
    pub folders: bool,
    pub reciprocal: bool,
    pub annotations: bool,
}

impl SettingsChange {
    pub fn any(&self) -> bool {
        self.periodic || self.folders || self.reciprocal || self.annotations
    }
}

fn migrate(value: &mut serde_json::Value) -> NavResult<()> {
    if !value.is_object() {
        return Err(NavError::Settings(
            "settings document must be a JSON object".to_string(),
        ));
    }
    let version = value
        .get("version")
        .and_then(serde_json::Value::as_u64)
        .unwrap_or(1) as u32;
    if version > SETTINGS_VERSION {
        return Err(NavError::Settings(format!(
            "settings version {version} is newer than supported {SETTINGS_VERSION}"
        )));
    }
    if version < 2 {
        migrate_v1_to_v2(value);
    }
    if version < 3 {
        migrate_v2_to_v3(value);
    }
    value["version"] = serde_json::json!(SETTINGS_VERSION);
    Ok(())
}

/// v1 had a single `folder_links` object; v2 turned it into the
/// `folder_groups` list.
fn migrate_v1_to_v2(value: &mut serde_json::Value) {
    let Some(obj) = value.as_object_mut() else {
        return;
    };
    if let Some(single) = obj.remove("folder_links") {
        if !single.is_null() {
            obj.insert("folder_groups".to_string(), serde_json::json!([single]));
        }
    }
}

/// v2 stored flat `annotation_strings`; v3 replaced them with structured
/// annotation entries carrying mode and spacing flags.
fn migrate_v2_to_v3(value: &mut serde_json::Value) {
    let Some(obj) = value.as_object_mut() else {
        return;
    };
    let Some(strings) = obj.remove("annotation_strings") else {
        return;
    };
    let entries: Vec<serde_json::Value> = strings
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str())
                .map(|s| {
                    serde_json::json!({
                        "pattern": s,
                        "prefix": s,
                        "is_regex": false,
                        "allow_space": false,
                        "mode": "backlink",
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    if !entries.is_empty() {
        obj.insert("annotations".to_string(), serde_json::Value::Array(entries));
    }
}

// ---- periodic ----

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PeriodicSettings {
    pub day: GranularitySettings,
    pub week: GranularitySettings,
    pub month: GranularitySettings,
    pub quarter: GranularitySettings,
    pub year: GranularitySettings,
}

impl PeriodicSettings {
    pub fn for_granularity(&self, granularity: Granularity) -> &GranularitySettings {
        match granularity {
            Granularity::Day => &self.day,
            Granularity::Week => &self.week,
            Granularity::Month => &self.month,
            Granularity::Quarter => &self.quarter,
            Granularity::Year => &self.year,
        }
    }

    pub fn active(&self) -> Vec<Granularity> {
        Granularity::ALL
            .iter()
            .copied()
            .filter(|g| self.for_granularity(*g).enabled)
            .collect()
    }

    /// Granularities that need cache entries: every active one plus any
    /// configured granularity an active one targets as its parent.
    pub fn indexed(&self) -> Vec<Granularity> {
        Granularity::ALL
            .iter()
            .copied()
            .filter(|g| {
                let cfg = self.for_granularity(*g);
                if cfg.enabled {
                    return true;
                }
                !cfg.format.is_empty()
                    && Granularity::ALL.iter().any(|a| {
                        let active = self.for_granularity(*a);
                        active.enabled && active.parent == Some(*g)
                    })
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GranularitySettings {
    pub enabled: bool,
    /// Vault-relative storage folder for this granularity.
    pub folder: String,
    /// chrono format string for note filenames, e.g. `%Y-%m-%d`.
    pub format: String,
    pub show_previous_next: bool,
    /// Parent granularity for the `parent` slot, if any.
    pub parent: Option<Granularity>,
    pub prefix: String,
}

impl Default for GranularitySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            folder: String::new(),
            format: String::new(),
            show_previous_next: true,
            parent: None,
            prefix: String::new(),
        }
    }
}

// ---- folder groups ----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FolderGroup {
    /// Glob patterns selecting folders, e.g. `Projects/*`.
    pub patterns: Vec<String>,
    /// Glob patterns excluding folders matched above.
    pub exclude_patterns: Vec<String>,
    pub recursive: bool,
    pub include_filter: Option<FilterPattern>,
    pub exclude_filter: Option<FilterPattern>,
    pub sort: SortSpec,
    /// Window radius: how many previous/next links to emit.
    pub max_links: usize,
    /// Fixed parent file for every member of this group.
    pub parent: Option<String>,
    pub prefix: String,
    pub hide_previous: bool,
    pub hide_next: bool,
    pub hide_parent: bool,
}

impl Default for FolderGroup {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            recursive: false,
            include_filter: None,
            exclude_filter: None,
            sort: SortSpec::default(),
            max_links: 1,
            parent: None,
            prefix: String::new(),
            hide_previous: false,
            hide_next: false,
            hide_parent: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterPattern {
    pub target: FilterTarget,
    /// User-supplied regex; failure to compile means "no match".
    pub pattern: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterTarget {
    FileName,
    Property(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SortSpec {
    pub key: SortKey,
    pub descending: bool,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self {
            key: SortKey::FileName,
            descending: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    FileName,
    Created,
    Modified,
    Property(String),
}

// ---- properties ----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyMapping {
    pub property: String,
    pub prefix: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreeWayPropertySettings {
    pub previous: Vec<PropertyMapping>,
    pub next: Vec<PropertyMapping>,
    pub parent: Vec<PropertyMapping>,
    pub hide_previous: bool,
    pub hide_next: bool,
    pub hide_parent: bool,
}

impl ThreeWayPropertySettings {
    pub fn is_empty(&self) -> bool {
        self.previous.is_empty() && self.next.is_empty() && self.parent.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReciprocalPair {
    pub property_a: String,
    pub property_b: String,
}

// ---- annotations ----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationSetting {
    /// Literal annotation string (may contain the `{emoji}` placeholder) or,
    /// with `is_regex`, a raw regular expression.
    pub pattern: String,
    /// Display prefix for links found under this annotation.
    pub prefix: String,
    pub is_regex: bool,
    /// Allow whitespace between the annotation and the link.
    pub allow_space: bool,
    pub mode: AnnotationMode,
    /// Strip U+FE0E/U+FE0F variation selectors before matching.
    pub strip_variation_selectors: bool,
}

impl Default for AnnotationSetting {
    fn default() -> Self {
        Self {
            pattern: String::new(),
            prefix: String::new(),
            is_regex: false,
            allow_space: false,
            mode: AnnotationMode::Backlink,
            strip_variation_selectors: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationMode {
    /// Scan files that link to the current note.
    Backlink,
    /// Scan the current note's own text.
    CurrentNote,
}

// ---- pinned content ----

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PinnedSetting {
    pub annotation: String,
    pub prefix: String,
    /// When both markers are set, text between `annotation + begin_marker`
    /// and `end_marker` is extracted instead of the rest of the line.
    pub begin_marker: Option<String>,
    pub end_marker: Option<String>,
}

// ---- aggregation ----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationSettings {
    /// Deduplicate plain prefixed links sharing a destination.
    pub filter_duplicates: bool,
    /// Dedup winner order: lower index wins.
    pub prefix_priority: Vec<String>,
    /// Prefixes currently collapsed to a count placeholder.
    pub collapsed_prefixes: Vec<String>,
    /// Display order of sort tags; unknown tags append after, sorted.
    pub sort_order: Vec<String>,
}

impl Default for AggregationSettings {
    fn default() -> Self {
        Self {
            filter_duplicates: true,
            prefix_priority: Vec::new(),
            collapsed_prefixes: Vec::new(),
            sort_order: Vec::new(),
        }
    }
}
