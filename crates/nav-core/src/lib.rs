//! # nav-core
//!
//! Navigation-header engine for markdown note vaults.
//!
//! ## Features
//!
//! - Periodic-note adjacency (daily through yearly, with virtual parents)
//! - Folder-neighbor links from glob-matched, sorted folder groups
//! - Frontmatter property links, including implied reciprocal pairs
//! - Streaming annotation scans over backlinking files
//! - Pinned inline content extraction
//! - Deterministic merge, dedup, collapse, and ordering of all of the above

mod aggregate;
mod annotation;
mod controller;
mod error;
mod folder;
mod link;
mod periodic;
mod pinned;
mod property;
mod reciprocal;
mod settings;
mod vault;

pub use aggregate::{
    CollapsedItem, DelimiterStyle, DirectionSlot, HeaderItem, ItemAggregator, ThreeWayLinkGroup,
    ThreeWaySource, SORT_TAG_FOLDER, SORT_TAG_PERIODIC, SORT_TAG_PROPERTY,
};
pub use annotation::{sanitize_scan_text, AnnotationScanner, EMOJI_PLACEHOLDER};
pub use controller::{HeaderController, HeaderSink};
pub use error::{NavError, NavResult};
pub use folder::{FolderAdjacent, FolderLinkIndex};
pub use link::{
    file_stem, folder_contains, is_external_url, numeric_compare, parent_folder, parse_markdown_link,
    parse_wiki_link, LinkInfo, ParsedLink, PrefixedLink,
};
pub use periodic::{
    date_from_stem, stem_from_date, Granularity, PeriodicAdjacent, PeriodicNoteIndex,
};
pub use pinned::{get_pinned_note_contents, ContentSegment, NoteContent};
pub use property::{
    get_property_links, get_three_way_property_link, parse_property_value, ThreeWayPropertyLinks,
};
pub use reciprocal::{resolve_property_target, ImplicitReciprocalPropertyIndex};
pub use settings::{
    AggregationSettings, AnnotationMode, AnnotationSetting, FilterPattern, FilterTarget,
    FolderGroup, GranularitySettings, NavSettings, PeriodicSettings, PinnedSetting,
    PropertyMapping, ReciprocalPair, SettingsChange, SortKey, SortSpec, ThreeWayPropertySettings,
    SETTINGS_VERSION,
};
pub use vault::{
    parse_frontmatter, split_frontmatter, FileTimes, MemoryVault, PropertyBag, PropertyValue,
    Vault, VaultEvent,
};
