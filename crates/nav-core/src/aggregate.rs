//! Item aggregation: merge, dedup, collapse, and total ordering.
//!
//! Resolvers feed candidates in whatever order they complete; `get_items`
//! may be called after every batch and must return the same deterministic
//! ordering for the same set of added items, so already-placed entries never
//! jump around during progressive rendering.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::link::{numeric_compare, PrefixedLink};
use crate::pinned::NoteContent;
use crate::settings::AggregationSettings;

/// Reserved sort tags for three-way groups.
pub const SORT_TAG_PERIODIC: &str = "{periodic}";
pub const SORT_TAG_PROPERTY: &str = "{property}";
pub const SORT_TAG_FOLDER: &str = "{folder}";

/// Which resolver produced a three-way group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreeWaySource {
    Periodic,
    Property,
    Folder,
}

impl ThreeWaySource {
    pub fn sort_tag(self) -> &'static str {
        match self {
            ThreeWaySource::Periodic => SORT_TAG_PERIODIC,
            ThreeWaySource::Property => SORT_TAG_PROPERTY,
            ThreeWaySource::Folder => SORT_TAG_FOLDER,
        }
    }
}

/// Visual delimiter between a three-way group's slots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelimiterStyle {
    #[default]
    Chevrons,
    Slash,
}

/// One direction of a three-way group. A hidden slot is never rendered
/// regardless of content; a visible-but-empty slot renders a placeholder gap
/// to keep `< prev | parent | next >` triples aligned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectionSlot {
    pub links: Vec<PrefixedLink>,
    pub hidden: bool,
}

impl DirectionSlot {
    pub fn visible(links: Vec<PrefixedLink>) -> Self {
        Self {
            links,
            hidden: false,
        }
    }

    pub fn hidden() -> Self {
        Self {
            links: Vec::new(),
            hidden: true,
        }
    }
}

/// A previous/next/parent triple from one resolver. `group_index`
/// disambiguates multiple folder configurations sharing the same source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreeWayLinkGroup {
    pub source: ThreeWaySource,
    pub group_index: usize,
    pub previous: DirectionSlot,
    pub next: DirectionSlot,
    pub parent: DirectionSlot,
    pub delimiter: DelimiterStyle,
}

impl ThreeWayLinkGroup {
    pub fn is_empty(&self) -> bool {
        [&self.previous, &self.next, &self.parent]
            .iter()
            .all(|slot| slot.hidden || slot.links.is_empty())
    }
}

/// Placeholder replacing all items that shared a collapsed prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollapsedItem {
    pub prefix: String,
    pub item_count: usize,
}

/// A finished display item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderItem {
    ThreeWay(ThreeWayLinkGroup),
    /// Links sharing one display prefix.
    Links(Vec<PrefixedLink>),
    Content(NoteContent),
    Collapsed(CollapsedItem),
}

/// Policy engine merging resolver output into the final ordered item list.
#[derive(Debug)]
pub struct ItemAggregator {
    policy: AggregationSettings,
    three_ways: Vec<ThreeWayLinkGroup>,
    links: Vec<PrefixedLink>,
    contents: Vec<NoteContent>,
}

impl ItemAggregator {
    pub fn new(policy: AggregationSettings) -> Self {
        Self {
            policy,
            three_ways: Vec::new(),
            links: Vec::new(),
            contents: Vec::new(),
        }
    }

    pub fn add_item(&mut self, item: HeaderItem) {
        match item {
            HeaderItem::ThreeWay(group) => self.three_ways.push(group),
            HeaderItem::Links(links) => self.links.extend(links),
            HeaderItem::Content(content) => self.contents.push(content),
            // Collapsed items are synthesized here, never fed in.
            HeaderItem::Collapsed(_) => {}
        }
    }

    pub fn add_links(&mut self, links: Vec<PrefixedLink>) {
        self.links.extend(links);
    }

    pub fn clear(&mut self) {
        self.three_ways.clear();
        self.links.clear();
        self.contents.clear();
    }

    /// Produce the final ordered, deduplicated, collapsed list. Idempotent:
    /// repeated calls over the same added items return identical output.
    pub fn get_items(&self) -> Vec<HeaderItem> {
        let links = if self.policy.filter_duplicates {
            dedup_links(&self.links, &self.policy.prefix_priority)
        } else {
            self.links.clone()
        };

        let mut three_ways = self.three_ways.clone();
        let mut contents = self.contents.clone();
        let mut links = links;
        let collapsed = self.collapse(&mut three_ways, &mut links, &mut contents);

        let mut items: Vec<HeaderItem> = Vec::new();
        items.extend(three_ways.into_iter().map(HeaderItem::ThreeWay));
        items.extend(group_links_by_prefix(links).into_iter().map(HeaderItem::Links));
        items.extend(contents.into_iter().map(HeaderItem::Content));
        items.extend(collapsed.into_iter().map(HeaderItem::Collapsed));

        self.sort_items(&mut items);
        items
    }

    /// Remove every item carrying a collapsed prefix (standalone links,
    /// links nested inside three-way slots, and pinned content) and
    /// synthesize one counting placeholder per prefix that matched anything.
    fn collapse(
        &self,
        three_ways: &mut [ThreeWayLinkGroup],
        links: &mut Vec<PrefixedLink>,
        contents: &mut Vec<NoteContent>,
    ) -> Vec<CollapsedItem> {
        let mut collapsed = Vec::new();
        for prefix in &self.policy.collapsed_prefixes {
            let mut count = 0usize;

            let before = links.len();
            links.retain(|link| &link.prefix != prefix);
            count += before - links.len();

            for group in three_ways.iter_mut() {
                for slot in [&mut group.previous, &mut group.next, &mut group.parent] {
                    let before = slot.links.len();
                    slot.links.retain(|link| &link.prefix != prefix);
                    count += before - slot.links.len();
                }
            }

            let before = contents.len();
            contents.retain(|content| &content.prefix != prefix);
            count += before - contents.len();

            if count > 0 {
                collapsed.push(CollapsedItem {
                    prefix: prefix.clone(),
                    item_count: count,
                });
            }
        }
        collapsed
    }

    fn sort_items(&self, items: &mut [HeaderItem]) {
        items.sort_by(|a, b| {
            self.compare_tags(item_sort_tag(a), item_sort_tag(b))
                .then_with(|| type_rank(a).cmp(&type_rank(b)))
                .then_with(|| compare_within_type(a, b))
        });
    }

    /// Tags listed in the user's sort order come first, in list position;
    /// unknown tags follow, ordered numeric-lexically among themselves.
    fn compare_tags(&self, a: &str, b: &str) -> Ordering {
        let pos = |tag: &str| self.policy.sort_order.iter().position(|t| t == tag);
        match (pos(a), pos(b)) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => numeric_compare(a, b),
        }
    }
}

fn item_sort_tag(item: &HeaderItem) -> &str {
    match item {
        HeaderItem::ThreeWay(group) => group.source.sort_tag(),
        HeaderItem::Links(links) => links.first().map_or("", |link| link.prefix.as_str()),
        HeaderItem::Content(content) => content.prefix.as_str(),
        HeaderItem::Collapsed(collapsed) => collapsed.prefix.as_str(),
    }
}

fn type_rank(item: &HeaderItem) -> u8 {
    match item {
        HeaderItem::ThreeWay(_) => 0,
        HeaderItem::Links(_) => 1,
        HeaderItem::Content(_) => 2,
        HeaderItem::Collapsed(_) => 3,
    }
}

fn compare_within_type(a: &HeaderItem, b: &HeaderItem) -> Ordering {
    match (a, b) {
        (HeaderItem::ThreeWay(x), HeaderItem::ThreeWay(y)) => x.group_index.cmp(&y.group_index),
        (HeaderItem::Links(x), HeaderItem::Links(y)) => {
            let dx = x.first().map_or("", |l| l.link.display_text.as_str());
            let dy = y.first().map_or("", |l| l.link.display_text.as_str());
            numeric_compare(dx, dy)
        }
        _ => Ordering::Equal,
    }
}

/// Deduplicate plain prefixed links by resolved destination. The survivor is
/// picked by the priority list (lower index wins); when neither prefix is
/// listed, the numeric-lexically greater prefix wins. Deterministic in the
/// face of any insertion order.
fn dedup_links(links: &[PrefixedLink], priority: &[String]) -> Vec<PrefixedLink> {
    let mut by_destination: HashMap<&str, PrefixedLink> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();

    for link in links {
        let key = link.link.destination.as_str();
        match by_destination.get(key) {
            None => {
                order.push(key);
                by_destination.insert(key, link.clone());
            }
            Some(existing) => {
                if beats(&link.prefix, &existing.prefix, priority) {
                    by_destination.insert(key, link.clone());
                }
            }
        }
    }

    order
        .into_iter()
        .filter_map(|key| by_destination.remove(key))
        .collect()
}

fn beats(challenger: &str, incumbent: &str, priority: &[String]) -> bool {
    if challenger == incumbent {
        return false;
    }
    let pos = |prefix: &str| priority.iter().position(|p| p == prefix);
    match (pos(challenger), pos(incumbent)) {
        (Some(c), Some(i)) => c < i,
        (Some(_), None) => true,
        (None, Some(_)) => false,
        (None, None) => numeric_compare(challenger, incumbent) == Ordering::Greater,
    }
}

/// Group surviving links into one item per prefix, inner links ordered by
/// display text. Groups appear in first-seen prefix order; final placement
/// is decided by the aggregator sort anyway.
fn group_links_by_prefix(links: Vec<PrefixedLink>) -> Vec<Vec<PrefixedLink>> {
    let mut groups: Vec<(String, Vec<PrefixedLink>)> = Vec::new();
    for link in links {
        match groups.iter_mut().find(|(prefix, _)| *prefix == link.prefix) {
            Some((_, group)) => group.push(link),
            None => groups.push((link.prefix.clone(), vec![link])),
        }
    }
    groups
        .into_iter()
        .map(|(_, mut group)| {
            group.sort_by(|a, b| numeric_compare(&a.link.display_text, &b.link.display_text));
            group
        })
        .collect()
}
