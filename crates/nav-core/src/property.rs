//! Frontmatter-property link resolver.
//!
//! Stateless per call: frontmatter reads are already cached upstream by the
//! vault's metadata index, so there is nothing worth caching here. Values
//! parse as wikilink, then markdown link, then bare external URL; internal
//! targets go through the vault's link resolution and dangling references
//! are silently dropped.

use crate::link::{
    file_stem, is_external_url, parse_markdown_link, parse_wiki_link, LinkInfo, PrefixedLink,
};
use crate::reciprocal::ImplicitReciprocalPropertyIndex;
use crate::settings::{NavSettings, PropertyMapping};
use crate::vault::Vault;

/// Previous/next/parent links sourced from three-way property mappings.
/// Multiple mappings may feed one direction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreeWayPropertyLinks {
    pub previous: Vec<PrefixedLink>,
    pub next: Vec<PrefixedLink>,
    pub parent: Vec<PrefixedLink>,
}

impl ThreeWayPropertyLinks {
    pub fn is_empty(&self) -> bool {
        self.previous.is_empty() && self.next.is_empty() && self.parent.is_empty()
    }
}

/// Plain prefixed links from the configured `{property, prefix}` mappings.
pub fn get_property_links(vault: &dyn Vault, file: &str, settings: &NavSettings) -> Vec<PrefixedLink> {
    let properties = vault.frontmatter(file);
    let mut links = Vec::new();
    for mapping in &settings.property_mappings {
        let Some(value) = properties.get(&mapping.property) else {
            continue;
        };
        for raw in value.strings() {
            if let Some(link) = parse_property_value(vault, file, &raw) {
                links.push(PrefixedLink::new(mapping.prefix.clone(), link));
            }
        }
    }
    links
}

/// Three-way links from direction-mapped properties, merged with the
/// implicit reciprocal index's non-authored candidates.
pub fn get_three_way_property_link(
    vault: &dyn Vault,
    file: &str,
    settings: &NavSettings,
    reciprocal: &ImplicitReciprocalPropertyIndex,
) -> ThreeWayPropertyLinks {
    let three_way = &settings.three_way_properties;
    ThreeWayPropertyLinks {
        previous: direction_links(vault, file, &three_way.previous, reciprocal),
        next: direction_links(vault, file, &three_way.next, reciprocal),
        parent: direction_links(vault, file, &three_way.parent, reciprocal),
    }
}

fn direction_links(
    vault: &dyn Vault,
    file: &str,
    mappings: &[PropertyMapping],
    reciprocal: &ImplicitReciprocalPropertyIndex,
) -> Vec<PrefixedLink> {
    let properties = vault.frontmatter(file);
    let mut links = Vec::new();
    for mapping in mappings {
        if let Some(value) = properties.get(&mapping.property) {
            for raw in value.strings() {
                if let Some(link) = parse_property_value(vault, file, &raw) {
                    links.push(PrefixedLink::new(mapping.prefix.clone(), link));
                }
            }
        }
        for path in reciprocal.get_implicit_property_values(file, &mapping.property) {
            if links.iter().any(|l| l.link.destination == path) {
                continue;
            }
            let display = file_stem(&path).to_string();
            links.push(PrefixedLink::new(
                mapping.prefix.clone(),
                LinkInfo::internal(path, display),
            ));
        }
    }
    links
}

/// Parse one property value into a link: wikilink, then markdown link, then
/// bare URL. `None` for anything unresolvable.
pub fn parse_property_value(vault: &dyn Vault, file: &str, raw: &str) -> Option<LinkInfo> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }
    if let Some(parsed) = parse_wiki_link(text).or_else(|| parse_markdown_link(text)) {
        if is_external_url(&parsed.path) {
            let display = parsed.display.unwrap_or_else(|| parsed.path.clone());
            return Some(LinkInfo::external(parsed.path, display));
        }
        let resolved = vault.resolve_link(&parsed.path, file)?;
        let display = parsed
            .display
            .unwrap_or_else(|| file_stem(&resolved).to_string());
        return Some(LinkInfo::internal(resolved, display));
    }
    if is_external_url(text) {
        return Some(LinkInfo::external(text, text));
    }
    None
}
