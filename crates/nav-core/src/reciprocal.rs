//! Implicit reciprocal property index.
//!
//! For each configured pair `(property_a, property_b)`: whenever file F
//! declares `property_a` pointing at file G, G implicitly carries
//! `property_b` pointing back at F, and symmetrically. This is the only
//! resolver that scans the whole vault, and only when at least one pair is
//! configured.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::debug;

use crate::link::{parse_markdown_link, parse_wiki_link};
use crate::settings::NavSettings;
use crate::vault::Vault;

#[derive(Debug, Default)]
pub struct ImplicitReciprocalPropertyIndex {
    /// target path -> implied property name -> declaring source paths.
    implied: HashMap<String, BTreeMap<String, BTreeSet<String>>>,
    /// source path -> (target, implied property) entries it contributed,
    /// kept so a metadata change can remove exactly this file's entries.
    contributions: HashMap<String, Vec<(String, String)>>,
}

impl ImplicitReciprocalPropertyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Paths that implicitly give `file` the named property.
    pub fn get_implicit_property_values(&self, file: &str, property: &str) -> Vec<String> {
        self.implied
            .get(file)
            .and_then(|props| props.get(property))
            .map(|sources| sources.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Full rescan. Called on activation, on settings changes touching the
    /// pair list, and on bulk metadata resolution. With zero pairs the index
    /// stays empty and costs nothing.
    pub fn rebuild(&mut self, vault: &dyn Vault, settings: &NavSettings) {
        self.implied.clear();
        self.contributions.clear();
        if settings.reciprocal_pairs.is_empty() {
            return;
        }
        for file in vault.all_files() {
            self.add_file(vault, settings, &file);
        }
        debug!(targets = self.implied.len(), "reciprocal index rebuilt");
    }

    /// Remove-then-reinsert for one file's current property values.
    pub fn on_metadata_changed(&mut self, vault: &dyn Vault, settings: &NavSettings, file: &str) {
        if settings.reciprocal_pairs.is_empty() {
            return;
        }
        self.remove_file(file);
        self.add_file(vault, settings, file);
    }

    pub fn on_file_deleted(&mut self, file: &str) {
        self.remove_file(file);
        self.implied.remove(file);
    }

    pub fn on_file_renamed(
        &mut self,
        vault: &dyn Vault,
        settings: &NavSettings,
        file: &str,
        old_path: &str,
    ) {
        self.on_file_deleted(old_path);
        if !settings.reciprocal_pairs.is_empty() {
            self.add_file(vault, settings, file);
        }
    }

    fn add_file(&mut self, vault: &dyn Vault, settings: &NavSettings, file: &str) {
        let properties = vault.frontmatter(file);
        for pair in &settings.reciprocal_pairs {
            let directions = [
                (&pair.property_a, &pair.property_b),
                (&pair.property_b, &pair.property_a),
            ];
            for (declared, implied) in directions {
                let Some(value) = properties.get(declared) else {
                    continue;
                };
                for raw in value.strings() {
                    let Some(target) = resolve_property_target(vault, file, &raw) else {
                        continue;
                    };
                    if target == file {
                        continue;
                    }
                    self.implied
                        .entry(target.clone())
                        .or_default()
                        .entry(implied.clone())
                        .or_default()
                        .insert(file.to_string());
                    self.contributions
                        .entry(file.to_string())
                        .or_default()
                        .push((target, implied.clone()));
                }
            }
        }
    }

    fn remove_file(&mut self, file: &str) {
        let Some(entries) = self.contributions.remove(file) else {
            return;
        };
        for (target, property) in entries {
            if let Some(props) = self.implied.get_mut(&target) {
                if let Some(sources) = props.get_mut(&property) {
                    sources.remove(file);
                    if sources.is_empty() {
                        props.remove(&property);
                    }
                }
                if props.is_empty() {
                    self.implied.remove(&target);
                }
            }
        }
    }
}

/// Resolve a raw property value (wikilink, markdown link, or bare link text)
/// to a canonical vault path.
pub fn resolve_property_target(vault: &dyn Vault, from: &str, raw: &str) -> Option<String> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }
    let target = parse_wiki_link(text)
        .or_else(|| parse_markdown_link(text))
        .map(|parsed| parsed.path)
        .unwrap_or_else(|| text.to_string());
    vault.resolve_link(&target, from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::ReciprocalPair;
    use crate::vault::MemoryVault;

    fn pair_settings() -> NavSettings {
        NavSettings {
            reciprocal_pairs: vec![ReciprocalPair {
                property_a: "next".into(),
                property_b: "prev".into(),
            }],
            ..NavSettings::default()
        }
    }

    #[test]
    fn declared_next_implies_reverse_prev() {
        let mut vault = MemoryVault::new();
        vault.add_file("a.md", "---\nnext: \"[[b]]\"\n---\n");
        vault.add_file("b.md", "");
        let settings = pair_settings();
        let mut index = ImplicitReciprocalPropertyIndex::new();
        index.rebuild(&vault, &settings);

        assert_eq!(
            index.get_implicit_property_values("b.md", "prev"),
            vec!["a.md".to_string()]
        );
        assert!(index.get_implicit_property_values("b.md", "next").is_empty());
        assert!(index.get_implicit_property_values("a.md", "prev").is_empty());
    }

    #[test]
    fn symmetric_direction_also_indexed() {
        let mut vault = MemoryVault::new();
        vault.add_file("a.md", "---\nprev: \"[[b]]\"\n---\n");
        vault.add_file("b.md", "");
        let settings = pair_settings();
        let mut index = ImplicitReciprocalPropertyIndex::new();
        index.rebuild(&vault, &settings);

        assert_eq!(
            index.get_implicit_property_values("b.md", "next"),
            vec!["a.md".to_string()]
        );
    }

    #[test]
    fn metadata_change_patches_only_that_file() {
        let mut vault = MemoryVault::new();
        vault.add_file("a.md", "---\nnext: \"[[b]]\"\n---\n");
        vault.add_file("c.md", "---\nnext: \"[[b]]\"\n---\n");
        vault.add_file("b.md", "");
        let settings = pair_settings();
        let mut index = ImplicitReciprocalPropertyIndex::new();
        index.rebuild(&vault, &settings);
        assert_eq!(
            index.get_implicit_property_values("b.md", "prev"),
            vec!["a.md".to_string(), "c.md".to_string()]
        );

        vault.set_text("a.md", "---\nnext: \"[[c]]\"\n---\n");
        index.on_metadata_changed(&vault, &settings, "a.md");
        assert_eq!(
            index.get_implicit_property_values("b.md", "prev"),
            vec!["c.md".to_string()]
        );
        assert_eq!(
            index.get_implicit_property_values("c.md", "prev"),
            vec!["a.md".to_string()]
        );
    }

    #[test]
    fn zero_pairs_means_inactive() {
        let mut vault = MemoryVault::new();
        vault.add_file("a.md", "---\nnext: \"[[b]]\"\n---\n");
        vault.add_file("b.md", "");
        let settings = NavSettings::default();
        let mut index = ImplicitReciprocalPropertyIndex::new();
        index.rebuild(&vault, &settings);
        assert!(index.get_implicit_property_values("b.md", "prev").is_empty());
    }

    #[test]
    fn dangling_values_are_dropped() {
        let mut vault = MemoryVault::new();
        vault.add_file("a.md", "---\nnext: \"[[missing]]\"\n---\n");
        let settings = pair_settings();
        let mut index = ImplicitReciprocalPropertyIndex::new();
        index.rebuild(&vault, &settings);
        assert!(index.implied.is_empty());
    }
}
