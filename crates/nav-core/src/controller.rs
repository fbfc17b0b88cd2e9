//! Header update orchestration.
//!
//! `HeaderController` owns the resolver caches and drives the two-phase
//! update: the synchronous resolvers (periodic, property, folder, pinned)
//! run inline and publish immediately, then the annotation scan streams in
//! on a spawned task and republishes the growing item list batch by batch.
//! A generation counter keeps stale scans from ever publishing over a newer
//! file's header.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::aggregate::{
    DelimiterStyle, DirectionSlot, HeaderItem, ItemAggregator, ThreeWayLinkGroup, ThreeWaySource,
};
use crate::annotation::AnnotationScanner;
use crate::error::NavError;
use crate::folder::FolderLinkIndex;
use crate::link::{file_stem, LinkInfo, PrefixedLink};
use crate::periodic::PeriodicNoteIndex;
use crate::pinned::get_pinned_note_contents;
use crate::property::{get_property_links, get_three_way_property_link};
use crate::reciprocal::ImplicitReciprocalPropertyIndex;
use crate::settings::NavSettings;
use crate::vault::{Vault, VaultEvent};

/// Trailing-edge window for event-driven refreshes. A burst of vault events
/// patches the caches immediately but redraws the header only once, after
/// the burst goes quiet.
const REFRESH_DEBOUNCE: Duration = Duration::from_millis(300);

/// Receives each successive item list for the active file. Implementations
/// must tolerate repeated calls with growing lists as scan batches land.
pub trait HeaderSink: Send + Sync {
    fn publish(&self, file: &str, items: Vec<HeaderItem>);
}

pub struct HeaderController {
    vault: Arc<dyn Vault + Send + Sync>,
    sink: Arc<dyn HeaderSink>,
    settings: Arc<NavSettings>,
    periodic: PeriodicNoteIndex,
    folder: FolderLinkIndex,
    reciprocal: ImplicitReciprocalPropertyIndex,
    scanner: Arc<Mutex<AnnotationScanner>>,
    /// Stale content-cache entries, drained into the next scan.
    pending_invalidations: HashSet<String>,
    current_file: Option<String>,
    generation: Arc<AtomicU64>,
    scan_cancel: CancellationToken,
    refresh_due: Option<Instant>,
}

impl HeaderController {
    pub fn new(
        vault: Arc<dyn Vault + Send + Sync>,
        sink: Arc<dyn HeaderSink>,
        settings: NavSettings,
    ) -> Self {
        let settings = Arc::new(settings);
        let mut controller = Self {
            vault,
            sink,
            settings,
            periodic: PeriodicNoteIndex::new(),
            folder: FolderLinkIndex::new(),
            reciprocal: ImplicitReciprocalPropertyIndex::new(),
            scanner: Arc::new(Mutex::new(AnnotationScanner::new())),
            pending_invalidations: HashSet::new(),
            current_file: None,
            generation: Arc::new(AtomicU64::new(0)),
            scan_cancel: CancellationToken::new(),
            refresh_due: None,
        };
        controller.rebuild_all();
        controller
    }

    pub fn settings(&self) -> &NavSettings {
        &self.settings
    }

    pub fn current_file(&self) -> Option<&str> {
        self.current_file.as_deref()
    }

    /// Full cache rebuild from the vault's current state.
    pub fn rebuild_all(&mut self) {
        let settings = Arc::clone(&self.settings);
        self.periodic.update_entire_cache(self.vault.as_ref(), &settings);
        self.folder.rebuild(self.vault.as_ref(), &settings);
        self.reciprocal.rebuild(self.vault.as_ref(), &settings);
    }

    /// Recompute the header for `file`. A repeated call for the already
    /// active file is a no-op unless `forced`; a forced update also cancels
    /// any in-flight annotation scan.
    pub fn update(&mut self, file: &str, forced: bool) {
        if !forced && self.current_file.as_deref() == Some(file) {
            return;
        }
        self.current_file = Some(file.to_string());
        self.scan_cancel.cancel();
        self.scan_cancel = CancellationToken::new();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let mut aggregator = ItemAggregator::new(self.settings.aggregation.clone());
        for item in self.base_items(file) {
            aggregator.add_item(item);
        }
        self.sink.publish(file, aggregator.get_items());

        if self.settings.annotations.is_empty() {
            return;
        }
        self.spawn_scan(file, generation, aggregator);
    }

    /// Sync-resolver output: periodic, property, and folder three-way
    /// groups, plain property links, and pinned content.
    fn base_items(&self, file: &str) -> Vec<HeaderItem> {
        let vault = self.vault.as_ref();
        let settings = &self.settings;
        let mut items = Vec::new();

        if let Some(group) = self.periodic_group(file) {
            items.push(HeaderItem::ThreeWay(group));
        }

        let three_way = get_three_way_property_link(vault, file, settings, &self.reciprocal);
        if !three_way.is_empty() {
            let cfg = &settings.three_way_properties;
            items.push(HeaderItem::ThreeWay(ThreeWayLinkGroup {
                source: ThreeWaySource::Property,
                group_index: 0,
                previous: slot(three_way.previous, cfg.hide_previous),
                next: slot(three_way.next, cfg.hide_next),
                parent: slot(three_way.parent, cfg.hide_parent),
                delimiter: DelimiterStyle::default(),
            }));
        }

        let links = get_property_links(vault, file, settings);
        if !links.is_empty() {
            items.push(HeaderItem::Links(links));
        }

        for adjacent in self.folder.get_adjacent_files(vault, settings, file) {
            let Some(group) = settings.folder_groups.get(adjacent.group_index) else {
                continue;
            };
            let to_links = |paths: Vec<String>| {
                paths
                    .into_iter()
                    .map(|path| {
                        let display = file_stem(&path).to_string();
                        PrefixedLink::new(group.prefix.clone(), LinkInfo::internal(path, display))
                    })
                    .collect()
            };
            items.push(HeaderItem::ThreeWay(ThreeWayLinkGroup {
                source: ThreeWaySource::Folder,
                group_index: adjacent.group_index,
                previous: slot(to_links(adjacent.previous), group.hide_previous),
                next: slot(to_links(adjacent.next), group.hide_next),
                parent: slot(to_links(adjacent.parent), group.hide_parent),
                delimiter: DelimiterStyle::default(),
            }));
        }

        for content in get_pinned_note_contents(vault, file, settings) {
            items.push(HeaderItem::Content(content));
        }

        items
    }

    fn periodic_group(&self, file: &str) -> Option<ThreeWayLinkGroup> {
        let adjacent = self.periodic.search_adjacent_notes(&self.settings, file);
        let granularity = adjacent.granularity?;
        let cfg = self.settings.periodic.for_granularity(granularity);

        let to_link = |path: String| {
            let display = file_stem(&path).to_string();
            PrefixedLink::new(cfg.prefix.clone(), LinkInfo::internal(path, display))
        };
        let parent = adjacent
            .parent
            .map(|path| {
                let prefix = adjacent
                    .parent_granularity
                    .map(|g| self.settings.periodic.for_granularity(g).prefix.clone())
                    .unwrap_or_else(|| cfg.prefix.clone());
                let display = file_stem(&path).to_string();
                // A parent with a pending date is virtual: the note does not
                // exist yet and the link offers create-on-click.
                let link = if adjacent.parent_date.is_some() {
                    LinkInfo::unresolved(path, display)
                } else {
                    LinkInfo::internal(path, display)
                };
                vec![PrefixedLink::new(prefix, link)]
            })
            .unwrap_or_default();

        Some(ThreeWayLinkGroup {
            source: ThreeWaySource::Periodic,
            group_index: 0,
            previous: slot(
                adjacent.previous.into_iter().map(to_link).collect(),
                !cfg.show_previous_next,
            ),
            next: slot(
                adjacent.next.into_iter().map(to_link).collect(),
                !cfg.show_previous_next,
            ),
            parent: DirectionSlot::visible(parent),
            delimiter: DelimiterStyle::default(),
        })
    }

    /// Launch the annotation scan for `file`: a producer task streaming
    /// batches and a consumer task folding them into the aggregator and
    /// republishing. Both stop as soon as a newer update takes over.
    fn spawn_scan(&mut self, file: &str, generation: u64, mut aggregator: ItemAggregator) {
        let (tx, mut rx) = mpsc::channel::<Vec<PrefixedLink>>(8);
        let invalidations = std::mem::take(&mut self.pending_invalidations);

        let vault = Arc::clone(&self.vault);
        let settings = Arc::clone(&self.settings);
        let scanner = Arc::clone(&self.scanner);
        let cancel = self.scan_cancel.clone();
        let scan_file = file.to_string();
        tokio::spawn(async move {
            let mut scanner = scanner.lock().await;
            for path in &invalidations {
                scanner.invalidate(path);
            }
            let result = scanner
                .search_annotated_links(vault.as_ref(), &settings, &scan_file, &tx, &cancel)
                .await;
            match result {
                Ok(()) => trace!(file = scan_file, "annotation scan complete"),
                Err(NavError::Cancelled) => trace!(file = scan_file, "annotation scan cancelled"),
                Err(err) => warn!(file = scan_file, %err, "annotation scan failed"),
            }
        });

        let sink = Arc::clone(&self.sink);
        let counter = Arc::clone(&self.generation);
        let publish_file = file.to_string();
        tokio::spawn(async move {
            while let Some(batch) = rx.recv().await {
                if counter.load(Ordering::SeqCst) != generation {
                    break;
                }
                aggregator.add_links(batch);
                sink.publish(&publish_file, aggregator.get_items());
            }
        });
    }

    /// Patch the caches for one vault event and schedule a debounced header
    /// refresh.
    pub fn handle_vault_event(&mut self, event: &VaultEvent) {
        let vault = Arc::clone(&self.vault);
        let settings = Arc::clone(&self.settings);
        match event {
            VaultEvent::FileCreated { path } => {
                self.periodic.on_file_created(&settings, path);
                self.folder.on_file_created(vault.as_ref(), &settings, path);
                self.reciprocal
                    .on_metadata_changed(vault.as_ref(), &settings, path);
            }
            VaultEvent::FileDeleted { path } => {
                self.periodic.on_file_deleted(&settings, path);
                self.folder.on_file_deleted(&settings, path);
                self.reciprocal.on_file_deleted(path);
                self.pending_invalidations.insert(path.clone());
            }
            VaultEvent::FileRenamed { path, old_path } => {
                self.periodic.on_file_renamed(&settings, path, old_path);
                self.folder
                    .on_file_renamed(vault.as_ref(), &settings, path, old_path);
                self.reciprocal
                    .on_file_renamed(vault.as_ref(), &settings, path, old_path);
                self.pending_invalidations.insert(old_path.clone());
                self.pending_invalidations.insert(path.clone());
            }
            VaultEvent::MetadataChanged { path } => {
                self.folder
                    .on_metadata_changed(vault.as_ref(), &settings, path);
                self.reciprocal
                    .on_metadata_changed(vault.as_ref(), &settings, path);
                self.pending_invalidations.insert(path.clone());
            }
            VaultEvent::FolderCreated { path } => {
                self.folder.on_folder_created(vault.as_ref(), &settings, path);
            }
            VaultEvent::FolderDeleted { path } => {
                self.folder.on_folder_deleted(path);
            }
            VaultEvent::FolderRenamed { path, old_path } => {
                self.folder
                    .on_folder_renamed(vault.as_ref(), &settings, path, old_path);
            }
        }
        self.schedule_refresh();
    }

    /// Push the trailing-edge refresh deadline out by the debounce window.
    pub fn schedule_refresh(&mut self) {
        self.refresh_due = Some(Instant::now() + REFRESH_DEBOUNCE);
    }

    /// Host tick hook: runs the deferred refresh once its window elapses.
    pub fn poll(&mut self) {
        let Some(due) = self.refresh_due else {
            return;
        };
        if Instant::now() < due {
            return;
        }
        self.refresh_due = None;
        if let Some(file) = self.current_file.clone() {
            debug!(file, "debounced header refresh");
            self.update(&file, true);
        }
    }

    /// Swap in a new settings snapshot. Only the caches whose sections
    /// actually changed rebuild; an annotation change also flushes the
    /// scanner's content cache since matching rules moved under it.
    pub fn apply_settings(&mut self, new: NavSettings) {
        let change = self.settings.diff(&new);
        self.settings = Arc::new(new);
        if !change.any() {
            if let Some(file) = self.current_file.clone() {
                self.update(&file, true);
            }
            return;
        }
        let settings = Arc::clone(&self.settings);
        if change.periodic {
            self.periodic.update_entire_cache(self.vault.as_ref(), &settings);
        }
        if change.folders {
            self.folder.rebuild(self.vault.as_ref(), &settings);
        }
        if change.reciprocal {
            self.reciprocal.rebuild(self.vault.as_ref(), &settings);
        }
        if change.annotations {
            // The scanner may be mid-scan; mark every cached file stale and
            // let the next scan drop them under the lock.
            self.pending_invalidations
                .extend(self.vault.all_files());
        }
        if let Some(file) = self.current_file.clone() {
            self.update(&file, true);
        }
    }
}

fn slot(links: Vec<PrefixedLink>, hidden: bool) -> DirectionSlot {
    if hidden {
        DirectionSlot::hidden()
    } else {
        DirectionSlot::visible(links)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{AnnotationSetting, FolderGroup, GranularitySettings, PropertyMapping};
    use crate::vault::MemoryVault;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingSink {
        published: StdMutex<Vec<(String, Vec<HeaderItem>)>>,
    }

    impl HeaderSink for RecordingSink {
        fn publish(&self, file: &str, items: Vec<HeaderItem>) {
            self.published
                .lock()
                .unwrap()
                .push((file.to_string(), items));
        }
    }

    impl RecordingSink {
        fn latest(&self) -> Option<(String, Vec<HeaderItem>)> {
            self.published.lock().unwrap().last().cloned()
        }

        fn count(&self) -> usize {
            self.published.lock().unwrap().len()
        }
    }

    fn daily_settings() -> NavSettings {
        NavSettings {
            periodic: crate::settings::PeriodicSettings {
                day: GranularitySettings {
                    enabled: true,
                    folder: "Daily".into(),
                    format: "%Y-%m-%d".into(),
                    prefix: "📅".into(),
                    ..GranularitySettings::default()
                },
                ..Default::default()
            },
            ..NavSettings::default()
        }
    }

    fn controller_with(
        vault: MemoryVault,
        settings: NavSettings,
    ) -> (HeaderController, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let controller = HeaderController::new(
            Arc::new(vault),
            Arc::clone(&sink) as Arc<dyn HeaderSink>,
            settings,
        );
        (controller, sink)
    }

    #[tokio::test]
    async fn sync_resolvers_publish_immediately() {
        let mut vault = MemoryVault::new();
        vault.add_file("Daily/2024-03-14.md", "");
        vault.add_file("Daily/2024-03-15.md", "");
        vault.add_file("Daily/2024-03-16.md", "");
        let (mut controller, sink) = controller_with(vault, daily_settings());

        controller.update("Daily/2024-03-15.md", false);
        let (file, items) = sink.latest().expect("published");
        assert_eq!(file, "Daily/2024-03-15.md");
        let HeaderItem::ThreeWay(group) = &items[0] else {
            panic!("expected three-way group");
        };
        assert_eq!(group.source, ThreeWaySource::Periodic);
        assert_eq!(group.previous.links[0].link.destination, "Daily/2024-03-14.md");
        assert_eq!(group.next.links[0].link.destination, "Daily/2024-03-16.md");
    }

    #[tokio::test]
    async fn unforced_update_for_same_file_is_noop() {
        let mut vault = MemoryVault::new();
        vault.add_file("Daily/2024-03-15.md", "");
        let (mut controller, sink) = controller_with(vault, daily_settings());

        controller.update("Daily/2024-03-15.md", false);
        let published = sink.count();
        controller.update("Daily/2024-03-15.md", false);
        assert_eq!(sink.count(), published);
        controller.update("Daily/2024-03-15.md", true);
        assert_eq!(sink.count(), published + 1);
    }

    #[tokio::test]
    async fn annotation_batches_republish_growing_list() {
        let mut vault = MemoryVault::new();
        vault.add_file("Target.md", "");
        vault.add_file("Source.md", "📌[[Target]]");
        let settings = NavSettings {
            annotations: vec![AnnotationSetting {
                pattern: "📌".into(),
                prefix: "📌".into(),
                ..AnnotationSetting::default()
            }],
            ..NavSettings::default()
        };
        let (mut controller, sink) = controller_with(vault, settings);

        controller.update("Target.md", false);
        // Let the scan tasks run to completion.
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        let (_, items) = sink.latest().expect("published");
        let annotated = items.iter().any(|item| match item {
            HeaderItem::Links(links) => links
                .iter()
                .any(|l| l.prefix == "📌" && l.link.destination == "Source.md"),
            _ => false,
        });
        assert!(annotated, "scan batch never landed: {items:?}");
        assert!(sink.count() >= 2);
    }

    #[tokio::test]
    async fn vault_event_patches_cache_and_debounces_refresh() {
        tokio::time::pause();
        let mut vault = MemoryVault::new();
        vault.add_file("Daily/2024-03-15.md", "");
        let (mut controller, sink) = controller_with(vault, daily_settings());
        controller.update("Daily/2024-03-15.md", false);
        let published = sink.count();

        controller.handle_vault_event(&VaultEvent::FileCreated {
            path: "Daily/2024-03-16.md".into(),
        });
        controller.poll();
        assert_eq!(sink.count(), published, "refresh ran before the window");

        tokio::time::advance(REFRESH_DEBOUNCE + Duration::from_millis(10)).await;
        controller.poll();
        assert_eq!(sink.count(), published + 1);

        let (_, items) = sink.latest().unwrap();
        let HeaderItem::ThreeWay(group) = &items[0] else {
            panic!("expected three-way group");
        };
        assert_eq!(group.next.links[0].link.destination, "Daily/2024-03-16.md");
    }

    #[tokio::test]
    async fn settings_swap_rebuilds_and_republishes() {
        let mut vault = MemoryVault::new();
        vault.add_file("Projects/a.md", "");
        vault.add_file("Projects/b.md", "");
        let (mut controller, sink) = controller_with(vault, NavSettings::default());
        controller.update("Projects/a.md", false);
        let baseline = sink.latest().unwrap().1;
        assert!(baseline.is_empty());

        let mut next = NavSettings::default();
        next.folder_groups = vec![FolderGroup {
            patterns: vec!["Projects".into()],
            ..FolderGroup::default()
        }];
        controller.apply_settings(next);
        let (_, items) = sink.latest().unwrap();
        let HeaderItem::ThreeWay(group) = &items[0] else {
            panic!("expected folder group");
        };
        assert_eq!(group.source, ThreeWaySource::Folder);
        assert_eq!(group.next.links[0].link.destination, "Projects/b.md");
    }

    #[tokio::test]
    async fn property_links_surface_as_plain_items() {
        let mut vault = MemoryVault::new();
        vault.add_file("note.md", "---\nup: \"[[Index]]\"\n---\n");
        vault.add_file("Index.md", "");
        let settings = NavSettings {
            property_mappings: vec![PropertyMapping {
                property: "up".into(),
                prefix: "⬆".into(),
            }],
            ..NavSettings::default()
        };
        let (mut controller, sink) = controller_with(vault, settings);
        controller.update("note.md", false);
        let (_, items) = sink.latest().unwrap();
        let HeaderItem::Links(links) = &items[0] else {
            panic!("expected links item");
        };
        assert_eq!(links[0].prefix, "⬆");
        assert_eq!(links[0].link.destination, "Index.md");
    }
}
