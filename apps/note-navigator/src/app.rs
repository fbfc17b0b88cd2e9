//! Application state and logic.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent};
use nav_core::{HeaderController, HeaderItem, HeaderSink, NavSettings, Vault};
use tracing::warn;

use crate::config::Config;
use crate::storage::FsVault;

/// Sink the controller publishes into; the draw loop reads the latest list.
#[derive(Default)]
pub struct SharedHeader {
    items: Mutex<Vec<HeaderItem>>,
}

impl SharedHeader {
    pub fn snapshot(&self) -> Vec<HeaderItem> {
        self.items.lock().expect("header lock").clone()
    }
}

impl HeaderSink for SharedHeader {
    fn publish(&self, _file: &str, items: Vec<HeaderItem>) {
        *self.items.lock().expect("header lock") = items;
    }
}

pub struct App {
    pub config: Config,
    pub vault: Arc<FsVault>,
    pub controller: HeaderController,
    pub header: Arc<SharedHeader>,
    pub files: Vec<String>,
    pub selected_index: usize,
    pub current_file: Option<String>,
    pub message: Option<String>,
    pub show_help: bool,
}

impl App {
    pub fn new() -> Result<Self> {
        let config = Config::load();
        let vault = Arc::new(FsVault::open(config.vault_root.clone())?);
        let settings = load_settings(&config);
        let header = Arc::new(SharedHeader::default());
        let controller = HeaderController::new(
            Arc::clone(&vault) as Arc<dyn Vault + Send + Sync>,
            Arc::clone(&header) as Arc<dyn HeaderSink>,
            settings,
        );
        let files = vault.all_files();

        Ok(Self {
            config,
            vault,
            controller,
            header,
            files,
            selected_index: 0,
            current_file: None,
            message: None,
            show_help: false,
        })
    }

    pub fn can_quit(&self) -> bool {
        !self.show_help
    }

    /// Called once per draw-loop iteration; runs any due debounced refresh.
    pub fn tick(&mut self) {
        self.controller.poll();
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        self.message = None;

        if self.show_help {
            self.show_help = false;
            return;
        }

        match key.code {
            KeyCode::Char('j') | KeyCode::Down => self.select_next(),
            KeyCode::Char('k') | KeyCode::Up => self.select_previous(),
            KeyCode::Char('g') => self.selected_index = 0,
            KeyCode::Char('G') => {
                self.selected_index = self.files.len().saturating_sub(1);
            }
            KeyCode::Enter => self.open_selected(),
            KeyCode::Char('r') => self.refresh_vault(),
            KeyCode::Char('?') => self.show_help = true,
            _ => {}
        }
    }

    fn select_next(&mut self) {
        if self.selected_index + 1 < self.files.len() {
            self.selected_index += 1;
        }
    }

    fn select_previous(&mut self) {
        self.selected_index = self.selected_index.saturating_sub(1);
    }

    fn open_selected(&mut self) {
        let Some(file) = self.files.get(self.selected_index).cloned() else {
            return;
        };
        self.current_file = Some(file.clone());
        self.controller.update(&file, false);
    }

    fn refresh_vault(&mut self) {
        match self.vault.refresh() {
            Ok(events) => {
                let count = events.len();
                for event in &events {
                    self.controller.handle_vault_event(event);
                }
                self.files = self.vault.all_files();
                if self.selected_index >= self.files.len() && !self.files.is_empty() {
                    self.selected_index = self.files.len() - 1;
                }
                self.message = Some(format!("refreshed, {count} changes"));
            }
            Err(err) => {
                warn!(%err, "vault refresh failed");
                self.message = Some(format!("refresh failed: {err}"));
            }
        }
    }

    pub fn preview(&self) -> String {
        self.current_file
            .as_deref()
            .and_then(|file| self.vault.read_text(file))
            .unwrap_or_default()
    }
}

fn load_settings(config: &Config) -> NavSettings {
    let path = config.settings_path();
    match std::fs::read_to_string(&path) {
        Ok(json) => match NavSettings::load(&json) {
            Ok(settings) => settings,
            Err(err) => {
                warn!(path = %path.display(), %err, "settings unreadable, using defaults");
                NavSettings::default()
            }
        },
        Err(_) => NavSettings::default(),
    }
}
