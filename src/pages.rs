use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::constants::{get_builtin_pages, page_name_to_id, PAGES_DIR_ENV};
use crate::error::ConfigError;

/// Where a page's configuration comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageSource {
    Builtin(&'static str),
    File(PathBuf),
}

/// Registry of named page configurations
pub struct PageRegistry {
    pages: HashMap<String, PageSource>,
}

impl Default for PageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PageRegistry {
    /// Create a registry holding the built-in pages
    pub fn new() -> Self {
        let mut pages = HashMap::new();
        for (id, preset) in get_builtin_pages() {
            pages.insert(id.to_string(), PageSource::Builtin(preset));
        }
        Self { pages }
    }

    /// Built-in pages plus every `*.toml` file in `dir`, keyed by file stem.
    /// A file named like a built-in page replaces it.
    pub fn with_dir(dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let dir = dir.as_ref();
        let mut registry = Self::new();
        let entries = fs::read_dir(dir).map_err(|e| ConfigError::Io {
            path: dir.display().to_string(),
            source: e,
        })?;
        for entry in entries {
            let path = entry
                .map_err(|e| ConfigError::Io {
                    path: dir.display().to_string(),
                    source: e,
                })?
                .path();
            if path.extension().and_then(|e| e.to_str()) != Some("toml") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let id = page_name_to_id(stem);
            debug!("Registering page {} from {}", id, path.display());
            registry.register(id, PageSource::File(path));
        }
        Ok(registry)
    }

    /// Built-in pages, plus the directory named by `XENERGY_PAGES_DIR` if set
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var(PAGES_DIR_ENV) {
            Ok(dir) if !dir.trim().is_empty() => {
                info!("Loading extra pages from {}", dir);
                Self::with_dir(dir)
            }
            _ => Ok(Self::new()),
        }
    }

    /// Register a page, replacing any page with the same id
    pub fn register(&mut self, id: String, source: PageSource) {
        self.pages.insert(id, source);
    }

    pub fn get(&self, name: &str) -> Option<&PageSource> {
        self.pages.get(&page_name_to_id(name))
    }

    /// All registered page ids, sorted
    pub fn list(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.pages.keys().map(|k| k.as_str()).collect();
        ids.sort_unstable();
        ids
    }

    /// Parse the configuration of a registered page
    pub fn load(&self, name: &str) -> Result<PipelineConfig, ConfigError> {
        match self.get(name) {
            Some(PageSource::Builtin(preset)) => PipelineConfig::from_toml_str(preset),
            Some(PageSource::File(path)) => PipelineConfig::load(path),
            None => Err(ConfigError::UnknownPage(name.to_string())),
        }
    }
}
