//! Build-wide accumulators filled once packaging has joined.

use std::path::PathBuf;

use indexmap::IndexMap;
use serde::Serialize;

/// What a bundle-producing node reports back after it has been written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleRecord {
    /// A file of the app bundle, loaded before any page.
    Runtime(PathBuf),
    Page(ManifestEntry),
}

/// One page in the manifest. Paths are relative to the output directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    pub route: String,
    pub identity: String,
    pub script: Option<PathBuf>,
    pub style: Option<PathBuf>,
    pub markup: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct BuildContext {
    /// App bundle files every page loads before its own, in load order,
    /// relative to the output directory.
    pub runtime_modules: Vec<PathBuf>,
    /// Route -> page entry, in app declaration order.
    pub manifest: IndexMap<String, ManifestEntry>,
}

impl BuildContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, record: BundleRecord) {
        match record {
            BundleRecord::Runtime(path) => {
                if !self.runtime_modules.contains(&path) {
                    self.runtime_modules.push(path);
                }
            }
            BundleRecord::Page(entry) => {
                self.manifest.insert(entry.route.clone(), entry);
            }
        }
    }

    /// The manifest as JSON, keyed by route.
    pub fn manifest_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.manifest)
    }
}
