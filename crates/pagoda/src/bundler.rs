use anyhow::{Context, Result};
use log::{debug, info};
use std::path::PathBuf;

use crate::annotator::{DependencyAnnotator, OxcAnnotator};
use crate::asset_graph::AssetGraph;
use crate::config::Config;
use crate::context::BuildContext;
use crate::entry::EntryEmitter;
use crate::loader::ProjectLoader;
use crate::orchestrator::PackagingOrchestrator;
use crate::packagers::Packagers;
use crate::writer::{FsWriter, StandardTransform};

/// What a finished build produced.
#[derive(Debug)]
pub struct BuildReport {
    pub graph: AssetGraph,
    pub context: BuildContext,
    pub entry: PathBuf,
}

/// Runs a whole build: load the project, package it, emit the entry.
pub struct Bundler {
    config: Config,
    annotator: Box<dyn DependencyAnnotator>,
    packagers: Packagers,
}

impl Bundler {
    pub fn new(config: Config) -> Self {
        let packagers = Packagers::from_config(&config);
        Self {
            config,
            annotator: Box::new(OxcAnnotator),
            packagers,
        }
    }

    /// Swap the sub-packagers, e.g. for a real markup compiler.
    pub fn with_packagers(mut self, packagers: Packagers) -> Self {
        self.packagers = packagers;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Main bundling function
    pub fn bundle(&self) -> Result<BuildReport> {
        info!("Starting bundle process");
        debug!("Project: {:?}, output: {:?}", self.config.project, self.config.out_dir);

        let mut graph = ProjectLoader::new(&self.config.project, &self.config.extensions, self.annotator.as_ref())
            .load()
            .with_context(|| format!("Failed to load project {:?}", self.config.project))?;

        let writer = FsWriter::new(self.config.minify);
        let mut context = BuildContext::new();
        PackagingOrchestrator::new(&self.packagers, &writer, &self.config.out_dir)
            .package(&mut graph, &mut context)?;

        let transform = StandardTransform;
        let entry = EntryEmitter::new(&self.config.out_dir, &transform, self.config.minify)
            .emit(self.config.runtime_dir.as_deref(), &context)?;

        info!("Bundle written to: {:?}", self.config.out_dir);
        Ok(BuildReport { graph, context, entry })
    }
}

impl std::fmt::Debug for Bundler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bundler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
