//! Bottom-up packaging of the asset tree.
//!
//! Components package themselves and hand a list of contributions (their
//! descendants' first, their own last) up to the page that contains them.
//! A page folds those contributions into its bundle once per identity, adds
//! its own output and writes the bundle. The app bundle carries only the
//! app's own script and its unscoped style; it is written after every page.
//!
//! Children of a node are packaged in parallel. Nothing is shared mutably
//! while the tree is walked: results flow back up, and the arena and the
//! [`BuildContext`] are updated after the walk has joined.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indexmap::IndexSet;
use log::{debug, info, trace};
use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::asset_graph::{Asset, AssetGraph, AssetId, AssetKind, ModuleKind, Output};
use crate::context::{BuildContext, BundleRecord, ManifestEntry};
use crate::error::BuildError;
use crate::packagers::{Packagers, registration};
use crate::script_module::ExternalImport;
use crate::writer::{OutputFile, OutputWriter};

/// Final output and dependencies of one node, written back to the arena.
#[derive(Debug)]
struct PackagedAsset {
    id: AssetId,
    output: Output,
    dependencies: IndexSet<ExternalImport>,
}

/// A component's own output, keyed by its identity.
#[derive(Debug, Clone)]
struct Contribution {
    identity: String,
    output: Output,
}

/// Everything a component subtree produced.
#[derive(Debug, Default)]
struct Subtree {
    assets: Vec<PackagedAsset>,
    /// Post-order: descendants first, then the component itself.
    contributions: Vec<Contribution>,
}

#[derive(Debug)]
struct PageBundle {
    assets: Vec<PackagedAsset>,
    record: BundleRecord,
}

pub struct PackagingOrchestrator<'a> {
    packagers: &'a Packagers,
    writer: &'a dyn OutputWriter,
    out_dir: PathBuf,
}

impl<'a> PackagingOrchestrator<'a> {
    pub fn new(packagers: &'a Packagers, writer: &'a dyn OutputWriter, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            packagers,
            writer,
            out_dir: out_dir.into(),
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Package and write every bundle of `graph`.
    ///
    /// On success every asset's `output` and `dependencies` are populated,
    /// the app bundle is recorded as shared runtime code and each page is in
    /// the manifest. On failure, files already written stay on disk.
    pub fn package(&self, graph: &mut AssetGraph, context: &mut BuildContext) -> Result<()> {
        graph.validate()?;
        let Some(root) = graph.root() else {
            return Err(BuildError::structural("<root>", "the tree has no app").into());
        };

        info!("Packaging {} assets into {:?}", graph.len(), self.out_dir);
        let (assets, records) = self.package_app(graph, root)?;

        for PackagedAsset {
            id,
            output,
            dependencies,
        } in assets
        {
            let asset = graph.get_mut(id);
            asset.output = output;
            asset.dependencies = dependencies;
        }
        for record in records {
            context.record(record);
        }

        info!(
            "Packaged {} pages; shared runtime: {:?}",
            context.manifest.len(),
            context.runtime_modules
        );
        Ok(())
    }

    fn package_app(&self, graph: &AssetGraph, root: AssetId) -> Result<(Vec<PackagedAsset>, Vec<BundleRecord>)> {
        let app = graph.get(root);
        let page_ids: Vec<AssetId> = graph.children(root).collect();
        debug!("{}: packaging {} pages", app.describe(), page_ids.len());

        let results: Vec<Result<PageBundle>> = page_ids
            .par_iter()
            .map(|&page| self.package_page(graph, page))
            .collect();
        let pages = results.into_iter().collect::<Result<Vec<_>>>()?;

        let mut output = Output::default();
        let mut dependencies = IndexSet::new();
        if let Some(script) = &app.siblings.script {
            let packaged = self
                .packagers
                .script
                .package(app, script)
                .with_context(|| format!("Failed to package script of {}", app.describe()))?;
            output.script = terminated(packaged.code);
            dependencies = packaged.dependencies;
        }
        if let Some(style) = &app.siblings.style {
            output.style = terminated(style.source.to_string());
        }
        if app.siblings.markup.is_some() {
            debug!("{}: app markup is not bundled", app.describe());
        }

        let mut written = self.write_bundle(app, &output)?;

        let mut assets = Vec::new();
        let mut records = Vec::with_capacity(pages.len() + 2);
        for kind in [ModuleKind::Style, ModuleKind::Script] {
            if let Some(path) = written.remove(&kind) {
                records.push(BundleRecord::Runtime(path));
            }
        }
        for page in pages {
            assets.extend(page.assets);
            records.push(page.record);
        }
        assets.push(PackagedAsset {
            id: root,
            output,
            dependencies,
        });
        Ok((assets, records))
    }

    fn package_page(&self, graph: &AssetGraph, id: AssetId) -> Result<PageBundle> {
        let page = graph.get(id);
        let route = match &page.kind {
            AssetKind::Page { route } => route.clone(),
            AssetKind::App | AssetKind::Component { .. } => {
                return Err(BuildError::structural(
                    &page.identity,
                    format!("{} found where a page was expected", page.kind.label()),
                )
                .into());
            }
        };

        let children = self.package_components(graph, id)?;

        let mut bundle = Output::default();
        let mut emitted: IndexSet<String> = IndexSet::new();
        let mut assets = Vec::new();
        for child in children {
            assets.extend(child.assets);
            for contribution in child.contributions {
                if emitted.insert(contribution.identity.clone()) {
                    bundle.append(&contribution.output);
                } else {
                    trace!(
                        "{}: {} is already registered in this bundle",
                        page.describe(),
                        contribution.identity
                    );
                }
            }
        }

        let own = self.package_own(page)?;
        bundle.append(&own.output);

        let mut written = self.write_bundle(page, &bundle)?;
        debug!(
            "{}: bundled {} components",
            page.describe(),
            emitted.len()
        );

        assets.push(PackagedAsset {
            id,
            output: bundle,
            dependencies: own.dependencies,
        });
        Ok(PageBundle {
            assets,
            record: BundleRecord::Page(ManifestEntry {
                route,
                identity: page.identity.clone(),
                script: written.remove(&ModuleKind::Script),
                style: written.remove(&ModuleKind::Style),
                markup: written.remove(&ModuleKind::Markup),
            }),
        })
    }

    fn package_component(&self, graph: &AssetGraph, id: AssetId) -> Result<Subtree> {
        let component = graph.get(id);
        if !matches!(component.kind, AssetKind::Component { .. }) {
            return Err(BuildError::structural(
                &component.identity,
                format!("{} found where a component was expected", component.kind.label()),
            )
            .into());
        }

        let own = self.package_own(component)?;

        let mut subtree = Subtree::default();
        for child in self.package_components(graph, id)? {
            subtree.assets.extend(child.assets);
            subtree.contributions.extend(child.contributions);
        }
        subtree.contributions.push(Contribution {
            identity: component.identity.clone(),
            output: own.output.clone(),
        });
        subtree.assets.push(own);
        Ok(subtree)
    }

    /// Package every child of `parent` in parallel.
    ///
    /// All children run to completion; the first error in child order wins.
    fn package_components(&self, graph: &AssetGraph, parent: AssetId) -> Result<Vec<Subtree>> {
        let children: Vec<AssetId> = graph.children(parent).collect();
        let results: Vec<Result<Subtree>> = children
            .par_iter()
            .map(|&child| self.package_component(graph, child))
            .collect();
        results.into_iter().collect()
    }

    /// Run the sub-packagers over an asset's own modules.
    fn package_own(&self, asset: &Asset) -> Result<PackagedAsset> {
        let mut output = Output::default();
        let mut dependencies = IndexSet::new();

        if let Some(markup) = &asset.siblings.markup {
            let compiled = self
                .packagers
                .markup
                .compile(asset, markup)
                .with_context(|| format!("Failed to compile markup of {}", asset.describe()))?;
            output.markup = registration(asset, &compiled);
        }
        if let Some(script) = &asset.siblings.script {
            let packaged = self
                .packagers
                .script
                .package(asset, script)
                .with_context(|| format!("Failed to package script of {}", asset.describe()))?;
            output.script = terminated(packaged.code);
            dependencies = packaged.dependencies;
        }
        if let Some(style) = &asset.siblings.style {
            let scoped = self
                .packagers
                .style
                .package(asset, style)
                .with_context(|| format!("Failed to package style of {}", asset.describe()))?;
            output.style = terminated(scoped);
        }

        Ok(PackagedAsset {
            id: asset.id,
            output,
            dependencies,
        })
    }

    /// Write every non-empty slot of `output`, returning the written paths
    /// relative to the output directory.
    fn write_bundle(&self, asset: &Asset, output: &Output) -> Result<FxHashMap<ModuleKind, PathBuf>> {
        let mut written = FxHashMap::default();
        for kind in ModuleKind::ALL {
            let content = output.get(kind);
            if content.is_empty() {
                continue;
            }
            let file = OutputFile::for_bundle(&self.out_dir, &asset.identity, kind, content.to_owned());
            self.writer
                .write(&file)
                .with_context(|| format!("Failed to write {kind} bundle of {}", asset.describe()))?;
            let relative = file.path.strip_prefix(&self.out_dir).unwrap_or(&file.path);
            written.insert(kind, relative.to_path_buf());
        }
        Ok(written)
    }
}

impl std::fmt::Debug for PackagingOrchestrator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackagingOrchestrator")
            .field("out_dir", &self.out_dir)
            .finish_non_exhaustive()
    }
}

/// Make sure non-empty code ends with a newline before it is concatenated.
fn terminated(mut code: String) -> String {
    if !code.is_empty() && !code.ends_with('\n') {
        code.push('\n');
    }
    code
}
