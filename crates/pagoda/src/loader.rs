//! Building the asset tree from a project directory.
//!
//! A project has an `app.json` listing its pages, plus `app.<ext>` sibling
//! modules. Every page or component is a base path with up to three
//! co-located modules and an optional `<base>.json` whose `usingComponents`
//! maps markup tags to component base paths.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use log::{debug, info, warn};
use serde::Deserialize;

use crate::annotator::DependencyAnnotator;
use crate::asset_graph::{AssetGraph, AssetId, AssetKind, SiblingModules, SourceModule, content_identity};
use crate::config::Extensions;
use crate::error::BuildError;
use crate::util::{normalize_line_endings, normalize_path, project_key, with_extension};

const APP_MANIFEST: &str = "app.json";
const APP_BASE: &str = "app";

#[derive(Debug, Deserialize)]
struct AppManifest {
    pages: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UnitManifest {
    #[serde(default)]
    using_components: IndexMap<String, String>,
}

pub struct ProjectLoader<'a> {
    root: PathBuf,
    extensions: &'a Extensions,
    annotator: &'a dyn DependencyAnnotator,
}

impl<'a> ProjectLoader<'a> {
    pub fn new(root: impl Into<PathBuf>, extensions: &'a Extensions, annotator: &'a dyn DependencyAnnotator) -> Self {
        Self {
            root: root.into(),
            extensions,
            annotator,
        }
    }

    /// Read the whole project into an asset tree.
    pub fn load(&self) -> Result<AssetGraph> {
        let manifest_path = self.root.join(APP_MANIFEST);
        let manifest: AppManifest = serde_json::from_str(&read_source(&manifest_path)?)
            .with_context(|| format!("Failed to parse {:?}", manifest_path))?;

        let mut graph = AssetGraph::new();
        let app_base = PathBuf::from(APP_BASE);
        let app = graph.add_app(
            content_identity(APP_BASE),
            &app_base,
            self.read_siblings(&app_base)?,
        )?;

        for route in &manifest.pages {
            let base = normalize_path(Path::new(route.trim_start_matches('/')));
            let key = project_key(Path::new(""), &base);
            debug!("Loading page {route} from {key}");
            let page = graph.add_child(
                app,
                AssetKind::Page { route: route.clone() },
                content_identity(&key),
                &base,
                self.read_siblings(&base)?,
            )?;
            let mut stack = vec![key];
            self.load_components(&mut graph, page, &base, &mut stack)?;
        }

        info!(
            "Loaded {} assets ({} pages) from {:?}",
            graph.len(),
            manifest.pages.len(),
            self.root
        );
        Ok(graph)
    }

    /// Attach the components `base` declares, recursively.
    ///
    /// `stack` holds the keys from the page down to `base`; a component that
    /// is already on it would make the tree infinite.
    fn load_components(
        &self,
        graph: &mut AssetGraph,
        parent: AssetId,
        base: &Path,
        stack: &mut Vec<String>,
    ) -> Result<()> {
        let manifest = self.read_unit_manifest(base)?;

        for (tag, target) in manifest.using_components {
            let Some(component_base) = self.resolve_component(base, &target) else {
                warn!("{}: skipping component `{tag}` at unsupported location {target}", base.display());
                continue;
            };
            let key = project_key(Path::new(""), &component_base);
            if stack.contains(&key) {
                let mut cycle = stack.clone();
                cycle.push(key.clone());
                return Err(BuildError::structural(
                    content_identity(&key),
                    format!("component cycle: {}", cycle.join(" -> ")),
                )
                .into());
            }

            let siblings = self.read_siblings(&component_base)?;
            if !siblings.has_any() {
                return Err(BuildError::structural(
                    content_identity(&key),
                    format!(
                        "component `{tag}` declared by {} has no modules at {}",
                        base.display(),
                        component_base.display()
                    ),
                )
                .into());
            }

            let component = graph.add_child(
                parent,
                AssetKind::Component { tag },
                content_identity(&key),
                &component_base,
                siblings,
            )?;
            stack.push(key);
            self.load_components(graph, component, &component_base, stack)?;
            stack.pop();
        }
        Ok(())
    }

    /// Project-relative base path of a `usingComponents` target.
    fn resolve_component(&self, declaring: &Path, target: &str) -> Option<PathBuf> {
        if target.contains("://") {
            return None;
        }
        let resolved = match target.strip_prefix('/') {
            Some(absolute) => normalize_path(Path::new(absolute)),
            None => normalize_path(&declaring.parent().unwrap_or(Path::new("")).join(target)),
        };
        (!resolved.starts_with("..")).then_some(resolved)
    }

    fn read_unit_manifest(&self, base: &Path) -> Result<UnitManifest> {
        let path = self.root.join(with_extension(base, "json"));
        if !path.is_file() {
            return Ok(UnitManifest::default());
        }
        serde_json::from_str(&read_source(&path)?).with_context(|| format!("Failed to parse {:?}", path))
    }

    fn read_siblings(&self, base: &Path) -> Result<SiblingModules> {
        let mut siblings = SiblingModules::default();

        let script_path = with_extension(base, &self.extensions.script);
        if let Some(source) = self.read_optional(&script_path)? {
            siblings.script = Some(
                self.annotator
                    .annotate(&script_path, Arc::from(source))
                    .with_context(|| format!("Failed to analyze {:?}", script_path))?,
            );
        }

        let markup_path = with_extension(base, &self.extensions.markup);
        if let Some(source) = self.read_optional(&markup_path)? {
            siblings.markup = Some(SourceModule::new(markup_path, source));
        }

        let style_path = with_extension(base, &self.extensions.style);
        if let Some(source) = self.read_optional(&style_path)? {
            siblings.style = Some(SourceModule::new(style_path, source));
        }

        Ok(siblings)
    }

    fn read_optional(&self, relative: &Path) -> Result<Option<String>> {
        let path = self.root.join(relative);
        if !path.is_file() {
            return Ok(None);
        }
        read_source(&path).map(Some)
    }
}

impl std::fmt::Debug for ProjectLoader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectLoader")
            .field("root", &self.root)
            .field("extensions", &self.extensions)
            .finish_non_exhaustive()
    }
}

fn read_source(path: &Path) -> Result<String> {
    let content = fs::read_to_string(path).map_err(|err| BuildError::io(path, err))?;
    Ok(normalize_line_endings(content))
}
