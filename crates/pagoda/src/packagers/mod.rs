//! Per-module sub-packagers.
//!
//! Each co-located module kind has a packager turning the module into the
//! asset's contribution to its bundle. The orchestrator only sees the traits;
//! the defaults here are what the CLI wires up.

pub mod scoped_css;

use anyhow::{Context, Result};
use indexmap::IndexSet;
use log::{debug, log_enabled};

use crate::assembler::assemble;
use crate::asset_graph::{Asset, AssetKind, ModuleKind, SourceModule};
use crate::config::Config;
use crate::error::BuildError;
use crate::js_globals::KnownGlobals;
use crate::script_module::{ExternalImport, ScriptModule};
use crate::tree_shaking::{SelectOptions, SelectionMode, diverging_statements, select_recorded};

/// Code produced from a script module together with the imports it keeps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackagedScript {
    pub code: String,
    pub dependencies: IndexSet<ExternalImport>,
}

pub trait ScriptPackager: Send + Sync {
    fn package(&self, asset: &Asset, module: &ScriptModule) -> Result<PackagedScript>;
}

pub trait MarkupPackager: Send + Sync {
    /// Compile a markup module into a JS expression producing its renderer.
    fn compile(&self, asset: &Asset, markup: &SourceModule) -> Result<String>;
}

pub trait StylePackager: Send + Sync {
    fn package(&self, asset: &Asset, style: &SourceModule) -> Result<String>;
}

/// Tree-shakes a script module and concatenates what is left.
#[derive(Debug, Clone, Default)]
pub struct TreeShakingScriptPackager {
    pub mode: SelectionMode,
    pub globals: KnownGlobals,
}

impl ScriptPackager for TreeShakingScriptPackager {
    fn package(&self, asset: &Asset, module: &ScriptModule) -> Result<PackagedScript> {
        let options = SelectOptions {
            mode: self.mode,
            globals: &self.globals,
        };
        let selection = select_recorded(module, &options)
            .with_context(|| format!("Failed to select statements of {}", asset.describe()))?;

        if self.mode == SelectionMode::Unconditional && log_enabled!(log::Level::Debug) {
            let diverging = diverging_statements(module);
            if !diverging.is_empty() {
                debug!(
                    "{}: unconditional inclusion keeps statements {:?} that reachability would drop",
                    module.label(),
                    diverging
                );
            }
        }

        Ok(PackagedScript {
            code: assemble(module, &selection.statements),
            dependencies: selection.external.clone(),
        })
    }
}

/// Embeds the markup verbatim as a string returned by the renderer.
///
/// Template compilation proper belongs to the framework runtime; this keeps
/// the bundle layout intact without it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LiteralMarkupPackager;

impl MarkupPackager for LiteralMarkupPackager {
    fn compile(&self, asset: &Asset, markup: &SourceModule) -> Result<String> {
        let literal = serde_json::to_string(&*markup.source).map_err(|err| BuildError::ExternalTool {
            tool: "markup compiler",
            identity: asset.identity.clone(),
            kind: ModuleKind::Markup,
            message: err.to_string(),
        })?;
        Ok(format!("() => {literal}"))
    }
}

/// Scopes every selector to the owning asset.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScopedStylePackager;

impl StylePackager for ScopedStylePackager {
    fn package(&self, asset: &Asset, style: &SourceModule) -> Result<String> {
        Ok(scoped_css::scope_stylesheet(&style.source, &asset.identity))
    }
}

/// Statement binding compiled markup for `asset` into the bundle.
///
/// Pages bind a `$<identity>` constant; components register themselves in
/// the shared `remotes` table under their identity.
pub fn registration(asset: &Asset, compiled: &str) -> String {
    match &asset.kind {
        AssetKind::Page { .. } => format!("const ${} = {compiled}\n\n", asset.identity),
        AssetKind::Component { .. } => format!("remotes['{}'] = {compiled}\n\n", asset.identity),
        AssetKind::App => format!("{compiled}\n\n"),
    }
}

/// The three packagers used for a build.
pub struct Packagers {
    pub script: Box<dyn ScriptPackager>,
    pub markup: Box<dyn MarkupPackager>,
    pub style: Box<dyn StylePackager>,
}

impl Packagers {
    pub fn from_config(config: &Config) -> Self {
        let mode = if config.tree_shaking {
            SelectionMode::Reachability
        } else {
            SelectionMode::Unconditional
        };
        Self {
            script: Box::new(TreeShakingScriptPackager {
                mode,
                globals: KnownGlobals::with_extra(config.known_globals.iter().cloned()),
            }),
            markup: Box::new(LiteralMarkupPackager),
            style: Box::new(ScopedStylePackager),
        }
    }
}

impl Default for Packagers {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl std::fmt::Debug for Packagers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Packagers").finish_non_exhaustive()
    }
}
