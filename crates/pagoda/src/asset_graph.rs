//! The asset tree: one app at the root, pages below it, components below
//! pages and other components.
//!
//! Nodes live in an arena owned by [`AssetGraph`] and are addressed by
//! [`AssetId`]. A parent owns its children through the `children` map; the
//! `parent` field is a plain index used for upward lookups only.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use indexmap::{IndexMap, IndexSet};
use log::debug;
use rustc_hash::FxHashMap;
use sha2::{Digest, Sha256};

use crate::error::BuildError;
use crate::script_module::{ExternalImport, ScriptModule};

/// Number of hex characters kept from the SHA-256 digest for identities.
const IDENTITY_LEN: usize = 16;

/// Unique identifier for an asset node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetId(u32);

impl AssetId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// Kind of a co-located module, which is also the kind of an output slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleKind {
    Script,
    Markup,
    Style,
}

impl ModuleKind {
    pub const ALL: [Self; 3] = [Self::Script, Self::Style, Self::Markup];

    /// File extension of the written bundle.
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Script => "js",
            Self::Style => "css",
            Self::Markup => "jsx",
        }
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Script => "script",
            Self::Markup => "markup",
            Self::Style => "style",
        })
    }
}

/// A markup or style module: only its text matters to the core.
#[derive(Debug, Clone)]
pub struct SourceModule {
    pub path: PathBuf,
    pub source: Arc<str>,
}

impl SourceModule {
    pub fn new(path: impl Into<PathBuf>, source: impl Into<Arc<str>>) -> Self {
        Self {
            path: path.into(),
            source: source.into(),
        }
    }
}

/// Modules co-located with an asset, at most one per kind.
#[derive(Debug, Default)]
pub struct SiblingModules {
    pub script: Option<ScriptModule>,
    pub markup: Option<SourceModule>,
    pub style: Option<SourceModule>,
}

impl SiblingModules {
    pub fn has(&self, kind: ModuleKind) -> bool {
        match kind {
            ModuleKind::Script => self.script.is_some(),
            ModuleKind::Markup => self.markup.is_some(),
            ModuleKind::Style => self.style.is_some(),
        }
    }

    pub fn has_any(&self) -> bool {
        ModuleKind::ALL.into_iter().any(|kind| self.has(kind))
    }
}

/// Asset kind together with the data its composition rule needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetKind {
    /// The tree root and the shared bundle.
    App,
    /// A routable page; `route` is the path the app declares it under.
    Page { route: String },
    /// A reusable component; `tag` is the name its parent uses in markup.
    Component { tag: String },
}

impl AssetKind {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::App => "app",
            Self::Page { .. } => "page",
            Self::Component { .. } => "component",
        }
    }

    /// App and page nodes each produce one bundle.
    pub const fn is_bundle(&self) -> bool {
        matches!(self, Self::App | Self::Page { .. })
    }
}

/// Per-kind output accumulator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Output {
    pub script: String,
    pub style: String,
    pub markup: String,
}

impl Output {
    pub fn get(&self, kind: ModuleKind) -> &str {
        match kind {
            ModuleKind::Script => &self.script,
            ModuleKind::Style => &self.style,
            ModuleKind::Markup => &self.markup,
        }
    }

    pub fn slot_mut(&mut self, kind: ModuleKind) -> &mut String {
        match kind {
            ModuleKind::Script => &mut self.script,
            ModuleKind::Style => &mut self.style,
            ModuleKind::Markup => &mut self.markup,
        }
    }

    /// Append every slot of `other` to the matching slot of `self`.
    pub fn append(&mut self, other: &Self) {
        for kind in ModuleKind::ALL {
            self.slot_mut(kind).push_str(other.get(kind));
        }
    }

    pub fn is_empty(&self) -> bool {
        ModuleKind::ALL.iter().all(|&kind| self.get(kind).is_empty())
    }
}

#[derive(Debug)]
pub struct Asset {
    pub id: AssetId,
    pub kind: AssetKind,
    pub identity: String,
    /// Project-relative base path, for diagnostics.
    pub path: PathBuf,
    pub siblings: SiblingModules,
    /// Child identity -> child node, in declaration order.
    pub children: IndexMap<String, AssetId>,
    pub parent: Option<AssetId>,
    pub output: Output,
    /// Import bindings that the selected script statements use.
    pub dependencies: IndexSet<ExternalImport>,
}

impl Asset {
    pub fn describe(&self) -> String {
        format!("{} {} ({})", self.kind.label(), self.identity, self.path.display())
    }
}

/// Arena holding every asset of a build.
#[derive(Debug, Default)]
pub struct AssetGraph {
    nodes: Vec<Asset>,
    root: Option<AssetId>,
}

impl AssetGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the root app node.
    pub fn add_app(
        &mut self,
        identity: impl Into<String>,
        path: impl Into<PathBuf>,
        siblings: SiblingModules,
    ) -> Result<AssetId> {
        let identity = identity.into();
        if self.root.is_some() {
            return Err(BuildError::structural(identity, "a tree has exactly one app").into());
        }
        let id = self.push(AssetKind::App, identity, path.into(), siblings, None);
        self.root = Some(id);
        Ok(id)
    }

    /// Attach a page or component under `parent`.
    ///
    /// A component identity that is already registered under the same parent
    /// resolves to the existing node. A repeated page is a structural error.
    pub fn add_child(
        &mut self,
        parent: AssetId,
        kind: AssetKind,
        identity: impl Into<String>,
        path: impl Into<PathBuf>,
        siblings: SiblingModules,
    ) -> Result<AssetId> {
        let identity = identity.into();
        if kind == AssetKind::App {
            return Err(BuildError::structural(identity, "an app cannot have a parent").into());
        }
        let Some(parent_node) = self.nodes.get(parent.as_usize()) else {
            return Err(BuildError::structural(identity, format!("unknown parent {parent:?}")).into());
        };
        if let Some(&existing) = parent_node.children.get(&identity) {
            if kind.is_bundle() {
                return Err(BuildError::structural(
                    identity,
                    format!("duplicate {} under {}", kind.label(), parent_node.identity),
                )
                .into());
            }
            debug!(
                "{} registers {} more than once; reusing the existing node",
                parent_node.identity, identity
            );
            return Ok(existing);
        }

        let id = self.push(kind, identity.clone(), path.into(), siblings, Some(parent));
        self.nodes[parent.as_usize()].children.insert(identity, id);
        Ok(id)
    }

    fn push(
        &mut self,
        kind: AssetKind,
        identity: String,
        path: PathBuf,
        siblings: SiblingModules,
        parent: Option<AssetId>,
    ) -> AssetId {
        let id = AssetId::new(self.nodes.len() as u32);
        self.nodes.push(Asset {
            id,
            kind,
            identity,
            path,
            siblings,
            children: IndexMap::new(),
            parent,
            output: Output::default(),
            dependencies: IndexSet::new(),
        });
        id
    }

    pub fn root(&self) -> Option<AssetId> {
        self.root
    }

    pub fn get(&self, id: AssetId) -> &Asset {
        &self.nodes[id.as_usize()]
    }

    pub fn get_mut(&mut self, id: AssetId) -> &mut Asset {
        &mut self.nodes[id.as_usize()]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Asset> {
        self.nodes.iter()
    }

    /// Children of `id` in declaration order.
    pub fn children(&self, id: AssetId) -> impl Iterator<Item = AssetId> + '_ {
        self.get(id).children.values().copied()
    }

    /// Check the tree invariants that packaging relies on.
    pub fn validate(&self) -> Result<()> {
        let Some(root) = self.root else {
            return Err(BuildError::structural("<root>", "the tree has no app").into());
        };

        let mut bundles: FxHashMap<&str, AssetId> = FxHashMap::default();
        for asset in &self.nodes {
            let parent_kind = asset.parent.map(|parent| &self.get(parent).kind);
            match (&asset.kind, parent_kind) {
                (AssetKind::App, None) if asset.id == root => {}
                (AssetKind::Page { .. }, Some(AssetKind::App)) => {
                    if asset.siblings.markup.is_none() {
                        return Err(BuildError::structural(
                            &asset.identity,
                            format!("page {} has no markup module", asset.path.display()),
                        )
                        .into());
                    }
                }
                (AssetKind::Component { .. }, Some(AssetKind::Page { .. } | AssetKind::Component { .. })) => {}
                (kind, parent) => {
                    return Err(BuildError::structural(
                        &asset.identity,
                        format!(
                            "{} cannot be placed under {}",
                            kind.label(),
                            parent.map_or("nothing", AssetKind::label)
                        ),
                    )
                    .into());
                }
            }

            if asset.kind.is_bundle() {
                if let Some(previous) = bundles.insert(&asset.identity, asset.id) {
                    return Err(BuildError::structural(
                        &asset.identity,
                        format!(
                            "duplicate bundle identity shared by {} and {}",
                            self.get(previous).path.display(),
                            asset.path.display()
                        ),
                    )
                    .into());
                }
            }
        }
        Ok(())
    }
}

/// Content-addressed identity for a project-relative key.
pub fn content_identity(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..IDENTITY_LEN].to_owned()
}
