//! Annotated script modules.
//!
//! A `ScriptModule` is the parsed form of one script file: its immutable
//! source buffer plus every top-level statement, each annotated with the names
//! it defines and the free names it depends on. Annotation is done by a
//! [`DependencyAnnotator`](crate::annotator::DependencyAnnotator); everything
//! downstream works on byte ranges into `source` and never re-parses.

use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use once_cell::sync::OnceCell;

use crate::asset_graph::content_identity;
use crate::tree_shaking::Selection;
use crate::util::project_key;

/// Syntactic category of a top-level statement, as far as selection and
/// assembly care about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// `import … from '…'`, `export … from '…'`: cross-module linkage only.
    Import,
    /// `export <declaration>` or `export default` of a named function or
    /// class. The wrapped declaration begins at `declaration_start` (byte
    /// offset into the source).
    ExportWrapper { declaration_start: usize },
    /// `export default` of an expression or an anonymous function or class.
    /// The value begins at `expression_start` and is emitted bound to
    /// [`ScriptModule::default_binding`].
    DefaultExpression { expression_start: usize },
    /// `export { a, b as c }` without a source: marks names as exported.
    ExportList,
    /// Any other statement.
    Plain,
}

impl StatementKind {
    /// Whether statements of this kind can ever appear in emitted code.
    pub const fn is_emittable(self) -> bool {
        matches!(self, Self::ExportWrapper { .. } | Self::DefaultExpression { .. } | Self::Plain)
    }
}

/// One top-level statement with its dependency annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    /// Position within `ScriptModule::statements`.
    pub index: usize,
    pub kind: StatementKind,
    /// Byte range of the whole statement in the module source.
    pub span: Range<usize>,
    /// Top-level bindings introduced by this statement.
    pub defines: IndexSet<String>,
    /// Free names this statement reads (module-level bindings or globals).
    pub depends: IndexSet<String>,
}

impl Statement {
    pub fn new(index: usize, kind: StatementKind, span: Range<usize>) -> Self {
        Self {
            index,
            kind,
            span,
            defines: IndexSet::new(),
            depends: IndexSet::new(),
        }
    }

    #[must_use]
    pub fn with_defines<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.defines.extend(names.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_depends<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends.extend(names.into_iter().map(Into::into));
        self
    }
}

/// A binding introduced by an import declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImportBinding {
    /// Name exported by the source module (`default` and `*` included).
    pub imported: String,
    /// Module specifier as written.
    pub source: String,
}

/// An import binding that a live statement actually uses.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExternalImport {
    pub local: String,
    pub binding: ImportBinding,
}

#[derive(Debug)]
pub struct ScriptModule {
    pub path: PathBuf,
    pub source: Arc<str>,
    pub statements: Vec<Statement>,
    /// Local binding name -> where it comes from.
    pub imports: IndexMap<String, ImportBinding>,
    /// Exported name -> index of the statement that defines it.
    pub exports: IndexMap<String, usize>,
    selected: OnceCell<Selection>,
}

impl ScriptModule {
    pub fn new(path: impl Into<PathBuf>, source: impl Into<Arc<str>>) -> Self {
        Self {
            path: path.into(),
            source: source.into(),
            statements: Vec::new(),
            imports: IndexMap::new(),
            exports: IndexMap::new(),
            selected: OnceCell::new(),
        }
    }

    /// Append a statement, fixing up its index.
    pub fn push_statement(&mut self, mut statement: Statement) -> usize {
        let index = self.statements.len();
        statement.index = index;
        self.statements.push(statement);
        index
    }

    pub fn add_import(&mut self, local: impl Into<String>, binding: ImportBinding) {
        self.imports.insert(local.into(), binding);
    }

    pub fn add_export(&mut self, exported: impl Into<String>, statement: usize) {
        self.exports.insert(exported.into(), statement);
    }

    /// Source text of a statement, verbatim.
    pub fn text(&self, statement: &Statement) -> &str {
        &self.source[statement.span.clone()]
    }

    /// Top-level name that holds the value of an anonymous default export.
    ///
    /// Derived from the module path so modules concatenated into one bundle
    /// never share it.
    pub fn default_binding(&self) -> String {
        format!("__default_{}", content_identity(&project_key(Path::new(""), &self.path)))
    }

    /// Label used in diagnostics.
    pub fn label(&self) -> String {
        self.path.display().to_string()
    }

    /// The selection, if one has been recorded.
    pub fn selected(&self) -> Option<&Selection> {
        self.selected.get()
    }

    /// Record the selection. The first recorded selection wins; later calls
    /// return the one already stored.
    pub fn record_selection(&self, selection: Selection) -> &Selection {
        self.selected.get_or_init(|| selection)
    }
}
