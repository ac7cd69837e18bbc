//! Dependency annotation of script modules.
//!
//! The annotator parses a script, runs scope analysis over it and records,
//! for every top-level statement, the root-scope bindings it declares and the
//! free names it references. Everything after this step works on the
//! annotated [`ScriptModule`] only.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use indexmap::IndexSet;
use log::trace;
use oxc_allocator::Allocator;
use oxc_ast::ast::{
    ExportDefaultDeclarationKind, IdentifierReference, ImportDeclarationSpecifier,
    Statement as AstStatement,
};
use oxc_ast_visit::Visit;
use oxc_parser::Parser;
use oxc_semantic::{Scoping, SemanticBuilder};
use oxc_span::{GetSpan, SourceType};
use oxc_syntax::scope::ScopeId;

use crate::asset_graph::ModuleKind;
use crate::error::BuildError;
use crate::script_module::{ImportBinding, ScriptModule, Statement, StatementKind};

/// Turns script source into an annotated [`ScriptModule`].
pub trait DependencyAnnotator: Send + Sync {
    fn annotate(&self, path: &Path, source: Arc<str>) -> Result<ScriptModule>;
}

/// Annotator backed by the oxc parser and semantic analysis.
#[derive(Debug, Default, Clone, Copy)]
pub struct OxcAnnotator;

/// How a statement exports what it declares.
enum ExportShape {
    None,
    /// `export <declaration>`: every declared name is exported as itself.
    Named,
    /// `export default …`
    Default,
    /// `export { local as exported, … }`
    List(Vec<(String, String)>),
}

impl DependencyAnnotator for OxcAnnotator {
    fn annotate(&self, path: &Path, source: Arc<str>) -> Result<ScriptModule> {
        let allocator = Allocator::default();
        let source_type = SourceType::default().with_module(true).with_jsx(true);
        let parsed = Parser::new(&allocator, &source, source_type).parse();
        if !parsed.errors.is_empty() {
            return Err(tool_error(path, "parser", parsed.errors.iter()));
        }
        let program = parsed.program;

        let semantic = SemanticBuilder::new().build(&program);
        if !semantic.errors.is_empty() {
            return Err(tool_error(path, "scope analysis", semantic.errors.iter()));
        }
        let scoping = semantic.semantic.scoping();

        let mut module = ScriptModule::new(path, Arc::clone(&source));
        let mut shapes = Vec::with_capacity(program.body.len());

        for ast_statement in &program.body {
            let span = ast_statement.span();
            let range = span.start as usize..span.end as usize;

            let mut collector = FreeNameCollector::new(scoping);
            collector.visit_statement(ast_statement);

            let (kind, shape) = classify(ast_statement, &mut module, &mut collector.names);
            let statement = Statement {
                index: 0,
                kind,
                span: range,
                defines: IndexSet::new(),
                depends: collector.names,
            };
            module.push_statement(statement);
            shapes.push(shape);
        }

        assign_root_bindings(&mut module, scoping);
        record_exports(&mut module, shapes);

        trace!(
            "{}: {} statements, {} imports, {} exports",
            module.label(),
            module.statements.len(),
            module.imports.len(),
            module.exports.len()
        );
        Ok(module)
    }
}

fn tool_error<I, D>(path: &Path, tool: &'static str, errors: I) -> anyhow::Error
where
    I: Iterator<Item = D>,
    D: std::fmt::Display,
{
    let message = errors.map(|error| error.to_string()).collect::<Vec<_>>().join("; ");
    BuildError::ExternalTool {
        tool,
        identity: path.display().to_string(),
        kind: ModuleKind::Script,
        message,
    }
    .into()
}

/// Decide the statement kind and record import bindings.
fn classify(
    ast_statement: &AstStatement<'_>,
    module: &mut ScriptModule,
    depends: &mut IndexSet<String>,
) -> (StatementKind, ExportShape) {
    match ast_statement {
        AstStatement::ImportDeclaration(decl) => {
            let source = decl.source.value.to_string();
            let Some(specifiers) = &decl.specifiers else {
                return (StatementKind::Import, ExportShape::None);
            };
            for specifier in specifiers.iter() {
                let (local, imported) = match specifier {
                    ImportDeclarationSpecifier::ImportSpecifier(spec) => {
                        (spec.local.name.to_string(), spec.imported.name().to_string())
                    }
                    ImportDeclarationSpecifier::ImportDefaultSpecifier(spec) => {
                        (spec.local.name.to_string(), "default".to_owned())
                    }
                    ImportDeclarationSpecifier::ImportNamespaceSpecifier(spec) => {
                        (spec.local.name.to_string(), "*".to_owned())
                    }
                };
                module.add_import(
                    local,
                    ImportBinding {
                        imported,
                        source: source.clone(),
                    },
                );
            }
            (StatementKind::Import, ExportShape::None)
        }
        AstStatement::ExportAllDeclaration(_) => (StatementKind::Import, ExportShape::None),
        AstStatement::ExportNamedDeclaration(decl) if decl.source.is_some() => {
            (StatementKind::Import, ExportShape::None)
        }
        AstStatement::ExportNamedDeclaration(decl) => match &decl.declaration {
            Some(declaration) => (
                StatementKind::ExportWrapper {
                    declaration_start: declaration.span().start as usize,
                },
                ExportShape::Named,
            ),
            None => {
                let pairs = decl
                    .specifiers
                    .iter()
                    .map(|specifier| {
                        let local = specifier.local.name().to_string();
                        depends.insert(local.clone());
                        (local, specifier.exported.name().to_string())
                    })
                    .collect();
                (StatementKind::ExportList, ExportShape::List(pairs))
            }
        },
        AstStatement::ExportDefaultDeclaration(decl) => {
            let start = decl.declaration.span().start as usize;
            let named = match &decl.declaration {
                ExportDefaultDeclarationKind::FunctionDeclaration(function) => function.id.is_some(),
                ExportDefaultDeclarationKind::ClassDeclaration(class) => class.id.is_some(),
                _ => false,
            };
            let kind = if named {
                StatementKind::ExportWrapper {
                    declaration_start: start,
                }
            } else {
                // Anonymous values get a module-unique binding from the assembler
                StatementKind::DefaultExpression {
                    expression_start: start,
                }
            };
            (kind, ExportShape::Default)
        }
        _ => (StatementKind::Plain, ExportShape::None),
    }
}

/// Attribute every root-scope binding to the top-level statement declaring it.
fn assign_root_bindings(module: &mut ScriptModule, scoping: &Scoping) {
    let root = scoping.root_scope_id();
    let starts: Vec<usize> = module.statements.iter().map(|s| s.span.start).collect();

    for symbol in scoping.symbol_ids() {
        if scoping.symbol_scope_id(symbol) != root {
            continue;
        }
        let offset = scoping.symbol_span(symbol).start as usize;
        let Some(index) = containing_statement(&starts, &module.statements, offset) else {
            continue;
        };
        let statement = &mut module.statements[index];
        if statement.kind != StatementKind::Import {
            statement.defines.insert(scoping.symbol_name(symbol).to_owned());
        }
    }
}

fn containing_statement(starts: &[usize], statements: &[Statement], offset: usize) -> Option<usize> {
    let index = starts.partition_point(|&start| start <= offset).checked_sub(1)?;
    statements[index].span.contains(&offset).then_some(index)
}

fn record_exports(module: &mut ScriptModule, shapes: Vec<ExportShape>) {
    for (index, shape) in shapes.into_iter().enumerate() {
        match shape {
            ExportShape::None => {}
            ExportShape::Named => {
                let names: Vec<String> = module.statements[index].defines.iter().cloned().collect();
                for name in names {
                    module.add_export(name, index);
                }
            }
            ExportShape::Default => {
                if let StatementKind::DefaultExpression { .. } = module.statements[index].kind {
                    let binding = module.default_binding();
                    module.statements[index].defines.insert(binding);
                }
                module.add_export("default", index);
            }
            ExportShape::List(pairs) => {
                for (local, exported) in pairs {
                    let definer = module
                        .statements
                        .iter()
                        .find(|statement| statement.defines.contains(&local))
                        .map(|statement| statement.index);
                    if let Some(definer) = definer {
                        module.add_export(exported, definer);
                    }
                }
            }
        }
    }
}

/// Collects references that resolve to the root scope or to nothing at all.
struct FreeNameCollector<'s> {
    scoping: &'s Scoping,
    root: ScopeId,
    names: IndexSet<String>,
}

impl<'s> FreeNameCollector<'s> {
    fn new(scoping: &'s Scoping) -> Self {
        Self {
            scoping,
            root: scoping.root_scope_id(),
            names: IndexSet::new(),
        }
    }
}

impl<'a> Visit<'a> for FreeNameCollector<'_> {
    fn visit_identifier_reference(&mut self, ident: &IdentifierReference<'a>) {
        let symbol = ident
            .reference_id
            .get()
            .and_then(|reference| self.scoping.get_reference(reference).symbol_id());
        let free = symbol.is_none_or(|symbol| self.scoping.symbol_scope_id(symbol) == self.root);
        if free {
            self.names.insert(ident.name.to_string());
        }
    }
}
