//! Statement-level tree shaking for a single script module.
//!
//! Liveness is reachability over a statement graph: an edge goes from a
//! statement to every statement that defines one of the names it depends on.
//! The roots are the exported statements plus every statement that defines
//! nothing but still does something (a bare call, an assignment to an
//! existing binding, an `export { … }` list). Emission keeps the original
//! declaration order, not discovery order.

use anyhow::Result;
use indexmap::IndexSet;
use log::{debug, trace};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::BuildError;
use crate::js_globals::KnownGlobals;
use crate::script_module::{ExternalImport, ScriptModule, Statement, StatementKind};

/// How liveness is decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionMode {
    /// Keep what exports and side effects transitively need.
    #[default]
    Reachability,
    /// Keep every emittable statement once.
    Unconditional,
}

#[derive(Debug, Clone, Copy)]
pub struct SelectOptions<'a> {
    pub mode: SelectionMode,
    pub globals: &'a KnownGlobals,
}

/// Result of selecting the statements of one module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    /// Indices of emitted statements, ascending, no duplicates.
    pub statements: Vec<usize>,
    /// Import bindings referenced by live statements.
    pub external: IndexSet<ExternalImport>,
}

impl Selection {
    pub fn contains(&self, index: usize) -> bool {
        self.statements.binary_search(&index).is_ok()
    }
}

/// Select the statements of `module` that must be emitted.
pub fn select(module: &ScriptModule, options: &SelectOptions<'_>) -> Result<Selection> {
    let definers = collect_definers(module);

    let live = match options.mode {
        SelectionMode::Reachability => live_statements(module, &definers),
        SelectionMode::Unconditional => module
            .statements
            .iter()
            .filter(|statement| statement.kind.is_emittable())
            .map(|statement| statement.index)
            .collect(),
    };

    let mut included = vec![false; module.statements.len()];
    let mut selection = Selection::default();

    for statement in &module.statements {
        if !live.contains(&statement.index) {
            trace!("{}: dropping statement #{}", module.label(), statement.index);
            continue;
        }

        resolve_free_names(module, statement, &definers, options.globals, &mut selection)?;

        if statement.kind.is_emittable() && !included[statement.index] {
            included[statement.index] = true;
            selection.statements.push(statement.index);
        }
    }

    debug!(
        "{}: selected {} of {} statements ({} external bindings)",
        module.label(),
        selection.statements.len(),
        module.statements.len(),
        selection.external.len()
    );

    Ok(selection)
}

/// Select once and remember the result on the module.
pub fn select_recorded<'m>(
    module: &'m ScriptModule,
    options: &SelectOptions<'_>,
) -> Result<&'m Selection> {
    if let Some(selection) = module.selected() {
        return Ok(selection);
    }
    let selection = select(module, options)?;
    Ok(module.record_selection(selection))
}

/// Emittable statements that unconditional inclusion keeps but reachability
/// drops. Empty when the two modes agree on this module.
pub fn diverging_statements(module: &ScriptModule) -> Vec<usize> {
    let definers = collect_definers(module);
    let live = live_statements(module, &definers);
    module
        .statements
        .iter()
        .filter(|statement| statement.kind.is_emittable() && !live.contains(&statement.index))
        .map(|statement| statement.index)
        .collect()
}

/// Name -> every non-import statement that defines it, in source order.
fn collect_definers(module: &ScriptModule) -> FxHashMap<&str, Vec<usize>> {
    let mut definers: FxHashMap<&str, Vec<usize>> = FxHashMap::default();
    for statement in &module.statements {
        if statement.kind == StatementKind::Import {
            continue;
        }
        for name in &statement.defines {
            definers
                .entry(name.as_str())
                .or_default()
                .push(statement.index);
        }
    }
    definers
}

fn is_root(module: &ScriptModule, statement: &Statement) -> bool {
    if statement.kind == StatementKind::Import {
        return false;
    }
    let exported = module.exports.values().any(|&index| index == statement.index);
    exported || (statement.defines.is_empty() && !statement.depends.is_empty())
}

fn live_statements(
    module: &ScriptModule,
    definers: &FxHashMap<&str, Vec<usize>>,
) -> FxHashSet<usize> {
    let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(module.statements.len(), 0);
    let nodes: Vec<NodeIndex> = module
        .statements
        .iter()
        .map(|statement| graph.add_node(statement.index))
        .collect();

    for statement in &module.statements {
        if statement.kind == StatementKind::Import {
            continue;
        }
        for name in &statement.depends {
            let Some(targets) = definers.get(name.as_str()) else {
                continue;
            };
            for &target in targets {
                if target != statement.index {
                    graph.add_edge(nodes[statement.index], nodes[target], ());
                }
            }
        }
    }

    let mut live = FxHashSet::default();
    let mut dfs = Dfs::empty(&graph);
    for statement in module
        .statements
        .iter()
        .filter(|statement| is_root(module, statement))
    {
        dfs.move_to(nodes[statement.index]);
        while let Some(node) = dfs.next(&graph) {
            live.insert(graph[node]);
        }
    }
    live
}

fn resolve_free_names(
    module: &ScriptModule,
    statement: &Statement,
    definers: &FxHashMap<&str, Vec<usize>>,
    globals: &KnownGlobals,
    selection: &mut Selection,
) -> Result<()> {
    for name in &statement.depends {
        if definers.contains_key(name.as_str()) {
            continue;
        }
        if let Some(binding) = module.imports.get(name) {
            selection.external.insert(ExternalImport {
                local: name.clone(),
                binding: binding.clone(),
            });
            continue;
        }
        if globals.contains(name) {
            continue;
        }
        return Err(BuildError::Analysis {
            module: module.label(),
            statement: statement.index,
            name: name.clone(),
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script_module::ImportBinding;
    use pretty_assertions::assert_eq;

    /// Build a module from `(text, kind, defines, depends)` rows; spans are
    /// laid out back to back with a newline between statements.
    fn module_from(rows: &[(&str, StatementKind, &[&str], &[&str])]) -> ScriptModule {
        let source = rows.iter().map(|row| row.0).collect::<Vec<_>>().join("\n");
        let mut module = ScriptModule::new("test.js", source.as_str());
        let mut offset = 0;
        for (text, kind, defines, depends) in rows {
            let span = offset..offset + text.len();
            offset = span.end + 1;
            module.push_statement(
                Statement::new(0, *kind, span)
                    .with_defines(defines.iter().copied())
                    .with_depends(depends.iter().copied()),
            );
        }
        module
    }

    fn reachability(module: &ScriptModule) -> Result<Selection> {
        let globals = KnownGlobals::default();
        select(
            module,
            &SelectOptions {
                mode: SelectionMode::Reachability,
                globals: &globals,
            },
        )
    }

    #[test]
    fn test_unused_local_is_dropped() {
        let mut module = module_from(&[
            ("const bar = helper()", StatementKind::Plain, &["bar"], &["helper"]),
            (
                "export const foo = 1",
                StatementKind::ExportWrapper {
                    declaration_start: 7,
                },
                &["foo"],
                &[],
            ),
            ("console.log(1)", StatementKind::Plain, &[], &["console"]),
        ]);
        module.add_export("foo", 1);

        let selection = reachability(&module).expect("selection should succeed");
        assert_eq!(selection.statements, vec![1, 2]);
    }

    #[test]
    fn test_local_used_by_export_is_kept_in_source_order() {
        let mut module = module_from(&[
            ("function helper() {}", StatementKind::Plain, &["helper"], &[]),
            ("const bar = helper()", StatementKind::Plain, &["bar"], &["helper"]),
            (
                "export const foo = () => bar",
                StatementKind::ExportWrapper {
                    declaration_start: 7,
                },
                &["foo"],
                &["bar"],
            ),
            ("console.log(1)", StatementKind::Plain, &[], &["console"]),
        ]);
        module.add_export("foo", 2);

        let selection = reachability(&module).expect("selection should succeed");
        assert_eq!(selection.statements, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_statement_defining_several_names_is_emitted_once() {
        let mut module = module_from(&[
            ("let a = 1, b = 2", StatementKind::Plain, &["a", "b"], &[]),
            (
                "export const c = a + b",
                StatementKind::ExportWrapper {
                    declaration_start: 7,
                },
                &["c"],
                &["a", "b"],
            ),
        ]);
        module.add_export("c", 1);

        let selection = reachability(&module).expect("selection should succeed");
        assert_eq!(selection.statements, vec![0, 1]);
    }

    #[test]
    fn test_imports_and_empty_statements_are_never_emitted() {
        let mut module = module_from(&[
            ("import { x } from './x'", StatementKind::Import, &[], &[]),
            ("import './polyfill'", StatementKind::Import, &[], &[]),
            (";", StatementKind::Plain, &[], &[]),
            ("x()", StatementKind::Plain, &[], &["x"]),
        ]);
        module.add_import(
            "x",
            ImportBinding {
                imported: "x".into(),
                source: "./x".into(),
            },
        );

        let selection = reachability(&module).expect("selection should succeed");
        assert_eq!(selection.statements, vec![3]);
        let external: Vec<_> = selection.external.iter().map(|e| e.local.as_str()).collect();
        assert_eq!(external, vec!["x"]);
    }

    #[test]
    fn test_unused_import_is_not_external() {
        let mut module = module_from(&[
            ("import { x } from './x'", StatementKind::Import, &[], &[]),
            ("const dead = x", StatementKind::Plain, &["dead"], &["x"]),
        ]);
        module.add_import(
            "x",
            ImportBinding {
                imported: "x".into(),
                source: "./x".into(),
            },
        );

        let selection = reachability(&module).expect("selection should succeed");
        assert!(selection.statements.is_empty());
        assert!(selection.external.is_empty());
    }

    #[test]
    fn test_export_list_pulls_in_local_definition() {
        let mut module = module_from(&[
            ("function foo() {}", StatementKind::Plain, &["foo"], &[]),
            ("function unused() {}", StatementKind::Plain, &["unused"], &[]),
            ("export { foo }", StatementKind::ExportList, &[], &["foo"]),
        ]);
        module.add_export("foo", 0);

        let selection = reachability(&module).expect("selection should succeed");
        assert_eq!(selection.statements, vec![0]);
    }

    #[test]
    fn test_cycles_terminate() {
        let mut module = module_from(&[
            ("function even(n) { return odd(n) }", StatementKind::Plain, &["even"], &["odd"]),
            ("function odd(n) { return even(n) }", StatementKind::Plain, &["odd"], &["even"]),
            (
                "export const run = even",
                StatementKind::ExportWrapper {
                    declaration_start: 7,
                },
                &["run"],
                &["even"],
            ),
        ]);
        module.add_export("run", 2);

        let selection = reachability(&module).expect("selection should succeed");
        assert_eq!(selection.statements, vec![0, 1, 2]);
    }

    #[test]
    fn test_unresolved_name_is_analysis_error() {
        let module = module_from(&[
            ("const a = 1", StatementKind::Plain, &["a"], &[]),
            ("missing(a)", StatementKind::Plain, &[], &["missing", "a"]),
        ]);

        let err = reachability(&module).expect_err("unresolved name must fail");
        match err.downcast_ref::<BuildError>() {
            Some(BuildError::Analysis {
                statement, name, ..
            }) => {
                assert_eq!(*statement, 1);
                assert_eq!(name, "missing");
            }
            other => panic!("expected analysis error, got {other:?}"),
        }
    }

    #[test]
    fn test_unresolved_name_in_dead_code_is_ignored() {
        let module = module_from(&[("const dead = missing()", StatementKind::Plain, &["dead"], &["missing"])]);
        let selection = reachability(&module).expect("dead code is not analysed");
        assert!(selection.statements.is_empty());
    }

    #[test]
    fn test_selection_is_idempotent() {
        let mut module = module_from(&[
            ("const a = 1", StatementKind::Plain, &["a"], &[]),
            ("const b = a", StatementKind::Plain, &["b"], &["a"]),
            (
                "export const c = b",
                StatementKind::ExportWrapper {
                    declaration_start: 7,
                },
                &["c"],
                &["b"],
            ),
        ]);
        module.add_export("c", 2);

        let first = reachability(&module).expect("first selection");
        let second = reachability(&module).expect("second selection");
        assert_eq!(first, second);
    }

    #[test]
    fn test_unconditional_mode_and_divergence() {
        let mut module = module_from(&[
            ("import { x } from './x'", StatementKind::Import, &[], &[]),
            ("const unused = 1", StatementKind::Plain, &["unused"], &[]),
            (
                "export const kept = 2",
                StatementKind::ExportWrapper {
                    declaration_start: 7,
                },
                &["kept"],
                &[],
            ),
        ]);
        module.add_export("kept", 2);

        let globals = KnownGlobals::default();
        let selection = select(
            &module,
            &SelectOptions {
                mode: SelectionMode::Unconditional,
                globals: &globals,
            },
        )
        .expect("selection should succeed");
        assert_eq!(selection.statements, vec![1, 2]);
        assert_eq!(diverging_statements(&module), vec![1]);
    }

    #[test]
    fn test_select_recorded_keeps_first_result() {
        let module = module_from(&[("console.log(1)", StatementKind::Plain, &[], &["console"])]);
        let globals = KnownGlobals::default();
        let options = SelectOptions {
            mode: SelectionMode::Reachability,
            globals: &globals,
        };
        let first = select_recorded(&module, &options)
            .expect("selection should succeed")
            .clone();
        let second = select_recorded(&module, &options).expect("selection should succeed");
        assert_eq!(&first, second);
        assert!(module.selected().is_some());
    }
}
