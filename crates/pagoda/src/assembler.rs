//! Concatenation of selected statements into module output.
//!
//! Assembly never re-serializes syntax: each statement contributes a byte
//! range of the original source, with export wrappers cut off at the start of
//! the declaration they wrap. An anonymous default export keeps its value and
//! gains a `const` binding in front of it.

use std::ops::Range;

use crate::script_module::{ScriptModule, Statement, StatementKind};

/// Separator placed between retained statements.
const STATEMENT_SEPARATOR: &str = "\n";

/// Byte range of `module.source` a statement contributes, if any.
fn retained_range(statement: &Statement) -> Option<Range<usize>> {
    match statement.kind {
        StatementKind::ExportWrapper {
            declaration_start: start,
        }
        | StatementKind::DefaultExpression {
            expression_start: start,
        } => Some(start.clamp(statement.span.start, statement.span.end)..statement.span.end),
        StatementKind::Plain => Some(statement.span.clone()),
        StatementKind::Import | StatementKind::ExportList => None,
    }
}

/// Assemble the given statements (indices in emission order) into one string.
pub fn assemble(module: &ScriptModule, statements: &[usize]) -> String {
    let mut code = String::with_capacity(module.source.len());
    let mut first = true;

    for statement in statements.iter().filter_map(|&index| module.statements.get(index)) {
        let Some(range) = retained_range(statement) else {
            continue;
        };
        if !first {
            code.push_str(STATEMENT_SEPARATOR);
        }
        first = false;

        let text = &module.source[range];
        if let StatementKind::DefaultExpression { .. } = statement.kind {
            code.push_str("const ");
            code.push_str(&module.default_binding());
            code.push_str(" = ");
            code.push_str(text);
            if !text.trim_end().ends_with(';') {
                code.push(';');
            }
        } else {
            code.push_str(text);
        }
    }
    code
}
