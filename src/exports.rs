//! Flattens a module's export surface into [`ExportBinding`]s: one entry per
//! exported identifier after rename and destructuring resolution. Wildcard
//! re-exports are not enumerable and are handled by the boundary rewriter
//! directly.

use oxc_ast::ast::{
    BindingPattern, Declaration, Expression, ExportDefaultDeclarationKind, ModuleExportName,
    Program, Statement,
};
use oxc_span::Span;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportKind {
    Function,
    Class,
    Variable,
    Expression,
    Reexport,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportBinding {
    /// Exported name ("default" for default exports).
    pub name: String,
    /// Local identifier backing the export, when one exists.
    pub local_name: Option<String>,
    pub kind: ExportKind,
    pub is_function_like: bool,
    pub is_async: bool,
    pub start: u32,
    pub end: u32,
    /// Module specifier for re-exports.
    pub source: Option<String>,
}

/// Statically known facts about top-level locals: function-likeness and
/// asyncness, used to constraint-check `export { f }` specifiers.
pub(crate) fn collect_local_facts(program: &Program) -> HashMap<String, (bool, bool)> {
    let mut facts = HashMap::new();
    for statement in &program.body {
        let fact = match statement {
            Statement::FunctionDeclaration(f) => fact_from_function(f.id.as_ref(), f.r#async),
            Statement::ClassDeclaration(c) => {
                c.id.as_ref().map(|id| (id.name.to_string(), (true, false)))
            }
            Statement::VariableDeclaration(v) => {
                collect_declarator_facts(v, &mut facts);
                None
            }
            Statement::ExportNamedDeclaration(e) => match &e.declaration {
                Some(Declaration::FunctionDeclaration(f)) => {
                    fact_from_function(f.id.as_ref(), f.r#async)
                }
                Some(Declaration::ClassDeclaration(c)) => {
                    c.id.as_ref().map(|id| (id.name.to_string(), (true, false)))
                }
                Some(Declaration::VariableDeclaration(v)) => {
                    collect_declarator_facts(v, &mut facts);
                    None
                }
                _ => None,
            },
            _ => None,
        };
        if let Some((name, fact)) = fact {
            facts.insert(name, fact);
        }
    }
    facts
}

fn fact_from_function(
    id: Option<&oxc_ast::ast::BindingIdentifier>,
    is_async: bool,
) -> Option<(String, (bool, bool))> {
    id.map(|id| (id.name.to_string(), (true, is_async)))
}

fn collect_declarator_facts(
    declaration: &oxc_ast::ast::VariableDeclaration,
    facts: &mut HashMap<String, (bool, bool)>,
) {
    for declarator in &declaration.declarations {
        if let BindingPattern::BindingIdentifier(id) = &declarator.id {
            if let Some((true, is_async)) =
                declarator.init.as_ref().map(expression_function_meta)
            {
                facts.insert(id.name.to_string(), (true, is_async));
            }
        }
    }
}

/// `(is_function_like, is_async)` for a value expression.
pub(crate) fn expression_function_meta(expression: &Expression) -> (bool, bool) {
    match expression {
        Expression::FunctionExpression(f) => (true, f.r#async),
        Expression::ArrowFunctionExpression(a) => (true, a.r#async),
        Expression::ClassExpression(_) => (true, false),
        _ => (false, false),
    }
}

/// All names bound by a pattern, in source order (rest elements included).
pub(crate) fn binding_pattern_names(
    pattern: &oxc_ast::ast::BindingPattern,
    out: &mut Vec<(String, Span)>,
) {
    match pattern {
        BindingPattern::BindingIdentifier(id) => {
            out.push((id.name.to_string(), id.span));
        }
        BindingPattern::ObjectPattern(object) => {
            for property in &object.properties {
                binding_pattern_names(&property.value, out);
            }
            if let Some(rest) = &object.rest {
                binding_pattern_names(&rest.argument, out);
            }
        }
        BindingPattern::ArrayPattern(array) => {
            for element in array.elements.iter().flatten() {
                binding_pattern_names(element, out);
            }
            if let Some(rest) = &array.rest {
                binding_pattern_names(&rest.argument, out);
            }
        }
        BindingPattern::AssignmentPattern(assignment) => {
            binding_pattern_names(&assignment.left, out);
        }
    }
}

pub(crate) fn module_export_name(name: &ModuleExportName) -> String {
    match name {
        ModuleExportName::IdentifierName(id) => id.name.to_string(),
        ModuleExportName::IdentifierReference(id) => id.name.to_string(),
        ModuleExportName::StringLiteral(literal) => literal.value.to_string(),
    }
}

/// Enumerates the module's exports. Wildcard re-exports are skipped here; the
/// boundary rewriter surfaces them as constraint errors.
pub fn collect_export_bindings(program: &Program) -> Vec<ExportBinding> {
    let facts = collect_local_facts(program);
    let mut bindings = Vec::new();

    for statement in &program.body {
        match statement {
            Statement::ExportNamedDeclaration(export) => {
                if let Some(declaration) = &export.declaration {
                    collect_declaration_bindings(declaration, &mut bindings);
                    continue;
                }
                let source = export.source.as_ref().map(|s| s.value.to_string());
                for specifier in &export.specifiers {
                    let local = module_export_name(&specifier.local);
                    let exported = module_export_name(&specifier.exported);
                    let (kind, is_function_like, is_async) = if source.is_some() {
                        (ExportKind::Reexport, false, false)
                    } else {
                        match facts.get(&local) {
                            Some(&(true, is_async)) => (ExportKind::Function, true, is_async),
                            _ => (ExportKind::Variable, false, false),
                        }
                    };
                    bindings.push(ExportBinding {
                        name: exported,
                        local_name: Some(local),
                        kind,
                        is_function_like,
                        is_async,
                        start: specifier.span.start,
                        end: specifier.span.end,
                        source: source.clone(),
                    });
                }
            }
            Statement::ExportDefaultDeclaration(export) => {
                let (local_name, kind, is_function_like, is_async) = match &export.declaration {
                    ExportDefaultDeclarationKind::FunctionDeclaration(f) => (
                        f.id.as_ref().map(|id| id.name.to_string()),
                        ExportKind::Function,
                        true,
                        f.r#async,
                    ),
                    ExportDefaultDeclarationKind::ClassDeclaration(c) => (
                        c.id.as_ref().map(|id| id.name.to_string()),
                        ExportKind::Class,
                        true,
                        false,
                    ),
                    other => match other.as_expression() {
                        Some(Expression::Identifier(id)) => {
                            let name = id.name.to_string();
                            let (is_fn, is_async) = facts
                                .get(&name)
                                .copied()
                                .unwrap_or((false, false));
                            let kind = if is_fn {
                                ExportKind::Function
                            } else {
                                ExportKind::Expression
                            };
                            (Some(name), kind, is_fn, is_async)
                        }
                        Some(expr) => {
                            let (is_fn, is_async) = expression_function_meta(expr);
                            let kind = if is_fn {
                                ExportKind::Function
                            } else {
                                ExportKind::Expression
                            };
                            (None, kind, is_fn, is_async)
                        }
                        None => (None, ExportKind::Expression, false, false),
                    },
                };
                bindings.push(ExportBinding {
                    name: "default".to_string(),
                    local_name,
                    kind,
                    is_function_like,
                    is_async,
                    start: export.span.start,
                    end: export.span.end,
                    source: None,
                });
            }
            _ => {}
        }
    }
    bindings
}

fn collect_declaration_bindings(declaration: &Declaration, bindings: &mut Vec<ExportBinding>) {
    match declaration {
        Declaration::FunctionDeclaration(f) => {
            if let Some(id) = &f.id {
                bindings.push(ExportBinding {
                    name: id.name.to_string(),
                    local_name: Some(id.name.to_string()),
                    kind: ExportKind::Function,
                    is_function_like: true,
                    is_async: f.r#async,
                    start: f.span.start,
                    end: f.span.end,
                    source: None,
                });
            }
        }
        Declaration::ClassDeclaration(c) => {
            if let Some(id) = &c.id {
                bindings.push(ExportBinding {
                    name: id.name.to_string(),
                    local_name: Some(id.name.to_string()),
                    kind: ExportKind::Class,
                    is_function_like: true,
                    is_async: false,
                    start: c.span.start,
                    end: c.span.end,
                    source: None,
                });
            }
        }
        Declaration::VariableDeclaration(v) => {
            for declarator in &v.declarations {
                let mut names = Vec::new();
                binding_pattern_names(&declarator.id, &mut names);
                let single_ident =
                    matches!(&declarator.id, BindingPattern::BindingIdentifier(_));
                let (is_fn, is_async) = if single_ident {
                    declarator
                        .init
                        .as_ref()
                        .map(expression_function_meta)
                        .unwrap_or((false, false))
                } else {
                    (false, false)
                };
                for (name, span) in names {
                    bindings.push(ExportBinding {
                        name: name.clone(),
                        local_name: Some(name),
                        kind: if is_fn {
                            ExportKind::Function
                        } else {
                            ExportKind::Variable
                        },
                        is_function_like: is_fn,
                        is_async,
                        start: span.start,
                        end: span.end,
                        source: None,
                    });
                }
            }
        }
        _ => {}
    }
}
