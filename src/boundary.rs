//! Whole-module directive application: every export is rewritten into a
//! registry-marked alias under one of two strategies.
//!
//! * **Replace-in-place** — the original implementation is dropped from the
//!   artifact and each export becomes a bare registration call. Used when the
//!   implementation must never run on this side of the boundary.
//! * **Wrap-preserve** — the implementation keeps executing under its local
//!   binding while the exported name is rebound to a wrapped, registered alias
//!   invocable by id from the other side.
//!
//! Generated bindings always use fresh `$$`-prefixed aliases re-exported under
//! the original names, so output names cannot collide with surviving module
//! locals.

use crate::directive::{has_module_directive, DirectiveMatch, DirectiveSpec};
use crate::exports::{
    binding_pattern_names, collect_local_facts, expression_function_meta, module_export_name,
};
use crate::overlay::SourceOverlay;
use crate::validate::{
    RegisterCall, RuntimeEmitter, TransformError, ERR_NON_ASYNC_BOUNDARY, ERR_STAR_REEXPORT,
};
use lazy_static::lazy_static;
use oxc_ast::ast::{
    Declaration, Expression, ExportDefaultDeclaration, ExportDefaultDeclarationKind,
    ExportNamedDeclaration, Program, Statement,
};
use oxc_span::GetSpan;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use tracing::debug;

// ═══════════════════════════════════════════════════════════════════════════════
// OPTIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Facts handed to the export filter.
pub struct ExportMeta {
    pub is_function_like: bool,
    /// For default exports of a bare identifier: the identifier being
    /// re-exported.
    pub default_export_identifier: Option<String>,
}

/// Returns `true` to rewrite the export, `false` to pass it through untouched.
pub type ExportFilter = Box<dyn Fn(&str, &ExportMeta) -> bool>;

pub struct BoundaryOptions {
    pub directive: DirectiveSpec,
    pub module_id: String,
    pub runtime: RuntimeEmitter,
    pub filter: Option<ExportFilter>,
    /// Wrap-preserve when `true`, replace-in-place when `false`.
    pub preserve_original: bool,
    pub reject_non_async: bool,
    /// Pass `export * from` through instead of rejecting it.
    pub ignore_star_reexport: bool,
}

pub struct BoundaryOutput {
    pub overlay: SourceOverlay,
    /// Exported names of the rewritten module, in document order.
    pub export_names: Vec<String>,
    pub directive: DirectiveMatch,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TRANSFORM
// ═══════════════════════════════════════════════════════════════════════════════

/// Rewrites every export of a module that carries the directive. Returns
/// `Ok(None)` when the module is not tagged.
pub fn transform_boundary_exports(
    source: &str,
    program: &Program,
    options: &BoundaryOptions,
) -> Result<Option<BoundaryOutput>, TransformError> {
    let Some(directive) = has_module_directive(program, &options.directive) else {
        return Ok(None);
    };

    let facts = collect_local_facts(program);
    let mut rewriter = Rewriter {
        source,
        options,
        ops: Vec::new(),
        appends: Vec::new(),
        names: Vec::new(),
        alias: 0,
    };

    for statement in &program.body {
        match statement {
            Statement::ExportNamedDeclaration(export) => {
                if let Some(declaration) = &export.declaration {
                    rewriter.rewrite_declaration_export(export, declaration)?;
                } else {
                    rewriter.rewrite_specifier_export(export, &facts)?;
                }
            }
            Statement::ExportDefaultDeclaration(export) => {
                rewriter.rewrite_default_export(export, &facts)?;
            }
            Statement::ExportAllDeclaration(export) => {
                if !options.ignore_star_reexport {
                    return Err(TransformError::syntax_constraint(
                        ERR_STAR_REEXPORT,
                        "`export *` cannot be rewritten: its export set is not statically enumerable.",
                        &options.module_id,
                        export.span.start,
                        source,
                    ));
                }
            }
            _ => {}
        }
    }

    // Output names must be unique before any edit is finalized.
    let mut seen = HashSet::new();
    for (name, offset) in &rewriter.names {
        if !seen.insert(name.clone()) {
            return Err(TransformError::duplicate_export(
                name,
                &options.module_id,
                *offset,
                source,
            ));
        }
    }

    let mut overlay = SourceOverlay::new(source);
    for op in &rewriter.ops {
        match op {
            StmtOp::Update { start, end, text } => overlay.update(*start, *end, text.clone()),
            StmtOp::Remove { start, end } => overlay.remove(*start, *end),
        }
    }
    for text in &rewriter.appends {
        overlay.append(format!("\n{}", text));
    }

    let export_names: Vec<String> = rewriter.names.into_iter().map(|(name, _)| name).collect();
    debug!(
        module_id = %options.module_id,
        exports = export_names.len(),
        "rewrote boundary exports"
    );
    Ok(Some(BoundaryOutput {
        overlay,
        export_names,
        directive,
    }))
}

// ═══════════════════════════════════════════════════════════════════════════════
// REWRITER
// ═══════════════════════════════════════════════════════════════════════════════

enum StmtOp {
    Update { start: u32, end: u32, text: String },
    Remove { start: u32, end: u32 },
}

struct Rewriter<'r> {
    source: &'r str,
    options: &'r BoundaryOptions,
    ops: Vec<StmtOp>,
    appends: Vec<String>,
    names: Vec<(String, u32)>,
    alias: usize,
}

impl<'r> Rewriter<'r> {
    fn fresh_alias(&mut self, prefix: &str) -> String {
        let alias = format!("$${}_{}", prefix, self.alias);
        self.alias += 1;
        alias
    }

    fn should_wrap(&self, name: &str, meta: &ExportMeta) -> bool {
        self.options
            .filter
            .as_ref()
            .map(|filter| filter(name, meta))
            .unwrap_or(true)
    }

    fn check_async(&self, name: &str, is_async: bool, offset: u32) -> Result<(), TransformError> {
        if self.options.reject_non_async && !is_async {
            return Err(TransformError::syntax_constraint(
                ERR_NON_ASYNC_BOUNDARY,
                &format!(
                    "Export \"{}\" must be asynchronous to cross the boundary.",
                    name
                ),
                &self.options.module_id,
                offset,
                self.source,
            ));
        }
        Ok(())
    }

    fn plan_export(&mut self, name: &str, offset: u32) {
        self.names.push((name.to_string(), offset));
    }

    fn emit_register(&self, value: Option<&str>, name: &str) -> String {
        let id = format!("{}#{}", self.options.module_id, name);
        (self.options.runtime)(&RegisterCall {
            value,
            id: &id,
            name,
        })
    }

    /// Appends `const $$alias = <register call>; export { $$alias as name };`.
    fn append_wrap(&mut self, value: Option<&str>, exported: &str) {
        let alias = self.fresh_alias(if value.is_some() { "wrap" } else { "ref" });
        let call = self.emit_register(value, exported);
        self.appends.push(format!(
            "const {} = {};\nexport {{ {} as {} }};",
            alias,
            call,
            alias,
            export_clause_name(exported)
        ));
    }

    fn append_plain_local(&mut self, local: &str, exported: &str) {
        self.appends
            .push(format!("export {{ {} }};", specifier_clause(local, exported)));
    }

    fn rewrite_declaration_export(
        &mut self,
        export: &ExportNamedDeclaration,
        declaration: &Declaration,
    ) -> Result<(), TransformError> {
        let mut bindings: Vec<(String, u32, bool, bool)> = Vec::new();
        match declaration {
            Declaration::FunctionDeclaration(f) => {
                if let Some(id) = &f.id {
                    bindings.push((id.name.to_string(), f.span.start, true, f.r#async));
                }
            }
            Declaration::ClassDeclaration(c) => {
                if let Some(id) = &c.id {
                    bindings.push((id.name.to_string(), c.span.start, true, false));
                }
            }
            Declaration::VariableDeclaration(v) => {
                for declarator in &v.declarations {
                    let mut names = Vec::new();
                    binding_pattern_names(&declarator.id, &mut names);
                    let single = names.len() == 1;
                    let (is_fn, is_async) = if single {
                        declarator
                            .init
                            .as_ref()
                            .map(expression_function_meta)
                            .unwrap_or((false, false))
                    } else {
                        (false, false)
                    };
                    for (name, span) in names {
                        bindings.push((name, span.start, is_fn, is_async));
                    }
                }
            }
            _ => return Ok(()),
        }

        let decisions: Vec<bool> = bindings
            .iter()
            .map(|(name, _, is_fn, _)| {
                self.should_wrap(
                    name,
                    &ExportMeta {
                        is_function_like: *is_fn,
                        default_export_identifier: None,
                    },
                )
            })
            .collect();

        if decisions.iter().all(|wrap| !wrap) {
            for (name, offset, _, _) in &bindings {
                self.plan_export(name, *offset);
            }
            return Ok(());
        }

        for ((name, offset, is_fn, is_async), wrap) in bindings.iter().zip(&decisions) {
            if *wrap && *is_fn {
                self.check_async(name, *is_async, *offset)?;
            }
        }

        let keep_declaration = self.options.preserve_original || decisions.iter().any(|w| !w);
        if keep_declaration {
            // Strip the `export ` prefix; the declaration itself survives.
            self.ops.push(StmtOp::Update {
                start: export.span.start,
                end: declaration.span().start,
                text: String::new(),
            });
        } else {
            self.ops.push(StmtOp::Remove {
                start: export.span.start,
                end: export.span.end,
            });
        }

        for ((name, offset, _, _), wrap) in bindings.iter().zip(&decisions) {
            self.plan_export(name, *offset);
            if *wrap {
                let value = self.options.preserve_original.then(|| name.clone());
                self.append_wrap(value.as_deref(), name);
            } else {
                self.append_plain_local(name, name);
            }
        }
        Ok(())
    }

    fn rewrite_specifier_export(
        &mut self,
        export: &ExportNamedDeclaration,
        facts: &HashMap<String, (bool, bool)>,
    ) -> Result<(), TransformError> {
        struct Spec {
            local: String,
            exported: String,
            offset: u32,
            wrap: bool,
        }

        let reexport_source = export.source.as_ref().map(|s| s.value.to_string());
        let mut specs = Vec::new();
        for specifier in &export.specifiers {
            let local = module_export_name(&specifier.local);
            let exported = module_export_name(&specifier.exported);
            let (is_fn, is_async) = if reexport_source.is_none() {
                facts.get(&local).copied().unwrap_or((false, false))
            } else {
                (false, false)
            };
            let wrap = self.should_wrap(
                &exported,
                &ExportMeta {
                    is_function_like: is_fn,
                    default_export_identifier: None,
                },
            );
            if wrap && is_fn {
                self.check_async(&exported, is_async, specifier.span.start)?;
            }
            specs.push(Spec {
                local,
                exported,
                offset: specifier.span.start,
                wrap,
            });
        }

        if specs.iter().all(|s| !s.wrap) {
            for spec in &specs {
                self.plan_export(&spec.exported, spec.offset);
            }
            return Ok(());
        }

        let mut import_items: Vec<String> = Vec::new();
        let mut keep_items: Vec<String> = Vec::new();
        let mut wrap_jobs: Vec<(Option<String>, String)> = Vec::new();

        for spec in &specs {
            self.plan_export(&spec.exported, spec.offset);
            if !spec.wrap {
                keep_items.push(specifier_clause(&spec.local, &spec.exported));
                continue;
            }
            match (&reexport_source, self.options.preserve_original) {
                (Some(_), true) => {
                    // Import the original under a fresh alias, wrap that.
                    let alias = self.fresh_alias("import");
                    import_items.push(format!(
                        "{} as {}",
                        export_clause_name(&spec.local),
                        alias
                    ));
                    wrap_jobs.push((Some(alias), spec.exported.clone()));
                }
                (Some(_), false) => wrap_jobs.push((None, spec.exported.clone())),
                (None, preserve) => {
                    let value = preserve.then(|| spec.local.clone());
                    wrap_jobs.push((value, spec.exported.clone()));
                }
            }
        }

        let mut replacement_parts: Vec<String> = Vec::new();
        if let Some(src) = &reexport_source {
            if !import_items.is_empty() {
                replacement_parts.push(format!(
                    "import {{ {} }} from \"{}\";",
                    import_items.join(", "),
                    src
                ));
            }
            if !keep_items.is_empty() {
                replacement_parts.push(format!(
                    "export {{ {} }} from \"{}\";",
                    keep_items.join(", "),
                    src
                ));
            }
        } else if !keep_items.is_empty() {
            replacement_parts.push(format!("export {{ {} }};", keep_items.join(", ")));
        }

        if replacement_parts.is_empty() {
            self.ops.push(StmtOp::Remove {
                start: export.span.start,
                end: export.span.end,
            });
        } else {
            self.ops.push(StmtOp::Update {
                start: export.span.start,
                end: export.span.end,
                text: replacement_parts.join("\n"),
            });
        }

        for (value, exported) in wrap_jobs {
            self.append_wrap(value.as_deref(), &exported);
        }
        Ok(())
    }

    fn rewrite_default_export(
        &mut self,
        export: &ExportDefaultDeclaration,
        facts: &HashMap<String, (bool, bool)>,
    ) -> Result<(), TransformError> {
        enum Shape {
            NamedDeclaration { name: String },
            Anonymous,
            Identifier { name: String },
        }

        let (shape, decl_start, is_fn, is_async) = match &export.declaration {
            ExportDefaultDeclarationKind::FunctionDeclaration(f) => (
                match &f.id {
                    Some(id) => Shape::NamedDeclaration {
                        name: id.name.to_string(),
                    },
                    None => Shape::Anonymous,
                },
                f.span.start,
                true,
                f.r#async,
            ),
            ExportDefaultDeclarationKind::ClassDeclaration(c) => (
                match &c.id {
                    Some(id) => Shape::NamedDeclaration {
                        name: id.name.to_string(),
                    },
                    None => Shape::Anonymous,
                },
                c.span.start,
                true,
                false,
            ),
            other => match other.as_expression() {
                Some(Expression::Identifier(id)) => {
                    let name = id.name.to_string();
                    let (is_fn, is_async) = facts.get(&name).copied().unwrap_or((false, false));
                    (Shape::Identifier { name }, id.span().start, is_fn, is_async)
                }
                Some(expr) => {
                    let (is_fn, is_async) = expression_function_meta(expr);
                    (Shape::Anonymous, expr.span().start, is_fn, is_async)
                }
                None => (Shape::Anonymous, export.span.start, false, false),
            },
        };

        let meta = ExportMeta {
            is_function_like: is_fn,
            default_export_identifier: match &shape {
                Shape::Identifier { name } => Some(name.clone()),
                _ => None,
            },
        };
        if !self.should_wrap("default", &meta) {
            self.plan_export("default", export.span.start);
            return Ok(());
        }
        if is_fn {
            self.check_async("default", is_async, decl_start)?;
        }

        self.plan_export("default", export.span.start);
        if !self.options.preserve_original {
            self.ops.push(StmtOp::Remove {
                start: export.span.start,
                end: export.span.end,
            });
            self.append_wrap(None, "default");
            return Ok(());
        }

        match shape {
            Shape::NamedDeclaration { name } => {
                // Keep the declaration; only the `export default ` prefix goes.
                self.ops.push(StmtOp::Update {
                    start: export.span.start,
                    end: decl_start,
                    text: String::new(),
                });
                self.append_wrap(Some(&name), "default");
            }
            Shape::Identifier { name } => {
                self.ops.push(StmtOp::Remove {
                    start: export.span.start,
                    end: export.span.end,
                });
                self.append_wrap(Some(&name), "default");
            }
            Shape::Anonymous => {
                let alias = self.fresh_alias("default");
                self.ops.push(StmtOp::Update {
                    start: export.span.start,
                    end: decl_start,
                    text: format!("const {} = ", alias),
                });
                self.append_wrap(Some(&alias), "default");
            }
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CLAUSE HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

lazy_static! {
    static ref IDENTIFIER_RE: Regex = Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").unwrap();
}

pub(crate) fn is_identifier(name: &str) -> bool {
    IDENTIFIER_RE.is_match(name)
}

/// A name as it may appear in an export clause: bare when it is a valid
/// identifier, string-quoted otherwise.
fn export_clause_name(name: &str) -> String {
    if is_identifier(name) {
        name.to_string()
    } else {
        serde_json::to_string(name).unwrap_or_else(|_| format!("\"{}\"", name))
    }
}

fn specifier_clause(local: &str, exported: &str) -> String {
    if local == exported && is_identifier(local) {
        local.to_string()
    } else {
        format!(
            "{} as {}",
            export_clause_name(local),
            export_clause_name(exported)
        )
    }
}
