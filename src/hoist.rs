//! Inline per-function directive application: every nested function or arrow
//! whose body carries the directive is relocated to module top level as an
//! independent declaration, with its free variables turned into explicit
//! leading parameters.
//!
//! Output has a fixed two-zone shape: the rewritten head first, then every
//! hoisted body appended after it (never interleaved). Bodies and parameter
//! lists are relocated with `move_range`, so the source map keeps
//! character-level provenance for them.

use crate::capture::free_variables;
use crate::directive::{has_function_directive, DirectiveSpec};
use crate::overlay::SourceOverlay;
use crate::scope::analyze_scope;
use crate::validate::{RegisterCall, RuntimeEmitter, TransformError, ERR_NON_ASYNC_BOUNDARY};
use lazy_static::lazy_static;
use oxc_ast::ast::{
    ArrowFunctionExpression, ExportDefaultDeclaration, ExportDefaultDeclarationKind,
    FormalParameters, Function, FunctionType, ObjectProperty, Program, PropertyKey,
    VariableDeclarator,
};
use oxc_ast_visit::{walk, Visit};
use oxc_span::Span;
use oxc_syntax::scope::ScopeFlags;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

// ═══════════════════════════════════════════════════════════════════════════════
// OPTIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Codegen closures serializing captured state into one opaque leading
/// parameter. `encode` receives the capture array literal (e.g. `[a, b]`) and
/// produces the bound argument; `decode` receives the payload parameter name
/// and produces the expression the hoisted body destructures from.
pub struct CaptureCodec {
    pub encode: Box<dyn Fn(&str) -> String>,
    pub decode: Box<dyn Fn(&str) -> String>,
}

pub struct HoistOptions {
    pub directive: DirectiveSpec,
    pub module_id: String,
    pub runtime: RuntimeEmitter,
    pub reject_non_async: bool,
    pub codec: Option<CaptureCodec>,
    /// Emit hoisted declarations with `export` so the other side can import
    /// them by name.
    pub export_hoisted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoistedFunction {
    pub synthetic_name: String,
    /// Captured free variables in binding order.
    pub captured_params: Vec<String>,
    pub body_start: u32,
    pub body_end: u32,
}

#[derive(Debug)]
pub struct HoistOutput {
    pub overlay: SourceOverlay,
    pub hoisted: Vec<HoistedFunction>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TRANSFORM
// ═══════════════════════════════════════════════════════════════════════════════

pub fn transform_hoist_directive(
    source: &str,
    program: &Program,
    options: &HoistOptions,
) -> Result<HoistOutput, TransformError> {
    let mut collector = HoistCollector {
        spec: &options.directive,
        targets: Vec::new(),
        name_hint: None,
        default_export_fn: None,
    };
    collector.visit_program(program);
    let mut targets = collector.targets;
    targets.sort_by_key(|t| t.span.start);

    let mut overlay = SourceOverlay::new(source);
    if targets.is_empty() {
        return Ok(HoistOutput {
            overlay,
            hoisted: Vec::new(),
        });
    }

    let graph = analyze_scope(program);
    let append_at = source.len() as u32;
    let mut hoisted = Vec::new();

    for (ordinal, target) in targets.iter().enumerate() {
        if options.reject_non_async && !target.is_async {
            return Err(TransformError::syntax_constraint(
                ERR_NON_ASYNC_BOUNDARY,
                "Directive-tagged functions must be asynchronous to cross the boundary.",
                &options.module_id,
                target.span.start,
                source,
            ));
        }

        let captured = free_variables(&graph, target.span);
        let synthetic = format!("hoist_{}_{}", ordinal, sanitize_hint(target.name.as_deref()));
        let id = format!("{}#{}", options.module_id, synthetic);
        let register_expr = (options.runtime)(&RegisterCall {
            value: Some(&synthetic),
            id: &id,
            name: &synthetic,
        });

        let use_codec = options.codec.is_some() && !captured.is_empty();
        let bind_suffix = if captured.is_empty() {
            String::new()
        } else if use_codec {
            let codec = options.codec.as_ref().unwrap();
            format!(
                ".bind(null, {})",
                (codec.encode)(&format!("[{}]", captured.join(", ")))
            )
        } else {
            format!(".bind(null, {})", captured.join(", "))
        };
        let call_site = format!("{}{}", register_expr, bind_suffix);
        let site_text = if target.is_declaration {
            format!(
                "const {} = {};",
                target.name.as_deref().unwrap_or(&synthetic),
                call_site
            )
        } else {
            call_site
        };

        // Rewrite the original site: the call replaces the whole function, the
        // parameter list and body are excised and re-emitted in the tail zone.
        let body_move_start = if use_codec {
            target.body_span.start + 1
        } else {
            target.body_span.start
        };
        match target.params_range {
            Some((params_start, params_end)) => {
                overlay.update(target.span.start, params_start, site_text);
                if params_end < body_move_start {
                    overlay.remove(params_end, body_move_start);
                }
            }
            None => overlay.update(target.span.start, body_move_start, site_text),
        }
        if target.body_span.end < target.span.end {
            overlay.remove(target.body_span.end, target.span.end);
        }

        let mut header = String::from("\n");
        if options.export_hoisted {
            header.push_str("export ");
        }
        if target.is_async {
            header.push_str("async ");
        }
        header.push_str("function");
        if target.is_generator {
            header.push('*');
        }
        header.push(' ');
        header.push_str(&synthetic);
        header.push('(');
        let leading = if use_codec {
            "$$payload".to_string()
        } else {
            captured.join(", ")
        };
        header.push_str(&leading);
        if target.params_range.is_some() && !leading.is_empty() {
            header.push_str(", ");
        }
        overlay.append(header);
        if let Some((params_start, params_end)) = target.params_range {
            overlay.move_range(params_start, params_end, append_at);
        }
        overlay.append(") ");
        if use_codec {
            let codec = options.codec.as_ref().unwrap();
            overlay.append(format!(
                "{{ const [{}] = {};",
                captured.join(", "),
                (codec.decode)("$$payload")
            ));
        }
        overlay.move_range(body_move_start, target.body_span.end, append_at);

        hoisted.push(HoistedFunction {
            synthetic_name: synthetic,
            captured_params: captured,
            body_start: target.body_span.start,
            body_end: target.body_span.end,
        });
    }

    debug!(
        module_id = %options.module_id,
        hoisted = hoisted.len(),
        "hoisted directive-tagged functions"
    );
    Ok(HoistOutput { overlay, hoisted })
}

// ═══════════════════════════════════════════════════════════════════════════════
// TARGET COLLECTION
// ═══════════════════════════════════════════════════════════════════════════════

struct Target {
    span: Span,
    body_span: Span,
    params_range: Option<(u32, u32)>,
    is_async: bool,
    is_generator: bool,
    is_declaration: bool,
    name: Option<String>,
}

struct HoistCollector<'c> {
    spec: &'c DirectiveSpec,
    targets: Vec<Target>,
    name_hint: Option<String>,
    /// Span start of a `export default function` declaration, which must be
    /// rewritten as an expression rather than a `const` statement.
    default_export_fn: Option<u32>,
}

impl<'a, 'c> Visit<'a> for HoistCollector<'c> {
    fn visit_function(&mut self, func: &Function<'a>, flags: ScopeFlags) {
        let hint = self.name_hint.take();
        let matched = func
            .body
            .as_ref()
            .and_then(|body| has_function_directive(body, self.spec));
        if matched.is_some() {
            let body = func.body.as_ref().unwrap();
            let statement_position = matches!(func.r#type, FunctionType::FunctionDeclaration)
                && func.id.is_some()
                && self.default_export_fn != Some(func.span.start);
            self.targets.push(Target {
                span: func.span,
                body_span: body.span,
                params_range: params_range(&func.params),
                is_async: func.r#async,
                is_generator: func.generator,
                is_declaration: statement_position,
                name: func.id.as_ref().map(|id| id.name.to_string()).or(hint),
            });
            // Anything nested relocates with this body.
            return;
        }
        walk::walk_function(self, func, flags);
    }

    fn visit_arrow_function_expression(&mut self, func: &ArrowFunctionExpression<'a>) {
        let hint = self.name_hint.take();
        // Expression-bodied arrows have no statement list and never match.
        let matched = if func.expression {
            None
        } else {
            has_function_directive(&func.body, self.spec)
        };
        if matched.is_some() {
            self.targets.push(Target {
                span: func.span,
                body_span: func.body.span,
                params_range: params_range(&func.params),
                is_async: func.r#async,
                is_generator: false,
                is_declaration: false,
                name: hint,
            });
            return;
        }
        walk::walk_arrow_function_expression(self, func);
    }

    fn visit_variable_declarator(&mut self, declarator: &VariableDeclarator<'a>) {
        if let oxc_ast::ast::BindingPattern::BindingIdentifier(id) = &declarator.id {
            self.name_hint = Some(id.name.to_string());
        }
        walk::walk_variable_declarator(self, declarator);
        self.name_hint = None;
    }

    fn visit_object_property(&mut self, property: &ObjectProperty<'a>) {
        if let PropertyKey::StaticIdentifier(key) = &property.key {
            self.name_hint = Some(key.name.to_string());
        }
        walk::walk_object_property(self, property);
        self.name_hint = None;
    }

    fn visit_export_default_declaration(&mut self, decl: &ExportDefaultDeclaration<'a>) {
        if let ExportDefaultDeclarationKind::FunctionDeclaration(f) = &decl.declaration {
            self.default_export_fn = Some(f.span.start);
        }
        walk::walk_export_default_declaration(self, decl);
        self.default_export_fn = None;
    }
}

/// Original span of the parameter list contents, rest element included.
fn params_range(params: &FormalParameters) -> Option<(u32, u32)> {
    let start = params
        .items
        .first()
        .map(|p| p.span.start)
        .or_else(|| params.rest.as_ref().map(|r| r.span.start))?;
    let end = params
        .rest
        .as_ref()
        .map(|r| r.span.end)
        .or_else(|| params.items.last().map(|p| p.span.end))?;
    Some((start, end))
}

lazy_static! {
    static ref HINT_SCRUB_RE: Regex = Regex::new(r"[^A-Za-z0-9_$]").unwrap();
}

fn sanitize_hint(hint: Option<&str>) -> String {
    let scrubbed = hint
        .map(|h| HINT_SCRUB_RE.replace_all(h, "_").to_string())
        .unwrap_or_default();
    if scrubbed.is_empty() {
        return "anonymous".to_string();
    }
    if scrubbed.as_bytes()[0].is_ascii_digit() {
        format!("_{}", scrubbed)
    } else {
        scrubbed
    }
}
